//! Tokenization shared by index builds and queries

/// Splits text on whitespace, lowercases, and strips every character that
/// is neither alphanumeric nor `_` from each word
///
/// Words that end up empty are dropped.
pub fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|word| {
            word.to_lowercase()
                .chars()
                .filter(|c| c.is_alphanumeric() || *c == '_')
                .collect::<String>()
        })
        .filter(|word| !word.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_tokenize_strips_punctuation() {
        assert_eq!(
            tokenize("Green Tea, 250g (loose-leaf)!"),
            vec!["green", "tea", "250g", "looseleaf"]
        );
    }

    #[test]
    fn test_tokenize_keeps_unicode_letters() {
        assert_eq!(tokenize("Müsli  Crème_brûlée"), vec!["müsli", "crème_brûlée"]);
    }

    #[test]
    fn test_punctuation_only_words_dropped() {
        assert_eq!(tokenize("a - b !!"), vec!["a", "b"]);
        assert!(tokenize("   ").is_empty());
    }
}
