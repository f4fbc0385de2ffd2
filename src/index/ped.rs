//! Prefix edit distance

/// Smallest edit distance between `x` and any prefix of `y`, bounded by
/// `delta`
///
/// Only prefixes of `y` up to `|x| + delta` characters can be within the
/// bound, so the table is cut there. Any distance above `delta` is
/// reported as `delta + 1`.
///
/// # Arguments
///
/// * `x` - The (normalized) query prefix
/// * `y` - The (normalized) candidate name
/// * `delta` - Largest distance of interest
pub fn prefix_edit_distance(x: &str, y: &str, delta: usize) -> usize {
    let x: Vec<char> = x.chars().collect();
    let y: Vec<char> = y.chars().collect();
    let n = x.len();
    let m = y.len().min(n + delta);

    // prev[j] = ED(x[..i-1], y[..j])
    let mut prev: Vec<usize> = (0..=m).collect();
    let mut cur = vec![0usize; m + 1];

    for i in 1..=n {
        cur[0] = i;
        for j in 1..=m {
            let substitute = prev[j - 1] + usize::from(x[i - 1] != y[j - 1]);
            cur[j] = substitute.min(prev[j] + 1).min(cur[j - 1] + 1);
        }
        std::mem::swap(&mut prev, &mut cur);
    }

    let best = prev.iter().copied().min().unwrap_or(n);
    best.min(delta + 1)
}
