//! Integration tests for search and suggestions over stored field values

use scrapedex::config::IndexerConfig;
use scrapedex::index::{SearchService, Suggestion};
use scrapedex::storage::{DocumentStore, FieldValueSource, NewFieldValue, RunStatusStore, SqliteStorage};
use scrapedex::IndexCache;
use std::collections::HashMap;
use std::sync::Arc;
use tempfile::TempDir;

struct Product<'a> {
    title: &'a str,
    rating: &'a str,
}

const PRODUCTS: &[Product<'static>] = &[
    Product {
        title: "Sencha green tea",
        rating: "4.0",
    },
    Product {
        title: "Assam black tea",
        rating: "3.0",
    },
    Product {
        title: "Espresso coffee beans",
        rating: "5.0",
    },
    Product {
        title: "Chamomile herbal infusion",
        rating: "n/a",
    },
];

/// Stores every product as one document with a title and a rating value
fn seeded_storage(dir: &TempDir) -> Arc<SqliteStorage> {
    let storage = SqliteStorage::new(&dir.path().join("search.db")).expect("Failed to open storage");
    let run_id = storage.create_run("search").unwrap();

    for (i, product) in PRODUCTS.iter().enumerate() {
        let url = format!("https://shop.test/item/{}", i);
        let path = format!("shop.test/item/{}", i);
        let values: Vec<NewFieldValue> = [
            ("title", None, product.title),
            ("rating", Some("rating"), product.rating),
        ]
        .into_iter()
        .map(|(field, variable, value)| NewFieldValue {
            document_id: 0,
            run_id,
            field_name: field,
            variable_name: variable,
            url: &url,
            link_path: &path,
            attribute: "text",
            value,
        })
        .collect();

        storage
            .create_document_with_values(&format!("hash-{}", i), run_id, &values)
            .unwrap();
    }

    Arc::new(storage)
}

fn indexer(dictionary: Option<String>) -> IndexerConfig {
    IndexerConfig {
        name: "products".to_string(),
        fields: vec!["title".to_string()],
        k: 1.75,
        b: 0.75,
        small_words_threshold: 2,
        skip_words: vec!["beans".to_string()],
        weight_words: HashMap::new(),
        boosting_formula: None,
        dictionary,
        q: 3,
        use_synonyms: true,
        suggest_delta: 1,
    }
}

#[test]
fn test_search_over_stored_values() {
    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir);
    let service = SearchService::new(Arc::new(IndexCache::new()), storage);

    let results = service.search(&indexer(None), "green tea").unwrap();
    assert_eq!(results.keywords, vec!["green", "tea"]);

    let ids: Vec<i64> = results.hits.iter().map(|h| h.document_id).collect();
    assert_eq!(ids.len(), 2);
    let top = &results.hits[0];
    assert!(top
        .values
        .contains(&("title".to_string(), "Sencha green tea".to_string())));
    assert!(top.score > results.hits[1].score);

    // Skipped words are not indexed
    let results = service.search(&indexer(None), "beans").unwrap();
    assert!(results.hits.is_empty());
}

#[test]
fn test_search_reuses_cached_index() {
    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir);
    let cache = Arc::new(IndexCache::new());
    let service = SearchService::new(Arc::clone(&cache), Arc::clone(&storage) as Arc<dyn FieldValueSource>);

    let first = service.build_index(&indexer(None)).unwrap();
    assert_eq!(first.document_count(), 4);

    // Deleting values leaves the cached index alone until a rebuild
    storage.soft_delete_run_values(1).unwrap();
    let cached = service.build_index(&indexer(None)).unwrap();
    assert!(Arc::ptr_eq(&first, &cached));
    assert_eq!(cache.cached_indexer_keys(), vec!["indexer:products"]);

    let rebuilt = service.rebuild_index(&indexer(None)).unwrap();
    assert_eq!(rebuilt.document_count(), 0);
}

#[test]
fn test_boosting_formula_uses_variables() {
    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir);
    let service = SearchService::new(Arc::new(IndexCache::new()), storage);

    let mut config = indexer(None);
    let plain = service.search(&config, "tea").unwrap();
    let base: HashMap<i64, f64> = plain.hits.iter().map(|h| (h.document_id, h.score)).collect();

    config.name = "boosted".to_string();
    config.boosting_formula = Some("rating * 10".to_string());
    let boosted = service.search(&config, "tea").unwrap();

    assert_eq!(boosted.hits.len(), 2);
    for hit in &boosted.hits {
        let rating: f64 = hit
            .values
            .iter()
            .find(|(field, _)| field == "rating")
            .map(|(_, v)| v.parse().unwrap())
            .unwrap();
        assert!((hit.score - (base[&hit.document_id] + rating * 10.0)).abs() < 1e-9);
    }
    // Sencha (4.0) now clearly beats Assam (3.0)
    assert_eq!(boosted.hits[0].values[0].1, "Sencha green tea");
}

#[test]
fn test_suggest_from_dictionary_file() {
    let dir = TempDir::new().unwrap();
    let storage = seeded_storage(&dir);
    let dictionary = dir.path().join("teas.tsv");
    std::fs::write(
        &dictionary,
        "name\tscore\tdescription\twiki\timage\tsynonyms\n\
         Sencha\t40\tJapanese green tea\t\t\tSentcha\n\
         Senbei\t10\tRice cracker\t\t\t\n\
         Assam\t30\tIndian black tea\t\t\tAssamica\n",
    )
    .unwrap();

    let service = SearchService::new(Arc::new(IndexCache::new()), storage);
    let config = indexer(Some(dictionary.display().to_string()));

    let suggestions: Vec<Suggestion> = service.suggest(&config, "Sen").unwrap();
    let names: Vec<&str> = suggestions.iter().map(|s| s.name.as_str()).collect();
    assert_eq!(names, vec!["Sencha", "Senbei"]);
    assert!(suggestions.iter().all(|s| s.ped == 0));

    let suggestions = service.suggest(&config, "assami").unwrap();
    assert_eq!(suggestions.len(), 1);
    assert_eq!(suggestions[0].name, "Assam");
    assert_eq!(suggestions[0].matched_name, "Assamica");
}
