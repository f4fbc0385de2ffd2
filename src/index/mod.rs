//! Search over crawled content
//!
//! Two independent indexes live here: a BM25 inverted index over stored
//! field values (`search`) and a q-gram index over an entity dictionary
//! (`suggest`). Both are cached in an [`IndexCache`] owned by the caller.

pub mod cache;
pub mod formula;
pub mod inverted;
pub mod ped;
pub mod qgram;
pub mod service;
mod tokenize;

pub use cache::IndexCache;
pub use formula::{evaluate_formula, Formula, FormulaError};
pub use inverted::{Bm25Params, InvertedIndex, Posting};
pub use ped::prefix_edit_distance;
pub use qgram::{Entity, QGramIndex, QGramMatch};
pub use service::{SearchHit, SearchResults, SearchService, Suggestion};
pub use tokenize::tokenize;
