//! State module for tracking crawl progress
//!
//! # Components
//!
//! - `RunStatus` / `RunState`: lifecycle of a whole crawl run
//! - `Link`: an entry of the shared link table
//! - `LinkState` / `SkipReason`: outcome of processing a single link

mod link_state;
mod run_state;

pub use link_state::{Link, LinkState, SkipReason};
pub use run_state::{RunState, RunStatus};
