//! Before-extraction actions
//!
//! Some sites need a cookie banner dismissed or a lazy list scrolled
//! before their records are visible. Actions are configured as a tagged
//! list and run in order on every page, right after it is fetched.

use crate::crawler::fetcher::PageSession;
use async_trait::async_trait;
use serde::Deserialize;
use std::time::Duration;

/// Longest pause a `wait` action may request
pub const MAX_WAIT_SECS: f64 = 3600.0;

/// Direction of a scroll step
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ScrollDirection {
    #[default]
    Down,
    Up,
}

/// One configured action
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum Action {
    /// Click the first element matching an XPath selector
    Click { selector: String },
    /// Pause for a number of seconds (at most [`MAX_WAIT_SECS`])
    Wait { seconds: f64 },
    /// Scroll one screen `times` times, letting content load in between
    Scroll {
        #[serde(default = "default_times")]
        times: u32,
        #[serde(default)]
        direction: ScrollDirection,
    },
}

fn default_times() -> u32 {
    1
}

/// Runs the configured actions against a worker's session
#[async_trait]
pub trait ActionExecutor: Send + Sync {
    /// Runs every action in order; failures are logged, never returned
    async fn run_before(&self, session: &mut dyn PageSession);
}

/// Executes actions one after another
///
/// A failing action is logged and the next one still runs.
#[derive(Debug, Clone)]
pub struct SequentialActionExecutor {
    actions: Vec<Action>,
    scroll_settle: Duration,
}

impl SequentialActionExecutor {
    pub fn new(actions: Vec<Action>) -> Self {
        Self {
            actions,
            scroll_settle: Duration::from_secs(1),
        }
    }

    /// Overrides the pause after each scroll step
    pub fn with_scroll_settle(mut self, settle: Duration) -> Self {
        self.scroll_settle = settle;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.actions.is_empty()
    }
}

#[async_trait]
impl ActionExecutor for SequentialActionExecutor {
    async fn run_before(&self, session: &mut dyn PageSession) {
        for action in &self.actions {
            match action {
                Action::Click { selector } => {
                    if let Err(e) = session.click(selector).await {
                        tracing::warn!("Click on '{}' failed: {}", selector, e);
                    }
                }
                Action::Wait { seconds } => match Duration::try_from_secs_f64(*seconds) {
                    Ok(pause) => tokio::time::sleep(pause).await,
                    Err(e) => tracing::warn!("Skipping wait of {} seconds: {}", seconds, e),
                },
                Action::Scroll { times, direction } => {
                    for _ in 0..*times {
                        if let Err(e) = session.scroll(*direction).await {
                            tracing::warn!("Scroll {:?} failed: {}", direction, e);
                            break;
                        }
                        tokio::time::sleep(self.scroll_settle).await;
                    }
                }
            }
        }
    }
}
