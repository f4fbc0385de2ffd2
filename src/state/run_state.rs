use chrono::{DateTime, Utc};
use std::fmt;

/// Lifecycle status of a crawl run
///
/// `New → Running → Completed` on a natural finish, or `Running → Exit`
/// when an external actor asks the run to stop. Workers re-read the
/// status before every link and stop taking work once it is `Exit`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RunStatus {
    New,
    Running,
    Completed,
    Exit,
    Paused,
}

impl RunStatus {
    /// Returns true once the run will not process further links
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Completed | Self::Exit)
    }

    /// Converts the status to its database string representation
    pub fn to_db_string(&self) -> &'static str {
        match self {
            Self::New => "new",
            Self::Running => "running",
            Self::Completed => "completed",
            Self::Exit => "exit",
            Self::Paused => "paused",
        }
    }

    /// Parses a status from its database string representation
    ///
    /// Returns None if the string doesn't match any known status.
    pub fn from_db_string(s: &str) -> Option<Self> {
        match s {
            "new" => Some(Self::New),
            "running" => Some(Self::Running),
            "completed" => Some(Self::Completed),
            "exit" => Some(Self::Exit),
            "paused" => Some(Self::Paused),
            _ => None,
        }
    }
}

impl fmt::Display for RunStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.to_db_string())
    }
}

/// Snapshot of a run as held by the run status store
#[derive(Debug, Clone, PartialEq)]
pub struct RunState {
    pub status: RunStatus,
    pub collected_documents: u64,
    pub created_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new() -> Self {
        Self {
            status: RunStatus::New,
            collected_documents: 0,
            created_at: Utc::now(),
            completed_at: None,
        }
    }
}

impl Default for RunState {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_db_string_roundtrip() {
        for status in [
            RunStatus::New,
            RunStatus::Running,
            RunStatus::Completed,
            RunStatus::Exit,
            RunStatus::Paused,
        ] {
            assert_eq!(
                RunStatus::from_db_string(status.to_db_string()),
                Some(status)
            );
        }
        assert_eq!(RunStatus::from_db_string("bogus"), None);
    }

    #[test]
    fn test_finished_states() {
        assert!(RunStatus::Completed.is_finished());
        assert!(RunStatus::Exit.is_finished());
        assert!(!RunStatus::Running.is_finished());
        assert!(!RunStatus::Paused.is_finished());
    }

    #[test]
    fn test_new_run_state() {
        let state = RunState::new();
        assert_eq!(state.status, RunStatus::New);
        assert_eq!(state.collected_documents, 0);
        assert!(state.completed_at.is_none());
    }
}
