use std::time::Duration;

use storeai_contracts::{ApiErrorDetail, Run, RunStatus, VectorStoreFile, VectorStoreFileStatus};

/// Bounded polling: a fixed interval between attempts and a hard attempt cap.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub max_attempts: u32,
}

impl PollPolicy {
    pub fn new(interval_ms: u64, max_attempts: u32) -> Self {
        Self {
            interval: Duration::from_millis(interval_ms),
            max_attempts: max_attempts.max(1),
        }
    }
}

/// What a single observation of a remote resource says.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollStep {
    Done,
    Failed(String),
    Pending,
}

/// Final result of a poll loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PollOutcome {
    Completed,
    Failed(String),
    TimedOut { attempts: u32 },
}

pub fn classify_run(run: &Run) -> PollStep {
    match run.status {
        RunStatus::Completed => PollStep::Done,
        status if status.is_terminal_failure() => {
            PollStep::Failed(failure_reason(run.last_error.as_ref(), status.as_str()))
        }
        _ => PollStep::Pending,
    }
}

pub fn classify_file(file: &VectorStoreFile) -> PollStep {
    match file.status {
        VectorStoreFileStatus::Completed => PollStep::Done,
        VectorStoreFileStatus::Failed => {
            PollStep::Failed(failure_reason(file.last_error.as_ref(), "failed"))
        }
        VectorStoreFileStatus::Cancelled => {
            PollStep::Failed(failure_reason(file.last_error.as_ref(), "cancelled"))
        }
        _ => PollStep::Pending,
    }
}

/// Prefer the remote's own message, then its code, then the bare status.
pub fn failure_reason(last_error: Option<&ApiErrorDetail>, status: &str) -> String {
    last_error
        .and_then(|e| {
            e.message
                .clone()
                .filter(|m| !m.is_empty())
                .or_else(|| e.code.clone())
        })
        .unwrap_or_else(|| status.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn run(value: serde_json::Value) -> Run {
        serde_json::from_value(value).unwrap()
    }

    #[test]
    fn run_classification_covers_terminal_states() {
        assert_eq!(classify_run(&run(json!({"status": "completed"}))), PollStep::Done);
        assert_eq!(classify_run(&run(json!({"status": "queued"}))), PollStep::Pending);
        assert_eq!(
            classify_run(&run(json!({"status": "in_progress"}))),
            PollStep::Pending
        );
        assert_eq!(
            classify_run(&run(json!({
                "status": "failed",
                "last_error": {"code": "rate_limit_exceeded", "message": "quota"}
            }))),
            PollStep::Failed("quota".to_string())
        );
        assert_eq!(
            classify_run(&run(json!({"status": "expired"}))),
            PollStep::Failed("expired".to_string())
        );
    }

    #[test]
    fn file_classification_reports_last_error() {
        let file: VectorStoreFile = serde_json::from_value(json!({
            "id": "file_1",
            "status": "failed",
            "last_error": {"code": "invalid_file", "message": null}
        }))
        .unwrap();
        assert_eq!(
            classify_file(&file),
            PollStep::Failed("invalid_file".to_string())
        );
    }

    #[test]
    fn policy_never_allows_zero_attempts() {
        assert_eq!(PollPolicy::new(10, 0).max_attempts, 1);
    }
}
