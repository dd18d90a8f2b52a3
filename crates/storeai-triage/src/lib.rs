//! Offline triage driver. Reads exported store reviews, compares the published
//! replies against the assistants through the deployed handlers, and mails
//! the rows the temporary knowledge base still cannot answer.

pub mod client;
pub mod pipeline;
pub mod prompts;

use std::path::{Path, PathBuf};

use serde::Serialize;
use storeai_contracts::FeedbackRow;
use thiserror::Error;

pub use client::HandlerClient;
pub use pipeline::{RowOutcome, TriageRunner, TriageSettings};

#[derive(Debug, Error)]
pub enum TriageError {
    #[error("read {path} failed: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("parse feedback failed: {0}")]
    Parse(String),
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{route} answered {status_code}/{return_code}: {message}")]
    Handler {
        route: String,
        status_code: u16,
        return_code: String,
        message: String,
    },
    #[error("invalid handler response: {0}")]
    InvalidResponse(String),
    #[error("unusable model output: {0}")]
    ModelOutput(String),
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct TriageSummary {
    pub processed: usize,
    pub skipped: usize,
    pub consistent: usize,
    pub issues: usize,
    pub exportable: Vec<usize>,
    pub mailed: bool,
}

/// Feedback rows from a JSON array, dropping rows without a platform,
/// comment or user reply.
pub fn load_feedback(path: &Path) -> Result<Vec<FeedbackRow>, TriageError> {
    let text = std::fs::read_to_string(path).map_err(|source| TriageError::Io {
        path: path.to_path_buf(),
        source,
    })?;
    let rows: Vec<FeedbackRow> =
        serde_json::from_str(&text).map_err(|e| TriageError::Parse(e.to_string()))?;
    Ok(rows.into_iter().filter(is_complete).collect())
}

fn is_complete(row: &FeedbackRow) -> bool {
    [&row.platform, &row.comment, &row.user_reply]
        .iter()
        .all(|field| field.as_deref().is_some_and(|v| !v.trim().is_empty()))
}

/// The `[skip, skip + limit)` window of `rows`, clamped to its length.
pub fn select_rows(rows: &[FeedbackRow], skip: usize, limit: Option<usize>) -> &[FeedbackRow] {
    let start = skip.min(rows.len());
    let end = match limit {
        Some(limit) => start.saturating_add(limit).min(rows.len()),
        None => rows.len(),
    };
    &rows[start..end]
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    fn rows(n: usize) -> Vec<FeedbackRow> {
        (0..n)
            .map(|i| FeedbackRow {
                title: Some(format!("t{i}")),
                ..FeedbackRow::default()
            })
            .collect()
    }

    #[test]
    fn load_feedback_drops_incomplete_rows() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(
            file,
            r#"[
                {{"ReviewID": 1, "Title": "a", "Comment": "c", "Platform": "iOS", "UserReply": "r", "Rating": 5}},
                {{"ReviewID": 2, "Title": "b", "Comment": "c", "Platform": null, "UserReply": "r"}},
                {{"ReviewID": 3, "Title": "c", "Comment": " ", "Platform": "android", "UserReply": "r"}},
                {{"ReviewID": 4, "Title": "d", "Comment": "c", "Platform": "android"}}
            ]"#
        )
        .unwrap();

        let loaded = load_feedback(file.path()).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].review_id, serde_json::json!(1));
    }

    #[test]
    fn load_feedback_reports_bad_json() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not json").unwrap();
        assert!(matches!(
            load_feedback(file.path()),
            Err(TriageError::Parse(_))
        ));
    }

    #[test]
    fn select_rows_clamps_window() {
        let all = rows(5);
        assert_eq!(select_rows(&all, 1, Some(3)).len(), 3);
        assert_eq!(select_rows(&all, 1, Some(3))[0].title.as_deref(), Some("t1"));
        assert_eq!(select_rows(&all, 4, Some(10)).len(), 1);
        assert!(select_rows(&all, 9, None).is_empty());
        assert_eq!(select_rows(&all, 0, None).len(), 5);
    }
}
