use indicatif::HumanBytes;
use serde::Serialize;
use std::fmt;
use std::path::PathBuf;

use crate::error::{FetchError, SyncError};

/// One job: fetch `url` and store it at `path`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchRequest {
    pub url: String,
    pub path: PathBuf,
    /// Expected SHA-256 (hex) of a freshly downloaded body.
    pub sha256: Option<String>,
}

impl FetchRequest {
    pub fn new(url: impl Into<String>, path: impl Into<PathBuf>) -> Self {
        Self {
            url: url.into(),
            path: path.into(),
            sha256: None,
        }
    }

    pub fn with_sha256(mut self, sha256: Option<String>) -> Self {
        self.sha256 = sha256;
        self
    }
}

/// Zips co-indexed url and path sequences into requests.
pub fn pair_requests(urls: Vec<String>, paths: Vec<PathBuf>) -> Result<Vec<FetchRequest>, SyncError> {
    if urls.len() != paths.len() {
        return Err(SyncError::InputMismatch {
            urls: urls.len(),
            paths: paths.len(),
        });
    }
    Ok(urls
        .into_iter()
        .zip(paths)
        .map(|(url, path)| FetchRequest::new(url, path))
        .collect())
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    AlreadyExists,
}

#[derive(Debug)]
pub enum FetchState {
    Downloaded { bytes: u64 },
    Skipped(SkipReason),
    Failed(FetchError),
}

#[derive(Debug)]
pub struct FetchOutcome {
    pub index: usize,
    pub url: String,
    pub path: PathBuf,
    pub state: FetchState,
}

impl FetchOutcome {
    pub fn new(index: usize, request: FetchRequest, state: FetchState) -> Self {
        Self {
            index,
            url: request.url,
            path: request.path,
            state,
        }
    }

    pub fn is_downloaded(&self) -> bool {
        matches!(self.state, FetchState::Downloaded { .. })
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self.state, FetchState::Skipped(_))
    }

    pub fn is_failed(&self) -> bool {
        matches!(self.state, FetchState::Failed(_))
    }

    /// Human-readable failure reason, `None` unless the fetch failed.
    pub fn reason(&self) -> Option<String> {
        match &self.state {
            FetchState::Failed(e) => Some(e.to_string()),
            _ => None,
        }
    }

    pub fn record(&self) -> OutcomeRecord {
        let (state, bytes, error_kind) = match &self.state {
            FetchState::Downloaded { bytes } => ("downloaded", Some(*bytes), None),
            FetchState::Skipped(SkipReason::AlreadyExists) => ("skipped", None, None),
            FetchState::Failed(e) => ("failed", None, Some(e.kind())),
        };
        OutcomeRecord {
            index: self.index,
            url: self.url.clone(),
            path: self.path.display().to_string(),
            state,
            bytes,
            error_kind,
            reason: self.reason(),
        }
    }
}

impl fmt::Display for FetchOutcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let path = self.path.display();
        match &self.state {
            FetchState::Downloaded { bytes } => {
                write!(f, "[{:03}] download : {} ({})", self.index, path, HumanBytes(*bytes))
            }
            FetchState::Skipped(SkipReason::AlreadyExists) => {
                write!(f, "[{:03}] skip     : {} (already exists)", self.index, path)
            }
            FetchState::Failed(FetchError::HttpStatus { code, text }) => {
                write!(f, "[{:03}] failed   : {} ({} {})", self.index, path, code, text)
            }
            FetchState::Failed(e) => write!(f, "[{:03}] failed   : {} ({})", self.index, path, e),
        }
    }
}

/// Serializable view of an outcome for the JSON report.
#[derive(Debug, Serialize)]
pub struct OutcomeRecord {
    pub index: usize,
    pub url: String,
    pub path: String,
    pub state: &'static str,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub bytes: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<&'static str>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

/// Counts per final state.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct Summary {
    pub downloaded: usize,
    pub skipped: usize,
    pub failed: usize,
    pub bytes: u64,
}

impl Summary {
    pub fn of(outcomes: &[FetchOutcome]) -> Self {
        let mut summary = Summary::default();
        for outcome in outcomes {
            match &outcome.state {
                FetchState::Downloaded { bytes } => {
                    summary.downloaded += 1;
                    summary.bytes += bytes;
                }
                FetchState::Skipped(_) => summary.skipped += 1,
                FetchState::Failed(_) => summary.failed += 1,
            }
        }
        summary
    }

    pub fn total(&self) -> usize {
        self.downloaded + self.skipped + self.failed
    }
}

impl fmt::Display for Summary {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Summary: Files: {} | Downloaded: {} ({}) | Skipped: {} | Failed: {}",
            self.total(),
            self.downloaded,
            HumanBytes(self.bytes),
            self.skipped,
            self.failed
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pair_requests_keeps_index_alignment() {
        let requests = pair_requests(
            vec!["http://h/a".into(), "http://h/b".into()],
            vec![PathBuf::from("a"), PathBuf::from("b")],
        )
        .unwrap();
        assert_eq!(requests[0], FetchRequest::new("http://h/a", "a"));
        assert_eq!(requests[1], FetchRequest::new("http://h/b", "b"));
    }

    #[test]
    fn pair_requests_rejects_length_mismatch() {
        let err = pair_requests(
            vec!["http://h/a".into(), "http://h/b".into(), "http://h/c".into()],
            vec![PathBuf::from("a"), PathBuf::from("b")],
        )
        .unwrap_err();
        assert!(matches!(err, SyncError::InputMismatch { urls: 3, paths: 2 }));
    }

    #[test]
    fn display_lines() {
        let req = FetchRequest::new("http://h/a", "dl/a.txt");
        let skipped = FetchOutcome::new(1, req.clone(), FetchState::Skipped(SkipReason::AlreadyExists));
        assert_eq!(skipped.to_string(), "[001] skip     : dl/a.txt (already exists)");

        let failed = FetchOutcome::new(
            12,
            req,
            FetchState::Failed(FetchError::HttpStatus { code: 404, text: "Not Found" }),
        );
        assert_eq!(failed.to_string(), "[012] failed   : dl/a.txt (404 Not Found)");
        assert_eq!(failed.reason().as_deref(), Some("Not Found"));
    }

    #[test]
    fn record_serializes_without_empty_fields() {
        let req = FetchRequest::new("http://h/a", "a");
        let outcome = FetchOutcome::new(0, req, FetchState::Downloaded { bytes: 5 });
        let json = serde_json::to_value(outcome.record()).unwrap();
        assert_eq!(json["state"], "downloaded");
        assert_eq!(json["bytes"], 5);
        assert!(json.get("reason").is_none());
    }

    #[test]
    fn summary_counts_each_state() {
        let req = FetchRequest::new("http://h/a", "a");
        let outcomes = vec![
            FetchOutcome::new(0, req.clone(), FetchState::Downloaded { bytes: 10 }),
            FetchOutcome::new(1, req.clone(), FetchState::Skipped(SkipReason::AlreadyExists)),
            FetchOutcome::new(2, req, FetchState::Failed(FetchError::Network("reset".into()))),
        ];
        let summary = Summary::of(&outcomes);
        assert_eq!(
            summary,
            Summary { downloaded: 1, skipped: 1, failed: 1, bytes: 10 }
        );
        assert_eq!(summary.total(), 3);
    }
}
