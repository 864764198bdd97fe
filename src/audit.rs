//! Append-only JSONL cycle log, one file per endpoint per day.
//!
//! Records what each cycle did (request context, result or error, duration)
//! under `<log_dir>/<endpoint>_<YYYY-MM-DD>.jsonl`.
//! Logging is strictly best-effort: a write failure is reported through
//! tracing and never aborts the cycle that produced the record.

use chrono::{Local, Utc};
use serde::Serialize;
use std::fs::OpenOptions;
use std::io::Write;
use std::path::{Path, PathBuf};
use tracing::warn;

/// Longest value carried verbatim in a record; the rest is elided.
const MAX_FIELD_LEN: usize = 500;

/// One logged cycle or request.
#[derive(Debug, Clone, Serialize, Default)]
pub struct CycleRecord {
    pub timestamp: String,
    pub endpoint: String,
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<String>,
    pub duration_ms: u64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<serde_json::Value>,
}

impl CycleRecord {
    pub fn new(endpoint: &str) -> Self {
        Self {
            timestamp: Utc::now().to_rfc3339(),
            endpoint: endpoint.to_string(),
            ..Self::default()
        }
    }
}

/// Writer for per-endpoint day files.
#[derive(Debug, Clone)]
pub struct AuditLog {
    dir: PathBuf,
}

impl AuditLog {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        let dir = dir.into();
        if let Err(e) = std::fs::create_dir_all(&dir) {
            warn!("could not create log dir {}: {e}", dir.display());
        }
        Self { dir }
    }

    /// Append one record. Never fails the caller.
    pub fn record(&self, record: &CycleRecord) {
        let mut record = record.clone();
        if let Some(err) = record.error.take() {
            record.error = Some(truncate(&err, MAX_FIELD_LEN));
        }

        let path = self.file_path(&record.endpoint);
        if let Err(e) = append_line(&path, &record) {
            warn!("failed to write cycle log {}: {e}", path.display());
        }
    }

    fn file_path(&self, endpoint: &str) -> PathBuf {
        let sanitized = endpoint.trim_matches('/').replace('/', "-");
        let date = Local::now().format("%Y-%m-%d");
        self.dir.join(format!("{sanitized}_{date}.jsonl"))
    }
}

fn append_line(path: &Path, record: &CycleRecord) -> std::io::Result<()> {
    let json = serde_json::to_string(record)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
    let mut file = OpenOptions::new().create(true).append(true).open(path)?;
    writeln!(file, "{json}")
}

/// Elide long values, keeping records greppable.
pub fn truncate(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    // Cut at a char boundary at or below max.
    let mut end = max;
    while !s.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}... [{} more]", &s[..end], s.len() - end)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_record_appends_jsonl_per_endpoint_and_day() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());

        let mut rec = CycleRecord::new("update-rate");
        rec.success = true;
        rec.status = Some(200);
        rec.duration_ms = 1234;
        log.record(&rec);
        log.record(&rec);

        let date = Local::now().format("%Y-%m-%d");
        let path = dir.path().join(format!("update-rate_{date}.jsonl"));
        let contents = std::fs::read_to_string(&path).unwrap();
        let lines: Vec<&str> = contents.lines().collect();
        assert_eq!(lines.len(), 2);

        let parsed: serde_json::Value = serde_json::from_str(lines[0]).unwrap();
        assert_eq!(parsed["endpoint"], "update-rate");
        assert_eq!(parsed["status"], 200);
        assert_eq!(parsed["duration_ms"], 1234);
    }

    #[test]
    fn test_endpoint_path_sanitization() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());
        let path = log.file_path("/api/update-rate");
        let name = path.file_name().unwrap().to_str().unwrap();
        assert!(name.starts_with("api-update-rate_"));
        assert!(name.ends_with(".jsonl"));
    }

    #[test]
    fn test_long_errors_are_truncated() {
        let dir = tempfile::tempdir().unwrap();
        let log = AuditLog::new(dir.path());

        let mut rec = CycleRecord::new("scrape");
        rec.error = Some("x".repeat(2_000));
        rec.error_kind = Some("NavigationTimeout".into());
        log.record(&rec);

        let date = Local::now().format("%Y-%m-%d");
        let contents =
            std::fs::read_to_string(dir.path().join(format!("scrape_{date}.jsonl"))).unwrap();
        let parsed: serde_json::Value = serde_json::from_str(contents.trim()).unwrap();
        let err = parsed["error"].as_str().unwrap();
        assert!(err.contains("... [1500 more]"));
        assert_eq!(parsed["error_kind"], "NavigationTimeout");
    }

    #[test]
    fn test_truncate_short_strings_untouched() {
        assert_eq!(truncate("hello", 500), "hello");
        assert_eq!(truncate("", 10), "");
    }

    #[test]
    fn test_truncate_respects_char_boundaries() {
        let s = "precio móvil en Bs"; // multibyte at index 9
        let out = truncate(s, 9);
        assert!(out.starts_with("precio m"));
        assert!(out.contains("more]"));
    }

    #[test]
    fn test_write_failure_does_not_panic() {
        // Point at a path that cannot be a directory.
        let log = AuditLog::new("/dev/null/not-a-dir");
        let rec = CycleRecord::new("scrape");
        log.record(&rec); // must only warn
    }
}
