use std::fmt;
use std::sync::Mutex;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{Level, event};

use crate::core::{InfoError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Severity {
    Information,
    Warning,
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Information => write!(f, "I"),
            Self::Warning => write!(f, "W"),
            Self::Error => write!(f, "E"),
        }
    }
}

/// One audit log record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LogEntry {
    pub severity: Severity,
    pub source: String,
    pub code: String,
    pub message: String,
    pub site_id: Option<i64>,
    pub logged_at: DateTime<Utc>,
}

/// Audit/event log sink.
pub trait EventLog: Send + Sync {
    fn log_event(&self, severity: Severity, source: &str, code: &str, message: &str) -> Result<()>;

    fn log_exception(
        &self,
        source: &str,
        code: &str,
        error: &InfoError,
        site_id: Option<i64>,
        message: &str,
    ) -> Result<()>;
}

/// Forwards entries to `tracing`.
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingEventLog;

impl EventLog for TracingEventLog {
    fn log_event(&self, severity: Severity, source: &str, code: &str, message: &str) -> Result<()> {
        match severity {
            Severity::Information => event!(Level::INFO, source, code, "{}", message),
            Severity::Warning => event!(Level::WARN, source, code, "{}", message),
            Severity::Error => event!(Level::ERROR, source, code, "{}", message),
        }
        Ok(())
    }

    fn log_exception(
        &self,
        source: &str,
        code: &str,
        error: &InfoError,
        site_id: Option<i64>,
        message: &str,
    ) -> Result<()> {
        event!(Level::ERROR, source, code, error = %error, ?site_id, "{}", message);
        Ok(())
    }
}

/// Keeps entries in memory.
#[derive(Debug, Default)]
pub struct MemoryEventLog {
    entries: Mutex<Vec<LogEntry>>,
}

impl MemoryEventLog {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn entries(&self) -> Vec<LogEntry> {
        self.entries.lock().map(|e| e.clone()).unwrap_or_default()
    }

    pub fn entries_with_code(&self, code: &str) -> Vec<LogEntry> {
        self.entries()
            .into_iter()
            .filter(|e| e.code.eq_ignore_ascii_case(code))
            .collect()
    }

    fn push(&self, severity: Severity, source: &str, code: &str, message: String, site_id: Option<i64>) -> Result<()> {
        self.entries.lock()?.push(LogEntry {
            severity,
            source: source.to_string(),
            code: code.to_string(),
            message,
            site_id,
            logged_at: Utc::now(),
        });
        Ok(())
    }
}

impl EventLog for MemoryEventLog {
    fn log_event(&self, severity: Severity, source: &str, code: &str, message: &str) -> Result<()> {
        self.push(severity, source, code, message.to_string(), None)
    }

    fn log_exception(
        &self,
        source: &str,
        code: &str,
        error: &InfoError,
        site_id: Option<i64>,
        message: &str,
    ) -> Result<()> {
        self.push(
            Severity::Error,
            source,
            code,
            format!("{}: {}", message, error),
            site_id,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_log_records_exceptions() {
        let log = MemoryEventLog::new();
        log.log_event(Severity::Information, "Clone", "CLONEOBJ", "done")
            .unwrap();
        log.log_exception(
            "cms.page",
            "INSERT",
            &InfoError::Storage("disk full".into()),
            Some(3),
            "Insert failed",
        )
        .unwrap();

        let errors = log.entries_with_code("insert");
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].site_id, Some(3));
        assert!(errors[0].message.contains("disk full"));
    }
}
