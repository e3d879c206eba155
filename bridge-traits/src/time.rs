//! Time and Logging Abstractions
//!
//! Injectable time source (used for load-time measurement of `firstFrame`)
//! and the sink through which structured logs reach the host console.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

use crate::{error::Result, platform::PlatformSendSync};

/// Time source trait
///
/// Abstracts wall-clock time so load timings can be asserted in tests.
pub trait Clock: PlatformSendSync {
    /// Get current UTC time
    fn now(&self) -> DateTime<Utc>;

    /// Get current Unix timestamp in milliseconds
    fn unix_timestamp_millis(&self) -> i64 {
        self.now().timestamp_millis()
    }

    /// Milliseconds elapsed since `since`, clamped at zero.
    fn millis_since(&self, since: DateTime<Utc>) -> u64 {
        (self.now() - since).num_milliseconds().max(0) as u64
    }
}

/// System clock implementation using actual system time
#[derive(Debug, Clone, Default)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Log level
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
pub enum LogLevel {
    Trace,
    Debug,
    Info,
    Warn,
    Error,
}

impl LogLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            LogLevel::Trace => "TRACE",
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        }
    }
}

/// Structured log entry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogEntry {
    pub level: LogLevel,
    pub timestamp: DateTime<Utc>,
    /// Target module/component
    pub target: String,
    pub message: String,
    /// Structured fields (`item_index`, `provider`, `code`, ...)
    pub fields: HashMap<String, String>,
}

impl LogEntry {
    pub fn new(level: LogLevel, target: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            level,
            timestamp: Utc::now(),
            target: target.into(),
            message: message.into(),
            fields: HashMap::new(),
        }
    }

    pub fn with_field(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.fields.insert(key.into(), value.into());
        self
    }
}

/// Logger sink trait
///
/// Forwards structured logs from the core to the host (the browser console,
/// a remote diagnostics endpoint, a test recorder).
///
/// Implementations should not log media URLs verbatim: signed CDN URLs carry
/// credentials in their query strings.
#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
pub trait LoggerSink: PlatformSendSync {
    /// Forward a log entry to the host logging system
    async fn log(&self, entry: LogEntry) -> Result<()>;

    /// Flush any buffered logs
    async fn flush(&self) -> Result<()> {
        Ok(())
    }

    /// Logs below this level are filtered out at the source.
    fn min_level(&self) -> LogLevel {
        LogLevel::Info
    }
}

/// Console logger for development builds
#[derive(Debug, Clone)]
pub struct ConsoleLogger {
    pub min_level: LogLevel,
}

impl Default for ConsoleLogger {
    fn default() -> Self {
        Self {
            min_level: LogLevel::Info,
        }
    }
}

#[cfg_attr(target_arch = "wasm32", async_trait::async_trait(?Send))]
#[cfg_attr(not(target_arch = "wasm32"), async_trait::async_trait)]
impl LoggerSink for ConsoleLogger {
    async fn log(&self, entry: LogEntry) -> Result<()> {
        if entry.level >= self.min_level {
            let mut fields: Vec<_> = entry.fields.iter().collect();
            fields.sort();
            let rendered: Vec<String> = fields
                .into_iter()
                .map(|(key, value)| format!("{key}={value}"))
                .collect();

            println!(
                "[{}] {} {}: {} {}",
                entry.timestamp.format("%H:%M:%S%.3f"),
                entry.level.as_str(),
                entry.target,
                entry.message,
                rendered.join(" ")
            );
        }
        Ok(())
    }

    fn min_level(&self) -> LogLevel {
        self.min_level
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;

    struct FixedClock(DateTime<Utc>);

    impl Clock for FixedClock {
        fn now(&self) -> DateTime<Utc> {
            self.0
        }
    }

    #[test]
    fn millis_since_measures_elapsed_time() {
        let start = Utc::now();
        let clock = FixedClock(start + Duration::milliseconds(750));
        assert_eq!(clock.millis_since(start), 750);
    }

    #[test]
    fn millis_since_never_goes_negative() {
        let start = Utc::now();
        let clock = FixedClock(start - Duration::seconds(1));
        assert_eq!(clock.millis_since(start), 0);
    }

    #[test]
    fn log_entry_collects_fields() {
        let entry = LogEntry::new(LogLevel::Warn, "core_playback", "decode retry")
            .with_field("attempt", "2")
            .with_field("code", "3");

        assert_eq!(entry.level, LogLevel::Warn);
        assert_eq!(entry.fields.get("attempt"), Some(&"2".to_string()));
        assert_eq!(entry.fields.len(), 2);
    }

    #[tokio::test]
    async fn console_logger_accepts_entries() {
        let logger = ConsoleLogger {
            min_level: LogLevel::Debug,
        };
        let entry = LogEntry::new(LogLevel::Info, "test", "Test log");
        logger.log(entry).await.unwrap();
        assert_eq!(logger.min_level(), LogLevel::Debug);
    }
}
