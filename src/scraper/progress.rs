//! Human-readable progress reporting
//!
//! Progress messages are separate from `tracing` output: they are the
//! operator-facing status lines a CLI prints, or a caller collects.

use chrono::{TimeZone, Utc};
use std::fmt;
use std::sync::Arc;

type ProgressFn = dyn Fn(&str) + Send + Sync;

/// Receiver for progress messages
///
/// Without a callback, messages are written to stdout.
#[derive(Clone, Default)]
pub struct ProgressSink {
    callback: Option<Arc<ProgressFn>>,
}

impl ProgressSink {
    /// Sink that prints every message on its own line
    pub fn console() -> Self {
        Self::default()
    }

    pub fn new<F>(callback: F) -> Self
    where
        F: Fn(&str) + Send + Sync + 'static,
    {
        Self {
            callback: Some(Arc::new(callback)),
        }
    }

    pub fn emit(&self, message: impl AsRef<str>) {
        match &self.callback {
            Some(callback) => callback(message.as_ref()),
            None => println!("{}", message.as_ref()),
        }
    }
}

impl fmt::Debug for ProgressSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProgressSink")
            .field("callback", &self.callback.is_some())
            .finish()
    }
}

/// Status line emitted after each processed batch
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchProgress {
    pub batch: u64,
    pub fetched: usize,
    pub matched: usize,
    pub new_this_run: u64,
    pub total_stored: u64,
    pub cursor: Option<i64>,
}

impl fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let before = self
            .cursor
            .map(format_timestamp)
            .unwrap_or_else(|| "now".to_string());

        write!(
            f,
            "Batch {}: {} fetched, {} matched ({}), {} new. Total: {}. Before: {}",
            self.batch,
            self.fetched,
            self.matched,
            format_percentage(self.matched as u64, self.fetched as u64),
            self.new_this_run,
            format_number(self.total_stored),
            before
        )
    }
}

/// Formats a Unix timestamp as `YYYY-MM-DD HH:MM:SS` (UTC)
pub fn format_timestamp(timestamp: i64) -> String {
    match Utc.timestamp_opt(timestamp, 0).single() {
        Some(dt) => dt.format("%Y-%m-%d %H:%M:%S").to_string(),
        None => timestamp.to_string(),
    }
}

/// Formats a count with thousands separators
pub fn format_number(n: u64) -> String {
    let digits = n.to_string();
    let mut out = String::with_capacity(digits.len() + digits.len() / 3);
    for (i, c) in digits.chars().enumerate() {
        if i > 0 && (digits.len() - i) % 3 == 0 {
            out.push(',');
        }
        out.push(c);
    }
    out
}

/// Formats `part / whole` as a percentage with one decimal
pub fn format_percentage(part: u64, whole: u64) -> String {
    if whole == 0 {
        return "0.0%".to_string();
    }
    format!("{:.1}%", part as f64 / whole as f64 * 100.0)
}
