//! Toasts raised by services for the shopper or admin to see.

use serde::Serialize;
use std::sync::Mutex;

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Success,
    Warning,
    Error,
}

pub trait Notifier: Send + Sync {
    fn notify(&self, message: &str, severity: Severity, duration_ms: Option<u64>);
}

/// Default for headless deployments: every toast becomes a log line.
#[derive(Clone, Copy, Debug, Default)]
pub struct TracingNotifier;

impl Notifier for TracingNotifier {
    fn notify(&self, message: &str, severity: Severity, _duration_ms: Option<u64>) {
        match severity {
            Severity::Error => tracing::error!(toast = message),
            Severity::Warning => tracing::warn!(toast = message),
            Severity::Info | Severity::Success => tracing::info!(toast = message),
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct Toast {
    pub message: String,
    pub severity: Severity,
    pub duration_ms: Option<u64>,
}

/// Keeps every toast in memory.
#[derive(Debug, Default)]
pub struct RecordingNotifier {
    toasts: Mutex<Vec<Toast>>,
}

impl RecordingNotifier {
    pub fn new() -> Self { Self::default() }

    pub fn toasts(&self) -> Vec<Toast> {
        self.toasts.lock().map(|t| t.clone()).unwrap_or_default()
    }

    pub fn count(&self, severity: Severity) -> usize {
        self.toasts().iter().filter(|t| t.severity == severity).count()
    }
}

impl Notifier for RecordingNotifier {
    fn notify(&self, message: &str, severity: Severity, duration_ms: Option<u64>) {
        if let Ok(mut toasts) = self.toasts.lock() {
            toasts.push(Toast { message: message.to_string(), severity, duration_ms });
        }
    }
}
