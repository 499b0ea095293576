//! Session diagnostic sink.
//!
//! Per-URI failures are never thrown across the event loop; they are
//! recorded here and on each owner's own status. The sink is an explicit
//! value threaded through worker construction, not a process-wide
//! singleton, so tests and embedders can inspect exactly what one session
//! produced.

use std::fmt;

/// How serious a diagnostic is.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    Error,
    Warning,
    Notice,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "E"),
            Severity::Warning => write!(f, "W"),
            Severity::Notice => write!(f, "N"),
        }
    }
}

/// One recorded diagnostic.
#[derive(Debug, Clone)]
pub struct Diagnostic {
    pub severity: Severity,
    pub text: String,
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.severity, self.text)
    }
}

/// Accumulates diagnostics for one acquire session.
#[derive(Debug, Default)]
pub struct ReportSink {
    entries: Vec<Diagnostic>,
}

impl ReportSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn error(&mut self, text: impl Into<String>) {
        self.push(Severity::Error, text.into());
    }

    pub fn warning(&mut self, text: impl Into<String>) {
        self.push(Severity::Warning, text.into());
    }

    pub fn notice(&mut self, text: impl Into<String>) {
        self.push(Severity::Notice, text.into());
    }

    /// Record an OS-level failure together with its errno text.
    pub fn errno(&mut self, context: &str, err: &std::io::Error) {
        self.push(Severity::Error, format!("{context} - {err}"));
    }

    fn push(&mut self, severity: Severity, text: String) {
        match severity {
            Severity::Error => tracing::debug!(target: "acquire::report", "{text}"),
            Severity::Warning => tracing::debug!(target: "acquire::report", "{text}"),
            Severity::Notice => tracing::trace!(target: "acquire::report", "{text}"),
        }
        self.entries.push(Diagnostic { severity, text });
    }

    pub fn has_errors(&self) -> bool {
        self.entries
            .iter()
            .any(|d| d.severity == Severity::Error)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Diagnostic> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Drain all recorded diagnostics, oldest first.
    pub fn drain(&mut self) -> Vec<Diagnostic> {
        std::mem::take(&mut self.entries)
    }
}
