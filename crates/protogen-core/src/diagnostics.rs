//! Operator-facing build messages
//!
//! Every accumulated build error and every plugin version warning is
//! reported here, separately from `tracing` logs, so the outcome of a run is
//! visible even with logging turned down.

use std::sync::Mutex;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DiagnosticLevel {
    Error,
    Warning,
    Info,
}

impl DiagnosticLevel {
    fn label(self) -> &'static str {
        match self {
            DiagnosticLevel::Error => "error",
            DiagnosticLevel::Warning => "warning",
            DiagnosticLevel::Info => "info",
        }
    }

    /// ANSI colour code for the label
    fn colour(self) -> u8 {
        match self {
            DiagnosticLevel::Error => 31,
            DiagnosticLevel::Warning => 33,
            DiagnosticLevel::Info => 34,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Diagnostic {
    pub level: DiagnosticLevel,
    pub message: String,
}

impl Diagnostic {
    pub fn new(level: DiagnosticLevel, message: impl Into<String>) -> Self {
        Self {
            level,
            message: message.into(),
        }
    }

    pub fn error(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Error, message)
    }

    pub fn warning(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Warning, message)
    }

    pub fn info(message: impl Into<String>) -> Self {
        Self::new(DiagnosticLevel::Info, message)
    }
}

/// Sink for build messages
///
/// Implementors only store and emit; the counters are derived from
/// [`DiagnosticHandler::diagnostics`].
pub trait DiagnosticHandler: Send + Sync {
    fn report(&self, diagnostic: Diagnostic);

    /// Everything reported so far, in order
    fn diagnostics(&self) -> Vec<Diagnostic>;

    fn error(&self, message: &str) {
        self.report(Diagnostic::error(message));
    }

    fn warning(&self, message: &str) {
        self.report(Diagnostic::warning(message));
    }

    fn info(&self, message: &str) {
        self.report(Diagnostic::info(message));
    }

    fn count(&self, level: DiagnosticLevel) -> usize {
        self.diagnostics()
            .iter()
            .filter(|d| d.level == level)
            .count()
    }

    fn error_count(&self) -> usize {
        self.count(DiagnosticLevel::Error)
    }

    fn warning_count(&self) -> usize {
        self.count(DiagnosticLevel::Warning)
    }

    fn has_errors(&self) -> bool {
        self.error_count() > 0
    }
}

/// Append-only message store shared by the handlers
#[derive(Debug, Default)]
struct MessageLog(Mutex<Vec<Diagnostic>>);

impl MessageLog {
    fn push(&self, diagnostic: Diagnostic) {
        if let Ok(mut log) = self.0.lock() {
            log.push(diagnostic);
        }
    }

    fn snapshot(&self) -> Vec<Diagnostic> {
        self.0.lock().map(|log| log.clone()).unwrap_or_default()
    }
}

/// Writes every message to stderr as `level: message`
pub struct ConsoleDiagnosticHandler {
    log: MessageLog,
    colour: bool,
}

impl ConsoleDiagnosticHandler {
    pub fn new(colour: bool) -> Self {
        Self {
            log: MessageLog::default(),
            colour,
        }
    }

    fn format(&self, diagnostic: &Diagnostic) -> String {
        let label = diagnostic.level.label();
        if self.colour {
            format!(
                "\x1b[{}m{}\x1b[0m: {}",
                diagnostic.level.colour(),
                label,
                diagnostic.message
            )
        } else {
            format!("{}: {}", label, diagnostic.message)
        }
    }
}

impl DiagnosticHandler for ConsoleDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        eprintln!("{}", self.format(&diagnostic));
        self.log.push(diagnostic);
    }

    fn diagnostics(&self) -> Vec<Diagnostic> {
        self.log.snapshot()
    }
}

/// Keeps messages in memory without printing them
#[derive(Default)]
pub struct CollectingDiagnosticHandler {
    log: MessageLog,
}

impl CollectingDiagnosticHandler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Messages reported at the given level, in order
    pub fn messages(&self, level: DiagnosticLevel) -> Vec<String> {
        self.log
            .snapshot()
            .into_iter()
            .filter(|d| d.level == level)
            .map(|d| d.message)
            .collect()
    }
}

impl DiagnosticHandler for CollectingDiagnosticHandler {
    fn report(&self, diagnostic: Diagnostic) {
        self.log.push(diagnostic);
    }

    fn diagnostics(&self) -> Vec<Diagnostic> {
        self.log.snapshot()
    }
}
