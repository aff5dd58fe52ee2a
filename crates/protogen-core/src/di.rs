use crate::config::ProjectConfig;
use crate::diagnostics::{ConsoleDiagnosticHandler, DiagnosticHandler};
use crate::process::{ProcessRunner, SystemRunner};
use std::sync::Arc;

/// Shared services for a build
///
/// A [`crate::Builder`] borrows the container, so the config, the message
/// sink and the process runner are swapped in one place for tests.
pub struct Container {
    config: Arc<ProjectConfig>,
    diagnostic_handler: Arc<dyn DiagnosticHandler>,
    runner: Arc<dyn ProcessRunner>,
}

impl Container {
    /// Console diagnostics and real child processes
    pub fn new(config: ProjectConfig, colour: bool) -> Self {
        Self::with_dependencies(
            config,
            Arc::new(ConsoleDiagnosticHandler::new(colour)),
            Arc::new(SystemRunner::new()),
        )
    }

    /// Create a container with custom dependencies (for testing)
    pub fn with_dependencies(
        config: ProjectConfig,
        diagnostic_handler: Arc<dyn DiagnosticHandler>,
        runner: Arc<dyn ProcessRunner>,
    ) -> Self {
        Self {
            config: Arc::new(config),
            diagnostic_handler,
            runner,
        }
    }

    /// Get the configuration
    pub fn config(&self) -> &Arc<ProjectConfig> {
        &self.config
    }

    /// Get the diagnostic handler
    pub fn diagnostic_handler(&self) -> &Arc<dyn DiagnosticHandler> {
        &self.diagnostic_handler
    }

    /// Get the process runner
    pub fn runner(&self) -> &Arc<dyn ProcessRunner> {
        &self.runner
    }

    /// Number of warnings reported so far
    pub fn warning_count(&self) -> usize {
        self.diagnostic_handler.warning_count()
    }
}
