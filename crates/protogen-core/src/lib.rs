pub mod build;
pub mod cache;
pub mod config;
pub mod di;
pub mod diagnostics;
pub mod errors;
pub mod generator;
pub mod plugin;
pub mod process;
pub mod sources;

pub use build::{BuildFailure, BuildOutcome, BuildReport, Builder, RunState};
pub use cache::{Freshness, Manifest};
pub use config::{CliOverrides, Options, PluginPolicy, ProjectConfig};
pub use di::Container;
pub use diagnostics::{
    CollectingDiagnosticHandler, ConsoleDiagnosticHandler, Diagnostic, DiagnosticHandler,
    DiagnosticLevel,
};
pub use errors::BuildError;
pub use plugin::{PluginProvisioner, PluginState, Version, VersionRequirement};
pub use process::{CommandSpec, ExecEnv, ProcessOutput, ProcessRunner, ScriptedRunner, SystemRunner};
pub use sources::SourceSet;
