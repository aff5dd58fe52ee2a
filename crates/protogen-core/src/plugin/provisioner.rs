use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use super::{extract_version, Version, VersionRequirement};
use crate::config::{PluginConfig, PluginPolicy};
use crate::diagnostics::DiagnosticHandler;
use crate::errors::BuildError;
use crate::process::{CommandSpec, ExecEnv, ProcessRunner};

/// What is known about the plugin on the current search path
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PluginState {
    Absent,
    /// Found, but the version query failed or printed nothing parseable
    PresentUnknownVersion { path: PathBuf },
    PresentVersioned { path: PathBuf, version: Version },
}

/// Makes sure a suitable plugin is reachable by the generator
pub struct PluginProvisioner<'a> {
    runner: &'a dyn ProcessRunner,
    config: &'a PluginConfig,
    requirement: VersionRequirement,
    diagnostics: &'a dyn DiagnosticHandler,
}

impl<'a> PluginProvisioner<'a> {
    pub fn new(
        runner: &'a dyn ProcessRunner,
        config: &'a PluginConfig,
        diagnostics: &'a dyn DiagnosticHandler,
    ) -> Result<Self, BuildError> {
        let requirement = config
            .version
            .parse::<VersionRequirement>()
            .map_err(BuildError::InvalidConfig)?;

        Ok(Self {
            runner,
            config,
            requirement,
            diagnostics,
        })
    }

    pub fn detect(&self, env: &ExecEnv) -> PluginState {
        let Some(path) = self.runner.locate(&self.config.executable, env) else {
            return PluginState::Absent;
        };

        match self.query_version(&path, env) {
            Some(version) => PluginState::PresentVersioned { path, version },
            None => PluginState::PresentUnknownVersion { path },
        }
    }

    /// Ask the plugin for its version; `None` on non-zero exit or unparsable output
    pub fn query_version(&self, path: &Path, env: &ExecEnv) -> Option<Version> {
        let command = CommandSpec::new(path, vec![self.config.version_flag.clone()], env);

        match self.runner.run(&command) {
            Ok(output) if output.success() => {
                let version = extract_version(&output.stdout);
                if version.is_none() {
                    debug!("Unparsable version output from {:?}: {:?}", path, output.stdout);
                }
                version
            }
            Ok(output) => {
                debug!("{:?} exited with {:?} on version query", path, output.status);
                None
            }
            Err(e) => {
                debug!("Could not query {:?}: {}", path, e);
                None
            }
        }
    }

    /// Resolve the plugin, installing it when absent and applying the mismatch policy
    ///
    /// Returns the plugin version in effect, if it could be determined. Any
    /// installation prepends the install directory to `env`'s search path.
    pub fn ensure(&self, env: &mut ExecEnv) -> Result<Option<Version>, BuildError> {
        match self.detect(env) {
            PluginState::Absent => {
                info!(
                    "{} not found, installing {}",
                    self.config.executable, self.requirement
                );
                self.install(env)
            }
            PluginState::PresentUnknownVersion { path } => {
                self.warn(&format!(
                    "could not determine the version of {}; continuing without a version check",
                    path.display()
                ));
                Ok(None)
            }
            PluginState::PresentVersioned { version, .. } if self.requirement.matches(&version) => {
                debug!("{} {} satisfies {}", self.config.executable, version, self.requirement);
                Ok(Some(version))
            }
            PluginState::PresentVersioned { path, version } => match self.config.policy {
                PluginPolicy::WarnOnMismatch => {
                    self.warn(&format!(
                        "{} is version {}, but {} is required",
                        path.display(),
                        version,
                        self.requirement
                    ));
                    Ok(Some(version))
                }
                PluginPolicy::FailOnMismatch => Err(BuildError::PluginVersionMismatch {
                    plugin: self.config.executable.clone(),
                    found: version,
                    required: self.requirement.clone(),
                }),
                PluginPolicy::AutoInstall => {
                    info!(
                        "{} {} does not satisfy {}, installing",
                        self.config.executable, version, self.requirement
                    );
                    self.install(env)
                }
            },
        }
    }

    /// Run the installer and put its install directory first on the search path
    pub fn install(&self, env: &mut ExecEnv) -> Result<Option<Version>, BuildError> {
        let install_dir = self.config.resolved_install_dir().ok_or_else(|| {
            BuildError::InvalidConfig(
                "plugin installDir is not set and HOME is unavailable".to_string(),
            )
        })?;

        let installer = &self.config.installer;
        let program = self
            .runner
            .locate(&installer.program, env)
            .ok_or_else(|| BuildError::MissingExecutable {
                name: installer.program.clone(),
            })?;

        let command = CommandSpec::new(&program, installer.args_for(self.requirement.as_str()), env);
        let output = self.runner.run(&command).map_err(|source| BuildError::Spawn {
            program: installer.program.clone(),
            source,
        })?;
        if !output.success() {
            return Err(BuildError::PluginInstallFailed {
                plugin: self.config.executable.clone(),
                stderr: output.stderr,
            });
        }

        env.prepend_path(&install_dir)
            .map_err(|e| BuildError::InvalidConfig(format!("install directory: {}", e)))?;
        info!("Installed {} into {:?}", self.config.executable, install_dir);

        let installed = install_dir.join(&self.config.executable);
        let version = self.query_version(&installed, env);
        if version.is_none() {
            self.warn(&format!(
                "installed {} did not report a version",
                installed.display()
            ));
        }
        Ok(version)
    }

    fn warn(&self, message: &str) {
        warn!("{}", message);
        self.diagnostics.warning(message);
    }
}
