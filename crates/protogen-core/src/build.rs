//! Build orchestration
//!
//! One run goes through: options, force check, required executables, plugin
//! provisioning, source resolution, staleness, generation, manifest write.
//! Precondition failures are collected together and stop the run before the
//! generator is ever started.

use std::collections::BTreeSet;
use std::path::PathBuf;
use std::time::SystemTime;
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::cache::{
    clean_targets, is_forced, Freshness, Manifest, StalenessEvaluator, MANIFEST_FILE_NAME,
};
use crate::config::{resolve_path, Options};
use crate::di::Container;
use crate::errors::BuildError;
use crate::generator::{GeneratorInvoker, Invocation, InvokeFailure};
use crate::plugin::{PluginProvisioner, Version};
use crate::process::ExecEnv;
use crate::sources::{validate_sources, SourceSet};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BuildOutcome {
    Generated,
    UpToDate,
    NoSources,
}

/// Summary of a successful run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BuildReport {
    pub outcome: BuildOutcome,
    /// Files currently recorded as generated
    pub targets: BTreeSet<PathBuf>,
    pub plugin_version: Option<Version>,
    /// Previously generated files removed before regenerating
    pub cleaned: usize,
}

/// A failed run, with every error in the order it was recorded
#[derive(Debug, Error)]
#[error("{}", render(.errors))]
pub struct BuildFailure {
    pub errors: Vec<BuildError>,
}

impl BuildFailure {
    pub fn messages(&self) -> Vec<String> {
        self.errors.iter().map(|e| e.to_string()).collect()
    }
}

fn render(errors: &[BuildError]) -> String {
    errors
        .iter()
        .map(|e| e.to_string())
        .collect::<Vec<_>>()
        .join("\n")
}

/// State threaded through the stages of a single run
#[derive(Debug, Default)]
pub struct RunState {
    pub errors: Vec<BuildError>,
    /// Overrides for every child process started by this run
    pub env: ExecEnv,
    pub sources: SourceSet,
    pub manifest: Manifest,
    pub force: bool,
    pub plugin_version: Option<Version>,
}

impl RunState {
    pub fn new(manifest: Manifest, force: bool) -> Self {
        Self {
            manifest,
            force,
            ..Default::default()
        }
    }

    pub fn record(&mut self, error: BuildError) {
        debug!("Recorded error: {}", error);
        self.errors.push(error);
    }

    pub fn has_errors(&self) -> bool {
        !self.errors.is_empty()
    }
}

/// Runs the incremental generation step for one project
pub struct Builder<'a> {
    container: &'a Container,
    project_root: PathBuf,
    config_path: Option<PathBuf>,
    force: bool,
}

impl<'a> Builder<'a> {
    pub fn new(container: &'a Container, project_root: impl Into<PathBuf>) -> Self {
        Self {
            container,
            project_root: project_root.into(),
            config_path: None,
            force: false,
        }
    }

    /// Configuration file whose modification time forces a full rebuild
    pub fn config_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.config_path = Some(path.into());
        self
    }

    /// Clean and regenerate regardless of timestamps
    pub fn force(mut self, force: bool) -> Self {
        self.force = force;
        self
    }

    pub fn build_dir(&self) -> PathBuf {
        resolve_path(&self.project_root, &self.container.config().build_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.build_dir().join(MANIFEST_FILE_NAME)
    }

    pub fn run(&self) -> Result<BuildReport, BuildFailure> {
        let started = SystemTime::now();
        let config = self.container.config();
        let runner = self.container.runner().as_ref();
        let diagnostics = self.container.diagnostic_handler().as_ref();

        let options =
            Options::resolve(config, &self.project_root).map_err(|e| self.fail(vec![e]))?;
        let manifest_path = self.manifest_path();
        let build_dir = self.build_dir();

        let force = self.force || is_forced(self.config_path.as_deref(), &manifest_path);
        let mut state = RunState::new(Manifest::load(&manifest_path), force);

        let provisioner = PluginProvisioner::new(runner, &config.plugin, diagnostics)
            .map_err(|e| self.fail(vec![e]))?;

        // Every missing executable is reported, not only the first one
        let generator = runner.locate(&config.generator.executable, &state.env);
        if generator.is_none() {
            state.record(BuildError::MissingExecutable {
                name: config.generator.executable.clone(),
            });
        }
        let plugin_found = runner.locate(&config.plugin.executable, &state.env).is_some();
        if !plugin_found && runner.locate(&config.plugin.installer.program, &state.env).is_none()
        {
            state.record(BuildError::MissingExecutable {
                name: config.plugin.installer.program.clone(),
            });
        }
        let Some(generator) = generator.filter(|_| !state.has_errors()) else {
            return Err(self.fail(state.errors));
        };

        match provisioner.ensure(&mut state.env) {
            Ok(version) => state.plugin_version = version,
            Err(e) => state.record(e),
        }
        if state.has_errors() {
            return Err(self.fail(state.errors));
        }

        state.errors.extend(validate_sources(&options.sources));
        if state.has_errors() {
            return Err(self.fail(state.errors));
        }
        state.sources = SourceSet::resolve(&options.search_paths, &options.sources);
        if state.sources.is_empty() {
            info!("No .proto files found, nothing to generate");
            // Everything generated from the removed sources is now an orphan
            let mut remaining = Manifest::default();
            let cleaned = self.remove_orphans(&state.manifest, &mut remaining);
            if !state.manifest.is_empty() {
                remaining
                    .save(&manifest_path, started)
                    .map_err(|e| self.fail(vec![e.into()]))?;
            }
            return Ok(BuildReport {
                outcome: BuildOutcome::NoSources,
                targets: remaining.targets,
                plugin_version: state.plugin_version,
                cleaned,
            });
        }

        let freshness = if state.force {
            Freshness::Forced
        } else {
            StalenessEvaluator::new(&state.manifest).evaluate(&state.sources)
        };

        let mut cleaned = 0;
        match freshness {
            Freshness::UpToDate => {
                info!("Generated files are up to date");
                return Ok(BuildReport {
                    outcome: BuildOutcome::UpToDate,
                    targets: state.manifest.targets,
                    plugin_version: state.plugin_version,
                    cleaned: 0,
                });
            }
            Freshness::Forced => {
                info!("Forced rebuild, removing previously generated files");
                cleaned = clean_targets(&state.manifest).map_err(|e| self.fail(vec![e]))?;
                state.manifest = Manifest::default();
            }
            Freshness::Stale(reason) => debug!("Regenerating: {:?}", reason),
        }

        let sources = state.sources.to_vec();
        let invocation = Invocation {
            generator: &generator,
            out_flag: &config.generator.out_flag,
            options: &options,
            sources: &sources,
            env: &state.env,
            build_dir: &build_dir,
            working_dir: &self.project_root,
        };
        match GeneratorInvoker::new(runner).invoke(&invocation) {
            Ok(mut manifest) => {
                cleaned += self.remove_orphans(&state.manifest, &mut manifest);
                state.manifest = manifest;
            }
            Err(InvokeFailure { error, relocated }) => {
                state.record(error);
                if !relocated.is_empty() {
                    // No recorded sources, so the next run regenerates
                    let mut targets = state.manifest.targets.clone();
                    targets.extend(relocated);
                    let partial = Manifest::new(BTreeSet::new(), targets);
                    if let Err(e) = partial.save(&manifest_path, started) {
                        state.record(e.into());
                    }
                }
            }
        }
        if state.has_errors() {
            return Err(self.fail(state.errors));
        }

        state
            .manifest
            .save(&manifest_path, started)
            .map_err(|e| self.fail(vec![e.into()]))?;

        Ok(BuildReport {
            outcome: BuildOutcome::Generated,
            targets: state.manifest.targets,
            plugin_version: state.plugin_version,
            cleaned,
        })
    }

    /// Delete every recorded target and the manifest itself
    pub fn clean(&self) -> Result<usize, BuildFailure> {
        let manifest_path = self.manifest_path();
        let manifest = Manifest::load(&manifest_path);

        let removed = clean_targets(&manifest).map_err(|e| self.fail(vec![e]))?;
        Manifest::default()
            .save(&manifest_path, SystemTime::now())
            .map_err(|e| self.fail(vec![e.into()]))?;

        info!("Removed {} generated file(s)", removed);
        Ok(removed)
    }

    /// Remove files `previous` recorded that `current` no longer does
    ///
    /// A file that cannot be removed stays in `current` so a later run or
    /// clean can retry it.
    fn remove_orphans(&self, previous: &Manifest, current: &mut Manifest) -> usize {
        let orphans: Vec<PathBuf> = previous
            .targets
            .difference(&current.targets)
            .cloned()
            .collect();

        let mut removed = 0;
        for orphan in orphans {
            match std::fs::remove_file(&orphan) {
                Ok(()) => {
                    debug!("Removed stale output {:?}", orphan);
                    removed += 1;
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
                Err(e) => {
                    let message =
                        format!("could not remove stale output {}: {}", orphan.display(), e);
                    warn!("{}", message);
                    self.container.diagnostic_handler().warning(&message);
                    current.targets.insert(orphan);
                }
            }
        }
        removed
    }

    fn fail(&self, errors: Vec<BuildError>) -> BuildFailure {
        let diagnostics = self.container.diagnostic_handler();
        for e in &errors {
            error!("{}", e);
            diagnostics.error(&e.to_string());
        }
        BuildFailure { errors }
    }
}
