use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use super::{build_args, relocate_outputs};
use crate::cache::Manifest;
use crate::config::Options;
use crate::errors::BuildError;
use crate::process::{CommandSpec, ExecEnv, ProcessRunner};

/// Everything needed for one generator run
pub struct Invocation<'a> {
    /// Resolved path of the generator binary
    pub generator: &'a Path,
    pub out_flag: &'a str,
    pub options: &'a Options,
    pub sources: &'a [PathBuf],
    pub env: &'a ExecEnv,
    /// Parent of the per-invocation staging directory
    pub build_dir: &'a Path,
    pub working_dir: &'a Path,
}

/// A failed run, with any outputs that already reached the destination
#[derive(Debug)]
pub struct InvokeFailure {
    pub error: BuildError,
    /// Files moved under the destination before the failure
    pub relocated: BTreeSet<PathBuf>,
}

impl From<BuildError> for InvokeFailure {
    fn from(error: BuildError) -> Self {
        Self {
            error,
            relocated: BTreeSet::new(),
        }
    }
}

/// Runs the generator into a staging directory and relocates its output
pub struct GeneratorInvoker<'a> {
    runner: &'a dyn ProcessRunner,
}

impl<'a> GeneratorInvoker<'a> {
    pub fn new(runner: &'a dyn ProcessRunner) -> Self {
        Self { runner }
    }

    /// Generate, then move outputs under the destination
    ///
    /// Returns the manifest describing this run. The destination is only
    /// touched after the generator exited successfully, and the staging
    /// directory is removed on every path out of this function.
    pub fn invoke(&self, invocation: &Invocation<'_>) -> Result<Manifest, InvokeFailure> {
        std::fs::create_dir_all(invocation.build_dir)
            .map_err(|e| BuildError::io(invocation.build_dir, e))?;
        let staging = tempfile::Builder::new()
            .prefix("staging-")
            .tempdir_in(invocation.build_dir)
            .map_err(|e| BuildError::io(invocation.build_dir, e))?;
        debug!("Staging generator output in {:?}", staging.path());

        let options = invocation.options;
        let args = build_args(
            invocation.out_flag,
            &options.generator,
            &options.include_dirs,
            invocation.sources,
            staging.path(),
        );
        let command = CommandSpec::new(invocation.generator, args, invocation.env)
            .current_dir(invocation.working_dir);

        info!("Compiling {} file(s)", invocation.sources.len());
        let output = self.runner.run(&command).map_err(|source| BuildError::Spawn {
            program: invocation.generator.display().to_string(),
            source,
        })?;

        if !output.success() {
            return Err(BuildError::GenerationFailed {
                status: output.status,
                stderr: output.stderr,
            }
            .into());
        }

        let mut targets = BTreeSet::new();
        if let Err(error) = relocate_outputs(staging.path(), &options.destination, &mut targets) {
            return Err(InvokeFailure {
                error,
                relocated: targets,
            });
        }
        info!(
            "Generated {} file(s) in {:?}",
            targets.len(),
            options.destination
        );

        Ok(Manifest::new(
            invocation.sources.iter().cloned().collect(),
            targets,
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::GeneratorOptions;
    use crate::process::{ProcessOutput, ScriptedRunner};
    use std::fs;
    use tempfile::TempDir;

    fn options(destination: PathBuf) -> Options {
        Options {
            search_paths: vec![],
            sources: vec![],
            destination,
            include_dirs: vec![],
            generator: GeneratorOptions::default(),
        }
    }

    fn output_dir(command: &CommandSpec) -> PathBuf {
        command
            .args
            .iter()
            .find_map(|arg| arg.strip_prefix("--out="))
            .map(PathBuf::from)
            .unwrap()
    }

    #[test]
    fn test_successful_run_relocates_and_cleans_staging() {
        let temp_dir = TempDir::new().unwrap();
        let build_dir = temp_dir.path().join(".protogen");
        let destination = temp_dir.path().join("lib");
        let source = temp_dir.path().join("proto/a.proto");
        let options = options(destination.clone());

        let runner = ScriptedRunner::new().on("protoc", |command| {
            let out = output_dir(command);
            fs::write(out.join("a.pb.ex"), "defmodule A do end")?;
            Ok(ProcessOutput::ok(""))
        });

        let sources = vec![source.clone()];
        let env = ExecEnv::inherit();
        let manifest = GeneratorInvoker::new(&runner)
            .invoke(&Invocation {
                generator: Path::new("/usr/bin/protoc"),
                out_flag: "--out",
                options: &options,
                sources: &sources,
                env: &env,
                build_dir: &build_dir,
                working_dir: temp_dir.path(),
            })
            .unwrap();

        assert!(manifest.sources.contains(&source));
        assert!(manifest.targets.contains(&destination.join("a.pb.ex")));
        assert!(destination.join("a.pb.ex").exists());
        assert_eq!(fs::read_dir(&build_dir).unwrap().count(), 0);

        let calls = runner.calls_to("protoc");
        assert_eq!(calls[0].current_dir.as_deref(), Some(temp_dir.path()));
        assert_eq!(calls[0].args.last().unwrap(), &source.display().to_string());
    }

    #[test]
    fn test_failed_run_leaves_destination_untouched() {
        let temp_dir = TempDir::new().unwrap();
        let build_dir = temp_dir.path().join(".protogen");
        let destination = temp_dir.path().join("lib");
        let options = options(destination.clone());

        let runner = ScriptedRunner::new().on("protoc", |command| {
            let out = output_dir(command);
            fs::write(out.join("partial.pb.ex"), "half")?;
            Ok(ProcessOutput::failed(1, "a.proto: syntax error"))
        });

        let sources = vec![PathBuf::from("a.proto")];
        let env = ExecEnv::inherit();
        let err = GeneratorInvoker::new(&runner)
            .invoke(&Invocation {
                generator: Path::new("protoc"),
                out_flag: "--out",
                options: &options,
                sources: &sources,
                env: &env,
                build_dir: &build_dir,
                working_dir: temp_dir.path(),
            })
            .unwrap_err()
            .error;

        assert!(matches!(err, BuildError::GenerationFailed { status: Some(1), .. }));
        assert!(err.to_string().starts_with("compilation failed"));
        assert!(!destination.exists());
        assert_eq!(fs::read_dir(&build_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_spawn_failure_is_reported() {
        let temp_dir = TempDir::new().unwrap();
        let build_dir = temp_dir.path().join(".protogen");
        let options = options(temp_dir.path().join("lib"));
        let runner = ScriptedRunner::new();

        let sources = vec![PathBuf::from("a.proto")];
        let env = ExecEnv::inherit();
        let err = GeneratorInvoker::new(&runner)
            .invoke(&Invocation {
                generator: Path::new("protoc"),
                out_flag: "--out",
                options: &options,
                sources: &sources,
                env: &env,
                build_dir: &build_dir,
                working_dir: temp_dir.path(),
            })
            .unwrap_err()
            .error;

        assert!(matches!(err, BuildError::Spawn { .. }));
        assert_eq!(fs::read_dir(&build_dir).unwrap().count(), 0);
    }

    #[test]
    fn test_relocation_failure_still_removes_staging() {
        let temp_dir = TempDir::new().unwrap();
        let build_dir = temp_dir.path().join(".protogen");
        let destination = temp_dir.path().join("lib");
        // A regular file where the destination directory should be
        fs::write(&destination, "not a directory").unwrap();
        let options = options(destination.clone());

        let runner = ScriptedRunner::new().on("protoc", |command| {
            let out = output_dir(command).join("sub");
            fs::create_dir_all(&out)?;
            fs::write(out.join("a.pb.ex"), "defmodule A do end")?;
            Ok(ProcessOutput::ok(""))
        });

        let sources = vec![PathBuf::from("a.proto")];
        let env = ExecEnv::inherit();
        let failure = GeneratorInvoker::new(&runner)
            .invoke(&Invocation {
                generator: Path::new("protoc"),
                out_flag: "--out",
                options: &options,
                sources: &sources,
                env: &env,
                build_dir: &build_dir,
                working_dir: temp_dir.path(),
            })
            .unwrap_err();

        assert!(matches!(failure.error, BuildError::Io { .. }));
        assert!(failure.relocated.is_empty());
        assert!(destination.is_file());
        let leftovers: Vec<_> = fs::read_dir(&build_dir)
            .unwrap()
            .filter_map(Result::ok)
            .filter(|entry| entry.file_name().to_string_lossy().starts_with("staging-"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
