//! External process capability.
//!
//! Every child process (generator, plugin version query, plugin installer)
//! goes through [`ProcessRunner`], so the build logic can be exercised with
//! [`ScriptedRunner`] instead of real binaries.

use rustc_hash::FxHashSet;
use std::collections::BTreeMap;
use std::ffi::{OsStr, OsString};
use std::io;
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing::debug;

/// Environment overrides applied to child processes
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExecEnv {
    vars: BTreeMap<String, OsString>,
}

impl ExecEnv {
    /// No overrides; children inherit the current process environment
    pub fn inherit() -> Self {
        Self::default()
    }

    /// Environment whose search path is exactly `dirs`
    pub fn with_search_path(dirs: &[PathBuf]) -> Result<Self, std::env::JoinPathsError> {
        let mut env = Self::default();
        env.vars
            .insert("PATH".to_string(), std::env::join_paths(dirs)?);
        Ok(env)
    }

    /// Override a variable for every child
    pub fn set(&mut self, key: impl Into<String>, value: impl Into<OsString>) {
        self.vars.insert(key.into(), value.into());
    }

    /// Overridden value of `key`, if any
    pub fn get(&self, key: &str) -> Option<&OsStr> {
        self.vars.get(key).map(|v| v.as_os_str())
    }

    /// All overridden variables
    pub fn vars(&self) -> impl Iterator<Item = (&String, &OsString)> {
        self.vars.iter()
    }

    /// Directories searched for executables, overrides first
    pub fn search_path(&self) -> Vec<PathBuf> {
        let path = self
            .vars
            .get("PATH")
            .cloned()
            .or_else(|| std::env::var_os("PATH"))
            .unwrap_or_default();
        std::env::split_paths(&path).collect()
    }

    /// Put `dir` in front of the search path for all later invocations
    pub fn prepend_path(&mut self, dir: &Path) -> Result<(), std::env::JoinPathsError> {
        let mut dirs = vec![dir.to_path_buf()];
        dirs.extend(self.search_path().into_iter().filter(|d| d != dir));
        let joined = std::env::join_paths(dirs)?;
        self.vars.insert("PATH".to_string(), joined);
        Ok(())
    }

    /// Look `name` up on the search path
    pub fn find_executable(&self, name: &str) -> Option<PathBuf> {
        let direct = Path::new(name);
        if direct.components().count() > 1 {
            return is_executable(direct).then(|| direct.to_path_buf());
        }

        self.search_path().into_iter().find_map(|dir| {
            executable_candidates(&dir, name)
                .into_iter()
                .find(|candidate| is_executable(candidate))
        })
    }
}

#[cfg(windows)]
fn executable_candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name), dir.join(format!("{}.exe", name)), dir.join(format!("{}.bat", name))]
}

#[cfg(not(windows))]
fn executable_candidates(dir: &Path, name: &str) -> Vec<PathBuf> {
    vec![dir.join(name)]
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    std::fs::metadata(path)
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// A fully described child-process invocation
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub current_dir: Option<PathBuf>,
    pub env: ExecEnv,
}

impl CommandSpec {
    /// Command for `program` running under `env`
    pub fn new(program: impl Into<PathBuf>, args: Vec<String>, env: &ExecEnv) -> Self {
        Self {
            program: program.into(),
            args,
            current_dir: None,
            env: env.clone(),
        }
    }

    /// Set the child's working directory
    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Name of the program without its directory
    pub fn program_name(&self) -> String {
        self.program
            .file_name()
            .unwrap_or(self.program.as_os_str())
            .to_string_lossy()
            .to_string()
    }
}

/// Exit status and captured output of a finished process
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ProcessOutput {
    /// `None` when the process was terminated by a signal
    pub status: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl ProcessOutput {
    /// True when the process exited with status 0
    pub fn success(&self) -> bool {
        self.status == Some(0)
    }

    /// Successful output with the given stdout
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            status: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Failed output with the given exit status and stderr
    pub fn failed(status: i32, stderr: impl Into<String>) -> Self {
        Self {
            status: Some(status),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }
}

/// Runs external commands and locates executables
pub trait ProcessRunner: Send + Sync {
    fn run(&self, command: &CommandSpec) -> io::Result<ProcessOutput>;

    fn locate(&self, program: &str, env: &ExecEnv) -> Option<PathBuf> {
        env.find_executable(program)
    }
}

/// Runs commands with `std::process::Command`
#[derive(Debug, Default)]
pub struct SystemRunner;

impl SystemRunner {
    /// Create a runner that spawns real processes
    pub fn new() -> Self {
        Self
    }
}

impl ProcessRunner for SystemRunner {
    fn run(&self, command: &CommandSpec) -> io::Result<ProcessOutput> {
        debug!("Running {:?} {:?}", command.program, command.args);

        let mut child = std::process::Command::new(&command.program);
        child.args(&command.args).envs(command.env.vars());
        if let Some(ref dir) = command.current_dir {
            child.current_dir(dir);
        }

        let output = child.output()?;
        Ok(ProcessOutput {
            status: output.status.code(),
            stdout: String::from_utf8_lossy(&output.stdout).to_string(),
            stderr: String::from_utf8_lossy(&output.stderr).to_string(),
        })
    }
}

type Handler = Box<dyn Fn(&CommandSpec) -> io::Result<ProcessOutput> + Send + Sync>;

/// Scripted process runner for testing
///
/// Programs are matched by file name, so a handler registered for
/// `protoc-gen-elixir` also answers calls made through an absolute path.
/// Unscripted programs fail with `NotFound`, like a missing binary would.
#[derive(Default)]
pub struct ScriptedRunner {
    on_path: FxHashSet<String>,
    handlers: Vec<(String, Handler)>,
    calls: Mutex<Vec<CommandSpec>>,
}

impl ScriptedRunner {
    /// Create a runner with nothing scripted and an empty search path
    pub fn new() -> Self {
        Self::default()
    }

    /// Make `name` discoverable on the search path
    pub fn with_executable(mut self, name: &str) -> Self {
        self.on_path.insert(name.to_string());
        self
    }

    /// Answer every invocation of `program` with `handler`
    pub fn on<F>(mut self, program: &str, handler: F) -> Self
    where
        F: Fn(&CommandSpec) -> io::Result<ProcessOutput> + Send + Sync + 'static,
    {
        self.handlers.push((program.to_string(), Box::new(handler)));
        self
    }

    /// Every command run so far, in order
    pub fn calls(&self) -> Vec<CommandSpec> {
        self.calls.lock().map(|c| c.clone()).unwrap_or_default()
    }

    /// Commands run so far whose program name is `program`
    pub fn calls_to(&self, program: &str) -> Vec<CommandSpec> {
        self.calls()
            .into_iter()
            .filter(|c| c.program_name() == program)
            .collect()
    }
}

impl ProcessRunner for ScriptedRunner {
    fn run(&self, command: &CommandSpec) -> io::Result<ProcessOutput> {
        if let Ok(mut calls) = self.calls.lock() {
            calls.push(command.clone());
        }

        let name = command.program_name();
        match self.handlers.iter().find(|(program, _)| *program == name) {
            Some((_, handler)) => handler(command),
            None => Err(io::Error::new(
                io::ErrorKind::NotFound,
                format!("no script for `{}`", name),
            )),
        }
    }

    fn locate(&self, program: &str, _env: &ExecEnv) -> Option<PathBuf> {
        self.on_path
            .contains(program)
            .then(|| PathBuf::from("/usr/bin").join(program))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_prepend_path_puts_dir_first_once() {
        let mut env = ExecEnv::with_search_path(&[PathBuf::from("/usr/bin"), PathBuf::from("/bin")])
            .unwrap();
        env.prepend_path(Path::new("/opt/escripts")).unwrap();
        env.prepend_path(Path::new("/opt/escripts")).unwrap();

        assert_eq!(
            env.search_path(),
            vec![
                PathBuf::from("/opt/escripts"),
                PathBuf::from("/usr/bin"),
                PathBuf::from("/bin"),
            ]
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_find_executable_requires_exec_bit() {
        use std::os::unix::fs::PermissionsExt;

        let dir = tempfile::tempdir().unwrap();
        let tool = dir.path().join("protoc");
        std::fs::write(&tool, "#!/bin/sh\n").unwrap();

        let env = ExecEnv::with_search_path(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(env.find_executable("protoc"), None);

        std::fs::set_permissions(&tool, std::fs::Permissions::from_mode(0o755)).unwrap();
        assert_eq!(env.find_executable("protoc"), Some(tool));
    }

    #[test]
    fn test_find_executable_missing() {
        let dir = tempfile::tempdir().unwrap();
        let env = ExecEnv::with_search_path(&[dir.path().to_path_buf()]).unwrap();
        assert_eq!(env.find_executable("definitely-not-here"), None);
    }

    #[test]
    fn test_scripted_runner_matches_by_file_name() {
        let runner = ScriptedRunner::new().on("protoc-gen-elixir", |_| Ok(ProcessOutput::ok("0.12.0")));
        let env = ExecEnv::inherit();

        let output = runner
            .run(&CommandSpec::new(
                "/opt/escripts/protoc-gen-elixir",
                vec!["--version".to_string()],
                &env,
            ))
            .unwrap();

        assert!(output.success());
        assert_eq!(output.stdout, "0.12.0");
        assert_eq!(runner.calls_to("protoc-gen-elixir").len(), 1);
    }

    #[test]
    fn test_scripted_runner_unscripted_program_is_not_found() {
        let runner = ScriptedRunner::new();
        let err = runner
            .run(&CommandSpec::new("protoc", vec![], &ExecEnv::inherit()))
            .unwrap_err();
        assert_eq!(err.kind(), io::ErrorKind::NotFound);
    }

    #[test]
    fn test_scripted_runner_locate() {
        let runner = ScriptedRunner::new().with_executable("protoc");
        let env = ExecEnv::inherit();
        assert!(runner.locate("protoc", &env).is_some());
        assert!(runner.locate("protoc-gen-elixir", &env).is_none());
    }
}
