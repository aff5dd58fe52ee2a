use std::path::PathBuf;
use thiserror::Error;

use crate::cache::CacheError;
use crate::plugin::{Version, VersionRequirement};

/// Errors accumulated over a single build run.
///
/// A run fails when at least one of these has been recorded. Manifest
/// corruption never shows up here; it degrades to an empty manifest.
#[derive(Debug, Error)]
pub enum BuildError {
    #[error("required executable `{name}` was not found on PATH")]
    MissingExecutable { name: String },

    #[error("source file not found: {}", .path.display())]
    MissingSource { path: PathBuf },

    #[error("source file {} does not have the `.{expected}` extension", .path.display())]
    SourceExtensionMismatch {
        path: PathBuf,
        expected: &'static str,
    },

    #[error("plugin `{plugin}` version {found} does not satisfy requirement `{required}`")]
    PluginVersionMismatch {
        plugin: String,
        found: Version,
        required: VersionRequirement,
    },

    #[error("failed to install plugin `{plugin}`{}", stderr_suffix(.stderr))]
    PluginInstallFailed { plugin: String, stderr: String },

    #[error("compilation failed{}", stderr_suffix(.stderr))]
    GenerationFailed { status: Option<i32>, stderr: String },

    #[error("failed to run `{program}`: {source}")]
    Spawn {
        program: String,
        source: std::io::Error,
    },

    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    #[error("I/O error at {}: {source}", .path.display())]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error(transparent)]
    Cache(#[from] CacheError),
}

impl BuildError {
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        BuildError::Io {
            path: path.into(),
            source,
        }
    }
}

fn stderr_suffix(stderr: &str) -> String {
    let trimmed = stderr.trim();
    if trimmed.is_empty() {
        String::new()
    } else {
        format!(": {}", trimmed)
    }
}
