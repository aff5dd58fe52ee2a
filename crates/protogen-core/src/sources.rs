use indexmap::IndexSet;
use std::collections::BTreeSet;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::config::normalize;
use crate::errors::BuildError;

/// File extension of interface definition sources
pub const PROTO_EXTENSION: &str = "proto";

/// Deduplicated input files of a build, in discovery order
///
/// Search paths are expanded first (each in sorted glob order), then
/// explicit sources are appended. A file reached both ways appears once.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SourceSet {
    files: IndexSet<PathBuf>,
}

impl SourceSet {
    pub fn resolve(search_paths: &[PathBuf], explicit: &[PathBuf]) -> Self {
        let mut files = IndexSet::new();

        for dir in search_paths {
            for file in glob_sources(dir) {
                files.insert(normalize(&file));
            }
        }
        for file in explicit {
            files.insert(normalize(file));
        }

        debug!("Resolved {} source file(s)", files.len());
        Self { files }
    }

    pub fn from_files<I: IntoIterator<Item = PathBuf>>(files: I) -> Self {
        Self {
            files: files.into_iter().map(|f| normalize(&f)).collect(),
        }
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PathBuf> {
        self.files.iter()
    }

    pub fn to_vec(&self) -> Vec<PathBuf> {
        self.files.iter().cloned().collect()
    }

    /// Order-independent view used for manifest comparison
    pub fn to_set(&self) -> BTreeSet<PathBuf> {
        self.files.iter().cloned().collect()
    }
}

fn glob_sources(dir: &Path) -> Vec<PathBuf> {
    let escaped = glob::Pattern::escape(&dir.to_string_lossy());
    let pattern = format!("{}/**/*.{}", escaped.trim_end_matches('/'), PROTO_EXTENSION);

    let entries = match glob::glob(&pattern) {
        Ok(entries) => entries,
        Err(e) => {
            warn!("Invalid search path {:?}: {}", dir, e);
            return Vec::new();
        }
    };

    let mut files: Vec<PathBuf> = entries
        .filter_map(|entry| match entry {
            Ok(path) if path.is_file() => Some(path),
            Ok(_) => None,
            Err(e) => {
                debug!("Skipping unreadable entry: {}", e);
                None
            }
        })
        .collect();
    files.sort();
    files
}

/// Check explicitly listed sources; every problem is reported, not just the first
pub fn validate_sources(explicit: &[PathBuf]) -> Vec<BuildError> {
    let mut errors = Vec::new();

    for path in explicit {
        if !path.is_file() {
            errors.push(BuildError::MissingSource { path: path.clone() });
        } else if path.extension().and_then(|e| e.to_str()) != Some(PROTO_EXTENSION) {
            errors.push(BuildError::SourceExtensionMismatch {
                path: path.clone(),
                expected: PROTO_EXTENSION,
            });
        }
    }

    errors
}
