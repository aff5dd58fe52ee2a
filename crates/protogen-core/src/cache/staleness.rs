use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::Manifest;
use crate::errors::BuildError;
use crate::sources::SourceSet;

/// Result of comparing the current inputs with the last recorded run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Freshness {
    /// Outputs are current; the run is a no-op
    UpToDate,
    /// Regenerate
    Stale(StaleReason),
    /// Clean every recorded target, then regenerate
    Forced,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StaleReason {
    NoPriorBuild,
    SourcesChanged,
    MissingTarget(PathBuf),
    SourceNewer(PathBuf),
}

fn modified(path: &Path) -> Option<SystemTime> {
    std::fs::metadata(path).and_then(|m| m.modified()).ok()
}

/// A config edit newer than the manifest invalidates every recorded output
pub fn is_forced(config_path: Option<&Path>, manifest_path: &Path) -> bool {
    let Some(config_path) = config_path else {
        return false;
    };

    match (modified(config_path), modified(manifest_path)) {
        (Some(config_time), Some(manifest_time)) => {
            let forced = config_time > manifest_time;
            if forced {
                info!("{:?} changed since the last build", config_path);
            }
            forced
        }
        _ => false,
    }
}

/// Decides whether recorded targets still reflect the current sources
pub struct StalenessEvaluator<'a> {
    manifest: &'a Manifest,
}

impl<'a> StalenessEvaluator<'a> {
    pub fn new(manifest: &'a Manifest) -> Self {
        Self { manifest }
    }

    /// Stale when nothing was recorded, the source set changed, a target is
    /// missing, or the newest source is newer than the oldest target
    pub fn evaluate(&self, sources: &SourceSet) -> Freshness {
        if self.manifest.targets.is_empty() {
            return Freshness::Stale(StaleReason::NoPriorBuild);
        }

        if sources.to_set() != self.manifest.sources {
            return Freshness::Stale(StaleReason::SourcesChanged);
        }

        let mut oldest_target: Option<SystemTime> = None;
        for target in &self.manifest.targets {
            match modified(target) {
                Some(time) => {
                    oldest_target = Some(oldest_target.map_or(time, |t| t.min(time)));
                }
                None => return Freshness::Stale(StaleReason::MissingTarget(target.clone())),
            }
        }
        let Some(oldest_target) = oldest_target else {
            return Freshness::Stale(StaleReason::NoPriorBuild);
        };

        for source in sources.iter() {
            let newer = modified(source).map_or(true, |time| time > oldest_target);
            if newer {
                return Freshness::Stale(StaleReason::SourceNewer(source.clone()));
            }
        }

        Freshness::UpToDate
    }
}

/// Remove every target recorded in `manifest`; returns how many were deleted
pub fn clean_targets(manifest: &Manifest) -> Result<usize, BuildError> {
    let mut removed = 0;

    for target in &manifest.targets {
        match std::fs::remove_file(target) {
            Ok(()) => {
                debug!("Removed {:?}", target);
                removed += 1;
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => return Err(BuildError::io(target, e)),
        }
    }

    if removed > 0 {
        info!("Cleaned {} previously generated file(s)", removed);
    }
    Ok(removed)
}
