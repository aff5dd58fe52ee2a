use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::io::Write;
use std::path::{Path, PathBuf};
use std::time::SystemTime;
use tracing::{debug, info};

use super::{CacheError, Result, LEGACY_MANIFEST_VERSION, MANIFEST_VERSION};

/// Record of the last successful generation
///
/// Every target was produced by a run whose inputs were exactly `sources`.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Manifest {
    pub sources: BTreeSet<PathBuf>,
    pub targets: BTreeSet<PathBuf>,
}

/// Older layout: each source mapped to the files generated from it
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LegacyManifest {
    pub entries: BTreeMap<PathBuf, Vec<PathBuf>>,
}

/// A decoded manifest body, tagged by the schema version it was written with
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestSchema {
    Legacy(LegacyManifest),
    Current(Manifest),
}

impl ManifestSchema {
    /// Decode the version tag, then the body it announces
    pub fn decode(bytes: &[u8]) -> Result<Self> {
        let mut reader = bytes;
        let version: u32 = bincode::deserialize_from(&mut reader)?;

        match version {
            MANIFEST_VERSION => Ok(ManifestSchema::Current(bincode::deserialize_from(
                &mut reader,
            )?)),
            LEGACY_MANIFEST_VERSION => Ok(ManifestSchema::Legacy(bincode::deserialize_from(
                &mut reader,
            )?)),
            found => Err(CacheError::VersionMismatch {
                expected: MANIFEST_VERSION,
                found,
            }),
        }
    }

    pub fn version(&self) -> u32 {
        match self {
            ManifestSchema::Legacy(_) => LEGACY_MANIFEST_VERSION,
            ManifestSchema::Current(_) => MANIFEST_VERSION,
        }
    }

    /// Flatten into the current layout
    pub fn into_manifest(self) -> Manifest {
        match self {
            ManifestSchema::Current(manifest) => manifest,
            ManifestSchema::Legacy(legacy) => Manifest {
                targets: legacy.entries.values().flatten().cloned().collect(),
                sources: legacy.entries.into_keys().collect(),
            },
        }
    }
}

impl LegacyManifest {
    /// Serialize in the legacy layout (only old builds and tests write these)
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&(LEGACY_MANIFEST_VERSION, self)).map_err(CacheError::from)
    }
}

impl Manifest {
    pub fn new(sources: BTreeSet<PathBuf>, targets: BTreeSet<PathBuf>) -> Self {
        Self { sources, targets }
    }

    pub fn is_empty(&self) -> bool {
        self.targets.is_empty()
    }

    /// Serialize with the current version tag
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        bincode::serialize(&(MANIFEST_VERSION, self)).map_err(CacheError::from)
    }

    /// Deserialize any supported version
    pub fn from_bytes(bytes: &[u8]) -> Result<Self> {
        ManifestSchema::decode(bytes).map(ManifestSchema::into_manifest)
    }

    /// Read the manifest, degrading to an empty one on any failure
    ///
    /// A missing or unreadable manifest only costs a rebuild.
    pub fn load(path: &Path) -> Self {
        let bytes = match std::fs::read(path) {
            Ok(bytes) => bytes,
            Err(e) => {
                debug!("No manifest at {:?}: {}", path, e);
                return Self::default();
            }
        };

        match Self::from_bytes(&bytes) {
            Ok(manifest) => {
                debug!(
                    "Loaded manifest with {} source(s), {} target(s)",
                    manifest.sources.len(),
                    manifest.targets.len()
                );
                manifest
            }
            Err(e) => {
                info!("Ignoring unreadable manifest {:?}: {}", path, e);
                Self::default()
            }
        }
    }

    /// Persist the manifest with `timestamp` as its modification time
    ///
    /// An empty target set removes the manifest instead. The file is written
    /// to a sibling temp file and renamed into place.
    pub fn save(&self, path: &Path, timestamp: SystemTime) -> Result<()> {
        if self.is_empty() {
            return match std::fs::remove_file(path) {
                Ok(()) => {
                    debug!("Removed manifest {:?}", path);
                    Ok(())
                }
                Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
                Err(e) => Err(e.into()),
            };
        }

        let parent = match path.parent() {
            Some(parent) if !parent.as_os_str().is_empty() => parent,
            _ => Path::new("."),
        };
        std::fs::create_dir_all(parent)?;

        let bytes = self.to_bytes()?;
        let mut file = tempfile::NamedTempFile::new_in(parent)?;
        file.write_all(&bytes)?;
        file.as_file().sync_all()?;
        file.as_file().set_modified(timestamp)?;
        file.persist(path).map_err(|e| CacheError::Io(e.error))?;

        info!(
            "Saved manifest with {} source(s), {} target(s)",
            self.sources.len(),
            self.targets.len()
        );
        Ok(())
    }
}
