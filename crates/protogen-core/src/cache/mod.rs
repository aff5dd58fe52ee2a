//! Build manifest and incremental rebuild decisions
//!
//! The manifest records which sources the last successful run consumed and
//! which files it produced. Together with file timestamps it decides whether
//! a run can be skipped, must regenerate, or must clean and regenerate.

mod error;
mod manifest;
mod staleness;

pub use error::{CacheError, Result};
pub use manifest::{LegacyManifest, Manifest, ManifestSchema};
pub use staleness::{clean_targets, is_forced, Freshness, StaleReason, StalenessEvaluator};

/// Manifest format version - increment when the on-disk layout changes
pub const MANIFEST_VERSION: u32 = 2;

/// Version of the per-source target map layout, still readable
pub const LEGACY_MANIFEST_VERSION: u32 = 1;

/// Default build metadata directory name
pub const BUILD_DIR_NAME: &str = ".protogen";

/// Manifest file name inside the build directory
pub const MANIFEST_FILE_NAME: &str = "compile.protobuf.manifest";
