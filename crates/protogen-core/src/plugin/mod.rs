//! Companion plugin discovery, version checks and installation

mod provisioner;
mod version;

pub use provisioner::{PluginProvisioner, PluginState};
pub use version::{extract_version, parse_version, Version, VersionRequirement};
