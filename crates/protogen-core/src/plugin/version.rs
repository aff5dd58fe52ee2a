use semver::{Comparator, Op, Prerelease, VersionReq};
use std::fmt;
use std::str::FromStr;

pub use semver::Version;

/// Parse a version as printed by a plugin
///
/// A leading `v` is accepted, and so is a missing patch (`1.4` reads as
/// `1.4.0`). Pre-release and build metadata are kept.
pub fn parse_version(text: &str) -> Option<Version> {
    let text = text.trim().trim_start_matches('v');
    if let Ok(version) = Version::parse(text) {
        return Some(version);
    }

    let split = text.find(['-', '+']).unwrap_or(text.len());
    let (core, suffix) = text.split_at(split);
    if core.split('.').count() != 2 {
        return None;
    }
    Version::parse(&format!("{}.0{}", core, suffix)).ok()
}

/// First version-looking token in a tool's `--version` output
///
/// Accepts output such as `0.12.0`, `protoc-gen-elixir 0.12.0` or `v0.12.0`.
pub fn extract_version(output: &str) -> Option<Version> {
    output.split_whitespace().find_map(parse_version)
}

/// Compatible-release requirement, written `~> 0.12`, `~> 0.12.1` or `0.12`
///
/// Matches `>= X.Y.0, < (X+1).0.0`. The original text is kept so it can be
/// handed to the installer unchanged.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VersionRequirement {
    req: VersionReq,
    raw: String,
}

impl VersionRequirement {
    /// Pre-release tags do not take part in the check
    pub fn matches(&self, version: &Version) -> bool {
        let release = Version::new(version.major, version.minor, version.patch);
        self.req.matches(&release)
    }

    pub fn as_str(&self) -> &str {
        &self.raw
    }

    /// The requirement as a semver range
    pub fn range(&self) -> &VersionReq {
        &self.req
    }
}

fn comparator(op: Op, major: u64, minor: u64) -> Comparator {
    Comparator {
        op,
        major,
        minor: Some(minor),
        patch: Some(0),
        pre: Prerelease::EMPTY,
    }
}

impl FromStr for VersionRequirement {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let trimmed = s.trim();
        let floor = trimmed.strip_prefix("~>").unwrap_or(trimmed).trim();
        let floor = parse_version(floor)
            .filter(|v| v.pre.is_empty())
            .ok_or_else(|| format!("invalid version requirement '{}'", s))?;

        let req = VersionReq {
            comparators: vec![
                comparator(Op::GreaterEq, floor.major, floor.minor),
                comparator(Op::Less, floor.major + 1, 0),
            ],
        };

        Ok(Self {
            req,
            raw: trimmed.to_string(),
        })
    }
}

impl fmt::Display for VersionRequirement {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.raw)
    }
}
