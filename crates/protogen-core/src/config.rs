use serde::{Deserialize, Serialize};
use std::path::{Component, Path, PathBuf};
use std::str::FromStr;

use crate::errors::BuildError;

/// Default configuration file name, looked up in the project root
pub const CONFIG_FILE_NAME: &str = "protogen.yaml";

/// What to do when an installed plugin does not satisfy the version requirement
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PluginPolicy {
    /// Install a matching version over the mismatched one
    AutoInstall,
    /// Report a warning and keep going
    #[default]
    WarnOnMismatch,
    /// Fail the build
    FailOnMismatch,
}

impl FromStr for PluginPolicy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "install" | "auto-install" | "autoInstall" => Ok(PluginPolicy::AutoInstall),
            "warn" | "warnOnMismatch" => Ok(PluginPolicy::WarnOnMismatch),
            "fail" | "strict" | "failOnMismatch" => Ok(PluginPolicy::FailOnMismatch),
            _ => Err(format!(
                "Invalid plugin policy '{}'. Supported policies: install, warn, fail",
                s
            )),
        }
    }
}

/// Where to find interface definitions
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SourcesConfig {
    /// Directories searched recursively for `.proto` files
    #[serde(default)]
    pub paths: Vec<PathBuf>,

    /// Explicitly listed `.proto` files
    #[serde(default)]
    pub files: Vec<PathBuf>,

    /// Extra `-I` directories passed to the generator
    #[serde(default)]
    pub include_dirs: Vec<PathBuf>,
}

/// Options folded into the generator's output flag
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorOptions {
    /// Plugins joined with `+` into `plugins=...`
    #[serde(default)]
    pub plugins: Vec<String>,

    #[serde(default)]
    pub gen_descriptors: bool,

    #[serde(default)]
    pub package_prefix: Option<String>,

    /// Fully qualified transform module name
    #[serde(default)]
    pub transform_module: Option<String>,

    #[serde(default)]
    pub one_file_per_module: bool,
}

/// The external generator binary
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct GeneratorConfig {
    #[serde(default = "default_generator")]
    pub executable: String,

    /// Flag that carries `<options>:<output dir>`, e.g. `--elixir_out`
    #[serde(default = "default_out_flag")]
    pub out_flag: String,
}

impl Default for GeneratorConfig {
    fn default() -> Self {
        Self {
            executable: default_generator(),
            out_flag: default_out_flag(),
        }
    }
}

/// Command used to install the plugin; `{version}` is replaced with the requirement
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallerConfig {
    pub program: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl Default for InstallerConfig {
    fn default() -> Self {
        Self {
            program: "mix".to_string(),
            args: vec![
                "escript.install".to_string(),
                "hex".to_string(),
                "protobuf".to_string(),
                "{version}".to_string(),
                "--force".to_string(),
            ],
        }
    }
}

impl InstallerConfig {
    /// Installer arguments with the version placeholder substituted
    pub fn args_for(&self, version: &str) -> Vec<String> {
        self.args
            .iter()
            .map(|arg| arg.replace("{version}", version))
            .collect()
    }
}

/// The companion plugin executable invoked by the generator
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PluginConfig {
    #[serde(default = "default_plugin")]
    pub executable: String,

    /// Required version, compatible-release semantics (`~> 0.12`)
    #[serde(default = "default_plugin_version")]
    pub version: String,

    #[serde(default = "default_version_flag")]
    pub version_flag: String,

    #[serde(default)]
    pub policy: PluginPolicy,

    #[serde(default)]
    pub installer: InstallerConfig,

    /// Where the installer puts executables (default: `$HOME/.mix/escripts`)
    #[serde(default)]
    pub install_dir: Option<PathBuf>,
}

impl Default for PluginConfig {
    fn default() -> Self {
        Self {
            executable: default_plugin(),
            version: default_plugin_version(),
            version_flag: default_version_flag(),
            policy: PluginPolicy::default(),
            installer: InstallerConfig::default(),
            install_dir: None,
        }
    }
}

impl PluginConfig {
    pub fn resolved_install_dir(&self) -> Option<PathBuf> {
        self.install_dir.clone().or_else(|| {
            std::env::var_os("HOME").map(|home| PathBuf::from(home).join(".mix").join("escripts"))
        })
    }
}

/// Main project configuration, loaded from `protogen.yaml`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProjectConfig {
    #[serde(default)]
    pub sources: SourcesConfig,

    /// Output directory; falls back to the first entry of `sourceDirs`
    #[serde(default)]
    pub destination: Option<PathBuf>,

    /// Source directories of the host project
    #[serde(default = "default_source_dirs")]
    pub source_dirs: Vec<PathBuf>,

    #[serde(default)]
    pub options: GeneratorOptions,

    #[serde(default)]
    pub generator: GeneratorConfig,

    #[serde(default)]
    pub plugin: PluginConfig,

    /// Build metadata directory holding the manifest and staging dirs
    #[serde(default = "default_build_dir")]
    pub build_dir: PathBuf,
}

fn default_generator() -> String {
    "protoc".to_string()
}

fn default_out_flag() -> String {
    "--out".to_string()
}

fn default_plugin() -> String {
    "protoc-gen-elixir".to_string()
}

fn default_plugin_version() -> String {
    "~> 0.12".to_string()
}

fn default_version_flag() -> String {
    "--version".to_string()
}

fn default_source_dirs() -> Vec<PathBuf> {
    vec![PathBuf::from("lib")]
}

fn default_build_dir() -> PathBuf {
    PathBuf::from(crate::cache::BUILD_DIR_NAME)
}

impl Default for ProjectConfig {
    fn default() -> Self {
        Self {
            sources: SourcesConfig::default(),
            destination: None,
            source_dirs: default_source_dirs(),
            options: GeneratorOptions::default(),
            generator: GeneratorConfig::default(),
            plugin: PluginConfig::default(),
            build_dir: default_build_dir(),
        }
    }
}

const SAMPLE_CONFIG: &str = r#"# Protogen configuration

sources:
  paths:
    - "proto"            # searched recursively for *.proto
  files: []              # extra .proto files
  includeDirs: []        # extra -I directories

# destination: "lib/proto"   # defaults to the first sourceDirs entry
sourceDirs:
  - "lib"

options:
  plugins: []            # e.g. [grpc]
  genDescriptors: false
  oneFilePerModule: false

generator:
  executable: "protoc"
  outFlag: "--elixir_out"

plugin:
  executable: "protoc-gen-elixir"
  version: "~> 0.12"
  policy: "warnOnMismatch" # autoInstall | warnOnMismatch | failOnMismatch
"#;

impl ProjectConfig {
    /// Load configuration from a YAML file
    pub fn from_file(path: &Path) -> Result<Self, BuildError> {
        let content = std::fs::read_to_string(path).map_err(|e| BuildError::io(path, e))?;
        Self::from_yaml(&content)
    }

    pub fn from_yaml(content: &str) -> Result<Self, BuildError> {
        serde_yaml::from_str(content).map_err(|e| BuildError::InvalidConfig(e.to_string()))
    }

    /// Write the sample configuration to a file
    pub fn init_file(path: &Path) -> Result<(), BuildError> {
        std::fs::write(path, SAMPLE_CONFIG).map_err(|e| BuildError::io(path, e))
    }

    /// Merge CLI overrides into this configuration
    pub fn merge(&mut self, overrides: &CliOverrides) {
        if let Some(ref destination) = overrides.destination {
            self.destination = Some(destination.clone());
        }
        if let Some(ref generator) = overrides.generator {
            self.generator.executable = generator.clone();
        }
        if let Some(ref out_flag) = overrides.out_flag {
            self.generator.out_flag = out_flag.clone();
        }
        if let Some(ref version) = overrides.plugin_version {
            self.plugin.version = version.clone();
        }
        if let Some(policy) = overrides.plugin_policy {
            self.plugin.policy = policy;
        }
        if !overrides.files.is_empty() {
            self.sources.files.extend(overrides.files.iter().cloned());
        }
        if !overrides.include_dirs.is_empty() {
            self.sources
                .include_dirs
                .extend(overrides.include_dirs.iter().cloned());
        }
    }
}

/// Command line values that take precedence over the configuration file
#[derive(Debug, Clone, Default)]
pub struct CliOverrides {
    pub destination: Option<PathBuf>,
    pub generator: Option<String>,
    pub out_flag: Option<String>,
    pub plugin_version: Option<String>,
    pub plugin_policy: Option<PluginPolicy>,
    pub files: Vec<PathBuf>,
    pub include_dirs: Vec<PathBuf>,
}

/// Immutable per-run options resolved against the project root
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    pub search_paths: Vec<PathBuf>,
    pub sources: Vec<PathBuf>,
    pub destination: PathBuf,
    pub include_dirs: Vec<PathBuf>,
    pub generator: GeneratorOptions,
}

impl Options {
    pub fn resolve(config: &ProjectConfig, project_root: &Path) -> Result<Self, BuildError> {
        let destination = config
            .destination
            .as_ref()
            .filter(|d| !d.as_os_str().is_empty())
            .or_else(|| config.source_dirs.first())
            .filter(|d| !d.as_os_str().is_empty())
            .ok_or_else(|| {
                BuildError::InvalidConfig(
                    "no destination configured and no source directory to derive one from"
                        .to_string(),
                )
            })?;

        let resolve_all = |paths: &[PathBuf]| -> Vec<PathBuf> {
            paths.iter().map(|p| resolve_path(project_root, p)).collect()
        };

        Ok(Self {
            search_paths: resolve_all(&config.sources.paths),
            sources: resolve_all(&config.sources.files),
            destination: resolve_path(project_root, destination),
            include_dirs: resolve_all(&config.sources.include_dirs),
            generator: config.options.clone(),
        })
    }
}

/// Join a relative path onto `root` and drop `.` components
pub fn resolve_path(root: &Path, path: &Path) -> PathBuf {
    let joined = if path.is_absolute() {
        path.to_path_buf()
    } else {
        root.join(path)
    };
    normalize(&joined)
}

pub(crate) fn normalize(path: &Path) -> PathBuf {
    path.components()
        .filter(|c| !matches!(c, Component::CurDir))
        .collect()
}
