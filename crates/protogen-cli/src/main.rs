use clap::Parser;
use protogen_core::config::CONFIG_FILE_NAME;
use protogen_core::{
    BuildOutcome, BuildReport, Builder, CliOverrides, Container, PluginPolicy, ProjectConfig,
};
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;

/// Protogen - incremental protobuf code generation
#[derive(Parser, Debug, Clone)]
#[command(name = "protogen")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Extra .proto files to compile
    #[arg(value_name = "FILE")]
    files: Vec<PathBuf>,

    /// Path to protogen.yaml configuration file
    #[arg(short, long, value_name = "FILE")]
    project: Option<PathBuf>,

    /// Output directory for generated files
    #[arg(short, long, value_name = "DIR")]
    destination: Option<PathBuf>,

    /// Generator executable (default: protoc)
    #[arg(long, value_name = "PROGRAM")]
    generator: Option<String>,

    /// Generator flag that receives the output directory (e.g. --elixir_out)
    #[arg(long, value_name = "FLAG", allow_hyphen_values = true)]
    out_flag: Option<String>,

    /// Required plugin version (e.g. "~> 0.12")
    #[arg(long, value_name = "REQ")]
    plugin_version: Option<String>,

    /// What to do on a plugin version mismatch (install, warn, fail)
    #[arg(long, value_name = "POLICY")]
    plugin_policy: Option<PluginPolicy>,

    /// Additional include directories (repeatable)
    #[arg(short = 'I', long = "include-dir", value_name = "DIR")]
    include_dirs: Vec<PathBuf>,

    /// Remove previously generated files and regenerate everything
    #[arg(short, long)]
    force: bool,

    /// Remove every generated file and the manifest, then exit
    #[arg(long)]
    clean: bool,

    /// Initialize a new project with a sample configuration
    #[arg(long)]
    init: bool,

    /// Disable coloured output
    #[arg(long)]
    no_color: bool,

    /// Log debug output
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // RUST_LOG directives still apply on top of the default level
    let level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_ansi(!cli.no_color)
        .init();

    if cli.init {
        init_project()?;
        return Ok(());
    }

    let (config, config_path, project_root) = load_config(&cli)?;
    debug!("Project root: {:?}", project_root);

    let container = Container::new(config, !cli.no_color);
    let mut builder = Builder::new(&container, &project_root).force(cli.force);
    if let Some(path) = config_path {
        builder = builder.config_path(path);
    }

    if cli.clean {
        match builder.clean() {
            Ok(removed) => println!("Removed {} generated file(s)", removed),
            Err(failure) => {
                eprintln!("Error: clean failed: {}", failure);
                std::process::exit(1);
            }
        }
        return Ok(());
    }

    match builder.run() {
        Ok(report) => print_summary(&report, container.warning_count()),
        Err(failure) => {
            // Each error was already reported through the diagnostic handler
            eprintln!(
                "Error: generation failed with {} error(s)",
                failure.errors.len()
            );
            std::process::exit(1);
        }
    }

    Ok(())
}

/// Initialize a new project with a configuration file and a sample schema
fn init_project() -> anyhow::Result<()> {
    let config_path = Path::new(CONFIG_FILE_NAME);
    if config_path.exists() {
        anyhow::bail!("{} already exists", CONFIG_FILE_NAME);
    }

    println!("Initializing new protogen project...");

    ProjectConfig::init_file(config_path)?;
    println!("Created {}", CONFIG_FILE_NAME);

    std::fs::create_dir_all("proto")?;
    let sample = r#"syntax = "proto3";

package hello;

message Greeting {
  string name = 1;
}
"#;
    std::fs::write("proto/hello.proto", sample)?;
    println!("Created proto/hello.proto");

    println!("\nProject initialized successfully!");
    println!("Run 'protogen' to generate code.");

    Ok(())
}

/// Load configuration (explicit, discovered or default) and apply CLI overrides
///
/// Returns the configuration, the file it came from (if any) and the project
/// root that relative paths resolve against.
fn load_config(cli: &Cli) -> anyhow::Result<(ProjectConfig, Option<PathBuf>, PathBuf)> {
    let cwd = std::env::current_dir()?;

    let (mut config, config_path) = if let Some(ref project_path) = cli.project {
        let path = cwd.join(project_path);
        let config = ProjectConfig::from_file(&path)
            .map_err(|e| anyhow::anyhow!("Failed to load config file: {}", e))?;
        (config, Some(path))
    } else {
        let default_path = cwd.join(CONFIG_FILE_NAME);
        if default_path.exists() {
            let config = ProjectConfig::from_file(&default_path)
                .map_err(|e| anyhow::anyhow!("Failed to load {}: {}", CONFIG_FILE_NAME, e))?;
            (config, Some(default_path))
        } else {
            info!("No {} found, using defaults", CONFIG_FILE_NAME);
            (ProjectConfig::default(), None)
        }
    };

    let project_root = config_path
        .as_deref()
        .and_then(Path::parent)
        .map(Path::to_path_buf)
        .unwrap_or_else(|| cwd.clone());

    // Paths given on the command line are relative to where it was typed
    let overrides = CliOverrides {
        destination: cli.destination.as_ref().map(|d| cwd.join(d)),
        generator: cli.generator.clone(),
        out_flag: cli.out_flag.clone(),
        plugin_version: cli.plugin_version.clone(),
        plugin_policy: cli.plugin_policy,
        files: cli.files.iter().map(|f| cwd.join(f)).collect(),
        include_dirs: cli.include_dirs.iter().map(|d| cwd.join(d)).collect(),
    };
    config.merge(&overrides);

    Ok((config, config_path, project_root))
}

fn print_summary(report: &BuildReport, warnings: usize) {
    if let Some(ref version) = report.plugin_version {
        debug!("Plugin version: {}", version);
    }

    match report.outcome {
        BuildOutcome::Generated => {
            println!("Generated {} file(s)", report.targets.len());
            if report.cleaned > 0 {
                println!("Removed {} stale file(s)", report.cleaned);
            }
        }
        BuildOutcome::UpToDate => println!("Generated files are up to date"),
        BuildOutcome::NoSources => println!("No .proto files found, nothing to generate"),
    }

    if warnings > 0 {
        println!("Finished with {} warning(s)", warnings);
    }
}
