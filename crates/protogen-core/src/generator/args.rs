use indexmap::IndexSet;
use std::path::{Path, PathBuf};

use crate::config::GeneratorOptions;

/// Value of the generator's output flag
///
/// Options are appended in a fixed order (plugins, gen_descriptors,
/// package_prefix, transform_module, one_file_per_module). Without any
/// option the value is the bare output directory.
pub fn output_flag_value(options: &GeneratorOptions, output_dir: &Path) -> String {
    let mut parts = Vec::new();

    if !options.plugins.is_empty() {
        parts.push(format!("plugins={}", options.plugins.join("+")));
    }
    if options.gen_descriptors {
        parts.push("gen_descriptors=true".to_string());
    }
    if let Some(ref prefix) = options.package_prefix {
        parts.push(format!("package_prefix={}", prefix));
    }
    if let Some(ref module) = options.transform_module {
        parts.push(format!("transform_module={}", module));
    }
    if options.one_file_per_module {
        parts.push("one_file_per_module=true".to_string());
    }

    if parts.is_empty() {
        output_dir.display().to_string()
    } else {
        format!("{}:{}", parts.join(","), output_dir.display())
    }
}

/// One `-I` per distinct source parent (first occurrence order), then the extras
pub fn include_flags(sources: &[PathBuf], extra: &[PathBuf]) -> Vec<String> {
    let mut dirs: IndexSet<&Path> = sources
        .iter()
        .filter_map(|source| source.parent())
        .filter(|parent| !parent.as_os_str().is_empty())
        .collect();
    dirs.extend(extra.iter().map(PathBuf::as_path));

    dirs.into_iter()
        .map(|dir| format!("-I{}", dir.display()))
        .collect()
}

/// Full argument list: include flags, output flag, then every source
pub fn build_args(
    out_flag: &str,
    options: &GeneratorOptions,
    include_dirs: &[PathBuf],
    sources: &[PathBuf],
    output_dir: &Path,
) -> Vec<String> {
    let mut args = include_flags(sources, include_dirs);
    args.push(format!(
        "{}={}",
        out_flag,
        output_flag_value(options, output_dir)
    ));
    args.extend(sources.iter().map(|source| source.display().to_string()));
    args
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_no_options_is_bare_destination() {
        let value = output_flag_value(&GeneratorOptions::default(), Path::new("/out"));
        assert_eq!(value, "/out");
    }

    #[test]
    fn test_all_options_in_fixed_order() {
        let options = GeneratorOptions {
            plugins: vec!["grpc".to_string(), "validate".to_string()],
            gen_descriptors: true,
            package_prefix: Some("my_app".to_string()),
            transform_module: Some("MyApp.Transform".to_string()),
            one_file_per_module: true,
        };
        assert_eq!(
            output_flag_value(&options, Path::new("lib")),
            "plugins=grpc+validate,gen_descriptors=true,package_prefix=my_app,\
             transform_module=MyApp.Transform,one_file_per_module=true:lib"
        );
    }

    #[test]
    fn test_single_source_without_parent() {
        let args = build_args(
            "--out",
            &GeneratorOptions::default(),
            &[],
            &[PathBuf::from("a.proto")],
            Path::new("/out"),
        );
        assert_eq!(args, vec!["--out=/out", "a.proto"]);
    }

    #[test]
    fn test_include_per_parent_then_extras() {
        let args = build_args(
            "--out",
            &GeneratorOptions::default(),
            &[PathBuf::from("/inc")],
            &[PathBuf::from("/d1/a.proto"), PathBuf::from("/d2/b.proto")],
            Path::new("/dest"),
        );
        assert_eq!(
            args,
            vec![
                "-I/d1",
                "-I/d2",
                "-I/inc",
                "--out=/dest",
                "/d1/a.proto",
                "/d2/b.proto",
            ]
        );
    }

    #[test]
    fn test_shared_parent_emitted_once() {
        let flags = include_flags(
            &[
                PathBuf::from("/d1/a.proto"),
                PathBuf::from("/d2/b.proto"),
                PathBuf::from("/d1/c.proto"),
            ],
            &[PathBuf::from("/d2")],
        );
        assert_eq!(flags, vec!["-I/d1", "-I/d2"]);
    }

    #[test]
    fn test_custom_out_flag() {
        let options = GeneratorOptions {
            plugins: vec!["grpc".to_string()],
            ..Default::default()
        };
        let args = build_args(
            "--elixir_out",
            &options,
            &[],
            &[PathBuf::from("a.proto")],
            Path::new("lib"),
        );
        assert_eq!(args, vec!["--elixir_out=plugins=grpc:lib", "a.proto"]);
    }
}
