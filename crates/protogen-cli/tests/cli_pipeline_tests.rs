//! End-to-end runs against stand-in `protoc` and plugin scripts.
//!
//! Everything lives in one test so no other thread forks while a script
//! is still open for writing.
#![cfg(unix)]

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use std::os::unix::fs::PermissionsExt;
use std::path::Path;
use tempfile::TempDir;

const FAKE_PROTOC: &str = r##"#!/bin/sh
out=""
for arg in "$@"; do
  case "$arg" in
    --*out=*) out="${arg#*=}" ;;
  esac
done
out="${out##*:}"
for arg in "$@"; do
  case "$arg" in
    *.proto) echo "# generated from $arg" > "$out/$(basename "$arg" .proto).pb.ex" ;;
  esac
done
"##;

const FAKE_PLUGIN: &str = r#"#!/bin/sh
echo "${FAKE_PLUGIN_VERSION:-0.12.0}"
"#;

fn install_script(dir: &Path, name: &str, body: &str) {
    let path = dir.join(name);
    fs::write(&path, body).unwrap();
    fs::set_permissions(&path, fs::Permissions::from_mode(0o755)).unwrap();
}

fn protogen_cmd(project: &TempDir, bin: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("protogen"));
    cmd.current_dir(project)
        .env("PATH", format!("{}:/usr/bin:/bin", bin.display()))
        .env_remove("FAKE_PLUGIN_VERSION")
        .arg("--no-color");
    cmd
}

#[test]
fn test_generate_skip_and_clean() {
    let project = TempDir::new().unwrap();
    let bin = project.path().join("bin");
    fs::create_dir_all(&bin).unwrap();
    install_script(&bin, "protoc", FAKE_PROTOC);
    install_script(&bin, "protoc-gen-elixir", FAKE_PLUGIN);

    fs::create_dir_all(project.path().join("proto/v1")).unwrap();
    fs::write(project.path().join("proto/user.proto"), "syntax = \"proto3\";\n").unwrap();
    fs::write(project.path().join("proto/v1/order.proto"), "syntax = \"proto3\";\n").unwrap();
    fs::write(
        project.path().join("protogen.yaml"),
        "sources:\n  paths: [proto]\ndestination: lib/generated\ngenerator:\n  outFlag: \"--elixir_out\"\n",
    )
    .unwrap();

    let generated = project.path().join("lib/generated");
    let manifest = project.path().join(".protogen/compile.protobuf.manifest");

    // First run generates everything
    protogen_cmd(&project, &bin)
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 2 file(s)"));
    assert!(generated.join("user.pb.ex").exists());
    assert!(generated.join("order.pb.ex").exists());
    assert!(manifest.exists());

    // Second run is a no-op that leaves the manifest alone
    let stamp = fs::metadata(&manifest).unwrap().modified().unwrap();
    protogen_cmd(&project, &bin)
        .assert()
        .success()
        .stdout(predicate::str::contains("up to date"));
    assert_eq!(fs::metadata(&manifest).unwrap().modified().unwrap(), stamp);

    // --force regenerates and reports what it removed first
    protogen_cmd(&project, &bin)
        .arg("--force")
        .assert()
        .success()
        .stdout(predicate::str::contains("Generated 2 file(s)"))
        .stdout(predicate::str::contains("Removed 2 stale file(s)"));

    // A mismatched plugin fails under the strict policy
    protogen_cmd(&project, &bin)
        .env("FAKE_PLUGIN_VERSION", "0.11.2")
        .args(["--plugin-policy", "fail"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("0.11.2"));

    // ... and only warns by default
    protogen_cmd(&project, &bin)
        .env("FAKE_PLUGIN_VERSION", "0.11.2")
        .assert()
        .success()
        .stderr(predicate::str::contains("warning"));

    // Clean removes generated files and the manifest, not the sources
    protogen_cmd(&project, &bin)
        .arg("--clean")
        .assert()
        .success()
        .stdout(predicate::str::contains("Removed 2 generated file(s)"));
    assert!(!generated.join("user.pb.ex").exists());
    assert!(!manifest.exists());
    assert!(project.path().join("proto/user.proto").exists());
}
