use std::collections::BTreeSet;
use std::fs;
use std::io;
use std::path::{Path, PathBuf};
use tracing::debug;
use walkdir::WalkDir;

use crate::errors::BuildError;

/// True when a rename was refused because source and target live on different filesystems
pub fn is_cross_device(err: &io::Error) -> bool {
    err.kind() == io::ErrorKind::CrossesDevices
}

/// Move a file, creating the target's parent directories
pub fn move_file(from: &Path, to: &Path) -> io::Result<()> {
    move_file_with(from, to, |from, to| fs::rename(from, to))
}

/// [`move_file`] with the rename step supplied by the caller
///
/// Falls back to copy-then-delete when `rename` reports a cross-device error.
pub fn move_file_with<F>(from: &Path, to: &Path, rename: F) -> io::Result<()>
where
    F: Fn(&Path, &Path) -> io::Result<()>,
{
    if let Some(parent) = to.parent() {
        fs::create_dir_all(parent)?;
    }

    match rename(from, to) {
        Ok(()) => Ok(()),
        Err(e) if is_cross_device(&e) => {
            debug!("Cross-device move of {:?}, copying instead", from);
            fs::copy(from, to)?;
            fs::remove_file(from)
        }
        Err(e) => Err(e),
    }
}

/// Every regular file under `root`, in a stable order
pub fn collect_outputs(root: &Path) -> io::Result<Vec<PathBuf>> {
    let mut files = Vec::new();
    for entry in WalkDir::new(root).sort_by_file_name() {
        let entry = entry.map_err(io::Error::from)?;
        if entry.file_type().is_file() {
            files.push(entry.into_path());
        }
    }
    Ok(files)
}

/// Move everything under `staging` to the same relative path under `destination`
///
/// Each target is added to `moved` as soon as it lands, so on error `moved`
/// holds exactly the files that already reached the destination.
pub fn relocate_outputs(
    staging: &Path,
    destination: &Path,
    moved: &mut BTreeSet<PathBuf>,
) -> Result<(), BuildError> {
    let outputs = collect_outputs(staging).map_err(|e| BuildError::io(staging, e))?;

    for output in outputs {
        let relative = output
            .strip_prefix(staging)
            .map_err(|_| {
                BuildError::io(
                    &output,
                    io::Error::new(io::ErrorKind::InvalidData, "output escaped the staging directory"),
                )
            })?
            .to_path_buf();
        let target = destination.join(relative);

        move_file(&output, &target).map_err(|e| BuildError::io(&target, e))?;
        debug!("Generated {:?}", target);
        moved.insert(target);
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_move_file_creates_parents() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("staging/a.pb.ex");
        fs::create_dir_all(from.parent().unwrap()).unwrap();
        fs::write(&from, "defmodule A do end").unwrap();
        let to = temp_dir.path().join("lib/deep/a.pb.ex");

        move_file(&from, &to).unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "defmodule A do end");
    }

    #[test]
    fn test_cross_device_rename_falls_back_to_copy() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.pb.ex");
        fs::write(&from, "generated").unwrap();
        let to = temp_dir.path().join("out/a.pb.ex");

        move_file_with(&from, &to, |_, _| {
            Err(io::Error::from(io::ErrorKind::CrossesDevices))
        })
        .unwrap();

        assert!(!from.exists());
        assert_eq!(fs::read_to_string(&to).unwrap(), "generated");
    }

    #[test]
    fn test_other_rename_errors_propagate() {
        let temp_dir = TempDir::new().unwrap();
        let from = temp_dir.path().join("a.pb.ex");
        fs::write(&from, "generated").unwrap();
        let to = temp_dir.path().join("out/a.pb.ex");

        let err = move_file_with(&from, &to, |_, _| {
            Err(io::Error::new(io::ErrorKind::PermissionDenied, "nope"))
        })
        .unwrap_err();

        assert_eq!(err.kind(), io::ErrorKind::PermissionDenied);
        assert!(from.exists());
        assert!(!to.exists());
    }

    #[test]
    fn test_relocate_preserves_relative_layout() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("staging");
        let destination = temp_dir.path().join("lib");
        fs::create_dir_all(staging.join("my_app/v1")).unwrap();
        fs::write(staging.join("root.pb.ex"), "r").unwrap();
        fs::write(staging.join("my_app/v1/user.pb.ex"), "u").unwrap();

        let mut targets = BTreeSet::new();
        relocate_outputs(&staging, &destination, &mut targets).unwrap();

        let expected: BTreeSet<PathBuf> = [
            destination.join("root.pb.ex"),
            destination.join("my_app/v1/user.pb.ex"),
        ]
        .into_iter()
        .collect();
        assert_eq!(targets, expected);
        assert!(collect_outputs(&staging).unwrap().is_empty());
    }

    #[test]
    fn test_partial_relocation_reports_what_moved() {
        let temp_dir = TempDir::new().unwrap();
        let staging = temp_dir.path().join("staging");
        let destination = temp_dir.path().join("lib");
        fs::create_dir_all(staging.join("b")).unwrap();
        fs::write(staging.join("a.pb.ex"), "a").unwrap();
        fs::write(staging.join("b/c.pb.ex"), "c").unwrap();
        // `lib/b` must be a directory for the second move
        fs::create_dir_all(&destination).unwrap();
        fs::write(destination.join("b"), "in the way").unwrap();

        let mut moved = BTreeSet::new();
        let err = relocate_outputs(&staging, &destination, &mut moved).unwrap_err();

        assert!(matches!(err, BuildError::Io { .. }));
        let expected: BTreeSet<PathBuf> = [destination.join("a.pb.ex")].into_iter().collect();
        assert_eq!(moved, expected);
        assert_eq!(fs::read_to_string(destination.join("a.pb.ex")).unwrap(), "a");
    }

    #[test]
    fn test_cross_device_detection() {
        assert!(is_cross_device(&io::Error::from(io::ErrorKind::CrossesDevices)));
        assert!(!is_cross_device(&io::Error::from(io::ErrorKind::NotFound)));
    }
}
