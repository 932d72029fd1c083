use std::path::Path;

use reset_zone::host::save_dir::validate_save_path;
use reset_zone::host::{PathResolver, SaveDirectory, StorageHost};
use reset_zone::AppError;

#[test]
fn allows_path_inside_save() {
    let temp = tempfile::tempdir().expect("tempdir");
    let root = temp.path();

    let validated = validate_save_path(root, "map/chunk_12_4.bin").expect("path valid");

    let canonical_root = root.canonicalize().expect("canonicalize root");
    assert!(validated.starts_with(&canonical_root));
    assert!(validated.ends_with(Path::new("map/chunk_12_4.bin")));
}

#[test]
fn allows_dot_segment_and_inner_parent() {
    let temp = tempfile::tempdir().expect("tempdir");
    let validated =
        validate_save_path(temp.path(), "./map/../players/db.bin").expect("path valid");
    assert!(validated.ends_with("players/db.bin"));
}

#[test]
fn rejects_traversal() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = validate_save_path(temp.path(), "map/../../secret.bin");
    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn rejects_absolute_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    let result = validate_save_path(temp.path(), "/etc/passwd");
    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn rejects_empty_path() {
    let temp = tempfile::tempdir().expect("tempdir");
    assert!(validate_save_path(temp.path(), "").is_err());
    assert!(validate_save_path(temp.path(), "./").is_err());
}

#[cfg(unix)]
#[test]
fn rejects_symlink_escape() {
    let temp = tempfile::tempdir().expect("tempdir");
    let save = temp.path().join("save");
    std::fs::create_dir_all(&save).expect("save dir");
    let outside = temp.path().join("outside.bin");
    std::fs::write(&outside, b"keep").expect("outside file");
    std::os::unix::fs::symlink(&outside, save.join("link.bin")).expect("symlink");

    let result = validate_save_path(&save, "link.bin");

    assert!(matches!(result, Err(AppError::PathViolation(_))));
}

#[test]
fn save_directory_resolves_and_reports_missing_root() {
    let temp = tempfile::tempdir().expect("tempdir");
    let present = SaveDirectory::new(temp.path());
    let resolver = present.current_save().expect("save available");
    assert!(resolver
        .resolve_save_path("zpop_1_1.bin")
        .expect("resolves")
        .ends_with("zpop_1_1.bin"));

    let missing = SaveDirectory::new(temp.path().join("missing"));
    assert!(matches!(
        missing.current_save().map(|_| ()),
        Err(AppError::Resolve(_))
    ));
}
