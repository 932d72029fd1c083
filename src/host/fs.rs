//! Local file-system removal and real process exit.

use std::io::ErrorKind;
use std::path::Path;

use super::{FileRemover, ProcessExit, Removal};
use crate::{AppError, Result};

/// Removes files with `std::fs::remove_file`.
#[derive(Debug, Clone, Copy, Default)]
pub struct FsRemover;

impl FileRemover for FsRemover {
    fn remove_if_exists(&self, path: &Path) -> Result<Removal> {
        match std::fs::remove_file(path) {
            Ok(()) => Ok(Removal::Deleted),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(Removal::Absent),
            Err(err) => Err(AppError::Delete(format!(
                "cannot remove {}: {err}",
                path.display()
            ))),
        }
    }
}

/// Ends the process through `std::process::exit`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ProcessExiter;

impl ProcessExit for ProcessExiter {
    fn exit(&self, code: i32) {
        std::process::exit(code);
    }
}
