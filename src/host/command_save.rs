//! Save capability backed by an external command.
//!
//! Game servers usually expose saving through an admin channel (RCON, a
//! console pipe). The daemon shells out to whatever client the operator
//! configures and treats a non-zero exit status as a failed save.

use std::process::{Command, Stdio};

use tracing::{info, warn};

use super::SaveCapability;
use crate::{AppError, Result};

/// Runs a configured program to persist host state.
#[derive(Debug, Clone, Default)]
pub struct CommandSave {
    argv: Vec<String>,
}

impl CommandSave {
    /// Build from a program followed by its arguments. An empty vector
    /// yields a no-op save.
    #[must_use]
    pub fn new(argv: Vec<String>) -> Self {
        Self { argv }
    }

    /// Whether a command is configured.
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.argv.is_empty()
    }
}

impl SaveCapability for CommandSave {
    fn save(&self, blocking: bool) -> Result<()> {
        let Some((program, args)) = self.argv.split_first() else {
            warn!("no save command configured; continuing without a host save");
            return Ok(());
        };

        let mut command = Command::new(program);
        command.args(args).stdin(Stdio::null());

        if !blocking {
            command
                .spawn()
                .map_err(|err| AppError::Save(format!("cannot start {program}: {err}")))?;
            info!(%program, "save command started");
            return Ok(());
        }

        let status = command
            .status()
            .map_err(|err| AppError::Save(format!("cannot run {program}: {err}")))?;

        if status.success() {
            info!(%program, "save command completed");
            Ok(())
        } else {
            Err(AppError::Save(format!("{program} exited with {status}")))
        }
    }
}
