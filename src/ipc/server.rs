//! Local IPC trigger channel for `reset-zone-ctl`.
//!
//! Listens on a named pipe (Windows) or Unix domain socket (Linux/macOS)
//! using the `interprocess` crate. Accepts line-delimited JSON commands and
//! forwards reset requests to the [`ResetCoordinator`].
//!
//! ## Protocol
//!
//! Request (one JSON object per line):
//! ```json
//! {"command": "status"}
//! {"command": "reset", "paths": ["players/db.bin"], "zones": ["10_12"]}
//! ```
//!
//! Response (one JSON object per line):
//! ```json
//! {"ok": true, "data": { ... } }
//! {"ok": false, "error": "unauthorized"}
//! ```

use std::sync::Arc;

use interprocess::local_socket::{tokio::prelude::*, GenericNamespaced, ListenerOptions};
use serde::{Deserialize, Serialize};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio_util::sync::CancellationToken;
use tracing::{info, info_span, warn, Instrument};

use crate::config::GlobalConfig;
use crate::reset::ResetCoordinator;
use crate::zones::{expand_zones, Zone};
use crate::{AppError, Result};

/// State shared by all IPC connections.
#[derive(Debug)]
pub struct IpcState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Reset entry point.
    pub coordinator: Arc<ResetCoordinator>,
}

/// Inbound IPC request from `reset-zone-ctl`.
#[derive(Debug, Default, Deserialize)]
pub struct IpcRequest {
    /// Command verb.
    pub command: String,
    /// Relative save paths (for `reset`).
    #[serde(default)]
    pub paths: Option<Vec<String>>,
    /// Zones expanded through the configured templates (for `reset`).
    #[serde(default)]
    pub zones: Option<Vec<String>>,
    /// Shared-secret authentication token.
    #[serde(default)]
    pub auth_token: Option<String>,
}

/// Outbound IPC response to `reset-zone-ctl`.
#[derive(Debug, Serialize)]
pub struct IpcResponse {
    /// Whether the command succeeded.
    pub ok: bool,
    /// Payload on success.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    /// Error message on failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl IpcResponse {
    fn success(data: serde_json::Value) -> Self {
        Self {
            ok: true,
            data: Some(data),
            error: None,
        }
    }

    fn error(message: impl Into<String>) -> Self {
        Self {
            ok: false,
            data: None,
            error: Some(message.into()),
        }
    }
}

/// Spawn the IPC server task.
///
/// # Errors
///
/// Returns `AppError::Ipc` if the listener cannot be created.
pub fn spawn_ipc_server(
    state: Arc<IpcState>,
    ct: CancellationToken,
) -> Result<tokio::task::JoinHandle<()>> {
    let name = state.config.ipc_name.clone();

    let listener_name = name
        .clone()
        .to_ns_name::<GenericNamespaced>()
        .map_err(|err| AppError::Ipc(format!("invalid ipc socket name '{name}': {err}")))?;

    let listener = ListenerOptions::new()
        .name(listener_name)
        .create_tokio()
        .map_err(|err| AppError::Ipc(format!("failed to create ipc listener: {err}")))?;

    info!(ipc_name = %name, "IPC server listening");

    let handle = tokio::spawn(async move {
        let span = info_span!("ipc_server", name = %name);
        async move {
            loop {
                tokio::select! {
                    () = ct.cancelled() => {
                        info!("IPC server shutting down");
                        break;
                    }
                    accept_result = listener.accept() => {
                        match accept_result {
                            Ok(stream) => {
                                let state = Arc::clone(&state);
                                tokio::spawn(handle_connection(stream, state));
                            }
                            Err(err) => {
                                warn!(%err, "IPC accept failed");
                            }
                        }
                    }
                }
            }
        }
        .instrument(span)
        .await;
    });

    Ok(handle)
}

/// Handle a single IPC client connection.
async fn handle_connection(stream: interprocess::local_socket::tokio::Stream, state: Arc<IpcState>) {
    let span = info_span!("ipc_conn");
    async move {
        let (reader, mut writer) = stream.split();
        let mut buf_reader = BufReader::new(reader);
        let mut line = String::new();

        loop {
            line.clear();
            match buf_reader.read_line(&mut line).await {
                Ok(0) => break, // EOF
                Ok(_) => {
                    let trimmed = line.trim();
                    if trimmed.is_empty() {
                        continue;
                    }

                    let response = match serde_json::from_str::<IpcRequest>(trimmed) {
                        Ok(request) => dispatch_blocking(request, Arc::clone(&state)).await,
                        Err(err) => IpcResponse::error(format!("invalid json: {err}")),
                    };

                    let mut response_line = serde_json::to_string(&response).unwrap_or_else(|_| {
                        r#"{"ok":false,"error":"serialization failed"}"#.to_owned()
                    });
                    response_line.push('\n');

                    if let Err(err) = writer.write_all(response_line.as_bytes()).await {
                        warn!(%err, "failed to write ipc response");
                        break;
                    }
                }
                Err(err) => {
                    warn!(%err, "ipc read error");
                    break;
                }
            }
        }

        info!("IPC connection closed");
    }
    .instrument(span)
    .await;
}

/// Run [`dispatch_command`] on the blocking pool; a reset writes the
/// journal synchronously.
async fn dispatch_blocking(request: IpcRequest, state: Arc<IpcState>) -> IpcResponse {
    tokio::task::spawn_blocking(move || dispatch_command(&request, &state))
        .await
        .unwrap_or_else(|err| IpcResponse::error(format!("command handler failed: {err}")))
}

/// Route an IPC command to the appropriate handler.
#[must_use]
pub fn dispatch_command(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let span = info_span!("ipc_command", command = %request.command);
    let _guard = span.enter();

    if let Some(ref expected) = state.config.ipc_auth_token {
        match request.auth_token {
            Some(ref provided) if provided == expected => {}
            _ => {
                warn!(command = %request.command, "IPC request rejected: invalid auth token");
                return IpcResponse::error("unauthorized");
            }
        }
    }

    match request.command.as_str() {
        "status" => handle_status(state),
        "reset" => handle_reset(request, state),
        other => IpcResponse::error(format!("unknown command: {other}")),
    }
}

/// Report the pending-reset state.
fn handle_status(state: &IpcState) -> IpcResponse {
    let snapshot = state.coordinator.state().snapshot();
    match serde_json::to_value(&snapshot) {
        Ok(data) => IpcResponse::success(data),
        Err(err) => IpcResponse::error(format!("failed to encode status: {err}")),
    }
}

/// Queue paths and zones, then trigger save-and-exit.
fn handle_reset(request: &IpcRequest, state: &IpcState) -> IpcResponse {
    let zones = match request
        .zones
        .iter()
        .flatten()
        .map(String::as_str)
        .map(Zone::parse)
        .collect::<Result<Vec<_>>>()
    {
        Ok(zones) => zones,
        Err(err) => return IpcResponse::error(err.to_string()),
    };

    let mut paths = request.paths.clone().unwrap_or_default();
    paths.extend(expand_zones(&zones, &state.config.zone_templates));

    let scheduled = state.coordinator.schedule_reset(Some(paths));
    if !scheduled.accepted {
        return IpcResponse::error(format!(
            "reset {} is already being finalized; request not queued",
            scheduled.reset_id
        ));
    }
    info!(
        reset_id = %scheduled.reset_id,
        zones = zones.len(),
        queued = scheduled.queued,
        "reset requested via IPC"
    );

    IpcResponse::success(serde_json::json!({
        "reset_id": scheduled.reset_id,
        "queued": scheduled.queued,
        "activated": scheduled.activated,
    }))
}
