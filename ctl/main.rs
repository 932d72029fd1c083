#![forbid(unsafe_code)]

//! `reset-zone-ctl`: local CLI companion for `reset-zone`.
//!
//! Connects to the IPC socket and sends JSON commands to the daemon.

use std::io::{BufRead, BufReader, Write};
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use interprocess::local_socket::{traits::Stream as _, GenericNamespaced, Stream, ToNsName};

use reset_zone::zones::load_zone_list;

#[derive(Debug, Parser)]
#[command(
    name = "reset-zone-ctl",
    about = "Local CLI for the reset-zone daemon",
    version,
    long_about = None
)]
struct Cli {
    /// IPC socket name (must match the daemon's `ipc_name` config).
    #[arg(long, default_value = "reset-zone")]
    ipc_name: String,

    /// Shared secret matching the daemon's `ipc_auth_token`.
    #[arg(long, env = "RESET_ZONE_AUTH_TOKEN")]
    auth_token: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Show the pending-reset state.
    Status,

    /// Save, exit, and delete the given files while the server restarts.
    Reset {
        /// Save-relative file to delete (repeatable).
        #[arg(long = "path")]
        paths: Vec<String>,

        /// Zone `X_Y` whose map files are deleted (repeatable).
        #[arg(long = "zone")]
        zones: Vec<String>,

        /// File listing one zone per line.
        #[arg(long)]
        zones_file: Option<PathBuf>,
    },
}

fn main() {
    let args = Cli::parse();

    let mut request_json = match &args.command {
        Command::Status => serde_json::json!({ "command": "status" }),
        Command::Reset {
            paths,
            zones,
            zones_file,
        } => {
            let mut zones = zones.clone();
            if let Some(file) = zones_file {
                match load_zone_list(file) {
                    Ok(listed) => zones.extend(listed.iter().map(ToString::to_string)),
                    Err(err) => {
                        eprintln!("Error: {err}");
                        std::process::exit(1);
                    }
                }
            }
            serde_json::json!({ "command": "reset", "paths": paths, "zones": zones })
        }
    };

    if let Some(ref token) = args.auth_token {
        request_json["auth_token"] = serde_json::Value::String(token.clone());
    }

    match send_ipc_command(&args.ipc_name, &request_json) {
        Ok(response) => {
            if let Some(obj) = response.as_object() {
                let ok = obj
                    .get("ok")
                    .and_then(serde_json::Value::as_bool)
                    .unwrap_or(false);
                if ok {
                    if let Some(data) = obj.get("data") {
                        println!("{}", serde_json::to_string_pretty(data).unwrap_or_default());
                    } else {
                        println!("OK");
                    }
                } else {
                    let err_msg = obj
                        .get("error")
                        .and_then(|v| v.as_str())
                        .unwrap_or("unknown error");
                    eprintln!("Error: {err_msg}");
                    std::process::exit(1);
                }
            } else {
                println!("{response}");
            }
        }
        Err(err) => {
            eprintln!("Failed to connect to daemon: {err}");
            eprintln!("Is reset-zone running with ipc_name '{}'?", args.ipc_name);
            std::process::exit(1);
        }
    }
}

/// Connect to the IPC socket, send a JSON command, and read the response.
fn send_ipc_command(
    ipc_name: &str,
    request: &serde_json::Value,
) -> std::result::Result<serde_json::Value, Box<dyn std::error::Error>> {
    let name = ipc_name.to_ns_name::<GenericNamespaced>()?;
    let mut stream = Stream::connect(name)?;

    let mut request_line = serde_json::to_string(request)?;
    request_line.push('\n');
    stream.write_all(request_line.as_bytes())?;
    stream.flush()?;

    let mut reader = BufReader::new(&stream);
    let mut response_line = String::new();
    reader.read_line(&mut response_line)?;

    let response: serde_json::Value = serde_json::from_str(response_line.trim())?;
    Ok(response)
}
