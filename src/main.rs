// Copyright 2024-2026 Modhost Contributors
// SPDX-License-Identifier: Apache-2.0

//! Modhost entry point.
//!
//! ## CLI Subcommands
//!
//! - `modhost` or `modhost serve` - Run the host (default)
//! - `modhost inspect <FILE>` - Classify an artifact
//! - `modhost config show|defaults|validate` - Configuration
//! - `modhost version` - Show version

use std::path::Path;
use std::process::ExitCode;
use std::sync::Arc;

use modhost::cli::{config_cmd, inspect_cmd};
use modhost::config;
use modhost::modules::StandaloneContainer;
use modhost::shutdown::ShutdownResult;
use modhost::telemetry::init_logging;
use modhost::Host;

#[tokio::main]
async fn main() -> ExitCode {
    let args: Vec<String> = std::env::args().collect();
    let command = args.get(1).map(|s| s.as_str()).unwrap_or("serve");

    match command {
        "serve" | "" => match run_serve().await {
            Ok(()) => ExitCode::SUCCESS,
            Err(e) => {
                eprintln!("Host error: {}", e);
                ExitCode::FAILURE
            }
        },
        "inspect" => {
            let Some(file) = args.get(2) else {
                eprintln!("Usage: modhost inspect <FILE> [--json]");
                return ExitCode::from(2u8);
            };
            let json = args.get(3).map(|s| s.as_str()) == Some("--json");
            ExitCode::from(inspect_cmd::run_inspect(Path::new(file), json) as u8)
        }
        "config" => {
            let subcommand = args.get(2).map(|s| s.as_str()).unwrap_or("show");
            match subcommand {
                "show" => ExitCode::from(config_cmd::run_show() as u8),
                "defaults" => {
                    config_cmd::run_defaults();
                    ExitCode::SUCCESS
                }
                "validate" => ExitCode::from(config_cmd::run_validate() as u8),
                _ => {
                    eprintln!("Unknown config subcommand: {}", subcommand);
                    print_command_help("config");
                    ExitCode::FAILURE
                }
            }
        }
        "help" | "--help" | "-h" => {
            if let Some(subcommand) = args.get(2) {
                print_command_help(subcommand);
            } else {
                print_usage();
            }
            ExitCode::SUCCESS
        }
        "version" | "--version" | "-V" => {
            println!("modhost {}", env!("CARGO_PKG_VERSION"));
            ExitCode::SUCCESS
        }
        _ => {
            eprintln!("Unknown command: {}", command);
            print_usage();
            ExitCode::FAILURE
        }
    }
}

fn print_usage() {
    let version = env!("CARGO_PKG_VERSION");
    eprintln!(
        "modhost - hot-swapping module host v{}

USAGE:
    modhost [COMMAND] [OPTIONS]

COMMANDS:
    serve        Watch the inbox and host modules (default)
    inspect      Show how an artifact would be classified
    config       Show or validate configuration
    version      Show version information
    help         Show this help message

ENVIRONMENT:
    MODHOST_CONFIG           Config file (default: ./modhost.toml if present)
    MODHOST_INBOX_DIR        Watched inbox directory
    MODHOST_LOG_LEVEL        Log filter (default: info)
    MODHOST_LOG_FORMAT       json or pretty
    See `modhost config defaults` for the full list.

EXIT CODES:
    0  Success
    1  Failure
    2  Usage error
",
        version
    );
}

fn print_command_help(command: &str) {
    match command {
        "serve" => {
            eprintln!(
                "modhost serve - Run the host

DESCRIPTION:
    Reinstalls modules already present in the category directories, then
    scans the inbox on a fixed delay. Artifacts are routed by their
    Driver-Type header and replace any running module with the same
    Bundle-SymbolicName once its driver is idle. Ctrl+C stops all modules.
"
            );
        }
        "inspect" => {
            eprintln!(
                "modhost inspect - Classify an artifact

USAGE:
    modhost inspect <FILE> [--json]

EXIT CODES:
    0  Artifact classified
    1  Artifact unreadable or malformed
"
            );
        }
        "config" => {
            eprintln!(
                "modhost config - Manage configuration

USAGE:
    modhost config <SUBCOMMAND>

SUBCOMMANDS:
    show           Show effective configuration
    defaults       Show built-in defaults
    validate       Check for misconfigurations
"
            );
        }
        _ => {
            eprintln!(
                "No detailed help available for '{}'. Use 'modhost help' for general usage.",
                command
            );
        }
    }
}

async fn run_serve() -> Result<(), Box<dyn std::error::Error>> {
    let mut settings = config::load()?;
    init_logging(&settings.log)?;

    // Relative directories are fixed against the startup working directory.
    settings.dirs = settings.dirs.ensure()?;
    tracing::info!(
        inbox = %settings.dirs.inbox.display(),
        core = %settings.dirs.core.display(),
        service = %settings.dirs.service.display(),
        custom = %settings.dirs.custom.display(),
        "starting modhost {}",
        env!("CARGO_PKG_VERSION")
    );

    let host = Host::new(settings, Arc::new(StandaloneContainer::new()));

    let recovered = host.recover().await;
    if !recovered.is_empty() {
        tracing::info!(modules = recovered.len(), "recovered installed modules");
    }

    let watcher = host.spawn_watcher();

    tokio::signal::ctrl_c().await?;
    tracing::info!("shutdown signal received, draining");

    let outcome = host.shutdown().await;
    let _ = watcher.await;

    match outcome.drain {
        ShutdownResult::Complete => {}
        ShutdownResult::Timeout { remaining } => {
            tracing::warn!(remaining, "shutdown drain timed out");
        }
    }
    tracing::info!(
        stopped = outcome.teardown.stopped,
        failed = outcome.teardown.failed.len(),
        "modhost stopped"
    );
    Ok(())
}
