//! # Mirrorline Server
//!
//! The authoritative replication server.
//!
//! ## Usage
//!
//! ```bash
//! mirrorline_server --config server.toml --bind 0.0.0.0:7878 --tick-rate 30 --max-clients 64
//! ```

use std::process::ExitCode;
use std::time::Duration;

use mirrorline_networking::{init_tracing, serve_for, ServerConfig};

fn print_help() {
    println!("Usage: mirrorline_server [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -c, --config <PATH>        TOML config file");
    println!("  -b, --bind <ADDR>          Address to bind (default: 0.0.0.0:7878)");
    println!("  -t, --tick-rate <RATE>     Broadcast rate in Hz (default: 30)");
    println!("  -m, --max-clients <NUM>    Maximum clients (default: 64)");
    println!("  -d, --duration <SECS>      Run for N seconds then exit");
    println!("  -h, --help                 Show this help");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    // Parse command line arguments (simple parsing, no external deps)
    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut bind: Option<String> = None;
    let mut tick_rate: Option<u32> = None;
    let mut max_clients: Option<usize> = None;
    let mut duration_secs: Option<u64> = None;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--config" | "-c" => {
                config_path = value;
                i += 1;
            }
            "--bind" | "-b" => {
                bind = value;
                i += 1;
            }
            "--tick-rate" | "-t" => {
                tick_rate = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--max-clients" | "-m" => {
                max_clients = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--duration" | "-d" => {
                duration_secs = value.and_then(|v| v.parse().ok());
                i += 1;
            }
            "--help" | "-h" => {
                print_help();
                return ExitCode::SUCCESS;
            }
            other => tracing::warn!("Ignoring unknown argument {:?}", other),
        }
        i += 1;
    }

    let mut config = match config_path {
        Some(path) => match ServerConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("Failed to load {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => ServerConfig::default(),
    };
    if let Some(bind) = bind {
        match bind.parse() {
            Ok(addr) => config.bind_address = addr,
            Err(err) => {
                tracing::error!("Invalid bind address {:?}: {}", bind, err);
                return ExitCode::FAILURE;
            }
        }
    }
    if let Some(rate) = tick_rate {
        config.tick_rate = rate;
    }
    if let Some(max) = max_clients {
        config.max_clients = max;
    }

    tracing::info!(
        "Config: bind {} | {} Hz | max {} clients | duration {}",
        config.bind_address,
        config.tick_rate,
        config.max_clients,
        duration_secs.map_or_else(|| "infinite".to_string(), |d| format!("{d}s"))
    );

    match serve_for(config, duration_secs.map(Duration::from_secs)).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            tracing::error!("Server failed: {}", err);
            ExitCode::FAILURE
        }
    }
}
