//! # Mirrorline Bots
//!
//! Headless clients standing in for real players: each one walks a circle,
//! fires now and then, and reports what its mirror holds.
//!
//! ## Usage
//!
//! ```bash
//! mirrorline_bot --server 127.0.0.1:7878 --bots 8 --duration 30
//! ```

use std::process::ExitCode;
use std::time::{Duration, Instant};

use mirrorline_networking::{init_tracing, ClientConfig, InputBatch, MirrorClient, NetResult};
use mirrorline_shared::{Bullet, Player, Quaternion, Vec3};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Radius of the walked circle in meters.
const CIRCLE_RADIUS: f32 = 5.0;
/// Angular speed in radians per second.
const ANGULAR_SPEED: f32 = 1.0;
/// Mean seconds between shots.
const FIRE_INTERVAL_SECS: f32 = 1.5;

fn print_help() {
    println!("Usage: mirrorline_bot [OPTIONS]");
    println!();
    println!("Options:");
    println!("  -s, --server <ADDR>        Server address (default: 127.0.0.1:7878)");
    println!("  -c, --config <PATH>        TOML client config file");
    println!("  -n, --bots <NUM>           Number of bots (default: 1)");
    println!("  -d, --duration <SECS>      Run for N seconds (default: 30)");
    println!("  -h, --help                 Show this help");
}

#[tokio::main]
async fn main() -> ExitCode {
    init_tracing();

    let args: Vec<String> = std::env::args().collect();
    let mut config_path: Option<String> = None;
    let mut server: Option<String> = None;
    let mut bots = 1usize;
    let mut duration_secs = 30u64;

    let mut i = 1;
    while i < args.len() {
        let value = args.get(i + 1).cloned();
        match args[i].as_str() {
            "--server" | "-s" => {
                server = value;
                i += 1;
            }
            "--config" | "-c" => {
                config_path = value;
                i += 1;
            }
            "--bots" | "-n" => {
                bots = value.and_then(|v| v.parse().ok()).unwrap_or(1);
                i += 1;
            }
            "--duration" | "-d" => {
                duration_secs = value.and_then(|v| v.parse().ok()).unwrap_or(30);
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
        Some(path) => match ClientConfig::load(&path) {
            Ok(config) => config,
            Err(err) => {
                tracing::error!("Failed to load {}: {}", path, err);
                return ExitCode::FAILURE;
            }
        },
        None => ClientConfig::default(),
    };
    if let Some(server) = server {
        config.server_address = server;
    }

    let duration = Duration::from_secs(duration_secs);
    let handles: Vec<_> = (0..bots)
        .map(|index| tokio::spawn(run_bot(index, config.clone(), duration)))
        .collect();

    let mut failures = 0;
    for handle in handles {
        match handle.await {
            Ok(Ok(())) => {}
            Ok(Err(err)) => {
                tracing::error!("Bot failed: {}", err);
                failures += 1;
            }
            Err(err) => {
                tracing::error!("Bot task panicked: {}", err);
                failures += 1;
            }
        }
    }

    if failures == 0 {
        ExitCode::SUCCESS
    } else {
        ExitCode::FAILURE
    }
}

async fn run_bot(index: usize, config: ClientConfig, duration: Duration) -> NetResult<()> {
    let mut client = MirrorClient::connect(&config).await?;
    let id = client.remote_id();
    let mut rng = StdRng::seed_from_u64(index as u64);
    let phase: f32 = rng.gen_range(0.0..std::f32::consts::TAU);

    let dt = 1.0 / config.send_rate.max(1) as f32;
    let mut interval = tokio::time::interval(Duration::from_secs_f32(dt));
    let start = Instant::now();
    let mut last_report = Instant::now();
    let mut shots = 0u32;

    while start.elapsed() < duration {
        interval.tick().await;

        if client.poll().disconnected {
            tracing::warn!("Bot {} lost its connection", index);
            break;
        }
        client.advance(dt);

        let angle = phase + start.elapsed().as_secs_f32() * ANGULAR_SPEED;
        let position = Vec3::new(angle.cos(), 0.0, angle.sin()) * CIRCLE_RADIUS;
        let heading = Vec3::new(-angle.sin(), 0.0, angle.cos());
        let player = Player {
            position,
            rotation: Quaternion::from_rotation_arc(-Vec3::Z, heading),
            id,
        };

        let mut batch = InputBatch::new();
        batch.update_player(id, player);
        if rng.gen::<f32>() < dt / FIRE_INTERVAL_SECS {
            let mut bullet: Bullet = player.fire();
            // lift slightly so the arc is visible
            bullet.velocity += Vec3::Y * 5.0;
            batch.fire(bullet);
            shots += 1;
        }
        client.send(batch)?;

        if last_report.elapsed() >= Duration::from_secs(5) {
            last_report = Instant::now();
            tracing::info!(
                "Bot {} (player {}): mirrors {} players, {} bullets, fired {}",
                index,
                id,
                client.live_count::<Player>(),
                client.live_count::<Bullet>(),
                shots
            );
        }
    }

    tracing::info!("Bot {} done after firing {} shots", index, shots);
    Ok(())
}
