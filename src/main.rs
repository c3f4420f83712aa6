//! Drishti daemon
//!
//! Loads a scene from TOML, connects every sensor and runs the tracking tick
//! until Ctrl-C.

use drishti::{AppConfig, Error, Result, Scene};
use std::env;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;
use std::time::{Duration, Instant};

/// Parse config path from command line arguments.
///
/// Supports:
/// - `drishti <path>` (positional)
/// - `drishti --config <path>` (flag-based)
/// - `drishti -c <path>` (short flag)
///
/// Defaults to `/etc/drishti.toml` if not specified.
fn parse_config_path() -> String {
    let args: Vec<String> = env::args().collect();

    for i in 1..args.len() {
        if (args[i] == "--config" || args[i] == "-c") && i + 1 < args.len() {
            return args[i + 1].clone();
        }
    }

    if args.len() > 1 && !args[1].starts_with('-') {
        return args[1].clone();
    }

    "/etc/drishti.toml".to_string()
}

fn main() -> Result<()> {
    let config_path = parse_config_path();
    let config = AppConfig::from_file(&config_path)?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(config.logging.level.as_str()),
    )
    .init();

    log::info!("Drishti v{} starting...", env!("CARGO_PKG_VERSION"));
    log::info!("Using config: {}", config_path);

    if config.tick.rate_hz <= 0.0 {
        return Err(Error::Config(format!(
            "tick rate must be positive, got {}",
            config.tick.rate_hz
        )));
    }

    let mut scene = Scene::from_config(&config)?;
    log::info!(
        "{} sensors, {} zones",
        scene.sensors().len(),
        scene.zones().len()
    );

    let running = Arc::new(AtomicBool::new(true));
    let r = Arc::clone(&running);
    ctrlc::set_handler(move || {
        log::info!("Received shutdown signal");
        r.store(false, Ordering::Relaxed);
    })
    .map_err(|e| Error::Config(format!("Error setting Ctrl-C handler: {}", e)))?;

    scene.connect_all();
    log::info!("Drishti running. Press Ctrl-C to stop.");

    let period = Duration::from_secs_f32(1.0 / config.tick.rate_hz);
    let mut last = Instant::now();
    while running.load(Ordering::Relaxed) {
        let tick_start = Instant::now();
        let dt = tick_start.duration_since(last).as_secs_f32();
        last = tick_start;

        scene.update(dt);

        if log::log_enabled!(log::Level::Debug) {
            for zone in scene.zones() {
                for blob in zone.snapshot() {
                    log::debug!(
                        "[{}] blob {} at ({:.0}, {:.0}) mm, {} points",
                        zone.name(),
                        blob.index,
                        blob.centroid.x,
                        blob.centroid.y,
                        blob.point_count
                    );
                }
            }
        }

        if let Some(rest) = period.checked_sub(tick_start.elapsed()) {
            thread::sleep(rest);
        }
    }

    log::info!("Shutting down...");
    scene.close()?;
    log::info!("Drishti stopped");
    Ok(())
}
