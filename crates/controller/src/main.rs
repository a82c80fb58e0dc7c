mod config;
mod keepalive;
mod publisher;
mod service;
mod state_machine;
mod status;

use anyhow::{Context, Result};
use common::setup_logging;
use config::ControllerConfig;
use service::ControllerService;
use signal_hook::consts::{SIGINT, SIGTERM};
use std::sync::Arc;
use std::sync::atomic::AtomicBool;

fn main() -> Result<()> {
    let config = ControllerConfig::from_env()?;
    setup_logging(config.environment);

    let shutdown = Arc::new(AtomicBool::new(false));
    signal_hook::flag::register(SIGTERM, Arc::clone(&shutdown))
        .context("Failed to register SIGTERM handler")?;
    signal_hook::flag::register(SIGINT, Arc::clone(&shutdown))
        .context("Failed to register SIGINT handler")?;

    tracing::info!(
        serial_port = %config.serial_port,
        camera = %config.camera_uri,
        broker = %format!("{}:{}", config.mqtt_broker_host, config.mqtt_broker_port),
        "Controller starting"
    );

    let service = ControllerService::new(config)?;
    service.run(&shutdown)
}
