use anyhow::{Context, Result};
use clap::Parser;
use linkbrain::config::{load_device_specs, DEFAULT_TCP_PORT};
use linkbrain::{ActionParser, CommandSink, Controller, ControllerConfig, Device, ToolRegistry, TransportMode};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, BufReader};
use tracing::{error, info, warn};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[derive(Parser)]
#[command(name = "linkbrain", version, about = "Drive a GPIO peer from generator output")]
struct Cli {
    /// point-to-point (ble) or stream-socket (tcp)
    #[arg(long, env = "LINKBRAIN_MODE", default_value = "point-to-point")]
    mode: TransportMode,

    /// Peer MAC address (ble) or host (tcp)
    #[arg(long, env = "LINKBRAIN_ADDRESS")]
    address: Option<String>,

    #[arg(long, env = "LINKBRAIN_PORT", default_value_t = DEFAULT_TCP_PORT)]
    port: u16,

    /// Connect timeout in seconds
    #[arg(long, env = "LINKBRAIN_TIMEOUT", default_value_t = 5.0)]
    timeout: f64,

    /// JSON device wiring file
    #[arg(long)]
    devices: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let timeout = Duration::try_from_secs_f64(cli.timeout)
        .with_context(|| format!("invalid timeout: {}", cli.timeout))?;
    let config = ControllerConfig {
        mode: cli.mode,
        address: cli.address,
        port: cli.port,
        timeout,
    };

    let controller = Arc::new(Controller::new(config)?);
    controller.connect().await.context("failed to connect to peer")?;
    info!(
        "Session up in {} mode: {:?}",
        controller.mode(),
        controller.state().await
    );

    let result = run(controller.clone(), cli.devices.as_deref()).await;

    controller.disconnect().await;
    result
}

async fn run(controller: Arc<Controller>, devices: Option<&Path>) -> Result<()> {
    let registry = build_registry(controller.clone(), devices).await?;
    let parser = ActionParser::new();

    info!("Ready, reading generator output from stdin");
    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    while let Some(line) = lines.next_line().await? {
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        if line.eq_ignore_ascii_case("status") {
            let status = controller.status().await;
            println!("{}", serde_json::to_string(&status)?);
            continue;
        }

        match parser.parse(line) {
            Ok(batch) => {
                let report = registry.execute_batch(&batch).await;
                println!("{}", serde_json::to_string(&report)?);
            }
            Err(e) => {
                warn!("Could not parse batch: {}", e);
                println!("{}", serde_json::json!({ "error": e.to_string() }));
            }
        }
    }

    info!("Input closed");
    Ok(())
}

async fn build_registry(controller: Arc<Controller>, devices: Option<&Path>) -> Result<ToolRegistry> {
    let mut registry = ToolRegistry::new();
    let Some(path) = devices else {
        warn!("No device wiring file given, registry is empty");
        return Ok(registry);
    };

    let specs = load_device_specs(path)
        .with_context(|| format!("failed to load device wiring from {}", path.display()))?;
    let sink: Arc<dyn CommandSink> = controller;

    for spec in &specs {
        match Device::from_spec(spec, sink.clone()) {
            Ok(device) => {
                device.init().await;
                registry.register_device(spec.name.clone(), Arc::new(device));
            }
            Err(e) => error!("Skipping device '{}': {}", spec.name, e),
        }
    }

    info!("{} devices registered", registry.len());
    Ok(registry)
}
