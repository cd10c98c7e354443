//! ddpcast-mirror: entry point.
//!
//! ```text
//! ddpcast-mirror                      Mirror the desktop using ddpcast-mirror.toml
//! ddpcast-mirror --config <path>      Load a custom config TOML
//! ddpcast-mirror --gen-config         Write default config to stdout
//! ddpcast-mirror --probe              Print the selected capture backend as JSON
//! ddpcast-mirror --host <h> --port <p> --pattern
//! ```

use std::path::PathBuf;
use std::sync::Mutex;

use clap::Parser;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use ddpcast_mirror::config::MirrorFileConfig;
use ddpcast_mirror::service::MirrorService;

// ── CLI ──────────────────────────────────────────────────────────

#[derive(Parser, Debug)]
#[command(name = "ddpcast-mirror", about = "Mirror the screen onto a DDP LED matrix")]
struct Cli {
    /// Path to configuration TOML file.
    #[arg(short, long, default_value = "ddpcast-mirror.toml")]
    config: PathBuf,

    /// Print the default configuration to stdout and exit.
    #[arg(long)]
    gen_config: bool,

    /// Initialise the capture backend, print its capabilities and exit.
    #[arg(long)]
    probe: bool,

    /// Override the destination host.
    #[arg(long)]
    host: Option<String>,

    /// Override the destination port.
    #[arg(long)]
    port: Option<u16>,

    /// Send moving color bars instead of the desktop.
    #[arg(long)]
    pattern: bool,
}

// ── Main ─────────────────────────────────────────────────────────

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // --gen-config: dump defaults and exit.
    if cli.gen_config {
        let text = toml::to_string_pretty(&MirrorFileConfig::default())?;
        println!("{text}");
        return Ok(());
    }

    // Load config and apply CLI overrides. Problems are reported once
    // tracing is up.
    let loaded = MirrorFileConfig::load(&cli.config);
    let mut config = match &loaded {
        Ok(Some(config)) => config.clone(),
        _ => MirrorFileConfig::default(),
    };
    if let Some(host) = cli.host {
        config.network.host = host;
    }
    if let Some(port) = cli.port {
        config.network.port = port;
    }
    if cli.pattern {
        config.screen.source = "pattern".into();
    }

    // Init tracing.
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&config.logging.level));
    if config.logging.file.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    } else {
        let file = std::fs::OpenOptions::new()
            .create(true)
            .append(true)
            .open(&config.logging.file)?;
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_ansi(false)
            .with_writer(Mutex::new(file))
            .init();
    }

    match loaded {
        Ok(Some(_)) => info!("loaded config from {}", cli.config.display()),
        Ok(None) => info!("no config at {}; using defaults", cli.config.display()),
        Err(e) => warn!("invalid config {}: {e}; using defaults", cli.config.display()),
    }

    // --probe: report the backend that would be used and exit.
    if cli.probe {
        let caps = MirrorService::probe(&config)?;
        println!("{}", serde_json::to_string_pretty(&caps)?);
        return Ok(());
    }

    info!("ddpcast-mirror v{}", env!("CARGO_PKG_VERSION"));
    info!(
        "destination: {}:{}",
        config.network.host, config.network.port
    );
    info!(
        "matrix: {}x{} at {} fps",
        config.screen.width, config.screen.height, config.screen.fps
    );
    info!("source: {}", config.screen.source);

    let service = MirrorService::new(config);
    let stop = service.stop_handle();

    // Ctrl-C handler.
    tokio::spawn(async move {
        tokio::signal::ctrl_c().await.ok();
        info!("Ctrl-C received, shutting down");
        stop.store(false, std::sync::atomic::Ordering::SeqCst);
    });

    service.run().await?;

    Ok(())
}
