use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use log::info;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;

use twoline::lcd::DevicePath;
use twoline_daemon::config::{Config, parse_config};
use twoline_daemon::server::{self, AppState};

#[derive(Parser, Debug)]
#[command(
    name = "twoline",
    about = "Shows queued messages on a serial character LCD and serves an HTTP API to manage them"
)]
struct Args {
    /// Path to the LCD device node, e.g. /dev/ttyACM0
    device: Option<String>,

    /// TOML config file; missing keys use their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    #[arg(long)]
    port: Option<u16>,

    #[arg(long)]
    host: Option<String>,

    /// Log at debug level
    #[arg(long)]
    debug: bool,
}

impl Args {
    fn apply(self, mut config: Config) -> Config {
        if let Some(device) = self.device {
            config.device = device;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(host) = self.host {
            config.host = host;
        }
        config.debug_mode |= self.debug;
        config
    }
}

fn main() -> Result<()> {
    let args = Args::parse();
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .context("failed to build tokio runtime")?;

    let config = match &args.config {
        Some(path) => runtime
            .block_on(parse_config(path))
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => Config::default(),
    };
    let config = args.apply(config);

    let level = if config.debug_mode {
        log::LevelFilter::Debug
    } else {
        log::LevelFilter::Info
    };
    twoline::init_logging(level);
    info!("twoline starting with LCD at {}", config.device);

    runtime.block_on(run(config))
}

async fn run(config: Config) -> Result<()> {
    let task_tracker = TaskTracker::new();
    let shutdown = CancellationToken::new();
    let web = twoline::system::spawn(
        &task_tracker,
        config.orchestrator_config(),
        config.driver_config(),
        Box::new(DevicePath::new(&config.device)),
        shutdown.clone(),
    );

    // must exceed the orchestrator's LCD round trip timeout
    let state = AppState::new(web, config.request_timeout() * 2);
    let addr = format!("{}:{}", config.host, config.port);
    let served = match TcpListener::bind(&addr).await {
        Ok(listener) => server::serve(listener, state, shutdown.clone())
            .await
            .context("HTTP server failed"),
        Err(e) => Err(e).with_context(|| format!("failed to bind {addr}")),
    };

    shutdown.cancel();
    task_tracker.close();
    task_tracker.wait().await;
    info!("twoline stopped");
    served
}
