//! Headless Android TV remote.
//!
//! Every subcommand builds the shared [`AppState`] and runs one or more
//! `ui_bridge` commands, so the CLI exercises exactly the code a desktop
//! front end would.
//!
//! # Examples
//!
//! ```text
//! atv-remote discover
//! atv-remote scan --timeout 10 --attempts 2
//! atv-remote pair 192.168.1.20
//! atv-remote send 192.168.1.20 HOME DPAD_DOWN DPAD_CENTER
//! atv-remote ble-send AA:BB:CC:DD:EE:FF VOLUME_UP
//! atv-remote history --favorite 192.168.1.20 true
//! ```
//!
//! Ctrl-C at any point disconnects cleanly before exiting.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{bail, Context};
use async_trait::async_trait;
use clap::{Parser, Subcommand};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader, Stdin};
use tokio::sync::Mutex;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use atv_remote::application::pair_remote::CodeProvider;
use atv_remote::application::status::FnObserver;
use atv_remote::infrastructure::storage::config::{load_config, load_config_from};
use atv_remote::infrastructure::ui_bridge::{self, AppState, CommandResult, ConnectionStatusDto};

#[derive(Debug, Parser)]
#[command(name = "atv-remote", about = "Discover, pair with and control Android TV devices", version)]
struct Cli {
    /// Config file to use instead of the platform default.
    #[arg(long, global = true, env = "ATV_REMOTE_CONFIG")]
    config: Option<PathBuf>,

    /// Overrides `general.log_level` when `RUST_LOG` is unset.
    #[arg(long, global = true, env = "ATV_REMOTE_LOG")]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Browse mDNS for Android TV devices on the LAN.
    Discover,
    /// Scan for Android TV devices over Bluetooth LE.
    Scan {
        /// Seconds per scan attempt.
        #[arg(long)]
        timeout: Option<u64>,
        #[arg(long)]
        attempts: Option<u32>,
    },
    /// Pair with a TV; prompts for the code shown on screen.
    Pair { address: String },
    /// Send keys to a paired TV over the network.
    Send {
        address: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Send keys to a TV over Bluetooth HID.
    BleSend {
        address: String,
        #[arg(required = true)]
        keys: Vec<String>,
    },
    /// Show previously connected devices, or flag one as a favorite.
    History {
        #[arg(long, num_args = 2, value_names = ["ADDRESS", "FAVORITE"])]
        favorite: Option<Vec<String>>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let mut config = match &cli.config {
        Some(path) => load_config_from(path)
            .with_context(|| format!("failed to load config from {}", path.display()))?,
        None => load_config().context("failed to load config")?,
    };
    if let Some(level) = &cli.log_level {
        config.general.log_level = level.clone();
    }
    if let Command::Scan { timeout, attempts } = &cli.command {
        if let Some(t) = timeout {
            config.bluetooth.scan_timeout_secs = *t;
        }
        if let Some(a) = attempts {
            config.bluetooth.scan_attempts = *a;
        }
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.general.log_level)),
        )
        .init();

    let state = AppState::with_config(config)
        .await
        .context("failed to initialise application state")?;
    let printer = |connected: bool, message: &str| {
        info!("[{}] {message}", if connected { "up" } else { "down" });
    };
    let _ = state.remote.notifier().subscribe(Arc::new(FnObserver(printer)));
    let _ = state.ble.notifier().subscribe(Arc::new(FnObserver(printer)));

    let outcome = tokio::select! {
        result = run(Arc::clone(&state), cli.command) => result,
        signal = tokio::signal::ctrl_c() => {
            if let Err(e) = signal {
                warn!("failed to listen for Ctrl-C: {e}");
            }
            info!("interrupted");
            Ok(())
        }
    };

    ui_bridge::disconnect(state).await;
    outcome
}

async fn run(state: Arc<AppState>, command: Command) -> anyhow::Result<()> {
    match command {
        Command::Discover => {
            let devices = unwrap(ui_bridge::discover_network_devices(state).await)?;
            if devices.is_empty() {
                println!("No Android TV devices found.");
            }
            for device in devices {
                println!("{}", device.address);
            }
        }
        Command::Scan { .. } => {
            let devices = unwrap(ui_bridge::discover_bluetooth_devices(state).await)?;
            if devices.is_empty() {
                println!("No Bluetooth devices found.");
            }
            for device in devices {
                println!(
                    "{:<20} {:>5}  {}",
                    device.address,
                    device.quality_score.unwrap_or_default(),
                    device.name
                );
            }
        }
        Command::Pair { address } => {
            let codes = StdinCodes::new();
            let status = unwrap(ui_bridge::pair_network_device(state, address, &codes).await)?;
            print_status(&status);
        }
        Command::Send { address, keys } => {
            let status = unwrap(ui_bridge::connect_network_device(Arc::clone(&state), address).await)?;
            print_status(&status);
            send_all(&state, keys).await?;
        }
        Command::BleSend { address, keys } => {
            let status = unwrap(ui_bridge::connect_bluetooth_device(Arc::clone(&state), address).await)?;
            print_status(&status);
            send_all(&state, keys).await?;
        }
        Command::History { favorite } => {
            if let Some(args) = favorite {
                let [address, flag] = args.as_slice() else {
                    bail!("--favorite takes an address and true|false");
                };
                let flag: bool = flag
                    .parse()
                    .with_context(|| format!("expected true or false, got '{flag}'"))?;
                if !unwrap(ui_bridge::set_favorite(Arc::clone(&state), address.clone(), flag).await)? {
                    bail!("{address} is not in the history");
                }
            }
            for entry in unwrap(ui_bridge::get_history(state).await)? {
                println!(
                    "{} {:<16} {:<24} {}",
                    if entry.favorite { "*" } else { " " },
                    entry.ip,
                    entry.device_name,
                    entry.last_connected.to_rfc3339()
                );
            }
        }
    }
    Ok(())
}

async fn send_all(state: &Arc<AppState>, keys: Vec<String>) -> anyhow::Result<()> {
    for key in keys {
        unwrap(ui_bridge::send_key(Arc::clone(state), key.clone()).await)
            .with_context(|| format!("failed to send {key}"))?;
        info!("sent {key}");
    }
    Ok(())
}

fn unwrap<T: serde::Serialize>(result: CommandResult<T>) -> anyhow::Result<T> {
    match (result.success, result.data) {
        (true, Some(data)) => Ok(data),
        _ => bail!(result.error.unwrap_or_else(|| "command failed".to_string())),
    }
}

fn print_status(status: &ConnectionStatusDto) {
    let who = status
        .device_name
        .clone()
        .or_else(|| status.address.clone())
        .unwrap_or_default();
    println!("{} ({})", who, status.state);
}

/// Reads pairing codes from stdin.  An empty line or EOF cancels.
struct StdinCodes {
    lines: Mutex<BufReader<Stdin>>,
}

impl StdinCodes {
    fn new() -> Self {
        Self {
            lines: Mutex::new(BufReader::new(tokio::io::stdin())),
        }
    }
}

#[async_trait]
impl CodeProvider for StdinCodes {
    async fn provide_code(&self) -> (String, bool) {
        let mut stdout = tokio::io::stdout();
        let _ = stdout
            .write_all(b"Enter the code shown on the TV (empty line cancels): ")
            .await;
        let _ = stdout.flush().await;

        let mut line = String::new();
        match self.lines.lock().await.read_line(&mut line).await {
            Ok(0) | Err(_) => (String::new(), false),
            Ok(_) => {
                let code = line.trim().to_string();
                let confirmed = !code.is_empty();
                (code, confirmed)
            }
        }
    }
}
