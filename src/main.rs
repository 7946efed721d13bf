use clap::{Parser, ValueEnum};
use color_eyre::{eyre::eyre, Result};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tiltcontrol::config::AppConfig;
use tiltcontrol::connection::{ConnectionState, ConnectionSupervisor};
use tiltcontrol::mapping::{ControlSignal, MappingConfig};
use tiltcontrol::pipeline::{Pipeline, PipelineHandle};
use tiltcontrol::serial::{Connector, ReplayConnector, ReplayTransport, SerialConnector};
use tracing::{debug, info, warn, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "tiltcontrol")]
#[command(about = "Turns a serial IMU quaternion stream into a control signal", long_about = None)]
struct Cli {
    /// Config file, defaults to the user config directory
    #[arg(long)]
    config: Option<PathBuf>,

    /// Built-in mapping profile, overrides the config file
    #[arg(long, value_enum)]
    profile: Option<Profile>,

    /// Serial port name, overrides the config file
    #[arg(long)]
    port: Option<String>,

    /// Baud rate, overrides the config file
    #[arg(long)]
    baud: Option<u32>,

    /// Tick rate in Hz, overrides the config file
    #[arg(long)]
    rate_hz: Option<f32>,

    /// Replay a captured sensor log instead of opening the serial port
    #[arg(long)]
    replay: Option<PathBuf>,

    /// Write a default config file if none exists and exit
    #[arg(long)]
    write_default_config: bool,

    /// Debug logging
    #[arg(short, long)]
    verbose: bool,
}

#[derive(Clone, Copy, Debug, ValueEnum)]
enum Profile {
    Paddle,
    Bird,
    Maze,
}

impl Profile {
    fn name(self) -> &'static str {
        match self {
            Profile::Paddle => "paddle",
            Profile::Bird => "bird",
            Profile::Maze => "maze",
        }
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    setup(cli.verbose)?;

    let config_path = cli.config.clone().unwrap_or_else(AppConfig::default_path);
    if cli.write_default_config {
        if AppConfig::ensure_default_config(&config_path).await? {
            info!("Default config written to {}", config_path.display());
        } else {
            info!("Config already exists at {}", config_path.display());
        }
        return Ok(());
    }

    let config = resolve_config(&cli, &config_path).await?;
    let connector = build_connector(&cli, &config).await?;

    let supervisor = ConnectionSupervisor::new(connector, config.serial.reader_settings())
        .with_retry_policy(config.retry_policy());
    let pipeline = Pipeline::create(config.mapping.clone(), supervisor)
        .map_err(|e| eyre!("Failed to create pipeline: {}", e))?
        .initialize();

    let mut handle = PipelineHandle::spawn(pipeline, config.pipeline.tick_rate_hz)
        .map_err(|e| eyre!("Failed to spawn pipeline: {}", e))?;

    let mut signal_rx = handle.subscribe_signal();
    let mut diagnostics_rx = handle.subscribe_diagnostics();
    let mut report = tokio::time::interval(Duration::from_secs(1));
    let ctrl_c = tokio::signal::ctrl_c();
    tokio::pin!(ctrl_c);

    loop {
        tokio::select! {
            _ = &mut ctrl_c => {
                info!("Ctrl-C received");
                break;
            }

            changed = signal_rx.changed() => {
                if changed.is_err() {
                    warn!("Pipeline worker ended");
                    break;
                }
                debug!("Signal: {}", format_signal(&signal_rx.borrow_and_update()));
            }

            changed = diagnostics_rx.changed() => {
                if changed.is_err() {
                    break;
                }
                let state = diagnostics_rx.borrow_and_update().connection_state;
                if state == ConnectionState::Faulted && config.reconnect.is_none() {
                    info!("Sensor unavailable and no reconnect configured");
                    break;
                }
            }

            _ = report.tick() => {
                let diagnostics = handle.diagnostics();
                info!(
                    "{} | {} | frames {} | rejected {} | idle {} | skipped {}",
                    format_signal(&handle.signal()),
                    diagnostics.connection_state,
                    diagnostics.frames_applied,
                    diagnostics.parse_failures,
                    diagnostics.idle_ticks,
                    diagnostics.skipped_ticks,
                );
                if let Some(error) = &diagnostics.last_parse_error {
                    debug!("Last rejected frame: {}", error);
                }
            }
        }
    }

    let final_signal = handle
        .shutdown()
        .await
        .map_err(|e| eyre!("Pipeline shutdown failed: {}", e))?;
    info!("Final output: {}", format_signal(&final_signal));
    Ok(())
}

fn setup(verbose: bool) -> Result<()> {
    if std::env::var("RUST_LIB_BACKTRACE").is_err() {
        std::env::set_var("RUST_LIB_BACKTRACE", "0")
    }
    color_eyre::install()?;
    setup_logging_env(if verbose { Level::DEBUG } else { Level::INFO });
    Ok(())
}

fn setup_logging_env(level: Level) {
    FmtSubscriber::builder()
        .with_max_level(level)
        .with_target(false)
        .with_thread_ids(true)
        .with_file(true)
        .with_line_number(true)
        .pretty()
        .init();
}

async fn resolve_config(cli: &Cli, path: &Path) -> Result<AppConfig> {
    let mut config = AppConfig::load_or_default(path).await?;

    if let Some(profile) = cli.profile {
        config.mapping = MappingConfig::from_preset(profile.name())
            .map_err(|e| eyre!("Failed to load profile: {}", e))?;
    }
    if let Some(port) = &cli.port {
        config.serial.port_name = port.clone();
    }
    if let Some(baud) = cli.baud {
        config.serial.baud_rate = baud;
    }
    if let Some(rate) = cli.rate_hz {
        config.pipeline.tick_rate_hz = rate;
    }

    info!(
        "Profile '{}' on {} @ {} baud, {} Hz",
        config.mapping.name,
        config.serial.port_name,
        config.serial.baud_rate,
        config.pipeline.tick_rate_hz
    );
    Ok(config)
}

async fn build_connector(cli: &Cli, config: &AppConfig) -> Result<Box<dyn Connector>> {
    match &cli.replay {
        Some(path) => {
            let contents = tokio::fs::read_to_string(path)
                .await
                .map_err(|e| eyre!("Failed to read replay file {}: {}", path.display(), e))?;
            info!("Replaying {} lines from {}", contents.lines().count(), path.display());
            let transport = ReplayTransport::from_log(path.display().to_string(), &contents);
            Ok(Box::new(ReplayConnector::single(transport)))
        }
        None => Ok(Box::new(SerialConnector::new(config.serial.clone()))),
    }
}

fn format_signal(signal: &ControlSignal) -> String {
    match signal.values() {
        (value, None) => format!("output {value:.3}"),
        (first, Some(second)) => format!("output ({first:.3}, {second:.3})"),
    }
}
