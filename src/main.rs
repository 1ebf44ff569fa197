//! GPIO OSC Bridge
//!
//! Starts a QLab cue when a GPIO-over-Ethernet input goes high.

use anyhow::{Context, Result};
use clap::Parser;
use std::net::{Ipv4Addr, SocketAddr};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::time::{self, MissedTickBehavior};
use tracing::{error, info, warn, Level};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{filter::Targets, layer::SubscriberExt, util::SubscriberInitExt, Layer};

use gpio_osc_bridge::config::{ConfigReloader, FileConfigSource};
use gpio_osc_bridge::display::TerminalDisplay;
use gpio_osc_bridge::drivers::status::DEFAULT_STATUS_PORT;
use gpio_osc_bridge::drivers::{QlabDriver, StatusRequester};
use gpio_osc_bridge::gateway::{FAST_TICK, SLOW_TICK, STARTUP_DELAY};
use gpio_osc_bridge::net::{self, DEFAULT_LISTEN_PORT, DEFAULT_MULTICAST_GROUP, DEFAULT_OSC_BIND};
use gpio_osc_bridge::{FrameOutcome, Gateway, ERROR_LOG_TARGET};

/// GPIO OSC Bridge - Trigger QLab cues from GPIO-over-Ethernet inputs
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(short, long, env = "GPIO_OSC_CONFIG", default_value = "config.yaml")]
    config: PathBuf,

    /// Log level (error, warn, info, debug, trace)
    #[arg(short, long, env = "LOG_LEVEL", default_value = "info")]
    log_level: String,

    /// File receiving packet parsing and socket errors
    #[arg(long, default_value = "error.log")]
    error_log: PathBuf,

    /// UDP port boards multicast to
    #[arg(long, default_value_t = DEFAULT_LISTEN_PORT)]
    listen_port: u16,

    /// Multicast group boards multicast to
    #[arg(long, default_value_t = DEFAULT_MULTICAST_GROUP)]
    multicast_group: Ipv4Addr,

    /// Port boards accept status requests on
    #[arg(long, default_value_t = DEFAULT_STATUS_PORT)]
    status_port: u16,

    /// Local address OSC commands are sent from
    #[arg(long, default_value = DEFAULT_OSC_BIND)]
    osc_bind: SocketAddr,

    /// Disable the live status line
    #[arg(long)]
    no_status_line: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Load environment variables
    dotenvy::dotenv().ok();

    let args = Args::parse();

    let _error_log_guard = init_logging(&args.log_level, &args.error_log)?;

    // Invalid or missing configuration is fatal at startup only
    let config = ConfigReloader::new(Box::new(FileConfigSource::new(&args.config))).await?;

    let display = TerminalDisplay::new(!args.no_status_line);
    display.clear_screen();

    info!(
        "Starting GPIO OSC bridge (pin {}, cue {})",
        config.current().main.pin,
        config.current().main.cue()
    );

    let osc_socket = match net::bind_outbound(args.osc_bind).await {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            error!(target: ERROR_LOG_TARGET, "OSC binding error: {:#}", e);
            return Err(e);
        }
    };
    info!("🔸 OSC ready");

    let inbound = match net::bind_inbound(args.listen_port, args.multicast_group).await {
        Ok(socket) => Arc::new(socket),
        Err(e) => {
            error!(target: ERROR_LOG_TARGET, "UDP binding error: {:#}", e);
            return Err(e);
        }
    };
    info!("🔸 GPIO UDP socket ready");
    info!("🔸 Reading config every second");

    let mut gateway = Gateway::new(
        config,
        QlabDriver::new(osc_socket),
        StatusRequester::new(inbound.clone(), args.status_port),
    );
    gateway.resolve_endpoints().await;
    if let Some(endpoint) = gateway.endpoints().trigger {
        info!("🔸 Sending cues to {}", endpoint);
    }

    run_app(gateway, inbound, display, shutdown_signal()).await?;

    info!("GPIO OSC bridge shutdown complete");
    Ok(())
}

async fn run_app(
    mut gateway: Gateway,
    inbound: Arc<tokio::net::UdpSocket>,
    display: TerminalDisplay,
    shutdown: impl std::future::Future<Output = ()>,
) -> Result<()> {
    let start = time::Instant::now() + STARTUP_DELAY;

    let mut fast_tick = time::interval_at(start, FAST_TICK);
    fast_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let mut slow_tick = time::interval_at(start, SLOW_TICK);
    slow_tick.set_missed_tick_behavior(MissedTickBehavior::Skip);

    let placeholder = time::sleep_until(start);
    let mut placeholder_shown = false;

    let mut buf = vec![0u8; 65_536];

    tokio::pin!(shutdown);
    tokio::pin!(placeholder);

    loop {
        tokio::select! {
            // Inbound board frames
            received = inbound.recv_from(&mut buf) => {
                match received {
                    Ok((len, from)) => {
                        let outcome = gateway.handle_frame(&buf[..len], from, std::time::Instant::now());
                        if let FrameOutcome::Processed { status: Some(line), .. } = outcome {
                            display.show(&line);
                        }
                    }
                    Err(e) => {
                        // e.g. ICMP port unreachable surfaced on Windows; keep listening
                        warn!("UDP receive error: {}", e);
                    }
                }
            }

            // Startup line before the first frame
            _ = &mut placeholder, if !placeholder_shown => {
                placeholder_shown = true;
                if let Some(line) = gateway.show_placeholder(std::time::Instant::now()) {
                    display.show(&line);
                }
            }

            // Keepalive status request
            _ = fast_tick.tick() => {
                gateway.on_fast_tick();
            }

            // Countdown refresh and config reload
            _ = slow_tick.tick() => {
                if let Some(line) = gateway.on_slow_tick(std::time::Instant::now()).await {
                    display.show(&line);
                }
            }

            _ = &mut shutdown => {
                break;
            }
        }
    }

    display.finish();
    gateway.log_summary();

    Ok(())
}

/// Console output plus the error log file
///
/// The returned guard flushes the error log when dropped.
fn init_logging(level: &str, error_log: &Path) -> Result<WorkerGuard> {
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(level))
        // Parse errors go to the file only; they would tear the status line
        .add_directive(format!("{}=off", ERROR_LOG_TARGET).parse()?);

    let (error_writer, guard) = tracing_appender::non_blocking(error_log_appender(error_log)?);

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_thread_ids(false)
                .with_thread_names(false)
                .with_filter(filter),
        )
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(error_writer)
                .with_ansi(false)
                .with_target(false)
                .with_filter(Targets::new().with_target(ERROR_LOG_TARGET, Level::WARN)),
        )
        .init();

    Ok(guard)
}

/// Append-only error log file, created along with its directory
fn error_log_appender(path: &Path) -> Result<RollingFileAppender> {
    let directory = path
        .parent()
        .filter(|p| !p.as_os_str().is_empty())
        .unwrap_or_else(|| Path::new("."));
    let file_name = path
        .file_name()
        .ok_or_else(|| anyhow::anyhow!("Invalid error log path: {}", path.display()))?;

    RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name.to_string_lossy())
        .build(directory)
        .with_context(|| format!("Failed to open error log: {}", path.display()))
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!("Failed to install CTRL+C signal handler: {}", e);
        std::future::pending::<()>().await;
    }
    info!("Shutdown signal received");
}
