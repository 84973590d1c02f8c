//! # Flap Bridge
//!
//! Drive a servo flap from framed commands on a USB serial link, with
//! limit switches that stop it at either end of travel.
//!
//! # Control Flow
//!
//! 1. **Initialization**
//!    - Load configuration (first argument, default `config/default.toml`)
//!    - Set up logging with tracing subscriber
//!    - Configure the PWM channel and park the servo at rest
//!    - Start the limit-switch reader thread
//!    - Open the USB serial link
//!
//! 2. **Main Loop**
//!    - Poll the link every `poll_interval_ms`
//!    - Run open/close commands, echo anything else back
//!
//! 3. **Graceful Shutdown**
//!    - Ctrl+C stops the loop and parks the servo at rest
//!    - So does losing the limit-switch input, so the flap never runs
//!      without end-of-travel protection
//!
//! Expected output:
//! ```text
//! INFO flap_bridge: Flap Bridge v0.1.0 starting...
//! INFO flap_bridge::actuator::pwm: PWM period set to 50000 ticks (20000000 ns)
//! INFO flap_bridge::transport: Opened flap link at /dev/ttyACM0 (9600 baud)
//! INFO flap_bridge::control_loop: Control loop running (poll every 1ms)
//! ```

use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::time::Duration;
use tracing::{error, info, warn};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::EnvFilter;

use flap_bridge::actuator::pwm::SysfsPwm;
use flap_bridge::actuator::Actuator;
use flap_bridge::config::{Config, LoggingConfig};
use flap_bridge::control_loop::ControlLoop;
use flap_bridge::limits::gpio_keys::GpioKeysEdgeSource;
use flap_bridge::limits::{spawn_edge_source, EdgeDispatcher, LimitSwitchHandler, PendingFlags};
use flap_bridge::transport::SerialTransport;

/// Config file used when no path is given
const DEFAULT_CONFIG_PATH: &str = "config/default.toml";

/// Log file name prefix for the rolling appender
const LOG_FILE_PREFIX: &str = "flap-bridge.log";

#[tokio::main]
async fn main() -> Result<()> {
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| DEFAULT_CONFIG_PATH.to_string());
    let config = Config::load_or_default(&config_path)
        .with_context(|| format!("Failed to load configuration from {}", config_path))?;

    // Keep the guard alive so buffered log lines are flushed on exit
    let _log_guard = init_logging(&config.logging);

    info!("Flap Bridge v{} starting...", env!("CARGO_PKG_VERSION"));

    let pwm = SysfsPwm::open(&config.pwm)?;
    let actuator = Arc::new(Actuator::new(pwm, config.servo.limits())?);
    info!("Servo parked at rest (duty {})", actuator.duty());

    let limits_stopped = if config.limits.enabled {
        let pending = Arc::new(PendingFlags::new());
        let mut dispatcher = EdgeDispatcher::new(Arc::clone(&pending));
        LimitSwitchHandler::new(Arc::clone(&actuator), pending).attach(&mut dispatcher);

        let source = GpioKeysEdgeSource::open(&config.limits, dispatcher)?;
        let stopped = spawn_edge_source(Arc::clone(&actuator), move || source.run())
            .context("Failed to start limit switch thread")?;
        Some(stopped)
    } else {
        warn!("Limit switches disabled, flap travel is unbounded");
        None
    };

    let transport = SerialTransport::open(&config.serial)?;
    info!("Listening for commands on {}", transport.device_path());
    info!("Press Ctrl+C to exit");

    ControlLoop::new(transport, actuator)
        .run(Duration::from_millis(config.serial.poll_interval_ms), async {
            tokio::select! {
                result = tokio::signal::ctrl_c() => {
                    if let Err(e) = result {
                        error!("Failed to listen for Ctrl+C: {}", e);
                    }
                }
                _ = limits_lost(limits_stopped) => {
                    error!("Limit switch input lost, shutting down");
                }
            }
        })
        .await;

    Ok(())
}

/// Resolves when the limit-switch thread stops; never, if there is none
async fn limits_lost(stopped: Option<tokio::sync::oneshot::Receiver<()>>) {
    match stopped {
        Some(stopped) => {
            let _ = stopped.await;
        }
        None => std::future::pending().await,
    }
}

/// Install the tracing subscriber
///
/// `RUST_LOG` overrides the configured level. With a log directory set,
/// output goes to daily rolling files instead of stdout.
fn init_logging(config: &LoggingConfig) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    if config.directory.is_empty() {
        tracing_subscriber::fmt().with_env_filter(filter).init();
        return None;
    }

    let appender = tracing_appender::rolling::daily(&config.directory, LOG_FILE_PREFIX);
    let (writer, guard) = tracing_appender::non_blocking(appender);
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(writer)
        .with_ansi(false)
        .init();

    Some(guard)
}
