//! `dgm` – runs a simulated device under a robot.
//!
//! The binary:
//!
//! 1. Initialises logging (and OTLP span export when configured).
//! 2. Loads `~/.dynamic_graph_manager/config.toml` (or `--config`), falling
//!    back to a default two-joint device.
//! 3. Builds the simulated device and the robot around it, which traces every
//!    device signal and publishes it on `/dg__device__<signal>`.
//! 4. Optionally serves the bus over WebSocket.
//! 5. Steps the device until `--steps` is reached or **Ctrl-C** is pressed,
//!    then tears the robot down so the traces are flushed to disk.

mod config;

use std::net::{Ipv4Addr, SocketAddr};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use std::time::Duration;

use clap::Parser;
use colored::Colorize;
use tracing::{error, info, warn};

use dgm_device::SimDevice;
use dgm_middleware::{EventBus, WsBridge};
use dgm_robot::{Robot, init_tracing};
use dgm_types::DgmError;

/// Run a simulated device with tracing and topic export.
#[derive(Parser, Debug)]
#[command(name = "dgm", version, about)]
struct Args {
    /// Configuration file (default: ~/.dynamic_graph_manager/config.toml)
    #[arg(short, long, value_name = "FILE")]
    config: Option<PathBuf>,

    /// Number of control steps to run; 0 runs until Ctrl-C
    #[arg(short, long, default_value_t = 0)]
    steps: u64,

    /// Serve the bus over WebSocket on this port
    #[arg(long, value_name = "PORT")]
    ws_port: Option<u16>,

    /// Write the effective configuration back to the config file and exit
    #[arg(long)]
    save_config: bool,
}

fn main() -> ExitCode {
    let _telemetry = init_tracing("dgm");
    let args = Args::parse();

    let path = args.config.clone().unwrap_or_else(config::config_path);
    let mut cfg = match config::load_from(&path) {
        Ok(Some(cfg)) => {
            println!("  Config loaded from {}", path.display().to_string().bold());
            cfg
        }
        Ok(None) => {
            let mut cfg = config::Config::default();
            config::apply_env_overrides(&mut cfg);
            cfg
        }
        Err(e) => {
            println!("{}: {}", "Config error".red(), e);
            println!("  Using default configuration.");
            config::Config::default()
        }
    };
    if args.ws_port.is_some() {
        cfg.ws_port = args.ws_port;
    }

    if args.save_config {
        return match config::save_to(&cfg, &path) {
            Ok(()) => {
                println!("  {} Config saved to {}", "✓".green().bold(), path.display().to_string().bold());
                ExitCode::SUCCESS
            }
            Err(e) => {
                println!("{}: {}", "Error saving config".red(), e);
                ExitCode::FAILURE
            }
        };
    }

    match run(&cfg, args.steps) {
        Ok(steps) => {
            println!("  {} Stopped after {} step(s).", "✓".green().bold(), steps);
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "dgm failed");
            println!("{}: {}", "Error".red().bold(), e);
            ExitCode::FAILURE
        }
    }
}

/// Build the device and robot, then step until done.  Returns the number of
/// steps executed.
fn run(cfg: &config::Config, steps: u64) -> Result<u64, DgmError> {
    let shutdown = Arc::new(AtomicBool::new(false));
    let shutdown_handler = Arc::clone(&shutdown);
    if let Err(e) = ctrlc::set_handler(move || {
        println!();
        println!("{}", "⚠  Ctrl-C received – stopping …".yellow().bold());
        shutdown_handler.store(true, Ordering::SeqCst);
    }) {
        warn!(error = %e, "failed to install Ctrl-C handler");
    }

    let device_config = cfg.device_config();
    let device = SimDevice::from_config(&device_config)?.into_shared();
    let bus = EventBus::default();

    let runtime = tokio::runtime::Runtime::new().map_err(|e| DgmError::Io(e.to_string()))?;
    if let Some(port) = cfg.ws_port {
        let addr = SocketAddr::from((Ipv4Addr::UNSPECIFIED, port));
        let bridge = WsBridge::new(bus.clone());
        runtime.spawn(async move {
            if let Err(e) = bridge.run_ws_server(addr).await {
                error!(error = %e, "websocket bridge stopped");
            }
        });
        println!("  WebSocket bridge on {}", addr.to_string().bold());
    }

    let mut robot = Robot::new(
        "robot",
        device.clone(),
        None,
        &cfg.param_store(),
        bus,
        cfg.robot.clone(),
    )?;
    if let Some(dir) = robot.tracer_log_dir() {
        println!("  Tracing to {}", dir.display().to_string().bold());
    }
    robot.start_tracer()?;

    let period = Duration::from_millis(cfg.period_ms);
    let sensors: Vec<(String, usize)> = device_config
        .sensors
        .iter()
        .map(|(name, spec)| (name.clone(), spec.size))
        .collect();
    let mut executed = 0;
    while !shutdown.load(Ordering::SeqCst) && (steps == 0 || executed < steps) {
        step_simulation(&device, &sensors)?;
        executed += 1;
        std::thread::sleep(period);
    }

    robot.shutdown()?;
    info!(steps = executed, "simulation finished");
    Ok(executed)
}

/// Feed every sensor a phase-shifted sine of the time index and step once.
fn step_simulation(device: &Arc<Mutex<SimDevice>>, sensors: &[(String, usize)]) -> Result<(), DgmError> {
    let mut device = device.lock().unwrap_or_else(PoisonError::into_inner);
    let t = (device.time() + 1) as f64 * 1e-3;
    for (name, size) in sensors {
        let values = (0..*size).map(|i| (t + i as f64).sin()).collect();
        device.set_sensor(name, values)?;
    }
    device.step();
    Ok(())
}
