//! `dgm-robot` – tracing and transport glue around a device.
//!
//! A [`Robot`] takes a device and makes everything it exposes observable:
//! every device signal is traced to a file in the session log directory and
//! published on the message bus, and further signals can be added at run
//! time.  Everything the robot schedules on the device is removed again on
//! teardown.
//!
//! # Modules
//!
//! - [`robot`] – [`Robot`][robot::Robot]: construction, trace and export
//!   operations, tracer life cycle.
//! - [`config`] – [`RobotConfig`][config::RobotConfig]: tracer name and size,
//!   trace file naming, log directory parameter, publish downsampling.
//! - [`log_dir`] – [`resolve_log_dir`][log_dir::resolve_log_dir]: trace
//!   directory from the parameter service, or a timestamped directory under
//!   `~/.dynamic_graph_manager`.
//! - [`telemetry`] – [`init_tracing`][telemetry::init_tracing]: console logs
//!   plus optional OTLP span export.

pub mod config;
pub mod log_dir;
pub mod robot;
pub mod telemetry;

pub use config::RobotConfig;
pub use log_dir::{LOG_DIR_TIME_FORMAT, default_log_dir, home_dir, resolve_log_dir};
pub use robot::{Robot, TracerOwnership};
pub use telemetry::{LogFormat, TracerProviderGuard, init_tracing};
