//! `dgm-tracer` – signal logging.
//!
//! # Modules
//!
//! - [`tracer`] – the [`Tracer`] trait, its [`TracerState`] life cycle and
//!   the [`TracerTrigger`] scheduled on a device's `after` list.
//! - [`real_time`] – [`RealTimeTracer`]: buffers samples in memory during the
//!   control loop and writes them to one file per signal on dump.

pub mod real_time;
pub mod tracer;

pub use real_time::{DEFAULT_BUFFER_SIZE, RealTimeTracer};
pub use tracer::{SharedTracer, Tracer, TracerState, TracerTrigger, trigger_id};
