//! The [`Tracer`] trait and its periodic trigger.
//!
//! A tracer samples a set of signals at every trigger and persists the
//! samples to one file per signal.  The life cycle is
//!
//! ```text
//! Unopened --open--> Open --start--> Running --stop--> Stopped
//!     ^                                                   |
//!     +-------------------------close--------------------+
//! ```
//!
//! Only a `Running` tracer records samples.

use std::fmt;
use std::path::Path;
use std::sync::{Arc, Mutex, PoisonError};

use dgm_device::{Recompute, SignalPtr};
use dgm_types::DgmError;

/// Life-cycle state of a tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerState {
    Unopened,
    Open,
    Running,
    Stopped,
}

impl fmt::Display for TracerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TracerState::Unopened => write!(f, "unopened"),
            TracerState::Open => write!(f, "open"),
            TracerState::Running => write!(f, "running"),
            TracerState::Stopped => write!(f, "stopped"),
        }
    }
}

/// Shared handle to a tracer.
pub type SharedTracer = Arc<Mutex<dyn Tracer>>;

/// A signal logging facility.
pub trait Tracer: Send {
    /// Entity name, e.g. `"trace"`.
    fn name(&self) -> &str;

    fn state(&self) -> TracerState;

    /// Per-signal buffer budget in bytes.
    fn set_buffer_size(&mut self, bytes: usize);

    /// Create `dir` if needed and bind one file
    /// `<dir>/<prefix><stem><suffix>` to every traced signal.
    ///
    /// # Errors
    ///
    /// [`DgmError::TracerState`] unless `Unopened`; [`DgmError::Io`] when the
    /// directory or a file cannot be created.
    fn open(&mut self, dir: &Path, prefix: &str, suffix: &str) -> Result<(), DgmError>;

    /// Begin recording.
    ///
    /// # Errors
    ///
    /// [`DgmError::TracerState`] when the tracer has not been opened.
    fn start(&mut self) -> Result<(), DgmError>;

    /// Pause recording.  Stopping a tracer that is not running is a no-op.
    fn stop(&mut self) -> Result<(), DgmError>;

    /// Flush buffered samples to the trace files.
    ///
    /// # Errors
    ///
    /// [`DgmError::TracerState`] when no files are open; [`DgmError::Io`] on
    /// write failure.
    fn dump(&mut self) -> Result<(), DgmError>;

    /// Flush and release the trace files.  Closing an unopened tracer is a
    /// no-op.
    fn close(&mut self) -> Result<(), DgmError>;

    /// Forget every traced signal and its buffered samples.
    fn clear(&mut self);

    /// Trace `signal` into the file named after `file_stem`.
    ///
    /// # Errors
    ///
    /// [`DgmError::DuplicateEntry`] when `file_stem` is already traced.
    fn add(&mut self, signal: SignalPtr, file_stem: &str) -> Result<(), DgmError>;

    /// Sample every traced signal at `time`.  Ignored unless `Running`.
    fn record(&mut self, time: i64) -> Result<(), DgmError>;

    /// File stems of the traced signals, in registration order.
    fn traced(&self) -> Vec<String>;
}

/// Identifier under which the trigger of tracer `name` is scheduled.
pub fn trigger_id(name: &str) -> String {
    format!("{name}.trigger")
}

/// Periodic-call entry that makes a tracer record at each step.
pub struct TracerTrigger {
    tracer: SharedTracer,
}

impl TracerTrigger {
    pub fn new(tracer: SharedTracer) -> Arc<Self> {
        Arc::new(Self { tracer })
    }
}

impl Recompute for TracerTrigger {
    fn recompute(&self, time: i64) -> Result<(), DgmError> {
        self.tracer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .record(time)
    }
}
