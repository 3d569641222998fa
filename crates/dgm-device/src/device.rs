//! The [`Device`] trait: the robot entity at the root of the graph.
//!
//! A device exposes the sensor readings of the robot as output signals,
//! receives motor commands through input signals, and owns the two
//! [`PeriodicCall`] lists run around each control step.  The rest of the
//! stack only ever talks to the trait, so a hardware driver and the
//! [`SimDevice`][crate::sim::SimDevice] are interchangeable.

use std::sync::{Arc, Mutex};

use dgm_types::DgmError;

use crate::periodic_call::PeriodicCall;
use crate::signal::SignalPtr;

/// Which periodic call list of a device to address.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    /// Run after the sensors are read, before the graph is evaluated.
    Before,
    /// Run after the graph produced the motor controls.
    After,
}

/// Shared handle to a device.
pub type SharedDevice = Arc<Mutex<dyn Device>>;

/// The signal-bearing robot entity.
pub trait Device: Send {
    /// Entity name, e.g. `"device"`.
    fn name(&self) -> &str;

    /// Every signal the device exposes, in a stable order.
    fn signals(&self) -> Vec<SignalPtr>;

    /// Look a signal up by short or fully qualified name.
    ///
    /// # Errors
    ///
    /// Returns [`DgmError::UnknownSignal`] when the device has no such signal.
    fn signal(&self, name: &str) -> Result<SignalPtr, DgmError>;

    /// Mutable access to the `before` or `after` list.
    fn periodic_call(&mut self, stage: Stage) -> &mut PeriodicCall;

    /// Evaluate one control step at `time`: run `before`, pull the motor
    /// controls through the graph, run `after`.
    fn execute_graph(&mut self, time: i64);
}
