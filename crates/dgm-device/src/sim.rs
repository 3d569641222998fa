//! In-process simulated device for running the stack without hardware.
//!
//! [`SimDevice`] is built from a [`DeviceConfig`] listing the robot's
//! sensors and motor controls with their vector sizes, the same layout a
//! hardware device reads from its parameter file:
//!
//! ```toml
//! name = "device"
//!
//! [sensors.joint_positions]
//! size = 2
//!
//! [controls.ctrl_joint_torques]
//! size = 2
//! ```
//!
//! Sensors become output signals named
//! `Device(<name>)::output(vector<size>d)::<sensor>` and controls become input
//! signals named `Device(<name>)::input(vector<size>d)::<control>`.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex};

use dgm_types::{DgmError, short_name};
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use crate::device::{Device, Stage};
use crate::periodic_call::PeriodicCall;
use crate::signal::{Signal, SignalPtr};

/// Size of one sensor or control vector.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct HardwareSpec {
    pub size: usize,
}

/// Sensor and control layout of a device.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DeviceConfig {
    #[serde(default = "default_device_name")]
    pub name: String,

    #[serde(default)]
    pub sensors: BTreeMap<String, HardwareSpec>,

    #[serde(default)]
    pub controls: BTreeMap<String, HardwareSpec>,
}

fn default_device_name() -> String {
    "device".to_string()
}

impl Default for DeviceConfig {
    fn default() -> Self {
        Self {
            name: default_device_name(),
            sensors: BTreeMap::new(),
            controls: BTreeMap::new(),
        }
    }
}

impl DeviceConfig {
    /// Builder-style helper adding a sensor of `size` values.
    pub fn with_sensor(mut self, name: impl Into<String>, size: usize) -> Self {
        self.sensors.insert(name.into(), HardwareSpec { size });
        self
    }

    /// Builder-style helper adding a control of `size` values.
    pub fn with_control(mut self, name: impl Into<String>, size: usize) -> Self {
        self.controls.insert(name.into(), HardwareSpec { size });
        self
    }
}

/// A simulated device whose sensors are written by the caller.
pub struct SimDevice {
    name: String,
    sensors: BTreeMap<String, SignalPtr>,
    controls: BTreeMap<String, SignalPtr>,
    before: PeriodicCall,
    after: PeriodicCall,
    time: i64,
}

impl SimDevice {
    /// Build a device from its layout.
    ///
    /// # Errors
    ///
    /// Returns [`DgmError::DuplicateEntry`] when a sensor and a control share
    /// a name.
    pub fn from_config(config: &DeviceConfig) -> Result<Self, DgmError> {
        let name = config.name.clone();
        let mut sensors = BTreeMap::new();
        for (hw, spec) in &config.sensors {
            let sig_name = format!("Device({name})::output(vector{}d)::{hw}", spec.size);
            sensors.insert(hw.clone(), Signal::new(sig_name, vec![0.0; spec.size]));
        }

        let mut controls = BTreeMap::new();
        for (hw, spec) in &config.controls {
            if sensors.contains_key(hw) {
                return Err(DgmError::DuplicateEntry(hw.clone()));
            }
            let sig_name = format!("Device({name})::input(vector{}d)::{hw}", spec.size);
            controls.insert(hw.clone(), Signal::new(sig_name, vec![0.0; spec.size]));
        }

        debug!(
            device = %name,
            sensors = sensors.len(),
            controls = controls.len(),
            "simulated device created"
        );

        Ok(Self {
            name,
            sensors,
            controls,
            before: PeriodicCall::new(),
            after: PeriodicCall::new(),
            time: 0,
        })
    }

    /// Wrap the device into a shared handle.
    pub fn into_shared(self) -> Arc<Mutex<SimDevice>> {
        Arc::new(Mutex::new(self))
    }

    /// Write a sensor reading, stamped with the current time index.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] for an unknown sensor,
    /// [`DgmError::SizeMismatch`] when `values` has the wrong length.
    pub fn set_sensor(&mut self, name: &str, values: Vec<f64>) -> Result<(), DgmError> {
        let signal = self
            .sensors
            .get(name)
            .ok_or_else(|| DgmError::UnknownSignal(name.to_string()))?;
        let expected = signal.value().len();
        if values.len() != expected {
            return Err(DgmError::SizeMismatch {
                signal: name.to_string(),
                expected,
                got: values.len(),
            });
        }
        signal.set_value(values, self.time);
        Ok(())
    }

    /// Last motor command received on control `name`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] for an unknown control.
    pub fn control(&self, name: &str) -> Result<Vec<f64>, DgmError> {
        self.controls
            .get(name)
            .map(|s| s.value())
            .ok_or_else(|| DgmError::UnknownSignal(name.to_string()))
    }

    /// Current time index.
    pub fn time(&self) -> i64 {
        self.time
    }

    /// Advance the time index by one and evaluate the graph.
    pub fn step(&mut self) {
        self.time += 1;
        let time = self.time;
        self.execute_graph(time);
    }
}

impl Device for SimDevice {
    fn name(&self) -> &str {
        &self.name
    }

    fn signals(&self) -> Vec<SignalPtr> {
        self.sensors
            .values()
            .chain(self.controls.values())
            .cloned()
            .collect()
    }

    fn signal(&self, name: &str) -> Result<SignalPtr, DgmError> {
        let short = short_name(name);
        self.sensors
            .get(short)
            .or_else(|| self.controls.get(short))
            .cloned()
            .ok_or_else(|| DgmError::UnknownSignal(name.to_string()))
    }

    fn periodic_call(&mut self, stage: Stage) -> &mut PeriodicCall {
        match stage {
            Stage::Before => &mut self.before,
            Stage::After => &mut self.after,
        }
    }

    fn execute_graph(&mut self, time: i64) {
        let failed = self.before.run(time);
        if failed > 0 {
            warn!(device = %self.name, time, failed, "errors in periodic commands (before)");
        }

        for control in self.controls.values() {
            control.access(time);
        }

        let failed = self.after.run(time);
        if failed > 0 {
            warn!(device = %self.name, time, failed, "errors in periodic commands (after)");
        }
    }
}
