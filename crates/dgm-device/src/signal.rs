//! [`Signal`] – a named, time-indexed vector value in the graph.
//!
//! A signal either holds a value written from outside (a sensor reading),
//! computes its value from a function of the time index, or is *plugged* into
//! another signal and mirrors it.  Reading a signal at a time index through
//! [`Signal::access`] refreshes it when it is out of date.

use std::fmt;
use std::sync::{Arc, PoisonError, RwLock};

use dgm_types::{DgmError, short_name};

use crate::periodic_call::Recompute;

/// Shared handle to a [`Signal`].
pub type SignalPtr = Arc<Signal>;

/// Function computing a signal value from the graph time index.
pub type SignalFn = Box<dyn Fn(i64) -> Vec<f64> + Send + Sync>;

#[derive(Debug, Clone, Default)]
struct SignalState {
    time: i64,
    value: Vec<f64>,
}

/// A named vector-valued signal.
pub struct Signal {
    name: String,
    state: RwLock<SignalState>,
    function: Option<SignalFn>,
    source: RwLock<Option<SignalPtr>>,
}

impl Signal {
    /// Create a constant-until-written signal holding `value` at time 0.
    pub fn new(name: impl Into<String>, value: Vec<f64>) -> SignalPtr {
        Arc::new(Self {
            name: name.into(),
            state: RwLock::new(SignalState { time: 0, value }),
            function: None,
            source: RwLock::new(None),
        })
    }

    /// Create a signal whose value is recomputed from `function` whenever it is
    /// accessed at a newer time index.
    pub fn with_function(name: impl Into<String>, function: SignalFn) -> SignalPtr {
        Arc::new(Self {
            name: name.into(),
            state: RwLock::new(SignalState::default()),
            function: Some(function),
            source: RwLock::new(None),
        })
    }

    /// Fully qualified name, e.g. `Device(robot)::output(vector3d)::joint_positions`.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Segment after the last `::`.
    pub fn short_name(&self) -> &str {
        short_name(&self.name)
    }

    /// Current value without refreshing.
    pub fn value(&self) -> Vec<f64> {
        self.state
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .value
            .clone()
    }

    /// Time index of the last update.
    pub fn time(&self) -> i64 {
        self.state.read().unwrap_or_else(PoisonError::into_inner).time
    }

    /// Overwrite the value and stamp it with `time`.
    pub fn set_value(&self, value: Vec<f64>, time: i64) {
        let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
        state.value = value;
        state.time = time;
    }

    /// Mirror `source` from now on.  Replaces any previous plug.
    pub fn plug(&self, source: SignalPtr) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = Some(source);
    }

    /// Disconnect from the plugged source; the last mirrored value is kept.
    pub fn unplug(&self) {
        *self.source.write().unwrap_or_else(PoisonError::into_inner) = None;
    }

    pub fn is_plugged(&self) -> bool {
        self.source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    /// Read the value at `time`, refreshing it from the plugged source or the
    /// signal function when it is older than `time`.
    pub fn access(&self, time: i64) -> Vec<f64> {
        let source = self
            .source
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        if let Some(source) = source {
            let value = source.access(time);
            self.set_value(value.clone(), source.time());
            return value;
        }

        if let Some(function) = &self.function {
            let mut state = self.state.write().unwrap_or_else(PoisonError::into_inner);
            if time > state.time || state.value.is_empty() {
                state.value = function(time);
                state.time = time;
            }
            return state.value.clone();
        }

        self.value()
    }
}

impl Recompute for Signal {
    fn recompute(&self, time: i64) -> Result<(), DgmError> {
        self.access(time);
        Ok(())
    }
}

impl fmt::Debug for Signal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Signal")
            .field("name", &self.name)
            .field("time", &self.time())
            .field("value", &self.value())
            .field("plugged", &self.is_plugged())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_name_strips_entity_prefix() {
        let sig = Signal::new("Device(robot)::output(vector2d)::joint_positions", vec![0.0; 2]);
        assert_eq!(sig.short_name(), "joint_positions");
    }

    #[test]
    fn set_value_updates_time() {
        let sig = Signal::new("s", vec![0.0]);
        sig.set_value(vec![4.0], 7);
        assert_eq!(sig.value(), vec![4.0]);
        assert_eq!(sig.time(), 7);
    }

    #[test]
    fn function_signal_recomputes_only_on_newer_time() {
        let sig = Signal::with_function("ramp", Box::new(|t| vec![t as f64 * 2.0]));
        assert_eq!(sig.access(3), vec![6.0]);
        // Older index returns the cached value.
        assert_eq!(sig.access(1), vec![6.0]);
        assert_eq!(sig.access(5), vec![10.0]);
    }

    #[test]
    fn plugged_signal_mirrors_source() {
        let source = Signal::new("source", vec![1.0, 2.0]);
        let sink = Signal::new("sink", vec![]);
        sink.plug(source.clone());
        assert!(sink.is_plugged());

        source.set_value(vec![3.0, 4.0], 2);
        assert_eq!(sink.access(2), vec![3.0, 4.0]);
        assert_eq!(sink.time(), 2);

        sink.unplug();
        source.set_value(vec![9.0, 9.0], 3);
        assert_eq!(sink.access(3), vec![3.0, 4.0]);
    }

    #[test]
    fn recompute_refreshes_function_signal() {
        let sig = Signal::with_function("const", Box::new(|_| vec![1.5]));
        sig.recompute(1).unwrap();
        assert_eq!(sig.value(), vec![1.5]);
        assert_eq!(sig.time(), 1);
    }
}
