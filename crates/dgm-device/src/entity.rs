//! [`EntityRegistry`] – graph entities and the signals they own.
//!
//! Signals are looked up by `(entity, short name)`, so
//! `Device(device)::output(vector2d)::joint_positions` is reachable as
//! `("device", "joint_positions")`.

use std::collections::BTreeMap;

use dgm_types::{DgmError, recompute_id};
use tracing::debug;

use crate::device::Device;
use crate::signal::SignalPtr;

#[derive(Debug, Default)]
pub struct EntityRegistry {
    entities: BTreeMap<String, BTreeMap<String, SignalPtr>>,
}

impl EntityRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register `entity` with `signals`, keyed by their short names.
    ///
    /// # Errors
    ///
    /// [`DgmError::DuplicateEntry`] when the entity is already registered or
    /// two signals share a short name.
    pub fn register(
        &mut self,
        entity: impl Into<String>,
        signals: impl IntoIterator<Item = SignalPtr>,
    ) -> Result<(), DgmError> {
        let entity = entity.into();
        if self.entities.contains_key(&entity) {
            return Err(DgmError::DuplicateEntry(entity));
        }
        let mut by_name = BTreeMap::new();
        for signal in signals {
            let short = signal.short_name().to_string();
            if by_name.contains_key(&short) {
                return Err(DgmError::DuplicateEntry(recompute_id(&entity, &short)));
            }
            by_name.insert(short, signal);
        }
        debug!(entity = %entity, signals = by_name.len(), "entity registered");
        self.entities.insert(entity, by_name);
        Ok(())
    }

    /// Register every signal `device` exposes under its name.
    ///
    /// # Errors
    ///
    /// See [`register`][Self::register].
    pub fn register_device(&mut self, device: &dyn Device) -> Result<(), DgmError> {
        self.register(device.name(), device.signals())
    }

    /// Forget `entity`.  Returns whether it was registered.
    pub fn unregister(&mut self, entity: &str) -> bool {
        self.entities.remove(entity).is_some()
    }

    pub fn contains(&self, entity: &str) -> bool {
        self.entities.contains_key(entity)
    }

    /// Registered entity names, sorted.
    pub fn entities(&self) -> Vec<String> {
        self.entities.keys().cloned().collect()
    }

    /// Signal `signal` of `entity`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] with the dotted `<entity>.<signal>` id when
    /// either is unknown.
    pub fn signal(&self, entity: &str, signal: &str) -> Result<SignalPtr, DgmError> {
        self.entities
            .get(entity)
            .and_then(|signals| signals.get(signal))
            .cloned()
            .ok_or_else(|| DgmError::UnknownSignal(recompute_id(entity, signal)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::signal::Signal;
    use crate::sim::{DeviceConfig, SimDevice};

    #[test]
    fn device_signals_resolve_by_short_name() {
        let device = SimDevice::from_config(&DeviceConfig::default().with_sensor("joint_positions", 2)).unwrap();
        let mut registry = EntityRegistry::new();
        registry.register_device(&device).unwrap();

        let q = registry.signal("device", "joint_positions").unwrap();
        assert_eq!(q.name(), "Device(device)::output(vector2d)::joint_positions");
        assert_eq!(
            registry.signal("device", "nope").unwrap_err(),
            DgmError::UnknownSignal("device.nope".to_string())
        );
    }

    #[test]
    fn entities_are_unique() {
        let mut registry = EntityRegistry::new();
        registry
            .register("controller", [Signal::new("controller::torques", vec![0.0])])
            .unwrap();
        assert_eq!(
            registry.register("controller", Vec::<SignalPtr>::new()),
            Err(DgmError::DuplicateEntry("controller".to_string()))
        );
        assert_eq!(registry.entities(), vec!["controller"]);

        assert!(registry.unregister("controller"));
        assert!(!registry.contains("controller"));
        assert!(registry.signal("controller", "torques").is_err());
    }

    #[test]
    fn clashing_short_names_are_rejected() {
        let mut registry = EntityRegistry::new();
        let result = registry.register(
            "pd",
            [Signal::new("pd::in::q", vec![]), Signal::new("pd::out::q", vec![])],
        );
        assert_eq!(result, Err(DgmError::DuplicateEntry("pd.q".to_string())));
        assert!(!registry.contains("pd"));
    }
}
