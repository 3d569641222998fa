//! [`RosSubscribe`] – imports bus topics into graph signals.
//!
//! Each port is an output signal fed from a topic.  Messages are queued by
//! the bus and only applied to the signal when the entity's trigger runs, so
//! the graph sees new values at a well defined step.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use dgm_device::{Recompute, Signal, SignalPtr};
use dgm_types::{DgmError, EventPayload};
use tokio::sync::broadcast::error::TryRecvError;
use tracing::{debug, warn};

use crate::bus::{EventBus, TopicReceiver};
use crate::topic_type::TopicType;

struct SubscribePort {
    topic_type: TopicType,
    signal: SignalPtr,
    receiver: TopicReceiver,
}

/// Entity feeding graph signals from the [`EventBus`].
pub struct RosSubscribe {
    name: String,
    bus: EventBus,
    ports: Mutex<BTreeMap<String, SubscribePort>>,
}

impl RosSubscribe {
    pub fn new(name: impl Into<String>, bus: EventBus) -> Arc<Self> {
        Arc::new(Self {
            name: name.into(),
            bus,
            ports: Mutex::new(BTreeMap::new()),
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// Identifier under which the trigger of this entity is scheduled.
    pub fn trigger_id(&self) -> String {
        format!("{}.trigger", self.name)
    }

    /// Create output signal `signal_name` fed from `topic`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownTopicType`] for an unsupported type,
    /// [`DgmError::DuplicateEntry`] when the port already exists.
    pub fn add(&self, topic_type: &str, signal_name: &str, topic: &str) -> Result<SignalPtr, DgmError> {
        let topic_type: TopicType = topic_type.parse()?;
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        if ports.contains_key(signal_name) {
            return Err(DgmError::DuplicateEntry(signal_name.to_string()));
        }
        let signal = Signal::new(format!("{}::{}", self.name, signal_name), Vec::new());
        ports.insert(
            signal_name.to_string(),
            SubscribePort {
                topic_type,
                signal: Arc::clone(&signal),
                receiver: self.bus.subscribe_to(topic),
            },
        );
        debug!(entity = %self.name, port = signal_name, topic, "subscribe port added");
        Ok(signal)
    }

    /// Output signal of port `signal_name`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] when no such port exists.
    pub fn signal(&self, signal_name: &str) -> Result<SignalPtr, DgmError> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .get(signal_name)
            .map(|p| Arc::clone(&p.signal))
            .ok_or_else(|| DgmError::UnknownSignal(format!("{}::{}", self.name, signal_name)))
    }

    /// Remove port `signal_name`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] when no such port exists.
    pub fn rm(&self, signal_name: &str) -> Result<(), DgmError> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(signal_name)
            .map(|_| ())
            .ok_or_else(|| DgmError::UnknownSignal(format!("{}::{}", self.name, signal_name)))
    }

    /// `(port, topic)` pairs, sorted by port name.
    pub fn list(&self) -> Vec<(String, String)> {
        self.ports
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(name, port)| (name.clone(), port.receiver.topic().to_string()))
            .collect()
    }

    /// Apply the latest pending message of every port, stamped with `time`.
    ///
    /// Messages that do not fit the port's topic type are logged and
    /// dropped.  Returns the number of ports that received a new value.
    pub fn update(&self, time: i64) -> usize {
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        let mut updated = 0;
        for (name, port) in ports.iter_mut() {
            let mut latest = None;
            loop {
                match port.receiver.try_recv() {
                    Ok(event) => {
                        let EventPayload::SignalSample { message, .. } = event.payload;
                        match port.topic_type.from_message(name, &message) {
                            Ok(values) => latest = Some(values),
                            Err(e) => warn!(entity = %self.name, port = %name, error = %e, "dropping message"),
                        }
                    }
                    Err(TryRecvError::Lagged(n)) => {
                        warn!(entity = %self.name, port = %name, lagged_by = n, "subscriber lagged");
                    }
                    Err(TryRecvError::Empty) | Err(TryRecvError::Closed) => break,
                }
            }
            if let Some(values) = latest {
                port.signal.set_value(values, time);
                updated += 1;
            }
        }
        updated
    }
}

impl Recompute for RosSubscribe {
    fn recompute(&self, time: i64) -> Result<(), DgmError> {
        self.update(time);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ros_publish::RosPublish;

    #[test]
    fn loopback_through_the_bus() {
        let bus = EventBus::default();
        let publish = RosPublish::new("rosPublish", bus.clone());
        let subscribe = RosSubscribe::new("rosSubscribe", bus.clone());

        let source = Signal::new("src::q", vec![1.0, 2.0, 3.0]);
        publish.add("vector3", "q", "/dg__q").unwrap();
        publish.signal("q").unwrap().plug(Arc::clone(&source));
        let imported = subscribe.add("vector3", "q_in", "/dg__q").unwrap();

        publish.publish(1).unwrap();
        source.set_value(vec![4.0, 5.0, 6.0], 2);
        publish.publish(2).unwrap();

        assert_eq!(subscribe.update(2), 1);
        // Only the latest message is kept.
        assert_eq!(imported.value(), vec![4.0, 5.0, 6.0]);
        assert_eq!(imported.time(), 2);
    }

    #[test]
    fn no_message_leaves_signal_untouched() {
        let subscribe = RosSubscribe::new("rosSubscribe", EventBus::default());
        let imported = subscribe.add("double", "x", "/x").unwrap();
        assert_eq!(subscribe.update(1), 0);
        assert!(imported.value().is_empty());
    }

    #[test]
    fn mismatched_message_is_dropped() {
        let bus = EventBus::default();
        let publish = RosPublish::new("rosPublish", bus.clone());
        let subscribe = RosSubscribe::new("rosSubscribe", bus.clone());

        publish.add("vector", "v", "/dg__v").unwrap();
        publish.signal("v").unwrap().plug(Signal::new("src::v", vec![1.0, 2.0]));
        let imported = subscribe.add("double", "v_in", "/dg__v").unwrap();

        publish.publish(1).unwrap();
        assert_eq!(subscribe.update(1), 0);
        assert!(imported.value().is_empty());
    }

    #[test]
    fn list_reports_topics() {
        let subscribe = RosSubscribe::new("rosSubscribe", EventBus::default());
        subscribe.add("vector", "a", "/topic_a").unwrap();
        assert_eq!(subscribe.list(), vec![("a".to_string(), "/topic_a".to_string())]);
        subscribe.rm("a").unwrap();
        assert!(subscribe.signal("a").is_err());
    }
}
