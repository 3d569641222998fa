//! [`RosPublish`] – exports graph signals onto bus topics.
//!
//! Exporting a signal is a two step "add, then connect" registration:
//!
//! 1. [`RosPublish::add`] declares an input port with a topic type, a port
//!    name and the destination topic;
//! 2. [`RosPublish::plug`] connects the source signal to that port.
//!
//! The entity's trigger (scheduled on the device's `after` list under
//! [`RosPublish::trigger_id`]) then publishes every connected port at each
//! due step.

use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

use chrono::Utc;
use dgm_device::{Recompute, Signal, SignalPtr};
use dgm_types::{DgmError, Event, EventPayload};
use tracing::{debug, warn};
use uuid::Uuid;

use crate::bus::EventBus;
use crate::topic_type::TopicType;

struct PublishPort {
    topic: String,
    topic_type: TopicType,
    signal: SignalPtr,
}

/// Entity publishing plugged signals on the [`EventBus`].
pub struct RosPublish {
    name: String,
    bus: EventBus,
    ports: Mutex<BTreeMap<String, PublishPort>>,
}

impl RosPublish {
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

    /// Declare port `signal_name` publishing on `topic` as `topic_type`
    /// (`"double"`, `"vector"`, `"vector3"`).
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownTopicType`] for an unsupported type,
    /// [`DgmError::DuplicateEntry`] when the port already exists or another
    /// port already publishes on `topic`.
    pub fn add(&self, topic_type: &str, signal_name: &str, topic: &str) -> Result<SignalPtr, DgmError> {
        let topic_type: TopicType = topic_type.parse()?;
        let mut ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        if ports.contains_key(signal_name) {
            return Err(DgmError::DuplicateEntry(signal_name.to_string()));
        }
        if ports.values().any(|p| p.topic == topic) {
            return Err(DgmError::DuplicateEntry(topic.to_string()));
        }
        let signal = Signal::new(format!("{}::{}", self.name, signal_name), Vec::new());
        ports.insert(
            signal_name.to_string(),
            PublishPort {
                topic: topic.to_string(),
                topic_type,
                signal: Arc::clone(&signal),
            },
        );
        debug!(entity = %self.name, port = signal_name, topic, %topic_type, "publish port added");
        Ok(signal)
    }

    /// Port signal `signal_name`, to plug a source into.
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

    /// Plug `source` into port `signal_name`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] when no such port exists.
    pub fn plug(&self, source: SignalPtr, signal_name: &str) -> Result<(), DgmError> {
        self.signal(signal_name)?.plug(source);
        Ok(())
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
            .map(|(name, port)| (name.clone(), port.topic.clone()))
            .collect()
    }

    pub fn clear(&self) {
        self.ports.lock().unwrap_or_else(PoisonError::into_inner).clear();
    }

    /// Publish every plugged port sampled at `time`.
    ///
    /// Unplugged ports are skipped.  A port whose value does not fit its
    /// topic type is skipped too; the first such error is returned once
    /// every other port has been published.
    pub fn publish(&self, time: i64) -> Result<usize, DgmError> {
        let ports = self.ports.lock().unwrap_or_else(PoisonError::into_inner);
        let mut published = 0;
        let mut first_error = None;
        for (name, port) in ports.iter() {
            if !port.signal.is_plugged() {
                continue;
            }
            let values = port.signal.access(time);
            let message = match port.topic_type.to_message(name, &values) {
                Ok(m) => m,
                Err(e) => {
                    warn!(entity = %self.name, port = %name, error = %e, "cannot publish port");
                    first_error.get_or_insert(e);
                    continue;
                }
            };
            let event = Event {
                id: Uuid::new_v4(),
                timestamp: Utc::now(),
                source: format!("dgm-middleware::{}", self.name),
                payload: EventPayload::SignalSample {
                    topic: port.topic.clone(),
                    signal: name.clone(),
                    time,
                    message,
                },
            };
            self.bus.publish_to(&port.topic, event)?;
            published += 1;
        }
        match first_error {
            Some(e) => Err(e),
            None => Ok(published),
        }
    }
}

impl Recompute for RosPublish {
    fn recompute(&self, time: i64) -> Result<(), DgmError> {
        self.publish(time).map(|_| ())
    }
}
