//! [`Ros`] – the transport bridge entities of one robot.

use std::sync::Arc;

use crate::bus::EventBus;
use crate::ros_publish::RosPublish;
use crate::ros_subscribe::RosSubscribe;

/// Groups the publish and subscribe entities sharing one bus.
///
/// Entity names are `rosPublish<suffix>` and `rosSubscribe<suffix>`, so
/// several bridges can coexist in one graph.
pub struct Ros {
    bus: EventBus,
    publish: Arc<RosPublish>,
    subscribe: Arc<RosSubscribe>,
}

impl Ros {
    pub fn new(bus: EventBus, suffix: &str) -> Self {
        Self {
            publish: RosPublish::new(format!("rosPublish{suffix}"), bus.clone()),
            subscribe: RosSubscribe::new(format!("rosSubscribe{suffix}"), bus.clone()),
            bus,
        }
    }

    pub fn publish(&self) -> &Arc<RosPublish> {
        &self.publish
    }

    pub fn subscribe(&self) -> &Arc<RosSubscribe> {
        &self.subscribe
    }

    pub fn bus(&self) -> &EventBus {
        &self.bus
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn entity_names_carry_suffix() {
        let ros = Ros::new(EventBus::default(), "");
        assert_eq!(ros.publish().name(), "rosPublish");
        assert_eq!(ros.subscribe().name(), "rosSubscribe");

        let second = Ros::new(EventBus::default(), "_arm");
        assert_eq!(second.publish().trigger_id(), "rosPublish_arm.trigger");
        assert_eq!(second.subscribe().trigger_id(), "rosSubscribe_arm.trigger");
    }
}
