//! `dgm-middleware` – the transport side of the robot.
//!
//! Routes signal samples between the graph and the outside world without
//! caring about their meaning.
//!
//! # Modules
//!
//! - [`bus`] – Headless, topic-based publish/subscribe event bus built on
//!   Tokio broadcast channels.
//! - [`topic_type`] – [`TopicType`]: wire types a signal can be published as.
//! - [`ros_publish`] – [`RosPublish`]: exports plugged signals onto topics at
//!   each trigger.
//! - [`ros_subscribe`] – [`RosSubscribe`]: feeds signals from topics.
//! - [`ros`] – [`Ros`]: one publish and one subscribe entity on a shared bus.
//! - [`param`] – [`ParamStore`]: the parameter service seam.
//! - [`ws_server`] – [`WsBridge`]: WebSocket endpoint streaming the bus as
//!   JSON and accepting publish requests.

pub mod bus;
pub mod param;
pub mod ros;
pub mod ros_publish;
pub mod ros_subscribe;
pub mod topic_type;
pub mod ws_server;

pub use bus::{EventBus, TopicReceiver};
pub use param::{DEVICE_NAME_PARAM, LOG_DIR_PARAM, ParamStore, StaticParamStore};
pub use ros::Ros;
pub use ros_publish::RosPublish;
pub use ros_subscribe::RosSubscribe;
pub use topic_type::TopicType;
pub use ws_server::WsBridge;
