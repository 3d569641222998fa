//! [`Robot`] – wires a device to its tracer and transport bridge.
//!
//! Constructing a robot
//!
//! 1. makes sure exactly one tracer is active: an injected tracer is used as
//!    is, otherwise a [`RealTimeTracer`] is created, sized, opened in the
//!    resolved log directory and its trigger scheduled after every step;
//! 2. traces every signal of the device;
//! 3. creates the [`Ros`] bridge, schedules its triggers and exports every
//!    device signal on topic `/dg__device__<signal>`.
//!
//! Signals are named by `(entity, signal)` and resolved through an
//! [`EntityRegistry`]; the device is registered at construction, other
//! entities with [`Robot::register_entity`].  A topic carries at most one
//! exported signal.
//!
//! Every entry the robot adds to the device's periodic call lists is
//! remembered, and teardown removes exactly those entries.
//!
//! # Ownership of the tracer
//!
//! A tracer the robot created is [`TracerOwnership::Owned`]: teardown dumps,
//! stops, closes and clears it.  An injected tracer is
//! [`TracerOwnership::Borrowed`]: teardown only detaches from it and leaves
//! its life cycle to the caller.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, MutexGuard, PoisonError};

use dgm_device::{Device, EntityRegistry, PeriodicCall, SharedDevice, SignalPtr, Stage};
use dgm_middleware::{EventBus, ParamStore, Ros};
use dgm_tracer::{RealTimeTracer, SharedTracer, Tracer, TracerTrigger, trigger_id};
use dgm_types::{DgmError, recompute_id};
use tracing::{debug, info, warn};

use crate::config::RobotConfig;
use crate::log_dir::resolve_log_dir;

/// Whether the robot is responsible for releasing its tracer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TracerOwnership {
    /// Created by the robot; released on teardown.
    Owned,
    /// Injected by the caller; left untouched on teardown.
    Borrowed,
}

/// Tracing and transport glue around one device.
pub struct Robot {
    name: String,
    device: SharedDevice,
    device_name: String,
    /// Entities whose signals can be traced and exported by name.
    entities: EntityRegistry,
    config: RobotConfig,
    tracer: Option<SharedTracer>,
    ownership: TracerOwnership,
    tracer_log_dir: Option<PathBuf>,
    ros: Ros,
    /// Short names of the device signals, in device order.
    device_signal_names: Vec<String>,
    /// Traced signal names grouped by owning entity.
    traced_signals: BTreeMap<String, Vec<String>>,
    /// Trace entries this robot added to the device's `after` list.
    auto_recomputed_signals: Vec<String>,
    /// Trigger of an owned tracer, when this robot scheduled it.
    tracer_trigger: Option<String>,
    /// Transport triggers this robot scheduled.
    bridge_triggers: Vec<(Stage, String)>,
}

impl Robot {
    /// Build the robot around `device`.
    ///
    /// `tracer` is an optional caller-owned tracer; without one the robot
    /// creates its own.  `params` is queried for the log directory and
    /// `bus` carries the exported signals.
    ///
    /// # Errors
    ///
    /// Any error raised while opening the tracer, registering traces or
    /// exporting signals.  Entries already scheduled at that point are
    /// removed again before returning.
    pub fn new(
        name: impl Into<String>,
        device: SharedDevice,
        tracer: Option<SharedTracer>,
        params: &dyn ParamStore,
        bus: EventBus,
        config: RobotConfig,
    ) -> Result<Self, DgmError> {
        let mut entities = EntityRegistry::new();
        let device_name = {
            let device = device.lock().unwrap_or_else(PoisonError::into_inner);
            entities.register_device(&*device)?;
            device.name().to_string()
        };
        let ownership = if tracer.is_some() {
            TracerOwnership::Borrowed
        } else {
            TracerOwnership::Owned
        };

        let mut robot = Self {
            name: name.into(),
            device,
            device_name,
            entities,
            ros: Ros::new(bus, &config.ros_suffix),
            config,
            tracer,
            ownership,
            tracer_log_dir: None,
            device_signal_names: Vec::new(),
            traced_signals: BTreeMap::new(),
            auto_recomputed_signals: Vec::new(),
            tracer_trigger: None,
            bridge_triggers: Vec::new(),
        };

        // On error `robot` is dropped here and `Drop` undoes what was
        // scheduled so far.
        robot.initialize_tracer(params)?;

        let names: Vec<String> = robot
            .lock_device()
            .signals()
            .iter()
            .map(|s| s.short_name().to_string())
            .collect();
        let device_name = robot.device_name.clone();
        for signal_name in &names {
            robot.add_trace(&device_name, signal_name)?;
        }
        robot.device_signal_names = names;

        robot.schedule_bridge()?;
        robot.export_device_to_ros()?;

        info!(
            robot = %robot.name,
            device = %robot.device_name,
            signals = robot.device_signal_names.len(),
            "robot ready"
        );
        Ok(robot)
    }

    // -----------------------------------------------------------------------
    // Tracing
    // -----------------------------------------------------------------------

    /// Create, size and open a tracer unless one was injected, and schedule
    /// its trigger after every device step.
    fn initialize_tracer(&mut self, params: &dyn ParamStore) -> Result<(), DgmError> {
        if self.tracer.is_some() {
            debug!(robot = %self.name, "using caller-provided tracer");
            return Ok(());
        }

        let log_dir = resolve_log_dir(params, &self.config);
        let mut tracer = RealTimeTracer::new(self.config.tracer_name.clone());
        tracer.set_buffer_size(self.config.tracer_size);
        tracer.open(&log_dir, &self.config.trace_prefix, &self.config.trace_suffix)?;
        let tracer = tracer.into_shared();

        let id = trigger_id(&self.config.tracer_name);
        let trigger = TracerTrigger::new(Arc::clone(&tracer));
        if self.with_periodic_call(Stage::After, |after| after.add_signal(id.clone(), trigger)) {
            self.tracer_trigger = Some(id);
        }

        info!(robot = %self.name, dir = %log_dir.display(), "storing trace");
        self.tracer = Some(tracer);
        self.tracer_log_dir = Some(log_dir);
        Ok(())
    }

    /// Make the signals of `entity` resolvable by name in
    /// [`add_trace`][Self::add_trace] and [`add_to_ros`][Self::add_to_ros].
    /// The device is registered at construction.
    ///
    /// # Errors
    ///
    /// [`DgmError::DuplicateEntry`] when `entity` is already registered.
    pub fn register_entity(
        &mut self,
        entity: impl Into<String>,
        signals: impl IntoIterator<Item = SignalPtr>,
    ) -> Result<(), DgmError> {
        self.entities.register(entity, signals)
    }

    /// Trace `<entity>.<signal>` into `<prefix><entity>-<signal><suffix>` and
    /// recompute it after every step.
    ///
    /// Does nothing once the tracer has been torn down.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] when the signal cannot be resolved, or
    /// whatever the tracer returns when registering it.
    pub fn add_trace(&mut self, entity: &str, signal: &str) -> Result<(), DgmError> {
        let Some(tracer) = &self.tracer else {
            return Ok(());
        };
        let sig = self.resolve_signal(entity, signal)?;
        tracer
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .add(Arc::clone(&sig), &format!("{entity}-{signal}"))?;

        let id = recompute_id(entity, signal);
        if self.with_periodic_call(Stage::After, |after| after.add_signal(id.clone(), sig)) {
            self.auto_recomputed_signals.push(id);
        }
        self.traced_signals
            .entry(entity.to_string())
            .or_default()
            .push(signal.to_string());
        Ok(())
    }

    /// Start recording.  No-op once the tracer has been torn down.
    ///
    /// # Errors
    ///
    /// Whatever the tracer returns when starting.
    pub fn start_tracer(&self) -> Result<(), DgmError> {
        match &self.tracer {
            Some(tracer) => tracer.lock().unwrap_or_else(PoisonError::into_inner).start(),
            None => Ok(()),
        }
    }

    /// Tear the tracer down.
    ///
    /// An owned tracer is dumped, stopped, closed and cleared.  In every case
    /// the trace entries this robot scheduled are removed from the device and
    /// the tracer is released, so a second call is a no-op.
    ///
    /// # Errors
    ///
    /// The first error met; the remaining steps are still carried out.
    pub fn stop_tracer(&mut self) -> Result<(), DgmError> {
        let Some(tracer) = self.tracer.take() else {
            return Ok(());
        };
        let mut first_error: Option<DgmError> = None;

        if self.ownership == TracerOwnership::Owned {
            let mut tracer = tracer.lock().unwrap_or_else(PoisonError::into_inner);
            for result in [tracer.dump(), tracer.stop(), tracer.close()] {
                if let Err(e) = result {
                    first_error.get_or_insert(e);
                }
            }
            tracer.clear();
        }

        let mut scheduled: Vec<String> = self.auto_recomputed_signals.drain(..).collect();
        scheduled.extend(self.tracer_trigger.take());
        self.with_periodic_call(Stage::After, |after| {
            for id in &scheduled {
                if let Err(e) = after.rm_signal(id) {
                    first_error.get_or_insert(e);
                }
            }
        });

        match &self.tracer_log_dir {
            Some(dir) => info!(robot = %self.name, dir = %dir.display(), "stored trace"),
            None => debug!(robot = %self.name, "detached from caller-provided tracer"),
        }

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }

    // -----------------------------------------------------------------------
    // Transport
    // -----------------------------------------------------------------------

    /// Schedule the subscribe trigger before and the downsampled publish
    /// trigger after every step.
    fn schedule_bridge(&mut self) -> Result<(), DgmError> {
        let publish = Arc::clone(self.ros.publish());
        let subscribe = Arc::clone(self.ros.subscribe());
        let downsampling = self.config.publish_downsampling;

        let publish_id = publish.trigger_id();
        if self.with_periodic_call(Stage::After, |after| {
            after.add_downsampled_signal(publish_id.clone(), publish, downsampling)
        }) {
            self.bridge_triggers.push((Stage::After, publish_id));
        }

        let subscribe_id = subscribe.trigger_id();
        if self.with_periodic_call(Stage::Before, |before| {
            before.add_signal(subscribe_id.clone(), subscribe)
        }) {
            self.bridge_triggers.push((Stage::Before, subscribe_id));
        }
        Ok(())
    }

    /// Publish `signal` on topic `/dg__<topic_name>`, where `topic_name`
    /// defaults to the signal name.
    ///
    /// # Errors
    ///
    /// [`DgmError::DuplicateEntry`] when the topic name is already exported,
    /// [`DgmError::UnknownTopicType`] for a misconfigured topic type.
    pub fn export_signal_to_ros(&self, signal: &SignalPtr, topic_name: Option<&str>) -> Result<(), DgmError> {
        let topic_name = topic_name.unwrap_or(signal.name());
        let publish = self.ros.publish();
        publish.add(&self.config.topic_type, topic_name, &format!("/dg__{topic_name}"))?;
        publish.plug(Arc::clone(signal), topic_name)
    }

    /// Export every device signal as `device__<signal>`.
    ///
    /// # Errors
    ///
    /// See [`export_signal_to_ros`][Self::export_signal_to_ros].
    pub fn export_device_to_ros(&self) -> Result<(), DgmError> {
        for signal_name in &self.device_signal_names {
            let signal = self.resolve_signal(&self.device_name, signal_name)?;
            self.export_signal_to_ros(&signal, Some(&format!("device__{signal_name}")))?;
        }
        Ok(())
    }

    /// Publish `<entity>.<signal>` on a topic.
    ///
    /// The port is named `dg__<entity>__<signal>`; the topic defaults to
    /// `/dg__<entity>__<signal>` and the type to `"vector"`.
    ///
    /// # Errors
    ///
    /// [`DgmError::UnknownSignal`] when the signal cannot be resolved, plus
    /// the errors of [`RosPublish::add`][dgm_middleware::RosPublish::add].
    pub fn add_to_ros(
        &self,
        entity: &str,
        signal: &str,
        topic_name: Option<&str>,
        topic_type: Option<&str>,
    ) -> Result<(), DgmError> {
        let sig = self.resolve_signal(entity, signal)?;
        let port_name = format!("dg__{entity}__{signal}");
        let topic = topic_name
            .map(str::to_string)
            .unwrap_or_else(|| format!("/{port_name}"));
        let publish = self.ros.publish();
        publish.add(topic_type.unwrap_or("vector"), &port_name, &topic)?;
        publish.plug(sig, &port_name)
    }

    /// [`add_trace`][Self::add_trace] followed by
    /// [`add_to_ros`][Self::add_to_ros].
    ///
    /// # Errors
    ///
    /// The first failing step's error.
    pub fn add_ros_and_trace(
        &mut self,
        entity: &str,
        signal: &str,
        topic_name: Option<&str>,
        topic_type: Option<&str>,
    ) -> Result<(), DgmError> {
        self.add_trace(entity, signal)?;
        self.add_to_ros(entity, signal, topic_name, topic_type)
    }

    // -----------------------------------------------------------------------
    // Teardown
    // -----------------------------------------------------------------------

    /// [`stop_tracer`][Self::stop_tracer] and unschedule the transport
    /// triggers.  Idempotent.
    ///
    /// # Errors
    ///
    /// The first error met; the remaining steps are still carried out.
    pub fn shutdown(&mut self) -> Result<(), DgmError> {
        let mut result = self.stop_tracer();
        let triggers: Vec<(Stage, String)> = self.bridge_triggers.drain(..).collect();
        for (stage, id) in triggers {
            if let Err(e) = self.with_periodic_call(stage, |pc| pc.rm_signal(&id)) {
                if result.is_ok() {
                    result = Err(e);
                }
            }
        }
        result
    }

    // -----------------------------------------------------------------------
    // Accessors
    // -----------------------------------------------------------------------

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn device(&self) -> &SharedDevice {
        &self.device
    }

    pub fn device_name(&self) -> &str {
        &self.device_name
    }

    pub fn config(&self) -> &RobotConfig {
        &self.config
    }

    /// The active tracer; `None` after teardown.
    pub fn tracer(&self) -> Option<&SharedTracer> {
        self.tracer.as_ref()
    }

    pub fn tracer_ownership(&self) -> TracerOwnership {
        self.ownership
    }

    /// Directory of an owned tracer.
    pub fn tracer_log_dir(&self) -> Option<&Path> {
        self.tracer_log_dir.as_deref()
    }

    pub fn entities(&self) -> &EntityRegistry {
        &self.entities
    }

    pub fn ros(&self) -> &Ros {
        &self.ros
    }

    pub fn device_signal_names(&self) -> &[String] {
        &self.device_signal_names
    }

    pub fn traced_signals(&self) -> &BTreeMap<String, Vec<String>> {
        &self.traced_signals
    }

    /// Trace entries currently scheduled by this robot.
    pub fn auto_recomputed_signals(&self) -> &[String] {
        &self.auto_recomputed_signals
    }

    // -----------------------------------------------------------------------
    // Internal helpers
    // -----------------------------------------------------------------------

    fn lock_device(&self) -> MutexGuard<'_, dyn Device + 'static> {
        self.device.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn with_periodic_call<R>(&self, stage: Stage, f: impl FnOnce(&mut PeriodicCall) -> R) -> R {
        let mut device = self.lock_device();
        f(device.periodic_call(stage))
    }

    fn resolve_signal(&self, entity: &str, signal: &str) -> Result<SignalPtr, DgmError> {
        self.entities.signal(entity, signal)
    }
}

impl Drop for Robot {
    fn drop(&mut self) {
        if let Err(e) = self.shutdown() {
            warn!(robot = %self.name, error = %e, "robot teardown failed");
        }
    }
}
