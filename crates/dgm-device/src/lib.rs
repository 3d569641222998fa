//! `dgm-device` – the robot entity and its signals.
//!
//! # Modules
//!
//! - [`signal`] – [`Signal`]: named, time-indexed vector values that can be
//!   written, computed from a function, or plugged into another signal.
//! - [`periodic_call`] – [`PeriodicCall`]: the `before`/`after` lists of
//!   entries recomputed around each control step, with downsampling.
//! - [`device`] – the [`Device`] trait every robot driver implements.
//! - [`entity`] – [`EntityRegistry`]: signals of every graph entity, looked
//!   up by entity and short name.
//! - [`sim`] – [`SimDevice`]: an in-process device built from a
//!   [`DeviceConfig`], for tests and headless runs.

pub mod device;
pub mod entity;
pub mod periodic_call;
pub mod signal;
pub mod sim;

pub use device::{Device, SharedDevice, Stage};
pub use entity::EntityRegistry;
pub use periodic_call::{PeriodicCall, Recompute};
pub use signal::{Signal, SignalFn, SignalPtr};
pub use sim::{DeviceConfig, HardwareSpec, SimDevice};
