//! [`PeriodicCall`] – ordered list of entries recomputed around each device
//! step.
//!
//! A device owns two lists, `before` and `after`, evaluated respectively
//! before and after the control signals are pulled through the graph.  Each
//! entry is keyed by its dotted `<entity>.<signal>` identifier and carries a
//! downsampling factor: an entry with factor `n` only runs on time indices
//! that are multiples of `n`.

use std::fmt;
use std::sync::Arc;

use dgm_types::DgmError;
use tracing::{debug, warn};

/// Anything that can be refreshed at a graph time index: signals, tracer
/// triggers, transport triggers.
pub trait Recompute: Send + Sync {
    /// Refresh at `time`.
    ///
    /// # Errors
    ///
    /// Implementations return whatever [`DgmError`] prevented the refresh;
    /// [`PeriodicCall::run`] logs it and carries on with the next entry.
    fn recompute(&self, time: i64) -> Result<(), DgmError>;
}

struct Entry {
    id: String,
    target: Arc<dyn Recompute>,
    downsampling: u32,
}

/// Ordered set of recomputation entries.
#[derive(Default)]
pub struct PeriodicCall {
    entries: Vec<Entry>,
}

impl PeriodicCall {
    pub fn new() -> Self {
        Self::default()
    }

    /// Schedule `target` on every step.  See
    /// [`add_downsampled_signal`][Self::add_downsampled_signal].
    pub fn add_signal(&mut self, id: impl Into<String>, target: Arc<dyn Recompute>) -> bool {
        self.add_downsampled_signal(id, target, 1)
    }

    /// Schedule `target` every `downsampling` steps.
    ///
    /// Returns `false` and leaves the list untouched when `id` is already
    /// scheduled, so a caller can tell which entries it owns.  A factor of
    /// zero is treated as one.
    pub fn add_downsampled_signal(
        &mut self,
        id: impl Into<String>,
        target: Arc<dyn Recompute>,
        downsampling: u32,
    ) -> bool {
        let id = id.into();
        if self.contains(&id) {
            debug!(id = %id, "entry already scheduled");
            return false;
        }
        if downsampling == 0 {
            warn!(id = %id, "downsampling factor 0 treated as 1");
        }
        self.entries.push(Entry {
            id,
            target,
            downsampling: downsampling.max(1),
        });
        true
    }

    /// Remove the entry scheduled under `id`.
    ///
    /// # Errors
    ///
    /// Returns [`DgmError::NotScheduled`] when no such entry exists.
    pub fn rm_signal(&mut self, id: &str) -> Result<(), DgmError> {
        let before = self.entries.len();
        self.entries.retain(|e| e.id != id);
        if self.entries.len() == before {
            return Err(DgmError::NotScheduled(id.to_string()));
        }
        Ok(())
    }

    pub fn contains(&self, id: &str) -> bool {
        self.entries.iter().any(|e| e.id == id)
    }

    /// Scheduled identifiers in insertion order.
    pub fn identifiers(&self) -> Vec<String> {
        self.entries.iter().map(|e| e.id.clone()).collect()
    }

    /// Downsampling factor of `id`, if scheduled.
    pub fn downsampling(&self, id: &str) -> Option<u32> {
        self.entries
            .iter()
            .find(|e| e.id == id)
            .map(|e| e.downsampling)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Recompute every entry due at `time`.
    ///
    /// A failing entry is logged and does not prevent the remaining entries
    /// from running.  Returns the number of failed entries.
    pub fn run(&self, time: i64) -> usize {
        let mut failures = 0;
        for entry in &self.entries {
            if time.rem_euclid(i64::from(entry.downsampling)) != 0 {
                continue;
            }
            if let Err(e) = entry.target.recompute(time) {
                warn!(id = %entry.id, time, error = %e, "periodic recompute failed");
                failures += 1;
            }
        }
        failures
    }
}

impl fmt::Debug for PeriodicCall {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_list()
            .entries(self.entries.iter().map(|e| (&e.id, e.downsampling)))
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    /// Records every time index it was recomputed at.
    #[derive(Default)]
    struct Probe {
        calls: Mutex<Vec<i64>>,
    }

    impl Recompute for Probe {
        fn recompute(&self, time: i64) -> Result<(), DgmError> {
            self.calls.lock().unwrap().push(time);
            Ok(())
        }
    }

    struct Failing;

    impl Recompute for Failing {
        fn recompute(&self, _time: i64) -> Result<(), DgmError> {
            Err(DgmError::UnknownSignal("broken".to_string()))
        }
    }

    #[test]
    fn add_and_remove_entries() {
        let mut pc = PeriodicCall::new();
        assert!(pc.add_signal("device.a", Arc::new(Probe::default())));
        assert!(pc.add_signal("device.b", Arc::new(Probe::default())));
        assert_eq!(pc.identifiers(), vec!["device.a", "device.b"]);

        pc.rm_signal("device.a").unwrap();
        assert_eq!(pc.identifiers(), vec!["device.b"]);
    }

    #[test]
    fn duplicate_add_is_rejected_and_keeps_original() {
        let mut pc = PeriodicCall::new();
        assert!(pc.add_downsampled_signal("device.a", Arc::new(Probe::default()), 4));
        assert!(!pc.add_signal("device.a", Arc::new(Probe::default())));
        assert_eq!(pc.len(), 1);
        assert_eq!(pc.downsampling("device.a"), Some(4));
    }

    #[test]
    fn removing_unknown_entry_is_an_error() {
        let mut pc = PeriodicCall::new();
        assert_eq!(
            pc.rm_signal("ghost.signal"),
            Err(DgmError::NotScheduled("ghost.signal".to_string()))
        );
    }

    #[test]
    fn downsampled_entry_runs_on_multiples_only() {
        let probe = Arc::new(Probe::default());
        let mut pc = PeriodicCall::new();
        pc.add_downsampled_signal("ros.trigger", probe.clone(), 3);
        for t in 0..7 {
            pc.run(t);
        }
        assert_eq!(*probe.calls.lock().unwrap(), vec![0, 3, 6]);
    }

    #[test]
    fn zero_downsampling_is_clamped() {
        let mut pc = PeriodicCall::new();
        pc.add_downsampled_signal("x.y", Arc::new(Probe::default()), 0);
        assert_eq!(pc.downsampling("x.y"), Some(1));
    }

    #[test]
    fn failing_entry_does_not_block_others() {
        let probe = Arc::new(Probe::default());
        let mut pc = PeriodicCall::new();
        pc.add_signal("bad.entry", Arc::new(Failing));
        pc.add_signal("good.entry", probe.clone());

        assert_eq!(pc.run(1), 1);
        assert_eq!(*probe.calls.lock().unwrap(), vec![1]);
    }
}
