//! [`RealTimeTracer`] – buffered, file-backed [`Tracer`].
//!
//! Samples are formatted into an in-memory buffer per signal during the
//! control loop and only written to disk on [`dump`][Tracer::dump] or
//! [`close`][Tracer::close], keeping file I/O out of the step.  Each buffer
//! is bounded by the configured byte budget; a sample that does not fit is
//! dropped and counted rather than growing the buffer.
//!
//! Each trace file holds one line per recorded step: the time index followed
//! by the signal values, tab separated.

use std::fmt::Write as _;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};

use dgm_device::SignalPtr;
use dgm_types::DgmError;
use tracing::{debug, info, warn};

use crate::tracer::{SharedTracer, Tracer, TracerState};

/// Default per-signal buffer budget: 1 MiB.
pub const DEFAULT_BUFFER_SIZE: usize = 1 << 20;

struct TracedSignal {
    signal: SignalPtr,
    stem: String,
    path: Option<PathBuf>,
    buffer: String,
    dropped: u64,
}

/// Where the trace files of an opened tracer live.
#[derive(Debug, Clone)]
struct OpenFiles {
    dir: PathBuf,
    prefix: String,
    suffix: String,
}

impl OpenFiles {
    fn path_for(&self, stem: &str) -> PathBuf {
        self.dir.join(format!("{}{}{}", self.prefix, stem, self.suffix))
    }
}

/// Buffered tracer writing `<dir>/<prefix><stem><suffix>` files.
pub struct RealTimeTracer {
    name: String,
    state: TracerState,
    buffer_size: usize,
    files: Option<OpenFiles>,
    signals: Vec<TracedSignal>,
}

impl RealTimeTracer {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            state: TracerState::Unopened,
            buffer_size: DEFAULT_BUFFER_SIZE,
            files: None,
            signals: Vec::new(),
        }
    }

    /// Wrap the tracer into a shared handle.
    pub fn into_shared(self) -> SharedTracer {
        Arc::new(Mutex::new(self))
    }

    pub fn buffer_size(&self) -> usize {
        self.buffer_size
    }

    /// Directory the tracer is currently writing to.
    pub fn dir(&self) -> Option<&Path> {
        self.files.as_ref().map(|f| f.dir.as_path())
    }

    /// Total number of samples dropped because a buffer was full.
    pub fn dropped_samples(&self) -> u64 {
        self.signals.iter().map(|s| s.dropped).sum()
    }

    fn state_error(&self, operation: &str) -> DgmError {
        DgmError::TracerState {
            tracer: self.name.clone(),
            operation: operation.to_string(),
            state: self.state.to_string(),
        }
    }
}

/// Create (truncate) the trace file so that every traced signal has a file
/// even when nothing gets recorded.
fn create_trace_file(path: &Path) -> Result<(), DgmError> {
    File::create(path)?;
    Ok(())
}

fn format_sample(time: i64, values: &[f64]) -> String {
    let mut line = time.to_string();
    for v in values {
        // Writing into a String cannot fail.
        let _ = write!(line, "\t{v}");
    }
    line.push('\n');
    line
}

impl Tracer for RealTimeTracer {
    fn name(&self) -> &str {
        &self.name
    }

    fn state(&self) -> TracerState {
        self.state
    }

    fn set_buffer_size(&mut self, bytes: usize) {
        self.buffer_size = bytes;
    }

    fn open(&mut self, dir: &Path, prefix: &str, suffix: &str) -> Result<(), DgmError> {
        if self.state != TracerState::Unopened {
            return Err(self.state_error("open"));
        }
        fs::create_dir_all(dir)?;
        let files = OpenFiles {
            dir: dir.to_path_buf(),
            prefix: prefix.to_string(),
            suffix: suffix.to_string(),
        };
        for traced in &mut self.signals {
            let path = files.path_for(&traced.stem);
            create_trace_file(&path)?;
            traced.path = Some(path);
        }
        info!(tracer = %self.name, dir = %dir.display(), "tracer opened");
        self.files = Some(files);
        self.state = TracerState::Open;
        Ok(())
    }

    fn start(&mut self) -> Result<(), DgmError> {
        match self.state {
            TracerState::Open | TracerState::Stopped => {
                self.state = TracerState::Running;
                info!(tracer = %self.name, signals = self.signals.len(), "tracer started");
                Ok(())
            }
            TracerState::Running => Ok(()),
            TracerState::Unopened => Err(self.state_error("start")),
        }
    }

    fn stop(&mut self) -> Result<(), DgmError> {
        if self.state == TracerState::Running {
            self.state = TracerState::Stopped;
            info!(tracer = %self.name, "tracer stopped");
        }
        Ok(())
    }

    fn dump(&mut self) -> Result<(), DgmError> {
        if self.files.is_none() {
            return Err(self.state_error("dump"));
        }
        for traced in &mut self.signals {
            if traced.buffer.is_empty() {
                continue;
            }
            let Some(path) = &traced.path else {
                continue;
            };
            let file = OpenOptions::new().create(true).append(true).open(path)?;
            let mut writer = BufWriter::new(file);
            writer.write_all(traced.buffer.as_bytes())?;
            writer.flush()?;
            traced.buffer.clear();
        }
        let dropped = self.dropped_samples();
        if dropped > 0 {
            warn!(tracer = %self.name, dropped, "trace buffers overflowed; samples were dropped");
        }
        debug!(tracer = %self.name, "tracer dumped");
        Ok(())
    }

    fn close(&mut self) -> Result<(), DgmError> {
        if self.state == TracerState::Unopened {
            return Ok(());
        }
        self.dump()?;
        for traced in &mut self.signals {
            traced.path = None;
        }
        self.files = None;
        self.state = TracerState::Unopened;
        info!(tracer = %self.name, "tracer closed");
        Ok(())
    }

    fn clear(&mut self) {
        self.signals.clear();
    }

    fn add(&mut self, signal: SignalPtr, file_stem: &str) -> Result<(), DgmError> {
        if self.signals.iter().any(|s| s.stem == file_stem) {
            return Err(DgmError::DuplicateEntry(file_stem.to_string()));
        }
        let path = match &self.files {
            Some(files) => {
                let path = files.path_for(file_stem);
                create_trace_file(&path)?;
                Some(path)
            }
            None => None,
        };
        debug!(tracer = %self.name, signal = %signal.name(), stem = file_stem, "signal traced");
        self.signals.push(TracedSignal {
            signal,
            stem: file_stem.to_string(),
            path,
            buffer: String::new(),
            dropped: 0,
        });
        Ok(())
    }

    fn record(&mut self, time: i64) -> Result<(), DgmError> {
        if self.state != TracerState::Running {
            return Ok(());
        }
        for traced in &mut self.signals {
            let line = format_sample(time, &traced.signal.access(time));
            if traced.buffer.len() + line.len() > self.buffer_size {
                traced.dropped += 1;
                continue;
            }
            traced.buffer.push_str(&line);
        }
        Ok(())
    }

    fn traced(&self) -> Vec<String> {
        self.signals.iter().map(|s| s.stem.clone()).collect()
    }
}
