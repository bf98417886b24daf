use std::io::{self, Read};
use std::time::{Duration, Instant};

/// Granularity of `Transfer` events emitted while streaming a body.
pub const REPORT_STEP_BYTES: u64 = 1024 * 1024;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressPhase {
    Resolve,
    Start,
    Transfer,
    Done,
    Failed,
}

#[derive(Debug, Clone)]
pub struct ProgressEvent {
    pub dataset: String,
    pub phase: ProgressPhase,
    pub transferred: u64,
    /// Declared length of the response body, as sent on the wire.
    pub total: Option<u64>,
    pub elapsed: Option<Duration>,
}

impl ProgressEvent {
    pub fn new(dataset: &str, phase: ProgressPhase) -> Self {
        Self {
            dataset: dataset.to_string(),
            phase,
            transferred: 0,
            total: None,
            elapsed: None,
        }
    }

    pub fn percent(&self) -> Option<f64> {
        match self.total {
            Some(total) if total > 0 => {
                Some((self.transferred as f64 / total as f64 * 100.0).min(100.0))
            }
            _ => None,
        }
    }
}

pub trait ProgressSink {
    fn event(&self, event: ProgressEvent);
}

pub struct NoProgress;

impl ProgressSink for NoProgress {
    fn event(&self, _event: ProgressEvent) {}
}

/// Counts bytes pulled from a response body and reports them to a sink.
///
/// Sits below any decompressor so that `transferred` is comparable with the
/// declared content length.
pub struct ProgressReader<'a, R> {
    inner: R,
    sink: &'a dyn ProgressSink,
    dataset: &'a str,
    total: Option<u64>,
    transferred: u64,
    next_report: u64,
    started: Instant,
    failed: bool,
}

impl<'a, R: Read> ProgressReader<'a, R> {
    pub fn new(inner: R, sink: &'a dyn ProgressSink, dataset: &'a str, total: Option<u64>) -> Self {
        Self {
            inner,
            sink,
            dataset,
            total,
            transferred: 0,
            next_report: REPORT_STEP_BYTES,
            started: Instant::now(),
            failed: false,
        }
    }

    pub fn transferred(&self) -> u64 {
        self.transferred
    }

    /// True once the wrapped reader itself returned an error.
    pub fn inner_failed(&self) -> bool {
        self.failed
    }

    pub fn event(&self, phase: ProgressPhase) -> ProgressEvent {
        ProgressEvent {
            dataset: self.dataset.to_string(),
            phase,
            transferred: self.transferred,
            total: self.total,
            elapsed: Some(self.started.elapsed()),
        }
    }
}

impl<R: Read> Read for ProgressReader<'_, R> {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        let read = match self.inner.read(buf) {
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => return Err(err),
            Err(err) => {
                self.failed = true;
                return Err(err);
            }
        };
        self.transferred += read as u64;
        if self.transferred >= self.next_report {
            self.sink.event(self.event(ProgressPhase::Transfer));
            while self.next_report <= self.transferred {
                self.next_report += REPORT_STEP_BYTES;
            }
        }
        Ok(read)
    }
}
