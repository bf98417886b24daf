use std::sync::Arc;
use std::sync::mpsc::{self, RecvTimeoutError, Sender};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use chrono::{DateTime, Days, Local, NaiveTime, TimeZone};
use serde::{Deserialize, Serialize};
use tracing::{error, info, warn};

use crate::app::{UpdateReport, UpdateStatus, Updater};
use crate::error::UpdateError;
use crate::http::HttpTransport;
use crate::progress::ProgressSink;

/// Upper bound on a single wait, so wall-clock jumps (suspend, DST, NTP)
/// are noticed within this interval.
const MAX_WAIT_SLICE: Duration = Duration::from_secs(15 * 60);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduleSpec {
    pub daily_at: NaiveTime,
    pub run_on_start: bool,
}

impl Default for ScheduleSpec {
    fn default() -> Self {
        Self {
            daily_at: NaiveTime::MIN,
            run_on_start: true,
        }
    }
}

/// Next instant strictly after `now` whose wall-clock time is `at`.
///
/// Days where `at` falls into a DST gap are skipped.
pub fn next_fire<Tz: TimeZone>(now: &DateTime<Tz>, at: NaiveTime) -> DateTime<Tz> {
    let timezone = now.timezone();
    let today = now.date_naive();
    for offset in 0..=2 {
        let Some(date) = today.checked_add_days(Days::new(offset)) else {
            break;
        };
        if let Some(candidate) = timezone.from_local_datetime(&date.and_time(at)).earliest() {
            if candidate > *now {
                return candidate;
            }
        }
    }
    now.clone() + chrono::Duration::days(1)
}

pub type ReportCallback = Arc<dyn Fn(&UpdateReport) + Send + Sync>;

pub struct Scheduler<T: HttpTransport + 'static> {
    updater: Arc<Updater<T>>,
    spec: ScheduleSpec,
    sink: Arc<dyn ProgressSink + Send + Sync>,
    on_report: Option<ReportCallback>,
}

impl<T: HttpTransport + 'static> Scheduler<T> {
    pub fn new(
        updater: Arc<Updater<T>>,
        spec: ScheduleSpec,
        sink: Arc<dyn ProgressSink + Send + Sync>,
    ) -> Self {
        Self {
            updater,
            spec,
            sink,
            on_report: None,
        }
    }

    pub fn on_report(mut self, callback: ReportCallback) -> Self {
        self.on_report = Some(callback);
        self
    }

    /// Runs one update right away (when `run_on_start` is set) and then
    /// hands the daily trigger to a background thread.
    pub fn start(self) -> Result<SchedulerHandle, UpdateError> {
        if self.spec.run_on_start {
            info!("running startup update");
            self.run_once();
        }

        let (stop_tx, stop_rx) = mpsc::channel::<()>();
        let thread = thread::Builder::new()
            .name("ipdb-scheduler".to_string())
            .spawn(move || {
                loop {
                    let next = next_fire(&Local::now(), self.spec.daily_at);
                    info!("next update scheduled at {next}");
                    loop {
                        let remaining = (next - Local::now()).to_std().unwrap_or(Duration::ZERO);
                        if remaining.is_zero() {
                            break;
                        }
                        match stop_rx.recv_timeout(remaining.min(MAX_WAIT_SLICE)) {
                            Err(RecvTimeoutError::Timeout) => continue,
                            Ok(()) | Err(RecvTimeoutError::Disconnected) => {
                                info!("scheduler stopped");
                                return;
                            }
                        }
                    }
                    self.run_once();
                }
            })
            .map_err(|err| UpdateError::Scheduler(err.to_string()))?;

        Ok(SchedulerHandle {
            stop: Some(stop_tx),
            thread: Some(thread),
        })
    }

    fn run_once(&self) {
        let report = self.updater.run_full_update(self.sink.as_ref());
        match report.status {
            UpdateStatus::Completed => info!("all {} datasets up to date", report.items.len()),
            UpdateStatus::Skipped => warn!("previous update still running, run skipped"),
            UpdateStatus::Partial => {
                for item in report.failures() {
                    error!("{} not updated: {:?}", item.dataset, item.outcome);
                }
            }
        }
        if let Some(callback) = &self.on_report {
            callback(&report);
        }
    }
}

/// Handle to the background trigger. Dropping it stops the scheduler once
/// any in-flight run completes.
pub struct SchedulerHandle {
    stop: Option<Sender<()>>,
    thread: Option<JoinHandle<()>>,
}

impl SchedulerHandle {
    pub fn stop(&mut self) {
        if let Some(stop) = self.stop.take() {
            let _ = stop.send(());
        }
    }

    /// Blocks until the scheduler thread exits.
    pub fn join(mut self) {
        if let Some(thread) = self.thread.take() {
            if thread.join().is_err() {
                error!("scheduler thread panicked");
            }
        }
    }
}

impl Drop for SchedulerHandle {
    fn drop(&mut self) {
        self.stop();
    }
}
