use std::io::{self, Write};

use serde::Serialize;
use tracing::{debug, info};

use crate::app::UpdateReport;
use crate::download::DownloadOutcome;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};
use crate::store::StoredDataset;

pub struct JsonOutput;

impl JsonOutput {
    pub fn print_report(report: &UpdateReport) -> io::Result<()> {
        Self::print_json(report)
    }

    pub fn print_download(outcome: &DownloadOutcome) -> io::Result<()> {
        Self::print_json(outcome)
    }

    pub fn print_list(datasets: &[StoredDataset]) -> io::Result<()> {
        Self::print_json(&datasets)
    }

    fn print_json<T: Serialize>(value: &T) -> io::Result<()> {
        let json = serde_json::to_string_pretty(value).map_err(io::Error::other)?;
        let mut stdout = io::stdout();
        stdout.write_all(json.as_bytes())?;
        stdout.write_all(b"\n")?;
        Ok(())
    }
}

/// Reports download progress through `tracing`.
pub struct LogProgress;

impl ProgressSink for LogProgress {
    fn event(&self, event: ProgressEvent) {
        match event.phase {
            ProgressPhase::Resolve => debug!("resolving latest {}", event.dataset),
            ProgressPhase::Start => debug!("{}: request sent", event.dataset),
            ProgressPhase::Transfer => match event.percent() {
                Some(percent) => info!(
                    "{}: {} / {} ({percent:.0}%)",
                    event.dataset,
                    human_bytes(event.transferred),
                    human_bytes(event.total.unwrap_or_default())
                ),
                None => info!("{}: {}", event.dataset, human_bytes(event.transferred)),
            },
            ProgressPhase::Done => debug!(
                "{}: finished in {:.1?}",
                event.dataset,
                event.elapsed.unwrap_or_default()
            ),
            ProgressPhase::Failed => {}
        }
    }
}

pub fn human_bytes(bytes: u64) -> String {
    const UNITS: [&str; 4] = ["B", "KiB", "MiB", "GiB"];
    let mut value = bytes as f64;
    let mut unit = 0;
    while value >= 1024.0 && unit < UNITS.len() - 1 {
        value /= 1024.0;
        unit += 1;
    }
    if unit == 0 {
        format!("{bytes} B")
    } else {
        format!("{value:.1} {}", UNITS[unit])
    }
}
