use std::sync::atomic::{AtomicBool, Ordering};

use chrono::{DateTime, Local};
use serde::Serialize;
use tracing::{info, warn};

use crate::download::Downloader;
use crate::error::UpdateError;
use crate::http::HttpTransport;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressSink};
use crate::resolver::{VersionResolver, VersionedFamily};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdateStatus {
    Completed,
    Partial,
    Skipped,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "result", rename_all = "lowercase")]
pub enum ItemOutcome {
    Downloaded { bytes: u64, compressed: bool },
    Failed { error: String },
    Unresolved { error: String },
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateItem {
    pub dataset: String,
    pub url: Option<String>,
    #[serde(flatten)]
    pub outcome: ItemOutcome,
}

impl UpdateItem {
    pub fn is_success(&self) -> bool {
        matches!(self.outcome, ItemOutcome::Downloaded { .. })
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct UpdateReport {
    pub started_at: DateTime<Local>,
    pub finished_at: DateTime<Local>,
    pub status: UpdateStatus,
    pub items: Vec<UpdateItem>,
}

impl UpdateReport {
    pub fn failures(&self) -> impl Iterator<Item = &UpdateItem> {
        self.items.iter().filter(|item| !item.is_success())
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.is_success()).count()
    }
}

/// Runs full refresh passes: every registry dataset, then the versioned
/// family.
///
/// Individual failures never stop a pass; they end up in the returned
/// [`UpdateReport`]. Only one pass runs at a time per updater: a call made
/// while another pass is in flight returns a `Skipped` report immediately.
pub struct Updater<T: HttpTransport> {
    downloader: Downloader<T>,
    resolver: VersionResolver<T>,
    family: VersionedFamily,
    running: AtomicBool,
}

struct RunGuard<'a>(&'a AtomicBool);

impl Drop for RunGuard<'_> {
    fn drop(&mut self) {
        self.0.store(false, Ordering::Release);
    }
}

impl<T: HttpTransport> Updater<T> {
    pub fn new(
        downloader: Downloader<T>,
        resolver: VersionResolver<T>,
        family: VersionedFamily,
    ) -> Self {
        Self {
            downloader,
            resolver,
            family,
            running: AtomicBool::new(false),
        }
    }

    pub fn downloader(&self) -> &Downloader<T> {
        &self.downloader
    }

    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::Acquire)
    }

    pub fn run_full_update(&self, sink: &dyn ProgressSink) -> UpdateReport {
        let started_at = Local::now();
        let Some(_guard) = self.try_begin() else {
            warn!("update already in progress, skipping this run");
            return UpdateReport {
                started_at,
                finished_at: Local::now(),
                status: UpdateStatus::Skipped,
                items: Vec::new(),
            };
        };

        if let Err(err) = self.downloader.store().ensure_root() {
            warn!("storage directory unavailable, nothing downloaded: {err}");
            let items = self.fail_all(&err);
            return finish(started_at, items);
        }

        let mut items = Vec::new();
        for entry in self.downloader.registry().entries() {
            items.push(self.download_item(entry.name.as_str(), None, sink));
        }

        sink.event(ProgressEvent::new(
            self.family.primary.as_str(),
            ProgressPhase::Resolve,
        ));
        match self.resolver.resolve_family(&self.family) {
            Ok(resolved) => {
                info!(
                    "resolved {} to {}",
                    self.family.primary, resolved.primary_url
                );
                items.push(self.download_item(
                    self.family.primary.as_str(),
                    Some(&resolved.primary_url),
                    sink,
                ));
                items.push(self.download_item(
                    self.family.sibling.as_str(),
                    Some(&resolved.sibling_url),
                    sink,
                ));
            }
            Err(err) => {
                warn!("{err}");
                for name in [&self.family.primary, &self.family.sibling] {
                    items.push(UpdateItem {
                        dataset: name.to_string(),
                        url: None,
                        outcome: ItemOutcome::Unresolved {
                            error: err.to_string(),
                        },
                    });
                }
            }
        }

        finish(started_at, items)
    }

    /// One `Failed` item per dataset the run would have touched.
    fn fail_all(&self, err: &UpdateError) -> Vec<UpdateItem> {
        let registry = self
            .downloader
            .registry()
            .entries()
            .map(|entry| (entry.name.to_string(), Some(entry.url.clone())));
        let family = [&self.family.primary, &self.family.sibling]
            .into_iter()
            .map(|name| (name.to_string(), None));
        registry
            .chain(family)
            .map(|(dataset, url)| UpdateItem {
                dataset,
                url,
                outcome: ItemOutcome::Failed {
                    error: err.to_string(),
                },
            })
            .collect()
    }

    fn try_begin(&self) -> Option<RunGuard<'_>> {
        self.running
            .compare_exchange(false, true, Ordering::AcqRel, Ordering::Acquire)
            .ok()
            .map(|_| RunGuard(&self.running))
    }

    fn download_item(&self, name: &str, url: Option<&str>, sink: &dyn ProgressSink) -> UpdateItem {
        let effective_url = url
            .map(str::to_string)
            .or_else(|| self.downloader.registry().lookup(name).ok().map(str::to_string));
        let outcome = match self.downloader.download(name, url, sink) {
            Ok(outcome) => ItemOutcome::Downloaded {
                bytes: outcome.bytes_written,
                compressed: outcome.compressed,
            },
            Err(err) => ItemOutcome::Failed {
                error: err.to_string(),
            },
        };
        UpdateItem {
            dataset: name.to_string(),
            url: effective_url,
            outcome,
        }
    }
}

fn finish(started_at: DateTime<Local>, items: Vec<UpdateItem>) -> UpdateReport {
    let status = if items.iter().all(UpdateItem::is_success) {
        UpdateStatus::Completed
    } else {
        UpdateStatus::Partial
    };
    let report = UpdateReport {
        started_at,
        finished_at: Local::now(),
        status,
        items,
    };
    info!(
        "update finished: {}/{} datasets refreshed",
        report.succeeded(),
        report.items.len()
    );
    report
}
