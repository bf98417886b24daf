use std::fs;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::{DateTime, Utc};
use directories::BaseDirs;
use serde::Serialize;
use tempfile::{Builder, NamedTempFile};

use crate::domain::DatasetName;
use crate::error::UpdateError;

/// Layout of the storage directory: one flat file per dataset.
#[derive(Debug, Clone)]
pub struct Store {
    root: Utf8PathBuf,
}

#[derive(Debug, Clone, Serialize)]
pub struct StoredDataset {
    pub name: String,
    pub path: String,
    pub bytes: u64,
    pub modified: Option<DateTime<Utc>>,
}

impl Store {
    /// Store rooted in the platform data directory.
    pub fn new() -> Result<Self, UpdateError> {
        let root = BaseDirs::new()
            .and_then(|dirs| {
                Utf8PathBuf::from_path_buf(dirs.data_dir().join("ipdb-updater")).ok()
            })
            .ok_or_else(|| {
                UpdateError::Filesystem("unable to resolve data directory".to_string())
            })?;
        Ok(Self { root })
    }

    pub fn new_with_root(root: Utf8PathBuf) -> Self {
        Self { root }
    }

    pub fn root(&self) -> &Utf8Path {
        &self.root
    }

    pub fn dataset_path(&self, name: &DatasetName) -> Utf8PathBuf {
        self.root.join(name.as_str())
    }

    pub fn ensure_root(&self) -> Result<(), UpdateError> {
        fs::create_dir_all(self.root.as_std_path())
            .map_err(|err| UpdateError::Filesystem(format!("create {}: {err}", self.root)))
    }

    /// Temp file in the storage directory, so the final rename never
    /// crosses filesystems.
    pub fn staging_file(&self, name: &DatasetName) -> Result<NamedTempFile, UpdateError> {
        Builder::new()
            .prefix(&format!(".{name}."))
            .suffix(".part")
            .tempfile_in(self.root.as_std_path())
            .map_err(|err| UpdateError::Filesystem(err.to_string()))
    }

    pub fn persist_staged(temp: NamedTempFile, dest: &Utf8Path) -> Result<(), UpdateError> {
        temp.persist(dest.as_std_path())
            .map_err(|err| UpdateError::Filesystem(format!("persist {dest}: {err}")))?;
        Ok(())
    }

    /// Regular files in the storage directory, sorted by name. Hidden
    /// staging files are skipped.
    pub fn list(&self) -> Result<Vec<StoredDataset>, UpdateError> {
        if !self.root.as_std_path().exists() {
            return Ok(Vec::new());
        }
        let entries = fs::read_dir(self.root.as_std_path())
            .map_err(|err| UpdateError::Filesystem(err.to_string()))?;
        let mut items = Vec::new();
        for entry in entries {
            let entry = entry.map_err(|err| UpdateError::Filesystem(err.to_string()))?;
            let metadata = entry
                .metadata()
                .map_err(|err| UpdateError::Filesystem(err.to_string()))?;
            if !metadata.is_file() {
                continue;
            }
            let Ok(name) = entry.file_name().into_string() else {
                continue;
            };
            if name.starts_with('.') {
                continue;
            }
            items.push(StoredDataset {
                path: self.root.join(&name).to_string(),
                name,
                bytes: metadata.len(),
                modified: metadata.modified().ok().map(DateTime::<Utc>::from),
            });
        }
        items.sort_by(|a, b| a.name.cmp(&b.name));
        Ok(items)
    }
}
