use std::fmt;
use std::str::FromStr;

use clap::ValueEnum;
use serde::{Deserialize, Serialize};

use crate::error::UpdateError;

/// File name of a dataset inside the storage directory.
///
/// Names are plain file names: no separators, no `.`/`..`, so a dataset can
/// never be written outside the storage directory.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct DatasetName(String);

impl DatasetName {
    pub(crate) fn from_static(value: &'static str) -> Self {
        Self(value.to_string())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for DatasetName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl FromStr for DatasetName {
    type Err = UpdateError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let trimmed = value.trim();
        let is_valid = !trimmed.is_empty()
            && trimmed != "."
            && trimmed != ".."
            && !trimmed.contains(['/', '\\', '\0']);
        if !is_valid {
            return Err(UpdateError::InvalidDatasetName(value.to_string()));
        }
        Ok(Self(trimmed.to_string()))
    }
}

impl TryFrom<String> for DatasetName {
    type Error = UpdateError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        value.parse()
    }
}

impl From<DatasetName> for String {
    fn from(value: DatasetName) -> Self {
        value.0
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DatasetEntry {
    pub name: DatasetName,
    pub url: String,
}

impl DatasetEntry {
    pub fn new(name: &str, url: &str) -> Result<Self, UpdateError> {
        Ok(Self {
            name: name.parse()?,
            url: url.to_string(),
        })
    }
}

/// How a download replaces the file already in the storage directory.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum WritePolicy {
    /// Truncate the destination before fetching; a failed fetch leaves a
    /// partial or empty file.
    #[default]
    InPlace,
    /// Write into a temp file next to the destination and rename on success.
    Staged,
}

impl fmt::Display for WritePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            WritePolicy::InPlace => write!(f, "in-place"),
            WritePolicy::Staged => write!(f, "staged"),
        }
    }
}
