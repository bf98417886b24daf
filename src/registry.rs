use std::collections::{BTreeMap, HashSet};

use crate::domain::{DatasetEntry, DatasetName};
use crate::error::UpdateError;

const BUILTIN_SOURCES: &[(&str, &str)] = &[
    (
        "city.free.ipdb",
        "https://raw.githubusercontent.com/ipipdotnet/ipdb-go/master/city.free.ipdb",
    ),
    (
        "qqwry.dat",
        "https://github.com/metowolf/qqwry.dat/releases/latest/download/qqwry.dat",
    ),
    (
        "zxipv6wry.db",
        "https://raw.githubusercontent.com/ZX-Inc/zxipdb-python/main/data/ipv6wry.db",
    ),
    ("GeoLite2-City.mmdb", "https://git.io/GeoLite2-City.mmdb"),
    (
        "ip2region.xdb",
        "https://raw.githubusercontent.com/lionsoul2014/ip2region/master/data/ip2region.xdb",
    ),
];

/// Datasets whose download location never moves.
///
/// Entries keep insertion order, which is also the order a full update
/// processes them in. The DB-IP lite family is deliberately absent: its URL
/// carries a release date and is discovered by [`crate::resolver`].
#[derive(Debug, Clone)]
pub struct SourceRegistry {
    entries: Vec<DatasetEntry>,
}

impl SourceRegistry {
    pub fn builtin() -> Self {
        let entries = BUILTIN_SOURCES
            .iter()
            .map(|&(name, url)| DatasetEntry {
                name: DatasetName::from_static(name),
                url: url.to_string(),
            })
            .collect();
        Self { entries }
    }

    pub fn from_entries(entries: Vec<DatasetEntry>) -> Result<Self, UpdateError> {
        let mut seen = HashSet::new();
        for entry in &entries {
            if !seen.insert(entry.name.clone()) {
                return Err(UpdateError::DuplicateSource(entry.name.to_string()));
            }
        }
        Ok(Self { entries })
    }

    /// Replaces the URL of known names and appends unknown ones.
    pub fn with_overrides(mut self, overrides: &BTreeMap<DatasetName, String>) -> Self {
        for (name, url) in overrides {
            match self.entries.iter_mut().find(|entry| &entry.name == name) {
                Some(entry) => entry.url = url.clone(),
                None => self.entries.push(DatasetEntry {
                    name: name.clone(),
                    url: url.clone(),
                }),
            }
        }
        self
    }

    pub fn lookup(&self, name: &str) -> Result<&str, UpdateError> {
        self.entries
            .iter()
            .find(|entry| entry.name.as_str() == name)
            .map(|entry| entry.url.as_str())
            .ok_or_else(|| UpdateError::FileNotFound(name.to_string()))
    }

    pub fn entries(&self) -> impl Iterator<Item = &DatasetEntry> {
        self.entries.iter()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
