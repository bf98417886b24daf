use std::collections::BTreeMap;
use std::fs;
use std::path::PathBuf;
use std::time::Duration;

use camino::{Utf8Path, Utf8PathBuf};
use chrono::NaiveTime;
use serde::{Deserialize, Serialize};
use url::Url;

use crate::domain::{DatasetName, WritePolicy};
use crate::error::UpdateError;
use crate::http::{DEFAULT_CONNECT_TIMEOUT, DEFAULT_REQUEST_TIMEOUT};
use crate::registry::SourceRegistry;
use crate::resolver::VersionedFamily;
use crate::scheduler::ScheduleSpec;
use crate::store::Store;

pub const DEFAULT_CONFIG_FILE: &str = "ipdb-updater.json";

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub storage_dir: Option<String>,
    /// Extra datasets, or replacement URLs for built-in ones.
    #[serde(default)]
    pub sources: BTreeMap<String, String>,
    #[serde(default)]
    pub write_policy: Option<WritePolicy>,
    #[serde(default)]
    pub connect_timeout_secs: Option<u64>,
    #[serde(default)]
    pub request_timeout_secs: Option<u64>,
    #[serde(default)]
    pub landing_page: Option<String>,
    #[serde(default)]
    pub schedule: Option<ScheduleEntry>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(deny_unknown_fields)]
pub struct ScheduleEntry {
    #[serde(default)]
    pub daily_at: Option<String>,
    #[serde(default)]
    pub run_on_start: Option<bool>,
}

#[derive(Debug, Clone)]
pub struct ResolvedConfig {
    pub storage_dir: Utf8PathBuf,
    pub registry: SourceRegistry,
    pub write_policy: WritePolicy,
    pub connect_timeout: Duration,
    pub request_timeout: Duration,
    pub family: VersionedFamily,
    pub schedule: ScheduleSpec,
}

impl ResolvedConfig {
    pub fn store(&self) -> Store {
        Store::new_with_root(self.storage_dir.clone())
    }
}

pub struct ConfigLoader;

impl ConfigLoader {
    /// Loads `path`, or `ipdb-updater.json` from the working directory when
    /// present. With neither, every setting takes its default.
    ///
    /// `storage_dir` wins over the file's value and skips the platform data
    /// directory lookup.
    pub fn resolve(
        path: Option<&str>,
        storage_dir: Option<&Utf8Path>,
    ) -> Result<ResolvedConfig, UpdateError> {
        let mut config = Self::load(path)?;
        if let Some(dir) = storage_dir {
            config.storage_dir = Some(dir.to_string());
        }
        Self::resolve_config(config)
    }

    fn load(path: Option<&str>) -> Result<Config, UpdateError> {
        let config_path = PathBuf::from(path.unwrap_or(DEFAULT_CONFIG_FILE));

        if path.is_none() && !config_path.exists() {
            return Ok(Config::default());
        }

        let content = fs::read_to_string(&config_path)
            .map_err(|_| UpdateError::ConfigRead(config_path.clone()))?;
        serde_json::from_str(&content).map_err(|err| UpdateError::ConfigParse(err.to_string()))
    }

    pub fn resolve_config(config: Config) -> Result<ResolvedConfig, UpdateError> {
        let storage_dir = match config.storage_dir {
            Some(dir) => Utf8PathBuf::from(dir),
            None => Store::new()?.root().to_owned(),
        };

        let overrides = config
            .sources
            .into_iter()
            .map(|(name, url)| {
                let name: DatasetName = name.parse()?;
                validate_url(&url)?;
                Ok((name, url))
            })
            .collect::<Result<BTreeMap<_, _>, UpdateError>>()?;
        let registry = SourceRegistry::builtin().with_overrides(&overrides);

        let family = match config.landing_page {
            Some(page) => {
                validate_url(&page)?;
                VersionedFamily::dbip_lite().with_landing_page(&page)
            }
            None => VersionedFamily::dbip_lite(),
        };

        let schedule_entry = config.schedule.unwrap_or_default();
        let defaults = ScheduleSpec::default();
        let schedule = ScheduleSpec {
            daily_at: match schedule_entry.daily_at {
                Some(value) => parse_daily_at(&value)?,
                None => defaults.daily_at,
            },
            run_on_start: schedule_entry.run_on_start.unwrap_or(defaults.run_on_start),
        };

        Ok(ResolvedConfig {
            storage_dir,
            registry,
            write_policy: config.write_policy.unwrap_or_default(),
            connect_timeout: config
                .connect_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_CONNECT_TIMEOUT),
            request_timeout: config
                .request_timeout_secs
                .map(Duration::from_secs)
                .unwrap_or(DEFAULT_REQUEST_TIMEOUT),
            family,
            schedule,
        })
    }
}

/// Accepts `HH:MM:SS` or `HH:MM`.
pub fn parse_daily_at(value: &str) -> Result<NaiveTime, UpdateError> {
    let value = value.trim();
    NaiveTime::parse_from_str(value, "%H:%M:%S")
        .or_else(|_| NaiveTime::parse_from_str(value, "%H:%M"))
        .map_err(|_| UpdateError::InvalidSchedule(value.to_string()))
}

fn validate_url(value: &str) -> Result<(), UpdateError> {
    Url::parse(value)
        .map(|_| ())
        .map_err(|err| UpdateError::InvalidUrl(format!("{value}: {err}")))
}
