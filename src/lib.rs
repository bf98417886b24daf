//! Keeps a local directory of IP-geolocation datasets current.
//!
//! Static sources live in a [`registry::SourceRegistry`]; the DB-IP lite
//! family is discovered by scraping its landing page
//! ([`resolver::VersionResolver`]). [`app::Updater`] runs one refresh pass
//! over both and [`scheduler::Scheduler`] repeats it daily.

pub mod app;
pub mod config;
pub mod domain;
pub mod download;
pub mod error;
pub mod http;
pub mod output;
pub mod progress;
pub mod registry;
pub mod resolver;
pub mod scheduler;
pub mod store;
