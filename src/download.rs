use std::fs::File;
use std::io::{self, Read, Write};
use std::time::Instant;

use camino::{Utf8Path, Utf8PathBuf};
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tempfile::NamedTempFile;
use tracing::{debug, info, warn};
use url::Url;

use crate::domain::{DatasetName, WritePolicy};
use crate::error::UpdateError;
use crate::http::HttpTransport;
use crate::progress::{ProgressEvent, ProgressPhase, ProgressReader, ProgressSink};
use crate::registry::SourceRegistry;
use crate::store::Store;

const COPY_BUFFER_BYTES: usize = 64 * 1024;

/// Everything known about one download once the response headers are in.
#[derive(Debug, Clone)]
pub struct DownloadTask {
    pub name: DatasetName,
    pub effective_url: String,
    pub destination: Utf8PathBuf,
    pub is_compressed: bool,
    pub expected_length: Option<u64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct DownloadOutcome {
    pub name: String,
    pub url: String,
    pub path: String,
    /// Bytes written to disk, after decompression.
    pub bytes_written: u64,
    pub compressed: bool,
    pub elapsed_ms: u128,
}

enum Destination {
    InPlace(File),
    Staged(NamedTempFile),
}

impl Destination {
    fn writer(&mut self) -> &mut File {
        match self {
            Destination::InPlace(file) => file,
            Destination::Staged(temp) => temp.as_file_mut(),
        }
    }
}

enum CopyError {
    Read(io::Error),
    Write(io::Error),
}

pub struct Downloader<T: HttpTransport> {
    transport: T,
    registry: SourceRegistry,
    store: Store,
    policy: WritePolicy,
}

impl<T: HttpTransport> Downloader<T> {
    pub fn new(transport: T, registry: SourceRegistry, store: Store) -> Self {
        Self {
            transport,
            registry,
            store,
            policy: WritePolicy::default(),
        }
    }

    pub fn with_policy(mut self, policy: WritePolicy) -> Self {
        self.policy = policy;
        self
    }

    pub fn registry(&self) -> &SourceRegistry {
        &self.registry
    }

    pub fn store(&self) -> &Store {
        &self.store
    }

    /// Fetches `name` into the storage directory.
    ///
    /// A non-empty `explicit_url` is used verbatim; otherwise the URL comes
    /// from the registry. The body is gunzipped when the URL path ends in
    /// `.gz`. With [`WritePolicy::InPlace`] the destination is truncated
    /// before the request goes out and is left as-is when anything fails.
    pub fn download(
        &self,
        name: &str,
        explicit_url: Option<&str>,
        sink: &dyn ProgressSink,
    ) -> Result<DownloadOutcome, UpdateError> {
        let name: DatasetName = name.parse()?;
        let url = match explicit_url.filter(|url| !url.is_empty()) {
            Some(url) => url.to_string(),
            None => match self.registry.lookup(name.as_str()) {
                Ok(url) => url.to_string(),
                Err(err) => {
                    debug!("unknown file {name}");
                    return Err(err);
                }
            },
        };
        let is_compressed = is_gzip_url(&url)?;
        let destination_path = self.store.dataset_path(&name);

        info!("downloading {name} from {url} to {}", self.store.root());
        let started = Instant::now();

        self.store.ensure_root()?;
        let mut destination = self.open_destination(&name, &destination_path)?;

        sink.event(ProgressEvent::new(name.as_str(), ProgressPhase::Start));
        let result = self.fetch_into(&name, &url, is_compressed, &mut destination, sink);
        let bytes_written = match result {
            Ok(bytes) => bytes,
            Err(err) => {
                warn!("download of {name} failed: {err}");
                let mut event = ProgressEvent::new(name.as_str(), ProgressPhase::Failed);
                event.elapsed = Some(started.elapsed());
                sink.event(event);
                return Err(err);
            }
        };

        match destination {
            Destination::InPlace(file) => file
                .sync_all()
                .map_err(|err| UpdateError::Filesystem(err.to_string()))?,
            Destination::Staged(temp) => Store::persist_staged(temp, &destination_path)?,
        }

        let mut event = ProgressEvent::new(name.as_str(), ProgressPhase::Done);
        event.transferred = bytes_written;
        event.elapsed = Some(started.elapsed());
        sink.event(event);
        info!("download {name} success ({bytes_written} bytes)");

        Ok(DownloadOutcome {
            name: name.to_string(),
            url,
            path: destination_path.to_string(),
            bytes_written,
            compressed: is_compressed,
            elapsed_ms: started.elapsed().as_millis(),
        })
    }

    fn open_destination(
        &self,
        name: &DatasetName,
        path: &Utf8Path,
    ) -> Result<Destination, UpdateError> {
        match self.policy {
            WritePolicy::InPlace => File::create(path.as_std_path())
                .map(Destination::InPlace)
                .map_err(|err| {
                    debug!("create file {name} failed: {err}");
                    UpdateError::Filesystem(format!("create {path}: {err}"))
                }),
            WritePolicy::Staged => self.store.staging_file(name).map(Destination::Staged),
        }
    }

    fn fetch_into(
        &self,
        name: &DatasetName,
        url: &str,
        is_compressed: bool,
        destination: &mut Destination,
        sink: &dyn ProgressSink,
    ) -> Result<u64, UpdateError> {
        let response = self.transport.get(url)?;
        if response.status != 200 {
            debug!("http get {url} failed: status {}", response.status);
            return Err(UpdateError::FailedDownload {
                status: response.status,
                url: url.to_string(),
            });
        }

        let task = DownloadTask {
            name: name.clone(),
            effective_url: url.to_string(),
            destination: self.store.dataset_path(name),
            is_compressed,
            expected_length: response.content_length,
        };
        debug!(
            "streaming {} (compressed: {}, expected length: {:?})",
            task.destination, task.is_compressed, task.expected_length
        );

        let reader =
            ProgressReader::new(response.body, sink, task.name.as_str(), task.expected_length);
        let writer = destination.writer();
        if task.is_compressed {
            let mut decoder = MultiGzDecoder::new(reader);
            copy_stream(&mut decoder, writer).map_err(|err| match err {
                CopyError::Write(err) => UpdateError::Filesystem(err.to_string()),
                CopyError::Read(err) if decoder.get_ref().inner_failed() => {
                    UpdateError::Transport(err.to_string())
                }
                CopyError::Read(err) => {
                    debug!("gzip decode of {} failed: {err}", task.effective_url);
                    UpdateError::Decode(err.to_string())
                }
            })
        } else {
            let mut reader = reader;
            copy_stream(&mut reader, writer).map_err(|err| match err {
                CopyError::Write(err) => UpdateError::Filesystem(err.to_string()),
                CopyError::Read(err) => UpdateError::Transport(err.to_string()),
            })
        }
    }
}

fn copy_stream<R: Read, W: Write>(reader: &mut R, writer: &mut W) -> Result<u64, CopyError> {
    let mut buf = vec![0u8; COPY_BUFFER_BYTES];
    let mut written = 0u64;
    loop {
        let read = match reader.read(&mut buf) {
            Ok(0) => break,
            Ok(read) => read,
            Err(err) if err.kind() == io::ErrorKind::Interrupted => continue,
            Err(err) => return Err(CopyError::Read(err)),
        };
        writer.write_all(&buf[..read]).map_err(CopyError::Write)?;
        written += read as u64;
    }
    writer.flush().map_err(CopyError::Write)?;
    Ok(written)
}

/// Whether the last path segment of `url` carries a `.gz` extension.
/// Query string and fragment are ignored.
pub fn is_gzip_url(url: &str) -> Result<bool, UpdateError> {
    let parsed = Url::parse(url).map_err(|err| UpdateError::InvalidUrl(format!("{url}: {err}")))?;
    let last_segment = parsed.path().rsplit('/').next().unwrap_or_default();
    Ok(last_segment.ends_with(".gz"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn gzip_detection_uses_path_only() {
        assert!(is_gzip_url("https://download.db-ip.com/free/dbip-city-lite-2024-03.mmdb.gz").unwrap());
        assert!(is_gzip_url("http://x/b.gz?token=abc#frag").unwrap());
        assert!(!is_gzip_url("http://x/a.db?format=.gz").unwrap());
        assert!(!is_gzip_url("http://x/archive.gz/latest").unwrap());
        assert!(!is_gzip_url("https://git.io/GeoLite2-City.mmdb").unwrap());
    }

    #[test]
    fn gzip_detection_rejects_relative_urls() {
        assert!(matches!(
            is_gzip_url("not a url"),
            Err(UpdateError::InvalidUrl(_))
        ));
    }
}
