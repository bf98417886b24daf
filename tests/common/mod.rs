#![allow(dead_code)]

use std::collections::HashMap;
use std::io::{self, BufRead, BufReader, Cursor, Read, Write};
use std::net::{SocketAddr, TcpListener, TcpStream};
use std::sync::{Arc, Mutex};
use std::thread;

use camino::Utf8PathBuf;
use flate2::Compression;
use flate2::write::GzEncoder;

use ipdb_updater::error::UpdateError;
use ipdb_updater::http::{HttpResponse, HttpTransport};
use ipdb_updater::progress::{ProgressEvent, ProgressSink};
use ipdb_updater::store::Store;

#[derive(Clone)]
pub struct StubRoute {
    pub status: u16,
    pub body: Vec<u8>,
    /// Serve this many body bytes, then fail the read.
    pub break_after: Option<usize>,
}

/// In-memory transport keyed by full URL. Unknown URLs fail like a refused
/// connection.
#[derive(Default)]
pub struct StubTransport {
    routes: HashMap<String, StubRoute>,
    calls: Mutex<Vec<String>>,
}

impl StubTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn route(mut self, url: &str, status: u16, body: &[u8]) -> Self {
        self.routes.insert(
            url.to_string(),
            StubRoute {
                status,
                body: body.to_vec(),
                break_after: None,
            },
        );
        self
    }

    pub fn broken_route(mut self, url: &str, body: &[u8], break_after: usize) -> Self {
        self.routes.insert(
            url.to_string(),
            StubRoute {
                status: 200,
                body: body.to_vec(),
                break_after: Some(break_after),
            },
        );
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl HttpTransport for StubTransport {
    fn get(&self, url: &str) -> Result<HttpResponse, UpdateError> {
        self.calls.lock().unwrap().push(url.to_string());
        let route = self
            .routes
            .get(url)
            .cloned()
            .ok_or_else(|| UpdateError::Transport(format!("connection refused: {url}")))?;
        let content_length = Some(route.body.len() as u64);
        let body: Box<dyn Read + Send> = match route.break_after {
            Some(limit) => Box::new(BrokenBody {
                inner: Cursor::new(route.body[..limit].to_vec()),
            }),
            None => Box::new(Cursor::new(route.body)),
        };
        Ok(HttpResponse {
            status: route.status,
            content_length,
            body,
        })
    }
}

struct BrokenBody {
    inner: Cursor<Vec<u8>>,
}

impl Read for BrokenBody {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        match self.inner.read(buf)? {
            0 => Err(io::Error::new(
                io::ErrorKind::ConnectionReset,
                "connection reset by peer",
            )),
            read => Ok(read),
        }
    }
}

#[derive(Default)]
pub struct RecordingSink {
    pub events: Mutex<Vec<ProgressEvent>>,
}

impl ProgressSink for RecordingSink {
    fn event(&self, event: ProgressEvent) {
        self.events.lock().unwrap().push(event);
    }
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}

pub fn temp_store() -> (tempfile::TempDir, Store) {
    let temp = tempfile::tempdir().unwrap();
    let root = Utf8PathBuf::from_path_buf(temp.path().join("ips")).unwrap();
    (temp, Store::new_with_root(root))
}

pub fn file_names(store: &Store) -> Vec<String> {
    let mut names: Vec<String> = std::fs::read_dir(store.root().as_std_path())
        .unwrap()
        .map(|entry| entry.unwrap().file_name().into_string().unwrap())
        .collect();
    names.sort();
    names
}

/// Minimal HTTP/1.1 server answering GETs from a path → (status, body) table.
pub struct StubServer {
    addr: SocketAddr,
    routes: Arc<Mutex<HashMap<String, (u16, Vec<u8>)>>>,
    hits: Arc<Mutex<Vec<String>>>,
}

impl StubServer {
    pub fn start(routes: HashMap<String, (u16, Vec<u8>)>) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let routes = Arc::new(Mutex::new(routes));
        let hits = Arc::new(Mutex::new(Vec::new()));
        let server_routes = Arc::clone(&routes);
        let server_hits = Arc::clone(&hits);
        thread::spawn(move || {
            for stream in listener.incoming() {
                let Ok(stream) = stream else {
                    continue;
                };
                let _ = serve(stream, &server_routes, &server_hits);
            }
        });
        Self { addr, routes, hits }
    }

    /// Adds or replaces a route on the running server.
    pub fn route(&self, path: &str, status: u16, body: &[u8]) {
        self.routes
            .lock()
            .unwrap()
            .insert(path.to_string(), (status, body.to_vec()));
    }

    pub fn base(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base())
    }

    pub fn hits(&self) -> Vec<String> {
        self.hits.lock().unwrap().clone()
    }
}

fn serve(
    mut stream: TcpStream,
    routes: &Mutex<HashMap<String, (u16, Vec<u8>)>>,
    hits: &Mutex<Vec<String>>,
) -> io::Result<()> {
    let mut reader = BufReader::new(stream.try_clone()?);
    let mut request_line = String::new();
    reader.read_line(&mut request_line)?;
    loop {
        let mut header = String::new();
        if reader.read_line(&mut header)? == 0 || header == "\r\n" || header == "\n" {
            break;
        }
    }

    let path = request_line
        .split_whitespace()
        .nth(1)
        .unwrap_or("/")
        .to_string();
    hits.lock().unwrap().push(path.clone());

    let (status, body) = routes
        .lock()
        .unwrap()
        .get(&path)
        .cloned()
        .unwrap_or((404, b"not found".to_vec()));
    let reason = if status == 200 { "OK" } else { "Error" };
    write!(
        stream,
        "HTTP/1.1 {status} {reason}\r\nContent-Length: {}\r\nConnection: close\r\n\r\n",
        body.len()
    )?;
    stream.write_all(&body)?;
    stream.flush()
}
