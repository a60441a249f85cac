//! In-memory fakes of the storage API and the public HTTP endpoint, plus a
//! loopback HTTP server for exercising the real client.
//!
//! Every fake records the calls it receives so tests can assert on which
//! strategies actually hit the network.

use std::collections::HashMap;
use std::io::Cursor;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use bytes::Bytes;
use http::StatusCode;
use quick_xml::events::{BytesEnd, BytesStart, BytesText, Event};
use quick_xml::Writer;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::{TcpListener, TcpStream};

use crate::errors::ProbeError;
use crate::http::{HttpClient, HttpFuture, HttpResponse};
use crate::storage::backend::{Grant, PublicAccessBlock, StorageApi, StorageFuture};

/// Canned reply: a value or an S3 error code.
#[derive(Debug, Clone)]
pub enum Reply<T> {
    Ok(T),
    Err(&'static str),
}

impl<T: Clone> Reply<T> {
    fn resolve(&self, operation: &str) -> Result<T, ProbeError> {
        match self {
            Reply::Ok(v) => Ok(v.clone()),
            Reply::Err(code) => Err(ProbeError::from_service_code(
                Some(*code),
                operation,
                format!("simulated {code}"),
            )),
        }
    }
}

/// Fake [`StorageApi`].
pub struct FakeStorage {
    listing: Reply<Vec<String>>,
    objects: HashMap<String, Reply<()>>,
    default_object: Reply<()>,
    acls: HashMap<String, Reply<Vec<Grant>>>,
    public_access_block: Reply<Option<PublicAccessBlock>>,
    latency: Duration,
    calls: Mutex<Vec<String>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
}

impl FakeStorage {
    pub fn new() -> Self {
        Self {
            listing: Reply::Ok(Vec::new()),
            objects: HashMap::new(),
            default_object: Reply::Err("NoSuchKey"),
            acls: HashMap::new(),
            public_access_block: Reply::Ok(None),
            latency: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
            in_flight: AtomicUsize::new(0),
            max_in_flight: AtomicUsize::new(0),
        }
    }

    pub fn with_listing(mut self, listing: Reply<Vec<String>>) -> Self {
        self.listing = listing;
        self
    }

    pub fn with_object(mut self, key: &str, reply: Reply<()>) -> Self {
        self.objects.insert(key.to_string(), reply);
        self
    }

    /// Reply for keys without an explicit entry (including the random
    /// credential-validation key).
    pub fn with_default_object(mut self, reply: Reply<()>) -> Self {
        self.default_object = reply;
        self
    }

    pub fn with_acl(mut self, key: &str, reply: Reply<Vec<Grant>>) -> Self {
        self.acls.insert(key.to_string(), reply);
        self
    }

    pub fn with_public_access_block(mut self, reply: Reply<Option<PublicAccessBlock>>) -> Self {
        self.public_access_block = reply;
        self
    }

    pub fn with_latency(mut self, latency: Duration) -> Self {
        self.latency = latency;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn calls_to(&self, operation: &str) -> Vec<String> {
        let prefix = format!("{operation}:");
        self.calls()
            .into_iter()
            .filter(|c| c == operation || c.starts_with(&prefix))
            .collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    async fn record(&self, call: String) {
        self.calls.lock().unwrap().push(call);
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);
        if self.latency.is_zero() {
            tokio::task::yield_now().await;
        } else {
            tokio::time::sleep(self.latency).await;
        }
        self.in_flight.fetch_sub(1, Ordering::SeqCst);
    }
}

impl StorageApi for FakeStorage {
    fn list_objects<'a>(
        &'a self,
        _bucket: &'a str,
        max_keys: usize,
    ) -> StorageFuture<'a, Vec<String>> {
        Box::pin(async move {
            self.record("list_objects".to_string()).await;
            let mut keys = self.listing.resolve("list_objects_v2")?;
            keys.truncate(max_keys);
            Ok(keys)
        })
    }

    fn get_object<'a>(&'a self, _bucket: &'a str, key: &'a str) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            self.record(format!("get_object:{key}")).await;
            self.objects
                .get(key)
                .unwrap_or(&self.default_object)
                .resolve("get_object")
        })
    }

    fn get_object_acl<'a>(
        &'a self,
        _bucket: &'a str,
        key: &'a str,
    ) -> StorageFuture<'a, Vec<Grant>> {
        Box::pin(async move {
            self.record(format!("get_object_acl:{key}")).await;
            match self.acls.get(key) {
                Some(reply) => reply.resolve("get_object_acl"),
                None => Ok(Vec::new()),
            }
        })
    }

    fn get_public_access_block<'a>(
        &'a self,
        _bucket: &'a str,
    ) -> StorageFuture<'a, Option<PublicAccessBlock>> {
        Box::pin(async move {
            self.record("get_public_access_block".to_string()).await;
            self.public_access_block.resolve("get_public_access_block")
        })
    }
}

/// Fake [`HttpClient`]. Unknown URLs get `default_status`, or a transport
/// error when none is set.
pub struct FakeHttp {
    responses: HashMap<String, HttpResponse>,
    default_status: Option<StatusCode>,
    calls: Mutex<Vec<String>>,
}

impl FakeHttp {
    pub fn new() -> Self {
        Self {
            responses: HashMap::new(),
            default_status: None,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn with_response(mut self, url: &str, resp: HttpResponse) -> Self {
        self.responses.insert(url.to_string(), resp);
        self
    }

    pub fn with_status(self, url: &str, status: StatusCode) -> Self {
        self.with_response(url, HttpResponse::new(status, ""))
    }

    pub fn with_default_status(mut self, status: StatusCode) -> Self {
        self.default_status = Some(status);
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

impl FakeHttp {
    fn respond(&self, url: &str) -> Result<HttpResponse, ProbeError> {
        self.calls.lock().unwrap().push(url.to_string());
        if let Some(resp) = self.responses.get(url) {
            return Ok(resp.clone());
        }
        match self.default_status {
            Some(status) => Ok(HttpResponse::new(status, "")),
            None => Err(ProbeError::Transport(anyhow::anyhow!(
                "connection refused: {url}"
            ))),
        }
    }
}

impl HttpClient for FakeHttp {
    fn get<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            self.respond(url)
        })
    }

    fn get_status<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        Box::pin(async move {
            tokio::task::yield_now().await;
            let mut resp = self.respond(url)?;
            resp.body = Bytes::new();
            Ok(resp)
        })
    }

    fn head<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        self.get_status(url)
    }
}

/// Plain-HTTP server on a loopback port with a few canned routes:
///
/// - `/index`: `200` with body `hello`
/// - `/big.bin`: `200` announcing a 1 GB body that trickles out slowly
/// - `/`: `200`, empty body, `x-amz-bucket-region: eu-west-3`
/// - anything else: `404` with an S3 error document
pub struct TestServer {
    addr: SocketAddr,
    requests: Arc<Mutex<Vec<String>>>,
}

impl TestServer {
    pub fn url(&self, path: &str) -> String {
        format!("http://{}{}", self.addr, path)
    }

    pub fn endpoint(&self) -> String {
        format!("http://{}", self.addr)
    }

    /// `"<METHOD> <path>"` of every request received, in arrival order.
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().unwrap().clone()
    }
}

pub async fn spawn_http_server() -> TestServer {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let requests = Arc::new(Mutex::new(Vec::new()));

    let log = requests.clone();
    tokio::spawn(async move {
        while let Ok((stream, _)) = listener.accept().await {
            tokio::spawn(handle_connection(stream, log.clone()));
        }
    });

    TestServer { addr, requests }
}

async fn handle_connection(mut stream: TcpStream, log: Arc<Mutex<Vec<String>>>) {
    let mut head = Vec::new();
    let mut chunk = [0u8; 1024];
    while !head.windows(4).any(|w| w == b"\r\n\r\n") {
        match stream.read(&mut chunk).await {
            Ok(0) | Err(_) => return,
            Ok(n) => head.extend_from_slice(&chunk[..n]),
        }
    }

    let head = String::from_utf8_lossy(&head);
    let mut request_line = head.lines().next().unwrap_or_default().split_whitespace();
    let method = request_line.next().unwrap_or_default().to_string();
    let path = request_line.next().unwrap_or_default().to_string();
    log.lock().unwrap().push(format!("{method} {path}"));

    match path.as_str() {
        "/index" => {
            let _ = stream
                .write_all(b"HTTP/1.1 200 OK\r\nContent-Length: 5\r\nConnection: close\r\n\r\nhello")
                .await;
        }
        "/big.bin" => {
            let head = b"HTTP/1.1 200 OK\r\nContent-Length: 1000000000\r\nConnection: close\r\n\r\n";
            if stream.write_all(head).await.is_err() {
                return;
            }
            let block = vec![b'x'; 64 * 1024];
            for _ in 0..2000 {
                if stream.write_all(&block).await.is_err() {
                    return;
                }
                tokio::time::sleep(Duration::from_millis(50)).await;
            }
        }
        "/" => {
            let _ = stream
                .write_all(
                    b"HTTP/1.1 200 OK\r\nx-amz-bucket-region: eu-west-3\r\nContent-Length: 0\r\nConnection: close\r\n\r\n",
                )
                .await;
        }
        _ => {
            let body = "<Error><Code>NoSuchKey</Code></Error>";
            let resp = format!(
                "HTTP/1.1 404 Not Found\r\nContent-Length: {}\r\nConnection: close\r\n\r\n{body}",
                body.len()
            );
            let _ = stream.write_all(resp.as_bytes()).await;
        }
    }
    let _ = stream.shutdown().await;
}

/// Render a minimal `<ListBucketResult>` document listing `keys`.
pub fn listing_xml(bucket: &str, keys: &[&str]) -> String {
    let mut writer = Writer::new(Cursor::new(Vec::new()));

    let root = BytesStart::new("ListBucketResult")
        .with_attributes([("xmlns", "http://s3.amazonaws.com/doc/2006-03-01/")]);
    writer.write_event(Event::Start(root)).unwrap();
    write_text_element(&mut writer, "Name", bucket);
    write_text_element(&mut writer, "IsTruncated", "false");
    for key in keys {
        writer
            .write_event(Event::Start(BytesStart::new("Contents")))
            .unwrap();
        write_text_element(&mut writer, "Key", key);
        write_text_element(&mut writer, "StorageClass", "STANDARD");
        writer
            .write_event(Event::End(BytesEnd::new("Contents")))
            .unwrap();
    }
    writer
        .write_event(Event::End(BytesEnd::new("ListBucketResult")))
        .unwrap();

    String::from_utf8(writer.into_inner().into_inner()).unwrap()
}

fn write_text_element(writer: &mut Writer<Cursor<Vec<u8>>>, tag: &str, text: &str) {
    writer
        .write_event(Event::Start(BytesStart::new(tag)))
        .unwrap();
    writer
        .write_event(Event::Text(BytesText::new(text)))
        .unwrap();
    writer.write_event(Event::End(BytesEnd::new(tag))).unwrap();
}
