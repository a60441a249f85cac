//! Unauthenticated HTTP access to a bucket's public endpoint.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use bytes::Bytes;
use http::{HeaderMap, Method, StatusCode};
use tracing::debug;

use crate::errors::ProbeError;

/// A fully-buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: StatusCode,
    pub headers: HeaderMap,
    pub body: Bytes,
}

impl HttpResponse {
    pub fn new(status: StatusCode, body: impl Into<Bytes>) -> Self {
        Self {
            status,
            headers: HeaderMap::new(),
            body: body.into(),
        }
    }
}

/// Boxed future returned by [`HttpClient`] methods.
pub type HttpFuture<'a> = Pin<Box<dyn Future<Output = Result<HttpResponse, ProbeError>> + Send + 'a>>;

/// Anonymous requests against public bucket URLs.
pub trait HttpClient: Send + Sync + 'static {
    /// `GET` and buffer the whole body.
    fn get<'a>(&'a self, url: &'a str) -> HttpFuture<'a>;

    /// `GET` returning as soon as the response head arrives. The body is
    /// never read and comes back empty.
    fn get_status<'a>(&'a self, url: &'a str) -> HttpFuture<'a>;

    /// `HEAD` request; the response has an empty body.
    fn head<'a>(&'a self, url: &'a str) -> HttpFuture<'a>;
}

/// [`HttpClient`] backed by `reqwest`.
pub struct ReqwestHttpClient {
    client: reqwest::Client,
}

impl ReqwestHttpClient {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .user_agent(concat!("bucketprobe/", env!("CARGO_PKG_VERSION")))
            .build()?;
        Ok(Self { client })
    }

    async fn send(&self, method: Method, url: &str) -> Result<reqwest::Response, ProbeError> {
        debug!(%method, url, "HTTP request");
        self.client
            .request(method.clone(), url)
            .send()
            .await
            .map_err(|e| ProbeError::Transport(anyhow::anyhow!("{method} {url}: {e}")))
    }

    /// Response head only; dropping `resp` discards the unread body.
    fn head_only(resp: reqwest::Response) -> HttpResponse {
        HttpResponse {
            status: resp.status(),
            headers: resp.headers().clone(),
            body: Bytes::new(),
        }
    }
}

impl HttpClient for ReqwestHttpClient {
    fn get<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        Box::pin(async move {
            let resp = self.send(Method::GET, url).await?;

            let status = resp.status();
            let headers = resp.headers().clone();
            let body = resp
                .bytes()
                .await
                .map_err(|e| ProbeError::Transport(anyhow::anyhow!("GET {url} body: {e}")))?;

            Ok(HttpResponse {
                status,
                headers,
                body,
            })
        })
    }

    fn get_status<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        Box::pin(async move {
            let resp = self.send(Method::GET, url).await?;
            Ok(Self::head_only(resp))
        })
    }

    fn head<'a>(&'a self, url: &'a str) -> HttpFuture<'a> {
        Box::pin(async move {
            let resp = self.send(Method::HEAD, url).await?;
            Ok(Self::head_only(resp))
        })
    }
}
