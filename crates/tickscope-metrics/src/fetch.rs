//! HTTP fetcher for the managed process's endpoints.
//!
//! One short-lived HTTP/1.1 connection per request, bounded by a timeout.

use std::time::Duration;

use bytes::Bytes;
use http_body_util::{BodyExt, Empty};
use tracing::debug;

use crate::error::{FetchError, FetchResult};
use crate::source::{BoxFuture, MetricsSource};

/// Fetches text documents from `http://{address}{path}`.
#[derive(Debug, Clone)]
pub struct HttpFetcher {
    address: String,
    timeout: Duration,
}

impl HttpFetcher {
    pub fn new(address: impl Into<String>, timeout: Duration) -> Self {
        Self {
            address: address.into(),
            timeout,
        }
    }

    pub fn address(&self) -> &str {
        &self.address
    }

    /// GET `path` and return the body as text. Non-2xx is an error.
    pub async fn get_text(&self, path: &str) -> FetchResult<String> {
        match tokio::time::timeout(self.timeout, self.get_text_inner(path)).await {
            Ok(result) => result,
            Err(_) => {
                debug!(address = %self.address, %path, "fetch timed out");
                Err(FetchError::Timeout(self.timeout))
            }
        }
    }

    async fn get_text_inner(&self, path: &str) -> FetchResult<String> {
        let uri = format!("http://{}{path}", self.address);

        let stream = tokio::net::TcpStream::connect(&self.address)
            .await
            .map_err(|e| {
                debug!(error = %e, %uri, "fetch connection failed");
                FetchError::Connect {
                    address: self.address.clone(),
                    reason: e.to_string(),
                }
            })?;

        let io = hyper_util::rt::TokioIo::new(stream);
        let (mut sender, conn) = hyper::client::conn::http1::handshake(io)
            .await
            .map_err(|e| FetchError::Handshake(e.to_string()))?;

        // Drive the connection in the background.
        tokio::spawn(async move {
            let _ = conn.await;
        });

        let req = http::Request::builder()
            .method("GET")
            .uri(&uri)
            .header("host", &self.address)
            .header("user-agent", concat!("tickscope/", env!("CARGO_PKG_VERSION")))
            .body(Empty::<Bytes>::new())
            .map_err(|e| FetchError::Request(e.to_string()))?;

        let resp = sender
            .send_request(req)
            .await
            .map_err(|e| FetchError::Request(e.to_string()))?;

        if !resp.status().is_success() {
            debug!(status = %resp.status(), %uri, "fetch non-2xx");
            return Err(FetchError::Status(resp.status().as_u16()));
        }

        let body = resp
            .into_body()
            .collect()
            .await
            .map_err(|e| FetchError::Body(e.to_string()))?
            .to_bytes();

        String::from_utf8(body.to_vec()).map_err(|_| FetchError::Encoding)
    }
}

/// [`MetricsSource`] reading the metrics document over HTTP.
#[derive(Debug, Clone)]
pub struct HttpMetricsSource {
    fetcher: HttpFetcher,
    path: String,
}

impl HttpMetricsSource {
    pub fn new(fetcher: HttpFetcher, path: impl Into<String>) -> Self {
        Self {
            fetcher,
            path: path.into(),
        }
    }
}

impl MetricsSource for HttpMetricsSource {
    fn fetch_metrics(&self) -> BoxFuture<'_, FetchResult<String>> {
        Box::pin(self.fetcher.get_text(&self.path))
    }
}
