//! HTTP fetch primitive used to download remote artifacts.
//!
//! A fetch either streams the whole body into the sink or fails with
//! `TransferFailed`. Only `200 OK` counts as success.

use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use reqwest::StatusCode;

use crate::error::HiveError;

pub trait Fetcher: Send + Sync {
    /// GET `url` and copy the full body into `sink`. Returns bytes written.
    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HiveError>;
}

/// Blocking reqwest client. No request timeout: downloads run to completion
/// or to a transport failure.
pub struct HttpFetcher {
    inner: reqwest::blocking::Client,
}

impl HttpFetcher {
    pub fn new() -> Result<Self, HiveError> {
        let inner = reqwest::blocking::Client::builder()
            .timeout(None::<Duration>)
            .build()
            .map_err(|e| HiveError::io("build http client", e))?;
        Ok(Self { inner })
    }
}

impl Fetcher for HttpFetcher {
    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HiveError> {
        let transfer_failed = |reason: String| HiveError::TransferFailed {
            url: url.to_string(),
            reason,
        };

        let mut resp = self
            .inner
            .get(url)
            .send()
            .map_err(|e| transfer_failed(e.to_string()))?;

        let status = resp.status();
        if status != StatusCode::OK {
            tracing::warn!(url = %url, status = status.as_u16(), "http.get rejected");
            return Err(transfer_failed(format!("HTTP {}", status.as_u16())));
        }

        let written = resp
            .copy_to(sink)
            .map_err(|e| transfer_failed(e.to_string()))?;
        tracing::info!(url = %url, bytes = written, "http.get");
        Ok(written)
    }
}

// ---------------------------------------------------------------------------
// StaticFetcher (for tests)
// ---------------------------------------------------------------------------

/// Serves one fixed response for every URL and counts requests.
pub struct StaticFetcher {
    status: u16,
    body: Vec<u8>,
    requests: AtomicUsize,
}

impl StaticFetcher {
    pub fn ok(body: impl Into<Vec<u8>>) -> Self {
        Self::with_status(200, body)
    }

    pub fn with_status(status: u16, body: impl Into<Vec<u8>>) -> Self {
        Self {
            status,
            body: body.into(),
            requests: AtomicUsize::new(0),
        }
    }

    pub fn requests(&self) -> usize {
        self.requests.load(Ordering::SeqCst)
    }
}

impl Fetcher for StaticFetcher {
    fn fetch_to(&self, url: &str, sink: &mut dyn Write) -> Result<u64, HiveError> {
        self.requests.fetch_add(1, Ordering::SeqCst);
        if self.status != 200 {
            return Err(HiveError::TransferFailed {
                url: url.to_string(),
                reason: format!("HTTP {}", self.status),
            });
        }
        sink.write_all(&self.body)
            .map_err(|e| HiveError::TransferFailed {
                url: url.to_string(),
                reason: e.to_string(),
            })?;
        Ok(self.body.len() as u64)
    }
}
