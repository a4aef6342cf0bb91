//! Delivery of signed reports to the collector.

use std::future::Future;
use std::time::Duration;

use reqwest::header::{CONTENT_TYPE, HeaderValue};
use tracing::debug;

use crate::{AGENT_NAME, VERSION};

pub const TIMESTAMP_HEADER: &str = "X-Probe-Timestamp";
pub const SIGNATURE_HEADER: &str = "X-Probe-Signature";

/// A serialized, signed report ready to send.
#[derive(Debug, Clone)]
pub struct SignedReport {
    /// Decimal Unix seconds, as signed.
    pub timestamp: String,
    /// Lowercase-hex HMAC-SHA256 over `timestamp\nbody`.
    pub signature: String,
    pub body: Vec<u8>,
}

/// Error type for delivery failures.
#[derive(Debug)]
pub enum TransportError {
    /// Connection, TLS, or protocol failure.
    Http(reqwest::Error),
    /// The collector answered with a status of 300 or above.
    Status(u16),
    /// No answer within the send budget.
    Timeout(Duration),
    /// Shutdown was requested while the send was in flight.
    Cancelled,
}

impl std::fmt::Display for TransportError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            TransportError::Http(e) => write!(f, "HTTP error: {}", e),
            TransportError::Status(code) => write!(f, "server returned {}", code),
            TransportError::Timeout(after) => {
                write!(f, "send timed out after {}ms", after.as_millis())
            }
            TransportError::Cancelled => write!(f, "send cancelled by shutdown"),
        }
    }
}

impl std::error::Error for TransportError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            TransportError::Http(e) => Some(e),
            _ => None,
        }
    }
}

/// Anything that can deliver a `SignedReport`.
///
/// Resolves to the response status on success (always below 300).
pub trait Transport: Send + Sync {
    fn send(&self, report: &SignedReport)
    -> impl Future<Output = Result<u16, TransportError>> + Send;
}

/// Posts reports over HTTP(S) with `reqwest`.
pub struct HttpTransport {
    client: reqwest::Client,
    url: reqwest::Url,
    timeout: Duration,
}

impl HttpTransport {
    pub fn new(url: reqwest::Url, timeout: Duration) -> Result<Self, TransportError> {
        let client = reqwest::Client::builder()
            .user_agent(user_agent())
            .timeout(timeout)
            // A 3xx is a failed report, not something to follow.
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .map_err(TransportError::Http)?;
        Ok(Self {
            client,
            url,
            timeout,
        })
    }

    pub fn url(&self) -> &reqwest::Url {
        &self.url
    }

    fn classify(&self, e: reqwest::Error) -> TransportError {
        if e.is_timeout() {
            TransportError::Timeout(self.timeout)
        } else {
            TransportError::Http(e)
        }
    }
}

impl Transport for HttpTransport {
    async fn send(&self, report: &SignedReport) -> Result<u16, TransportError> {
        let response = self
            .client
            .post(self.url.clone())
            .header(CONTENT_TYPE, HeaderValue::from_static("application/json"))
            .header(TIMESTAMP_HEADER, report.timestamp.as_str())
            .header(SIGNATURE_HEADER, report.signature.as_str())
            .body(report.body.clone())
            .send()
            .await
            .map_err(|e| self.classify(e))?;

        let status = response.status();
        // Drain so the connection can go back to the pool.
        if let Err(e) = response.bytes().await {
            debug!(error = %e, "failed to drain response body");
        }

        if status.as_u16() >= 300 {
            return Err(TransportError::Status(status.as_u16()));
        }
        Ok(status.as_u16())
    }
}

/// The `User-Agent` value sent with every report.
pub fn user_agent() -> String {
    format!("{AGENT_NAME}/{VERSION}")
}
