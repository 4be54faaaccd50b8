// Transport module: issues one HTTP call against the journal gateway and
// owns the retry policy. A call that gets *any* status line back is final;
// only a missing response (connect error, timeout) is retried.

use anyhow::{anyhow, Context, Result};
use reqwest::blocking::Client;
use reqwest::redirect::Policy;
use serde_json::Value;
use std::fmt;
use std::thread;
use std::time::Duration;
use thiserror::Error;

/// Total number of attempts made for one call (first try + 2 retries).
pub const MAX_ATTEMPTS: u32 = 3;

/// HTTP verbs used by the journal operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Method::Get => write!(f, "GET"),
            Method::Post => write!(f, "POST"),
        }
    }
}

/// Status code plus raw body as returned by the gateway. Consumed once by
/// the classifier.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatusEnvelope {
    pub status: u16,
    pub body: String,
}

impl StatusEnvelope {
    pub fn new(status: u16, body: impl Into<String>) -> Self {
        Self {
            status,
            body: body.into(),
        }
    }

    /// Envelope whose body is the compact JSON text of `value`.
    pub fn json(status: u16, value: &Value) -> Self {
        Self::new(status, value.to_string())
    }
}

/// Why a single send produced no envelope.
#[derive(Debug, Error)]
pub enum SendError {
    /// Nothing came back (connect error, timeout). Another attempt may work.
    #[error("no response: {0:#}")]
    NoResponse(anyhow::Error),
    /// The request cannot succeed as issued; repeating it fails the same way.
    #[error("{0:#}")]
    Fatal(anyhow::Error),
}

impl SendError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, SendError::NoResponse(_))
    }
}

/// Something that can perform a single request. Every answered request is
/// an `Ok` envelope, whatever its status code.
pub trait HttpBackend {
    fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<StatusEnvelope, SendError>;
}

/// Blocking reqwest client talking to the real gateway. Redirects are not
/// followed, so a 3xx comes back as an envelope.
pub struct ReqwestBackend {
    client: Client,
}

impl ReqwestBackend {
    pub fn new() -> Result<Self> {
        let client = Client::builder()
            .redirect(Policy::none())
            .build()
            .context("Failed to build HTTP client")?;
        Ok(Self { client })
    }
}

impl HttpBackend for ReqwestBackend {
    fn send(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<StatusEnvelope, SendError> {
        let mut req = match method {
            Method::Get => self.client.get(url),
            Method::Post => self.client.post(url),
        };
        if let Some(body) = payload {
            req = req.json(body);
        }
        let res = req.send().map_err(|e| {
            let retryable = e.is_connect() || e.is_timeout();
            let err = anyhow!(e).context(format!("Failed to send {} request", method));
            if retryable {
                SendError::NoResponse(err)
            } else {
                SendError::Fatal(err)
            }
        })?;

        let status = res.status().as_u16();
        // The server has answered; a broken body must not turn into a retry.
        let body = match res.text() {
            Ok(txt) => txt,
            Err(e) => {
                tracing::warn!(url, status, error = %e, "response body could not be read");
                String::new()
            }
        };
        Ok(StatusEnvelope { status, body })
    }
}

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("no response from {url} after {attempts} attempts: {last_fault}")]
    Unavailable {
        url: String,
        attempts: u32,
        last_fault: String,
    },
    #[error("request to {url} failed: {reason}")]
    Failed { url: String, reason: String },
}

/// Retrying wrapper around an [`HttpBackend`].
pub struct Transport {
    backend: Box<dyn HttpBackend>,
    delay_unit: Duration,
    sleeper: Box<dyn Fn(Duration)>,
}

impl Transport {
    pub fn new(backend: Box<dyn HttpBackend>) -> Self {
        Self {
            backend,
            delay_unit: Duration::from_secs(1),
            sleeper: Box::new(thread::sleep),
        }
    }

    /// Override the back-off unit; attempt `n` waits `n * unit` before the
    /// next try.
    pub fn with_delay_unit(mut self, unit: Duration) -> Self {
        self.delay_unit = unit;
        self
    }

    /// Replace the function used to wait between attempts.
    pub fn with_sleeper(mut self, sleeper: impl Fn(Duration) + 'static) -> Self {
        self.sleeper = Box::new(sleeper);
        self
    }

    /// Perform `method url` with an optional JSON payload, retrying only
    /// when no response arrives.
    pub fn call(
        &self,
        method: Method,
        url: &str,
        payload: Option<&Value>,
    ) -> Result<StatusEnvelope, TransportError> {
        let mut attempt = 1;
        loop {
            match self.backend.send(method, url, payload) {
                Ok(envelope) => {
                    tracing::debug!(url, attempt, status = envelope.status, "response received");
                    return Ok(envelope);
                }
                Err(e) if !e.is_retryable() => {
                    tracing::error!(url, attempt, error = %e, "request failed, not retrying");
                    return Err(TransportError::Failed {
                        url: url.to_string(),
                        reason: e.to_string(),
                    });
                }
                Err(e) if attempt < MAX_ATTEMPTS => {
                    tracing::warn!(url, attempt, error = %e, "request failed, retrying");
                    (self.sleeper)(self.delay_unit * attempt);
                    attempt += 1;
                }
                Err(e) => {
                    tracing::error!(url, attempt, error = %e, "request failed, giving up");
                    return Err(TransportError::Unavailable {
                        url: url.to_string(),
                        attempts: attempt,
                        last_fault: e.to_string(),
                    });
                }
            }
        }
    }
}
