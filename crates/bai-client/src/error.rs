//! Error types for bai-client.
//!
//! The variants mirror how a failure should be handled: `Client` errors are
//! raised before any I/O and are never retried, `Transport` and
//! `TransferFailure` are only retried inside the resumable upload loop, and
//! `Api` errors are surfaced exactly as the server reported them.

use std::fmt;
use std::io;

use serde::{Deserialize, Serialize};
use thiserror::Error;

pub type BoxError = Box<dyn std::error::Error + Send + Sync + 'static>;

#[derive(Debug, Error)]
pub enum Error {
    /// Local precondition failure (bad arguments, closed session, invalid method).
    #[error("client error: {0}")]
    Client(String),

    /// Connectivity, DNS, or malformed-response failure.
    #[error("request to the API endpoint has failed: {message}")]
    Transport {
        message: String,
        #[source]
        source: Option<BoxError>,
    },

    /// Any non-2xx response.
    #[error("{0}")]
    Api(Box<ApiError>),

    /// A chunk of a resumable upload was not accepted.
    #[error("chunk transfer failed at offset {offset}: {message}")]
    TransferFailure {
        offset: u64,
        status: Option<u16>,
        message: String,
    },

    /// Local filesystem failure while reading or writing transfer payloads.
    #[error("file I/O error: {0}")]
    Io(#[from] io::Error),
}

pub type Result<T> = std::result::Result<T, Error>;

impl Error {
    pub fn client(message: impl Into<String>) -> Self {
        Error::Client(message.into())
    }

    pub fn transport(message: impl Into<String>, source: impl Into<BoxError>) -> Self {
        Error::Transport { message: message.into(), source: Some(source.into()) }
    }

    /// A response that violates the wire protocol.
    pub fn protocol(message: impl Into<String>) -> Self {
        Error::Transport { message: message.into(), source: None }
    }

    /// Whether the resumable upload loop may retry after this error.
    pub fn is_retryable(&self) -> bool {
        matches!(self, Error::Transport { .. } | Error::TransferFailure { .. })
    }

    /// HTTP status attached to the error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Error::Api(api) => Some(api.status),
            Error::TransferFailure { status, .. } => *status,
            _ => None,
        }
    }
}

impl From<bai_sign::SignError> for Error {
    fn from(e: bai_sign::SignError) -> Self {
        Error::Client(e.to_string())
    }
}

impl From<serde_json::Error> for Error {
    fn from(e: serde_json::Error) -> Self {
        Error::transport("malformed JSON response", e)
    }
}

/// A non-2xx response from the API.
#[derive(Debug, Clone)]
pub struct ApiError {
    pub status: u16,
    pub reason: String,
    /// Raw response body.
    pub body: String,
    /// Parsed problem-details body, when the server sent one.
    pub problem: Option<ProblemDetails>,
}

impl ApiError {
    pub fn new(status: u16, reason: impl Into<String>, body: impl Into<String>) -> Self {
        let body = body.into();
        let problem = ProblemDetails::parse(&body);
        Self { status, reason: reason.into(), body, problem }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "API error {} {}", self.status, self.reason)?;
        match &self.problem {
            Some(p) => match (&p.title, &p.detail) {
                (Some(title), Some(detail)) => write!(f, ": {title} ({detail})"),
                (Some(title), None) => write!(f, ": {title}"),
                (None, Some(detail)) => write!(f, ": {detail}"),
                (None, None) => Ok(()),
            },
            None if !self.body.is_empty() => write!(f, ": {}", self.body),
            None => Ok(()),
        }
    }
}

/// Structured error payload (RFC 7807 style).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ProblemDetails {
    #[serde(rename = "type", default)]
    pub kind: Option<String>,
    #[serde(default)]
    pub title: Option<String>,
    #[serde(default)]
    pub detail: Option<String>,
    #[serde(default)]
    pub status: Option<u16>,
    #[serde(default)]
    pub instance: Option<String>,
    #[serde(flatten)]
    pub extra: serde_json::Map<String, serde_json::Value>,
}

impl ProblemDetails {
    /// Parse a body as problem details; plain-text or non-object bodies yield `None`.
    pub fn parse(body: &str) -> Option<Self> {
        let value: serde_json::Value = serde_json::from_str(body).ok()?;
        if !value.is_object() {
            return None;
        }
        let problem: ProblemDetails = serde_json::from_value(value).ok()?;
        if problem.kind.is_none() && problem.title.is_none() && problem.detail.is_none() {
            return None;
        }
        Some(problem)
    }
}
