// SPDX-License-Identifier: MIT

//! Normalized integration errors
//!
//! Tools fail with arbitrary `Box<dyn Error>` values. Before the retry loop
//! looks at a failure it is converted into an [`IntegrationError`] carrying the
//! service/action, an optional HTTP status, an optional retry-after hint and a
//! retryable flag.

use chrono::{DateTime, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::error::Error;
use std::fmt;

/// Status codes retried by default
pub const DEFAULT_RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

static TRANSIENT_PATTERN: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)(econnreset|econnrefused|etimedout|enotfound|eai_again|connection reset|connection refused|connection closed|timed? ?out|dns|name resolution|socket hang ?up|broken pipe)",
    )
    .expect("transient pattern is valid")
});

/// Which stage of the reliability wrapper produced the error
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// Input failed the registered schema; the call was never attempted
    Validation,
    /// The call did not finish within the configured timeout
    Timeout,
    /// The underlying call raised
    Call,
}

/// Normalized failure of an external call
#[derive(Debug, thiserror::Error)]
#[error("{service}.{action} failed{}: {message}", status_suffix(.status_code))]
pub struct IntegrationError {
    pub service: String,
    pub action: String,
    pub status_code: Option<u16>,
    pub message: String,
    pub retryable: bool,
    pub retry_after_secs: Option<u64>,
    pub kind: FailureKind,
    #[source]
    pub cause: Option<Box<dyn Error + Send + Sync>>,
}

fn status_suffix(status: &Option<u16>) -> String {
    status.map(|s| format!(" ({})", s)).unwrap_or_default()
}

impl IntegrationError {
    /// Create an error for `action_key` of the form `service.method`
    pub fn new(action_key: &str, message: impl Into<String>, kind: FailureKind) -> Self {
        let (service, action) = split_action_key(action_key);
        Self {
            service,
            action,
            status_code: None,
            message: message.into(),
            retryable: false,
            retry_after_secs: None,
            kind,
            cause: None,
        }
    }

    /// Non-retryable validation error listing every violation
    pub fn validation(action_key: &str, violations: &[String]) -> Self {
        Self::new(
            action_key,
            format!("Input validation failed: {}", violations.join("; ")),
            FailureKind::Validation,
        )
    }

    /// Retryable timeout error
    pub fn timeout(action_key: &str, timeout_ms: u128) -> Self {
        let mut err = Self::new(
            action_key,
            format!("Timed out after {}ms", timeout_ms),
            FailureKind::Timeout,
        );
        err.retryable = true;
        err
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status_code = Some(status);
        self
    }

    pub fn with_retryable(mut self, retryable: bool) -> Self {
        self.retryable = retryable;
        self
    }

    pub fn with_retry_after(mut self, secs: u64) -> Self {
        self.retry_after_secs = Some(secs);
        self
    }

    /// Full action key (`service.action`)
    pub fn action_key(&self) -> String {
        if self.action.is_empty() {
            self.service.clone()
        } else {
            format!("{}.{}", self.service, self.action)
        }
    }
}

/// Split `service.method` into its parts; keys without a dot are all service
pub fn split_action_key(key: &str) -> (String, String) {
    match key.split_once('.') {
        Some((service, action)) => (service.to_string(), action.to_string()),
        None => (key.to_string(), String::new()),
    }
}

/// Structured failure a tool can raise to expose an HTTP-like response
#[derive(Debug, Clone)]
pub struct CallFailure {
    pub status: Option<u16>,
    /// Response headers, keys lowercased
    pub headers: HashMap<String, String>,
    pub message: String,
}

impl CallFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            status: None,
            headers: HashMap::new(),
            message: message.into(),
        }
    }

    pub fn with_status(mut self, status: u16) -> Self {
        self.status = Some(status);
        self
    }

    pub fn with_header(mut self, name: &str, value: impl Into<String>) -> Self {
        self.headers.insert(name.to_lowercase(), value.into());
        self
    }
}

impl fmt::Display for CallFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.status {
            Some(status) => write!(f, "HTTP {}: {}", status, self.message),
            None => write!(f, "{}", self.message),
        }
    }
}

impl Error for CallFailure {}

/// Shapes a raised error can take, tried in this order
enum ErrorShape<'a> {
    Failure(&'a CallFailure),
    Http(&'a reqwest::Error),
    Io(&'a std::io::Error),
    Opaque,
}

fn classify<'a>(err: &'a (dyn Error + Send + Sync + 'static)) -> ErrorShape<'a> {
    if let Some(failure) = err.downcast_ref::<CallFailure>() {
        ErrorShape::Failure(failure)
    } else if let Some(http) = err.downcast_ref::<reqwest::Error>() {
        ErrorShape::Http(http)
    } else if let Some(io) = err.downcast_ref::<std::io::Error>() {
        ErrorShape::Io(io)
    } else {
        ErrorShape::Opaque
    }
}

fn extract_status(shape: &ErrorShape<'_>) -> Option<u16> {
    match shape {
        ErrorShape::Failure(failure) => failure.status,
        ErrorShape::Http(http) => http.status().map(|s| s.as_u16()),
        ErrorShape::Io(_) | ErrorShape::Opaque => None,
    }
}

fn extract_retry_after(shape: &ErrorShape<'_>, now: DateTime<Utc>) -> Option<u64> {
    match shape {
        ErrorShape::Failure(failure) => failure
            .headers
            .get("retry-after")
            .and_then(|value| parse_retry_after(value, now)),
        _ => None,
    }
}

fn transport_retryable(shape: &ErrorShape<'_>) -> bool {
    match shape {
        ErrorShape::Http(http) => http.is_timeout() || http.is_connect(),
        ErrorShape::Io(io) => matches!(
            io.kind(),
            std::io::ErrorKind::ConnectionReset
                | std::io::ErrorKind::ConnectionRefused
                | std::io::ErrorKind::ConnectionAborted
                | std::io::ErrorKind::TimedOut
                | std::io::ErrorKind::BrokenPipe
        ),
        _ => false,
    }
}

/// Parse a `Retry-After` header: delta seconds or an HTTP date
pub fn parse_retry_after(value: &str, now: DateTime<Utc>) -> Option<u64> {
    let value = value.trim();
    if let Ok(secs) = value.parse::<u64>() {
        return Some(secs);
    }
    if let Ok(secs) = value.parse::<f64>() {
        return (secs >= 0.0).then(|| secs.ceil() as u64);
    }
    let date = DateTime::parse_from_rfc2822(value).ok()?;
    let remaining = date.with_timezone(&Utc) - now;
    let millis = remaining.num_milliseconds().max(0) as u64;
    Some(millis.div_ceil(1000))
}

/// Whether a message looks like a transient network failure
pub fn is_transient_message(message: &str) -> bool {
    TRANSIENT_PATTERN.is_match(message)
}

/// Convert any raised error into an [`IntegrationError`]
pub fn normalize(
    action_key: &str,
    err: Box<dyn Error + Send + Sync>,
    retryable_statuses: &HashSet<u16>,
) -> IntegrationError {
    let err = match err.downcast::<IntegrationError>() {
        Ok(normalized) => return *normalized,
        Err(other) => other,
    };

    let shape = classify(err.as_ref());
    let status = extract_status(&shape);
    let retry_after = extract_retry_after(&shape, Utc::now());
    let message = err.to_string();

    let retryable = match status {
        Some(code) => retryable_statuses.contains(&code),
        None => transport_retryable(&shape) || is_transient_message(&message),
    };

    let (service, action) = split_action_key(action_key);
    IntegrationError {
        service,
        action,
        status_code: status,
        message,
        retryable,
        retry_after_secs: retry_after,
        kind: FailureKind::Call,
        cause: Some(err),
    }
}
