//! Blocking `ureq` client driven from async code via `spawn_blocking`.
//!
//! Every request is bounded by the agent timeout; there is no extra timeout
//! layer on top.

use std::io::Read;
use std::time::Duration;

use serde_json::Value;

use crate::error::{classify_status, PublishError};

const MAX_BODY_BYTES: u64 = 100 * 1024 * 1024;
const MAX_ERROR_CHARS: usize = 200;

pub(crate) enum Body {
    Empty,
    Json(Value),
    Bytes(Vec<u8>),
}

pub(crate) struct HttpRequest {
    pub operation: &'static str,
    pub target: String,
    pub method: &'static str,
    pub url: String,
    pub headers: Vec<(&'static str, String)>,
    pub body: Body,
    /// Response header to hand back in [`HttpReply::header`].
    pub capture_header: Option<&'static str>,
}

impl HttpRequest {
    pub fn new(
        operation: &'static str,
        target: impl Into<String>,
        method: &'static str,
        url: impl Into<String>,
    ) -> Self {
        Self {
            operation,
            target: target.into(),
            method,
            url: url.into(),
            headers: Vec::new(),
            body: Body::Empty,
            capture_header: None,
        }
    }

    pub fn header(mut self, name: &'static str, value: impl Into<String>) -> Self {
        self.headers.push((name, value.into()));
        self
    }

    pub fn json(mut self, body: Value) -> Self {
        self.body = Body::Json(body);
        self
    }

    pub fn bytes(mut self, body: Vec<u8>) -> Self {
        self.body = Body::Bytes(body);
        self
    }

    pub fn capture(mut self, header: &'static str) -> Self {
        self.capture_header = Some(header);
        self
    }
}

pub(crate) struct HttpReply {
    pub operation: &'static str,
    pub target: String,
    pub body: Vec<u8>,
    pub header: Option<String>,
}

impl HttpReply {
    /// Parse the body as JSON; an empty body is `null`.
    pub fn json(&self) -> Result<Value, PublishError> {
        if self.body.iter().all(u8::is_ascii_whitespace) {
            return Ok(Value::Null);
        }
        serde_json::from_slice(&self.body).map_err(|e| PublishError::Decode {
            operation: self.operation,
            target: self.target.clone(),
            reason: e.to_string(),
        })
    }

    pub fn decode_error(&self, reason: impl Into<String>) -> PublishError {
        PublishError::Decode {
            operation: self.operation,
            target: self.target.clone(),
            reason: reason.into(),
        }
    }
}

enum Failure {
    Status(u16, Vec<u8>),
    Transport(String),
    /// Body longer than the limit, in bytes.
    TooLarge(u64),
}

#[derive(Clone)]
pub(crate) struct HttpClient {
    agent: ureq::Agent,
    default_headers: Vec<(&'static str, String)>,
}

impl HttpClient {
    pub fn new(timeout: Duration, default_headers: Vec<(&'static str, String)>) -> Self {
        Self {
            agent: ureq::AgentBuilder::new().timeout(timeout).build(),
            default_headers,
        }
    }

    pub async fn send(&self, request: HttpRequest) -> Result<HttpReply, PublishError> {
        let operation = request.operation;
        let target = request.target.clone();
        let agent = self.agent.clone();
        let defaults = self.default_headers.clone();
        tracing::debug!("{} {} ({operation})", request.method, request.url);

        let outcome = tokio::task::spawn_blocking(move || execute(&agent, &defaults, request))
            .await
            .map_err(|e| PublishError::RemoteUnavailable {
                operation,
                target: target.clone(),
                reason: format!("request task aborted: {e}"),
            })?;

        match outcome {
            Ok((body, header)) => Ok(HttpReply {
                operation,
                target,
                body,
                header,
            }),
            Err(Failure::Status(status, body)) => Err(classify_status(
                operation,
                target,
                status,
                error_message(&body),
            )),
            Err(Failure::Transport(reason)) => Err(PublishError::RemoteUnavailable {
                operation,
                target,
                reason,
            }),
            Err(Failure::TooLarge(limit)) => Err(PublishError::Decode {
                operation,
                target,
                reason: format!("response body exceeds {} MiB", limit / (1024 * 1024)),
            }),
        }
    }
}

fn execute(
    agent: &ureq::Agent,
    defaults: &[(&'static str, String)],
    request: HttpRequest,
) -> Result<(Vec<u8>, Option<String>), Failure> {
    let mut req = agent.request(request.method, &request.url);
    for (name, value) in defaults.iter().chain(request.headers.iter()) {
        req = req.set(name, value);
    }
    let result = match request.body {
        Body::Empty => req.call(),
        Body::Json(value) => req.send_json(value),
        Body::Bytes(bytes) => req.send_bytes(&bytes),
    };
    match result {
        Ok(response) => {
            let header = request
                .capture_header
                .and_then(|name| response.header(name))
                .map(str::to_string);
            let body = read_limited(response.into_reader(), MAX_BODY_BYTES)?;
            Ok((body, header))
        }
        Err(ureq::Error::Status(status, response)) => Err(Failure::Status(
            status,
            read_limited(response.into_reader(), MAX_BODY_BYTES).unwrap_or_default(),
        )),
        Err(ureq::Error::Transport(transport)) => Err(Failure::Transport(transport.to_string())),
    }
}

/// Read at most `limit` bytes; a longer body is an error, never cut short.
fn read_limited(reader: impl Read, limit: u64) -> Result<Vec<u8>, Failure> {
    let mut buf = Vec::new();
    reader
        .take(limit.saturating_add(1))
        .read_to_end(&mut buf)
        .map_err(|e| Failure::Transport(format!("reading response body: {e}")))?;
    if buf.len() as u64 > limit {
        return Err(Failure::TooLarge(limit));
    }
    Ok(buf)
}

/// Human-readable reason from an error response body.
fn error_message(body: &[u8]) -> String {
    if let Ok(value) = serde_json::from_slice::<Value>(body) {
        if let Some(message) = value.get("message").and_then(Value::as_str) {
            return message.to_string();
        }
    }
    String::from_utf8_lossy(body)
        .trim()
        .chars()
        .take(MAX_ERROR_CHARS)
        .collect()
}

/// Percent-encode each `/`-separated segment of a repository path.
pub(crate) fn encode_path(path: &str) -> String {
    path.split('/')
        .map(|segment| urlencoding::encode(segment).into_owned())
        .collect::<Vec<_>>()
        .join("/")
}
