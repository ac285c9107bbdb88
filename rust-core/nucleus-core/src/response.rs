//! # HTTP Response
//!
//! The send capability handed to handlers through the dispatch context.
//! A response is built up in place and marked as sent exactly once.

use crate::error::{Error, Result};
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::StatusCode;
use std::collections::HashMap;

/// Outgoing HTTP response
#[derive(Debug, Clone)]
pub struct Response {
    status: u16,
    /// Header names are stored lowercased
    headers: HashMap<String, String>,
    body: Bytes,
    sent: bool,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            headers: HashMap::new(),
            body: Bytes::new(),
            sent: false,
        }
    }
}

impl Response {
    /// Create an empty, unsent `200 OK` response
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current status code
    #[must_use]
    pub const fn status_code(&self) -> u16 {
        self.status
    }

    /// Set status code
    pub fn status(&mut self, status: u16) -> &mut Self {
        self.status = status;
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) -> &mut Self {
        self.headers
            .insert(key.to_ascii_lowercase(), value.to_string());
        self
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        self.headers
            .get(&key.to_ascii_lowercase())
            .map(String::as_str)
    }

    /// All headers
    #[must_use]
    pub const fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Response body
    #[must_use]
    pub fn body(&self) -> &[u8] {
        &self.body
    }

    /// Response body as UTF-8 text
    #[must_use]
    pub fn body_str(&self) -> Option<&str> {
        std::str::from_utf8(&self.body).ok()
    }

    /// Whether the response has been finished
    #[must_use]
    pub const fn is_sent(&self) -> bool {
        self.sent
    }

    /// Finish with a body. Defaults the content type to plain text.
    ///
    /// # Errors
    ///
    /// Returns `Error::ResponseSent` if the response was already finished.
    pub fn send(&mut self, body: impl Into<Bytes>) -> Result<()> {
        if self.sent {
            return Err(Error::ResponseSent);
        }
        self.headers
            .entry("content-type".to_string())
            .or_insert_with(|| "text/plain; charset=utf-8".to_string());
        self.body = body.into();
        self.sent = true;
        Ok(())
    }

    /// Finish with a JSON body
    ///
    /// # Errors
    ///
    /// Returns `Error::ResponseSent` if already finished, or `Error::Json`
    /// if serialization fails.
    pub fn send_json<T: serde::Serialize>(&mut self, value: &T) -> Result<()> {
        let body = serde_json::to_vec(value)?;
        self.set_header("content-type", "application/json");
        self.send(body)
    }

    /// Finish without a body
    ///
    /// # Errors
    ///
    /// Returns `Error::ResponseSent` if the response was already finished.
    pub fn end(&mut self) -> Result<()> {
        if self.sent {
            return Err(Error::ResponseSent);
        }
        self.sent = true;
        Ok(())
    }

    /// Convert to hyper Response
    pub(crate) fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder().status(status);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder.body(Full::new(self.body)).unwrap_or_else(|_| {
            let mut fallback = hyper::Response::new(Full::new(Bytes::from("Internal Server Error")));
            *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
            fallback
        })
    }
}

/// Canonical reason phrase for a status code
#[must_use]
pub fn reason_phrase(status: u16) -> &'static str {
    StatusCode::from_u16(status)
        .ok()
        .and_then(|s| s.canonical_reason())
        .unwrap_or("Unknown")
}
