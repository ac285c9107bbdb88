//! # Built-in Middleware
//!
//! Ready-made [`Middleware`] implementations for request ids, access
//! logging, CORS headers and rate limiting.
//!
//! ```ignore
//! app.use_middleware("/", RequestId::new())?
//!     .use_middleware("/", Logger::new())?
//!     .use_middleware("/api", Cors::new().allow_origin("https://example.com"))?;
//! ```

use crate::context::Context;
use crate::handler::{BoxFuture, Flow, Middleware};
use serde_json::json;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, PoisonError};
use std::time::{Instant, SystemTime, UNIX_EPOCH};
use tracing::{debug, info};

/// Header carrying the request id
pub const REQUEST_ID_HEADER: &str = "x-request-id";

/// Header the server fills with the peer address
pub const CLIENT_IP_HEADER: &str = "x-client-ip";

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}

/// Assigns `x-request-id` when the client did not send one and echoes it
/// on the response
#[derive(Debug, Default, Clone, Copy)]
pub struct RequestId;

impl RequestId {
    /// Create the middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for RequestId {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let id = match ctx.request().header(REQUEST_ID_HEADER) {
                Some(id) => id.to_string(),
                None => {
                    let id = generate_request_id();
                    ctx.request_mut().set_header(REQUEST_ID_HEADER, &id);
                    id
                }
            };
            ctx.response_mut().set_header(REQUEST_ID_HEADER, &id);
            Flow::Continue
        })
    }

    fn name(&self) -> &'static str {
        "RequestId"
    }
}

/// Logs each request passing through it
#[derive(Debug, Default, Clone)]
pub struct Logger {
    log_headers: bool,
}

impl Logger {
    /// Create a new logger
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Also log request headers at debug level
    #[must_use]
    pub const fn with_headers(mut self) -> Self {
        self.log_headers = true;
        self
    }
}

impl Middleware for Logger {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let request_id = ctx.request().header(REQUEST_ID_HEADER).unwrap_or("-");
            info!(
                method = %ctx.method(),
                url = %ctx.original_url(),
                request_id = %request_id,
                "Request received"
            );
            if self.log_headers {
                debug!(headers = ?ctx.request().headers_map(), "Request headers");
            }
            Flow::Continue
        })
    }

    fn name(&self) -> &'static str {
        "Logger"
    }
}

/// Adds Cross-Origin Resource Sharing headers
#[derive(Debug, Clone)]
pub struct Cors {
    allow_origin: String,
    allow_methods: String,
    allow_headers: String,
}

impl Default for Cors {
    fn default() -> Self {
        Self {
            allow_origin: "*".to_string(),
            allow_methods: "GET, POST, PUT, DELETE, PATCH, OPTIONS".to_string(),
            allow_headers: "Content-Type, Authorization".to_string(),
        }
    }
}

impl Cors {
    /// Create a CORS middleware allowing any origin
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Set allowed origin
    #[must_use]
    pub fn allow_origin(mut self, origin: impl Into<String>) -> Self {
        self.allow_origin = origin.into();
        self
    }

    /// Set allowed methods
    #[must_use]
    pub fn allow_methods(mut self, methods: impl Into<String>) -> Self {
        self.allow_methods = methods.into();
        self
    }

    /// Set allowed headers
    #[must_use]
    pub fn allow_headers(mut self, headers: impl Into<String>) -> Self {
        self.allow_headers = headers.into();
        self
    }

    /// The Access-Control-Allow-Origin value
    #[must_use]
    pub fn origin(&self) -> &str {
        &self.allow_origin
    }
}

impl Middleware for Cors {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            ctx.response_mut()
                .set_header("Access-Control-Allow-Origin", &self.allow_origin)
                .set_header("Access-Control-Allow-Methods", &self.allow_methods)
                .set_header("Access-Control-Allow-Headers", &self.allow_headers);
            Flow::Continue
        })
    }

    fn name(&self) -> &'static str {
        "Cors"
    }
}

/// Token bucket rate limiting keyed by `x-client-ip`
pub struct RateLimit {
    /// Maximum burst capacity
    capacity: u64,
    /// Tokens refilled per second
    refill_per_sec: u64,
    state: Mutex<HashMap<String, Bucket>>,
}

struct Bucket {
    tokens: u64,
    last_refill: Instant,
}

impl RateLimit {
    /// Create a rate limiter
    #[must_use]
    pub fn new(capacity: u64, refill_per_sec: u64) -> Self {
        Self {
            capacity,
            refill_per_sec,
            state: Mutex::new(HashMap::new()),
        }
    }

    fn allow(&self, key: &str) -> bool {
        let mut buckets = self.state.lock().unwrap_or_else(PoisonError::into_inner);
        let now = Instant::now();
        let bucket = buckets.entry(key.to_string()).or_insert(Bucket {
            tokens: self.capacity,
            last_refill: now,
        });

        let elapsed = now.duration_since(bucket.last_refill);
        #[allow(clippy::cast_possible_truncation, clippy::cast_sign_loss, clippy::cast_precision_loss)]
        let refill = (elapsed.as_secs_f64() * self.refill_per_sec as f64) as u64;
        if refill > 0 {
            bucket.tokens = (bucket.tokens + refill).min(self.capacity);
            bucket.last_refill = now;
        }

        if bucket.tokens == 0 {
            return false;
        }
        bucket.tokens -= 1;
        true
    }
}

impl Middleware for RateLimit {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(async move {
            let key = ctx
                .request()
                .header(CLIENT_IP_HEADER)
                .unwrap_or("unknown")
                .to_string();
            if self.allow(&key) {
                return Flow::Continue;
            }

            debug!(client = %key, "rate limit exceeded");
            let response = ctx.response_mut();
            response.status(429);
            response
                .send_json(&json!({ "error": "Rate limit exceeded" }))
                .into()
        })
    }

    fn name(&self) -> &'static str {
        "RateLimit"
    }
}

impl std::fmt::Debug for RateLimit {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RateLimit")
            .field("capacity", &self.capacity)
            .field("refill_per_sec", &self.refill_per_sec)
            .finish_non_exhaustive()
    }
}
