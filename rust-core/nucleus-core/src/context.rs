//! # Dispatch Context
//!
//! Everything a handler can see or change while a request is routed.
//!
//! The router rewrites `url`, `base_url` and `params` as it descends into
//! mounted routers and restores them on the way out, so a handler always
//! sees values relative to its own mount point while `original_url` stays
//! untouched.

use crate::method::Method;
use crate::params::Params;
use crate::request::Request;
use crate::response::Response;
use crate::settings::Settings;
use crate::state::{Locals, SharedState};
use std::sync::Arc;

/// Per-request dispatch state
#[derive(Debug)]
pub struct Context {
    request: Request,
    response: Response,
    pub(crate) url: String,
    pub(crate) original_url: String,
    pub(crate) base_url: String,
    pub(crate) params: Params,
    pub(crate) route: Option<Arc<str>>,
    settings: Arc<Settings>,
    state: SharedState,
    locals: Locals,
}

impl Context {
    /// Create a context for a request
    #[must_use]
    pub fn new(request: Request, settings: Arc<Settings>, state: SharedState) -> Self {
        let url = request.target().to_string();
        Self {
            request,
            response: Response::new(),
            original_url: url.clone(),
            url,
            base_url: String::new(),
            params: Params::new(),
            route: None,
            settings,
            state,
            locals: Locals::new(),
        }
    }

    /// Create a context with default settings and empty state
    #[must_use]
    pub fn for_request(request: Request) -> Self {
        Self::new(request, Arc::new(Settings::default()), SharedState::new())
    }

    /// Request method
    #[must_use]
    pub const fn method(&self) -> Method {
        self.request.method()
    }

    /// Current url, relative to the router being dispatched
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Rewrite the current url
    ///
    /// Later layers in the same router match against the new value.
    pub fn set_url(&mut self, url: impl Into<String>) {
        self.url = url.into();
    }

    /// Url as first seen by the outermost router
    #[must_use]
    pub fn original_url(&self) -> &str {
        &self.original_url
    }

    /// Accumulated mount path of the enclosing routers
    #[must_use]
    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Pathname of the current url
    ///
    /// Returns `None` when the url cannot be parsed.
    #[must_use]
    pub fn path(&self) -> Option<String> {
        pathname(&self.url)
    }

    /// Parameters of the layer currently running
    #[must_use]
    pub const fn params(&self) -> &Params {
        &self.params
    }

    /// Single parameter by name
    #[must_use]
    pub fn param(&self, name: &str) -> Option<&str> {
        self.params.get(name)
    }

    /// Pattern of the route being dispatched, if any
    #[must_use]
    pub fn route_path(&self) -> Option<&str> {
        self.route.as_deref()
    }

    /// The request
    #[must_use]
    pub const fn request(&self) -> &Request {
        &self.request
    }

    /// The request, mutably
    pub fn request_mut(&mut self) -> &mut Request {
        &mut self.request
    }

    /// The response
    #[must_use]
    pub const fn response(&self) -> &Response {
        &self.response
    }

    /// The response, mutably
    pub fn response_mut(&mut self) -> &mut Response {
        &mut self.response
    }

    /// Application settings
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Application-wide state
    #[must_use]
    pub const fn state(&self) -> &SharedState {
        &self.state
    }

    /// Per-request values
    #[must_use]
    pub const fn locals(&self) -> &Locals {
        &self.locals
    }

    /// Per-request values, mutably
    pub fn locals_mut(&mut self) -> &mut Locals {
        &mut self.locals
    }

    /// Consume the context, keeping the response
    #[must_use]
    pub fn into_response(self) -> Response {
        self.response
    }
}

/// Extract the pathname of a request target
pub(crate) fn pathname(url: &str) -> Option<String> {
    url.parse::<hyper::Uri>().ok().map(|uri| {
        let path = uri.path();
        if path.is_empty() {
            "/".to_string()
        } else {
            path.to_string()
        }
    })
}
