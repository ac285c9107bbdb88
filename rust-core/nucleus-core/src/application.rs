//! # Application
//!
//! The outermost shell: one root [`Router`] built from [`Settings`], the
//! shared settings and state handed to every request, and the final
//! handler that turns a leftover dispatch signal into a response.

use crate::context::{pathname, Context};
use crate::error::{Error, Result};
use crate::handler::{BoxFuture, ErrorMiddleware, Flow, Middleware, ParamHook};
use crate::method::Method;
use crate::request::Request;
use crate::response::{reason_phrase, Response};
use crate::route::Route;
use crate::router::{Router, RouterOptions};
use crate::server::{self, ServerConfig};
use crate::settings::Settings;
use crate::state::SharedState;
use hyper::body::Bytes;
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{error, warn};

/// Value of the `X-Powered-By` header
pub const POWERED_BY: &str = "Nucleus";

/// A routed HTTP application
pub struct Application {
    router: Router,
    settings: Arc<Settings>,
    state: SharedState,
}

impl Default for Application {
    fn default() -> Self {
        Self::new()
    }
}

impl Application {
    /// Create an application with default settings
    #[must_use]
    pub fn new() -> Self {
        Self::with_settings(Settings::default())
    }

    /// Create an application from explicit settings
    #[must_use]
    pub fn with_settings(settings: Settings) -> Self {
        Self {
            router: Router::with_options(RouterOptions::from_settings(&settings)),
            settings: Arc::new(settings),
            state: SharedState::new(),
        }
    }

    /// Application settings
    #[must_use]
    pub fn settings(&self) -> &Settings {
        &self.settings
    }

    /// Shared state visible to every request
    #[must_use]
    pub const fn state(&self) -> &SharedState {
        &self.state
    }

    /// The root router
    #[must_use]
    pub const fn router(&self) -> &Router {
        &self.router
    }

    /// The root router, mutably
    pub fn router_mut(&mut self) -> &mut Router {
        &mut self.router
    }

    /// See [`Router::use_handler`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_handler<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.use_handler(path, handler)?;
        Ok(self)
    }

    /// See [`Router::use_middleware`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_middleware<M: Middleware>(&mut self, path: &str, middleware: M) -> Result<&mut Self> {
        self.router.use_middleware(path, middleware)?;
        Ok(self)
    }

    /// See [`Router::use_error_handler`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_error_handler<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(Error, &'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.use_error_handler(path, handler)?;
        Ok(self)
    }

    /// See [`Router::use_error_middleware`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_error_middleware<M: ErrorMiddleware>(
        &mut self,
        path: &str,
        middleware: M,
    ) -> Result<&mut Self> {
        self.router.use_error_middleware(path, middleware)?;
        Ok(self)
    }

    /// See [`Router::mount`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn mount(&mut self, path: &str, router: Router) -> Result<&mut Self> {
        self.router.mount(path, router)?;
        Ok(self)
    }

    /// See [`Router::route`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn route(&mut self, path: &str) -> Result<&mut Route> {
        self.router.route(path)
    }

    /// See [`Router::get`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.get(path, handler)?;
        Ok(self)
    }

    /// See [`Router::post`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.post(path, handler)?;
        Ok(self)
    }

    /// See [`Router::put`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.put(path, handler)?;
        Ok(self)
    }

    /// See [`Router::delete`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.delete(path, handler)?;
        Ok(self)
    }

    /// See [`Router::patch`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn patch<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.patch(path, handler)?;
        Ok(self)
    }

    /// See [`Router::head`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn head<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.head(path, handler)?;
        Ok(self)
    }

    /// See [`Router::options`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn options<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.options(path, handler)?;
        Ok(self)
    }

    /// See [`Router::all`]
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn all<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.all(path, handler)?;
        Ok(self)
    }

    /// See [`Router::param`]
    pub fn param<F>(&mut self, name: &str, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context, String) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.router.param(name, hook);
        self
    }

    /// See [`Router::param_transformer`]
    pub fn param_transformer<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(&str, ParamHook) -> Option<ParamHook> + Send + Sync + 'static,
    {
        self.router.param_transformer(transform);
        self
    }

    /// Dispatch one request and produce its response
    pub async fn handle(&self, request: Request) -> Response {
        let mut ctx = Context::new(request, Arc::clone(&self.settings), self.state.clone());
        if self.settings.x_powered_by {
            ctx.response_mut().set_header("X-Powered-By", POWERED_BY);
        }

        let flow = self.router.handle(&mut ctx).await;
        self.finalize(&mut ctx, flow);
        ctx.into_response()
    }

    /// Turn whatever the root router left behind into a finished response
    fn finalize(&self, ctx: &mut Context, flow: Flow) {
        if ctx.response().is_sent() {
            if let Flow::Error(err) = flow {
                warn!(url = %ctx.original_url(), error = %err, "error after response was sent");
            }
            return;
        }

        let (status, body) = match flow {
            Flow::Done => {
                if let Err(err) = ctx.response_mut().end() {
                    warn!(error = %err, "final handler could not end response");
                }
                return;
            }
            Flow::Error(err) => {
                let status = err.status();
                error!(
                    method = %ctx.method(),
                    url = %ctx.original_url(),
                    status,
                    error = %err,
                    "Unhandled error"
                );
                let body = if self.settings.is_production() {
                    reason_phrase(status).to_string()
                } else {
                    err.to_string()
                };
                (status, body)
            }
            Flow::Continue | Flow::SkipRoute | Flow::StopRouter => {
                let resource =
                    pathname(ctx.original_url()).unwrap_or_else(|| ctx.original_url().to_string());
                (404, format!("Cannot {} {resource}", ctx.method()))
            }
        };

        let response = ctx.response_mut();
        response
            .status(status)
            .set_header("Content-Type", "text/plain; charset=utf-8")
            .set_header("X-Content-Type-Options", "nosniff");
        if let Err(err) = response.send(body) {
            warn!(error = %err, "final handler could not send response");
        }
    }

    /// Run a request through the application without the network stack
    pub async fn test_request(
        &self,
        method: Method,
        url: &str,
        headers: HashMap<String, String>,
        body: Option<Bytes>,
    ) -> Response {
        let mut request = Request::new(method, url, headers, body);
        if request.header(crate::middleware::CLIENT_IP_HEADER).is_none() {
            request.set_header(crate::middleware::CLIENT_IP_HEADER, "test");
        }
        self.handle(request).await
    }

    /// Serve the application over HTTP until Ctrl-C
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound, or
    /// `Error::Io` if accepting connections fails.
    pub async fn listen(self, config: ServerConfig) -> Result<()> {
        server::serve(Arc::new(self), config).await
    }
}

impl std::fmt::Debug for Application {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Application")
            .field("settings", &self.settings)
            .field("router", &self.router)
            .finish_non_exhaustive()
    }
}
