//! # Route
//!
//! A fixed path with per-method handler lists.
//!
//! A router stores each `Route` inside an exact-match layer. Once the path
//! has matched, the route picks handlers by HTTP method and runs them in
//! registration order.

use crate::context::Context;
use crate::handler::{BoxFuture, BoxedMiddleware, Flow, Middleware};
use crate::method::Method;
use std::sync::Arc;
use tracing::debug;

/// One handler bound to a method, or to every method when `None`
struct RouteLayer {
    method: Option<Method>,
    handler: BoxedMiddleware,
}

/// Per-method handlers for a single path
pub struct Route {
    path: Arc<str>,
    stack: Vec<RouteLayer>,
    /// Explicit methods in first-registration order
    methods: Vec<Method>,
    all: bool,
}

impl Route {
    /// Create an empty route for a path
    #[must_use]
    pub fn new(path: &str) -> Self {
        Self {
            path: Arc::from(path),
            stack: Vec::new(),
            methods: Vec::new(),
            all: false,
        }
    }

    /// Path pattern this route was declared with
    #[must_use]
    pub fn path(&self) -> &str {
        &self.path
    }

    pub(crate) fn shared_path(&self) -> Arc<str> {
        Arc::clone(&self.path)
    }

    /// Add a handler for one method
    pub fn on<M: Middleware>(&mut self, method: Method, handler: M) -> &mut Self {
        self.push(Some(method), Arc::new(handler))
    }

    /// Add a handler for every method
    pub fn any<M: Middleware>(&mut self, handler: M) -> &mut Self {
        self.push(None, Arc::new(handler))
    }

    /// Add a `GET` handler
    pub fn get<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Get), Arc::new(handler))
    }

    /// Add a `POST` handler
    pub fn post<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Post), Arc::new(handler))
    }

    /// Add a `PUT` handler
    pub fn put<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Put), Arc::new(handler))
    }

    /// Add a `DELETE` handler
    pub fn delete<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Delete), Arc::new(handler))
    }

    /// Add a `PATCH` handler
    pub fn patch<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Patch), Arc::new(handler))
    }

    /// Add a `HEAD` handler
    pub fn head<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Head), Arc::new(handler))
    }

    /// Add an `OPTIONS` handler
    pub fn options<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(Some(Method::Options), Arc::new(handler))
    }

    /// Add a handler for every method
    pub fn all<F>(&mut self, handler: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.push(None, Arc::new(handler))
    }

    fn push(&mut self, method: Option<Method>, handler: BoxedMiddleware) -> &mut Self {
        match method {
            Some(m) if !self.methods.contains(&m) => self.methods.push(m),
            Some(_) => {}
            None => self.all = true,
        }
        self.stack.push(RouteLayer { method, handler });
        self
    }

    /// Whether a request with this method would reach a handler.
    /// `HEAD` falls back to `GET`.
    #[must_use]
    pub fn handles_method(&self, method: Method) -> bool {
        self.all
            || self.methods.contains(&method)
            || (method == Method::Head && self.methods.contains(&Method::Get))
    }

    /// Explicitly registered methods, in registration order
    #[must_use]
    pub fn methods(&self) -> &[Method] {
        &self.methods
    }

    /// Run the handlers for the request method.
    ///
    /// Running out of handlers or `SkipRoute` yields `Continue` so the
    /// enclosing router keeps scanning. Other signals propagate.
    pub async fn dispatch(&self, ctx: &mut Context) -> Flow {
        let method = match ctx.method() {
            Method::Head if !self.methods.contains(&Method::Head) => Method::Get,
            m => m,
        };
        debug!(path = %self.path, method = %method, "route dispatch");

        for layer in &self.stack {
            if layer.method.is_some_and(|m| m != method) {
                continue;
            }
            match layer.handler.call(ctx).await {
                Flow::Continue => {}
                Flow::SkipRoute => return Flow::Continue,
                other => return other,
            }
        }
        Flow::Continue
    }
}

impl std::fmt::Debug for Route {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Route")
            .field("path", &self.path)
            .field("methods", &self.methods)
            .field("all", &self.all)
            .field("handlers", &self.stack.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::Error;
    use crate::request::Request;

    fn ctx(method: Method) -> Context {
        Context::for_request(Request::new(method, "/", Default::default(), None))
    }

    fn tag(ctx: &mut Context, value: &str) {
        let seen = ctx.response().header("x-seen").unwrap_or_default().to_string();
        ctx.response_mut().set_header("x-seen", &format!("{seen}{value}"));
    }

    #[tokio::test]
    async fn test_runs_matching_handlers_in_order() {
        let mut route = Route::new("/");
        route
            .get(|ctx| {
                Box::pin(async move {
                    tag(ctx, "a");
                    Flow::Continue
                })
            })
            .post(|ctx| {
                Box::pin(async move {
                    tag(ctx, "p");
                    Flow::Continue
                })
            })
            .all(|ctx| {
                Box::pin(async move {
                    tag(ctx, "b");
                    Flow::Done
                })
            });

        let mut c = ctx(Method::Get);
        assert!(matches!(route.dispatch(&mut c).await, Flow::Done));
        assert_eq!(c.response().header("x-seen"), Some("ab"));
    }

    #[tokio::test]
    async fn test_exhaustion_and_skip_continue_parent() {
        let mut route = Route::new("/");
        route.get(|_ctx| Box::pin(async { Flow::SkipRoute }));
        route.get(|ctx| {
            Box::pin(async move {
                tag(ctx, "never");
                Flow::Done
            })
        });

        let mut c = ctx(Method::Get);
        assert!(matches!(route.dispatch(&mut c).await, Flow::Continue));
        assert!(c.response().header("x-seen").is_none());

        let mut c = ctx(Method::Delete);
        assert!(matches!(route.dispatch(&mut c).await, Flow::Continue));
    }

    #[tokio::test]
    async fn test_errors_and_router_stop_propagate() {
        let mut route = Route::new("/");
        route.get(|_ctx| Box::pin(async { Flow::Error(Error::http(418, "teapot")) }));
        route.post(|_ctx| Box::pin(async { Flow::StopRouter }));

        let mut c = ctx(Method::Get);
        assert!(route.dispatch(&mut c).await.is_error());
        let mut c = ctx(Method::Post);
        assert!(matches!(route.dispatch(&mut c).await, Flow::StopRouter));
    }

    #[tokio::test]
    async fn test_head_falls_back_to_get() {
        let mut route = Route::new("/");
        route.get(|ctx| {
            Box::pin(async move {
                tag(ctx, "get");
                Flow::Done
            })
        });
        assert!(route.handles_method(Method::Head));

        let mut c = ctx(Method::Head);
        assert!(matches!(route.dispatch(&mut c).await, Flow::Done));
        assert_eq!(c.response().header("x-seen"), Some("get"));
    }

    #[tokio::test]
    async fn test_explicit_head_wins() {
        let mut route = Route::new("/");
        route.get(|ctx| {
            Box::pin(async move {
                tag(ctx, "get");
                Flow::Done
            })
        });
        route.head(|ctx| {
            Box::pin(async move {
                tag(ctx, "head");
                Flow::Done
            })
        });

        let mut c = ctx(Method::Head);
        route.dispatch(&mut c).await;
        assert_eq!(c.response().header("x-seen"), Some("head"));
    }

    #[test]
    fn test_methods_in_registration_order() {
        let mut route = Route::new("/items");
        route.post(|_ctx| Box::pin(async { Flow::Continue }));
        route.get(|_ctx| Box::pin(async { Flow::Continue }));
        route.post(|_ctx| Box::pin(async { Flow::Continue }));

        assert_eq!(route.methods(), &[Method::Post, Method::Get]);
        assert!(!route.handles_method(Method::Options));
        assert_eq!(route.path(), "/items");
    }

    #[test]
    fn test_all_handles_every_method() {
        let mut route = Route::new("/");
        route.all(|_ctx| Box::pin(async { Flow::Continue }));
        assert!(route.handles_method(Method::Options));
        assert!(route.methods().is_empty());
    }
}
