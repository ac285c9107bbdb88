//! # Router
//!
//! An ordered stack of [`Layer`]s walked for every request.
//!
//! ## Dispatch
//!
//! Each step scans forward from the current position for the first layer
//! that matches the current path and is eligible in the current state:
//!
//! - route layers only while no error is pending, and only when the route
//!   handles the request method
//! - request middleware only while no error is pending
//! - error middleware only while an error is pending
//!
//! Middleware sees the url with its mount path stripped and `base_url`
//! extended; both are put back before the next layer is tried and when
//! the router returns, whatever the outcome.
//!
//! The loop is iterative. It yields to the scheduler every
//! [`YIELD_EVERY`] steps and once more before reporting exhaustion, so
//! long chains of middleware never grow the stack.

use crate::context::Context;
use crate::error::{Error, Result};
use crate::handler::{
    BoxFuture, BoxedMiddleware, ErrorMiddleware, Flow, Middleware, ParamHook, ParamTransformer,
};
use crate::layer::{Layer, LayerKind};
use crate::method::Method;
use crate::params::Params;
use crate::path::MatchOptions;
use crate::route::Route;
use crate::settings::Settings;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Dispatch steps between cooperative yields
pub const YIELD_EVERY: usize = 100;

/// Per-router matching options
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RouterOptions {
    /// Match literal path segments case-sensitively
    pub case_sensitive: bool,
    /// Treat a trailing slash on routes as significant
    pub strict: bool,
    /// Inherit path parameters from the parent router
    pub merge_params: bool,
}

impl RouterOptions {
    /// Options for an application's root router
    #[must_use]
    pub const fn from_settings(settings: &Settings) -> Self {
        Self {
            case_sensitive: settings.case_sensitive_routing,
            strict: settings.strict_routing,
            merge_params: false,
        }
    }
}

/// Ordered middleware and route stack
#[derive(Default)]
pub struct Router {
    stack: Vec<Layer>,
    options: RouterOptions,
    params: HashMap<String, Vec<ParamHook>>,
    transformers: Vec<ParamTransformer>,
}

impl Router {
    /// Create a router with default options
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a router with explicit options
    #[must_use]
    pub fn with_options(options: RouterOptions) -> Self {
        Self {
            options,
            ..Self::default()
        }
    }

    /// Options this router was built with
    #[must_use]
    pub const fn router_options(&self) -> RouterOptions {
        self.options
    }

    /// Layers in dispatch order
    #[must_use]
    pub fn layers(&self) -> &[Layer] {
        &self.stack
    }

    /// Number of layers
    #[must_use]
    pub fn len(&self) -> usize {
        self.stack.len()
    }

    /// Check if the stack is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    fn push_layer(&mut self, path: &str, options: MatchOptions, kind: LayerKind) -> Result<()> {
        let layer = Layer::new(path, options, kind)?;
        debug!(path = %path, name = layer.name(), "layer added");
        self.stack.push(layer);
        Ok(())
    }

    /// Mount request middleware under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_handler<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.use_boxed(path, Arc::new(handler))
    }

    /// Mount a [`Middleware`] value under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_middleware<M: Middleware>(&mut self, path: &str, middleware: M) -> Result<&mut Self> {
        self.use_boxed(path, Arc::new(middleware))
    }

    /// Mount already shared middleware under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_boxed(&mut self, path: &str, middleware: BoxedMiddleware) -> Result<&mut Self> {
        let options = MatchOptions::prefix(self.options.case_sensitive);
        self.push_layer(path, options, LayerKind::Middleware(middleware))?;
        Ok(self)
    }

    /// Mount error middleware under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_error_handler<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(Error, &'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.use_error_middleware(path, handler)
    }

    /// Mount an [`ErrorMiddleware`] value under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn use_error_middleware<M: ErrorMiddleware>(
        &mut self,
        path: &str,
        middleware: M,
    ) -> Result<&mut Self> {
        let options = MatchOptions::prefix(self.options.case_sensitive);
        self.push_layer(path, options, LayerKind::ErrorHandler(Arc::new(middleware)))?;
        Ok(self)
    }

    /// Mount a nested router under a path prefix
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn mount(&mut self, path: &str, router: Self) -> Result<&mut Self> {
        self.use_middleware(path, router)
    }

    /// Append a route for `path` and return it for handler registration
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn route(&mut self, path: &str) -> Result<&mut Route> {
        let options = MatchOptions::exact(self.options.case_sensitive, self.options.strict);
        self.push_layer(path, options, LayerKind::Route(Route::new(path)))?;
        self.stack
            .last_mut()
            .and_then(Layer::route_mut)
            .ok_or_else(|| Error::InvalidRoutePattern {
                pattern: path.to_string(),
                reason: "route layer was not registered".to_string(),
            })
    }

    /// Add a `GET` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn get<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.get(handler);
        Ok(self)
    }

    /// Add a `POST` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn post<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.post(handler);
        Ok(self)
    }

    /// Add a `PUT` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn put<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.put(handler);
        Ok(self)
    }

    /// Add a `DELETE` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn delete<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.delete(handler);
        Ok(self)
    }

    /// Add a `PATCH` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn patch<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.patch(handler);
        Ok(self)
    }

    /// Add a `HEAD` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn head<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.head(handler);
        Ok(self)
    }

    /// Add an `OPTIONS` route
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn options<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.options(handler);
        Ok(self)
    }

    /// Add a route answering every method
    ///
    /// # Errors
    ///
    /// Returns `Error::InvalidRoutePattern` if `path` does not compile.
    pub fn all<F>(&mut self, path: &str, handler: F) -> Result<&mut Self>
    where
        F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.route(path)?.all(handler);
        Ok(self)
    }

    /// Register a hook that runs the first time `name` appears in a match.
    ///
    /// Hooks for one name run in registration order before the matched
    /// layer, at most once per request. A leading `:` is stripped.
    pub fn param<F>(&mut self, name: &str, hook: F) -> &mut Self
    where
        F: for<'a> Fn(&'a mut Context, String) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
    {
        self.param_boxed(name, Arc::new(hook))
    }

    /// Register an already shared parameter hook
    pub fn param_boxed(&mut self, name: &str, hook: ParamHook) -> &mut Self {
        let name = match name.strip_prefix(':') {
            Some(stripped) => {
                warn!(
                    param = %name,
                    "router.param(\"{name}\"): use router.param(\"{stripped}\") instead"
                );
                stripped
            }
            None => name,
        };

        let mut hook = hook;
        for transform in &self.transformers {
            if let Some(wrapped) = transform(name, Arc::clone(&hook)) {
                hook = wrapped;
            }
        }

        self.params.entry(name.to_string()).or_default().push(hook);
        self
    }

    /// Register a function that may wrap or replace every hook added later
    pub fn param_transformer<F>(&mut self, transform: F) -> &mut Self
    where
        F: Fn(&str, ParamHook) -> Option<ParamHook> + Send + Sync + 'static,
    {
        self.transformers.push(Arc::new(transform));
        self
    }

    /// Dispatch a request through this router.
    ///
    /// `url`, `base_url` and `params` on the context are restored before
    /// returning. `Continue` means nothing handled the request; `Error`
    /// means an error was left unhandled.
    pub async fn handle(&self, ctx: &mut Context) -> Flow {
        debug!(method = %ctx.method(), url = %ctx.url, "dispatching");

        if ctx.original_url.is_empty() {
            ctx.original_url.clone_from(&ctx.url);
        }
        let url = ctx.url.clone();
        let base_url = ctx.base_url.clone();
        let params = ctx.params.clone();

        let flow = self.dispatch(ctx).await;

        ctx.url = url;
        ctx.base_url = base_url;
        ctx.params = params;
        flow
    }

    async fn dispatch(&self, ctx: &mut Context) -> Flow {
        let mut rewrite = UrlRewrite::new(&ctx.url, &ctx.base_url);
        let parent_params = ctx.params.clone();
        let mut idx = 0;
        let mut steps = 0usize;
        let mut param_called = HashSet::new();
        let mut allow: Vec<Method> = Vec::new();
        let mut signal = Flow::Continue;

        loop {
            rewrite.undo(ctx);

            let mut layer_error = match signal {
                Flow::Continue | Flow::SkipRoute => None,
                Flow::Error(err) => Some(err),
                Flow::StopRouter => {
                    tokio::task::yield_now().await;
                    return finish(ctx, None, &allow);
                }
                Flow::Done => return Flow::Done,
            };

            if idx >= self.stack.len() {
                tokio::task::yield_now().await;
                return finish(ctx, layer_error, &allow);
            }

            steps += 1;
            if steps >= YIELD_EVERY {
                steps = 0;
                tokio::task::yield_now().await;
            }

            let Some(path) = ctx.path() else {
                return finish(ctx, layer_error, &allow);
            };

            let mut decode_error = None;
            let mut found = None;
            while idx < self.stack.len() {
                let layer = &self.stack[idx];
                idx += 1;

                let matched = match layer.matches(&path) {
                    Ok(Some(matched)) => matched,
                    Ok(None) => continue,
                    Err(err) => {
                        debug!(pattern = layer.pattern(), error = %err, "layer match failed");
                        if decode_error.is_none() {
                            decode_error = Some(err);
                        }
                        continue;
                    }
                };

                let eligible = match layer.kind() {
                    LayerKind::Route(route) => {
                        let method = ctx.method();
                        if layer_error.is_some() {
                            false
                        } else if route.handles_method(method) || method == Method::Head {
                            true
                        } else {
                            debug!(path = route.path(), method = %method, "route declined method");
                            if method == Method::Options {
                                append_methods(&mut allow, route.methods());
                            }
                            false
                        }
                    }
                    LayerKind::Middleware(_) => {
                        layer_error.is_none() && at_boundary(&path, &matched.path)
                    }
                    LayerKind::ErrorHandler(_) => {
                        (layer_error.is_some() || decode_error.is_some())
                            && at_boundary(&path, &matched.path)
                    }
                };

                if eligible {
                    found = Some((layer, matched));
                    break;
                }
            }

            let Some((layer, matched)) = found else {
                return finish(ctx, layer_error.or(decode_error), &allow);
            };

            // A decode error reaching an error handler becomes the pending error;
            // any other dispatch discards it.
            if layer.is_error_handler() && layer_error.is_none() {
                layer_error = decode_error.take();
            }

            ctx.params = if self.options.merge_params {
                Params::merge(matched.params.clone(), &parent_params)
            } else {
                matched.params.clone()
            };
            if let LayerKind::Route(route) = layer.kind() {
                ctx.route = Some(route.shared_path());
            }

            match self.process_params(ctx, &matched.params, &mut param_called).await {
                Flow::Continue => {}
                Flow::Done => return Flow::Done,
                hook_flow => {
                    signal = match layer_error {
                        Some(err) => Flow::Error(err),
                        None => hook_flow,
                    };
                    continue;
                }
            }

            debug!(
                layer = layer.name(),
                pattern = layer.pattern(),
                prefix = %matched.path,
                url = %ctx.original_url,
                "invoking layer"
            );

            signal = match layer.kind() {
                LayerKind::Route(route) => route.dispatch(ctx).await,
                LayerKind::Middleware(handler) => {
                    rewrite.trim(ctx, &matched.path);
                    handler.call(ctx).await
                }
                LayerKind::ErrorHandler(handler) => {
                    rewrite.trim(ctx, &matched.path);
                    match layer_error.take() {
                        Some(err) => handler.call(err, ctx).await,
                        None => Flow::Continue,
                    }
                }
            };
        }
    }

    async fn process_params(
        &self,
        ctx: &mut Context,
        matched: &Params,
        called: &mut HashSet<String>,
    ) -> Flow {
        if self.params.is_empty() {
            return Flow::Continue;
        }

        for (name, value) in matched.iter() {
            let Some(hooks) = self.params.get(name) else {
                continue;
            };
            if !called.insert(name.to_string()) {
                continue;
            }
            for hook in hooks {
                match hook(ctx, value.to_string()).await {
                    Flow::Continue => {}
                    other => return other,
                }
            }
        }
        Flow::Continue
    }
}

impl Middleware for Router {
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        Box::pin(self.handle(ctx))
    }

    fn name(&self) -> &'static str {
        "router"
    }
}

impl std::fmt::Debug for Router {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Router")
            .field("stack", &self.stack)
            .field("options", &self.options)
            .field("params", &self.params.keys().collect::<Vec<_>>())
            .finish()
    }
}

/// Url bookkeeping for one router invocation
struct UrlRewrite {
    /// Scheme and host of an absolute-form url, kept in front of the path
    protohost: String,
    parent_url: String,
    removed: String,
    slash_added: bool,
}

impl UrlRewrite {
    fn new(url: &str, parent_url: &str) -> Self {
        Self {
            protohost: protohost(url).to_string(),
            parent_url: parent_url.to_string(),
            removed: String::new(),
            slash_added: false,
        }
    }

    /// Strip a matched mount path from the url and extend `base_url`
    fn trim(&mut self, ctx: &mut Context, layer_path: &str) {
        if layer_path.is_empty() {
            return;
        }

        self.removed = layer_path.to_string();
        let rest = ctx
            .url
            .get(self.protohost.len() + layer_path.len()..)
            .unwrap_or_default();
        ctx.url = format!("{}{rest}", self.protohost);

        if self.protohost.is_empty() && !ctx.url.starts_with('/') {
            ctx.url.insert(0, '/');
            self.slash_added = true;
        }

        let mount = layer_path.strip_suffix('/').unwrap_or(layer_path);
        ctx.base_url = format!("{}{mount}", self.parent_url);
    }

    /// Put back whatever the last `trim` changed
    fn undo(&mut self, ctx: &mut Context) {
        if self.slash_added {
            ctx.url = ctx.url.get(1..).unwrap_or_default().to_string();
            self.slash_added = false;
        }

        if !self.removed.is_empty() {
            ctx.base_url.clone_from(&self.parent_url);
            let rest = ctx.url.get(self.protohost.len()..).unwrap_or_default();
            ctx.url = format!("{}{}{rest}", self.protohost, self.removed);
            self.removed.clear();
        }
    }
}

/// End of this router's dispatch.
///
/// An `OPTIONS` request that reached no handler but matched routes
/// answers with the collected `Allow` list.
fn finish(ctx: &mut Context, err: Option<Error>, allow: &[Method]) -> Flow {
    match err {
        Some(err) => Flow::Error(err),
        None if ctx.method() == Method::Options && !allow.is_empty() => {
            send_options_response(ctx, allow)
        }
        None => Flow::Continue,
    }
}

fn send_options_response(ctx: &mut Context, allow: &[Method]) -> Flow {
    let body = allow
        .iter()
        .map(|m| m.as_str())
        .collect::<Vec<_>>()
        .join(", ");
    let response = ctx.response_mut();
    response.status(200).set_header("Allow", &body);
    match response.send(body) {
        Ok(()) => Flow::Done,
        Err(err) => Flow::Error(err),
    }
}

fn append_methods(list: &mut Vec<Method>, methods: &[Method]) {
    for method in methods {
        if !list.contains(method) {
            list.push(*method);
        }
    }
}

/// A mount path must end at a segment or extension boundary
fn at_boundary(path: &str, prefix: &str) -> bool {
    matches!(
        path.get(prefix.len()..).and_then(|rest| rest.chars().next()),
        None | Some('/' | '.')
    )
}

/// `scheme://host` of an absolute-form url, or `""`
fn protohost(url: &str) -> &str {
    if url.is_empty() || url.starts_with('/') {
        return "";
    }

    let path_len = url.find('?').unwrap_or(url.len());
    let Some(fqdn) = url[..path_len].find("://") else {
        return "";
    };
    url[fqdn + 3..]
        .find('/')
        .map_or("", |slash| &url[..fqdn + 3 + slash])
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::param_hook;
    use crate::request::Request;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[derive(Default)]
    struct Trail(Vec<String>);

    fn mark(ctx: &mut Context, label: impl Into<String>) {
        if ctx.locals().get::<Trail>().is_none() {
            ctx.locals_mut().insert(Trail::default());
        }
        if let Some(trail) = ctx.locals_mut().get_mut::<Trail>() {
            trail.0.push(label.into());
        }
    }

    fn trail(ctx: &Context) -> Vec<String> {
        ctx.locals()
            .get::<Trail>()
            .map(|t| t.0.clone())
            .unwrap_or_default()
    }

    #[derive(Debug, Clone, PartialEq)]
    struct Seen {
        url: String,
        base_url: String,
        original_url: String,
        params: Vec<(String, String)>,
    }

    fn snapshot(ctx: &Context) -> Seen {
        Seen {
            url: ctx.url().to_string(),
            base_url: ctx.base_url().to_string(),
            original_url: ctx.original_url().to_string(),
            params: ctx
                .params()
                .iter()
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .collect(),
        }
    }

    fn step(router: &mut Router, path: &str, label: &'static str, flow: fn() -> Flow) {
        router
            .use_handler(path, move |ctx| {
                Box::pin(async move {
                    mark(ctx, label);
                    flow()
                })
            })
            .unwrap();
    }

    async fn run(router: &Router, method: Method, url: &str) -> (Flow, Context) {
        let mut ctx = Context::for_request(Request::new(method, url, Default::default(), None));
        let flow = router.handle(&mut ctx).await;
        (flow, ctx)
    }

    #[tokio::test]
    async fn test_layers_run_in_registration_order() {
        let mut router = Router::new();
        step(&mut router, "/", "root", || Flow::Continue);
        step(&mut router, "/other", "other", || Flow::Continue);
        step(&mut router, "/users", "users", || Flow::Continue);
        router
            .get("/users", |ctx| {
                Box::pin(async move {
                    mark(ctx, "route");
                    Flow::from(ctx.response_mut().send("list"))
                })
            })
            .unwrap();
        step(&mut router, "/", "after", || Flow::Continue);

        let (flow, ctx) = run(&router, Method::Get, "/users").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["root", "users", "route"]);
        assert_eq!(ctx.response().body_str(), Some("list"));
    }

    #[tokio::test]
    async fn test_unmatched_request_continues() {
        let mut router = Router::new();
        step(&mut router, "/api", "api", || Flow::Continue);

        let (flow, ctx) = run(&router, Method::Get, "/web").await;
        assert!(matches!(flow, Flow::Continue));
        assert!(trail(&ctx).is_empty());
        assert!(!ctx.response().is_sent());
    }

    #[tokio::test]
    async fn test_route_params_are_decoded() {
        let mut router = Router::new();
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    mark(ctx, id);
                    Flow::Done
                })
            })
            .unwrap();

        let (_, ctx) = run(&router, Method::Get, "/users/42").await;
        assert_eq!(trail(&ctx), vec!["42"]);
        let (_, ctx) = run(&router, Method::Get, "/users/4%32").await;
        assert_eq!(trail(&ctx), vec!["42"]);
    }

    #[tokio::test]
    async fn test_route_path_is_recorded() {
        let mut router = Router::new();
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    let route = ctx.route_path().unwrap_or_default().to_string();
                    mark(ctx, route);
                    Flow::Done
                })
            })
            .unwrap();

        let (_, ctx) = run(&router, Method::Get, "/users/1").await;
        assert_eq!(trail(&ctx), vec!["/users/:id"]);
    }

    #[tokio::test]
    async fn test_mount_strips_prefix_and_restores() {
        let mut inner = Router::new();
        inner
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    let seen = snapshot(ctx);
                    ctx.locals_mut().insert(seen);
                    Flow::Continue
                })
            })
            .unwrap();

        let mut outer = Router::new();
        outer.mount("/api", inner).unwrap();

        let (flow, ctx) = run(&outer, Method::Get, "/api/users/7?full=1").await;
        assert!(matches!(flow, Flow::Continue));

        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(seen.url, "/users/7?full=1");
        assert_eq!(seen.base_url, "/api");
        assert_eq!(seen.original_url, "/api/users/7?full=1");
        assert_eq!(seen.params, vec![("id".to_string(), "7".to_string())]);

        assert_eq!(ctx.url(), "/api/users/7?full=1");
        assert_eq!(ctx.base_url(), "");
        assert!(ctx.params().is_empty());
    }

    #[tokio::test]
    async fn test_nested_mounts_accumulate_base_url() {
        let mut leaf = Router::new();
        leaf.use_handler("/", |ctx| {
            Box::pin(async move {
                let seen = snapshot(ctx);
                ctx.locals_mut().insert(seen);
                Flow::Done
            })
        })
        .unwrap();

        let mut middle = Router::new();
        middle.mount("/v1/", leaf).unwrap();
        let mut root = Router::new();
        root.mount("/api", middle).unwrap();

        let (flow, ctx) = run(&root, Method::Get, "/api/v1/items").await;
        assert!(matches!(flow, Flow::Done));
        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(seen.base_url, "/api/v1");
        assert_eq!(seen.url, "/items");
        assert_eq!(ctx.url(), "/api/v1/items");
        assert_eq!(ctx.base_url(), "");
    }

    #[tokio::test]
    async fn test_mount_point_exact_path_gets_slash() {
        let mut inner = Router::new();
        inner
            .use_handler("/", |ctx| {
                Box::pin(async move {
                    let seen = snapshot(ctx);
                    ctx.locals_mut().insert(seen);
                    Flow::Done
                })
            })
            .unwrap();
        let mut outer = Router::new();
        outer.mount("/admin", inner).unwrap();

        let (_, ctx) = run(&outer, Method::Get, "/admin?tab=1").await;
        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(seen.url, "/?tab=1");
        assert_eq!(seen.base_url, "/admin");
    }

    #[tokio::test]
    async fn test_parent_sees_restored_context_after_child_error() {
        let mut inner = Router::new();
        inner
            .use_handler("/:section", |_ctx| {
                Box::pin(async { Flow::Error(Error::http(409, "conflict")) })
            })
            .unwrap();

        let mut outer = Router::new();
        outer.mount("/api", inner).unwrap();
        outer
            .use_error_handler("/", |err, ctx| {
                Box::pin(async move {
                    let seen = snapshot(ctx);
                    ctx.locals_mut().insert(seen);
                    ctx.response_mut().status(err.status());
                    Flow::from(ctx.response_mut().end())
                })
            })
            .unwrap();

        let (flow, ctx) = run(&outer, Method::Get, "/api/users").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(ctx.response().status_code(), 409);
        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(seen.url, "/api/users");
        assert_eq!(seen.base_url, "");
        assert!(seen.params.is_empty());
    }

    #[tokio::test]
    async fn test_absolute_form_url_keeps_host() {
        let mut inner = Router::new();
        inner
            .get("/users", |ctx| {
                Box::pin(async move {
                    let url = ctx.url().to_string();
                    mark(ctx, url);
                    Flow::Done
                })
            })
            .unwrap();
        let mut outer = Router::new();
        outer.mount("/api", inner).unwrap();

        let (flow, ctx) = run(&outer, Method::Get, "http://example.com/api/users").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["http://example.com/users"]);
        assert_eq!(ctx.url(), "http://example.com/api/users");
    }

    #[tokio::test]
    async fn test_options_collects_allow_header() {
        let mut router = Router::new();
        router
            .get("/items", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        router
            .post("/items", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        router
            .get("/items", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        router
            .put("/other", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();

        let (flow, ctx) = run(&router, Method::Options, "/items").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(ctx.response().status_code(), 200);
        assert_eq!(ctx.response().header("allow"), Some("GET, POST"));
        assert_eq!(ctx.response().body_str(), Some("GET, POST"));
    }

    #[tokio::test]
    async fn test_explicit_options_handler_wins() {
        let mut router = Router::new();
        router
            .get("/items", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        router
            .options("/items", |ctx| {
                Box::pin(async move {
                    ctx.response_mut().status(204);
                    Flow::from(ctx.response_mut().end())
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Options, "/items").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(ctx.response().status_code(), 204);
        assert!(ctx.response().header("allow").is_none());
    }

    #[tokio::test]
    async fn test_options_without_routes_continues() {
        let router = Router::new();
        let (flow, _) = run(&router, Method::Options, "/items").await;
        assert!(matches!(flow, Flow::Continue));
    }

    #[tokio::test]
    async fn test_head_dispatches_to_get() {
        let mut router = Router::new();
        router
            .get("/health", |ctx| {
                Box::pin(async move {
                    mark(ctx, "get");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Head, "/health").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["get"]);
    }

    #[tokio::test]
    async fn test_head_matches_route_without_get() {
        let mut router = Router::new();
        router.param("id", |ctx, value| {
            Box::pin(async move {
                mark(ctx, format!("hook {value}"));
                Flow::Continue
            })
        });
        router
            .post("/items/:id", |ctx| {
                Box::pin(async move {
                    mark(ctx, "post");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Head, "/items/7").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(trail(&ctx), vec!["hook 7"]);
        assert_eq!(ctx.route_path(), Some("/items/:id"));
    }

    #[tokio::test]
    async fn test_method_mismatch_skips_route() {
        let mut router = Router::new();
        router
            .post("/items", |ctx| {
                Box::pin(async move {
                    mark(ctx, "post");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/items").await;
        assert!(matches!(flow, Flow::Continue));
        assert!(trail(&ctx).is_empty());
    }

    #[tokio::test]
    async fn test_long_synchronous_chain() {
        static CALLS: AtomicUsize = AtomicUsize::new(0);

        let mut router = Router::new();
        for _ in 0..1_000 {
            router
                .use_handler("/", |_ctx| {
                    Box::pin(async {
                        CALLS.fetch_add(1, Ordering::Relaxed);
                        Flow::Continue
                    })
                })
                .unwrap();
        }
        for _ in 0..1_000 {
            step(&mut router, "/never", "never", || Flow::Continue);
        }

        let (flow, ctx) = run(&router, Method::Get, "/").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(CALLS.load(Ordering::Relaxed), 1_000);
        assert!(trail(&ctx).is_empty());
    }

    #[tokio::test]
    async fn test_long_chain_keeps_error() {
        let mut router = Router::new();
        step(&mut router, "/", "fail", || Flow::Error(Error::http(503, "down")));
        for _ in 0..500 {
            step(&mut router, "/", "skipped", || Flow::Continue);
        }

        let (flow, ctx) = run(&router, Method::Get, "/").await;
        assert!(matches!(flow, Flow::Error(ref e) if e.status() == 503));
        assert_eq!(trail(&ctx), vec!["fail"]);
    }

    #[tokio::test]
    async fn test_decode_error_discarded_when_later_layer_matches() {
        let mut router = Router::new();
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    mark(ctx, "by-id");
                    Flow::Done
                })
            })
            .unwrap();
        step(&mut router, "/users", "fallback", || Flow::Done);

        let (flow, ctx) = run(&router, Method::Get, "/users/%E0%A4%A").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["fallback"]);
    }

    #[tokio::test]
    async fn test_decode_error_surfaces_when_nothing_matches() {
        let mut router = Router::new();
        router
            .get("/users/:id", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();

        let (flow, _) = run(&router, Method::Get, "/users/%FF").await;
        match flow {
            Flow::Error(err) => {
                assert!(matches!(err, Error::ParamDecode { .. }));
                assert_eq!(err.status(), 400);
            }
            other => panic!("expected decode error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_decode_error_reaches_error_handler() {
        let mut router = Router::new();
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    mark(ctx, "route");
                    Flow::Done
                })
            })
            .unwrap();
        router
            .use_error_handler("/", |err, ctx| {
                Box::pin(async move {
                    let label = match err {
                        Error::ParamDecode { ref name, .. } => format!("decode {name}"),
                        ref other => format!("other {}", other.status()),
                    };
                    mark(ctx, label);
                    ctx.response_mut().status(err.status());
                    Flow::from(ctx.response_mut().end())
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/users/%FF").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["decode id"]);
        assert_eq!(ctx.response().status_code(), 400);
    }

    #[tokio::test]
    async fn test_error_handler_with_undecodable_prefix_is_skipped() {
        let mut router = Router::new();
        router
            .use_error_handler("/users/:id", |_err, ctx| {
                Box::pin(async move {
                    mark(ctx, "never");
                    Flow::Done
                })
            })
            .unwrap();
        step(&mut router, "/", "normal", || Flow::Continue);

        let (flow, ctx) = run(&router, Method::Get, "/users/%FF").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(trail(&ctx), vec!["normal"]);
    }

    #[tokio::test]
    async fn test_error_skips_to_error_handler() {
        let mut router = Router::new();
        step(&mut router, "/", "fail", || Flow::Error(Error::http(422, "bad")));
        router
            .get("/", |ctx| {
                Box::pin(async move {
                    mark(ctx, "route");
                    Flow::Done
                })
            })
            .unwrap();
        step(&mut router, "/", "normal", || Flow::Continue);
        router
            .use_error_handler("/", |err, ctx| {
                Box::pin(async move {
                    mark(ctx, format!("handled {}", err.status()));
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["fail", "handled 422"]);
    }

    #[tokio::test]
    async fn test_error_handler_skipped_without_error() {
        let mut router = Router::new();
        router
            .use_error_handler("/", |_err, ctx| {
                Box::pin(async move {
                    mark(ctx, "error");
                    Flow::Done
                })
            })
            .unwrap();
        step(&mut router, "/", "normal", || Flow::Continue);

        let (flow, ctx) = run(&router, Method::Get, "/").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(trail(&ctx), vec!["normal"]);
    }

    #[tokio::test]
    async fn test_error_handler_can_recover() {
        let mut router = Router::new();
        step(&mut router, "/", "fail", || Flow::Error(Error::http(500, "boom")));
        router
            .use_error_handler("/", |_err, ctx| {
                Box::pin(async move {
                    mark(ctx, "recovered");
                    Flow::Continue
                })
            })
            .unwrap();
        step(&mut router, "/", "after", || Flow::Continue);

        let (flow, ctx) = run(&router, Method::Get, "/").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(trail(&ctx), vec!["fail", "recovered", "after"]);
    }

    #[tokio::test]
    async fn test_skip_route_moves_to_next_route() {
        let mut router = Router::new();
        router
            .route("/items")
            .unwrap()
            .get(|ctx| {
                Box::pin(async move {
                    mark(ctx, "first");
                    Flow::SkipRoute
                })
            })
            .get(|ctx| {
                Box::pin(async move {
                    mark(ctx, "same-route");
                    Flow::Done
                })
            });
        router
            .get("/items", |ctx| {
                Box::pin(async move {
                    mark(ctx, "second");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/items").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn test_stop_router_returns_to_parent() {
        let mut inner = Router::new();
        step(&mut inner, "/", "inner", || Flow::StopRouter);
        step(&mut inner, "/", "inner-after", || Flow::Continue);

        let mut outer = Router::new();
        outer.mount("/", inner).unwrap();
        step(&mut outer, "/", "outer", || Flow::Continue);

        let (flow, ctx) = run(&outer, Method::Get, "/x").await;
        assert!(matches!(flow, Flow::Continue));
        assert_eq!(trail(&ctx), vec!["inner", "outer"]);
    }

    #[tokio::test]
    async fn test_merge_params_inherits_parent() {
        let record = |ctx: &mut Context| {
            let seen = snapshot(ctx);
            ctx.locals_mut().insert(seen);
        };

        let mut merged = Router::with_options(RouterOptions {
            merge_params: true,
            ..RouterOptions::default()
        });
        merged
            .get("/posts/:post", move |ctx| {
                Box::pin(async move {
                    record(ctx);
                    Flow::Done
                })
            })
            .unwrap();
        let mut outer = Router::new();
        outer.mount("/users/:user", merged).unwrap();

        let (_, ctx) = run(&outer, Method::Get, "/users/ann/posts/9").await;
        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(
            seen.params,
            vec![
                ("user".to_string(), "ann".to_string()),
                ("post".to_string(), "9".to_string())
            ]
        );

        let mut isolated = Router::new();
        isolated
            .get("/posts/:post", move |ctx| {
                Box::pin(async move {
                    record(ctx);
                    Flow::Done
                })
            })
            .unwrap();
        let mut outer = Router::new();
        outer.mount("/users/:user", isolated).unwrap();

        let (_, ctx) = run(&outer, Method::Get, "/users/ann/posts/9").await;
        let seen = ctx.locals().get::<Seen>().cloned().unwrap();
        assert_eq!(seen.params, vec![("post".to_string(), "9".to_string())]);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_shared_router_keeps_concurrent_params_apart() {
        let mut router = Router::new();
        router
            .get("/u/:id", |ctx| {
                Box::pin(async move {
                    let id = ctx.param("id").unwrap_or_default().to_string();
                    tokio::task::yield_now().await;
                    ctx.response_mut().set_header("x-id", &id);
                    Flow::Done
                })
            })
            .unwrap();
        let router = Arc::new(router);

        let tasks: Vec<_> = (0..200)
            .map(|i| {
                let router = Arc::clone(&router);
                tokio::spawn(async move {
                    let (flow, ctx) = run(&router, Method::Get, &format!("/u/{i}")).await;
                    assert!(matches!(flow, Flow::Done));
                    (i, ctx.response().header("x-id").map(str::to_string))
                })
            })
            .collect();

        for task in tasks {
            let (i, seen) = task.await.unwrap();
            assert_eq!(seen, Some(i.to_string()));
        }
    }

    #[tokio::test]
    async fn test_param_hook_runs_once_per_request() {
        let mut router = Router::new();
        router.param("id", |ctx, value| {
            Box::pin(async move {
                mark(ctx, format!("hook {value}"));
                Flow::Continue
            })
        });
        step(&mut router, "/users/:id", "mw", || Flow::Continue);
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    mark(ctx, "route");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/users/42").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["hook 42", "mw", "route"]);
    }

    #[tokio::test]
    async fn test_param_hooks_run_in_order_and_can_fail() {
        let mut router = Router::new();
        router
            .param(":id", |ctx, _value| {
                Box::pin(async move {
                    mark(ctx, "first");
                    Flow::Continue
                })
            })
            .param("id", |ctx, value| {
                Box::pin(async move {
                    mark(ctx, "second");
                    if value == "0" {
                        Flow::Error(Error::http(404, "no such user"))
                    } else {
                        Flow::Continue
                    }
                })
            });
        router
            .get("/users/:id", |ctx| {
                Box::pin(async move {
                    mark(ctx, "route");
                    Flow::Done
                })
            })
            .unwrap();
        router
            .use_error_handler("/", |err, ctx| {
                Box::pin(async move {
                    mark(ctx, format!("error {}", err.status()));
                    Flow::Done
                })
            })
            .unwrap();

        let (_, ctx) = run(&router, Method::Get, "/users/0").await;
        assert_eq!(trail(&ctx), vec!["first", "second", "error 404"]);
    }

    #[tokio::test]
    async fn test_param_transformer_wraps_later_hooks() {
        let mut router = Router::new();
        router.param_transformer(|name, hook| {
            if name != "id" {
                return None;
            }
            Some(param_hook(move |ctx, value| {
                let inner = Arc::clone(&hook);
                Box::pin(async move {
                    mark(ctx, "wrapped");
                    inner(ctx, value).await
                })
            }))
        });
        router.param("id", |ctx, value| {
            Box::pin(async move {
                mark(ctx, value);
                Flow::Continue
            })
        });
        router
            .get("/users/:id", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();

        let (_, ctx) = run(&router, Method::Get, "/users/5").await;
        assert_eq!(trail(&ctx), vec!["wrapped", "5"]);
    }

    #[test]
    fn test_router_options_accessor() {
        let options = RouterOptions {
            case_sensitive: true,
            strict: false,
            merge_params: true,
        };
        let router = Router::with_options(options);
        assert_eq!(router.router_options(), options);
        assert_eq!(Router::new().router_options(), RouterOptions::default());
    }

    #[tokio::test]
    async fn test_case_and_strict_options() {
        let mut relaxed = Router::new();
        relaxed
            .get("/About", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        assert!(matches!(run(&relaxed, Method::Get, "/about/").await.0, Flow::Done));

        let mut strict = Router::with_options(RouterOptions {
            case_sensitive: true,
            strict: true,
            merge_params: false,
        });
        strict
            .get("/About", |_ctx| Box::pin(async { Flow::Done }))
            .unwrap();
        assert!(matches!(run(&strict, Method::Get, "/about").await.0, Flow::Continue));
        assert!(matches!(run(&strict, Method::Get, "/About/").await.0, Flow::Continue));
        assert!(matches!(run(&strict, Method::Get, "/About").await.0, Flow::Done));
    }

    #[tokio::test]
    async fn test_middleware_can_rewrite_url() {
        let mut router = Router::new();
        router
            .use_handler("/", |ctx| {
                Box::pin(async move {
                    if ctx.url() == "/old" {
                        ctx.set_url("/new");
                    }
                    Flow::Continue
                })
            })
            .unwrap();
        router
            .get("/new", |ctx| {
                Box::pin(async move {
                    mark(ctx, "new");
                    Flow::Done
                })
            })
            .unwrap();

        let (flow, ctx) = run(&router, Method::Get, "/old").await;
        assert!(matches!(flow, Flow::Done));
        assert_eq!(trail(&ctx), vec!["new"]);
        assert_eq!(ctx.original_url(), "/old");
    }

    #[test]
    fn test_invalid_pattern_is_rejected() {
        let mut router = Router::new();
        assert!(router.route("/users/:").is_err());
        assert!(router.is_empty());
    }

    #[test]
    fn test_router_is_middleware() {
        let mut router = Router::new();
        step(&mut router, "/", "a", || Flow::Done);
        assert_eq!(Middleware::name(&router), "router");

        let mut ctx = Context::for_request(Request::new(Method::Get, "/", Default::default(), None));
        let flow = tokio_test::block_on(Middleware::call(&router, &mut ctx));
        assert!(matches!(flow, Flow::Done));
    }

    #[test]
    fn test_protohost() {
        assert_eq!(protohost("/users"), "");
        assert_eq!(protohost(""), "");
        assert_eq!(protohost("http://example.com/users?x=1"), "http://example.com");
        assert_eq!(protohost("users?next=http://x"), "");
    }

    #[test]
    fn test_at_boundary() {
        assert!(at_boundary("/api/users", "/api"));
        assert!(at_boundary("/api", "/api"));
        assert!(at_boundary("/file.json", "/file"));
        assert!(!at_boundary("/apix", "/api"));
    }
}
