//! # Handlers and Control Flow
//!
//! Every piece of user code the router runs (middleware, error middleware,
//! route handlers, parameter hooks) returns a [`Flow`] telling the dispatch
//! loop what to do next.
//!
//! Handlers are stored type-erased behind `Arc<dyn ...>` so a router can hold
//! closures and structs side by side and be shared across worker threads.
//!
//! ```ignore
//! router.use_handler("/", |ctx| Box::pin(async move {
//!     ctx.response_mut().set_header("x-seen", "1");
//!     Flow::Continue
//! }))?;
//! ```

use crate::context::Context;
use crate::error::Error;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

/// A heap-allocated, type-erased future borrowing the dispatch context
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// What a handler wants the dispatcher to do next
#[derive(Debug)]
pub enum Flow {
    /// Continue with the next matching layer
    Continue,
    /// Skip to the next error-handling layer with this error
    Error(Error),
    /// Leave the current route and keep walking the parent stack
    SkipRoute,
    /// Leave the current router as if it had finished without error
    StopRouter,
    /// The response is finished; run nothing else
    Done,
}

impl Flow {
    /// Check if this flow carries an error
    #[must_use]
    pub const fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }
}

impl From<Error> for Flow {
    fn from(err: Error) -> Self {
        Self::Error(err)
    }
}

impl From<crate::error::Result<()>> for Flow {
    /// `Ok` means the response was produced, `Err` propagates
    fn from(res: crate::error::Result<()>) -> Self {
        match res {
            Ok(()) => Self::Done,
            Err(e) => Self::Error(e),
        }
    }
}

/// Request middleware
///
/// Runs while no error is pending. Closures of the form
/// `|ctx| Box::pin(async move { ... })` implement this automatically.
pub trait Middleware: Send + Sync + 'static {
    /// Handle the request
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow>;

    /// Name for logging
    fn name(&self) -> &'static str {
        "<anonymous>"
    }
}

/// Error-handling middleware
///
/// Runs only while an error is pending and receives that error by value.
pub trait ErrorMiddleware: Send + Sync + 'static {
    /// Handle a pending error
    fn call<'a>(&'a self, err: Error, ctx: &'a mut Context) -> BoxFuture<'a, Flow>;

    /// Name for logging
    fn name(&self) -> &'static str {
        "<anonymous>"
    }
}

impl<F> Middleware for F
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        (self)(ctx)
    }
}

impl<F> ErrorMiddleware for F
where
    F: for<'a> Fn(Error, &'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    fn call<'a>(&'a self, err: Error, ctx: &'a mut Context) -> BoxFuture<'a, Flow> {
        (self)(err, ctx)
    }
}

/// Shared request middleware
pub type BoxedMiddleware = Arc<dyn Middleware>;

/// Shared error middleware
pub type BoxedErrorMiddleware = Arc<dyn ErrorMiddleware>;

/// Per-parameter hook, called with the decoded parameter value
pub type ParamHook =
    Arc<dyn for<'a> Fn(&'a mut Context, String) -> BoxFuture<'a, Flow> + Send + Sync>;

/// Function-style hook that may wrap or replace hooks registered after it
pub type ParamTransformer = Arc<dyn Fn(&str, ParamHook) -> Option<ParamHook> + Send + Sync>;

/// Box a closure as request middleware
pub fn middleware_fn<F>(f: F) -> BoxedMiddleware
where
    F: for<'a> Fn(&'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as error middleware
pub fn error_fn<F>(f: F) -> BoxedErrorMiddleware
where
    F: for<'a> Fn(Error, &'a mut Context) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    Arc::new(f)
}

/// Box a closure as a parameter hook
pub fn param_hook<F>(f: F) -> ParamHook
where
    F: for<'a> Fn(&'a mut Context, String) -> BoxFuture<'a, Flow> + Send + Sync + 'static,
{
    Arc::new(f)
}
