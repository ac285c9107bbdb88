//! # Nucleus Core
//!
//! Layered HTTP routing and middleware dispatch for Tokio and Hyper.
//!
//! ## Architecture
//!
//! A [`Router`] is an ordered stack of layers. Each layer pairs a compiled
//! path pattern with request middleware, error middleware or a [`Route`].
//! Every handler returns a [`Flow`] telling the router whether to continue,
//! fail, skip the route, leave the router, or stop because the response is
//! finished. Routers are middleware themselves, so they nest under mount
//! paths.
//!
//! ## Modules
//!
//! - `application` - Root router, settings, final handler
//! - `router` - The dispatch loop
//! - `route` - Per-method handlers for one path
//! - `layer` - Pattern plus handler entries of a router stack
//! - `path` - Route pattern compilation and matching
//! - `params` - Ordered path parameters
//! - `handler` - Handler traits and the `Flow` signal
//! - `context` - Per-request dispatch state
//! - `request` / `response` - HTTP request data and the send capability
//! - `middleware` - Built-in middleware
//! - `server` - HTTP server built on Hyper
//! - `settings` - Application settings
//! - `state` - Shared and per-request typed state
//! - `logging` - Tracing subscriber setup
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod application;
pub mod context;
pub mod error;
pub mod handler;
pub mod layer;
pub mod logging;
pub mod method;
pub mod middleware;
pub mod params;
pub mod path;
pub mod request;
pub mod response;
pub mod route;
pub mod router;
pub mod server;
pub mod settings;
pub mod state;

pub use application::Application;
pub use context::Context;
pub use error::{Error, Result};
pub use handler::{
    error_fn, middleware_fn, param_hook, BoxFuture, BoxedErrorMiddleware, BoxedMiddleware,
    ErrorMiddleware, Flow, Middleware, ParamHook, ParamTransformer,
};
pub use layer::{Layer, LayerKind};
pub use method::Method;
pub use middleware::{Cors, Logger, RateLimit, RequestId};
pub use params::Params;
pub use path::{MatchOptions, PathMatch, PathMatcher};
pub use request::Request;
pub use response::Response;
pub use route::Route;
pub use router::{Router, RouterOptions};
pub use server::ServerConfig;
pub use settings::Settings;
pub use state::{Locals, SharedState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
