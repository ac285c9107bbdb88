//! Minimal application: built-in middleware, a mounted API router, params,
//! and an error handler.
//!
//! ```text
//! cargo run -p nucleus-core --example hello
//! curl localhost:8000/api/users/42
//! curl -X OPTIONS -i localhost:8000/api/users/42
//! ```

use nucleus_core::logging::{init_tracing, DEFAULT_DIRECTIVE};
use nucleus_core::{
    Application, Cors, Error, Flow, Logger, RequestId, Result, Router, ServerConfig, Settings,
};
use serde_json::json;

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing(DEFAULT_DIRECTIVE);

    let mut api = Router::new();
    api.param("id", |_ctx, value| {
        Box::pin(async move {
            if value.chars().all(|c| c.is_ascii_digit()) {
                Flow::Continue
            } else {
                Flow::Error(Error::http(400, format!("invalid user id: {value}")))
            }
        })
    })
    .get("/users/:id", |ctx| {
        Box::pin(async move {
            let body = json!({
                "id": ctx.param("id").unwrap_or_default(),
                "base": ctx.base_url(),
            });
            Flow::from(ctx.response_mut().send_json(&body))
        })
    })?
    .post("/users/:id", |ctx| {
        Box::pin(async move {
            ctx.response_mut().status(201);
            Flow::from(ctx.response_mut().end())
        })
    })?;

    let mut app = Application::with_settings(Settings::from_env());
    app.use_middleware("/", RequestId::new())?
        .use_middleware("/", Logger::new())?
        .use_middleware("/api", Cors::new())?
        .mount("/api", api)?
        .get("/", |ctx| {
            Box::pin(async move { Flow::from(ctx.response_mut().send("Hello from Nucleus")) })
        })?
        .use_error_handler("/", |err, ctx| {
            Box::pin(async move {
                let status = err.status();
                ctx.response_mut().status(status);
                Flow::from(
                    ctx.response_mut()
                        .send_json(&json!({ "error": err.to_string() })),
                )
            })
        })?;

    app.listen(ServerConfig::default()).await
}
