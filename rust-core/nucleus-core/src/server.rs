//! # HTTP Server
//!
//! Serves an [`Application`] over HTTP/1.1 with Hyper and Tokio.
//!
//! ## Key Features
//!
//! - One Tokio task per connection
//! - Request bodies collected up to a configurable limit (413 beyond it)
//! - Graceful shutdown on Ctrl-C, draining open connections

use crate::application::Application;
use crate::error::{Error, Result};
use crate::middleware::CLIENT_IP_HEADER;
use crate::request::Request;
use http_body_util::Full;
use hyper::body::Bytes;
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, info, warn};

/// HTTP Server configuration
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address to bind the server to
    pub address: SocketAddr,
    /// Enable keep-alive connections
    pub keep_alive: bool,
    /// Shutdown timeout for graceful shutdown (default: 30 seconds)
    pub shutdown_timeout: Duration,
    /// Max request body size in bytes
    pub max_body_size: usize,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            address: ([127, 0, 0, 1], 8000).into(),
            keep_alive: true,
            shutdown_timeout: Duration::from_secs(30),
            max_body_size: 1024 * 1024,
        }
    }
}

impl ServerConfig {
    /// Bind to another address
    #[must_use]
    pub const fn bind(mut self, address: SocketAddr) -> Self {
        self.address = address;
        self
    }

    /// Set max request body size
    #[must_use]
    pub const fn max_body_size(mut self, bytes: usize) -> Self {
        self.max_body_size = bytes;
        self
    }
}

/// Accept connections until Ctrl-C, then drain
///
/// # Errors
///
/// Returns `Error::BindError` if the listener cannot be set up, or
/// `Error::Io` if accepting a connection fails.
pub async fn serve(app: Arc<Application>, config: ServerConfig) -> Result<()> {
    let addr = config.address;
    let listener = bind(addr).map_err(|source| Error::BindError {
        address: addr.to_string(),
        source,
    })?;

    info!("Server listening on http://{}", addr);

    let active = Arc::new(AtomicUsize::new(0));
    let max_body_size = config.max_body_size;
    let keep_alive = config.keep_alive;

    let shutdown = shutdown_signal();
    tokio::pin!(shutdown);

    loop {
        tokio::select! {
            accept_result = listener.accept() => {
                let (stream, remote_addr) = accept_result?;
                let io = TokioIo::new(stream);
                let app = Arc::clone(&app);
                let active = Arc::clone(&active);

                tokio::task::spawn(async move {
                    active.fetch_add(1, Ordering::Relaxed);

                    let service = service_fn(move |req| {
                        let app = Arc::clone(&app);
                        async move {
                            let method = req.method().clone();
                            let path = req.uri().path().to_string();
                            let version = req.version();

                            let resp = handle_request(req, &app, remote_addr, max_body_size).await;
                            info!(
                                "    {} - \"{} {} {:?}\" {}",
                                remote_addr,
                                method,
                                path,
                                version,
                                resp.status()
                            );
                            Ok::<_, std::convert::Infallible>(resp)
                        }
                    });

                    if let Err(err) = http1::Builder::new()
                        .keep_alive(keep_alive)
                        .serve_connection(io, service)
                        .await
                    {
                        error!("Error serving connection: {:?}", err);
                    }
                    active.fetch_sub(1, Ordering::Relaxed);
                });
            }
            () = &mut shutdown => {
                info!("Shutdown signal received, stopping server...");
                break;
            }
        }
    }

    let drain = async {
        while active.load(Ordering::Relaxed) > 0 {
            tokio::time::sleep(Duration::from_millis(50)).await;
        }
    };
    if tokio::time::timeout(config.shutdown_timeout, drain).await.is_err() {
        warn!(
            remaining = active.load(Ordering::Relaxed),
            "Shutdown timeout elapsed with open connections"
        );
    }
    Ok(())
}

fn bind(addr: SocketAddr) -> std::io::Result<tokio::net::TcpListener> {
    let socket = if addr.is_ipv4() {
        tokio::net::TcpSocket::new_v4()?
    } else {
        tokio::net::TcpSocket::new_v6()?
    };
    socket.set_reuseaddr(true)?;
    #[cfg(not(windows))]
    {
        socket.set_reuseport(true)?;
    }
    socket.bind(addr)?;
    socket.listen(1024)
}

async fn shutdown_signal() {
    if let Err(err) = tokio::signal::ctrl_c().await {
        error!("Failed to install Ctrl-C handler: {}", err);
        std::future::pending::<()>().await;
    }
}

/// Convert one hyper request, dispatch it and convert the response back
async fn handle_request(
    req: hyper::Request<hyper::body::Incoming>,
    app: &Application,
    remote_addr: SocketAddr,
    max_body_size: usize,
) -> hyper::Response<Full<Bytes>> {
    let mut request = match Request::from_hyper_with_limit(req, max_body_size).await {
        Ok(request) => request,
        Err(err) => return rejection(&err),
    };

    request.set_header(CLIENT_IP_HEADER, &remote_addr.ip().to_string());
    app.handle(request).await.into_hyper()
}

/// Response for a request that never reached the router
fn rejection(err: &Error) -> hyper::Response<Full<Bytes>> {
    let status = match err {
        Error::PayloadTooLarge { .. } => StatusCode::PAYLOAD_TOO_LARGE,
        Error::UnsupportedMethod(_) => StatusCode::NOT_IMPLEMENTED,
        _ => {
            error!("Failed to parse request: {}", err);
            StatusCode::BAD_REQUEST
        }
    };

    let mut resp = hyper::Response::new(Full::new(Bytes::from(
        status.canonical_reason().unwrap_or("Bad Request"),
    )));
    *resp.status_mut() = status;
    resp
}
