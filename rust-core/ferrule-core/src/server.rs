//! # HTTP Server
//!
//! HTTP/1 server built on Hyper and Tokio that hands every request path to
//! the [`Router`] and renders the outcome:
//!
//! - a rendered body answers 200, with a `Server-Timing` header splitting
//!   the request time into `db`, `app` and `total`
//! - an action that renders nothing answers an empty 200
//! - a routing miss answers an empty 404
//! - any other failure is logged and answers an empty 500
//!
//! Shutdown is graceful: on Ctrl-C the accept loop stops and in-flight
//! connections get a bounded drain period.

use crate::config::ServerSettings;
use crate::controller::{ActionOutput, AppContext};
use crate::error::{Error, Result};
use crate::middleware::{Middleware, MiddlewareChain, MiddlewareResult};
use crate::request::{Method, Request};
use crate::router::Router;
use http_body_util::Full;
use hyper::body::{Bytes, Incoming};
use hyper::server::conn::http1;
use hyper::service::service_fn;
use hyper::StatusCode;
use hyper_util::rt::TokioIo;
use std::collections::HashMap;
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, error, info, warn};

/// Outgoing response
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Response {
    /// HTTP status code
    pub status: u16,
    /// Response body
    pub body: String,
    /// Content type
    pub content_type: String,
    /// Response headers
    pub headers: HashMap<String, String>,
}

impl Default for Response {
    fn default() -> Self {
        Self {
            status: 200,
            body: String::new(),
            content_type: "text/html; charset=utf-8".to_string(),
            headers: HashMap::new(),
        }
    }
}

impl Response {
    /// Rendered page
    #[must_use]
    pub fn html(body: impl Into<String>) -> Self {
        Self {
            body: body.into(),
            ..Self::default()
        }
    }

    /// Empty body with the given status
    #[must_use]
    pub fn empty(status: u16) -> Self {
        Self {
            status,
            ..Self::default()
        }
    }

    /// Set status code
    #[must_use]
    pub fn with_status(mut self, status: u16) -> Self {
        self.status = status;
        self
    }

    /// Set header
    #[must_use]
    pub fn with_header(mut self, key: &str, value: &str) -> Self {
        self.set_header(key, value);
        self
    }

    /// Set or override a header
    pub fn set_header(&mut self, key: &str, value: &str) {
        if key.eq_ignore_ascii_case("content-type") {
            self.content_type = value.to_string();
        } else {
            self.headers
                .retain(|existing, _| !existing.eq_ignore_ascii_case(key));
            self.headers.insert(key.to_string(), value.to_string());
        }
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, key: &str) -> Option<&str> {
        if key.eq_ignore_ascii_case("content-type") {
            return Some(&self.content_type);
        }
        self.headers
            .iter()
            .find(|(k, _)| k.eq_ignore_ascii_case(key))
            .map(|(_, v)| v.as_str())
    }

    /// Convert to hyper Response
    fn into_hyper(self) -> hyper::Response<Full<Bytes>> {
        let status = StatusCode::from_u16(self.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        let mut builder = hyper::Response::builder()
            .status(status)
            .header("Content-Type", &self.content_type);
        for (k, v) in &self.headers {
            builder = builder.header(k.as_str(), v.as_str());
        }

        builder
            .body(Full::new(Bytes::from(self.body)))
            .unwrap_or_else(|e| {
                error!(error = %e, "Invalid response head");
                let mut fallback = hyper::Response::new(Full::new(Bytes::new()));
                *fallback.status_mut() = StatusCode::INTERNAL_SERVER_ERROR;
                fallback
            })
    }
}

/// Request time split reported in the `Server-Timing` header
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ServerTiming {
    /// Time spent in the database during the request
    pub db: Duration,
    /// Wall-clock time of the request
    pub total: Duration,
}

impl ServerTiming {
    /// Time spent outside the database
    #[must_use]
    pub const fn app(&self) -> Duration {
        self.total.saturating_sub(self.db)
    }

    /// Header value, milliseconds with one decimal
    #[must_use]
    pub fn header_value(&self) -> String {
        format!(
            "db;dur={:.1}, app;dur={:.1}, total;dur={:.1}",
            millis(self.db),
            millis(self.app()),
            millis(self.total)
        )
    }
}

fn millis(duration: Duration) -> f64 {
    duration.as_secs_f64() * 1000.0
}

/// HTTP server bound to one router and one application context
pub struct Server {
    settings: ServerSettings,
    router: Arc<Router>,
    context: Arc<AppContext>,
    middleware: MiddlewareChain,
}

impl Server {
    /// Create a server; listener settings come from the context's configuration
    #[must_use]
    pub fn new(router: Router, context: Arc<AppContext>) -> Self {
        Self {
            settings: context.config().server.clone(),
            router: Arc::new(router),
            context,
            middleware: MiddlewareChain::new(),
        }
    }

    /// Bind the server to an address
    #[must_use]
    pub fn bind(mut self, addr: SocketAddr) -> Self {
        self.settings.address = addr;
        self
    }

    /// Add a middleware to the chain
    pub fn add_middleware<M: Middleware + 'static>(&mut self, middleware: M) {
        self.middleware.add(middleware);
    }

    /// Shared application context
    #[must_use]
    pub const fn context(&self) -> &Arc<AppContext> {
        &self.context
    }

    /// Start the server with graceful shutdown
    ///
    /// # Errors
    ///
    /// Returns `Error::BindError` if the address cannot be bound.
    pub async fn serve(&self) -> Result<()> {
        let addr = self.settings.address;
        let bind_error = |source| Error::BindError {
            address: addr.to_string(),
            source,
        };

        let socket = if addr.is_ipv4() {
            tokio::net::TcpSocket::new_v4()
        } else {
            tokio::net::TcpSocket::new_v6()
        }
        .map_err(bind_error)?;
        socket.set_reuseaddr(true).map_err(bind_error)?;
        socket.bind(addr).map_err(bind_error)?;
        let listener = socket.listen(1024).map_err(bind_error)?;

        info!(address = %addr, "Server listening on http://{}", addr);

        let active = Arc::new(AtomicUsize::new(0));
        let middleware = Arc::new(self.middleware.clone());
        let shutdown = shutdown_signal();
        tokio::pin!(shutdown);

        loop {
            tokio::select! {
                accepted = listener.accept() => {
                    let (stream, remote_addr) = match accepted {
                        Ok(pair) => pair,
                        Err(e) => {
                            warn!(error = %e, "Failed to accept connection");
                            continue;
                        }
                    };
                    let io = TokioIo::new(stream);

                    let router = Arc::clone(&self.router);
                    let context = Arc::clone(&self.context);
                    let middleware = Arc::clone(&middleware);
                    let active = Arc::clone(&active);

                    tokio::task::spawn(async move {
                        active.fetch_add(1, Ordering::Relaxed);

                        let service = service_fn(move |req: hyper::Request<Incoming>| {
                            let router = Arc::clone(&router);
                            let context = Arc::clone(&context);
                            let middleware = Arc::clone(&middleware);
                            async move {
                                let mut request = Request::from_hyper(&req);
                                request.set_header("x-client-ip", &remote_addr.ip().to_string());
                                let response =
                                    process_request(&mut request, &router, &context, &middleware).await;
                                Ok::<_, Infallible>(response.into_hyper())
                            }
                        });

                        if let Err(err) = http1::Builder::new().serve_connection(io, service).await {
                            error!(error = %err, "Error serving connection");
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
        if tokio::time::timeout(self.settings.shutdown_timeout(), drain)
            .await
            .is_err()
        {
            warn!(
                open = active.load(Ordering::Relaxed),
                "Shutdown timeout reached with connections still open"
            );
        }
        Ok(())
    }

    /// Dispatch a GET request directly, without the network stack
    pub async fn test_request(&self, path: &str) -> Response {
        let mut req = Request::new(Method::Get, path);
        req.set_header("x-client-ip", "test");
        process_request(&mut req, &self.router, &self.context, &self.middleware).await
    }
}

async fn shutdown_signal() {
    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to install Ctrl-C handler");
        std::future::pending::<()>().await;
    }
}

/// Core request processing logic (network agnostic)
async fn process_request(
    req: &mut Request,
    router: &Router,
    context: &Arc<AppContext>,
    middleware: &MiddlewareChain,
) -> Response {
    if req.header("x-request-id").is_none() {
        let request_id = generate_request_id();
        req.set_header("x-request-id", &request_id);
    }

    let mut response = match middleware.run_before(req) {
        MiddlewareResult::Continue => route_request(req, router, context).await,
        MiddlewareResult::Respond(resp) => resp,
    };

    if let Some(request_id) = req.header("x-request-id") {
        response.set_header("x-request-id", request_id);
    }
    middleware.run_after(req, &mut response);
    response
}

async fn route_request(req: &Request, router: &Router, context: &Arc<AppContext>) -> Response {
    let started = Instant::now();
    let db_before = context.db().execution_time();

    match router.dispatch(context, &req.path).await {
        Ok(ActionOutput::Body(body)) => {
            let mut response = Response::html(body);
            if context.config().server_timing {
                let timing = ServerTiming {
                    db: context.db().execution_time().saturating_sub(db_before),
                    total: started.elapsed(),
                };
                response.set_header("Server-Timing", &timing.header_value());
            }
            response
        }
        Ok(ActionOutput::Empty) => Response::empty(200),
        Err(e) if e.is_routing_miss() => {
            debug!(path = %req.path, reason = %e, "Routing miss");
            Response::empty(404)
        }
        Err(e) => {
            error!(path = %req.path, error = %e, "Request failed");
            Response::empty(500)
        }
    }
}

static REQUEST_COUNTER: AtomicUsize = AtomicUsize::new(1);

fn generate_request_id() -> String {
    use std::time::{SystemTime, UNIX_EPOCH};
    let now = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default();
    let counter = REQUEST_COUNTER.fetch_add(1, Ordering::Relaxed);
    format!("{:x}-{:x}", now.as_nanos(), counter)
}
