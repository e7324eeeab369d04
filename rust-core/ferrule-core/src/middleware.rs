//! # Middleware System
//!
//! Request/response interception around dispatch.
//!
//! Middlewares run in registration order before the router and in reverse
//! order after it. Any of them may answer early with its own response.

use crate::request::Request;
use crate::server::Response;
use std::sync::Arc;
use tracing::{debug, info};

/// Middleware trait for request/response interception
pub trait Middleware: Send + Sync {
    /// Called before dispatch; may short-circuit with a response
    fn before_request(&self, _req: &Request) -> MiddlewareResult {
        MiddlewareResult::Continue
    }

    /// Called after dispatch; may adjust the response
    fn after_response(&self, _req: &Request, _res: &mut Response) {}

    /// Middleware name for logging
    fn name(&self) -> &'static str {
        "Unknown"
    }
}

/// Result of middleware execution
#[derive(Debug)]
pub enum MiddlewareResult {
    /// Continue to next middleware/router
    Continue,
    /// Short-circuit with this response (skip dispatch)
    Respond(Response),
}

/// Ordered middleware chain
#[derive(Default, Clone)]
pub struct MiddlewareChain {
    middlewares: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    /// Create a new empty middleware chain
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Add a middleware to the chain
    pub fn add<M: Middleware + 'static>(&mut self, middleware: M) {
        debug!(middleware = middleware.name(), "Middleware added");
        self.middlewares.push(Arc::new(middleware));
    }

    /// Execute `before_request` for all middlewares
    pub fn run_before(&self, req: &Request) -> MiddlewareResult {
        for mw in &self.middlewares {
            match mw.before_request(req) {
                MiddlewareResult::Continue => continue,
                result => return result,
            }
        }
        MiddlewareResult::Continue
    }

    /// Execute `after_response` for all middlewares (in reverse order)
    pub fn run_after(&self, req: &Request, res: &mut Response) {
        for mw in self.middlewares.iter().rev() {
            mw.after_response(req, res);
        }
    }

    /// Get the number of middlewares
    #[must_use]
    pub fn len(&self) -> usize {
        self.middlewares.len()
    }

    /// Check if chain is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.middlewares.is_empty()
    }
}

/// Access log: one line per request
#[derive(Debug, Default)]
pub struct LoggingMiddleware;

impl LoggingMiddleware {
    /// Create a new logging middleware
    #[must_use]
    pub const fn new() -> Self {
        Self
    }
}

impl Middleware for LoggingMiddleware {
    fn after_response(&self, req: &Request, res: &mut Response) {
        let request_id = req.header("x-request-id").unwrap_or("-");
        let client = req.header("x-client-ip").unwrap_or("-");
        info!(
            method = %req.method,
            path = %req.path,
            query = req.query_string().unwrap_or(""),
            status = res.status,
            client = %client,
            request_id = %request_id,
            "Request served"
        );
    }

    fn name(&self) -> &'static str {
        "LoggingMiddleware"
    }
}
