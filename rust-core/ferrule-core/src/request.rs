//! # HTTP Request
//!
//! Minimal request view used for routing: method, path, query string and
//! headers. Only the path takes part in dispatch; the body is never read.

use hyper::header::{HeaderName, HeaderValue};
use hyper::HeaderMap;
use std::fmt;

/// HTTP methods
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Method {
    /// HTTP GET
    Get,
    /// HTTP POST
    Post,
    /// HTTP PUT
    Put,
    /// HTTP DELETE
    Delete,
    /// HTTP PATCH
    Patch,
    /// HTTP HEAD
    Head,
    /// HTTP OPTIONS
    Options,
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Get => write!(f, "GET"),
            Self::Post => write!(f, "POST"),
            Self::Put => write!(f, "PUT"),
            Self::Delete => write!(f, "DELETE"),
            Self::Patch => write!(f, "PATCH"),
            Self::Head => write!(f, "HEAD"),
            Self::Options => write!(f, "OPTIONS"),
        }
    }
}

impl From<&hyper::Method> for Method {
    fn from(method: &hyper::Method) -> Self {
        match *method {
            hyper::Method::POST => Self::Post,
            hyper::Method::PUT => Self::Put,
            hyper::Method::DELETE => Self::Delete,
            hyper::Method::PATCH => Self::Patch,
            hyper::Method::HEAD => Self::Head,
            hyper::Method::OPTIONS => Self::Options,
            _ => Self::Get,
        }
    }
}

/// Incoming request
#[derive(Debug, Clone)]
pub struct Request {
    /// HTTP method
    pub method: Method,
    /// Request path (without query string)
    pub path: String,
    query_string: Option<String>,
    headers: HeaderMap,
}

impl Request {
    /// Create a request from a method and a path that may carry a query string
    #[must_use]
    pub fn new(method: Method, path: &str) -> Self {
        let (path, query_string) = match path.split_once('?') {
            Some((p, q)) => (p.to_string(), Some(q.to_string())),
            None => (path.to_string(), None),
        };

        Self {
            method,
            path,
            query_string,
            headers: HeaderMap::new(),
        }
    }

    /// Create from the head of a hyper request
    #[must_use]
    pub fn from_hyper<B>(req: &hyper::Request<B>) -> Self {
        let uri = req.uri();
        Self {
            method: Method::from(req.method()),
            path: uri.path().to_string(),
            query_string: uri.query().map(String::from),
            headers: req.headers().clone(),
        }
    }

    /// Get a header value by name (case-insensitive)
    #[must_use]
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).and_then(|v| v.to_str().ok())
    }

    /// Set or override a header
    pub fn set_header(&mut self, name: &str, value: &str) {
        if let (Ok(n), Ok(v)) = (
            HeaderName::from_bytes(name.as_bytes()),
            HeaderValue::from_str(value),
        ) {
            self.headers.insert(n, v);
        }
    }

    /// Get raw query string
    #[must_use]
    pub fn query_string(&self) -> Option<&str> {
        self.query_string.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_query_string_is_split_off() {
        let req = Request::new(Method::Get, "/customer/show/7?page=2");
        assert_eq!(req.path, "/customer/show/7");
        assert_eq!(req.query_string(), Some("page=2"));
    }

    #[test]
    fn test_headers_are_case_insensitive() {
        let mut req = Request::new(Method::Get, "/");
        req.set_header("X-Request-Id", "abc");
        assert_eq!(req.header("x-request-id"), Some("abc"));

        req.set_header("bad header", "x");
        assert_eq!(req.header("bad header"), None);
    }

    #[test]
    fn test_from_hyper() {
        let hyper_req = hyper::Request::builder()
            .method(hyper::Method::POST)
            .uri("/site/index?x=1")
            .header("x-request-id", "r-1")
            .body(())
            .unwrap();

        let req = Request::from_hyper(&hyper_req);
        assert_eq!(req.method, Method::Post);
        assert_eq!(req.path, "/site/index");
        assert_eq!(req.header("x-request-id"), Some("r-1"));
        assert_eq!(req.method.to_string(), "POST");
    }
}
