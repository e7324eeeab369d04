//! # Ferrule Core
//!
//! Core runtime library for the Ferrule MVC framework.
//!
//! ## Architecture
//!
//! A request path is mapped onto a controller action with coerced, typed
//! arguments. Actions talk to one shared database connection through record
//! types and a clause-ordered SQL builder; everything runs on the Tokio
//! runtime behind a Hyper server.
//!
//! ## Modules
//!
//! - `query` - SQL fragment builder with enforced clause order
//! - `record` - Active records with change tracking
//! - `column` - Field encoding and change hashes
//! - `database` - Single-connection gateway (SQLite, MySQL)
//! - `route` - Path normalisation and controller resolution
//! - `router` - Controller registry and dispatch
//! - `controller` - Controller and action definitions
//! - `types` - Action parameter types and coercion
//! - `server` - HTTP server built on Hyper
//! - `request` - HTTP request view
//! - `middleware` - Request/response middleware system
//! - `config` - TOML application configuration
//! - `error` - Error types and handling

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

extern crate self as ferrule_core;

pub mod column;
pub mod config;
pub mod controller;
pub mod database;
pub mod error;
pub mod middleware;
pub mod query;
pub mod record;
pub mod request;
pub mod route;
pub mod router;
pub mod server;
pub mod types;

pub use column::ColumnValue;
pub use config::{AppConfig, DatabaseConfig, Driver, ServerSettings};
pub use controller::{ActionOutput, AppContext, Controller, ControllerDef};
pub use database::{Database, DbValue, ResultSet, Row};
pub use error::{Error, Result};
pub use ferrule_macros::Record;
pub use middleware::{LoggingMiddleware, Middleware, MiddlewareChain, MiddlewareResult};
pub use query::{Condition, Criteria, Direction, Operator, Query};
pub use record::{ActiveRecord, KeyType, Lifecycle, PrimaryKey, Record, RecordState};
pub use request::{Method, Request};
pub use router::Router;
pub use server::{Response, Server, ServerTiming};
pub use types::{Args, ParamSpec, ParamType, ParamValue};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
