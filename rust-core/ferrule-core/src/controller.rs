//! # Controllers
//!
//! Explicit controller registration: each controller type lists its actions,
//! their declared parameters and a handler, once, at startup. The router
//! stores the handlers type-erased and instantiates a fresh controller for
//! every dispatched request.
//!
//! ```ignore
//! impl Controller for CustomerController {
//!     fn create(ctx: Arc<AppContext>) -> Self {
//!         Self { ctx }
//!     }
//!
//!     fn define() -> ControllerDef<Self> {
//!         ControllerDef::new("Customer")
//!             .default_action("Index")
//!             .action("Show", [ParamSpec::required("id", ParamType::Int)], |c, args| async move {
//!                 c.show(args.int(0)?).await
//!             })
//!     }
//! }
//! ```

use crate::config::AppConfig;
use crate::database::Database;
use crate::error::Result;
use crate::types::{Args, ParamSpec};
use std::future::Future;
use std::marker::PhantomData;
use std::pin::Pin;
use std::sync::Arc;

/// Boxed, sendable future returned by type-erased handlers
pub type BoxFuture<T> = Pin<Box<dyn Future<Output = T> + Send>>;

/// Type-erased action handler
pub type ActionHandler =
    Arc<dyn Fn(Arc<AppContext>, Args) -> BoxFuture<Result<ActionOutput>> + Send + Sync>;

/// Process-wide services handed to every controller
///
/// Owned by the entry point; the single database connection lives here
/// rather than in a global.
#[derive(Debug)]
pub struct AppContext {
    db: Database,
    config: AppConfig,
}

impl AppContext {
    /// Bundle the connection and configuration
    #[must_use]
    pub const fn new(db: Database, config: AppConfig) -> Self {
        Self { db, config }
    }

    /// The shared database connection
    #[must_use]
    pub const fn db(&self) -> &Database {
        &self.db
    }

    /// Startup configuration
    #[must_use]
    pub const fn config(&self) -> &AppConfig {
        &self.config
    }
}

/// What an action produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ActionOutput {
    /// Rendered response body
    Body(String),
    /// Nothing to render; answered with an empty 200
    Empty,
}

impl From<String> for ActionOutput {
    fn from(body: String) -> Self {
        Self::Body(body)
    }
}

impl From<&str> for ActionOutput {
    fn from(body: &str) -> Self {
        Self::Body(body.to_string())
    }
}

impl From<Option<String>> for ActionOutput {
    fn from(body: Option<String>) -> Self {
        body.map_or(Self::Empty, Self::Body)
    }
}

impl From<()> for ActionOutput {
    fn from((): ()) -> Self {
        Self::Empty
    }
}

/// A controller type the router can instantiate and dispatch to
pub trait Controller: Sized + Send + 'static {
    /// Build the controller for one request
    fn create(ctx: Arc<AppContext>) -> Self;

    /// Name, default action and actions of this controller
    fn define() -> ControllerDef<Self>;
}

/// One registered action
#[derive(Clone)]
pub struct ActionDef {
    /// PascalCase action name
    pub name: &'static str,
    /// Declared parameters, in positional order
    pub params: Vec<ParamSpec>,
    /// Type-erased handler
    pub handler: ActionHandler,
}

impl std::fmt::Debug for ActionDef {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ActionDef")
            .field("name", &self.name)
            .field("params", &self.params)
            .finish_non_exhaustive()
    }
}

/// Builder describing a controller's actions
pub struct ControllerDef<C> {
    name: &'static str,
    default_action: Option<&'static str>,
    actions: Vec<ActionDef>,
    _controller: PhantomData<fn() -> C>,
}

impl<C: Controller> ControllerDef<C> {
    /// Start a definition for a PascalCase controller name
    #[must_use]
    pub fn new(name: &'static str) -> Self {
        Self {
            name,
            default_action: None,
            actions: Vec::new(),
            _controller: PhantomData,
        }
    }

    /// Action used when the path names none
    #[must_use]
    pub fn default_action(mut self, action: &'static str) -> Self {
        self.default_action = Some(action);
        self
    }

    /// Register an action with its declared parameters
    ///
    /// The handler receives a controller created for this request and the
    /// coerced arguments, in declaration order.
    #[must_use]
    pub fn action<P, F, Fut, O>(mut self, name: &'static str, params: P, handler: F) -> Self
    where
        P: IntoIterator<Item = ParamSpec>,
        F: Fn(C, Args) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<O>> + Send + 'static,
        O: Into<ActionOutput>,
    {
        let handler = Arc::new(handler);
        let erased: ActionHandler = Arc::new(
            move |ctx: Arc<AppContext>, args: Args| -> BoxFuture<Result<ActionOutput>> {
                let handler = Arc::clone(&handler);
                Box::pin(async move {
                    let controller = C::create(ctx);
                    (*handler)(controller, args).await.map(Into::into)
                })
            },
        );

        self.actions.push(ActionDef {
            name,
            params: params.into_iter().collect(),
            handler: erased,
        });
        self
    }

    /// Controller name
    #[must_use]
    pub const fn name(&self) -> &'static str {
        self.name
    }

    pub(crate) fn into_parts(self) -> (&'static str, Option<&'static str>, Vec<ActionDef>) {
        (self.name, self.default_action, self.actions)
    }
}
