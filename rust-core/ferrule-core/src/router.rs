//! # Router
//!
//! Registry of controllers and controller groups, plus dispatch.
//!
//! Controllers are registered once at startup under their PascalCase name,
//! optionally inside a group (`admin`, `admin/reports`). A request path is
//! resolved by [`crate::route::resolve`], its raw arguments are bound to the
//! action's declared parameters, and the action handler runs against a fresh
//! controller instance.
//!
//! Routing misses (unknown action, wrong arity, failed coercion) surface as
//! `Error::RouteNotFound` / `Error::Coercion`; a missing default controller
//! is `Error::DefaultControllerMissing`.

use crate::config::AppConfig;
use crate::controller::{ActionDef, ActionOutput, AppContext, Controller};
use crate::error::{Error, Result};
use crate::route::{resolve, split_path, RouteTable};
use crate::types::bind_args;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::{debug, warn};

/// Registered controller
#[derive(Debug, Clone)]
struct ControllerEntry {
    default_action: Option<&'static str>,
    actions: HashMap<&'static str, ActionDef>,
}

/// Controller registry and dispatcher
#[derive(Debug, Clone)]
pub struct Router {
    groups: HashSet<String>,
    controllers: HashMap<String, ControllerEntry>,
    default_controller: String,
}

impl Router {
    /// Create an empty router with the controller used for paths naming none
    #[must_use]
    pub fn new(default_controller: impl Into<String>) -> Self {
        Self {
            groups: HashSet::new(),
            controllers: HashMap::new(),
            default_controller: default_controller.into(),
        }
    }

    /// Create an empty router configured from the application settings
    #[must_use]
    pub fn from_config(config: &AppConfig) -> Self {
        Self::new(config.default_controller.clone())
    }

    /// Register a controller group and every group enclosing it
    pub fn group(&mut self, path: &str) -> &mut Self {
        let mut prefix = String::new();
        for part in path.trim_matches('/').split('/').filter(|p| !p.is_empty()) {
            if !prefix.is_empty() {
                prefix.push('/');
            }
            prefix.push_str(&part.to_lowercase());
            self.groups.insert(prefix.clone());
        }
        self
    }

    /// Register a top-level controller
    pub fn register<C: Controller>(&mut self) -> &mut Self {
        self.insert::<C>(String::new())
    }

    /// Register a controller inside a group
    pub fn register_in<C: Controller>(&mut self, group: &str) -> &mut Self {
        self.group(group);
        let prefix = group.trim_matches('/').to_lowercase();
        self.insert::<C>(prefix)
    }

    fn insert<C: Controller>(&mut self, prefix: String) -> &mut Self {
        let (name, default_action, actions) = C::define().into_parts();
        let qualified = if prefix.is_empty() {
            name.to_string()
        } else {
            format!("{prefix}/{name}")
        };

        let entry = ControllerEntry {
            default_action,
            actions: actions.into_iter().map(|a| (a.name, a)).collect(),
        };

        debug!(controller = %qualified, actions = entry.actions.len(), "Controller registered");
        if self.controllers.insert(qualified.clone(), entry).is_some() {
            warn!(controller = %qualified, "Controller registered twice, keeping the last one");
        }
        self
    }

    /// Number of registered controllers
    #[must_use]
    pub fn len(&self) -> usize {
        self.controllers.len()
    }

    /// Check if no controller is registered
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.controllers.is_empty()
    }

    /// Resolve a path and run the matching action
    ///
    /// # Errors
    ///
    /// Returns a routing miss (`Error::RouteNotFound`, `Error::Coercion`)
    /// when no action accepts the path, `Error::DefaultControllerMissing`
    /// when the fallback controller is not registered, and whatever the
    /// action itself returns.
    pub async fn dispatch(&self, ctx: &Arc<AppContext>, path: &str) -> Result<ActionOutput> {
        let miss = || Error::RouteNotFound {
            path: path.to_string(),
        };

        let resolution = resolve(self, split_path(path)?, &self.default_controller)?;
        let entry = self
            .controllers
            .get(&resolution.controller)
            .ok_or_else(miss)?;
        let action_name = resolution.action.as_deref().ok_or_else(miss)?;
        let action = entry.actions.get(action_name).ok_or_else(miss)?;
        let args = bind_args(path, &action.params, &resolution.args)?;

        debug!(
            controller = %resolution.controller,
            action = action_name,
            args = args.len(),
            "Dispatching action"
        );

        (action.handler)(Arc::clone(ctx), args).await
    }
}

impl RouteTable for Router {
    fn has_group(&self, group: &str) -> bool {
        self.groups.contains(group)
    }

    fn has_controller(&self, name: &str) -> bool {
        self.controllers.contains_key(name)
    }

    fn default_action(&self, name: &str) -> Option<&str> {
        self.controllers.get(name).and_then(|c| c.default_action)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::controller::ControllerDef;
    use crate::database::Database;
    use crate::types::{ParamSpec, ParamType, ParamValue};

    struct Site;

    impl Controller for Site {
        fn create(_ctx: Arc<AppContext>) -> Self {
            Self
        }

        fn define() -> ControllerDef<Self> {
            ControllerDef::new("Site")
                .default_action("Index")
                .action("Index", [], |_c: Self, _args| async { Ok("home") })
                .action("Silent", [], |_c: Self, _args| async { Ok(()) })
        }
    }

    struct Customer;

    impl Controller for Customer {
        fn create(_ctx: Arc<AppContext>) -> Self {
            Self
        }

        fn define() -> ControllerDef<Self> {
            ControllerDef::new("Customer").action(
                "Show",
                [
                    ParamSpec::required("id", ParamType::Int),
                    ParamSpec::optional("verbose", ParamType::Bool, ParamValue::Bool(false)),
                ],
                |_c: Self, args| async move {
                    Ok(format!("customer {} verbose={}", args.int(0)?, args.bool(1)?))
                },
            )
        }
    }

    struct Reports;

    impl Controller for Reports {
        fn create(_ctx: Arc<AppContext>) -> Self {
            Self
        }

        fn define() -> ControllerDef<Self> {
            ControllerDef::new("Reports")
                .default_action("Summary")
                .action("Summary", [], |_c: Self, _args| async { Ok("summary") })
        }
    }

    async fn context() -> Arc<AppContext> {
        let db = Database::connect_sqlite("sqlite::memory:").await.unwrap();
        Arc::new(AppContext::new(db, AppConfig::default()))
    }

    fn router() -> Router {
        let mut router = Router::new("Site");
        router
            .register::<Site>()
            .register::<Customer>()
            .register_in::<Reports>("admin");
        router
    }

    #[tokio::test]
    async fn test_dispatch_default_and_explicit() {
        let ctx = context().await;
        let router = router();
        assert_eq!(router.len(), 3);

        let body = router.dispatch(&ctx, "/").await.unwrap();
        assert_eq!(body, ActionOutput::Body("home".to_string()));

        let body = router.dispatch(&ctx, "/site/index").await.unwrap();
        assert_eq!(body, ActionOutput::Body("home".to_string()));

        let body = router.dispatch(&ctx, "/silent").await.unwrap();
        assert_eq!(body, ActionOutput::Empty);
    }

    #[tokio::test]
    async fn test_dispatch_coerces_arguments() {
        let ctx = context().await;
        let router = router();

        let body = router.dispatch(&ctx, "/customer/show/7").await.unwrap();
        assert_eq!(body, ActionOutput::Body("customer 7 verbose=false".to_string()));

        let body = router.dispatch(&ctx, "/Customer/Show/7/yes").await.unwrap();
        assert_eq!(body, ActionOutput::Body("customer 7 verbose=true".to_string()));
    }

    #[tokio::test]
    async fn test_routing_misses() {
        let ctx = context().await;
        let router = router();

        for path in [
            "/customer/show",
            "/customer/show/abc",
            "/customer/show/7/yes/extra",
            "/customer",
            "/customer/missing",
            "/nowhere",
            "/customer/show/7?x=1",
        ] {
            let err = router.dispatch(&ctx, path).await.unwrap_err();
            assert!(err.is_routing_miss(), "{path} should miss, got {err}");
        }
    }

    #[tokio::test]
    async fn test_groups() {
        let ctx = context().await;
        let router = router();

        let body = router.dispatch(&ctx, "/admin/reports").await.unwrap();
        assert_eq!(body, ActionOutput::Body("summary".to_string()));

        let err = router.dispatch(&ctx, "/admin").await.unwrap_err();
        assert!(matches!(err, Error::DefaultControllerMissing { .. }));
    }

    #[tokio::test]
    async fn test_missing_default_controller_is_fatal() {
        let ctx = context().await;
        let mut router = Router::new("Home");
        router.register::<Customer>();

        let err = router.dispatch(&ctx, "/").await.unwrap_err();
        assert!(matches!(err, Error::DefaultControllerMissing { ref name } if name == "Home"));
        assert_eq!(err.status_code(), 500);
    }

    #[test]
    fn test_nested_groups_register_parents() {
        let mut router = Router::new("Site");
        router.group("/Admin/Reports/");
        assert!(router.has_group("admin"));
        assert!(router.has_group("admin/reports"));
        assert!(!router.has_group("reports"));
    }
}
