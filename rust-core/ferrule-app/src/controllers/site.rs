use super::layout;
use ferrule_core::{AppContext, Controller, ControllerDef};
use std::sync::Arc;

/// Landing page
pub struct SiteController;

impl Controller for SiteController {
    fn create(_ctx: Arc<AppContext>) -> Self {
        Self
    }

    fn define() -> ControllerDef<Self> {
        ControllerDef::new("Site")
            .default_action("Index")
            .action("Index", [], |_c: Self, _args| async { Ok(Self::index()) })
    }
}

impl SiteController {
    fn index() -> String {
        layout(
            "Index",
            "<h1>Ferrule</h1>\n<p><a href=\"/instances\">Customers</a></p>",
        )
    }
}
