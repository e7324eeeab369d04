use super::{escape, layout};
use crate::models::Customer;
use ferrule_core::{ActiveRecord, AppContext, Condition, Controller, ControllerDef, Direction, Result};
use std::sync::Arc;

/// Customer listing, served from the `instances` group
pub struct InstancesSiteController {
    ctx: Arc<AppContext>,
}

impl Controller for InstancesSiteController {
    fn create(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn define() -> ControllerDef<Self> {
        ControllerDef::new("Site")
            .default_action("Index")
            .action("Index", [], |c: Self, _args| async move { c.index().await })
    }
}

impl InstancesSiteController {
    async fn index(&self) -> Result<String> {
        let customers = Customer::find_all(
            self.ctx.db(),
            Condition::None,
            Some(("full_name", Direction::Asc)),
            None,
        )
        .await?;

        let mut body = String::from("<h1>Customers</h1>\n<ul>\n");
        for customer in &customers {
            let id = customer
                .primary_key()
                .ok()
                .and_then(|key| key.as_int())
                .unwrap_or_default();
            body.push_str(&format!(
                "<li><a href=\"/customer/show/{id}\">{}</a> ({})</li>\n",
                escape(&customer.full_name),
                customer.age
            ));
        }
        body.push_str("</ul>");

        Ok(layout("Index", &body))
    }
}
