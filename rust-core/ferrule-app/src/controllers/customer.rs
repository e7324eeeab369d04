use super::{escape, layout};
use crate::models::Customer;
use ferrule_core::{
    ActiveRecord, AppContext, Controller, ControllerDef, Criteria, Error, ParamSpec, ParamType,
    Result,
};
use std::sync::Arc;
use tracing::debug;

/// Single-customer pages
pub struct CustomerController {
    ctx: Arc<AppContext>,
}

impl Controller for CustomerController {
    fn create(ctx: Arc<AppContext>) -> Self {
        Self { ctx }
    }

    fn define() -> ControllerDef<Self> {
        ControllerDef::new("Customer").action(
            "Show",
            [ParamSpec::required("id", ParamType::Int)],
            |c: Self, args| async move { c.show(args.int(0)?).await },
        )
    }
}

impl CustomerController {
    async fn show(&self, id: i64) -> Result<String> {
        let Some(customer) =
            Customer::find_one(self.ctx.db(), Criteria::new().eq("id", id), None).await?
        else {
            debug!(id, "Customer not found");
            return Err(Error::RouteNotFound {
                path: format!("/customer/show/{id}"),
            });
        };

        let place = customer.place_of_birth.as_deref().unwrap_or("unknown");
        let body = format!(
            "<h1>{}</h1>\n<p>Customer #{id}, age {}, born in {}</p>\n<p>Tags: {}</p>{}",
            escape(&customer.full_name),
            customer.age,
            escape(place),
            escape(&customer.tags.join(", ")),
            if customer.vip { "\n<p>VIP</p>" } else { "" }
        );

        Ok(layout(&customer.full_name, &body))
    }
}
