//! Controllers of the sample application

mod customer;
mod instances;
mod site;

pub use customer::CustomerController;
pub use instances::InstancesSiteController;
pub use site::SiteController;

use ferrule_core::Router;

/// Register every controller and group of the application
pub fn register(router: &mut Router) {
    router
        .register::<SiteController>()
        .register::<CustomerController>()
        .register_in::<InstancesSiteController>("instances");
}

/// Wrap a body in the site layout
fn layout(title: &str, body: &str) -> String {
    format!(
        "<!DOCTYPE html>\n<html>\n<head><title>{}</title></head>\n<body>\n{body}\n</body>\n</html>\n",
        escape(title)
    )
}

/// Escape text for HTML element content
fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}
