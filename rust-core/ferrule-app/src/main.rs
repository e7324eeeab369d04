//! # Ferrule
//!
//! Sample application: a landing page, a customer listing inside the
//! `instances` controller group and per-customer pages, served over one
//! database connection.
//!
//! Configuration is read from the TOML file named by `FERRULE_CONFIG`;
//! without it the built-in defaults apply (in-memory SQLite on
//! `127.0.0.1:8000`).

mod controllers;
mod models;

use anyhow::{Context, Result};
use ferrule_core::{
    ActiveRecord, AppConfig, AppContext, Database, Driver, LoggingMiddleware, Router, Server,
};
use models::Customer;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::EnvFilter;

const CONFIG_ENV: &str = "FERRULE_CONFIG";

#[tokio::main]
async fn main() -> Result<()> {
    let config = load_config()?;
    init_tracing(config.server.json_logs);

    let db = Database::connect(&config.database)
        .await
        .context("failed to open the database connection")?;
    if config.database.driver == Driver::Sqlite {
        bootstrap_sqlite(&db).await?;
    }

    let ctx = Arc::new(AppContext::new(db, config));
    let server = build_server(Arc::clone(&ctx));

    info!(version = ferrule_core::VERSION, "Starting Ferrule");
    let served = server.serve().await;
    ctx.db().close().await;
    served.context("server stopped with an error")
}

fn load_config() -> Result<AppConfig> {
    match std::env::var_os(CONFIG_ENV) {
        Some(path) => AppConfig::load(&path)
            .with_context(|| format!("failed to load {}", path.to_string_lossy())),
        None => Ok(AppConfig::default()),
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("ferrule=info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    let _ = if json {
        builder.json().try_init()
    } else {
        builder.try_init()
    };
}

fn build_server(ctx: Arc<AppContext>) -> Server {
    let mut router = Router::from_config(ctx.config());
    controllers::register(&mut router);

    let mut server = Server::new(router, ctx);
    server.add_middleware(LoggingMiddleware::new());
    server
}

/// Create the schema and seed a few customers into an empty database
async fn bootstrap_sqlite(db: &Database) -> Result<()> {
    db.execute(models::SQLITE_SCHEMA, &[])
        .await
        .context("failed to create the customers table")?;

    let existing = Customer::find_one(db, ferrule_core::Condition::None, None).await?;
    if existing.is_some() {
        return Ok(());
    }

    for (name, age, place, vip) in [
        ("Ada Lovelace", 36, Some("London"), true),
        ("Alan Turing", 41, Some("Maida Vale"), false),
        ("Grace Hopper", 85, None, false),
    ] {
        let mut customer = Customer::new(name, age);
        customer.place_of_birth = place.map(String::from);
        customer.vip = vip;
        customer.tags = vec!["pioneer".to_string()];
        customer.save(db).await?;
    }
    info!("Seeded sample customers");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn server() -> Server {
        let db = Database::connect_sqlite("sqlite::memory:").await.unwrap();
        bootstrap_sqlite(&db).await.unwrap();
        build_server(Arc::new(AppContext::new(db, AppConfig::default())))
    }

    #[tokio::test]
    async fn test_landing_page() {
        let server = server().await;

        for path in ["/", "/site", "/site/index", "/SITE/Index/"] {
            let res = server.test_request(path).await;
            assert_eq!(res.status, 200, "{path}");
            assert!(res.body.contains("<h1>Ferrule</h1>"));
        }
    }

    #[tokio::test]
    async fn test_group_listing() {
        let server = server().await;

        let res = server.test_request("/instances").await;
        assert_eq!(res.status, 200);
        let ada = res.body.find("Ada Lovelace").unwrap();
        let grace = res.body.find("Grace Hopper").unwrap();
        assert!(ada < grace);
        assert!(res.body.contains("/customer/show/1"));
        assert!(res.header("server-timing").is_some());
    }

    #[tokio::test]
    async fn test_customer_page() {
        let server = server().await;

        let res = server.test_request("/customer/show/2").await;
        assert_eq!(res.status, 200);
        assert!(res.body.contains("Alan Turing"));
        assert!(res.body.contains("Customer #2, age 41, born in Maida Vale"));

        let res = server.test_request("/customer/show/3").await;
        assert!(res.body.contains("born in unknown"));
    }

    #[tokio::test]
    async fn test_misses_are_404() {
        let server = server().await;

        for path in [
            "/customer/show/99",
            "/customer/show/abc",
            "/customer/show",
            "/customer/show/1/2",
            "/nowhere",
            "/customer/show/1.5",
            "/bad_path",
        ] {
            let res = server.test_request(path).await;
            assert_eq!(res.status, 404, "{path}");
            assert!(res.body.is_empty());
        }
    }

    #[tokio::test]
    async fn test_bootstrap_is_idempotent() {
        let db = Database::connect_sqlite("sqlite::memory:").await.unwrap();
        bootstrap_sqlite(&db).await.unwrap();
        bootstrap_sqlite(&db).await.unwrap();

        let all = Customer::find_all(&db, ferrule_core::Condition::None, None, None)
            .await
            .unwrap();
        assert_eq!(all.len(), 3);
        assert!(all.iter().all(|c| c.tags == ["pioneer"]));
    }
}
