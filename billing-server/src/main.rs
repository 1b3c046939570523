use anyhow::Context;
use billing_server::auth::RoleAuthorizer;
use billing_server::{create_app, ServerConfig};
use billing_store::audit::PgAuditSink;
use billing_store::{DatabasePool, LedgerStore};
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = ServerConfig::from_env()?;
    info!(bind = %config.bind_addr, "starting billing ledger server");

    let pool = DatabasePool::new(&config.database_url)
        .await
        .context("failed to connect to the billing database")?;
    if config.run_migrations {
        pool.run_migrations()
            .await
            .context("failed to apply schema migrations")?;
    }

    let store = LedgerStore::new(pool.clone(), Arc::new(RoleAuthorizer))
        .with_audit_sink(Arc::new(PgAuditSink::new(pool.clone())))
        .with_config(config.store_config()?);

    let app = create_app(store);
    let listener = tokio::net::TcpListener::bind(config.bind_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.bind_addr))?;
    info!(addr = %config.bind_addr, "billing ledger server listening");

    axum::serve(listener, app)
        .await
        .context("http server error")?;
    pool.close().await;
    Ok(())
}
