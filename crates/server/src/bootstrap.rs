use std::sync::Arc;

use cartkeeper_agent::{
    CartSessionCoordinator, CatalogService, EndpointError, HttpCommerceClient, KeywordDialogue,
    ShoppingAgent,
};
use cartkeeper_core::config::{AppConfig, ConfigError, LoadOptions};
use cartkeeper_core::Catalog;
use cartkeeper_db::{
    connect_with_settings, migrations, DbPool, SqlCartRepository, SqlConversationRepository,
};
use thiserror::Error;
use tracing::{info, warn};

pub struct Application {
    pub config: AppConfig,
    pub db_pool: DbPool,
    pub agent: Arc<ShoppingAgent>,
}

#[derive(Debug, Error)]
pub enum BootstrapError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("database connection failed: {0}")]
    DatabaseConnect(#[source] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[source] sqlx::migrate::MigrateError),
    #[error("commerce client could not be built: {0}")]
    Commerce(#[source] EndpointError),
}

pub async fn bootstrap(options: LoadOptions) -> Result<Application, BootstrapError> {
    let config = AppConfig::load(options)?;
    bootstrap_with_config(config).await
}

pub async fn bootstrap_with_config(config: AppConfig) -> Result<Application, BootstrapError> {
    info!(
        event_name = "system.bootstrap.start",
        correlation_id = "bootstrap",
        "starting application bootstrap"
    );

    let db_pool = connect_with_settings(
        &config.database.url,
        config.database.max_connections,
        config.database.timeout_secs,
    )
    .await
    .map_err(BootstrapError::DatabaseConnect)?;
    info!(
        event_name = "system.bootstrap.database_connected",
        correlation_id = "bootstrap",
        "database connection established"
    );

    migrations::run_pending(&db_pool).await.map_err(BootstrapError::Migration)?;
    info!(
        event_name = "system.bootstrap.migrations_applied",
        correlation_id = "bootstrap",
        "database migrations applied"
    );

    let commerce = HttpCommerceClient::from_config(&config.commerce)
        .map_err(BootstrapError::Commerce)?;
    let commerce = Arc::new(commerce);
    let dialogue = KeywordDialogue::new(startup_catalog(&*commerce).await);

    let coordinator = CartSessionCoordinator::from_config(
        &config,
        Arc::new(SqlCartRepository::new(db_pool.clone())),
        Arc::new(SqlConversationRepository::new(db_pool.clone())),
        commerce,
    );
    let agent = Arc::new(ShoppingAgent::new(Arc::new(coordinator), Arc::new(dialogue)));

    Ok(Application { config, db_pool, agent })
}

/// The built-in dialogue only recognizes products it was given here. A catalog
/// outage at startup leaves it with product-free routing.
async fn startup_catalog(catalog: &dyn CatalogService) -> Catalog {
    match catalog.fetch_catalog().await {
        Ok(catalog) => {
            info!(
                event_name = "system.bootstrap.catalog_loaded",
                correlation_id = "bootstrap",
                products = catalog.products().len(),
                "catalog loaded for dialogue routing"
            );
            catalog
        }
        Err(error) => {
            warn!(
                event_name = "system.bootstrap.catalog_unavailable",
                correlation_id = "bootstrap",
                error = %error,
                "starting without a catalog"
            );
            Catalog::default()
        }
    }
}
