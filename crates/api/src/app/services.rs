use std::sync::Arc;

use anyhow::Context;
use serde_json::Value as JsonValue;
use sqlx::PgPool;

use stockflow_events::{EventEnvelope, InMemoryEventBus};
use stockflow_infra::{
    InMemoryStockStore, InMemoryWarehouseDirectory, PostgresStockStore, ServiceConfig, StockMoveService,
    StockStore,
};

pub type AppBus = Arc<InMemoryEventBus<EventEnvelope<JsonValue>>>;

/// Services shared by all handlers.
pub struct AppServices {
    pub moves: StockMoveService<AppBus>,
}

impl AppServices {
    pub fn new(moves: StockMoveService<AppBus>) -> Self {
        Self { moves }
    }

    /// In-memory wiring around a given warehouse directory (tests/dev).
    pub fn in_memory(warehouses: InMemoryWarehouseDirectory, config: ServiceConfig) -> Self {
        Self::new(StockMoveService::new(
            Arc::new(InMemoryStockStore::new()),
            Arc::new(warehouses),
            Arc::new(InMemoryEventBus::new()),
            config,
        ))
    }
}

/// Wire services from the environment.
///
/// - `USE_PERSISTENT_STORES=true` selects Postgres (`DATABASE_URL` required)
/// - `WAREHOUSES=wh:branch,...` seeds the warehouse directory
/// - `MOVE_NO_MAX_ATTEMPTS`, `ALLOW_NEGATIVE_ADJUSTMENTS` tune the service
pub async fn build_services() -> anyhow::Result<AppServices> {
    let config = ServiceConfig::from_env();

    let warehouses = match std::env::var("WAREHOUSES") {
        Ok(raw) => InMemoryWarehouseDirectory::parse(&raw).context("invalid WAREHOUSES")?,
        Err(_) => {
            tracing::warn!("WAREHOUSES not set; every warehouse reference will be rejected");
            InMemoryWarehouseDirectory::new()
        }
    };

    let use_persistent = std::env::var("USE_PERSISTENT_STORES")
        .unwrap_or_else(|_| "false".to_string())
        .parse::<bool>()
        .unwrap_or(false);

    let store: Arc<dyn StockStore> = if use_persistent {
        let database_url = std::env::var("DATABASE_URL")
            .context("DATABASE_URL must be set when USE_PERSISTENT_STORES=true")?;
        let pool = PgPool::connect(&database_url)
            .await
            .context("failed to connect to Postgres")?;

        let store = PostgresStockStore::new(pool);
        store.ensure_schema().await.context("failed to apply schema")?;
        tracing::info!("using Postgres stock store");
        Arc::new(store)
    } else {
        tracing::info!("using in-memory stock store");
        Arc::new(InMemoryStockStore::new())
    };

    Ok(AppServices::new(StockMoveService::new(
        store,
        Arc::new(warehouses),
        Arc::new(InMemoryEventBus::new()),
        config,
    )))
}
