//! Wire services from an `InfraConfig`.

use std::sync::Arc;

use anyhow::Context;

use wareflow_events::InMemoryEventBus;

use crate::catalog::{InMemoryCatalog, InventoryCatalog};
use crate::config::{InfraConfig, StoreBackend};
use crate::requisition_service::{RequisitionEnvelope, RequisitionService};
use crate::store::{InMemoryStore, PostgresStore, Store};
use crate::workflow_service::WorkflowService;

pub type SharedStore = Arc<dyn Store>;
pub type SharedCatalog = Arc<dyn InventoryCatalog>;
pub type SharedBus = Arc<InMemoryEventBus<RequisitionEnvelope>>;

pub type Requisitions = RequisitionService<SharedStore, SharedCatalog, SharedBus>;
pub type Workflows = WorkflowService<SharedStore>;

#[derive(Clone)]
pub struct Services {
    pub workflows: Arc<Workflows>,
    pub requisitions: Arc<Requisitions>,
    pub store: SharedStore,
    pub bus: SharedBus,
}

/// Build the service graph. The Postgres backend connects and runs pending
/// migrations before returning.
pub async fn build_services(config: &InfraConfig, catalog: SharedCatalog) -> anyhow::Result<Services> {
    let store: SharedStore = match config.store {
        StoreBackend::Memory => {
            tracing::info!("using in-memory store");
            Arc::new(InMemoryStore::new())
        }
        StoreBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .context("DATABASE_URL is required for the postgres store")?;
            let store = PostgresStore::connect(url)
                .await
                .context("connecting to postgres")?;
            store.migrate().await.context("running migrations")?;
            tracing::info!("using postgres store");
            Arc::new(store)
        }
    };

    Ok(services_with(store, catalog, config))
}

/// In-memory store and catalog; used by tests and local runs.
pub fn in_memory(config: &InfraConfig) -> (Services, Arc<InMemoryCatalog>) {
    let catalog = Arc::new(InMemoryCatalog::new());
    let store: SharedStore = Arc::new(InMemoryStore::new());
    let services = services_with(store, catalog.clone(), config);
    (services, catalog)
}

fn services_with(store: SharedStore, catalog: SharedCatalog, config: &InfraConfig) -> Services {
    let bus: SharedBus = Arc::new(InMemoryEventBus::new());
    Services {
        workflows: Arc::new(WorkflowService::new(store.clone())),
        requisitions: Arc::new(RequisitionService::new(
            store.clone(),
            catalog,
            bus.clone(),
            config,
        )),
        store,
        bus,
    }
}
