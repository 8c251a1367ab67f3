use std::sync::Arc;

use procura_infra::{
    ApprovalEngine, DashboardService, InventoryLedger, RequestService,
    config::ListingSettings,
    store::{InMemoryProcurementStore, ProcurementStore},
};

/// Store handle shared by every service.
pub type SharedStore = Arc<dyn ProcurementStore>;

/// Service wiring for the HTTP layer.
pub struct AppServices {
    pub requests: RequestService<SharedStore>,
    pub approvals: ApprovalEngine<SharedStore>,
    pub ledger: InventoryLedger<SharedStore>,
    pub dashboard: DashboardService<SharedStore>,
    pub listing: ListingSettings,
}

impl AppServices {
    pub fn new(store: SharedStore, listing: ListingSettings, low_stock_threshold: u32) -> Self {
        Self {
            requests: RequestService::new(store.clone()),
            approvals: ApprovalEngine::new(store.clone()),
            ledger: InventoryLedger::new(store.clone()),
            dashboard: DashboardService::new(store, low_stock_threshold),
            listing,
        }
    }
}

/// Services over an empty in-memory store with default settings.
pub fn build_services() -> AppServices {
    AppServices::new(
        Arc::new(InMemoryProcurementStore::new()),
        ListingSettings::default(),
        10,
    )
}
