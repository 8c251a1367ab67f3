//! Infrastructure layer: storage, services and configuration for the
//! procurement workflow.
//!
//! The domain crates decide; this crate loads what they need, holds the
//! locks, and persists the outcome.

pub mod approval;
pub mod config;
pub mod dashboard;
pub mod error;
pub mod ledger;
pub mod requests;
pub mod store;

#[cfg(test)]
mod test_support;

pub use approval::{ApprovalEngine, DecisionOutcome};
pub use dashboard::{CatalogStats, DashboardService, DashboardStats};
pub use error::{ProcurementError, ProcurementResult};
pub use ledger::{InventoryLedger, ItemAvailability};
pub use requests::{LineDetails, NewRequest, NewRequestLine, RequestDetails, RequestService};
