//! Persistence boundary for the procurement workflow.
//!
//! The services in this crate only talk to [`ProcurementStore`]; the in-memory
//! implementation backs tests and local runs, the Postgres one production.

pub mod in_memory;
pub mod postgres;
pub mod query;
pub mod r#trait;

pub use in_memory::InMemoryProcurementStore;
pub use postgres::PostgresProcurementStore;
pub use query::{
    DEFAULT_PER_PAGE, MAX_PER_PAGE, Page, Pagination, RequestFilter, RequestQuery, RequestScope,
};
pub use r#trait::{DecisionTx, ProcurementStore, RequestCounts, StockDecrement, StoreError, User};
