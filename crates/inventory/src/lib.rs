//! Inventory domain module.
//!
//! Items carry the physical on-hand count; the ledger module derives how much
//! of it is already spoken for by pending procurement requests. Everything here
//! is deterministic domain logic (no IO, no HTTP, no storage).

pub mod item;
pub mod ledger;
pub mod quantity;

pub use item::Item;
pub use ledger::{Reservation, StockPosition};
pub use quantity::Quantity;
