//! Venue domain module.
//!
//! Venues are reference data for procurement: the only state that matters to
//! the approval workflow is whether a venue is still taking new requests.

pub mod venue;

pub use venue::{Venue, VenueStatus};
