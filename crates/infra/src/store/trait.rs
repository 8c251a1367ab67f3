use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use procura_core::{ItemId, RequestId, UserId, VenueId};
use procura_inventory::{Item, Quantity, Reservation};
use procura_procurement::ProcurementRequest;
use procura_venues::Venue;

use super::query::{Page, RequestQuery, RequestScope};

/// Identity record for requesters and approvers.
///
/// Only what the workflow displays; accounts live with the identity provider.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: UserId,
    pub name: String,
    pub email: String,
}

/// Request totals per status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestCounts {
    pub total: u64,
    pub pending: u64,
    pub approved: u64,
    pub rejected: u64,
}

/// Result of a conditional stock decrement.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StockDecrement {
    Applied { remaining: u32 },
    /// The guard `stock_quantity >= qty` failed; nothing was changed.
    Refused { on_hand: u32 },
}

/// Storage failure, distinct from every domain outcome.
///
/// Any of these aborts the surrounding unit of work; retrying the whole
/// operation is safe.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),

    #[error("storage conflict: {0}")]
    Conflict(String),

    #[error("corrupt record: {0}")]
    Corrupt(String),
}

/// Read/write access to venues, items, users and procurement requests.
///
/// ## Atomicity
///
/// - `insert_request` persists the header and every line, or nothing.
/// - `begin_decision` opens a unit of work holding an exclusive lock on the
///   request; see [`DecisionTx`].
///
/// ## Scope
///
/// `list_requests` and `request_counts` apply the requester scope inside the
/// query so totals and page boundaries never include foreign rows.
#[async_trait]
pub trait ProcurementStore: Send + Sync {
    async fn venue(&self, id: VenueId) -> Result<Option<Venue>, StoreError>;

    /// Active venues ordered by name.
    async fn active_venues(&self) -> Result<Vec<Venue>, StoreError>;

    async fn venue_count(&self) -> Result<u64, StoreError>;

    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError>;

    /// All items ordered by name.
    async fn items(&self) -> Result<Vec<Item>, StoreError>;

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError>;

    async fn request(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError>;

    async fn insert_request(&self, request: &ProcurementRequest) -> Result<(), StoreError>;

    /// Newest-created first (`created_at` desc, then id desc).
    async fn list_requests(
        &self,
        query: &RequestQuery,
    ) -> Result<Page<ProcurementRequest>, StoreError>;

    async fn request_counts(&self, scope: RequestScope) -> Result<RequestCounts, StoreError>;

    /// Claims of every pending request line referencing `item`.
    async fn reservations(&self, item: ItemId) -> Result<Vec<Reservation>, StoreError>;

    /// Lock `id` for a decision. `None` if the request does not exist.
    async fn begin_decision(
        &self,
        id: RequestId,
    ) -> Result<Option<Box<dyn DecisionTx>>, StoreError>;
}

/// Unit of work for one approval decision.
///
/// Holds the request exclusively from `begin_decision` until `commit` or drop.
/// Items passed to `lock_items` stay locked for the same span, so no other
/// decision can read or move their stock in between. Dropping without
/// `commit` discards every staged change.
#[async_trait]
pub trait DecisionTx: Send {
    /// The request as loaded under the lock.
    fn request(&self) -> &ProcurementRequest;

    /// Lock and load items. Implementations lock in ascending id order.
    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError>;

    /// Pending claims on `item`, as visible inside this unit of work.
    async fn reservations(&mut self, item: ItemId) -> Result<Vec<Reservation>, StoreError>;

    /// `stock_quantity -= qty` only if the result stays non-negative.
    async fn decrement_stock(
        &mut self,
        item: ItemId,
        qty: Quantity,
    ) -> Result<StockDecrement, StoreError>;

    /// Persist the decided request. Returns `false` if the stored row was no
    /// longer pending.
    async fn save_decision(&mut self, request: &ProcurementRequest) -> Result<bool, StoreError>;

    async fn commit(&mut self) -> Result<(), StoreError>;
}

#[async_trait]
impl<S> ProcurementStore for Arc<S>
where
    S: ProcurementStore + ?Sized,
{
    async fn venue(&self, id: VenueId) -> Result<Option<Venue>, StoreError> {
        (**self).venue(id).await
    }

    async fn active_venues(&self) -> Result<Vec<Venue>, StoreError> {
        (**self).active_venues().await
    }

    async fn venue_count(&self) -> Result<u64, StoreError> {
        (**self).venue_count().await
    }

    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        (**self).item(id).await
    }

    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        (**self).items().await
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        (**self).user(id).await
    }

    async fn request(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError> {
        (**self).request(id).await
    }

    async fn insert_request(&self, request: &ProcurementRequest) -> Result<(), StoreError> {
        (**self).insert_request(request).await
    }

    async fn list_requests(
        &self,
        query: &RequestQuery,
    ) -> Result<Page<ProcurementRequest>, StoreError> {
        (**self).list_requests(query).await
    }

    async fn request_counts(&self, scope: RequestScope) -> Result<RequestCounts, StoreError> {
        (**self).request_counts(scope).await
    }

    async fn reservations(&self, item: ItemId) -> Result<Vec<Reservation>, StoreError> {
        (**self).reservations(item).await
    }

    async fn begin_decision(
        &self,
        id: RequestId,
    ) -> Result<Option<Box<dyn DecisionTx>>, StoreError> {
        (**self).begin_decision(id).await
    }
}
