//! Derived stock math: on-hand minus what pending requests have claimed.
//!
//! Reservations are never stored. Callers scan the pending lines for an item,
//! hand them in as [`Reservation`]s and get a [`StockPosition`] back, so a
//! future explicit hold table only has to change where the slice comes from.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{Entity, ItemId, RequestId};

use crate::item::Item;
use crate::quantity::Quantity;

/// The implicit claim one pending request line places on an item.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct Reservation {
    pub request_id: RequestId,
    /// Creation time of the owning request; together with the id it fixes claim order.
    pub claimed_at: DateTime<Utc>,
    pub quantity: Quantity,
}

impl Reservation {
    /// Whether this claim was placed before the request `(request_id, claimed_at)`.
    ///
    /// Ties on the timestamp are broken by request id so the order is total.
    /// A request is never ahead of itself.
    pub fn is_ahead_of(&self, request_id: RequestId, claimed_at: DateTime<Utc>) -> bool {
        self.request_id != request_id
            && (self.claimed_at, self.request_id) < (claimed_at, request_id)
    }
}

/// Sum of every reservation.
pub fn reserved_total(reservations: &[Reservation]) -> i64 {
    reservations
        .iter()
        .map(|r| i64::from(r.quantity.get()))
        .sum()
}

/// Sum of the reservations that precede `(request_id, claimed_at)` in claim order.
pub fn reserved_ahead_of(
    reservations: &[Reservation],
    request_id: RequestId,
    claimed_at: DateTime<Utc>,
) -> i64 {
    reservations
        .iter()
        .filter(|r| r.is_ahead_of(request_id, claimed_at))
        .map(|r| i64::from(r.quantity.get()))
        .sum()
}

/// On-hand and reserved figures for one item at one instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct StockPosition {
    pub item_id: ItemId,
    pub on_hand: u32,
    pub reserved: i64,
}

impl StockPosition {
    /// Position as seen by an outside reader: every pending claim counts.
    pub fn from_reservations(item: &Item, reservations: &[Reservation]) -> Self {
        Self {
            item_id: *item.id(),
            on_hand: item.stock_quantity(),
            reserved: reserved_total(reservations),
        }
    }

    /// Position as seen by the request being decided.
    ///
    /// Only claims placed earlier count against it; its own lines and those of
    /// later requests do not.
    pub fn for_claim(
        item: &Item,
        reservations: &[Reservation],
        request_id: RequestId,
        claimed_at: DateTime<Utc>,
    ) -> Self {
        Self {
            item_id: *item.id(),
            on_hand: item.stock_quantity(),
            reserved: reserved_ahead_of(reservations, request_id, claimed_at),
        }
    }

    /// Not clamped: over-committed items report a negative figure.
    pub fn available(&self) -> i64 {
        i64::from(self.on_hand) - self.reserved
    }

    pub fn covers(&self, qty: Quantity) -> bool {
        self.available() >= i64::from(qty.get())
    }
}
