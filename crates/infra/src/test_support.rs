//! Shared fixtures for service tests.

use chrono::{DateTime, Duration, NaiveDate, TimeZone, Utc};

use procura_core::{Entity, ItemId, RequestId, UserId, VenueId};
use procura_inventory::Item;
use procura_venues::{Venue, VenueStatus};

use crate::approval::ApprovalEngine;
use crate::requests::{NewRequest, NewRequestLine, RequestService};
use crate::store::{InMemoryProcurementStore, User};

pub(crate) struct Fixture {
    pub store: InMemoryProcurementStore,
    pub requests: RequestService<InMemoryProcurementStore>,
    pub approvals: ApprovalEngine<InMemoryProcurementStore>,
    pub venue: VenueId,
    pub admin: UserId,
    pub approver: UserId,
}

pub(crate) fn today() -> NaiveDate {
    NaiveDate::from_ymd_opt(2025, 6, 1).unwrap()
}

pub(crate) fn at(offset_secs: i64) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2025, 6, 1, 9, 0, 0).unwrap() + Duration::seconds(offset_secs)
}

impl Fixture {
    pub async fn new() -> Self {
        let store = InMemoryProcurementStore::new();
        let venue = Venue::new(
            VenueId::new(),
            "Grand Ballroom Permata",
            Some("Jl. Sudirman 1".to_string()),
            None,
            VenueStatus::Active,
        )
        .unwrap();
        let venue_id = *venue.id();
        store.put_venue(venue).await;

        let admin = UserId::new();
        let approver = UserId::new();
        store
            .put_user(User {
                id: admin,
                name: "Venue Admin".to_string(),
                email: "admin@example.com".to_string(),
            })
            .await;
        store
            .put_user(User {
                id: approver,
                name: "Super Admin".to_string(),
                email: "super@example.com".to_string(),
            })
            .await;

        Self {
            requests: RequestService::new(store.clone()),
            approvals: ApprovalEngine::new(store.clone()),
            store,
            venue: venue_id,
            admin,
            approver,
        }
    }

    pub async fn item(&self, name: &str, stock: u32) -> ItemId {
        let item = Item::new(ItemId::new(), name, None, "pcs", stock).unwrap();
        let id = *item.id();
        self.store.put_item(item).await;
        id
    }

    pub async fn venue(&self, name: &str, status: VenueStatus) -> VenueId {
        let venue = Venue::new(VenueId::new(), name, None, None, status).unwrap();
        let id = *venue.id();
        self.store.put_venue(venue).await;
        id
    }

    /// Submit a request for `lines` as `requester`, created `offset_secs`
    /// after the fixture's base instant.
    pub async fn submit_as(
        &self,
        requester: UserId,
        lines: &[(ItemId, u32)],
        offset_secs: i64,
    ) -> RequestId {
        self.requests
            .create(
                requester,
                NewRequest {
                    venue_id: self.venue,
                    request_date: today(),
                    notes: None,
                    lines: lines
                        .iter()
                        .map(|(item_id, quantity)| NewRequestLine {
                            item_id: *item_id,
                            quantity: *quantity,
                            notes: None,
                        })
                        .collect(),
                },
                today(),
                at(offset_secs),
            )
            .await
            .unwrap()
            .request
            .id_typed()
    }

    pub async fn submit(&self, lines: &[(ItemId, u32)], offset_secs: i64) -> RequestId {
        self.submit_as(self.admin, lines, offset_secs).await
    }

    pub async fn stock(&self, item: ItemId) -> u32 {
        use crate::store::ProcurementStore;
        self.store.item(item).await.unwrap().unwrap().stock_quantity()
    }
}
