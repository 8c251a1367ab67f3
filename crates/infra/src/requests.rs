//! Request creation and the read side (details, listing).

use std::collections::HashMap;

use chrono::{DateTime, NaiveDate, Utc};
use serde::Deserialize;
use tracing::{info, instrument};

use procura_core::{Aggregate, Entity, ItemId, LineId, RequestId, UserId, VenueId};
use procura_inventory::Item;
use procura_procurement::{
    NewLine, ProcurementCommand, ProcurementRequest, RequestLine, SubmitRequest,
};
use procura_venues::Venue;

use crate::error::{ProcurementError, ProcurementResult};
use crate::ledger::{InventoryLedger, ItemAvailability};
use crate::store::{Page, ProcurementStore, RequestQuery, RequestScope, StoreError, User};

/// Line as submitted by a requester; quantities are checked by the aggregate.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRequestLine {
    pub item_id: ItemId,
    pub quantity: u32,
    #[serde(default)]
    pub notes: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct NewRequest {
    pub venue_id: VenueId,
    pub request_date: NaiveDate,
    #[serde(default)]
    pub notes: Option<String>,
    pub lines: Vec<NewRequestLine>,
}

/// A line joined with its item and the item's current availability.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LineDetails {
    pub line: RequestLine,
    pub item: Item,
    pub available: i64,
}

/// A request joined with everything a reader needs to display it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RequestDetails {
    pub request: ProcurementRequest,
    pub venue: Venue,
    pub requester: Option<User>,
    pub approver: Option<User>,
    pub lines: Vec<LineDetails>,
}

#[derive(Debug, Clone)]
pub struct RequestService<S> {
    store: S,
    ledger: InventoryLedger<S>,
}

impl<S: ProcurementStore + Clone> RequestService<S> {
    pub fn new(store: S) -> Self {
        Self {
            ledger: InventoryLedger::new(store.clone()),
            store,
        }
    }

    /// Create a pending request with all its lines as one unit.
    ///
    /// No stock is touched; the new lines start counting as reservations the
    /// moment they are stored.
    #[instrument(
        skip(self, input),
        fields(requester = %requester, venue_id = %input.venue_id, line_count = input.lines.len())
    )]
    pub async fn create(
        &self,
        requester: UserId,
        input: NewRequest,
        today: NaiveDate,
        now: DateTime<Utc>,
    ) -> ProcurementResult<RequestDetails> {
        let venue = self.store.venue(input.venue_id).await?.ok_or_else(|| {
            ProcurementError::Validation(format!("venue {} does not exist", input.venue_id))
        })?;
        venue.ensure_accepts_requests()?;

        let mut unknown_items = Vec::new();
        for line in &input.lines {
            if !unknown_items.contains(&line.item_id)
                && self.store.item(line.item_id).await?.is_none()
            {
                unknown_items.push(line.item_id);
            }
        }

        let request_id = RequestId::new();
        let mut request = ProcurementRequest::empty(request_id);
        let events = request.handle(&ProcurementCommand::SubmitRequest(SubmitRequest {
            request_id,
            venue_id: input.venue_id,
            requested_by: requester,
            request_date: input.request_date,
            today,
            notes: input.notes,
            lines: input
                .lines
                .into_iter()
                .map(|l| NewLine {
                    line_id: LineId::new(),
                    item_id: l.item_id,
                    quantity: l.quantity,
                    notes: l.notes,
                })
                .collect(),
            unknown_items,
            occurred_at: now,
        }))?;

        for event in &events {
            request.apply(event);
        }
        self.store.insert_request(&request).await?;

        info!(request_id = %request_id, "procurement request submitted");
        self.resolver().details(request).await
    }

    /// Load one request. Out-of-scope requests read as missing.
    #[instrument(skip(self))]
    pub async fn get(&self, id: RequestId, scope: RequestScope) -> ProcurementResult<RequestDetails> {
        let request = self
            .store
            .request(id)
            .await?
            .filter(|r| r.header().is_some_and(|h| scope.permits(h.requested_by)))
            .ok_or_else(|| ProcurementError::not_found("procurement request", id))?;

        self.resolver().details(request).await
    }

    #[instrument(skip(self, query), fields(scope = ?query.scope))]
    pub async fn list(&self, query: &RequestQuery) -> ProcurementResult<Page<RequestDetails>> {
        let page = self.store.list_requests(query).await?;
        let mut resolver = self.resolver();

        let mut items = Vec::with_capacity(page.items.len());
        for request in page.items {
            items.push(resolver.details(request).await?);
        }
        Ok(Page::new(items, query.pagination, page.total_items))
    }

    /// Join an already loaded request, e.g. one just returned by a decision.
    pub async fn details(&self, request: ProcurementRequest) -> ProcurementResult<RequestDetails> {
        self.resolver().details(request).await
    }

    /// Active venues to offer on a new request.
    pub async fn active_venues(&self) -> ProcurementResult<Vec<Venue>> {
        Ok(self.store.active_venues().await?)
    }

    pub(crate) fn resolver(&self) -> Resolver<'_, S> {
        Resolver {
            store: &self.store,
            ledger: &self.ledger,
            venues: HashMap::new(),
            items: HashMap::new(),
            users: HashMap::new(),
        }
    }
}

/// Joins requests with venues, items and users, caching lookups for one call.
pub(crate) struct Resolver<'a, S> {
    store: &'a S,
    ledger: &'a InventoryLedger<S>,
    venues: HashMap<VenueId, Venue>,
    items: HashMap<ItemId, ItemAvailability>,
    users: HashMap<UserId, Option<User>>,
}

impl<S: ProcurementStore> Resolver<'_, S> {
    pub(crate) async fn details(
        &mut self,
        request: ProcurementRequest,
    ) -> ProcurementResult<RequestDetails> {
        let header = *request.header().ok_or_else(|| {
            StoreError::Corrupt(format!("request {} has no header", request.id_typed()))
        })?;

        let venue = self.venue(header.venue_id).await?;
        let requester = self.user(header.requested_by).await?;
        let approver = match request.approved_by() {
            Some(id) => self.user(id).await?,
            None => None,
        };

        let mut lines = Vec::with_capacity(request.lines().len());
        for line in request.lines() {
            let availability = self.item(line.item_id).await?;
            lines.push(LineDetails {
                line: line.clone(),
                item: availability.item.clone(),
                available: availability.position.available(),
            });
        }

        Ok(RequestDetails {
            request,
            venue,
            requester,
            approver,
            lines,
        })
    }

    async fn venue(&mut self, id: VenueId) -> ProcurementResult<Venue> {
        if let Some(venue) = self.venues.get(&id) {
            return Ok(venue.clone());
        }
        let venue = self
            .store
            .venue(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("venue {id} referenced but missing")))?;
        self.venues.insert(id, venue.clone());
        Ok(venue)
    }

    async fn item(&mut self, id: ItemId) -> ProcurementResult<ItemAvailability> {
        if let Some(found) = self.items.get(&id) {
            return Ok(found.clone());
        }
        let item = self
            .store
            .item(id)
            .await?
            .ok_or_else(|| StoreError::Corrupt(format!("item {id} referenced but missing")))?;
        let availability = self.ledger.position_of(item).await?;
        self.items.insert(*availability.item.id(), availability.clone());
        Ok(availability)
    }

    async fn user(&mut self, id: UserId) -> ProcurementResult<Option<User>> {
        if let Some(found) = self.users.get(&id) {
            return Ok(found.clone());
        }
        let user = self.store.user(id).await?;
        self.users.insert(id, user.clone());
        Ok(user)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Duration;
    use procura_inventory::Quantity;
    use procura_procurement::RequestStatus;
    use procura_venues::VenueStatus;

    use crate::store::{Pagination, RequestFilter};
    use crate::test_support::{at, today, Fixture};

    fn new_request(venue_id: VenueId, lines: &[(ItemId, u32)]) -> NewRequest {
        NewRequest {
            venue_id,
            request_date: today(),
            notes: Some("for the Saturday reception".to_string()),
            lines: lines
                .iter()
                .map(|(item_id, quantity)| NewRequestLine {
                    item_id: *item_id,
                    quantity: *quantity,
                    notes: None,
                })
                .collect(),
        }
    }

    fn expect_validation(err: ProcurementError, needle: &str) {
        match err {
            ProcurementError::Validation(msg) if msg.contains(needle) => {}
            other => panic!("expected validation mentioning {needle:?}, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn create_returns_pending_request_with_joined_details() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;
        let linen = f.item("Table Linen", 4).await;

        let details = f
            .requests
            .create(f.admin, new_request(f.venue, &[(chairs, 7), (linen, 1)]), today(), at(0))
            .await
            .unwrap();

        assert_eq!(details.request.status(), RequestStatus::Pending);
        assert_eq!(details.request.notes(), Some("for the Saturday reception"));
        assert_eq!(details.venue.name(), "Grand Ballroom Permata");
        assert_eq!(details.requester.as_ref().map(|u| u.name.as_str()), Some("Venue Admin"));
        assert!(details.approver.is_none());
        assert_eq!(details.lines.len(), 2);

        let chair_line = details.lines.iter().find(|l| l.line.item_id == chairs).unwrap();
        assert_eq!(chair_line.item.name(), "Tiffany Chair");
        assert_eq!(chair_line.line.quantity.get(), 7);
        assert_eq!(chair_line.available, 3);
    }

    #[tokio::test]
    async fn create_does_not_check_stock() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 2).await;

        let details = f
            .requests
            .create(f.admin, new_request(f.venue, &[(chairs, 50)]), today(), at(0))
            .await
            .unwrap();
        assert_eq!(details.lines[0].available, -48);
        assert_eq!(f.stock(chairs).await, 2);
    }

    #[tokio::test]
    async fn create_reports_preconditions_in_order() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;
        let ghost = ItemId::new();
        let closed = f.venue("Old Pavilion", VenueStatus::Inactive).await;

        let cases: Vec<(VenueId, Vec<(ItemId, u32)>, i64, &str)> = vec![
            (closed, vec![(ghost, 0)], 3, "not active"),
            (f.venue, vec![(ghost, 0)], 3, "before today"),
            (f.venue, vec![], 0, "at least one item"),
            (f.venue, vec![(chairs, 1), (ghost, 0), (chairs, 2)], 0, "quantity"),
            (f.venue, vec![(chairs, 1), (chairs, 2), (ghost, 1)], 0, "does not exist"),
            (f.venue, vec![(chairs, 1), (chairs, 2)], 0, "more than one line"),
            (f.venue, vec![(chairs, Quantity::MAX + 1)], 0, "at most"),
        ];
        for (venue, lines, days_back, needle) in cases {
            let mut input = new_request(venue, &lines);
            input.request_date = today() - Duration::days(days_back);
            let err = f.requests.create(f.admin, input, today(), at(0)).await.unwrap_err();
            expect_validation(err, needle);
        }
        assert_eq!(f.store.request_counts(RequestScope::All).await.unwrap().total, 0);
    }

    #[tokio::test]
    async fn create_rejects_bad_input() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;

        let mut past = new_request(f.venue, &[(chairs, 1)]);
        past.request_date = today() - Duration::days(1);
        expect_validation(
            f.requests.create(f.admin, past, today(), at(0)).await.unwrap_err(),
            "before today",
        );

        expect_validation(
            f.requests
                .create(f.admin, new_request(f.venue, &[]), today(), at(0))
                .await
                .unwrap_err(),
            "at least one item",
        );

        expect_validation(
            f.requests
                .create(f.admin, new_request(f.venue, &[(chairs, 0)]), today(), at(0))
                .await
                .unwrap_err(),
            "quantity",
        );

        expect_validation(
            f.requests
                .create(f.admin, new_request(f.venue, &[(chairs, 1), (chairs, 2)]), today(), at(0))
                .await
                .unwrap_err(),
            "more than one line",
        );

        expect_validation(
            f.requests
                .create(f.admin, new_request(f.venue, &[(ItemId::new(), 1)]), today(), at(0))
                .await
                .unwrap_err(),
            "does not exist",
        );

        expect_validation(
            f.requests
                .create(f.admin, new_request(VenueId::new(), &[(chairs, 1)]), today(), at(0))
                .await
                .unwrap_err(),
            "does not exist",
        );

        let closed = f.venue("Old Pavilion", VenueStatus::Inactive).await;
        expect_validation(
            f.requests
                .create(f.admin, new_request(closed, &[(chairs, 1)]), today(), at(0))
                .await
                .unwrap_err(),
            "not active",
        );

        let page = f
            .requests
            .list(&RequestQuery::new(RequestScope::All))
            .await
            .unwrap();
        assert_eq!(page.total_items, 0);
    }

    #[tokio::test]
    async fn get_hides_foreign_requests_from_owner_scope() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;
        let someone_else = UserId::new();
        let id = f.submit_as(someone_else, &[(chairs, 1)], 0).await;

        let err = f
            .requests
            .get(id, RequestScope::OwnedBy(f.admin))
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::NotFound(_)));

        let seen = f.requests.get(id, RequestScope::All).await.unwrap();
        assert_eq!(seen.request.id_typed(), id);
        assert!(seen.requester.is_none());

        let err = f
            .requests
            .get(RequestId::new(), RequestScope::All)
            .await
            .unwrap_err();
        assert!(matches!(err, ProcurementError::NotFound(_)));
    }

    #[tokio::test]
    async fn list_never_leaks_other_requesters() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 100).await;
        let other = UserId::new();
        for i in 0..7 {
            let who = if i % 3 == 0 { other } else { f.admin };
            f.submit_as(who, &[(chairs, 1)], i).await;
        }

        for per_page in 1..=4 {
            let mut page_no = 1;
            let mut seen = 0;
            loop {
                let query = RequestQuery::new(RequestScope::OwnedBy(f.admin))
                    .with_filter(RequestFilter {
                        venue_name_contains: Some("permata".to_string()),
                        request_date: Some(today()),
                    })
                    .with_pagination(Pagination {
                        page: page_no,
                        per_page,
                    });
                let page = f.requests.list(&query).await.unwrap();
                assert_eq!(page.total_items, 4);
                assert!(page
                    .items
                    .iter()
                    .all(|d| d.request.header().unwrap().requested_by == f.admin));
                seen += page.items.len();
                if !page.has_more() {
                    break;
                }
                page_no += 1;
            }
            assert_eq!(seen, 4);
        }
    }

    #[tokio::test]
    async fn details_show_approver_once_decided() {
        use procura_procurement::{ApprovalGrant, Decision};

        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;
        let id = f.submit(&[(chairs, 4)], 0).await;

        f.approvals
            .decide(id, Decision::Approve, ApprovalGrant::confirmed(f.approver), None, at(60))
            .await
            .unwrap();

        let details = f.requests.get(id, RequestScope::OwnedBy(f.admin)).await.unwrap();
        let loaded = f.store.request(id).await.unwrap().unwrap();
        assert_eq!(f.requests.details(loaded).await.unwrap(), details);
        assert_eq!(details.approver.map(|u| u.name), Some("Super Admin".to_string()));
        assert_eq!(details.lines[0].available, 6);
    }
}
