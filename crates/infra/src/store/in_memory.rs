use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::{Mutex, OwnedMutexGuard};

use procura_core::{AggregateRoot, Entity, ExpectedVersion, ItemId, RequestId, UserId, VenueId};
use procura_inventory::{Item, Quantity, Reservation};
use procura_procurement::ProcurementRequest;
use procura_venues::Venue;

use super::query::{Page, RequestQuery, RequestScope};
use super::r#trait::{DecisionTx, ProcurementStore, RequestCounts, StockDecrement, StoreError, User};

#[derive(Debug, Default)]
struct State {
    venues: HashMap<VenueId, Venue>,
    items: HashMap<ItemId, Item>,
    users: HashMap<UserId, User>,
    requests: HashMap<RequestId, ProcurementRequest>,
}

impl State {
    fn reservations(&self, item: ItemId) -> Vec<Reservation> {
        self.requests
            .values()
            .flat_map(|r| r.reservations())
            .filter(|(item_id, _)| *item_id == item)
            .map(|(_, reservation)| reservation)
            .collect()
    }

    fn venue_name_matches(&self, request: &ProcurementRequest, needle: Option<&str>) -> bool {
        let Some(needle) = needle else {
            return true;
        };
        request
            .header()
            .and_then(|h| self.venues.get(&h.venue_id))
            .is_some_and(|v| v.name().to_lowercase().contains(needle))
    }
}

/// In-memory store for tests and local runs.
///
/// One async mutex guards all state. A decision holds it from
/// `begin_decision` until commit or drop, which makes decisions fully
/// serialized; plain reads wait for an in-flight decision to finish.
#[derive(Debug, Clone, Default)]
pub struct InMemoryProcurementStore {
    state: Arc<Mutex<State>>,
}

impl InMemoryProcurementStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn put_venue(&self, venue: Venue) {
        self.state.lock().await.venues.insert(*venue.id(), venue);
    }

    pub async fn put_item(&self, item: Item) {
        self.state.lock().await.items.insert(*item.id(), item);
    }

    pub async fn put_user(&self, user: User) {
        self.state.lock().await.users.insert(user.id, user);
    }
}

#[async_trait]
impl ProcurementStore for InMemoryProcurementStore {
    async fn venue(&self, id: VenueId) -> Result<Option<Venue>, StoreError> {
        Ok(self.state.lock().await.venues.get(&id).cloned())
    }

    async fn active_venues(&self) -> Result<Vec<Venue>, StoreError> {
        let state = self.state.lock().await;
        let mut venues: Vec<Venue> = state
            .venues
            .values()
            .filter(|v| v.is_active())
            .cloned()
            .collect();
        venues.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(venues)
    }

    async fn venue_count(&self) -> Result<u64, StoreError> {
        Ok(self.state.lock().await.venues.len() as u64)
    }

    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        Ok(self.state.lock().await.items.get(&id).cloned())
    }

    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        let state = self.state.lock().await;
        let mut items: Vec<Item> = state.items.values().cloned().collect();
        items.sort_by(|a, b| a.name().cmp(b.name()));
        Ok(items)
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        Ok(self.state.lock().await.users.get(&id).cloned())
    }

    async fn request(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError> {
        Ok(self.state.lock().await.requests.get(&id).cloned())
    }

    async fn insert_request(&self, request: &ProcurementRequest) -> Result<(), StoreError> {
        if request.header().is_none() {
            return Err(StoreError::Corrupt(format!(
                "request {} has not been submitted",
                request.id_typed()
            )));
        }

        let mut state = self.state.lock().await;
        if state.requests.contains_key(request.id()) {
            return Err(StoreError::Conflict(format!(
                "request {} already exists",
                request.id_typed()
            )));
        }
        state.requests.insert(request.id_typed(), request.clone());
        Ok(())
    }

    async fn list_requests(
        &self,
        query: &RequestQuery,
    ) -> Result<Page<ProcurementRequest>, StoreError> {
        let state = self.state.lock().await;
        let needle = query.filter.venue_needle().map(str::to_lowercase);

        let mut matching: Vec<&ProcurementRequest> = state
            .requests
            .values()
            .filter(|r| {
                let Some(header) = r.header() else {
                    return false;
                };
                query.scope.permits(header.requested_by)
                    && query
                        .filter
                        .request_date
                        .is_none_or(|d| d == header.request_date)
                    && state.venue_name_matches(r, needle.as_deref())
            })
            .collect();

        matching.sort_by_key(|r| {
            std::cmp::Reverse((r.header().map(|h| h.created_at), r.id_typed()))
        });

        let total = matching.len() as u64;
        let items = matching
            .into_iter()
            .skip(query.pagination.offset() as usize)
            .take(query.pagination.limit() as usize)
            .cloned()
            .collect();

        Ok(Page::new(items, query.pagination, total))
    }

    async fn request_counts(&self, scope: RequestScope) -> Result<RequestCounts, StoreError> {
        use procura_procurement::RequestStatus;

        let state = self.state.lock().await;
        let mut counts = RequestCounts::default();
        for request in state.requests.values() {
            let Some(header) = request.header() else {
                continue;
            };
            if !scope.permits(header.requested_by) {
                continue;
            }
            counts.total += 1;
            match request.status() {
                RequestStatus::Pending => counts.pending += 1,
                RequestStatus::Approved => counts.approved += 1,
                RequestStatus::Rejected => counts.rejected += 1,
            }
        }
        Ok(counts)
    }

    async fn reservations(&self, item: ItemId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.state.lock().await.reservations(item))
    }

    async fn begin_decision(
        &self,
        id: RequestId,
    ) -> Result<Option<Box<dyn DecisionTx>>, StoreError> {
        let guard = self.state.clone().lock_owned().await;
        let Some(request) = guard.requests.get(&id).cloned() else {
            return Ok(None);
        };

        Ok(Some(Box::new(InMemoryDecisionTx {
            guard,
            request,
            staged_items: HashMap::new(),
            staged_request: None,
        })))
    }
}

/// Decision unit of work over the whole-store lock.
///
/// Writes go to the staging maps and reach the shared state only on commit.
struct InMemoryDecisionTx {
    guard: OwnedMutexGuard<State>,
    request: ProcurementRequest,
    staged_items: HashMap<ItemId, Item>,
    staged_request: Option<ProcurementRequest>,
}

impl InMemoryDecisionTx {
    fn current_item(&self, id: ItemId) -> Result<Item, StoreError> {
        self.staged_items
            .get(&id)
            .or_else(|| self.guard.items.get(&id))
            .cloned()
            .ok_or_else(|| StoreError::Corrupt(format!("item {id} referenced but missing")))
    }
}

#[async_trait]
impl DecisionTx for InMemoryDecisionTx {
    fn request(&self) -> &ProcurementRequest {
        &self.request
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        let mut ids = ids.to_vec();
        ids.sort();
        ids.dedup();
        ids.into_iter().map(|id| self.current_item(id)).collect()
    }

    async fn reservations(&mut self, item: ItemId) -> Result<Vec<Reservation>, StoreError> {
        Ok(self.guard.reservations(item))
    }

    async fn decrement_stock(
        &mut self,
        item: ItemId,
        qty: Quantity,
    ) -> Result<StockDecrement, StoreError> {
        let mut current = self.current_item(item)?;
        match current.decrement_stock(qty) {
            Ok(()) => {
                let remaining = current.stock_quantity();
                self.staged_items.insert(item, current);
                Ok(StockDecrement::Applied { remaining })
            }
            Err(_) => Ok(StockDecrement::Refused {
                on_hand: current.stock_quantity(),
            }),
        }
    }

    async fn save_decision(&mut self, request: &ProcurementRequest) -> Result<bool, StoreError> {
        let Some(stored) = self.guard.requests.get(request.id()) else {
            return Err(StoreError::Corrupt(format!(
                "request {} vanished during decision",
                request.id_typed()
            )));
        };
        if !stored.is_pending() {
            return Ok(false);
        }
        ExpectedVersion::Exact(request.version().saturating_sub(1))
            .check(stored.version())
            .map_err(|e| StoreError::Conflict(e.to_string()))?;

        self.staged_request = Some(request.clone());
        Ok(true)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let items: Vec<Item> = self.staged_items.drain().map(|(_, item)| item).collect();
        for item in items {
            self.guard.items.insert(*item.id(), item);
        }
        if let Some(request) = self.staged_request.take() {
            self.guard.requests.insert(request.id_typed(), request);
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Duration, NaiveDate, Utc};
    use procura_core::{Aggregate, LineId};
    use procura_procurement::{NewLine, ProcurementCommand, SubmitRequest};
    use procura_venues::VenueStatus;

    use crate::store::query::{Pagination, RequestFilter};

    fn venue(name: &str) -> Venue {
        Venue::new(VenueId::new(), name, None, None, VenueStatus::Active).unwrap()
    }

    fn item(stock: u32) -> Item {
        Item::new(ItemId::new(), "Genset 50 KVA", None, "pcs", stock).unwrap()
    }

    fn submitted(
        venue_id: VenueId,
        requested_by: UserId,
        item_id: ItemId,
        qty: u32,
        request_date: NaiveDate,
        offset_secs: i64,
    ) -> ProcurementRequest {
        let id = RequestId::new();
        let now = Utc::now() + Duration::seconds(offset_secs);
        let cmd = SubmitRequest {
            request_id: id,
            venue_id,
            requested_by,
            request_date,
            today: request_date,
            notes: None,
            lines: vec![NewLine {
                line_id: LineId::new(),
                item_id,
                quantity: qty,
                notes: None,
            }],
            unknown_items: Vec::new(),
            occurred_at: now,
        };
        let events = ProcurementRequest::empty(id)
            .handle(&ProcurementCommand::SubmitRequest(cmd))
            .unwrap();
        ProcurementRequest::from_history(id, &events)
    }

    #[tokio::test]
    async fn listing_scopes_before_paging_and_sorts_newest_first() {
        let store = InMemoryProcurementStore::new();
        let v = venue("Garden Paradise Wedding");
        let stock = item(100);
        store.put_venue(v.clone()).await;
        store.put_item(stock.clone()).await;

        let me = UserId::new();
        let other = UserId::new();
        let today = Utc::now().date_naive();

        for i in 0..5 {
            let owner = if i % 2 == 0 { me } else { other };
            let r = submitted(*v.id(), owner, *stock.id(), 1, today, i);
            store.insert_request(&r).await.unwrap();
        }

        let query = RequestQuery::new(RequestScope::OwnedBy(me))
            .with_pagination(Pagination { page: 1, per_page: 2 });
        let first = store.list_requests(&query).await.unwrap();
        assert_eq!(first.total_items, 3);
        assert_eq!(first.total_pages, 2);
        assert_eq!(first.items.len(), 2);

        let second = store
            .list_requests(&query.clone().with_pagination(Pagination { page: 2, per_page: 2 }))
            .await
            .unwrap();
        assert_eq!(second.items.len(), 1);

        let all: Vec<_> = first.items.iter().chain(second.items.iter()).collect();
        assert!(all.iter().all(|r| r.header().unwrap().requested_by == me));
        let created: Vec<_> = all.iter().map(|r| r.header().unwrap().created_at).collect();
        assert!(created.windows(2).all(|w| w[0] >= w[1]));
    }

    #[tokio::test]
    async fn listing_filters_by_venue_substring_and_exact_date() {
        let store = InMemoryProcurementStore::new();
        let grand = venue("Grand Ballroom Permata");
        let garden = venue("Garden Paradise Wedding");
        let stock = item(100);
        store.put_venue(grand.clone()).await;
        store.put_venue(garden.clone()).await;
        store.put_item(stock.clone()).await;

        let user = UserId::new();
        let today = Utc::now().date_naive();
        let later = today + Duration::days(7);
        store
            .insert_request(&submitted(*grand.id(), user, *stock.id(), 1, today, 0))
            .await
            .unwrap();
        store
            .insert_request(&submitted(*garden.id(), user, *stock.id(), 1, later, 1))
            .await
            .unwrap();

        let by_venue = RequestQuery::new(RequestScope::All).with_filter(RequestFilter {
            venue_name_contains: Some("BALLROOM".to_string()),
            request_date: None,
        });
        let page = store.list_requests(&by_venue).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].header().unwrap().venue_id, *grand.id());

        let by_date = RequestQuery::new(RequestScope::All).with_filter(RequestFilter {
            venue_name_contains: None,
            request_date: Some(later),
        });
        let page = store.list_requests(&by_date).await.unwrap();
        assert_eq!(page.total_items, 1);
        assert_eq!(page.items[0].header().unwrap().venue_id, *garden.id());
    }

    #[tokio::test]
    async fn dropped_decision_discards_staged_stock() {
        let store = InMemoryProcurementStore::new();
        let v = venue("Grand Ballroom Permata");
        let stock = item(10);
        store.put_venue(v.clone()).await;
        store.put_item(stock.clone()).await;
        let r = submitted(*v.id(), UserId::new(), *stock.id(), 4, Utc::now().date_naive(), 0);
        store.insert_request(&r).await.unwrap();

        {
            let mut tx = store.begin_decision(r.id_typed()).await.unwrap().unwrap();
            let outcome = tx
                .decrement_stock(*stock.id(), Quantity::new(4).unwrap())
                .await
                .unwrap();
            assert_eq!(outcome, StockDecrement::Applied { remaining: 6 });
        }

        let after = store.item(*stock.id()).await.unwrap().unwrap();
        assert_eq!(after.stock_quantity(), 10);
    }

    #[tokio::test]
    async fn conditional_decrement_refuses_to_go_negative() {
        let store = InMemoryProcurementStore::new();
        let v = venue("Grand Ballroom Permata");
        let stock = item(3);
        store.put_venue(v.clone()).await;
        store.put_item(stock.clone()).await;
        let r = submitted(*v.id(), UserId::new(), *stock.id(), 5, Utc::now().date_naive(), 0);
        store.insert_request(&r).await.unwrap();

        let mut tx = store.begin_decision(r.id_typed()).await.unwrap().unwrap();
        let outcome = tx
            .decrement_stock(*stock.id(), Quantity::new(5).unwrap())
            .await
            .unwrap();
        assert_eq!(outcome, StockDecrement::Refused { on_hand: 3 });
        tx.commit().await.unwrap();
        drop(tx);

        assert_eq!(store.item(*stock.id()).await.unwrap().unwrap().stock_quantity(), 3);
    }

    #[tokio::test]
    async fn missing_request_opens_no_decision() {
        let store = InMemoryProcurementStore::new();
        assert!(store.begin_decision(RequestId::new()).await.unwrap().is_none());
    }
}
