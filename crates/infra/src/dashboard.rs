//! Dashboard figures, scoped to what the caller may see.

use serde::Serialize;
use tracing::instrument;

use crate::error::ProcurementResult;
use crate::ledger::InventoryLedger;
use crate::requests::{RequestDetails, RequestService};
use crate::store::{Pagination, ProcurementStore, RequestCounts, RequestQuery, RequestScope};

/// How many recent requests the dashboard shows.
pub const RECENT_REQUESTS: u32 = 5;

/// Catalog figures shown only to callers who see every request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CatalogStats {
    pub total_venues: u64,
    pub total_items: u64,
    /// Items whose on-hand count is below the low-stock threshold.
    pub low_stock_items: u64,
}

#[derive(Debug, Clone)]
pub struct DashboardStats {
    pub counts: RequestCounts,
    pub catalog: Option<CatalogStats>,
    pub recent_requests: Vec<RequestDetails>,
}

#[derive(Debug, Clone)]
pub struct DashboardService<S> {
    store: S,
    requests: RequestService<S>,
    low_stock_threshold: u32,
}

impl<S: ProcurementStore + Clone> DashboardService<S> {
    pub fn new(store: S, low_stock_threshold: u32) -> Self {
        Self {
            requests: RequestService::new(store.clone()),
            store,
            low_stock_threshold,
        }
    }

    #[instrument(skip(self))]
    pub async fn stats(&self, scope: RequestScope) -> ProcurementResult<DashboardStats> {
        let counts = self.store.request_counts(scope).await?;

        let catalog = match scope {
            RequestScope::All => {
                let items = InventoryLedger::new(self.store.clone()).catalog().await?;
                Some(CatalogStats {
                    total_venues: self.store.venue_count().await?,
                    total_items: items.len() as u64,
                    low_stock_items: items
                        .iter()
                        .filter(|a| a.item.stock_quantity() < self.low_stock_threshold)
                        .count() as u64,
                })
            }
            RequestScope::OwnedBy(_) => None,
        };

        let recent = RequestQuery::new(scope).with_pagination(Pagination {
            page: 1,
            per_page: RECENT_REQUESTS,
        });
        let recent_requests = self.requests.list(&recent).await?.items;

        Ok(DashboardStats {
            counts,
            catalog,
            recent_requests,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use procura_core::UserId;
    use procura_procurement::{ApprovalGrant, Decision};

    use crate::test_support::{at, Fixture};

    #[tokio::test]
    async fn privileged_view_includes_catalog_figures() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 100).await;
        f.item("Table Linen", 3).await;
        f.item("Genset 50 KVA", 9).await;

        let mut ids = Vec::new();
        for i in 0..7 {
            ids.push(f.submit(&[(chairs, 1)], i).await);
        }
        f.approvals
            .decide(ids[0], Decision::Approve, ApprovalGrant::confirmed(f.approver), None, at(60))
            .await
            .unwrap();
        f.approvals
            .decide(ids[1], Decision::Reject, ApprovalGrant::confirmed(f.approver), None, at(61))
            .await
            .unwrap();

        let dashboard = DashboardService::new(f.store.clone(), 10);
        let stats = dashboard.stats(RequestScope::All).await.unwrap();

        assert_eq!(
            stats.counts,
            RequestCounts {
                total: 7,
                pending: 5,
                approved: 1,
                rejected: 1
            }
        );
        let catalog = stats.catalog.unwrap();
        assert_eq!(catalog.total_venues, 1);
        assert_eq!(catalog.total_items, 3);
        assert_eq!(catalog.low_stock_items, 2);

        assert_eq!(stats.recent_requests.len(), 5);
        assert_eq!(stats.recent_requests[0].request.id_typed(), ids[6]);
    }

    #[tokio::test]
    async fn owner_view_counts_only_own_requests() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 100).await;
        let other = UserId::new();
        f.submit(&[(chairs, 1)], 0).await;
        f.submit_as(other, &[(chairs, 1)], 1).await;
        f.submit_as(other, &[(chairs, 1)], 2).await;

        let dashboard = DashboardService::new(f.store.clone(), 10);
        let stats = dashboard.stats(RequestScope::OwnedBy(f.admin)).await.unwrap();

        assert_eq!(stats.counts.total, 1);
        assert_eq!(stats.counts.pending, 1);
        assert!(stats.catalog.is_none());
        assert_eq!(stats.recent_requests.len(), 1);
    }
}
