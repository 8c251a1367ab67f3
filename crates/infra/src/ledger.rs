//! Inventory ledger: read-time availability over the store.

use serde::Serialize;
use tracing::instrument;

use procura_core::ItemId;
use procura_inventory::{Item, Quantity, StockPosition};

use crate::error::{ProcurementError, ProcurementResult};
use crate::store::ProcurementStore;

/// An item with its availability at the moment of the read.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemAvailability {
    pub item: Item,
    pub position: StockPosition,
}

/// Derives available stock as on-hand minus every pending claim.
///
/// Nothing here is persisted or locked; figures are only as fresh as the
/// read. The approval path takes its own locked view through `DecisionTx`.
#[derive(Debug, Clone)]
pub struct InventoryLedger<S> {
    store: S,
}

impl<S: ProcurementStore> InventoryLedger<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(skip(self), fields(item_id = %item_id))]
    pub async fn position(&self, item_id: ItemId) -> ProcurementResult<ItemAvailability> {
        let item = self
            .store
            .item(item_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found("item", item_id))?;
        self.position_of(item).await
    }

    pub async fn available_stock(&self, item_id: ItemId) -> ProcurementResult<i64> {
        Ok(self.position(item_id).await?.position.available())
    }

    pub async fn has_available_stock(
        &self,
        item_id: ItemId,
        requested: Quantity,
    ) -> ProcurementResult<bool> {
        Ok(self.position(item_id).await?.position.covers(requested))
    }

    /// Every item, ordered by name, with availability.
    pub async fn catalog(&self) -> ProcurementResult<Vec<ItemAvailability>> {
        let items = self.store.items().await?;
        let mut out = Vec::with_capacity(items.len());
        for item in items {
            out.push(self.position_of(item).await?);
        }
        Ok(out)
    }

    pub(crate) async fn position_of(&self, item: Item) -> ProcurementResult<ItemAvailability> {
        use procura_core::Entity;

        let reservations = self.store.reservations(*item.id()).await?;
        let position = StockPosition::from_reservations(&item, &reservations);
        Ok(ItemAvailability { item, position })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    use crate::test_support::Fixture;

    fn qty(n: u32) -> Quantity {
        Quantity::new(n).unwrap()
    }

    #[tokio::test]
    async fn has_available_stock_counts_pending_claims() {
        let f = Fixture::new().await;
        let chairs = f.item("Tiffany Chair", 10).await;
        let ledger = InventoryLedger::new(f.store.clone());

        f.submit(&[(chairs, 4)], 0).await;
        assert_eq!(ledger.available_stock(chairs).await.unwrap(), 6);
        assert!(ledger.has_available_stock(chairs, qty(6)).await.unwrap());
        assert!(!ledger.has_available_stock(chairs, qty(7)).await.unwrap());

        f.submit(&[(chairs, 9)], 1).await;
        assert_eq!(ledger.available_stock(chairs).await.unwrap(), -3);
        assert!(!ledger.has_available_stock(chairs, qty(1)).await.unwrap());
    }

    #[tokio::test]
    async fn unknown_item_is_not_found() {
        let f = Fixture::new().await;
        let ledger = InventoryLedger::new(f.store.clone());

        match ledger.has_available_stock(ItemId::new(), qty(1)).await {
            Err(ProcurementError::NotFound(what)) => assert!(what.starts_with("item ")),
            other => panic!("unexpected: {other:?}"),
        }
    }
}
