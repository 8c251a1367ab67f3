//! Approval engine: decides a pending request against locked stock.

use chrono::{DateTime, Utc};
use tracing::{debug, info, instrument, Span};

use procura_core::{Aggregate, AggregateRoot, DomainError, Entity, ItemId, RequestId};
use procura_inventory::{Item, StockPosition};
use procura_procurement::{
    ApprovalGrant, DecideRequest, Decision, ProcurementCommand, ProcurementEvent,
    ProcurementRequest,
};

use crate::error::{ProcurementError, ProcurementResult};
use crate::store::{DecisionTx, ProcurementStore, StockDecrement};

/// A committed decision and the event that produced it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecisionOutcome {
    pub request: ProcurementRequest,
    pub event: ProcurementEvent,
}

/// Runs each decision as one unit of work.
///
/// The request row and every item on it stay locked from the availability
/// check through the stock decrement and status change. Either all of it
/// commits or none of it does.
#[derive(Debug, Clone)]
pub struct ApprovalEngine<S> {
    store: S,
}

impl<S: ProcurementStore> ApprovalEngine<S> {
    pub fn new(store: S) -> Self {
        Self { store }
    }

    #[instrument(
        skip(self, grant, notes),
        fields(
            request_id = %request_id,
            decision = ?decision,
            approver = %grant.approver(),
            status = tracing::field::Empty
        )
    )]
    pub async fn decide(
        &self,
        request_id: RequestId,
        decision: Decision,
        grant: ApprovalGrant,
        notes: Option<String>,
        now: DateTime<Utc>,
    ) -> ProcurementResult<DecisionOutcome> {
        let mut tx = self
            .store
            .begin_decision(request_id)
            .await?
            .ok_or_else(|| ProcurementError::not_found("procurement request", request_id))?;

        let mut request = tx.request().clone();

        let (locked, stock) = if decision == Decision::Approve && request.is_pending() {
            let locked = lock_request_items(tx.as_mut(), &request).await?;
            let stock = claim_positions(tx.as_mut(), &request, &locked).await?;
            (locked, stock)
        } else {
            (Vec::new(), Vec::new())
        };

        let events = request
            .handle(&ProcurementCommand::DecideRequest(DecideRequest {
                request_id,
                decision,
                grant,
                notes,
                stock,
                occurred_at: now,
            }))
            .map_err(|err| with_item_name(err, &locked))?;

        for event in &events {
            request.apply(event);
        }

        if let Some(ProcurementEvent::RequestApproved(approved)) = events.first() {
            for line in &approved.lines {
                match tx.decrement_stock(line.item_id, line.quantity).await? {
                    StockDecrement::Applied { .. } => {}
                    StockDecrement::Refused { on_hand } => {
                        debug!(item_id = %line.item_id, on_hand, "conditional stock decrement refused");
                        return Err(with_item_name(
                            DomainError::insufficient_stock(
                                line.item_id,
                                i64::from(on_hand),
                                line.quantity.get(),
                            ),
                            &locked,
                        ));
                    }
                }
            }
        }

        if !tx.save_decision(&request).await? {
            drop(tx);
            let status = self
                .store
                .request(request_id)
                .await?
                .map(|r| r.status().as_str().to_string())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(ProcurementError::AlreadyProcessed { status });
        }
        tx.commit().await?;

        let event = events.into_iter().next().ok_or_else(|| {
            ProcurementError::Invariant("decision produced no event".to_string())
        })?;

        Span::current().record("status", request.status().as_str());
        info!(version = request.version(), "procurement request decided");

        Ok(DecisionOutcome { request, event })
    }
}

async fn lock_request_items(
    tx: &mut dyn DecisionTx,
    request: &ProcurementRequest,
) -> ProcurementResult<Vec<Item>> {
    let mut ids: Vec<ItemId> = request.lines().iter().map(|l| l.item_id).collect();
    ids.sort();
    ids.dedup();
    Ok(tx.lock_items(&ids).await?)
}

/// Availability of each item as seen by this request: on-hand minus the
/// claims of pending requests created before it.
async fn claim_positions(
    tx: &mut dyn DecisionTx,
    request: &ProcurementRequest,
    locked: &[Item],
) -> ProcurementResult<Vec<StockPosition>> {
    let claimed_at = request
        .header()
        .map(|h| h.created_at)
        .ok_or_else(|| ProcurementError::Invariant("pending request without header".to_string()))?;

    let mut positions = Vec::with_capacity(locked.len());
    for item in locked {
        let reservations = tx.reservations(*item.id()).await?;
        positions.push(StockPosition::for_claim(
            item,
            &reservations,
            request.id_typed(),
            claimed_at,
        ));
    }
    Ok(positions)
}

fn with_item_name(err: DomainError, locked: &[Item]) -> ProcurementError {
    match ProcurementError::from(err) {
        ProcurementError::InsufficientStock {
            item_id,
            item_name,
            available,
            requested,
        } => ProcurementError::InsufficientStock {
            item_id,
            item_name: locked
                .iter()
                .find(|i| *i.id() == item_id)
                .map(|i| i.name().to_string())
                .unwrap_or(item_name),
            available,
            requested,
        },
        other => other,
    }
}
