use std::collections::HashSet;

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use procura_core::{
    Aggregate, AggregateRoot, DomainError, ItemId, LineId, RequestId, UserId, VenueId,
};
use procura_inventory::{Quantity, Reservation, StockPosition};

use crate::decision::{ApprovalGrant, Decision};

/// Request status lifecycle: `pending` moves exactly once to a terminal state.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RequestStatus {
    Pending,
    Approved,
    Rejected,
}

impl RequestStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            RequestStatus::Pending => "pending",
            RequestStatus::Approved => "approved",
            RequestStatus::Rejected => "rejected",
        }
    }

    pub fn is_terminal(self) -> bool {
        self != RequestStatus::Pending
    }
}

impl core::fmt::Display for RequestStatus {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl core::str::FromStr for RequestStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "pending" => Ok(RequestStatus::Pending),
            "approved" => Ok(RequestStatus::Approved),
            "rejected" => Ok(RequestStatus::Rejected),
            other => Err(DomainError::validation(format!(
                "unknown request status: {other}"
            ))),
        }
    }
}

/// One (item, quantity, notes) entry of a request.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestLine {
    pub id: LineId,
    pub item_id: ItemId,
    pub quantity: Quantity,
    pub notes: Option<String>,
}

/// Header fields fixed at submission.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestHeader {
    pub venue_id: VenueId,
    pub requested_by: UserId,
    /// Day the items are needed on site.
    pub request_date: NaiveDate,
    pub created_at: DateTime<Utc>,
}

/// Aggregate root: ProcurementRequest.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcurementRequest {
    id: RequestId,
    header: Option<RequestHeader>,
    status: RequestStatus,
    notes: Option<String>,
    lines: Vec<RequestLine>,
    approved_by: Option<UserId>,
    approved_at: Option<DateTime<Utc>>,
    version: u64,
}

impl ProcurementRequest {
    /// Create an empty, not-yet-submitted aggregate instance for rehydration.
    pub fn empty(id: RequestId) -> Self {
        Self {
            id,
            header: None,
            status: RequestStatus::Pending,
            notes: None,
            lines: Vec::new(),
            approved_by: None,
            approved_at: None,
            version: 0,
        }
    }

    /// Rebuild state by replaying events in order.
    pub fn from_history<'a>(
        id: RequestId,
        events: impl IntoIterator<Item = &'a ProcurementEvent>,
    ) -> Self {
        let mut request = Self::empty(id);
        for event in events {
            request.apply(event);
        }
        request
    }

    pub fn id_typed(&self) -> RequestId {
        self.id
    }

    /// `None` until the request has been submitted.
    pub fn header(&self) -> Option<&RequestHeader> {
        self.header.as_ref()
    }

    pub fn status(&self) -> RequestStatus {
        self.status
    }

    pub fn is_pending(&self) -> bool {
        self.header.is_some() && self.status == RequestStatus::Pending
    }

    pub fn notes(&self) -> Option<&str> {
        self.notes.as_deref()
    }

    pub fn lines(&self) -> &[RequestLine] {
        &self.lines
    }

    pub fn approved_by(&self) -> Option<UserId> {
        self.approved_by
    }

    pub fn approved_at(&self) -> Option<DateTime<Utc>> {
        self.approved_at
    }

    /// Claims this request places on stock while it is pending.
    ///
    /// Decided requests claim nothing: approved ones already took their units
    /// out of `stock_quantity`, rejected ones never will.
    pub fn reservations(&self) -> Vec<(ItemId, Reservation)> {
        let Some(header) = self.header.filter(|_| self.status == RequestStatus::Pending) else {
            return Vec::new();
        };

        self.lines
            .iter()
            .map(|line| {
                (
                    line.item_id,
                    Reservation {
                        request_id: self.id,
                        claimed_at: header.created_at,
                        quantity: line.quantity,
                    },
                )
            })
            .collect()
    }
}

impl AggregateRoot for ProcurementRequest {
    type Id = RequestId;

    fn id(&self) -> &Self::Id {
        &self.id
    }

    fn version(&self) -> u64 {
        self.version
    }
}

/// Line as entered by the requester. The quantity is still unchecked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NewLine {
    pub line_id: LineId,
    pub item_id: ItemId,
    pub quantity: u32,
    pub notes: Option<String>,
}

/// Command: SubmitRequest.
///
/// Venue activity needs storage and is checked by the caller before the
/// command is built. Item existence is looked up by the caller too and
/// handed over as `unknown_items`, so every precondition is reported in one
/// fixed order: date, lines present, quantities, items known, no duplicates.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SubmitRequest {
    pub request_id: RequestId,
    pub venue_id: VenueId,
    pub requested_by: UserId,
    pub request_date: NaiveDate,
    /// The caller's notion of the current day.
    pub today: NaiveDate,
    pub notes: Option<String>,
    pub lines: Vec<NewLine>,
    /// Items on `lines` that are not in the catalog.
    #[serde(default)]
    pub unknown_items: Vec<ItemId>,
    pub occurred_at: DateTime<Utc>,
}

/// Command: DecideRequest.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DecideRequest {
    pub request_id: RequestId,
    pub decision: Decision,
    pub grant: ApprovalGrant,
    pub notes: Option<String>,
    /// Stock figures for every item on the request, as seen by this request.
    /// Ignored when rejecting.
    pub stock: Vec<StockPosition>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementCommand {
    SubmitRequest(SubmitRequest),
    DecideRequest(DecideRequest),
}

/// Event: RequestSubmitted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestSubmitted {
    pub request_id: RequestId,
    pub venue_id: VenueId,
    pub requested_by: UserId,
    pub request_date: NaiveDate,
    pub notes: Option<String>,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestApproved.
///
/// Carries the lines so storage can decrement each item by exactly its
/// quantity in the same unit of work as the status change.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestApproved {
    pub request_id: RequestId,
    pub approved_by: UserId,
    pub notes: Option<String>,
    pub lines: Vec<RequestLine>,
    pub occurred_at: DateTime<Utc>,
}

/// Event: RequestRejected.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RequestRejected {
    pub request_id: RequestId,
    pub approved_by: UserId,
    pub notes: Option<String>,
    pub occurred_at: DateTime<Utc>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProcurementEvent {
    RequestSubmitted(RequestSubmitted),
    RequestApproved(RequestApproved),
    RequestRejected(RequestRejected),
}

impl ProcurementEvent {
    pub fn event_type(&self) -> &'static str {
        match self {
            ProcurementEvent::RequestSubmitted(_) => "procurement.request.submitted",
            ProcurementEvent::RequestApproved(_) => "procurement.request.approved",
            ProcurementEvent::RequestRejected(_) => "procurement.request.rejected",
        }
    }

}

impl Aggregate for ProcurementRequest {
    type Command = ProcurementCommand;
    type Event = ProcurementEvent;
    type Error = DomainError;

    fn apply(&mut self, event: &Self::Event) {
        match event {
            ProcurementEvent::RequestSubmitted(e) => {
                self.id = e.request_id;
                self.header = Some(RequestHeader {
                    venue_id: e.venue_id,
                    requested_by: e.requested_by,
                    request_date: e.request_date,
                    created_at: e.occurred_at,
                });
                self.status = RequestStatus::Pending;
                self.notes = e.notes.clone();
                self.lines = e.lines.clone();
                self.approved_by = None;
                self.approved_at = None;
            }
            ProcurementEvent::RequestApproved(e) => {
                self.status = RequestStatus::Approved;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
                self.notes = e.notes.clone();
            }
            ProcurementEvent::RequestRejected(e) => {
                self.status = RequestStatus::Rejected;
                self.approved_by = Some(e.approved_by);
                self.approved_at = Some(e.occurred_at);
                self.notes = e.notes.clone();
            }
        }

        // Deterministic version tracking: +1 per applied event.
        self.version += 1;
    }

    fn handle(&self, command: &Self::Command) -> Result<Vec<Self::Event>, Self::Error> {
        match command {
            ProcurementCommand::SubmitRequest(cmd) => self.handle_submit(cmd),
            ProcurementCommand::DecideRequest(cmd) => self.handle_decide(cmd),
        }
    }
}

impl ProcurementRequest {
    fn ensure_request_id(&self, request_id: RequestId) -> Result<(), DomainError> {
        if self.id != request_id {
            return Err(DomainError::invariant("request_id mismatch"));
        }
        Ok(())
    }

    fn handle_submit(&self, cmd: &SubmitRequest) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.header.is_some() {
            return Err(DomainError::conflict("procurement request already exists"));
        }
        self.ensure_request_id(cmd.request_id)?;

        if cmd.request_date < cmd.today {
            return Err(DomainError::validation(format!(
                "request date {} is before today ({})",
                cmd.request_date, cmd.today
            )));
        }

        if cmd.lines.is_empty() {
            return Err(DomainError::validation("at least one item is required"));
        }

        let quantities = cmd
            .lines
            .iter()
            .map(|l| Quantity::new(l.quantity))
            .collect::<Result<Vec<_>, _>>()?;

        if let Some(line) = cmd.lines.iter().find(|l| cmd.unknown_items.contains(&l.item_id)) {
            return Err(DomainError::validation(format!(
                "item {} does not exist",
                line.item_id
            )));
        }

        let mut seen = HashSet::with_capacity(cmd.lines.len());
        for line in &cmd.lines {
            if !seen.insert(line.item_id) {
                return Err(DomainError::validation(format!(
                    "item {} appears on more than one line",
                    line.item_id
                )));
            }
        }

        Ok(vec![ProcurementEvent::RequestSubmitted(RequestSubmitted {
            request_id: cmd.request_id,
            venue_id: cmd.venue_id,
            requested_by: cmd.requested_by,
            request_date: cmd.request_date,
            notes: cmd.notes.clone(),
            lines: cmd
                .lines
                .iter()
                .zip(quantities)
                .map(|(l, quantity)| RequestLine {
                    id: l.line_id,
                    item_id: l.item_id,
                    quantity,
                    notes: l.notes.clone(),
                })
                .collect(),
            occurred_at: cmd.occurred_at,
        })])
    }

    fn handle_decide(&self, cmd: &DecideRequest) -> Result<Vec<ProcurementEvent>, DomainError> {
        if self.header.is_none() {
            return Err(DomainError::not_found(format!(
                "procurement request {}",
                cmd.request_id
            )));
        }
        self.ensure_request_id(cmd.request_id)?;

        if self.status.is_terminal() {
            return Err(DomainError::already_processed(self.status.as_str()));
        }

        let approved_by = cmd.grant.approver();

        match cmd.decision {
            Decision::Reject => Ok(vec![ProcurementEvent::RequestRejected(RequestRejected {
                request_id: self.id,
                approved_by,
                notes: cmd.notes.clone(),
                occurred_at: cmd.occurred_at,
            })]),
            Decision::Approve => {
                // All-or-nothing: the first uncovered line aborts the decision.
                for line in &self.lines {
                    let position = cmd
                        .stock
                        .iter()
                        .find(|p| p.item_id == line.item_id)
                        .ok_or_else(|| {
                            DomainError::invariant(format!(
                                "no stock position supplied for item {}",
                                line.item_id
                            ))
                        })?;

                    if !position.covers(line.quantity) {
                        return Err(DomainError::insufficient_stock(
                            line.item_id,
                            position.available(),
                            line.quantity.get(),
                        ));
                    }
                }

                Ok(vec![ProcurementEvent::RequestApproved(RequestApproved {
                    request_id: self.id,
                    approved_by,
                    notes: cmd.notes.clone(),
                    lines: self.lines.clone(),
                    occurred_at: cmd.occurred_at,
                })])
            }
        }
    }
}
