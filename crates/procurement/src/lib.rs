//! Procurement domain module.
//!
//! A procurement request is raised by an admin against a venue, carries one
//! line per item, and is decided exactly once by an approver. Approval is only
//! granted when every line is covered by the stock figures handed in with the
//! decision; the aggregate itself performs no IO.

pub mod decision;
pub mod request;

pub use decision::{ApprovalGrant, Decision};
pub use request::{
    DecideRequest, NewLine, ProcurementCommand, ProcurementEvent, ProcurementRequest,
    RequestApproved, RequestHeader, RequestLine, RequestRejected, RequestStatus,
    RequestSubmitted, SubmitRequest,
};
