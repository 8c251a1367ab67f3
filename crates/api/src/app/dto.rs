use axum::http::StatusCode;
use chrono::NaiveDate;
use serde::Deserialize;

use procura_infra::{
    DashboardStats, ItemAvailability, NewRequest, NewRequestLine, RequestDetails,
    store::{Page, RequestFilter, User},
};
use procura_procurement::ProcurementRequest;
use procura_venues::Venue;

use crate::app::errors;

// -------------------------
// Request DTOs
// -------------------------

#[derive(Debug, Deserialize)]
pub struct CreateRequestLineBody {
    pub item_id: String,
    pub quantity: i64,
    pub notes: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestBody {
    pub venue_id: String,
    pub request_date: NaiveDate,
    pub notes: Option<String>,
    #[serde(default)]
    pub items: Vec<CreateRequestLineBody>,
}

#[derive(Debug, Deserialize)]
pub struct DecisionBody {
    /// `approved` or `rejected`.
    pub status: String,
    pub notes: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ListRequestsParams {
    /// Substring of the venue name.
    pub venue: Option<String>,
    /// Exact request date, `YYYY-MM-DD`.
    pub date: Option<String>,
    pub page: Option<u32>,
    pub per_page: Option<u32>,
}

impl CreateRequestBody {
    pub fn into_new_request(self) -> Result<NewRequest, axum::response::Response> {
        let lines = self
            .items
            .into_iter()
            .map(|l| {
                Ok(NewRequestLine {
                    item_id: errors::parse_id(&l.item_id, "item")?,
                    quantity: parse_quantity(l.quantity),
                    notes: l.notes,
                })
            })
            .collect::<Result<Vec<_>, axum::response::Response>>()?;

        Ok(NewRequest {
            venue_id: errors::parse_id(&self.venue_id, "venue")?,
            request_date: self.request_date,
            notes: self.notes,
            lines,
        })
    }
}

impl ListRequestsParams {
    pub fn filter(&self) -> Result<RequestFilter, axum::response::Response> {
        let request_date = self
            .date
            .as_deref()
            .filter(|d| !d.trim().is_empty())
            .map(|d| {
                NaiveDate::parse_from_str(d.trim(), "%Y-%m-%d").map_err(|_| {
                    errors::json_error(
                        StatusCode::BAD_REQUEST,
                        "validation_error",
                        "date must be formatted as YYYY-MM-DD",
                    )
                })
            })
            .transpose()?;

        Ok(RequestFilter {
            venue_name_contains: self.venue.clone(),
            request_date,
        })
    }
}

/// Zero and negatives pass through as 0 and oversized values saturate, so
/// the domain reports both in its usual order.
fn parse_quantity(raw: i64) -> u32 {
    if raw <= 0 {
        return 0;
    }
    u32::try_from(raw).unwrap_or(u32::MAX)
}

// -------------------------
// Response mapping
// -------------------------

pub fn venue_to_json(v: &Venue) -> serde_json::Value {
    use procura_core::Entity;

    serde_json::json!({
        "id": v.id().to_string(),
        "name": v.name(),
        "address": v.address(),
        "description": v.description(),
        "status": v.status().as_str(),
    })
}

pub fn availability_to_json(a: &ItemAvailability) -> serde_json::Value {
    use procura_core::Entity;

    serde_json::json!({
        "id": a.item.id().to_string(),
        "name": a.item.name(),
        "description": a.item.description(),
        "unit": a.item.unit(),
        "stock_quantity": a.item.stock_quantity(),
        "reserved": a.position.reserved,
        "available": a.position.available(),
    })
}

fn user_to_json(u: Option<&User>) -> serde_json::Value {
    match u {
        Some(u) => serde_json::json!({
            "id": u.id.to_string(),
            "name": u.name,
            "email": u.email,
        }),
        None => serde_json::Value::Null,
    }
}

pub fn request_to_json(d: &RequestDetails) -> serde_json::Value {
    let header = d.request.header();

    serde_json::json!({
        "id": d.request.id_typed().to_string(),
        "status": d.request.status().as_str(),
        "request_date": header.map(|h| h.request_date.to_string()),
        "created_at": header.map(|h| h.created_at.to_rfc3339()),
        "notes": d.request.notes(),
        "approved_at": d.request.approved_at().map(|t| t.to_rfc3339()),
        "venue": venue_to_json(&d.venue),
        "requested_by": user_to_json(d.requester.as_ref()),
        "approved_by": user_to_json(d.approver.as_ref()),
        "items": d.lines.iter().map(|l| serde_json::json!({
            "id": l.line.id.to_string(),
            "item_id": l.line.item_id.to_string(),
            "name": l.item.name(),
            "unit": l.item.unit(),
            "quantity": l.line.quantity.get(),
            "notes": l.line.notes,
            "stock_quantity": l.item.stock_quantity(),
            "available": l.available,
        })).collect::<Vec<_>>(),
    })
}

/// Bare form of a request for when the venue, user and item joins are
/// unavailable. Referenced rows are given by id only.
pub fn decided_request_to_json(request: &ProcurementRequest) -> serde_json::Value {
    let header = request.header();

    serde_json::json!({
        "id": request.id_typed().to_string(),
        "status": request.status().as_str(),
        "request_date": header.map(|h| h.request_date.to_string()),
        "created_at": header.map(|h| h.created_at.to_rfc3339()),
        "notes": request.notes(),
        "approved_at": request.approved_at().map(|t| t.to_rfc3339()),
        "venue_id": header.map(|h| h.venue_id.to_string()),
        "approved_by_id": request.approved_by().map(|u| u.to_string()),
        "items": request.lines().iter().map(|l| serde_json::json!({
            "id": l.id.to_string(),
            "item_id": l.item_id.to_string(),
            "quantity": l.quantity.get(),
            "notes": l.notes,
        })).collect::<Vec<_>>(),
    })
}

pub fn page_to_json(page: &Page<RequestDetails>) -> serde_json::Value {
    serde_json::json!({
        "items": page.items.iter().map(request_to_json).collect::<Vec<_>>(),
        "page": page.page,
        "per_page": page.per_page,
        "total_items": page.total_items,
        "total_pages": page.total_pages,
    })
}

pub fn dashboard_to_json(stats: &DashboardStats) -> serde_json::Value {
    let mut body = serde_json::json!({
        "total_requests": stats.counts.total,
        "pending_requests": stats.counts.pending,
        "approved_requests": stats.counts.approved,
        "rejected_requests": stats.counts.rejected,
        "recent_requests": stats.recent_requests.iter().map(request_to_json).collect::<Vec<_>>(),
    });

    if let (Some(catalog), Some(obj)) = (stats.catalog, body.as_object_mut()) {
        obj.insert("total_venues".into(), catalog.total_venues.into());
        obj.insert("total_items".into(), catalog.total_items.into());
        obj.insert("low_stock_items".into(), catalog.low_stock_items.into());
    }
    body
}
