//! Postgres-backed procurement store.
//!
//! ## Decision locking
//!
//! `begin_decision` opens a transaction and takes `SELECT ... FOR UPDATE` on
//! the request row. `lock_items` then locks the referenced item rows in
//! ascending id order, so two decisions sharing items always queue in the
//! same order and cannot deadlock. Stock is only ever changed through
//! `UPDATE ... WHERE stock_quantity >= $qty`, with a `CHECK (stock_quantity >= 0)`
//! behind it.
//!
//! ## Error Mapping
//!
//! | SQLx Error | PostgreSQL Error Code | StoreError |
//! |------------|----------------------|------------|
//! | Database (unique violation) | `23505` | `Conflict` |
//! | Database (foreign key / check violation) | `23503` / `23514` | `Conflict` |
//! | Database (other) | Any other | `Unavailable` |
//! | Decode / ColumnDecode / RowNotFound | N/A | `Corrupt` |
//! | PoolClosed / PoolTimedOut / Io / other | N/A | `Unavailable` |

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sqlx::postgres::{PgPoolOptions, PgRow};
use sqlx::{PgConnection, PgPool, Postgres, Row, Transaction};
use tracing::{Span, instrument};
use uuid::Uuid;

use procura_core::{ItemId, LineId, RequestId, UserId, VenueId};
use procura_inventory::{Item, Quantity, Reservation};
use procura_procurement::{
    ProcurementEvent, ProcurementRequest, RequestApproved, RequestLine, RequestRejected,
    RequestStatus, RequestSubmitted,
};
use procura_venues::{Venue, VenueStatus};

use super::query::{Page, RequestQuery, RequestScope};
use super::r#trait::{DecisionTx, ProcurementStore, RequestCounts, StockDecrement, StoreError, User};

const REQUEST_COLUMNS: &str = "r.id, r.venue_id, r.requested_by, r.request_date, r.status, \
     r.notes, r.approved_by, r.approved_at, r.created_at";

/// Filter shared by the page query and its count.
const LIST_WHERE: &str = r#"
    WHERE ($1::uuid IS NULL OR r.requested_by = $1)
      AND ($2::text IS NULL OR v.name ILIKE $2 ESCAPE '\')
      AND ($3::date IS NULL OR r.request_date = $3)
"#;

#[derive(Debug, Clone)]
pub struct PostgresProcurementStore {
    pool: Arc<PgPool>,
}

impl PostgresProcurementStore {
    pub fn new(pool: PgPool) -> Self {
        Self {
            pool: Arc::new(pool),
        }
    }

    pub async fn connect(url: &str, max_connections: u32) -> Result<Self, StoreError> {
        let pool = PgPoolOptions::new()
            .max_connections(max_connections)
            .connect(url)
            .await
            .map_err(|e| map_sqlx_error("connect", e))?;
        Ok(Self::new(pool))
    }

    /// Apply the embedded schema migrations.
    pub async fn migrate(&self) -> Result<(), StoreError> {
        sqlx::migrate!("./migrations")
            .run(&*self.pool)
            .await
            .map_err(|e| StoreError::Unavailable(format!("migration failed: {e}")))
    }

    async fn acquire(&self) -> Result<sqlx::pool::PoolConnection<Postgres>, StoreError> {
        self.pool
            .acquire()
            .await
            .map_err(|e| map_sqlx_error("acquire", e))
    }
}

#[async_trait]
impl ProcurementStore for PostgresProcurementStore {
    #[instrument(skip(self), fields(venue_id = %id), err)]
    async fn venue(&self, id: VenueId) -> Result<Option<Venue>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, address, description, status FROM venues WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("venue", e))?;

        row.as_ref().map(venue_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn active_venues(&self) -> Result<Vec<Venue>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT id, name, address, description, status
            FROM venues
            WHERE status = 'active'
            ORDER BY name ASC
            "#,
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("active_venues", e))?;

        rows.iter().map(venue_from_row).collect()
    }

    async fn venue_count(&self) -> Result<u64, StoreError> {
        let total: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM venues")
            .fetch_one(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("venue_count", e))?;
        Ok(total.max(0) as u64)
    }

    #[instrument(skip(self), fields(item_id = %id), err)]
    async fn item(&self, id: ItemId) -> Result<Option<Item>, StoreError> {
        let row = sqlx::query(
            "SELECT id, name, description, unit, stock_quantity FROM items WHERE id = $1",
        )
        .bind(id.as_uuid())
        .fetch_optional(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("item", e))?;

        row.as_ref().map(item_from_row).transpose()
    }

    #[instrument(skip(self), err)]
    async fn items(&self) -> Result<Vec<Item>, StoreError> {
        let rows = sqlx::query(
            "SELECT id, name, description, unit, stock_quantity FROM items ORDER BY name ASC",
        )
        .fetch_all(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("items", e))?;

        rows.iter().map(item_from_row).collect()
    }

    async fn user(&self, id: UserId) -> Result<Option<User>, StoreError> {
        let row = sqlx::query("SELECT id, name, email FROM users WHERE id = $1")
            .bind(id.as_uuid())
            .fetch_optional(&*self.pool)
            .await
            .map_err(|e| map_sqlx_error("user", e))?;

        row.map(|row| {
            Ok(User {
                id: UserId::from_uuid(col(&row, "id")?),
                name: col(&row, "name")?,
                email: col(&row, "email")?,
            })
        })
        .transpose()
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn request(&self, id: RequestId) -> Result<Option<ProcurementRequest>, StoreError> {
        let mut conn = self.acquire().await?;
        load_request(&mut conn, id, false).await
    }

    #[instrument(
        skip(self, request),
        fields(request_id = %request.id_typed(), line_count = request.lines().len()),
        err
    )]
    async fn insert_request(&self, request: &ProcurementRequest) -> Result<(), StoreError> {
        let header = request.header().ok_or_else(|| {
            StoreError::Corrupt(format!(
                "request {} has not been submitted",
                request.id_typed()
            ))
        })?;

        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        sqlx::query(
            r#"
            INSERT INTO procurement_requests (
                id, venue_id, requested_by, request_date, status, notes, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            "#,
        )
        .bind(request.id_typed().as_uuid())
        .bind(header.venue_id.as_uuid())
        .bind(header.requested_by.as_uuid())
        .bind(header.request_date)
        .bind(request.status().as_str())
        .bind(request.notes())
        .bind(header.created_at)
        .execute(&mut *tx)
        .await
        .map_err(|e| map_sqlx_error("insert_request", e))?;

        for (idx, line) in request.lines().iter().enumerate() {
            sqlx::query(
                r#"
                INSERT INTO procurement_request_items (
                    id, procurement_request_id, line_no, item_id, quantity, notes
                )
                VALUES ($1, $2, $3, $4, $5, $6)
                "#,
            )
            .bind(line.id.as_uuid())
            .bind(request.id_typed().as_uuid())
            .bind(idx as i32 + 1)
            .bind(line.item_id.as_uuid())
            .bind(to_db_quantity(line.quantity)?)
            .bind(line.notes.as_deref())
            .execute(&mut *tx)
            .await
            .map_err(|e| map_sqlx_error("insert_request_line", e))?;
        }

        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))?;

        Ok(())
    }

    #[instrument(
        skip(self, query),
        fields(
            scope = ?query.scope,
            page = query.pagination.page,
            per_page = query.pagination.per_page,
            total = tracing::field::Empty
        ),
        err
    )]
    async fn list_requests(
        &self,
        query: &RequestQuery,
    ) -> Result<Page<ProcurementRequest>, StoreError> {
        let owner = query.scope.owner().map(Uuid::from);
        let pattern = query.filter.venue_needle().map(like_pattern);
        let date: Option<NaiveDate> = query.filter.request_date;

        let mut conn = self.acquire().await?;

        let count_sql = format!(
            "SELECT COUNT(*) FROM procurement_requests r JOIN venues v ON v.id = r.venue_id {LIST_WHERE}"
        );
        let total: i64 = sqlx::query_scalar(&count_sql)
            .bind(owner)
            .bind(pattern.as_deref())
            .bind(date)
            .fetch_one(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("count_requests", e))?;

        let page_sql = format!(
            "SELECT {REQUEST_COLUMNS} FROM procurement_requests r JOIN venues v ON v.id = r.venue_id \
             {LIST_WHERE} ORDER BY r.created_at DESC, r.id DESC LIMIT $4 OFFSET $5"
        );
        let rows = sqlx::query(&page_sql)
            .bind(owner)
            .bind(pattern.as_deref())
            .bind(date)
            .bind(query.pagination.limit() as i64)
            .bind(query.pagination.offset() as i64)
            .fetch_all(&mut *conn)
            .await
            .map_err(|e| map_sqlx_error("list_requests", e))?;

        let ids: Vec<Uuid> = rows
            .iter()
            .map(|row| col::<Uuid>(row, "id"))
            .collect::<Result<_, _>>()?;
        let mut lines = load_lines(&mut conn, &ids).await?;

        let mut requests = Vec::with_capacity(rows.len());
        for row in &rows {
            let id: Uuid = col(row, "id")?;
            requests.push(rebuild_request(row, lines.remove(&id).unwrap_or_default())?);
        }

        Span::current().record("total", total);
        Ok(Page::new(requests, query.pagination, total.max(0) as u64))
    }

    async fn request_counts(&self, scope: RequestScope) -> Result<RequestCounts, StoreError> {
        let row = sqlx::query(
            r#"
            SELECT
                COUNT(*) AS total,
                COUNT(*) FILTER (WHERE status = 'pending') AS pending,
                COUNT(*) FILTER (WHERE status = 'approved') AS approved,
                COUNT(*) FILTER (WHERE status = 'rejected') AS rejected
            FROM procurement_requests
            WHERE ($1::uuid IS NULL OR requested_by = $1)
            "#,
        )
        .bind(scope.owner().map(Uuid::from))
        .fetch_one(&*self.pool)
        .await
        .map_err(|e| map_sqlx_error("request_counts", e))?;

        let count = |name: &str| col::<i64>(&row, name).map(|n| n.max(0) as u64);
        Ok(RequestCounts {
            total: count("total")?,
            pending: count("pending")?,
            approved: count("approved")?,
            rejected: count("rejected")?,
        })
    }

    #[instrument(skip(self), fields(item_id = %item), err)]
    async fn reservations(&self, item: ItemId) -> Result<Vec<Reservation>, StoreError> {
        let mut conn = self.acquire().await?;
        load_reservations(&mut conn, item).await
    }

    #[instrument(skip(self), fields(request_id = %id), err)]
    async fn begin_decision(
        &self,
        id: RequestId,
    ) -> Result<Option<Box<dyn DecisionTx>>, StoreError> {
        let mut tx = self
            .pool
            .begin()
            .await
            .map_err(|e| map_sqlx_error("begin_transaction", e))?;

        match load_request(&mut tx, id, true).await? {
            Some(request) => Ok(Some(Box::new(PgDecisionTx {
                tx: Some(tx),
                request,
            }))),
            None => {
                tx.rollback()
                    .await
                    .map_err(|e| map_sqlx_error("rollback", e))?;
                Ok(None)
            }
        }
    }
}

/// Decision unit of work over one Postgres transaction.
///
/// Dropping it without `commit` lets sqlx roll the transaction back.
struct PgDecisionTx {
    tx: Option<Transaction<'static, Postgres>>,
    request: ProcurementRequest,
}

impl PgDecisionTx {
    fn conn(&mut self) -> Result<&mut PgConnection, StoreError> {
        self.tx
            .as_deref_mut()
            .ok_or_else(|| StoreError::Unavailable("decision already committed".to_string()))
    }
}

#[async_trait]
impl DecisionTx for PgDecisionTx {
    fn request(&self) -> &ProcurementRequest {
        &self.request
    }

    async fn lock_items(&mut self, ids: &[ItemId]) -> Result<Vec<Item>, StoreError> {
        let mut wanted: Vec<Uuid> = ids.iter().map(|id| Uuid::from(*id)).collect();
        wanted.sort();
        wanted.dedup();

        let rows = sqlx::query(
            r#"
            SELECT id, name, description, unit, stock_quantity
            FROM items
            WHERE id = ANY($1)
            ORDER BY id ASC
            FOR UPDATE
            "#,
        )
        .bind(&wanted)
        .fetch_all(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("lock_items", e))?;

        if rows.len() != wanted.len() {
            return Err(StoreError::Corrupt(format!(
                "expected {} items, found {}",
                wanted.len(),
                rows.len()
            )));
        }
        rows.iter().map(item_from_row).collect()
    }

    async fn reservations(&mut self, item: ItemId) -> Result<Vec<Reservation>, StoreError> {
        load_reservations(self.conn()?, item).await
    }

    async fn decrement_stock(
        &mut self,
        item: ItemId,
        qty: Quantity,
    ) -> Result<StockDecrement, StoreError> {
        let amount = to_db_quantity(qty)?;
        let remaining: Option<i32> = sqlx::query_scalar(
            r#"
            UPDATE items
            SET stock_quantity = stock_quantity - $1, updated_at = NOW()
            WHERE id = $2 AND stock_quantity >= $1
            RETURNING stock_quantity
            "#,
        )
        .bind(amount)
        .bind(item.as_uuid())
        .fetch_optional(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("decrement_stock", e))?;

        if let Some(remaining) = remaining {
            return Ok(StockDecrement::Applied {
                remaining: from_db_stock(remaining)?,
            });
        }

        let on_hand: i32 = sqlx::query_scalar("SELECT stock_quantity FROM items WHERE id = $1")
            .bind(item.as_uuid())
            .fetch_one(self.conn()?)
            .await
            .map_err(|e| map_sqlx_error("read_stock", e))?;

        Ok(StockDecrement::Refused {
            on_hand: from_db_stock(on_hand)?,
        })
    }

    async fn save_decision(&mut self, request: &ProcurementRequest) -> Result<bool, StoreError> {
        let result = sqlx::query(
            r#"
            UPDATE procurement_requests
            SET status = $2, approved_by = $3, approved_at = $4, notes = $5, updated_at = NOW()
            WHERE id = $1 AND status = 'pending'
            "#,
        )
        .bind(request.id_typed().as_uuid())
        .bind(request.status().as_str())
        .bind(request.approved_by().map(Uuid::from))
        .bind(request.approved_at())
        .bind(request.notes())
        .execute(self.conn()?)
        .await
        .map_err(|e| map_sqlx_error("save_decision", e))?;

        Ok(result.rows_affected() == 1)
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        let tx = self
            .tx
            .take()
            .ok_or_else(|| StoreError::Unavailable("decision already committed".to_string()))?;
        tx.commit()
            .await
            .map_err(|e| map_sqlx_error("commit_transaction", e))
    }
}

async fn load_request(
    conn: &mut PgConnection,
    id: RequestId,
    for_update: bool,
) -> Result<Option<ProcurementRequest>, StoreError> {
    let sql = format!(
        "SELECT {REQUEST_COLUMNS} FROM procurement_requests r WHERE r.id = $1{}",
        if for_update { " FOR UPDATE" } else { "" }
    );
    let Some(row) = sqlx::query(&sql)
        .bind(id.as_uuid())
        .fetch_optional(&mut *conn)
        .await
        .map_err(|e| map_sqlx_error("load_request", e))?
    else {
        return Ok(None);
    };

    let mut lines = load_lines(conn, &[Uuid::from(id)]).await?;
    let lines = lines.remove(id.as_uuid()).unwrap_or_default();
    rebuild_request(&row, lines).map(Some)
}

async fn load_lines(
    conn: &mut PgConnection,
    request_ids: &[Uuid],
) -> Result<HashMap<Uuid, Vec<RequestLine>>, StoreError> {
    if request_ids.is_empty() {
        return Ok(HashMap::new());
    }

    let rows = sqlx::query(
        r#"
        SELECT id, procurement_request_id, item_id, quantity, notes
        FROM procurement_request_items
        WHERE procurement_request_id = ANY($1)
        ORDER BY procurement_request_id, line_no ASC
        "#,
    )
    .bind(request_ids)
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("load_lines", e))?;

    let mut by_request: HashMap<Uuid, Vec<RequestLine>> = HashMap::new();
    for row in &rows {
        let request_id: Uuid = col(row, "procurement_request_id")?;
        by_request
            .entry(request_id)
            .or_default()
            .push(RequestLine {
                id: LineId::from_uuid(col(row, "id")?),
                item_id: ItemId::from_uuid(col(row, "item_id")?),
                quantity: from_db_quantity(col(row, "quantity")?)?,
                notes: col(row, "notes")?,
            });
    }
    Ok(by_request)
}

async fn load_reservations(
    conn: &mut PgConnection,
    item: ItemId,
) -> Result<Vec<Reservation>, StoreError> {
    let rows = sqlx::query(
        r#"
        SELECT r.id AS request_id, r.created_at, l.quantity
        FROM procurement_request_items l
        JOIN procurement_requests r ON r.id = l.procurement_request_id
        WHERE l.item_id = $1 AND r.status = 'pending'
        "#,
    )
    .bind(item.as_uuid())
    .fetch_all(conn)
    .await
    .map_err(|e| map_sqlx_error("reservations", e))?;

    rows.iter()
        .map(|row| {
            Ok(Reservation {
                request_id: RequestId::from_uuid(col(row, "request_id")?),
                claimed_at: col(row, "created_at")?,
                quantity: from_db_quantity(col(row, "quantity")?)?,
            })
        })
        .collect()
}

/// Replay the stored row as the events that produced it.
fn rebuild_request(row: &PgRow, lines: Vec<RequestLine>) -> Result<ProcurementRequest, StoreError> {
    let id = RequestId::from_uuid(col(row, "id")?);
    let status: RequestStatus = col::<String>(row, "status")?
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("request {id}: {e}")))?;
    let notes: Option<String> = col(row, "notes")?;
    let created_at: DateTime<Utc> = col(row, "created_at")?;

    let mut events = vec![ProcurementEvent::RequestSubmitted(RequestSubmitted {
        request_id: id,
        venue_id: VenueId::from_uuid(col(row, "venue_id")?),
        requested_by: UserId::from_uuid(col(row, "requested_by")?),
        request_date: col(row, "request_date")?,
        notes: notes.clone(),
        lines: lines.clone(),
        occurred_at: created_at,
    })];

    if status.is_terminal() {
        let approved_by: Option<Uuid> = col(row, "approved_by")?;
        let approved_at: Option<DateTime<Utc>> = col(row, "approved_at")?;
        let (Some(approved_by), Some(occurred_at)) = (approved_by, approved_at) else {
            return Err(StoreError::Corrupt(format!(
                "request {id} is {status} but has no approver"
            )));
        };
        let approved_by = UserId::from_uuid(approved_by);

        events.push(match status {
            RequestStatus::Approved => ProcurementEvent::RequestApproved(RequestApproved {
                request_id: id,
                approved_by,
                notes,
                lines,
                occurred_at,
            }),
            _ => ProcurementEvent::RequestRejected(RequestRejected {
                request_id: id,
                approved_by,
                notes,
                occurred_at,
            }),
        });
    }

    Ok(ProcurementRequest::from_history(id, &events))
}

fn venue_from_row(row: &PgRow) -> Result<Venue, StoreError> {
    let status: VenueStatus = col::<String>(row, "status")?
        .parse()
        .map_err(|e| StoreError::Corrupt(format!("venue status: {e}")))?;
    Venue::new(
        VenueId::from_uuid(col(row, "id")?),
        col::<String>(row, "name")?,
        col(row, "address")?,
        col(row, "description")?,
        status,
    )
    .map_err(|e| StoreError::Corrupt(format!("venue row: {e}")))
}

fn item_from_row(row: &PgRow) -> Result<Item, StoreError> {
    Item::new(
        ItemId::from_uuid(col(row, "id")?),
        col::<String>(row, "name")?,
        col(row, "description")?,
        col::<String>(row, "unit")?,
        from_db_stock(col(row, "stock_quantity")?)?,
    )
    .map_err(|e| StoreError::Corrupt(format!("item row: {e}")))
}

fn col<'r, T>(row: &'r PgRow, name: &str) -> Result<T, StoreError>
where
    T: sqlx::Decode<'r, Postgres> + sqlx::Type<Postgres>,
{
    row.try_get(name)
        .map_err(|e| StoreError::Corrupt(format!("column {name}: {e}")))
}

fn from_db_stock(value: i32) -> Result<u32, StoreError> {
    u32::try_from(value).map_err(|_| StoreError::Corrupt(format!("negative stock: {value}")))
}

fn from_db_quantity(value: i32) -> Result<Quantity, StoreError> {
    u32::try_from(value)
        .ok()
        .and_then(|v| Quantity::new(v).ok())
        .ok_or_else(|| StoreError::Corrupt(format!("invalid line quantity: {value}")))
}

fn to_db_quantity(qty: Quantity) -> Result<i32, StoreError> {
    i32::try_from(qty.get())
        .map_err(|_| StoreError::Corrupt(format!("quantity {qty} exceeds storage range")))
}

/// `%needle%` with LIKE metacharacters escaped.
fn like_pattern(needle: &str) -> String {
    let mut escaped = String::with_capacity(needle.len() + 2);
    escaped.push('%');
    for ch in needle.chars() {
        if matches!(ch, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped.push('%');
    escaped
}

fn map_sqlx_error(operation: &str, err: sqlx::Error) -> StoreError {
    match err {
        sqlx::Error::Database(db_err) => {
            let msg = format!("database error in {}: {}", operation, db_err.message());
            match db_err.code().as_deref() {
                Some("23505") | Some("23503") | Some("23514") => StoreError::Conflict(msg),
                _ => StoreError::Unavailable(msg),
            }
        }
        sqlx::Error::RowNotFound => {
            StoreError::Corrupt(format!("unexpected row not found in {operation}"))
        }
        sqlx::Error::ColumnDecode { .. } | sqlx::Error::Decode(_) => {
            StoreError::Corrupt(format!("decode error in {operation}: {err}"))
        }
        other => StoreError::Unavailable(format!("sqlx error in {operation}: {other}")),
    }
}
