use chrono::{DateTime, Utc};
use sqlx::types::BigDecimal;
use sqlx::{PgExecutor, PgPool, Postgres, Result, Transaction as SqlxTransaction};

use crate::db::models::{Bill, Event, EventSeat, PriceCategory, Ticket, ticket_status};

/// True when the error is a storage-level uniqueness violation. The partial
/// unique index on (event_id, seat_id) over non-terminal tickets is the
/// authoritative arbiter for seat races, so callers map this to a conflict.
pub fn is_unique_violation(err: &sqlx::Error) -> bool {
    match err {
        sqlx::Error::Database(db) => db.code().as_deref() == Some("23505"),
        _ => false,
    }
}

// --- Event / seat catalog queries ---

pub async fn get_event(pool: &PgPool, id: i64) -> Result<Option<Event>> {
    sqlx::query_as::<_, Event>("SELECT * FROM events WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// The seat as configured for one event: physical seat joined with the
/// per-event layout row (seat_type and sale status are per event).
pub async fn get_seat_for_event(
    pool: &PgPool,
    event_id: i64,
    seat_id: i64,
) -> Result<Option<EventSeat>> {
    sqlx::query_as::<_, EventSeat>(
        r#"
        SELECT s.id AS seat_id, s.area_id, s.seat_code, l.seat_type, l.status
        FROM seats s
        JOIN event_seat_layout l ON l.seat_id = s.id
        WHERE l.event_id = $1 AND s.id = $2
        "#,
    )
    .bind(event_id)
    .bind(seat_id)
    .fetch_optional(pool)
    .await
}

pub async fn get_active_category_by_name(
    pool: &PgPool,
    event_id: i64,
    name: &str,
) -> Result<Option<PriceCategory>> {
    sqlx::query_as::<_, PriceCategory>(
        "SELECT * FROM price_categories WHERE event_id = $1 AND name = $2 AND is_active",
    )
    .bind(event_id)
    .bind(name)
    .fetch_optional(pool)
    .await
}

pub async fn get_category(pool: &PgPool, id: i64) -> Result<Option<PriceCategory>> {
    sqlx::query_as::<_, PriceCategory>("SELECT * FROM price_categories WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

// --- Ticket queries ---

/// Seats among `seat_ids` that already carry a non-terminal ticket for this
/// event. Optimistic fast-path only; the insert constraint is what actually
/// decides races.
pub async fn find_occupied_seat_ids(
    pool: &PgPool,
    event_id: i64,
    seat_ids: &[i64],
) -> Result<Vec<i64>> {
    let states: Vec<String> = ticket_status::NON_TERMINAL
        .iter()
        .map(|s| s.to_string())
        .collect();

    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT seat_id FROM tickets
        WHERE event_id = $1 AND seat_id = ANY($2) AND status = ANY($3)
        "#,
    )
    .bind(event_id)
    .bind(seat_ids)
    .bind(&states)
    .fetch_all(pool)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Inserts one PENDING hold row and returns its id. Fails with a unique
/// violation when a concurrent request holds the same (event, seat).
pub async fn insert_hold(
    tx: &mut SqlxTransaction<'_, Postgres>,
    event_id: i64,
    user_id: i64,
    category_id: i64,
    seat_id: i64,
    qr_placeholder: &str,
    hold_expires_at: DateTime<Utc>,
) -> Result<i64> {
    let (id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO tickets (event_id, user_id, category_id, seat_id, status, qr_code_value, hold_expires_at)
        VALUES ($1, $2, $3, $4, $5, $6, $7)
        RETURNING id
        "#,
    )
    .bind(event_id)
    .bind(user_id)
    .bind(category_id)
    .bind(seat_id)
    .bind(ticket_status::PENDING)
    .bind(qr_placeholder)
    .bind(hold_expires_at)
    .fetch_one(&mut **tx)
    .await?;

    Ok(id)
}

/// Hard-deletes holds that are still PENDING. Ids that are gone or already
/// promoted are left alone, which makes the operation idempotent.
pub async fn delete_pending_by_ids<'e>(
    executor: impl PgExecutor<'e>,
    ids: &[i64],
) -> Result<u64> {
    if ids.is_empty() {
        return Ok(0);
    }

    let result = sqlx::query("DELETE FROM tickets WHERE id = ANY($1) AND status = $2")
        .bind(ids)
        .bind(ticket_status::PENDING)
        .execute(executor)
        .await?;

    Ok(result.rows_affected())
}

pub async fn find_tickets_by_ids<'e>(
    executor: impl PgExecutor<'e>,
    ids: &[i64],
) -> Result<Vec<Ticket>> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = ANY($1)")
        .bind(ids)
        .fetch_all(executor)
        .await
}

/// PENDING → BOOKED for the whole batch: assigns the bill, stamps issuance
/// time and drops the hold lease. Returns the number of rows promoted; the
/// caller treats anything short of the full batch as a failure.
pub async fn promote_tickets(
    tx: &mut SqlxTransaction<'_, Postgres>,
    ids: &[i64],
    bill_id: i64,
    issued_at: DateTime<Utc>,
) -> Result<u64> {
    let result = sqlx::query(
        r#"
        UPDATE tickets
        SET status = $1, bill_id = $2, qr_issued_at = $3, hold_expires_at = NULL
        WHERE id = ANY($4) AND status = $5
        "#,
    )
    .bind(ticket_status::BOOKED)
    .bind(bill_id)
    .bind(issued_at)
    .bind(ids)
    .bind(ticket_status::PENDING)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected())
}

pub async fn update_ticket_qr(pool: &PgPool, id: i64, qr_code_value: &str) -> Result<()> {
    sqlx::query("UPDATE tickets SET qr_code_value = $1 WHERE id = $2")
        .bind(qr_code_value)
        .bind(id)
        .execute(pool)
        .await?;
    Ok(())
}

pub async fn get_ticket(pool: &PgPool, id: i64) -> Result<Option<Ticket>> {
    sqlx::query_as::<_, Ticket>("SELECT * FROM tickets WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

pub async fn list_tickets_by_user(pool: &PgPool, user_id: i64) -> Result<Vec<Ticket>> {
    sqlx::query_as::<_, Ticket>(
        "SELECT * FROM tickets WHERE user_id = $1 ORDER BY created_at DESC",
    )
    .bind(user_id)
    .fetch_all(pool)
    .await
}

pub async fn checkin_ticket(pool: &PgPool, id: i64, at: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tickets SET status = $1, checkin_time = $2 WHERE id = $3 AND status = $4",
    )
    .bind(ticket_status::CHECKED_IN)
    .bind(at)
    .bind(id)
    .bind(ticket_status::BOOKED)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

pub async fn checkout_ticket(pool: &PgPool, id: i64, at: DateTime<Utc>) -> Result<u64> {
    let result = sqlx::query(
        "UPDATE tickets SET status = $1, checkout_time = $2 WHERE id = $3 AND status = $4",
    )
    .bind(ticket_status::CHECKED_OUT)
    .bind(at)
    .bind(id)
    .bind(ticket_status::CHECKED_IN)
    .execute(pool)
    .await?;

    Ok(result.rows_affected())
}

/// Expired PENDING holds, locked for this sweep. SKIP LOCKED keeps multiple
/// sweepers (or a sweeper racing a settlement transaction) from blocking on
/// each other's rows.
pub async fn lock_expired_holds(
    tx: &mut SqlxTransaction<'_, Postgres>,
    now: DateTime<Utc>,
    limit: i64,
) -> Result<Vec<i64>> {
    let rows: Vec<(i64,)> = sqlx::query_as(
        r#"
        SELECT id FROM tickets
        WHERE status = $1 AND hold_expires_at IS NOT NULL AND hold_expires_at <= $2
        ORDER BY hold_expires_at ASC
        LIMIT $3
        FOR UPDATE SKIP LOCKED
        "#,
    )
    .bind(ticket_status::PENDING)
    .bind(now)
    .bind(limit)
    .fetch_all(&mut **tx)
    .await?;

    Ok(rows.into_iter().map(|(id,)| id).collect())
}

/// Display codes for a set of physical seats, in input order.
pub async fn get_seat_codes(pool: &PgPool, seat_ids: &[i64]) -> Result<Vec<String>> {
    let rows: Vec<(i64, String)> =
        sqlx::query_as("SELECT id, seat_code FROM seats WHERE id = ANY($1)")
            .bind(seat_ids)
            .fetch_all(pool)
            .await?;

    let mut codes = Vec::with_capacity(seat_ids.len());
    for id in seat_ids {
        if let Some((_, code)) = rows.iter().find(|(seat_id, _)| seat_id == id) {
            codes.push(code.clone());
        }
    }
    Ok(codes)
}

// --- Wallet queries ---

/// Reads the balance under a row lock held until the surrounding transaction
/// ends. Prevents two concurrent debits from both passing the funds check
/// against the same stale balance.
pub async fn wallet_balance_for_update(
    tx: &mut SqlxTransaction<'_, Postgres>,
    user_id: i64,
) -> Result<Option<BigDecimal>> {
    let row: Option<(BigDecimal,)> =
        sqlx::query_as("SELECT balance FROM wallets WHERE user_id = $1 FOR UPDATE")
            .bind(user_id)
            .fetch_optional(&mut **tx)
            .await?;

    Ok(row.map(|(b,)| b))
}

/// Debits only when the balance still covers the amount; the predicate is a
/// second guard on top of the row lock.
pub async fn debit_wallet(
    tx: &mut SqlxTransaction<'_, Postgres>,
    user_id: i64,
    amount: &BigDecimal,
) -> Result<bool> {
    let result = sqlx::query(
        "UPDATE wallets SET balance = balance - $1 WHERE user_id = $2 AND balance >= $1",
    )
    .bind(amount)
    .bind(user_id)
    .execute(&mut **tx)
    .await?;

    Ok(result.rows_affected() == 1)
}

pub async fn wallet_balance(pool: &PgPool, user_id: i64) -> Result<Option<BigDecimal>> {
    let row: Option<(BigDecimal,)> =
        sqlx::query_as("SELECT balance FROM wallets WHERE user_id = $1")
            .bind(user_id)
            .fetch_optional(pool)
            .await?;

    Ok(row.map(|(b,)| b))
}

// --- Bill queries ---

pub async fn insert_bill(
    tx: &mut SqlxTransaction<'_, Postgres>,
    user_id: i64,
    total_amount: &BigDecimal,
    currency: &str,
    payment_method: &str,
    payment_status: &str,
    gateway_ref: Option<&str>,
) -> Result<Bill> {
    sqlx::query_as::<_, Bill>(
        r#"
        INSERT INTO bills (user_id, total_amount, currency, payment_method, payment_status, gateway_ref)
        VALUES ($1, $2, $3, $4, $5, $6)
        RETURNING *
        "#,
    )
    .bind(user_id)
    .bind(total_amount)
    .bind(currency)
    .bind(payment_method)
    .bind(payment_status)
    .bind(gateway_ref)
    .fetch_one(&mut **tx)
    .await
}

pub async fn get_bill(pool: &PgPool, id: i64) -> Result<Option<Bill>> {
    sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE id = $1")
        .bind(id)
        .fetch_optional(pool)
        .await
}

/// Replay detection for the gateway callback: one bill per transaction
/// reference, ever.
pub async fn find_bill_by_gateway_ref(
    tx: &mut SqlxTransaction<'_, Postgres>,
    gateway_ref: &str,
) -> Result<Option<Bill>> {
    sqlx::query_as::<_, Bill>("SELECT * FROM bills WHERE gateway_ref = $1")
        .bind(gateway_ref)
        .fetch_optional(&mut **tx)
        .await
}

// --- User queries ---

pub async fn get_user(pool: &PgPool, id: i64) -> Result<Option<crate::db::models::User>> {
    sqlx::query_as::<_, crate::db::models::User>(
        "SELECT id, email, full_name FROM users WHERE id = $1",
    )
    .bind(id)
    .fetch_optional(pool)
    .await
}
