use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sqlx::FromRow;
use sqlx::types::BigDecimal;

/// Ticket lifecycle states. A seat is considered occupied while its ticket
/// is in any of [`ticket_status::NON_TERMINAL`].
pub mod ticket_status {
    pub const PENDING: &str = "PENDING";
    pub const BOOKED: &str = "BOOKED";
    pub const CANCELLED: &str = "CANCELLED";
    pub const EXPIRED: &str = "EXPIRED";
    pub const CHECKED_IN: &str = "CHECKED_IN";
    pub const CHECKED_OUT: &str = "CHECKED_OUT";

    /// States that keep the (event, seat) pair occupied.
    pub const NON_TERMINAL: [&str; 4] = [PENDING, BOOKED, CHECKED_IN, CHECKED_OUT];
}

pub mod event_status {
    pub const OPEN: &str = "OPEN";
}

/// Sale-configuration state of a seat within an event layout. Configuration
/// only; whether someone holds the seat lives in `Ticket`.
pub mod seat_sale_status {
    pub const AVAILABLE: &str = "AVAILABLE";
}

pub mod bill_status {
    pub const PAID: &str = "PAID";
}

pub mod payment_method {
    pub const GATEWAY: &str = "GATEWAY";
    pub const WALLET: &str = "WALLET";
}

/// Placeholder stored in `qr_code_value` while a ticket is only a hold.
/// The column is NOT NULL; the real artifact replaces it after promotion.
pub const QR_PLACEHOLDER: &str = "PENDING_QR";

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Event {
    pub id: i64,
    pub area_id: Option<i64>,
    pub title: String,
    pub starts_at: DateTime<Utc>,
    pub ends_at: DateTime<Utc>,
    pub status: String,
}

/// A seat as configured for one event: the physical seat joined with the
/// per-event layout row. `status` here is sale configuration (AVAILABLE or
/// not), never occupancy; occupancy lives in `Ticket`.
#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct EventSeat {
    pub seat_id: i64,
    pub area_id: i64,
    pub seat_code: String,
    pub seat_type: String,
    pub status: String,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct PriceCategory {
    pub id: i64,
    pub event_id: i64,
    pub name: String,
    pub price: BigDecimal,
    pub is_active: bool,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Ticket {
    pub id: i64,
    pub event_id: i64,
    pub user_id: i64,
    pub category_id: i64,
    pub seat_id: Option<i64>,
    pub bill_id: Option<i64>,
    pub status: String,
    pub qr_code_value: String,
    pub qr_issued_at: Option<DateTime<Utc>>,
    pub hold_expires_at: Option<DateTime<Utc>>,
    pub checkin_time: Option<DateTime<Utc>>,
    pub checkout_time: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct Bill {
    pub id: i64,
    pub user_id: i64,
    pub total_amount: BigDecimal,
    pub currency: String,
    pub payment_method: String,
    pub payment_status: String,
    pub gateway_ref: Option<String>,
    pub created_at: DateTime<Utc>,
}

#[derive(Debug, Clone, FromRow, Serialize, Deserialize)]
pub struct User {
    pub id: i64,
    pub email: String,
    pub full_name: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn non_terminal_states_keep_pending_and_booked() {
        assert!(ticket_status::NON_TERMINAL.contains(&ticket_status::PENDING));
        assert!(ticket_status::NON_TERMINAL.contains(&ticket_status::BOOKED));
        assert!(!ticket_status::NON_TERMINAL.contains(&ticket_status::CANCELLED));
        assert!(!ticket_status::NON_TERMINAL.contains(&ticket_status::EXPIRED));
    }
}
