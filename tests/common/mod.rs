//! Shared fixture for the Postgres-backed integration tests. Each fixture
//! seeds its own event so the seat-uniqueness index never couples tests.
#![allow(dead_code)]

use hmac::{Hmac, Mac};
use sha2::Sha512;
use sqlx::PgPool;
use sqlx::migrate::Migrator;
use std::collections::BTreeMap;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use uuid::Uuid;

use eventpass_core::config::Config;
use eventpass_core::gateway::GatewayClient;
use eventpass_core::services::notifier::{DisabledCollaborator, EmailSender, QrEncoder};
use eventpass_core::services::{
    CheckoutService, Clock, ReservationLedger, SeatCatalog, SystemClock, TicketNotifier,
};

pub const SECRET: &str = "test-secret";

pub fn test_config() -> Config {
    Config {
        server_port: 0,
        database_url: std::env::var("DATABASE_URL").unwrap_or_default(),
        frontend_base_url: "http://localhost:3000".to_string(),
        gateway_pay_url: "https://pay.example.test/checkout".to_string(),
        gateway_merchant_code: "UNI_EVENTS".to_string(),
        gateway_hash_secret: SECRET.to_string(),
        gateway_return_url: "http://localhost:8080/api/payment/return".to_string(),
        email_service_url: None,
        qr_service_url: None,
        hold_ttl_secs: 900,
        sweep_interval_secs: 60,
    }
}

pub async fn test_pool() -> PgPool {
    let url = std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for tests");
    let pool = PgPool::connect(&url).await.expect("Failed to connect to test DB");

    Migrator::new(Path::new("./migrations"))
        .await
        .expect("Failed to load migrations")
        .run(&pool)
        .await
        .expect("Failed to run migrations on test DB");

    pool
}

pub struct Services {
    pub catalog: SeatCatalog,
    pub ledger: ReservationLedger,
    pub checkout: CheckoutService,
}

pub fn build_services(pool: &PgPool, clock: Arc<dyn Clock>) -> Services {
    let config = test_config();
    let catalog = SeatCatalog::new(pool.clone());
    let ledger = ReservationLedger::new(pool.clone(), clock.clone(), config.hold_ttl_secs);
    let gateway = GatewayClient::new(&config);

    let qr: Arc<dyn QrEncoder> = Arc::new(DisabledCollaborator);
    let email: Arc<dyn EmailSender> = Arc::new(DisabledCollaborator);
    let notifier = TicketNotifier::new(pool.clone(), qr, email);

    let checkout = CheckoutService::new(
        pool.clone(),
        catalog.clone(),
        ledger.clone(),
        gateway,
        clock,
        notifier,
    );

    Services {
        catalog,
        ledger,
        checkout,
    }
}

pub fn default_services(pool: &PgPool) -> Services {
    build_services(pool, Arc::new(SystemClock))
}

pub struct Fixture {
    pub user_id: i64,
    pub other_user_id: i64,
    pub event_id: i64,
    /// VIP, price 500000.
    pub vip_seat_id: i64,
    /// STANDARD, price 200000.
    pub standard_seat_id: i64,
    /// Configured for the event but not on sale.
    pub blocked_seat_id: i64,
}

pub async fn seed(pool: &PgPool, wallet_balance: i64) -> Fixture {
    let user_id = insert_user(pool, wallet_balance).await;
    let other_user_id = insert_user(pool, wallet_balance).await;

    let (event_id,): (i64,) = sqlx::query_as(
        r#"
        INSERT INTO events (area_id, title, starts_at, ends_at, status)
        VALUES (1, $1, now() + interval '7 days', now() + interval '8 days', 'OPEN')
        RETURNING id
        "#,
    )
    .bind(format!("Integration Event {}", Uuid::new_v4()))
    .fetch_one(pool)
    .await
    .expect("insert event");

    let vip_seat_id = insert_seat(pool, event_id, "VIP", "AVAILABLE").await;
    let standard_seat_id = insert_seat(pool, event_id, "STANDARD", "AVAILABLE").await;
    let blocked_seat_id = insert_seat(pool, event_id, "VIP", "BLOCKED").await;

    for (name, price) in [("VIP", 500_000i64), ("STANDARD", 200_000i64)] {
        sqlx::query(
            "INSERT INTO price_categories (event_id, name, price, is_active) VALUES ($1, $2, $3, TRUE)",
        )
        .bind(event_id)
        .bind(name)
        .bind(price)
        .execute(pool)
        .await
        .expect("insert price category");
    }

    Fixture {
        user_id,
        other_user_id,
        event_id,
        vip_seat_id,
        standard_seat_id,
        blocked_seat_id,
    }
}

async fn insert_user(pool: &PgPool, wallet_balance: i64) -> i64 {
    let (user_id,): (i64,) =
        sqlx::query_as("INSERT INTO users (email, full_name) VALUES ($1, $2) RETURNING id")
            .bind(format!("buyer-{}@example.test", Uuid::new_v4()))
            .bind("Integration Buyer")
            .fetch_one(pool)
            .await
            .expect("insert user");

    sqlx::query("INSERT INTO wallets (user_id, balance) VALUES ($1, $2)")
        .bind(user_id)
        .bind(wallet_balance)
        .execute(pool)
        .await
        .expect("insert wallet");

    user_id
}

async fn insert_seat(pool: &PgPool, event_id: i64, seat_type: &str, sale_status: &str) -> i64 {
    let (seat_id,): (i64,) = sqlx::query_as(
        "INSERT INTO seats (area_id, seat_code) VALUES (1, $1) RETURNING id",
    )
    .bind(format!("S{}", Uuid::new_v4().simple()))
    .fetch_one(pool)
    .await
    .expect("insert seat");

    sqlx::query(
        "INSERT INTO event_seat_layout (event_id, seat_id, seat_type, status) VALUES ($1, $2, $3, $4)",
    )
    .bind(event_id)
    .bind(seat_id)
    .bind(seat_type)
    .bind(sale_status)
    .execute(pool)
    .await
    .expect("insert layout row");

    seat_id
}

/// Signs a gateway-return parameter set the way the gateway itself would:
/// sorted keys, url-encoded values, HMAC-SHA512 over the canonical string.
pub fn sign_return_params(params: &mut HashMap<String, String>) {
    let canonical = params
        .iter()
        .filter(|(k, v)| k.as_str() != "signature" && !v.is_empty())
        .collect::<BTreeMap<_, _>>()
        .into_iter()
        .map(|(k, v)| {
            let encoded: String = url::form_urlencoded::byte_serialize(v.as_bytes()).collect();
            format!("{}={}", k, encoded)
        })
        .collect::<Vec<_>>()
        .join("&");

    let mut mac =
        Hmac::<Sha512>::new_from_slice(SECRET.as_bytes()).expect("HMAC accepts any key length");
    mac.update(canonical.as_bytes());

    params.insert(
        "signature".to_string(),
        hex::encode(mac.finalize().into_bytes()),
    );
}

/// Pulls a query parameter back out of the payer redirect URL.
pub fn url_param(payment_url: &str, key: &str) -> Option<String> {
    let parsed = url::Url::parse(payment_url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == key)
        .map(|(_, v)| v.into_owned())
}

pub async fn ticket_count_for_event(pool: &PgPool, event_id: i64) -> i64 {
    let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM tickets WHERE event_id = $1")
        .bind(event_id)
        .fetch_one(pool)
        .await
        .expect("count tickets");
    count
}
