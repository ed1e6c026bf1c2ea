pub mod config;
pub mod db;
pub mod error;
pub mod gateway;
pub mod handlers;
pub mod middleware;
pub mod services;
pub mod startup;

use axum::{
    Router,
    routing::{get, post},
};

use crate::config::Config;
use crate::services::CheckoutService;

#[derive(Clone)]
pub struct AppState {
    pub db: sqlx::PgPool,
    pub config: Config,
    pub checkout: CheckoutService,
}

pub fn create_app(state: AppState) -> Router {
    Router::new()
        .route("/health", get(handlers::health))
        .route("/api/tickets/purchase", post(handlers::purchase::purchase))
        .route("/api/payment/return", get(handlers::callback::payment_return))
        .route("/api/tickets/:id", get(handlers::tickets::get_ticket))
        .route(
            "/api/users/:id/tickets",
            get(handlers::tickets::list_user_tickets),
        )
        .route("/api/users/:id/wallet", get(handlers::tickets::get_wallet))
        .route("/api/bills/:id", get(handlers::tickets::get_bill))
        .route("/api/staff/checkin", post(handlers::checkin::checkin))
        .route("/api/staff/checkout", post(handlers::checkin::checkout))
        .with_state(state)
}
