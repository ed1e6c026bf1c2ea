use axum::{Json, extract::State, response::IntoResponse};
use chrono::Utc;
use serde::Deserialize;
use serde_json::json;
use tracing::info;

use crate::AppState;
use crate::db::models::ticket_status;
use crate::db::queries;
use crate::error::AppError;
use crate::middleware::AuthContext;

#[derive(Debug, Deserialize)]
pub struct ScanRequest {
    pub ticket_id: i64,
}

/// Staff desk scan: BOOKED → CHECKED_IN. Out-of-order scans (not booked,
/// already checked in) are rejected without touching the row.
pub async fn checkin(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;

    let updated = queries::checkin_ticket(&state.db, req.ticket_id, Utc::now()).await?;
    if updated == 0 {
        return Err(AppError::Validation(format!(
            "ticket {} is not in BOOKED state",
            req.ticket_id
        )));
    }

    info!(ticket_id = req.ticket_id, staff = auth.user_id, "ticket checked in");
    Ok(Json(json!({
        "ticket_id": req.ticket_id,
        "status": ticket_status::CHECKED_IN,
    })))
}

/// CHECKED_IN → CHECKED_OUT.
pub async fn checkout(
    State(state): State<AppState>,
    auth: AuthContext,
    Json(req): Json<ScanRequest>,
) -> Result<impl IntoResponse, AppError> {
    require_staff(&auth)?;

    let updated = queries::checkout_ticket(&state.db, req.ticket_id, Utc::now()).await?;
    if updated == 0 {
        return Err(AppError::Validation(format!(
            "ticket {} is not in CHECKED_IN state",
            req.ticket_id
        )));
    }

    info!(ticket_id = req.ticket_id, staff = auth.user_id, "ticket checked out");
    Ok(Json(json!({
        "ticket_id": req.ticket_id,
        "status": ticket_status::CHECKED_OUT,
    })))
}

fn require_staff(auth: &AuthContext) -> Result<(), AppError> {
    if auth.is_staff() {
        Ok(())
    } else {
        Err(AppError::Forbidden("staff role required".to_string()))
    }
}
