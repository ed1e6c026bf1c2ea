use axum::{
    Json,
    extract::{Path, State},
    response::IntoResponse,
};
use serde_json::json;

use crate::AppState;
use crate::db::queries;
use crate::error::AppError;
use crate::middleware::AuthContext;

pub async fn get_ticket(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let ticket = queries::get_ticket(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Ticket {} not found", id)))?;

    if !auth.can_access_user(ticket.user_id) {
        return Err(AppError::Forbidden("not your ticket".to_string()));
    }

    Ok(Json(ticket))
}

pub async fn list_user_tickets(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !auth.can_access_user(user_id) {
        return Err(AppError::Forbidden("not your tickets".to_string()));
    }

    let tickets = queries::list_tickets_by_user(&state.db, user_id).await?;
    Ok(Json(tickets))
}

pub async fn get_bill(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    let bill = queries::get_bill(&state.db, id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("Bill {} not found", id)))?;

    if !auth.can_access_user(bill.user_id) {
        return Err(AppError::Forbidden("not your bill".to_string()));
    }

    Ok(Json(bill))
}

pub async fn get_wallet(
    State(state): State<AppState>,
    auth: AuthContext,
    Path(user_id): Path<i64>,
) -> Result<impl IntoResponse, AppError> {
    if !auth.can_access_user(user_id) {
        return Err(AppError::Forbidden("not your wallet".to_string()));
    }

    let balance = queries::wallet_balance(&state.db, user_id)
        .await?
        .ok_or_else(|| AppError::NotFound(format!("No wallet for user {}", user_id)))?;

    Ok(Json(json!({ "user_id": user_id, "balance": balance })))
}
