use axum::{
    Json,
    extract::State,
    http::HeaderMap,
    response::{IntoResponse, Redirect, Response},
};

use crate::AppState;
use crate::error::AppError;
use crate::gateway;
use crate::middleware::AuthContext;
use crate::services::settlement::{PurchaseRequest, SettlementOutcome};

/// Purchase entry point for both payment methods. The wallet path answers
/// with the receipt; the gateway path answers with a redirect to the
/// external payer and finishes later in the return handler.
pub async fn purchase(
    State(state): State<AppState>,
    auth: AuthContext,
    headers: HeaderMap,
    Json(request): Json<PurchaseRequest>,
) -> Result<Response, AppError> {
    let client_ip = gateway::client_ip(&headers);

    let outcome = state
        .checkout
        .purchase(auth.user_id, request, client_ip)
        .await?;

    Ok(match outcome {
        SettlementOutcome::RedirectToPayer { payment_url } => {
            Redirect::to(&payment_url).into_response()
        }
        SettlementOutcome::Settled(receipt) => Json(receipt).into_response(),
    })
}
