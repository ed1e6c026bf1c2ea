use axum::{
    extract::{Query, State},
    response::Redirect,
};
use std::collections::HashMap;
use tracing::error;

use crate::AppState;
use crate::services::settlement::GatewayReturnOutcome;

/// The gateway's signed return. Whatever happens, the user's browser ends
/// up on the frontend result page; the purchase outcome travels in query
/// params. Replayed returns resolve to the original success.
pub async fn payment_return(
    State(state): State<AppState>,
    Query(params): Query<HashMap<String, String>>,
) -> Redirect {
    let base = &state.config.frontend_base_url;

    match state.checkout.confirm_gateway_return(&params).await {
        Ok(GatewayReturnOutcome::Booked { ticket_ids, .. }) => {
            Redirect::to(&result_url(base, "success", "OK", Some(&ticket_ids)))
        }
        Ok(GatewayReturnOutcome::Rejected { reason }) => {
            Redirect::to(&result_url(base, "failed", &reason, None))
        }
        Err(e) => {
            error!("gateway return settlement error: {e}");
            Redirect::to(&result_url(base, "failed", "settlement_error", None))
        }
    }
}

fn result_url(base: &str, status: &str, reason: &str, ticket_ids: Option<&[i64]>) -> String {
    let mut url = format!("{base}/dashboard/payment/result?status={status}");

    if let Some(ids) = ticket_ids {
        let joined = ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(",");
        url.push_str("&ticketIds=");
        url.push_str(&encode(&joined));
    }

    url.push_str("&reason=");
    url.push_str(&encode(reason));
    url
}

fn encode(value: &str) -> String {
    url::form_urlencoded::byte_serialize(value.as_bytes()).collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn result_url_carries_ticket_ids_and_reason() {
        let url = result_url("http://fe", "success", "OK", Some(&[10, 11]));
        assert_eq!(
            url,
            "http://fe/dashboard/payment/result?status=success&ticketIds=10%2C11&reason=OK"
        );
    }

    #[test]
    fn result_url_without_tickets() {
        let url = result_url("http://fe", "failed", "invalid_signature", None);
        assert!(url.contains("status=failed"));
        assert!(url.contains("reason=invalid_signature"));
        assert!(!url.contains("ticketIds"));
    }
}
