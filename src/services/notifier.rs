use async_trait::async_trait;
use base64::{Engine as _, engine::general_purpose::STANDARD as BASE64};
use bigdecimal::BigDecimal;
use reqwest::Client;
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info};

use crate::db::models::Event;
use crate::db::queries;

/// Renders a QR artifact for a ticket payload. The rendering itself is an
/// external service; this core only hands over content and stores bytes.
#[async_trait]
pub trait QrEncoder: Send + Sync {
    async fn encode(&self, content: &str) -> anyhow::Result<Vec<u8>>;
}

/// Delivers a confirmation message. Fire-and-forget from the purchase's
/// point of view.
#[async_trait]
pub trait EmailSender: Send + Sync {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        inline_png: Option<&[u8]>,
    ) -> anyhow::Result<()>;
}

/// QR rendering over a HTTP service: POST {content, size} -> PNG bytes.
#[derive(Clone)]
pub struct HttpQrEncoder {
    client: Client,
    base_url: String,
}

impl HttpQrEncoder {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

#[async_trait]
impl QrEncoder for HttpQrEncoder {
    async fn encode(&self, content: &str) -> anyhow::Result<Vec<u8>> {
        let response = self
            .client
            .post(&self.base_url)
            .json(&json!({ "content": content, "size": 300 }))
            .send()
            .await?
            .error_for_status()?;

        Ok(response.bytes().await?.to_vec())
    }
}

/// Email delivery over the internal notification relay.
#[derive(Clone)]
pub struct HttpEmailSender {
    client: Client,
    base_url: String,
}

impl HttpEmailSender {
    pub fn new(base_url: String) -> Self {
        let client = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .unwrap_or_default();
        Self { client, base_url }
    }
}

#[async_trait]
impl EmailSender for HttpEmailSender {
    async fn send(
        &self,
        to: &str,
        subject: &str,
        html_body: &str,
        inline_png: Option<&[u8]>,
    ) -> anyhow::Result<()> {
        self.client
            .post(&self.base_url)
            .json(&json!({
                "to": to,
                "subject": subject,
                "html": html_body,
                "inline_png_base64": inline_png.map(|b| BASE64.encode(b)),
            }))
            .send()
            .await?
            .error_for_status()?;

        Ok(())
    }
}

/// Collaborator that is configured away in dev/test environments.
pub struct DisabledCollaborator;

#[async_trait]
impl QrEncoder for DisabledCollaborator {
    async fn encode(&self, _content: &str) -> anyhow::Result<Vec<u8>> {
        anyhow::bail!("QR service not configured")
    }
}

#[async_trait]
impl EmailSender for DisabledCollaborator {
    async fn send(
        &self,
        _to: &str,
        _subject: &str,
        _html_body: &str,
        _inline_png: Option<&[u8]>,
    ) -> anyhow::Result<()> {
        anyhow::bail!("email service not configured")
    }
}

/// Post-commit confirmation work: per-ticket QR artifacts plus one combined
/// e-ticket email. Runs outside the settlement transaction; every failure
/// in here is logged and swallowed, because the sale is already final.
#[derive(Clone)]
pub struct TicketNotifier {
    pool: PgPool,
    qr: Arc<dyn QrEncoder>,
    email: Arc<dyn EmailSender>,
}

impl TicketNotifier {
    pub fn new(pool: PgPool, qr: Arc<dyn QrEncoder>, email: Arc<dyn EmailSender>) -> Self {
        Self { pool, qr, email }
    }

    /// Fire-and-forget: detaches onto the runtime and returns immediately.
    pub fn spawn_confirmation(
        &self,
        user_id: i64,
        event: Event,
        ticket_ids: Vec<i64>,
        seat_codes: Vec<String>,
        total: BigDecimal,
    ) {
        let notifier = self.clone();
        tokio::spawn(async move {
            if let Err(e) = notifier
                .send_confirmation(user_id, &event, &ticket_ids, &seat_codes, &total)
                .await
            {
                error!(user_id, ?ticket_ids, "confirmation delivery failed: {e:#}");
            }
        });
    }

    async fn send_confirmation(
        &self,
        user_id: i64,
        event: &Event,
        ticket_ids: &[i64],
        seat_codes: &[String],
        total: &BigDecimal,
    ) -> anyhow::Result<()> {
        // Per-ticket artifact, replacing the hold placeholder. A failed
        // render for one ticket must not stop the rest.
        for &ticket_id in ticket_ids {
            match self.qr.encode(&ticket_id.to_string()).await {
                Ok(png) => {
                    let encoded = BASE64.encode(&png);
                    if let Err(e) = queries::update_ticket_qr(&self.pool, ticket_id, &encoded).await
                    {
                        error!(ticket_id, "failed to store QR artifact: {e}");
                    }
                }
                Err(e) => debug!(ticket_id, "QR render skipped: {e}"),
            }
        }

        let user = queries::get_user(&self.pool, user_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("user {user_id} not found"))?;

        // One QR covers the whole batch when several tickets were bought
        // together.
        let combined_content = if ticket_ids.len() == 1 {
            ticket_ids[0].to_string()
        } else {
            format!(
                "TICKETS:{}",
                ticket_ids
                    .iter()
                    .map(|id| id.to_string())
                    .collect::<Vec<_>>()
                    .join(",")
            )
        };
        let combined_png = self.qr.encode(&combined_content).await.ok();

        let subject = format!("[Event] E-ticket: {}", event.title);
        let body = confirmation_html(
            user.full_name.as_deref().unwrap_or("customer"),
            &event.title,
            ticket_ids,
            seat_codes,
            total,
            &event.starts_at.format("%H:%M %d/%m/%Y").to_string(),
        );

        self.email
            .send(&user.email, &subject, &body, combined_png.as_deref())
            .await?;

        info!(user_id, ?ticket_ids, "confirmation email sent");
        Ok(())
    }
}

fn confirmation_html(
    name: &str,
    event_title: &str,
    ticket_ids: &[i64],
    seat_codes: &[String],
    total: &BigDecimal,
    starts_at: &str,
) -> String {
    let ids = ticket_ids
        .iter()
        .map(|id| format!("#{id}"))
        .collect::<Vec<_>>()
        .join(", ");

    format!(
        "<div><p>Hello <strong>{name}</strong>, your payment succeeded.</p>\
         <h1>{event_title}</h1>\
         <table>\
         <tr><td>Tickets:</td><td>{ids}</td></tr>\
         <tr><td>Seats:</td><td>{seats}</td></tr>\
         <tr><td>Total:</td><td>{total}</td></tr>\
         <tr><td>Starts:</td><td>{starts_at}</td></tr>\
         </table>\
         <p>Present the attached QR code at check-in.</p></div>",
        seats = seat_codes.join(", "),
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn combined_content_groups_multiple_tickets() {
        let ids = [10i64, 11, 12];
        let content = format!(
            "TICKETS:{}",
            ids.iter()
                .map(|id| id.to_string())
                .collect::<Vec<_>>()
                .join(",")
        );
        assert_eq!(content, "TICKETS:10,11,12");
    }

    #[test]
    fn confirmation_html_lists_tickets_and_seats() {
        let html = confirmation_html(
            "Alice",
            "Tech Summit",
            &[10, 11],
            &["A1".to_string(), "A2".to_string()],
            &BigDecimal::from(700_000),
            "09:00 01/06/2025",
        );

        assert!(html.contains("#10, #11"));
        assert!(html.contains("A1, A2"));
        assert!(html.contains("Tech Summit"));
    }
}
