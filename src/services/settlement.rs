use async_trait::async_trait;
use bigdecimal::{BigDecimal, ToPrimitive};
use serde::{Deserialize, Serialize};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use crate::db::models::{Event, bill_status, payment_method};
use crate::db::queries;
use crate::error::AppError;
use crate::gateway::{APPROVED, GatewayClient, OrderDescriptor};
use crate::services::catalog::{PricedSeat, SeatCatalog};
use crate::services::clock::Clock;
use crate::services::notifier::TicketNotifier;
use crate::services::reservation::ReservationLedger;

const CURRENCY: &str = "VND";

#[derive(Debug, Deserialize)]
pub struct PurchaseRequest {
    pub event_id: i64,
    pub seat_ids: Vec<i64>,
    pub method: PaymentMethodKind,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PaymentMethodKind {
    Gateway,
    Wallet,
}

/// What a strategy hands back: either the purchase is finished (wallet) or
/// the user's browser must travel to the external payer first (gateway).
#[derive(Debug)]
pub enum SettlementOutcome {
    RedirectToPayer { payment_url: String },
    Settled(WalletReceipt),
}

#[derive(Debug, Serialize)]
pub struct WalletReceipt {
    pub bill_id: i64,
    pub booked_ticket_ids: Vec<i64>,
    pub new_wallet_balance: BigDecimal,
}

/// Result of the gateway's signed return. `already_settled` marks a replay
/// of a callback that was fully processed before.
#[derive(Debug)]
pub enum GatewayReturnOutcome {
    Booked {
        ticket_ids: Vec<i64>,
        bill_id: i64,
        already_settled: bool,
    },
    Rejected {
        reason: String,
    },
}

/// Validated input every strategy settles from. Produced once by the shared
/// preamble so neither strategy re-implements seat validation.
pub struct SettlementContext {
    pub user_id: i64,
    pub event: Event,
    pub lines: Vec<PricedSeat>,
    pub total: BigDecimal,
    pub client_ip: String,
}

#[async_trait]
pub trait SettlementStrategy: Send + Sync {
    async fn settle(&self, ctx: SettlementContext) -> Result<SettlementOutcome, AppError>;
}

/// Two-phase strategy: hold now, collect through the external payer, settle
/// in the callback. Phase one ends at the redirect.
struct GatewaySettlement {
    ledger: ReservationLedger,
    gateway: GatewayClient,
    clock: Arc<dyn Clock>,
}

#[async_trait]
impl SettlementStrategy for GatewaySettlement {
    async fn settle(&self, ctx: SettlementContext) -> Result<SettlementOutcome, AppError> {
        let hold_ids = self
            .ledger
            .hold(ctx.event.id, ctx.user_id, &ctx.lines)
            .await?;

        let descriptor = OrderDescriptor {
            user_id: ctx.user_id,
            event_id: ctx.event.id,
            seat_ids: ctx.lines.iter().map(|l| l.seat.seat_id).collect(),
            category_ids: ctx.lines.iter().map(|l| l.category.id).collect(),
            hold_ticket_ids: hold_ids.clone(),
        };

        let amount_major = ctx
            .total
            .to_i64()
            .ok_or_else(|| AppError::Settlement("total not representable".to_string()))?;

        let txn_ref = Uuid::new_v4().simple().to_string();
        let payment_url = self.gateway.payment_url(
            &txn_ref,
            amount_major,
            &descriptor.encode(),
            &ctx.client_ip,
            self.clock.now(),
        );

        info!(
            user_id = ctx.user_id,
            event_id = ctx.event.id,
            ?hold_ids,
            txn_ref,
            "redirecting to payment gateway"
        );

        Ok(SettlementOutcome::RedirectToPayer { payment_url })
    }
}

/// Single-transaction strategy: hold, lock the wallet row, check funds,
/// debit, bill, promote, commit. Every failure rolls the whole unit back to
/// zero net effect.
struct WalletSettlement {
    pool: PgPool,
    ledger: ReservationLedger,
}

impl WalletSettlement {
    async fn settle_in_tx(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        ctx: &SettlementContext,
    ) -> Result<(i64, Vec<i64>), AppError> {
        let hold_ids = self
            .ledger
            .hold_in_tx(tx, ctx.event.id, ctx.user_id, &ctx.lines)
            .await?;

        let balance = queries::wallet_balance_for_update(tx, ctx.user_id)
            .await?
            .ok_or_else(|| {
                AppError::Validation(format!("no wallet for user {}", ctx.user_id))
            })?;

        if balance < ctx.total {
            // The outer rollback would reclaim the holds anyway; deleting
            // them here as well keeps the two cleanup paths interchangeable.
            queries::delete_pending_by_ids(&mut **tx, &hold_ids).await?;
            return Err(AppError::InsufficientFunds);
        }

        if !queries::debit_wallet(tx, ctx.user_id, &ctx.total).await? {
            queries::delete_pending_by_ids(&mut **tx, &hold_ids).await?;
            return Err(AppError::InsufficientFunds);
        }

        let bill = queries::insert_bill(
            tx,
            ctx.user_id,
            &ctx.total,
            CURRENCY,
            payment_method::WALLET,
            bill_status::PAID,
            None,
        )
        .await?;

        self.ledger.promote_in_tx(tx, &hold_ids, bill.id).await?;

        Ok((bill.id, hold_ids))
    }
}

#[async_trait]
impl SettlementStrategy for WalletSettlement {
    async fn settle(&self, ctx: SettlementContext) -> Result<SettlementOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        let (bill_id, booked_ids) = match self.settle_in_tx(&mut tx, &ctx).await {
            Ok(ok) => ok,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        tx.commit().await?;

        let new_wallet_balance = queries::wallet_balance(&self.pool, ctx.user_id)
            .await?
            .unwrap_or_else(|| BigDecimal::from(0));

        info!(
            user_id = ctx.user_id,
            event_id = ctx.event.id,
            bill_id,
            ?booked_ids,
            "wallet purchase settled"
        );

        Ok(SettlementOutcome::Settled(WalletReceipt {
            bill_id,
            booked_ticket_ids: booked_ids,
            new_wallet_balance,
        }))
    }
}

/// Purchase orchestrator: one preamble (catalog validation, pricing, seat
/// pre-check), then the chosen settlement strategy, then fire-and-forget
/// confirmation once something is actually booked.
#[derive(Clone)]
pub struct CheckoutService {
    pool: PgPool,
    catalog: SeatCatalog,
    ledger: ReservationLedger,
    gateway: GatewayClient,
    clock: Arc<dyn Clock>,
    notifier: TicketNotifier,
}

impl CheckoutService {
    pub fn new(
        pool: PgPool,
        catalog: SeatCatalog,
        ledger: ReservationLedger,
        gateway: GatewayClient,
        clock: Arc<dyn Clock>,
        notifier: TicketNotifier,
    ) -> Self {
        Self {
            pool,
            catalog,
            ledger,
            gateway,
            clock,
            notifier,
        }
    }

    pub async fn purchase(
        &self,
        user_id: i64,
        request: PurchaseRequest,
        client_ip: String,
    ) -> Result<SettlementOutcome, AppError> {
        if request.seat_ids.is_empty() {
            return Err(AppError::BadRequest("seat_ids is empty".to_string()));
        }

        let event = self.catalog.open_event(request.event_id).await?;
        let (lines, total) = self.catalog.price_seats(&event, &request.seat_ids).await?;
        self.ledger.precheck(event.id, &request.seat_ids).await?;

        let seat_codes: Vec<String> = lines.iter().map(|l| l.seat.seat_code.clone()).collect();
        let notify_event = event.clone();
        let notify_total = total.clone();

        let ctx = SettlementContext {
            user_id,
            event,
            lines,
            total,
            client_ip,
        };

        let strategy: Box<dyn SettlementStrategy> = match request.method {
            PaymentMethodKind::Gateway => Box::new(GatewaySettlement {
                ledger: self.ledger.clone(),
                gateway: self.gateway.clone(),
                clock: self.clock.clone(),
            }),
            PaymentMethodKind::Wallet => Box::new(WalletSettlement {
                pool: self.pool.clone(),
                ledger: self.ledger.clone(),
            }),
        };

        let outcome = strategy.settle(ctx).await?;

        if let SettlementOutcome::Settled(receipt) = &outcome {
            self.notifier.spawn_confirmation(
                user_id,
                notify_event,
                receipt.booked_ticket_ids.clone(),
                seat_codes,
                notify_total,
            );
        }

        Ok(outcome)
    }

    /// Second entry point of the gateway path, driven by the payer's signed
    /// return. Replay-safe: the bill's unique transaction reference decides
    /// whether this callback was already settled.
    pub async fn confirm_gateway_return(
        &self,
        params: &HashMap<String, String>,
    ) -> Result<GatewayReturnOutcome, AppError> {
        if let Err(e) = self.gateway.verify_return(params) {
            warn!("gateway return rejected: {e}");
            return Ok(GatewayReturnOutcome::Rejected {
                reason: "invalid_signature".to_string(),
            });
        }

        // Params are trustworthy from here on.
        let descriptor = match params
            .get("order_info")
            .ok_or(())
            .and_then(|token| OrderDescriptor::decode(token).map_err(|_| ()))
        {
            Ok(d) => d,
            Err(()) => {
                return Ok(GatewayReturnOutcome::Rejected {
                    reason: "order_info_invalid".to_string(),
                });
            }
        };

        let response_code = params.get("response_code").map(String::as_str);
        if response_code != Some(APPROVED) {
            // Payment declined or abandoned: give the seats back.
            self.ledger.release(&descriptor.hold_ticket_ids).await?;
            return Ok(GatewayReturnOutcome::Rejected {
                reason: response_code.unwrap_or("no_response_code").to_string(),
            });
        }

        let txn_ref = match params.get("txn_ref") {
            Some(r) if !r.is_empty() => r.clone(),
            _ => {
                return Ok(GatewayReturnOutcome::Rejected {
                    reason: "txn_ref_missing".to_string(),
                });
            }
        };

        let amount_minor: i64 = match params.get("amount").and_then(|a| a.parse().ok()) {
            Some(a) if a > 0 => a,
            _ => {
                self.ledger.release(&descriptor.hold_ticket_ids).await?;
                return Ok(GatewayReturnOutcome::Rejected {
                    reason: "amount_invalid".to_string(),
                });
            }
        };
        let total = BigDecimal::from(amount_minor) / BigDecimal::from(100);

        match self.settle_gateway(&descriptor, &txn_ref, &total).await {
            Ok(outcome) => Ok(outcome),
            Err(e) => {
                // Settlement errors leave no partial state; the holds are
                // released so the seats go back on sale.
                self.ledger.release(&descriptor.hold_ticket_ids).await?;
                Err(e)
            }
        }
    }

    async fn settle_gateway(
        &self,
        descriptor: &OrderDescriptor,
        txn_ref: &str,
        total: &BigDecimal,
    ) -> Result<GatewayReturnOutcome, AppError> {
        let mut tx = self.pool.begin().await?;

        if let Some(bill) = queries::find_bill_by_gateway_ref(&mut tx, txn_ref).await? {
            let _ = tx.rollback().await;
            info!(txn_ref, bill_id = bill.id, "gateway callback replay ignored");
            return Ok(GatewayReturnOutcome::Booked {
                ticket_ids: descriptor.hold_ticket_ids.clone(),
                bill_id: bill.id,
                already_settled: true,
            });
        }

        let tickets =
            queries::find_tickets_by_ids(&mut *tx, &descriptor.hold_ticket_ids).await?;

        if let Some(reason) = validate_holds(descriptor, &tickets) {
            let _ = tx.rollback().await;
            self.ledger.release(&descriptor.hold_ticket_ids).await?;
            return Ok(GatewayReturnOutcome::Rejected { reason });
        }

        let result: Result<i64, AppError> = async {
            let bill = queries::insert_bill(
                &mut tx,
                descriptor.user_id,
                total,
                CURRENCY,
                payment_method::GATEWAY,
                bill_status::PAID,
                Some(txn_ref),
            )
            .await?;

            self.ledger
                .promote_in_tx(&mut tx, &descriptor.hold_ticket_ids, bill.id)
                .await?;

            Ok(bill.id)
        }
        .await;

        let bill_id = match result {
            Ok(id) => id,
            Err(e) => {
                let _ = tx.rollback().await;
                return Err(e);
            }
        };

        tx.commit().await?;

        info!(
            txn_ref,
            bill_id,
            ticket_ids = ?descriptor.hold_ticket_ids,
            "gateway purchase settled"
        );

        // Post-commit confirmation; nothing past this point can undo the sale.
        if let Some(event) = queries::get_event(&self.pool, descriptor.event_id).await? {
            let seat_codes =
                queries::get_seat_codes(&self.pool, &descriptor.seat_ids).await?;
            self.notifier.spawn_confirmation(
                descriptor.user_id,
                event,
                descriptor.hold_ticket_ids.clone(),
                seat_codes,
                total.clone(),
            );
        }

        Ok(GatewayReturnOutcome::Booked {
            ticket_ids: descriptor.hold_ticket_ids.clone(),
            bill_id,
            already_settled: false,
        })
    }
}

/// The holds referenced by the order must still be exactly the PENDING rows
/// phase one created for this user and event. Returns the rejection reason,
/// if any.
fn validate_holds(
    descriptor: &OrderDescriptor,
    tickets: &[crate::db::models::Ticket],
) -> Option<String> {
    use crate::db::models::ticket_status;

    if tickets.len() != descriptor.hold_ticket_ids.len() {
        return Some("pending_tickets_missing".to_string());
    }

    for t in tickets {
        if t.event_id != descriptor.event_id || t.user_id != descriptor.user_id {
            return Some("pending_ticket_mismatch".to_string());
        }
        if t.status != ticket_status::PENDING {
            return Some("pending_ticket_invalid_status".to_string());
        }
        if !descriptor.category_ids.is_empty() && !descriptor.category_ids.contains(&t.category_id)
        {
            return Some("pending_ticket_category_invalid".to_string());
        }
    }

    None
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::models::{Ticket, ticket_status};
    use chrono::Utc;

    fn hold_ticket(id: i64, event_id: i64, user_id: i64, category_id: i64) -> Ticket {
        Ticket {
            id,
            event_id,
            user_id,
            category_id,
            seat_id: Some(id * 10),
            bill_id: None,
            status: ticket_status::PENDING.to_string(),
            qr_code_value: crate::db::models::QR_PLACEHOLDER.to_string(),
            qr_issued_at: None,
            hold_expires_at: Some(Utc::now()),
            checkin_time: None,
            checkout_time: None,
            created_at: Utc::now(),
        }
    }

    fn descriptor() -> OrderDescriptor {
        OrderDescriptor {
            user_id: 7,
            event_id: 1,
            seat_ids: vec![10, 20],
            category_ids: vec![3, 4],
            hold_ticket_ids: vec![100, 101],
        }
    }

    #[test]
    fn validate_holds_accepts_matching_batch() {
        let d = descriptor();
        let tickets = vec![hold_ticket(100, 1, 7, 3), hold_ticket(101, 1, 7, 4)];
        assert_eq!(validate_holds(&d, &tickets), None);
    }

    #[test]
    fn validate_holds_rejects_short_batch() {
        let d = descriptor();
        let tickets = vec![hold_ticket(100, 1, 7, 3)];
        assert_eq!(
            validate_holds(&d, &tickets),
            Some("pending_tickets_missing".to_string())
        );
    }

    #[test]
    fn validate_holds_rejects_foreign_user() {
        let d = descriptor();
        let tickets = vec![hold_ticket(100, 1, 7, 3), hold_ticket(101, 1, 8, 4)];
        assert_eq!(
            validate_holds(&d, &tickets),
            Some("pending_ticket_mismatch".to_string())
        );
    }

    #[test]
    fn validate_holds_rejects_already_promoted() {
        let d = descriptor();
        let mut promoted = hold_ticket(101, 1, 7, 4);
        promoted.status = ticket_status::BOOKED.to_string();
        let tickets = vec![hold_ticket(100, 1, 7, 3), promoted];
        assert_eq!(
            validate_holds(&d, &tickets),
            Some("pending_ticket_invalid_status".to_string())
        );
    }

    #[test]
    fn validate_holds_rejects_unknown_category() {
        let d = descriptor();
        let tickets = vec![hold_ticket(100, 1, 7, 3), hold_ticket(101, 1, 7, 9)];
        assert_eq!(
            validate_holds(&d, &tickets),
            Some("pending_ticket_category_invalid".to_string())
        );
    }

    #[test]
    fn purchase_method_deserializes_lowercase() {
        let req: PurchaseRequest = serde_json::from_str(
            r#"{"event_id":1,"seat_ids":[42],"method":"wallet"}"#,
        )
        .unwrap();
        assert_eq!(req.method, PaymentMethodKind::Wallet);
        assert_eq!(req.seat_ids, vec![42]);
    }
}
