use chrono::{DateTime, Duration, Utc};
use sqlx::{PgPool, Postgres, Transaction as SqlxTransaction};
use std::sync::Arc;
use tracing::{info, warn};

use crate::db::models::QR_PLACEHOLDER;
use crate::db::queries;
use crate::error::AppError;
use crate::services::catalog::PricedSeat;
use crate::services::clock::Clock;

/// Seat/ticket state machine. Sole writer of the PENDING→BOOKED and
/// PENDING→deleted transitions. Mutual exclusion is not implemented here:
/// it comes from the storage-layer unique index over non-terminal tickets,
/// which makes the hold insert the authoritative arbiter of seat races.
#[derive(Clone)]
pub struct ReservationLedger {
    pool: PgPool,
    clock: Arc<dyn Clock>,
    hold_ttl: Duration,
}

impl ReservationLedger {
    pub fn new(pool: PgPool, clock: Arc<dyn Clock>, hold_ttl_secs: i64) -> Self {
        Self {
            pool,
            clock,
            hold_ttl: Duration::seconds(hold_ttl_secs),
        }
    }

    fn hold_expiry(&self) -> DateTime<Utc> {
        self.clock.now() + self.hold_ttl
    }

    /// Optimistic fast-path check: rejects seats that already carry a
    /// non-terminal ticket. Cheap, but not sufficient under concurrency;
    /// the insert in [`Self::hold_in_tx`] is what actually decides races.
    pub async fn precheck(&self, event_id: i64, seat_ids: &[i64]) -> Result<(), AppError> {
        let occupied = queries::find_occupied_seat_ids(&self.pool, event_id, seat_ids).await?;
        if !occupied.is_empty() {
            return Err(AppError::SeatConflict(occupied));
        }
        Ok(())
    }

    /// Inserts one PENDING hold per line inside the caller's transaction.
    /// All-or-nothing: on any insert failure the rows created so far are
    /// deleted before the error is returned, so the batch never survives
    /// partially. The caller's rollback subsumes the compensating delete;
    /// both are safe to run.
    pub async fn hold_in_tx(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        event_id: i64,
        user_id: i64,
        lines: &[PricedSeat],
    ) -> Result<Vec<i64>, AppError> {
        let expires_at = self.hold_expiry();
        let mut created: Vec<i64> = Vec::with_capacity(lines.len());

        for line in lines {
            let inserted = queries::insert_hold(
                tx,
                event_id,
                user_id,
                line.category.id,
                line.seat.seat_id,
                QR_PLACEHOLDER,
                expires_at,
            )
            .await;

            match inserted {
                Ok(id) => created.push(id),
                Err(e) => {
                    let conflict = queries::is_unique_violation(&e);
                    if let Err(del) = queries::delete_pending_by_ids(&mut **tx, &created).await {
                        warn!("compensating delete after failed hold also failed: {}", del);
                    }

                    return Err(if conflict {
                        AppError::SeatConflict(vec![line.seat.seat_id])
                    } else {
                        AppError::Database(e)
                    });
                }
            }
        }

        Ok(created)
    }

    /// Standalone hold for the two-phase gateway path: pre-check, then
    /// insert in a transaction of its own. The returned PENDING rows are
    /// committed and occupy their seats until promoted, released, or
    /// reclaimed by the expiry sweeper.
    pub async fn hold(
        &self,
        event_id: i64,
        user_id: i64,
        lines: &[PricedSeat],
    ) -> Result<Vec<i64>, AppError> {
        let seat_ids: Vec<i64> = lines.iter().map(|l| l.seat.seat_id).collect();
        self.precheck(event_id, &seat_ids).await?;

        let mut tx = self.pool.begin().await?;
        match self.hold_in_tx(&mut tx, event_id, user_id, lines).await {
            Ok(ids) => {
                tx.commit().await?;
                info!(event_id, user_id, ?ids, "created PENDING holds");
                Ok(ids)
            }
            Err(e) => {
                tx.rollback().await?;
                Err(e)
            }
        }
    }

    /// PENDING → BOOKED for the whole batch, atomically with whatever else
    /// lives in the caller's transaction (bill insert, wallet debit). A
    /// short count means part of the batch was no longer PENDING; the error
    /// forces the caller to roll back.
    pub async fn promote_in_tx(
        &self,
        tx: &mut SqlxTransaction<'_, Postgres>,
        ticket_ids: &[i64],
        bill_id: i64,
    ) -> Result<(), AppError> {
        let issued_at = self.clock.now();
        let promoted = queries::promote_tickets(tx, ticket_ids, bill_id, issued_at).await?;

        if promoted != ticket_ids.len() as u64 {
            return Err(AppError::Settlement(format!(
                "promoted {} of {} holds",
                promoted,
                ticket_ids.len()
            )));
        }

        Ok(())
    }

    /// Hard-deletes PENDING rows. Already-deleted or already-booked ids are
    /// ignored, so releasing twice (or after a replayed callback) is safe.
    pub async fn release(&self, ticket_ids: &[i64]) -> Result<u64, AppError> {
        let deleted = queries::delete_pending_by_ids(&self.pool, ticket_ids).await?;
        if deleted > 0 {
            info!(?ticket_ids, deleted, "released PENDING holds");
        }
        Ok(deleted)
    }
}
