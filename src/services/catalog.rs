use bigdecimal::BigDecimal;
use sqlx::PgPool;

use crate::db::models::{Event, EventSeat, PriceCategory, event_status, seat_sale_status};
use crate::db::queries;
use crate::error::AppError;

/// One requested seat resolved against the event's configuration: the seat
/// itself plus the active price category its seat type maps to.
#[derive(Debug, Clone)]
pub struct PricedSeat {
    pub seat: EventSeat,
    pub category: PriceCategory,
}

/// Read-only view over the per-event seat configuration. Answers whether a
/// seat is sellable for an event and what price applies. Occupancy is not
/// its business; that is decided at hold-insert time.
#[derive(Clone)]
pub struct SeatCatalog {
    pool: PgPool,
}

impl SeatCatalog {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// The event, provided it exists and is open for sale.
    pub async fn open_event(&self, event_id: i64) -> Result<Event, AppError> {
        let event = queries::get_event(&self.pool, event_id).await?;

        match event {
            Some(e) if e.status.eq_ignore_ascii_case(event_status::OPEN) => Ok(e),
            Some(_) | None => Err(AppError::InvalidSeat(format!(
                "event {} not found or not OPEN",
                event_id
            ))),
        }
    }

    /// Resolves a single seat for this event. Every rejection here is a
    /// validation failure with no side effects.
    pub async fn resolve(&self, event: &Event, seat_id: i64) -> Result<PricedSeat, AppError> {
        let seat = queries::get_seat_for_event(&self.pool, event.id, seat_id)
            .await?
            .ok_or_else(|| {
                AppError::InvalidSeat(format!(
                    "seat {} not configured for event {}",
                    seat_id, event.id
                ))
            })?;

        if let Some(area_id) = event.area_id {
            if seat.area_id != area_id {
                return Err(AppError::InvalidSeat(format!(
                    "seat {} does not belong to event area",
                    seat_id
                )));
            }
        }

        if !seat.status.eq_ignore_ascii_case(seat_sale_status::AVAILABLE) {
            return Err(AppError::InvalidSeat(format!(
                "seat {} is not AVAILABLE for this event",
                seat_id
            )));
        }

        if seat.seat_type.trim().is_empty() {
            return Err(AppError::InvalidSeat(format!(
                "seat {} has no seat type",
                seat_id
            )));
        }

        let category =
            queries::get_active_category_by_name(&self.pool, event.id, &seat.seat_type)
                .await?
                .ok_or_else(|| {
                    AppError::InvalidSeat(format!(
                        "no active price category for seat type {}",
                        seat.seat_type
                    ))
                })?;

        Ok(PricedSeat { seat, category })
    }

    /// Resolves the whole batch and computes the total. Any single failure
    /// rejects the batch; a mixed VIP/STANDARD selection is legitimate.
    pub async fn price_seats(
        &self,
        event: &Event,
        seat_ids: &[i64],
    ) -> Result<(Vec<PricedSeat>, BigDecimal), AppError> {
        let mut priced = Vec::with_capacity(seat_ids.len());
        let mut total = BigDecimal::from(0);

        for &seat_id in seat_ids {
            let line = self.resolve(event, seat_id).await?;
            total += line.category.price.clone();
            priced.push(line);
        }

        Ok((priced, total))
    }
}
