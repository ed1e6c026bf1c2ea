use sqlx::PgPool;
use std::sync::Arc;
use tokio::time::{Duration, sleep};
use tracing::{debug, error, info};

use crate::db::queries;
use crate::services::clock::Clock;

const SWEEP_BATCH: i64 = 100;

/// Background reclaim of abandoned gateway holds. A PENDING row whose lease
/// ran out without a callback keeps its seat off sale forever otherwise.
/// Runs forever; spawn it next to the HTTP server.
pub async fn run_sweeper(pool: PgPool, clock: Arc<dyn Clock>, interval_secs: u64) {
    info!("hold-expiry sweeper started");

    loop {
        match sweep_once(&pool, clock.as_ref()).await {
            Ok(0) => debug!("sweep: nothing expired"),
            Ok(n) => info!("sweep: reclaimed {} expired hold(s)", n),
            Err(e) => error!("sweep error: {}", e),
        }

        sleep(Duration::from_secs(interval_secs)).await;
    }
}

/// One sweep pass. SKIP LOCKED on the candidate select means a sweep never
/// blocks on (or deletes from under) a settlement transaction that is
/// promoting the same rows.
pub async fn sweep_once(pool: &PgPool, clock: &dyn Clock) -> anyhow::Result<u64> {
    let mut tx = pool.begin().await?;

    let expired = queries::lock_expired_holds(&mut tx, clock.now(), SWEEP_BATCH).await?;
    if expired.is_empty() {
        tx.commit().await?;
        return Ok(0);
    }

    let deleted = queries::delete_pending_by_ids(&mut *tx, &expired).await?;
    tx.commit().await?;

    Ok(deleted)
}
