use chrono::Utc;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::BookingConfig;
use crate::locks::ShowtimeLocks;
use crate::models::Booking;
use crate::redis_client::RedisClient;
use crate::store::{BookingStore, CancelOutcome};

const LEADER_KEY: &str = "cleanup:pending_bookings:leader";

/// Фоновая очистка брошенных pending-броней.
///
/// Бронь старше `pending_ttl` отменяется под блокировкой сеанса, её места
/// освобождаются. При нескольких экземплярах сервиса цикл выполняет тот, кто
/// захватил ключ лидера в Redis.
pub struct CleanupService {
    store: Arc<dyn BookingStore>,
    locks: Arc<dyn ShowtimeLocks>,
    redis: Option<RedisClient>,
    pending_ttl: Duration,
    interval: Duration,
    instance_id: String,
}

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct CleanupStats {
    pub scanned: usize,
    pub cancelled: usize,
    pub skipped: usize,
    pub failed: usize,
}

impl CleanupService {
    pub fn new(
        store: Arc<dyn BookingStore>,
        locks: Arc<dyn ShowtimeLocks>,
        redis: Option<RedisClient>,
        config: &BookingConfig,
    ) -> Self {
        Self {
            store,
            locks,
            redis,
            pending_ttl: config.pending_ttl(),
            interval: config.reaper_interval(),
            instance_id: Uuid::new_v4().to_string(),
        }
    }

    /// Запускает цикл очистки в фоне.
    pub fn spawn(self) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(self.interval);
            ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                ticker.tick().await;
                if self.try_lead().await {
                    self.run_once().await;
                }
            }
        })
    }

    // Без Redis экземпляр один, он и лидер
    async fn try_lead(&self) -> bool {
        let Some(redis) = &self.redis else {
            return true;
        };
        match redis.try_acquire(LEADER_KEY, &self.instance_id, self.interval).await {
            Ok(true) => true,
            Ok(false) => {
                info!("🧹 Another instance runs cleanup this cycle");
                false
            }
            Err(e) => {
                warn!("🧹 Cleanup leader election failed, skipping cycle: {}", e);
                false
            }
        }
    }

    /// Один проход очистки.
    pub async fn run_once(&self) -> CleanupStats {
        let cutoff = Utc::now()
            - chrono::Duration::from_std(self.pending_ttl).unwrap_or(chrono::Duration::minutes(15));

        let stale = match self.store.stale_pending(cutoff).await {
            Ok(stale) => stale,
            Err(e) => {
                error!("🧹 Failed to load stale pending bookings: {}", e);
                return CleanupStats::default();
            }
        };

        let mut stats = CleanupStats {
            scanned: stale.len(),
            ..CleanupStats::default()
        };
        if stale.is_empty() {
            return stats;
        }

        info!("🎫 Found {} stale pending bookings to cancel", stale.len());
        for booking in stale {
            match self.cancel_stale(&booking).await {
                Ok(true) => stats.cancelled += 1,
                Ok(false) => stats.skipped += 1,
                Err(()) => stats.failed += 1,
            }
        }
        info!(
            cancelled = stats.cancelled,
            skipped = stats.skipped,
            failed = stats.failed,
            "✅ Pending booking cleanup completed"
        );
        stats
    }

    async fn cancel_stale(&self, booking: &Booking) -> Result<bool, ()> {
        let guard = match self.locks.acquire(booking.showtime_id).await {
            Ok(guard) => guard,
            Err(e) => {
                warn!("🎫 Showtime busy, booking {} left for next cycle: {}", booking.id, e);
                return Err(());
            }
        };
        let outcome = self.store.cancel_pending(booking.id).await;
        guard.release().await;

        match outcome {
            Ok(CancelOutcome::Cancelled(released)) => {
                info!("🎫 Stale booking {} cancelled, {} seats released", booking.id, released.len());
                Ok(true)
            }
            // Успели оплатить или отменить, пока ждали блокировку
            Ok(CancelOutcome::NotPending(status)) => {
                info!("🎫 Booking {} is {} now, not cancelled", booking.id, status);
                Ok(false)
            }
            Ok(CancelOutcome::Missing) => Ok(false),
            Err(e) => {
                error!("🎫 Failed to cancel stale booking {}: {}", booking.id, e);
                Err(())
            }
        }
    }
}
