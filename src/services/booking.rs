//! Создание, отмена и список pending-броней.
//!
//! Создание не отклоняется из-за уже занятых мест: пересечения разрешаются
//! при оплате. Ранняя проверка по журналу включается настройкой
//! `reject_taken_on_create` и носит рекомендательный характер.

use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};
use uuid::Uuid;

use super::{data_unavailable, lock_error, persistence_error, SeatLedger};
use crate::config::BookingConfig;
use crate::error::BookingError;
use crate::locks::ShowtimeLocks;
use crate::middleware::AuthUser;
use crate::models::{Booking, BookingStatus, SeatId, SeatMap};
use crate::store::{BookingStore, CancelOutcome};

#[derive(Debug, Clone)]
pub struct NewBooking {
    pub showtime_id: Uuid,
    pub seat_ids: Vec<SeatId>,
    pub seat_count: u32,
    pub total_amount: i64,
}

#[derive(Clone)]
pub struct BookingIntentManager {
    store: Arc<dyn BookingStore>,
    locks: Arc<dyn ShowtimeLocks>,
    ledger: SeatLedger,
    seat_map: SeatMap,
    config: BookingConfig,
}

impl BookingIntentManager {
    pub fn new(
        store: Arc<dyn BookingStore>,
        locks: Arc<dyn ShowtimeLocks>,
        seat_map: SeatMap,
        config: BookingConfig,
    ) -> Self {
        Self {
            ledger: SeatLedger::new(store.clone()),
            store,
            locks,
            seat_map,
            config,
        }
    }

    fn validate_seats(&self, request: &NewBooking) -> Result<(), BookingError> {
        let max = self.config.max_seats_per_booking;
        if request.seat_count == 0 || request.seat_count > max {
            return Err(BookingError::InvalidRequest(format!(
                "seat count must be between 1 and {}",
                max
            )));
        }
        if request.seat_ids.len() != request.seat_count as usize {
            return Err(BookingError::InvalidRequest(format!(
                "{} seats listed for a booking of {}",
                request.seat_ids.len(),
                request.seat_count
            )));
        }

        let unique: BTreeSet<&SeatId> = request.seat_ids.iter().collect();
        if unique.len() != request.seat_ids.len() {
            return Err(BookingError::InvalidRequest("duplicate seats in booking".to_string()));
        }

        if let Some(seat) = request.seat_ids.iter().find(|s| !self.seat_map.contains(s)) {
            return Err(BookingError::InvalidRequest(format!(
                "seat {} is not on the seat map",
                seat
            )));
        }
        Ok(())
    }

    pub async fn create_booking(&self, user: &AuthUser, request: NewBooking) -> Result<Booking, BookingError> {
        self.validate_seats(&request)?;

        let showtime = self
            .store
            .find_showtime(request.showtime_id)
            .await
            .map_err(persistence_error("find_showtime"))?
            .ok_or(BookingError::NotFound("Showtime"))?;

        // Сумма пересчитывается на сервере, клиенту не доверяем
        let expected_total = showtime.price * i64::from(request.seat_count);
        if request.total_amount <= 0 || request.total_amount != expected_total {
            return Err(BookingError::InvalidRequest(format!(
                "total amount {} does not match {} x {} seats",
                request.total_amount, showtime.price, request.seat_count
            )));
        }

        if self.config.reject_taken_on_create {
            let snapshot = self.ledger.snapshot(showtime.id).await?;
            let mut taken: Vec<SeatId> = request
                .seat_ids
                .iter()
                .filter(|s| snapshot.is_taken(s))
                .cloned()
                .collect();
            if !taken.is_empty() {
                taken.sort();
                info!(showtime_id = %showtime.id, user_id = %user.user_id, "Rejecting booking of taken seats early");
                return Err(BookingError::SeatConflict(taken));
            }
        }

        let booking = Booking::new_pending(
            user.user_id.clone(),
            showtime.id,
            request.seat_ids,
            request.total_amount,
        );
        self.store
            .insert_booking(booking.clone())
            .await
            .map_err(persistence_error("insert_booking"))?;

        info!(
            booking_id = %booking.id,
            showtime_id = %booking.showtime_id,
            user_id = %booking.user_id,
            seats = booking.seat_count,
            "Pending booking created"
        );
        Ok(booking)
    }

    /// Отменяет pending-бронь владельца и освобождает её места.
    /// Повторная отмена уже отменённой брони ничего не делает.
    pub async fn cancel_booking(&self, user: &AuthUser, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await
            .map_err(persistence_error("find_booking"))?
            .ok_or(BookingError::NotFound("Booking"))?;

        if booking.user_id != user.user_id {
            warn!(%booking_id, user_id = %user.user_id, "Cancel attempt on foreign booking");
            return Err(BookingError::Forbidden);
        }
        match booking.status {
            BookingStatus::Pending => {}
            BookingStatus::Cancelled => return Ok(booking),
            BookingStatus::Paid | BookingStatus::Confirmed => return Err(BookingError::AlreadyFinalized),
        }

        let guard = self.locks.acquire(booking.showtime_id).await.map_err(lock_error)?;
        let outcome = self.store.cancel_pending(booking_id).await;
        guard.release().await;

        match outcome.map_err(persistence_error("cancel_pending"))? {
            CancelOutcome::Cancelled(released) => {
                info!(%booking_id, released = released.len(), "Booking cancelled, seats released");
                let mut cancelled = booking;
                cancelled.status = BookingStatus::Cancelled;
                Ok(cancelled)
            }
            CancelOutcome::Missing => Err(BookingError::NotFound("Booking")),
            CancelOutcome::NotPending(BookingStatus::Cancelled) => {
                let mut cancelled = booking;
                cancelled.status = BookingStatus::Cancelled;
                Ok(cancelled)
            }
            CancelOutcome::NotPending(_) => Err(BookingError::AlreadyFinalized),
        }
    }

    pub async fn list_bookings(&self, user: &AuthUser) -> Result<Vec<Booking>, BookingError> {
        self.store
            .list_user_bookings(user.user_id.clone())
            .await
            .map_err(data_unavailable("list_user_bookings"))
    }
}
