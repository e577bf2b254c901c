use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::{BookingStore, CancelOutcome, CommitOutcome, StoreError, StoreResult};
use crate::models::{Booking, BookingStatus, SeatId, Showtime};

/// Хранилище в памяти процесса с той же семантикой владения местами, что и Postgres.
///
/// Подходит для локального запуска без БД и для тестов. `set_unavailable`
/// имитирует потерю соединения с хранилищем.
#[derive(Clone, Default)]
pub struct MemoryBookingStore {
    inner: Arc<Inner>,
}

#[derive(Default)]
struct Inner {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

#[derive(Default)]
struct State {
    showtimes: HashMap<Uuid, Showtime>,
    bookings: HashMap<Uuid, Booking>,
    seat_owners: HashMap<(Uuid, SeatId), Uuid>,
}

impl State {
    fn claim_free(&mut self, booking: &Booking) {
        for seat in &booking.seat_ids {
            self.seat_owners
                .entry((booking.showtime_id, seat.clone()))
                .or_insert(booking.id);
        }
    }

    fn owner(&self, showtime_id: Uuid, seat: &SeatId) -> Option<Uuid> {
        self.seat_owners.get(&(showtime_id, seat.clone())).copied()
    }
}

impl MemoryBookingStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert_showtime(&self, showtime: Showtime) {
        self.inner.state.write().await.showtimes.insert(showtime.id, showtime);
    }

    pub fn set_unavailable(&self, unavailable: bool) {
        self.inner.unavailable.store(unavailable, Ordering::SeqCst);
    }

    /// Текущий владелец места на сеансе.
    pub async fn seat_owner(&self, showtime_id: Uuid, seat: &SeatId) -> Option<Uuid> {
        self.inner.state.read().await.owner(showtime_id, seat)
    }

    fn check(inner: &Inner) -> StoreResult<()> {
        if inner.unavailable.load(Ordering::SeqCst) {
            Err(StoreError::Unavailable("in-memory store switched off".to_string()))
        } else {
            Ok(())
        }
    }
}

impl BookingStore for MemoryBookingStore {
    fn find_showtime(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Showtime>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            Ok(inner.state.read().await.showtimes.get(&id).cloned())
        })
    }

    fn insert_booking(&self, booking: Booking) -> BoxFuture<'static, StoreResult<()>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let mut state = inner.state.write().await;
            state.claim_free(&booking);
            state.bookings.insert(booking.id, booking);
            Ok(())
        })
    }

    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Booking>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            Ok(inner.state.read().await.bookings.get(&id).cloned())
        })
    }

    fn list_user_bookings(&self, user_id: String) -> BoxFuture<'static, StoreResult<Vec<Booking>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let state = inner.state.read().await;
            let mut bookings: Vec<Booking> = state
                .bookings
                .values()
                .filter(|b| b.user_id == user_id)
                .cloned()
                .collect();
            bookings.sort_by(|a, b| b.created_at.cmp(&a.created_at));
            Ok(bookings)
        })
    }

    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<SeatId>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let state = inner.state.read().await;
            let taken: BTreeSet<SeatId> = state
                .bookings
                .values()
                .filter(|b| b.showtime_id == showtime_id && b.status.holds_seats())
                .flat_map(|b| b.seat_ids.iter().cloned())
                .collect();
            Ok(taken.into_iter().collect())
        })
    }

    fn claim_seats(&self, booking: Booking) -> BoxFuture<'static, StoreResult<Vec<SeatId>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let mut state = inner.state.write().await;
            state.claim_free(&booking);

            let mut conflicts: BTreeSet<SeatId> = booking
                .seat_ids
                .iter()
                .filter(|seat| state.owner(booking.showtime_id, seat) != Some(booking.id))
                .cloned()
                .collect();

            // Оплаченные брони конфликтуют всегда
            for other in state.bookings.values() {
                if other.id != booking.id
                    && other.showtime_id == booking.showtime_id
                    && matches!(other.status, BookingStatus::Paid | BookingStatus::Confirmed)
                {
                    conflicts.extend(
                        booking.seat_ids.iter().filter(|s| other.lists_seat(s)).cloned(),
                    );
                }
            }

            Ok(conflicts.into_iter().collect())
        })
    }

    fn commit_payment(
        &self,
        booking_id: Uuid,
        transaction_id: String,
    ) -> BoxFuture<'static, StoreResult<CommitOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let mut state = inner.state.write().await;

            let booking = match state.bookings.get(&booking_id) {
                Some(b) => b.clone(),
                None => return Ok(CommitOutcome::Missing),
            };
            match booking.status {
                BookingStatus::Pending => {}
                BookingStatus::Paid | BookingStatus::Confirmed => return Ok(CommitOutcome::AlreadyPaid),
                BookingStatus::Cancelled => return Ok(CommitOutcome::Cancelled),
            }

            let lost: Vec<SeatId> = booking
                .seat_ids
                .iter()
                .filter(|seat| state.owner(booking.showtime_id, seat) != Some(booking.id))
                .cloned()
                .collect();
            if !lost.is_empty() {
                return Ok(CommitOutcome::SeatsLost(lost));
            }

            let mut paid = booking;
            paid.status = BookingStatus::Paid;
            paid.transaction_id = Some(transaction_id);
            paid.updated_at = Utc::now();
            state.bookings.insert(paid.id, paid.clone());
            Ok(CommitOutcome::Committed(paid))
        })
    }

    fn cancel_pending(&self, booking_id: Uuid) -> BoxFuture<'static, StoreResult<CancelOutcome>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let mut state = inner.state.write().await;

            let booking = match state.bookings.get_mut(&booking_id) {
                Some(b) => b,
                None => return Ok(CancelOutcome::Missing),
            };
            if booking.status != BookingStatus::Pending {
                return Ok(CancelOutcome::NotPending(booking.status));
            }
            booking.status = BookingStatus::Cancelled;
            booking.updated_at = Utc::now();

            let mut released: Vec<SeatId> = Vec::new();
            state.seat_owners.retain(|(_, seat), owner| {
                if *owner == booking_id {
                    released.push(seat.clone());
                    false
                } else {
                    true
                }
            });
            released.sort();
            Ok(CancelOutcome::Cancelled(released))
        })
    }

    fn stale_pending(&self, older_than: DateTime<Utc>) -> BoxFuture<'static, StoreResult<Vec<Booking>>> {
        let inner = self.inner.clone();
        Box::pin(async move {
            Self::check(&inner)?;
            let state = inner.state.read().await;
            let mut stale: Vec<Booking> = state
                .bookings
                .values()
                .filter(|b| b.status == BookingStatus::Pending && b.created_at < older_than)
                .cloned()
                .collect();
            stale.sort_by_key(|b| b.created_at);
            Ok(stale)
        })
    }
}
