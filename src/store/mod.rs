//! Хранилище бронирований и владельцев мест.
//!
//! Таблица владельцев (`seat_locks`) хранит для каждой пары (сеанс, место) не
//! более одной брони. Бронь занимает свободные места при создании, добирает
//! освободившиеся при оплате и отпускает их только при отмене. Оплата
//! фиксируется лишь пока бронь владеет всеми своими местами.

pub mod memory;
pub mod postgres;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use thiserror::Error;
use uuid::Uuid;

use crate::models::{Booking, BookingStatus, SeatId, Showtime};

pub use memory::MemoryBookingStore;
pub use postgres::PgBookingStore;

pub type StoreResult<T> = Result<T, StoreError>;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("storage unavailable: {0}")]
    Unavailable(String),
    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),
    #[error("corrupt booking record {id}: {reason}")]
    Corrupt { id: Uuid, reason: String },
}

/// Результат попытки перевести бронь в `paid`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommitOutcome {
    Committed(Booking),
    Missing,
    AlreadyPaid,
    Cancelled,
    /// Бронь больше не владеет этими местами.
    SeatsLost(Vec<SeatId>),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CancelOutcome {
    /// Бронь отменена, перечисленные места освобождены.
    Cancelled(Vec<SeatId>),
    Missing,
    NotPending(BookingStatus),
}

pub trait BookingStore: Send + Sync {
    fn find_showtime(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Showtime>>>;

    /// Сохраняет pending-бронь и занимает те её места, у которых ещё нет владельца.
    fn insert_booking(&self, booking: Booking) -> BoxFuture<'static, StoreResult<()>>;

    fn find_booking(&self, id: Uuid) -> BoxFuture<'static, StoreResult<Option<Booking>>>;

    fn list_user_bookings(&self, user_id: String) -> BoxFuture<'static, StoreResult<Vec<Booking>>>;

    /// Места, перечисленные в бронях со статусом pending/confirmed/paid, отсортированные.
    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, StoreResult<Vec<SeatId>>>;

    /// Добирает свободные места брони и возвращает те, что принадлежат другим броням.
    ///
    /// Вызывать только под блокировкой сеанса.
    fn claim_seats(&self, booking: Booking) -> BoxFuture<'static, StoreResult<Vec<SeatId>>>;

    /// Атомарно: бронь всё ещё pending и владеет всеми местами -> paid.
    fn commit_payment(
        &self,
        booking_id: Uuid,
        transaction_id: String,
    ) -> BoxFuture<'static, StoreResult<CommitOutcome>>;

    fn cancel_pending(&self, booking_id: Uuid) -> BoxFuture<'static, StoreResult<CancelOutcome>>;

    /// Pending-брони, созданные раньше `older_than`, от старых к новым.
    fn stale_pending(&self, older_than: DateTime<Utc>) -> BoxFuture<'static, StoreResult<Vec<Booking>>>;
}
