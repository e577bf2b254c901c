pub mod booking;
pub mod cleanup;
pub mod finalizer;
pub mod ledger;
pub mod notification;
pub mod payment;

use tracing::{error, warn};

use crate::error::BookingError;
use crate::locks::LockError;
use crate::store::StoreError;

pub use booking::{BookingIntentManager, NewBooking};
pub use cleanup::CleanupService;
pub use finalizer::{FinalizeRequest, PaymentFinalizer, PaymentReceipt};
pub use ledger::{LedgerSnapshot, LedgerSource, SeatLedger};

// Детали хранилища остаются в логах, наружу уходит только тип ошибки
pub(crate) fn persistence_error(operation: &'static str) -> impl FnOnce(StoreError) -> BookingError {
    move |e| {
        error!(operation, error = %e, "storage write failed");
        BookingError::PersistenceError
    }
}

pub(crate) fn data_unavailable(operation: &'static str) -> impl FnOnce(StoreError) -> BookingError {
    move |e| {
        error!(operation, error = %e, "storage read failed");
        BookingError::DataUnavailable
    }
}

pub(crate) fn lock_error(e: LockError) -> BookingError {
    warn!(error = %e, "showtime lock not acquired");
    BookingError::PersistenceError
}
