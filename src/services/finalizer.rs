//! Финализация оплаты: единственное место, где бронь становится `paid`.
//!
//! Повторная проверка мест, сверка суммы, списание и фиксация выполняются
//! под блокировкой сеанса. Хранилище дополнительно проверяет при фиксации,
//! что бронь всё ещё pending и владеет всеми местами, поэтому два
//! пересекающихся платежа не проходят даже при истёкшей распределённой
//! блокировке.

use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use super::notification::{BookingConfirmation, Notifier};
use super::payment::{ChargeRequest, GatewayOutcome, PaymentGateway};
use super::{lock_error, persistence_error};
use crate::error::BookingError;
use crate::locks::ShowtimeLocks;
use crate::middleware::AuthUser;
use crate::models::booking::amount_matches;
use crate::models::{Booking, BookingStatus, PaymentMethod};
use crate::store::{BookingStore, CommitOutcome};

pub const SUCCESS_MESSAGE: &str = "Payment processed successfully";

#[derive(Debug, Clone)]
pub struct FinalizeRequest {
    pub booking_id: Uuid,
    /// Сумма, которую показал клиент. Сверяется с серверным расчётом.
    pub amount: f64,
    pub payment_method: PaymentMethod,
    pub movie_title: Option<String>,
    pub seat_count: Option<u32>,
    pub show_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentReceipt {
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub amount: i64,
    pub message: String,
}

#[derive(Clone)]
pub struct PaymentFinalizer {
    store: Arc<dyn BookingStore>,
    locks: Arc<dyn ShowtimeLocks>,
    gateway: Arc<dyn PaymentGateway>,
    notifier: Arc<dyn Notifier>,
    gateway_timeout: Duration,
}

impl PaymentFinalizer {
    pub fn new(
        store: Arc<dyn BookingStore>,
        locks: Arc<dyn ShowtimeLocks>,
        gateway: Arc<dyn PaymentGateway>,
        notifier: Arc<dyn Notifier>,
        gateway_timeout: Duration,
    ) -> Self {
        Self {
            store,
            locks,
            gateway,
            notifier,
            gateway_timeout,
        }
    }

    async fn load_owned(&self, user: &AuthUser, booking_id: Uuid) -> Result<Booking, BookingError> {
        let booking = self
            .store
            .find_booking(booking_id)
            .await
            .map_err(persistence_error("find_booking"))?
            .ok_or(BookingError::NotFound("Booking"))?;

        if booking.user_id != user.user_id {
            warn!(%booking_id, user_id = %user.user_id, "Payment attempt on foreign booking");
            return Err(BookingError::Forbidden);
        }
        Ok(booking)
    }

    fn ensure_payable(booking: &Booking) -> Result<(), BookingError> {
        match booking.status {
            BookingStatus::Pending => Ok(()),
            BookingStatus::Paid | BookingStatus::Confirmed => Err(BookingError::AlreadyFinalized),
            BookingStatus::Cancelled => Err(BookingError::BookingCancelled),
        }
    }

    pub async fn finalize(&self, user: &AuthUser, request: FinalizeRequest) -> Result<PaymentReceipt, BookingError> {
        let booking = self.load_owned(user, request.booking_id).await?;
        Self::ensure_payable(&booking)?;

        let guard = self.locks.acquire(booking.showtime_id).await.map_err(lock_error)?;

        // После захвата блокировки секция доводится до конца в отдельной задаче:
        // отключение клиента не должно оборвать списание до фиксации
        let finalizer = self.clone();
        let user = user.clone();
        let booking_id = booking.id;
        let task = tokio::spawn(async move {
            let result = finalizer.finalize_locked(&user, &request).await;
            guard.release().await;
            let paid = result?;
            Ok::<_, BookingError>(finalizer.complete(&paid, &request))
        });

        task.await.unwrap_or_else(|e| {
            error!(%booking_id, error = %e, "Payment task aborted, booking state must be checked");
            Err(BookingError::PersistenceError)
        })
    }

    fn complete(&self, paid: &Booking, request: &FinalizeRequest) -> PaymentReceipt {
        let transaction_id = paid.transaction_id.clone().unwrap_or_default();
        let amount = paid.expected_charge();
        self.spawn_notification(paid, request, transaction_id.clone(), amount);

        PaymentReceipt {
            booking_id: paid.id,
            transaction_id,
            amount,
            message: SUCCESS_MESSAGE.to_string(),
        }
    }

    // Вызывается только под блокировкой сеанса брони
    async fn finalize_locked(&self, user: &AuthUser, request: &FinalizeRequest) -> Result<Booking, BookingError> {
        // Статус мог измениться, пока ждали блокировку
        let booking = self.load_owned(user, request.booking_id).await?;
        Self::ensure_payable(&booking)?;
        if let Some(shown) = request.seat_count.filter(|n| *n != booking.seat_count) {
            debug!(booking_id = %booking.id, shown, stored = booking.seat_count, "Client seat count differs from booking");
        }

        let conflicts = self
            .store
            .claim_seats(booking.clone())
            .await
            .map_err(persistence_error("claim_seats"))?;
        if !conflicts.is_empty() {
            warn!(
                booking_id = %booking.id,
                showtime_id = %booking.showtime_id,
                conflicts = ?conflicts.iter().map(ToString::to_string).collect::<Vec<_>>(),
                "Seat conflict at payment"
            );
            return Err(BookingError::SeatConflict(conflicts));
        }

        let expected = booking.expected_charge();
        if !amount_matches(request.amount, expected) {
            warn!(booking_id = %booking.id, expected, claimed = request.amount, "Amount mismatch");
            return Err(BookingError::AmountMismatch {
                expected,
                claimed: request.amount,
            });
        }

        let transaction_id = self.charge(&booking, request.payment_method, expected).await?;

        let outcome = self
            .store
            .commit_payment(booking.id, transaction_id.clone())
            .await
            .map_err(|e| {
                error!(
                    booking_id = %booking.id,
                    %transaction_id,
                    error = %e,
                    "Charged but failed to record payment, manual refund required"
                );
                BookingError::PersistenceError
            })?;

        match outcome {
            CommitOutcome::Committed(paid) => {
                info!(
                    booking_id = %paid.id,
                    %transaction_id,
                    amount = expected,
                    method = request.payment_method.as_str(),
                    user_id = %paid.user_id,
                    "Payment successful"
                );
                Ok(paid)
            }
            other => {
                error!(
                    booking_id = %booking.id,
                    %transaction_id,
                    outcome = ?other,
                    "Charged but booking could not be committed, manual refund required"
                );
                Err(match other {
                    CommitOutcome::Missing => BookingError::NotFound("Booking"),
                    CommitOutcome::AlreadyPaid => BookingError::AlreadyFinalized,
                    CommitOutcome::Cancelled => BookingError::BookingCancelled,
                    CommitOutcome::SeatsLost(seats) => BookingError::SeatConflict(seats),
                    CommitOutcome::Committed(_) => BookingError::PersistenceError,
                })
            }
        }
    }

    /// Списание через шлюз. Отказ, ошибка, открытый выключатель и таймаут
    /// одинаково дают `PaymentDeclined`; бронь остаётся pending.
    async fn charge(&self, booking: &Booking, method: PaymentMethod, amount: i64) -> Result<String, BookingError> {
        let request = ChargeRequest {
            booking_id: booking.id,
            amount,
            method,
            description: format!("Booking {} ({} seats)", booking.id, booking.seat_count),
        };

        match tokio::time::timeout(self.gateway_timeout, self.gateway.charge(request)).await {
            Ok(Ok(GatewayOutcome::Approved { transaction_id })) => Ok(transaction_id),
            Ok(Ok(GatewayOutcome::Declined { reason })) => {
                info!(booking_id = %booking.id, %reason, "Payment declined by gateway");
                Err(BookingError::PaymentDeclined)
            }
            Ok(Err(e)) => {
                error!(booking_id = %booking.id, error = %e, "Payment gateway failure");
                Err(BookingError::PaymentDeclined)
            }
            Err(_) => {
                warn!(booking_id = %booking.id, timeout = ?self.gateway_timeout, "Payment gateway timed out");
                Err(BookingError::PaymentDeclined)
            }
        }
    }

    fn spawn_notification(&self, paid: &Booking, request: &FinalizeRequest, transaction_id: String, amount: i64) {
        let confirmation = BookingConfirmation {
            booking_id: paid.id,
            user_id: paid.user_id.clone(),
            transaction_id,
            amount,
            payment_method: request.payment_method,
            seats: paid.seat_ids.clone(),
            movie_title: request.movie_title.clone(),
            show_date: request.show_date.clone(),
        };
        let notifier = self.notifier.clone();
        tokio::spawn(async move {
            let booking_id = confirmation.booking_id;
            if let Err(e) = notifier.notify(confirmation).await {
                warn!(%booking_id, error = %e, "Booking confirmation not delivered");
            }
        });
    }
}
