//! Единая таксономия ошибок бронирования и её отображение в HTTP-ответы.
//!
//! Все ошибки хранилища, шлюза и блокировок сводятся к [`BookingError`] на
//! границе сервисов. Детали инфраструктуры пишутся в лог и не попадают в ответ.

use axum::{http::StatusCode, response::IntoResponse, Json};
use serde::Serialize;
use thiserror::Error;

use crate::models::SeatId;

#[derive(Debug, Clone, PartialEq, Error)]
pub enum BookingError {
    #[error("Authentication required. Please sign in and try again.")]
    Unauthenticated,
    #[error("This booking belongs to another user.")]
    Forbidden,
    #[error("{0} not found.")]
    NotFound(&'static str),
    #[error("Booking already paid.")]
    AlreadyFinalized,
    #[error("Booking was cancelled. Please start a new booking.")]
    BookingCancelled,
    #[error("Seats {} have already been booked. Please select different seats.", join_seats(.0))]
    SeatConflict(Vec<SeatId>),
    #[error("Amount mismatch: expected {expected}, got {claimed}.")]
    AmountMismatch { expected: i64, claimed: f64 },
    #[error("Payment failed. Please try again.")]
    PaymentDeclined,
    #[error("Could not save booking. Please try again later.")]
    PersistenceError,
    #[error("Seat availability is temporarily unavailable. Please try again shortly.")]
    DataUnavailable,
    #[error("{0}")]
    InvalidRequest(String),
}

fn join_seats(seats: &[SeatId]) -> String {
    seats
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

impl BookingError {
    /// Машиночитаемая причина для клиента.
    pub fn reason(&self) -> &'static str {
        match self {
            BookingError::Unauthenticated => "unauthenticated",
            BookingError::Forbidden => "forbidden",
            BookingError::NotFound(_) => "not_found",
            BookingError::AlreadyFinalized => "already_finalized",
            BookingError::BookingCancelled => "booking_cancelled",
            BookingError::SeatConflict(_) => "seat_conflict",
            BookingError::AmountMismatch { .. } => "amount_mismatch",
            BookingError::PaymentDeclined => "payment_declined",
            BookingError::PersistenceError => "persistence_error",
            BookingError::DataUnavailable => "data_unavailable",
            BookingError::InvalidRequest(_) => "invalid_request",
        }
    }

    pub fn status_code(&self) -> StatusCode {
        match self {
            BookingError::Unauthenticated => StatusCode::UNAUTHORIZED,
            BookingError::Forbidden => StatusCode::FORBIDDEN,
            BookingError::NotFound(_) => StatusCode::NOT_FOUND,
            BookingError::AlreadyFinalized
            | BookingError::BookingCancelled
            | BookingError::SeatConflict(_) => StatusCode::CONFLICT,
            BookingError::AmountMismatch { .. } => StatusCode::UNPROCESSABLE_ENTITY,
            BookingError::PaymentDeclined => StatusCode::PAYMENT_REQUIRED,
            BookingError::PersistenceError => StatusCode::INTERNAL_SERVER_ERROR,
            BookingError::DataUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            BookingError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
        }
    }
}

impl From<validator::ValidationErrors> for BookingError {
    fn from(err: validator::ValidationErrors) -> Self {
        BookingError::InvalidRequest(format!("validation failed: {}", err))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiError {
    success: bool,
    reason: &'static str,
    error: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    conflicting_seats: Option<Vec<SeatId>>,
}

impl From<&BookingError> for ApiError {
    fn from(err: &BookingError) -> Self {
        ApiError {
            success: false,
            reason: err.reason(),
            error: err.to_string(),
            conflicting_seats: match err {
                BookingError::SeatConflict(seats) => Some(seats.clone()),
                _ => None,
            },
        }
    }
}

impl IntoResponse for BookingError {
    fn into_response(self) -> axum::response::Response {
        (self.status_code(), Json(ApiError::from(&self))).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn conflict_message_names_seats_and_asks_for_new_ones() {
        let err = BookingError::SeatConflict(vec!["C8".parse().unwrap(), "C9".parse().unwrap()]);
        assert_eq!(
            err.to_string(),
            "Seats C8, C9 have already been booked. Please select different seats."
        );
        assert_eq!(err.status_code(), StatusCode::CONFLICT);
    }

    #[test]
    fn decline_and_conflict_are_distinguishable() {
        let declined = BookingError::PaymentDeclined;
        let conflict = BookingError::SeatConflict(vec!["A1".parse().unwrap()]);
        assert_ne!(declined.reason(), conflict.reason());
        assert!(declined.to_string().contains("try again"));
        assert!(conflict.to_string().contains("different seats"));
    }

    #[test]
    fn api_error_carries_conflicting_seats() {
        let err = BookingError::SeatConflict(vec!["C8".parse().unwrap()]);
        let body = serde_json::to_value(ApiError::from(&err)).unwrap();
        assert_eq!(body["success"], false);
        assert_eq!(body["reason"], "seat_conflict");
        assert_eq!(body["conflictingSeats"][0], "C8");

        let body = serde_json::to_value(ApiError::from(&BookingError::PaymentDeclined)).unwrap();
        assert!(body.get("conflictingSeats").is_none());
    }
}
