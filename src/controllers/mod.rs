pub mod bookings;
pub mod payment;
pub mod seats;

use axum::{extract::rejection::JsonRejection, Json, Router};
use std::sync::Arc;

use crate::error::BookingError;

pub fn routes() -> Router<Arc<crate::AppState>> {
    Router::new()
        .merge(seats::routes())
        .merge(bookings::routes())
        .merge(payment::routes())
}

// Ошибка разбора тела отдаётся тем же форматом, что и остальные ошибки
pub(crate) fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, BookingError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| BookingError::InvalidRequest(rejection.body_text()))
}
