use axum::{
    extract::{rejection::JsonRejection, State},
    http::StatusCode,
    response::IntoResponse,
    routing::{get, post},
    Json, Router,
};
use serde::Deserialize;
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::json_body;
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::{Booking, SeatId};
use crate::services::NewBooking;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/bookings", get(get_user_bookings).post(create_booking))
        .route("/bookings/cancel", post(cancel_booking))
}

/* ---------- BOOKINGS ---------- */

// POST /api/bookings
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct CreateBookingRequest {
    pub showtime_id: Uuid,
    #[validate(length(min = 1))]
    pub seat_ids: Vec<SeatId>,
    #[validate(range(min = 1))]
    pub seat_count: u32,
    #[validate(range(min = 1))]
    pub total_amount: i64,
}

async fn create_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<CreateBookingRequest>, JsonRejection>,
) -> Result<impl IntoResponse, BookingError> {
    let req = json_body(body)?;
    req.validate()?;

    let booking = state
        .intents
        .create_booking(
            &user,
            NewBooking {
                showtime_id: req.showtime_id,
                seat_ids: req.seat_ids,
                seat_count: req.seat_count,
                total_amount: req.total_amount,
            },
        )
        .await?;

    Ok((StatusCode::CREATED, Json(booking)))
}

// GET /api/bookings
async fn get_user_bookings(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
) -> Result<Json<Vec<Booking>>, BookingError> {
    let bookings = state.intents.list_bookings(&user).await?;
    Ok(Json(bookings))
}

// POST /api/bookings/cancel
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CancelBookingRequest {
    pub booking_id: Uuid,
}

async fn cancel_booking(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<CancelBookingRequest>, JsonRejection>,
) -> Result<Json<Booking>, BookingError> {
    let req = json_body(body)?;
    let booking = state.intents.cancel_booking(&user, req.booking_id).await?;
    Ok(Json(booking))
}
