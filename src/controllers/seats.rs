use axum::{
    extract::{rejection::PathRejection, Path, State},
    routing::get,
    Json, Router,
};
use std::sync::Arc;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::SeatMap;
use crate::services::LedgerSnapshot;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/seat-map", get(get_seat_map))
        .route("/showtimes/{id}/seats", get(get_taken_seats))
}

// GET /api/seat-map
async fn get_seat_map(State(state): State<Arc<AppState>>) -> Json<SeatMap> {
    Json(state.seat_map.clone())
}

// GET /api/showtimes/{id}/seats
async fn get_taken_seats(
    State(state): State<Arc<AppState>>,
    path: Result<Path<Uuid>, PathRejection>,
) -> Result<Json<LedgerSnapshot>, BookingError> {
    let Path(showtime_id) = path.map_err(|rejection| BookingError::InvalidRequest(rejection.body_text()))?;
    let snapshot = state.ledger.snapshot(showtime_id).await?;
    Ok(Json(snapshot))
}
