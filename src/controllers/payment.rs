use axum::{
    extract::{rejection::JsonRejection, State},
    routing::post,
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;
use validator::Validate;

use super::json_body;
use crate::error::BookingError;
use crate::middleware::AuthUser;
use crate::models::PaymentMethod;
use crate::services::FinalizeRequest;
use crate::AppState;

pub fn routes() -> Router<Arc<AppState>> {
    Router::new().route("/payments/process", post(process_payment))
}

// --- Request/Response структуры ---
#[derive(Debug, Deserialize, Validate)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentRequest {
    pub booking_id: Uuid,
    #[validate(range(exclusive_min = 0.0))]
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[validate(length(max = 300))]
    pub movie_title: Option<String>,
    /// Количество мест, как его показал клиент.
    #[validate(range(min = 1))]
    pub seats: Option<u32>,
    pub show_date: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessPaymentResponse {
    pub success: bool,
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub amount: i64,
    pub message: String,
}

/// POST /api/payments/process
async fn process_payment(
    State(state): State<Arc<AppState>>,
    user: AuthUser,
    body: Result<Json<ProcessPaymentRequest>, JsonRejection>,
) -> Result<Json<ProcessPaymentResponse>, BookingError> {
    let req = json_body(body)?;
    req.validate()?;

    let receipt = state
        .finalizer
        .finalize(
            &user,
            FinalizeRequest {
                booking_id: req.booking_id,
                amount: req.amount,
                payment_method: req.payment_method,
                movie_title: req.movie_title,
                seat_count: req.seats,
                show_date: req.show_date,
            },
        )
        .await?;

    Ok(Json(ProcessPaymentResponse {
        success: true,
        booking_id: receipt.booking_id,
        transaction_id: receipt.transaction_id,
        amount: receipt.amount,
        message: receipt.message,
    }))
}
