use futures::future::BoxFuture;
use reqwest::StatusCode;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;
use uuid::Uuid;

use crate::error::BookingError;
use crate::models::{Booking, PaymentMethod, SeatId, SeatMap};
use crate::services::{LedgerSnapshot, LedgerSource};

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("{message} ({reason}, HTTP {status})")]
    Api {
        status: StatusCode,
        reason: String,
        message: String,
        conflicting_seats: Vec<SeatId>,
    },
}

impl ClientError {
    pub fn reason(&self) -> Option<&str> {
        match self {
            ClientError::Api { reason, .. } => Some(reason),
            ClientError::Http(_) => None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ErrorBody {
    reason: String,
    error: String,
    #[serde(default)]
    conflicting_seats: Vec<SeatId>,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateBooking {
    pub showtime_id: Uuid,
    pub seat_ids: Vec<SeatId>,
    pub seat_count: u32,
    pub total_amount: i64,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequest {
    pub booking_id: Uuid,
    pub amount: f64,
    pub payment_method: PaymentMethod,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub movie_title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub seats: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub show_date: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResult {
    pub success: bool,
    pub booking_id: Uuid,
    pub transaction_id: String,
    pub amount: i64,
    pub message: String,
}

/// HTTP-клиент API бронирования.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(base_url: &str) -> Result<Self, ClientError> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(30))
            .build()?;
        Ok(Self {
            http,
            base_url: base_url.trim_end_matches('/').to_string(),
            token: None,
        })
    }

    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}/api{}", self.base_url, path)
    }

    fn authorized(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }

    async fn read<T: for<'de> Deserialize<'de>>(response: reqwest::Response) -> Result<T, ClientError> {
        let status = response.status();
        if status.is_success() {
            return Ok(response.json::<T>().await?);
        }

        let text = response.text().await?;
        Err(match serde_json::from_str::<ErrorBody>(&text) {
            Ok(body) => ClientError::Api {
                status,
                reason: body.reason,
                message: body.error,
                conflicting_seats: body.conflicting_seats,
            },
            Err(_) => ClientError::Api {
                status,
                reason: "unexpected_response".to_string(),
                message: text,
                conflicting_seats: Vec::new(),
            },
        })
    }

    pub async fn seat_map(&self) -> Result<SeatMap, ClientError> {
        let response = self.http.get(self.url("/seat-map")).send().await?;
        Self::read(response).await
    }

    pub async fn taken_seats(&self, showtime_id: Uuid) -> Result<LedgerSnapshot, ClientError> {
        let response = self
            .http
            .get(self.url(&format!("/showtimes/{}/seats", showtime_id)))
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn create_booking(&self, request: &CreateBooking) -> Result<Booking, ClientError> {
        let response = self
            .authorized(self.http.post(self.url("/bookings")))
            .json(request)
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn list_bookings(&self) -> Result<Vec<Booking>, ClientError> {
        let response = self.authorized(self.http.get(self.url("/bookings"))).send().await?;
        Self::read(response).await
    }

    pub async fn cancel_booking(&self, booking_id: Uuid) -> Result<Booking, ClientError> {
        let response = self
            .authorized(self.http.post(self.url("/bookings/cancel")))
            .json(&serde_json::json!({ "bookingId": booking_id }))
            .send()
            .await?;
        Self::read(response).await
    }

    pub async fn process_payment(&self, request: &PaymentRequest) -> Result<PaymentResult, ClientError> {
        let response = self
            .authorized(self.http.post(self.url("/payments/process")))
            .json(request)
            .send()
            .await?;
        Self::read(response).await
    }
}

impl LedgerSource for ApiClient {
    fn taken_seats(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<LedgerSnapshot, BookingError>> {
        let client = self.clone();
        Box::pin(async move {
            client.taken_seats(showtime_id).await.map_err(|e| match e.reason() {
                Some("not_found") => BookingError::NotFound("Showtime"),
                _ => BookingError::DataUnavailable,
            })
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, header, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    #[tokio::test]
    async fn reads_ledger_snapshot() {
        let server = MockServer::start().await;
        let showtime_id = Uuid::new_v4();
        Mock::given(method("GET"))
            .and(path(format!("/api/showtimes/{}/seats", showtime_id)))
            .respond_with(ResponseTemplate::new(200).set_body_json(serde_json::json!({
                "showtimeId": showtime_id,
                "taken": ["A2", "A10"],
                "fetchedAt": "2025-03-14T19:00:00Z"
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let snapshot = client.taken_seats(showtime_id).await.unwrap();
        assert_eq!(snapshot.showtime_id, showtime_id);
        assert_eq!(snapshot.taken.len(), 2);
    }

    #[tokio::test]
    async fn payment_conflict_surfaces_reason_and_seats() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/api/payments/process"))
            .and(header("authorization", "Bearer token-1"))
            .and(body_partial_json(serde_json::json!({ "paymentMethod": "debit" })))
            .respond_with(ResponseTemplate::new(409).set_body_json(serde_json::json!({
                "success": false,
                "reason": "seat_conflict",
                "error": "Seats C8 have already been booked. Please select different seats.",
                "conflictingSeats": ["C8"]
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap().with_token("token-1");
        let err = client
            .process_payment(&PaymentRequest {
                booking_id: Uuid::new_v4(),
                amount: 105.0,
                payment_method: PaymentMethod::Debit,
                movie_title: None,
                seats: Some(1),
                show_date: None,
            })
            .await
            .unwrap_err();

        match err {
            ClientError::Api {
                status,
                reason,
                conflicting_seats,
                ..
            } => {
                assert_eq!(status, StatusCode::CONFLICT);
                assert_eq!(reason, "seat_conflict");
                assert_eq!(conflicting_seats, vec!["C8".parse::<SeatId>().unwrap()]);
            }
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[tokio::test]
    async fn ledger_source_maps_outage_to_data_unavailable() {
        let server = MockServer::start().await;
        Mock::given(method("GET"))
            .respond_with(ResponseTemplate::new(503).set_body_json(serde_json::json!({
                "success": false,
                "reason": "data_unavailable",
                "error": "Seat availability is temporarily unavailable."
            })))
            .mount(&server)
            .await;

        let client = ApiClient::new(&server.uri()).unwrap();
        let source: &dyn LedgerSource = &client;
        assert_eq!(
            source.taken_seats(Uuid::new_v4()).await,
            Err(BookingError::DataUnavailable)
        );
    }
}
