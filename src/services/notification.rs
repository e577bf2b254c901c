use futures::future::BoxFuture;
use serde::Serialize;
use std::time::Duration;
use thiserror::Error;
use tracing::info;
use uuid::Uuid;

use crate::models::{PaymentMethod, SeatId};

/// Подтверждение оплаченной брони для пользователя.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookingConfirmation {
    pub booking_id: Uuid,
    pub user_id: String,
    pub transaction_id: String,
    pub amount: i64,
    pub payment_method: PaymentMethod,
    pub seats: Vec<SeatId>,
    pub movie_title: Option<String>,
    pub show_date: Option<String>,
}

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("notification webhook failed: {0}")]
    Webhook(#[from] reqwest::Error),
}

/// Получатель уведомлений. Ошибка уведомления не откатывает оплату.
pub trait Notifier: Send + Sync {
    fn notify(&self, confirmation: BookingConfirmation) -> BoxFuture<'static, Result<(), NotifyError>>;
}

#[derive(Debug, Clone, Default)]
pub struct LogNotifier;

impl Notifier for LogNotifier {
    fn notify(&self, confirmation: BookingConfirmation) -> BoxFuture<'static, Result<(), NotifyError>> {
        Box::pin(async move {
            info!(
                booking_id = %confirmation.booking_id,
                user_id = %confirmation.user_id,
                transaction_id = %confirmation.transaction_id,
                amount = confirmation.amount,
                method = confirmation.payment_method.label(),
                seats = confirmation.seats.len(),
                "Booking confirmation sent"
            );
            Ok(())
        })
    }
}

#[derive(Clone)]
pub struct WebhookNotifier {
    http_client: reqwest::Client,
    url: String,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Result<Self, NotifyError> {
        let http_client = reqwest::Client::builder()
            .timeout(Duration::from_secs(10))
            .build()?;
        Ok(Self { http_client, url })
    }
}

impl Notifier for WebhookNotifier {
    fn notify(&self, confirmation: BookingConfirmation) -> BoxFuture<'static, Result<(), NotifyError>> {
        let notifier = self.clone();
        Box::pin(async move {
            notifier
                .http_client
                .post(&notifier.url)
                .json(&confirmation)
                .send()
                .await?
                .error_for_status()?;
            info!(booking_id = %confirmation.booking_id, "Booking confirmation delivered to webhook");
            Ok(())
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use wiremock::matchers::{body_partial_json, method, path};
    use wiremock::{Mock, MockServer, ResponseTemplate};

    fn confirmation() -> BookingConfirmation {
        BookingConfirmation {
            booking_id: Uuid::new_v4(),
            user_id: "user-7".to_string(),
            transaction_id: "TXN_1700000000000_abc123xyz".to_string(),
            amount: 525,
            payment_method: PaymentMethod::Credit,
            seats: vec!["C7".parse().unwrap(), "C8".parse().unwrap()],
            movie_title: Some("Interstellar".to_string()),
            show_date: Some("2025-03-14".to_string()),
        }
    }

    #[tokio::test]
    async fn webhook_posts_confirmation_json() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .and(path("/hooks/booking"))
            .and(body_partial_json(serde_json::json!({
                "userId": "user-7",
                "paymentMethod": "credit",
                "seats": ["C7", "C8"]
            })))
            .respond_with(ResponseTemplate::new(204))
            .expect(1)
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(format!("{}/hooks/booking", server.uri())).unwrap();
        notifier.notify(confirmation()).await.unwrap();
    }

    #[tokio::test]
    async fn webhook_error_status_is_reported() {
        let server = MockServer::start().await;
        Mock::given(method("POST"))
            .respond_with(ResponseTemplate::new(502))
            .mount(&server)
            .await;

        let notifier = WebhookNotifier::new(server.uri()).unwrap();
        assert!(notifier.notify(confirmation()).await.is_err());
    }
}
