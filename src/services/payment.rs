//! payment.rs
//!
//! Сервисный слой для взаимодействия с внешним платёжным шлюзом.
//!
//! Ключевые компоненты:
//! 1.  **PaymentGateway**: контракт шлюза. Результат списания непрозрачен для
//!     ядра: одобрено с идентификатором транзакции или отклонено.
//! 2.  **CircuitBreaker**: паттерн "Автоматический выключатель". Не даёт
//!     засыпать запросами неработающий шлюз.
//! 3.  **HttpPaymentGateway**: HTTP-клиент шлюза с токеном запроса на SHA-256,
//!     все вызовы идут через `CircuitBreaker`.
//! 4.  **SimulatedGateway**: имитация шлюза с задержкой и долей успешных платежей.

use chrono::Utc;
use futures::future::BoxFuture;
use rand::Rng;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::sync::{Arc, Mutex, PoisonError};
use thiserror::Error;
use tokio::time::{Duration, Instant};
use tracing::{error, info, warn};
use uuid::Uuid;

use crate::config::{CircuitBreakerConfig, PaymentConfig};
use crate::models::PaymentMethod;

const CURRENCY: &str = "INR";

/// Запрос на списание.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub booking_id: Uuid,
    pub amount: i64,
    pub method: PaymentMethod,
    pub description: String,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayOutcome {
    Approved { transaction_id: String },
    Declined { reason: String },
}

#[derive(Debug, Error)]
pub enum GatewayError {
    #[error("circuit breaker is open - payment gateway temporarily unavailable")]
    CircuitOpen,
    #[error("payment gateway error: {0}")]
    Http(#[from] reqwest::Error),
    #[error("unexpected payment gateway response: {0}")]
    InvalidResponse(String),
}

pub trait PaymentGateway: Send + Sync {
    fn charge(&self, request: ChargeRequest) -> BoxFuture<'static, Result<GatewayOutcome, GatewayError>>;
}

/// Состояния "Автоматического выключателя".
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CircuitState {
    /// Нормальный режим, запросы разрешены.
    Closed,
    /// Запросы запрещены после серии сбоев.
    Open,
    /// После таймаута в Open пропускается пробный запрос.
    HalfOpen,
}

#[derive(Debug)]
struct BreakerInner {
    state: CircuitState,
    failure_count: u32,
    opened_at: Option<Instant>,
}

#[derive(Debug)]
pub struct CircuitBreaker {
    inner: Mutex<BreakerInner>,
    failure_threshold: u32,
    open_timeout: Duration,
}

impl CircuitBreaker {
    pub fn new(config: &CircuitBreakerConfig) -> Self {
        Self {
            inner: Mutex::new(BreakerInner {
                state: CircuitState::Closed,
                failure_count: 0,
                opened_at: None,
            }),
            failure_threshold: config.failure_threshold.max(1),
            open_timeout: Duration::from_secs(config.timeout_seconds),
        }
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, BreakerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Можно ли выполнить следующий запрос к шлюзу.
    pub fn can_execute(&self) -> bool {
        let mut inner = self.lock();
        match inner.state {
            CircuitState::Closed | CircuitState::HalfOpen => true,
            CircuitState::Open => {
                let expired = inner
                    .opened_at
                    .map_or(true, |at| at.elapsed() >= self.open_timeout);
                if expired {
                    inner.state = CircuitState::HalfOpen;
                    info!("Circuit breaker transitioning to HalfOpen state");
                }
                expired
            }
        }
    }

    pub fn record_success(&self) {
        let mut inner = self.lock();
        if inner.state == CircuitState::HalfOpen {
            info!("Circuit breaker recovered - transitioning to Closed state");
        }
        inner.state = CircuitState::Closed;
        inner.failure_count = 0;
        inner.opened_at = None;
    }

    pub fn record_failure(&self) {
        let mut inner = self.lock();
        inner.failure_count += 1;
        match inner.state {
            CircuitState::Closed if inner.failure_count >= self.failure_threshold => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                error!(
                    "Circuit breaker OPENED - {} failures reached threshold {}",
                    inner.failure_count, self.failure_threshold
                );
            }
            CircuitState::HalfOpen => {
                inner.state = CircuitState::Open;
                inner.opened_at = Some(Instant::now());
                warn!("Circuit breaker test failed - returning to Open state");
            }
            _ => {}
        }
    }

    pub fn state(&self) -> CircuitState {
        self.lock().state
    }

    pub fn failure_count(&self) -> u32 {
        self.lock().failure_count
    }
}

// --- Модели данных для API платёжного шлюза ---

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct ChargeBody {
    merchant_id: String,
    token: String,
    amount: i64,
    currency: String,
    order_id: String,
    payment_method: &'static str,
    description: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ChargeResponse {
    success: bool,
    transaction_id: Option<String>,
    code: Option<i32>,
    message: Option<String>,
}

/// Клиент HTTP-шлюза.
#[derive(Clone)]
pub struct HttpPaymentGateway {
    merchant_id: String,
    password: String,
    base_url: String,
    http_client: reqwest::Client,
    circuit_breaker: Arc<CircuitBreaker>,
}

impl HttpPaymentGateway {
    pub fn from_config(
        config: &PaymentConfig,
        breaker: &CircuitBreakerConfig,
    ) -> Result<Self, GatewayError> {
        let http_client = reqwest::Client::builder()
            .timeout(config.timeout())
            .build()?;

        Ok(Self {
            merchant_id: config.merchant_id.clone(),
            password: config.merchant_password.clone(),
            base_url: config.gateway_url.trim_end_matches('/').to_string(),
            http_client,
            circuit_breaker: Arc::new(CircuitBreaker::new(breaker)),
        })
    }

    pub fn circuit_breaker(&self) -> &CircuitBreaker {
        &self.circuit_breaker
    }

    /// Токен запроса: sha256(amount + currency + orderId + password + merchantId).
    fn generate_token(&self, amount: i64, currency: &str, order_id: &str) -> String {
        let token_string = format!(
            "{}{}{}{}{}",
            amount, currency, order_id, self.password, self.merchant_id
        );
        let mut hasher = Sha256::new();
        hasher.update(token_string.as_bytes());
        format!("{:x}", hasher.finalize())
    }

    async fn send_charge(&self, body: &ChargeBody) -> Result<ChargeResponse, reqwest::Error> {
        self.http_client
            .post(format!("{}/charge", self.base_url))
            .json(body)
            .send()
            .await?
            .error_for_status()?
            .json::<ChargeResponse>()
            .await
    }

    async fn charge_with_breaker(&self, request: ChargeRequest) -> Result<GatewayOutcome, GatewayError> {
        if !self.circuit_breaker.can_execute() {
            warn!("Circuit breaker is OPEN - blocking payment gateway request");
            return Err(GatewayError::CircuitOpen);
        }

        let order_id = request.booking_id.to_string();
        let body = ChargeBody {
            merchant_id: self.merchant_id.clone(),
            token: self.generate_token(request.amount, CURRENCY, &order_id),
            amount: request.amount,
            currency: CURRENCY.to_string(),
            order_id,
            payment_method: request.method.as_str(),
            description: request.description,
        };

        info!(
            booking_id = %request.booking_id,
            amount = request.amount,
            state = ?self.circuit_breaker.state(),
            "Charging through payment gateway"
        );

        let response = match self.send_charge(&body).await {
            Ok(response) => response,
            Err(e) => {
                self.circuit_breaker.record_failure();
                error!(
                    failures = self.circuit_breaker.failure_count(),
                    "Payment gateway request failed: {:?}", e
                );
                return Err(GatewayError::Http(e));
            }
        };

        // Отказ по карте - нормальный ответ шлюза, выключатель его не считает
        if !response.success {
            self.circuit_breaker.record_success();
            let reason = response
                .message
                .unwrap_or_else(|| format!("declined with code {}", response.code.unwrap_or_default()));
            return Ok(GatewayOutcome::Declined { reason });
        }

        match response.transaction_id.filter(|id| !id.is_empty()) {
            Some(transaction_id) => {
                self.circuit_breaker.record_success();
                Ok(GatewayOutcome::Approved { transaction_id })
            }
            None => {
                self.circuit_breaker.record_failure();
                Err(GatewayError::InvalidResponse(
                    "approved charge without transactionId".to_string(),
                ))
            }
        }
    }
}

impl PaymentGateway for HttpPaymentGateway {
    fn charge(&self, request: ChargeRequest) -> BoxFuture<'static, Result<GatewayOutcome, GatewayError>> {
        let gateway = self.clone();
        Box::pin(async move { gateway.charge_with_breaker(request).await })
    }
}

/// Имитация шлюза: задержка обработки и заданная доля успешных списаний.
#[derive(Debug, Clone)]
pub struct SimulatedGateway {
    delay: Duration,
    success_rate: f64,
}

impl SimulatedGateway {
    pub fn new(delay: Duration, success_rate: f64) -> Self {
        Self {
            delay,
            success_rate: success_rate.clamp(0.0, 1.0),
        }
    }

    pub fn from_config(config: &PaymentConfig) -> Self {
        Self::new(
            Duration::from_millis(config.simulated_delay_ms),
            config.simulated_success_rate,
        )
    }
}

/// `TXN_<unix millis>_<9 символов base36>`.
pub fn generate_transaction_id() -> String {
    const ALPHABET: &[u8] = b"0123456789abcdefghijklmnopqrstuvwxyz";
    let mut rng = rand::rng();
    let suffix: String = (0..9)
        .map(|_| ALPHABET[rng.random_range(0..ALPHABET.len())] as char)
        .collect();
    format!("TXN_{}_{}", Utc::now().timestamp_millis(), suffix)
}

impl PaymentGateway for SimulatedGateway {
    fn charge(&self, request: ChargeRequest) -> BoxFuture<'static, Result<GatewayOutcome, GatewayError>> {
        let gateway = self.clone();
        Box::pin(async move {
            tokio::time::sleep(gateway.delay).await;

            let approved = rand::rng().random_bool(gateway.success_rate);
            if approved {
                let transaction_id = generate_transaction_id();
                info!(booking_id = %request.booking_id, %transaction_id, "Simulated charge approved");
                Ok(GatewayOutcome::Approved { transaction_id })
            } else {
                info!(booking_id = %request.booking_id, "Simulated charge declined");
                Ok(GatewayOutcome::Declined {
                    reason: "simulated decline".to_string(),
                })
            }
        })
    }
}
