pub mod client;
pub mod config;
pub mod controllers;
pub mod database;
pub mod error;
pub mod locks;
pub mod middleware;
pub mod models;
pub mod redis_client;
pub mod services;
pub mod store;

use axum::{routing::get, Router};
use std::sync::Arc;
use thiserror::Error;
use tower_http::trace::TraceLayer;
use tracing::info;

use config::{Config, GatewayKind, LockBackend, StorageBackend};
use database::Database;
use locks::{LocalShowtimeLocks, RedisShowtimeLocks, ShowtimeLocks};
use middleware::JwtVerifier;
use models::SeatMap;
use redis_client::RedisClient;
use services::notification::{LogNotifier, Notifier, NotifyError, WebhookNotifier};
use services::payment::{GatewayError, HttpPaymentGateway, PaymentGateway, SimulatedGateway};
use services::{BookingIntentManager, CleanupService, PaymentFinalizer, SeatLedger};
use store::{BookingStore, MemoryBookingStore, PgBookingStore};

#[derive(Debug, Error)]
pub enum StartupError {
    #[error("{0} is required for the selected backend")]
    MissingUrl(&'static str),
    #[error("database connection failed: {0}")]
    Database(#[from] sqlx::Error),
    #[error("database migration failed: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),
    #[error("redis connection failed: {0}")]
    Redis(#[from] redis::RedisError),
    #[error("payment gateway setup failed: {0}")]
    Gateway(#[from] GatewayError),
    #[error("notifier setup failed: {0}")]
    Notifier(#[from] NotifyError),
}

// Shared state для всего приложения
pub struct AppState {
    pub config: Config,
    pub seat_map: SeatMap,
    pub identity: JwtVerifier,
    pub store: Arc<dyn BookingStore>,
    pub locks: Arc<dyn ShowtimeLocks>,
    pub redis: Option<RedisClient>,
    pub ledger: SeatLedger,
    pub intents: BookingIntentManager,
    pub finalizer: PaymentFinalizer,
}

/// Внешние зависимости, из которых собирается состояние.
pub struct Backends {
    pub store: Arc<dyn BookingStore>,
    pub locks: Arc<dyn ShowtimeLocks>,
    pub gateway: Arc<dyn PaymentGateway>,
    pub notifier: Arc<dyn Notifier>,
    pub redis: Option<RedisClient>,
}

impl AppState {
    /// Подключает хранилище, блокировки, шлюз и уведомления по конфигурации.
    pub async fn new(config: Config) -> Result<Arc<Self>, StartupError> {
        let store: Arc<dyn BookingStore> = match config.storage.backend {
            StorageBackend::Postgres => {
                let url = config
                    .database
                    .url
                    .as_deref()
                    .ok_or(StartupError::MissingUrl("DATABASE_URL"))?;
                let db = Database::connect(url, &config.database).await?;
                info!("Database connected");
                db.run_migrations().await?;
                Arc::new(PgBookingStore::new(db.pool.clone()))
            }
            StorageBackend::Memory => {
                info!("Using in-memory booking store");
                Arc::new(MemoryBookingStore::new())
            }
        };

        let redis = match config.redis.url.as_deref() {
            Some(url) => {
                let client = RedisClient::new(url).await?;
                info!("Redis connected");
                Some(client)
            }
            None => None,
        };

        let locks: Arc<dyn ShowtimeLocks> = match (config.storage.locks, &redis) {
            (LockBackend::Redis, Some(client)) => Arc::new(RedisShowtimeLocks::new(
                client.clone(),
                config.booking.lock_ttl(),
                config.booking.lock_wait(),
            )),
            (LockBackend::Redis, None) => return Err(StartupError::MissingUrl("REDIS_URL")),
            (LockBackend::Local, _) => Arc::new(LocalShowtimeLocks::new()),
        };

        let gateway: Arc<dyn PaymentGateway> = match config.payment.gateway {
            GatewayKind::Simulated => Arc::new(SimulatedGateway::from_config(&config.payment)),
            GatewayKind::Http => Arc::new(HttpPaymentGateway::from_config(
                &config.payment,
                &config.circuit_breaker,
            )?),
        };

        let notifier: Arc<dyn Notifier> = match &config.notification.webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())?),
            None => Arc::new(LogNotifier),
        };

        Ok(Self::from_parts(
            config,
            Backends {
                store,
                locks,
                gateway,
                notifier,
                redis,
            },
        ))
    }

    pub fn from_parts(config: Config, backends: Backends) -> Arc<Self> {
        let seat_map = config.seat_map.build();
        let ledger = SeatLedger::new(backends.store.clone());
        let intents = BookingIntentManager::new(
            backends.store.clone(),
            backends.locks.clone(),
            seat_map.clone(),
            config.booking.clone(),
        );
        let finalizer = PaymentFinalizer::new(
            backends.store.clone(),
            backends.locks.clone(),
            backends.gateway,
            backends.notifier,
            config.payment.timeout(),
        );

        Arc::new(Self {
            identity: JwtVerifier::new(&config.jwt),
            seat_map,
            store: backends.store,
            locks: backends.locks,
            redis: backends.redis,
            ledger,
            intents,
            finalizer,
            config,
        })
    }

    pub fn cleanup_service(&self) -> CleanupService {
        CleanupService::new(
            self.store.clone(),
            self.locks.clone(),
            self.redis.clone(),
            &self.config.booking,
        )
    }
}

pub fn build_router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/health", get(|| async { "OK" }))
        .nest("/api", controllers::routes())
        .with_state(state)
        .layer(TraceLayer::new_for_http())
}
