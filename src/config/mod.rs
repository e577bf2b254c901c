use serde::Deserialize;
use std::env;
use std::str::FromStr;
use std::time::Duration;
use thiserror::Error;

use crate::models::SeatMap;

// Главная структура конфигурации - контейнер для всех настроек
#[derive(Debug, Clone, Deserialize)]
pub struct Config {
    pub app: AppConfig,
    pub storage: StorageConfig,
    pub database: DatabaseConfig,
    pub redis: RedisConfig,
    pub jwt: JwtConfig,
    pub payment: PaymentConfig,
    pub circuit_breaker: CircuitBreakerConfig,
    pub booking: BookingConfig,
    pub seat_map: SeatMapConfig,
    pub notification: NotificationConfig,
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("{0} must be set")]
    Missing(&'static str),
    #[error("{key} has invalid value '{value}'")]
    Invalid { key: &'static str, value: String },
    #[error("SEAT_LOCK_TTL_MS ({lock_ttl_ms}) must exceed PAYMENT_TIMEOUT_MS ({payment_timeout_ms})")]
    LockTtlTooShort {
        lock_ttl_ms: u64,
        payment_timeout_ms: u64,
    },
}

// Настройки приложения
#[derive(Debug, Clone, Deserialize)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub environment: String,
    pub rust_log: String,
    pub log_json: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StorageBackend {
    Postgres,
    Memory,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum LockBackend {
    Redis,
    Local,
}

// Где хранятся брони и как сериализуется финализация
#[derive(Debug, Clone, Deserialize)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub locks: LockBackend,
}

// Настройки базы данных
#[derive(Debug, Clone, Deserialize)]
pub struct DatabaseConfig {
    pub url: Option<String>,
    pub pool_size: u32,
}

// Настройки Redis
#[derive(Debug, Clone, Deserialize)]
pub struct RedisConfig {
    pub url: Option<String>,
}

// Настройки JWT (внешний провайдер идентификации)
#[derive(Debug, Clone, Deserialize)]
pub struct JwtConfig {
    pub secret: String,
    pub issuer: Option<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum GatewayKind {
    Simulated,
    Http,
}

// Настройки платежного шлюза
#[derive(Debug, Clone, Deserialize)]
pub struct PaymentConfig {
    pub gateway: GatewayKind,
    pub merchant_id: String,
    pub merchant_password: String,
    pub gateway_url: String,
    pub timeout_ms: u64,
    pub simulated_delay_ms: u64,
    pub simulated_success_rate: f64,
}

impl PaymentConfig {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// Настройки Circuit Breaker
#[derive(Debug, Clone, Deserialize)]
pub struct CircuitBreakerConfig {
    pub failure_threshold: u32,
    pub timeout_seconds: u64,
}

// Правила бронирования и фоновой очистки
#[derive(Debug, Clone, Deserialize)]
pub struct BookingConfig {
    pub max_seats_per_booking: u32,
    pub reject_taken_on_create: bool,
    pub pending_ttl_secs: u64,
    pub reaper_interval_secs: u64,
    pub lock_ttl_ms: u64,
    pub lock_wait_ms: u64,
}

impl BookingConfig {
    pub fn pending_ttl(&self) -> Duration {
        Duration::from_secs(self.pending_ttl_secs)
    }

    pub fn reaper_interval(&self) -> Duration {
        Duration::from_secs(self.reaper_interval_secs)
    }

    pub fn lock_ttl(&self) -> Duration {
        Duration::from_millis(self.lock_ttl_ms)
    }

    pub fn lock_wait(&self) -> Duration {
        Duration::from_millis(self.lock_wait_ms)
    }
}

impl Default for BookingConfig {
    fn default() -> Self {
        Self {
            max_seats_per_booking: 10,
            reject_taken_on_create: false,
            pending_ttl_secs: 15 * 60,
            reaper_interval_secs: 60,
            lock_ttl_ms: 45_000,
            lock_wait_ms: 10_000,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SeatMapConfig {
    pub rows: String,
    pub seats_per_row: u16,
}

impl SeatMapConfig {
    pub fn build(&self) -> SeatMap {
        SeatMap::new(&self.rows, self.seats_per_row)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct NotificationConfig {
    pub webhook_url: Option<String>,
}

fn var_opt(key: &'static str) -> Option<String> {
    env::var(key).ok().filter(|v| !v.trim().is_empty())
}

fn var_or(key: &'static str, default: &str) -> String {
    var_opt(key).unwrap_or_else(|| default.to_string())
}

fn parse_or<T: FromStr>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var_opt(key) {
        Some(value) => value
            .trim()
            .parse()
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

fn enum_or<T: for<'de> Deserialize<'de>>(key: &'static str, default: T) -> Result<T, ConfigError> {
    match var_opt(key) {
        Some(value) => serde_json::from_value(serde_json::Value::String(value.to_lowercase()))
            .map_err(|_| ConfigError::Invalid { key, value }),
        None => Ok(default),
    }
}

impl Config {
    pub fn from_env() -> Result<Self, ConfigError> {
        let backend = enum_or("STORAGE_BACKEND", StorageBackend::Postgres)?;
        let locks = enum_or("LOCK_BACKEND", LockBackend::Redis)?;

        let database_url = var_opt("DATABASE_URL");
        if backend == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::Missing("DATABASE_URL"));
        }
        let redis_url = var_opt("REDIS_URL");
        if locks == LockBackend::Redis && redis_url.is_none() {
            return Err(ConfigError::Missing("REDIS_URL"));
        }

        let success_rate: f64 = parse_or("PAYMENT_SIMULATED_SUCCESS_RATE", 0.95)?;
        if !(0.0..=1.0).contains(&success_rate) {
            return Err(ConfigError::Invalid {
                key: "PAYMENT_SIMULATED_SUCCESS_RATE",
                value: success_rate.to_string(),
            });
        }

        let defaults = BookingConfig::default();

        let config = Config {
            app: AppConfig {
                host: var_or("HOST", "0.0.0.0"),
                port: parse_or("PORT", 8000)?,
                environment: var_or("ENVIRONMENT", "development"),
                rust_log: var_or("RUST_LOG", "cinema_booking=debug,tower_http=debug"),
                log_json: var_or("LOG_FORMAT", "text").eq_ignore_ascii_case("json"),
            },
            storage: StorageConfig { backend, locks },
            database: DatabaseConfig {
                url: database_url,
                pool_size: parse_or("DB_POOL_SIZE", 20)?,
            },
            redis: RedisConfig { url: redis_url },
            jwt: JwtConfig {
                secret: var_opt("JWT_SECRET").ok_or(ConfigError::Missing("JWT_SECRET"))?,
                issuer: var_opt("JWT_ISSUER"),
            },
            payment: PaymentConfig {
                gateway: enum_or("PAYMENT_GATEWAY", GatewayKind::Simulated)?,
                merchant_id: var_or("MERCHANT_ID", ""),
                merchant_password: var_or("MERCHANT_PASSWORD", ""),
                gateway_url: var_or("PAYMENT_GATEWAY_URL", "http://localhost:9000"),
                timeout_ms: parse_or("PAYMENT_TIMEOUT_MS", 30_000)?,
                simulated_delay_ms: parse_or("PAYMENT_SIMULATED_DELAY_MS", 1_500)?,
                simulated_success_rate: success_rate,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: parse_or("CIRCUIT_BREAKER_FAILURE_THRESHOLD", 5)?,
                timeout_seconds: parse_or("CIRCUIT_BREAKER_TIMEOUT_SECONDS", 60)?,
            },
            booking: BookingConfig {
                max_seats_per_booking: parse_or("MAX_SEATS_PER_BOOKING", defaults.max_seats_per_booking)?,
                reject_taken_on_create: parse_or("REJECT_TAKEN_SEATS_ON_CREATE", defaults.reject_taken_on_create)?,
                pending_ttl_secs: parse_or("PENDING_BOOKING_TTL_SECS", defaults.pending_ttl_secs)?,
                reaper_interval_secs: parse_or("REAPER_INTERVAL_SECS", defaults.reaper_interval_secs)?,
                lock_ttl_ms: parse_or("SEAT_LOCK_TTL_MS", defaults.lock_ttl_ms)?,
                lock_wait_ms: parse_or("SEAT_LOCK_WAIT_MS", defaults.lock_wait_ms)?,
            },
            seat_map: SeatMapConfig {
                rows: var_or("SEAT_MAP_ROWS", SeatMap::DEFAULT_ROWS),
                seats_per_row: parse_or("SEATS_PER_ROW", SeatMap::DEFAULT_SEATS_PER_ROW)?,
            },
            notification: NotificationConfig {
                webhook_url: var_opt("NOTIFICATION_WEBHOOK_URL"),
            },
        };
        config.validate()?;
        Ok(config)
    }

    /// Ключ блокировки в Redis не должен истечь, пока ждём ответа шлюза.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage.locks == LockBackend::Redis && self.booking.lock_ttl_ms <= self.payment.timeout_ms {
            return Err(ConfigError::LockTtlTooShort {
                lock_ttl_ms: self.booking.lock_ttl_ms,
                payment_timeout_ms: self.payment.timeout_ms,
            });
        }
        Ok(())
    }

    /// Конфигурация без внешних зависимостей: память, локальные блокировки,
    /// симулированный шлюз. Используется в тестах и для локального запуска.
    pub fn in_memory(jwt_secret: &str) -> Self {
        Config {
            app: AppConfig {
                host: "127.0.0.1".to_string(),
                port: 0,
                environment: "test".to_string(),
                rust_log: "cinema_booking=debug".to_string(),
                log_json: false,
            },
            storage: StorageConfig {
                backend: StorageBackend::Memory,
                locks: LockBackend::Local,
            },
            database: DatabaseConfig { url: None, pool_size: 1 },
            redis: RedisConfig { url: None },
            jwt: JwtConfig {
                secret: jwt_secret.to_string(),
                issuer: None,
            },
            payment: PaymentConfig {
                gateway: GatewayKind::Simulated,
                merchant_id: String::new(),
                merchant_password: String::new(),
                gateway_url: String::new(),
                timeout_ms: 5_000,
                simulated_delay_ms: 0,
                simulated_success_rate: 1.0,
            },
            circuit_breaker: CircuitBreakerConfig {
                failure_threshold: 5,
                timeout_seconds: 60,
            },
            booking: BookingConfig::default(),
            seat_map: SeatMapConfig {
                rows: SeatMap::DEFAULT_ROWS.to_string(),
                seats_per_row: SeatMap::DEFAULT_SEATS_PER_ROW,
            },
            notification: NotificationConfig { webhook_url: None },
        }
    }
}
