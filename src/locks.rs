//! Точка сериализации финализации по сеансу.
//!
//! Проверка мест, списание и фиксация оплаты выполняются под одной
//! блокировкой на сеанс. Локальный вариант работает внутри процесса, Redis
//! сериализует несколько экземпляров сервиса.

use futures::future::BoxFuture;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use thiserror::Error;
use tokio::sync::OwnedMutexGuard;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::redis_client::RedisClient;

#[derive(Debug, Error)]
pub enum LockError {
    #[error("timed out waiting for showtime {0}")]
    Timeout(Uuid),
    #[error("lock backend error: {0}")]
    Backend(#[from] redis::RedisError),
}

pub trait ShowtimeLocks: Send + Sync {
    fn acquire(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<ShowtimeGuard, LockError>>;
}

/// Удерживаемая блокировка сеанса. Освобождается через [`ShowtimeGuard::release`];
/// если guard просто выброшен, локальная блокировка снимается сразу, а ключ в
/// Redis истекает по TTL.
pub struct ShowtimeGuard {
    showtime_id: Uuid,
    inner: GuardInner,
}

enum GuardInner {
    Local {
        _guard: OwnedMutexGuard<()>,
        registry: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
    },
    Redis {
        client: RedisClient,
        key: String,
        token: String,
    },
}

impl ShowtimeGuard {
    pub fn showtime_id(&self) -> Uuid {
        self.showtime_id
    }

    pub async fn release(self) {
        let showtime_id = self.showtime_id;
        match self.inner {
            GuardInner::Local { _guard, registry } => {
                drop(_guard);
                prune_registry(&registry, showtime_id);
            }
            GuardInner::Redis { client, key, token } => match client.release(&key, &token).await {
                Ok(true) => debug!(%showtime_id, "showtime lock released"),
                Ok(false) => warn!(%showtime_id, "showtime lock expired before release"),
                Err(e) => warn!(%showtime_id, error = %e, "failed to release showtime lock, waiting for TTL"),
            },
        }
    }
}

fn prune_registry(registry: &Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>, showtime_id: Uuid) {
    if let Ok(mut map) = registry.lock() {
        // Запись больше никому не нужна, если ссылка на мьютекс осталась только в карте
        if map.get(&showtime_id).is_some_and(|m| Arc::strong_count(m) == 1) {
            map.remove(&showtime_id);
        }
    }
}

/// Блокировки внутри одного процесса.
#[derive(Clone, Default)]
pub struct LocalShowtimeLocks {
    registry: Arc<Mutex<HashMap<Uuid, Arc<tokio::sync::Mutex<()>>>>>,
}

impl LocalShowtimeLocks {
    pub fn new() -> Self {
        Self::default()
    }

    fn mutex_for(&self, showtime_id: Uuid) -> Arc<tokio::sync::Mutex<()>> {
        let mut map = self
            .registry
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        map.entry(showtime_id).or_default().clone()
    }
}

impl ShowtimeLocks for LocalShowtimeLocks {
    fn acquire(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<ShowtimeGuard, LockError>> {
        let mutex = self.mutex_for(showtime_id);
        let registry = self.registry.clone();
        Box::pin(async move {
            let guard = mutex.lock_owned().await;
            Ok(ShowtimeGuard {
                showtime_id,
                inner: GuardInner::Local { _guard: guard, registry },
            })
        })
    }
}

/// Распределённая блокировка на Redis: SET NX PX + снятие по токену.
#[derive(Clone)]
pub struct RedisShowtimeLocks {
    client: RedisClient,
    ttl: Duration,
    wait: Duration,
    retry_every: Duration,
}

impl RedisShowtimeLocks {
    /// `ttl` должен покрывать таймаут платёжного шлюза с запасом.
    pub fn new(client: RedisClient, ttl: Duration, wait: Duration) -> Self {
        Self {
            client,
            ttl,
            wait,
            retry_every: Duration::from_millis(25),
        }
    }

    fn key(showtime_id: Uuid) -> String {
        format!("showtime:{}:finalize_lock", showtime_id)
    }
}

impl ShowtimeLocks for RedisShowtimeLocks {
    fn acquire(&self, showtime_id: Uuid) -> BoxFuture<'static, Result<ShowtimeGuard, LockError>> {
        let this = self.clone();
        Box::pin(async move {
            let key = Self::key(showtime_id);
            let token = Uuid::new_v4().to_string();
            let deadline = tokio::time::Instant::now() + this.wait;

            loop {
                if this.client.try_acquire(&key, &token, this.ttl).await? {
                    return Ok(ShowtimeGuard {
                        showtime_id,
                        inner: GuardInner::Redis {
                            client: this.client.clone(),
                            key,
                            token,
                        },
                    });
                }
                if tokio::time::Instant::now() >= deadline {
                    return Err(LockError::Timeout(showtime_id));
                }
                tokio::time::sleep(this.retry_every).await;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[tokio::test]
    async fn local_lock_serializes_same_showtime() {
        let locks = LocalShowtimeLocks::new();
        let showtime = Uuid::new_v4();
        let inside = Arc::new(AtomicUsize::new(0));
        let max_seen = Arc::new(AtomicUsize::new(0));

        let mut handles = Vec::new();
        for _ in 0..8 {
            let locks = locks.clone();
            let inside = inside.clone();
            let max_seen = max_seen.clone();
            handles.push(tokio::spawn(async move {
                let guard = locks.acquire(showtime).await.unwrap();
                let now = inside.fetch_add(1, Ordering::SeqCst) + 1;
                max_seen.fetch_max(now, Ordering::SeqCst);
                tokio::time::sleep(Duration::from_millis(5)).await;
                inside.fetch_sub(1, Ordering::SeqCst);
                guard.release().await;
            }));
        }
        for h in handles {
            h.await.unwrap();
        }
        assert_eq!(max_seen.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn different_showtimes_do_not_block_each_other() {
        let locks = LocalShowtimeLocks::new();
        let first = locks.acquire(Uuid::new_v4()).await.unwrap();
        let second = tokio::time::timeout(Duration::from_millis(100), locks.acquire(Uuid::new_v4()))
            .await
            .expect("other showtime must not wait")
            .unwrap();
        first.release().await;
        second.release().await;
    }

    #[tokio::test]
    async fn released_entries_are_pruned() {
        let locks = LocalShowtimeLocks::new();
        let showtime = Uuid::new_v4();
        let guard = locks.acquire(showtime).await.unwrap();
        assert_eq!(guard.showtime_id(), showtime);
        guard.release().await;
        assert!(locks.registry.lock().unwrap().is_empty());
    }
}
