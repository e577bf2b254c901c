use redis::{aio::MultiplexedConnection, Client};
use std::time::Duration;

// Снимает ключ только если он всё ещё принадлежит нашему токену
const RELEASE_SCRIPT: &str = r#"
if redis.call('GET', KEYS[1]) == ARGV[1] then
    return redis.call('DEL', KEYS[1])
else
    return 0
end
"#;

#[derive(Clone)]
pub struct RedisClient {
    pub conn: MultiplexedConnection,
}

impl RedisClient {
    pub async fn new(redis_url: &str) -> redis::RedisResult<Self> {
        let client = Client::open(redis_url)?;
        let conn = client.get_multiplexed_tokio_connection().await?;
        Ok(RedisClient { conn })
    }

    /// SET key token NX PX ttl - атомарный захват ключа без гонок.
    pub async fn try_acquire(&self, key: &str, token: &str, ttl: Duration) -> redis::RedisResult<bool> {
        let mut conn = self.conn.clone();
        let result: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(token)
            .arg("NX")
            .arg("PX")
            .arg(ttl.as_millis() as u64)
            .query_async(&mut conn)
            .await?;
        Ok(result.is_some())
    }

    /// Освобождает ключ, если он не истёк и не был перехвачен другим владельцем.
    pub async fn release(&self, key: &str, token: &str) -> redis::RedisResult<bool> {
        let mut conn = self.conn.clone();
        let removed: i64 = redis::Script::new(RELEASE_SCRIPT)
            .key(key)
            .arg(token)
            .invoke_async(&mut conn)
            .await?;
        Ok(removed == 1)
    }
}
