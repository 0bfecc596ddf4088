use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use redis::RedisResult;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;
use roam_core::{RateWindowStore, StoreError, WindowSnapshot};

// Prune, append, count and read the oldest entry in one script so the whole
// read-modify-write runs atomically on the server.
const SLIDING_WINDOW_SCRIPT: &str = r#"
    local key = KEYS[1]
    local now = tonumber(ARGV[1])
    local window = tonumber(ARGV[2])
    redis.call("ZREMRANGEBYSCORE", key, "-inf", now - window)
    redis.call("ZADD", key, now, ARGV[3])
    redis.call("PEXPIRE", key, window)
    local count = redis.call("ZCARD", key)
    local oldest = redis.call("ZRANGE", key, 0, 0, "WITHSCORES")
    return {count, tonumber(oldest[2])}
"#;

#[derive(Clone)]
pub struct RedisClient {
    client: redis::Client,
}

impl RedisClient {
    pub async fn new(connection_string: &str) -> Result<Self, redis::RedisError> {
        let client = redis::Client::open(connection_string)?;
        Ok(Self { client })
    }

    pub async fn ping(&self) -> RedisResult<()> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        redis::cmd("PING").query_async::<String>(&mut conn).await?;
        Ok(())
    }

    async fn record_window(
        &self,
        key: &str,
        now_ms: i64,
        window_ms: i64,
    ) -> RedisResult<(u64, i64)> {
        let mut conn = self.client.get_multiplexed_async_connection().await?;
        // Members must be unique or two calls in the same millisecond collapse into one.
        let member = format!("{}-{}", now_ms, Uuid::new_v4().simple());

        redis::Script::new(SLIDING_WINDOW_SCRIPT)
            .key(key)
            .arg(now_ms)
            .arg(window_ms)
            .arg(member)
            .invoke_async(&mut conn)
            .await
    }
}

#[async_trait]
impl RateWindowStore for RedisClient {
    async fn record(
        &self,
        key: &str,
        now: DateTime<Utc>,
        window: Duration,
    ) -> Result<WindowSnapshot, StoreError> {
        let window_ms = i64::try_from(window.as_millis())
            .map_err(|_| StoreError::Corrupt("rate window too large".to_string()))?;
        let redis_key = format!("ratelimit:{}", key);

        let (count, oldest_ms) = self
            .record_window(&redis_key, now.timestamp_millis(), window_ms)
            .await
            .map_err(|e| StoreError::Unavailable(e.to_string()))?;

        debug!("Rate window {} now holds {} calls", redis_key, count);

        let oldest = Utc
            .timestamp_millis_opt(oldest_ms)
            .single()
            .ok_or_else(|| StoreError::Corrupt(format!("bad window timestamp {}", oldest_ms)))?;

        Ok(WindowSnapshot { count, oldest })
    }
}
