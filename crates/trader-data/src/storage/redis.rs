//! Redis L2 저장소.
//!
//! 항목은 `bars:{cache key}` 문자열 키에 JSON으로 저장하며,
//! `SET EX`의 TTL은 논리 만료에 유예 기간을 더한 값입니다.

use async_trait::async_trait;
use chrono::{DateTime, Duration, Utc};
use redis::{aio::MultiplexedConnection, AsyncCommands, Client};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{info, instrument, warn};

use super::BarStore;
use crate::cache::{CacheEntry, CacheKey};
use crate::error::{DataError, Result};

const KEY_PREFIX: &str = "bars:";

/// Redis 연결 래퍼.
#[derive(Clone)]
pub struct RedisStore {
    connection: Arc<RwLock<MultiplexedConnection>>,
    grace: Duration,
}

impl RedisStore {
    /// Redis에 연결합니다.
    pub async fn connect(url: &str, grace: Duration) -> Result<Self> {
        info!("Connecting to Redis...");

        let client = Client::open(url).map_err(|e| DataError::CacheError(e.to_string()))?;

        let connection = client
            .get_multiplexed_async_connection()
            .await
            .map_err(|e| DataError::CacheError(e.to_string()))?;

        info!("Redis connection established");

        Ok(Self {
            connection: Arc::new(RwLock::new(connection)),
            grace,
        })
    }

    fn redis_key(key: &CacheKey) -> String {
        format!("{}{}", KEY_PREFIX, key)
    }

    /// 남은 논리 TTL에 유예 기간을 더한 물리 TTL (최소 1초).
    fn physical_ttl(&self, entry: &CacheEntry, now: DateTime<Utc>) -> u64 {
        let remaining = (entry.expires_at + self.grace - now).num_seconds();
        remaining.max(1) as u64
    }

    async fn get_raw(&self, redis_key: &str) -> Result<Option<CacheEntry>> {
        let mut conn = self.connection.write().await;
        let value: Option<String> = conn
            .get(redis_key)
            .await
            .map_err(|e| DataError::CacheError(e.to_string()))?;

        match value {
            Some(json) => Ok(Some(serde_json::from_str(&json)?)),
            None => Ok(None),
        }
    }

    async fn scan_keys(&self) -> Result<Vec<String>> {
        let mut conn = self.connection.write().await;
        let keys: Vec<String> = conn
            .keys(format!("{}*", KEY_PREFIX))
            .await
            .map_err(|e| DataError::CacheError(e.to_string()))?;
        Ok(keys)
    }

    async fn delete_raw(&self, redis_key: &str) -> Result<bool> {
        let mut conn = self.connection.write().await;
        let deleted: i64 = conn
            .del(redis_key)
            .await
            .map_err(|e| DataError::CacheError(e.to_string()))?;
        Ok(deleted > 0)
    }
}

#[async_trait]
impl BarStore for RedisStore {
    fn name(&self) -> &str {
        "redis"
    }

    async fn get(&self, key: &CacheKey) -> Result<Option<CacheEntry>> {
        self.get_raw(&Self::redis_key(key)).await
    }

    #[instrument(skip(self, entry), fields(key = %entry.key))]
    async fn put(&self, entry: &CacheEntry) -> Result<()> {
        let json = serde_json::to_string(entry)?;
        let ttl = self.physical_ttl(entry, Utc::now());

        let mut conn = self.connection.write().await;
        let _: () = conn
            .set_ex(Self::redis_key(&entry.key), json, ttl)
            .await
            .map_err(|e| DataError::CacheError(e.to_string()))?;

        Ok(())
    }

    async fn delete(&self, key: &CacheKey) -> Result<bool> {
        self.delete_raw(&Self::redis_key(key)).await
    }

    async fn entries(&self) -> Result<Vec<CacheEntry>> {
        let mut entries = Vec::new();
        for redis_key in self.scan_keys().await? {
            match self.get_raw(&redis_key).await {
                Ok(Some(entry)) => entries.push(entry),
                Ok(None) => {}
                Err(e) => warn!(key = %redis_key, error = %e, "Skipping unreadable cache value"),
            }
        }
        Ok(entries)
    }

    async fn sweep_expired(&self, now: DateTime<Utc>) -> Result<usize> {
        // 대부분은 Redis TTL로 이미 사라지지만 시계 오차로 남은 항목을 정리
        let mut removed = 0;
        for redis_key in self.scan_keys().await? {
            let stale = match self.get_raw(&redis_key).await {
                Ok(Some(entry)) => entry.expires_at + self.grace <= now,
                Ok(None) => false,
                Err(_) => true,
            };
            if stale && self.delete_raw(&redis_key).await? {
                removed += 1;
            }
        }
        Ok(removed)
    }

    async fn health_check(&self) -> bool {
        let mut conn = self.connection.write().await;
        let result: std::result::Result<String, _> =
            redis::cmd("PING").query_async(&mut *conn).await;
        matches!(result.as_deref(), Ok("PONG"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use trader_core::{CanonicalSymbol, Timeframe};

    #[test]
    fn test_redis_key_format() {
        let start = DateTime::<Utc>::from_timestamp(900, 0).unwrap();
        let key = CacheKey::new(&CanonicalSymbol::new("BINANCE:BTCUSDT"), Timeframe::M15, start, start);
        assert_eq!(RedisStore::redis_key(&key), "bars:BINANCE:BTCUSDT|15|900-900");
    }
}
