// src/services/store_service.rs
use async_trait::async_trait;
use redis::Client;
use std::collections::HashMap;
use tokio::sync::RwLock;
use tracing;

use crate::errors::RidepayError as AppError;
use crate::models::trip::{TripRecord, TripSnapshot};
use crate::utils::id_generator::{IdGenerator, IdType};

#[derive(Debug, Clone)]
pub struct StoreConfig {
    pub redis_url: String,
    /// In-flight snapshots expire if nobody resumes them; completed trip
    /// records never do.
    pub snapshot_ttl_seconds: u64,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            redis_url: "redis://127.0.0.1:6379".to_string(),
            snapshot_ttl_seconds: 7 * 24 * 3600,
        }
    }
}

// Key layout for the redis store
pub struct StoreKeys;

impl StoreKeys {
    pub fn snapshot(user_id: &str) -> String {
        format!("trip:snapshot:{}", user_id)
    }

    pub fn record(trip_id: &str) -> String {
        format!("trip:record:{}", trip_id)
    }

    pub fn user_log(user_id: &str) -> String {
        format!("trip:log:{}", user_id)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Operation error: {0}")]
    Operation(String),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<StoreError> for AppError {
    fn from(error: StoreError) -> Self {
        match error {
            StoreError::Connection(msg) => AppError::StoreConnection(msg),
            StoreError::Operation(msg) => AppError::StoreQuery(msg),
            StoreError::Serialization(msg) => AppError::StoreSerialization(msg),
        }
    }
}

/// Durable home of in-flight snapshots and the completed-trip log, keyed
/// by user. A snapshot that fails to deserialize is discarded and reported
/// as absent so a bad write can never wedge the resume path.
#[async_trait]
pub trait TripStore: Send + Sync {
    async fn save_snapshot(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<(), StoreError>;
    async fn load_snapshot(&self, user_id: &str) -> Result<Option<TripSnapshot>, StoreError>;
    async fn clear_snapshot(&self, user_id: &str) -> Result<(), StoreError>;
    async fn append_trip(&self, record: &TripRecord) -> Result<String, StoreError>;
    async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>, StoreError>;
}

// Redis-backed store
pub struct RedisTripStore {
    client: Client,
    config: StoreConfig,
}

impl RedisTripStore {
    /// Opens the client and round-trips one connection so a dead redis
    /// fails construction instead of the first trip.
    pub async fn connect(config: StoreConfig) -> Result<Self, StoreError> {
        let client = Client::open(config.redis_url.clone())
            .map_err(|e| StoreError::Connection(e.to_string()))?;

        let store = Self { client, config };
        store.get_connection().await?;
        Ok(store)
    }

    async fn get_connection(&self) -> Result<redis::aio::Connection, StoreError> {
        self.client
            .get_async_connection()
            .await
            .map_err(|e| StoreError::Connection(e.to_string()))
    }
}

#[async_trait]
impl TripStore for RedisTripStore {
    async fn save_snapshot(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut conn = self.get_connection().await?;
        let key = StoreKeys::snapshot(user_id);

        if self.config.snapshot_ttl_seconds > 0 {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(json)
                .arg("EX")
                .arg(self.config.snapshot_ttl_seconds)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;
        } else {
            let _: () = redis::cmd("SET")
                .arg(&key)
                .arg(json)
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;
        }

        Ok(())
    }

    async fn load_snapshot(&self, user_id: &str) -> Result<Option<TripSnapshot>, StoreError> {
        let mut conn = self.get_connection().await?;
        let key = StoreKeys::snapshot(user_id);

        let data: Option<String> = redis::cmd("GET")
            .arg(&key)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        match data {
            Some(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(error) => {
                    tracing::warn!(
                        "discarding unreadable trip snapshot for {}: {}",
                        user_id,
                        error
                    );
                    let _: () = redis::cmd("DEL")
                        .arg(&key)
                        .query_async(&mut conn)
                        .await
                        .map_err(|e| StoreError::Operation(e.to_string()))?;
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn clear_snapshot(&self, user_id: &str) -> Result<(), StoreError> {
        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("DEL")
            .arg(StoreKeys::snapshot(user_id))
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        Ok(())
    }

    async fn append_trip(&self, record: &TripRecord) -> Result<String, StoreError> {
        let json = serde_json::to_string(record)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut conn = self.get_connection().await?;

        let _: () = redis::cmd("SET")
            .arg(StoreKeys::record(&record.id))
            .arg(json)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        // LPUSH keeps the per-user log newest-first
        let _: () = redis::cmd("LPUSH")
            .arg(StoreKeys::user_log(&record.user_id))
            .arg(&record.id)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        Ok(record.id.clone())
    }

    async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>, StoreError> {
        let mut conn = self.get_connection().await?;

        let trip_ids: Vec<String> = redis::cmd("LRANGE")
            .arg(StoreKeys::user_log(user_id))
            .arg(0)
            .arg(-1)
            .query_async(&mut conn)
            .await
            .map_err(|e| StoreError::Operation(e.to_string()))?;

        let mut records = Vec::with_capacity(trip_ids.len());
        for trip_id in trip_ids {
            if !IdGenerator::validate_id(&trip_id, Some(IdType::Trip)) {
                tracing::warn!("skipping malformed entry in trip log for {}: {}", user_id, trip_id);
                continue;
            }

            let data: Option<String> = redis::cmd("GET")
                .arg(StoreKeys::record(&trip_id))
                .query_async(&mut conn)
                .await
                .map_err(|e| StoreError::Operation(e.to_string()))?;

            match data.as_deref().map(serde_json::from_str::<TripRecord>) {
                Some(Ok(record)) => records.push(record),
                Some(Err(error)) => {
                    tracing::warn!("skipping unreadable trip record {}: {}", trip_id, error);
                }
                None => {
                    tracing::warn!("trip log references missing record: {}", trip_id);
                }
            }
        }

        records.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(records)
    }
}

// In-memory store, used when redis is not configured and in tests. Values
// are kept as serialized JSON so the round-trip semantics match the redis
// store exactly.
pub struct MemoryTripStore {
    snapshots: RwLock<HashMap<String, String>>,
    records: RwLock<Vec<TripRecord>>,
}

impl MemoryTripStore {
    pub fn new() -> Self {
        Self {
            snapshots: RwLock::new(HashMap::new()),
            records: RwLock::new(Vec::new()),
        }
    }
}

impl Default for MemoryTripStore {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl TripStore for MemoryTripStore {
    async fn save_snapshot(&self, user_id: &str, snapshot: &TripSnapshot) -> Result<(), StoreError> {
        let json = serde_json::to_string(snapshot)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;

        let mut snapshots = self.snapshots.write().await;
        snapshots.insert(user_id.to_string(), json);
        Ok(())
    }

    async fn load_snapshot(&self, user_id: &str) -> Result<Option<TripSnapshot>, StoreError> {
        let json = {
            let snapshots = self.snapshots.read().await;
            snapshots.get(user_id).cloned()
        };

        match json {
            Some(json) => match serde_json::from_str(&json) {
                Ok(snapshot) => Ok(Some(snapshot)),
                Err(error) => {
                    tracing::warn!(
                        "discarding unreadable trip snapshot for {}: {}",
                        user_id,
                        error
                    );
                    self.snapshots.write().await.remove(user_id);
                    Ok(None)
                }
            },
            None => Ok(None),
        }
    }

    async fn clear_snapshot(&self, user_id: &str) -> Result<(), StoreError> {
        self.snapshots.write().await.remove(user_id);
        Ok(())
    }

    async fn append_trip(&self, record: &TripRecord) -> Result<String, StoreError> {
        self.records.write().await.push(record.clone());
        Ok(record.id.clone())
    }

    async fn trips_for_user(&self, user_id: &str) -> Result<Vec<TripRecord>, StoreError> {
        let records = self.records.read().await;
        let mut trips: Vec<TripRecord> = records
            .iter()
            .filter(|record| record.user_id == user_id)
            .cloned()
            .collect();

        trips.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        Ok(trips)
    }
}

#[cfg(test)]
impl MemoryTripStore {
    /// Plants a raw payload in the snapshot slot, bypassing serialization.
    pub async fn insert_raw_snapshot(&self, user_id: &str, raw: &str) {
        self.snapshots.write().await.insert(user_id.to_string(), raw.to_string());
    }
}
