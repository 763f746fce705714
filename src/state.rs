// src/state.rs
use std::sync::Arc;

use crate::errors::RidepayError;
use crate::services::notify_service::{CompletionNotifier, MockNotifier, WebhookNotifier};
use crate::services::store_service::{MemoryTripStore, RedisTripStore, StoreConfig, TripStore};
use crate::services::trip_service::TripService;
use crate::utils::clock::{Clock, SystemClock};

pub struct AppState {
    pub trip_service: Arc<TripService>,
    pub config: AppConfig,
}

#[derive(Clone)]
pub struct AppConfig {
    pub bind_addr: String,
    pub redis_url: Option<String>,
    pub completion_webhook_url: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:3000".to_string()),
            redis_url: std::env::var("REDIS_URL").ok(),
            completion_webhook_url: std::env::var("COMPLETION_WEBHOOK_URL").ok(),
        }
    }
}

impl AppState {
    pub async fn new(config: AppConfig) -> Result<Self, RidepayError> {
        let store: Arc<dyn TripStore> = match &config.redis_url {
            Some(url) => {
                let store_config = StoreConfig {
                    redis_url: url.clone(),
                    ..Default::default()
                };
                match RedisTripStore::connect(store_config).await {
                    Ok(store) => Arc::new(store),
                    Err(error) => {
                        tracing::warn!(
                            "redis unavailable ({}), falling back to in-memory trip store",
                            error
                        );
                        Arc::new(MemoryTripStore::new())
                    }
                }
            }
            None => {
                tracing::warn!("REDIS_URL not set, using in-memory trip store");
                Arc::new(MemoryTripStore::new())
            }
        };

        let notifier: Arc<dyn CompletionNotifier> = match &config.completion_webhook_url {
            Some(url) => Arc::new(WebhookNotifier::new(url.clone())),
            None => {
                tracing::warn!("COMPLETION_WEBHOOK_URL not set, using mock completion notifier");
                Arc::new(MockNotifier)
            }
        };

        let clock: Arc<dyn Clock> = Arc::new(SystemClock);
        let trip_service = Arc::new(TripService::new(clock, store, notifier));

        Ok(Self { trip_service, config })
    }
}
