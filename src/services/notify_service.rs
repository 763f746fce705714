// src/services/notify_service.rs
use async_trait::async_trait;
use thiserror::Error;
use tracing;

use crate::errors::RidepayError as AppError;
use crate::models::trip::TripRecord;

#[derive(Debug, Error)]
pub enum NotifyError {
    #[error("Webhook delivery failed: {0}")]
    Delivery(String),

    #[error("Webhook rejected the payload with status {0}")]
    Rejected(u16),

    #[error("Serialization error: {0}")]
    Serialization(String),
}

impl From<NotifyError> for AppError {
    fn from(error: NotifyError) -> Self {
        AppError::WebhookDelivery(error.to_string())
    }
}

/// Tells the operator dashboard about a completed trip. Delivery is
/// best-effort: the workflow logs failures and moves on, the trip record
/// is already in the store.
#[async_trait]
pub trait CompletionNotifier: Send + Sync {
    async fn trip_completed(&self, record: &TripRecord) -> Result<(), NotifyError>;
}

pub struct WebhookNotifier {
    url: String,
    client: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(url: String) -> Self {
        Self {
            url,
            client: reqwest::Client::new(),
        }
    }
}

#[async_trait]
impl CompletionNotifier for WebhookNotifier {
    async fn trip_completed(&self, record: &TripRecord) -> Result<(), NotifyError> {
        tracing::info!(
            "Posting completed trip {} ({} Rs.{}) to dashboard webhook",
            record.id,
            record.service_type.title(),
            record.fare.total_payment
        );

        let response = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json")
            .json(record)
            .send()
            .await
            .map_err(|e| NotifyError::Delivery(e.to_string()))?;

        if !response.status().is_success() {
            let status = response.status().as_u16();
            tracing::error!("dashboard webhook rejected trip {}: status {}", record.id, status);
            return Err(NotifyError::Rejected(status));
        }

        tracing::debug!("completed trip {} delivered to dashboard", record.id);
        Ok(())
    }
}

// Mock used in development, tests, and whenever no webhook is configured
#[derive(Debug)]
pub struct MockNotifier;

#[async_trait]
impl CompletionNotifier for MockNotifier {
    async fn trip_completed(&self, record: &TripRecord) -> Result<(), NotifyError> {
        tracing::info!(
            "[MOCK] Would notify dashboard: trip {} completed, total Rs.{}, driver Rs.{}",
            record.id,
            record.fare.total_payment,
            record.fare.driver_payment
        );
        Ok(())
    }
}
