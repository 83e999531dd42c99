//! Error tracking for failures nobody anticipated

use crate::config::ErrorTrackingConfig;
use crate::error::{FaucetError, FaucetResult};
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tracing::{error, warn};
use uuid::Uuid;

/// Receives unexpected errors for offline diagnosis. Implementations must
/// return immediately; delivery happens in the background.
pub trait ErrorReporter: Send + Sync {
    fn capture(&self, error: &FaucetError, operation: &str) -> Uuid;
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ErrorEvent {
    pub event_id: Uuid,
    pub timestamp: String,
    pub environment: String,
    pub tags: EventTags,
    pub operation: String,
    pub message: String,
}

#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct EventTags {
    #[serde(rename = "type")]
    pub kind: String,
    pub project_id: Option<String>,
}

/// Logs events through `tracing`
#[derive(Debug, Clone)]
pub struct TracingReporter {
    environment: String,
    project_id: Option<String>,
}

impl TracingReporter {
    pub fn new(config: &ErrorTrackingConfig) -> Self {
        Self {
            environment: config.environment.clone(),
            project_id: config.project_id.clone(),
        }
    }

    fn event(&self, error: &FaucetError, operation: &str) -> ErrorEvent {
        ErrorEvent {
            event_id: Uuid::new_v4(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            environment: self.environment.clone(),
            tags: EventTags {
                kind: "backend".to_string(),
                project_id: self.project_id.clone(),
            },
            operation: operation.to_string(),
            message: error.to_string(),
        }
    }

    fn log(&self, event: &ErrorEvent) {
        error!(
            event_id = %event.event_id,
            environment = %event.environment,
            project_id = ?event.tags.project_id,
            operation = %event.operation,
            "Unhandled error: {}",
            event.message
        );
    }
}

impl ErrorReporter for TracingReporter {
    fn capture(&self, error: &FaucetError, operation: &str) -> Uuid {
        let event = self.event(error, operation);
        self.log(&event);
        event.event_id
    }
}

/// Logs like [`TracingReporter`] and also POSTs the event as JSON to a collector.
pub struct WebhookReporter {
    inner: TracingReporter,
    url: String,
    client: reqwest::Client,
}

impl WebhookReporter {
    pub fn new(config: &ErrorTrackingConfig, url: impl Into<String>) -> FaucetResult<Self> {
        let client = reqwest::Client::builder()
            .timeout(Duration::from_secs(5))
            .build()
            .map_err(|e| FaucetError::Internal(format!("Failed to build reporter client: {}", e)))?;

        Ok(Self {
            inner: TracingReporter::new(config),
            url: url.into(),
            client,
        })
    }
}

impl ErrorReporter for WebhookReporter {
    fn capture(&self, error: &FaucetError, operation: &str) -> Uuid {
        let event = self.inner.event(error, operation);
        self.inner.log(&event);
        let event_id = event.event_id;

        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            warn!(%event_id, "No async runtime, error event not delivered");
            return event_id;
        };

        let request = self.client.post(&self.url).json(&event);
        runtime.spawn(async move {
            match request.send().await {
                Ok(response) if response.status().is_success() => {}
                Ok(response) => {
                    warn!(%event_id, status = response.status().as_u16(), "Error collector refused event")
                }
                Err(e) => warn!(%event_id, "Failed to deliver error event: {}", e),
            }
        });

        event_id
    }
}

pub fn reporter_from_config(config: &ErrorTrackingConfig) -> FaucetResult<Arc<dyn ErrorReporter>> {
    match &config.webhook_url {
        Some(url) => Ok(Arc::new(WebhookReporter::new(config, url.clone())?)),
        None => Ok(Arc::new(TracingReporter::new(config))),
    }
}
