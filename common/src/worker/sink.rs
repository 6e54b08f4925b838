// Destinations for job status events

use crate::models::JobUpdate;
use async_trait::async_trait;
use tracing::{debug, warn};

/// Receives status events for running jobs
#[async_trait]
pub trait JobSink: Send + Sync {
    async fn publish(&self, update: JobUpdate);
}

/// Publishes status events on core NATS as `<prefix>.<handle>`
pub struct NatsStatusSink {
    client: async_nats::Client,
    prefix: String,
}

impl NatsStatusSink {
    pub fn new(client: async_nats::Client, prefix: impl Into<String>) -> Self {
        Self {
            client,
            prefix: prefix.into(),
        }
    }

    pub fn subject_for(&self, update: &JobUpdate) -> String {
        format!("{}.{}", self.prefix, update.handle())
    }
}

#[async_trait]
impl JobSink for NatsStatusSink {
    async fn publish(&self, update: JobUpdate) {
        let subject = self.subject_for(&update);
        match serde_json::to_vec(&update) {
            Ok(payload) => {
                if let Err(e) = self.client.publish(subject.clone(), payload.into()).await {
                    warn!(subject = %subject, error = %e, "Failed to publish job update");
                } else {
                    debug!(subject = %subject, "Published job update");
                }
            }
            Err(e) => warn!(error = %e, "Failed to serialize job update"),
        }
    }
}
