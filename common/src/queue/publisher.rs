// Background job submission through NATS JetStream

use crate::errors::QueueError;
use crate::models::JobHandle;
use crate::queue::nats::NatsClient;
use async_nats::jetstream::context::PublishAckFuture;
use async_nats::jetstream::publish::PublishAck;
use std::time::Duration;
use tracing::{info, instrument, warn};

/// Header carrying the job handle
pub const HEADER_JOB_HANDLE: &str = "Job-Handle";
/// Header carrying the task name
pub const HEADER_TASK_NAME: &str = "Task-Name";
/// Header carrying the submission time (RFC 3339)
pub const HEADER_SUBMITTED_AT: &str = "Submitted-At";
/// JetStream deduplication header
pub const HEADER_MSG_ID: &str = "Nats-Msg-Id";

/// A broker that accepts fire-and-forget job submissions
#[cfg_attr(test, mockall::automock)]
#[async_trait::async_trait]
pub trait Broker: Send + Sync {
    /// Enqueue `payload` for `task` without waiting for the job to run
    ///
    /// Returns the handle assigned to the job once the broker has accepted it.
    async fn submit_background(&self, task: &str, payload: &[u8])
        -> Result<JobHandle, QueueError>;
}

/// NATS-based broker implementation
pub struct NatsBroker {
    client: NatsClient,
    publish_timeout: Duration,
}

impl NatsBroker {
    /// Create a new NATS broker
    pub fn new(client: NatsClient) -> Self {
        Self {
            client,
            publish_timeout: Duration::from_secs(5),
        }
    }

    /// Override how long to wait for the stream to acknowledge a submission
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.publish_timeout = timeout;
        self
    }

    pub fn client(&self) -> &NatsClient {
        &self.client
    }
}

#[async_trait::async_trait]
impl Broker for NatsBroker {
    #[instrument(skip(self, payload), fields(task = %task, payload_len = payload.len()))]
    async fn submit_background(
        &self,
        task: &str,
        payload: &[u8],
    ) -> Result<JobHandle, QueueError> {
        let handle = JobHandle::generate();
        let subject = self.client.config().task_subject(task);

        let mut headers = async_nats::HeaderMap::new();
        headers.insert(HEADER_MSG_ID, handle.as_str());
        headers.insert(HEADER_JOB_HANDLE, handle.as_str());
        headers.insert(HEADER_TASK_NAME, task);
        headers.insert(
            HEADER_SUBMITTED_AT,
            chrono::Utc::now().to_rfc3339().as_str(),
        );

        let publish_future: PublishAckFuture = self
            .client
            .jetstream()
            .publish_with_headers(subject.clone(), headers, payload.to_vec().into())
            .await
            .map_err(|e| QueueError::PublishFailed(format!("Failed to publish job: {}", e)))?;

        let ack = tokio::time::timeout(self.publish_timeout, publish_future)
            .await
            .ok();
        let ack = acknowledgment(ack, self.publish_timeout)?;

        if ack.duplicate {
            warn!(handle = %handle, "Stream reported a duplicate submission");
        }
        info!(
            subject = %subject,
            handle = %handle,
            sequence = ack.sequence,
            "Job submitted"
        );
        Ok(handle)
    }
}

/// Map the stream's answer to a submission onto its outcome
///
/// `None` means no answer arrived within `timeout`.
fn acknowledgment<E: std::fmt::Display>(
    ack: Option<Result<PublishAck, E>>,
    timeout: Duration,
) -> Result<PublishAck, QueueError> {
    match ack {
        Some(Ok(ack)) => Ok(ack),
        Some(Err(e)) => Err(QueueError::PublishFailed(format!(
            "Stream rejected job: {}",
            e
        ))),
        None => Err(QueueError::Timeout(format!(
            "Publish acknowledgment timeout after {:?}",
            timeout
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_mock_broker_returns_handle() {
        let mut broker = MockBroker::new();
        broker
            .expect_submit_background()
            .times(1)
            .returning(|_, _| Ok(JobHandle::new("H:test")));

        let handle = broker.submit_background("execphp", b"{}").await.unwrap();
        assert_eq!(handle.as_str(), "H:test");
    }

    #[test]
    fn test_missing_acknowledgment_is_timeout() {
        let err = acknowledgment::<String>(None, Duration::from_secs(5)).unwrap_err();
        assert!(matches!(err, QueueError::Timeout(_)));
        assert!(err.to_string().contains("5s"));
    }

    #[test]
    fn test_negative_acknowledgment_is_publish_failure() {
        let err = acknowledgment(
            Some(Err("maximum messages exceeded".to_string())),
            Duration::from_secs(5),
        )
        .unwrap_err();
        assert!(matches!(err, QueueError::PublishFailed(_)));
        assert!(err.to_string().contains("maximum messages exceeded"));
    }

    #[tokio::test]
    async fn test_mock_broker_propagates_rejection() {
        let mut broker = MockBroker::new();
        broker
            .expect_submit_background()
            .returning(|_, _| Err(QueueError::PublishFailed("no stream".to_string())));

        let err = broker.submit_background("execphp", b"{}").await.unwrap_err();
        assert!(matches!(err, QueueError::PublishFailed(_)));
    }
}
