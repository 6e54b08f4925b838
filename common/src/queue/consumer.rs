// Job consumer implementation for NATS JetStream

use crate::errors::QueueError;
use crate::models::{Job, JobHandle};
use crate::queue::nats::NatsClient;
use crate::queue::publisher::{HEADER_JOB_HANDLE, HEADER_TASK_NAME};
use async_nats::jetstream::consumer::PullConsumer;
use async_nats::jetstream::{AckKind, Message};
use async_nats::HeaderMap;
use futures::StreamExt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::Notify;
use tracing::{error, info, instrument, warn};

/// Job consumer trait for consuming jobs from the queue
#[async_trait::async_trait]
pub trait JobConsumer: Send + Sync {
    /// Start consuming jobs from the queue
    /// Returns when shutdown is requested
    async fn start(&self) -> Result<(), QueueError>;

    /// Request graceful shutdown
    fn shutdown(&self);
}

/// Callback function type for processing delivered jobs
pub type JobHandler = Arc<
    dyn Fn(Job) -> futures::future::BoxFuture<'static, Result<(), anyhow::Error>> + Send + Sync,
>;

/// Resolve the task name of a delivered message
///
/// Prefers the `Task-Name` header and falls back to the last subject token.
pub fn resolve_task(headers: Option<&HeaderMap>, subject: &str) -> Option<String> {
    if let Some(task) = headers
        .and_then(|h| h.get(HEADER_TASK_NAME))
        .map(|v| v.as_str().to_string())
        .filter(|t| !t.is_empty())
    {
        return Some(task);
    }

    subject
        .rsplit('.')
        .next()
        .filter(|t| !t.is_empty() && *t != subject)
        .map(str::to_string)
}

/// Resolve the job handle of a delivered message, allocating one if the
/// submitter did not set it
pub fn resolve_handle(headers: Option<&HeaderMap>) -> JobHandle {
    headers
        .and_then(|h| h.get(HEADER_JOB_HANDLE))
        .map(|v| v.as_str())
        .filter(|h| !h.is_empty())
        .map(JobHandle::new)
        .unwrap_or_else(JobHandle::generate)
}

/// NATS-based job consumer implementation
pub struct NatsJobConsumer {
    consumer: PullConsumer,
    handler: JobHandler,
    shutdown_flag: Arc<AtomicBool>,
    shutdown_notify: Arc<Notify>,
}

impl NatsJobConsumer {
    /// Create a new NATS job consumer
    #[instrument(skip(client, handler))]
    pub async fn new(client: &NatsClient, handler: JobHandler) -> Result<Self, QueueError> {
        info!("Creating NATS job consumer");

        let consumer = client.get_or_create_consumer().await?;

        Ok(Self {
            consumer,
            handler,
            shutdown_flag: Arc::new(AtomicBool::new(false)),
            shutdown_notify: Arc::new(Notify::new()),
        })
    }

    /// Process a single message
    ///
    /// Jobs are acknowledged whether they succeed or fail; a failed job is
    /// terminated rather than redelivered.
    #[instrument(skip(self, message), fields(
        message_id = ?message.info().map(|i| i.stream_sequence),
    ))]
    async fn process_message(&self, message: Message) -> Result<(), QueueError> {
        let headers = message.headers.as_ref();
        let Some(task) = resolve_task(headers, &message.subject) else {
            warn!(subject = %message.subject, "Message carries no task name, discarding");
            message.ack_with(AckKind::Term).await.map_err(|e| {
                QueueError::AckFailed(format!("Failed to terminate message: {}", e))
            })?;
            return Err(QueueError::DeserializationFailed(format!(
                "No task name on subject {}",
                message.subject
            )));
        };

        let job = Job {
            handle: resolve_handle(headers),
            task,
            payload: message.payload.to_vec(),
        };

        info!(handle = %job.handle, task = %job.task, "Received job");

        let handle = job.handle.clone();
        match (self.handler)(job).await {
            Ok(()) => {
                message.ack().await.map_err(|e| {
                    QueueError::AckFailed(format!("Failed to acknowledge message: {}", e))
                })?;

                info!(handle = %handle, "Job finished and acknowledged");
                Ok(())
            }
            Err(e) => {
                error!(handle = %handle, error = %e, "Job processing failed");

                message.ack_with(AckKind::Term).await.map_err(|e| {
                    QueueError::AckFailed(format!("Failed to terminate message: {}", e))
                })?;

                Err(QueueError::ConsumeFailed(format!(
                    "Job processing failed: {}",
                    e
                )))
            }
        }
    }
}

#[async_trait::async_trait]
impl JobConsumer for NatsJobConsumer {
    #[instrument(skip(self))]
    async fn start(&self) -> Result<(), QueueError> {
        info!("Starting job consumer");

        let mut messages = self.consumer.messages().await.map_err(|e| {
            QueueError::ConsumeFailed(format!("Failed to create message stream: {}", e))
        })?;

        info!("Consumer started, waiting for jobs");

        loop {
            if self.shutdown_flag.load(Ordering::Relaxed) {
                info!("Shutdown requested, stopping consumer");
                break;
            }

            tokio::select! {
                message_result = messages.next() => {
                    match message_result {
                        Some(Ok(message)) => {
                            if let Err(e) = self.process_message(message).await {
                                error!(error = %e, "Failed to process message");
                            }
                        }
                        Some(Err(e)) => {
                            error!(error = %e, "Error receiving message");
                            tokio::time::sleep(Duration::from_secs(1)).await;
                        }
                        None => {
                            warn!("Message stream ended unexpectedly");
                            break;
                        }
                    }
                }
                _ = self.shutdown_notify.notified() => {
                    info!("Shutdown notification received");
                    break;
                }
                // Re-check the shutdown flag periodically
                _ = tokio::time::sleep(Duration::from_secs(5)) => {
                    continue;
                }
            }
        }

        info!("Consumer stopped gracefully");
        Ok(())
    }

    fn shutdown(&self) {
        info!("Requesting consumer shutdown");
        self.shutdown_flag.store(true, Ordering::Relaxed);
        self.shutdown_notify.notify_waiters();
    }
}
