// NATS JetStream client implementation for the job queue

use crate::errors::QueueError;
use async_nats::jetstream::{
    consumer::PullConsumer,
    stream::{Config as StreamConfig, RetentionPolicy, Stream},
    Context as JetStreamContext,
};
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{info, instrument};

/// NATS configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct NatsConfig {
    /// NATS server URL (e.g., "nats://localhost:4222")
    pub url: String,
    /// Stream name for the job queue
    pub stream_name: String,
    /// Subject prefix; jobs are published on `<subject_prefix>.<task>`
    pub subject_prefix: String,
    /// Durable consumer name shared by workers
    pub consumer_name: String,
    /// Subject prefix for job status events
    pub status_prefix: String,
    /// Maximum age for messages in the stream (in seconds)
    pub max_age_seconds: u64,
    /// Maximum number of messages to retain
    pub max_messages: i64,
    /// How long a worker may hold a job before it is redelivered (in seconds)
    pub ack_wait_seconds: u64,
}

impl Default for NatsConfig {
    fn default() -> Self {
        Self {
            url: "nats://localhost:4222".to_string(),
            stream_name: "GEARMAN_JOBS".to_string(),
            subject_prefix: "jobs".to_string(),
            consumer_name: "exec-workers".to_string(),
            status_prefix: "status.job".to_string(),
            max_age_seconds: 86400, // 24 hours
            max_messages: 1_000_000,
            ack_wait_seconds: 300,
        }
    }
}

impl NatsConfig {
    /// Subject a job for `task` is published on
    pub fn task_subject(&self, task: &str) -> String {
        format!("{}.{}", self.subject_prefix, task)
    }

    /// Wildcard subject covering every task
    pub fn stream_subject(&self) -> String {
        format!("{}.>", self.subject_prefix)
    }
}

/// NATS JetStream client
pub struct NatsClient {
    client: async_nats::Client,
    jetstream: JetStreamContext,
    config: NatsConfig,
}

impl NatsClient {
    /// Create a new NATS client and connect to the server
    #[instrument(skip(config), fields(url = %config.url))]
    pub async fn new(config: NatsConfig) -> Result<Self, QueueError> {
        info!("Connecting to NATS server");

        let client = async_nats::connect(&config.url)
            .await
            .map_err(|e| QueueError::Connection(format!("Failed to connect to NATS: {}", e)))?;

        info!("Connected to NATS server successfully");

        let jetstream = async_nats::jetstream::new(client.clone());

        Ok(Self {
            client,
            jetstream,
            config,
        })
    }

    /// Create or get the job stream
    ///
    /// The stream uses work-queue retention so each job is removed once a
    /// worker acknowledges it.
    #[instrument(skip(self))]
    pub async fn initialize_stream(&self) -> Result<Stream, QueueError> {
        info!(
            stream_name = %self.config.stream_name,
            "Initializing JetStream stream"
        );

        let stream_config = StreamConfig {
            name: self.config.stream_name.clone(),
            subjects: vec![self.config.stream_subject()],
            retention: RetentionPolicy::WorkQueue,
            max_age: Duration::from_secs(self.config.max_age_seconds),
            max_messages: self.config.max_messages,
            ..Default::default()
        };

        let stream = self
            .jetstream
            .get_or_create_stream(stream_config)
            .await
            .map_err(|e| QueueError::StreamCreation(format!("Failed to create stream: {}", e)))?;

        info!(
            stream_name = %self.config.stream_name,
            "Stream initialized successfully"
        );

        Ok(stream)
    }

    /// Create or get the durable pull consumer for workers
    ///
    /// Delivery is attempted once; jobs that fail are not retried.
    #[instrument(skip(self))]
    pub async fn get_or_create_consumer(&self) -> Result<PullConsumer, QueueError> {
        info!(
            consumer_name = %self.config.consumer_name,
            "Creating consumer"
        );

        let stream = self
            .jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| QueueError::StreamNotFound(format!("Stream not found: {}", e)))?;

        let consumer_config = async_nats::jetstream::consumer::pull::Config {
            durable_name: Some(self.config.consumer_name.clone()),
            ack_policy: async_nats::jetstream::consumer::AckPolicy::Explicit,
            max_deliver: 1,
            ack_wait: Duration::from_secs(self.config.ack_wait_seconds),
            ..Default::default()
        };

        let consumer = stream
            .get_or_create_consumer(&self.config.consumer_name, consumer_config)
            .await
            .map_err(|e| {
                QueueError::ConsumerCreation(format!("Failed to create consumer: {}", e))
            })?;

        info!(
            consumer_name = %self.config.consumer_name,
            "Consumer created successfully"
        );

        Ok(consumer)
    }

    /// Get the JetStream context for publishing/consuming
    pub fn jetstream(&self) -> &JetStreamContext {
        &self.jetstream
    }

    /// Get the core NATS client
    pub fn client(&self) -> &async_nats::Client {
        &self.client
    }

    /// Get the configuration
    pub fn config(&self) -> &NatsConfig {
        &self.config
    }

    /// Health check - verify the job stream is reachable
    #[instrument(skip(self))]
    pub async fn health_check(&self) -> Result<(), QueueError> {
        self.jetstream
            .get_stream(&self.config.stream_name)
            .await
            .map_err(|e| QueueError::HealthCheck(format!("Health check failed: {}", e)))?;

        Ok(())
    }
}
