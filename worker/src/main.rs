// Worker binary entry point
//
// Consumes `exec` and `execphp` jobs and runs each as a child process.

use anyhow::Result;
use common::bootstrap;
use common::queue::{JobConsumer, NatsJobConsumer};
use common::worker::{ExecFunctions, JobSink, NatsStatusSink};
use std::sync::Arc;
use tokio::signal;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let settings = bootstrap::load_settings()?;
    bootstrap::init_observability(&settings)?;

    info!(
        basedir = %settings.worker.basedir.display(),
        timeout_seconds = settings.worker.timeout_seconds,
        tasks = ?ExecFunctions::tasks(),
        "Starting exec worker"
    );

    let nats_client = bootstrap::init_nats_client(&settings).await?;

    let sink: Arc<dyn JobSink> = Arc::new(NatsStatusSink::new(
        nats_client.client().clone(),
        settings.nats.status_prefix.clone(),
    ));
    let handler = ExecFunctions::new(settings.worker.clone(), sink).into_handler();

    let consumer = Arc::new(NatsJobConsumer::new(&nats_client, handler).await.map_err(|e| {
        error!(error = %e, "Failed to create job consumer");
        anyhow::anyhow!("Job consumer creation error: {}", e)
    })?);

    let worker_handle = {
        let consumer = Arc::clone(&consumer);
        tokio::spawn(async move {
            if let Err(e) = consumer.start().await {
                error!(error = %e, "Job consumer error");
            }
        })
    };

    info!("Worker is running. Press Ctrl+C to shutdown gracefully");

    match signal::ctrl_c().await {
        Ok(()) => info!("Shutdown signal received, finishing the running job"),
        Err(e) => error!(error = %e, "Failed to listen for shutdown signal"),
    }

    consumer.shutdown();
    let _ = worker_handle.await;

    info!("Worker shutdown complete");
    Ok(())
}
