// Task functions the worker registers with the consumer

use crate::config::WorkerConfig;
use crate::errors::ExecutionError;
use crate::models::{Job, JobUpdate, TASK_EXEC, TASK_EXEC_PHP};
use crate::queue::JobHandler;
use crate::telemetry;
use crate::worker::exec::ShellJob;
use crate::worker::sink::JobSink;
use futures::FutureExt;
use std::sync::Arc;
use std::time::Instant;
use tracing::{error, info, instrument};

/// Runs `exec` and `execphp` jobs and reports their outcome
pub struct ExecFunctions {
    config: WorkerConfig,
    sink: Arc<dyn JobSink>,
}

impl ExecFunctions {
    pub fn new(config: WorkerConfig, sink: Arc<dyn JobSink>) -> Self {
        Self { config, sink }
    }

    /// Task names this worker can run
    pub fn tasks() -> [&'static str; 2] {
        [TASK_EXEC, TASK_EXEC_PHP]
    }

    /// Wrap into a consumer callback
    pub fn into_handler(self) -> JobHandler {
        let functions = Arc::new(self);
        Arc::new(move |job: Job| {
            let functions = Arc::clone(&functions);
            async move { functions.process(job).await.map_err(anyhow::Error::from) }.boxed()
        })
    }

    /// Run one job, publishing a completion or failure update when it ends
    #[instrument(skip(self, job), fields(handle = %job.handle, task = %job.task))]
    pub async fn process(&self, job: Job) -> Result<(), ExecutionError> {
        info!("Received job");
        let started = Instant::now();

        let outcome = self.run(&job).await;
        telemetry::record_job_duration(&job.task, started.elapsed().as_secs_f64());

        match outcome {
            Ok(output) => {
                telemetry::record_job_success(&job.task);
                self.sink
                    .publish(JobUpdate::Complete {
                        handle: job.handle.clone(),
                        result: String::from_utf8_lossy(&output).into_owned(),
                    })
                    .await;
                info!("Finished job");
                Ok(())
            }
            Err(e) => {
                telemetry::record_job_failure(&job.task, e.kind());
                error!(error = %e, "Job failed");
                self.sink
                    .publish(JobUpdate::Fail {
                        handle: job.handle.clone(),
                        error: e.to_string(),
                    })
                    .await;
                Err(e)
            }
        }
    }

    async fn run(&self, job: &Job) -> Result<Vec<u8>, ExecutionError> {
        let descriptor = ShellJob::parse(&job.payload)?;
        let shell = ShellJob::for_task(&job.task, descriptor, &self.config)?;
        shell.run(&job.handle, self.sink.as_ref()).await
    }
}
