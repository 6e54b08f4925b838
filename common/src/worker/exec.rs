// Runs a job's script as a child process

use crate::config::WorkerConfig;
use crate::errors::ExecutionError;
use crate::models::{JobDescriptor, JobHandle, JobUpdate, WorkerOutput, TASK_EXEC, TASK_EXEC_PHP};
use crate::worker::output::OutputDecoder;
use crate::worker::sink::JobSink;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncReadExt;
use tokio::process::{ChildStderr, Command};
use tracing::{debug, instrument, warn};

const STDERR_CHUNK: usize = 1024;

/// A command line resolved from a job payload
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ShellJob {
    pub program: String,
    pub args: Vec<String>,
    pub basedir: PathBuf,
    pub timeout: Duration,
}

impl ShellJob {
    /// Decode the payload of a job
    pub fn parse(payload: &[u8]) -> Result<JobDescriptor, ExecutionError> {
        serde_json::from_slice(payload).map_err(|e| ExecutionError::InvalidPayload(e.to_string()))
    }

    /// Build the command line for `task`
    ///
    /// `exec` runs `Name` directly; `execphp` runs `php -f <Name>.php`.
    pub fn for_task(
        task: &str,
        descriptor: JobDescriptor,
        config: &WorkerConfig,
    ) -> Result<Self, ExecutionError> {
        if descriptor.name.is_empty() {
            return Err(ExecutionError::InvalidPayload(
                "job name cannot be empty".to_string(),
            ));
        }

        let (program, args) = match task {
            TASK_EXEC => (descriptor.name, descriptor.args),
            TASK_EXEC_PHP => {
                let mut args = vec!["-f".to_string(), format!("{}.php", descriptor.name)];
                args.extend(descriptor.args);
                (config.php_binary.clone(), args)
            }
            other => return Err(ExecutionError::UnknownTask(other.to_string())),
        };

        Ok(Self {
            program,
            args,
            basedir: config.basedir.clone(),
            timeout: config.timeout(),
        })
    }

    /// Run to completion, relaying stderr envelopes to `sink`
    ///
    /// Returns everything the program wrote to stdout.
    #[instrument(skip(self, sink), fields(program = %self.program, args = ?self.args))]
    pub async fn run(&self, handle: &JobHandle, sink: &dyn JobSink) -> Result<Vec<u8>, ExecutionError> {
        debug!(handle = %handle, basedir = %self.basedir.display(), "Executing");

        let mut child = Command::new(&self.program)
            .args(&self.args)
            .current_dir(&self.basedir)
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| ExecutionError::SpawnFailed {
                program: self.program.clone(),
                reason: e.to_string(),
            })?;

        let mut stdout = child
            .stdout
            .take()
            .ok_or_else(|| ExecutionError::Io("stdout was not captured".to_string()))?;
        let stderr = child
            .stderr
            .take()
            .ok_or_else(|| ExecutionError::Io("stderr was not captured".to_string()))?;

        let result = tokio::time::timeout(self.timeout, async {
            let collect = async {
                let mut buf = Vec::new();
                stdout.read_to_end(&mut buf).await.map(|_| buf)
            };
            tokio::try_join!(collect, relay_stderr(stderr, handle, sink), child.wait())
        })
        .await;

        match result {
            Ok(Ok((output, (), status))) if status.success() => Ok(output),
            Ok(Ok((_, (), status))) => Err(ExecutionError::NonZeroExit {
                program: self.program.clone(),
                code: status.code(),
            }),
            Ok(Err(e)) => Err(e.into()),
            Err(_) => {
                if let Err(e) = child.kill().await {
                    warn!(handle = %handle, error = %e, "Failed to kill timed out job");
                }
                Err(ExecutionError::Timeout(self.timeout.as_secs()))
            }
        }
    }
}

async fn relay_stderr(
    mut stderr: ChildStderr,
    handle: &JobHandle,
    sink: &dyn JobSink,
) -> std::io::Result<()> {
    let mut decoder = OutputDecoder::new();
    let mut chunk = [0u8; STDERR_CHUNK];

    loop {
        let n = stderr.read(&mut chunk).await?;
        if n == 0 {
            break;
        }
        for event in decoder.feed(&chunk[..n]) {
            deliver(event, handle, sink).await;
        }
    }

    if let Some(event) = decoder.finish() {
        deliver(event, handle, sink).await;
    }
    Ok(())
}

async fn deliver(event: WorkerOutput, handle: &JobHandle, sink: &dyn JobSink) {
    let update = match event {
        WorkerOutput::Debug(text) => {
            debug!(handle = %handle, data = %text, "Script debug");
            return;
        }
        WorkerOutput::Data { data, warning: false } => JobUpdate::Data {
            handle: handle.clone(),
            data,
        },
        WorkerOutput::Data { data, warning: true } => JobUpdate::Warning {
            handle: handle.clone(),
            data,
        },
        WorkerOutput::Status {
            numerator,
            denominator,
        } => JobUpdate::Status {
            handle: handle.clone(),
            numerator,
            denominator,
        },
    };
    sink.publish(update).await;
}
