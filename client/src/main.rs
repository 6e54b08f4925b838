// Submission client entry point
//
// Usage: client [COUNT]
// Submits COUNT background jobs (default from configuration, 10 out of the box).

use anyhow::Result;
use common::bootstrap;
use common::queue::NatsBroker;
use common::submit::{self, SubmitOutcome};
use std::process::ExitCode;
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<ExitCode> {
    let settings = bootstrap::load_settings()?;
    bootstrap::init_observability(&settings)?;

    let count = submit::parse_count_arg(
        std::env::args_os().nth(1),
        settings.client.default_count,
    );

    info!(
        nats_url = %settings.nats.url,
        task = %settings.client.task_name,
        count = count,
        "Starting submission client"
    );

    let nats_client = bootstrap::init_nats_client(&settings).await?;
    let broker = NatsBroker::new(nats_client).with_timeout(settings.client.publish_timeout());

    let payload = submit::default_payload()?;
    let outcome = submit::submit_jobs(&broker, &settings.client.task_name, &payload, count).await;

    println!("{}", outcome.message());

    match outcome {
        SubmitOutcome::Completed { submitted, last } => {
            info!(submitted = submitted, last_handle = ?last, "Submission finished");
            Ok(ExitCode::SUCCESS)
        }
        SubmitOutcome::Rejected {
            accepted,
            attempt,
            error,
            ..
        } => {
            error!(
                attempt = attempt,
                already_queued = accepted,
                error = %error,
                "Submission stopped"
            );
            Ok(ExitCode::FAILURE)
        }
    }
}
