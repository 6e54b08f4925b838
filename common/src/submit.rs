// Background job submission loop used by the client binary

use crate::errors::QueueError;
use crate::models::{JobDescriptor, JobHandle};
use crate::queue::Broker;
use crate::telemetry;
use std::ffi::OsString;
use tracing::{debug, error, info, instrument};

/// Number of submissions when no usable count is supplied
pub const DEFAULT_COUNT: u64 = 10;

/// Message printed once every submission has been accepted
pub const DONE_MESSAGE: &str = "done!";

/// Message printed when the broker rejects a submission
pub const REJECTED_MESSAGE: &str = "bad return code";

/// Result of a submission run
///
/// Only the count and the most recent handle are kept, so memory does not
/// grow with the number of submissions.
#[derive(Debug)]
pub enum SubmitOutcome {
    /// Every submission was accepted
    Completed {
        submitted: u64,
        last: Option<JobHandle>,
    },
    /// Submission number `attempt` (1-based) was rejected; the loop stopped
    /// there and the `accepted` submissions before it stay queued
    Rejected {
        accepted: u64,
        last: Option<JobHandle>,
        attempt: u64,
        error: QueueError,
    },
}

impl SubmitOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SubmitOutcome::Completed { .. })
    }

    /// Line shown to the user for this outcome
    pub fn message(&self) -> &'static str {
        match self {
            SubmitOutcome::Completed { .. } => DONE_MESSAGE,
            SubmitOutcome::Rejected { .. } => REJECTED_MESSAGE,
        }
    }

    /// Number of submissions the broker accepted
    pub fn accepted(&self) -> u64 {
        match self {
            SubmitOutcome::Completed { submitted, .. } => *submitted,
            SubmitOutcome::Rejected { accepted, .. } => *accepted,
        }
    }

    /// Handle of the last accepted submission
    pub fn last_handle(&self) -> Option<&JobHandle> {
        match self {
            SubmitOutcome::Completed { last, .. } | SubmitOutcome::Rejected { last, .. } => {
                last.as_ref()
            }
        }
    }
}

/// Payload every submission carries
pub fn default_payload() -> Result<Vec<u8>, serde_json::Error> {
    JobDescriptor::new("foobar", ["0", "1", "2", "3"]).to_payload()
}

/// Interpret the optional count argument
///
/// Falls back to `default` when the argument is missing or not an integer.
/// Negative counts submit nothing.
pub fn parse_count(arg: Option<&str>, default: u64) -> u64 {
    match arg.map(str::trim).map(str::parse::<i64>) {
        Some(Ok(n)) => n.max(0) as u64,
        _ => default,
    }
}

/// Interpret the raw command-line count argument
///
/// An argument that is not valid UTF-8 counts as unparseable.
pub fn parse_count_arg(arg: Option<OsString>, default: u64) -> u64 {
    let arg = arg.and_then(|a| a.into_string().ok());
    parse_count(arg.as_deref(), default)
}

/// Submit `count` background jobs for `task`, one after another
///
/// Stops at the first rejection; jobs accepted before it stay queued.
#[instrument(skip(broker, payload), fields(task = %task, count = count))]
pub async fn submit_jobs<B>(broker: &B, task: &str, payload: &[u8], count: u64) -> SubmitOutcome
where
    B: Broker + ?Sized,
{
    let mut last = None;

    for attempt in 1..=count {
        match broker.submit_background(task, payload).await {
            Ok(handle) => {
                telemetry::record_job_submitted(task);
                debug!(attempt = attempt, handle = %handle, "Submission accepted");
                last = Some(handle);
            }
            Err(error) => {
                error!(attempt = attempt, error = %error, "Broker rejected submission");
                return SubmitOutcome::Rejected {
                    accepted: attempt - 1,
                    last,
                    attempt,
                    error,
                };
            }
        }
    }

    info!(submitted = count, "All submissions accepted");
    SubmitOutcome::Completed {
        submitted: count,
        last,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::queue::publisher::MockBroker;
    use std::sync::atomic::{AtomicU64, Ordering};
    use std::sync::{Arc, Mutex};

    const EXPECTED_PAYLOAD: &str = r#"{"Name":"foobar","Args":["0","1","2","3"]}"#;

    type Calls = Arc<Mutex<Vec<(String, Vec<u8>)>>>;

    fn recording_broker(fail_on: Option<u64>) -> (MockBroker, Calls) {
        let calls: Calls = Arc::new(Mutex::new(Vec::new()));
        let counter = AtomicU64::new(0);
        let recorded = Arc::clone(&calls);

        let mut broker = MockBroker::new();
        broker
            .expect_submit_background()
            .returning(move |task, payload| {
                recorded
                    .lock()
                    .unwrap()
                    .push((task.to_string(), payload.to_vec()));
                let n = counter.fetch_add(1, Ordering::SeqCst) + 1;
                if Some(n) == fail_on {
                    Err(QueueError::PublishFailed("rejected".to_string()))
                } else {
                    Ok(JobHandle::new(format!("H:{}", n)))
                }
            });

        (broker, calls)
    }

    #[test]
    fn test_default_payload() {
        assert_eq!(default_payload().unwrap(), EXPECTED_PAYLOAD.as_bytes());
    }

    #[test]
    fn test_parse_count() {
        assert_eq!(parse_count(None, DEFAULT_COUNT), 10);
        assert_eq!(parse_count(Some("3"), DEFAULT_COUNT), 3);
        assert_eq!(parse_count(Some(" 7 "), DEFAULT_COUNT), 7);
        assert_eq!(parse_count(Some("0"), DEFAULT_COUNT), 0);
        assert_eq!(parse_count(Some("-4"), DEFAULT_COUNT), 0);
        assert_eq!(parse_count(Some("lots"), DEFAULT_COUNT), 10);
        assert_eq!(parse_count(Some(""), 5), 5);
    }

    #[test]
    fn test_parse_count_arg() {
        assert_eq!(parse_count_arg(None, DEFAULT_COUNT), 10);
        assert_eq!(parse_count_arg(Some(OsString::from("4")), DEFAULT_COUNT), 4);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_count_falls_back_to_default() {
        use std::os::unix::ffi::OsStringExt;

        let arg = OsString::from_vec(vec![0xff, b'3']);
        assert_eq!(parse_count_arg(Some(arg), DEFAULT_COUNT), 10);
    }

    #[tokio::test]
    async fn test_zero_count_submits_nothing() {
        let mut broker = MockBroker::new();
        broker.expect_submit_background().times(0);

        let payload = default_payload().unwrap();
        let outcome = submit_jobs(&broker, "execphp", &payload, 0).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.accepted(), 0);
        assert_eq!(outcome.last_handle(), None);
        assert_eq!(outcome.message(), "done!");
    }

    #[tokio::test]
    async fn test_submits_exactly_count_jobs() {
        let (broker, calls) = recording_broker(None);

        let payload = default_payload().unwrap();
        let outcome = submit_jobs(&broker, "execphp", &payload, 3).await;

        assert!(outcome.is_success());
        assert_eq!(outcome.message(), "done!");
        assert_eq!(outcome.accepted(), 3);
        assert_eq!(outcome.last_handle(), Some(&JobHandle::new("H:3")));

        let calls = calls.lock().unwrap();
        assert_eq!(calls.len(), 3);
        for (task, payload) in calls.iter() {
            assert_eq!(task, "execphp");
            assert_eq!(payload.as_slice(), EXPECTED_PAYLOAD.as_bytes());
        }
    }

    #[tokio::test]
    async fn test_stops_at_first_rejection() {
        let (broker, calls) = recording_broker(Some(2));

        let payload = default_payload().unwrap();
        let outcome = submit_jobs(&broker, "execphp", &payload, 5).await;

        assert!(!outcome.is_success());
        assert_eq!(outcome.message(), "bad return code");
        assert_eq!(calls.lock().unwrap().len(), 2);

        match outcome {
            SubmitOutcome::Rejected {
                accepted,
                last,
                attempt,
                error,
            } => {
                assert_eq!(attempt, 2);
                assert_eq!(accepted, 1);
                assert_eq!(last, Some(JobHandle::new("H:1")));
                assert!(matches!(error, QueueError::PublishFailed(_)));
            }
            other => panic!("expected rejection, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn test_works_through_trait_object() {
        let (broker, calls) = recording_broker(None);
        let broker: Box<dyn Broker> = Box::new(broker);

        let outcome = submit_jobs(broker.as_ref(), "exec", b"{}", 2).await;

        assert!(outcome.is_success());
        assert_eq!(calls.lock().unwrap().len(), 2);
    }
}
