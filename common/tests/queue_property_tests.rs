// Property-based tests for the submission loop

use async_trait::async_trait;
use common::errors::QueueError;
use common::models::JobHandle;
use common::queue::Broker;
use common::submit::{default_payload, submit_jobs, SubmitOutcome};
use proptest::prelude::*;
use std::sync::Mutex;

/// Broker that accepts submissions until call number `fail_on`
struct ScriptedBroker {
    fail_on: Option<u64>,
    calls: Mutex<Vec<(String, Vec<u8>)>>,
}

impl ScriptedBroker {
    fn new(fail_on: Option<u64>) -> Self {
        Self {
            fail_on,
            calls: Mutex::new(Vec::new()),
        }
    }

    fn call_count(&self) -> u64 {
        self.calls.lock().unwrap().len() as u64
    }
}

#[async_trait]
impl Broker for ScriptedBroker {
    async fn submit_background(
        &self,
        task: &str,
        payload: &[u8],
    ) -> Result<JobHandle, QueueError> {
        let mut calls = self.calls.lock().unwrap();
        calls.push((task.to_string(), payload.to_vec()));
        let n = calls.len() as u64;
        if Some(n) == self.fail_on {
            Err(QueueError::PublishFailed(format!("call {} rejected", n)))
        } else {
            Ok(JobHandle::new(format!("H:{}", n)))
        }
    }
}

fn block_on<F: std::future::Future>(future: F) -> F::Output {
    tokio::runtime::Builder::new_current_thread()
        .build()
        .unwrap()
        .block_on(future)
}

proptest! {
    /// With a broker that never rejects, exactly `count` identical submissions
    /// are made and the run completes.
    #[test]
    fn property_submits_exactly_count(count in 0u64..50) {
        let broker = ScriptedBroker::new(None);
        let payload = default_payload().unwrap();

        let outcome = block_on(submit_jobs(&broker, "execphp", &payload, count));

        prop_assert!(outcome.is_success());
        prop_assert_eq!(outcome.message(), "done!");
        prop_assert_eq!(broker.call_count(), count);
        for (task, sent) in broker.calls.lock().unwrap().iter() {
            prop_assert_eq!(task.as_str(), "execphp");
            prop_assert_eq!(sent, &payload);
        }
    }

    /// A rejection on call `k` stops the loop after exactly `k` calls when
    /// `k <= count`; otherwise the rejection is never reached.
    #[test]
    fn property_stops_at_first_rejection(count in 0u64..50, fail_on in 1u64..60) {
        let broker = ScriptedBroker::new(Some(fail_on));
        let payload = default_payload().unwrap();

        let outcome = block_on(submit_jobs(&broker, "execphp", &payload, count));

        if fail_on <= count {
            prop_assert_eq!(broker.call_count(), fail_on);
            prop_assert_eq!(outcome.message(), "bad return code");
            match outcome {
                SubmitOutcome::Rejected { accepted, attempt, .. } => {
                    prop_assert_eq!(attempt, fail_on);
                    prop_assert_eq!(accepted, fail_on - 1);
                }
                SubmitOutcome::Completed { .. } => prop_assert!(false, "expected rejection"),
            }
        } else {
            prop_assert_eq!(broker.call_count(), count);
            prop_assert!(outcome.is_success());
        }
    }
}
