// Data models shared by the client, the worker, and job scripts

use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Task name handled by running an arbitrary program
pub const TASK_EXEC: &str = "exec";

/// Task name handled by running `<Name>.php` through the PHP interpreter
pub const TASK_EXEC_PHP: &str = "execphp";

/// Job payload describing which script to run and with which arguments
///
/// Serialized with PascalCase keys (`{"Name":..,"Args":[..]}`) so scripts in
/// any language can build it with a plain JSON encoder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct JobDescriptor {
    pub name: String,
    #[serde(default)]
    pub args: Vec<String>,
}

impl JobDescriptor {
    pub fn new<I, S>(name: impl Into<String>, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            name: name.into(),
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Encode as compact JSON bytes, ready to hand to a broker
    pub fn to_payload(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(self)
    }
}

/// Opaque identifier the broker side assigns to a submitted job
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct JobHandle(String);

impl JobHandle {
    pub fn new(handle: impl Into<String>) -> Self {
        Self(handle.into())
    }

    /// Allocate a fresh handle of the form `H:<uuid>`
    pub fn generate() -> Self {
        Self(format!("H:{}", Uuid::new_v4()))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// A job as delivered to a worker
#[derive(Debug, Clone)]
pub struct Job {
    pub handle: JobHandle,
    pub task: String,
    pub payload: Vec<u8>,
}

/// Progress envelope a script writes to its stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct ProgressMessage {
    pub numerator: i64,
    pub denominator: i64,
    pub warning: bool,
    pub data: String,
}

/// Free-form debug envelope a script writes to its stderr
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "PascalCase")]
pub struct DebugMessage {
    pub debug: String,
}

/// Event decoded from a running script's stderr
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerOutput {
    /// Intermediate data for the submitter; `warning` marks it as a warning
    Data { data: String, warning: bool },
    /// Completion ratio reported by the script
    Status { numerator: i64, denominator: i64 },
    /// Diagnostic text, logged by the worker and not forwarded
    Debug(String),
}

/// Status event published by the worker while a job runs
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum JobUpdate {
    Data {
        handle: JobHandle,
        data: String,
    },
    Warning {
        handle: JobHandle,
        data: String,
    },
    Status {
        handle: JobHandle,
        numerator: i64,
        denominator: i64,
    },
    Complete {
        handle: JobHandle,
        result: String,
    },
    Fail {
        handle: JobHandle,
        error: String,
    },
}

impl JobUpdate {
    pub fn handle(&self) -> &JobHandle {
        match self {
            JobUpdate::Data { handle, .. }
            | JobUpdate::Warning { handle, .. }
            | JobUpdate::Status { handle, .. }
            | JobUpdate::Complete { handle, .. }
            | JobUpdate::Fail { handle, .. } => handle,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_job_descriptor_wire_format() {
        let descriptor = JobDescriptor::new("foobar", ["0", "1", "2", "3"]);
        let payload = descriptor.to_payload().unwrap();
        assert_eq!(
            String::from_utf8(payload).unwrap(),
            r#"{"Name":"foobar","Args":["0","1","2","3"]}"#
        );
    }

    #[test]
    fn test_job_descriptor_args_default_to_empty() {
        let descriptor: JobDescriptor = serde_json::from_str(r#"{"Name":"report"}"#).unwrap();
        assert_eq!(descriptor.name, "report");
        assert!(descriptor.args.is_empty());
    }

    #[test]
    fn test_generated_handles_are_unique() {
        let a = JobHandle::generate();
        let b = JobHandle::generate();
        assert_ne!(a, b);
        assert!(a.as_str().starts_with("H:"));
    }

    #[test]
    fn test_job_update_is_tagged() {
        let update = JobUpdate::Status {
            handle: JobHandle::new("H:1"),
            numerator: 1,
            denominator: 4,
        };
        let value = serde_json::to_value(&update).unwrap();
        assert_eq!(value["type"], "status");
        assert_eq!(value["handle"], "H:1");
        assert_eq!(value["numerator"], 1);
        assert_eq!(update.handle().as_str(), "H:1");
    }
}
