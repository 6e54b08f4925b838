// Common library shared by the submission client and the script worker

pub mod bootstrap;
pub mod config;
pub mod errors;
pub mod models;
pub mod queue;
pub mod report;
pub mod submit;
pub mod telemetry;
pub mod worker;
