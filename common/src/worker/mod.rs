// Worker side: running job scripts and relaying what they report

pub mod exec;
pub mod functions;
pub mod output;
pub mod sink;

pub use exec::ShellJob;
pub use functions::ExecFunctions;
pub use output::OutputDecoder;
pub use sink::{JobSink, NatsStatusSink};
