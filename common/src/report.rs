//! Reporting helper for job scripts.
//!
//! A script run by the worker talks back through its standard error stream:
//! each call writes one JSON envelope, unterminated, which the worker decodes
//! (see [`crate::worker::output`]) and relays to whoever submitted the job.
//!
//! ```no_run
//! use common::report::Reporter;
//!
//! let mut reporter = Reporter::new();
//! let total = reporter.argv(1).and_then(|n| n.parse().ok()).unwrap_or(1);
//! for step in 1..=total {
//!     reporter.send_progress(format!("step {step}"), step, total);
//! }
//! reporter.debug("finished");
//! reporter.close();
//! ```

use crate::models::{DebugMessage, ProgressMessage};
use serde::Serialize;
use std::ffi::OsString;
use std::io::{self, Stderr, Write};

/// Writes progress and debug envelopes to a stream, stderr by default
pub struct Reporter<W: Write = Stderr> {
    out: W,
    args: Vec<String>,
}

impl Reporter<Stderr> {
    /// Reporter over the process's stderr and command-line arguments
    ///
    /// Arguments that are not valid UTF-8 are kept with replacement characters.
    pub fn new() -> Self {
        Self::with_writer(io::stderr(), lossy_args(std::env::args_os()))
    }
}

impl Default for Reporter<Stderr> {
    fn default() -> Self {
        Self::new()
    }
}

impl<W: Write> Reporter<W> {
    /// Reporter over an arbitrary writer and argument list
    pub fn with_writer<I, S>(out: W, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            out,
            args: args.into_iter().map(Into::into).collect(),
        }
    }

    /// Send `msg` as plain data with no progress attached
    pub fn send_msg(&mut self, msg: impl Into<String>) {
        self.send(msg, false, 0, 0);
    }

    /// Send `msg` flagged as a warning
    pub fn send_warning(&mut self, msg: impl Into<String>) {
        self.send(msg, true, 0, 0);
    }

    /// Send `msg` together with a completion ratio
    pub fn send_progress(&mut self, msg: impl Into<String>, numerator: i64, denominator: i64) {
        self.send(msg, false, numerator, denominator);
    }

    /// Send a full progress envelope
    pub fn send(&mut self, msg: impl Into<String>, warning: bool, numerator: i64, denominator: i64) {
        let message = ProgressMessage {
            numerator,
            denominator,
            warning,
            data: msg.into(),
        };
        self.write_envelope(&message);
    }

    /// Send free-form diagnostic text; the worker logs it and does not relay it
    pub fn debug(&mut self, msg: impl Into<String>) {
        let message = DebugMessage { debug: msg.into() };
        self.write_envelope(&message);
    }

    /// Argument at `index`, where index 0 is the program name
    pub fn argv(&self, index: usize) -> Option<&str> {
        self.args.get(index).map(String::as_str)
    }

    pub fn argc(&self) -> usize {
        self.args.len()
    }

    /// Flush and release the stream
    pub fn close(self) {
        let _ = self.into_inner();
    }

    /// Flush and hand back the underlying writer
    pub fn into_inner(mut self) -> W {
        let _ = self.out.flush();
        self.out
    }

    // Write failures are dropped: a script must keep running even when
    // nobody is reading its stderr.
    fn write_envelope<T: Serialize>(&mut self, envelope: &T) {
        if let Ok(bytes) = serde_json::to_vec(envelope) {
            let _ = self.out.write_all(&bytes);
        }
    }
}

fn lossy_args<I>(args: I) -> Vec<String>
where
    I: IntoIterator<Item = OsString>,
{
    args.into_iter()
        .map(|arg| arg.to_string_lossy().into_owned())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reporter() -> Reporter<Vec<u8>> {
        Reporter::with_writer(Vec::new(), ["script.php", "a", "b"])
    }

    fn written(reporter: Reporter<Vec<u8>>) -> String {
        String::from_utf8(reporter.into_inner()).unwrap()
    }

    #[test]
    fn test_send_msg_writes_default_envelope() {
        let mut r = reporter();
        r.send_msg("hi");
        assert_eq!(
            written(r),
            r#"{"Numerator":0,"Denominator":0,"Warning":false,"Data":"hi"}"#
        );
    }

    #[test]
    fn test_debug_writes_debug_envelope() {
        let mut r = reporter();
        r.debug("x");
        assert_eq!(written(r), r#"{"Debug":"x"}"#);
    }

    #[test]
    fn test_envelopes_are_unterminated() {
        let mut r = reporter();
        r.send_progress("half", 1, 2);
        r.send_warning("careful");
        assert_eq!(
            written(r),
            concat!(
                r#"{"Numerator":1,"Denominator":2,"Warning":false,"Data":"half"}"#,
                r#"{"Numerator":0,"Denominator":0,"Warning":true,"Data":"careful"}"#
            )
        );
    }

    #[test]
    fn test_argv_and_argc() {
        let r = reporter();
        assert_eq!(r.argc(), 3);
        assert_eq!(r.argv(0), Some("script.php"));
        assert_eq!(r.argv(2), Some("b"));
        assert_eq!(r.argv(3), None);
        assert_eq!(r.argv(usize::MAX), None);
    }

    #[cfg(unix)]
    #[test]
    fn test_non_utf8_arguments_are_kept_lossily() {
        use std::os::unix::ffi::OsStringExt;

        let args = lossy_args([
            OsString::from("script"),
            OsString::from_vec(vec![b'a', 0xff, b'b']),
        ]);
        let r = Reporter::with_writer(Vec::new(), args);

        assert_eq!(r.argc(), 2);
        assert_eq!(r.argv(1), Some("a\u{fffd}b"));
        assert_eq!(r.argv(2), None);
    }

    #[test]
    fn test_write_failures_are_ignored() {
        struct Broken;
        impl Write for Broken {
            fn write(&mut self, _: &[u8]) -> io::Result<usize> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
            fn flush(&mut self) -> io::Result<()> {
                Err(io::Error::new(io::ErrorKind::BrokenPipe, "closed"))
            }
        }

        let mut r = Reporter::with_writer(Broken, Vec::<String>::new());
        r.send_msg("lost");
        r.debug("lost too");
        assert_eq!(r.argc(), 0);
        r.close();
    }
}
