// A job script that reports progress back to the worker
//
// Run by an `exec` job such as {"Name":"report_progress","Args":["5"]}.
// Prints its result on stdout; everything on stderr is a JSON envelope.

use common::report::Reporter;
use std::thread;
use std::time::Duration;

fn main() {
    let mut reporter = Reporter::new();

    let steps: i64 = match reporter.argv(1).map(str::parse) {
        Some(Ok(n)) if n > 0 => n,
        Some(_) => {
            reporter.send_warning("step count must be a positive integer, using 1");
            1
        }
        None => 1,
    };
    reporter.debug(format!("running {} steps", steps));

    for step in 1..=steps {
        thread::sleep(Duration::from_millis(100));
        reporter.send_progress(format!("finished step {}", step), step, steps);
    }

    reporter.close();
    println!("{} steps done", steps);
}
