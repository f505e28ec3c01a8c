//! A small instrumented program to debug.

use std::thread;
use std::time::Duration;

use dapbridge_engine::{trace_fn, trace_line, Probe};

/// Pause between iterations so a client has time to attach.
const TICK: Duration = Duration::from_millis(500);

fn scale(probe: &Probe, x: i64) -> i64 {
    trace_fn!(probe, "scale");
    trace_line!(probe, x);
    let y = x * 2;
    trace_line!(probe, x, y);
    y
}

/// Run the demo. With `stop_at_entry` it stops on its first line.
pub fn run(probe: Probe, stop_at_entry: bool) {
    trace_fn!(probe, "demo");
    probe.global("greeting", &"hello from dapbridge");

    if stop_at_entry {
        probe.set_trace();
    }

    let mut total = 0i64;
    for step in 1..=5i64 {
        trace_line!(probe, step, total);
        let scaled = scale(&probe, step);
        total += scaled;
        trace_line!(probe, step, scaled, total);
        thread::sleep(TICK);
    }

    let done = true;
    trace_line!(probe, total, done);
    println!("demo finished, total = {total}");
}
