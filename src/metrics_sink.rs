//! Thin wrapper around the `metrics` facade, naming every
//! counter/gauge/histogram the spec enumerates. Fire-and-forget: a
//! missing recorder is not an error, it just drops the sample.

use metrics::{counter, gauge, histogram};

pub fn malformed(reason: &'static str) {
    counter!("malformed", "reason" => reason).increment(1);
}

pub fn gzipped_crash() {
    counter!("gzipped_crash").increment(1);
}

pub fn crash_size(bytes: u64, payload: &'static str) {
    histogram!("crash_size", "payload" => payload).record(bytes as f64);
}

pub fn incoming_crash() {
    counter!("incoming_crash").increment(1);
}

pub fn throttle_rule(rule_name: &str) {
    counter!("throttle_rule", "rule" => rule_name.to_string()).increment(1);
}

pub fn throttle_result(result: &'static str) {
    counter!("throttle", "result" => result).increment(1);
}

pub fn work_queue_size(depth: usize) {
    gauge!("work_queue_size").set(depth as f64);
}

pub fn state_crash_exception(state: &'static str) {
    counter!("crash_exception", "state" => state).increment(1);
}

pub fn state_crash_dropped(state: &'static str) {
    counter!("crash_dropped", "state" => state).increment(1);
}

pub fn crash_handling_time_ms(millis: f64) {
    histogram!("crash_handling_time").record(millis);
}

pub fn save_crash_count() {
    counter!("save_crash").increment(1);
}
