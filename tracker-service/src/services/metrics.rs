//! Service counters, exported through the `service-core` Prometheus recorder.

use metrics::counter;

pub fn record_open(bot: bool) {
    counter!("pixel_opens_total", "bot" => bot.to_string()).increment(1);
}

/// `result` is one of `sent`, `failed`, `suppressed`.
pub fn record_notification(result: &'static str) {
    counter!("pixel_notifications_total", "result" => result).increment(1);
}

pub fn record_store_error(op: &'static str) {
    counter!("pixel_store_errors_total", "op" => op).increment(1);
}
