//! Time-related utilities

use std::time::Instant;

/// Milliseconds elapsed since `start`, with sub-millisecond precision
pub fn elapsed_ms(start: Instant) -> f64 {
    start.elapsed().as_secs_f64() * 1000.0
}

/// Current time as an RFC 3339 string, for reports
pub fn now_rfc3339() -> String {
    chrono::Utc::now().to_rfc3339()
}
