use std::time::SystemTime;

use chrono::Utc;

/// Wall-clock seconds since the Unix epoch, for timestamping manifests.
/// Sampling deadlines never use this — see `perfkit_core::clock` for the
/// monotonic clock the scheduler is built on.
#[inline]
pub fn timestamp_secs() -> u64 {
    SystemTime::now()
        .duration_since(SystemTime::UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_secs()
}

/// The current instant as an RFC 3339 / ISO 8601 string, for `Manager::ping`.
#[inline]
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}
