//! Wall-clock and flooring helpers. Timestamps are always absolute seconds
//! since the epoch, truncated to the on-disk width.

use time::OffsetDateTime;

/// Wall-clock seconds since the epoch.
pub fn now() -> u32 {
    OffsetDateTime::now_utc().unix_timestamp() as u32
}

/// The largest multiple of `interval` not exceeding `t`.
pub fn floor(t: u32, interval: u32) -> u32 {
    t - (t % interval)
}
