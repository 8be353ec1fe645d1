use log::{warn, LevelFilter};
use std::time::{Instant, SystemTime, UNIX_EPOCH};

/// Seconds since the unix epoch
pub fn now() -> u64 {
    unix_seconds(SystemTime::now())
}

/// A clock set before the epoch reads as the epoch itself. Every time check then treats the
/// node as living in 1970, which keeps timestamp locked outputs locked.
fn unix_seconds(time: SystemTime) -> u64 {
    match time.duration_since(UNIX_EPOCH) {
        Ok(elapsed) => elapsed.as_secs(),
        Err(e) => {
            warn!(
                "System clock is {}s before the unix epoch, using the epoch",
                e.duration().as_secs()
            );
            0
        }
    }
}

pub fn ms_since(start: &Instant) -> f32 {
    start.elapsed().as_secs_f32() * 1000.0
}

/// Median of a list of values. Even lengths average the two middle values (rounded down),
/// an empty list yields zero.
pub fn median(values: &[u64]) -> u64 {
    if values.is_empty() {
        return 0;
    }
    let mut sorted = values.to_vec();
    sorted.sort_unstable();
    let n = sorted.len() / 2;
    if sorted.len() % 2 == 1 {
        sorted[n]
    } else {
        // avoid overflow on (a + b) / 2
        sorted[n - 1] / 2 + sorted[n] / 2 + (sorted[n - 1] % 2 + sorted[n] % 2) / 2
    }
}

pub fn init_logger(level: LevelFilter) {
    let _ = env_logger::builder()
        .filter_module("cryptonote_node", level)
        .format_timestamp_millis()
        .try_init();
}
