//! Monotonic microsecond time source
//!
//! All subsystems share one process-relative clock. The epoch is captured on
//! first use, so timestamps are small positive values that fit comfortably in
//! the arithmetic of the control loop.

use std::sync::OnceLock;
use std::time::Instant;

static EPOCH: OnceLock<Instant> = OnceLock::new();

/// Microseconds since the process-relative epoch.
///
/// Monotonic; never fails. Host jitter is bounded by the OS clock source
/// (well under 10 us on the Raspberry Pi targets this runs on).
#[inline]
pub fn now_us() -> i64 {
    let epoch = *EPOCH.get_or_init(Instant::now);
    epoch.elapsed().as_micros() as i64
}

/// Pin the epoch now so that later `now_us` calls measure from here.
pub fn init() {
    let _ = EPOCH.get_or_init(Instant::now);
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::thread;
    use std::time::Duration;

    #[test]
    fn test_monotonic() {
        let a = now_us();
        thread::sleep(Duration::from_millis(2));
        let b = now_us();
        assert!(b > a);
        assert!(b - a >= 2_000);
    }
}
