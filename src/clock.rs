//! Monotonic and wall-clock timestamp arithmetic.
//!
//! All interval arithmetic is carried out in whole seconds plus microseconds so that
//! comparisons never depend on floating-point rounding. [`Timestamp`] is the wall-clock
//! value carried on the wire and in `PacketEvent`; [`MonotonicClock`] is used internally
//! by [`delay_loop`] and the isochronous frame counter, where wall-clock jumps (NTP steps)
//! must not perturb scheduling.

use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

const USEC_PER_SEC: i64 = 1_000_000;

/// A wall-clock timestamp expressed as seconds and microseconds since the Unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct Timestamp {
    pub sec: i64,
    pub usec: i64,
}

impl Timestamp {
    pub const ZERO: Timestamp = Timestamp { sec: 0, usec: 0 };

    /// Constructs a normalized timestamp (`0 <= usec < 1_000_000`).
    pub fn new(sec: i64, usec: i64) -> Self {
        Self { sec, usec }.normalized()
    }

    fn normalized(self) -> Self {
        let mut sec = self.sec;
        let mut usec = self.usec;
        if usec >= USEC_PER_SEC {
            sec += usec / USEC_PER_SEC;
            usec %= USEC_PER_SEC;
        } else if usec < 0 {
            let borrow = (-usec + USEC_PER_SEC - 1) / USEC_PER_SEC;
            sec -= borrow;
            usec += borrow * USEC_PER_SEC;
        }
        Self { sec, usec }
    }

    /// Current wall-clock time.
    pub fn now() -> Self {
        let d = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or(Duration::ZERO);
        Self::new(d.as_secs() as i64, d.subsec_micros() as i64)
    }

    /// Adds a (possibly negative) microsecond offset.
    pub fn add_usec(self, usec: i64) -> Self {
        Self::new(self.sec, self.usec + usec)
    }

    /// Adds a floating-point number of seconds. The only place floating point enters
    /// the clock: converting a caller-supplied fractional-second offset into integer
    /// microseconds before any comparison is made.
    pub fn add_secs_f64(self, secs: f64) -> Self {
        let whole = secs.trunc() as i64;
        let frac_usec = ((secs - secs.trunc()) * USEC_PER_SEC as f64).round() as i64;
        Self::new(self.sec + whole, self.usec + frac_usec)
    }

    /// `true` if `self` occurs strictly before `other`.
    pub fn before(&self, other: &Self) -> bool {
        (self.sec, self.usec) < (other.sec, other.usec)
    }

    /// Whole-second component of `self - other` (truncated toward zero, matching the
    /// original C `tv_sec` subtraction semantics used for interval-boundary math).
    pub fn sub_sec(&self, other: &Self) -> i64 {
        self.sec - other.sec
    }

    /// `self - other` expressed as total microseconds (may be negative).
    pub fn sub_usec(&self, other: &Self) -> i64 {
        (self.sec - other.sec) * USEC_PER_SEC + (self.usec - other.usec)
    }

    pub fn as_duration_since_epoch(&self) -> Duration {
        Duration::new(self.sec.max(0) as u64, (self.usec.max(0) as u32) * 1000)
    }
}

/// Sleeps (wall-clock relative) until the system clock reaches `target`. Used for
/// absolute tx-start epochs and interval-timer alignment. A no-op if `target` has
/// already passed.
pub fn absolute_sleep_until(target: Timestamp) {
    loop {
        let now = Timestamp::now();
        let remaining_us = target.sub_usec(&now);
        if remaining_us <= 0 {
            return;
        }
        // Re-check in slices so a clock step doesn't cause an overlong sleep.
        let slice_us = remaining_us.min(50_000) as u64;
        thread::sleep(Duration::from_micros(slice_us));
    }
}

/// A coarse sleep followed by a short busy-wait tail, so that sub-millisecond delays
/// (e.g. a 10 us or 4 us pacing gap) are honoured within a few microseconds despite
/// OS scheduler granularity.
pub fn delay_loop(usec: u64) {
    const BUSY_WAIT_TAIL_US: u64 = 200;
    let start = Instant::now();
    let target = Duration::from_micros(usec);

    if target > Duration::from_micros(BUSY_WAIT_TAIL_US) {
        let coarse = target - Duration::from_micros(BUSY_WAIT_TAIL_US);
        thread::sleep(coarse);
    }
    while start.elapsed() < target {
        std::hint::spin_loop();
    }
}

/// A monotonic reference clock, used where wall-clock discontinuities must not leak
/// into scheduling decisions (the isochronous frame counter, near-congestion pacing).
#[derive(Debug, Clone, Copy)]
pub struct MonotonicClock {
    epoch: Instant,
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self { epoch: Instant::now() }
    }

    pub fn now_usec(&self) -> i64 {
        self.epoch.elapsed().as_micros() as i64
    }

    pub fn sleep_until_usec(&self, target_usec: i64) -> i64 {
        let now = self.now_usec();
        let remaining = target_usec - now;
        if remaining > 0 {
            thread::sleep(Duration::from_micros(remaining as u64));
        }
        self.now_usec() - target_usec
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn normalizes_overflowing_usec() {
        let ts = Timestamp::new(10, 1_500_000);
        assert_eq!(ts, Timestamp { sec: 11, usec: 500_000 });
    }

    #[test]
    fn normalizes_negative_usec() {
        let ts = Timestamp::new(10, -500_000);
        assert_eq!(ts, Timestamp { sec: 9, usec: 500_000 });
    }

    #[test]
    fn sub_usec_roundtrips_add_usec() {
        let base = Timestamp::new(100, 250_000);
        let later = base.add_usec(750_500);
        assert_eq!(later.sub_usec(&base), 750_500);
    }

    #[test]
    fn before_orders_by_sec_then_usec() {
        let a = Timestamp::new(5, 999_999);
        let b = Timestamp::new(6, 0);
        assert!(a.before(&b));
        assert!(!b.before(&a));
    }

    #[test]
    fn add_secs_f64_matches_usec_equivalent() {
        let base = Timestamp::new(0, 0);
        let a = base.add_secs_f64(1.5);
        let b = base.add_usec(1_500_000);
        assert_eq!(a, b);
    }

    #[test]
    fn delay_loop_honours_small_waits() {
        let start = Instant::now();
        delay_loop(4);
        assert!(start.elapsed() >= Duration::from_micros(4));
        assert!(start.elapsed() < Duration::from_millis(20));
    }
}
