//! Absolute-phase isochronous frame scheduler.
//!
//! Frame boundaries are computed as `t0 + frame_id * period`, not as successive
//! relative sleeps, so that scheduling jitter in one frame never shifts the phase of
//! later frames.

use crate::clock::Timestamp;

/// A frame-rate scheduler anchored to an absolute epoch.
#[derive(Debug, Clone, Copy)]
pub struct IsochFrameCounter {
    period_us: u64,
    t0: Timestamp,
    frame_id: u64,
}

impl IsochFrameCounter {
    /// `fps` frames per second, ticking from `t0` (or `Timestamp::now()` if `t0` is
    /// `None`).
    pub fn new(fps: f64, t0: Option<Timestamp>) -> Self {
        Self {
            period_us: Self::period_us_for(fps),
            t0: t0.unwrap_or_else(Timestamp::now),
            frame_id: 0,
        }
    }

    fn period_us_for(fps: f64) -> u64 {
        (1_000_000.0 / fps).round() as u64
    }

    pub fn period_us(&self) -> u64 {
        self.period_us
    }

    fn boundary(&self, frame_id: u64) -> Timestamp {
        self.t0.add_usec((frame_id * self.period_us) as i64)
    }

    /// Sleeps (if `blocking`) until the next frame boundary, returning the new
    /// (monotone, 1-based) frame id and the signed microsecond scheduling error
    /// between the intended wake-up and the actual one.
    pub fn wait_tick(&mut self, blocking: bool) -> (u64, i64) {
        self.frame_id += 1;
        let target = self.boundary(self.frame_id);

        if blocking {
            crate::clock::absolute_sleep_until(target);
        }
        let actual = Timestamp::now();
        let sched_err = actual.sub_usec(&target);
        (self.frame_id, sched_err)
    }

    /// Returns the current frame id without sleeping, along with the microseconds
    /// remaining in that frame.
    pub fn get(&self) -> (u64, i64) {
        let now = Timestamp::now();
        let elapsed_us = now.sub_usec(&self.t0).max(0) as u64;
        let current = elapsed_us / self.period_us;
        let frame_id = current.max(1);
        let frame_start_us = frame_id * self.period_us;
        let remaining_us = frame_start_us as i64 + self.period_us as i64 - elapsed_us as i64;
        (frame_id, remaining_us)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn period_us_matches_fps() {
        let c = IsochFrameCounter::new(60.0, Some(Timestamp::ZERO));
        assert_eq!(c.period_us(), 16_667);
        let c2 = IsochFrameCounter::new(1000.0, Some(Timestamp::ZERO));
        assert_eq!(c2.period_us(), 1_000);
    }

    #[test]
    fn frame_id_is_monotone_and_starts_at_one() {
        let mut c = IsochFrameCounter::new(1000.0, Some(Timestamp::now().add_usec(-10_000_000)));
        let (id1, _) = c.wait_tick(false);
        let (id2, _) = c.wait_tick(false);
        assert_eq!(id1, 1);
        assert_eq!(id2, 2);
    }

    #[test]
    fn non_blocking_tick_reports_large_negative_error_when_far_in_past() {
        // t0 ten seconds in the past: boundary(1) is long gone, so a non-blocking
        // tick observes a large *positive* error (we're late, not early).
        let past = Timestamp::now().add_usec(-10_000_000);
        let mut c = IsochFrameCounter::new(100.0, Some(past));
        let (_, err) = c.wait_tick(false);
        assert!(err > 0);
    }
}
