//! Cross-thread synchronization points that start and stop coordinated groups of
//! traffic workers.
//!
//! Three shapes: an N-party rendezvous where the last arrival wakes everyone
//! ([`ConnectBarrier`]), a two-party start/stop rendezvous bounded by a global deadline
//! ([`DuplexBarrier`], used twice per full-duplex socket pair), and a one-shot
//! predicate the reporter flips once it is ready to accept jobs ([`ReadyGate`]).

use crate::error::CoreError;
use std::sync::{Condvar, Mutex};
use std::time::{Duration, Instant};

const DUPLEX_WAIT_SLICE: Duration = Duration::from_secs(1);

/// N-party barrier: every party calls [`Self::arrive`]; the party whose arrival
/// brings the count to zero broadcasts, unblocking everyone (including itself, which
/// returns immediately).
pub struct ConnectBarrier {
    remaining: Mutex<usize>,
    cv: Condvar,
}

impl ConnectBarrier {
    pub fn new(parties: usize) -> Self {
        assert!(parties > 0, "ConnectBarrier needs at least one party");
        Self {
            remaining: Mutex::new(parties),
            cv: Condvar::new(),
        }
    }

    pub fn arrive(&self) {
        let mut remaining = self.remaining.lock().unwrap();
        if *remaining == 0 {
            return;
        }
        *remaining -= 1;
        if *remaining == 0 {
            self.cv.notify_all();
        } else {
            while *remaining != 0 {
                remaining = self.cv.wait(remaining).unwrap();
            }
        }
    }
}

/// Two-party start/stop barrier bounded by a global deadline. Each call to
/// [`Self::arrive_and_wait`] blocks in one-second slices so the caller can observe
/// shutdown requests between slices; if the overall `timeout` elapses before both
/// parties arrive, every blocked caller returns `BarrierTimeout`.
pub struct DuplexBarrier {
    arrived: Mutex<usize>,
    cv: Condvar,
}

impl Default for DuplexBarrier {
    fn default() -> Self {
        Self::new()
    }
}

impl DuplexBarrier {
    const PARTIES: usize = 2;

    pub fn new() -> Self {
        Self {
            arrived: Mutex::new(0),
            cv: Condvar::new(),
        }
    }

    pub fn arrive_and_wait(&self, timeout: Duration) -> Result<(), CoreError> {
        let deadline = Instant::now() + timeout;
        let mut arrived = self.arrived.lock().unwrap();
        *arrived += 1;
        if *arrived >= Self::PARTIES {
            self.cv.notify_all();
            return Ok(());
        }
        loop {
            if *arrived >= Self::PARTIES {
                return Ok(());
            }
            let now = Instant::now();
            if now >= deadline {
                return Err(CoreError::BarrierTimeout {
                    party: "full-duplex",
                    waited_ms: timeout.as_millis() as u64,
                });
            }
            let slice = DUPLEX_WAIT_SLICE.min(deadline - now);
            let (guard, _) = self.cv.wait_timeout(arrived, slice).unwrap();
            arrived = guard;
        }
    }
}

/// One-shot predicate the reporter flips once its job list and rings are ready to
/// accept work; the launcher blocks on [`Self::wait_ready`] before spawning workers.
pub struct ReadyGate {
    ready: Mutex<bool>,
    cv: Condvar,
}

impl Default for ReadyGate {
    fn default() -> Self {
        Self::new()
    }
}

impl ReadyGate {
    pub fn new() -> Self {
        Self {
            ready: Mutex::new(false),
            cv: Condvar::new(),
        }
    }

    pub fn mark_ready(&self) {
        let mut ready = self.ready.lock().unwrap();
        *ready = true;
        self.cv.notify_all();
    }

    pub fn wait_ready(&self) {
        let mut ready = self.ready.lock().unwrap();
        while !*ready {
            ready = self.cv.wait(ready).unwrap();
        }
    }

    pub fn is_ready(&self) -> bool {
        *self.ready.lock().unwrap()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    #[test]
    fn connect_barrier_releases_all_parties() {
        let barrier = Arc::new(ConnectBarrier::new(3));
        let handles: Vec<_> = (0..2)
            .map(|_| {
                let b = Arc::clone(&barrier);
                thread::spawn(move || b.arrive())
            })
            .collect();
        thread::sleep(Duration::from_millis(20));
        barrier.arrive();
        for h in handles {
            h.join().unwrap();
        }
    }

    #[test]
    fn duplex_barrier_releases_both_parties() {
        let barrier = Arc::new(DuplexBarrier::new());
        let other = Arc::clone(&barrier);
        let handle = thread::spawn(move || other.arrive_and_wait(Duration::from_secs(5)));
        thread::sleep(Duration::from_millis(20));
        assert!(barrier.arrive_and_wait(Duration::from_secs(5)).is_ok());
        assert!(handle.join().unwrap().is_ok());
    }

    #[test]
    fn duplex_barrier_times_out_when_peer_never_arrives() {
        let barrier = DuplexBarrier::new();
        let err = barrier
            .arrive_and_wait(Duration::from_millis(50))
            .unwrap_err();
        assert!(matches!(err, CoreError::BarrierTimeout { .. }));
    }

    #[test]
    fn ready_gate_releases_waiters_once_marked() {
        let gate = Arc::new(ReadyGate::new());
        let waiter_gate = Arc::clone(&gate);
        let handle = thread::spawn(move || waiter_gate.wait_ready());
        thread::sleep(Duration::from_millis(10));
        assert!(!gate.is_ready());
        gate.mark_ready();
        handle.join().unwrap();
        assert!(gate.is_ready());
    }
}
