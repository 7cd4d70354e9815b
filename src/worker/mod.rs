//! Traffic workers: the client-side send loops ([`client`]) and server-side receive
//! loops ([`server`]), plus the socket/ring/reporter plumbing both sides share.

pub mod client;
pub mod server;

use crate::barrier::{ConnectBarrier, DuplexBarrier};
use crate::error::{CoreError, CoreResult};
use crate::ring::PacketRing;
use crate::transfer::{FullDuplexInfo, GroupSumInfo};
use std::net::TcpStream;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Shared handle to the process-wide shutdown flag, flipped by the signal handler
/// installed in `main`. Every blocking loop checks this between iterations so a
/// SIGINT/SIGTERM/SIGQUIT unwinds flows instead of killing the process mid-write.
pub type ShutdownFlag = Arc<AtomicBool>;

/// Everything a flow needs to reach its peer and report back, independent of which
/// send/receive discipline it ends up running.
pub struct FlowContext {
    pub transfer_id: u64,
    pub prefix: String,
    pub buffer_len: usize,
    pub duration: Duration,
    pub ring: Arc<PacketRing>,
    pub connect_barrier: Option<Arc<ConnectBarrier>>,
    pub full_duplex: Option<Arc<FullDuplexInfo>>,
    pub group_sum: Option<Arc<GroupSumInfo>>,
    pub shutdown: ShutdownFlag,
}

impl FlowContext {
    pub fn is_shutting_down(&self) -> bool {
        self.shutdown.load(Ordering::Relaxed)
    }
}

/// Retries `TcpStream::connect` until it succeeds or `retry_window` elapses, backing
/// off by whatever is left of a 250ms retry timer (floored at 10ms) between attempts.
/// Records the elapsed wall-clock connect time on success.
pub fn my_connect_tcp(addr: &str, retry_window: Duration) -> CoreResult<(TcpStream, Duration)> {
    const RETRY_TIMER: Duration = Duration::from_millis(250);
    const MIN_BACKOFF: Duration = Duration::from_millis(10);

    let start = Instant::now();
    loop {
        match TcpStream::connect(addr) {
            Ok(stream) => return Ok((stream, start.elapsed())),
            Err(e) => {
                let elapsed = start.elapsed();
                if elapsed >= retry_window {
                    return Err(CoreError::Connect {
                        retried_for_ms: elapsed.as_millis() as u64,
                        source: e,
                    });
                }
                let backoff = RETRY_TIMER.saturating_sub(elapsed).max(MIN_BACKOFF);
                std::thread::sleep(backoff.min(retry_window - elapsed));
            }
        }
    }
}

/// Two-party barrier timeout used by `FinishTrafficActions`'s full-duplex stop wait.
pub const FULL_DUPLEX_STOP_TIMEOUT: Duration = Duration::from_secs(2);
/// Start-barrier timeout: generous since it only guards socket setup, not traffic.
pub const FULL_DUPLEX_START_TIMEOUT: Duration = Duration::from_secs(5);

/// Arms the full-duplex start barrier if this flow is one half of a duplex pair;
/// a no-op otherwise.
pub fn arm_full_duplex_start(full_duplex: Option<&Arc<FullDuplexInfo>>) -> CoreResult<()> {
    match full_duplex {
        Some(fd) => fd.start_barrier.arrive_and_wait(FULL_DUPLEX_START_TIMEOUT),
        None => Ok(()),
    }
}

pub fn arm_full_duplex_stop(full_duplex: Option<&Arc<FullDuplexInfo>>) -> CoreResult<()> {
    match full_duplex {
        Some(fd) => fd.stop_barrier.arrive_and_wait(FULL_DUPLEX_STOP_TIMEOUT),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::TcpListener;

    #[test]
    fn my_connect_tcp_succeeds_against_a_live_listener() {
        let listener = TcpListener::bind("127.0.0.1:0").unwrap();
        let addr = listener.local_addr().unwrap();
        let (stream, elapsed) =
            my_connect_tcp(&addr.to_string(), Duration::from_secs(1)).unwrap();
        assert!(stream.peer_addr().is_ok());
        assert!(elapsed < Duration::from_secs(1));
    }

    #[test]
    fn my_connect_tcp_times_out_against_a_dead_port() {
        // Port 1 is a reserved low port; connecting should fail fast enough that the
        // retry window expires rather than hanging.
        let err = my_connect_tcp("127.0.0.1:1", Duration::from_millis(50));
        assert!(err.is_err());
    }
}
