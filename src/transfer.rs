//! Reporter-owned per-flow and per-group state: [`TransferInfo`], [`GroupSumInfo`],
//! [`FullDuplexInfo`], and the [`ReportHeader`] job-list entry that ties a `PacketEvent`
//! stream back to the `TransferInfo` it belongs to.

use crate::barrier::DuplexBarrier;
use crate::clock::Timestamp;
use crate::stats::RunningStats;
use crate::wire::ServerRelayReport;
use std::sync::atomic::{AtomicI64, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Role {
    Client,
    Server,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Transport {
    Tcp,
    Udp,
}

/// Cumulative-vs-delta byte/datagram counters the reporter resets at every interval
/// boundary while keeping the running total.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Totals {
    pub bytes_current: i64,
    pub bytes_prev: i64,
    pub datagrams: i64,
    pub out_of_order: i64,
    pub lost: i64,
    pub ipg_sum_us: i64,
    pub tx_bytes: i64,
    pub rx_bytes: i64,
}

impl Totals {
    /// Bytes transferred since the last interval boundary.
    pub fn delta_bytes(&self) -> i64 {
        self.bytes_current - self.bytes_prev
    }

    /// Folds one event's accounted bytes/datagrams in, without touching `bytes_prev`
    /// (the reporter advances that only at an interval boundary).
    pub fn account(&mut self, bytes: i64, is_datagram: bool) {
        self.bytes_current += bytes;
        if is_datagram {
            self.datagrams += 1;
        }
    }

    pub fn advance_interval(&mut self) {
        self.bytes_prev = self.bytes_current;
    }
}

/// Wall-clock bookkeeping for a `TransferInfo`'s interval timer.
#[derive(Debug, Clone, Copy)]
pub struct IntervalTimestamps {
    pub start_time: Timestamp,
    pub next_time: Timestamp,
    pub prev_time: Timestamp,
    pub prev_packet_time: Timestamp,
    pub packet_time: Timestamp,
    pub interval_time_us: i64,
    pub omit_time: Timestamp,
    pub next_tcp_sample_time: Timestamp,
}

impl IntervalTimestamps {
    pub fn new(start_time: Timestamp, interval_time_us: i64) -> Self {
        Self {
            start_time,
            next_time: start_time.add_usec(interval_time_us),
            prev_time: start_time,
            prev_packet_time: start_time,
            packet_time: start_time,
            interval_time_us,
            omit_time: start_time,
            next_tcp_sample_time: start_time,
        }
    }

    /// Whether `packet_time` has crossed the next scheduled interval boundary.
    pub fn crosses_boundary(&self) -> bool {
        self.packet_time.sub_usec(&self.next_time) > 0
    }

    /// Advances `prev_time`/`next_time` by one interval and returns the closed
    /// `(i_start, i_end)` window in microseconds since `start_time`.
    pub fn advance(&mut self) -> (i64, i64) {
        let i_start = self.prev_time.sub_usec(&self.start_time);
        self.prev_time = self.next_time;
        let i_end = self.prev_time.sub_usec(&self.start_time);
        self.next_time = self.next_time.add_usec(self.interval_time_us);
        (i_start, i_end)
    }
}

/// Isochronous/burst bookkeeping folded into a `TransferInfo`.
#[derive(Debug, Clone, Copy, Default)]
pub struct IsochStats {
    pub frame_count: u64,
    pub slip_count: u64,
    pub burst_count: u64,
}

/// One-way-delay and RTT accumulators specific to bounce-back flows.
#[derive(Debug, Clone, Copy, Default)]
pub struct BounceBackStats {
    pub rtt: RunningStats,
    pub owd_to: RunningStats,
    pub owd_from: RunningStats,
    pub asymmetry: RunningStats,
    pub clock_sync_errors: u64,
}

/// Per-flow state, created by the worker before it publishes its first job and from
/// then on mutated only by the reporter thread.
pub struct TransferInfo {
    pub transfer_id: u64,
    pub prefix: String,
    pub role: Role,
    pub transport: Transport,
    pub reverse: bool,
    pub full_duplex: bool,

    pub ts: IntervalTimestamps,
    pub totals: Totals,

    pub transit_current: RunningStats,
    pub transit_total: RunningStats,
    pub jitter_current: RunningStats,
    pub jitter_total: RunningStats,
    /// RFC 1889 running jitter estimate (not a `RunningStats` — it's a single
    /// exponentially-weighted value, not a distribution).
    pub jitter_estimate_us: f64,
    pub last_transit_us: Option<f64>,

    pub isoch: IsochStats,
    pub bb: BounceBackStats,
    /// Jitter deltas left to suppress because the last packet applied started a new
    /// isochronous frame. Set to 2 on a frame change, decremented (not reset) by
    /// [`TransferInfo::record_jitter_sample`] so exactly the first two `ΔD` of each
    /// frame are dropped from the estimator.
    frame_jitter_suppress: u8,

    pub packet_id: i64,
    pub is_final: bool,
    pub is_mask_output: bool,
    pub omit: bool,
}

impl TransferInfo {
    pub fn new(
        transfer_id: u64,
        prefix: impl Into<String>,
        role: Role,
        transport: Transport,
        reverse: bool,
        full_duplex: bool,
        start_time: Timestamp,
        interval_time_us: i64,
    ) -> Self {
        Self {
            transfer_id,
            prefix: prefix.into(),
            role,
            transport,
            reverse,
            full_duplex,
            ts: IntervalTimestamps::new(start_time, interval_time_us),
            totals: Totals::default(),
            transit_current: RunningStats::new(),
            transit_total: RunningStats::new(),
            jitter_current: RunningStats::new(),
            jitter_total: RunningStats::new(),
            jitter_estimate_us: 0.0,
            last_transit_us: None,
            isoch: IsochStats::default(),
            bb: BounceBackStats::default(),
            frame_jitter_suppress: 0,
            packet_id: 0,
            is_final: false,
            is_mask_output: false,
            omit: false,
        }
    }

    /// Folds one transit-time (one-way-delay) sample into both the per-interval and
    /// running accumulators.
    pub fn record_transit(&mut self, transit_us: f64) {
        self.transit_current.update(transit_us);
        self.transit_total.update(transit_us);
    }

    /// Marks that the next call to [`Self::record_jitter_sample`] starts a new
    /// isochronous frame: its `ΔD`, and the one after it, are dropped from the
    /// estimator so a frame's own size/pacing jump doesn't register as jitter.
    pub fn note_frame_boundary(&mut self) {
        self.frame_jitter_suppress = 2;
    }

    /// RFC 1889 jitter recurrence: `J += (|D| - J) / 16`, applied to the delta between
    /// successive transit times. The very first sample only seeds `last_transit_us` —
    /// jitter has no meaning from a single sample. The first two samples after
    /// [`Self::note_frame_boundary`] still update `last_transit_us` (so the delta
    /// after them is measured correctly) but are not folded into `J`.
    pub fn record_jitter_sample(&mut self, transit_us: f64) {
        if let Some(last) = self.last_transit_us {
            if self.frame_jitter_suppress > 0 {
                self.frame_jitter_suppress -= 1;
            } else {
                let d = (transit_us - last).abs();
                self.jitter_estimate_us += (d - self.jitter_estimate_us) / 16.0;
                self.jitter_current.update(self.jitter_estimate_us);
                self.jitter_total.update(self.jitter_estimate_us);
            }
        }
        self.last_transit_us = Some(transit_us);
    }

    /// Resets the per-interval Welford accumulators and `Bytes.prev`/isoch deltas at
    /// an interval boundary. The running totals (`*_total`) are untouched.
    pub fn reset_interval_accumulators(&mut self) {
        self.transit_current.reset();
        self.jitter_current.reset();
        self.totals.advance_interval();
    }
}

/// Reference-counted aggregate over every flow sharing one logical identity (e.g. all
/// parallel threads of one `-P4` client). `up`/`down` track how many member flows have
/// advanced past the current interval boundary but not yet entered the next; their
/// difference must always equal that count.
pub struct GroupSumInfo {
    members: AtomicUsize,
    slot_up: AtomicUsize,
    slot_down: AtomicUsize,
    /// How many members have folded their delta into `totals` for the interval
    /// currently being closed. Wraps back to zero (via subtraction) once it reaches
    /// `member_count()`, so the counter never has to know which round it is in.
    interval_arrivals: AtomicUsize,
    pub totals: Mutex<Totals>,
}

impl GroupSumInfo {
    pub fn new(initial_members: usize) -> Arc<Self> {
        Arc::new(Self {
            members: AtomicUsize::new(initial_members),
            slot_up: AtomicUsize::new(0),
            slot_down: AtomicUsize::new(0),
            interval_arrivals: AtomicUsize::new(0),
            totals: Mutex::new(Totals::default()),
        })
    }

    pub fn member_count(&self) -> usize {
        self.members.load(Ordering::Acquire)
    }

    /// A member flow has crossed into the next interval slot.
    pub fn enter_slot(&self) {
        self.slot_up.fetch_add(1, Ordering::AcqRel);
    }

    /// A member flow has finished emitting the previous interval slot.
    pub fn leave_slot(&self) {
        self.slot_down.fetch_add(1, Ordering::AcqRel);
    }

    /// Invariant: `slot_up - slot_down` equals members currently inside the window
    /// between having advanced past the boundary and having emitted for it.
    pub fn in_flight(&self) -> usize {
        self.slot_up
            .load(Ordering::Acquire)
            .saturating_sub(self.slot_down.load(Ordering::Acquire))
    }

    /// Folds one member's delta bytes into the sum for the interval currently being
    /// closed; returns `true` exactly once per interval, for whichever member happens
    /// to be the `member_count()`-th to arrive — every other caller gets `false`.
    pub fn account_and_should_emit(&self, delta_bytes: i64) -> bool {
        let mut totals = self.totals.lock().unwrap();
        totals.bytes_current += delta_bytes;
        drop(totals);

        let count = self.member_count().max(1);
        let arrived = self.interval_arrivals.fetch_add(1, Ordering::AcqRel) + 1;
        if arrived >= count {
            self.interval_arrivals.fetch_sub(count, Ordering::AcqRel);
            true
        } else {
            false
        }
    }

    /// Decrements the live-member count when a flow tears down; returns `true` if this
    /// was the last member (the group-sum report itself can now be freed).
    pub fn release_member(&self) -> bool {
        self.members.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

/// Exactly two flows sharing one full-duplex socket pair, with a combined totals
/// block and the two barriers gating coordinated start/stop.
pub struct FullDuplexInfo {
    pub start_barrier: DuplexBarrier,
    pub stop_barrier: DuplexBarrier,
    pub combined: Mutex<Totals>,
    members_remaining: AtomicUsize,
}

impl FullDuplexInfo {
    pub fn new() -> Arc<Self> {
        Arc::new(Self {
            start_barrier: DuplexBarrier::new(),
            stop_barrier: DuplexBarrier::new(),
            combined: Mutex::new(Totals::default()),
            members_remaining: AtomicUsize::new(2),
        })
    }

    pub fn account(&self, delta_bytes: i64) {
        self.combined.lock().unwrap().bytes_current += delta_bytes;
    }

    /// Returns `true` once both member flows have torn down.
    pub fn release_member(&self) -> bool {
        self.members_remaining.fetch_sub(1, Ordering::AcqRel) == 1
    }
}

#[derive(Debug, Clone)]
pub struct ConnectionReport {
    pub transfer_id: u64,
    pub local_addr: String,
    pub peer_addr: String,
    pub connect_time_ms: f64,
}

#[derive(Debug, Clone)]
pub struct SettingsReport {
    pub transfer_id: u64,
    pub description: String,
}

/// A job-list entry: ties a `PacketEvent` stream (via `transfer_id`) back to the kind
/// of record the reporter should apply it to. `Data` entries stay linked on the job
/// list until the ring they reference reports itself empty and sentinel-closed;
/// the others are printed once and unlinked immediately.
pub enum ReportHeader {
    Data {
        transfer_id: u64,
    },
    Connection(ConnectionReport),
    Settings(SettingsReport),
    ServerRelay(ServerRelayReport),
    String(String),
    Error(String),
}

static NEXT_TRANSFER_ID: AtomicI64 = AtomicI64::new(1);

/// Allocates a process-unique transfer id for a new `TransferInfo`.
pub fn next_transfer_id() -> u64 {
    NEXT_TRANSFER_ID.fetch_add(1, Ordering::Relaxed) as u64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interval_timestamps_advance_by_one_period() {
        let mut ts = IntervalTimestamps::new(Timestamp::ZERO, 1_000_000);
        ts.packet_time = Timestamp::new(1, 500_000);
        assert!(ts.crosses_boundary());
        let (start, end) = ts.advance();
        assert_eq!(start, 0);
        assert_eq!(end, 1_000_000);
        assert_eq!(ts.next_time, Timestamp::new(2, 0));
    }

    #[test]
    fn jitter_recurrence_matches_closed_form() {
        let mut info = TransferInfo::new(
            1,
            "[ 1]",
            Role::Server,
            Transport::Udp,
            false,
            false,
            Timestamp::ZERO,
            1_000_000,
        );
        let transits = [100.0, 120.0, 90.0, 150.0];
        let mut expected_j = 0.0f64;
        let mut last = None;
        for &t in &transits {
            info.record_jitter_sample(t);
            if let Some(prev) = last {
                let d: f64 = (t - prev as f64).abs();
                expected_j += (d - expected_j) / 16.0;
                assert!((info.jitter_estimate_us - expected_j).abs() < 1e-9);
            }
            last = Some(t);
        }
    }

    #[test]
    fn group_sum_tracks_in_flight_members() {
        let group = GroupSumInfo::new(3);
        group.enter_slot();
        group.enter_slot();
        assert_eq!(group.in_flight(), 2);
        group.leave_slot();
        assert_eq!(group.in_flight(), 1);
    }

    #[test]
    fn group_sum_emits_once_per_interval_across_members() {
        let group = GroupSumInfo::new(4);
        let mut emits = 0;
        for _ in 0..4 {
            if group.account_and_should_emit(100) {
                emits += 1;
            }
        }
        assert_eq!(emits, 1);
        assert_eq!(group.totals.lock().unwrap().bytes_current, 400);

        // Next interval round behaves the same way.
        let mut emits = 0;
        for _ in 0..4 {
            if group.account_and_should_emit(50) {
                emits += 1;
            }
        }
        assert_eq!(emits, 1);
    }

    #[test]
    fn frame_boundary_suppresses_first_two_jitter_deltas() {
        let mut info = TransferInfo::new(
            1,
            "[ 1]",
            Role::Server,
            Transport::Udp,
            false,
            false,
            Timestamp::ZERO,
            1_000_000,
        );
        info.record_jitter_sample(100.0);
        info.note_frame_boundary();
        // These two deltas belong to the new frame and must not move the estimate.
        info.record_jitter_sample(100_000.0);
        info.record_jitter_sample(200.0);
        assert_eq!(info.jitter_estimate_us, 0.0);

        // The delta after the suppressed pair is folded in normally.
        info.record_jitter_sample(210.0);
        assert!(info.jitter_estimate_us > 0.0);
    }

    #[test]
    fn full_duplex_releases_after_both_members() {
        let fd = FullDuplexInfo::new();
        assert!(!fd.release_member());
        assert!(fd.release_member());
    }

    #[test]
    fn transfer_ids_are_unique_and_monotone() {
        let a = next_transfer_id();
        let b = next_transfer_id();
        assert!(b > a);
    }
}
