//! The reporter: a single thread that owns every flow's `TransferInfo`, drains every
//! flow's packet ring, and turns `PacketEvent`s into interval/final output.
//!
//! Mirrors the teacher's `log_receiver` consumer loop in spirit — one thread draining
//! a `crossbeam-channel` hand-off from N producers — generalized to the ring-based,
//! per-flow fan-in this domain needs. New flows (and one-shot records: connection,
//! settings, server-relay, string, error) arrive as [`PendingJob`]s over the channel;
//! `Data` jobs then live on an internal `root` list until their ring's sentinel has
//! been drained.

use crate::event::PacketEvent;
use crate::output::{OutputEvent, OutputSink, TransferInfoSnapshot};
use crate::ring::PacketRing;
use crate::transfer::{FullDuplexInfo, GroupSumInfo, ReportHeader, TransferInfo};
use crossbeam_channel::{Receiver, RecvTimeoutError, Sender};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

/// Floor on how many events the consumption detector drains per ring per cycle, even
/// with a single traffic worker.
const MINPACKETDEPTH: usize = 20;
/// Additional per-worker drain allowance folded into the same budget.
const MINPERQUEUEDEPTH: usize = 8;
/// Back-pressure sleep between reporter cycles once a full pass has drained.
const REPORTERDELAY: Duration = Duration::from_millis(16);
/// How long the reporter waits idle for new work before re-checking the live-thread
/// count, mirroring the "timed-wait 1s" main-loop rule.
const IDLE_WAIT: Duration = Duration::from_secs(1);
/// Global bound on the full-duplex stop barrier — matches `FinishTrafficActions`'s
/// "max(2s, test duration)" rule, floored at 2s here since the reporter doesn't know
/// the configured test duration.
const DUPLEX_STOP_TIMEOUT: Duration = Duration::from_secs(2);

/// A newly published flow, handed from a traffic worker to the reporter.
pub struct DataJobSpec {
    pub transfer_id: u64,
    pub ring: Arc<PacketRing>,
    pub info: TransferInfo,
    pub group_sum: Option<Arc<GroupSumInfo>>,
    pub full_duplex: Option<Arc<FullDuplexInfo>>,
}

pub enum PendingJob {
    NewData(DataJobSpec),
    OneShot(ReportHeader),
}

struct DataJob {
    ring: Arc<PacketRing>,
    info: Mutex<TransferInfo>,
    group_sum: Option<Arc<GroupSumInfo>>,
    full_duplex: Option<Arc<FullDuplexInfo>>,
    done: bool,
}

/// Handed to the launcher and every traffic worker: the write side of the reporter's
/// hand-off channel, plus the live-thread counter the main loop's exit condition
/// depends on.
#[derive(Clone)]
pub struct ReporterHandle {
    sender: Sender<PendingJob>,
    live_threads: Arc<AtomicUsize>,
}

impl ReporterHandle {
    pub fn publish_data(&self, spec: DataJobSpec) {
        let _ = self.sender.send(PendingJob::NewData(spec));
    }

    pub fn publish(&self, header: ReportHeader) {
        let _ = self.sender.send(PendingJob::OneShot(header));
    }

    /// Called once a traffic worker thread starts running; the reporter's exit
    /// condition depends on this count falling back below two.
    pub fn thread_started(&self) {
        self.live_threads.fetch_add(1, Ordering::AcqRel);
    }

    pub fn thread_stopped(&self) {
        self.live_threads.fetch_sub(1, Ordering::AcqRel);
    }
}

pub struct Reporter {
    receiver: Receiver<PendingJob>,
    live_threads: Arc<AtomicUsize>,
    root: Vec<DataJob>,
    sink: Box<dyn OutputSink>,
}

impl Reporter {
    pub fn new(sink: Box<dyn OutputSink>) -> (Self, ReporterHandle) {
        let (sender, receiver) = crossbeam_channel::unbounded();
        let live_threads = Arc::new(AtomicUsize::new(0));
        let handle = ReporterHandle {
            sender,
            live_threads: Arc::clone(&live_threads),
        };
        let reporter = Self {
            receiver,
            live_threads,
            root: Vec::new(),
            sink,
        };
        (reporter, handle)
    }

    /// Runs until the job list is empty and fewer than two user threads remain.
    /// Blocking entry point for the reporter thread.
    pub fn run(&mut self) {
        loop {
            self.absorb_pending();

            let accounted = MINPACKETDEPTH.max(self.root.len() * MINPERQUEUEDEPTH);
            self.drain_cycle(accounted);
            self.reap_finished();

            if self.root.is_empty() && self.live_threads.load(Ordering::Acquire) < 2 {
                if self.receiver.is_empty() {
                    break;
                }
                continue;
            }
            if accounted > 0 {
                std::thread::sleep(REPORTERDELAY);
            }
        }
    }

    fn absorb_pending(&mut self) {
        if self.root.is_empty() && self.live_threads.load(Ordering::Acquire) > 1 {
            match self.receiver.recv_timeout(IDLE_WAIT) {
                Ok(job) => self.absorb(job),
                Err(RecvTimeoutError::Timeout) => {}
                Err(RecvTimeoutError::Disconnected) => {}
            }
        }
        while let Ok(job) = self.receiver.try_recv() {
            self.absorb(job);
        }
    }

    fn absorb(&mut self, job: PendingJob) {
        match job {
            PendingJob::NewData(spec) => self.root.push(DataJob {
                ring: spec.ring,
                info: Mutex::new(spec.info),
                group_sum: spec.group_sum,
                full_duplex: spec.full_duplex,
                done: false,
            }),
            PendingJob::OneShot(header) => self.dispatch_one_shot(header),
        }
    }

    fn dispatch_one_shot(&mut self, header: ReportHeader) {
        match header {
            ReportHeader::Data { .. } => {}
            ReportHeader::Connection(c) => self.sink.handle(OutputEvent::Connection(c)),
            ReportHeader::Settings(s) => self.sink.handle(OutputEvent::Settings(s)),
            ReportHeader::ServerRelay(r) => self.sink.handle(OutputEvent::ServerRelay(r)),
            ReportHeader::String(s) => self.sink.handle(OutputEvent::Line(s)),
            ReportHeader::Error(e) => self.sink.handle(OutputEvent::Error(e)),
        }
    }

    fn drain_cycle(&mut self, accounted: usize) {
        for idx in 0..self.root.len() {
            let mut drained = 0;
            while drained < accounted {
                let ev = match self.root[idx].ring.dequeue() {
                    Some(ev) => ev,
                    None => break,
                };
                self.apply_event(idx, ev);
                drained += 1;
            }
        }
    }

    fn apply_event(&mut self, idx: usize, ev: PacketEvent) {
        if ev.is_sentinel() {
            self.finalize(idx);
            return;
        }

        let job = &self.root[idx];
        let mut info = job.info.lock().unwrap();
        info.ts.packet_time = ev.packet_time;
        if ev.err_kind.is_accountable() {
            info.totals.account(ev.len as i64, true);
        }
        info.packet_id = info.packet_id.max(ev.seq);
        if let Some(tally) = ev.loss_tally {
            info.totals.lost = tally.lost as i64;
            info.totals.out_of_order = tally.out_of_order as i64;
        }

        if ev.transit_ready {
            let transit_us = ev.packet_time.sub_usec(&ev.sent_time) as f64;
            info.record_transit(transit_us);
            if ev.frame_id != ev.prev_frame_id {
                info.note_frame_boundary();
            }
            info.record_jitter_sample(transit_us);
        }

        if info.ts.crosses_boundary() {
            let (i_start, i_end) = info.ts.advance();
            let snapshot = TransferInfoSnapshot::from_transfer_info(&info, i_start, i_end);
            let delta = snapshot.bytes_this_interval;
            info.reset_interval_accumulators();
            drop(info);

            self.sink.handle(OutputEvent::Data(Box::new(snapshot)));

            let job = &self.root[idx];
            if let Some(gs) = &job.group_sum {
                gs.enter_slot();
                let should_emit = gs.account_and_should_emit(delta);
                gs.leave_slot();
                if should_emit {
                    let total = gs.totals.lock().unwrap().bytes_current;
                    self.sink
                        .handle(OutputEvent::Line(format!("[SUM] {total} bytes")));
                }
            }
            if let Some(fd) = &job.full_duplex {
                fd.account(delta);
            }
        }
    }

    fn finalize(&mut self, idx: usize) {
        let job = &self.root[idx];
        let mut info = job.info.lock().unwrap();
        info.is_final = true;
        let (i_start, i_end) = (
            info.ts.prev_time.sub_usec(&info.ts.start_time),
            info.ts.packet_time.sub_usec(&info.ts.start_time),
        );
        let snapshot = TransferInfoSnapshot::from_transfer_info(&info, i_start, i_end);
        drop(info);

        self.sink.handle(OutputEvent::Data(Box::new(snapshot)));

        let job = &self.root[idx];
        if let Some(gs) = &job.group_sum {
            gs.release_member();
        }
        if let Some(fd) = &job.full_duplex {
            let _ = fd.stop_barrier.arrive_and_wait(DUPLEX_STOP_TIMEOUT);
            fd.release_member();
        }
        job.ring.signal_consumer_done();

        self.root[idx].done = true;
    }

    fn reap_finished(&mut self) {
        self.root.retain(|job| !job.done);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::Timestamp;
    use crate::event::ErrKind;
    use crate::output::OutputSink;
    use crate::transfer::{next_transfer_id, Role, Transport};
    use std::sync::{Arc, Mutex as StdMutex};

    struct CollectingSink(Arc<StdMutex<Vec<String>>>);
    impl OutputSink for CollectingSink {
        fn handle(&mut self, event: OutputEvent) {
            let mut log = self.0.lock().unwrap();
            match event {
                OutputEvent::Data(d) => log.push(format!("data:{}", d.bytes_total)),
                OutputEvent::Line(s) => log.push(format!("line:{s}")),
                _ => {}
            }
        }
    }

    #[test]
    fn drains_ring_and_finalizes_on_sentinel() {
        let events = Arc::new(StdMutex::new(Vec::new()));
        let (mut reporter, handle) = Reporter::new(Box::new(CollectingSink(Arc::clone(&events))));

        let ring = Arc::new(PacketRing::new(8));
        let info = TransferInfo::new(
            next_transfer_id(),
            "[ 1]",
            Role::Server,
            Transport::Udp,
            false,
            false,
            Timestamp::ZERO,
            10_000_000, // long interval so the test only sees the final line
        );
        handle.thread_started();
        handle.publish_data(DataJobSpec {
            transfer_id: 1,
            ring: Arc::clone(&ring),
            info,
            group_sum: None,
            full_duplex: None,
        });

        let mut ev = PacketEvent::blank(1, Timestamp::new(0, 500_000));
        ev.len = 1000;
        ev.err_kind = ErrKind::ReadSuccess;
        ring.enqueue(ev);
        ring.enqueue(PacketEvent::sentinel(Timestamp::new(0, 600_000)));
        handle.thread_stopped();

        reporter.run();

        ring.await_consumer_done();
        let log = events.lock().unwrap();
        assert!(log.iter().any(|l| l == "data:1000"));
    }

    struct LossCapturingSink(Arc<StdMutex<Vec<(i64, i64)>>>);
    impl OutputSink for LossCapturingSink {
        fn handle(&mut self, event: OutputEvent) {
            if let OutputEvent::Data(d) = event {
                self.0.lock().unwrap().push((d.lost, d.out_of_order));
            }
        }
    }

    #[test]
    fn loss_tally_reaches_totals() {
        let snapshots = Arc::new(StdMutex::new(Vec::new()));
        let (mut reporter, handle) = Reporter::new(Box::new(LossCapturingSink(Arc::clone(&snapshots))));

        let ring = Arc::new(PacketRing::new(8));
        let info = TransferInfo::new(
            next_transfer_id(),
            "[ 1]",
            Role::Server,
            Transport::Udp,
            false,
            false,
            Timestamp::ZERO,
            10_000_000, // long interval so the test only sees the final snapshot
        );
        handle.thread_started();
        handle.publish_data(DataJobSpec {
            transfer_id: 1,
            ring: Arc::clone(&ring),
            info,
            group_sum: None,
            full_duplex: None,
        });

        let mut ev = PacketEvent::blank(17, Timestamp::new(0, 500_000));
        ev.len = 1000;
        ev.err_kind = ErrKind::ReadSuccess;
        ev.loss_tally = Some(crate::event::LossTally { lost: 1, out_of_order: 2 });
        ring.enqueue(ev);
        ring.enqueue(PacketEvent::sentinel(Timestamp::new(0, 600_000)));
        handle.thread_stopped();

        reporter.run();
        ring.await_consumer_done();

        let final_snapshot = *snapshots.lock().unwrap().last().unwrap();
        assert_eq!(final_snapshot, (1, 2));
    }
}
