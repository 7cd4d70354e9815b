//! Error taxonomy shared by the traffic workers and the reporter.
//!
//! Most per-packet faults are *accounted*, not propagated: they are folded into a
//! [`crate::event::ErrKind`] on the `PacketEvent` and handled by the reporter. `CoreError`
//! covers the faults that are fatal to a whole flow or to the process: failed connects,
//! barrier timeouts, and malformed wire headers.

use thiserror::Error;

/// Errors that abort a flow or a synchronization step outright.
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("connect failed after retrying for {retried_for_ms} ms: {source}")]
    Connect {
        retried_for_ms: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("fatal write error on flow {flow_id}: {source}")]
    FatalWrite {
        flow_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("fatal read error on flow {flow_id}: {source}")]
    FatalRead {
        flow_id: u64,
        #[source]
        source: std::io::Error,
    },

    #[error("client test header mismatch: expected {expected} bytes, read {got}")]
    HeaderMismatch { expected: usize, got: usize },

    #[error("barrier timeout waiting for {party} after {waited_ms} ms")]
    BarrierTimeout { party: &'static str, waited_ms: u64 },

    #[error("markov length description malformed: {0}")]
    MalformedMarkov(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

pub type CoreResult<T> = Result<T, CoreError>;

/// Non-fatal clock-synchronisation discrepancy observed during bounce-back accounting.
///
/// Not part of [`CoreError`] because it is *counted, not fatal* per the error-handling
/// design: a flow keeps running after one of these, it just increments a counter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClockSyncError;
