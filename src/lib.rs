//! Library crate backing the `netprobe` binary: end-to-end TCP/UDP throughput, loss,
//! jitter, one-way-delay and connect-latency measurement.

pub mod barrier;
pub mod cli;
pub mod clock;
pub mod config;
pub mod error;
pub mod event;
pub mod isoch;
pub mod launcher;
pub mod markov;
pub mod output;
pub mod reporter;
pub mod ring;
pub mod stats;
pub mod telemetry;
pub mod transfer;
pub mod util;
pub mod wire;
pub mod worker;
