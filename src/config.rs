//! Settings: the `Cli`-derived configuration the launcher and workers actually consume.
//! Every pass-through socket knob the CLI could in principle expose (affinity, DSCP,
//! congestion-control algorithm name, ...) stays out of this struct entirely rather than
//! being carried as a field the core never inspects.

use crate::cli::{Cli, ModeArg, RoleArg, TransportArg};
use crate::transfer::{Role, Transport};
use crate::worker::client::ClientDiscipline;
use crate::worker::server::ServerDiscipline;
use std::time::Duration;

#[derive(Clone, Debug)]
pub struct Settings {
    pub role: Role,
    pub transport: Transport,
    pub host: String,
    pub port: u16,
    pub duration: Duration,
    pub flows: u32,
    pub interval: Duration,
    pub buffer_len: usize,
    pub full_duplex: bool,
    pub connect_retry: Duration,
    pub markov_lengths: Option<String>,
    pub json: bool,
    pub verbose: bool,
    pub log_filter: Option<String>,
    pub discipline: ModeArg,
    pub rate_bps: u64,
    pub burst_size: u32,
    pub fps: f64,
    pub isoch_mean: f64,
    pub isoch_variance: f64,
    pub request_size: u32,
    pub reply_size: u32,
    pub max_in_flight_bursts: u32,
}

impl From<&Cli> for Settings {
    fn from(a: &Cli) -> Self {
        Self {
            role: match a.role {
                RoleArg::Client => Role::Client,
                RoleArg::Server => Role::Server,
            },
            transport: match a.transport {
                TransportArg::Tcp => Transport::Tcp,
                TransportArg::Udp => Transport::Udp,
            },
            host: a.host.clone(),
            port: a.port,
            duration: Duration::from_secs(a.duration),
            flows: a.flows.max(1),
            interval: Duration::from_secs(a.interval.max(1)),
            buffer_len: a.buffer_len as usize,
            full_duplex: a.full_duplex,
            connect_retry: Duration::from_secs(a.connect_retry),
            markov_lengths: a.markov_lengths.clone(),
            json: a.json,
            verbose: a.verbose,
            log_filter: a.log_filter.clone(),
            discipline: a.mode,
            rate_bps: a.rate_bps,
            burst_size: a.burst_size,
            fps: a.fps,
            isoch_mean: a.isoch_mean,
            isoch_variance: a.isoch_variance,
            request_size: a.request_size,
            reply_size: a.reply_size,
            max_in_flight_bursts: a.max_in_flight_bursts,
        }
    }
}

impl Settings {
    /// Builds the client-side send discipline this configuration selects. Only
    /// meaningful when `role == Role::Client`.
    pub fn client_discipline(&self) -> ClientDiscipline {
        match (self.transport, self.discipline) {
            (Transport::Tcp, ModeArg::TcpRateLimited) => ClientDiscipline::TcpRateLimited {
                rate_bps: self.rate_bps,
            },
            (Transport::Tcp, ModeArg::TcpNearCongestion) => ClientDiscipline::TcpNearCongestion {
                max_in_flight_bursts: self.max_in_flight_bursts,
            },
            (Transport::Tcp, ModeArg::TcpWriteEvents) => ClientDiscipline::TcpWriteEvents,
            (Transport::Tcp, ModeArg::TcpBounceBack) => ClientDiscipline::TcpBounceBack {
                request_size: self.request_size,
                reply_size: self.reply_size,
                burst: self.burst_size,
            },
            (Transport::Tcp, _) => ClientDiscipline::TcpUnconstrained,
            (Transport::Udp, ModeArg::UdpIsochronous) => ClientDiscipline::UdpIsochronous {
                fps: self.fps,
                mean: self.isoch_mean,
                variance: self.isoch_variance,
            },
            (Transport::Udp, ModeArg::UdpBurst) => ClientDiscipline::UdpBurst {
                burst_size: self.burst_size,
                ipg: Duration::from_micros(1_000_000 / self.fps.max(1.0) as u64),
            },
            (Transport::Udp, ModeArg::UdpL4s) => ClientDiscipline::UdpL4s,
            (Transport::Udp, _) => ClientDiscipline::UdpUnconstrained,
        }
    }

    /// Builds the server-side receive discipline matching this configuration. The
    /// server has no live test-header negotiation in this core, so it must be launched
    /// with the same `--mode`/`--transport` as its client peer.
    pub fn server_discipline(&self) -> ServerDiscipline {
        match (self.transport, self.discipline) {
            (Transport::Tcp, ModeArg::TcpBounceBack) => {
                ServerDiscipline::TcpBounceBack { reply_size: self.reply_size }
            }
            (Transport::Tcp, _) => ServerDiscipline::Tcp,
            (Transport::Udp, ModeArg::UdpL4s) => ServerDiscipline::UdpL4s,
            (Transport::Udp, _) => ServerDiscipline::Udp,
        }
    }

    pub fn interval_us(&self) -> i64 {
        self.interval.as_micros() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::Parser;

    #[test]
    fn client_discipline_follows_transport_and_mode() {
        let cli = Cli::parse_from(["netprobe", "--transport", "udp", "--mode", "udp-isochronous"]);
        let settings = Settings::from(&cli);
        assert!(matches!(
            settings.client_discipline(),
            ClientDiscipline::UdpIsochronous { .. }
        ));
    }

    #[test]
    fn defaults_to_tcp_unconstrained() {
        let cli = Cli::parse_from(["netprobe"]);
        let settings = Settings::from(&cli);
        assert!(matches!(
            settings.client_discipline(),
            ClientDiscipline::TcpUnconstrained
        ));
    }
}
