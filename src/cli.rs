use clap::{Parser, ValueEnum};

/// A TCP/UDP throughput, loss, jitter and one-way-delay measurement tool.
#[derive(Parser, Debug, Clone)]
#[command(
    author,
    version,
    about,
    long_about = "Measures end-to-end TCP/UDP throughput, loss, jitter, one-way-delay and \
connect latency between a client and a server.\n\
\n\
EXAMPLES:\n\
  # Start a server listening on the default port:\n\
  netprobe --role server\n\
\n\
  # Run a 10s TCP client test against it:\n\
  netprobe --role client --host 127.0.0.1 --duration 10\n\
\n\
  # Run an isochronous UDP client test with 4 parallel flows:\n\
  netprobe --role client --host 127.0.0.1 --transport udp --mode udp-isochronous --flows 4\n\
\n\
  # TCP bounce-back (round-trip latency) client test:\n\
  netprobe --role client --host 127.0.0.1 --mode tcp-bounce-back --request-size 64 --reply-size 64"
)]
pub struct Cli {
    /// Whether this process is the client (initiates connections) or the server
    /// (accepts them).
    #[arg(long, value_enum, default_value = "client")]
    pub role: RoleArg,

    /// Transport to measure over.
    #[arg(long, value_enum, default_value = "tcp")]
    pub transport: TransportArg,

    /// Send/receive shaping discipline. The server has no live test-header negotiation
    /// in this core, so a server process must be launched with the same `--mode` and
    /// `--transport` as its client peer.
    #[arg(long, value_enum, default_value = "unconstrained")]
    pub mode: ModeArg,

    /// Server hostname or address to connect to (client only).
    #[arg(long, default_value = "127.0.0.1")]
    pub host: String,

    /// TCP/UDP port to connect to or listen on.
    #[arg(long, default_value = "5201")]
    pub port: u16,

    /// Test duration in seconds (client only; the server runs until its peer's FIN).
    #[arg(short = 't', long, default_value = "10")]
    pub duration: u64,

    /// Number of parallel flows (client only).
    #[arg(short = 'P', long, default_value = "1")]
    pub flows: u32,

    /// Reporting interval in seconds.
    #[arg(short = 'i', long, default_value = "1")]
    pub interval: u64,

    /// Read/write buffer length in bytes.
    #[arg(short = 'l', long, default_value = "131072")]
    pub buffer_len: u32,

    /// Run the reverse flow alongside the forward one over the same socket pair.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub full_duplex: bool,

    /// Target rate for `tcp-rate-limited`, in bits per second.
    #[arg(long, default_value = "1000000000")]
    pub rate_bps: u64,

    /// Datagrams per burst for `udp-burst` and bursty TCP modes.
    #[arg(long, default_value = "8")]
    pub burst_size: u32,

    /// Frames per second for `udp-isochronous`.
    #[arg(long, default_value = "60")]
    pub fps: f64,

    /// Mean frame size in bytes for `udp-isochronous`.
    #[arg(long, default_value = "12500")]
    pub isoch_mean: f64,

    /// Frame size variance for `udp-isochronous`.
    #[arg(long, default_value = "2000")]
    pub isoch_variance: f64,

    /// Request size in bytes for `tcp-bounce-back`.
    #[arg(long, default_value = "64")]
    pub request_size: u32,

    /// Reply size in bytes for `tcp-bounce-back`.
    #[arg(long, default_value = "64")]
    pub reply_size: u32,

    /// Maximum TCP bursts allowed in flight for `tcp-near-congestion`.
    #[arg(long, default_value = "4")]
    pub max_in_flight_bursts: u32,

    /// Path to a Markov variable-length-generator description (e.g.
    /// `steady:1438` or a `len,weight;len,weight` chain). Leave unset for fixed-length
    /// payloads.
    #[arg(long)]
    pub markov_lengths: Option<String>,

    /// Connection retry window in seconds before a client gives up dialing the server.
    #[arg(long, default_value = "5")]
    pub connect_retry: u64,

    /// Emit machine-readable JSON lines instead of human-readable text.
    #[arg(long, action = clap::ArgAction::SetTrue)]
    pub json: bool,

    /// Increase log verbosity (passed through to `tracing`'s target filtering).
    #[arg(short = 'v', long, action = clap::ArgAction::SetTrue)]
    pub verbose: bool,

    /// `tracing_subscriber::EnvFilter` directive string; overrides `--verbose` when set.
    #[arg(long)]
    pub log_filter: Option<String>,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoleArg {
    Client,
    Server,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum TransportArg {
    Tcp,
    Udp,
}

#[derive(ValueEnum, Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModeArg {
    Unconstrained,
    TcpRateLimited,
    TcpNearCongestion,
    TcpWriteEvents,
    TcpBounceBack,
    UdpIsochronous,
    UdpBurst,
    UdpL4s,
}

pub fn parse_args() -> Cli {
    Cli::parse()
}
