use anyhow::{Context, Result};
use clap::{CommandFactory, Parser};
use clap_complete::{generate, Shell};
use clap_complete_nushell::Nushell;
use clap_mangen::Man;
use netprobe_core::cli::Cli;

use std::io::Write;
use std::{
    env, fs,
    path::{Path, PathBuf},
    process::Command,
};

#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct XtaskArgs {
    #[command(subcommand)]
    command: Commands,
}

#[derive(clap::Subcommand, Debug)]
enum Commands {
    /// Generate man page and shell completions.
    GenerateDocs,
    /// Run cargo check.
    Check,
    /// Run cargo test.
    Test,
    /// Run cargo clippy.
    Clippy,
    /// Run cargo fmt --check.
    FmtCheck,
}

fn main() -> Result<()> {
    let args = XtaskArgs::parse();

    match args.command {
        Commands::GenerateDocs => generate_docs().context("Failed to generate docs"),
        Commands::Check => run_cargo("check", &[]).context("cargo check failed"),
        Commands::Test => run_cargo("test", &[]).context("cargo test failed"),
        Commands::Clippy => {
            run_cargo("clippy", &["--", "-D", "warnings"]).context("cargo clippy failed")
        }
        Commands::FmtCheck => run_cargo("fmt", &["--", "--check"]).context("cargo fmt failed"),
    }
}

fn run_cargo(command: &str, args: &[&str]) -> Result<()> {
    let cargo = env::var("CARGO").unwrap_or_else(|_| "cargo".to_string());
    let mut cmd = Command::new(cargo);
    cmd.arg(command);
    cmd.args(args);
    // Run in the workspace root
    cmd.current_dir(project_root());

    let status = cmd
        .status()
        .context(format!("Failed to execute cargo {command}"))?;

    if !status.success() {
        anyhow::bail!("cargo {command} command failed");
    }
    Ok(())
}

fn project_root() -> PathBuf {
    Path::new(&env!("CARGO_MANIFEST_DIR"))
        .ancestors()
        .nth(1)
        .unwrap()
        .to_path_buf()
}

fn generate_docs() -> Result<()> {
    let root_dir = project_root();
    let docs_dir = root_dir.join("docs");
    let man_dir = docs_dir.join("man");
    let completions_dir = docs_dir.join("completions");

    fs::create_dir_all(&man_dir).context("Failed to create man directory")?;
    fs::create_dir_all(&completions_dir).context("Failed to create completions directory")?;

    let cmd = Cli::command();
    let bin_name = "netprobe".to_string();

    // --- Generate Man Page ---
    let man_path = man_dir.join(format!("{bin_name}.1"));
    println!("Generating man page: {man_path:?}");
    generate_man_page(&cmd, &bin_name, &man_path)?;

    // --- Generate Shell Completions ---
    generate_completions(&cmd, &bin_name, &completions_dir)?;

    println!(
        "Successfully generated man page and completions in: {}",
        docs_dir.display()
    );
    Ok(())
}

// --- Man Page Content Constants ---
// Note: Using roff formatting. \fB...\fR = bold, \fI...\fR = italic, \- = hyphen, \(bu = bullet

// clap_mangen generates the DESCRIPTION section from the command's about/long_about.

const MAN_DISCIPLINES: &str = r#"
.B Client send disciplines (\-\-mode)
.PP
Selects how the client shapes its send pattern; the server must be launched with a
matching \fB\-\-mode\fR/\fB\-\-transport\fR, since this core has no live test-header
negotiation of the receive side.
.IP \(bu 4
\fBunconstrained\fR \- writes as fast as the socket (TCP) or a connected datagram
socket (UDP) will accept, back to back for the whole test duration.
.IP \(bu 4
\fBtcp\-rate\-limited\fR \- paces writes to a target \fB\-\-rate\-bps\fR.
.IP \(bu 4
\fBtcp\-near\-congestion\fR \- caps the number of bursts in flight
(\fB\-\-max\-in\-flight\-bursts\fR) to probe near the bottleneck without saturating it.
.IP \(bu 4
\fBtcp\-write\-events\fR \- records one event per individual \fBwrite(2)\fR call instead
of per burst, for fine-grained write-latency analysis.
.IP \(bu 4
\fBtcp\-bounce\-back\fR \- round-trip request/reply latency: client sends
\fB\-\-request\-size\fR bytes, server replies with \fB\-\-reply\-size\fR bytes.
.IP \(bu 4
\fBudp\-isochronous\fR \- emits frames at \fB\-\-fps\fR with a lognormal size
distribution (\fB\-\-isoch\-mean\fR/\fB\-\-isoch\-variance\fR), modeling a video stream.
.IP \(bu 4
\fBudp\-burst\fR \- sends \fB\-\-burst\-size\fR datagrams back to back, then an
inter-burst gap derived from \fB\-\-fps\fR.
.IP \(bu 4
\fBudp\-l4s\fR \- tags datagrams for ECN/L4S marking observation and tracks CE-marked
counts in the reply.
"#;

const MAN_EXAMPLES: &str = r#"
.PP
.B Start a server:
.IP
.nf
{bin_name} \-\-role server
.fi
.PP
.B Run a 10s TCP client test against it:
.IP
.nf
{bin_name} \-\-role client \-\-host 127.0.0.1 \-\-duration 10
.fi
.PP
.B Isochronous UDP test with 4 parallel flows:
.IP
.nf
{bin_name} \-\-role client \-\-host 127.0.0.1 \-\-transport udp \-\-mode udp\-isochronous \-\-flows 4
.fi
.PP
.B TCP bounce\-back (round\-trip latency) test:
.IP
.nf
{bin_name} \-\-role client \-\-host 127.0.0.1 \-\-mode tcp\-bounce\-back \-\-request\-size 64 \-\-reply\-size 64
.fi
.PP
.B Full\-duplex test (forward and reverse flow over one socket pair):
.IP
.nf
{bin_name} \-\-role client \-\-host 127.0.0.1 \-\-full\-duplex
.fi
"#;

const MAN_LOGGING: &str = r#"
\fB{bin_name}\fR logs to standard error via the \fBtracing\fR framework; per-interval
and final transfer reports go to standard output (or are interleaved into the same
JSON stream with \fB\-\-json\fR).
.PP
.B Log Flags:
.IP "\fB\-\-verbose\fR" 4
Raises the default filter to debug level.
.IP "\fB\-\-log\-filter\fR" 4
A full \fBtracing_subscriber::EnvFilter\fR directive string; overrides \fB\-\-verbose\fR
when set.
.PP
.B Environment Variable: RUST_LOG
.IP
\fBRUST_LOG\fR follows \fBtracing_subscriber::EnvFilter\fR syntax and, if set, is
honoured the same way \fB\-\-log\-filter\fR is.
.PP
.B Environment Variable: NETPROBE_OTEL_ENDPOINT
.IP
When set to an OTLP collector endpoint, traces and metrics are additionally exported
over gRPC. There is no corresponding CLI flag; the socket-option/export surface this
controls is intentionally kept out of the command line.
"#;

const MAN_SIGNALS: &str = r#"
\fB{bin_name}\fR handles the following signals to request a clean, prompt shutdown:
.IP \(bu 4
SIGINT (Interrupt, typically Ctrl+C)
.IP \(bu 4
SIGTERM (Termination signal)
.IP \(bu 4
SIGQUIT (Quit signal)
.PP
On receipt, every running flow's send/receive loop checks the shared shutdown flag
between iterations and winds down (closing its socket, emitting its final report)
instead of running until \fB\-\-duration\fR elapses or being killed mid-transfer.
"#;

const MAN_EXIT_STATUS: &str = r#"
.IP 0 4
Success. Every flow completed (by duration, by a handled signal, or because its peer
closed the connection) and its final report was printed.
.IP 1 4
Runtime error: a failed connect after retrying, a fatal socket I/O error, a malformed
wire header from a peer, or a full-duplex start/stop barrier timeout.
"#;

const MAN_ENVIRONMENT: &str = r#"
.TP
.B RUST_LOG
Controls logging verbosity and filtering; see the LOGGING section.
.TP
.B NETPROBE_OTEL_ENDPOINT
OTLP collector endpoint for trace/metric export; see the LOGGING section.
.TP
.B RUST_BACKTRACE
Set to \fB1\fR or \fBfull\fR to enable backtraces on panic.
"#;

const MAN_BUGS: &str = r#"
Please report bugs, issues, or feature requests via the project's issue tracker.
"#;

const MAN_SEE_ALSO: &str = r#"
\fBiperf\fR(1), \fBiperf3\fR(1), \fBtc\fR(8), \fBss\fR(8)
"#;

/// Generates the man page with custom sections.
fn generate_man_page(cmd: &clap::Command, bin_name: &str, path: &Path) -> Result<()> {
    let version = env!("CARGO_PKG_VERSION");
    let date = chrono::Local::now().format("%B %d, %Y").to_string();
    let app_name_uppercase = bin_name.to_uppercase();

    let mut buffer: Vec<u8> = Vec::new();

    // Render the standard sections (NAME, SYNOPSIS, DESCRIPTION, OPTIONS, AUTHOR) using
    // clap_mangen. It doesn't include the .TH header automatically, so add it first.
    writeln!(
        buffer,
        r#".TH "{app_name_uppercase}" 1 "{date}" "{version}" "User Commands""#
    )?;
    Man::new(cmd.clone()).render(&mut buffer)?;

    let custom_sections = [
        ("DISCIPLINES", MAN_DISCIPLINES),
        ("EXAMPLES", MAN_EXAMPLES),
        ("LOGGING", MAN_LOGGING),
        ("SIGNALS", MAN_SIGNALS),
        ("EXIT STATUS", MAN_EXIT_STATUS),
        ("ENVIRONMENT", MAN_ENVIRONMENT),
        ("BUGS", MAN_BUGS),
        ("SEE ALSO", MAN_SEE_ALSO),
    ];

    for (title, content_template) in custom_sections {
        writeln!(buffer, ".SH {title}")?;
        let formatted_content = content_template.replace("{bin_name}", bin_name);
        writeln!(buffer, "{formatted_content}")?;
    }

    fs::write(path, buffer).with_context(|| format!("Failed to write man page to {path:?}"))?;
    Ok(())
}

/// Generates shell completion files.
fn generate_completions(cmd: &clap::Command, bin_name: &str, completions_dir: &Path) -> Result<()> {
    let shells = [
        Shell::Bash,
        Shell::Elvish,
        Shell::Fish,
        Shell::PowerShell,
        Shell::Zsh,
    ];

    for shell in shells {
        let ext = match shell {
            Shell::Bash => "bash",
            Shell::Elvish => "elv",
            Shell::Fish => "fish",
            Shell::PowerShell => "ps1",
            Shell::Zsh => "zsh",
            _ => continue,
        };
        let completions_path = completions_dir.join(format!("{bin_name}.{ext}"));
        println!("Generating completion file: {completions_path:?}");
        let mut file = fs::File::create(&completions_path)
            .with_context(|| format!("Failed to create completion file: {completions_path:?}"))?;
        generate(shell, &mut cmd.clone(), bin_name, &mut file);
    }

    let nu_path = completions_dir.join(format!("{bin_name}.nu"));
    println!("Generating Nushell completion file: {nu_path:?}");
    let mut nu_file = fs::File::create(&nu_path)
        .with_context(|| format!("Failed to create Nushell completion file: {nu_path:?}"))?;
    generate(Nushell, &mut cmd.clone(), bin_name, &mut nu_file);

    Ok(())
}
