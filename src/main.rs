//! Binary entry point: parses the CLI, wires the reporter and its output sink,
//! installs the signal-handling thread, and drives the launcher until every flow has
//! finished or a signal asked for early shutdown.

use netprobe_core::barrier::ReadyGate;
use netprobe_core::cli;
use netprobe_core::config::Settings;
use netprobe_core::launcher;
use netprobe_core::output::{ConsoleSink, JsonSink, OutputSink};
use netprobe_core::reporter::Reporter;
use netprobe_core::telemetry;
use signal_hook::consts::signal::{SIGINT, SIGQUIT, SIGTERM};
use signal_hook::iterator::Signals;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;

fn main() -> ExitCode {
    let cli = cli::parse_args();
    let settings = Settings::from(&cli);
    let _otel_meter = telemetry::init_tracing(&settings);

    let sink: Box<dyn OutputSink> = if settings.json {
        Box::new(JsonSink)
    } else {
        Box::new(ConsoleSink)
    };
    let (mut reporter, handle) = Reporter::new(sink);
    let reporter_handle = thread::spawn(move || reporter.run());

    let ready = ReadyGate::new();
    ready.mark_ready();

    let shutdown: Arc<AtomicBool> = Arc::new(AtomicBool::new(false));
    if let Err(e) = spawn_signal_thread(Arc::clone(&shutdown)) {
        tracing::warn!(error = %e, "failed to install signal handler, Ctrl-C will not shut down gracefully");
    }

    let result = launcher::run(&settings, handle, &ready, Arc::clone(&shutdown));

    if let Err(e) = reporter_handle.join() {
        tracing::error!(panic = ?e, "reporter thread panicked");
    }

    match result {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "netprobe exiting with an error");
            ExitCode::FAILURE
        }
    }
}

/// Mirrors the teacher's dedicated signal-handling thread: one `Signals::forever()`
/// iterator, first SIGTERM/SIGINT/SIGQUIT flips the shared flag every blocking loop
/// polls between iterations.
fn spawn_signal_thread(shutdown: Arc<AtomicBool>) -> std::io::Result<()> {
    let mut signals = Signals::new([SIGTERM, SIGINT, SIGQUIT])?;
    thread::spawn(move || {
        if let Some(sig) = signals.forever().next() {
            tracing::warn!(signal = sig, "received signal, shutting down");
            shutdown.store(true, Ordering::SeqCst);
        }
    });
    Ok(())
}
