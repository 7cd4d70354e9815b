//! OpenTelemetry and Tracing initialization logic.

use crate::config::Settings;
use opentelemetry::global as otel_global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, runtime, trace as sdktrace, Resource};
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Environment variable naming an OTLP collector endpoint. There is no CLI flag for
/// this: the socket-option/export surface the spec disclaims stays out of `Cli`, but an
/// operator can still point traces/metrics at a collector without a code change.
const OTEL_ENDPOINT_VAR: &str = "NETPROBE_OTEL_ENDPOINT";

fn init_otel(endpoint: &str) -> Option<(SdkMeterProvider, sdktrace::Tracer, Meter)> {
    info!(endpoint = %endpoint, "Initializing OpenTelemetry exporter...");

    let trace_exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint);
    let trace_config = sdktrace::config().with_resource(Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", "netprobe-core"),
        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]));
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(trace_exporter)
        .with_trace_config(trace_config)
        .install_batch(runtime::TokioCurrentThread)
        .map_err(|e| error!(error = %e, "Failed to initialize OTLP trace pipeline"))
        .ok()?;

    let metrics_exporter = opentelemetry_otlp::new_exporter().tonic().with_endpoint(endpoint);
    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::TokioCurrentThread)
        .with_exporter(metrics_exporter)
        .build()
        .map_err(|e| error!(error = %e, "Failed to initialize OTLP metrics pipeline"))
        .ok()?;

    otel_global::set_meter_provider(meter_provider.clone());
    let meter = otel_global::meter_provider().meter("netprobe-core");
    info!("OpenTelemetry exporter initialized successfully.");
    Some((meter_provider, tracer, meter))
}

/// Initializes the tracing subscriber (fmt layer + optional OTLP layer) and returns the
/// OTLP `Meter` if `NETPROBE_OTEL_ENDPOINT` was set and the exporter came up.
pub fn init_tracing(settings: &Settings) -> Option<Meter> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(settings.verbose)
        .with_level(true);

    let default_filter = if settings.verbose { "netprobe_core=debug" } else { "netprobe_core=info" };
    let directive = settings.log_filter.as_deref().unwrap_or(default_filter);
    let filter = EnvFilter::try_new(directive).unwrap_or_else(|e| {
        eprintln!("Warning: invalid log filter '{directive}': {e}");
        EnvFilter::new(default_filter)
    });

    let registry_base = tracing_subscriber::registry().with(fmt_layer).with(filter);

    let otel_meter = match std::env::var(OTEL_ENDPOINT_VAR).ok() {
        Some(endpoint) => match init_otel(&endpoint) {
            Some((_provider, tracer, meter)) => {
                let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
                registry_base.with(otel_layer).init();
                Some(meter)
            }
            None => {
                registry_base.init();
                None
            }
        },
        None => {
            registry_base.init();
            None
        }
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA_SHORT").unwrap_or("unknown"),
        build_ts = env!("VERGEN_BUILD_TIMESTAMP"),
        "netprobe starting"
    );

    info!(
        role = ?settings.role,
        transport = ?settings.transport,
        duration = %crate::util::format_duration(settings.duration),
        interval = %crate::util::format_duration(settings.interval),
        flows = settings.flows,
        full_duplex = settings.full_duplex,
        json = settings.json,
        "configuration loaded"
    );

    otel_meter
}
