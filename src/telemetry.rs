//! OpenTelemetry and `tracing` initialization, keyed off [`cli::Args`].

use crate::cli::Args;
use opentelemetry::global as otel_global;
use opentelemetry::metrics::{Meter, MeterProvider as _};
use opentelemetry_otlp::WithExportConfig;
use opentelemetry_sdk::{metrics::SdkMeterProvider, runtime, trace as sdktrace, Resource};
use std::sync::OnceLock;
use tracing::{error, info};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Background Tokio runtime the OTLP batch span processor and periodic
/// metrics reader schedule their exports on. Built once and kept alive for
/// the process lifetime: the exporters hold only a `Handle`, so if this
/// runtime (and its worker threads) were ever dropped, every subsequent
/// export would silently stop being polled.
static OTEL_RUNTIME: OnceLock<tokio::runtime::Runtime> = OnceLock::new();

fn otel_runtime() -> &'static tokio::runtime::Runtime {
    OTEL_RUNTIME.get_or_init(|| {
        tokio::runtime::Builder::new_multi_thread()
            .worker_threads(1)
            .thread_name("otel-export")
            .enable_all()
            .build()
            .expect("failed to start OpenTelemetry export runtime")
    })
}

fn init_otel(args: &Args) -> Option<(SdkMeterProvider, sdktrace::Tracer, Meter)> {
    let otel_endpoint = args.otel_endpoint.as_ref()?;
    info!(endpoint = %otel_endpoint, "initializing OpenTelemetry exporter");

    // Entering the runtime makes its handle the ambient one for this
    // thread, so `install_batch`/`build` below spawn their background
    // export tasks onto `otel_runtime`'s worker pool instead of panicking
    // for lack of a reactor.
    let _guard = otel_runtime().enter();

    let trace_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(otel_endpoint);
    let trace_config = sdktrace::config().with_resource(Resource::new(vec![
        opentelemetry::KeyValue::new("service.name", "dispatch-core"),
        opentelemetry::KeyValue::new("service.version", env!("CARGO_PKG_VERSION")),
    ]));
    let tracer = opentelemetry_otlp::new_pipeline()
        .tracing()
        .with_exporter(trace_exporter)
        .with_trace_config(trace_config)
        .install_batch(runtime::Tokio)
        .map_err(|e| error!(error = %e, "failed to initialize OTLP trace pipeline"))
        .ok()?;

    let metrics_exporter = opentelemetry_otlp::new_exporter()
        .tonic()
        .with_endpoint(otel_endpoint);
    let meter_provider = opentelemetry_otlp::new_pipeline()
        .metrics(runtime::Tokio)
        .with_exporter(metrics_exporter)
        .build()
        .map_err(|e| error!(error = %e, "failed to initialize OTLP metrics pipeline"))
        .ok()?;

    otel_global::set_meter_provider(meter_provider.clone());
    let meter = otel_global::meter_provider().meter("dispatch-core");
    info!("OpenTelemetry exporter initialized");
    Some((meter_provider, tracer, meter))
}

/// Initializes the `tracing` subscriber (fmt layer + optional OTLP layer).
/// Returns the OTLP `Meter` when a metrics bridge endpoint was configured
/// and came up successfully; the executor/scheduler publish counters
/// through it when `Some`, and fall back to `tracing` events alone
/// otherwise.
pub fn init_tracing(args: &Args) -> Option<Meter> {
    let fmt_layer = fmt::layer()
        .with_writer(std::io::stderr)
        .with_target(args.verbose)
        .with_level(true);

    let filter = EnvFilter::try_new(&args.log_filter).unwrap_or_else(|e| {
        eprintln!("warning: invalid log filter '{}': {e}", args.log_filter);
        EnvFilter::new("dispatch_core=info")
    });

    let registry_base = tracing_subscriber::registry().with(fmt_layer).with(filter);

    let otel_meter = if let Some((_meter_provider, tracer, meter)) = init_otel(args) {
        let otel_layer = tracing_opentelemetry::layer().with_tracer(tracer);
        registry_base.with(otel_layer).init();
        Some(meter)
    } else {
        registry_base.init();
        None
    };

    info!(
        version = env!("CARGO_PKG_VERSION"),
        git_sha = option_env!("VERGEN_GIT_SHA").unwrap_or("unknown"),
        build_ts = env!("VERGEN_BUILD_TIMESTAMP"),
        "dispatch-core starting"
    );

    info!(
        lifecycle_key = %args.lifecycle_key,
        verbose = args.verbose,
        log_filter = %args.log_filter,
        otel_endpoint = %args.otel_endpoint.as_deref().unwrap_or("<none>"),
        "configuration loaded"
    );

    otel_meter
}
