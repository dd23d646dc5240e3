use std::time::Duration;

use opentelemetry::{KeyValue, global};
use opentelemetry_appender_tracing::layer::OpenTelemetryTracingBridge;
use opentelemetry_otlp::{self, Protocol, WithExportConfig};
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::logs::SdkLoggerProvider;
use opentelemetry_sdk::metrics::SdkMeterProvider;
use opentelemetry_sdk::trace::SdkTracerProvider;
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use crate::util::env::Env;

pub type Result<T> = core::result::Result<T, Box<dyn std::error::Error>>;

/// Console logging, plus OTLP export of logs/traces/metrics when a collector is configured.
#[derive(Debug, Clone)]
pub struct Telemetry {
    pub tracer_name: String,
    pub collector_url: Option<String>,
    log_filter: String,
    providers: Option<Providers>,
}

#[derive(Debug, Clone)]
struct Providers {
    logger: SdkLoggerProvider,
    tracer: SdkTracerProvider,
    meter: SdkMeterProvider,
}

impl Telemetry {
    pub fn new(env: &Env) -> Result<Telemetry> {
        let collector_url = env.otel_exporter_otlp_endpoint.clone();

        let providers = match collector_url.as_deref() {
            Some(url) => {
                let resource = service_resource(&env.api_service_name);

                Some(Providers {
                    logger: build_logger_provider(url, resource.clone())?,
                    tracer: build_tracer_provider(url, resource.clone())?,
                    meter: build_meter_provider(url, resource)?,
                })
            }
            None => None,
        };

        Ok(Self {
            tracer_name: env.api_tracer_name.clone(),
            collector_url,
            log_filter: env.log_filter.clone(),
            providers,
        })
    }

    pub fn register(self) -> Self {
        let (trace_layer, log_layer, meter_layer) = match &self.providers {
            Some(p) => {
                global::set_tracer_provider(p.tracer.clone());
                let tracer = global::tracer(self.tracer_name.clone());

                (
                    Some(tracing_opentelemetry::layer().with_tracer(tracer)),
                    Some(OpenTelemetryTracingBridge::new(&p.logger)),
                    Some(tracing_opentelemetry::MetricsLayer::new(p.meter.clone())),
                )
            }
            None => (None, None, None),
        };

        tracing_subscriber::registry()
            .with(trace_layer)
            .with(log_layer)
            .with(meter_layer)
            .with(EnvFilter::new(&self.log_filter))
            .with(
                tracing_subscriber::fmt::layer()
                    .with_target(true)
                    .with_thread_ids(true)
                    .with_line_number(true),
            )
            .init();

        if self.collector_url.is_none() {
            tracing::info!("no otlp collector configured, logging to console only");
        }

        self
    }

    pub fn shutdown(self) {
        let Some(providers) = self.providers else {
            return;
        };

        // the subscriber may already be exporting into these providers, so report on stderr
        let results = [
            ("meter", providers.meter.shutdown()),
            ("logger", providers.logger.shutdown()),
            ("tracer", providers.tracer.shutdown()),
        ];
        for (provider, result) in results {
            if let Err(e) = result {
                eprintln!("otlp {provider} provider shutdown failed: {e:?}");
            }
        }
    }
}

/// OTLP/gRPC export deadline shared by all three signals.
const EXPORT_TIMEOUT: Duration = Duration::from_secs(5);

// gRPC collectors take the bare endpoint; the `/v1/<signal>` paths are an OTLP/HTTP concern
macro_rules! grpc_exporter {
    ($exporter:ty, $collector_url:expr) => {
        <$exporter>::builder()
            .with_tonic()
            .with_protocol(Protocol::Grpc)
            .with_endpoint($collector_url)
            .with_timeout(EXPORT_TIMEOUT)
            .build()
    };
}

fn build_logger_provider(collector_url: &str, resource: Resource) -> Result<SdkLoggerProvider> {
    let exporter = grpc_exporter!(opentelemetry_otlp::LogExporter, collector_url)?;
    Ok(SdkLoggerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn build_tracer_provider(collector_url: &str, resource: Resource) -> Result<SdkTracerProvider> {
    let exporter = grpc_exporter!(opentelemetry_otlp::SpanExporter, collector_url)?;
    Ok(SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn build_meter_provider(collector_url: &str, resource: Resource) -> Result<SdkMeterProvider> {
    let exporter = grpc_exporter!(opentelemetry_otlp::MetricExporter, collector_url)?;
    Ok(SdkMeterProvider::builder()
        .with_periodic_exporter(exporter)
        .with_resource(resource)
        .build())
}

fn service_resource(name: &str) -> Resource {
    Resource::builder()
        .with_service_name(name.to_owned())
        .with_attributes([KeyValue::new("service.version", env!("CARGO_PKG_VERSION"))])
        .build()
}
