//! OTel internals: OTLP tracing layer and sampling.

use opentelemetry::trace::{
    Link, SamplingDecision, SamplingResult, SpanKind, TraceContextExt, TraceId, TraceState,
    TracerProvider as _,
};
use opentelemetry::{Context, KeyValue, global};
use opentelemetry_otlp::SpanExporter;
use opentelemetry_sdk::Resource;
use opentelemetry_sdk::trace::{Sampler, SdkTracerProvider, ShouldSample, SpanLimits};
use tracing_opentelemetry::OpenTelemetryLayer;

use crate::TelemetryError;

/// Shuts down the OTel tracer provider on drop, flushing pending spans.
pub struct OtelGuard {
    provider: SdkTracerProvider,
}

impl Drop for OtelGuard {
    fn drop(&mut self) {
        if let Err(e) = self.provider.shutdown() {
            eprintln!("OTel shutdown error: {e}");
        }
    }
}

/// Build an OpenTelemetry tracing layer and guard.
///
/// Must be called inside a Tokio runtime: the batch span processor and the
/// tonic channel both spawn onto it.
pub fn otel_layer<S>(
    service_name: &str,
) -> Result<(OpenTelemetryLayer<S, opentelemetry_sdk::trace::SdkTracer>, OtelGuard), TelemetryError>
where
    S: tracing::Subscriber + for<'span> tracing_subscriber::registry::LookupSpan<'span>,
{
    tokio::runtime::Handle::try_current()
        .map_err(|e| TelemetryError::Exporter(format!("no tokio runtime: {e}")))?;

    let exporter = SpanExporter::builder()
        .with_tonic()
        .build()
        .map_err(|e| TelemetryError::Exporter(e.to_string()))?;

    let resource = Resource::builder()
        .with_service_name(service_name.to_string())
        .build();

    let provider = SdkTracerProvider::builder()
        .with_batch_exporter(exporter)
        .with_sampler(HonyakuSampler)
        .with_resource(resource)
        .with_span_limits(SpanLimits::default())
        .build();

    global::set_tracer_provider(provider.clone());

    let tracer = provider.tracer("honyaku");
    let layer = tracing_opentelemetry::layer().with_tracer(tracer);

    Ok((layer, OtelGuard { provider }))
}

/// Sampling rate by span-name prefix; first match wins.
///
/// `relay.*` spans (`relay.hub.handle`, `relay.session`) cover one page
/// command or upstream exchange each, so all are kept. `host.frame` fires
/// per stdio frame.
const PREFIX_RATES: &[(&str, f64)] = &[("relay", 1.0), ("host", 0.01)];
const DEFAULT_RATE: f64 = 0.1;

fn rate_for(name: &str) -> f64 {
    PREFIX_RATES
        .iter()
        .find(|(prefix, _)| name.starts_with(prefix))
        .map_or(DEFAULT_RATE, |(_, rate)| *rate)
}

fn is_error(attributes: &[KeyValue]) -> bool {
    attributes.iter().any(|kv| match kv.key.as_str() {
        "otel.status_code" => kv.value.as_str() == "ERROR",
        "error" => kv.value.as_str() == "true",
        _ => false,
    })
}

/// Keeps sampled traces whole, always records errors, and otherwise samples
/// by [`rate_for`].
#[derive(Debug, Clone)]
struct HonyakuSampler;

impl ShouldSample for HonyakuSampler {
    fn should_sample(
        &self,
        parent_context: Option<&Context>,
        trace_id: TraceId,
        name: &str,
        span_kind: &SpanKind,
        attributes: &[KeyValue],
        links: &[Link],
    ) -> SamplingResult {
        let parent_state = parent_context
            .map(|cx| cx.span().span_context().clone())
            .filter(|sc| sc.is_sampled())
            .map(|sc| sc.trace_state().clone());

        if let Some(trace_state) = parent_state.or_else(|| is_error(attributes).then(TraceState::default)) {
            return SamplingResult {
                decision: SamplingDecision::RecordAndSample,
                attributes: Vec::new(),
                trace_state,
            };
        }

        Sampler::TraceIdRatioBased(rate_for(name))
            .should_sample(parent_context, trace_id, name, span_kind, attributes, links)
    }
}
