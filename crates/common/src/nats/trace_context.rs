use async_nats::HeaderMap;
use opentelemetry::{global, propagation::Injector};
use tracing_opentelemetry::OpenTelemetrySpanExt;

struct NatsHeaderInjector<'a>(&'a mut HeaderMap);

impl Injector for NatsHeaderInjector<'_> {
    fn set(&mut self, key: &str, value: String) {
        self.0.insert(key, value.as_str());
    }
}

/// Write the current span's W3C trace context (`traceparent`, `tracestate`)
/// into outgoing NATS headers so subscribers can continue the trace.
pub fn inject_trace_context(headers: &mut HeaderMap) {
    global::get_text_map_propagator(|propagator| {
        let ctx = tracing::Span::current().context();
        propagator.inject_context(&ctx, &mut NatsHeaderInjector(headers));
    });
}
