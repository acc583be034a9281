//! HTTP request/response tracing middleware.

use tower_http::LatencyUnit;
use tower_http::classify::{ServerErrorsAsFailures, SharedClassifier};
use tower_http::trace::{DefaultMakeSpan, DefaultOnResponse, TraceLayer};
use tracing::Level;

/// Request span at `INFO` with method, URI and version; the response is
/// logged at `INFO` with status and latency in milliseconds.
///
/// Health probes hit this often, so the span is created at `DEBUG` when
/// `quiet` is set.
pub fn layer(quiet: bool) -> TraceLayer<SharedClassifier<ServerErrorsAsFailures>> {
    let level = if quiet { Level::DEBUG } else { Level::INFO };

    TraceLayer::new_for_http()
        .make_span_with(DefaultMakeSpan::new().level(level))
        .on_response(
            DefaultOnResponse::new()
                .level(level)
                .latency_unit(LatencyUnit::Millis),
        )
}
