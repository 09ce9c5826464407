//! Statistics collector that records sequence spans through the `metrics` facade.
//!
//! Nothing is exported unless the hosting process installs a recorder.

use conduit_core::{StatisticsCollector, StatisticsSpan};

/// Histogram of span durations, in seconds.
pub const SPAN_DURATION_SECONDS: &str = "conduit_span_duration_seconds";
/// Counter of reported spans.
pub const SPAN_TOTAL: &str = "conduit_span_total";

/// Reports each span as a duration histogram sample and a counter increment,
/// labelled by name, kind, direction, and outcome.
#[derive(Debug, Clone, Copy, Default)]
pub struct MetricsCollector;

impl MetricsCollector {
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

fn direction(span: &StatisticsSpan) -> &'static str {
    if span.inbound {
        "in"
    } else {
        "out"
    }
}

fn outcome(span: &StatisticsSpan) -> &'static str {
    if span.fault {
        "fault"
    } else {
        "ok"
    }
}

impl StatisticsCollector for MetricsCollector {
    fn report_span(&self, span: &StatisticsSpan) {
        let labels = [
            ("name", span.name.clone()),
            ("kind", span.kind.as_str().to_string()),
            ("direction", direction(span).to_string()),
            ("outcome", outcome(span).to_string()),
        ];
        metrics::histogram!(SPAN_DURATION_SECONDS, &labels).record(span.duration().as_secs_f64());
        metrics::counter!(SPAN_TOTAL, &labels).increment(1);
        tracing::trace!(
            name = %span.name,
            kind = span.kind.as_str(),
            duration_secs = span.duration().as_secs_f64(),
            "span reported"
        );
    }
}
