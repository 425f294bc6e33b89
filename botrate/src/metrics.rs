use opentelemetry::KeyValue;
use opentelemetry::global;
use opentelemetry::metrics::Counter;

#[derive(Clone, Debug)]
pub(crate) struct LimiterMetrics {
    decisions: Counter<u64>,
}

impl LimiterMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("botrate");
        Self {
            decisions: meter
                .u64_counter("botrate.decisions")
                .with_description("Admission decisions by outcome")
                .build(),
        }
    }

    pub(crate) fn decision(&self, outcome: &'static str) {
        self.decisions.add(1, &[KeyValue::new("outcome", outcome)]);
    }
}

#[derive(Clone, Debug)]
pub(crate) struct AnalyzerMetrics {
    dropped: Counter<u64>,
    blocked: Counter<u64>,
    rotations: Counter<u64>,
}

impl AnalyzerMetrics {
    pub(crate) fn new() -> Self {
        let meter = global::meter("botrate");
        Self {
            dropped: meter
                .u64_counter("botrate.analyzer.dropped")
                .with_description("Observations dropped because the queue was full")
                .build(),
            blocked: meter
                .u64_counter("botrate.analyzer.blocked")
                .with_description("Clients promoted to the blocklist")
                .build(),
            rotations: meter.u64_counter("botrate.analyzer.rotations").build(),
        }
    }

    pub(crate) fn dropped(&self) {
        self.dropped.add(1, &[]);
    }

    pub(crate) fn blocked(&self) {
        self.blocked.add(1, &[]);
    }

    pub(crate) fn rotated(&self) {
        self.rotations.add(1, &[]);
    }
}
