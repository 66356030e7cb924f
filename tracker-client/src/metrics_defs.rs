use shared::metrics_defs::{MetricDef, MetricType};

pub const TRACKING_REQUESTS: MetricDef = MetricDef {
    name: "tracker.requests",
    metric_type: MetricType::Counter,
    description: "Tracking submissions. Tagged with outcome (sent, rejected, failed, duplicate).",
};

pub const BUILD_FAILURES: MetricDef = MetricDef {
    name: "tracker.build_failures",
    metric_type: MetricType::Counter,
    description: "Tracking requests that could not be built. Tagged with kind.",
};

pub const ALL_METRICS: &[MetricDef] = &[TRACKING_REQUESTS, BUILD_FAILURES];
