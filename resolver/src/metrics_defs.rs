//! Metrics definitions for the resolver.

use shared::metrics_defs::{MetricDef, MetricType};

pub const REQUEST_DURATION: MetricDef = MetricDef {
    name: "request.duration",
    metric_type: MetricType::Histogram,
    description: "Lookup request duration in seconds. Tagged with endpoint, outcome.",
};

pub const FALLBACK_INVOKED: MetricDef = MetricDef {
    name: "pipeline.fallback.invoked",
    metric_type: MetricType::Counter,
    description: "Number of fallback lookups performed. Tagged with stage.",
};

pub const FALLBACK_FAILED: MetricDef = MetricDef {
    name: "pipeline.fallback.failed",
    metric_type: MetricType::Counter,
    description: "Number of fallback lookups that failed and were skipped. Tagged with stage.",
};

pub const OVERRIDE_APPLIED: MetricDef = MetricDef {
    name: "pipeline.override.applied",
    metric_type: MetricType::Counter,
    description: "Number of resolved emails replaced by a curated override. Tagged with key.",
};

pub const OVERRIDE_REFRESH: MetricDef = MetricDef {
    name: "overrides.refresh",
    metric_type: MetricType::Counter,
    description: "Number of successful override dataset refreshes",
};

pub const OVERRIDE_REFRESH_FAILED: MetricDef = MetricDef {
    name: "overrides.refresh.failed",
    metric_type: MetricType::Counter,
    description: "Number of override dataset refreshes that failed",
};

pub const OVERRIDE_ROWS: MetricDef = MetricDef {
    name: "overrides.rows",
    metric_type: MetricType::Histogram,
    description: "Number of usable rows in the override dataset, per successful refresh",
};

pub const EVENT_DELIVERY_FAILED: MetricDef = MetricDef {
    name: "events.delivery.failed",
    metric_type: MetricType::Counter,
    description: "Number of webhook events that could not be delivered",
};

pub const ALL_METRICS: &[MetricDef] = &[
    REQUEST_DURATION,
    FALLBACK_INVOKED,
    FALLBACK_FAILED,
    OVERRIDE_APPLIED,
    OVERRIDE_REFRESH,
    OVERRIDE_REFRESH_FAILED,
    OVERRIDE_ROWS,
    EVENT_DELIVERY_FAILED,
];
