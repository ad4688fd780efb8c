//! Metrics definitions for the reconciler.

use shared::metrics_defs::{MetricDef, MetricType};

pub const API_REQUESTS: MetricDef = MetricDef {
    name: "api.requests",
    metric_type: MetricType::Counter,
    description: "Number of API requests, labelled by method and status class",
};

pub const API_REQUEST_DURATION: MetricDef = MetricDef {
    name: "api.request.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete an API request in seconds",
};

pub const PAGINATION_PAGES: MetricDef = MetricDef {
    name: "pagination.pages",
    metric_type: MetricType::Histogram,
    description: "Number of pages fetched by one list traversal",
};

pub const RECONCILE_OPERATIONS: MetricDef = MetricDef {
    name: "reconcile.operations",
    metric_type: MetricType::Counter,
    description: "Number of lifecycle operations, labelled by resource kind and operation",
};

pub const PATCH_FIELDS: MetricDef = MetricDef {
    name: "reconcile.patch.fields",
    metric_type: MetricType::Histogram,
    description: "Number of attributes sent in an update",
};

pub const ALL_METRICS: &[MetricDef] = &[
    API_REQUESTS,
    API_REQUEST_DURATION,
    PAGINATION_PAGES,
    RECONCILE_OPERATIONS,
    PATCH_FIELDS,
];
