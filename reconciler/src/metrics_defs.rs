//! Metrics definitions for the reconciler.

use shared::metrics_defs::{MetricDef, MetricType};

pub const PASS_DURATION: MetricDef = MetricDef {
    name: "reconcile.pass.duration",
    metric_type: MetricType::Histogram,
    description: "Time to complete a reconciliation pass in seconds",
};

pub const KEYS_DISCOVERED: MetricDef = MetricDef {
    name: "reconcile.keys.discovered",
    metric_type: MetricType::Gauge,
    description: "Number of distinct keys found across all cache nodes in the last pass",
};

pub const DISCOVERY_NODE_FAILED: MetricDef = MetricDef {
    name: "reconcile.discovery.node_failed",
    metric_type: MetricType::Counter,
    description: "Number of cache nodes whose keys could not be enumerated",
};

pub const KEY_NOT_FOUND: MetricDef = MetricDef {
    name: "reconcile.key.not_found",
    metric_type: MetricType::Counter,
    description: "Number of keys missing from every cache node at fetch time",
};

pub const KEY_DECODE_FAILED: MetricDef = MetricDef {
    name: "reconcile.key.decode_failed",
    metric_type: MetricType::Counter,
    description: "Number of cached values that could not be decoded",
};

pub const DELIVERY_ACCEPTED: MetricDef = MetricDef {
    name: "reconcile.delivery.accepted",
    metric_type: MetricType::Counter,
    description: "Number of incidents and links accepted by the API",
};

pub const DELIVERY_REJECTED: MetricDef = MetricDef {
    name: "reconcile.delivery.rejected",
    metric_type: MetricType::Counter,
    description: "Number of incidents and links rejected by the API",
};

pub const DELIVERY_TRANSPORT_FAILED: MetricDef = MetricDef {
    name: "reconcile.delivery.transport_failed",
    metric_type: MetricType::Counter,
    description: "Number of deliveries that failed before the API answered",
};

pub const KEY_DELETE_FAILED: MetricDef = MetricDef {
    name: "reconcile.key.delete_failed",
    metric_type: MetricType::Counter,
    description: "Number of accepted keys that could not be removed from the cache",
};

pub const ALL_METRICS: &[MetricDef] = &[
    PASS_DURATION,
    KEYS_DISCOVERED,
    DISCOVERY_NODE_FAILED,
    KEY_NOT_FOUND,
    KEY_DECODE_FAILED,
    DELIVERY_ACCEPTED,
    DELIVERY_REJECTED,
    DELIVERY_TRANSPORT_FAILED,
    KEY_DELETE_FAILED,
];
