//! Common types for metrics definitions.

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MetricType {
    Counter,
    Gauge,
    Histogram,
}

#[derive(Debug, Clone, Copy)]
pub struct MetricDef {
    pub name: &'static str,
    pub metric_type: MetricType,
    pub description: &'static str,
}

/// Registers the description of every metric with the installed recorder.
/// Should be called once, after the recorder is set.
pub fn describe_all(defs: &[MetricDef]) {
    for def in defs {
        match def.metric_type {
            MetricType::Counter => metrics::describe_counter!(def.name, def.description),
            MetricType::Gauge => metrics::describe_gauge!(def.name, def.description),
            MetricType::Histogram => metrics::describe_histogram!(def.name, def.description),
        }
    }
}

#[macro_export]
macro_rules! counter {
    ($def:expr) => {
        metrics::counter!($def.name)
    };
}

#[macro_export]
macro_rules! gauge {
    ($def:expr) => {
        metrics::gauge!($def.name)
    };
}

#[macro_export]
macro_rules! histogram {
    ($def:expr) => {
        metrics::histogram!($def.name)
    };
}

#[cfg(test)]
mod tests {
    use super::*;

    const DEFS: &[MetricDef] = &[
        MetricDef {
            name: "test.counter",
            metric_type: MetricType::Counter,
            description: "A counter",
        },
        MetricDef {
            name: "test.histogram",
            metric_type: MetricType::Histogram,
            description: "A histogram",
        },
    ];

    #[test]
    fn test_describe_without_recorder() {
        // No recorder installed, descriptions are discarded.
        describe_all(DEFS);
        counter!(DEFS[0]).increment(1);
        histogram!(DEFS[1]).record(1.0);
    }
}
