use std::{
    borrow::Cow,
    sync::{Arc, LazyLock},
};

use opentelemetry::{
    global,
    metrics::{Counter, Gauge, Histogram},
    Key, KeyValue, StringValue, Value,
};

/// Central metrics singleton for pool metrics.
pub(crate) static POOL_METRICS: LazyLock<Arc<Metrics>> =
    LazyLock::new(|| Arc::new(Metrics::new()));

const KEY_POOL_NAME: Key = Key::from_static_str("resource.pool.name");
const KEY_STATE: Key = Key::from_static_str("resource.state");

/// Storage for pool metrics.
pub(crate) struct Metrics {
    /// The number of resources that are currently in state described by the state attribute.
    pub(crate) res_count: Gauge<u64>,
    /// The time it took to obtain a resource from the pool.
    pub(crate) wait_time: Histogram<f64>,
    /// The time between borrowing a resource and returning it to the pool.
    pub(crate) use_time: Histogram<f64>,
    /// The time it took the factory to create a new resource.
    pub(crate) create_time: Histogram<f64>,
    /// The number of failed resource creations.
    pub(crate) create_errors: Counter<u64>,
    /// The number of resources destroyed after being reported unusable.
    pub(crate) discarded: Counter<u64>,
    /// The maximum number of resources allowed.
    pub(crate) res_max: Gauge<u64>,
}

impl Metrics {
    /// Create new storage for pool metrics.
    ///
    /// You probably don't need this, as all pools use a central metrics singleton for storage.
    pub(crate) fn new() -> Self {
        let meter = global::meter("rasterize-pools");
        // resource.pool.name (string)
        // resource.state (idle / used / creating / total)
        let res_count = meter
            .u64_gauge("resource.pool.count")
            .with_description(
                "The number of resources that are currently in state described by the state attribute.",
            )
            .build();
        // resource.pool.name (string)
        let wait_time = meter
            .f64_histogram("resource.pool.wait_time")
            .with_unit("s")
            .with_description("The time it took to obtain a resource from the pool.")
            .build();
        // resource.pool.name (string)
        let use_time = meter
            .f64_histogram("resource.pool.use_time")
            .with_unit("s")
            .with_description("The time between borrowing a resource and returning it to the pool.")
            .build();
        // resource.pool.name (string)
        let create_time = meter
            .f64_histogram("resource.pool.create_time")
            .with_unit("s")
            .with_description("The time it took the factory to create a new resource.")
            .build();
        // resource.pool.name (string)
        let create_errors = meter
            .u64_counter("resource.pool.create_errors")
            .with_description("The number of failed resource creations.")
            .build();
        // resource.pool.name (string)
        let discarded = meter
            .u64_counter("resource.pool.discarded")
            .with_description("The number of resources destroyed after being reported unusable.")
            .build();
        // resource.pool.name (string)
        let res_max = meter
            .u64_gauge("resource.pool.max")
            .with_description("The maximum number of resources allowed.")
            .build();
        Metrics {
            res_count,
            wait_time,
            use_time,
            create_time,
            create_errors,
            discarded,
            res_max,
        }
    }

    pub(crate) fn record_state(&self, label: &[KeyValue], state: &PoolState) {
        if let Some(max_size) = state.max_size {
            self.res_max.record(max_size as u64, label);
        }
        let counts = [
            ("total", state.size),
            ("idle", state.idle),
            ("used", state.in_use),
            ("creating", state.creating),
        ];
        for (status, count) in counts {
            self.res_count
                .record(count as u64, &status_kv(label[0].clone(), status));
        }
    }
}

impl Default for Metrics {
    fn default() -> Self {
        Metrics::new()
    }
}

pub(crate) fn pool_kv(name: Option<Cow<'static, str>>) -> [KeyValue; 1] {
    match name {
        Some(n) => [KeyValue::new(KEY_POOL_NAME, n)],
        None => [KeyValue::new(KEY_POOL_NAME, "default")],
    }
}

pub(crate) fn status_kv(name: KeyValue, status: &'static str) -> [KeyValue; 2] {
    [
        name,
        KeyValue::new(KEY_STATE, Value::String(StringValue::from(status))),
    ]
}

/// Snapshot of pool bookkeeping.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PoolState {
    /// Maximum total (`idle` + `in_use` + `creating`) number of resources, if bounded.
    pub max_size: Option<usize>,
    /// Current total (`idle` + `in_use` + `creating`) number of resources.
    pub size: usize,
    /// Current number of idle (not acquired) resources.
    pub idle: usize,
    /// Current number of lent (acquired) resources.
    pub in_use: usize,
    /// Number of resources currently being created by the factory.
    pub creating: usize,
    /// Number of resources ever created by this pool.
    pub created: u64,
    /// Number of resources destroyed via [`Lease::discard`](crate::Lease::discard).
    pub discarded: u64,
}
