use lazy_static::lazy_static;
use prometheus::{
    Counter, CounterVec, Encoder, Histogram, HistogramOpts, Opts, Registry, TextEncoder,
};

lazy_static! {
    pub static ref REGISTRY: Registry = Registry::new();
    pub static ref CACHE_HITS_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "telemetry_cache_hits_total",
            "Lookups served from a fresh cache entry"
        ),
        &["tier"]
    )
    .expect("valid metric definition");
    pub static ref CACHE_MISSES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "telemetry_cache_misses_total",
            "Lookups that required a network fetch"
        ),
        &["tier"]
    )
    .expect("valid metric definition");
    pub static ref FETCH_FAILURES_TOTAL: CounterVec = CounterVec::new(
        Opts::new(
            "telemetry_fetch_failures_total",
            "Fetches that failed after all retries"
        ),
        &["tier"]
    )
    .expect("valid metric definition");
    pub static ref REQUEST_RETRIES_TOTAL: Counter = Counter::with_opts(Opts::new(
        "telemetry_request_retries_total",
        "Total retried HTTP requests"
    ))
    .expect("valid metric definition");
    pub static ref REQUEST_LATENCY_SECONDS: Histogram = Histogram::with_opts(
        HistogramOpts::new(
            "telemetry_request_latency_seconds",
            "Time taken by a single telemetry HTTP request"
        )
        .buckets(vec![0.005, 0.01, 0.025, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0])
    )
    .expect("valid metric definition");
}

/// Registers all collectors with [`REGISTRY`]. Calling it more than once is a no-op.
pub fn init_metrics() -> prometheus::Result<()> {
    let collectors: Vec<Box<dyn prometheus::core::Collector>> = vec![
        Box::new(CACHE_HITS_TOTAL.clone()),
        Box::new(CACHE_MISSES_TOTAL.clone()),
        Box::new(FETCH_FAILURES_TOTAL.clone()),
        Box::new(REQUEST_RETRIES_TOTAL.clone()),
        Box::new(REQUEST_LATENCY_SECONDS.clone()),
    ];

    for collector in collectors {
        match REGISTRY.register(collector) {
            Ok(()) | Err(prometheus::Error::AlreadyReg) => {}
            Err(e) => return Err(e),
        }
    }
    Ok(())
}

pub fn gather_metrics() -> prometheus::Result<String> {
    let encoder = TextEncoder::new();
    let metric_families = REGISTRY.gather();
    let mut buffer = Vec::new();
    encoder.encode(&metric_families, &mut buffer)?;
    String::from_utf8(buffer).map_err(|e| prometheus::Error::Msg(e.to_string()))
}
