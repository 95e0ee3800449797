use prometheus::{Histogram, HistogramOpts, IntCounter, IntCounterVec, Opts, Registry};
use std::sync::LazyLock;

pub static REGISTRY: LazyLock<Registry> = LazyLock::new(Registry::new);

// Request counters
pub static REQUESTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("stx402_requests_total", "Monetized requests by response status"),
        &["status"],
    )
    .unwrap()
});

pub static CHALLENGES_ISSUED: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stx402_challenges_issued_total",
        "402 challenges sent to callers without payment",
    )
    .unwrap()
});

// Payment counters
pub static PAYMENTS_TOTAL: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("stx402_payments_total", "Settled payments by payment mode"),
        &["mode"],
    )
    .unwrap()
});

pub static PAYMENT_FAILURES: LazyLock<IntCounterVec> = LazyLock::new(|| {
    IntCounterVec::new(
        Opts::new("stx402_payment_failures_total", "Failed payment attempts by reason"),
        &["reason"],
    )
    .unwrap()
});

// Proxy metrics
pub static PROXY_LATENCY: LazyLock<Histogram> = LazyLock::new(|| {
    Histogram::with_opts(
        HistogramOpts::new("stx402_proxy_latency_seconds", "Origin round-trip latency")
            .buckets(vec![0.01, 0.05, 0.1, 0.25, 0.5, 1.0, 2.5, 5.0, 10.0, 30.0]),
    )
    .unwrap()
});

pub static UPSTREAM_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stx402_upstream_failures_total",
        "Paid requests whose origin could not be reached",
    )
    .unwrap()
});

// Ledger
pub static LEDGER_WRITE_FAILURES: LazyLock<IntCounter> = LazyLock::new(|| {
    IntCounter::new(
        "stx402_ledger_write_failures_total",
        "Call ledger writes that were dropped",
    )
    .unwrap()
});

/// Register all metrics with the registry
pub fn register_metrics() -> Result<(), prometheus::Error> {
    REGISTRY.register(Box::new(REQUESTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(CHALLENGES_ISSUED.clone()))?;
    REGISTRY.register(Box::new(PAYMENTS_TOTAL.clone()))?;
    REGISTRY.register(Box::new(PAYMENT_FAILURES.clone()))?;
    REGISTRY.register(Box::new(PROXY_LATENCY.clone()))?;
    REGISTRY.register(Box::new(UPSTREAM_FAILURES.clone()))?;
    REGISTRY.register(Box::new(LEDGER_WRITE_FAILURES.clone()))?;
    Ok(())
}
