use prometheus::{IntCounter, IntGauge, Opts, Registry};
use std::sync::Arc;

#[derive(Clone)]
pub struct Metrics {
    pub reads_total: IntCounter,
    pub read_failures: IntCounter,
    pub tx_submitted: IntCounter,
    pub tx_confirmed: IntCounter,
    pub tx_failed: IntCounter,
    pub inflight_tx: IntGauge,
}

impl Metrics {
    pub fn new(registry: &Registry) -> Arc<Self> {
        let reads_total =
            IntCounter::with_opts(Opts::new("tc_reads_total", "View calls issued")).unwrap();
        let read_failures =
            IntCounter::with_opts(Opts::new("tc_read_failures", "View calls that failed")).unwrap();
        let tx_submitted =
            IntCounter::with_opts(Opts::new("tc_tx_submitted", "Transactions submitted")).unwrap();
        let tx_confirmed = IntCounter::with_opts(Opts::new(
            "tc_tx_confirmed",
            "Transactions confirmed successfully",
        ))
        .unwrap();
        let tx_failed = IntCounter::with_opts(Opts::new(
            "tc_tx_failed",
            "Transactions rejected, reverted or timed out",
        ))
        .unwrap();
        let inflight_tx =
            IntGauge::with_opts(Opts::new("tc_inflight_tx", "Transactions awaiting confirmation"))
                .unwrap();
        registry.register(Box::new(reads_total.clone())).ok();
        registry.register(Box::new(read_failures.clone())).ok();
        registry.register(Box::new(tx_submitted.clone())).ok();
        registry.register(Box::new(tx_confirmed.clone())).ok();
        registry.register(Box::new(tx_failed.clone())).ok();
        registry.register(Box::new(inflight_tx.clone())).ok();
        Arc::new(Self {
            reads_total,
            read_failures,
            tx_submitted,
            tx_confirmed,
            tx_failed,
            inflight_tx,
        })
    }

    /// Metrics bound to a throwaway registry, for callers that do not export them.
    pub fn detached() -> Arc<Self> {
        Self::new(&Registry::new())
    }
}
