//! Metrics support for the crawl store.

use iroh_metrics::core::{Core, Counter, Metric};
use struct_iterable::Iterable;

/// Metrics for the crawl store.
#[derive(Debug, Clone, Iterable)]
#[allow(missing_docs)]
pub struct Metrics {
    pub raw_crawls_stored: Counter,
    pub crawls_stored: Counter,
    pub store_scans: Counter,
    pub store_misses: Counter,
}

impl Default for Metrics {
    fn default() -> Self {
        Self {
            raw_crawls_stored: Counter::new("Raw crawl results stored"),
            crawls_stored: Counter::new("Processed crawls stored with their derived records"),
            store_scans: Counter::new("Range scans served"),
            store_misses: Counter::new("Lookups that found no row"),
        }
    }
}

impl Metric for Metrics {
    fn name() -> &'static str {
        "crawl_store"
    }
}

/// Init the metrics collection core.
pub fn init_metrics() {
    Core::init(|reg, metrics| {
        metrics.insert(Metrics::new(reg));
    });
}
