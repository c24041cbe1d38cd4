use std::sync::atomic::AtomicUsize;
use std::sync::Arc;

use once_cell::sync::Lazy;

/// Global runtime metrics for the watcher.
///
/// Purpose:
/// - Track poll outcomes
/// - Track scroll/extraction volume
/// - Track persistence activity
///
/// Design:
/// - Lock-free (Atomics)
/// - Cheap to update
/// - Safe in async + multithreaded contexts
#[derive(Default)]
pub struct RuntimeMetrics {
    // Poll loop
    pub polls_completed: AtomicUsize,
    pub polls_failed: AtomicUsize,
    pub page_reloads: AtomicUsize,

    // Collection
    pub scroll_passes: AtomicUsize,
    pub rows_collected: AtomicUsize,
    pub rows_without_identity: AtomicUsize,
    pub stabilization_timeouts: AtomicUsize,

    // Persistence
    pub snapshots_written: AtomicUsize,
}

/// Global metrics registry (singleton)
pub static METRICS: Lazy<Arc<RuntimeMetrics>> =
    Lazy::new(|| Arc::new(RuntimeMetrics::default()));
