//! Connection count reporting

use std::sync::atomic::{AtomicUsize, Ordering};

use tracing::info;

/// Receives the live connection count after every connect/disconnect
pub trait ConnectionMetrics: Send + Sync {
    fn update_connections(&self, count: usize);
}

/// Gauge that keeps the current and peak connection counts and logs changes
#[derive(Debug, Default)]
pub struct ConnectionGauge {
    current: AtomicUsize,
    peak: AtomicUsize,
}

impl ConnectionGauge {
    pub fn new() -> Self {
        Self::default()
    }

    /// Last reported connection count
    pub fn current(&self) -> usize {
        self.current.load(Ordering::SeqCst)
    }

    /// Highest count reported since startup
    pub fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl ConnectionMetrics for ConnectionGauge {
    fn update_connections(&self, count: usize) {
        self.current.store(count, Ordering::SeqCst);
        let peak = self.peak.fetch_max(count, Ordering::SeqCst).max(count);
        info!(connections = count, peak = peak, "Connection count updated");
    }
}
