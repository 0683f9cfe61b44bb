// stats.rs - Per-stage latency accumulation

/// Running latency statistics for one pipeline stage.
#[derive(Debug, Clone, Default)]
pub struct StageStats {
    pub samples: u64,
    pub total_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub last_ms: f64,
}

impl StageStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, ms: f64) {
        self.last_ms = ms;
        self.total_ms += ms;
        if self.samples == 0 {
            self.min_ms = ms;
            self.max_ms = ms;
        } else {
            self.min_ms = self.min_ms.min(ms);
            self.max_ms = self.max_ms.max(ms);
        }
        self.samples += 1;
    }

    pub fn average_ms(&self) -> f64 {
        if self.samples > 0 {
            self.total_ms / self.samples as f64
        } else {
            0.0
        }
    }

    /// One-line summary in the shutdown-report format.
    pub fn summary(&self, name: &str) -> String {
        format!(
            "{}: avg {:.3}ms min {:.3}ms max {:.3}ms ({} samples)",
            name,
            self.average_ms(),
            self.min_ms,
            self.max_ms,
            self.samples
        )
    }
}
