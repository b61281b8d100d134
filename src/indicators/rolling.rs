//! Incremental building blocks for indicator maintenance.
//!
//! Every structure here updates in O(1) amortized per observation (window
//! scans are bounded by the fixed window size).

/// Re-derive running moments from the ring after this many pushes to keep
/// accumulated rounding error bounded.
const RESYNC_EVERY: u64 = 1024;

/// Fixed-capacity ring buffer
#[derive(Debug, Clone)]
pub struct RingBuf {
    buf: Vec<f64>,
    pos: usize,
    len: usize,
    cap: usize,
}

impl RingBuf {
    pub fn new(capacity: usize) -> Self {
        assert!(capacity > 0, "ring buffer capacity must be positive");
        Self {
            buf: vec![0.0; capacity],
            pos: 0,
            len: 0,
            cap: capacity,
        }
    }

    /// Push a value, returning the evicted one when the buffer was full
    pub fn push(&mut self, val: f64) -> Option<f64> {
        let evicted = if self.full() {
            Some(self.buf[self.pos])
        } else {
            None
        };
        self.buf[self.pos] = val;
        self.pos = (self.pos + 1) % self.cap;
        if self.len < self.cap {
            self.len += 1;
        }
        evicted
    }

    pub fn full(&self) -> bool {
        self.len == self.cap
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn capacity(&self) -> usize {
        self.cap
    }

    /// Values in insertion order, oldest first
    pub fn iter(&self) -> impl Iterator<Item = f64> + '_ {
        let start = if self.full() { self.pos } else { 0 };
        (0..self.len).map(move |i| self.buf[(start + i) % self.cap])
    }

    pub fn min(&self) -> f64 {
        self.iter().fold(f64::INFINITY, f64::min)
    }

    pub fn max(&self) -> f64 {
        self.iter().fold(f64::NEG_INFINITY, f64::max)
    }
}

/// Sliding-window mean and sample variance (Welford with eviction)
#[derive(Debug, Clone)]
pub struct RollingStats {
    ring: RingBuf,
    mean: f64,
    m2: f64,
    pushes: u64,
}

impl RollingStats {
    pub fn new(window: usize) -> Self {
        Self {
            ring: RingBuf::new(window),
            mean: 0.0,
            m2: 0.0,
            pushes: 0,
        }
    }

    pub fn push(&mut self, x: f64) {
        let old_mean = self.mean;
        match self.ring.push(x) {
            None => {
                let n = self.ring.len() as f64;
                let delta = x - old_mean;
                self.mean += delta / n;
                self.m2 += delta * (x - self.mean);
            }
            Some(evicted) => {
                let n = self.ring.len() as f64;
                self.mean += (x - evicted) / n;
                self.m2 += (x - evicted) * (x - self.mean + evicted - old_mean);
            }
        }
        if self.m2 < 0.0 {
            self.m2 = 0.0;
        }
        // a flat window has exactly zero spread; drop eviction residue
        if self.ring.min() == self.ring.max() {
            self.mean = x;
            self.m2 = 0.0;
        }

        self.pushes += 1;
        if self.pushes % RESYNC_EVERY == 0 {
            self.resync();
        }
    }

    fn resync(&mut self) {
        let n = self.ring.len() as f64;
        self.mean = self.ring.iter().sum::<f64>() / n;
        self.m2 = self.ring.iter().map(|v| (v - self.mean).powi(2)).sum();
    }

    pub fn is_full(&self) -> bool {
        self.ring.full()
    }

    /// Window mean, once the window is full
    pub fn mean(&self) -> Option<f64> {
        self.is_full().then_some(self.mean)
    }

    /// Sample standard deviation (ddof = 1), once the window is full
    pub fn sample_std(&self) -> Option<f64> {
        if !self.is_full() || self.ring.capacity() < 2 {
            return None;
        }
        Some((self.m2 / (self.ring.capacity() as f64 - 1.0)).sqrt())
    }
}

/// Exponentially weighted mean with bias-corrected (adjusted) weights.
///
/// value_t = Σ w^i x_{t-i} / Σ w^i with w = 1 − 2/(span+1). Numerator and
/// denominator are carried forward so each update is O(1).
#[derive(Debug, Clone)]
pub struct EwmMean {
    decay: f64,
    numerator: f64,
    denominator: f64,
}

impl EwmMean {
    pub fn new(span: usize) -> Self {
        let alpha = 2.0 / (span as f64 + 1.0);
        Self {
            decay: 1.0 - alpha,
            numerator: 0.0,
            denominator: 0.0,
        }
    }

    pub fn update(&mut self, x: f64) -> f64 {
        self.numerator = x + self.decay * self.numerator;
        self.denominator = 1.0 + self.decay * self.denominator;
        self.value()
    }

    pub fn value(&self) -> f64 {
        if self.denominator == 0.0 {
            return 0.0;
        }
        self.numerator / self.denominator
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ring_evicts_oldest() {
        let mut ring = RingBuf::new(3);
        assert_eq!(ring.push(1.0), None);
        assert_eq!(ring.push(2.0), None);
        assert_eq!(ring.push(3.0), None);
        assert_eq!(ring.push(4.0), Some(1.0));

        assert_eq!(ring.iter().collect::<Vec<_>>(), vec![2.0, 3.0, 4.0]);
        assert_eq!(ring.min(), 2.0);
        assert_eq!(ring.max(), 4.0);
    }

    #[test]
    fn test_rolling_stats_window() {
        let mut stats = RollingStats::new(3);
        stats.push(1.0);
        stats.push(2.0);
        assert!(stats.mean().is_none());

        stats.push(3.0);
        assert!((stats.mean().unwrap() - 2.0).abs() < 1e-12);
        assert!((stats.sample_std().unwrap() - 1.0).abs() < 1e-12);

        stats.push(10.0);
        // window [2, 3, 10]: mean 5, var = (9 + 4 + 25) / 2 = 19
        assert!((stats.mean().unwrap() - 5.0).abs() < 1e-12);
        assert!((stats.sample_std().unwrap() - 19f64.sqrt()).abs() < 1e-12);
    }

    #[test]
    fn test_rolling_stats_constant_series_has_zero_std() {
        let mut stats = RollingStats::new(5);
        for _ in 0..5000 {
            stats.push(1.2345);
        }
        assert!(stats.sample_std().unwrap() < 1e-12);
        assert!((stats.mean().unwrap() - 1.2345).abs() < 1e-12);
    }

    #[test]
    fn test_flat_window_after_varied_closes_is_exact() {
        let mut stats = RollingStats::new(5);
        for close in [1.08731, 1.08912, 1.08644, 1.08877, 1.08812] {
            stats.push(close);
        }
        for _ in 0..5 {
            stats.push(1.085);
        }
        assert_eq!(stats.mean(), Some(1.085));
        assert_eq!(stats.sample_std(), Some(0.0));
    }

    #[test]
    fn test_ewm_matches_weighted_definition() {
        // span 3 => alpha 0.5, weights 1, 0.5, 0.25
        let mut ewm = EwmMean::new(3);
        assert_eq!(ewm.update(10.0), 10.0);
        // (11 + 0.5*10) / 1.5
        assert!((ewm.update(11.0) - 16.0 / 1.5).abs() < 1e-12);
        // (12 + 0.5*11 + 0.25*10) / 1.75
        assert!((ewm.update(12.0) - 20.0 / 1.75).abs() < 1e-12);
    }
}
