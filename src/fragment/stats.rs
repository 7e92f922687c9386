//! Per-task stat accumulator folded into one chunk summary

/// Min/max/has-null accumulator. Starts at the reduction identity so merging
/// any number of accumulators, in any order, yields the same summary.
#[derive(Debug, Clone, Copy)]
pub struct ChunkStats {
    pub has_null: bool,
    pub min_i64: i64,
    pub max_i64: i64,
    pub min_f64: f64,
    pub max_f64: f64,
}

impl Default for ChunkStats {
    fn default() -> Self {
        Self {
            has_null: false,
            min_i64: i64::MAX,
            max_i64: i64::MIN,
            min_f64: f64::INFINITY,
            max_f64: f64::NEG_INFINITY,
        }
    }
}

impl ChunkStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn observe_i64(&mut self, v: i64) {
        self.min_i64 = self.min_i64.min(v);
        self.max_i64 = self.max_i64.max(v);
    }

    pub fn observe_f64(&mut self, v: f64) {
        self.min_f64 = self.min_f64.min(v);
        self.max_f64 = self.max_f64.max(v);
    }

    pub fn observe_null(&mut self) {
        self.has_null = true;
    }

    /// Pointwise min/max plus OR of the null flags
    pub fn merge(&mut self, other: &ChunkStats) {
        self.has_null |= other.has_null;
        self.min_i64 = self.min_i64.min(other.min_i64);
        self.max_i64 = self.max_i64.max(other.max_i64);
        self.min_f64 = self.min_f64.min(other.min_f64);
        self.max_f64 = self.max_f64.max(other.max_f64);
    }

    pub fn has_i64_values(&self) -> bool {
        self.min_i64 <= self.max_i64
    }

    pub fn has_f64_values(&self) -> bool {
        self.min_f64 <= self.max_f64
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_identity_init() {
        let s = ChunkStats::new();
        assert_eq!(s.min_i64, i64::MAX);
        assert_eq!(s.max_i64, i64::MIN);
        assert_eq!(s.min_f64, f64::INFINITY);
        assert_eq!(s.max_f64, f64::NEG_INFINITY);
        assert!(!s.has_null);
        assert!(!s.has_i64_values());
        assert!(!s.has_f64_values());
    }

    #[test]
    fn test_observe_and_merge() {
        let mut a = ChunkStats::new();
        a.observe_i64(7);
        a.observe_i64(50);

        let mut b = ChunkStats::new();
        b.observe_i64(-3);
        b.observe_null();

        a.merge(&b);
        assert_eq!(a.min_i64, -3);
        assert_eq!(a.max_i64, 50);
        assert!(a.has_null);
    }

    #[test]
    fn test_merge_with_identity_is_noop() {
        let mut a = ChunkStats::new();
        a.observe_f64(1.5);
        let before = a;
        a.merge(&ChunkStats::new());
        assert_eq!(a.min_f64, before.min_f64);
        assert_eq!(a.max_f64, before.max_f64);
        assert_eq!(a.has_null, before.has_null);
    }
}
