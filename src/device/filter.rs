//! Exponential moving-average filter for noisy scalar telemetry.
//!
//! RSSI readings jitter per packet; a first-order smoothing with a ~10
//! sample time constant damps the jitter without buffering.

/// Smoothing weight kept for the previous value.
const ALPHA: f64 = 0.9;

/// First-order exponential smoother over an optional scalar stream.
///
/// Absent input yields absent output. The filter initializes on the first
/// present sample (no smoothing applied), then blends
/// `0.9 * previous + 0.1 * new`.
#[derive(Debug, Clone, Copy, Default)]
pub struct SignalFilter {
    state: Option<f64>,
}

impl SignalFilter {
    pub fn new() -> Self {
        Self { state: None }
    }

    /// Feed one sample and return the smoothed value.
    pub fn apply(&mut self, sample: Option<f64>) -> Option<f64> {
        self.state = match (self.state, sample) {
            (_, None) => None,
            (None, Some(new)) => Some(new),
            (Some(prev), Some(new)) => Some(ALPHA * prev + (1.0 - ALPHA) * new),
        };
        self.state
    }

    /// Current smoothed value, if any.
    pub fn value(&self) -> Option<f64> {
        self.state
    }

    /// Drop the filter state so the next sample reinitializes it.
    pub fn reset(&mut self) {
        self.state = None;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_absent_input_yields_absent() {
        let mut filter = SignalFilter::new();
        assert_eq!(filter.apply(None), None);
        filter.apply(Some(-60.0));
        assert_eq!(filter.apply(None), None);
    }

    #[test]
    fn test_first_sample_passes_through_exactly() {
        let mut filter = SignalFilter::new();
        assert_eq!(filter.apply(Some(-60.0)), Some(-60.0));
    }

    #[test]
    fn test_smoothing_formula() {
        let mut filter = SignalFilter::new();
        filter.apply(Some(-60.0));
        let smoothed = filter.apply(Some(-70.0)).unwrap();
        assert!((smoothed - (0.9 * -60.0 + 0.1 * -70.0)).abs() < 1e-9);
    }

    #[test]
    fn test_converges_toward_constant_input() {
        let mut filter = SignalFilter::new();
        let mut last = filter.apply(Some(-80.0)).unwrap();
        let mut gap = (last - -50.0).abs();
        for _ in 0..50 {
            last = filter.apply(Some(-50.0)).unwrap();
            let next_gap = (last - -50.0).abs();
            assert!(next_gap < gap, "filter must converge monotonically");
            gap = next_gap;
        }
        assert!(gap < 1.0);
    }

    #[test]
    fn test_reset_reinitializes_on_next_sample() {
        let mut filter = SignalFilter::new();
        filter.apply(Some(-60.0));
        filter.reset();
        assert_eq!(filter.value(), None);
        assert_eq!(filter.apply(Some(-40.0)), Some(-40.0));
    }
}
