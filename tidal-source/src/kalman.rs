/// A scalar Kalman filter tracking the gathering interval that the adaptive
/// modes re-derive after every buffer (§4.4 "Adaptive"). The filter treats
/// the interval implied by recent sample variance as a noisy measurement of
/// a slowly-drifting true interval, and folds it in with a standard
/// predict/update step.
pub struct KalmanFilter {
    estimate_ms: f64,
    error_covariance: f64,
    process_noise: f64,
    measurement_noise: f64,
    range_ms: u64,
    slowest_interval_ms: Option<u64>,
}

impl KalmanFilter {
    pub fn new(initial_interval_ms: u64) -> Self {
        Self {
            estimate_ms: initial_interval_ms.max(1) as f64,
            error_covariance: 1.0,
            process_noise: 1e-2,
            measurement_noise: 1.0,
            range_ms: initial_interval_ms.max(1),
            slowest_interval_ms: None,
        }
    }

    pub fn set_gathering_interval(&mut self, interval_ms: u64) {
        self.estimate_ms = interval_ms.max(1) as f64;
    }

    /// The widest interval the filter is allowed to settle on.
    pub fn set_gathering_interval_range(&mut self, range_ms: u64) {
        self.range_ms = range_ms.max(1);
    }

    /// Caps future intervals at `interval_ms`, per a Nyquist bound derived
    /// from recent sample values (§4.4). `None` means no such cap is active.
    pub fn set_slowest_interval(&mut self, interval_ms: u64) {
        self.slowest_interval_ms = Some(interval_ms.max(1));
    }

    /// Folds a newly measured interval (derived by the caller from recent
    /// inter-sample variance) into the running estimate.
    pub fn update(&mut self, measured_interval_ms: f64) {
        let predicted_covariance = self.error_covariance + self.process_noise;
        let gain = predicted_covariance / (predicted_covariance + self.measurement_noise);
        self.estimate_ms += gain * (measured_interval_ms - self.estimate_ms);
        self.error_covariance = (1.0 - gain) * predicted_covariance;
    }

    /// The interval to use for the next iteration: the filter's current
    /// estimate, clamped to `[1, range]` and further capped by the active
    /// Nyquist bound, if any.
    pub fn new_gathering_interval(&self) -> u64 {
        let mut interval_ms = (self.estimate_ms.max(1.0) as u64).min(self.range_ms);
        if let Some(bound) = self.slowest_interval_ms {
            interval_ms = interval_ms.min(bound);
        }
        interval_ms
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn repeated_updates_converge_toward_the_measured_interval() {
        let mut filter = KalmanFilter::new(1000);
        for _ in 0..50 {
            filter.update(200.0);
        }
        let interval = filter.new_gathering_interval();
        assert!(interval < 1000, "estimate should have moved toward 200ms, got {interval}");
        assert!(interval >= 200 - 5, "estimate should not overshoot far past the measurement");
    }

    #[test]
    fn range_clamps_the_derived_interval_from_above() {
        let mut filter = KalmanFilter::new(100);
        filter.set_gathering_interval_range(50);
        filter.update(10_000.0);
        assert!(filter.new_gathering_interval() <= 50);
    }

    #[test]
    fn slowest_interval_bound_overrides_a_wider_range() {
        let mut filter = KalmanFilter::new(1000);
        filter.set_gathering_interval_range(8000);
        filter.set_slowest_interval(300);
        assert!(filter.new_gathering_interval() <= 300);
    }
}
