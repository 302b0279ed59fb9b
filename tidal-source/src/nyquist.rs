/// Estimates whether the current sampling interval is coarser than the
/// signal actually needs, from a recent window of raw sample values
/// (`computeNyquistAndEnergy` in the original adaptive gathering routine,
/// §4.4 "Adaptive").
///
/// The dominant frequency is approximated from the zero-crossing rate of the
/// mean-centered samples across `skewed_interval_s` seconds per sample; the
/// matching Nyquist interval is half of that dominant period. Returns
/// `(true, nyquist_interval_s)` when the Nyquist interval is tighter than
/// `skewed_interval_s` (meaning the source could usefully sample faster),
/// `(false, 0.0)` otherwise (fewer than two samples, or no detected
/// oscillation, is treated as "no signal-driven case to bound").
pub fn compute_nyquist_and_energy(values: &[f64], skewed_interval_s: f64) -> (bool, f64) {
    if values.len() < 2 || skewed_interval_s <= 0.0 {
        return (false, 0.0);
    }

    let mean = values.iter().sum::<f64>() / values.len() as f64;
    let centered: Vec<f64> = values.iter().map(|v| v - mean).collect();

    let mut crossings = 0u32;
    for pair in centered.windows(2) {
        if (pair[0] >= 0.0) != (pair[1] >= 0.0) {
            crossings += 1;
        }
    }
    if crossings == 0 {
        return (false, 0.0);
    }

    let span_s = skewed_interval_s * (values.len() - 1) as f64;
    let dominant_period_s = 2.0 * span_s / crossings as f64;
    let nyquist_interval_s = dominant_period_s / 2.0;

    (nyquist_interval_s < skewed_interval_s, nyquist_interval_s)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn constant_signal_has_no_crossings_and_is_not_bounded() {
        let values = vec![1.0; 8];
        assert_eq!(compute_nyquist_and_energy(&values, 1.0), (false, 0.0));
    }

    #[test]
    fn fast_oscillation_yields_a_tighter_nyquist_interval() {
        let values: Vec<f64> = (0..20).map(|i| if i % 2 == 0 { 1.0 } else { -1.0 }).collect();
        let (bounded, nyquist) = compute_nyquist_and_energy(&values, 1.0);
        assert!(bounded);
        assert!(nyquist < 1.0);
    }

    #[test]
    fn degenerate_input_is_rejected() {
        assert_eq!(compute_nyquist_and_energy(&[1.0], 1.0), (false, 0.0));
        assert_eq!(compute_nyquist_and_energy(&[1.0, 2.0], 0.0), (false, 0.0));
    }
}
