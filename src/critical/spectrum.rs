//! Spectral view of the susceptibility.
//!
//! The observable is demeaned, Hann-windowed and zero-padded to `fft_len`
//! before a forward FFT. Each positive-frequency bin `χ(ω)` is reported as
//! magnitude, dispersive part `χ'` (real), absorptive part `χ''` (imaginary)
//! and power `|χ(ω)|²`. The sampling step is one day, so frequencies are in
//! day⁻¹.
//!
//! Low-frequency modes are the strongest local power maxima inside
//! `MODE_BAND`.

use rustfft::FftPlanner;
use rustfft::num_complex::Complex;

use crate::critical::susceptibility::is_flat;
use crate::domain::{ObservableSeries, SpectralMode, SpectralPoint, SusceptibilitySpectrum};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::mean;

/// Default transform length (zero-padding target).
pub const DEFAULT_FFT_LEN: usize = 4096;

/// Open frequency band (day⁻¹) searched for modes: periods of about 7 to 200 days.
pub const MODE_BAND: (f64, f64) = (0.005, 0.15);

/// Number of modes reported per region.
pub const MODE_COUNT: usize = 3;

/// Windowed, zero-padded spectrum of `series`.
///
/// The transform length is `max(fft_len, series.len())`. Fails with
/// `DegenerateSeries` on fewer than two points or a constant series.
pub fn spectrum(
    series: &ObservableSeries,
    fft_len: usize,
) -> AnalysisResult<SusceptibilitySpectrum> {
    let n = series.len();
    if n < 2 {
        return Err(AnalysisError::DegenerateSeries(format!(
            "region {}: {n} points are too few for a spectrum",
            series.region_id
        )));
    }
    if is_flat(&series.values) {
        return Err(AnalysisError::DegenerateSeries(format!(
            "region {}: constant series has no spectrum",
            series.region_id
        )));
    }
    let m = mean(&series.values).ok_or_else(|| {
        AnalysisError::DegenerateSeries(format!("region {}: empty series", series.region_id))
    })?;

    let len = fft_len.max(n);
    let mut buffer: Vec<Complex<f64>> = series
        .values
        .iter()
        .zip(hann(n))
        .map(|(v, w)| Complex::new((v - m) * w, 0.0))
        .collect();
    buffer.resize(len, Complex::new(0.0, 0.0));

    let mut planner = FftPlanner::<f64>::new();
    planner.plan_fft_forward(len).process(&mut buffer);

    // Positive frequencies only: bins 1..ceil(len / 2).
    let points: Vec<SpectralPoint> = buffer
        .iter()
        .enumerate()
        .take(len.div_ceil(2))
        .skip(1)
        .map(|(k, c)| SpectralPoint {
            frequency: k as f64 / len as f64,
            magnitude: c.norm(),
            real: c.re,
            imag: c.im,
            power: c.norm_sqr(),
        })
        .collect();
    let modes = low_frequency_modes(&points);

    Ok(SusceptibilitySpectrum {
        region_id: series.region_id.clone(),
        observable: series.observable,
        n_fft: len,
        points,
        modes,
    })
}

/// Symmetric Hann window, zero at both ends.
pub fn hann(n: usize) -> Vec<f64> {
    if n == 1 {
        return vec![1.0];
    }
    let denom = (n - 1) as f64;
    (0..n)
        .map(|i| 0.5 - 0.5 * (2.0 * std::f64::consts::PI * i as f64 / denom).cos())
        .collect()
}

/// Strongest local power maxima inside `MODE_BAND`, strongest first.
fn low_frequency_modes(points: &[SpectralPoint]) -> Vec<SpectralMode> {
    let in_band = |f: f64| f > MODE_BAND.0 && f < MODE_BAND.1;
    let mut peaks: Vec<&SpectralPoint> = points
        .windows(3)
        .filter(|w| {
            in_band(w[1].frequency) && w[1].power > w[0].power && w[1].power >= w[2].power
        })
        .map(|w| &w[1])
        .collect();
    peaks.sort_by(|a, b| {
        b.power
            .total_cmp(&a.power)
            .then(a.frequency.total_cmp(&b.frequency))
    });

    peaks
        .into_iter()
        .take(MODE_COUNT)
        .map(|p| SpectralMode {
            frequency: p.frequency,
            period_days: 1.0 / p.frequency,
            power: p.power,
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observable;
    use chrono::{Duration, NaiveDate};

    fn series(values: Vec<f64>) -> ObservableSeries {
        let start = NaiveDate::from_ymd_opt(2020, 2, 15).unwrap();
        ObservableSeries {
            region_id: "IDF".into(),
            observable: Observable::DcDiff,
            dates: (0..values.len())
                .map(|i| start + Duration::days(i as i64))
                .collect(),
            values,
            imputed: vec![],
            trimmed: vec![],
        }
    }

    fn oscillation(days: usize, period: f64) -> Vec<f64> {
        (0..days)
            .map(|i| 50.0 + 10.0 * (2.0 * std::f64::consts::PI * i as f64 / period).sin())
            .collect()
    }

    #[test]
    fn hann_window_shape() {
        let w = hann(5);
        assert!(w[0].abs() < 1e-15 && w[4].abs() < 1e-15);
        assert!((w[2] - 1.0).abs() < 1e-15);
        assert!((w[1] - w[3]).abs() < 1e-15);
        assert_eq!(hann(1), vec![1.0]);
    }

    #[test]
    fn bins_cover_positive_frequencies() {
        let s = spectrum(&series(oscillation(120, 20.0)), DEFAULT_FFT_LEN).unwrap();
        assert_eq!(s.n_fft, 4096);
        assert_eq!(s.points.len(), 2047);
        assert!((s.points[0].frequency - 1.0 / 4096.0).abs() < 1e-15);
        assert!(s.points.last().unwrap().frequency < 0.5);
        for p in &s.points {
            assert!((p.magnitude.powi(2) - p.power).abs() <= 1e-9 * p.power.max(1.0));
            assert!((p.real.hypot(p.imag) - p.magnitude).abs() <= 1e-9 * p.magnitude.max(1.0));
        }
    }

    #[test]
    fn dominant_mode_matches_the_oscillation() {
        let s = spectrum(&series(oscillation(200, 25.0)), DEFAULT_FFT_LEN).unwrap();
        let top = s.modes.first().unwrap();
        assert!((top.frequency - 0.04).abs() < 0.002, "f = {}", top.frequency);
        assert!((top.period_days - 1.0 / top.frequency).abs() < 1e-12);
        assert!(s.modes.len() <= MODE_COUNT);
        for pair in s.modes.windows(2) {
            assert!(pair[0].power >= pair[1].power);
        }
        for m in &s.modes {
            assert!(m.frequency > MODE_BAND.0 && m.frequency < MODE_BAND.1);
        }
    }

    #[test]
    fn mean_does_not_leak_into_the_spectrum() {
        let base = oscillation(150, 30.0);
        let shifted: Vec<f64> = base.iter().map(|v| v + 1000.0).collect();
        let a = spectrum(&series(base), 1024).unwrap();
        let b = spectrum(&series(shifted), 1024).unwrap();
        for (p, q) in a.points.iter().zip(&b.points) {
            assert!((p.power - q.power).abs() <= 1e-6 * p.power.max(1.0));
        }
    }

    #[test]
    fn long_series_is_not_truncated() {
        let s = spectrum(&series(oscillation(300, 20.0)), 64).unwrap();
        assert_eq!(s.n_fft, 300);
        assert_eq!(s.points.len(), 149);
    }

    #[test]
    fn constant_or_tiny_series_is_degenerate() {
        for values in [vec![0.1; 60], vec![7.0]] {
            assert!(matches!(
                spectrum(&series(values), DEFAULT_FFT_LEN),
                Err(AnalysisError::DegenerateSeries(_))
            ));
        }
    }
}
