//! Rolling-window susceptibility signal and critical-point detection.
//!
//! The susceptibility proxy is the sample variance of the observable over a
//! trailing window of `w` days. Each value is dated at the window's last day,
//! so a series of `N` days yields exactly `N − w + 1` points. A window whose
//! values are all equal has variance exactly zero, whatever rounding the
//! two-pass mean leaves behind.

use crate::domain::{
    CriticalPoint, ObservableSeries, SignalEdge, SignalPoint, SusceptibilitySignal,
};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::sample_variance;

/// Build the signal and locate its maximum.
pub fn analyze(
    series: &ObservableSeries,
    window: usize,
) -> AnalysisResult<(SusceptibilitySignal, CriticalPoint)> {
    let signal = rolling_variance(series, window)?;
    let critical = critical_point(series, &signal)?;
    Ok((signal, critical))
}

/// Sample variance (`n − 1`) over each full trailing window.
pub fn rolling_variance(
    series: &ObservableSeries,
    window: usize,
) -> AnalysisResult<SusceptibilitySignal> {
    if window < 2 {
        return Err(AnalysisError::DegenerateSeries(format!(
            "region {}: window must be >= 2 (got {window})",
            series.region_id
        )));
    }
    if series.len() < window {
        return Err(AnalysisError::DegenerateSeries(format!(
            "region {}: series has {} points, shorter than the {window}-day window",
            series.region_id,
            series.len()
        )));
    }

    let mut points = Vec::with_capacity(series.len() - window + 1);
    for (offset, slice) in series.values.windows(window).enumerate() {
        let value = if is_flat(slice) {
            0.0
        } else {
            sample_variance(slice).ok_or_else(|| {
                AnalysisError::DegenerateSeries(format!(
                    "region {}: variance undefined in window ending at index {}",
                    series.region_id,
                    offset + window - 1
                ))
            })?
        };
        points.push(SignalPoint {
            date: series.dates[offset + window - 1],
            value,
        });
    }

    Ok(SusceptibilitySignal {
        region_id: series.region_id.clone(),
        observable: series.observable,
        window,
        points,
    })
}

/// First global maximum of the signal, with branch sizes and the lead over
/// the observable's own peak.
pub fn critical_point(
    series: &ObservableSeries,
    signal: &SusceptibilitySignal,
) -> AnalysisResult<CriticalPoint> {
    let (index, max) = first_max(signal.points.iter().map(|p| p.value)).ok_or_else(|| {
        AnalysisError::DegenerateSeries(format!("region {}: empty signal", signal.region_id))
    })?;
    if !(max.is_finite() && max > 0.0) {
        return Err(AnalysisError::DegenerateSeries(format!(
            "region {}: zero variance everywhere",
            signal.region_id
        )));
    }

    let last = signal.len() - 1;
    let edge = if index == 0 {
        Some(SignalEdge::AtStart)
    } else if index == last {
        Some(SignalEdge::AtEnd)
    } else {
        None
    };

    let date = signal.points[index].date;
    let (peak_index, _) = first_max(series.values.iter().copied()).ok_or_else(|| {
        AnalysisError::DegenerateSeries(format!("region {}: empty series", series.region_id))
    })?;
    let epidemic_peak = series.dates[peak_index];

    Ok(CriticalPoint {
        region_id: signal.region_id.clone(),
        date,
        value: max,
        index,
        ascending_len: index,
        descending_len: last - index,
        edge,
        epidemic_peak,
        lead_days: (epidemic_peak - date).num_days(),
    })
}

/// All values equal to the first within a few ulps.
pub(crate) fn is_flat(values: &[f64]) -> bool {
    let Some(&first) = values.first() else {
        return true;
    };
    let tol = 4.0 * f64::EPSILON * first.abs();
    values.iter().all(|v| (v - first).abs() <= tol)
}

/// Index and value of the first maximum; later ties lose.
fn first_max(values: impl Iterator<Item = f64>) -> Option<(usize, f64)> {
    let mut best: Option<(usize, f64)> = None;
    for (i, v) in values.enumerate() {
        match best {
            Some((_, b)) if v <= b => {}
            _ => best = Some((i, v)),
        }
    }
    best
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::Observable;
    use chrono::{Duration, NaiveDate};

    fn series(values: Vec<f64>) -> ObservableSeries {
        let start = NaiveDate::from_ymd_opt(2020, 3, 18).unwrap();
        ObservableSeries {
            region_id: "33".into(),
            observable: Observable::HospDiff,
            dates: (0..values.len())
                .map(|i| start + Duration::days(i as i64))
                .collect(),
            values,
            imputed: vec![],
            trimmed: vec![],
        }
    }

    fn wave(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| {
                let x = (i as f64 - 30.0) / 8.0;
                100.0 / x.cosh().powi(2) + if i % 2 == 0 { 1.0 } else { -1.0 }
            })
            .collect()
    }

    #[test]
    fn signal_length_is_n_minus_window_plus_one() {
        for window in [2, 7, 14] {
            let s = series(wave(60));
            let signal = rolling_variance(&s, window).unwrap();
            assert_eq!(signal.len(), 60 - window + 1);
            assert_eq!(signal.points[0].date, s.dates[window - 1]);
            assert_eq!(signal.points.last().unwrap().date, s.dates[59]);
        }
    }

    #[test]
    fn window_uses_sample_variance() {
        let s = series(vec![1.0, 2.0, 3.0, 4.0]);
        let signal = rolling_variance(&s, 3).unwrap();
        assert_eq!(signal.points[0].value, 1.0);
        assert_eq!(signal.points[1].value, 1.0);
    }

    #[test]
    fn constant_series_is_degenerate() {
        let err = analyze(&series(vec![4.0; 30]), 7).unwrap_err();
        assert!(matches!(err, AnalysisError::DegenerateSeries(_)));
    }

    #[test]
    fn inexact_constants_are_degenerate() {
        // Two-pass variance of these is a few 1e-34 instead of zero.
        for c in [0.1, 0.3, 1.0 / 3.0, 2.7, 123.456] {
            let result = analyze(&series(vec![c; 40]), 7);
            assert!(
                matches!(result, Err(AnalysisError::DegenerateSeries(_))),
                "constant {c} gave {result:?}"
            );
        }
    }

    #[test]
    fn flat_windows_have_zero_variance() {
        let mut values = vec![0.1; 10];
        values.extend(wave(40));
        let signal = rolling_variance(&series(values), 5).unwrap();
        for p in &signal.points[..6] {
            assert_eq!(p.value, 0.0);
        }
        assert!(signal.points[6].value > 0.0);
    }

    #[test]
    fn short_series_or_tiny_window_is_degenerate() {
        assert!(matches!(
            analyze(&series(wave(5)), 7),
            Err(AnalysisError::DegenerateSeries(_))
        ));
        assert!(matches!(
            analyze(&series(wave(40)), 1),
            Err(AnalysisError::DegenerateSeries(_))
        ));
    }

    #[test]
    fn interior_maximum_has_both_branches() {
        let (signal, cp) = analyze(&series(wave(60)), 7).unwrap();
        assert!(cp.edge.is_none());
        assert_eq!(cp.ascending_len + cp.descending_len + 1, signal.len());
        assert_eq!(cp.date, signal.points[cp.index].date);
        // The sech² wave peaks on day 30.
        assert_eq!(cp.epidemic_peak, series(wave(60)).dates[30]);
        assert_eq!(cp.lead_days, (cp.epidemic_peak - cp.date).num_days());
    }

    #[test]
    fn maximum_on_last_position_is_flagged() {
        // Strictly accelerating growth: the last window has the largest spread.
        let values: Vec<f64> = (0..20).map(|i| (i as f64).powi(2)).collect();
        let (signal, cp) = analyze(&series(values), 5).unwrap();
        assert_eq!(cp.edge, Some(SignalEdge::AtEnd));
        assert_eq!(cp.index, signal.len() - 1);
        assert_eq!(cp.descending_len, 0);
    }

    #[test]
    fn maximum_on_first_position_is_flagged() {
        let values: Vec<f64> = (0..20).map(|i| (20.0 - i as f64).powi(2)).collect();
        let (_, cp) = analyze(&series(values), 5).unwrap();
        assert_eq!(cp.edge, Some(SignalEdge::AtStart));
        assert_eq!(cp.ascending_len, 0);
    }

    #[test]
    fn ties_keep_the_first_maximum() {
        assert_eq!(first_max([1.0, 3.0, 2.0, 3.0].into_iter()), Some((1, 3.0)));
    }
}
