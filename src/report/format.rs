//! Formatted terminal output.
//!
//! We keep formatting code in one place so:
//! - the numerical code stays clean and testable
//! - output changes are localized

use crate::domain::{ExponentFit, RegionRecord, StudyConfig};
use crate::report::Rankings;
use crate::study::{DistributionStats, StudySummary};

/// Header block: data source and the options that shape the results.
pub fn format_run_header(config: &StudyConfig, source: &str, regions: usize) -> String {
    let mut out = String::new();

    out.push_str("=== epi-critical - SR/SIR critical exponents ===\n");
    out.push_str(&format!("Source: {source} ({regions} regions)\n"));
    out.push_str(&format!(
        "Fit: SR({}) vs SIR on {} | smoothing={}d | max_iter={}\n",
        config.sr_modes,
        config.fit_observable.label(),
        config.smoothing,
        config.max_iterations
    ));
    out.push_str(&format!(
        "Susceptibility: {} | window={}d | branch={:?} | distance={:?} | min_points={}\n",
        config.observable.label(),
        config.window,
        config.branch,
        config.convention,
        config.min_branch_points
    ));
    if config.start.is_some() || config.end.is_some() {
        out.push_str(&format!(
            "Dates: {} .. {}\n",
            config.start.map(|d| d.to_string()).unwrap_or_default(),
            config.end.map(|d| d.to_string()).unwrap_or_default()
        ));
    }
    out
}

/// One line per region.
pub fn format_region_table(records: &[RegionRecord]) -> String {
    let mut out = String::new();
    out.push_str(
        format!(
            "{:<6} {:<20} {:>8} {:<13} {:>10} {:>6} {:>8} {:>6} {:<}\n",
            "id", "name", "ratio", "regime", "t_c", "lead", "gamma", "R2", "notes"
        )
        .trim_end(),
    );
    out.push('\n');
    out.push_str(
        format!(
            "{:-<6} {:-<20} {:-<8} {:-<13} {:-<10} {:-<6} {:-<8} {:-<6} {:-<5}\n",
            "", "", "", "", "", "", "", "", ""
        )
        .trim_end(),
    );
    out.push('\n');

    for r in records {
        let v = r.verdict.as_ref();
        let cp = r.critical_point.as_ref();
        let ex = r.exponent.as_ref();

        let mut notes: Vec<String> = r
            .exclusions
            .iter()
            .map(|e| format!("{:?}:{}", e.stage, e.reason.label()))
            .collect();
        if let Some(edge) = cp.and_then(|c| c.edge) {
            notes.push(format!("edge:{edge:?}"));
        }
        if let Some(reason) = ex.and_then(|e| e.invalid_reason) {
            notes.push(format!("invalid:{reason:?}"));
        }

        out.push_str(
            format!(
                "{:<6} {:<20} {:>8} {:<13} {:>10} {:>6} {:>8} {:>6} {}\n",
                truncate(&r.region_id, 6),
                truncate(&r.name, 20),
                fmt_opt(v.map(|v| v.ratio), 3),
                v.map(|v| v.regime.label()).unwrap_or("-"),
                cp.map(|c| c.date.format("%Y-%m-%d").to_string())
                    .unwrap_or_else(|| "-".to_string()),
                cp.map(|c| c.lead_days.to_string())
                    .unwrap_or_else(|| "-".to_string()),
                fmt_opt(ex.filter(|e| e.valid).map(|e| e.exponent), 3),
                fmt_opt(ex.filter(|e| e.valid).map(|e| e.r_squared), 2),
                notes.join(" "),
            )
            .trim_end(),
        );
        out.push('\n');
    }

    out
}

/// Study-level statistics, pooled exponents and scaling checks.
pub fn format_summary(summary: &StudySummary) -> String {
    let mut out = String::new();

    out.push_str("\nStudy summary:\n");
    out.push_str(&format!(
        "- regions: {} total | {} classified | {} with valid gamma\n",
        summary.regions_total, summary.regions_classified, summary.regions_with_exponent
    ));
    let c = &summary.regime_counts;
    out.push_str(&format!(
        "- regimes: SR_dominant={} SIR_dominant={} critical={}\n",
        c.sr_dominant, c.sir_dominant, c.critical
    ));
    if let Some(ratio) = &summary.ratio {
        out.push_str(&format!("- ratio RMS_SIR/RMS_SR: {}\n", fmt_stats(ratio)));
    }
    if let Some(g) = &summary.gamma {
        out.push_str(&format!("- per-region gamma: {}\n", fmt_stats(&g.stats)));
        out.push_str(&format!(
            "  gamma>0: {:.0}% | p<0.05: {:.0}% | mean R2={:.3}\n",
            100.0 * g.expected_sign_fraction,
            100.0 * g.significant_fraction,
            g.mean_r_squared
        ));
    }
    if let Some(lead) = &summary.lead_days {
        out.push_str(&format!("- lead time (days): {}\n", fmt_stats(lead)));
    }
    if let Some(period) = &summary.dominant_period {
        out.push_str(&format!(
            "- dominant spectral period (days): {}\n",
            fmt_stats(period)
        ));
    }

    out.push_str("\nCross-region exponents (vs |r|):\n");
    for fit in &summary.cross_region {
        out.push_str(&format!("- {}\n", fmt_exponent(fit)));
    }

    let s = &summary.scaling;
    out.push_str(&format!("\nScaling relations (d={}):\n", s.dimension));
    out.push_str(&format!("- alpha = 2 - d*nu = {}\n", fmt_opt(s.alpha, 3)));
    out.push_str(&format!(
        "- Rushbrooke alpha + 2beta + gamma = {} (deviation from 2: {})\n",
        fmt_opt(s.rushbrooke_sum, 3),
        fmt_opt(s.rushbrooke_deviation, 3)
    ));
    out.push_str(&format!(
        "- Widom delta = 1 + gamma/beta = {}\n",
        fmt_opt(s.widom_delta, 3)
    ));
    if let Some(u) = &summary.universality {
        out.push_str(&format!(
            "- nearest class: {} (gamma={:.2}, |{} gamma - {:.2}| = {:.3})\n",
            u.class.label(),
            u.reference_gamma,
            if u.pooled { "pooled" } else { "median" },
            u.gamma,
            u.distance
        ));
    }

    let k = &summary.correlations;
    out.push_str("\nCorrelations (Pearson r):\n");
    out.push_str(&format!(
        "- ratio~gamma={} ratio~chi_max={} ratio~lead={} gamma~R2={}\n",
        fmt_opt(k.ratio_vs_gamma, 3),
        fmt_opt(k.ratio_vs_chi_max, 3),
        fmt_opt(k.ratio_vs_lead_days, 3),
        fmt_opt(k.gamma_vs_r_squared, 3)
    ));

    if !summary.exclusions.is_empty() || !summary.invalid_exponents.is_empty() {
        out.push_str("\nExcluded:\n");
        for (reason, n) in summary.exclusions.iter().chain(&summary.invalid_exponents) {
            out.push_str(&format!("- {reason}: {n}\n"));
        }
    }
    for note in &summary.insufficient {
        out.push_str(&format!("! {note}\n"));
    }

    out
}

/// Format the SR-leaning / SIR-leaning tables.
pub fn format_rankings(rankings: &Rankings) -> String {
    let mut out = String::new();
    out.push_str("\nMost SR-dominant (largest ratio):\n");
    for r in &rankings.sr_leaning {
        out.push_str(&fmt_ranked(r));
    }
    out.push_str("Most SIR-dominant (smallest ratio):\n");
    for r in &rankings.sir_leaning {
        out.push_str(&fmt_ranked(r));
    }
    out
}

fn fmt_ranked(r: &RegionRecord) -> String {
    format!(
        "  {:<6} {:<20} {:>8}\n",
        truncate(&r.region_id, 6),
        truncate(&r.name, 20),
        fmt_opt(r.verdict.as_ref().map(|v| v.ratio), 3)
    )
}

fn fmt_stats(s: &DistributionStats) -> String {
    format!(
        "n={} mean={:.3} median={:.3} std={} min={:.3} ({}) max={:.3} ({})",
        s.n,
        s.mean,
        s.median,
        fmt_opt(s.std_dev, 3),
        s.min,
        s.min_region,
        s.max,
        s.max_region
    )
}

fn fmt_exponent(fit: &ExponentFit) -> String {
    if !fit.valid {
        return format!(
            "{}: invalid ({:?}, n={})",
            fit.quantity.symbol(),
            fit.invalid_reason,
            fit.n_points
        );
    }
    format!(
        "{} = {:.3} ± {} | R2={:.3} | p={} | n={}",
        fit.quantity.symbol(),
        fit.exponent,
        fmt_opt(fit.std_error, 3),
        fit.r_squared,
        fit.p_value
            .map(|p| format!("{p:.2e}"))
            .unwrap_or_else(|| "-".to_string()),
        fit.n_points
    )
}

fn fmt_opt(v: Option<f64>, decimals: usize) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.decimals$}"),
        _ => "-".to_string(),
    }
}

fn truncate(s: &str, max: usize) -> String {
    if s.chars().count() <= max {
        return s.to_string();
    }
    let mut out = String::new();
    for (i, ch) in s.chars().enumerate() {
        if i + 1 >= max {
            break;
        }
        out.push(ch);
    }
    out.push('.');
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::classify_rms;
    use crate::study::summarize;

    #[test]
    fn summary_mentions_counts_and_missing_data() {
        let records = vec![RegionRecord {
            region_id: "13".into(),
            name: "Bouches-du-Rhone".into(),
            sr_fit: None,
            sir_fit: None,
            verdict: Some(classify_rms("13", 1.0, 1.2, 0.0).unwrap()),
            signal: None,
            critical_point: None,
            exponent: None,
            spectrum: None,
            exclusions: vec![],
        }];
        let summary = summarize(&records, &[], &StudyConfig::default());
        let text = format_summary(&summary);
        assert!(text.contains("SR_dominant=1"));
        assert!(text.contains("insufficient aggregate data"));

        let table = format_region_table(&records);
        assert_eq!(table.lines().count(), 3);
        assert!(table.lines().nth(2).unwrap().contains("1.200"));
    }

    #[test]
    fn truncate_marks_cut_names() {
        assert_eq!(truncate("Seine-Saint-Denis", 8), "Seine-S.");
        assert_eq!(truncate("Ain", 8), "Ain");
    }
}
