//! Export per-region results to CSV and the study summary to JSON.
//!
//! The CSV is meant to be easy to consume in spreadsheets or downstream
//! scripts; empty cells mean the stage did not produce a value for the region.

use std::fs::File;
use std::io::Write;
use std::path::Path;

use serde::Serialize;

use crate::domain::{RegionRecord, StudyConfig};
use crate::error::AppError;
use crate::study::StudySummary;

/// JSON document written by `write_summary_json`.
#[derive(Debug, Serialize)]
pub struct SummaryFile<'a> {
    pub tool: &'static str,
    pub config: &'a StudyConfig,
    pub summary: &'a StudySummary,
}

const RESULTS_HEADER: &str = "region_id,name,rms_sr,rms_sir,ratio,distance,regime,\
t_c,chi_max,epidemic_peak,lead_days,edge,gamma,gamma_std_error,r_squared,p_value,\
n_points,exponent_valid,invalid_reason,dominant_amplitude,dominant_width,\
spectral_frequency,spectral_period_days,exclusions";

/// Write one row per region.
pub fn write_results_csv(path: &Path, records: &[RegionRecord]) -> Result<(), AppError> {
    let mut file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create export CSV '{}': {e}", path.display()),
        )
    })?;
    write_results(&mut file, records)
}

pub fn write_results<W: Write>(out: &mut W, records: &[RegionRecord]) -> Result<(), AppError> {
    writeln!(out, "{RESULTS_HEADER}")
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV header: {e}")))?;

    for r in records {
        let v = r.verdict.as_ref();
        let cp = r.critical_point.as_ref();
        let ex = r.exponent.as_ref();
        let mode = r.sr_fit.as_ref().and_then(|f| f.dominant_mode());
        let spectral = r.spectrum.as_ref().and_then(|s| s.dominant_mode());
        let exclusions: Vec<String> = r
            .exclusions
            .iter()
            .map(|e| format!("{:?}:{}", e.stage, e.reason.label()))
            .collect();

        writeln!(
            out,
            "{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{},{}",
            r.region_id,
            csv_text(&r.name),
            opt(v.map(|v| v.rms_sr)),
            opt(v.map(|v| v.rms_sir)),
            opt(v.map(|v| v.ratio)),
            opt(v.map(|v| v.distance)),
            v.map(|v| v.regime.label()).unwrap_or_default(),
            cp.map(|c| c.date.to_string()).unwrap_or_default(),
            opt(cp.map(|c| c.value)),
            cp.map(|c| c.epidemic_peak.to_string()).unwrap_or_default(),
            cp.map(|c| c.lead_days.to_string()).unwrap_or_default(),
            cp.and_then(|c| c.edge)
                .map(|e| format!("{e:?}"))
                .unwrap_or_default(),
            opt(ex.filter(|e| e.valid).map(|e| e.exponent)),
            opt(ex.and_then(|e| e.std_error)),
            opt(ex.map(|e| e.r_squared)),
            opt(ex.and_then(|e| e.p_value)),
            ex.map(|e| e.n_points.to_string()).unwrap_or_default(),
            ex.map(|e| e.valid.to_string()).unwrap_or_default(),
            ex.and_then(|e| e.invalid_reason)
                .map(|e| format!("{e:?}"))
                .unwrap_or_default(),
            opt(mode.map(|m| m.amplitude)),
            opt(mode.map(|m| m.width)),
            opt(spectral.map(|m| m.frequency)),
            opt(spectral.map(|m| m.period_days)),
            exclusions.join("|"),
        )
        .map_err(|e| AppError::new(2, format!("Failed to write export CSV row: {e}")))?;
    }

    Ok(())
}

/// Write the study summary (and the configuration that produced it).
pub fn write_summary_json(
    path: &Path,
    summary: &StudySummary,
    config: &StudyConfig,
) -> Result<(), AppError> {
    let file = File::create(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to create summary JSON '{}': {e}", path.display()),
        )
    })?;
    let doc = SummaryFile {
        tool: env!("CARGO_PKG_NAME"),
        config,
        summary,
    };
    serde_json::to_writer_pretty(file, &doc)
        .map_err(|e| AppError::new(2, format!("Failed to write summary JSON: {e}")))?;
    Ok(())
}

fn opt(v: Option<f64>) -> String {
    match v {
        Some(v) if v.is_finite() => format!("{v:.6}"),
        _ => String::new(),
    }
}

fn csv_text(s: &str) -> String {
    if s.contains([',', '"', '\n']) {
        format!("\"{}\"", s.replace('"', "\"\""))
    } else {
        s.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fit::classify_rms;

    #[test]
    fn writes_header_and_one_row_per_region() {
        let record = RegionRecord {
            region_id: "75".into(),
            name: "Paris, ville".into(),
            sr_fit: None,
            sir_fit: None,
            verdict: Some(classify_rms("75", 2.0, 3.0, 0.0).unwrap()),
            signal: None,
            critical_point: None,
            exponent: None,
            spectrum: None,
            exclusions: vec![],
        };
        let mut buf = Vec::new();
        write_results(&mut buf, &[record]).unwrap();
        let text = String::from_utf8(buf).unwrap();
        let lines: Vec<&str> = text.lines().collect();
        assert_eq!(lines.len(), 2);
        assert_eq!(
            lines[0].split(',').count(),
            24,
            "header columns must match row columns"
        );
        assert!(lines[1].starts_with("75,\"Paris, ville\",2.000000,3.000000,1.500000"));
        assert!(lines[1].contains("SR_dominant"));
    }
}
