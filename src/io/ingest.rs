//! CSV ingest for the public hospital dataset.
//!
//! Turns the daily hospital CSV (one row per department, sex and day) into a
//! `TimeSeriesStore` of aligned regions.
//!
//! Design goals:
//! - **Strict schema** for required fields (clear errors + exit code 2)
//! - **Row-level validation** (skip bad rows, but report what happened)
//! - **No silent drops**: missing cells stay `None` on the region and are
//!   resolved (and recorded) when an observable is extracted
//!
//! Expected layout (`;` or `,` separated, quoted or not):
//!
//! ```text
//! dep;sexe;jour;hosp;rea;...;dc
//! "01";0;2020-03-18;2;0;...;0
//! ```
//!
//! Only `sexe = 0` rows (both sexes) are kept when a `sexe` column exists.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::fs::File;
use std::io::Read;
use std::path::Path;

use chrono::NaiveDate;
use csv::StringRecord;
use log::{debug, info};

use crate::data::TimeSeriesStore;
use crate::domain::Region;
use crate::error::AppError;

/// A row-level error encountered during ingest.
#[derive(Debug, Clone)]
pub struct RowError {
    pub line: usize,
    pub region: Option<String>,
    pub message: String,
}

/// Ingest output: regions + row errors + row counts.
#[derive(Debug, Clone)]
pub struct IngestedData {
    pub store: TimeSeriesStore,
    pub row_errors: Vec<RowError>,
    pub rows_read: usize,
    pub rows_used: usize,
    /// Rows for a single sex, or for a region outside the requested set.
    pub rows_filtered: usize,
}

/// Per-region metadata from the optional side file.
#[derive(Debug, Clone, PartialEq)]
pub struct RegionMeta {
    pub name: Option<String>,
    pub population: Option<f64>,
    pub area_km2: Option<f64>,
}

/// Daily values accumulated for one region before alignment.
#[derive(Debug, Default)]
struct RegionRows {
    hosp: BTreeMap<NaiveDate, f64>,
    rea: BTreeMap<NaiveDate, f64>,
    dc: BTreeMap<NaiveDate, f64>,
}

/// Load the hospital CSV, guessing the delimiter from the header line.
///
/// `regions` restricts the store to the given ids when non-empty.
pub fn load_hospital_csv(
    path: &Path,
    regions: &[String],
    metadata: Option<&HashMap<String, RegionMeta>>,
) -> Result<IngestedData, AppError> {
    let mut text = String::new();
    File::open(path)
        .and_then(|mut f| f.read_to_string(&mut text))
        .map_err(|e| AppError::new(2, format!("Failed to read CSV '{}': {e}", path.display())))?;

    let delimiter = detect_delimiter(&text);
    debug!("reading {} with delimiter {:?}", path.display(), delimiter as char);
    read_hospital_csv(text.as_bytes(), delimiter, regions, metadata)
}

/// Parse hospital rows from any reader.
pub fn read_hospital_csv<R: Read>(
    reader: R,
    delimiter: u8,
    regions: &[String],
    metadata: Option<&HashMap<String, RegionMeta>>,
) -> Result<IngestedData, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .delimiter(delimiter)
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);

    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read CSV headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    ensure_required_columns_exist(&header_map)?;

    let wanted: BTreeSet<&str> = regions.iter().map(String::as_str).collect();
    let mut rows: BTreeMap<String, RegionRows> = BTreeMap::new();
    let mut row_errors = Vec::new();
    let mut rows_read = 0usize;
    let mut rows_used = 0usize;
    let mut rows_filtered = 0usize;

    for (idx, result) in reader.records().enumerate() {
        // records() starts after the header; lines are 1-based.
        let line = idx + 2;
        rows_read += 1;

        let record = match result {
            Ok(r) => r,
            Err(e) => {
                row_errors.push(RowError {
                    line,
                    region: None,
                    message: format!("CSV parse error: {e}"),
                });
                continue;
            }
        };

        let region = match get_required(&record, &header_map, "dep") {
            Ok(dep) => normalize_region_id(dep),
            Err(message) => {
                row_errors.push(RowError {
                    line,
                    region: None,
                    message,
                });
                continue;
            }
        };
        let both_sexes = get_optional(&record, &header_map, "sexe").is_none_or(|s| s == "0");
        if !both_sexes || (!wanted.is_empty() && !wanted.contains(region.as_str())) {
            rows_filtered += 1;
            continue;
        }

        let day = match get_required(&record, &header_map, "jour").and_then(parse_date) {
            Ok(d) => d,
            Err(message) => {
                row_errors.push(RowError {
                    line,
                    region: Some(region),
                    message,
                });
                continue;
            }
        };

        let mut cells = [None; 3];
        for (cell, column) in cells.iter_mut().zip(["hosp", "rea", "dc"]) {
            match parse_opt_f64(get_optional(&record, &header_map, column)) {
                Ok(v) => *cell = v,
                // The cell stays missing; the error is the record of it.
                Err(message) => row_errors.push(RowError {
                    line,
                    region: Some(region.clone()),
                    message: format!("column `{column}`: {message}"),
                }),
            }
        }

        let entry = rows.entry(region).or_default();
        // Repeated (region, day) rows are summed.
        for (cell, series) in cells
            .into_iter()
            .zip([&mut entry.hosp, &mut entry.rea, &mut entry.dc])
        {
            if let Some(v) = cell {
                *series.entry(day).or_insert(0.0) += v;
            }
        }
        rows_used += 1;
    }

    if rows_used == 0 {
        return Err(AppError::new(
            3,
            "No valid rows remain after filtering (check `sexe`/`dep` values).",
        ));
    }

    let mut store = TimeSeriesStore::new();
    for (id, r) in rows {
        let to_vec = |m: &BTreeMap<NaiveDate, f64>| -> Vec<(NaiveDate, f64)> {
            m.iter().map(|(d, v)| (*d, *v)).collect()
        };
        let meta = metadata.and_then(|m| m.get(&id));
        let mut region = Region::from_observations(
            id.clone(),
            meta.and_then(|m| m.name.clone()).unwrap_or_else(|| id.clone()),
            meta.and_then(|m| m.population),
            &to_vec(&r.hosp),
            &to_vec(&r.rea),
            &to_vec(&r.dc),
        );
        region.area_km2 = meta.and_then(|m| m.area_km2);
        store.insert(region).map_err(AppError::from)?;
    }

    info!(
        "ingested {} regions from {rows_used} rows ({} row errors, {rows_filtered} filtered)",
        store.len(),
        row_errors.len()
    );

    Ok(IngestedData {
        store,
        row_errors,
        rows_read,
        rows_used,
        rows_filtered,
    })
}

/// Load `id,name,population,area_km2` metadata keyed by region id.
pub fn load_region_metadata(path: &Path) -> Result<HashMap<String, RegionMeta>, AppError> {
    let file = File::open(path).map_err(|e| {
        AppError::new(
            2,
            format!("Failed to open metadata CSV '{}': {e}", path.display()),
        )
    })?;
    read_region_metadata(file)
}

pub fn read_region_metadata<R: Read>(reader: R) -> Result<HashMap<String, RegionMeta>, AppError> {
    let mut reader = csv::ReaderBuilder::new()
        .flexible(true)
        .trim(csv::Trim::All)
        .from_reader(reader);
    let headers = reader
        .headers()
        .map_err(|e| AppError::new(2, format!("Failed to read metadata headers: {e}")))?
        .clone();
    let header_map = build_header_map(&headers);
    if !header_map.contains_key("id") {
        return Err(AppError::new(2, "Missing required metadata column: `id`"));
    }

    let mut out = HashMap::new();
    for (idx, result) in reader.records().enumerate() {
        let record = result.map_err(|e| {
            AppError::new(2, format!("Metadata CSV parse error on line {}: {e}", idx + 2))
        })?;
        let line_error = |e: String| AppError::new(2, format!("Metadata line {}: {e}", idx + 2));
        let id = get_required(&record, &header_map, "id").map_err(line_error)?;
        let population = parse_opt_f64(get_optional(&record, &header_map, "population"))
            .map_err(line_error)?;
        let area_km2 =
            parse_opt_f64(get_optional(&record, &header_map, "area_km2")).map_err(line_error)?;
        out.insert(
            normalize_region_id(id),
            RegionMeta {
                name: get_optional(&record, &header_map, "name").map(str::to_string),
                population: population.filter(|p| *p > 0.0),
                area_km2: area_km2.filter(|a| *a > 0.0),
            },
        );
    }
    Ok(out)
}

fn detect_delimiter(text: &str) -> u8 {
    let header = text.lines().next().unwrap_or_default();
    if header.matches(';').count() > header.matches(',').count() {
        b';'
    } else {
        b','
    }
}

fn build_header_map(headers: &StringRecord) -> HashMap<String, usize> {
    headers
        .iter()
        .enumerate()
        .map(|(idx, name)| (normalize_header_name(name), idx))
        .collect()
}

fn normalize_header_name(name: &str) -> String {
    // Spreadsheet exports sometimes prefix the first header with a BOM.
    let name = name.trim().trim_start_matches('\u{feff}');
    name.to_ascii_lowercase()
}

/// Department codes lose their leading zero in some exports ("1" vs "01").
fn normalize_region_id(raw: &str) -> String {
    let id = raw.trim_matches('"');
    if id.len() == 1 && id.chars().all(|c| c.is_ascii_digit()) {
        format!("0{id}")
    } else {
        id.to_string()
    }
}

fn ensure_required_columns_exist(header_map: &HashMap<String, usize>) -> Result<(), AppError> {
    for column in ["dep", "jour"] {
        if !header_map.contains_key(column) {
            return Err(AppError::new(
                2,
                format!("Missing required column: `{column}`"),
            ));
        }
    }
    if !["hosp", "rea", "dc"]
        .iter()
        .any(|c| header_map.contains_key(*c))
    {
        return Err(AppError::new(
            2,
            "CSV has none of the `hosp`, `rea`, `dc` columns.",
        ));
    }
    Ok(())
}

fn get_required<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Result<&'a str, String> {
    let idx = header_map
        .get(name)
        .ok_or_else(|| format!("Missing required column: `{name}`"))?;
    record
        .get(*idx)
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .ok_or_else(|| format!("Missing required value: `{name}`"))
}

fn get_optional<'a>(
    record: &'a StringRecord,
    header_map: &HashMap<String, usize>,
    name: &str,
) -> Option<&'a str> {
    let idx = header_map.get(name)?;
    record.get(*idx).map(str::trim).filter(|s| !s.is_empty())
}

fn parse_date(s: &str) -> Result<NaiveDate, String> {
    // ISO dates in current releases; older releases used `DD/MM/YYYY`.
    const FMTS: [&str; 3] = ["%Y-%m-%d", "%d/%m/%Y", "%Y/%m/%d"];
    for fmt in FMTS {
        if let Ok(d) = NaiveDate::parse_from_str(s, fmt) {
            return Ok(d);
        }
    }
    Err(format!(
        "Invalid date '{s}'. Expected one of: YYYY-MM-DD, DD/MM/YYYY, YYYY/MM/DD."
    ))
}

/// Empty cells are `Ok(None)`; text that is not a finite number is an error.
fn parse_opt_f64(s: Option<&str>) -> Result<Option<f64>, String> {
    let Some(s) = s else {
        return Ok(None);
    };
    match s.parse::<f64>() {
        Ok(v) if v.is_finite() => Ok(Some(v)),
        Ok(_) => Err(format!("non-finite number '{s}'")),
        Err(_) => Err(format!("invalid number '{s}'")),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE: &str = "\
\"dep\";\"sexe\";\"jour\";\"hosp\";\"rea\";\"rad\";\"dc\"
\"01\";0;2020-03-18;2;0;1;0
\"01\";1;2020-03-18;1;0;1;0
\"01\";0;2020-03-19;3;1;1;1
\"01\";0;2020-03-21;;1;2;2
\"01\";0;bad-date;3;1;1;1
\"2A\";0;2020-03-18;5;1;0;0
";

    fn day(d: u32) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, d).unwrap()
    }

    #[test]
    fn reads_both_sex_rows_and_aligns_days() {
        let data = read_hospital_csv(SAMPLE.as_bytes(), b';', &[], None).unwrap();
        assert_eq!(data.rows_read, 6);
        assert_eq!(data.rows_used, 4);
        assert_eq!(data.rows_filtered, 1);
        assert_eq!(data.row_errors.len(), 1);
        assert_eq!(data.row_errors[0].line, 6);

        let r = data.store.get("01").unwrap();
        assert_eq!(r.dates, vec![day(18), day(19), day(20), day(21)]);
        assert_eq!(r.hosp, vec![Some(2.0), Some(3.0), None, None]);
        assert_eq!(r.dc, vec![Some(0.0), Some(1.0), None, Some(2.0)]);
        assert!(data.store.get("2A").is_some());
    }

    #[test]
    fn region_filter_and_metadata_apply() {
        let meta = read_region_metadata(
            "id,name,population,area_km2\n1,Ain,656955,5762\n".as_bytes(),
        )
        .unwrap();
        let data =
            read_hospital_csv(SAMPLE.as_bytes(), b';', &["01".to_string()], Some(&meta)).unwrap();
        assert_eq!(data.store.len(), 1);
        let r = data.store.get("01").unwrap();
        assert_eq!(r.name, "Ain");
        assert_eq!(r.population, Some(656955.0));
        assert_eq!(r.area_km2, Some(5762.0));
    }

    #[test]
    fn missing_required_column_is_schema_error() {
        let err = read_hospital_csv("dep,hosp\n01,3\n".as_bytes(), b',', &[], None).unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn no_usable_rows_is_insufficient_data() {
        let err =
            read_hospital_csv("dep;sexe;jour;dc\n01;1;2020-03-18;0\n".as_bytes(), b';', &[], None)
                .unwrap_err();
        assert_eq!(err.exit_code(), 3);
    }

    #[test]
    fn malformed_numbers_are_reported_not_dropped() {
        let csv = "dep;sexe;jour;hosp;rea;dc
01;0;2020-03-18;2;1;0
01;0;2020-03-19;abc;1;1
01;0;2020-03-20;4;inf;2
";
        let data = read_hospital_csv(csv.as_bytes(), b';', &[], None).unwrap();
        assert_eq!(data.rows_used, 3);
        assert_eq!(data.row_errors.len(), 2);
        let e = &data.row_errors[0];
        assert_eq!(e.line, 3);
        assert_eq!(e.region.as_deref(), Some("01"));
        assert!(e.message.contains("`hosp`") && e.message.contains("'abc'"));
        assert!(data.row_errors[1].message.contains("`rea`"));

        let r = data.store.get("01").unwrap();
        assert_eq!(r.hosp, vec![Some(2.0), None, Some(4.0)]);
        assert_eq!(r.rea, vec![Some(1.0), Some(1.0), None]);
        assert_eq!(r.dc, vec![Some(0.0), Some(1.0), Some(2.0)]);
    }

    #[test]
    fn malformed_metadata_number_is_schema_error() {
        let err = read_region_metadata("id,name,population\n75,Paris,lots\n".as_bytes())
            .unwrap_err();
        assert_eq!(err.exit_code(), 2);
    }

    #[test]
    fn delimiter_detection() {
        assert_eq!(detect_delimiter("dep;sexe;jour\n"), b';');
        assert_eq!(detect_delimiter("id,name,population\n"), b',');
    }
}
