//! In-memory region store and observable extraction.
//!
//! Regions enter the store with their raw, possibly gappy, daily series. The
//! numerical stages never see gaps: `Region::observable` resolves them and
//! records every date it had to impute or drop.

use std::collections::BTreeMap;
use std::str::FromStr;

use chrono::{Duration, NaiveDate};

use crate::domain::{Observable, ObservableSeries, Region};
use crate::error::{AnalysisError, AnalysisResult};
use crate::math::centered_moving_average;

/// Regions keyed by id, iterated in id order.
#[derive(Debug, Clone, Default)]
pub struct TimeSeriesStore {
    regions: BTreeMap<String, Region>,
}

impl TimeSeriesStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a region, replacing any previous region with the same id.
    ///
    /// Fails with `InvalidConfig` when the series are not aligned on a run of
    /// consecutive days.
    pub fn insert(&mut self, region: Region) -> AnalysisResult<()> {
        check_alignment(&region)?;
        self.regions.insert(region.id.clone(), region);
        Ok(())
    }

    pub fn get(&self, id: &str) -> Option<&Region> {
        self.regions.get(id)
    }

    pub fn len(&self) -> usize {
        self.regions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.regions.is_empty()
    }

    pub fn regions(&self) -> impl Iterator<Item = &Region> {
        self.regions.values()
    }

    pub fn from_regions(regions: impl IntoIterator<Item = Region>) -> AnalysisResult<Self> {
        let mut store = Self::new();
        for region in regions {
            store.insert(region)?;
        }
        Ok(store)
    }

    /// Replace the group's member regions by one region whose raw series are
    /// their day-by-day sums.
    ///
    /// A day keeps a value only when every member reports one; otherwise it
    /// stays `None` and is resolved (and recorded) like any other gap.
    /// Population and area are summed when every member has them.
    pub fn merge_regions(&mut self, group: &RegionGroup) -> AnalysisResult<()> {
        if group.members.is_empty() {
            return Err(AnalysisError::InvalidConfig(format!(
                "group {}: no member regions",
                group.id
            )));
        }
        if self.regions.contains_key(&group.id) && !group.members.contains(&group.id) {
            return Err(AnalysisError::InvalidConfig(format!(
                "group {}: id already used by another region",
                group.id
            )));
        }
        let mut parts = Vec::with_capacity(group.members.len());
        for id in &group.members {
            let region = self.regions.get(id).ok_or_else(|| {
                AnalysisError::InvalidConfig(format!("group {}: unknown region {id}", group.id))
            })?;
            parts.push(region);
        }

        let merged = sum_regions(group, &parts);
        for id in &group.members {
            self.regions.remove(id);
        }
        self.insert(merged)
    }
}

/// Named set of regions analysed as one.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RegionGroup {
    pub id: String,
    pub name: String,
    pub members: Vec<String>,
}

impl RegionGroup {
    pub fn new(name: impl Into<String>, members: &[&str]) -> Self {
        let name = name.into();
        Self {
            id: name.clone(),
            name,
            members: members.iter().map(|m| m.to_string()).collect(),
        }
    }
}

impl FromStr for RegionGroup {
    type Err = String;

    /// `NAME=ID,ID,...`
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (name, members) = s
            .split_once('=')
            .ok_or_else(|| format!("expected NAME=ID,ID,... (got '{s}')"))?;
        let name = name.trim();
        let members: Vec<&str> = members
            .split(',')
            .map(str::trim)
            .filter(|m| !m.is_empty())
            .collect();
        if name.is_empty() || members.is_empty() {
            return Err(format!("expected NAME=ID,ID,... (got '{s}')"));
        }
        Ok(Self::new(name, &members))
    }
}

fn sum_regions(group: &RegionGroup, parts: &[&Region]) -> Region {
    let first = parts.iter().filter_map(|r| r.dates.first()).min().copied();
    let last = parts.iter().filter_map(|r| r.dates.last()).max().copied();
    let dates: Vec<NaiveDate> = match (first, last) {
        (Some(first), Some(last)) => first.iter_days().take_while(|d| *d <= last).collect(),
        _ => Vec::new(),
    };

    let sum = |kind: Observable| -> Vec<Option<f64>> {
        dates
            .iter()
            .map(|d| {
                parts
                    .iter()
                    .map(|r| value_on(r, r.raw(kind), *d))
                    .sum::<Option<f64>>()
            })
            .collect()
    };
    let total = |field: fn(&Region) -> Option<f64>| -> Option<f64> {
        parts.iter().map(|r| field(r)).sum()
    };

    Region {
        id: group.id.clone(),
        name: group.name.clone(),
        population: total(|r| r.population),
        area_km2: total(|r| r.area_km2),
        hosp: sum(Observable::Hosp),
        rea: sum(Observable::Rea),
        dc: sum(Observable::DcDiff),
        dates,
    }
}

/// Raw value of `series` (aligned on `region.dates`) on `day`.
fn value_on(region: &Region, series: &[Option<f64>], day: NaiveDate) -> Option<f64> {
    let start = *region.dates.first()?;
    let idx = usize::try_from((day - start).num_days()).ok()?;
    series.get(idx).copied().flatten()
}

fn check_alignment(region: &Region) -> AnalysisResult<()> {
    let n = region.dates.len();
    if region.hosp.len() != n || region.rea.len() != n || region.dc.len() != n {
        return Err(AnalysisError::InvalidConfig(format!(
            "region {}: series lengths (hosp={}, rea={}, dc={}) differ from {n} dates",
            region.id,
            region.hosp.len(),
            region.rea.len(),
            region.dc.len()
        )));
    }
    if let Some(w) = region
        .dates
        .windows(2)
        .find(|w| w[1] - w[0] != Duration::days(1))
    {
        return Err(AnalysisError::InvalidConfig(format!(
            "region {}: dates {} and {} are not consecutive",
            region.id, w[0], w[1]
        )));
    }
    Ok(())
}

/// `(date, value)` observations of one raw series.
pub type Observations = [(NaiveDate, f64)];

impl Region {
    /// Build a region from ordered `(date, value)` tuples per raw series.
    ///
    /// The date index spans the earliest to the latest date seen in any
    /// series; days a series has no tuple for are `None`.
    pub fn from_observations(
        id: impl Into<String>,
        name: impl Into<String>,
        population: Option<f64>,
        hosp: &Observations,
        rea: &Observations,
        dc: &Observations,
    ) -> Self {
        let all = hosp.iter().chain(rea).chain(dc).map(|(d, _)| *d);
        let (first, last) = (all.clone().min(), all.max());

        let dates: Vec<NaiveDate> = match (first, last) {
            (Some(first), Some(last)) => first.iter_days().take_while(|d| *d <= last).collect(),
            _ => Vec::new(),
        };
        let align = |obs: &Observations| -> Vec<Option<f64>> {
            let by_date: BTreeMap<NaiveDate, f64> = obs.iter().copied().collect();
            dates.iter().map(|d| by_date.get(d).copied()).collect()
        };

        Region {
            id: id.into(),
            name: name.into(),
            population,
            area_km2: None,
            hosp: align(hosp),
            rea: align(rea),
            dc: align(dc),
            dates,
        }
    }

    /// Copy of the region restricted to `[start, end]` (either bound optional).
    pub fn restricted(&self, start: Option<NaiveDate>, end: Option<NaiveDate>) -> Region {
        let keep: Vec<usize> = self
            .dates
            .iter()
            .enumerate()
            .filter(|(_, d)| start.is_none_or(|s| **d >= s) && end.is_none_or(|e| **d <= e))
            .map(|(i, _)| i)
            .collect();
        let pick = |v: &[Option<f64>]| -> Vec<Option<f64>> {
            keep.iter().map(|&i| v[i]).collect()
        };
        Region {
            id: self.id.clone(),
            name: self.name.clone(),
            population: self.population,
            area_km2: self.area_km2,
            dates: keep.iter().map(|&i| self.dates[i]).collect(),
            hosp: pick(&self.hosp),
            rea: pick(&self.rea),
            dc: pick(&self.dc),
        }
    }

    /// Raw series an observable is derived from.
    pub fn raw(&self, kind: Observable) -> &[Option<f64>] {
        match kind {
            Observable::Hosp | Observable::HospDiff => &self.hosp,
            Observable::Rea => &self.rea,
            Observable::DcDiff => &self.dc,
        }
    }

    /// Gap-free observable, optionally smoothed by a centred moving average.
    ///
    /// Leading/trailing gaps of the underlying raw series are trimmed and
    /// interior gaps linearly interpolated before differencing. Fails with
    /// `DegenerateSeries` when the raw series has no value at all.
    pub fn observable(
        &self,
        kind: Observable,
        smoothing: usize,
    ) -> AnalysisResult<ObservableSeries> {
        let raw = self.raw(kind);

        let first = raw.iter().position(Option::is_some);
        let last = raw.iter().rposition(Option::is_some);
        let (Some(first), Some(last)) = (first, last) else {
            return Err(AnalysisError::DegenerateSeries(format!(
                "region {}: no {} observations",
                self.id,
                kind.label()
            )));
        };

        let trimmed: Vec<NaiveDate> = self.dates[..first]
            .iter()
            .chain(&self.dates[last + 1..])
            .copied()
            .collect();
        let dates = self.dates[first..=last].to_vec();
        let (mut values, imputed_idx) = interpolate_gaps(&raw[first..=last]);
        let imputed = imputed_idx.into_iter().map(|i| dates[i]).collect();

        if matches!(kind, Observable::HospDiff | Observable::DcDiff) {
            values = first_difference(&values);
        }
        if smoothing > 1 {
            values = centered_moving_average(&values, smoothing);
        }

        Ok(ObservableSeries {
            region_id: self.id.clone(),
            observable: kind,
            dates,
            values,
            imputed,
            trimmed,
        })
    }
}

/// Linear interpolation across interior `None` runs.
///
/// The first and last entries must be `Some`. Returns the filled values and
/// the indices that were filled.
fn interpolate_gaps(raw: &[Option<f64>]) -> (Vec<f64>, Vec<usize>) {
    let mut values = Vec::with_capacity(raw.len());
    let mut imputed = Vec::new();
    let mut prev: Option<(usize, f64)> = None;

    for (i, v) in raw.iter().enumerate() {
        match v {
            Some(v) => {
                if let Some((p, pv)) = prev {
                    let span = (i - p) as f64;
                    for j in p + 1..i {
                        let u = (j - p) as f64 / span;
                        values.push(pv + u * (v - pv));
                        imputed.push(j);
                    }
                }
                values.push(*v);
                prev = Some((i, *v));
            }
            // Interior gap; filled once the next value is known.
            None => {}
        }
    }
    (values, imputed)
}

/// `out[0] = 0`, `out[i] = v[i] − v[i − 1]`.
fn first_difference(values: &[f64]) -> Vec<f64> {
    let mut out = Vec::with_capacity(values.len());
    if values.is_empty() {
        return out;
    }
    out.push(0.0);
    out.extend(values.windows(2).map(|w| w[1] - w[0]));
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn day(i: i64) -> NaiveDate {
        NaiveDate::from_ymd_opt(2020, 3, 18).unwrap() + Duration::days(i)
    }

    fn region(dc: Vec<Option<f64>>) -> Region {
        let n = dc.len();
        Region {
            id: "31".into(),
            name: "Haute-Garonne".into(),
            population: Some(1.4e6),
            area_km2: Some(6309.0),
            dates: (0..n as i64).map(day).collect(),
            hosp: vec![Some(1.0); n],
            rea: vec![Some(1.0); n],
            dc,
        }
    }

    #[test]
    fn dc_diff_is_first_difference() {
        let r = region(vec![Some(0.0), Some(2.0), Some(5.0), Some(9.0)]);
        let s = r.observable(Observable::DcDiff, 1).unwrap();
        assert_eq!(s.values, vec![0.0, 2.0, 3.0, 4.0]);
        assert!(s.imputed.is_empty() && s.trimmed.is_empty());
    }

    #[test]
    fn gaps_are_interpolated_or_trimmed_and_recorded() {
        let r = region(vec![None, Some(1.0), None, None, Some(4.0), Some(5.0), None]);
        let s = r.observable(Observable::DcDiff, 1).unwrap();
        assert_eq!(s.dates, (1..=5).map(day).collect::<Vec<_>>());
        assert_eq!(s.imputed, vec![day(2), day(3)]);
        assert_eq!(s.trimmed, vec![day(0), day(6)]);
        // cumulative 1, 2, 3, 4, 5 → daily 0, 1, 1, 1, 1
        for (got, want) in s.values.iter().zip([0.0, 1.0, 1.0, 1.0, 1.0]) {
            assert!((got - want).abs() < 1e-12);
        }
    }

    #[test]
    fn all_missing_is_degenerate() {
        let r = region(vec![None; 5]);
        assert!(matches!(
            r.observable(Observable::DcDiff, 1),
            Err(AnalysisError::DegenerateSeries(_))
        ));
    }

    #[test]
    fn smoothing_keeps_length() {
        let r = region((0..20).map(|i| Some((i * i) as f64)).collect());
        let s = r.observable(Observable::DcDiff, 7).unwrap();
        assert_eq!(s.len(), 20);
    }

    #[test]
    fn store_rejects_misaligned_regions() {
        let mut r = region(vec![Some(1.0); 4]);
        r.hosp.pop();
        let mut store = TimeSeriesStore::new();
        assert!(store.insert(r).is_err());
        assert!(store.is_empty());
    }

    #[test]
    fn from_observations_fills_missing_days() {
        let hosp = [(day(0), 3.0), (day(2), 5.0)];
        let dc = [(day(1), 1.0)];
        let r = Region::from_observations("06", "Alpes-Maritimes", None, &hosp, &[], &dc);
        assert_eq!(r.dates, vec![day(0), day(1), day(2)]);
        assert_eq!(r.hosp, vec![Some(3.0), None, Some(5.0)]);
        assert_eq!(r.rea, vec![None, None, None]);
        assert_eq!(r.dc, vec![None, Some(1.0), None]);

        let store = TimeSeriesStore::from_regions([r]).unwrap();
        assert_eq!(store.len(), 1);
        assert!(store.get("06").is_some());
    }

    #[test]
    fn restricted_keeps_date_range() {
        let r = region((0..10).map(|i| Some(i as f64)).collect());
        let cut = r.restricted(Some(day(2)), Some(day(5)));
        assert_eq!(cut.dates.len(), 4);
        assert_eq!(cut.dc[0], Some(2.0));
    }

    fn department(id: &str, offset: i64, dc: Vec<Option<f64>>) -> Region {
        let n = dc.len();
        Region {
            id: id.into(),
            name: id.into(),
            population: Some(1e5),
            area_km2: None,
            dates: (0..n as i64).map(|i| day(i + offset)).collect(),
            hosp: vec![Some(2.0); n],
            rea: vec![Some(1.0); n],
            dc,
        }
    }

    #[test]
    fn merge_sums_members_day_by_day() {
        let mut store = TimeSeriesStore::from_regions([
            department("67", 0, vec![Some(1.0), Some(2.0), Some(4.0)]),
            department("68", 1, vec![Some(10.0), None, Some(30.0)]),
            department("75", 0, vec![Some(5.0); 3]),
        ])
        .unwrap();
        let group = RegionGroup::new("Grand Est", &["67", "68"]);
        store.merge_regions(&group).unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.get("67").is_none() && store.get("68").is_none());
        let merged = store.get("Grand Est").unwrap();
        assert_eq!(merged.dates, (0..4).map(day).collect::<Vec<_>>());
        // Day 0 and day 3 are missing for one member; day 2 is missing in 68.
        assert_eq!(merged.dc, vec![None, Some(12.0), None, None]);
        assert_eq!(merged.hosp, vec![None, Some(4.0), Some(4.0), None]);
        assert_eq!(merged.population, Some(2e5));
        assert_eq!(merged.area_km2, None);
    }

    #[test]
    fn merge_rejects_unknown_members_and_taken_ids() {
        let mut store =
            TimeSeriesStore::from_regions([department("75", 0, vec![Some(1.0); 3])]).unwrap();
        let unknown = RegionGroup::new("IDF", &["75", "77"]);
        assert!(matches!(
            store.merge_regions(&unknown),
            Err(AnalysisError::InvalidConfig(_))
        ));
        assert!(store.get("75").is_some());

        let mut store = TimeSeriesStore::from_regions([
            department("75", 0, vec![Some(1.0); 3]),
            department("92", 0, vec![Some(1.0); 3]),
        ])
        .unwrap();
        let taken = RegionGroup::new("92", &["75"]);
        assert!(store.merge_regions(&taken).is_err());
    }

    #[test]
    fn group_parses_from_text() {
        let g: RegionGroup = "Île-de-France=75, 77,78".parse().unwrap();
        assert_eq!(g.id, "Île-de-France");
        assert_eq!(g.members, vec!["75", "77", "78"]);
        assert!("75,77".parse::<RegionGroup>().is_err());
        assert!("IDF=".parse::<RegionGroup>().is_err());
    }
}
