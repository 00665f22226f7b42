//! Hourly and daily statistics over per-breath results.
//!
//! Raw columns keep one entry per breath with NaN gaps for rejected breaths;
//! statistics skip the gaps. An empty scope produces a summary whose
//! statistics are all `None`.

use crate::numeric::{finite_max, finite_min, median, quantile_sorted, round_to};
use crate::recording::RecordingKey;
use crate::types::{BreathLabel, BreathRecord, Parameter, ParameterSet, Series};
use serde::{Deserialize, Serialize};

/// Quantile levels reported for every parameter
pub const QUANTILES: [f64; 5] = [0.05, 0.25, 0.5, 0.75, 0.95];

/// Decimal places of asynchrony indices and magnitudes
const PERCENT_DECIMALS: i32 = 2;

/// Quantiles and extrema of one parameter, rounded to the parameter's
/// decimals. Tidal volume uses 0 decimals, so its values are whole
/// millilitres carried as `f64` and serialized as e.g. `380.0`.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ParameterStats {
    pub q5: f64,
    pub q25: f64,
    pub q50: f64,
    pub q75: f64,
    pub q95: f64,
    pub min: f64,
    pub max: f64,
}

impl ParameterStats {
    /// Statistics over the finite values, `None` when there are none
    pub fn from_values(values: &[f64], decimals: i32) -> Option<Self> {
        let mut sorted: Vec<f64> = values.iter().copied().filter(|v| v.is_finite()).collect();
        if sorted.is_empty() {
            return None;
        }
        sorted.sort_by(f64::total_cmp);

        let q = |level: f64| quantile_sorted(&sorted, level).map(|v| round_to(v, decimals));
        Some(Self {
            q5: q(QUANTILES[0])?,
            q25: q(QUANTILES[1])?,
            q50: q(QUANTILES[2])?,
            q75: q(QUANTILES[3])?,
            q95: q(QUANTILES[4])?,
            min: round_to(finite_min(&sorted)?, decimals),
            max: round_to(finite_max(&sorted)?, decimals),
        })
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LabelCounts {
    pub normal: usize,
    pub asynchrony: usize,
    pub unclassified: usize,
}

impl LabelCounts {
    pub fn from_labels(labels: &[BreathLabel]) -> Self {
        labels.iter().fold(Self::default(), |mut acc, label| {
            match label {
                BreathLabel::Normal => acc.normal += 1,
                BreathLabel::Asynchrony => acc.asynchrony += 1,
                BreathLabel::Unclassified => acc.unclassified += 1,
            }
            acc
        })
    }

    pub fn classified(&self) -> usize {
        self.normal + self.asynchrony
    }

    /// Share of asynchronous breaths among classified breaths, percent
    pub fn asynchrony_index(&self) -> Option<f64> {
        match self.classified() {
            0 => None,
            total => Some(round_to(
                self.asynchrony as f64 / total as f64 * 100.0,
                PERCENT_DECIMALS,
            )),
        }
    }
}

/// Statistics of one scope (an hour or a whole day).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Summary {
    pub breath_count: usize,
    /// Per-breath values in reporting units (tidal volume in mL)
    pub raw: ParameterSet<Series>,
    pub labels: Vec<BreathLabel>,
    pub magnitudes: Series,
    pub stats: ParameterSet<Option<ParameterStats>>,
    pub label_counts: LabelCounts,
    pub asynchrony_index: Option<f64>,
    pub magnitude_stats: Option<ParameterStats>,
    /// Mean magnitude over breaths with a magnitude
    pub mean_magnitude: Option<f64>,
    /// Mean magnitude where only asynchronous breaths contribute their value
    /// and every other breath contributes 0
    pub mean_asynchrony_magnitude: Option<f64>,
}

fn finite_mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values
        .filter(|v| v.is_finite())
        .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| round_to(sum / count as f64, PERCENT_DECIMALS))
}

impl Summary {
    fn from_columns(raw: ParameterSet<Series>, labels: Vec<BreathLabel>, magnitudes: Series) -> Self {
        let stats = raw.map(|p, values| ParameterStats::from_values(values, p.decimals()));
        let label_counts = LabelCounts::from_labels(&labels);

        let mean_asynchrony_magnitude = finite_mean(
            labels
                .iter()
                .zip(magnitudes.iter())
                .map(|(label, &m)| if *label == BreathLabel::Asynchrony { m } else { 0.0 }),
        );

        Self {
            breath_count: raw.ers.len(),
            magnitude_stats: ParameterStats::from_values(&magnitudes, PERCENT_DECIMALS),
            mean_magnitude: finite_mean(magnitudes.iter().copied()),
            mean_asynchrony_magnitude,
            asynchrony_index: label_counts.asynchrony_index(),
            label_counts,
            stats,
            raw,
            labels,
            magnitudes,
        }
    }

    /// Summary of a breath sequence
    pub fn from_records(records: &[BreathRecord]) -> Self {
        let raw = ParameterSet::from_fn(|p| {
            records.iter().map(|r| r.mechanics.reported(p)).collect::<Series>()
        });
        Self::from_columns(
            raw,
            records.iter().map(|r| r.label).collect(),
            records.iter().map(|r| r.magnitude).collect(),
        )
    }

    /// The defined "no data" summary
    pub fn empty() -> Self {
        Self::from_records(&[])
    }

    /// Concatenate the raw columns of several summaries, in order
    pub fn concatenate<'a>(parts: impl IntoIterator<Item = &'a Summary>) -> Self {
        let mut raw: ParameterSet<Vec<f64>> = ParameterSet::default();
        let mut labels = Vec::new();
        let mut magnitudes = Vec::new();
        for part in parts {
            for p in Parameter::ALL {
                column_mut(&mut raw, p).extend_from_slice(part.raw.get(p));
            }
            labels.extend_from_slice(&part.labels);
            magnitudes.extend_from_slice(&part.magnitudes);
        }
        Self::from_columns(raw.map(|_, v| Series::new(v.clone())), labels, Series::new(magnitudes))
    }

    /// True when at least one breath has mechanics
    pub fn has_data(&self) -> bool {
        self.stats.ers.is_some()
    }

    /// Asynchrony percentage used for day-level trends: 0 without labels
    pub fn asynchrony_percentage(&self) -> f64 {
        match self.label_counts.classified() {
            0 => 0.0,
            total => self.label_counts.asynchrony as f64 / total as f64 * 100.0,
        }
    }
}

fn column_mut(set: &mut ParameterSet<Vec<f64>>, parameter: Parameter) -> &mut Vec<f64> {
    match parameter {
        Parameter::Ers => &mut set.ers,
        Parameter::Rrs => &mut set.rrs,
        Parameter::Peep => &mut set.peep,
        Parameter::Pip => &mut set.pip,
        Parameter::TidalVolume => &mut set.tidal_volume,
        Parameter::DrivingPressure => &mut set.driving_pressure,
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HourlySummary {
    /// Absent when the recording name does not follow the naming scheme
    pub key: Option<RecordingKey>,
    #[serde(flatten)]
    pub summary: Summary,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailySummary {
    pub patient: String,
    pub date: String,
    /// Over the concatenation of every hour of the day
    pub overall: Summary,
    /// Ordered by hour
    pub hours: Vec<HourlySummary>,
    /// Median of the hourly asynchrony percentages
    pub median_hourly_asynchrony: Option<f64>,
}

pub fn summarize_hour(key: Option<RecordingKey>, records: &[BreathRecord]) -> HourlySummary {
    HourlySummary {
        key,
        summary: Summary::from_records(records),
    }
}

/// Day summary of one patient. Hours are sorted before concatenation.
pub fn summarize_day(patient: &str, date: &str, mut hours: Vec<HourlySummary>) -> DailySummary {
    hours.sort_by(|a, b| a.key.cmp(&b.key));

    let overall = Summary::concatenate(hours.iter().map(|h| &h.summary));
    let percentages: Vec<f64> = hours.iter().map(|h| h.summary.asynchrony_percentage()).collect();

    DailySummary {
        patient: patient.to_string(),
        date: date.to_string(),
        overall,
        median_hourly_asynchrony: median(&percentages).map(|m| round_to(m, PERCENT_DECIMALS)),
        hours,
    }
}

/// Group keyed hourly summaries into one summary per patient-day, ordered by
/// patient and date. Unkeyed hours are skipped.
pub fn daily_summaries(hours: impl IntoIterator<Item = HourlySummary>) -> Vec<DailySummary> {
    let mut keyed: Vec<HourlySummary> = hours.into_iter().filter(|h| h.key.is_some()).collect();
    keyed.sort_by(|a, b| a.key.cmp(&b.key));

    let mut days: Vec<DailySummary> = Vec::new();
    let mut current: Vec<HourlySummary> = Vec::new();
    let mut current_day: Option<(String, String)> = None;

    for hour in keyed {
        let day = hour
            .key
            .as_ref()
            .map(|k| (k.patient.clone(), k.date.clone()));
        if day != current_day {
            if let Some((patient, date)) = current_day.take() {
                days.push(summarize_day(&patient, &date, std::mem::take(&mut current)));
            }
            current_day = day;
        }
        current.push(hour);
    }
    if let Some((patient, date)) = current_day {
        days.push(summarize_day(&patient, &date, current));
    }

    days
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::MechanicsResult;

    fn record(number: u64, ers: f64, tv: f64, label: BreathLabel, magnitude: f64) -> BreathRecord {
        BreathRecord {
            number,
            length: 60,
            mechanics: MechanicsResult {
                ers,
                rrs: 8.0,
                peep: 5.0,
                pip: 20.0,
                tidal_volume: tv,
                driving_pressure: 15.0,
                ie_ratio: 1.5,
                expired_volume: tv,
            },
            label,
            magnitude,
        }
    }

    fn rejected(number: u64) -> BreathRecord {
        BreathRecord {
            number,
            length: 12,
            mechanics: MechanicsResult::missing(),
            label: BreathLabel::Unclassified,
            magnitude: f64::NAN,
        }
    }

    #[test]
    fn test_quantiles_with_nan_gaps() {
        let records = vec![
            record(1, 10.0, 0.4, BreathLabel::Normal, 1.0),
            rejected(2),
            record(3, 20.0, 0.5, BreathLabel::Normal, 2.0),
            record(4, 30.0, 0.6, BreathLabel::Asynchrony, 3.0),
            record(5, 40.0, 0.7, BreathLabel::Normal, 4.0),
        ];
        let s = Summary::from_records(&records);

        assert_eq!(s.breath_count, 5);
        assert_eq!(s.raw.ers.len(), 5);
        assert!(s.raw.ers[1].is_nan());

        let ers = s.stats.ers.unwrap();
        assert_eq!(ers.q50, 25.0);
        assert_eq!(ers.q5, 11.5);
        assert_eq!(ers.q95, 38.5);
        assert_eq!(ers.min, 10.0);
        assert_eq!(ers.max, 40.0);

        let tv = s.stats.tidal_volume.unwrap();
        assert_eq!(tv.q50, 550.0);
        assert_eq!(tv.q5, 415.0);
        assert_eq!(s.raw.tidal_volume[0], 400.0);
    }

    #[test]
    fn test_tidal_volume_stats_are_whole_millilitres() {
        let records = vec![
            record(1, 10.0, 0.4, BreathLabel::Normal, 1.0),
            record(2, 10.0, 0.45, BreathLabel::Normal, 1.0),
        ];
        let tv = Summary::from_records(&records).stats.tidal_volume.unwrap();

        // 412.5 rounds half away from zero
        assert_eq!(tv.q25, 413.0);
        for v in [tv.q5, tv.q25, tv.q50, tv.q75, tv.q95, tv.min, tv.max] {
            assert_eq!(v.fract(), 0.0);
        }
        let json = serde_json::to_value(tv).unwrap();
        assert_eq!(json["q25"], serde_json::json!(413.0));
    }

    #[test]
    fn test_asynchrony_index() {
        let counts = LabelCounts {
            normal: 2,
            asynchrony: 1,
            unclassified: 4,
        };
        assert_eq!(counts.asynchrony_index(), Some(33.33));
        assert_eq!(LabelCounts::default().asynchrony_index(), None);
    }

    #[test]
    fn test_empty_scope_has_no_data() {
        let s = Summary::empty();
        assert_eq!(s.breath_count, 0);
        assert!(!s.has_data());
        for p in Parameter::ALL {
            assert!(s.stats.get(p).is_none());
        }
        assert_eq!(s.asynchrony_index, None);
        assert_eq!(s.magnitude_stats, None);
        assert_eq!(s.mean_magnitude, None);
    }

    #[test]
    fn test_all_rejected_has_no_data() {
        let s = Summary::from_records(&[rejected(1), rejected(2)]);
        assert_eq!(s.breath_count, 2);
        assert!(!s.has_data());
        assert_eq!(s.label_counts.unclassified, 2);
    }

    #[test]
    fn test_magnitude_means() {
        let records = vec![
            record(1, 10.0, 0.4, BreathLabel::Asynchrony, 30.0),
            record(2, 10.0, 0.4, BreathLabel::Normal, 10.0),
            record(3, 10.0, 0.4, BreathLabel::Asynchrony, f64::NAN),
            record(4, 10.0, 0.4, BreathLabel::Normal, 2.0),
        ];
        let s = Summary::from_records(&records);
        assert_eq!(s.mean_magnitude, Some(14.0));
        // 30 + 0 + 0 over three breaths with a value
        assert_eq!(s.mean_asynchrony_magnitude, Some(10.0));
    }

    #[test]
    fn test_reversed_order_gives_identical_statistics() {
        let records = vec![
            record(1, 12.3, 0.41, BreathLabel::Normal, 1.5),
            record(2, 18.7, 0.52, BreathLabel::Asynchrony, 7.25),
        ];
        let reversed: Vec<BreathRecord> = records.iter().rev().cloned().collect();

        let a = Summary::from_records(&records);
        let b = Summary::from_records(&reversed);
        assert_eq!(a.stats, b.stats);
        assert_eq!(a.magnitude_stats, b.magnitude_stats);
        assert_eq!(a.asynchrony_index, b.asynchrony_index);
    }

    #[test]
    fn test_day_concatenates_sorted_hours() {
        let key = |hour: &str| Some(RecordingKey::new("P1", "20210314", hour));
        let late = summarize_hour(
            key("09-00-00"),
            &[record(1, 30.0, 0.5, BreathLabel::Asynchrony, 5.0)],
        );
        let early = summarize_hour(
            key("08-00-00"),
            &[
                record(1, 10.0, 0.4, BreathLabel::Normal, 1.0),
                record(2, 20.0, 0.4, BreathLabel::Normal, 1.0),
            ],
        );

        let day = summarize_day("P1", "20210314", vec![late.clone(), early.clone()]);
        let sorted = summarize_day("P1", "20210314", vec![early, late]);
        assert_eq!(day, sorted);

        assert_eq!(day.hours[0].key.as_ref().unwrap().hour, "08-00-00");
        assert_eq!(day.overall.breath_count, 3);
        assert_eq!(&day.overall.raw.ers[..], &[10.0, 20.0, 30.0]);
        assert_eq!(day.overall.stats.ers.unwrap().q50, 20.0);
        // hourly percentages 0 and 100
        assert_eq!(day.median_hourly_asynchrony, Some(50.0));
        assert_eq!(day.overall.asynchrony_index, Some(33.33));
    }

    #[test]
    fn test_daily_summaries_group_by_patient_and_date() {
        let hour = |patient: &str, date: &str, h: &str| {
            summarize_hour(
                Some(RecordingKey::new(patient, date, h)),
                &[record(1, 10.0, 0.4, BreathLabel::Normal, 1.0)],
            )
        };
        let days = daily_summaries(vec![
            hour("P2", "20210314", "08-00-00"),
            hour("P1", "20210315", "08-00-00"),
            hour("P1", "20210314", "10-00-00"),
            summarize_hour(None, &[]),
            hour("P1", "20210314", "09-00-00"),
        ]);

        let scopes: Vec<(&str, &str, usize)> = days
            .iter()
            .map(|d| (d.patient.as_str(), d.date.as_str(), d.hours.len()))
            .collect();
        assert_eq!(
            scopes,
            vec![("P1", "20210314", 2), ("P1", "20210315", 1), ("P2", "20210314", 1)]
        );
    }

    #[test]
    fn test_summary_json_keeps_nan_gaps() {
        let hour = summarize_hour(None, &[rejected(1), record(2, 10.0, 0.4, BreathLabel::Normal, 1.0)]);
        let json = serde_json::to_string(&hour).unwrap();
        let back: HourlySummary = serde_json::from_str(&json).unwrap();
        assert!(back.summary.raw.ers[0].is_nan());
        assert_eq!(back.summary.raw.ers[1], 10.0);
        assert_eq!(back.summary.stats, hour.summary.stats);
    }
}
