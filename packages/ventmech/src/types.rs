use serde::{Deserialize, Deserializer, Serialize};
use std::ops::Deref;

/// A closed breath: the samples between a start and an end marker.
///
/// Pressure and flow are stored as separate columns so a breath built outside
/// the parser can carry sequences of unequal length, which the mechanics gate
/// rejects explicitly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Breath {
    number: u64,
    pressure: Vec<f64>,
    flow: Vec<f64>,
}

impl Breath {
    pub fn new(number: u64, pressure: Vec<f64>, flow: Vec<f64>) -> Self {
        Self {
            number,
            pressure,
            flow,
        }
    }

    /// Breath number parsed from the start marker (0 when unparsable)
    pub fn number(&self) -> u64 {
        self.number
    }

    pub fn pressure(&self) -> &[f64] {
        &self.pressure
    }

    pub fn flow(&self) -> &[f64] {
        &self.flow
    }

    /// Sample count, taken from the pressure column
    pub fn len(&self) -> usize {
        self.pressure.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pressure.is_empty()
    }
}

/// Mechanics parameters reported per breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Parameter {
    Ers,
    Rrs,
    Peep,
    Pip,
    TidalVolume,
    DrivingPressure,
}

impl Parameter {
    pub const ALL: [Parameter; 6] = [
        Parameter::Ers,
        Parameter::Rrs,
        Parameter::Peep,
        Parameter::Pip,
        Parameter::TidalVolume,
        Parameter::DrivingPressure,
    ];

    /// Decimal places kept in summary statistics
    pub fn decimals(self) -> i32 {
        match self {
            Parameter::TidalVolume => 0,
            _ => 1,
        }
    }
}

/// Fixed-field container with one slot per [`Parameter`].
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ParameterSet<T> {
    pub ers: T,
    pub rrs: T,
    pub peep: T,
    pub pip: T,
    pub tidal_volume: T,
    pub driving_pressure: T,
}

impl<T> ParameterSet<T> {
    pub fn from_fn(mut f: impl FnMut(Parameter) -> T) -> Self {
        Self {
            ers: f(Parameter::Ers),
            rrs: f(Parameter::Rrs),
            peep: f(Parameter::Peep),
            pip: f(Parameter::Pip),
            tidal_volume: f(Parameter::TidalVolume),
            driving_pressure: f(Parameter::DrivingPressure),
        }
    }

    pub fn get(&self, parameter: Parameter) -> &T {
        match parameter {
            Parameter::Ers => &self.ers,
            Parameter::Rrs => &self.rrs,
            Parameter::Peep => &self.peep,
            Parameter::Pip => &self.pip,
            Parameter::TidalVolume => &self.tidal_volume,
            Parameter::DrivingPressure => &self.driving_pressure,
        }
    }

    pub fn map<U>(&self, mut f: impl FnMut(Parameter, &T) -> U) -> ParameterSet<U> {
        ParameterSet::from_fn(|p| f(p, self.get(p)))
    }
}

/// Per-breath numeric column that keeps NaN gaps.
///
/// JSON has no NaN, so gaps are written as `null` and read back as NaN.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Series(Vec<f64>);

impl Series {
    pub fn new(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl Deref for Series {
    type Target = [f64];

    fn deref(&self) -> &[f64] {
        &self.0
    }
}

impl From<Vec<f64>> for Series {
    fn from(values: Vec<f64>) -> Self {
        Self(values)
    }
}

impl FromIterator<f64> for Series {
    fn from_iter<I: IntoIterator<Item = f64>>(iter: I) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl<'de> Deserialize<'de> for Series {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let values: Vec<Option<f64>> = Vec::deserialize(deserializer)?;
        Ok(values.into_iter().map(|v| v.unwrap_or(f64::NAN)).collect())
    }
}

/// Reads `null` as NaN for scalar fields (serde_json writes NaN as `null`).
pub(crate) fn nan_from_null<'de, D: Deserializer<'de>>(deserializer: D) -> Result<f64, D::Error> {
    Ok(Option::<f64>::deserialize(deserializer)?.unwrap_or(f64::NAN))
}

/// Fitted mechanics of one breath. Either every field is finite or every
/// field is NaN (see [`MechanicsResult::missing`]).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct MechanicsResult {
    /// Elastance, cmH2O/L
    #[serde(deserialize_with = "nan_from_null")]
    pub ers: f64,
    /// Resistance, cmH2O.s/L, never negative
    #[serde(deserialize_with = "nan_from_null")]
    pub rrs: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub peep: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub pip: f64,
    /// Litres
    #[serde(deserialize_with = "nan_from_null")]
    pub tidal_volume: f64,
    #[serde(deserialize_with = "nan_from_null")]
    pub driving_pressure: f64,
    /// Expiratory over inspiratory sample count
    #[serde(deserialize_with = "nan_from_null")]
    pub ie_ratio: f64,
    /// Litres
    #[serde(deserialize_with = "nan_from_null")]
    pub expired_volume: f64,
}

impl MechanicsResult {
    pub fn missing() -> Self {
        Self {
            ers: f64::NAN,
            rrs: f64::NAN,
            peep: f64::NAN,
            pip: f64::NAN,
            tidal_volume: f64::NAN,
            driving_pressure: f64::NAN,
            ie_ratio: f64::NAN,
            expired_volume: f64::NAN,
        }
    }

    pub fn is_missing(&self) -> bool {
        self.ers.is_nan()
    }

    /// Value in reporting units: tidal volume becomes whole millilitres.
    pub fn reported(&self, parameter: Parameter) -> f64 {
        match parameter {
            Parameter::Ers => self.ers,
            Parameter::Rrs => self.rrs,
            Parameter::Peep => self.peep,
            Parameter::Pip => self.pip,
            Parameter::TidalVolume => (self.tidal_volume * 1000.0).round(),
            Parameter::DrivingPressure => self.driving_pressure,
        }
    }
}

/// One ledger line: a rejected breath or a discarded input line.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RejectionRecord {
    pub breath_number: u64,
    pub reason: String,
}

/// Per-file breath outcome counters. Each breath increments exactly one.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DebugCounters {
    pub accepted: usize,
    pub rejected_tidal_volume: usize,
    pub rejected_resistance: usize,
    pub rejected_elastance: usize,
    pub rejected_length_mismatch: usize,
    pub rejected_too_short: usize,
}

impl DebugCounters {
    pub fn rejected(&self) -> usize {
        self.rejected_tidal_volume
            + self.rejected_resistance
            + self.rejected_elastance
            + self.rejected_length_mismatch
            + self.rejected_too_short
    }

    pub fn total(&self) -> usize {
        self.accepted + self.rejected()
    }
}

/// Counters plus the rejection ledger of one file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DebugLedger {
    pub counters: DebugCounters,
    pub rejections: Vec<RejectionRecord>,
}

/// Classifier verdict for one breath.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum BreathLabel {
    Normal,
    Asynchrony,
    /// Rejected breath or failed inference
    Unclassified,
}

impl BreathLabel {
    /// Map a classifier output index. Class 2 (noise) and any unknown class
    /// fold into `Normal`.
    pub fn from_class_index(index: i64) -> Self {
        match index {
            1 => BreathLabel::Asynchrony,
            _ => BreathLabel::Normal,
        }
    }
}

/// Everything computed for a single breath.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BreathRecord {
    pub number: u64,
    pub length: usize,
    pub mechanics: MechanicsResult,
    pub label: BreathLabel,
    /// Asynchrony magnitude in [0, 100], NaN when not computable
    #[serde(deserialize_with = "nan_from_null")]
    pub magnitude: f64,
}

/// Flattened samples of every closed breath, kept for plotting.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct WaveformTrace {
    pub pressure: Vec<f64>,
    pub flow: Vec<f64>,
    pub breath_numbers: Vec<u64>,
    pub breath_lengths: Vec<usize>,
}
