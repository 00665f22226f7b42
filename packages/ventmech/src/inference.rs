//! Fixed-shape preprocessing for the breath classifier and the pressure
//! reconstruction model, and the asynchrony magnitude derived from the
//! reconstruction.

use crate::config::AnalysisConfig;
use crate::error::InferenceError;
use crate::numeric::{argmin, interpolate, round_to, trapezoid};
use crate::types::{Breath, BreathLabel, MechanicsResult};
use std::sync::Arc;

/// Classifies a normalized, resampled pressure curve into a class index.
pub trait BreathClassifier: Send + Sync {
    fn classify(&self, input: &[f64]) -> Result<i64, InferenceError>;
}

/// Reconstructs the "normal" pressure curve for a normalized inspiratory
/// pressure curve of the same length.
pub trait PressureReconstructor: Send + Sync {
    fn reconstruct(&self, input: &[f64]) -> Result<Vec<f64>, InferenceError>;
}

/// Min-max normalize `trace` and resample it to exactly `size` points.
///
/// Positions `k * n / size` below `n - 1` are linearly interpolated; the
/// result is padded with its last value or truncated to `size`. A constant
/// trace normalizes to all NaN, which callers treat as "not classifiable".
pub fn normalize_resample(trace: &[f64], size: usize) -> Result<Vec<f64>, InferenceError> {
    let n = trace.len();
    if n < 2 {
        return Err(InferenceError::InvalidInput(format!(
            "need at least 2 samples to resample, got {}",
            n
        )));
    }
    if size == 0 {
        return Err(InferenceError::InvalidInput("target size must be positive".to_string()));
    }

    let lo = trace.iter().copied().fold(f64::INFINITY, f64::min);
    let shifted: Vec<f64> = trace.iter().map(|x| x - lo).collect();
    let range = shifted.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let normalized: Vec<f64> = shifted.iter().map(|x| x / range).collect();

    let step = n as f64 / size as f64;
    let last = (n - 1) as f64;
    let mut out: Vec<f64> = (0..)
        .map(|k| k as f64 * step)
        .take_while(|&pos| pos < last)
        .take(size)
        .map(|pos| interpolate(&normalized, pos))
        .collect();

    let pad = out.last().copied().unwrap_or(f64::NAN);
    out.resize(size, pad);
    Ok(out)
}

/// Run the classifier on one breath's pressure. Any failure yields
/// `Unclassified` for this breath only.
pub fn classify_breath(
    classifier: &dyn BreathClassifier,
    pressure: &[f64],
    input_len: usize,
) -> BreathLabel {
    let input = match normalize_resample(pressure, input_len) {
        Ok(input) => input,
        Err(e) => {
            log::debug!("Classifier input rejected: {}", e);
            return BreathLabel::Unclassified;
        }
    };
    if input.iter().any(|v| !v.is_finite()) {
        log::debug!("Classifier input is not finite (constant pressure trace)");
        return BreathLabel::Unclassified;
    }

    match classifier.classify(&input) {
        Ok(index) => BreathLabel::from_class_index(index),
        Err(e) => {
            log::warn!("Classifier failed: {}", e);
            BreathLabel::Unclassified
        }
    }
}

const RECON_SKIP: usize = 5;
const RECON_MIN_INSPIRATION: usize = 10;

/// Inspiratory pressure as seen by the reconstruction model.
///
/// Kept separate from the mechanics phase split: the skip is widened until
/// inspiration is longer than [`RECON_MIN_INSPIRATION`] samples, and a widened
/// skip is pushed one further sample. The expiratory remainder must exist.
fn reconstruction_inspiration<'a>(pressure: &'a [f64], flow: &[f64]) -> Option<&'a [f64]> {
    let flow: Vec<f64> = flow.iter().map(|q| q / 60.0).collect();
    let stop = flow.len().checked_sub(1)?;
    let inspiration_len = |skip: usize| -> Option<usize> {
        let window = flow.get(skip + 1..stop).filter(|w| !w.is_empty())?;
        Some(window.iter().position(|&q| q <= 0.0).unwrap_or(0) + skip)
    };

    let mut skip = RECON_SKIP;
    while inspiration_len(skip)? <= RECON_MIN_INSPIRATION {
        skip += 1;
    }
    if skip > RECON_SKIP {
        skip += 1;
    }
    let end = inspiration_len(skip)?;

    argmin(flow.get(end + 1..)?)?;
    pressure.get(..end)
}

/// Asynchrony magnitude of one breath, in percent rounded to 2 decimals.
///
/// Returns `Ok(NaN)` when the areas are not finite (for example a constant
/// inspiratory pressure).
pub fn asynchrony_magnitude(
    reconstructor: &dyn PressureReconstructor,
    pressure: &[f64],
    flow: &[f64],
    size: usize,
) -> Result<f64, InferenceError> {
    let inspiration = reconstruction_inspiration(pressure, flow).ok_or_else(|| {
        InferenceError::InvalidInput("breath too short for phase separation".to_string())
    })?;

    let original = normalize_resample(inspiration, size)?;
    let mut reconstructed = reconstructor.reconstruct(&original)?;
    if reconstructed.len() != size {
        return Err(InferenceError::ShapeMismatch {
            expected: size,
            actual: reconstructed.len(),
        });
    }

    let offset = original
        .iter()
        .zip(&reconstructed)
        .map(|(o, r)| o - r)
        .fold(f64::NEG_INFINITY, f64::max);
    reconstructed.iter_mut().for_each(|r| *r += offset);

    let peak = reconstructed.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    reconstructed.iter_mut().for_each(|r| *r /= peak);
    let original: Vec<f64> = original.iter().map(|o| o / peak).collect();

    let area_reconstructed = trapezoid(&reconstructed);
    let area_original = trapezoid(&original);
    let magnitude = round_to(
        (area_reconstructed - area_original).abs() / area_reconstructed * 100.0,
        2,
    );

    Ok(if magnitude.is_finite() { magnitude } else { f64::NAN })
}

/// The two optional model collaborators, constructed once per run.
#[derive(Clone, Default)]
pub struct ModelSet {
    pub classifier: Option<Arc<dyn BreathClassifier>>,
    pub reconstructor: Option<Arc<dyn PressureReconstructor>>,
}

impl ModelSet {
    pub fn none() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.classifier.is_none() && self.reconstructor.is_none()
    }
}

impl std::fmt::Debug for ModelSet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ModelSet")
            .field("classifier", &self.classifier.is_some())
            .field("reconstructor", &self.reconstructor.is_some())
            .finish()
    }
}

/// Label and magnitude for one breath.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Inference {
    pub label: BreathLabel,
    pub magnitude: f64,
}

impl Inference {
    pub fn missing() -> Self {
        Self {
            label: BreathLabel::Unclassified,
            magnitude: f64::NAN,
        }
    }
}

pub struct InferencePreprocessor {
    models: ModelSet,
    classifier_input_len: usize,
    reconstruction_len: usize,
}

impl InferencePreprocessor {
    pub fn new(config: &AnalysisConfig, models: ModelSet) -> Self {
        Self {
            models,
            classifier_input_len: config.classifier_input_len,
            reconstruction_len: config.reconstruction_len,
        }
    }

    /// Rejected breaths are never sent to a model.
    pub fn infer(&self, breath: &Breath, mechanics: &MechanicsResult) -> Inference {
        if mechanics.is_missing() {
            return Inference::missing();
        }

        let label = self
            .models
            .classifier
            .as_deref()
            .map_or(BreathLabel::Unclassified, |c| {
                classify_breath(c, breath.pressure(), self.classifier_input_len)
            });

        let magnitude = self.models.reconstructor.as_deref().map_or(f64::NAN, |r| {
            asynchrony_magnitude(r, breath.pressure(), breath.flow(), self.reconstruction_len)
                .unwrap_or_else(|e| {
                    log::warn!("Breath {}: reconstruction failed: {}", breath.number(), e);
                    f64::NAN
                })
        });

        Inference { label, magnitude }
    }

    pub fn infer_all(&self, breaths: &[Breath], mechanics: &[MechanicsResult]) -> Vec<Inference> {
        breaths
            .iter()
            .zip(mechanics)
            .map(|(b, m)| self.infer(b, m))
            .collect()
    }
}
