//! Single-compartment respiratory mechanics per breath.
//!
//! The breath is split into inspiration and expiration on the first
//! non-positive flow sample, and `P - PEEP = Ers * V + Rrs * Q` is fitted over
//! inspiration with the integral method: both sides are integrated once more
//! before the least-squares solve.

use crate::config::{AcceptanceThresholds, AnalysisConfig};
use crate::numeric::{argmin, cumulative_trapezoid, finite_max, finite_min, round_to};
use crate::types::{Breath, DebugCounters, DebugLedger, MechanicsResult, RejectionRecord};
use nalgebra::{DMatrix, DVector};
use std::fmt;

/// First sample index examined when looking for the end of inspiration
pub const INSPIRATORY_SEARCH_OFFSET: usize = 5;
/// Inspiratory segments of this many samples or fewer trigger a re-search
pub const MIN_INSPIRATORY_SAMPLES: usize = 10;

const SVD_EPSILON: f64 = 1e-12;

/// Inspiratory and expiratory parts of a breath (flow in L/s)
#[derive(Debug, Clone, PartialEq)]
pub struct PhaseSplit {
    pub flow_inspiratory: Vec<f64>,
    pub pressure_inspiratory: Vec<f64>,
    /// Starts at the expiratory flow minimum
    pub flow_expiratory: Vec<f64>,
    /// Untrimmed, starts right after the inspiratory end
    pub pressure_expiratory: Vec<f64>,
}

fn inspiratory_end(flow: &[f64], offset: usize) -> Option<usize> {
    let window = flow.get(offset + 1..flow.len().checked_sub(1)?)?;
    if window.is_empty() {
        return None;
    }
    let loc = window.iter().position(|&q| q <= 0.0).unwrap_or(0);
    Some(loc + offset)
}

/// Split a breath on the first non-positive flow sample.
///
/// The search skips the first [`INSPIRATORY_SEARCH_OFFSET`] samples. If the
/// inspiratory segment is still too short the skip grows one sample at a time;
/// once long enough the skip is advanced one final step. Returns `None` when
/// the breath is too short to search.
pub fn separate_phases(pressure: &[f64], flow: &[f64]) -> Option<PhaseSplit> {
    let mut offset = INSPIRATORY_SEARCH_OFFSET;
    let mut end = inspiratory_end(flow, offset)?;

    if end <= MIN_INSPIRATORY_SAMPLES {
        while end <= MIN_INSPIRATORY_SAMPLES {
            offset += 1;
            end = inspiratory_end(flow, offset)?;
        }
        offset += 1;
        end = inspiratory_end(flow, offset)?;
    }

    let expiratory = flow.get(end + 1..)?;
    let expiratory_start = argmin(expiratory)?;

    Some(PhaseSplit {
        flow_inspiratory: flow[..end].to_vec(),
        pressure_inspiratory: pressure.get(..end)?.to_vec(),
        flow_expiratory: expiratory[expiratory_start..].to_vec(),
        pressure_expiratory: pressure.get(end + 1..)?.to_vec(),
    })
}

/// Least-squares solution of `A x = b` for a two-column design matrix
fn solve_least_squares(col_a: &[f64], col_b: &[f64], rhs: &[f64]) -> Option<(f64, f64)> {
    let n = rhs.len();
    let a = DMatrix::from_fn(n, 2, |r, c| if c == 0 { col_a[r] } else { col_b[r] });
    let b = DVector::from_column_slice(rhs);
    let x = a.svd(true, true).solve(&b, SVD_EPSILON).ok()?;
    Some((x[0], x[1]))
}

/// Fit the single-compartment model to one breath.
///
/// `flow` is in L/min, `dt` the sample spacing in seconds. Ers and Rrs are
/// rounded to 1 decimal and Rrs is clamped at 0. The result is unrounded
/// otherwise and not checked against any threshold.
pub fn fit_mechanics(pressure: &[f64], flow: &[f64], dt: f64) -> Option<MechanicsResult> {
    if pressure.len() != flow.len() || pressure.is_empty() {
        return None;
    }

    let flow_lps: Vec<f64> = flow.iter().map(|q| q / 60.0).collect();
    let pip = finite_max(pressure)?;
    let phases = separate_phases(pressure, &flow_lps)?;

    let volume = cumulative_trapezoid(&phases.flow_inspiratory, dt);
    let volume_expiratory = cumulative_trapezoid(&phases.flow_expiratory, dt);
    let peep = finite_min(&phases.pressure_expiratory)?.floor();

    let int_volume = cumulative_trapezoid(&volume, dt);
    let int_flow = cumulative_trapezoid(&phases.flow_inspiratory, dt);
    let driving: Vec<f64> = phases.pressure_inspiratory.iter().map(|p| p - peep).collect();
    let int_driving = cumulative_trapezoid(&driving, dt);

    let (ers, rrs) = solve_least_squares(&int_volume, &int_flow, &int_driving)?;
    let ers = round_to(ers, 1);
    let rrs = round_to(rrs, 1).max(0.0);

    let tidal_volume = finite_max(&volume)?;
    let expired_volume = finite_min(&volume_expiratory).map_or(0.0, f64::abs);

    Some(MechanicsResult {
        ers,
        rrs,
        peep,
        pip,
        tidal_volume,
        driving_pressure: pip - peep,
        ie_ratio: phases.flow_expiratory.len() as f64 / phases.flow_inspiratory.len() as f64,
        expired_volume,
    })
}

/// Why a breath was excluded from the mechanics results
#[derive(Debug, Clone, PartialEq)]
pub enum Rejection {
    TooShort { length: usize, min: usize },
    /// Long enough, but the fit is undefined (e.g. non-finite samples)
    FitFailed { length: usize },
    LengthMismatch { pressure: usize, flow: usize },
    Elastance { value: f64, limit: f64 },
    Resistance { value: f64, limit: f64 },
    TidalVolume { litres: f64, limit: f64 },
}

impl fmt::Display for Rejection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Rejection::TooShort { length, min } => write!(
                f,
                "THRESHOLD: too short, len(pressure) < {}, RAW: {}",
                min, length
            ),
            Rejection::FitFailed { length } => {
                write!(f, "THRESHOLD: mechanics fit failed, RAW: {} samples", length)
            }
            Rejection::LengthMismatch { pressure, flow } => write!(
                f,
                "THRESHOLD: length mismatch, len(pressure) != len(flow), RAW: {},{}",
                pressure, flow
            ),
            Rejection::Elastance { value, limit } => {
                write!(f, "THRESHOLD: abs(Ers) >= {}, RAW: {}", limit, value)
            }
            Rejection::Resistance { value, limit } => {
                write!(f, "THRESHOLD: abs(Rrs) >= {}, RAW: {}", limit, value)
            }
            Rejection::TidalVolume { litres, limit } => write!(
                f,
                "THRESHOLD: VT >= {}ml, RAW: {}",
                limit * 1000.0,
                (litres * 1000.0).round()
            ),
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum BreathOutcome {
    Accepted(MechanicsResult),
    Rejected(Rejection),
}

impl BreathOutcome {
    /// The mechanics, or the all-NaN record for a rejected breath
    pub fn mechanics(&self) -> MechanicsResult {
        match self {
            BreathOutcome::Accepted(m) => *m,
            BreathOutcome::Rejected(_) => MechanicsResult::missing(),
        }
    }
}

/// Per-breath mechanics of a file with its debug ledger
#[derive(Debug, Clone, Default)]
pub struct EstimatedBreaths {
    /// One entry per input breath, in order
    pub results: Vec<MechanicsResult>,
    pub ledger: DebugLedger,
}

fn within(value: f64, limit: f64) -> bool {
    value.is_finite() && value.abs() < limit
}

pub struct MechanicsEstimator {
    thresholds: AcceptanceThresholds,
    sample_interval: f64,
}

impl MechanicsEstimator {
    pub fn new(config: &AnalysisConfig) -> Self {
        Self {
            thresholds: config.thresholds.clone(),
            sample_interval: config.sample_interval,
        }
    }

    /// Run the acceptance gate on one breath. The first failing check wins.
    pub fn estimate(&self, breath: &Breath) -> BreathOutcome {
        let t = &self.thresholds;
        let (pressure, flow) = (breath.pressure(), breath.flow());

        if pressure.len() < t.min_breath_len {
            return BreathOutcome::Rejected(Rejection::TooShort {
                length: pressure.len(),
                min: t.min_breath_len,
            });
        }
        if pressure.len() != flow.len() {
            return BreathOutcome::Rejected(Rejection::LengthMismatch {
                pressure: pressure.len(),
                flow: flow.len(),
            });
        }

        let Some(fit) = fit_mechanics(pressure, flow, self.sample_interval) else {
            log::warn!("Breath {}: mechanics fit failed", breath.number());
            return BreathOutcome::Rejected(Rejection::FitFailed {
                length: pressure.len(),
            });
        };

        if !within(fit.ers, t.max_abs_elastance) {
            return BreathOutcome::Rejected(Rejection::Elastance {
                value: fit.ers,
                limit: t.max_abs_elastance,
            });
        }
        if !within(fit.rrs, t.max_abs_resistance) {
            return BreathOutcome::Rejected(Rejection::Resistance {
                value: fit.rrs,
                limit: t.max_abs_resistance,
            });
        }
        if !(fit.tidal_volume.is_finite() && fit.tidal_volume < t.max_tidal_volume) {
            return BreathOutcome::Rejected(Rejection::TidalVolume {
                litres: fit.tidal_volume,
                limit: t.max_tidal_volume,
            });
        }

        BreathOutcome::Accepted(MechanicsResult {
            peep: round_to(fit.peep, 1),
            pip: round_to(fit.pip, 1),
            driving_pressure: round_to(fit.pip - fit.peep, 1),
            ..fit
        })
    }

    /// Estimate every breath, then assemble results and ledger in breath order.
    pub fn estimate_all(&self, breaths: &[Breath]) -> EstimatedBreaths {
        let outcomes: Vec<(u64, BreathOutcome)> = breaths
            .iter()
            .map(|b| (b.number(), self.estimate(b)))
            .collect();

        let mut counters = DebugCounters::default();
        for (_, outcome) in &outcomes {
            match outcome {
                BreathOutcome::Accepted(_) => counters.accepted += 1,
                BreathOutcome::Rejected(Rejection::TidalVolume { .. }) => {
                    counters.rejected_tidal_volume += 1
                }
                BreathOutcome::Rejected(Rejection::Resistance { .. }) => {
                    counters.rejected_resistance += 1
                }
                BreathOutcome::Rejected(Rejection::Elastance { .. }) => {
                    counters.rejected_elastance += 1
                }
                BreathOutcome::Rejected(Rejection::LengthMismatch { .. }) => {
                    counters.rejected_length_mismatch += 1
                }
                // a failed fit shares the too-short counter
                BreathOutcome::Rejected(Rejection::TooShort { .. } | Rejection::FitFailed { .. }) => {
                    counters.rejected_too_short += 1
                }
            }
        }

        let rejections: Vec<RejectionRecord> = outcomes
            .iter()
            .filter_map(|(number, outcome)| match outcome {
                BreathOutcome::Rejected(r) => Some(RejectionRecord {
                    breath_number: *number,
                    reason: r.to_string(),
                }),
                BreathOutcome::Accepted(_) => None,
            })
            .collect();

        log::info!(
            "Mechanics: {} of {} breaths accepted",
            counters.accepted,
            counters.total()
        );

        EstimatedBreaths {
            results: outcomes.iter().map(|(_, o)| o.mechanics()).collect(),
            ledger: DebugLedger {
                counters,
                rejections,
            },
        }
    }
}
