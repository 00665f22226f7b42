use crate::aggregation::{daily_summaries, summarize_hour, DailySummary, HourlySummary};
use crate::config::AnalysisConfig;
use crate::error::Result;
use crate::inference::{InferencePreprocessor, ModelSet};
use crate::mechanics::MechanicsEstimator;
use crate::parser::{parse_waveform, read_waveform_file, ParsedWaveform};
use crate::profile_scope;
use crate::recording::RecordingKey;
use crate::store::ResultStore;
use crate::types::{BreathRecord, DebugLedger, WaveformTrace};
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

/// Everything computed for one recording
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FileAnalysis {
    pub id: String,
    pub source: String,
    pub key: Option<RecordingKey>,
    pub breaths: Vec<BreathRecord>,
    /// Discarded lines first, then rejected breaths
    pub debug: DebugLedger,
    pub trace: WaveformTrace,
    pub summary: HourlySummary,
    pub created_at: String,
    pub warnings: Vec<String>,
}

impl FileAnalysis {
    pub fn breath_count(&self) -> usize {
        self.breaths.len()
    }

    /// False for empty recordings and recordings where every breath was rejected
    pub fn has_usable_data(&self) -> bool {
        self.summary.summary.has_data()
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchFailure {
    pub path: String,
    pub error: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchReport {
    /// Sorted by patient, date, hour, then path
    pub analyses: Vec<FileAnalysis>,
    pub failures: Vec<BatchFailure>,
    /// Files never started because the batch was cancelled
    pub skipped: Vec<String>,
    pub daily: Vec<DailySummary>,
}

impl BatchReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.skipped.is_empty()
    }
}

enum FileOutcome {
    Done(Box<FileAnalysis>),
    Failed(BatchFailure),
    Skipped(String),
}

/// Runs parser, mechanics, inference and aggregation over recordings.
///
/// Holds no per-file state, so a single analyzer can serve many files in
/// parallel.
pub struct Analyzer {
    config: AnalysisConfig,
    models: ModelSet,
    store: Option<Arc<dyn ResultStore>>,
}

impl Analyzer {
    pub fn new(config: AnalysisConfig, models: ModelSet) -> Self {
        Self {
            config,
            models,
            store: None,
        }
    }

    pub fn with_store(mut self, store: Arc<dyn ResultStore>) -> Self {
        self.store = Some(store);
        self
    }

    pub fn config(&self) -> &AnalysisConfig {
        &self.config
    }

    /// Mechanics, inference and the hourly summary of an already parsed recording
    pub fn analyze_waveform(
        &self,
        parsed: ParsedWaveform,
        source: &str,
        key: Option<RecordingKey>,
    ) -> FileAnalysis {
        let estimated = MechanicsEstimator::new(&self.config).estimate_all(&parsed.breaths);
        let inferences = InferencePreprocessor::new(&self.config, self.models.clone())
            .infer_all(&parsed.breaths, &estimated.results);

        let breaths: Vec<BreathRecord> = parsed
            .breaths
            .iter()
            .zip(&estimated.results)
            .zip(&inferences)
            .map(|((breath, mechanics), inference)| BreathRecord {
                number: breath.number(),
                length: breath.len(),
                mechanics: *mechanics,
                label: inference.label,
                magnitude: inference.magnitude,
            })
            .collect();

        let mut rejections = parsed.rejections;
        rejections.extend(estimated.ledger.rejections);

        let mut warnings = Vec::new();
        if breaths.is_empty() {
            warnings.push("no complete breaths found".to_string());
        }

        FileAnalysis {
            id: uuid::Uuid::new_v4().to_string(),
            source: source.to_string(),
            summary: summarize_hour(key.clone(), &breaths),
            key,
            breaths,
            debug: DebugLedger {
                counters: estimated.ledger.counters,
                rejections,
            },
            trace: parsed.trace,
            created_at: chrono::Utc::now().to_rfc3339(),
            warnings,
        }
    }

    /// Analyze in-memory recording text. Nothing is persisted.
    pub fn analyze_text(&self, text: &str, source: &str, key: Option<RecordingKey>) -> FileAnalysis {
        let parsed = parse_waveform(text, &self.config.line_filter);
        self.analyze_waveform(parsed, source, key)
    }

    /// Analyze one recording file and persist the result when a store is set.
    ///
    /// With `reuse_stored` on, a stored analysis of the same recording is
    /// returned without recomputing. Store failures become warnings.
    pub fn analyze_file(&self, path: &Path) -> Result<FileAnalysis> {
        profile_scope!(format!("analyze_file {}", path.display()));

        let source = path.display().to_string();
        let key = RecordingKey::from_path(path);
        if key.is_none() {
            log::warn!(
                "{} does not follow <prefix>_<patient>_<date>_<HH-MM-SS>.txt",
                source
            );
        }

        if let (true, Some(store), Some(key)) = (self.config.reuse_stored, &self.store, &key) {
            match store.fetch(key) {
                Ok(Some(stored)) => {
                    log::info!("Reusing stored analysis for {}", key);
                    return Ok(stored);
                }
                Ok(None) => log::debug!("No stored analysis for {}", key),
                Err(e) => log::warn!("Store lookup failed for {}: {}", key, e),
            }
        }

        let parsed = read_waveform_file(path, &self.config.line_filter)?;
        let mut analysis = self.analyze_waveform(parsed, &source, key);

        if let Some(store) = &self.store {
            if analysis.key.is_none() {
                analysis
                    .warnings
                    .push("not stored: file name carries no patient/date/hour".to_string());
            } else if let Err(e) = store.upsert(&analysis) {
                log::warn!("Failed to store analysis of {}: {}", source, e);
                analysis.warnings.push(format!("not stored: {}", e));
            }
        }

        log::info!(
            "{}: {} breaths, {} accepted",
            source,
            analysis.breath_count(),
            analysis.debug.counters.accepted
        );
        Ok(analysis)
    }

    /// Analyze many files in parallel.
    ///
    /// `cancel` is checked before each file starts; files not started are
    /// reported as skipped. Daily summaries cover every keyed analysis.
    pub fn analyze_batch(&self, paths: &[PathBuf], cancel: &AtomicBool) -> BatchReport {
        let outcomes: Vec<FileOutcome> = paths
            .par_iter()
            .map(|path| {
                let source = path.display().to_string();
                if cancel.load(Ordering::Relaxed) {
                    return FileOutcome::Skipped(source);
                }
                match self.analyze_file(path) {
                    Ok(analysis) => FileOutcome::Done(Box::new(analysis)),
                    Err(e) => {
                        log::error!("{}: {}", source, e);
                        FileOutcome::Failed(BatchFailure {
                            path: source,
                            error: e.to_string(),
                        })
                    }
                }
            })
            .collect();

        let mut report = BatchReport::default();
        for outcome in outcomes {
            match outcome {
                FileOutcome::Done(analysis) => report.analyses.push(*analysis),
                FileOutcome::Failed(failure) => report.failures.push(failure),
                FileOutcome::Skipped(path) => report.skipped.push(path),
            }
        }

        report
            .analyses
            .sort_by(|a, b| (&a.key, &a.source).cmp(&(&b.key, &b.source)));
        report.daily = daily_summaries(report.analyses.iter().map(|a| a.summary.clone()));

        log::info!(
            "Batch finished: {} analyzed, {} failed, {} skipped",
            report.analyses.len(),
            report.failures.len(),
            report.skipped.len()
        );
        report
    }
}
