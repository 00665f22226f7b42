pub mod aggregation;
pub mod config;
pub mod error;
pub mod external_model;
pub mod inference;
pub mod mechanics;
pub mod mmap_utils;
pub mod numeric;
pub mod parser;
pub mod pipeline;
pub mod profiling;
pub mod recording;
pub mod store;
pub mod types;

pub use aggregation::{summarize_day, summarize_hour, DailySummary, HourlySummary, ParameterStats, Summary};
pub use config::AnalysisConfig;
pub use error::{InferenceError, Result, VentError};
pub use external_model::ExternalModel;
pub use inference::{BreathClassifier, InferencePreprocessor, ModelSet, PressureReconstructor};
pub use mechanics::MechanicsEstimator;
pub use parser::{parse_waveform, read_waveform_file, ParsedWaveform};
pub use pipeline::{Analyzer, BatchReport, FileAnalysis};
pub use recording::RecordingKey;
pub use store::{JsonDirStore, ResultStore};
pub use types::*;

pub const VERSION: &str = env!("CARGO_PKG_VERSION");
