use crate::error::{Result, VentError};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Line-level sanity limits applied while parsing a recording
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct LineFilter {
    /// Largest accepted |pressure|, cmH2O
    pub max_abs_pressure: f64,
    /// Largest accepted |flow|, L/min
    pub max_abs_flow: f64,
    /// Largest accepted pressure jump between consecutive samples
    pub max_pressure_step: f64,
    /// Largest accepted flow jump between consecutive samples
    pub max_flow_step: f64,
}

impl Default for LineFilter {
    fn default() -> Self {
        Self {
            max_abs_pressure: 100.0,
            max_abs_flow: 1000.0,
            max_pressure_step: 50.0,
            max_flow_step: 100.0,
        }
    }
}

/// Breath acceptance thresholds for the mechanics estimator
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AcceptanceThresholds {
    /// Breaths with fewer samples are rejected as too short
    pub min_breath_len: usize,
    /// Reject when |Ers| reaches this value
    pub max_abs_elastance: f64,
    /// Reject when |Rrs| reaches this value
    pub max_abs_resistance: f64,
    /// Reject when tidal volume reaches this value, litres
    pub max_tidal_volume: f64,
}

impl Default for AcceptanceThresholds {
    fn default() -> Self {
        Self {
            min_breath_len: 20,
            max_abs_elastance: 100.0,
            max_abs_resistance: 100.0,
            max_tidal_volume: 1.0,
        }
    }
}

/// Complete analysis configuration.
///
/// Every field has a default, so a JSON file only needs the keys it changes.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AnalysisConfig {
    /// Sample spacing in seconds (50 Hz recordings)
    pub sample_interval: f64,
    pub line_filter: LineFilter,
    pub thresholds: AcceptanceThresholds,
    /// Input length of the breath classifier
    pub classifier_input_len: usize,
    /// Input/output length of the pressure reconstruction model
    pub reconstruction_len: usize,
    /// Reuse a stored analysis instead of recomputing when one exists
    pub reuse_stored: bool,
    /// Seconds a model process may take to answer one request
    pub model_timeout_secs: f64,
}

impl Default for AnalysisConfig {
    fn default() -> Self {
        Self {
            sample_interval: 0.02,
            line_filter: LineFilter::default(),
            thresholds: AcceptanceThresholds::default(),
            classifier_input_len: 150,
            reconstruction_len: 64,
            reuse_stored: false,
            model_timeout_secs: 30.0,
        }
    }
}

impl AnalysisConfig {
    /// Load a configuration from a JSON file and validate it
    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        if !path.exists() {
            return Err(VentError::FileNotFound(path.display().to_string()));
        }

        let content = std::fs::read_to_string(path)?;
        let config: AnalysisConfig = serde_json::from_str(&content)
            .map_err(|e| VentError::ConfigError(format!("{}: {}", path.display(), e)))?;
        config.validate()?;

        log::info!("Loaded analysis configuration from {}", path.display());
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.sample_interval.is_nan() || self.sample_interval <= 0.0 {
            return Err(VentError::ConfigError(format!(
                "sample_interval must be positive, got {}",
                self.sample_interval
            )));
        }
        if self.classifier_input_len < 2 {
            return Err(VentError::ConfigError(
                "classifier_input_len must be at least 2".to_string(),
            ));
        }
        if self.reconstruction_len < 2 {
            return Err(VentError::ConfigError(
                "reconstruction_len must be at least 2".to_string(),
            ));
        }
        if !self.model_timeout_secs.is_finite() || self.model_timeout_secs <= 0.0 {
            return Err(VentError::ConfigError(format!(
                "model_timeout_secs must be positive, got {}",
                self.model_timeout_secs
            )));
        }
        // the phase split needs a few samples past the inspiratory bootstrap window
        if self.thresholds.min_breath_len < 15 {
            return Err(VentError::ConfigError(format!(
                "min_breath_len must be at least 15, got {}",
                self.thresholds.min_breath_len
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_defaults_are_valid() {
        let config = AnalysisConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.thresholds.min_breath_len, 20);
        assert_eq!(config.classifier_input_len, 150);
        assert_eq!(config.reconstruction_len, 64);
    }

    #[test]
    fn test_partial_json_keeps_defaults() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{ "thresholds": {{ "max_tidal_volume": 1.5 }} }}"#).unwrap();

        let config = AnalysisConfig::from_json_file(file.path()).unwrap();
        assert_eq!(config.thresholds.max_tidal_volume, 1.5);
        assert_eq!(config.thresholds.min_breath_len, 20);
        assert_eq!(config.line_filter, LineFilter::default());
    }

    #[test]
    fn test_invalid_interval_rejected() {
        let config = AnalysisConfig {
            sample_interval: 0.0,
            ..Default::default()
        };
        assert!(matches!(config.validate(), Err(VentError::ConfigError(_))));
    }

    #[test]
    fn test_model_timeout_must_be_positive() {
        for secs in [0.0, -1.0, f64::NAN, f64::INFINITY] {
            let config = AnalysisConfig {
                model_timeout_secs: secs,
                ..Default::default()
            };
            assert!(matches!(config.validate(), Err(VentError::ConfigError(_))));
        }
    }

    #[test]
    fn test_missing_file() {
        let result = AnalysisConfig::from_json_file("/nonexistent/ventmech.json");
        assert!(matches!(result, Err(VentError::FileNotFound(_))));
    }
}
