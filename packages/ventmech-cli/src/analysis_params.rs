use crate::cli::PipelineArgs;
use crate::exit_codes;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use ventmech::{AnalysisConfig, Analyzer, ExternalModel, JsonDirStore, ModelSet, ResultStore};

pub const RECORDING_EXTENSION: &str = "txt";

/// Validate a single file path: existence and supported extension.
pub fn validate_file(file_path: &str) -> Result<(), String> {
    let path = Path::new(file_path);
    if !path.exists() {
        return Err(format!("Input file not found: {}", file_path));
    }
    if !is_supported_extension(path) {
        return Err(format!(
            "Unsupported file extension '{}'. Supported: {}",
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            RECORDING_EXTENSION
        ));
    }
    Ok(())
}

/// Check if a file looks like a ventilator recording.
pub fn is_supported_extension(path: &Path) -> bool {
    path.extension()
        .and_then(|e| e.to_str())
        .map(|ext| ext.eq_ignore_ascii_case(RECORDING_EXTENSION))
        .unwrap_or(false)
}

/// Defaults, or the given JSON file.
pub fn load_config(config_path: Option<&str>) -> Result<AnalysisConfig, String> {
    match config_path {
        Some(path) => AnalysisConfig::from_json_file(path).map_err(|e| e.to_string()),
        None => Ok(AnalysisConfig::default()),
    }
}

fn start_model(cmd: &str, timeout: Duration) -> Result<ExternalModel, String> {
    ExternalModel::spawn_with_timeout(cmd, timeout).map_err(|e| e.to_string())
}

/// Start the configured model commands. Missing commands leave the slot empty.
pub fn resolve_models(args: &PipelineArgs, timeout: Duration) -> Result<ModelSet, String> {
    let mut models = ModelSet::none();
    if let Some(cmd) = &args.classifier_cmd {
        models.classifier = Some(Arc::new(start_model(cmd, timeout)?));
    }
    if let Some(cmd) = &args.reconstructor_cmd {
        models.reconstructor = Some(Arc::new(start_model(cmd, timeout)?));
    }
    if models.is_empty() {
        log::info!("No model commands configured: breaths stay unclassified");
    }
    Ok(models)
}

pub fn resolve_store(store_dir: Option<&str>) -> Option<Arc<dyn ResultStore>> {
    store_dir.map(|dir| Arc::new(JsonDirStore::new(dir)) as Arc<dyn ResultStore>)
}

/// Build the analyzer for a command, with the exit code to use on failure.
pub fn build_analyzer(args: &PipelineArgs) -> Result<Analyzer, (i32, String)> {
    let mut config =
        load_config(args.config.as_deref()).map_err(|e| (exit_codes::INPUT_ERROR, e))?;
    if args.reuse_stored {
        config.reuse_stored = true;
    }

    let timeout = Duration::from_secs_f64(config.model_timeout_secs);
    let models = resolve_models(args, timeout).map_err(|e| (exit_codes::MODEL_ERROR, e))?;
    let analyzer = Analyzer::new(config, models);

    Ok(match resolve_store(args.store.as_deref()) {
        Some(store) => analyzer.with_store(store),
        None => analyzer,
    })
}
