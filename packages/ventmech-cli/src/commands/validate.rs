use crate::analysis_params;
use crate::cli::ValidateArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use std::path::Path;
use ventmech::{read_waveform_file, DebugCounters, MechanicsEstimator, RecordingKey, RejectionRecord};

#[derive(Serialize)]
struct ValidateOutput {
    file: String,
    exists: bool,
    readable: bool,
    supported: bool,
    key: Option<RecordingKey>,
    size_bytes: Option<u64>,
    breath_count: Option<usize>,
    sample_count: Option<usize>,
    discarded_lines: Option<usize>,
    counters: Option<DebugCounters>,
    rejections: Vec<RejectionRecord>,
    error: Option<String>,
}

pub fn execute(args: ValidateArgs) -> i32 {
    let path = Path::new(&args.file);

    let exists = path.exists();
    let readable = path.is_file() && std::fs::File::open(path).is_ok();
    let supported = analysis_params::is_supported_extension(path);

    let size_bytes = if readable {
        std::fs::metadata(path).ok().map(|m| m.len())
    } else {
        None
    };

    let mut result = ValidateOutput {
        file: args.file.clone(),
        exists,
        readable,
        supported,
        key: RecordingKey::from_path(path),
        size_bytes,
        breath_count: None,
        sample_count: None,
        discarded_lines: None,
        counters: None,
        rejections: Vec::new(),
        error: None,
    };

    let error = if !exists {
        Some(format!("File not found: {}", args.file))
    } else if !readable {
        Some(format!("File is not readable: {}", args.file))
    } else if !supported {
        Some(format!(
            "Unsupported file extension '{}'. Supported: {}",
            path.extension().and_then(|e| e.to_str()).unwrap_or(""),
            analysis_params::RECORDING_EXTENSION
        ))
    } else {
        check_recording(path, args.config.as_deref(), &mut result).err()
    };
    result.error = error;

    if args.json {
        match output::to_json(&result, false) {
            Ok(json) => {
                if let Err(e) = output::write_output(&json, None) {
                    eprintln!("Error: {}", e);
                    return exit_codes::EXECUTION_ERROR;
                }
            }
            Err(e) => {
                eprintln!("Error: {}", e);
                return exit_codes::EXECUTION_ERROR;
            }
        }
    } else if let Some(ref err) = result.error {
        eprintln!("Error: {}", err);
    } else {
        let counters = result.counters.unwrap_or_default();
        println!(
            "File '{}' is valid ({} breaths, {} accepted, {} discarded lines)",
            args.file,
            result.breath_count.unwrap_or(0),
            counters.accepted,
            result.discarded_lines.unwrap_or(0)
        );
        if result.key.is_none() {
            eprintln!("Warning: file name does not follow <prefix>_<patient>_<date>_<HH-MM-SS>.txt");
        }
        if result.breath_count == Some(0) {
            eprintln!("Warning: no complete breaths found");
        }
    }

    if result.error.is_some() {
        exit_codes::INPUT_ERROR
    } else {
        exit_codes::SUCCESS
    }
}

/// Parse the recording and run the mechanics gate, without models.
fn check_recording(path: &Path, config: Option<&str>, result: &mut ValidateOutput) -> Result<(), String> {
    let config = analysis_params::load_config(config)?;
    let parsed = read_waveform_file(path, &config.line_filter).map_err(|e| e.to_string())?;
    let estimated = MechanicsEstimator::new(&config).estimate_all(&parsed.breaths);

    result.breath_count = Some(parsed.breath_count());
    result.sample_count = Some(parsed.trace.pressure.len());
    result.discarded_lines = Some(parsed.rejections.len());
    result.counters = Some(estimated.ledger.counters);
    result.rejections = parsed.rejections;
    result.rejections.extend(estimated.ledger.rejections);
    Ok(())
}
