use crate::cli::InfoArgs;
use crate::exit_codes;
use crate::output;
use serde::Serialize;
use ventmech::external_model::{MODEL_SEED, SEED_ENV_VAR};
use ventmech::{AnalysisConfig, JsonDirStore};

#[derive(Serialize)]
struct InfoOutput {
    cli_version: String,
    library_version: &'static str,
    platform: String,
    arch: String,
    classifier_cmd: Option<String>,
    reconstructor_cmd: Option<String>,
    model_seed: u64,
    default_store: Option<String>,
    defaults: AnalysisConfig,
}

pub fn execute(args: InfoArgs) -> i32 {
    let info = InfoOutput {
        cli_version: env!("CARGO_PKG_VERSION").to_string(),
        library_version: ventmech::VERSION,
        platform: std::env::consts::OS.to_string(),
        arch: std::env::consts::ARCH.to_string(),
        classifier_cmd: args.classifier_cmd,
        reconstructor_cmd: args.reconstructor_cmd,
        model_seed: MODEL_SEED,
        default_store: JsonDirStore::default_location()
            .ok()
            .map(|s| s.dir().display().to_string()),
        defaults: AnalysisConfig::default(),
    };

    if args.json {
        match output::to_json(&info, false) {
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
    } else {
        println!("ventmech CLI v{} (library v{})", info.cli_version, info.library_version);
        println!("Platform: {} ({})", info.platform, info.arch);
        println!();
        println!(
            "Classifier: {}",
            info.classifier_cmd.as_deref().unwrap_or("not configured")
        );
        println!(
            "Reconstructor: {}",
            info.reconstructor_cmd.as_deref().unwrap_or("not configured")
        );
        println!("Model seed: ${}={}", SEED_ENV_VAR, info.model_seed);
        if let Some(ref store) = info.default_store {
            println!("Default store: {}", store);
        }
    }

    exit_codes::SUCCESS
}
