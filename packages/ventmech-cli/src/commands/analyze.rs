use crate::analysis_params;
use crate::cli::AnalyzeArgs;
use crate::exit_codes;
use crate::output;
use std::path::Path;
use ventmech::{VentError, WaveformTrace};

pub fn execute(args: AnalyzeArgs) -> i32 {
    if let Err(msg) = analysis_params::validate_file(&args.file) {
        eprintln!("Error: {}", msg);
        return exit_codes::INPUT_ERROR;
    }

    let analyzer = match analysis_params::build_analyzer(&args.pipeline) {
        Ok(a) => a,
        Err((code, msg)) => {
            eprintln!("Error: {}", msg);
            return code;
        }
    };

    if !args.quiet {
        eprintln!("Analyzing {}...", args.file);
    }

    let mut analysis = match analyzer.analyze_file(Path::new(&args.file)) {
        Ok(a) => a,
        Err(e) => {
            eprintln!("Analysis failed: {}", e);
            return match e {
                VentError::FileNotFound(_) | VentError::ParseError(_) => exit_codes::INPUT_ERROR,
                _ => exit_codes::EXECUTION_ERROR,
            };
        }
    };

    if !args.include_trace {
        analysis.trace = WaveformTrace::default();
    }

    let json = match output::to_json(&analysis, args.compact) {
        Ok(j) => j,
        Err(e) => {
            eprintln!("Error serializing result: {}", e);
            return exit_codes::EXECUTION_ERROR;
        }
    };
    if let Err(e) = output::write_output(&json, args.output.as_deref()) {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !args.quiet {
        let counters = analysis.debug.counters;
        eprintln!(
            "  {} breaths: {} accepted, {} rejected",
            analysis.breath_count(),
            counters.accepted,
            counters.rejected()
        );
        if let Some(index) = analysis.summary.summary.asynchrony_index {
            eprintln!("  Asynchrony index: {:.2}%", index);
        }
        for warning in &analysis.warnings {
            eprintln!("  Warning: {}", warning);
        }
        if let Some(ref path) = args.output {
            eprintln!("Results written to {}", path);
        }
    }

    exit_codes::SUCCESS
}
