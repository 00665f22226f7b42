use crate::analysis_params;
use crate::cli::BatchArgs;
use crate::exit_codes;
use crate::output;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::time::Instant;
use ventmech::{BatchReport, WaveformTrace};

const DIR_MAX_DEPTH: usize = 6;

pub fn execute(args: BatchArgs) -> i32 {
    // Resolve file list
    let files = match resolve_files(&args) {
        Ok(f) => f,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::INPUT_ERROR;
        }
    };

    if files.is_empty() {
        eprintln!("Error: No matching files found");
        return exit_codes::INPUT_ERROR;
    }

    // Dry-run mode: print file list and exit
    if args.dry_run {
        for f in &files {
            println!("{}", f);
        }
        if !args.quiet {
            eprintln!("Found {} file(s)", files.len());
        }
        return exit_codes::SUCCESS;
    }

    let analyzer = match analysis_params::build_analyzer(&args.pipeline) {
        Ok(a) => a,
        Err((code, msg)) => {
            eprintln!("Error: {}", msg);
            return code;
        }
    };

    // Create output directory if specified
    if let Some(ref dir) = args.output_dir {
        if let Err(e) = std::fs::create_dir_all(dir) {
            eprintln!("Error: Failed to create output directory '{}': {}", dir, e);
            return exit_codes::EXECUTION_ERROR;
        }
    }

    let pool = match build_pool(args.jobs) {
        Ok(p) => p,
        Err(msg) => {
            eprintln!("Error: {}", msg);
            return exit_codes::EXECUTION_ERROR;
        }
    };

    if !args.quiet {
        eprintln!(
            "Analyzing {} file(s) on {} thread(s)...",
            files.len(),
            pool.current_num_threads()
        );
    }

    let paths: Vec<PathBuf> = files.iter().map(PathBuf::from).collect();
    let cancel = AtomicBool::new(false);
    let start_time = Instant::now();
    let mut report = pool.install(|| analyzer.analyze_batch(&paths, &cancel));
    let elapsed = start_time.elapsed();

    if !args.include_trace {
        for analysis in &mut report.analyses {
            analysis.trace = WaveformTrace::default();
        }
    }

    let written = match args.output_dir {
        Some(ref dir) => write_report_files(&report, Path::new(dir), args.compact),
        None => output::to_json(&report, args.compact)
            .and_then(|json| output::write_output(&json, None)),
    };
    if let Err(e) = written {
        eprintln!("Error: {}", e);
        return exit_codes::EXECUTION_ERROR;
    }

    if !args.quiet {
        for failure in &report.failures {
            eprintln!("  Failed: {}: {}", failure.path, failure.error);
        }
        eprintln!(
            "Batch complete: {}/{} succeeded, {} failed, {} skipped, {} day(s), {:.1}s",
            report.analyses.len(),
            files.len(),
            report.failures.len(),
            report.skipped.len(),
            report.daily.len(),
            elapsed.as_secs_f64()
        );
    }

    if report.is_complete() {
        exit_codes::SUCCESS
    } else if !report.analyses.is_empty() {
        exit_codes::PARTIAL_FAILURE
    } else {
        exit_codes::EXECUTION_ERROR
    }
}

fn build_pool(jobs: Option<usize>) -> Result<rayon::ThreadPool, String> {
    let mut builder = rayon::ThreadPoolBuilder::new();
    if let Some(n) = jobs {
        if n == 0 {
            return Err("--jobs must be at least 1".to_string());
        }
        builder = builder.num_threads(n);
    }
    builder
        .build()
        .map_err(|e| format!("Failed to start worker threads: {}", e))
}

/// `<stem>_analysis.json` per recording, `<patient>_<date>_daily.json` per day
fn write_report_files(report: &BatchReport, dir: &Path, compact: bool) -> Result<(), String> {
    for analysis in &report.analyses {
        let stem = Path::new(&analysis.source)
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("recording");
        let out_path = dir.join(format!("{}_analysis.json", stem));
        let json = output::to_json(analysis, compact)?;
        output::write_output(&json, out_path.to_str())?;
    }
    for day in &report.daily {
        let out_path = dir.join(format!("{}_{}_daily.json", day.patient, day.date));
        let json = output::to_json(day, compact)?;
        output::write_output(&json, out_path.to_str())?;
    }
    Ok(())
}

fn resolve_files(args: &BatchArgs) -> Result<Vec<String>, String> {
    if let Some(ref pattern) = args.glob {
        resolve_glob(pattern)
    } else if let Some(ref files) = args.files {
        Ok(files.clone())
    } else if let Some(ref dir) = args.dir {
        resolve_dir(dir)
    } else {
        Err("One of --glob, --files, or --dir must be specified".to_string())
    }
}

fn resolve_glob(pattern: &str) -> Result<Vec<String>, String> {
    let paths = glob::glob(pattern)
        .map_err(|e| format!("Invalid glob pattern '{}': {}", pattern, e))?;

    let mut files: Vec<String> = Vec::new();
    for entry in paths {
        match entry {
            Ok(path) => {
                if path.is_file() {
                    if let Some(s) = path.to_str() {
                        files.push(s.to_string());
                    }
                }
            }
            Err(e) => {
                eprintln!("Warning: glob error: {}", e);
            }
        }
    }
    files.sort();
    Ok(files)
}

fn resolve_dir(dir: &str) -> Result<Vec<String>, String> {
    let root = Path::new(dir);
    if !root.is_dir() {
        return Err(format!("Recording directory not found: {}", dir));
    }

    let mut files: Vec<String> = Vec::new();
    walk_dir(root, 0, &mut files);
    files.sort();
    Ok(files)
}

fn walk_dir(dir: &Path, depth: usize, files: &mut Vec<String>) {
    if depth > DIR_MAX_DEPTH {
        return;
    }

    let entries = match std::fs::read_dir(dir) {
        Ok(e) => e,
        Err(e) => {
            log::warn!("Cannot read {}: {}", dir.display(), e);
            return;
        }
    };

    for entry in entries.flatten() {
        let path = entry.path();
        if entry.file_name().to_string_lossy().starts_with('.') {
            continue;
        }

        if path.is_dir() {
            walk_dir(&path, depth + 1, files);
        } else if path.is_file() && analysis_params::is_supported_extension(&path) {
            if let Some(s) = path.to_str() {
                files.push(s.to_string());
            }
        }
    }
}
