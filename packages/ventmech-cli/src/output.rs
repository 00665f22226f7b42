use std::io::Write;
use std::path::Path;

/// Write a JSON document to stdout, or to a file whose parent directories
/// are created on demand.
pub fn write_output(json: &str, output_path: Option<&str>) -> Result<(), String> {
    let Some(path) = output_path else {
        let stdout = std::io::stdout();
        let mut handle = stdout.lock();
        return handle
            .write_all(json.as_bytes())
            .and_then(|_| handle.write_all(b"\n"))
            .map_err(|e| format!("Failed to write to stdout: {}", e));
    };

    let path = Path::new(path);
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)
            .map_err(|e| format!("Failed to create '{}': {}", parent.display(), e))?;
    }
    std::fs::write(path, json)
        .map_err(|e| format!("Failed to write output file '{}': {}", path.display(), e))
}

/// Serialize a value to JSON (pretty or compact). NaN values become `null`.
pub fn to_json<T: serde::Serialize>(value: &T, compact: bool) -> Result<String, String> {
    let json = if compact {
        serde_json::to_string(value)
    } else {
        serde_json::to_string_pretty(value)
    };
    json.map_err(|e| format!("JSON serialization failed: {}", e))
}
