use crate::error::{Result, VentError};
use memmap2::Mmap;
use std::fs::File;
use std::path::Path;

/// Open a recording and map it into memory (read-only).
///
/// Callers must not pass zero-length files; `read_waveform_file` short-circuits them.
pub fn mmap_file(path: &Path) -> Result<Mmap> {
    let file = File::open(path).map_err(VentError::IoError)?;
    // SAFETY: the map is read-only and dropped before the parse returns.
    let mmap = unsafe { Mmap::map(&file).map_err(VentError::IoError)? };
    Ok(mmap)
}
