use crate::config::LineFilter;
use crate::error::{Result, VentError};
use crate::mmap_utils::mmap_file;
use crate::numeric::round_to;
use crate::types::{Breath, RejectionRecord, WaveformTrace};
use std::path::Path;

/// Substring that marks the start of a breath (carries the breath id)
pub const BREATH_START_MARKER: &str = "BS,";
/// Substring that marks the end of a breath
pub const BREATH_END_MARKER: &str = "BE";

/// Segmented recording
#[derive(Debug, Clone, Default)]
pub struct ParsedWaveform {
    /// Closed breaths in file order
    pub breaths: Vec<Breath>,
    /// All samples of all closed breaths, plus per-breath numbers and lengths
    pub trace: WaveformTrace,
    /// Discarded lines, in file order
    pub rejections: Vec<RejectionRecord>,
}

impl ParsedWaveform {
    pub fn breath_count(&self) -> usize {
        self.breaths.len()
    }

    pub fn is_empty(&self) -> bool {
        self.breaths.is_empty()
    }
}

enum LineKind<'a> {
    Blank,
    BreathStart(&'a str),
    BreathEnd,
    Sample(&'a str),
}

fn classify_line(line: &str) -> LineKind<'_> {
    if line.trim().is_empty() {
        LineKind::Blank
    } else if line.contains(BREATH_START_MARKER) {
        LineKind::BreathStart(line)
    } else if line.contains(BREATH_END_MARKER) {
        LineKind::BreathEnd
    } else {
        LineKind::Sample(line)
    }
}

/// Extract the breath id from a start marker such as `BS, S:1234,`.
///
/// Trailing commas and whitespace are stripped, the line is split on `:` and
/// the first all-digit segment wins. Lines without one yield 0.
pub fn extract_breath_number(line: &str) -> u64 {
    line.trim_end_matches(|c: char| c == ',' || c.is_whitespace())
        .split(':')
        .map(str::trim)
        .find(|s| !s.is_empty() && s.bytes().all(|b| b.is_ascii_digit()))
        .and_then(|s| s.parse::<u64>().ok())
        .unwrap_or(0)
}

/// Parse a `flow,pressure` line. Fields beyond the second are ignored.
fn parse_sample(line: &str) -> std::result::Result<(f64, f64), String> {
    let mut fields = line.split(',');
    let flow = fields
        .next()
        .map(str::trim)
        .ok_or_else(|| "missing flow field".to_string())?;
    let pressure = fields
        .next()
        .map(str::trim)
        .ok_or_else(|| "missing pressure field".to_string())?;

    let flow: f64 = flow
        .parse()
        .map_err(|e| format!("invalid flow '{}': {}", flow, e))?;
    let pressure: f64 = pressure
        .parse()
        .map_err(|e| format!("invalid pressure '{}': {}", pressure, e))?;
    Ok((flow, pressure))
}

/// Accumulates the samples of the breath currently open.
struct BreathBuffer {
    number: u64,
    pressure: Vec<f64>,
    flow: Vec<f64>,
}

impl BreathBuffer {
    fn new() -> Self {
        Self {
            number: 0,
            pressure: Vec::new(),
            flow: Vec::new(),
        }
    }

    fn last(&self) -> Option<(f64, f64)> {
        Some((*self.pressure.last()?, *self.flow.last()?))
    }

    fn close(&mut self) -> Breath {
        Breath::new(
            std::mem::take(&mut self.number),
            std::mem::take(&mut self.pressure),
            std::mem::take(&mut self.flow),
        )
    }
}

/// Segment a recording into breaths.
///
/// Never fails: malformed or implausible lines are logged, written to the
/// rejection ledger and skipped. An input without markers yields no breaths.
pub fn parse_waveform(content: &str, filter: &LineFilter) -> ParsedWaveform {
    let mut parsed = ParsedWaveform::default();
    let mut buffer = BreathBuffer::new();

    for (idx, line) in content.lines().enumerate() {
        let line_no = idx + 1;

        match classify_line(line) {
            LineKind::Blank => {}
            LineKind::BreathStart(marker) => {
                buffer.number = extract_breath_number(marker);
                if buffer.number == 0 {
                    log::debug!("Line {}: no breath id in marker '{}'", line_no, marker.trim());
                }
            }
            LineKind::BreathEnd => {
                let breath = buffer.close();
                parsed.trace.pressure.extend_from_slice(breath.pressure());
                parsed.trace.flow.extend_from_slice(breath.flow());
                parsed.trace.breath_numbers.push(breath.number());
                parsed.trace.breath_lengths.push(breath.len());
                parsed.breaths.push(breath);
            }
            LineKind::Sample(raw) => {
                let (flow, pressure) = match parse_sample(raw) {
                    Ok(values) => values,
                    Err(e) => {
                        log::debug!("Line {}: {}", line_no, e);
                        parsed.rejections.push(RejectionRecord {
                            breath_number: buffer.number,
                            reason: format!("LINE {}, LINE DEL: malformed sample ({})", line_no, e),
                        });
                        continue;
                    }
                };

                // NaN and infinities fail the bounds check too
                let in_bounds =
                    pressure.abs() <= filter.max_abs_pressure && flow.abs() <= filter.max_abs_flow;
                if !in_bounds {
                    parsed.rejections.push(RejectionRecord {
                        breath_number: buffer.number,
                        reason: format!(
                            "LINE {}, LINE DEL: abs(P) > {} or abs(Q) > {}, RAW: {}, {}",
                            line_no, filter.max_abs_pressure, filter.max_abs_flow, pressure, flow
                        ),
                    });
                    continue;
                }

                if let Some((prev_p, prev_q)) = buffer.last() {
                    if (pressure - prev_p).abs() > filter.max_pressure_step {
                        parsed.rejections.push(RejectionRecord {
                            breath_number: buffer.number,
                            reason: format!(
                                "LINE {}, LINE DEL: Pi-Pi-1 > {}, RAW: {}, {}",
                                line_no, filter.max_pressure_step, pressure, prev_p
                            ),
                        });
                        continue;
                    }
                    if (flow - prev_q).abs() > filter.max_flow_step {
                        parsed.rejections.push(RejectionRecord {
                            breath_number: buffer.number,
                            reason: format!(
                                "LINE {}, LINE DEL: Qi-Qi-1 > {}, RAW: {}, {}",
                                line_no, filter.max_flow_step, flow, prev_q
                            ),
                        });
                        continue;
                    }
                }

                buffer.pressure.push(round_to(pressure, 1));
                buffer.flow.push(round_to(flow, 1));
            }
        }
    }

    if !buffer.pressure.is_empty() {
        log::debug!(
            "{} trailing samples after the last end marker were dropped",
            buffer.pressure.len()
        );
    }

    log::info!(
        "Segmented {} breaths ({} samples, {} discarded lines)",
        parsed.breaths.len(),
        parsed.trace.pressure.len(),
        parsed.rejections.len()
    );

    parsed
}

/// Parse a recording from raw bytes (e.g. a memory map). Invalid UTF-8 is
/// replaced rather than rejected.
pub fn parse_waveform_from_bytes(content: &[u8], filter: &LineFilter) -> ParsedWaveform {
    parse_waveform(&String::from_utf8_lossy(content), filter)
}

/// Memory-map and parse a recording file
pub fn read_waveform_file(path: &Path, filter: &LineFilter) -> Result<ParsedWaveform> {
    if !path.exists() {
        return Err(VentError::FileNotFound(path.display().to_string()));
    }

    let metadata = std::fs::metadata(path)?;
    if !metadata.is_file() {
        return Err(VentError::ParseError(format!(
            "{} is not a regular file",
            path.display()
        )));
    }
    if metadata.len() == 0 {
        log::warn!("Recording {} is empty", path.display());
        return Ok(ParsedWaveform::default());
    }

    let mmap = mmap_file(path)?;
    Ok(parse_waveform_from_bytes(&mmap, filter))
}
