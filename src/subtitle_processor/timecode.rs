use once_cell::sync::Lazy;
use regex::Regex;

use crate::errors::{TimecodeComponent, TimecodeError};

// @module: Timecode <-> millisecond conversion

// @const: HH:MM:SS,mmm (a '.' separator is tolerated on read)
static TIMECODE_REGEX: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^(\d{1,2}):(\d{2}):(\d{2})[,.](\d{3})$").unwrap()
});

/// Largest value `ms_to_timecode` can express: 23:59:59,999
pub const MAX_TIMECODE_MS: u64 = 24 * 3_600_000 - 1;

fn check_range(
    timecode: &str,
    component: TimecodeComponent,
    value: u32,
    max: u32,
) -> Result<u64, TimecodeError> {
    if value > max {
        return Err(TimecodeError::OutOfRange {
            timecode: timecode.to_string(),
            component,
            value,
            max,
        });
    }
    Ok(u64::from(value))
}

/// Parse `HH:MM:SS,mmm` into milliseconds, range-checking every component
pub fn timecode_to_ms(timecode: &str) -> Result<u64, TimecodeError> {
    let trimmed = timecode.trim();
    let caps = TIMECODE_REGEX
        .captures(trimmed)
        .ok_or_else(|| TimecodeError::Malformed(trimmed.to_string()))?;

    // The regex guarantees short digit runs, so these parses cannot overflow
    let field = |i: usize| -> Result<u32, TimecodeError> {
        caps[i]
            .parse::<u32>()
            .map_err(|_| TimecodeError::Malformed(trimmed.to_string()))
    };

    let hours = check_range(trimmed, TimecodeComponent::Hours, field(1)?, 23)?;
    let minutes = check_range(trimmed, TimecodeComponent::Minutes, field(2)?, 59)?;
    let seconds = check_range(trimmed, TimecodeComponent::Seconds, field(3)?, 59)?;
    let millis = check_range(trimmed, TimecodeComponent::Milliseconds, field(4)?, 999)?;

    Ok(hours * 3_600_000 + minutes * 60_000 + seconds * 1_000 + millis)
}

/// Format milliseconds as `HH:MM:SS,mmm`, clamped to `23:59:59,999`
pub fn ms_to_timecode(ms: u64) -> String {
    let ms = ms.min(MAX_TIMECODE_MS);
    let hours = ms / 3_600_000;
    let minutes = (ms % 3_600_000) / 60_000;
    let seconds = (ms % 60_000) / 1_000;
    let millis = ms % 1_000;

    format!("{:02}:{:02}:{:02},{:03}", hours, minutes, seconds, millis)
}

/// Parse a `start --> end` line. Anything after the end timecode
/// (legacy position coordinates) is ignored.
pub fn parse_timing_line(line: &str) -> Result<(u64, u64), TimecodeError> {
    let (start, rest) = line
        .split_once("-->")
        .ok_or_else(|| TimecodeError::Malformed(line.trim().to_string()))?;
    let end = rest
        .split_whitespace()
        .next()
        .ok_or_else(|| TimecodeError::Malformed(line.trim().to_string()))?;

    Ok((timecode_to_ms(start)?, timecode_to_ms(end)?))
}

/// Cheap shape check used to tell timing lines from text lines
pub fn looks_like_timing_line(line: &str) -> bool {
    line.contains("-->")
}
