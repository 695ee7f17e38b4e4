use log::{debug, warn};
use serde::Serialize;

use super::cue::{Cue, SpeakerMarker};
use super::encoding::{decode, TextEncoding};
use super::timecode::{looks_like_timing_line, ms_to_timecode, parse_timing_line};
use crate::errors::{EncodingError, ParseError, ParseErrorKind};

// @module: SRT reader/writer, the only one in the crate

/// Canonical line ending of every file we write
pub const LINE_ENDING: &str = "\r\n";

/// UTF-8 byte order mark written at the start of every file
pub const UTF8_BOM: &[u8] = &[0xEF, 0xBB, 0xBF];

/// Result of parsing: everything recoverable plus what went wrong
#[derive(Debug, Clone)]
pub struct ParseOutcome {
    pub cues: Vec<Cue>,
    pub errors: Vec<ParseError>,
    pub encoding: TextEncoding,
    /// Set whenever decoding had to substitute replacement characters
    pub encoding_warning: Option<EncodingError>,
}

impl ParseOutcome {
    pub fn is_clean(&self) -> bool {
        self.errors.is_empty() && self.encoding_warning.is_none()
    }

    pub fn used_lossy_fallback(&self) -> bool {
        self.encoding_warning.as_ref().is_some_and(|w| w.lossy_fallback)
    }

    /// Everything but the cues, for reports
    pub fn diagnostics(&self) -> SourceDiagnostics {
        SourceDiagnostics {
            encoding: Some(self.encoding),
            encoding_warning: self.encoding_warning.clone(),
            parse_errors: self.errors.clone(),
        }
    }

    pub fn into_parts(self) -> (Vec<Cue>, SourceDiagnostics) {
        let diagnostics = self.diagnostics();
        (self.cues, diagnostics)
    }
}

// @struct: How the input decoded and which blocks were dropped
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct SourceDiagnostics {
    pub encoding: Option<TextEncoding>,
    // @field: Set when the text had to be decoded lossily
    pub encoding_warning: Option<EncodingError>,
    pub parse_errors: Vec<ParseError>,
}

impl SourceDiagnostics {
    pub fn is_clean(&self) -> bool {
        self.encoding_warning.is_none() && self.parse_errors.is_empty()
    }

    /// One line for logs and outcome messages, `None` when clean
    pub fn summary(&self) -> Option<String> {
        match (&self.encoding_warning, self.parse_errors.len()) {
            (None, 0) => None,
            (Some(warning), 0) => Some(warning.to_string()),
            (None, n) => Some(format!("{} malformed blocks skipped", n)),
            (Some(warning), n) => Some(format!("{}; {} malformed blocks skipped", warning, n)),
        }
    }
}

// One physical line with its location in the decoded text
struct Line<'a> {
    number: usize,
    offset: usize,
    content: &'a str,
}

/// Parse raw file bytes, detecting the encoding first
pub fn parse(bytes: &[u8]) -> ParseOutcome {
    let decoded = decode(bytes);
    if let Some(warning) = &decoded.warning {
        warn!("{}", warning);
    }
    let (cues, errors) = parse_str(&decoded.text);
    ParseOutcome {
        cues,
        errors,
        encoding: decoded.encoding,
        encoding_warning: decoded.warning,
    }
}

/// Parse already-decoded SRT text.
///
/// Malformed blocks are skipped and reported; the rest of the file is still
/// returned, so one bad block never costs the whole file.
pub fn parse_str(text: &str) -> (Vec<Cue>, Vec<ParseError>) {
    let text = text.strip_prefix('\u{feff}').unwrap_or(text);

    let mut blocks: Vec<Vec<Line>> = Vec::new();
    let mut current: Vec<Line> = Vec::new();
    let mut offset = 0;
    for (i, raw) in text.split('\n').enumerate() {
        let content = raw.trim_end_matches('\r');
        if content.trim().is_empty() {
            if !current.is_empty() {
                blocks.push(std::mem::take(&mut current));
            }
        } else {
            current.push(Line { number: i + 1, offset, content });
        }
        offset += raw.len() + 1;
    }
    if !current.is_empty() {
        blocks.push(current);
    }

    let mut cues = Vec::with_capacity(blocks.len());
    let mut errors = Vec::new();
    for (i, block) in blocks.iter().enumerate() {
        match parse_block(block, cues.len() + 1) {
            Ok(cue) => cues.push(cue),
            Err(kind) => {
                let error = ParseError {
                    block: i + 1,
                    line: block[0].number,
                    byte_offset: block[0].offset,
                    kind,
                };
                debug!("Skipping malformed SRT {}", error);
                errors.push(error);
            }
        }
    }

    (cues, errors)
}

fn parse_block(block: &[Line], fallback_index: usize) -> Result<Cue, ParseErrorKind> {
    let first = block[0].content.trim();

    // Index line is optional when the block opens with its timing line
    let (index, timing_at) = if looks_like_timing_line(first) {
        (fallback_index, 0)
    } else {
        let index = first
            .parse::<usize>()
            .map_err(|_| ParseErrorKind::InvalidIndex(first.to_string()))?;
        (index, 1)
    };

    let timing = block
        .get(timing_at)
        .map(|l| l.content.trim())
        .filter(|l| looks_like_timing_line(l))
        .ok_or(ParseErrorKind::MissingTimecode)?;

    let (start_ms, end_ms) = parse_timing_line(timing).map_err(|cause| {
        ParseErrorKind::MalformedTimecode {
            line: timing.to_string(),
            cause,
        }
    })?;
    if end_ms <= start_ms {
        return Err(ParseErrorKind::InvalidTimeRange { start_ms, end_ms });
    }

    let text = block[timing_at + 1..]
        .iter()
        .map(|l| l.content.trim_end())
        .collect::<Vec<_>>()
        .join("\n");
    let (speaker_marker, text) = SpeakerMarker::extract(&text);
    if text.trim().is_empty() {
        return Err(ParseErrorKind::EmptyText);
    }

    Ok(Cue {
        index,
        start_ms,
        end_ms,
        text,
        speaker_marker,
    })
}

/// Render cues in the canonical layout (CRLF, no BOM)
pub fn to_srt_string(cues: &[Cue]) -> String {
    cues.iter()
        .map(|cue| {
            let mut text = String::new();
            if let Some(tag) = cue.speaker_marker.tag() {
                text.push_str(tag);
                text.push(' ');
            }
            text.push_str(&cue.text.replace('\n', LINE_ENDING));
            format!(
                "{index}{eol}{start} --> {end}{eol}{text}{eol}",
                index = cue.index,
                start = ms_to_timecode(cue.start_ms),
                end = ms_to_timecode(cue.end_ms),
                text = text,
                eol = LINE_ENDING,
            )
        })
        .collect::<Vec<_>>()
        .join(LINE_ENDING)
}

/// Canonical file bytes: UTF-8 with BOM, CRLF line endings
pub fn serialize(cues: &[Cue]) -> Vec<u8> {
    let body = to_srt_string(cues);
    let mut bytes = Vec::with_capacity(UTF8_BOM.len() + body.len());
    bytes.extend_from_slice(UTF8_BOM);
    bytes.extend_from_slice(body.as_bytes());
    bytes
}

/// Reassign sequential indices starting at 1
pub fn renumber(cues: &mut [Cue]) {
    for (i, cue) in cues.iter_mut().enumerate() {
        cue.index = i + 1;
    }
}
