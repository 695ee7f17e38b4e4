/*!
 * Text encoding detection for subtitle input.
 *
 * Subtitle files in the wild arrive as UTF-8 (with or without BOM), UTF-16
 * from Windows tools, or Windows-1252 from older rips. Detection order:
 *
 * 1. BOM (UTF-8, UTF-16 LE/BE)
 * 2. BOM-less UTF-16, recognised by its NUL byte pattern
 * 3. strict UTF-8
 * 4. Windows-1252
 *
 * When none of these decode cleanly the bytes are decoded as UTF-8 with
 * replacement characters and the result carries an `EncodingError` with
 * `lossy_fallback` set, so callers can never miss it.
 */

use std::fmt;

use serde::Serialize;

use crate::errors::EncodingError;

/// Encoding the input was decoded with
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum TextEncoding {
    Utf8,
    Utf8Bom,
    Utf16Le,
    Utf16Be,
    Windows1252,
    LossyUtf8,
}

impl fmt::Display for TextEncoding {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Utf8 => "utf-8",
            Self::Utf8Bom => "utf-8-sig",
            Self::Utf16Le => "utf-16le",
            Self::Utf16Be => "utf-16be",
            Self::Windows1252 => "windows-1252",
            Self::LossyUtf8 => "utf-8 (lossy)",
        };
        write!(f, "{}", name)
    }
}

/// Decoded text plus how it was obtained
#[derive(Debug, Clone)]
pub struct DecodedText {
    pub text: String,
    pub encoding: TextEncoding,
    pub warning: Option<EncodingError>,
}

// Windows-1252 code points for 0x80..=0x9F; None marks the five undefined bytes
const CP1252_HIGH: [Option<char>; 32] = [
    Some('\u{20AC}'), None, Some('\u{201A}'), Some('\u{0192}'),
    Some('\u{201E}'), Some('\u{2026}'), Some('\u{2020}'), Some('\u{2021}'),
    Some('\u{02C6}'), Some('\u{2030}'), Some('\u{0160}'), Some('\u{2039}'),
    Some('\u{0152}'), None, Some('\u{017D}'), None,
    None, Some('\u{2018}'), Some('\u{2019}'), Some('\u{201C}'),
    Some('\u{201D}'), Some('\u{2022}'), Some('\u{2013}'), Some('\u{2014}'),
    Some('\u{02DC}'), Some('\u{2122}'), Some('\u{0161}'), Some('\u{203A}'),
    Some('\u{0153}'), None, Some('\u{017E}'), Some('\u{0178}'),
];

fn decode_windows_1252(bytes: &[u8]) -> Option<String> {
    let mut text = String::with_capacity(bytes.len());
    for &b in bytes {
        match b {
            0x80..=0x9F => text.push(CP1252_HIGH[usize::from(b - 0x80)]?),
            // NUL never appears in real subtitle text
            0x00 => return None,
            _ => text.push(char::from(b)),
        }
    }
    Some(text)
}

/// Decode UTF-16 code units; the flag reports whether anything was replaced
fn decode_utf16(bytes: &[u8], little_endian: bool) -> (String, bool) {
    let mut lossy = bytes.len() % 2 != 0;
    let units = bytes.chunks_exact(2).map(|pair| {
        if little_endian {
            u16::from_le_bytes([pair[0], pair[1]])
        } else {
            u16::from_be_bytes([pair[0], pair[1]])
        }
    });
    let text = char::decode_utf16(units)
        .map(|r| {
            r.unwrap_or_else(|_| {
                lossy = true;
                char::REPLACEMENT_CHARACTER
            })
        })
        .collect();
    (text, lossy)
}

/// Guess BOM-less UTF-16 from where the NUL bytes sit
fn sniff_utf16(bytes: &[u8]) -> Option<bool> {
    if bytes.len() < 4 || bytes.len() % 2 != 0 {
        return None;
    }
    let pairs = bytes.len() / 2;
    let odd_zero = bytes.iter().skip(1).step_by(2).filter(|&&b| b == 0).count();
    let even_zero = bytes.iter().step_by(2).filter(|&&b| b == 0).count();
    if odd_zero * 10 >= pairs * 3 && even_zero == 0 {
        Some(true)
    } else if even_zero * 10 >= pairs * 3 && odd_zero == 0 {
        Some(false)
    } else {
        None
    }
}

fn utf16_result(body: &[u8], little_endian: bool) -> DecodedText {
    let (text, lossy) = decode_utf16(body, little_endian);
    let encoding = if little_endian { TextEncoding::Utf16Le } else { TextEncoding::Utf16Be };
    DecodedText {
        text,
        encoding,
        warning: lossy.then(|| EncodingError {
            encoding: encoding.to_string(),
            lossy_fallback: true,
        }),
    }
}

/// Detect the encoding of `bytes` and decode them
pub fn decode(bytes: &[u8]) -> DecodedText {
    if let Some(body) = bytes.strip_prefix(&[0xEF, 0xBB, 0xBF]) {
        return match std::str::from_utf8(body) {
            Ok(text) => DecodedText {
                text: text.to_string(),
                encoding: TextEncoding::Utf8Bom,
                warning: None,
            },
            Err(_) => DecodedText {
                text: String::from_utf8_lossy(body).into_owned(),
                encoding: TextEncoding::LossyUtf8,
                warning: Some(EncodingError {
                    encoding: TextEncoding::Utf8Bom.to_string(),
                    lossy_fallback: true,
                }),
            },
        };
    }
    if let Some(body) = bytes.strip_prefix(&[0xFF, 0xFE]) {
        return utf16_result(body, true);
    }
    if let Some(body) = bytes.strip_prefix(&[0xFE, 0xFF]) {
        return utf16_result(body, false);
    }
    if let Some(little_endian) = sniff_utf16(bytes) {
        return utf16_result(bytes, little_endian);
    }

    if let Ok(text) = std::str::from_utf8(bytes) {
        return DecodedText {
            text: text.to_string(),
            encoding: TextEncoding::Utf8,
            warning: None,
        };
    }

    if let Some(text) = decode_windows_1252(bytes) {
        return DecodedText {
            text,
            encoding: TextEncoding::Windows1252,
            warning: None,
        };
    }

    DecodedText {
        text: String::from_utf8_lossy(bytes).into_owned(),
        encoding: TextEncoding::LossyUtf8,
        warning: Some(EncodingError {
            encoding: TextEncoding::Utf8.to_string(),
            lossy_fallback: true,
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_decode_withUtf8Bom_shouldStripBom() {
        let decoded = decode(b"\xEF\xBB\xBFHallo");
        assert_eq!(decoded.text, "Hallo");
        assert_eq!(decoded.encoding, TextEncoding::Utf8Bom);
        assert!(decoded.warning.is_none());
    }

    #[test]
    fn test_decode_withUtf16LeBom_shouldDecode() {
        let mut bytes = vec![0xFF, 0xFE];
        for unit in "Één".encode_utf16() {
            bytes.extend_from_slice(&unit.to_le_bytes());
        }
        let decoded = decode(&bytes);
        assert_eq!(decoded.text, "Één");
        assert_eq!(decoded.encoding, TextEncoding::Utf16Le);
    }

    #[test]
    fn test_decode_withBomlessUtf16Be_shouldSniff() {
        let mut bytes = Vec::new();
        for unit in "1\r\n00:00".encode_utf16() {
            bytes.extend_from_slice(&unit.to_be_bytes());
        }
        let decoded = decode(&bytes);
        assert_eq!(decoded.encoding, TextEncoding::Utf16Be);
        assert_eq!(decoded.text, "1\r\n00:00");
    }

    #[test]
    fn test_decode_withWindows1252_shouldMapHighBytes() {
        // "café" plus a curly apostrophe in cp1252
        let decoded = decode(b"caf\xE9 \x92s");
        assert_eq!(decoded.text, "café \u{2019}s");
        assert_eq!(decoded.encoding, TextEncoding::Windows1252);
        assert!(decoded.warning.is_none());
    }

    #[test]
    fn test_decode_withUndecodableBytes_shouldFlagLossyFallback() {
        let decoded = decode(b"abc\x81\x8Ddef");
        assert_eq!(decoded.encoding, TextEncoding::LossyUtf8);
        let warning = decoded.warning.expect("lossy decode must be flagged");
        assert!(warning.lossy_fallback);
        assert!(decoded.text.contains('\u{FFFD}'));
    }
}
