/*!
 * Tests for the SRT codec through the public API
 */

use anyhow::Result;

use cueforge::errors::ParseErrorKind;
use cueforge::subtitle_processor::{
    ms_to_timecode, parse, renumber, serialize, timecode_to_ms, Cue, SpeakerMarker, SubtitleFile, TextEncoding,
};
use crate::common;

#[test]
fn test_serializeThenParse_shouldPreserveCues() {
    let cues = vec![
        Cue::new(1, 1_000, 3_500, "Eerste regel\nTweede regel"),
        Cue::new(2, 4_000, 6_000, "Nog iets").with_marker(SpeakerMarker::SpeakerChange),
        Cue::new(3, 3_599_999, 3_601_000, "Over het uur heen"),
    ];

    let bytes = serialize(&cues);
    let outcome = parse(&bytes);

    assert!(outcome.is_clean());
    assert_eq!(outcome.encoding, TextEncoding::Utf8Bom);
    assert_eq!(outcome.cues, cues);
    assert_eq!(serialize(&outcome.cues), bytes);
}

#[test]
fn test_parse_withLossyInput_shouldFlagIt() {
    let bytes = b"1\r\n00:00:01,000 --> 00:00:02,000\r\nBad \x81\x8D bytes\r\n";
    let outcome = parse(bytes);

    assert_eq!(outcome.cues.len(), 1);
    assert!(outcome.used_lossy_fallback());
    assert!(!outcome.is_clean());
}

#[test]
fn test_parse_withMalformedBlock_shouldKeepTheRest() {
    let srt = "1\n00:00:01,000 --> 00:00:02,000\nFirst\n\n2\n00:00:61,000 --> 00:00:62,000\nBroken\n\n3\n00:00:05,000 --> 00:00:06,000\nThird\n";
    let outcome = parse(srt.as_bytes());

    assert_eq!(outcome.cues.len(), 2);
    assert_eq!(outcome.errors.len(), 1);
    assert_eq!(outcome.errors[0].block, 2);
    assert_eq!(outcome.errors[0].line, 5);
    assert!(matches!(outcome.errors[0].kind, ParseErrorKind::MalformedTimecode { .. }));
}

#[test]
fn test_timecodes_shouldStayInRange() {
    assert_eq!(timecode_to_ms("23:59:59,999").unwrap(), 86_399_999);
    assert!(timecode_to_ms("24:00:00,000").is_err());
    assert!(timecode_to_ms("00:00:00,1000").is_err());
    assert_eq!(ms_to_timecode(u64::MAX), "23:59:59,999");
}

#[test]
fn test_renumber_shouldStartAtOne() {
    let mut cues = common::numbered_cues(3);
    cues[0].index = 9;
    cues[2].index = 40;
    renumber(&mut cues);
    assert_eq!(cues.iter().map(|c| c.index).collect::<Vec<_>>(), vec![1, 2, 3]);
}

#[test]
fn test_subtitleFile_load_withMissingFile_shouldFail() -> Result<()> {
    let dir = common::create_temp_dir()?;
    assert!(SubtitleFile::load(dir.path().join("absent.srt")).is_err());
    Ok(())
}

#[test]
fn test_subtitleFile_load_shouldLiftMarkers() -> Result<()> {
    let dir = common::create_temp_dir()?;
    let path = common::create_test_file(
        dir.path(),
        "marked.srt",
        b"1\n00:00:01,000 --> 00:00:02,000\n[NM] Niet samenvoegen\n",
    )?;
    let file = SubtitleFile::load(&path)?;
    assert_eq!(file.cues()[0].speaker_marker, SpeakerMarker::NoMerge);
    assert_eq!(file.cues()[0].text, "Niet samenvoegen");
    Ok(())
}
