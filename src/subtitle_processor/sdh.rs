use once_cell::sync::Lazy;
use regex::{Captures, Regex};

use super::cue::Cue;

// @module: Removal of hearing-impaired annotations

// @const: [bracketed descriptions]; all-caps tags like [SC] are kept
static BRACKETED: Lazy<Regex> = Lazy::new(|| Regex::new(r"\[([^\]]*)\]").unwrap());

static ALL_CAPS_TAG: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z]{2,}$").unwrap());

// @const: (parenthesised sound descriptions)
static SOUND_PARENS: Lazy<Regex> = Lazy::new(|| {
    Regex::new(
        r"(?i)\([^)]*(?:sighs?|laughs?|coughs?|gasps?|groans?|screams?|whispers?|shouts?|cries?|sobs?|sniffs?|clears? throat|playing|singing|humming|whistling|applause|cheering|thunder|explosion|gunshot|doorbell|phone|knocking|footsteps|breathing|panting)[^)]*\)",
    )
    .unwrap()
});

static MUSIC_PARENS: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)\([^)]*music[^)]*\)").unwrap());

static MUSIC_NOTES: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"♪[^♪]*♪|♫[^♫]*♫|\[♪[^\]]*\]|\[♫[^\]]*\]").unwrap());

static ONOMATOPOEIA: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:BANG|CRASH|BOOM|THUD|SLAM|CLICK|BEEP|RING|BUZZ)\b!?").unwrap());

static LEADING_LABELS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?m)^(?:>>\s*|\(\s*[^)]+\s*\)\s*)").unwrap());

// @const: JOHN: / DOCTOR 2: at line start
static SPEAKER_LABEL: Lazy<Regex> = Lazy::new(|| Regex::new(r"^[A-Z][A-Z\s\d]*:\s*").unwrap());

static MULTI_SPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r" {2,}").unwrap());

/// Result of stripping a whole file
#[derive(Debug, Clone)]
pub struct SdhOutcome {
    pub cues: Vec<Cue>,
    pub removed_cues: usize,
    pub tags_removed: usize,
}

/// Strip SDH annotations from one cue text
pub fn strip_sdh(text: &str, keep_music: bool) -> String {
    let mut result = BRACKETED
        .replace_all(text, |caps: &Captures| {
            if ALL_CAPS_TAG.is_match(&caps[1]) {
                caps[0].to_string()
            } else {
                String::new()
            }
        })
        .into_owned();

    result = SOUND_PARENS.replace_all(&result, "").into_owned();
    if !keep_music {
        result = MUSIC_PARENS.replace_all(&result, "").into_owned();
        result = MUSIC_NOTES.replace_all(&result, "").into_owned();
    }
    result = ONOMATOPOEIA.replace_all(&result, "").into_owned();
    result = LEADING_LABELS.replace_all(&result, "").into_owned();

    result
        .split('\n')
        .map(|line| {
            let line = SPEAKER_LABEL.replace(line, "");
            MULTI_SPACE.replace_all(line.trim(), " ").into_owned()
        })
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}

/// Strip every cue; cues left without text are dropped
pub fn remove_sdh(cues: &[Cue], keep_music: bool) -> SdhOutcome {
    let mut kept = Vec::with_capacity(cues.len());
    let mut tags_removed = 0;

    for cue in cues {
        tags_removed += BRACKETED
            .captures_iter(&cue.text)
            .filter(|c| !ALL_CAPS_TAG.is_match(&c[1]))
            .count();
        tags_removed += SOUND_PARENS.find_iter(&cue.text).count();

        let text = strip_sdh(&cue.text, keep_music);
        if text.is_empty() {
            continue;
        }
        let mut cleaned = cue.clone();
        cleaned.text = text;
        kept.push(cleaned);
    }

    SdhOutcome {
        removed_cues: cues.len() - kept.len(),
        cues: kept,
        tags_removed,
    }
}
