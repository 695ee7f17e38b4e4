/*!
 * Line breaking for subtitle text.
 *
 * Picks the break point of a two-line cue the way a subtitle editor would:
 * a sentence boundary beats a comma, a comma beats a conjunction, and among
 * otherwise equal candidates a bottom-heavy pyramid wins. Some breaks are
 * never produced at all: after an article, possessive or negation, between
 * a subject pronoun and its verb, between a first and a last name, and
 * inside a fixed multi-word name.
 *
 * Used by the structural validator (re-breaking long lines) and by the merge
 * engine (fitting combined text into two lines).
 */

use once_cell::sync::Lazy;
use std::collections::HashSet;

use crate::subtitle_processor::cue::{display_width, is_dual_speaker_text};
use super::constraints::ConstraintTable;

/// Words that bind to the next word; a line never ends on one of them
static BIND_FORWARD: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // Dutch articles, demonstratives, possessives, negation, quantifiers
        "de", "het", "een", "deze", "die", "dit", "dat", "mijn", "jouw", "zijn", "haar",
        "ons", "onze", "hun", "z'n", "d'r", "m'n", "niet", "geen", "noch", "nooit", "zich",
        "alle", "elk", "elke", "iedere", "veel", "weinig", "enkele", "sommige", "meer",
        "meeste", "vele",
        // English
        "the", "a", "an", "my", "your", "his", "its", "our", "their", "this", "these",
        "those", "not", "no", "every", "each",
    ]
    .into_iter()
    .collect()
});

/// Conjunctions, subordinators and prepositions: good words to open line two with
static BREAK_BEFORE: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "en", "of", "maar", "want", "dus", "noch", "dat", "die", "wie", "wat", "waar",
        "omdat", "hoewel", "terwijl", "als", "toen", "nadat", "voordat", "zodra", "tenzij",
        "mits", "wanneer", "waardoor", "waarmee", "waarin", "waarop", "waarbij", "zodat",
        "doordat", "aangezien", "ofschoon", "alhoewel", "totdat", "in", "op", "aan", "bij",
        "met", "van", "voor", "naar", "over", "door", "uit", "onder", "tussen", "tegen",
        "tot", "om", "zonder", "achter", "langs", "binnen", "buiten", "boven", "beneden",
        "tijdens", "sinds", "vanaf", "wegens", "ondanks", "behalve", "volgens", "naast",
        "rondom", "waarvan", "waarvoor", "waaruit", "waarover",
        "and", "or", "but", "because", "so", "when", "while", "if", "that", "which", "who",
        "to", "in", "on", "at", "with", "from", "for", "of", "about", "after", "before",
    ]
    .into_iter()
    .collect()
});

/// Subject pronouns; a break straight after one separates it from its verb
static SUBJECT_PRONOUNS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "ik", "jij", "je", "hij", "zij", "ze", "wij", "we", "jullie", "u", "men",
        "i", "you", "he", "she", "they",
    ]
    .into_iter()
    .collect()
});

const KEEP_TOGETHER: &[&str] = &[
    "new deal", "sovjet-unie", "eerste wereldoorlog", "tweede wereldoorlog", "mein kampf",
    "rode kruis", "rode leger", "derde rijk", "heilige stoel", "verenigde staten",
    "verenigd koninkrijk", "europese unie", "verenigde naties",
];

const ORPHAN_MIN_CHARS: usize = 8;

/// A chosen split of one text into two lines
#[derive(Debug, Clone, PartialEq)]
pub struct BreakChoice {
    pub top: String,
    pub bottom: String,
    pub score: i32,
}

impl BreakChoice {
    pub fn joined(&self) -> String {
        format!("{}\n{}", self.top, self.bottom)
    }
}

fn clean_word(word: &str) -> String {
    word.trim_start_matches(['-', '"', '\'', '('])
        .trim_end_matches(['.', ',', ';', ':', '!', '?', '\u{2026}', '"', '\'', ')'])
        .to_lowercase()
}

/// Whether a line ending on `word` splits a grammatical unit
pub fn binds_forward(word: &str) -> bool {
    BIND_FORWARD.contains(clean_word(word).as_str())
}

fn ends_sentence(word: &str) -> bool {
    (word.ends_with('.') && !word.ends_with("...")) || word.ends_with('?') || word.ends_with('!')
}

fn ends_clause(word: &str) -> bool {
    word.ends_with(',') || word.ends_with(';') || word.ends_with(':')
}

fn is_capitalised(word: &str) -> bool {
    let mut chars = word.chars();
    matches!(chars.next(), Some(c) if c.is_uppercase())
        && word.chars().filter(|c| c.is_alphabetic()).count() >= 2
}

/// Collapse every run of whitespace (newlines included) into one space
pub fn collapse_whitespace(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Whether breaking between `words[i - 1]` and `words[i]` is never acceptable
fn is_forbidden_break(words: &[&str], i: usize) -> bool {
    let last_top = words[i - 1];
    let first_bottom = words[i];
    let last_clean = clean_word(last_top);
    let first_clean = clean_word(first_bottom);
    let punctuated = ends_sentence(last_top) || ends_clause(last_top) || last_top.ends_with("...");

    if punctuated {
        return false;
    }
    if BIND_FORWARD.contains(last_clean.as_str()) {
        return true;
    }
    // Subject pronoun followed by what is most likely its verb
    if SUBJECT_PRONOUNS.contains(last_clean.as_str())
        && first_bottom.chars().next().is_some_and(|c| c.is_lowercase())
        && !BREAK_BEFORE.contains(first_clean.as_str())
    {
        return true;
    }
    // First name + last name
    if is_capitalised(last_top)
        && is_capitalised(first_bottom)
        && !SUBJECT_PRONOUNS.contains(last_clean.as_str())
        && i >= 2
        && !ends_sentence(words[i - 2])
    {
        return true;
    }

    let top = words[..i].join(" ").to_lowercase();
    let bottom = words[i..].join(" ").to_lowercase();
    let full = words.join(" ").to_lowercase();
    KEEP_TOGETHER
        .iter()
        .any(|phrase| full.contains(phrase) && !top.contains(phrase) && !bottom.contains(phrase))
}

fn score_break(words: &[&str], i: usize, top: &str, bottom: &str) -> i32 {
    let mut score = 0;
    let top_len = display_width(top) as f64;
    let bottom_len = display_width(bottom) as f64;

    let ratio = if bottom_len > 0.0 { top_len / bottom_len } else { 99.0 };
    if (0.6..=0.9).contains(&ratio) {
        score += 3;
    } else if ratio > 0.9 && ratio <= 1.1 {
        score += 2;
    } else if (0.4..0.6).contains(&ratio) {
        score += 1;
    } else if ratio > 1.1 {
        score -= 1;
    }
    if ratio > 1.5 {
        score -= 3;
    }

    if i == 1 && display_width(top) < ORPHAN_MIN_CHARS {
        score -= 5;
    }
    if i == words.len() - 1 && display_width(bottom) < ORPHAN_MIN_CHARS {
        score -= 5;
    }

    let last_top = words[i - 1];
    if ends_sentence(last_top) {
        score += 7;
    } else if ends_clause(last_top) {
        score += 4;
    }
    if BREAK_BEFORE.contains(clean_word(words[i]).as_str()) {
        score += 2;
    }

    score
}

/// True when a line holds a sentence end followed by more text on that line
pub fn has_midline_sentence_end(text: &str) -> bool {
    text.split('\n').any(|line| {
        let words: Vec<&str> = line.split_whitespace().collect();
        words
            .windows(2)
            .any(|pair| ends_sentence(pair[0]) && pair[1].chars().next().is_some_and(|c| c.is_uppercase() || c.is_numeric()))
    })
}

/// Line breaker bound to one constraint table
#[derive(Debug, Clone, Copy)]
pub struct LineBreaker {
    max_chars: usize,
    max_lines: usize,
}

impl LineBreaker {
    pub fn new(table: &ConstraintTable) -> Self {
        Self {
            max_chars: table.max_chars_per_line,
            max_lines: table.max_lines,
        }
    }

    fn fits(&self, line: &str) -> bool {
        display_width(line) <= self.max_chars
    }

    /// Best allowed two-line split of `text`, ignoring its current breaks
    pub fn best_break(&self, text: &str) -> Option<BreakChoice> {
        let collapsed = collapse_whitespace(text);
        let words: Vec<&str> = collapsed.split(' ').filter(|w| !w.is_empty()).collect();
        if words.len() < 2 {
            return None;
        }

        let mut best: Option<(BreakChoice, usize)> = None;
        for i in 1..words.len() {
            let top = words[..i].join(" ");
            let bottom = words[i..].join(" ");
            if !self.fits(&top) || !self.fits(&bottom) || is_forbidden_break(&words, i) {
                continue;
            }
            let score = score_break(&words, i, &top, &bottom);
            let imbalance = display_width(&top).abs_diff(display_width(&bottom));
            let better = match &best {
                None => true,
                Some((current, current_imbalance)) => {
                    score > current.score || (score == current.score && imbalance < *current_imbalance)
                }
            };
            if better {
                best = Some((BreakChoice { top, bottom, score }, imbalance));
            }
        }
        best.map(|(choice, _)| choice)
    }

    /// Fit `text` into at most two lines within the character limit.
    ///
    /// Returns `None` when that is impossible without an illegal break.
    /// Text is never shortened.
    pub fn reflow(&self, text: &str) -> Option<String> {
        let lines: Vec<&str> = text.split('\n').filter(|l| !l.trim().is_empty()).collect();
        if lines.is_empty() {
            return None;
        }

        if is_dual_speaker_text(&lines.join("\n")) {
            return self.reflow_dual_speaker(lines[0], lines[1]);
        }
        // Three or more speakers in one cue are not supported
        if lines.iter().skip(1).any(|l| l.trim_start().starts_with('-')) {
            return None;
        }

        let collapsed = collapse_whitespace(text);
        let sentence_break = self
            .best_break(&collapsed)
            .filter(|choice| ends_sentence(choice.top.rsplit(' ').next().unwrap_or("")));

        if self.max_lines >= 2 {
            if let Some(choice) = sentence_break {
                return Some(choice.joined());
            }
        }
        if self.fits(&collapsed) {
            return Some(collapsed);
        }
        if self.max_lines < 2 {
            return None;
        }
        self.best_break(&collapsed).map(|choice| choice.joined())
    }

    fn reflow_dual_speaker(&self, first: &str, second: &str) -> Option<String> {
        let first = collapse_whitespace(first.trim_start().trim_start_matches('-'));
        let second = collapse_whitespace(second.trim_start().trim_start_matches('-'));
        let second = format!("-{}", second);
        (self.fits(&first) && self.fits(&second)).then(|| format!("{}\n{}", first, second))
    }
}
