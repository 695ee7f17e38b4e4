use std::fmt::Write;

use crate::language_utils;
use crate::subtitle_processor::cue::Cue;

use super::TranslationStyle;

const SYSTEM_TEMPLATE: &str = r#"You are a professional subtitler translating {source_language} subtitles into {target_language}.

## Output format
- Answer with one block per entry, in order, each starting with its marker line: <<ENTRY_N>>
- Put only the translated subtitle text under each marker, nothing else
- Never add commentary before, between or after the blocks

## Subtitle rules
- At most {max_lines} lines per entry and {max_chars} characters per line
- Aim for about {target_cps} characters per second of display time; condense rather than overflow
- Keep two-speaker entries as two lines, each starting with "- "
- Preserve inline tags such as <i> exactly

## Merge hints
- To combine consecutive entries N to M into one subtitle, use the marker <<ENTRY_N-M>>
- Start an entry with [SC] when the speaker changes from the previous entry
- Start an entry with [NM] when it must never be combined with the previous entry"#;

/// System prompt for one style
pub fn system_prompt(style: &TranslationStyle) -> String {
    let language_name = |code: &str| language_utils::get_language_name(code).unwrap_or_else(|_| code.to_string());

    let mut prompt = SYSTEM_TEMPLATE
        .replace("{source_language}", &language_name(&style.source_language))
        .replace("{target_language}", &language_name(&style.target_language))
        .replace("{max_lines}", &style.max_lines.to_string())
        .replace("{max_chars}", &style.max_chars_per_line.to_string())
        .replace("{target_cps}", &format!("{:.1}", style.target_cps));

    if let Some(notes) = style.notes.as_deref().filter(|n| !n.trim().is_empty()) {
        prompt.push_str("\n\n## Notes\n");
        prompt.push_str(notes.trim());
    }
    prompt
}

/// User prompt: read-only context, then the numbered entries to translate.
///
/// Entry numbers are 1-based positions within `entries`.
pub fn user_prompt(context: &[Cue], entries: &[Cue], style: &TranslationStyle) -> String {
    let mut prompt = String::new();

    if !context.is_empty() {
        prompt.push_str("Previous lines, for context only (do not translate):\n");
        for cue in context {
            let _ = writeln!(prompt, "> {}", cue.text.replace('\n', " / "));
        }
        prompt.push('\n');
    }

    let _ = writeln!(prompt, "Translate these {} entries:\n", entries.len());
    for (position, cue) in entries.iter().enumerate() {
        let budget = char_budget(cue, style);
        let _ = writeln!(
            prompt,
            "<<ENTRY_{}>> ({:.1}s, about {} characters)",
            position + 1,
            cue.duration_ms() as f64 / 1000.0,
            budget
        );
        let _ = writeln!(prompt, "{}\n", cue.text);
    }
    prompt
}

/// Characters the cue can hold at the target reading speed, capped by the layout
pub fn char_budget(cue: &Cue, style: &TranslationStyle) -> usize {
    let by_speed = (cue.duration_ms() as f64 / 1000.0 * style.target_cps).floor() as usize;
    by_speed.min(style.max_chars_per_line * style.max_lines)
}
