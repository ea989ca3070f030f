// Clean dictated transcripts before they are embedded in an audit prompt.
// Dictation software and copy-paste leave invisible characters behind, and a
// transcript must never be able to speak to the auditor as an instruction.

/// Maximum transcript length sent to the auditor (characters).
pub const MAX_TRANSCRIPT_CHARS: usize = 20_000;

const TRUNCATION_MARKER: &str = "…[TRUNCATED]";

/// Outcome of sanitizing one transcript. Carries counts only, never content.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SanitizedText {
    pub text: String,
    pub removed_lines: usize,
    pub truncated: bool,
}

/// Sanitize a transcript for LLM consumption.
pub fn sanitize_for_llm(raw: &str) -> String {
    sanitize_transcript(raw).text
}

/// Strip invisible characters, drop instruction-like lines, normalize
/// whitespace, and cap the length at `MAX_TRANSCRIPT_CHARS`.
pub fn sanitize_transcript(raw: &str) -> SanitizedText {
    let visible = remove_invisible_chars(raw);
    let (kept, removed_lines) = remove_instruction_lines(&visible);

    if removed_lines > 0 {
        tracing::warn!(
            removed_lines,
            "Instruction-like lines removed from transcript before audit"
        );
    }

    let normalized = normalize_whitespace(&kept);
    let (text, truncated) = truncate_chars(&normalized, MAX_TRANSCRIPT_CHARS);

    SanitizedText {
        text,
        removed_lines,
        truncated,
    }
}

/// Drop zero-width, bidi-control and other control characters, keeping
/// ordinary whitespace.
fn remove_invisible_chars(text: &str) -> String {
    text.chars()
        .filter(|c| {
            if matches!(*c, ' ' | '\n' | '\t' | '\r') {
                return true;
            }
            if matches!(
                *c,
                '\u{200B}'..='\u{200F}' | '\u{202A}'..='\u{202E}' | '\u{2060}'..='\u{2064}' | '\u{FEFF}'
            ) {
                return false;
            }
            !c.is_control()
        })
        .collect()
}

const ROLE_MARKERS: &[&str] = &[
    "system:",
    "assistant:",
    "user:",
    "[system]",
    "[assistant]",
    "[inst]",
    "[/inst]",
    "<<sys>>",
    "note to ai:",
    "instructions:",
    "<system",
    "</system",
    "<instruction",
    "</instruction",
    "</transcript",
    "<extracted",
    "</extracted",
];

const OVERRIDE_PHRASES: &[&str] = &[
    "ignore previous instructions",
    "ignore all instructions",
    "ignore the above",
    "disregard your instructions",
    "disregard all instructions",
    "forget your instructions",
    "new instructions:",
    "override:",
];

fn is_instruction_line(lowered: &str) -> bool {
    ROLE_MARKERS.iter().any(|m| lowered.starts_with(m))
        || OVERRIDE_PHRASES.iter().any(|p| lowered.contains(p))
}

/// Remove instruction-like lines. A phrase split across two lines, where
/// neither half matches alone, removes both lines.
fn remove_instruction_lines(text: &str) -> (String, usize) {
    let lines: Vec<&str> = text.lines().collect();
    let lowered: Vec<String> = lines.iter().map(|l| l.trim().to_lowercase()).collect();
    let mut kept: Vec<&str> = Vec::with_capacity(lines.len());
    let mut removed = 0usize;
    let mut i = 0;

    while i < lines.len() {
        if is_instruction_line(&lowered[i]) {
            removed += 1;
            i += 1;
            continue;
        }

        if let Some(next) = lowered.get(i + 1) {
            if !is_instruction_line(next) && is_instruction_line(&format!("{} {}", lowered[i], next)) {
                removed += 2;
                i += 2;
                continue;
            }
        }

        kept.push(lines[i]);
        i += 1;
    }

    (kept.join("\n"), removed)
}

/// Trim each line, collapse runs of blank lines, drop leading/trailing blanks.
fn normalize_whitespace(text: &str) -> String {
    let mut lines: Vec<&str> = Vec::new();
    let mut prev_blank = true;

    for line in text.lines().map(str::trim) {
        if line.is_empty() {
            if !prev_blank {
                lines.push("");
            }
            prev_blank = true;
        } else {
            lines.push(line);
            prev_blank = false;
        }
    }

    while lines.last() == Some(&"") {
        lines.pop();
    }

    lines.join("\n")
}

/// Truncate to at most `max_chars` characters, preferring a word boundary.
fn truncate_chars(text: &str, max_chars: usize) -> (String, bool) {
    let Some((cut, _)) = text.char_indices().nth(max_chars) else {
        return (text.to_string(), false);
    };

    let head = &text[..cut];
    let head = match head.rfind(char::is_whitespace) {
        Some(pos) if pos > 0 => &head[..pos],
        _ => head,
    };

    (format!("{head}{TRUNCATION_MARKER}"), true)
}
