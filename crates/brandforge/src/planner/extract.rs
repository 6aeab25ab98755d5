//! Noise-tolerant JSON extraction from chat-model output.
//!
//! Models wrap their JSON in prose, markdown fences, or an envelope object.
//! Extraction strips fences, locates the first bracketed structure, and
//! tries progressively smaller candidate spans until one parses.

use serde_json::Value;

/// Extracts the first parseable JSON value from `text`, or `None`.
pub fn extract_json(text: &str) -> Option<Value> {
    let cleaned = strip_fences(text);
    let start = cleaned.find(|c| c == '{' || c == '[')?;

    let tail = &cleaned[start..];
    let mut candidates: Vec<&str> = vec![tail];
    if let Some(end) = balanced_span(cleaned, start) {
        let span = &cleaned[start..end];
        if span.len() < tail.len() {
            candidates.push(span);
        }
    }

    candidates
        .into_iter()
        .find_map(|candidate| serde_json::from_str(candidate).ok())
}

/// Removes a surrounding markdown code fence, including a language tag.
fn strip_fences(text: &str) -> &str {
    let trimmed = text.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    // Drop the fence line ("```json", "```", ...).
    let rest = match rest.find('\n') {
        Some(i) => &rest[i + 1..],
        None => rest,
    };
    let rest = rest.trim_end();
    rest.strip_suffix("```").unwrap_or(rest).trim()
}

/// Finds the end (exclusive) of the balanced bracketed structure opening at
/// `start`, aware of string literals and escape sequences.
fn balanced_span(text: &str, start: usize) -> Option<usize> {
    let mut depth: i32 = 0;
    let mut in_string = false;
    let mut escape_next = false;

    for (i, c) in text[start..].char_indices() {
        if escape_next {
            escape_next = false;
            continue;
        }
        match c {
            '\\' if in_string => escape_next = true,
            '"' => in_string = !in_string,
            '{' | '[' if !in_string => depth += 1,
            '}' | ']' if !in_string => {
                depth -= 1;
                if depth == 0 {
                    return Some(start + i + c.len_utf8());
                }
            }
            _ => {}
        }
    }
    None
}
