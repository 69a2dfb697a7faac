//! Concept extraction and normalization.
//!
//! Documents carry inline `[[Concept Name]]` tags. Extraction masks fenced
//! code blocks and inline code spans first, so tags quoted as code never
//! become graph nodes, then scans for well-formed double-bracket tags (the
//! inner text may not contain `[` or `]`).

use std::collections::BTreeSet;

/// Normalize a raw concept tag to its canonical name.
///
/// Lowercases; maps whitespace, underscores, and slashes to hyphens;
/// collapses hyphen runs; trims leading/trailing hyphens. Idempotent:
/// `normalize_concept(normalize_concept(x)) == normalize_concept(x)`.
pub fn normalize_concept(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut prev_hyphen = false;

    for ch in raw.trim().chars() {
        let mapped = if ch.is_whitespace() || ch == '_' || ch == '/' {
            '-'
        } else {
            ch
        };
        if mapped == '-' {
            if !prev_hyphen {
                out.push('-');
            }
            prev_hyphen = true;
        } else {
            for lower in mapped.to_lowercase() {
                out.push(lower);
            }
            prev_hyphen = false;
        }
    }

    out.trim_matches('-').to_string()
}

/// Extract the deduplicated, normalized concept set from a document body.
///
/// Returned in ascending byte order so callers get a deterministic set
/// regardless of tag position.
pub fn extract_concepts(body: &str) -> Vec<String> {
    let masked = mask_code_regions(body);
    let mut concepts = BTreeSet::new();

    for raw in scan_tags(&masked) {
        let normalized = normalize_concept(raw);
        if !normalized.is_empty() {
            concepts.insert(normalized);
        }
    }

    concepts.into_iter().collect()
}

/// Count literal tag occurrences in prose that normalize to `concept`.
///
/// Code regions are excluded, matching [`extract_concepts`].
pub fn count_occurrences(body: &str, concept: &str) -> u32 {
    let target = normalize_concept(concept);
    let masked = mask_code_regions(body);

    scan_tags(&masked)
        .filter(|raw| normalize_concept(raw) == target)
        .count() as u32
}

/// Scan for `[[...]]` tags whose inner text contains no brackets.
///
/// A `[[` opener immediately followed by another bracket is retried one byte
/// later, so `[[[alpha]]]` still yields `alpha` rather than corrupting on the
/// outer bracket pair.
fn scan_tags(text: &str) -> impl Iterator<Item = &str> {
    let bytes = text.as_bytes();
    let mut i = 0usize;
    std::iter::from_fn(move || {
        while i + 3 < bytes.len() {
            if bytes[i] != b'[' || bytes[i + 1] != b'[' {
                i += 1;
                continue;
            }
            let start = i + 2;
            let mut j = start;
            let mut ok = false;
            while j < bytes.len() {
                match bytes[j] {
                    b']' => {
                        ok = j > start && j + 1 < bytes.len() && bytes[j + 1] == b']';
                        break;
                    }
                    b'[' => break,
                    _ => j += 1,
                }
            }
            if ok {
                let inner = &text[start..j];
                i = j + 2;
                return Some(inner);
            }
            i += 1;
        }
        None
    })
}

/// Blank out fenced code blocks and inline backtick spans with spaces,
/// preserving byte offsets of the surrounding prose.
fn mask_code_regions(body: &str) -> String {
    let mut out = String::with_capacity(body.len());
    let mut fence: Option<&str> = None;

    for (idx, line) in body.split('\n').enumerate() {
        if idx > 0 {
            out.push('\n');
        }
        let trimmed = line.trim_start();

        match fence {
            Some(marker) => {
                // Inside a fence; a matching closer ends it
                if trimmed.starts_with(marker) {
                    fence = None;
                }
                blank_into(&mut out, line);
            }
            None => {
                if trimmed.starts_with("```") {
                    fence = Some("```");
                    blank_into(&mut out, line);
                } else if trimmed.starts_with("~~~") {
                    fence = Some("~~~");
                    blank_into(&mut out, line);
                } else {
                    mask_inline_code(&mut out, line);
                }
            }
        }
    }

    out
}

/// Blank inline `` `code` `` spans in one prose line.
///
/// A span opens at a backtick run and closes at the next run of the same
/// length; an unmatched opener is left as literal text.
fn mask_inline_code(out: &mut String, line: &str) {
    let chars: Vec<char> = line.chars().collect();
    let mut masked = vec![false; chars.len()];
    let mut i = 0usize;

    while i < chars.len() {
        if chars[i] != '`' {
            i += 1;
            continue;
        }
        let open_len = run_length(&chars, i);
        // Look for a closing run of identical length
        let mut j = i + open_len;
        let mut close = None;
        while j < chars.len() {
            if chars[j] == '`' {
                let len = run_length(&chars, j);
                if len == open_len {
                    close = Some(j + len);
                    break;
                }
                j += len;
            } else {
                j += 1;
            }
        }
        match close {
            Some(end) => {
                for m in masked.iter_mut().take(end).skip(i) {
                    *m = true;
                }
                i = end;
            }
            None => i += open_len,
        }
    }

    for (ch, is_masked) in chars.iter().zip(masked.iter()) {
        out.push(if *is_masked { ' ' } else { *ch });
    }
}

fn run_length(chars: &[char], start: usize) -> usize {
    chars[start..].iter().take_while(|c| **c == '`').count()
}

fn blank_into(out: &mut String, line: &str) {
    for _ in line.chars() {
        out.push(' ');
    }
}
