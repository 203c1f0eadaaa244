use std::path::Path;

const SNIPPET_BYTES: usize = 160;

pub fn display_path(path: &Path, base: Option<&Path>) -> String {
    if let Some(base) = base {
        if let Ok(relative) = path.strip_prefix(base) {
            return relative.display().to_string();
        }
    }
    path.display().to_string()
}

pub fn truncate_string(text: &str, max_bytes: usize) -> String {
    if text.len() <= max_bytes {
        return text.to_string();
    }
    let mut truncated = String::new();
    for ch in text.chars() {
        if truncated.len() + ch.len_utf8() > max_bytes {
            break;
        }
        truncated.push(ch);
    }
    truncated
}

/// Short single-line excerpt of a response body for failure messages.
pub fn snippet(text: &str) -> String {
    let flat = text.split_whitespace().collect::<Vec<_>>().join(" ");
    if flat.len() <= SNIPPET_BYTES {
        return flat;
    }
    format!("{}...", truncate_string(&flat, SNIPPET_BYTES))
}

/// Deterministic filler text of exactly `len` characters.
pub fn filler(len: usize) -> String {
    const WORDS: &str = "file paperwork for the quarterly review ";
    WORDS.chars().cycle().take(len).collect()
}
