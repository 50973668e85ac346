//! Cleanup of raw OCR output.
//!
//! OCR of phone photos and screenshots picks up UI chrome: clock readouts,
//! page numbers, stray digit runs. None of that belongs in a card, and it
//! actively misleads the synthesizer, so we strip it before anything
//! downstream sees the text.

use std::sync::LazyLock;

use regex::Regex;

/// Timestamp-shaped tokens (`10:30`, `10:30:05 PM`, `٣:١٥ م`). These are
/// almost always screenshot chrome, not evidence content.
static TIMESTAMP_RE: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"(?i)\b\d{1,2}:\d{2}(?::\d{2})?\s*(?:[ap]\.?m\.?|ص|م)?")
        .expect("built-in regex should be valid")
});

/// A line that is nothing but digits after trimming.
static DIGITS_ONLY_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"^\d+$").expect("built-in regex should be valid"));

/// Runs of interior spaces and tabs, usually left behind by token removal.
static SPACE_RUN_RE: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"[ \t]{2,}").expect("built-in regex should be valid"));

/// Clean raw OCR text: trim each line, strip timestamp tokens, collapse
/// interior whitespace, and drop lines that are empty or digits-only.
///
/// Idempotent: `clean(clean(x)) == clean(x)`.
pub fn clean(raw: &str) -> String {
    let mut lines = Vec::new();
    for line in raw.lines() {
        // Adjacent timestamp tokens hide each other's word boundary from a
        // single pass, so strip until the line stops changing.
        let mut line = line.to_owned();
        loop {
            let stripped = TIMESTAMP_RE.replace_all(&line, " ");
            if stripped == line {
                break;
            }
            line = stripped.into_owned();
        }
        let line = SPACE_RUN_RE.replace_all(&line, " ");
        let line = line.trim();
        if line.is_empty() || DIGITS_ONLY_RE.is_match(line) {
            continue;
        }
        lines.push(line.to_owned());
    }
    lines.join("\n")
}

/// The first `max_lines` lines of cleaned text, joined into one short
/// sentence fragment and truncated to `max_chars` characters. Used when
/// interpolating OCR text into fallback templates.
pub fn snippet(cleaned: &str, max_lines: usize, max_chars: usize) -> String {
    let joined = cleaned
        .lines()
        .take(max_lines)
        .collect::<Vec<_>>()
        .join("؛ ");
    match joined.char_indices().nth(max_chars) {
        Some((idx, _)) => format!("{}…", &joined[..idx]),
        None => joined,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_whitespace_and_blank_lines() {
        assert_eq!(clean("  ورقة عمل  \n\n\n  القياس  "), "ورقة عمل\nالقياس");
    }

    #[test]
    fn strips_timestamps_and_digit_runs() {
        let raw = "10:30 AM نشاط القراءة\n12345\nالصف الخامس 2:15 م اليوم\n42";
        assert_eq!(clean(raw), "نشاط القراءة\nالصف الخامس اليوم");
    }

    #[test]
    fn keeps_lines_that_merely_contain_digits() {
        assert_eq!(clean("الفصل 5 مجموعة 3"), "الفصل 5 مجموعة 3");
    }

    #[test]
    fn adjacent_timestamps_are_stripped_in_one_call() {
        // The second token starts where the first one ended, so a single
        // regex pass misses it.
        assert_eq!(clean("1:231:23 ملاحظة"), "ملاحظة");
        assert_eq!(clean("1:232:34 نشاط"), "نشاط");
    }

    #[test]
    fn idempotent() {
        let samples = [
            "  10:30 AM  ورقة  عمل \n\n 123 \nالهدف:   القياس\n\n\n\nتم",
            "",
            "plain text\nwith 12:00:01 PM times",
            "1:231:23 ملاحظة",
            "سطر عربي واحد",
        ];
        for raw in samples {
            let once = clean(raw);
            assert_eq!(clean(&once), once, "not idempotent for {raw:?}");
        }
    }

    #[test]
    fn snippet_limits_lines_and_chars() {
        assert_eq!(snippet("a\nb\nc\nd", 3, 100), "a؛ b؛ c");
        let long = "x".repeat(50);
        let cut = snippet(&long, 3, 10);
        assert_eq!(cut, format!("{}…", "x".repeat(10)));
        assert_eq!(snippet("", 3, 10), "");
    }
}
