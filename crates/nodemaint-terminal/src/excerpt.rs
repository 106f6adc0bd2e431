//! Bounded excerpts of captured output, for log lines.
//!
//! Full output always lands in the request's capture files; logs only get the
//! tail, which is where a failing script usually explains itself.

/// Default number of trailing lines kept in an excerpt.
pub const DEFAULT_TAIL_LINES: usize = 10;

/// Hard cap on the excerpt length in characters, applied after line selection.
pub const MAX_EXCERPT_CHARS: usize = 2_000;

/// Return the last `max_lines` non-empty lines of `raw`, lossily decoded.
///
/// If the selected lines exceed [`MAX_EXCERPT_CHARS`], the front is cut on a
/// char boundary and replaced by `…`.
pub fn tail(raw: &[u8], max_lines: usize) -> String {
    let text = String::from_utf8_lossy(raw);
    let lines: Vec<&str> = text.lines().filter(|l| !l.trim().is_empty()).collect();
    let start = lines.len().saturating_sub(max_lines);
    let joined = lines[start..].join("\n");

    let count = joined.chars().count();
    if count <= MAX_EXCERPT_CHARS {
        return joined;
    }
    let kept: String = joined.chars().skip(count - MAX_EXCERPT_CHARS).collect();
    format!("…{kept}")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn short_output_kept_whole() {
        assert_eq!(tail(b"one\ntwo\n", DEFAULT_TAIL_LINES), "one\ntwo");
    }

    #[test]
    fn keeps_only_trailing_lines() {
        let raw: String = (1..=20).map(|i| format!("line {i}\n")).collect();
        let out = tail(raw.as_bytes(), 3);
        assert_eq!(out, "line 18\nline 19\nline 20");
    }

    #[test]
    fn blank_lines_do_not_count() {
        assert_eq!(tail(b"a\n\n\nb\n\n", 2), "a\nb");
    }

    #[test]
    fn overlong_line_is_cut_from_the_front() {
        let raw = "x".repeat(MAX_EXCERPT_CHARS + 50) + "END";
        let out = tail(raw.as_bytes(), 1);
        assert!(out.starts_with('…'));
        assert!(out.ends_with("END"));
        assert_eq!(out.chars().count(), MAX_EXCERPT_CHARS + 1);
    }

    #[test]
    fn invalid_utf8_does_not_panic() {
        let out = tail(&[0xff, 0xfe, b'\n', b'o', b'k'], 5);
        assert!(out.ends_with("ok"));
    }

    #[test]
    fn empty_input_is_empty() {
        assert_eq!(tail(b"", DEFAULT_TAIL_LINES), "");
    }
}
