//! Multi-line string literal normalization.
//!
//! Multi-line strings have their common leading whitespace stripped: the
//! minimum indent across non-empty lines is removed from every line. The
//! operation is idempotent.

/// Minimum indent (in chars) over the non-empty lines of `s`.
pub fn common_indent(s: &str) -> usize {
    s.lines()
        .filter(|line| !line.trim().is_empty())
        .map(|line| line.chars().take_while(|c| *c == ' ' || *c == '\t').count())
        .min()
        .unwrap_or(0)
}

/// Strip the common leading whitespace from every line of a multi-line
/// string. Whitespace-only lines collapse to empty lines.
pub fn normalize_multiline(s: &str) -> String {
    let indent = common_indent(s);
    if indent == 0 {
        return s.to_string();
    }

    let mut out = String::with_capacity(s.len());
    let mut first = true;
    for line in s.split('\n') {
        if !first {
            out.push('\n');
        }
        first = false;

        if line.trim().is_empty() {
            continue;
        }
        let stripped: String = line.chars().skip(indent).collect();
        out.push_str(&stripped);
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn strips_common_indent() {
        // "\n    hello\n    world\n  " -> "\nhello\nworld\n"
        let raw = "\n    hello\n    world\n  ";
        assert_eq!(normalize_multiline(raw), "\nhello\nworld\n");
    }

    #[test]
    fn normalization_is_idempotent() {
        let raw = "\n    hello\n      world\n";
        let once = normalize_multiline(raw);
        let twice = normalize_multiline(&once);
        assert_eq!(once, twice);
    }

    #[test]
    fn normalized_string_has_zero_min_indent() {
        let raw = "  alpha\n    beta\n  gamma";
        let normalized = normalize_multiline(raw);
        assert_eq!(common_indent(&normalized), 0);
    }

    #[test]
    fn empty_and_single_line_are_untouched() {
        assert_eq!(normalize_multiline(""), "");
        assert_eq!(normalize_multiline("plain"), "plain");
    }

    #[test]
    fn whitespace_only_lines_do_not_count_toward_indent() {
        let raw = "    a\n  \n    b";
        assert_eq!(normalize_multiline(raw), "a\n\nb");
    }
}
