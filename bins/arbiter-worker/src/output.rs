/// Output Normaliser / Comparator
///
/// Canonicalises program output so that cosmetic whitespace differences
/// never decide a verdict, then compares byte-exact. Applied identically to
/// actual and expected output.
/// Normalisation: CRLF to LF, right-trim every line, drop trailing blank
/// lines. Internal whitespace and case are preserved.
pub fn normalise(text: &str) -> String {
    let unified = text.replace("\r\n", "\n");
    let trimmed: Vec<&str> = unified.split('\n').map(|line| line.trim_end()).collect();
    let joined = trimmed.join("\n");
    joined.trim_end_matches('\n').to_string()
}

/// Ordinal equality on the normalised forms.
pub fn outputs_match(actual: &str, expected: &str) -> bool {
    normalise(actual) == normalise(expected)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn idempotent() {
        let samples = ["", "a\r\nb  \n\n", "  x", "line\n", "a\n\n\nb\n  \n"];
        for s in samples {
            assert_eq!(normalise(&normalise(s)), normalise(s), "sample {s:?}");
        }
    }

    #[test]
    fn reflexive() {
        for s in ["", "42\n", "a b c", "x\r\ny"] {
            assert!(outputs_match(s, s));
        }
    }

    #[test]
    fn crlf_equals_lf() {
        assert!(outputs_match("1\r\n2\r\n", "1\n2\n"));
        assert!(outputs_match("1\n2", "1\r\n2\r\n"));
    }

    #[test]
    fn trailing_whitespace_per_line_ignored() {
        assert!(outputs_match("42   \nok\t\n", "42\nok\n"));
    }

    #[test]
    fn leading_whitespace_is_significant() {
        assert!(!outputs_match("  42", "42"));
    }

    #[test]
    fn internal_blank_lines_are_significant() {
        assert!(!outputs_match("a\n\nb", "a\nb"));
    }

    #[test]
    fn final_newline_optional() {
        assert!(outputs_match("42\n", "42"));
        assert!(outputs_match("a\nb", "a\nb\n"));
    }

    #[test]
    fn empty_equals_whitespace_only() {
        assert!(outputs_match("", "   \n\t\n"));
        assert!(outputs_match("\n\n", ""));
    }

    #[test]
    fn case_is_significant() {
        assert!(!outputs_match("Hello", "hello"));
    }
}
