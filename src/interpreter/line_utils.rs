//! Line Preparation Utilities
//!
//! Shared helpers the driver and validator use on raw source lines:
//! comment stripping, blank/skip detection, and splitting a script into
//! logical lines with quote continuation, backslash continuation, and
//! heredoc bodies preserved verbatim.

use crate::parser::quote_info::{has_unclosed_quote, QuoteScanner};

/// Strip an inline comment, honoring quote state: `#` starts a comment
/// only when unquoted, unescaped, and at the start of the line or after
/// whitespace/operator characters.
pub fn strip_inline_comment(line: &str) -> String {
    let chars: Vec<char> = line.chars().collect();
    let mut scanner = QuoteScanner::new();
    for i in 0..chars.len() {
        if chars[i] == '#' && scanner.state().is_effective() {
            let boundary = i == 0
                || chars[i - 1].is_whitespace()
                || matches!(chars[i - 1], ';' | '&' | '|' | '(');
            if boundary {
                return chars[..i].iter().collect();
            }
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    line.to_string()
}

/// Lines the driver skips outright: blank after comment stripping.
pub fn should_skip_line(line: &str) -> bool {
    strip_inline_comment(line).trim().is_empty()
}

/// First whitespace-delimited word of a trimmed line.
pub fn first_word(line: &str) -> &str {
    line.trim_start().split_whitespace().next().unwrap_or("")
}

/// Split a script into logical lines:
/// - a trailing unescaped backslash joins with the next line,
/// - an unclosed quote keeps the newline and joins,
/// - heredoc bodies pass through verbatim until their delimiter.
pub fn parse_into_lines(script: &str) -> Vec<String> {
    let mut lines: Vec<String> = Vec::new();
    let mut pending = String::new();
    let mut continuing = false;
    let mut heredocs: Vec<(String, bool)> = Vec::new(); // (delimiter, strip_tabs)

    for raw in script.split('\n') {
        if let Some((delim, strip_tabs)) = heredocs.first().cloned() {
            let check = if strip_tabs { raw.trim_start_matches('\t') } else { raw };
            lines.push(raw.to_string());
            if check == delim {
                heredocs.remove(0);
            }
            continue;
        }

        if !pending.is_empty() && !continuing {
            pending.push('\n');
        }
        continuing = false;
        pending.push_str(raw);

        if ends_with_line_continuation(&pending) {
            // Drop the backslash-newline pair entirely.
            pending.pop();
            continuing = true;
            continue;
        }
        if has_unclosed_quote(&pending) {
            continue;
        }

        for spec in scan_heredoc_starts(&pending) {
            heredocs.push(spec);
        }
        lines.push(std::mem::take(&mut pending));
    }
    if !pending.is_empty() {
        lines.push(pending);
    }
    lines
}

/// True when the line ends with an odd run of backslashes outside quotes.
fn ends_with_line_continuation(line: &str) -> bool {
    if has_unclosed_quote(line) {
        return false;
    }
    let trailing = line.chars().rev().take_while(|&c| c == '\\').count();
    trailing % 2 == 1
}

/// Find heredoc operators on a line and return their delimiters.
pub fn scan_heredoc_starts(line: &str) -> Vec<(String, bool)> {
    let chars: Vec<char> = line.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut found = Vec::new();
    let mut i = 0usize;
    while i < chars.len() {
        let effective = scanner.state().is_effective();
        if effective && chars[i] == '<' && chars.get(i + 1) == Some(&'<') && chars.get(i + 2) != Some(&'<') {
            let mut j = i + 2;
            let strip_tabs = chars.get(j) == Some(&'-');
            if strip_tabs {
                j += 1;
            }
            while matches!(chars.get(j), Some(' ') | Some('\t')) {
                j += 1;
            }
            // Delimiter, possibly quoted.
            let quote = match chars.get(j) {
                Some(&q @ ('\'' | '"')) => {
                    j += 1;
                    Some(q)
                }
                _ => None,
            };
            let mut delim = String::new();
            while let Some(&c) = chars.get(j) {
                if let Some(q) = quote {
                    if c == q {
                        j += 1;
                        break;
                    }
                } else if !c.is_alphanumeric() && c != '_' && c != '-' && c != '.' {
                    break;
                }
                delim.push(c);
                j += 1;
            }
            if !delim.is_empty() {
                found.push((delim, strip_tabs));
            }
            // Scanner state is positional; fast-forward through the span.
            for k in i..j.min(chars.len()) {
                scanner.advance(chars[k], chars.get(k + 1).copied());
            }
            i = j;
            continue;
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
        i += 1;
    }
    found
}

/// Whether a heredoc delimiter was quoted on this line, which suppresses
/// expansion of the body.
pub fn heredoc_delimiter_quoted(line: &str) -> bool {
    line.contains("<<'") || line.contains("<<\"") || line.contains("<< '") || line.contains("<< \"")
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_strip_inline_comment() {
        assert_eq!(strip_inline_comment("echo hi # comment"), "echo hi ");
        assert_eq!(strip_inline_comment("echo 'a # b'"), "echo 'a # b'");
        assert_eq!(strip_inline_comment("echo a#b"), "echo a#b");
        assert_eq!(strip_inline_comment("# full line"), "");
        assert_eq!(strip_inline_comment("echo \"x # y\" # real"), "echo \"x # y\" ");
    }

    #[test]
    fn test_should_skip_line() {
        assert!(should_skip_line(""));
        assert!(should_skip_line("   "));
        assert!(should_skip_line("# only a comment"));
        assert!(!should_skip_line("echo hi"));
    }

    #[test]
    fn test_parse_into_lines_simple() {
        let lines = parse_into_lines("a\nb\nc");
        assert_eq!(lines, vec!["a", "b", "c"]);
    }

    #[test]
    fn test_backslash_continuation() {
        let lines = parse_into_lines("echo a \\\nb");
        assert_eq!(lines, vec!["echo a b"]);
        // An escaped backslash does not continue.
        let lines = parse_into_lines("echo a\\\\\nb");
        assert_eq!(lines, vec!["echo a\\\\", "b"]);
    }

    #[test]
    fn test_quote_continuation() {
        let lines = parse_into_lines("echo 'a\nb'\ndone");
        assert_eq!(lines, vec!["echo 'a\nb'", "done"]);
    }

    #[test]
    fn test_heredoc_body_preserved() {
        let script = "cat <<EOF\n  spaced line\n'quote\nEOF\necho after";
        let lines = parse_into_lines(script);
        assert_eq!(
            lines,
            vec!["cat <<EOF", "  spaced line", "'quote", "EOF", "echo after"]
        );
    }

    #[test]
    fn test_heredoc_strip_tabs_delimiter() {
        let script = "cat <<-END\n\tbody\n\tEND";
        let lines = parse_into_lines(script);
        assert_eq!(lines, vec!["cat <<-END", "\tbody", "\tEND"]);
    }

    #[test]
    fn test_scan_heredoc_starts() {
        assert_eq!(scan_heredoc_starts("cat <<EOF"), vec![("EOF".to_string(), false)]);
        assert_eq!(scan_heredoc_starts("cat <<-TAG"), vec![("TAG".to_string(), true)]);
        assert_eq!(scan_heredoc_starts("cat <<'Q'"), vec![("Q".to_string(), false)]);
        assert!(scan_heredoc_starts("echo '<<EOF'").is_empty());
        assert!(scan_heredoc_starts("cat <<< word").is_empty());
    }

    #[test]
    fn test_first_word() {
        assert_eq!(first_word("  if true; then"), "if");
        assert_eq!(first_word(""), "");
    }
}
