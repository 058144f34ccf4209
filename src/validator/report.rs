//! Diagnostic Rendering
//!
//! Renders validator diagnostics and runtime errors to stderr: the
//! offending line with an underline marker, the code and severity tag,
//! and an optional suggestion. Also supplies the edit-distance command
//! suggestions used for command-not-found reports.

use std::sync::atomic::{AtomicUsize, Ordering};

use crate::validator::types::{Severity, SyntaxError};

static REPORTED_ERRORS: AtomicUsize = AtomicUsize::new(0);

lazy_static::lazy_static! {
    /// Names always worth suggesting against, beyond the function table.
    static ref COMMON_COMMANDS: Vec<&'static str> = vec![
        "echo", "cd", "ls", "pwd", "cat", "grep", "sed", "awk", "test",
        "true", "false", "read", "printf", "export", "unset", "local",
        "return", "break", "continue", "shift", "set", "exit", "source",
    ];
}

/// Print a full diagnostic report.
pub fn print_error_report(errors: &[SyntaxError], show_suggestions: bool, show_context: bool) {
    for error in errors {
        REPORTED_ERRORS.fetch_add(1, Ordering::Relaxed);
        eprintln!(
            "cjsh: line {}: [{}] {}: {}",
            error.line, error.code, error.severity, error.message
        );
        if show_context && !error.line_content.is_empty() {
            eprintln!("    {}", error.line_content);
            if error.column_end > error.column_start || error.column_start > 0 {
                let mut marker = String::new();
                for _ in 0..error.column_start {
                    marker.push(' ');
                }
                marker.push('^');
                for _ in error.column_start + 1..error.column_end {
                    marker.push('~');
                }
                eprintln!("    {}", marker);
            }
        }
        if show_suggestions {
            if let Some(suggestion) = &error.suggestion {
                eprintln!("    suggestion: {}", suggestion);
            }
        }
        if let Some(related) = &error.related_info {
            eprintln!("    note: {}", related);
        }
    }
}

/// Print a runtime error with optional context text and line number.
pub fn print_runtime_error(message: &str, context: &str, line_number: usize) {
    REPORTED_ERRORS.fetch_add(1, Ordering::Relaxed);
    if line_number > 0 {
        eprintln!("cjsh: line {}: {}", line_number, message);
    } else {
        eprintln!("cjsh: {}", message);
    }
    if !context.is_empty() {
        eprintln!("    {}", context);
    }
}

/// Number of errors reported since the last reset.
pub fn reported_error_count() -> usize {
    REPORTED_ERRORS.load(Ordering::Relaxed)
}

pub fn reset_error_count() {
    REPORTED_ERRORS.store(0, Ordering::Relaxed);
}

/// Up to three near-miss candidates for an unknown command name, as a
/// ready-to-print context string. Empty when nothing is close.
pub fn command_suggestions(name: &str, extra_candidates: &[String]) -> String {
    let mut scored: Vec<(usize, &str)> = Vec::new();
    for candidate in COMMON_COMMANDS.iter().copied() {
        scored.push((edit_distance(name, candidate), candidate));
    }
    for candidate in extra_candidates {
        scored.push((edit_distance(name, candidate), candidate.as_str()));
    }
    scored.sort_by_key(|(d, _)| *d);

    let close: Vec<&str> = scored
        .iter()
        .filter(|(d, c)| *d <= suggestion_threshold(name) && *c != name)
        .map(|(_, c)| *c)
        .take(3)
        .collect();
    if close.is_empty() {
        String::new()
    } else {
        format!("did you mean: {}?", close.join(", "))
    }
}

fn suggestion_threshold(name: &str) -> usize {
    match name.chars().count() {
        0..=3 => 1,
        4..=6 => 2,
        _ => 3,
    }
}

/// Classic Levenshtein distance, O(n*m) with a rolling row.
pub fn edit_distance(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }
    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut current = vec![0usize; b.len() + 1];
    for (i, &ca) in a.iter().enumerate() {
        current[0] = i + 1;
        for (j, &cb) in b.iter().enumerate() {
            let cost = if ca == cb { 0 } else { 1 };
            current[j + 1] = (prev[j + 1] + 1).min(current[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut current);
    }
    prev[b.len()]
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_edit_distance() {
        assert_eq!(edit_distance("", ""), 0);
        assert_eq!(edit_distance("abc", "abc"), 0);
        assert_eq!(edit_distance("abc", "abd"), 1);
        assert_eq!(edit_distance("kitten", "sitting"), 3);
        assert_eq!(edit_distance("echo", ""), 4);
    }

    #[test]
    fn test_command_suggestions_close_match() {
        let text = command_suggestions("ehco", &[]);
        assert!(text.contains("echo"), "got: {text}");
    }

    #[test]
    fn test_command_suggestions_includes_functions() {
        let funcs = vec!["deploy".to_string()];
        let text = command_suggestions("depoy", &funcs);
        assert!(text.contains("deploy"), "got: {text}");
    }

    #[test]
    fn test_command_suggestions_limit() {
        let text = command_suggestions("zzzzzzzz", &[]);
        assert!(text.is_empty());
    }

    #[test]
    fn test_error_counter_advances() {
        // Other tests print concurrently, so only check monotonicity.
        let before = reported_error_count();
        print_runtime_error("boom", "", 0);
        assert!(reported_error_count() > before);
    }
}
