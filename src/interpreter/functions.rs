//! Function Definitions
//!
//! Recognizes `name() { ... }` and `function name { ... }` definitions,
//! collects their bodies, and registers them in the interpreter's
//! function table. Invocation (scope push, positional frame, return
//! translation) lives with the driver, which owns the recursion.

use regex_lite::Regex;

use crate::interpreter::errors::InterpreterError;
use crate::interpreter::types::FunctionDef;
use crate::parser::quote_info::{split_top_level, QuoteScanner};

lazy_static::lazy_static! {
    static ref IDENTIFIER_RE: Regex = Regex::new(r"^[a-zA-Z_][a-zA-Z0-9_]*$").unwrap();
    /// `name() ...`
    static ref PAREN_DEF_RE: Regex =
        Regex::new(r"^([a-zA-Z_][a-zA-Z0-9_]*)\s*\(\s*\)\s*(.*)$").unwrap();
    /// `function name ...` or `function name() ...`
    static ref KEYWORD_DEF_RE: Regex =
        Regex::new(r"^function\s+([a-zA-Z_][a-zA-Z0-9_]*)\s*(?:\(\s*\))?\s*(.*)$").unwrap();
}

/// Validate a function or variable name.
pub fn is_valid_identifier(name: &str) -> bool {
    IDENTIFIER_RE.is_match(name)
}

/// Does this line open a function definition?
pub fn looks_like_function_def(line: &str) -> bool {
    let trimmed = line.trim_start();
    if trimmed.starts_with("function ") {
        return KEYWORD_DEF_RE.is_match(trimmed);
    }
    // Avoid treating `name(...)` subshell-ish text as a definition: only
    // an empty pair of parens introduces one.
    PAREN_DEF_RE.is_match(trimmed)
}

/// Parse a function definition starting at `lines[start]`.
///
/// Returns the definition, the index of the first line after it, and any
/// text trailing the closing brace on its line (`f(){ ...; }; f` keeps
/// `f` for the caller to run). The body is stored as statement lines; an
/// inline body is split on top-level semicolons.
pub fn parse_function_def(
    lines: &[String],
    start: usize,
) -> Result<(FunctionDef, usize, Option<String>), InterpreterError> {
    let header = lines[start].trim();
    let (name, after_header) = split_def_header(header)
        .ok_or_else(|| InterpreterError::Syntax(format!("invalid function definition: {}", header)))?;

    let mut idx = start;
    let mut remainder = after_header;

    // The opening brace may sit on the following line.
    if remainder.is_empty() {
        idx += 1;
        loop {
            match lines.get(idx) {
                Some(line) if line.trim().is_empty() => idx += 1,
                Some(line) => {
                    remainder = line.trim().to_string();
                    break;
                }
                None => {
                    return Err(InterpreterError::Syntax(format!(
                        "function {}: missing body",
                        name
                    )))
                }
            }
        }
    }

    let stripped = remainder
        .strip_prefix('{')
        .ok_or_else(|| InterpreterError::Syntax(format!("function {}: expected `{{'", name)))?
        .trim_start()
        .to_string();

    // Body closed on the header line: split body from what trails the
    // closing brace.
    if let Some((inner, trailing)) = split_at_closing_brace(&stripped, 1) {
        let body = split_top_level(&inner, ';');
        return Ok((FunctionDef { name, body }, idx + 1, trailing));
    }

    let mut depth = 1i32 + brace_delta(&stripped);
    let mut body: Vec<String> = Vec::new();
    if !stripped.is_empty() {
        body.push(stripped);
    }
    idx += 1;
    while idx < lines.len() {
        let line = &lines[idx];
        let delta = brace_delta(line);
        if depth + delta <= 0 {
            // This line closes the function: split around the brace that
            // brings the entry depth to zero.
            let (before, trailing) = split_at_closing_brace(line.trim(), depth)
                .unwrap_or((line.trim().to_string(), None));
            if !before.is_empty() {
                body.push(before);
            }
            return Ok((FunctionDef { name, body }, idx + 1, trailing));
        }
        depth += delta;
        body.push(line.clone());
        idx += 1;
    }
    Err(InterpreterError::Syntax(format!(
        "function {}: missing closing `}}'",
        name
    )))
}

/// Given text entered at brace depth `start_depth`, find the unquoted
/// `}` that brings the depth to zero. Returns the text before it and any
/// non-empty trailing text after it.
fn split_at_closing_brace(text: &str, start_depth: i32) -> Option<(String, Option<String>)> {
    let chars: Vec<char> = text.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut depth = start_depth;
    for i in 0..chars.len() {
        if scanner.state().is_effective() {
            match chars[i] {
                '{' => depth += 1,
                '}' => {
                    depth -= 1;
                    if depth == 0 {
                        let body: String = chars[..i].iter().collect::<String>().trim().to_string();
                        let rest: String = chars[i + 1..]
                            .iter()
                            .collect::<String>()
                            .trim_start_matches([';', ' ', '\t'])
                            .to_string();
                        let trailing = if rest.is_empty() { None } else { Some(rest) };
                        return Some((body, trailing));
                    }
                }
                _ => {}
            }
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    None
}

/// Extract `(name, text after the signature)` from a definition header.
fn split_def_header(header: &str) -> Option<(String, String)> {
    if header.starts_with("function ") {
        let caps = KEYWORD_DEF_RE.captures(header)?;
        return Some((caps[1].to_string(), caps[2].trim().to_string()));
    }
    let caps = PAREN_DEF_RE.captures(header)?;
    Some((caps[1].to_string(), caps[2].trim().to_string()))
}

/// Net `{`/`}` depth change across a line, ignoring quoted braces.
pub(crate) fn brace_delta(line: &str) -> i32 {
    let chars: Vec<char> = line.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut delta = 0i32;
    for i in 0..chars.len() {
        if scanner.state().is_effective() {
            match chars[i] {
                '{' => delta += 1,
                '}' => delta -= 1,
                _ => {}
            }
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    delta
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_is_valid_identifier() {
        assert!(is_valid_identifier("foo"));
        assert!(is_valid_identifier("_bar"));
        assert!(is_valid_identifier("f123"));
        assert!(!is_valid_identifier("123f"));
        assert!(!is_valid_identifier("a-b"));
        assert!(!is_valid_identifier(""));
    }

    #[test]
    fn test_looks_like_function_def() {
        assert!(looks_like_function_def("greet() {"));
        assert!(looks_like_function_def("greet(){ echo hi; }"));
        assert!(looks_like_function_def("function greet {"));
        assert!(looks_like_function_def("function greet() {"));
        assert!(!looks_like_function_def("echo hi"));
        assert!(!looks_like_function_def("x=1"));
        assert!(!looks_like_function_def("(subshell)"));
    }

    #[test]
    fn test_inline_definition() {
        let src = lines(&["f(){ echo a; echo b; }"]);
        let (def, next, trailing) = parse_function_def(&src, 0).unwrap();
        assert!(trailing.is_none());
        assert_eq!(def.name, "f");
        assert_eq!(def.body, vec!["echo a", "echo b"]);
        assert_eq!(next, 1);
    }

    #[test]
    fn test_multiline_definition() {
        let src = lines(&["f() {", "  echo a", "  echo b", "}"]);
        let (def, next, trailing) = parse_function_def(&src, 0).unwrap();
        assert!(trailing.is_none());
        assert_eq!(def.name, "f");
        assert_eq!(def.body, vec!["  echo a", "  echo b"]);
        assert_eq!(next, 4);
    }

    #[test]
    fn test_function_keyword_form() {
        let src = lines(&["function greet {", "  echo hello", "}"]);
        let (def, next, trailing) = parse_function_def(&src, 0).unwrap();
        assert!(trailing.is_none());
        assert_eq!(def.name, "greet");
        assert_eq!(def.body, vec!["  echo hello"]);
        assert_eq!(next, 3);
    }

    #[test]
    fn test_brace_on_next_line() {
        let src = lines(&["f()", "{", "  echo x", "}"]);
        let (def, next, trailing) = parse_function_def(&src, 0).unwrap();
        assert!(trailing.is_none());
        assert_eq!(def.name, "f");
        assert_eq!(def.body, vec!["  echo x"]);
        assert_eq!(next, 4);
    }

    #[test]
    fn test_nested_braces_in_body() {
        let src = lines(&["f() {", "  if true; then { echo a; }; fi", "}"]);
        let (def, next, _trailing) = parse_function_def(&src, 0).unwrap();
        assert_eq!(def.body.len(), 1);
        assert_eq!(next, 3);
    }

    #[test]
    fn test_trailing_after_inline_body() {
        let src = lines(&["f(){ echo a; }; a=2; f"]);
        let (def, next, trailing) = parse_function_def(&src, 0).unwrap();
        assert_eq!(def.body, vec!["echo a"]);
        assert_eq!(next, 1);
        assert_eq!(trailing.as_deref(), Some("a=2; f"));
    }

    #[test]
    fn test_missing_close_errors() {
        let src = lines(&["f() {", "  echo a"]);
        assert!(parse_function_def(&src, 0).is_err());
    }

    #[test]
    fn test_quoted_braces_ignored() {
        let src = lines(&["f() {", "  echo '}'", "}"]);
        let (def, _, _) = parse_function_def(&src, 0).unwrap();
        assert_eq!(def.body, vec!["  echo '}'"]);
    }
}
