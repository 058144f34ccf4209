//! Compound Statement Collection
//!
//! Gathers the statements of a multi-line construct (`if..fi`,
//! `for/while/until..done`) from the source lines, counting nested
//! openers so a nested construct's closer is not mistaken for the outer
//! one. Works on top-level `;`-split statements so both the inline
//! one-line form and the multi-line form reduce to the same shape.

use crate::interpreter::errors::InterpreterError;
use crate::interpreter::line_utils::strip_inline_comment;
use crate::parser::quote_info::split_top_level;

/// Statements of one construct, plus whatever trailed the closer on its
/// line, plus the index of the first unconsumed line.
pub struct CollectedConstruct {
    pub statements: Vec<String>,
    pub trailing: Vec<String>,
    pub next_index: usize,
}

/// Collect statements from `lines[start..]` until the `closer` that
/// matches the opener at `lines[start]`. `openers` lists every keyword
/// that pushes one nesting level of this closer (the loop closer `done`
/// is shared by `for`, `while` and `until`).
pub fn collect_construct(
    lines: &[String],
    start: usize,
    openers: &[&str],
    closer: &str,
) -> Result<CollectedConstruct, InterpreterError> {
    let mut statements: Vec<String> = Vec::new();
    let mut depth = 0i32;
    let mut index = start;

    while index < lines.len() {
        let line = strip_inline_comment(&lines[index]);
        let stmts = split_top_level(&line, ';');
        for (si, stmt) in stmts.iter().enumerate() {
            let head = construct_head(stmt);
            if openers.contains(&head) {
                depth += 1;
            } else if head == closer {
                depth -= 1;
            }
            statements.push(stmt.clone());
            if depth == 0 {
                return Ok(CollectedConstruct {
                    statements,
                    trailing: stmts[si + 1..].to_vec(),
                    next_index: index + 1,
                });
            }
        }
        index += 1;
    }

    Err(InterpreterError::Syntax(format!(
        "unexpected end of input looking for `{}'",
        closer
    )))
}

/// First keyword of a statement, looking through `then`/`else`/`do`
/// prefixes so `then if true` still counts the nested `if`.
pub fn construct_head(stmt: &str) -> &str {
    let mut rest = stmt.trim_start();
    loop {
        let word = rest.split_whitespace().next().unwrap_or("");
        match word {
            "then" | "else" | "do" => {
                let after = rest[word.len()..].trim_start();
                if after.is_empty() {
                    return word;
                }
                rest = after;
            }
            _ => return word,
        }
    }
}

/// Strip one leading keyword from a statement, returning the remainder.
pub fn strip_keyword<'a>(stmt: &'a str, keyword: &str) -> Option<&'a str> {
    let trimmed = stmt.trim_start();
    if trimmed == keyword {
        return Some("");
    }
    trimmed
        .strip_prefix(keyword)
        .filter(|rest| rest.starts_with(char::is_whitespace))
        .map(|rest| rest.trim_start())
}

// ============================================================================
// Tests
// ============================================================================
