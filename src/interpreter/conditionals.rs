//! Conditional Evaluation
//!
//! `if/elif/else/fi` in both the multi-line and fully-inline forms. The
//! construct is collected into a statement list, branch conditions run
//! through the condition evaluator (short-circuit `&&`/`||`,
//! parenthesized subconditions, arithmetic conditions), and the first
//! true branch's body executes. A `then`/`elif`/`else` belonging to a
//! nested `if` is ignored for the outer one via depth tracking.

use crate::interpreter::blocks::{collect_construct, construct_head, strip_keyword};
use crate::interpreter::control::Control;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::line_utils::first_word;

/// One `if`/`elif` arm.
#[derive(Debug, Default)]
struct Branch {
    condition: Vec<String>,
    body: Vec<String>,
}

impl Interpreter<'_> {
    /// Execute the `if` construct starting at `lines[*idx]`, advancing
    /// the index past it (and past any trailing statements on the
    /// closing line, which run afterwards).
    pub(crate) fn execute_if(
        &mut self,
        lines: &[String],
        idx: &mut usize,
    ) -> Result<Control, InterpreterError> {
        let collected = collect_construct(lines, *idx, &["if"], "fi")?;
        *idx = collected.next_index;

        let (branches, else_body) = parse_if_statements(&collected.statements)?;

        let mut outcome = Control::Code(0);
        let mut ran_branch = false;
        for branch in &branches {
            let condition = branch.condition.join("; ");
            match self.evaluate_condition(&condition)? {
                Control::Code(0) => {
                    outcome = self.run_statements(&branch.body)?;
                    ran_branch = true;
                    break;
                }
                Control::Code(_) => continue,
                flow => return Ok(flow),
            }
        }
        if !ran_branch && !else_body.is_empty() {
            outcome = self.run_statements(&else_body)?;
        }

        if let Control::Code(code) = outcome {
            self.state.last_exit_code = code;
            if !collected.trailing.is_empty() {
                return self.run_statements(&collected.trailing);
            }
        }
        Ok(outcome)
    }
}

/// Carve the collected statements into branches. `statements[0]` is the
/// `if` opener, the last statement is the matching `fi`.
fn parse_if_statements(statements: &[String]) -> Result<(Vec<Branch>, Vec<String>), InterpreterError> {
    let opener = strip_keyword(&statements[0], "if")
        .ok_or_else(|| InterpreterError::Syntax("malformed if statement".into()))?;
    if opener.is_empty() && statements.len() <= 2 {
        return Err(InterpreterError::Syntax("if: missing condition".into()));
    }

    let mut branches: Vec<Branch> = Vec::new();
    let mut current = Branch { condition: push_nonempty(opener), body: Vec::new() };
    let mut else_body: Vec<String> = Vec::new();
    let mut in_body = false;
    let mut in_else = false;
    let mut depth = 0i32;

    let inner = &statements[1..statements.len().saturating_sub(1)];
    for stmt in inner {
        if depth > 0 {
            // Inside a nested if: its keywords are not ours.
            push_target(&mut current, &mut else_body, in_body, in_else, stmt);
            match first_word(stmt) {
                "fi" => depth -= 1,
                _ if construct_head(stmt) == "if" => depth += 1,
                _ => {}
            }
            continue;
        }

        match first_word(stmt) {
            "then" if !in_else => {
                in_body = true;
                let rest = strip_keyword(stmt, "then").unwrap_or("");
                if !rest.is_empty() {
                    current.body.push(rest.to_string());
                    if construct_head(rest) == "if" {
                        depth += 1;
                    }
                }
            }
            "elif" if !in_else => {
                if !in_body {
                    return Err(InterpreterError::Syntax("elif without preceding then".into()));
                }
                branches.push(std::mem::take(&mut current));
                let rest = strip_keyword(stmt, "elif").unwrap_or("");
                current.condition = push_nonempty(rest);
                in_body = false;
            }
            "else" if !in_else => {
                if !in_body {
                    return Err(InterpreterError::Syntax("else without preceding then".into()));
                }
                branches.push(std::mem::take(&mut current));
                in_else = true;
                let rest = strip_keyword(stmt, "else").unwrap_or("");
                if !rest.is_empty() {
                    else_body.push(rest.to_string());
                    if construct_head(rest) == "if" {
                        depth += 1;
                    }
                }
            }
            _ => {
                push_target(&mut current, &mut else_body, in_body, in_else, stmt);
                if construct_head(stmt) == "if" {
                    depth += 1;
                }
            }
        }
    }

    if !in_else {
        if !in_body {
            return Err(InterpreterError::Syntax("if: missing `then'".into()));
        }
        branches.push(current);
    }
    Ok((branches, else_body))
}

fn push_target(
    current: &mut Branch,
    else_body: &mut Vec<String>,
    in_body: bool,
    in_else: bool,
    stmt: &str,
) {
    if in_else {
        else_body.push(stmt.to_string());
    } else if in_body {
        current.body.push(stmt.to_string());
    } else {
        current.condition.push(stmt.to_string());
    }
}

fn push_nonempty(text: &str) -> Vec<String> {
    if text.trim().is_empty() {
        Vec::new()
    } else {
        vec![text.to_string()]
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn stmts(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_parse_simple_if() {
        let statements = stmts(&["if true", "then echo a", "fi"]);
        let (branches, else_body) = parse_if_statements(&statements).unwrap();
        assert_eq!(branches.len(), 1);
        assert_eq!(branches[0].condition, vec!["true"]);
        assert_eq!(branches[0].body, vec!["echo a"]);
        assert!(else_body.is_empty());
    }

    #[test]
    fn test_parse_multiline_then() {
        let statements = stmts(&["if test -f x", "then", "echo a", "echo b", "fi"]);
        let (branches, _) = parse_if_statements(&statements).unwrap();
        assert_eq!(branches[0].body, vec!["echo a", "echo b"]);
    }

    #[test]
    fn test_parse_elif_chain() {
        let statements = stmts(&[
            "if a", "then echo 1", "elif b", "then echo 2", "elif c", "then echo 3",
            "else echo 4", "fi",
        ]);
        let (branches, else_body) = parse_if_statements(&statements).unwrap();
        assert_eq!(branches.len(), 3);
        assert_eq!(branches[1].condition, vec!["b"]);
        assert_eq!(branches[2].body, vec!["echo 3"]);
        assert_eq!(else_body, vec!["echo 4"]);
    }

    #[test]
    fn test_parse_nested_if_keywords_ignored() {
        let statements = stmts(&[
            "if outer",
            "then",
            "if inner",
            "then echo deep",
            "else echo deep-else",
            "fi",
            "fi",
        ]);
        let (branches, else_body) = parse_if_statements(&statements).unwrap();
        // The nested else belongs to the inner if.
        assert!(else_body.is_empty());
        assert_eq!(branches.len(), 1);
        assert_eq!(
            branches[0].body,
            vec!["if inner", "then echo deep", "else echo deep-else", "fi"]
        );
    }

    #[test]
    fn test_parse_multi_command_condition() {
        let statements = stmts(&["if a", "b", "then echo x", "fi"]);
        let (branches, _) = parse_if_statements(&statements).unwrap();
        assert_eq!(branches[0].condition, vec!["a", "b"]);
    }

    #[test]
    fn test_missing_then_is_error() {
        let statements = stmts(&["if true", "echo a", "fi"]);
        assert!(parse_if_statements(&statements).is_err());
    }

    #[test]
    fn test_else_without_then_is_error() {
        let statements = stmts(&["if true", "else echo a", "fi"]);
        assert!(parse_if_statements(&statements).is_err());
    }
}
