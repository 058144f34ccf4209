//! Loop Evaluation
//!
//! `for name in words`, C-style `for ((init; cond; post))`, `while`, and
//! `until`, in both multi-line and inline forms. Each iteration polls
//! pending signals, honors `break N` / `continue N`, propagates
//! `return`, and counts against the runaway-iteration guard.

use crate::expansion::arithmetic::ArithmeticEvaluator;
use crate::interpreter::blocks::{collect_construct, construct_head, strip_keyword};
use crate::interpreter::control::Control;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::functions::is_valid_identifier;
use crate::interpreter::interpreter::{Interpreter, StateArith};
use crate::interpreter::line_utils::first_word;
use crate::parser::tokenizer::tokenize;

/// The three loop shapes after header parsing.
#[derive(Debug)]
enum LoopKind {
    /// `for name in words`; None words iterates the positionals.
    ForIn { name: String, words: Option<String> },
    /// `for ((init; cond; post))`
    CStyle { init: String, cond: String, post: String },
    /// `while` / `until`, with the condition statements.
    Condition { until: bool, condition: Vec<String> },
}

impl Interpreter<'_> {
    /// Execute the loop construct starting at `lines[*idx]`.
    pub(crate) fn execute_loop(
        &mut self,
        lines: &[String],
        idx: &mut usize,
    ) -> Result<Control, InterpreterError> {
        let collected = collect_construct(lines, *idx, &["for", "while", "until"], "done")?;
        *idx = collected.next_index;

        let (kind, body) = parse_loop_statements(&collected.statements)?;
        let outcome = self.run_loop(kind, &body)?;

        if let Control::Code(code) = outcome {
            self.state.last_exit_code = code;
            if !collected.trailing.is_empty() {
                return self.run_statements(&collected.trailing);
            }
        }
        Ok(outcome)
    }

    fn run_loop(&mut self, kind: LoopKind, body: &[String]) -> Result<Control, InterpreterError> {
        self.state.loop_depth += 1;
        let result = match kind {
            LoopKind::ForIn { name, words } => self.run_for_in(&name, words.as_deref(), body),
            LoopKind::CStyle { init, cond, post } => self.run_c_style(&init, &cond, &post, body),
            LoopKind::Condition { until, condition } => self.run_while(until, &condition, body),
        };
        self.state.loop_depth -= 1;
        result
    }

    fn run_for_in(
        &mut self,
        name: &str,
        words: Option<&str>,
        body: &[String],
    ) -> Result<Control, InterpreterError> {
        if !is_valid_identifier(name) {
            return Err(InterpreterError::Syntax(format!(
                "for: `{}': not a valid identifier",
                name
            )));
        }

        // The word list runs through the full expansion pipeline, then
        // field splitting.
        let items: Vec<String> = match words {
            Some(text) => {
                let mut fields = Vec::new();
                for token in tokenize(text)? {
                    if !token.is_operator {
                        fields.extend(self.expand_word_to_fields(&token)?);
                    }
                }
                fields
            }
            None => self.state.positional.clone(),
        };

        let mut last = Control::Code(0);
        for (iteration, item) in items.iter().enumerate() {
            if let Some(code) = self.check_loop_guards(iteration as u64)? {
                return Ok(code);
            }
            if let Err(err) = self.state.variables.set(name, item.clone()) {
                return Err(InterpreterError::ReadonlyVariable(err.0));
            }
            match self.run_statements(body)? {
                Control::Break(n) => return Ok(unwind_break(n)),
                Control::Continue(n) if n > 1 => return Ok(Control::Continue(n - 1)),
                Control::Continue(_) => continue,
                Control::Return(code) => return Ok(Control::Return(code)),
                Control::Code(code) => {
                    last = Control::Code(code);
                    if self.state.options.errexit && code != 0 && !self.state.in_condition {
                        return Ok(Control::Code(code));
                    }
                }
            }
        }
        Ok(last)
    }

    fn run_while(
        &mut self,
        until: bool,
        condition: &[String],
        body: &[String],
    ) -> Result<Control, InterpreterError> {
        let condition_text = condition.join("; ");
        let mut last = Control::Code(0);
        let mut iteration: u64 = 0;
        loop {
            if let Some(code) = self.check_loop_guards(iteration)? {
                return Ok(code);
            }
            iteration += 1;

            let cond_code = match self.evaluate_condition(&condition_text)? {
                Control::Code(code) => code,
                flow => return Ok(flow),
            };
            let truthy = if until { cond_code != 0 } else { cond_code == 0 };
            if !truthy {
                break;
            }

            match self.run_statements(body)? {
                Control::Break(n) => return Ok(unwind_break(n)),
                Control::Continue(n) if n > 1 => return Ok(Control::Continue(n - 1)),
                Control::Continue(_) => continue,
                Control::Return(code) => return Ok(Control::Return(code)),
                Control::Code(code) => {
                    last = Control::Code(code);
                    if self.state.options.errexit && code != 0 && !self.state.in_condition {
                        return Ok(Control::Code(code));
                    }
                }
            }
        }
        Ok(last)
    }

    fn run_c_style(
        &mut self,
        init: &str,
        cond: &str,
        post: &str,
        body: &[String],
    ) -> Result<Control, InterpreterError> {
        self.eval_loop_arith(init)?;
        let mut last = Control::Code(0);
        let mut iteration: u64 = 0;
        loop {
            if let Some(code) = self.check_loop_guards(iteration)? {
                return Ok(code);
            }
            iteration += 1;

            if !cond.trim().is_empty() && self.eval_loop_arith(cond)? == 0 {
                break;
            }

            match self.run_statements(body)? {
                Control::Break(n) => return Ok(unwind_break(n)),
                Control::Continue(n) if n > 1 => return Ok(Control::Continue(n - 1)),
                Control::Continue(_) => {
                    self.eval_loop_arith(post)?;
                    continue;
                }
                Control::Return(code) => return Ok(Control::Return(code)),
                Control::Code(code) => {
                    last = Control::Code(code);
                    if self.state.options.errexit && code != 0 && !self.state.in_condition {
                        return Ok(Control::Code(code));
                    }
                }
            }
            self.eval_loop_arith(post)?;
        }
        Ok(last)
    }

    fn eval_loop_arith(&mut self, expr: &str) -> Result<i64, InterpreterError> {
        if expr.trim().is_empty() {
            return Ok(1);
        }
        let mut ctx = StateArith { state: &mut self.state };
        Ok(ArithmeticEvaluator::new(&mut ctx).evaluate(expr)?)
    }

    /// Signal poll plus the iteration ceiling. Returns the control code
    /// to surface when the loop must stop.
    fn check_loop_guards(&mut self, iteration: u64) -> Result<Option<Control>, InterpreterError> {
        if self.host.signals.has_pending() {
            let pending = self.host.signals.drain();
            if let Some(code) = pending.exit_code() {
                return Ok(Some(Control::Code(code)));
            }
        }
        if iteration >= self.state.limits.max_loop_iterations {
            return Err(InterpreterError::Internal(format!(
                "maximum loop iterations ({}) exceeded",
                self.state.limits.max_loop_iterations
            )));
        }
        Ok(None)
    }
}

fn unwind_break(levels: u32) -> Control {
    if levels > 1 {
        Control::Break(levels - 1)
    } else {
        Control::Code(0)
    }
}

/// Parse the collected loop statements into a loop kind and its body.
fn parse_loop_statements(statements: &[String]) -> Result<(LoopKind, Vec<String>), InterpreterError> {
    let header = statements[0].trim();
    let mut pre_do: Vec<String> = Vec::new();
    let mut body: Vec<String> = Vec::new();
    let mut in_body = false;
    let mut depth = 0i32;

    let inner = &statements[1..statements.len().saturating_sub(1)];
    for stmt in inner {
        if depth > 0 {
            body.push(stmt.clone());
            match first_word(stmt) {
                "done" => depth -= 1,
                _ if matches!(construct_head(stmt), "for" | "while" | "until") => depth += 1,
                _ => {}
            }
            continue;
        }
        match first_word(stmt) {
            "do" if !in_body => {
                in_body = true;
                let rest = strip_keyword(stmt, "do").unwrap_or("");
                if !rest.is_empty() {
                    body.push(rest.to_string());
                    if matches!(construct_head(rest), "for" | "while" | "until") {
                        depth += 1;
                    }
                }
            }
            _ => {
                let target = if in_body { &mut body } else { &mut pre_do };
                target.push(stmt.clone());
                if matches!(construct_head(stmt), "for" | "while" | "until") {
                    depth += 1;
                }
            }
        }
    }
    if !in_body {
        return Err(InterpreterError::Syntax("loop: missing `do'".into()));
    }

    let kind = parse_loop_header(header, pre_do)?;
    Ok((kind, body))
}

fn parse_loop_header(header: &str, pre_do: Vec<String>) -> Result<LoopKind, InterpreterError> {
    if let Some(rest) = strip_keyword(header, "for") {
        // C-style: for ((init; cond; post))
        if let Some(inner) = rest.strip_prefix("((").and_then(|r| r.strip_suffix("))")) {
            let parts: Vec<&str> = inner.splitn(3, ';').collect();
            if parts.len() != 3 {
                return Err(InterpreterError::Syntax(
                    "for (( )): expected three expressions".into(),
                ));
            }
            return Ok(LoopKind::CStyle {
                init: parts[0].trim().to_string(),
                cond: parts[1].trim().to_string(),
                post: parts[2].trim().to_string(),
            });
        }

        let mut words_iter = rest.splitn(2, char::is_whitespace);
        let name = words_iter.next().unwrap_or("").to_string();
        let tail = words_iter.next().unwrap_or("").trim_start();
        if name.is_empty() {
            return Err(InterpreterError::Syntax("for: missing variable name".into()));
        }
        if let Some(words) = strip_keyword(tail, "in") {
            return Ok(LoopKind::ForIn { name, words: Some(words.to_string()) });
        }
        if tail.is_empty() {
            // `for name` with no `in`: iterate "$@".
            return Ok(LoopKind::ForIn { name, words: None });
        }
        return Err(InterpreterError::Syntax(format!(
            "for: expected `in', found `{}'",
            first_word(tail)
        )));
    }

    for (keyword, until) in [("while", false), ("until", true)] {
        if let Some(rest) = strip_keyword(header, keyword) {
            let mut condition = Vec::new();
            if !rest.trim().is_empty() {
                condition.push(rest.to_string());
            }
            condition.extend(pre_do);
            if condition.is_empty() {
                return Err(InterpreterError::Syntax(format!("{}: empty condition", keyword)));
            }
            return Ok(LoopKind::Condition { until, condition });
        }
    }

    Err(InterpreterError::Syntax(format!(
        "unrecognized loop header: {}",
        header
    )))
}

// ============================================================================
// Tests
// ============================================================================
