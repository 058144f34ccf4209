//! Interpreter Driver
//!
//! The top-level loop: for each source line, poll signals, strip
//! comments, dispatch compound statements to their evaluators, otherwise
//! split into logical commands, run each piece through the expansion
//! pipeline, and hand the resulting pipeline to the executor. Owns `$?`,
//! `PIPESTATUS`, errexit/verbose handling, and the translation between
//! typed control flow and the reserved process exit codes.

use crate::expansion::arithmetic::{ArithContext, ArithmeticError, ArithmeticEvaluator};
use crate::expansion::command_subst::{expand_substitutions, Fragment, FragmentKind};
use crate::expansion::parameter::{expand_parameter, ExpansionError, ParamContext};
use crate::host::Host;
use crate::interpreter::control::{is_control_flow_code, Control};
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::functions::{is_valid_identifier, looks_like_function_def, parse_function_def};
use crate::interpreter::line_utils::{
    first_word, heredoc_delimiter_quoted, parse_into_lines, scan_heredoc_starts,
    strip_inline_comment,
};
use crate::interpreter::logical::{split_logical, split_sequential, LogicalOp};
use crate::interpreter::types::InterpreterState;
use crate::parser::command_parser::{parse_pipeline, RedirOp};
use crate::parser::quote_info::find_matching_paren;
use crate::parser::tokenizer::tokenize;
use crate::parser::types::{strip_quotes, Token};
use crate::validator::report::{command_suggestions, print_runtime_error};
use crate::validator::{has_critical_errors, print_error_report, validate};

/// A heredoc whose body has been collected and waits for its command.
#[derive(Debug, Clone)]
pub(crate) struct PendingHeredoc {
    pub body: String,
    pub quoted: bool,
}

/// The script interpreter core. One per shell process; single-threaded.
pub struct Interpreter<'h> {
    pub state: InterpreterState,
    pub(crate) host: Host<'h>,
    pending_heredocs: Vec<PendingHeredoc>,
}

impl<'h> Interpreter<'h> {
    pub fn new(host: Host<'h>) -> Self {
        Self::with_state(InterpreterState::new(), host)
    }

    pub fn with_state(state: InterpreterState, host: Host<'h>) -> Self {
        Self { state, host, pending_heredocs: Vec::new() }
    }

    // ========================================================================
    // Public surface
    // ========================================================================

    /// Execute a block of source lines. Validation runs first unless
    /// skipped; critical diagnostics refuse execution with exit 2.
    pub fn execute_block(&mut self, lines: &[String], skip_validation: bool) -> i32 {
        if !skip_validation {
            let errors = validate(lines);
            if !errors.is_empty() {
                print_error_report(&errors, true, true);
            }
            if has_critical_errors(&errors) {
                self.state.last_exit_code = 2;
                return 2;
            }
        }
        match self.run_block(lines) {
            Ok(Control::Code(code)) => code,
            Ok(Control::Return(code)) => code,
            Ok(flow) => {
                // break/continue escaping to the outer host is an internal
                // invariant violation: log and fail soft.
                print_runtime_error(
                    &format!("control flow escaped to top level ({:?})", flow),
                    "",
                    self.state.current_line as usize,
                );
                self.state.last_exit_code = 1;
                1
            }
            Err(err) => {
                print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                let code = err.exit_code();
                self.state.last_exit_code = code;
                code
            }
        }
    }

    /// Execute a whole script: split into logical lines first.
    pub fn execute_script(&mut self, script: &str) -> i32 {
        let lines = parse_into_lines(script);
        self.execute_block(&lines, false)
    }

    pub fn has_function(&self, name: &str) -> bool {
        self.state.functions.contains_key(name)
    }

    pub fn function_names(&self) -> Vec<String> {
        self.state.functions.keys().cloned().collect()
    }

    /// Invoke a registered function with `argv[0]` naming it.
    pub fn invoke_function(&mut self, argv: &[String]) -> i32 {
        match self.call_function(argv) {
            Ok(control) => control.code(),
            Err(err) => {
                print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                err.exit_code()
            }
        }
    }

    /// Expand the body of a `${...}` expression.
    pub fn expand_parameter_expression(&mut self, text: &str) -> Result<String, InterpreterError> {
        let mut ctx = StateParams { state: &mut self.state };
        Ok(expand_parameter(&mut ctx, text)?)
    }

    /// Evaluate an arithmetic expression against the live variable store.
    pub fn evaluate_arithmetic_expression(&mut self, text: &str) -> Result<i64, InterpreterError> {
        let mut ctx = StateArith { state: &mut self.state };
        Ok(ArithmeticEvaluator::new(&mut ctx).evaluate(text)?)
    }

    // ========================================================================
    // Block execution
    // ========================================================================

    /// Run lines, returning typed control flow. The statement list of a
    /// compound body uses the same representation, so this is the single
    /// recursion point.
    pub(crate) fn run_block(&mut self, lines: &[String]) -> Result<Control, InterpreterError> {
        let mut last = Control::Code(self.state.last_exit_code);
        let mut idx = 0usize;
        while idx < lines.len() {
            if self.host.signals.has_pending() {
                let pending = self.host.signals.drain();
                if let Some(code) = pending.exit_code() {
                    return Ok(Control::Code(code));
                }
            }

            self.state.current_line = idx as u32 + 1;
            let stripped = strip_inline_comment(&lines[idx]);
            let line = stripped.trim().to_string();
            if line.is_empty() {
                idx += 1;
                continue;
            }
            if self.state.options.verbose {
                eprintln!("{}", lines[idx]);
            }
            if self.state.options.noexec {
                idx += 1;
                continue;
            }

            let control = self.dispatch_line(lines, &mut idx, &line)?;
            match control {
                Control::Code(code) => {
                    last = Control::Code(code);
                    if self.state.options.errexit && code != 0 && !self.state.in_condition {
                        return Ok(Control::Code(code));
                    }
                }
                flow => return Ok(flow),
            }
        }
        Ok(last)
    }

    /// Run body text that may itself contain multiple statements.
    pub(crate) fn run_statements(&mut self, statements: &[String]) -> Result<Control, InterpreterError> {
        self.run_block(statements)
    }

    /// Dispatch one prepared line. Advances `idx` past everything it
    /// consumed (compound constructs may span many lines).
    fn dispatch_line(
        &mut self,
        lines: &[String],
        idx: &mut usize,
        line: &str,
    ) -> Result<Control, InterpreterError> {
        match first_word(line) {
            // Stray closers are tolerated and skipped; the validator
            // flags them before execution in the normal path.
            "fi" | "done" | "esac" | "then" | "else" | "do" | ";;" => {
                *idx += 1;
                return Ok(Control::Code(self.state.last_exit_code));
            }
            "if" => return self.execute_if(lines, idx),
            "for" | "while" | "until" => return self.execute_loop(lines, idx),
            "case" => return self.execute_case(lines, idx),
            _ => {}
        }

        if looks_like_function_def(line) {
            let (def, next, trailing) = parse_function_def(lines, *idx)?;
            if !is_valid_identifier(&def.name) {
                return Err(InterpreterError::Syntax(format!(
                    "`{}': not a valid function name",
                    def.name
                )));
            }
            // Duplicate definitions overwrite.
            self.state.functions.insert(def.name.clone(), def);
            *idx = next;
            if let Some(rest) = trailing {
                return self.run_logical_text(&rest);
            }
            return Ok(Control::Code(0));
        }

        if line.starts_with('{') {
            return self.execute_brace_group(lines, idx);
        }
        if line.starts_with('(') && !line.starts_with("((") {
            return self.execute_subshell(lines, idx);
        }

        // Heredocs: collect bodies from the following lines before the
        // command runs.
        let specs = scan_heredoc_starts(line);
        if !specs.is_empty() {
            let quoted = heredoc_delimiter_quoted(line);
            let mut j = *idx + 1;
            for (delim, strip_tabs) in &specs {
                let mut body = String::new();
                while j < lines.len() {
                    let raw = &lines[j];
                    let check = if *strip_tabs { raw.trim_start_matches('\t') } else { raw.as_str() };
                    j += 1;
                    if check == delim {
                        break;
                    }
                    body.push_str(check);
                    body.push('\n');
                }
                self.pending_heredocs.push(PendingHeredoc { body, quoted });
            }
            let result = self.run_logical_text(line);
            self.pending_heredocs.clear();
            *idx = j;
            return result;
        }

        let result = self.run_logical_text(line);
        *idx += 1;
        result
    }

    // ========================================================================
    // Logical commands
    // ========================================================================

    /// Split on `&&`/`||`, apply short-circuiting, and run the surviving
    /// segments. A control-flow result stops the chain and propagates.
    pub(crate) fn run_logical_text(&mut self, text: &str) -> Result<Control, InterpreterError> {
        let segments = split_logical(text);
        let mut last = self.state.last_exit_code;
        let mut prev_op: Option<LogicalOp> = None;

        for (k, (segment, op_after)) in segments.iter().enumerate() {
            if let Some(op) = prev_op {
                let skip = match op {
                    LogicalOp::And => last != 0,
                    LogicalOp::Or => last == 0,
                    LogicalOp::None => false,
                };
                if skip {
                    prev_op = Some(*op_after);
                    continue;
                }
            }

            // Non-final segments are condition context: errexit holds off.
            let is_final = k == segments.len() - 1;
            let saved = self.state.in_condition;
            if !is_final {
                self.state.in_condition = true;
            }
            let result = self.run_sequential(segment);
            self.state.in_condition = saved;

            match result? {
                Control::Code(code) => last = code,
                flow => return Ok(flow),
            }
            prev_op = Some(*op_after);
        }
        Ok(Control::Code(last))
    }

    /// Run the `;`/`&`-separated pieces of one logical segment.
    fn run_sequential(&mut self, segment: &str) -> Result<Control, InterpreterError> {
        let mut last = self.state.last_exit_code;
        for (piece, background) in split_sequential(segment) {
            match self.run_piece(&piece, background)? {
                Control::Code(code) => {
                    last = code;
                    self.state.last_exit_code = code;
                    if self.state.options.errexit && code != 0 && !self.state.in_condition {
                        return Ok(Control::Code(code));
                    }
                }
                flow => return Ok(flow),
            }
        }
        Ok(Control::Code(last))
    }

    // ========================================================================
    // Single command execution
    // ========================================================================

    /// Run one command piece: expansion pipeline, then function /
    /// special-command / pipeline dispatch.
    pub(crate) fn run_piece(&mut self, piece: &str, background: bool) -> Result<Control, InterpreterError> {
        // Standalone arithmetic command: (( expr )) succeeds when the
        // expression is nonzero.
        let trimmed = piece.trim();
        if trimmed.starts_with("((") && trimmed.ends_with("))") && trimmed.len() >= 4 {
            let inner = &trimmed[2..trimmed.len() - 2];
            let value = {
                let mut ctx = StateArith { state: &mut self.state };
                ArithmeticEvaluator::new(&mut ctx).evaluate(inner)?
            };
            let code = if value != 0 { 0 } else { 1 };
            self.state.last_exit_code = code;
            return Ok(Control::Code(code));
        }

        let tokens = tokenize(piece)?;
        if tokens.is_empty() {
            return Ok(Control::Code(self.state.last_exit_code));
        }

        // Interpreter-owned commands that touch state the host cannot
        // reach: control flow, scope, options, positional parameters.
        let head = tokens[0].unquoted_value();
        if !tokens[0].is_operator {
            if let Some(result) = self.try_special_command(&head, &tokens)? {
                return Ok(result);
            }
        }

        // Leading NAME=value assignments.
        let (assignments, rest) = split_assignments(&tokens);
        if rest.is_empty() && !assignments.is_empty() {
            return self.apply_assignments(&assignments, true);
        }

        let mut prefix_saved: Vec<(String, Option<String>)> = Vec::new();
        if !assignments.is_empty() {
            // Prefix assignments are visible to this command only.
            for token in &assignments {
                let name = match parse_assignment(&token.value) {
                    Some((name, _)) => name,
                    None => continue,
                };
                let old = if self.state.variables.is_set(&name) {
                    Some(self.state.variables.get(&name))
                } else {
                    None
                };
                prefix_saved.push((name, old));
            }
            self.apply_assignments(&assignments, false)?;
            for (name, _) in &prefix_saved {
                self.state.variables.mark_exported(name);
            }
        }

        let result = self.run_expanded_command(&rest, background);

        for (name, old) in prefix_saved.into_iter().rev() {
            match old {
                Some(value) => {
                    let _ = self.state.variables.set(&name, value);
                }
                None => {
                    let _ = self.state.variables.unset(&name);
                }
            }
        }
        result
    }

    fn run_expanded_command(
        &mut self,
        tokens: &[Token],
        background: bool,
    ) -> Result<Control, InterpreterError> {
        // Expansion pipeline over each word token; operators pass through.
        let mut expanded: Vec<Token> = Vec::new();
        for token in tokens {
            if token.is_operator {
                expanded.push(token.clone());
                continue;
            }
            for field in self.expand_word_to_fields(token)? {
                expanded.push(Token::word(field, crate::parser::types::TokenQuoting::Unquoted, token.column));
            }
        }

        if expanded.is_empty() {
            return Ok(Control::Code(0));
        }

        // Function dispatch on the head word.
        let head = expanded[0].value.clone();
        let is_simple = !expanded.iter().any(|t| t.is_operator);
        if is_simple && self.state.functions.contains_key(&head) {
            let argv: Vec<String> = expanded.iter().map(|t| t.value.clone()).collect();
            return self.call_function(&argv);
        }

        // A lone builtin runs without the pipeline machinery.
        if is_simple && self.host.builtins.is_builtin(&head) {
            let argv: Vec<String> = expanded.iter().map(|t| t.value.clone()).collect();
            self.mirror_environment();
            let code = self.host.builtins.execute(&argv);
            self.state.record_pipeline_result(vec![code], code);
            return Ok(self.translate_child_code(code));
        }

        let mut commands = parse_pipeline(&expanded)?;
        if commands.is_empty() {
            return Ok(Control::Code(0));
        }
        if background {
            for cmd in &mut commands {
                cmd.background = true;
            }
        }
        self.attach_heredocs(&mut commands)?;

        let negate = commands[0].negate;
        self.mirror_environment();
        let mut code = self.host.pipeline.execute(&commands);
        let statuses = self.host.pipeline.last_pipeline_statuses();

        if background || commands.iter().any(|c| c.background) {
            let pid = self.host.pipeline.last_spawned_pid();
            if pid != 0 {
                self.state.last_background_pid = pid;
            }
            self.state.last_exit_code = 0;
            return Ok(Control::Code(0));
        }

        if negate {
            code = if code == 0 { 1 } else { 0 };
        }
        if code == 127 {
            if let Some(name) = commands.last().and_then(|c| c.argv.first()) {
                let candidates = self.suggestion_candidates();
                print_runtime_error(
                    &format!("{}: command not found", name),
                    &command_suggestions(name, &candidates),
                    self.state.current_line as usize,
                );
            }
        }
        self.state.record_pipeline_result(
            if statuses.is_empty() { vec![code] } else { statuses },
            code,
        );
        Ok(self.translate_child_code(code))
    }

    /// Map reserved child exit codes back into typed control flow.
    fn translate_child_code(&self, code: i32) -> Control {
        if is_control_flow_code(code) {
            Control::from_exit_code(code)
        } else {
            Control::Code(code)
        }
    }

    fn suggestion_candidates(&self) -> Vec<String> {
        self.state.functions.keys().cloned().collect()
    }

    fn attach_heredocs(
        &mut self,
        commands: &mut [crate::parser::command_parser::Command],
    ) -> Result<(), InterpreterError> {
        let mut pending = std::mem::take(&mut self.pending_heredocs).into_iter();
        for cmd in commands.iter_mut() {
            for redir in &cmd.redirections {
                if redir.op == RedirOp::Heredoc {
                    if let Some(heredoc) = pending.next() {
                        let body = if heredoc.quoted {
                            heredoc.body
                        } else {
                            self.expand_text_for_value(&heredoc.body, false)?
                        };
                        cmd.heredoc_body = Some(body);
                    }
                }
            }
        }
        Ok(())
    }

    /// Mirror exported variables and the special parameters into the
    /// process environment right before a child observes them.
    fn mirror_environment(&mut self) {
        for (name, value) in self.state.variables.exported_list() {
            self.host.environ.set(&name, &value);
        }
        self.host.environ.set("?", &self.state.last_exit_code.to_string());
        if !self.state.pipeline_statuses.is_empty() {
            self.host.environ.set("PIPESTATUS", &self.state.pipestatus_string());
        }
        self.host.environ.set("$", &self.state.shell_pid.to_string());
        self.host.environ.set("#", &self.state.positional.len().to_string());
        for (i, value) in self.state.positional.iter().enumerate().take(9) {
            self.host.environ.set(&(i + 1).to_string(), value);
        }
        if self.state.last_background_pid != 0 {
            self.host.environ.set("!", &self.state.last_background_pid.to_string());
        }
    }

    // ========================================================================
    // Special interpreter commands
    // ========================================================================

    /// Commands the interpreter must run itself because they mutate
    /// interpreter state: break/continue/return, local/export/readonly/
    /// unset, shift, and the `set` option flags.
    fn try_special_command(
        &mut self,
        head: &str,
        tokens: &[Token],
    ) -> Result<Option<Control>, InterpreterError> {
        match head {
            "break" | "continue" => {
                let levels = match self.expand_single_arg(tokens)? {
                    Some(text) => match text.parse::<u32>() {
                        Ok(n) if n >= 1 => n,
                        _ => {
                            print_runtime_error(
                                &format!("{}: numeric argument required", head),
                                "",
                                self.state.current_line as usize,
                            );
                            return Ok(Some(Control::Code(1)));
                        }
                    },
                    None => 1,
                };
                if self.state.loop_depth == 0 {
                    print_runtime_error(
                        &format!("{}: only meaningful in a loop", head),
                        "",
                        self.state.current_line as usize,
                    );
                    return Ok(Some(Control::Code(0)));
                }
                Ok(Some(if head == "break" {
                    Control::Break(levels)
                } else {
                    Control::Continue(levels)
                }))
            }
            "return" => {
                if self.state.call_depth == 0 {
                    print_runtime_error(
                        "return: can only `return' from a function",
                        "",
                        self.state.current_line as usize,
                    );
                    return Ok(Some(Control::Code(1)));
                }
                let code = match self.expand_single_arg(tokens)? {
                    Some(text) => text.parse::<i32>().unwrap_or(self.state.last_exit_code),
                    None => self.state.last_exit_code,
                };
                Ok(Some(Control::Return(code)))
            }
            "local" => {
                if self.state.call_depth == 0 {
                    print_runtime_error(
                        "local: can only be used in a function",
                        "",
                        self.state.current_line as usize,
                    );
                    return Ok(Some(Control::Code(1)));
                }
                // Args arrive expansion-complete from expand_args.
                for arg in self.expand_args(tokens)? {
                    let (name, value) = match parse_assignment(&arg) {
                        Some(pair) => pair,
                        None => (arg.clone(), String::new()),
                    };
                    if !is_valid_identifier(&name) {
                        print_runtime_error(
                            &format!("local: `{}': not a valid identifier", name),
                            "",
                            self.state.current_line as usize,
                        );
                        return Ok(Some(Control::Code(1)));
                    }
                    if let Err(err) = self.state.variables.set_local(&name, value) {
                        print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                        return Ok(Some(Control::Code(1)));
                    }
                }
                Ok(Some(Control::Code(0)))
            }
            "export" | "readonly" => {
                for arg in self.expand_args(tokens)? {
                    let (name, value) = match parse_assignment(&arg) {
                        Some((name, value)) => (name, Some(value)),
                        None => (arg.clone(), None),
                    };
                    if !is_valid_identifier(&name) {
                        print_runtime_error(
                            &format!("{}: `{}': not a valid identifier", head, name),
                            "",
                            self.state.current_line as usize,
                        );
                        return Ok(Some(Control::Code(1)));
                    }
                    if let Some(value) = value {
                        if let Err(err) = self.state.variables.set(&name, value) {
                            print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                            return Ok(Some(Control::Code(1)));
                        }
                    }
                    if head == "export" {
                        self.state.variables.mark_exported(&name);
                    } else {
                        self.state.variables.mark_readonly(&name);
                    }
                }
                Ok(Some(Control::Code(0)))
            }
            "unset" => {
                let mut code = 0;
                for arg in self.expand_args(tokens)? {
                    if self.state.functions.shift_remove(&arg).is_some() {
                        continue;
                    }
                    if let Err(err) = self.state.variables.unset(&arg) {
                        print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                        code = 1;
                    }
                }
                Ok(Some(Control::Code(code)))
            }
            "shift" => {
                let n = match self.expand_single_arg(tokens)? {
                    Some(text) => text.parse::<usize>().unwrap_or(1),
                    None => 1,
                };
                if n > self.state.positional.len() {
                    return Ok(Some(Control::Code(1)));
                }
                self.state.positional.drain(..n);
                Ok(Some(Control::Code(0)))
            }
            "set" => self.run_set_command(tokens),
            _ => Ok(None),
        }
    }

    /// `set` option handling: flag toggles and `set -- args`.
    fn run_set_command(&mut self, tokens: &[Token]) -> Result<Option<Control>, InterpreterError> {
        let args = self.expand_args(tokens)?;
        if args.is_empty() {
            // Listing variables is the host builtin's business.
            return Ok(None);
        }
        let mut iter = args.iter().peekable();
        while let Some(arg) = iter.next() {
            match arg.as_str() {
                "--" => {
                    self.state.positional = iter.cloned().collect();
                    return Ok(Some(Control::Code(0)));
                }
                "-e" => self.state.options.errexit = true,
                "+e" => self.state.options.errexit = false,
                "-v" => self.state.options.verbose = true,
                "+v" => self.state.options.verbose = false,
                "-n" => self.state.options.noexec = true,
                "+n" => self.state.options.noexec = false,
                "-o" | "+o" => {
                    let enable = arg == "-o";
                    match iter.next().map(|s| s.as_str()) {
                        Some("errexit") => self.state.options.errexit = enable,
                        Some("verbose") => self.state.options.verbose = enable,
                        Some("noexec") => self.state.options.noexec = enable,
                        other => {
                            print_runtime_error(
                                &format!("set: {}: unknown option", other.unwrap_or("-o")),
                                "",
                                self.state.current_line as usize,
                            );
                            return Ok(Some(Control::Code(2)));
                        }
                    }
                }
                other => {
                    print_runtime_error(
                        &format!("set: {}: unknown option", other),
                        "",
                        self.state.current_line as usize,
                    );
                    return Ok(Some(Control::Code(2)));
                }
            }
        }
        Ok(Some(Control::Code(0)))
    }

    fn expand_args(&mut self, tokens: &[Token]) -> Result<Vec<String>, InterpreterError> {
        let mut args = Vec::new();
        for token in &tokens[1..] {
            if token.is_operator {
                continue;
            }
            args.extend(self.expand_word_to_fields(token)?);
        }
        Ok(args)
    }

    fn expand_single_arg(&mut self, tokens: &[Token]) -> Result<Option<String>, InterpreterError> {
        Ok(self.expand_args(tokens)?.into_iter().next())
    }

    // ========================================================================
    // Assignments
    // ========================================================================

    /// Apply `NAME=value` assignments. `standalone` marks an
    /// assignment-only statement, whose status is the last substitution's
    /// exit code (0 when no substitution ran).
    fn apply_assignments(
        &mut self,
        assignments: &[Token],
        standalone: bool,
    ) -> Result<Control, InterpreterError> {
        let before = self.state.last_subst_exit_code;
        let mut had_subst = false;
        for token in assignments {
            let (name, raw_value) = parse_assignment(&token.value)
                .ok_or_else(|| InterpreterError::Internal("assignment token lost its shape".into()))?;
            let marker = self.state.last_subst_exit_code;
            let value = self.expand_text_for_value(&raw_value, true)?;
            if self.state.last_subst_exit_code != marker || raw_value.contains("$(") || raw_value.contains('`') {
                had_subst = true;
            }
            if let Err(err) = self.state.variables.set(&name, value) {
                print_runtime_error(&err.to_string(), "", self.state.current_line as usize);
                return Ok(Control::Code(1));
            }
        }
        let code = if standalone && had_subst {
            self.state.last_subst_exit_code
        } else if standalone {
            0
        } else {
            before
        };
        Ok(Control::Code(if standalone { code } else { 0 }))
    }

    // ========================================================================
    // Expansion pipeline
    // ========================================================================

    /// Full expansion of one word token into zero or more argv fields:
    /// command substitution, arithmetic, parameter expansion, variable
    /// substitution, field splitting, quote removal.
    pub(crate) fn expand_word_to_fields(&mut self, token: &Token) -> Result<Vec<String>, InterpreterError> {
        // Single-quoted tokens skip the pipeline entirely.
        if token.quoting == crate::parser::types::TokenQuoting::Single {
            return Ok(vec![token.unquoted_value()]);
        }
        let fragments = self.expand_token_fragments(&token.value)?;
        let ifs = self.state.ifs_chars();
        Ok(assemble_fields(&fragments, &ifs))
    }

    /// Expansion without field splitting, for assignment values, heredoc
    /// bodies, and case words.
    pub(crate) fn expand_text_for_value(
        &mut self,
        text: &str,
        strip: bool,
    ) -> Result<String, InterpreterError> {
        let fragments = self.expand_token_fragments(text)?;
        let joined: String = fragments
            .iter()
            .map(|f| match f.kind {
                FragmentKind::FieldBreak => " ".to_string(),
                FragmentKind::Plain if strip => strip_quotes(&f.text),
                _ => f.text.clone(),
            })
            .collect();
        Ok(joined)
    }

    fn expand_token_fragments(&mut self, raw: &str) -> Result<Vec<Fragment>, InterpreterError> {
        // 1. Command substitution.
        let capture = &mut *self.host.capture;
        let mut exec = |cmd: &str| capture.run_captured(cmd);
        let subst = expand_substitutions(raw, &mut exec);
        if let Some(code) = subst.last_exit_code() {
            self.state.last_subst_exit_code = code;
        }

        // 2-4. Arithmetic, parameter, variable passes over plain text.
        // The variable pass may split a fragment further: quoted `$@`
        // yields one fragment per positional. Double-quote state carries
        // across fragments, since a substitution splits the word
        // mid-quote.
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut in_double = false;
        for fragment in subst.fragments {
            if fragment.kind == FragmentKind::Plain {
                let text = self.apply_arithmetic_pass(&fragment.text)?;
                let text = self.apply_parameter_pass(&text)?;
                let (expanded, ends_in_double) = self.apply_variable_pass(&text, in_double)?;
                fragments.extend(expanded);
                in_double = ends_in_double;
            } else {
                fragments.push(fragment);
            }
        }
        Ok(fragments)
    }

    /// Resolve `$((expr))` occurrences.
    fn apply_arithmetic_pass(&mut self, text: &str) -> Result<String, InterpreterError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut in_single = false;
        let mut i = 0usize;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && !in_single {
                out.push(c);
                if i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            if c == '\'' {
                in_single = !in_single;
                out.push(c);
                i += 1;
                continue;
            }
            if !in_single
                && c == '$'
                && chars.get(i + 1) == Some(&'(')
                && chars.get(i + 2) == Some(&'(')
            {
                if let Some(close) = find_double_paren_close(&chars, i + 1) {
                    let inner: String = chars[i + 3..close - 1].iter().collect();
                    let mut ctx = StateArith { state: &mut self.state };
                    let value = ArithmeticEvaluator::new(&mut ctx).evaluate(&inner)?;
                    out.push_str(&value.to_string());
                    i = close + 1;
                    continue;
                }
            }
            out.push(c);
            i += 1;
        }
        Ok(out)
    }

    /// Resolve `${...}` occurrences.
    fn apply_parameter_pass(&mut self, text: &str) -> Result<String, InterpreterError> {
        let chars: Vec<char> = text.chars().collect();
        let mut out = String::with_capacity(text.len());
        let mut in_single = false;
        let mut i = 0usize;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && !in_single {
                out.push(c);
                if i + 1 < chars.len() {
                    out.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            if c == '\'' {
                in_single = !in_single;
                out.push(c);
                i += 1;
                continue;
            }
            if !in_single && c == '$' && chars.get(i + 1) == Some(&'{') {
                if let Some(close) = find_brace_close(&chars, i + 1) {
                    let inner: String = chars[i + 2..close].iter().collect();
                    // ${@} and ${*} keep their field semantics: rewrite
                    // to the bare form and let the variable pass expand.
                    if inner == "@" || inner == "*" {
                        out.push('$');
                        out.push_str(&inner);
                        i = close + 1;
                        continue;
                    }
                    let mut ctx = StateParams { state: &mut self.state };
                    let value = expand_parameter(&mut ctx, &inner)?;
                    out.push_str(&value);
                    i = close + 1;
                    continue;
                }
            }
            out.push(c);
            i += 1;
        }
        Ok(out)
    }

    /// Resolve `$name`, positional and special `$x` references. Returns
    /// fragments because `$@` and `$*` do not splice as flat text: a
    /// quoted `$@` produces one field per positional, separated by
    /// forced field breaks. `in_double_start` is the quote state carried
    /// in from preceding fragments of the same word; the final state is
    /// returned for the next fragment.
    fn apply_variable_pass(
        &mut self,
        text: &str,
        in_double_start: bool,
    ) -> Result<(Vec<Fragment>, bool), InterpreterError> {
        let chars: Vec<char> = text.chars().collect();
        let mut fragments: Vec<Fragment> = Vec::new();
        let mut plain = String::with_capacity(text.len());
        let mut in_single = false;
        let mut in_double = in_double_start;
        let mut i = 0usize;
        while i < chars.len() {
            let c = chars[i];
            if c == '\\' && !in_single {
                plain.push(c);
                if i + 1 < chars.len() {
                    plain.push(chars[i + 1]);
                    i += 2;
                    continue;
                }
                i += 1;
                continue;
            }
            match c {
                '\'' if !in_double => {
                    in_single = !in_single;
                    plain.push(c);
                    i += 1;
                }
                '"' if !in_single => {
                    in_double = !in_double;
                    plain.push(c);
                    i += 1;
                }
                '$' if !in_single => {
                    if let Some((name, consumed)) = parse_variable_reference(&chars[i + 1..]) {
                        match name.as_str() {
                            "@" => {
                                flush_plain(&mut fragments, &mut plain);
                                self.push_positional_fragments(&mut fragments, in_double);
                            }
                            "*" => {
                                flush_plain(&mut fragments, &mut plain);
                                fragments.push(Fragment {
                                    text: self.state.variable_value("*"),
                                    kind: if in_double {
                                        FragmentKind::SubstQuoted
                                    } else {
                                        FragmentKind::SubstUnquoted
                                    },
                                });
                            }
                            _ => plain.push_str(&self.state.variable_value(&name)),
                        }
                        i += 1 + consumed;
                        continue;
                    }
                    plain.push(c);
                    i += 1;
                }
                _ => {
                    plain.push(c);
                    i += 1;
                }
            }
        }
        flush_plain(&mut fragments, &mut plain);
        Ok((fragments, in_double))
    }

    /// Expand `$@`: inside double quotes, one quoted fragment per
    /// positional with forced breaks between them; unquoted, one
    /// splittable fragment.
    fn push_positional_fragments(&self, fragments: &mut Vec<Fragment>, in_double: bool) {
        if in_double {
            for (k, value) in self.state.positional.iter().enumerate() {
                if k > 0 {
                    fragments.push(Fragment::field_break());
                }
                fragments.push(Fragment {
                    text: value.clone(),
                    kind: FragmentKind::SubstQuoted,
                });
            }
        } else {
            fragments.push(Fragment {
                text: self.state.positional.join(" "),
                kind: FragmentKind::SubstUnquoted,
            });
        }
    }

    // ========================================================================
    // Functions
    // ========================================================================

    /// Call a function: push a scope and a positional frame, run the
    /// body, translate `return` into a plain exit code.
    pub(crate) fn call_function(&mut self, argv: &[String]) -> Result<Control, InterpreterError> {
        let name = argv.first().cloned().unwrap_or_default();
        let def = self
            .state
            .functions
            .get(&name)
            .cloned()
            .ok_or_else(|| InterpreterError::Internal(format!("function `{}' vanished", name)))?;

        if self.state.call_depth >= self.state.limits.max_recursion_depth {
            print_runtime_error(
                &format!(
                    "{}: maximum recursion depth ({}) exceeded",
                    name, self.state.limits.max_recursion_depth
                ),
                "",
                self.state.current_line as usize,
            );
            return Ok(Control::Code(126));
        }

        self.state.call_depth += 1;
        self.state.variables.push_scope();
        let saved_positional =
            std::mem::replace(&mut self.state.positional, argv[1..].to_vec());
        let saved_line = self.state.current_line;

        let result = self.run_block(&def.body);

        self.state.current_line = saved_line;
        self.state.positional = saved_positional;
        self.state.variables.pop_scope();
        self.state.call_depth -= 1;

        match result? {
            Control::Return(code) => Ok(Control::Code(code)),
            Control::Code(code) => Ok(Control::Code(code)),
            // break/continue cross the function boundary into any
            // enclosing loop context.
            flow => Ok(flow),
        }
    }

    // ========================================================================
    // Conditions
    // ========================================================================

    /// Evaluate a condition: arithmetic `(( ))` forms, parenthesized
    /// subconditions reduced to `true`/`false`, then ordinary logical
    /// execution. Errexit never fires inside.
    pub(crate) fn evaluate_condition(&mut self, condition: &str) -> Result<Control, InterpreterError> {
        let saved = self.state.in_condition;
        self.state.in_condition = true;
        let result = self.evaluate_condition_inner(condition);
        self.state.in_condition = saved;
        result
    }

    fn evaluate_condition_inner(&mut self, condition: &str) -> Result<Control, InterpreterError> {
        let trimmed = condition.trim();
        if trimmed.is_empty() {
            return Ok(Control::Code(1));
        }

        // (( expr )): arithmetic truth.
        if trimmed.starts_with("((") && trimmed.ends_with("))") {
            let inner = &trimmed[2..trimmed.len() - 2];
            let value = {
                let mut ctx = StateArith { state: &mut self.state };
                ArithmeticEvaluator::new(&mut ctx).evaluate(inner)?
            };
            let code = if value != 0 { 0 } else { 1 };
            self.state.last_exit_code = code;
            return Ok(Control::Code(code));
        }

        // Reduce top-level parenthesized groups to true/false.
        let mut text = trimmed.to_string();
        loop {
            match find_condition_group(&text) {
                Some(open) => {
                    let close = find_matching_paren(&text, open).ok_or_else(|| {
                        InterpreterError::Syntax("unbalanced parentheses in condition".into())
                    })?;
                    let inner: String = text
                        .chars()
                        .skip(open + 1)
                        .take(close - open - 1)
                        .collect();
                    let truth = match self.evaluate_condition_inner(&inner)? {
                        Control::Code(code) => code == 0,
                        flow => return Ok(flow),
                    };
                    let mut rebuilt: String = text.chars().take(open).collect();
                    rebuilt.push_str(if truth { "true" } else { "false" });
                    rebuilt.extend(text.chars().skip(close + 1));
                    text = rebuilt;
                }
                None => break,
            }
        }

        self.run_logical_text(&text)
    }

    // ========================================================================
    // Brace groups and subshells
    // ========================================================================

    /// `{ ...; }`: runs in the current scope.
    fn execute_brace_group(&mut self, lines: &[String], idx: &mut usize) -> Result<Control, InterpreterError> {
        let (body, next) = collect_delimited(lines, *idx, '{', '}')?;
        *idx = next;
        let statements = parse_into_lines(&body);
        self.run_block(&statements)
    }

    /// `( ... )`: state is snapshotted and restored; only the exit
    /// status survives.
    fn execute_subshell(&mut self, lines: &[String], idx: &mut usize) -> Result<Control, InterpreterError> {
        let (body, next) = collect_delimited(lines, *idx, '(', ')')?;
        *idx = next;
        let statements = parse_into_lines(&body);

        let snapshot = self.state.clone();
        let result = self.run_block(&statements);
        let code = match result {
            Ok(control) => control.code(),
            Err(ref err) => err.exit_code(),
        };
        self.state = snapshot;
        self.state.last_exit_code = code;
        Ok(Control::Code(code))
    }
}

// ============================================================================
// Adapters over the interpreter state
// ============================================================================

pub(crate) struct StateArith<'a> {
    pub state: &'a mut InterpreterState,
}

impl ArithContext for StateArith<'_> {
    fn read_variable(&mut self, name: &str) -> i64 {
        let value = self.state.variable_value(name);
        let trimmed = value.trim();
        if let Some(hex) = trimmed.strip_prefix("0x").or_else(|| trimmed.strip_prefix("0X")) {
            return i64::from_str_radix(hex, 16).unwrap_or(0);
        }
        trimmed.parse::<i64>().unwrap_or(0)
    }

    fn write_variable(&mut self, name: &str, value: i64) -> Result<(), ArithmeticError> {
        self.state
            .variables
            .set(name, value.to_string())
            .map_err(|err| ArithmeticError::ReadonlyVariable(err.0))
    }
}

pub(crate) struct StateParams<'a> {
    pub state: &'a mut InterpreterState,
}

impl ParamContext for StateParams<'_> {
    fn get(&mut self, name: &str) -> String {
        self.state.variable_value(name)
    }

    fn set(&mut self, name: &str, value: &str) -> Result<(), ExpansionError> {
        self.state
            .variables
            .set(name, value)
            .map_err(|err| ExpansionError::ReadonlyVariable(err.0))
    }

    fn is_set(&mut self, name: &str) -> bool {
        self.state.variable_is_set(name)
    }

    fn eval_arith(&mut self, expr: &str) -> Option<i64> {
        let mut ctx = StateArith { state: &mut *self.state };
        ArithmeticEvaluator::new(&mut ctx).evaluate(expr).ok()
    }
}

// ============================================================================
// Free helpers
// ============================================================================

/// Split leading `NAME=value` word tokens from the rest of the command.
fn split_assignments(tokens: &[Token]) -> (Vec<Token>, Vec<Token>) {
    let mut assignments = Vec::new();
    let mut rest = Vec::new();
    let mut in_prefix = true;
    for token in tokens {
        if in_prefix && !token.is_operator && parse_assignment(&token.value).is_some() {
            assignments.push(token.clone());
        } else {
            in_prefix = false;
            rest.push(token.clone());
        }
    }
    (assignments, rest)
}

/// Split `NAME=value` (quotes allowed in the value). None when the text
/// is not a well-formed assignment.
fn parse_assignment(raw: &str) -> Option<(String, String)> {
    let eq = raw.find('=')?;
    let name = &raw[..eq];
    if name.is_empty() {
        return None;
    }
    let mut chars = name.chars();
    let first = chars.next().unwrap();
    if !(first.is_ascii_alphabetic() || first == '_') {
        return None;
    }
    if !chars.all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return None;
    }
    Some((name.to_string(), raw[eq + 1..].to_string()))
}

/// Field assembly: walk fragments applying quote removal and IFS
/// splitting. Quoted text and `SubstQuoted` fragments never split;
/// `SubstUnquoted` output splits on IFS.
fn assemble_fields(fragments: &[Fragment], ifs: &[char]) -> Vec<String> {
    let mut fields: Vec<String> = Vec::new();
    let mut current = String::new();
    let mut has_field = false;
    // Quote state persists across fragments: a substitution inside
    // double quotes splits the word into fragments mid-quote.
    let mut in_single = false;
    let mut in_double = false;

    let mut break_field = |fields: &mut Vec<String>, current: &mut String, has_field: &mut bool| {
        if *has_field || !current.is_empty() {
            fields.push(std::mem::take(current));
            *has_field = false;
        }
    };

    for fragment in fragments {
        match fragment.kind {
            FragmentKind::FieldBreak => {
                // Boundary forced by quoted $@: split even mid-quote.
                has_field = true;
                break_field(&mut fields, &mut current, &mut has_field);
            }
            FragmentKind::SubstQuoted => {
                current.push_str(&fragment.text);
                has_field = true;
            }
            FragmentKind::SubstUnquoted => {
                for c in fragment.text.chars() {
                    if ifs.contains(&c) && !in_double {
                        break_field(&mut fields, &mut current, &mut has_field);
                    } else {
                        current.push(c);
                        has_field = true;
                    }
                }
            }
            FragmentKind::Plain => {
                let chars: Vec<char> = fragment.text.chars().collect();
                let mut i = 0usize;
                while i < chars.len() {
                    let c = chars[i];
                    match c {
                        '\'' if !in_double => {
                            in_single = !in_single;
                            has_field = true;
                        }
                        '"' if !in_single => {
                            in_double = !in_double;
                            has_field = true;
                        }
                        '\\' if !in_single => {
                            if in_double {
                                match chars.get(i + 1) {
                                    Some(&n @ ('$' | '`' | '"' | '\\')) => {
                                        current.push(n);
                                        has_field = true;
                                        i += 1;
                                    }
                                    _ => {
                                        current.push('\\');
                                        has_field = true;
                                    }
                                }
                            } else if let Some(&n) = chars.get(i + 1) {
                                current.push(n);
                                has_field = true;
                                i += 1;
                            }
                        }
                        c if ifs.contains(&c) && !in_single && !in_double => {
                            break_field(&mut fields, &mut current, &mut has_field);
                        }
                        c => {
                            current.push(c);
                            has_field = true;
                        }
                    }
                    i += 1;
                }
            }
        }
    }
    break_field(&mut fields, &mut current, &mut has_field);
    fields
}

fn flush_plain(fragments: &mut Vec<Fragment>, plain: &mut String) {
    if !plain.is_empty() {
        fragments.push(Fragment::plain(std::mem::take(plain)));
    }
}

/// Parse a variable reference after `$`: `name`, one special character,
/// or a digit. Returns the name and chars consumed.
fn parse_variable_reference(chars: &[char]) -> Option<(String, usize)> {
    let first = *chars.first()?;
    if first.is_ascii_alphabetic() || first == '_' {
        let mut end = 1;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        return Some((chars[..end].iter().collect(), end));
    }
    if first.is_ascii_digit() {
        return Some((first.to_string(), 1));
    }
    if matches!(first, '?' | '$' | '#' | '*' | '@' | '!') {
        return Some((first.to_string(), 1));
    }
    None
}

/// Find `))` closing a `$((` that starts at `chars[open] == '('`.
fn find_double_paren_close(chars: &[char], open: usize) -> Option<usize> {
    let inner = crate::expansion::command_subst::find_matching_paren(chars, open + 1)?;
    if chars.get(inner + 1) == Some(&')') {
        Some(inner + 1)
    } else {
        None
    }
}

fn find_brace_close(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut i = open;
    while i < chars.len() {
        match chars[i] {
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// A top-level `(` that opens a subcondition: not `$(`, not `((`, not a
/// redirection-adjacent paren. Returns its char index.
fn find_condition_group(text: &str) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut in_single = false;
    let mut in_double = false;
    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];
        match c {
            '\\' if !in_single => i += 1,
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => {
                let prev = if i == 0 { None } else { Some(chars[i - 1]) };
                let next = chars.get(i + 1).copied();
                if prev != Some('$') && prev != Some('(') && next != Some('(') {
                    return Some(i);
                }
                // Skip the whole $(...) / ((...)) region.
                if let Some(close) = crate::expansion::command_subst::find_matching_paren(&chars, i) {
                    i = close;
                }
            }
            _ => {}
        }
        i += 1;
    }
    None
}

/// Collect a `{ ... }` or `( ... )` body possibly spanning lines.
/// Returns the inner text and the next line index.
fn collect_delimited(
    lines: &[String],
    start: usize,
    open: char,
    close: char,
) -> Result<(String, usize), InterpreterError> {
    let mut text = String::new();
    let mut index = start;
    while index < lines.len() {
        if !text.is_empty() {
            text.push('\n');
        }
        text.push_str(lines[index].trim());
        index += 1;
        let open_idx = text.find(open).map(|b| text[..b].chars().count());
        if let Some(open_idx) = open_idx {
            let matcher = if open == '{' {
                crate::parser::quote_info::find_matching_brace(&text, open_idx)
            } else {
                find_matching_paren(&text, open_idx)
            };
            if let Some(close_idx) = matcher {
                let inner: String = text
                    .chars()
                    .skip(open_idx + 1)
                    .take(close_idx - open_idx - 1)
                    .collect();
                let _ = close;
                return Ok((inner.trim().to_string(), index));
            }
        }
    }
    Err(InterpreterError::Syntax(format!(
        "unexpected end of input looking for `{}'",
        close
    )))
}

// ============================================================================
// Tests (driver-level units; end-to-end scenarios live in testing.rs)
// ============================================================================
