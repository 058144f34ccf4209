//! Test Harness
//!
//! A scripted in-memory host: a pipeline executor that understands a
//! small command vocabulary (`echo`, `true`, `false`, `test`/`[`,
//! `cat`, `ret`), a capture executor that re-enters a fresh interpreter,
//! and settable signal flags. Captured stdout is shared so scenario
//! tests can assert on it. Compiled only for tests.

use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;

use crate::host::{
    BuiltinRegistry, CommandExecutor, Environment, Host, PendingSignals, PipelineExecutor,
    SignalHandler,
};
use crate::interpreter::Interpreter;
use crate::parser::command_parser::{Command, RedirOp};

pub struct ScriptedHost {
    pipeline: MockPipeline,
    capture: MockCapture,
    builtins: MockBuiltins,
    signals: MockSignals,
    environ: MockEnv,
    stdout: Rc<RefCell<String>>,
}

impl ScriptedHost {
    pub fn new() -> Self {
        let stdout = Rc::new(RefCell::new(String::new()));
        Self {
            pipeline: MockPipeline {
                stdout: stdout.clone(),
                files: HashMap::new(),
                statuses: Vec::new(),
                next_pid: 4321,
                last_pid: 0,
            },
            capture: MockCapture,
            builtins: MockBuiltins,
            signals: MockSignals::default(),
            environ: MockEnv::default(),
            stdout,
        }
    }

    pub fn host(&mut self) -> Host<'_> {
        Host {
            pipeline: &mut self.pipeline,
            capture: &mut self.capture,
            builtins: &mut self.builtins,
            signals: &mut self.signals,
            environ: &mut self.environ,
        }
    }

    pub fn stdout(&self) -> String {
        self.stdout.borrow().clone()
    }

    pub fn queue_sigint(&mut self) {
        self.signals.pending.sigint = true;
    }

    pub fn file(&self, name: &str) -> Option<String> {
        self.pipeline.files.get(name).cloned()
    }
}

/// Run a script against a fresh host; returns (stdout, exit code).
pub fn run_script(script: &str) -> (String, i32) {
    let mut scripted = ScriptedHost::new();
    let host = scripted.host();
    let mut interp = Interpreter::new(host);
    let code = interp.execute_script(script);
    drop(interp);
    (scripted.stdout(), code)
}

// ============================================================================
// Pipeline executor
// ============================================================================

struct MockPipeline {
    stdout: Rc<RefCell<String>>,
    files: HashMap<String, String>,
    statuses: Vec<i32>,
    next_pid: u32,
    last_pid: u32,
}

impl PipelineExecutor for MockPipeline {
    fn execute(&mut self, commands: &[Command]) -> i32 {
        if commands.iter().any(|c| c.background) {
            self.last_pid = self.next_pid;
            self.next_pid += 1;
            return 0;
        }

        let mut statuses = Vec::with_capacity(commands.len());
        let mut stdin = String::new();
        let mut final_code = 0;
        for (i, cmd) in commands.iter().enumerate() {
            if let Some(body) = &cmd.heredoc_body {
                stdin = body.clone();
            }
            if let Some(word) = &cmd.here_string {
                stdin = format!("{}\n", word);
            }
            for redir in &cmd.redirections {
                if redir.op == RedirOp::In {
                    stdin = self.files.get(&redir.target).cloned().unwrap_or_default();
                }
            }

            let (out, code) = run_argv(&cmd.argv, &stdin);
            statuses.push(code);
            final_code = code;

            // Route stage output: file redirection, next stage, or the
            // captured stdout.
            let out_redir = cmd
                .redirections
                .iter()
                .find(|r| matches!(r.op, RedirOp::Out | RedirOp::Append | RedirOp::Both | RedirOp::BothAppend));
            if let Some(redir) = out_redir {
                if matches!(redir.op, RedirOp::Append | RedirOp::BothAppend) {
                    self.files.entry(redir.target.clone()).or_default().push_str(&out);
                } else {
                    self.files.insert(redir.target.clone(), out);
                }
                stdin = String::new();
            } else if i + 1 < commands.len() {
                stdin = out;
            } else {
                self.stdout.borrow_mut().push_str(&out);
            }
        }
        self.statuses = statuses;
        final_code
    }

    fn last_pipeline_statuses(&self) -> Vec<i32> {
        self.statuses.clone()
    }

    fn last_spawned_pid(&self) -> u32 {
        self.last_pid
    }
}

/// The mock command vocabulary.
fn run_argv(argv: &[String], stdin: &str) -> (String, i32) {
    let name = match argv.first() {
        Some(name) => name.as_str(),
        None => return (String::new(), 0),
    };
    match name {
        "echo" => (format!("{}\n", argv[1..].join(" ")), 0),
        "true" | ":" => (String::new(), 0),
        "false" => (String::new(), 1),
        // Arbitrary exit status, for errexit and status tests.
        "ret" => {
            let code = argv.get(1).and_then(|s| s.parse().ok()).unwrap_or(0);
            (String::new(), code)
        }
        "cat" => (stdin.to_string(), 0),
        "upcase" => (stdin.to_uppercase(), 0),
        "[" | "test" => {
            let mut args: Vec<&str> = argv[1..].iter().map(|s| s.as_str()).collect();
            if name == "[" {
                if args.last() != Some(&"]") {
                    return (String::new(), 2);
                }
                args.pop();
            }
            (String::new(), if eval_test(&args) { 0 } else { 1 })
        }
        _ => (String::new(), 127),
    }
}

fn eval_test(args: &[&str]) -> bool {
    match args {
        [] => false,
        [s] => !s.is_empty(),
        ["-z", s] => s.is_empty(),
        ["-n", s] => !s.is_empty(),
        [a, "=", b] => a == b,
        [a, "!=", b] => a != b,
        [a, op, b] => {
            let (a, b): (i64, i64) = match (a.parse(), b.parse()) {
                (Ok(a), Ok(b)) => (a, b),
                _ => return false,
            };
            match *op {
                "-eq" => a == b,
                "-ne" => a != b,
                "-lt" => a < b,
                "-le" => a <= b,
                "-gt" => a > b,
                "-ge" => a >= b,
                _ => false,
            }
        }
        _ => false,
    }
}

// ============================================================================
// Capture executor: re-enter a fresh interpreter (subshell semantics)
// ============================================================================

struct MockCapture;

impl CommandExecutor for MockCapture {
    fn run_captured(&mut self, command_line: &str) -> (String, i32) {
        let mut scripted = ScriptedHost::new();
        let host = scripted.host();
        let mut interp = Interpreter::new(host);
        let code = interp.execute_script(command_line);
        drop(interp);
        (scripted.stdout(), code)
    }
}

// ============================================================================
// Builtins, signals, environment
// ============================================================================

struct MockBuiltins;

impl BuiltinRegistry for MockBuiltins {
    fn is_builtin(&self, _name: &str) -> bool {
        false
    }

    fn execute(&mut self, _argv: &[String]) -> i32 {
        127
    }
}

#[derive(Default)]
struct MockSignals {
    pending: PendingSignals,
}

impl SignalHandler for MockSignals {
    fn has_pending(&self) -> bool {
        self.pending.any()
    }

    fn drain(&mut self) -> PendingSignals {
        std::mem::take(&mut self.pending)
    }
}

#[derive(Default)]
struct MockEnv {
    vars: HashMap<String, String>,
}

impl Environment for MockEnv {
    fn get(&self, name: &str) -> Option<String> {
        self.vars.get(name).cloned()
    }

    fn set(&mut self, name: &str, value: &str) {
        self.vars.insert(name.to_string(), value.to_string());
    }

    fn unset(&mut self, name: &str) {
        self.vars.remove(name);
    }

    fn exported_list(&self) -> Vec<(String, String)> {
        self.vars.iter().map(|(k, v)| (k.clone(), v.clone())).collect()
    }
}

// ============================================================================
// End-to-end scenarios
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn scenario_arithmetic_assignment() {
        let (out, code) = run_script("x=3; y=$((x*x+1)); echo $y");
        assert_eq!(out, "10\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_for_loop() {
        let (out, code) = run_script("for i in one two three; do echo $i; done");
        assert_eq!(out, "one\ntwo\nthree\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_function_local_scope() {
        let (out, code) = run_script("f(){ local a=1; echo $a; }; a=2; f; echo $a");
        assert_eq!(out, "1\n2\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_case_glob() {
        let (out, code) = run_script("case apple in a*) echo fruit;; *) echo other;; esac");
        assert_eq!(out, "fruit\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_case_alternation_and_no_fallthrough() {
        let (out, code) = run_script("case abc in x|a*) echo m;; a*) echo second;; esac");
        assert_eq!(out, "m\n");
        assert_eq!(code, 0);
        let (out, _) = run_script("case zzz in a*) echo a;; esac; echo $?");
        assert_eq!(out, "0\n");
    }

    #[test]
    fn scenario_default_expansion_leaves_unset() {
        let (out, code) = run_script("echo ${name:-anon}; echo ${name:-again}");
        assert_eq!(out, "anon\nagain\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_short_circuit_chain() {
        let (out, code) = run_script("false && echo X || echo Y");
        assert_eq!(out, "Y\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn scenario_if_with_test_builtin() {
        let (out, code) = run_script("if [ -z \"\" ]; then echo empty; fi");
        assert_eq!(out, "empty\n");
        assert_eq!(code, 0);
    }

    // ------------------------------------------------------------------
    // Control flow
    // ------------------------------------------------------------------

    #[test]
    fn test_break_one_level() {
        let (out, _) = run_script(
            "for i in 1 2; do for j in a b; do echo $i$j; break; done; done",
        );
        assert_eq!(out, "1a\n2a\n");
    }

    #[test]
    fn test_break_two_levels() {
        let (out, _) = run_script(
            "for i in 1 2; do for j in a b; do echo $i$j; break 2; done; done",
        );
        assert_eq!(out, "1a\n");
    }

    #[test]
    fn test_continue() {
        let (out, _) = run_script(
            "for i in 1 2 3; do if [ $i = 2 ]; then continue; fi; echo $i; done",
        );
        assert_eq!(out, "1\n3\n");
    }

    #[test]
    fn test_return_sets_status_without_unwinding_script() {
        let (out, code) = run_script("f(){ return 3; echo not-reached; }; f; echo $?; echo end");
        assert_eq!(out, "3\nend\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_while_until_loops() {
        let (out, _) = run_script("x=0\nwhile ((x < 3)); do x=$((x+1)); echo $x; done");
        assert_eq!(out, "1\n2\n3\n");
        let (out, _) = run_script("x=0\nuntil ((x >= 2)); do x=$((x+1)); done; echo $x");
        assert_eq!(out, "2\n");
    }

    #[test]
    fn test_c_style_for() {
        let (out, _) = run_script("for ((i=0; i<3; i++)); do echo $i; done");
        assert_eq!(out, "0\n1\n2\n");
    }

    #[test]
    fn test_elif_else_chain() {
        let script = "x=2\nif [ $x = 1 ]; then echo one; elif [ $x = 2 ]; then echo two; else echo other; fi";
        let (out, _) = run_script(script);
        assert_eq!(out, "two\n");
    }

    #[test]
    fn test_nested_if_multiline() {
        let script = "if true; then\n  if false; then\n    echo inner\n  else\n    echo inner-else\n  fi\nfi";
        let (out, _) = run_script(script);
        assert_eq!(out, "inner-else\n");
    }

    #[test]
    fn test_condition_groups_short_circuit() {
        let (out, _) = run_script("if (false || true) && true; then echo yes; fi");
        assert_eq!(out, "yes\n");
    }

    // ------------------------------------------------------------------
    // Status propagation
    // ------------------------------------------------------------------

    #[test]
    fn test_pipestatus_and_last_status() {
        let (out, _) = run_script("false | true\necho $? $PIPESTATUS");
        assert_eq!(out, "0 1 0\n");
    }

    #[test]
    fn test_negated_pipeline() {
        let (out, _) = run_script("! false\necho $?\n! true\necho $?");
        assert_eq!(out, "0\n1\n");
    }

    #[test]
    fn test_errexit_stops_block() {
        let (out, code) = run_script("set -e\nret 3\necho after");
        assert_eq!(out, "");
        assert_eq!(code, 3);
    }

    #[test]
    fn test_errexit_spares_conditions() {
        let (out, code) = run_script("set -e\nif false; then echo no; fi\nfalse || echo rescued");
        assert_eq!(out, "rescued\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_short_circuit_skips_side_effects() {
        let (out, _) = run_script("f(){ x=ran; }\nfalse && f\necho ${x:-skipped}\ntrue || f\necho ${x:-skipped}");
        assert_eq!(out, "skipped\nskipped\n");
    }

    // ------------------------------------------------------------------
    // Functions and scope
    // ------------------------------------------------------------------

    #[test]
    fn test_positional_parameters_restored() {
        let (out, _) = run_script("set -- a b\nf(){ echo $1 $#; }\nf x\necho $1 $#");
        assert_eq!(out, "x 1\na 2\n");
    }

    #[test]
    fn test_quoted_at_expands_per_positional() {
        let (out, _) = run_script("set -- 'a b' c\nfor x in \"$@\"; do echo \"[$x]\"; done");
        assert_eq!(out, "[a b]\n[c]\n");
    }

    #[test]
    fn test_unquoted_at_field_splits() {
        let (out, _) = run_script("set -- 'a b' c\nfor x in $@; do echo \"[$x]\"; done");
        assert_eq!(out, "[a]\n[b]\n[c]\n");
    }

    #[test]
    fn test_quoted_star_is_one_field() {
        let (out, _) = run_script("set -- 'a b' c\nfor x in \"$*\"; do echo \"[$x]\"; done");
        assert_eq!(out, "[a b c]\n");
    }

    #[test]
    fn test_braced_at_keeps_field_semantics() {
        let (out, _) = run_script("set -- one two\nfor x in \"${@}\"; do echo \"[$x]\"; done");
        assert_eq!(out, "[one]\n[two]\n");
    }

    #[test]
    fn test_function_redefinition_overwrites() {
        let (out, _) = run_script("f(){ echo old; }\nf(){ echo new; }\nf");
        assert_eq!(out, "new\n");
    }

    #[test]
    fn test_recursion_guard() {
        let mut scripted = ScriptedHost::new();
        let mut interp = Interpreter::new(scripted.host());
        interp.state.limits.max_recursion_depth = 50;
        let code = interp.execute_script("f(){ f; }; f");
        assert_eq!(code, 126);
    }

    #[test]
    fn test_invoke_function_api() {
        let mut scripted = ScriptedHost::new();
        let mut interp = Interpreter::new(scripted.host());
        interp.execute_script("greet(){ echo hi $1; return 7; }");
        assert!(interp.has_function("greet"));
        assert_eq!(interp.function_names(), vec!["greet"]);
        let code = interp.invoke_function(&["greet".into(), "there".into()]);
        assert_eq!(code, 7);
        drop(interp);
        assert_eq!(scripted.stdout(), "hi there\n");
    }

    // ------------------------------------------------------------------
    // Expansion pipeline
    // ------------------------------------------------------------------

    #[test]
    fn test_command_substitution_in_word() {
        let (out, _) = run_script("x=$(echo hello)\necho got:$x");
        assert_eq!(out, "got:hello\n");
    }

    #[test]
    fn test_backtick_substitution() {
        let (out, _) = run_script("echo `echo nested`");
        assert_eq!(out, "nested\n");
    }

    #[test]
    fn test_quoted_substitution_not_split() {
        let (out, _) = run_script("x=\"$(echo a b)\"\necho \"$x\"");
        assert_eq!(out, "a b\n");
    }

    #[test]
    fn test_parameter_operators_through_script() {
        let (out, _) = run_script("v=hello.txt\necho ${v%.txt} ${#v} ${v/hello/bye}");
        assert_eq!(out, "hello 9 bye.txt\n");
    }

    #[test]
    fn test_assign_default_persists() {
        let (out, _) = run_script("echo ${x:=stored}\necho $x");
        assert_eq!(out, "stored\nstored\n");
    }

    #[test]
    fn test_required_parameter_aborts() {
        let (out, code) = run_script("echo ${must:?is required}\necho not-reached");
        assert_eq!(out, "");
        assert_eq!(code, 1);
    }

    #[test]
    fn test_field_splitting_unquoted_substitution() {
        let (out, _) = run_script("for w in $(echo a b c); do echo [$w]; done");
        assert_eq!(out, "[a]\n[b]\n[c]\n");
    }

    #[test]
    fn test_heredoc_expands_body() {
        let (out, _) = run_script("name=world\ncat <<EOF\nhello $name\nEOF");
        assert_eq!(out, "hello world\n");
    }

    #[test]
    fn test_heredoc_quoted_delimiter_literal() {
        let (out, _) = run_script("name=world\ncat <<'EOF'\nhello $name\nEOF");
        assert_eq!(out, "hello $name\n");
    }

    #[test]
    fn test_here_string() {
        let (out, _) = run_script("cat <<< hi");
        assert_eq!(out, "hi\n");
    }

    // ------------------------------------------------------------------
    // State commands
    // ------------------------------------------------------------------

    #[test]
    fn test_readonly_assignment_fails() {
        let (out, _) = run_script("readonly r=1\nr=2\necho $? $r");
        assert_eq!(out, "1 1\n");
    }

    #[test]
    fn test_unset_variable() {
        let (out, _) = run_script("x=1\nunset x\necho ${x:-gone}");
        assert_eq!(out, "gone\n");
    }

    #[test]
    fn test_shift() {
        let (out, _) = run_script("set -- a b c\nshift\necho $1 $#");
        assert_eq!(out, "b 2\n");
    }

    #[test]
    fn test_export_reaches_children() {
        let mut scripted = ScriptedHost::new();
        let mut interp = Interpreter::new(scripted.host());
        interp.execute_script("export GREETING=hi\necho x");
        drop(interp);
        // Mirrored into the environment backing store before the spawn.
        let host_env = scripted.environ.vars.get("GREETING").cloned();
        assert_eq!(host_env.as_deref(), Some("hi"));
    }

    // ------------------------------------------------------------------
    // Subshells, groups, background
    // ------------------------------------------------------------------

    #[test]
    fn test_subshell_isolates_state() {
        let (out, _) = run_script("(x=5; echo $x)\necho ${x:-unset}");
        assert_eq!(out, "5\nunset\n");
    }

    #[test]
    fn test_brace_group_shares_state() {
        let (out, _) = run_script("{ x=5; echo $x; }\necho $x");
        assert_eq!(out, "5\n5\n");
    }

    #[test]
    fn test_background_records_pid() {
        let (out, code) = run_script("ret 9 &\necho $! $?");
        assert_eq!(out, "4321 0\n");
        assert_eq!(code, 0);
    }

    #[test]
    fn test_output_redirection_to_file() {
        let mut scripted = ScriptedHost::new();
        let mut interp = Interpreter::new(scripted.host());
        interp.execute_script("echo saved > out.txt");
        drop(interp);
        assert_eq!(scripted.file("out.txt").as_deref(), Some("saved\n"));
        assert_eq!(scripted.stdout(), "");
    }

    #[test]
    fn test_pipeline_through_stage() {
        let (out, _) = run_script("echo hello | upcase");
        assert_eq!(out, "HELLO\n");
    }

    // ------------------------------------------------------------------
    // Validation and signals
    // ------------------------------------------------------------------

    #[test]
    fn test_unbalanced_if_refused() {
        let (out, code) = run_script("if true; then\necho ran");
        assert_eq!(out, "");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_unclosed_quote_refused() {
        let (_, code) = run_script("echo 'oops");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_pending_signal_aborts() {
        let mut scripted = ScriptedHost::new();
        scripted.queue_sigint();
        let mut interp = Interpreter::new(scripted.host());
        let code = interp.execute_script("echo never");
        drop(interp);
        assert_eq!(code, 130);
        assert_eq!(scripted.stdout(), "");
    }

    #[test]
    fn test_arithmetic_division_by_zero_reports() {
        let (out, code) = run_script("echo $((1/0))");
        assert_eq!(out, "");
        assert_eq!(code, 2);
    }

    #[test]
    fn test_command_not_found_status() {
        let (_, code) = run_script("no_such_command_zzz");
        assert_eq!(code, 127);
    }

    #[test]
    fn test_noexec_parses_only() {
        let (out, code) = run_script("set -n\necho hidden");
        assert_eq!(out, "");
        assert_eq!(code, 0);
    }
}
