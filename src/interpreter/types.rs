//! Interpreter State
//!
//! Process-wide, single-threaded state for script execution: the
//! function table, the variable scope stack, positional parameters, the
//! last exit status, `PIPESTATUS`, shell options, and the counters that
//! guard against runaway scripts.
//!
//! `$?`, `PIPESTATUS` and the last background pid live here, not in the
//! process environment; they are mirrored out only when a child is about
//! to be spawned.

use indexmap::IndexMap;

use crate::interpreter::variables::VariableManager;

/// A registered shell function: name plus body lines.
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDef {
    pub name: String,
    pub body: Vec<String>,
}

/// Shell options toggled by `set`.
#[derive(Debug, Clone, Copy, Default)]
pub struct ShellOptions {
    /// set -e: return from the block on the first failing command.
    pub errexit: bool,
    /// set -v: echo source lines to stderr as they are read.
    pub verbose: bool,
    /// set -n: parse and validate but do not execute.
    pub noexec: bool,
}

/// Guard limits for recursion and loop iteration.
#[derive(Debug, Clone, Copy)]
pub struct ExecutionLimits {
    pub max_recursion_depth: u32,
    pub max_loop_iterations: u64,
}

impl Default for ExecutionLimits {
    fn default() -> Self {
        Self { max_recursion_depth: 1000, max_loop_iterations: 1_000_000 }
    }
}

/// Complete interpreter state.
#[derive(Debug, Clone)]
pub struct InterpreterState {
    pub variables: VariableManager,
    /// Function table, in definition order.
    pub functions: IndexMap<String, FunctionDef>,
    /// Positional parameters $1..$N of the current frame.
    pub positional: Vec<String>,

    pub last_exit_code: i32,
    /// Exit code of the most recent command substitution.
    pub last_subst_exit_code: i32,
    /// Per-stage exit codes of the most recent pipeline.
    pub pipeline_statuses: Vec<i32>,

    pub options: ShellOptions,
    pub limits: ExecutionLimits,

    /// Line number currently executing, for diagnostics.
    pub current_line: u32,
    /// Loop nesting depth, for break/continue validation.
    pub loop_depth: u32,
    /// Function call depth, for the recursion guard.
    pub call_depth: u32,
    /// True while evaluating an `if`/`while`/`until` condition or a
    /// non-final `&&`/`||` segment; errexit is suppressed there.
    pub in_condition: bool,

    pub last_background_pid: u32,
    pub shell_pid: u32,
}

impl Default for InterpreterState {
    fn default() -> Self {
        Self {
            variables: VariableManager::new(),
            functions: IndexMap::new(),
            positional: Vec::new(),
            last_exit_code: 0,
            last_subst_exit_code: 0,
            pipeline_statuses: Vec::new(),
            options: ShellOptions::default(),
            limits: ExecutionLimits::default(),
            current_line: 1,
            loop_depth: 0,
            call_depth: 0,
            in_condition: false,
            last_background_pid: 0,
            shell_pid: std::process::id(),
        }
    }
}

impl InterpreterState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolve a variable or special parameter to its value. Special
    /// parameters layer over the scoped variable store.
    pub fn variable_value(&self, name: &str) -> String {
        match name {
            "?" => self.last_exit_code.to_string(),
            "$" => self.shell_pid.to_string(),
            "#" => self.positional.len().to_string(),
            "!" => {
                if self.last_background_pid == 0 {
                    String::new()
                } else {
                    self.last_background_pid.to_string()
                }
            }
            "*" => self.join_positional_star(),
            "@" => self.positional.join(" "),
            "PIPESTATUS" => self.pipestatus_string(),
            "LINENO" => self.current_line.to_string(),
            _ => {
                if let Ok(n) = name.parse::<usize>() {
                    if n == 0 {
                        return self.variables.get("0");
                    }
                    return self.positional.get(n - 1).cloned().unwrap_or_default();
                }
                self.variables.get(name)
            }
        }
    }

    /// Whether a name resolves to something set. Special parameters are
    /// always set; positionals are set when within range.
    pub fn variable_is_set(&self, name: &str) -> bool {
        match name {
            "?" | "$" | "#" | "*" | "@" | "PIPESTATUS" | "LINENO" => true,
            "!" => self.last_background_pid != 0,
            _ => {
                if let Ok(n) = name.parse::<usize>() {
                    if n == 0 {
                        return true;
                    }
                    return n <= self.positional.len();
                }
                self.variables.is_set(name)
            }
        }
    }

    /// `$*` joins with the first character of IFS (space when IFS is
    /// unset, nothing when IFS is set but empty).
    fn join_positional_star(&self) -> String {
        let sep = if self.variables.is_set("IFS") {
            let ifs = self.variables.get("IFS");
            ifs.chars().next().map(|c| c.to_string()).unwrap_or_default()
        } else {
            " ".to_string()
        };
        self.positional.join(&sep)
    }

    /// Space-separated `PIPESTATUS` rendering.
    pub fn pipestatus_string(&self) -> String {
        self.pipeline_statuses
            .iter()
            .map(|s| s.to_string())
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Record a pipeline result: `$?` and `PIPESTATUS` together, never
    /// observable in a torn state.
    pub fn record_pipeline_result(&mut self, statuses: Vec<i32>, final_code: i32) {
        self.pipeline_statuses = statuses;
        self.last_exit_code = final_code;
    }

    /// Field separator characters for word splitting.
    pub fn ifs_chars(&self) -> Vec<char> {
        if self.variables.is_set("IFS") {
            self.variables.get("IFS").chars().collect()
        } else {
            vec![' ', '\t', '\n']
        }
    }
}

// ============================================================================
// Tests
// ============================================================================
