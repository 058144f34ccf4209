//! External Collaborator Interfaces
//!
//! The interpreter core drives process execution, builtin dispatch, and
//! signal polling through these traits. Each evaluator holds only the
//! references it needs; the [`Host`] bundle is passed by reference
//! through the driver's recursion.

use crate::parser::command_parser::Command;

pub mod system;

/// Signals observed since the last drain.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PendingSignals {
    pub sigint: bool,
    pub sighup: bool,
    pub sigterm: bool,
}

impl PendingSignals {
    pub fn any(&self) -> bool {
        self.sigint || self.sighup || self.sigterm
    }

    /// Exit code for the highest-priority pending signal: 128 + signo.
    pub fn exit_code(&self) -> Option<i32> {
        if self.sigint {
            Some(128 + libc::SIGINT)
        } else if self.sigterm {
            Some(128 + libc::SIGTERM)
        } else if self.sighup {
            Some(128 + libc::SIGHUP)
        } else {
            None
        }
    }
}

/// Launches pipelines and reports per-stage statuses.
pub trait PipelineExecutor {
    /// Launch the pipeline and return the final-stage exit code. For a
    /// background pipeline, detach and return immediately.
    fn execute(&mut self, commands: &[Command]) -> i32;

    /// Per-stage exit codes of the most recent foreground pipeline.
    fn last_pipeline_statuses(&self) -> Vec<i32>;

    /// Pid of the most recently detached background pipeline, 0 when
    /// none. Feeds `$!`.
    fn last_spawned_pid(&self) -> u32 {
        0
    }
}

/// Runs a command line in a capture context for `$(...)`/backticks.
pub trait CommandExecutor {
    fn run_captured(&mut self, command_line: &str) -> (String, i32);
}

/// The shell's builtin command set, queried before path resolution.
pub trait BuiltinRegistry {
    fn is_builtin(&self, name: &str) -> bool;
    fn execute(&mut self, argv: &[String]) -> i32;
}

/// Queued-signal observation. Polled between statements and loop
/// iterations; never interrupts a statement mid-flight.
pub trait SignalHandler {
    fn has_pending(&self) -> bool;
    fn drain(&mut self) -> PendingSignals;
}

/// Process-wide environment backing store. The interpreter mirrors
/// exported variables here right before children spawn.
pub trait Environment {
    fn get(&self, name: &str) -> Option<String>;
    fn set(&mut self, name: &str, value: &str);
    fn unset(&mut self, name: &str);
    fn exported_list(&self) -> Vec<(String, String)>;
}

/// The collaborator bundle the driver threads through execution.
pub struct Host<'a> {
    pub pipeline: &'a mut dyn PipelineExecutor,
    pub capture: &'a mut dyn CommandExecutor,
    pub builtins: &'a mut dyn BuiltinRegistry,
    pub signals: &'a mut dyn SignalHandler,
    pub environ: &'a mut dyn Environment,
}

// ============================================================================
// Tests
// ============================================================================
