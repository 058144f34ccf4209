//! System Host
//!
//! Best-effort std::process implementations of the collaborator traits,
//! used by the `cjsh-script` binary: pipelines wired through OS pipes,
//! basic file redirections, heredoc/here-string stdin, signal flags via
//! libc handlers, and the process environment as the backing store. The
//! interpreter core itself never depends on this module.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::process::{Child, Command as OsCommand, Stdio};
use std::sync::atomic::{AtomicBool, Ordering};

use crate::host::{
    BuiltinRegistry, CommandExecutor, Environment, Host, PendingSignals, PipelineExecutor,
    SignalHandler,
};
use crate::interpreter::Interpreter;
use crate::parser::command_parser::{Command, RedirOp};

static SIGINT_SEEN: AtomicBool = AtomicBool::new(false);
static SIGHUP_SEEN: AtomicBool = AtomicBool::new(false);
static SIGTERM_SEEN: AtomicBool = AtomicBool::new(false);

extern "C" fn note_signal(signo: libc::c_int) {
    match signo {
        libc::SIGINT => SIGINT_SEEN.store(true, Ordering::SeqCst),
        libc::SIGHUP => SIGHUP_SEEN.store(true, Ordering::SeqCst),
        libc::SIGTERM => SIGTERM_SEEN.store(true, Ordering::SeqCst),
        _ => {}
    }
}

/// Install the flag-setting handlers. Idempotent.
pub fn install_signal_handlers() {
    let handler = note_signal as extern "C" fn(libc::c_int) as libc::sighandler_t;
    unsafe {
        libc::signal(libc::SIGINT, handler);
        libc::signal(libc::SIGHUP, handler);
        libc::signal(libc::SIGTERM, handler);
    }
}

/// The full collaborator set for running against the real OS.
pub struct SystemHost {
    pipeline: SystemPipeline,
    capture: SystemCapture,
    builtins: NoBuiltins,
    signals: FlagSignals,
    environ: ProcessEnv,
}

impl SystemHost {
    pub fn new() -> Self {
        install_signal_handlers();
        Self {
            pipeline: SystemPipeline::new(false),
            capture: SystemCapture,
            builtins: NoBuiltins,
            signals: FlagSignals,
            environ: ProcessEnv,
        }
    }

    fn capture_mode() -> Self {
        let mut host = Self::new();
        host.pipeline = SystemPipeline::new(true);
        host
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
}

impl Default for SystemHost {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Pipeline executor
// ============================================================================

struct SystemPipeline {
    capture_output: bool,
    captured: String,
    last_statuses: Vec<i32>,
    last_pid: u32,
}

impl SystemPipeline {
    fn new(capture_output: bool) -> Self {
        Self {
            capture_output,
            captured: String::new(),
            last_statuses: Vec::new(),
            last_pid: 0,
        }
    }

    fn take_captured(&mut self) -> String {
        std::mem::take(&mut self.captured)
    }
}

impl PipelineExecutor for SystemPipeline {
    fn execute(&mut self, commands: &[Command]) -> i32 {
        let background = commands.iter().any(|c| c.background);
        let mut children: Vec<Child> = Vec::new();
        let mut spawn_codes: Vec<Option<i32>> = Vec::new();
        let mut previous_stdout: Option<std::process::ChildStdout> = None;

        for (index, cmd) in commands.iter().enumerate() {
            if cmd.argv.is_empty() {
                // Redirection-only command: create/truncate targets.
                for redir in &cmd.redirections {
                    if matches!(redir.op, RedirOp::Out | RedirOp::Both) {
                        let _ = File::create(&redir.target);
                    }
                }
                spawn_codes.push(Some(0));
                continue;
            }

            let is_last = index == commands.len() - 1;
            let mut os = OsCommand::new(&cmd.argv[0]);
            os.args(&cmd.argv[1..]);

            // stdin: previous stage, heredoc/here-string, or inherit.
            let wants_stdin_data = cmd.heredoc_body.is_some() || cmd.here_string.is_some();
            if let Some(prev) = previous_stdout.take() {
                os.stdin(Stdio::from(prev));
            } else if wants_stdin_data {
                os.stdin(Stdio::piped());
            }

            // stdout: next stage, capture, or a file redirection.
            let mut stdout_set = false;
            for redir in &cmd.redirections {
                match redir.op {
                    RedirOp::In => {
                        if let Ok(file) = File::open(&redir.target) {
                            os.stdin(Stdio::from(file));
                        }
                    }
                    RedirOp::Out | RedirOp::Both => {
                        if let Ok(file) = File::create(&redir.target) {
                            os.stdout(Stdio::from(file));
                            stdout_set = true;
                        }
                    }
                    RedirOp::Append | RedirOp::BothAppend => {
                        if let Ok(file) =
                            OpenOptions::new().create(true).append(true).open(&redir.target)
                        {
                            os.stdout(Stdio::from(file));
                            stdout_set = true;
                        }
                    }
                    RedirOp::Err => {
                        if let Ok(file) = File::create(&redir.target) {
                            os.stderr(Stdio::from(file));
                        }
                    }
                    RedirOp::ErrToOut => {
                        // Approximated after spawn setup below.
                    }
                    _ => {}
                }
            }
            if !stdout_set && (!is_last || self.capture_output) {
                os.stdout(Stdio::piped());
            }

            match os.spawn() {
                Ok(mut child) => {
                    if let Some(body) = cmd.heredoc_body.as_deref().or(cmd.here_string.as_deref()) {
                        if let Some(stdin) = child.stdin.take() {
                            let mut stdin = stdin;
                            let _ = stdin.write_all(body.as_bytes());
                            if cmd.here_string.is_some() {
                                let _ = stdin.write_all(b"\n");
                            }
                        }
                    }
                    if !is_last {
                        previous_stdout = child.stdout.take();
                    }
                    spawn_codes.push(None);
                    children.push(child);
                }
                Err(err) => {
                    let code = match err.kind() {
                        std::io::ErrorKind::NotFound => 127,
                        std::io::ErrorKind::PermissionDenied => 126,
                        _ => 1,
                    };
                    spawn_codes.push(Some(code));
                    previous_stdout = None;
                }
            }
        }

        if background {
            if let Some(child) = children.last() {
                self.last_pid = child.id();
            }
            // Detach: the children keep running; we do not wait.
            std::mem::forget(children);
            return 0;
        }

        // Collect statuses in stage order.
        let mut statuses = Vec::with_capacity(spawn_codes.len());
        let mut waited = children.into_iter();
        for code in spawn_codes {
            match code {
                Some(code) => statuses.push(code),
                None => {
                    let mut child = match waited.next() {
                        Some(child) => child,
                        None => {
                            statuses.push(1);
                            continue;
                        }
                    };
                    if self.capture_output || child.stdout.is_some() {
                        if let Some(mut out) = child.stdout.take() {
                            let mut buf = String::new();
                            let _ = out.read_to_string(&mut buf);
                            if self.capture_output {
                                self.captured.push_str(&buf);
                            } else {
                                print!("{}", buf);
                                let _ = std::io::stdout().flush();
                            }
                        }
                    }
                    let status = child.wait();
                    statuses.push(exit_code_of(status));
                }
            }
        }

        let final_code = statuses.last().copied().unwrap_or(0);
        self.last_statuses = statuses;
        final_code
    }

    fn last_pipeline_statuses(&self) -> Vec<i32> {
        self.last_statuses.clone()
    }

    fn last_spawned_pid(&self) -> u32 {
        self.last_pid
    }
}

fn exit_code_of(status: std::io::Result<std::process::ExitStatus>) -> i32 {
    match status {
        Ok(status) => {
            if let Some(code) = status.code() {
                code
            } else {
                #[cfg(unix)]
                {
                    use std::os::unix::process::ExitStatusExt;
                    status.signal().map(|s| 128 + s).unwrap_or(1)
                }
                #[cfg(not(unix))]
                {
                    1
                }
            }
        }
        Err(_) => 1,
    }
}

// ============================================================================
// Capture executor: nested interpreter with a capturing pipeline
// ============================================================================

struct SystemCapture;

impl CommandExecutor for SystemCapture {
    fn run_captured(&mut self, command_line: &str) -> (String, i32) {
        let mut host = SystemHost::capture_mode();
        let inner = host.host();
        let mut interp = Interpreter::new(inner);
        let code = interp.execute_script(command_line);
        drop(interp);
        (host.pipeline.take_captured(), code)
    }
}

// ============================================================================
// Builtins, signals, environment
// ============================================================================

/// The binary ships without an internal builtin set; everything resolves
/// through PATH.
struct NoBuiltins;

impl BuiltinRegistry for NoBuiltins {
    fn is_builtin(&self, _name: &str) -> bool {
        false
    }

    fn execute(&mut self, _argv: &[String]) -> i32 {
        127
    }
}

struct FlagSignals;

impl SignalHandler for FlagSignals {
    fn has_pending(&self) -> bool {
        SIGINT_SEEN.load(Ordering::SeqCst)
            || SIGHUP_SEEN.load(Ordering::SeqCst)
            || SIGTERM_SEEN.load(Ordering::SeqCst)
    }

    fn drain(&mut self) -> PendingSignals {
        PendingSignals {
            sigint: SIGINT_SEEN.swap(false, Ordering::SeqCst),
            sighup: SIGHUP_SEEN.swap(false, Ordering::SeqCst),
            sigterm: SIGTERM_SEEN.swap(false, Ordering::SeqCst),
        }
    }
}

struct ProcessEnv;

impl Environment for ProcessEnv {
    fn get(&self, name: &str) -> Option<String> {
        std::env::var(name).ok()
    }

    fn set(&mut self, name: &str, value: &str) {
        // Special parameters are interpreter-side bookkeeping; the OS
        // environment rejects their names anyway.
        if name.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') && !name.is_empty() {
            std::env::set_var(name, value);
        }
    }

    fn unset(&mut self, name: &str) {
        std::env::remove_var(name);
    }

    fn exported_list(&self) -> Vec<(String, String)> {
        std::env::vars().collect()
    }
}
