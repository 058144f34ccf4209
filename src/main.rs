use clap::Parser;
use std::io::Read;

use cjsh_core::host::system::SystemHost;
use cjsh_core::interpreter::{parse_into_lines, Interpreter};
use cjsh_core::validator::{has_critical_errors, print_error_report, validate};

#[derive(Parser)]
#[command(name = "cjsh-script")]
#[command(about = "Run or validate cjsh shell scripts")]
#[command(version)]
struct Cli {
    /// Execute the script from a command line argument
    #[arg(short = 'c')]
    script: Option<String>,

    /// Exit immediately if a command exits with non-zero status
    #[arg(short = 'e', long = "errexit")]
    errexit: bool,

    /// Print source lines to stderr as they are read
    #[arg(short = 'v', long = "verbose")]
    verbose: bool,

    /// Validate only: report diagnostics without executing
    #[arg(long = "validate")]
    validate_only: bool,

    /// Output diagnostics (with --validate) or the exit code as JSON
    #[arg(long = "json")]
    json: bool,

    /// Script file to execute
    #[arg()]
    script_file: Option<String>,
}

fn main() {
    let cli = Cli::parse();

    // Script source: -c, file, or stdin.
    let script = if let Some(s) = cli.script {
        s
    } else if let Some(ref file) = cli.script_file {
        match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(err) => {
                eprintln!("cjsh-script: cannot read {}: {}", file, err);
                std::process::exit(1);
            }
        }
    } else {
        use std::io::IsTerminal;
        if std::io::stdin().is_terminal() {
            eprintln!("cjsh-script: no script given; use -c 'script', a file, or pipe via stdin");
            std::process::exit(2);
        }
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf).unwrap_or_default();
        buf
    };

    let lines = parse_into_lines(&script);

    if cli.validate_only {
        let errors = validate(&lines);
        if cli.json {
            println!("{}", serde_json::to_string_pretty(&errors).unwrap_or_else(|_| "[]".into()));
        } else if errors.is_empty() {
            println!("ok: no issues found");
        } else {
            print_error_report(&errors, true, true);
        }
        std::process::exit(if has_critical_errors(&errors) { 2 } else { 0 });
    }

    let mut system = SystemHost::new();
    let mut interp = Interpreter::new(system.host());
    interp.state.options.errexit = cli.errexit;
    interp.state.options.verbose = cli.verbose;
    if let Some(file) = &cli.script_file {
        let _ = interp.state.variables.set("0", file.clone());
    }

    let code = interp.execute_block(&lines, false);

    if cli.json {
        println!("{}", serde_json::json!({ "exitCode": code }));
    }
    std::process::exit(code);
}
