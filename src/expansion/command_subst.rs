//! Command Substitution
//!
//! Scans input for `$(...)`, backticks, `$((...))` and `${...}`,
//! delegating execution of command substitutions to an injected executor
//! that returns `(stdout, exit_code)`. Arithmetic and parameter
//! expansions are left in place for the later evaluator passes, which
//! need the variable manager in scope.
//!
//! Substituted output is carried in a structured fragment list rather
//! than in-band marker bytes: each fragment records whether later passes
//! may expand it and whether field splitting may cut it. The markers can
//! therefore never leak into diagnostics or the executor.

/// How a fragment participates in later expansion passes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FragmentKind {
    /// Original input text: later passes expand variables in it and the
    /// field splitter honors its quoting.
    Plain,
    /// Output of a substitution inside double quotes: no re-expansion,
    /// no field splitting.
    SubstQuoted,
    /// Output of an unquoted substitution: no re-expansion, but field
    /// splitting applies.
    SubstUnquoted,
    /// Forced field boundary, honored even inside quotes. Emitted
    /// between the positionals of a quoted `$@` expansion.
    FieldBreak,
}

/// One piece of partially-expanded text.
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    pub text: String,
    pub kind: FragmentKind,
}

impl Fragment {
    pub fn plain(text: impl Into<String>) -> Self {
        Self { text: text.into(), kind: FragmentKind::Plain }
    }

    pub fn field_break() -> Self {
        Self { text: String::new(), kind: FragmentKind::FieldBreak }
    }
}

/// Result of one substitution pass over a string.
#[derive(Debug, Clone, Default)]
pub struct SubstitutionResult {
    pub fragments: Vec<Fragment>,
    /// Exit code of each substitution executed, in order. The last entry
    /// becomes the "last substitution status".
    pub exit_codes: Vec<i32>,
}

impl SubstitutionResult {
    /// Join all fragment text. Only for contexts that no longer care
    /// about expansion boundaries (diagnostics, heredoc bodies).
    pub fn flatten(&self) -> String {
        self.fragments.iter().map(|f| f.text.as_str()).collect()
    }

    pub fn last_exit_code(&self) -> Option<i32> {
        self.exit_codes.last().copied()
    }

    fn push_plain(&mut self, text: &mut String) {
        if !text.is_empty() {
            self.fragments.push(Fragment::plain(std::mem::take(text)));
        }
    }
}

/// Executor callback: run a command line in a capture context, returning
/// its stdout and exit code.
pub type SubstExecutor<'a> = &'a mut dyn FnMut(&str) -> (String, i32);

/// Expand command substitutions in `input`.
///
/// `$(cmd)` and `` `cmd` `` run through the executor with trailing
/// newlines stripped from the captured output. `$((expr))` and `${...}`
/// pass through untouched inside plain fragments. Single-quoted regions
/// are never scanned.
pub fn expand_substitutions(input: &str, executor: SubstExecutor<'_>) -> SubstitutionResult {
    let chars: Vec<char> = input.chars().collect();
    let mut result = SubstitutionResult::default();
    let mut plain = String::new();
    let mut in_single = false;
    let mut in_double = false;
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
            '$' if !in_single && matches!(chars.get(i + 1), Some('(')) => {
                // $(( ... )) is arithmetic: leave it for the arithmetic pass.
                if chars.get(i + 2) == Some(&'(') {
                    if let Some(end) = find_arith_close(&chars, i + 1) {
                        plain.extend(&chars[i..=end]);
                        i = end + 1;
                        continue;
                    }
                }
                match find_matching_paren(&chars, i + 1) {
                    Some(close) => {
                        let command: String = chars[i + 2..close].iter().collect();
                        run_substitution(&command, executor, in_double, &mut plain, &mut result);
                        i = close + 1;
                    }
                    None => {
                        // Unterminated $( — validator reports it; keep literal.
                        plain.push(c);
                        i += 1;
                    }
                }
            }
            '`' if !in_single => {
                match find_closing_backtick(&chars, i + 1) {
                    Some(close) => {
                        let raw: String = chars[i + 1..close].iter().collect();
                        let command = raw.replace("\\`", "`");
                        run_substitution(&command, executor, in_double, &mut plain, &mut result);
                        i = close + 1;
                    }
                    None => {
                        plain.push(c);
                        i += 1;
                    }
                }
            }
            '$' if !in_single && matches!(chars.get(i + 1), Some('{')) => {
                // Parameter expansion: resolved later, copy it whole.
                match find_matching_brace(&chars, i + 1) {
                    Some(close) => {
                        plain.extend(&chars[i..=close]);
                        i = close + 1;
                    }
                    None => {
                        plain.push(c);
                        i += 1;
                    }
                }
            }
            _ => {
                plain.push(c);
                i += 1;
            }
        }
    }

    result.push_plain(&mut plain);
    result
}

fn run_substitution(
    command: &str,
    executor: SubstExecutor<'_>,
    in_double: bool,
    plain: &mut String,
    result: &mut SubstitutionResult,
) {
    result.push_plain(plain);
    let (stdout, exit_code) = executor(command);
    let trimmed = stdout.trim_end_matches('\n').to_string();
    result.exit_codes.push(exit_code);
    result.fragments.push(Fragment {
        text: trimmed,
        kind: if in_double { FragmentKind::SubstQuoted } else { FragmentKind::SubstUnquoted },
    });
}

/// Find the `)` matching `chars[open] == '('`, honoring quotes and
/// nesting inside the substitution body.
pub fn find_matching_paren(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && !in_single {
            i += 2;
            continue;
        }
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '(' if !in_single && !in_double => depth += 1,
            ')' if !in_single && !in_double => {
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

fn find_matching_brace(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0i32;
    let mut in_single = false;
    let mut in_double = false;
    let mut i = open;
    while i < chars.len() {
        let c = chars[i];
        if c == '\\' && !in_single {
            i += 2;
            continue;
        }
        match c {
            '\'' if !in_double => in_single = !in_single,
            '"' if !in_single => in_double = !in_double,
            '{' if !in_single => depth += 1,
            '}' if !in_single => {
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

/// For `$((`: find the closing `))`. Falls back to None when the parens
/// do not close as a pair, which makes the caller re-treat the text as a
/// command substitution.
fn find_arith_close(chars: &[char], open: usize) -> Option<usize> {
    let inner_close = find_matching_paren(chars, open + 1)?;
    if chars.get(inner_close + 1) == Some(&')') {
        Some(inner_close + 1)
    } else {
        None
    }
}

fn find_closing_backtick(chars: &[char], from: usize) -> Option<usize> {
    let mut i = from;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '`' => return Some(i),
            _ => i += 1,
        }
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn run(input: &str) -> (SubstitutionResult, Vec<String>) {
        let mut seen = Vec::new();
        let mut exec = |cmd: &str| {
            seen.push(cmd.to_string());
            (format!("<{}>\n", cmd), 0)
        };
        let result = expand_substitutions(input, &mut exec);
        (result, seen)
    }

    #[test]
    fn test_no_substitution_passthrough() {
        let (result, seen) = run("echo hello");
        assert!(seen.is_empty());
        assert_eq!(result.flatten(), "echo hello");
        assert_eq!(result.fragments.len(), 1);
        assert_eq!(result.fragments[0].kind, FragmentKind::Plain);
    }

    #[test]
    fn test_dollar_paren() {
        let (result, seen) = run("echo $(date)");
        assert_eq!(seen, vec!["date"]);
        assert_eq!(result.flatten(), "echo <date>");
        assert_eq!(result.fragments[1].kind, FragmentKind::SubstUnquoted);
    }

    #[test]
    fn test_backticks() {
        let (result, seen) = run("echo `uname`");
        assert_eq!(seen, vec!["uname"]);
        assert_eq!(result.flatten(), "echo <uname>");
    }

    #[test]
    fn test_quoted_substitution_kind() {
        let (result, _) = run("echo \"$(date)\"");
        let subst = result
            .fragments
            .iter()
            .find(|f| f.kind != FragmentKind::Plain)
            .unwrap();
        assert_eq!(subst.kind, FragmentKind::SubstQuoted);
    }

    #[test]
    fn test_single_quotes_suppress() {
        let (result, seen) = run("echo '$(date)'");
        assert!(seen.is_empty());
        assert_eq!(result.flatten(), "echo '$(date)'");
    }

    #[test]
    fn test_nested_substitution_outer_only() {
        let (_, seen) = run("echo $(echo $(inner))");
        // Only the outer substitution runs here; the executor re-enters
        // for the inner one in real use.
        assert_eq!(seen, vec!["echo $(inner)"]);
    }

    #[test]
    fn test_arithmetic_left_alone() {
        let (result, seen) = run("echo $((1 + 2))");
        assert!(seen.is_empty());
        assert_eq!(result.flatten(), "echo $((1 + 2))");
    }

    #[test]
    fn test_parameter_expansion_left_alone() {
        let (result, seen) = run("echo ${x:-$(pwd)}");
        assert!(seen.is_empty());
        assert_eq!(result.flatten(), "echo ${x:-$(pwd)}");
    }

    #[test]
    fn test_trailing_newlines_stripped() {
        let mut exec = |_: &str| ("out\n\n\n".to_string(), 0);
        let result = expand_substitutions("$(cmd)", &mut exec);
        assert_eq!(result.flatten(), "out");
    }

    #[test]
    fn test_exit_codes_recorded() {
        let mut codes = vec![3, 7].into_iter();
        let mut exec = |_: &str| (String::new(), codes.next().unwrap());
        let result = expand_substitutions("$(a) $(b)", &mut exec);
        assert_eq!(result.exit_codes, vec![3, 7]);
        assert_eq!(result.last_exit_code(), Some(7));
    }

    #[test]
    fn test_escaped_dollar_not_substituted() {
        let (result, seen) = run("echo \\$(date)");
        assert!(seen.is_empty());
        assert_eq!(result.flatten(), "echo \\$(date)");
    }

    #[test]
    fn test_paren_matching_with_quotes() {
        let (_, seen) = run("echo $(echo ')')");
        assert_eq!(seen, vec!["echo ')'"]);
    }
}
