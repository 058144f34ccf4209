//! Script Validation
//!
//! Walks the line list before execution and produces structured
//! diagnostics: unclosed quotes, unbalanced control structures, bad
//! redirections, malformed assignments, arithmetic anomalies, heredoc
//! problems, and style advisories. Only CRITICAL diagnostics refuse
//! execution.

use regex_lite::Regex;

use crate::interpreter::blocks::construct_head;
use crate::interpreter::line_utils::{scan_heredoc_starts, strip_inline_comment};
use crate::parser::quote_info::{split_top_level, unclosed_quote_column, QuoteScanner};
use crate::parser::tokenizer::tokenize;
use crate::validator::types::{Category, Severity, SyntaxError};

lazy_static::lazy_static! {
    static ref SPACED_ASSIGN_RE: Regex =
        Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\s+=(\s|$)").unwrap();
    static ref ASSIGN_PREFIX_RE: Regex = Regex::new(r"^([^\s=]+)=").unwrap();
    static ref VALID_NAME_RE: Regex = Regex::new(r"^[A-Za-z_][A-Za-z0-9_]*$").unwrap();
    static ref ARRAY_ASSIGN_RE: Regex = Regex::new(r"^([A-Za-z_][A-Za-z0-9_]*)\[([^\]]*)\]=").unwrap();
}

/// Validate a block of source lines.
pub fn validate(lines: &[String]) -> Vec<SyntaxError> {
    let mut errors: Vec<SyntaxError> = Vec::new();
    let mut heredocs: Vec<(String, bool, usize)> = Vec::new();
    let mut statements: Vec<Statement> = Vec::new();

    for (idx, raw) in lines.iter().enumerate() {
        let line_no = idx + 1;

        // Heredoc bodies are opaque: only look for the terminator.
        if let Some((delim, strip_tabs, _)) = heredocs.first().cloned() {
            let check = if strip_tabs { raw.trim_start_matches('\t') } else { raw.as_str() };
            if check == delim {
                heredocs.remove(0);
            }
            continue;
        }

        let line = strip_inline_comment(raw);
        if line.trim().is_empty() {
            continue;
        }

        if let Some(col) = unclosed_quote_column(&line) {
            let quote = line.chars().nth(col).unwrap_or('\'');
            errors.push(
                SyntaxError::new(
                    line_no,
                    (col, line.chars().count()),
                    Severity::Critical,
                    Category::Syntax,
                    "SYN001",
                    format!("unclosed {} quote", if quote == '"' { "double" } else { "single" }),
                    raw.clone(),
                )
                .with_suggestion("add the missing closing quote"),
            );
            continue;
        }

        let specs = scan_heredoc_starts(&line);
        if specs.len() > 1 {
            errors.push(SyntaxError::new(
                line_no,
                (0, 0),
                Severity::Warning,
                Category::Redirection,
                "HDOC002",
                "multiple here-documents on one line",
                raw.clone(),
            ));
        }
        for (delim, strip_tabs) in specs {
            heredocs.push((delim, strip_tabs, line_no));
        }

        check_tokens(&line, line_no, raw, &mut errors);
        check_arithmetic(&line, line_no, raw, &mut errors);
        check_parameter_braces(&line, line_no, raw, &mut errors);
        check_style(raw, line_no, &mut errors);

        for stmt in split_top_level(&line, ';') {
            check_assignment(&stmt, line_no, raw, &mut errors);
            statements.push(Statement { text: stmt, line: line_no, content: raw.clone() });
        }
    }

    for (delim, _, line_no) in &heredocs {
        errors.push(
            SyntaxError::new(
                *line_no,
                (0, 0),
                Severity::Error,
                Category::Redirection,
                "HDOC001",
                format!("here-document delimited by `{}' is never terminated", delim),
                lines.get(line_no - 1).cloned().unwrap_or_default(),
            )
            .with_suggestion(format!("add a line containing only `{}'", delim)),
        );
    }

    check_control_flow(&statements, &mut errors);
    errors
}

struct Statement {
    text: String,
    line: usize,
    content: String,
}

// ============================================================================
// Control structure balance
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    If,
    Loop,
    Case,
    Brace,
}

impl BlockKind {
    fn opener(self) -> &'static str {
        match self {
            BlockKind::If => "if",
            BlockKind::Loop => "for/while/until",
            BlockKind::Case => "case",
            BlockKind::Brace => "{",
        }
    }

    fn closer(self) -> &'static str {
        match self {
            BlockKind::If => "fi",
            BlockKind::Loop => "done",
            BlockKind::Case => "esac",
            BlockKind::Brace => "}",
        }
    }
}

fn check_control_flow(statements: &[Statement], errors: &mut Vec<SyntaxError>) {
    let mut stack: Vec<(BlockKind, usize, String)> = Vec::new();
    let mut case_depth = 0usize;

    for (index, stmt) in statements.iter().enumerate() {
        // Case bodies contain `pattern)` headers that confuse statement
        // keyword scanning; skip everything until the matching esac.
        // `case`/`esac` are counted as words because an inline case is a
        // single statement (its `;;` never splits at paren depth != 0).
        if case_depth > 0 {
            let net = case_depth as i32 + count_word(&stmt.text, "case")
                - count_word(&stmt.text, "esac");
            if net <= 0 {
                case_depth = 0;
                stack.pop();
            } else {
                case_depth = net as usize;
            }
            continue;
        }

        let mut rest = stmt.text.trim();
        loop {
            let word = first_word_of(rest);
            match word {
                "if" | "while" | "until" => {
                    let kind = if word == "if" { BlockKind::If } else { BlockKind::Loop };
                    stack.push((kind, stmt.line, stmt.content.clone()));
                    let condition = rest[word.len()..].trim();
                    if condition.is_empty() && next_head_is(statements, index + 1, closer_phase(word)) {
                        errors.push(SyntaxError::new(
                            stmt.line,
                            (0, word.len()),
                            Severity::Error,
                            Category::ControlFlow,
                            "CF004",
                            format!("`{}' has an empty condition", word),
                            stmt.content.clone(),
                        ));
                    }
                    break;
                }
                "for" => {
                    stack.push((BlockKind::Loop, stmt.line, stmt.content.clone()));
                    check_for_header(rest, stmt, errors);
                    break;
                }
                "case" => {
                    let net = count_word(rest, "case") - count_word(rest, "esac");
                    if net > 0 {
                        stack.push((BlockKind::Case, stmt.line, stmt.content.clone()));
                        case_depth = net as usize;
                    }
                    if !has_word(rest, "in") && !next_statement_has_in(statements, index + 1) {
                        errors.push(SyntaxError::new(
                            stmt.line,
                            (0, 4),
                            Severity::Error,
                            Category::ControlFlow,
                            "CF006",
                            "case statement missing `in'",
                            stmt.content.clone(),
                        ));
                    }
                    break;
                }
                "then" | "elif" | "else" => {
                    if !matches!(stack.last(), Some((BlockKind::If, _, _))) {
                        errors.push(orphan_keyword(word, stmt));
                        break;
                    }
                    rest = rest[word.len()..].trim();
                    if word == "elif" || rest.is_empty() {
                        break;
                    }
                }
                "do" => {
                    if !matches!(stack.last(), Some((BlockKind::Loop, _, _))) {
                        errors.push(orphan_keyword(word, stmt));
                        break;
                    }
                    rest = rest[word.len()..].trim();
                    if rest.is_empty() {
                        break;
                    }
                }
                "fi" | "done" | "esac" => {
                    let expected = match word {
                        "fi" => BlockKind::If,
                        "done" => BlockKind::Loop,
                        _ => BlockKind::Case,
                    };
                    match stack.last() {
                        Some((kind, _, _)) if *kind == expected => {
                            stack.pop();
                        }
                        _ => errors.push(orphan_keyword(word, stmt)),
                    }
                    break;
                }
                _ => {
                    // Brace groups and function bodies.
                    let delta = crate::interpreter::functions::brace_delta(rest);
                    match delta.cmp(&0) {
                        std::cmp::Ordering::Greater => {
                            for _ in 0..delta {
                                stack.push((BlockKind::Brace, stmt.line, stmt.content.clone()));
                            }
                        }
                        std::cmp::Ordering::Less => {
                            for _ in 0..(-delta) {
                                match stack.last() {
                                    Some((BlockKind::Brace, _, _)) => {
                                        stack.pop();
                                    }
                                    _ => errors.push(orphan_keyword("}", stmt)),
                                }
                            }
                        }
                        std::cmp::Ordering::Equal => {}
                    }
                    break;
                }
            }
        }
    }

    for (kind, line, content) in stack {
        errors.push(
            SyntaxError::new(
                line,
                (0, content.chars().count()),
                Severity::Critical,
                Category::ControlFlow,
                "SYN002",
                format!("`{}' is never closed with `{}'", kind.opener(), kind.closer()),
                content,
            )
            .with_suggestion(format!("add `{}'", kind.closer()))
            .with_related_info(format!("block opened at line {}", line)),
        );
    }
}

fn orphan_keyword(word: &str, stmt: &Statement) -> SyntaxError {
    SyntaxError::new(
        stmt.line,
        (0, word.chars().count()),
        Severity::Error,
        Category::ControlFlow,
        "CF001",
        format!("`{}' without a matching opener", word),
        stmt.content.clone(),
    )
}

fn check_for_header(rest: &str, stmt: &Statement, errors: &mut Vec<SyntaxError>) {
    let after = rest["for".len()..].trim();
    if after.starts_with("((") {
        return;
    }
    let mut words = after.split_whitespace();
    let name = words.next().unwrap_or("");
    if name.is_empty() {
        errors.push(SyntaxError::new(
            stmt.line,
            (0, 3),
            Severity::Error,
            Category::ControlFlow,
            "CF003",
            "for loop missing variable name",
            stmt.content.clone(),
        ));
        return;
    }
    if !VALID_NAME_RE.is_match(name) {
        errors.push(SyntaxError::new(
            stmt.line,
            (0, stmt.content.chars().count()),
            Severity::Error,
            Category::Variables,
            "VAR003",
            format!("`{}' is not a valid loop variable name", name),
            stmt.content.clone(),
        ));
    }
    if let Some(next) = words.next() {
        if next != "in" {
            errors.push(
                SyntaxError::new(
                    stmt.line,
                    (0, stmt.content.chars().count()),
                    Severity::Error,
                    Category::ControlFlow,
                    "CF003",
                    format!("for loop: expected `in', found `{}'", next),
                    stmt.content.clone(),
                )
                .with_suggestion("write `for name in words; do ...; done'"),
            );
        }
    }
}

fn closer_phase(word: &str) -> &'static str {
    if word == "if" {
        "then"
    } else {
        "do"
    }
}

fn next_head_is(statements: &[Statement], index: usize, head: &str) -> bool {
    statements
        .get(index)
        .map(|s| first_word_of(&s.text) == head)
        .unwrap_or(false)
}

fn next_statement_has_in(statements: &[Statement], index: usize) -> bool {
    statements
        .get(index)
        .map(|s| has_word(&s.text, "in"))
        .unwrap_or(false)
}

fn has_word(text: &str, word: &str) -> bool {
    text.split_whitespace().any(|w| w == word)
}

/// Unquoted word-boundary occurrences of `word` in `text`.
fn count_word(text: &str, word: &str) -> i32 {
    let mut count = 0;
    let mut from = 0;
    while let Some(at) = crate::parser::quote_info::find_unquoted_word(text, word, from) {
        count += 1;
        from = at + word.chars().count();
    }
    count
}

fn first_word_of(text: &str) -> &str {
    text.trim_start().split_whitespace().next().unwrap_or("")
}

// ============================================================================
// Lexical line checks
// ============================================================================

fn check_tokens(line: &str, line_no: usize, raw: &str, errors: &mut Vec<SyntaxError>) {
    // Case section headers and closers are not ordinary command lines.
    if matches!(construct_head(line.trim()), "case" | "esac") {
        return;
    }
    let tokens = match tokenize(line) {
        Ok(tokens) => tokens,
        Err(_) => return,
    };
    if tokens.is_empty() {
        return;
    }

    if let Some(first) = tokens.first() {
        if first.is_operator && matches!(first.value.as_str(), "|" | "||") {
            errors.push(SyntaxError::new(
                line_no,
                (first.column, first.column + first.value.chars().count()),
                Severity::Error,
                Category::Redirection,
                "PIPE001",
                "pipeline starts with `|'",
                raw.to_string(),
            ));
        }
    }
    if let Some(last) = tokens.last() {
        if last.is_operator && matches!(last.value.as_str(), "|" | "||") {
            errors.push(
                SyntaxError::new(
                    line_no,
                    (last.column, last.column + last.value.chars().count()),
                    Severity::Error,
                    Category::Redirection,
                    "PIPE001",
                    "pipeline ends with `|'",
                    raw.to_string(),
                )
                .with_suggestion("remove the trailing pipe or add the next command"),
            );
        }
    }

    for (i, token) in tokens.iter().enumerate() {
        if !token.is_operator {
            continue;
        }
        if crate::parser::command_parser::is_redirection(&token.value) {
            // Dup forms like 2>&1 embed their target.
            let embeds_target = token.value.contains('&')
                && token
                    .value
                    .chars()
                    .last()
                    .map(|c| c.is_ascii_digit() || c == '-')
                    .unwrap_or(false);
            if !embeds_target {
                match tokens.get(i + 1) {
                    Some(next) if !next.is_operator => {}
                    _ => {
                        errors.push(
                            SyntaxError::new(
                                line_no,
                                (token.column, token.column + token.value.chars().count()),
                                Severity::Error,
                                Category::Redirection,
                                "RED001",
                                format!("redirection `{}' is missing its target", token.value),
                                raw.to_string(),
                            )
                            .with_suggestion("add a file name after the operator"),
                        );
                    }
                }
            }
            if let Some(next) = tokens.get(i + 1) {
                if next.is_operator
                    && crate::parser::command_parser::is_redirection(&next.value)
                    && !embeds_target
                {
                    errors.push(SyntaxError::new(
                        line_no,
                        (token.column, next.column + next.value.chars().count()),
                        Severity::Warning,
                        Category::Redirection,
                        "RED005",
                        "consecutive redirection operators",
                        raw.to_string(),
                    ));
                }
            }
        }
    }
}

fn check_arithmetic(line: &str, line_no: usize, raw: &str, errors: &mut Vec<SyntaxError>) {
    let chars: Vec<char> = line.chars().collect();
    let mut i = 0usize;
    while i + 2 < chars.len() {
        if chars[i] == '$' && chars[i + 1] == '(' && chars[i + 2] == '(' {
            let close = find_arith_close(&chars, i + 1);
            match close {
                None => {
                    errors.push(
                        SyntaxError::new(
                            line_no,
                            (i, chars.len()),
                            Severity::Error,
                            Category::Arithmetic,
                            "ARITH001",
                            "unclosed arithmetic expansion `$(('",
                            raw.to_string(),
                        )
                        .with_suggestion("close it with `))'"),
                    );
                    return;
                }
                Some(close) => {
                    let inner: String = chars[i + 3..close - 1].iter().collect();
                    check_arith_body(&inner, i, line_no, raw, errors);
                    i = close + 1;
                    continue;
                }
            }
        }
        i += 1;
    }
}

fn check_arith_body(inner: &str, at: usize, line_no: usize, raw: &str, errors: &mut Vec<SyntaxError>) {
    let trimmed = inner.trim();
    if trimmed.is_empty() {
        errors.push(SyntaxError::new(
            line_no,
            (at, at + 4),
            Severity::Warning,
            Category::Arithmetic,
            "ARITH002",
            "empty arithmetic expression evaluates to 0",
            raw.to_string(),
        ));
        return;
    }
    let mut paren_depth = 0i32;
    for c in trimmed.chars() {
        match c {
            '(' => paren_depth += 1,
            ')' => paren_depth -= 1,
            _ => {}
        }
    }
    if paren_depth != 0 {
        errors.push(SyntaxError::new(
            line_no,
            (at, at + trimmed.chars().count()),
            Severity::Error,
            Category::Arithmetic,
            "ARITH004",
            "unbalanced parentheses in arithmetic expression",
            raw.to_string(),
        ));
    }
    if trimmed.ends_with(['+', '-', '*', '/', '%', '<', '>', '&', '|', '^'])
        && !trimmed.ends_with("++")
        && !trimmed.ends_with("--")
    {
        errors.push(SyntaxError::new(
            line_no,
            (at, at + trimmed.chars().count()),
            Severity::Error,
            Category::Arithmetic,
            "ARITH003",
            "arithmetic expression ends with a binary operator",
            raw.to_string(),
        ));
    }
    let squeezed: String = trimmed.chars().filter(|c| !c.is_whitespace()).collect();
    if squeezed.contains("/0") && !squeezed.contains("/0x") || squeezed.contains("%0") {
        let suspicious = squeezed
            .split(['/', '%'])
            .skip(1)
            .any(|part| part.trim_start_matches('0').is_empty() || part.starts_with("0+") || part == "0");
        if suspicious {
            errors.push(SyntaxError::new(
                line_no,
                (at, at + trimmed.chars().count()),
                Severity::Warning,
                Category::Arithmetic,
                "ARITH005",
                "possible division by zero",
                raw.to_string(),
            ));
        }
    }
}

fn find_arith_close(chars: &[char], open: usize) -> Option<usize> {
    let inner = crate::expansion::command_subst::find_matching_paren(chars, open + 1)?;
    if chars.get(inner + 1) == Some(&')') {
        Some(inner + 1)
    } else {
        None
    }
}

fn check_parameter_braces(line: &str, line_no: usize, raw: &str, errors: &mut Vec<SyntaxError>) {
    let chars: Vec<char> = line.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut i = 0usize;
    while i < chars.len() {
        let in_single = scanner.state().in_single;
        if !in_single && chars[i] == '$' && chars.get(i + 1) == Some(&'{') {
            let mut depth = 0i32;
            let mut closed = false;
            for (j, &c) in chars.iter().enumerate().skip(i + 1) {
                match c {
                    '{' => depth += 1,
                    '}' => {
                        depth -= 1;
                        if depth == 0 {
                            i = j;
                            closed = true;
                            break;
                        }
                    }
                    _ => {}
                }
            }
            if !closed {
                errors.push(
                    SyntaxError::new(
                        line_no,
                        (i, chars.len()),
                        Severity::Error,
                        Category::Variables,
                        "VAR001",
                        "unclosed parameter expansion `${'",
                        raw.to_string(),
                    )
                    .with_suggestion("close it with `}'"),
                );
                return;
            }
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
        i += 1;
    }
}

fn check_assignment(stmt: &str, line_no: usize, raw: &str, errors: &mut Vec<SyntaxError>) {
    let trimmed = stmt.trim();

    if SPACED_ASSIGN_RE.is_match(trimmed) {
        errors.push(
            SyntaxError::new(
                line_no,
                (0, trimmed.chars().count()),
                Severity::Warning,
                Category::Variables,
                "VAR002",
                "whitespace around `=' makes this a command, not an assignment",
                raw.to_string(),
            )
            .with_suggestion("remove the spaces: name=value"),
        );
        return;
    }

    if let Some(caps) = ARRAY_ASSIGN_RE.captures(trimmed) {
        if caps[2].trim().is_empty() {
            errors.push(SyntaxError::new(
                line_no,
                (0, trimmed.chars().count()),
                Severity::Warning,
                Category::Variables,
                "VAR004",
                "empty array index in assignment",
                raw.to_string(),
            ));
        }
        return;
    }

    if let Some(caps) = ASSIGN_PREFIX_RE.captures(trimmed) {
        let name = &caps[1];
        let looks_like_assignment = name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
            && !name.contains('/');
        if looks_like_assignment && !VALID_NAME_RE.is_match(name) {
            errors.push(SyntaxError::new(
                line_no,
                (0, name.chars().count() + 1),
                Severity::Error,
                Category::Variables,
                "VAR003",
                format!("`{}' is not a valid variable name", name),
                raw.to_string(),
            ));
        }
    }
}

fn check_style(raw: &str, line_no: usize, errors: &mut Vec<SyntaxError>) {
    let length = raw.chars().count();
    if length > 120 {
        errors.push(SyntaxError::new(
            line_no,
            (120, length),
            Severity::Info,
            Category::Style,
            "STY001",
            format!("line is {} characters long", length),
            raw.to_string(),
        ));
    }

    let indent: String = raw.chars().take_while(|c| *c == ' ' || *c == '\t').collect();
    if indent.contains(' ') && indent.contains('\t') {
        errors.push(SyntaxError::new(
            line_no,
            (0, indent.chars().count()),
            Severity::Info,
            Category::Style,
            "STY002",
            "indentation mixes tabs and spaces",
            raw.to_string(),
        ));
    }

    if first_word_of(raw) == "eval" {
        errors.push(
            SyntaxError::new(
                line_no,
                (0, 4),
                Severity::Warning,
                Category::Semantics,
                "STY003",
                "`eval' executes arbitrary text",
                raw.to_string(),
            )
            .with_suggestion("prefer direct invocation or parameter expansion"),
        );
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::validator::types::has_critical_errors;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    fn codes(errors: &[SyntaxError]) -> Vec<&'static str> {
        errors.iter().map(|e| e.code).collect()
    }

    #[test]
    fn test_clean_script_validates() {
        let errors = validate(&lines(&[
            "x=1",
            "if [ -n \"$x\" ]; then echo yes; fi",
            "for i in a b; do echo $i; done",
        ]));
        assert!(errors.is_empty(), "unexpected: {:?}", errors);
    }

    #[test]
    fn test_unclosed_quote_is_critical() {
        let errors = validate(&lines(&["echo 'abc"]));
        assert_eq!(codes(&errors), vec!["SYN001"]);
        assert!(has_critical_errors(&errors));
        assert_eq!(errors[0].column_start, 5);
    }

    #[test]
    fn test_unclosed_if_is_critical_at_opening_line() {
        let errors = validate(&lines(&["echo start", "if true; then", "echo body"]));
        assert!(has_critical_errors(&errors));
        let err = errors.iter().find(|e| e.code == "SYN002").unwrap();
        assert_eq!(err.line, 2);
        assert!(err.message.contains("fi"));
    }

    #[test]
    fn test_unbalanced_loop_and_case() {
        let errors = validate(&lines(&["for i in a b; do echo $i"]));
        assert!(errors.iter().any(|e| e.code == "SYN002" && e.message.contains("done")));

        let errors = validate(&lines(&["case x in"]));
        assert!(errors.iter().any(|e| e.code == "SYN002" && e.message.contains("esac")));
    }

    #[test]
    fn test_orphan_closers() {
        let errors = validate(&lines(&["fi"]));
        assert!(errors.iter().any(|e| e.code == "CF001"));
        let errors = validate(&lines(&["done"]));
        assert!(errors.iter().any(|e| e.code == "CF001"));
        let errors = validate(&lines(&["else echo x"]));
        assert!(errors.iter().any(|e| e.code == "CF001"));
    }

    #[test]
    fn test_for_missing_in() {
        let errors = validate(&lines(&["for i a b; do echo $i; done"]));
        assert!(errors.iter().any(|e| e.code == "CF003"));
    }

    #[test]
    fn test_empty_while_condition() {
        let errors = validate(&lines(&["while", "do echo x", "done"]));
        assert!(errors.iter().any(|e| e.code == "CF004"));
    }

    #[test]
    fn test_redirection_missing_target() {
        let errors = validate(&lines(&["echo hi >"]));
        assert!(errors.iter().any(|e| e.code == "RED001"));
        // 2>&1 embeds its target and is fine.
        let errors = validate(&lines(&["cmd 2>&1"]));
        assert!(!errors.iter().any(|e| e.code == "RED001"));
    }

    #[test]
    fn test_stray_pipes() {
        let errors = validate(&lines(&["| grep x"]));
        assert!(errors.iter().any(|e| e.code == "PIPE001"));
        let errors = validate(&lines(&["ls |"]));
        assert!(errors.iter().any(|e| e.code == "PIPE001"));
    }

    #[test]
    fn test_arithmetic_checks() {
        let errors = validate(&lines(&["echo $((1 + 2"]));
        assert!(errors.iter().any(|e| e.code == "ARITH001"));
        let errors = validate(&lines(&["echo $(())"]));
        assert!(errors.iter().any(|e| e.code == "ARITH002"));
        let errors = validate(&lines(&["echo $((1 +))"]));
        assert!(errors.iter().any(|e| e.code == "ARITH003"));
        let errors = validate(&lines(&["echo $((1 / 0))"]));
        assert!(errors.iter().any(|e| e.code == "ARITH005"));
    }

    #[test]
    fn test_unclosed_parameter_expansion() {
        let errors = validate(&lines(&["echo ${name"]));
        assert!(errors.iter().any(|e| e.code == "VAR001"));
    }

    #[test]
    fn test_assignment_checks() {
        let errors = validate(&lines(&["x = 1"]));
        assert!(errors.iter().any(|e| e.code == "VAR002"));
        let errors = validate(&lines(&["1abc=2"]));
        assert!(errors.iter().any(|e| e.code == "VAR003"));
        let errors = validate(&lines(&["arr[]=x"]));
        assert!(errors.iter().any(|e| e.code == "VAR004"));
    }

    #[test]
    fn test_heredoc_unterminated() {
        let errors = validate(&lines(&["cat <<EOF", "body"]));
        assert!(errors.iter().any(|e| e.code == "HDOC001"));
        let errors = validate(&lines(&["cat <<EOF", "body", "EOF"]));
        assert!(!errors.iter().any(|e| e.code == "HDOC001"));
    }

    #[test]
    fn test_style_advisories() {
        let long = "x".repeat(130);
        let errors = validate(&lines(&[long.as_str()]));
        assert!(errors.iter().any(|e| e.code == "STY001" && e.severity == Severity::Info));

        let errors = validate(&lines(&[" \tmixed indent"]));
        assert!(errors.iter().any(|e| e.code == "STY002"));

        let errors = validate(&lines(&["eval \"$cmd\""]));
        assert!(errors.iter().any(|e| e.code == "STY003"));
    }

    #[test]
    fn test_heredoc_body_not_validated() {
        // Quote-looking content inside a heredoc body is fine.
        let errors = validate(&lines(&["cat <<EOF", "it's fine", "EOF"]));
        assert!(!has_critical_errors(&errors), "unexpected: {:?}", errors);
    }

    #[test]
    fn test_nested_blocks_balance() {
        let errors = validate(&lines(&[
            "if a; then",
            "  while b; do",
            "    case $x in",
            "      y) echo y;;",
            "    esac",
            "  done",
            "fi",
        ]));
        assert!(!has_critical_errors(&errors), "unexpected: {:?}", errors);
    }
}
