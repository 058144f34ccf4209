//! Command-Line Tokenizer
//!
//! Splits a raw command line into word tokens, operator tokens, and
//! redirection operators, preserving quote metadata per token. Quote
//! characters stay in the token value; `Token::unquoted_value` strips
//! them when an argv word is needed.
//!
//! Handles:
//! - Whitespace separation outside quotes
//! - Multi-character operators, longest match first
//! - Redirections with a fused fd prefix (`2>&1` is one token)
//! - `$(...)`, `${...}` and `$((...))` regions kept whole inside words
//! - Comments introduced by an unquoted `#` at the start of a word

use crate::parser::types::{ParseException, Token, TokenQuoting, MAX_INPUT_SIZE, MAX_TOKENS};

/// Multi-character operators, checked before single-character ones.
/// Order matters: longest first.
const MULTI_CHAR_OPS: &[&str] = &[
    ";;&", "<<<", "<<-", "&>>", ">>", "<<", "&&", "||", ";;", ";&", "<&", ">&", "<>", ">|", "&>",
];

const SINGLE_CHAR_OPS: &[char] = &['|', '&', ';', '(', ')', '<', '>'];

/// Tokenize a single command line.
///
/// Returns an error for an unclosed quote, pointing at the column of the
/// opening quote character.
pub fn tokenize(line: &str) -> Result<Vec<Token>, ParseException> {
    if line.len() > MAX_INPUT_SIZE {
        return Err(ParseException::new("input too large", 1, 0));
    }

    let chars: Vec<char> = line.chars().collect();
    let mut tokens: Vec<Token> = Vec::new();
    let mut builder = WordBuilder::new();

    let mut in_single = false;
    let mut in_double = false;
    let mut in_backtick = false;
    let mut quote_open_col = 0usize;
    // Nesting depth of $( ... ) and ${ ... } regions inside the current word.
    let mut subst_paren = 0i32;
    let mut subst_brace = 0i32;

    let mut i = 0usize;
    while i < chars.len() {
        let c = chars[i];

        if in_single {
            builder.push(c, i);
            if c == '\'' {
                in_single = false;
            } else {
                builder.mark_single();
            }
            i += 1;
            continue;
        }

        if c == '\\' && !in_single {
            // Escape: keep the backslash and the escaped character in the
            // raw value; in double quotes only a few characters are special
            // but preserving both is always correct for the raw form.
            builder.push(c, i);
            if i + 1 < chars.len() {
                builder.push(chars[i + 1], i + 1);
                if in_double {
                    builder.mark_double();
                } else {
                    builder.mark_plain();
                }
                i += 2;
                continue;
            }
            builder.mark_plain();
            i += 1;
            continue;
        }

        if in_double {
            builder.push(c, i);
            match c {
                '"' => in_double = false,
                '`' => in_backtick = !in_backtick,
                _ => builder.mark_double(),
            }
            i += 1;
            continue;
        }

        if in_backtick {
            builder.push(c, i);
            if c == '`' {
                in_backtick = false;
            }
            i += 1;
            continue;
        }

        // Inside $( ... ) or ${ ... }: consume as word content, tracking
        // nesting so operators and whitespace in there do not split.
        if subst_paren > 0 || subst_brace > 0 {
            builder.push(c, i);
            match c {
                '\'' => {
                    in_single = true;
                    quote_open_col = i;
                }
                '"' => {
                    in_double = true;
                    quote_open_col = i;
                }
                '`' => {
                    in_backtick = true;
                    quote_open_col = i;
                }
                '(' => subst_paren += 1,
                ')' if subst_paren > 0 => subst_paren -= 1,
                '{' if subst_brace > 0 => subst_brace += 1,
                '}' if subst_brace > 0 => subst_brace -= 1,
                _ => {}
            }
            i += 1;
            continue;
        }

        match c {
            '\'' => {
                in_single = true;
                quote_open_col = i;
                builder.push(c, i);
                builder.mark_single();
                i += 1;
            }
            '"' => {
                in_double = true;
                quote_open_col = i;
                builder.push(c, i);
                builder.mark_double();
                i += 1;
            }
            '`' => {
                in_backtick = true;
                quote_open_col = i;
                builder.push(c, i);
                builder.mark_plain();
                i += 1;
            }
            '$' if matches!(chars.get(i + 1), Some('(')) => {
                builder.push('$', i);
                builder.push('(', i + 1);
                builder.mark_plain();
                subst_paren += 1;
                i += 2;
            }
            '$' if matches!(chars.get(i + 1), Some('{')) => {
                builder.push('$', i);
                builder.push('{', i + 1);
                builder.mark_plain();
                subst_brace += 1;
                i += 2;
            }
            '#' if builder.is_empty() => {
                // Comment: an unquoted # at the start of a word eats the
                // rest of the line.
                break;
            }
            c if c.is_whitespace() => {
                builder.flush(&mut tokens);
                i += 1;
            }
            c if SINGLE_CHAR_OPS.contains(&c) => {
                let op = match_operator(&chars, i);
                let (mut value, col) = if fuse_fd_prefix(&builder, &op) {
                    let col = builder.start_col.unwrap_or(i);
                    let prefix = builder.take_raw();
                    (format!("{}{}", prefix, op), col)
                } else {
                    builder.flush(&mut tokens);
                    (op.clone(), i)
                };
                let mut consumed = op.len();
                // Merge a directly adjacent dup target: 2>&1, >&2, <&0, >&-.
                if value.ends_with(">&") || value.ends_with("<&") {
                    let mut j = i + op.len();
                    let mut target = String::new();
                    while let Some(&d) = chars.get(j) {
                        if d.is_ascii_digit() || (target.is_empty() && d == '-') {
                            target.push(d);
                            if d == '-' {
                                j += 1;
                                break;
                            }
                            j += 1;
                        } else {
                            break;
                        }
                    }
                    if !target.is_empty() {
                        value.push_str(&target);
                        consumed += target.len();
                    }
                }
                tokens.push(Token::operator(value, col));
                i += consumed;
            }
            _ => {
                builder.push(c, i);
                builder.mark_plain();
                i += 1;
            }
        }

        if tokens.len() > MAX_TOKENS {
            return Err(ParseException::new("too many tokens", 1, i));
        }
    }

    if in_single {
        return Err(ParseException::new("unclosed single quote", 1, quote_open_col));
    }
    if in_double {
        return Err(ParseException::new("unclosed double quote", 1, quote_open_col));
    }
    if in_backtick {
        return Err(ParseException::new("unclosed backtick", 1, quote_open_col));
    }

    builder.flush(&mut tokens);
    Ok(tokens)
}

/// Match the longest operator starting at `start`.
fn match_operator(chars: &[char], start: usize) -> String {
    let rest: String = chars[start..].iter().take(3).collect();
    for op in MULTI_CHAR_OPS {
        if rest.starts_with(op) {
            return (*op).to_string();
        }
    }
    chars[start].to_string()
}

/// If the pending word is a pure digit sequence directly adjacent to a
/// redirection operator, it is an fd prefix and fuses into the
/// redirection token (`2>`, `13<`). Returns true when fusing applies.
fn fuse_fd_prefix(builder: &WordBuilder, op: &str) -> bool {
    let is_redir = op.starts_with('<') || op.starts_with('>');
    is_redir && builder.is_plain_digits()
}

/// Accumulates one word token, tracking which quoting contexts
/// contributed characters.
struct WordBuilder {
    raw: String,
    start_col: Option<usize>,
    has_single: bool,
    has_double: bool,
    has_plain: bool,
}

impl WordBuilder {
    fn new() -> Self {
        Self { raw: String::new(), start_col: None, has_single: false, has_double: false, has_plain: false }
    }

    fn push(&mut self, c: char, col: usize) {
        if self.start_col.is_none() {
            self.start_col = Some(col);
        }
        self.raw.push(c);
    }

    fn mark_single(&mut self) {
        self.has_single = true;
    }

    fn mark_double(&mut self) {
        self.has_double = true;
    }

    fn mark_plain(&mut self) {
        self.has_plain = true;
    }

    fn is_empty(&self) -> bool {
        self.raw.is_empty()
    }

    fn is_plain_digits(&self) -> bool {
        !self.raw.is_empty()
            && !self.has_single
            && !self.has_double
            && self.raw.chars().all(|c| c.is_ascii_digit())
    }

    fn take_raw(&mut self) -> String {
        let raw = std::mem::take(&mut self.raw);
        self.start_col = None;
        self.has_single = false;
        self.has_double = false;
        self.has_plain = false;
        raw
    }

    fn quoting(&self) -> TokenQuoting {
        match (self.has_single, self.has_double, self.has_plain) {
            (true, false, false) => TokenQuoting::Single,
            (false, true, false) => TokenQuoting::Double,
            (false, false, _) => TokenQuoting::Unquoted,
            _ => TokenQuoting::Mixed,
        }
    }

    fn flush(&mut self, tokens: &mut Vec<Token>) {
        if self.raw.is_empty() {
            return;
        }
        let quoting = self.quoting();
        let col = self.start_col.unwrap_or(0);
        let raw = self.take_raw();
        tokens.push(Token::word(raw, quoting, col));
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn values(tokens: &[Token]) -> Vec<String> {
        tokens.iter().map(|t| t.value.clone()).collect()
    }

    #[test]
    fn test_simple_words() {
        let tokens = tokenize("echo hello world").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "hello", "world"]);
        assert!(tokens.iter().all(|t| !t.is_operator));
    }

    #[test]
    fn test_quoted_words_keep_quotes() {
        let tokens = tokenize("echo 'a b' \"c d\"").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "'a b'", "\"c d\""]);
        assert_eq!(tokens[1].quoting, TokenQuoting::Single);
        assert_eq!(tokens[2].quoting, TokenQuoting::Double);
        assert_eq!(tokens[1].unquoted_value(), "a b");
    }

    #[test]
    fn test_mixed_quoting() {
        let tokens = tokenize("echo a'b c'd").unwrap();
        assert_eq!(tokens[1].quoting, TokenQuoting::Mixed);
        assert_eq!(tokens[1].unquoted_value(), "ab cd");
    }

    #[test]
    fn test_operators() {
        let tokens = tokenize("a | b && c || d ; e & f").unwrap();
        let ops: Vec<&str> = tokens.iter().filter(|t| t.is_operator).map(|t| t.value.as_str()).collect();
        assert_eq!(ops, vec!["|", "&&", "||", ";", "&"]);
    }

    #[test]
    fn test_redirections_merge_fd_prefix() {
        let tokens = tokenize("cmd 2>&1 >out 2>err").unwrap();
        assert_eq!(values(&tokens), vec!["cmd", "2>&1", ">", "out", "2>", "err"]);
        assert!(tokens[1].is_operator);
        assert!(tokens[4].is_operator);
    }

    #[test]
    fn test_heredoc_and_herestring_operators() {
        let tokens = tokenize("cat <<EOF").unwrap();
        assert_eq!(values(&tokens), vec!["cat", "<<", "EOF"]);
        let tokens = tokenize("cat <<< word").unwrap();
        assert_eq!(values(&tokens), vec!["cat", "<<<", "word"]);
        let tokens = tokenize("cat <<-EOF").unwrap();
        assert_eq!(values(&tokens), vec!["cat", "<<-", "EOF"]);
    }

    #[test]
    fn test_command_substitution_is_one_word() {
        let tokens = tokenize("echo $(ls | wc -l) done").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "$(ls | wc -l)", "done"]);
    }

    #[test]
    fn test_nested_command_substitution() {
        let tokens = tokenize("echo $(echo $(echo hi))").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "$(echo $(echo hi))"]);
    }

    #[test]
    fn test_parameter_expansion_with_spaces() {
        let tokens = tokenize("echo ${x:- default}").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "${x:- default}"]);
    }

    #[test]
    fn test_arithmetic_expansion_is_one_word() {
        let tokens = tokenize("echo $((1 + 2))").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "$((1 + 2))"]);
    }

    #[test]
    fn test_comment_stripped() {
        let tokens = tokenize("echo hi # a comment").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "hi"]);
        // # inside a word is not a comment
        let tokens = tokenize("echo a#b").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "a#b"]);
    }

    #[test]
    fn test_unclosed_quote_error_column() {
        let err = tokenize("echo 'abc").unwrap_err();
        assert_eq!(err.column, 5);
        let err = tokenize("echo \"abc").unwrap_err();
        assert_eq!(err.column, 5);
    }

    #[test]
    fn test_escaped_space_joins_word() {
        let tokens = tokenize("echo a\\ b").unwrap();
        assert_eq!(values(&tokens), vec!["echo", "a\\ b"]);
        assert_eq!(tokens[1].unquoted_value(), "a b");
    }

    #[test]
    fn test_round_trip_retokenization() {
        // Property: joining token values with spaces and retokenizing
        // yields the same token sequence.
        for line in [
            "echo 'a b' c",
            "a && b || c",
            "cmd 2>&1 | tee log",
            "echo $(date) ${x:-y} $((1+2))",
        ] {
            let tokens = tokenize(line).unwrap();
            let joined = tokens.iter().map(|t| t.value.clone()).collect::<Vec<_>>().join(" ");
            let again = tokenize(&joined).unwrap();
            assert_eq!(values(&tokens), values(&again), "round trip failed for {line}");
        }
    }
}
