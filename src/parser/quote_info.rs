//! Quote and Escape Tracking
//!
//! Shared primitive used by every structural scanner in the interpreter.
//! Walks a byte string tracking single quotes, double quotes, backticks,
//! backslash escapes, and nested `$(` / `${` / `$((` contexts, so that
//! token boundaries, semicolon splits, pipe detection, and keyword
//! detection only fire on positions that are "effective" (not quoted,
//! not escaped).

/// Quote state at a single position in a string.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct QuoteState {
    pub in_single: bool,
    pub in_double: bool,
    pub in_backtick: bool,
    /// True when the current character is escaped by a preceding backslash.
    pub escape_active: bool,
}

impl QuoteState {
    /// A position is effective when structural characters at it should be
    /// honored: not inside any quote and not escaped.
    pub fn is_effective(&self) -> bool {
        !self.in_single && !self.in_double && !self.in_backtick && !self.escape_active
    }
}

/// Incremental quote scanner. Feed characters in order with `advance`;
/// `state()` reports the quoting context of the *next* character.
#[derive(Debug, Clone, Default)]
pub struct QuoteScanner {
    in_single: bool,
    in_double: bool,
    in_backtick: bool,
    escape_next: bool,
}

impl QuoteScanner {
    pub fn new() -> Self {
        Self::default()
    }

    /// Quote state that applies to the character about to be scanned.
    pub fn state(&self) -> QuoteState {
        QuoteState {
            in_single: self.in_single,
            in_double: self.in_double,
            in_backtick: self.in_backtick,
            escape_active: self.escape_next,
        }
    }

    /// Consume one character, updating the state machine.
    ///
    /// Backslash inside single quotes is literal. Inside double quotes it
    /// escapes only `$`, `` ` ``, `"`, `\` and newline; before any other
    /// character both the backslash and the character stand.
    pub fn advance(&mut self, c: char, next: Option<char>) {
        if self.escape_next {
            self.escape_next = false;
            return;
        }
        match c {
            '\\' if !self.in_single => {
                if self.in_double {
                    // Only a handful of characters are escapable in double quotes.
                    if matches!(next, Some('$') | Some('`') | Some('"') | Some('\\') | Some('\n')) {
                        self.escape_next = true;
                    }
                } else {
                    self.escape_next = true;
                }
            }
            '\'' if !self.in_double && !self.in_backtick => {
                self.in_single = !self.in_single;
            }
            '"' if !self.in_single => {
                self.in_double = !self.in_double;
            }
            '`' if !self.in_single => {
                self.in_backtick = !self.in_backtick;
            }
            _ => {}
        }
    }

    /// True while any quote context is open.
    pub fn in_quotes(&self) -> bool {
        self.in_single || self.in_double || self.in_backtick
    }

    pub fn in_single(&self) -> bool {
        self.in_single
    }

    pub fn in_double(&self) -> bool {
        self.in_double
    }
}

/// Compute the quote state at `position` by scanning from the start of
/// `text`. The contract from the interpreter's point of view: given
/// `(text, position)`, return `(in_single, in_double, in_backtick,
/// escape_active)` for the character at that position.
pub fn quote_state_at(text: &str, position: usize) -> QuoteState {
    let mut scanner = QuoteScanner::new();
    let chars: Vec<char> = text.chars().collect();
    for i in 0..position.min(chars.len()) {
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    scanner.state()
}

/// True when the full text leaves a quote context open.
pub fn has_unclosed_quote(text: &str) -> bool {
    let chars: Vec<char> = text.chars().collect();
    let mut scanner = QuoteScanner::new();
    for i in 0..chars.len() {
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    scanner.in_quotes()
}

/// Column of the first quote character that is never closed, if any.
pub fn unclosed_quote_column(text: &str) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut open_column: Option<usize> = None;
    for i in 0..chars.len() {
        let before = scanner.in_quotes();
        let effective = scanner.state().is_effective();
        scanner.advance(chars[i], chars.get(i + 1).copied());
        let after = scanner.in_quotes();
        if !before && after && effective {
            open_column = Some(i);
        } else if before && !after {
            open_column = None;
        }
    }
    if scanner.in_quotes() {
        open_column
    } else {
        None
    }
}

/// Find the first occurrence of `needle` at an effective (unquoted,
/// unescaped) position at or after `from`. Returns a char index.
pub fn find_unquoted(text: &str, needle: char, from: usize) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let mut scanner = QuoteScanner::new();
    for i in 0..chars.len() {
        if i >= from && chars[i] == needle && scanner.state().is_effective() {
            return Some(i);
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    None
}

/// Split `text` on a separator character at effective positions, also
/// skipping separators inside `(...)` and `{...}` nesting. Empty pieces
/// are dropped after trimming.
pub fn split_top_level(text: &str, separator: char) -> Vec<String> {
    let chars: Vec<char> = text.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut paren_depth = 0i32;
    let mut brace_depth = 0i32;
    let mut pieces = Vec::new();
    let mut current = String::new();

    for i in 0..chars.len() {
        let c = chars[i];
        let effective = scanner.state().is_effective();
        if effective {
            match c {
                '(' => paren_depth += 1,
                ')' => paren_depth -= 1,
                '{' => brace_depth += 1,
                '}' => brace_depth -= 1,
                _ => {}
            }
        }
        if c == separator && effective && paren_depth == 0 && brace_depth == 0 {
            let piece = current.trim().to_string();
            if !piece.is_empty() {
                pieces.push(piece);
            }
            current = String::new();
        } else {
            current.push(c);
        }
        scanner.advance(c, chars.get(i + 1).copied());
    }
    let piece = current.trim().to_string();
    if !piece.is_empty() {
        pieces.push(piece);
    }
    pieces
}

/// Check whether `word` appears in `text` as a standalone word (bounded by
/// whitespace, `;`, `(`, `)`, `&`, `|` or the string edges) at an effective
/// position.
pub fn contains_unquoted_word(text: &str, word: &str) -> bool {
    find_unquoted_word(text, word, 0).is_some()
}

/// Find a standalone occurrence of `word` at an effective position at or
/// after `from`. Returns the char index of the first character.
pub fn find_unquoted_word(text: &str, word: &str, from: usize) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    let word_chars: Vec<char> = word.chars().collect();
    if word_chars.is_empty() {
        return None;
    }
    let mut scanner = QuoteScanner::new();
    let mut i = 0usize;
    let mut result = None;
    while i < chars.len() {
        let effective = scanner.state().is_effective();
        if result.is_none()
            && i >= from
            && effective
            && chars[i..].starts_with(&word_chars[..])
            && is_word_boundary(chars.get(i.wrapping_sub(1)).copied(), i == 0)
            && is_word_boundary(chars.get(i + word_chars.len()).copied(), true)
        {
            result = Some(i);
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
        i += 1;
    }
    result
}

fn is_word_boundary(c: Option<char>, edge_ok: bool) -> bool {
    match c {
        None => edge_ok,
        Some(c) => c.is_whitespace() || matches!(c, ';' | '(' | ')' | '&' | '|' | '\n'),
    }
}

/// Find the `)` matching the `(` at `open_index` (a char index), honoring
/// quotes and nested parentheses. Returns the char index of the match.
pub fn find_matching_paren(text: &str, open_index: usize) -> Option<usize> {
    find_matching_delimiter(text, open_index, '(', ')')
}

/// Find the `}` matching the `{` at `open_index`.
pub fn find_matching_brace(text: &str, open_index: usize) -> Option<usize> {
    find_matching_delimiter(text, open_index, '{', '}')
}

fn find_matching_delimiter(text: &str, open_index: usize, open: char, close: char) -> Option<usize> {
    let chars: Vec<char> = text.chars().collect();
    if chars.get(open_index) != Some(&open) {
        return None;
    }
    let mut scanner = QuoteScanner::new();
    let mut depth = 0i32;
    for i in 0..chars.len() {
        let effective = scanner.state().is_effective();
        if i >= open_index && effective {
            if chars[i] == open {
                depth += 1;
            } else if chars[i] == close {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    None
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_text_is_effective() {
        let state = quote_state_at("echo hello", 5);
        assert!(state.is_effective());
    }

    #[test]
    fn test_single_quote_state() {
        let state = quote_state_at("echo 'a b' c", 7);
        assert!(state.in_single);
        assert!(!state.in_double);
    }

    #[test]
    fn test_double_quote_state() {
        let state = quote_state_at("echo \"a b\" c", 7);
        assert!(state.in_double);
    }

    #[test]
    fn test_backslash_escape() {
        let state = quote_state_at("echo a\\;b", 7);
        assert!(state.escape_active);
    }

    #[test]
    fn test_backslash_literal_in_single_quotes() {
        // Inside single quotes a backslash does not escape anything.
        let state = quote_state_at("echo '\\;'", 8);
        assert!(state.in_single);
        assert!(!state.escape_active);
    }

    #[test]
    fn test_backslash_in_double_quotes_selective() {
        // \$ escapes inside double quotes...
        let state = quote_state_at("\"\\$x\"", 2);
        assert!(state.escape_active);
        // ...but \a does not.
        let state = quote_state_at("\"\\ax\"", 2);
        assert!(!state.escape_active);
    }

    #[test]
    fn test_unclosed_quote_detection() {
        assert!(has_unclosed_quote("echo 'abc"));
        assert!(has_unclosed_quote("echo \"abc"));
        assert!(!has_unclosed_quote("echo 'abc'"));
        assert_eq!(unclosed_quote_column("echo 'abc"), Some(5));
        assert_eq!(unclosed_quote_column("echo abc"), None);
    }

    #[test]
    fn test_find_unquoted() {
        assert_eq!(find_unquoted("a;b", ';', 0), Some(1));
        assert_eq!(find_unquoted("'a;b';c", ';', 0), Some(5));
        assert_eq!(find_unquoted("a\\;b", ';', 0), None);
    }

    #[test]
    fn test_split_top_level_semicolons() {
        assert_eq!(split_top_level("a; b ;c", ';'), vec!["a", "b", "c"]);
        assert_eq!(split_top_level("echo 'x;y'; z", ';'), vec!["echo 'x;y'", "z"]);
        assert_eq!(split_top_level("(a;b); c", ';'), vec!["(a;b)", "c"]);
    }

    #[test]
    fn test_contains_unquoted_word() {
        assert!(contains_unquoted_word("if true; then", "then"));
        assert!(!contains_unquoted_word("echo 'then'", "then"));
        assert!(!contains_unquoted_word("echo thence", "then"));
    }

    #[test]
    fn test_find_matching_paren() {
        assert_eq!(find_matching_paren("(a (b) c)", 0), Some(8));
        assert_eq!(find_matching_paren("(a ')' b)", 0), Some(8));
        assert_eq!(find_matching_paren("(abc", 0), None);
    }
}
