//! Parameter Expansion
//!
//! Evaluates the text between `${` and the matching `}`: defaults,
//! assignment, error and alternate forms, prefix/suffix pattern trims,
//! substitution, case conversion, substring, length, and indirect
//! expansion. Variable access goes through an injected [`ParamContext`];
//! pattern matching uses the shared glob matcher.
//!
//! Words on the right-hand side of an operator (e.g. the default in
//! `${x:-$y}`) are returned as-is; the interpreter's later variable
//! substitution pass resolves references inside them.

use thiserror::Error;

use crate::expansion::pattern::{is_literal_pattern, matches_pattern};

/// Variable access for parameter expansion. Implemented by the
/// interpreter over its variable manager.
pub trait ParamContext {
    fn get(&mut self, name: &str) -> String;
    fn set(&mut self, name: &str, value: &str) -> Result<(), ExpansionError>;
    fn is_set(&mut self, name: &str) -> bool;

    /// Evaluate an arithmetic index or offset expression. The default
    /// accepts plain integer literals only; the interpreter overrides
    /// this with the full arithmetic evaluator.
    fn eval_arith(&mut self, expr: &str) -> Option<i64> {
        expr.trim().parse::<i64>().ok()
    }
}

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ExpansionError {
    /// `${x:?message}` with x unset or empty.
    #[error("{name}: {message}")]
    RequiredParameter { name: String, message: String },
    #[error("{0}: readonly variable")]
    ReadonlyVariable(String),
    #[error("{0}: bad substitution")]
    BadSubstitution(String),
}

/// Expand a `${...}` body (braces already stripped).
pub fn expand_parameter(ctx: &mut dyn ParamContext, param_expr: &str) -> Result<String, ExpansionError> {
    if param_expr.is_empty() {
        return Err(ExpansionError::BadSubstitution(String::new()));
    }

    // ${#}: positional count; ${#name}: length of value.
    if let Some(rest) = param_expr.strip_prefix('#') {
        if rest.is_empty() {
            return Ok(ctx.get("#"));
        }
        let name = resolve_name(ctx, rest)?;
        if !name_remainder(rest, &name).is_empty() {
            return Err(ExpansionError::BadSubstitution(param_expr.to_string()));
        }
        return Ok(ctx.get(&name).chars().count().to_string());
    }

    // ${!name}: indirect lookup.
    if let Some(rest) = param_expr.strip_prefix('!') {
        let name = resolve_name(ctx, rest)?;
        if !name_remainder(rest, &name).is_empty() {
            return Err(ExpansionError::BadSubstitution(param_expr.to_string()));
        }
        let target = ctx.get(&name);
        if target.is_empty() {
            return Ok(String::new());
        }
        return Ok(ctx.get(&target));
    }

    let name = resolve_name(ctx, param_expr)?;
    let rest = name_remainder(param_expr, &name);
    if rest.is_empty() {
        return Ok(ctx.get(&name));
    }

    let (op, word) = split_operator(&rest)
        .ok_or_else(|| ExpansionError::BadSubstitution(param_expr.to_string()))?;

    let value = ctx.get(&name);
    let set = ctx.is_set(&name);
    let empty = value.is_empty();

    match op {
        Operator::DefaultIfUnsetOrEmpty => {
            if !set || empty {
                Ok(word)
            } else {
                Ok(value)
            }
        }
        Operator::DefaultIfUnset => {
            if !set {
                Ok(word)
            } else {
                Ok(value)
            }
        }
        Operator::AssignIfUnsetOrEmpty => {
            if !set || empty {
                ctx.set(&name, &word)?;
                Ok(word)
            } else {
                Ok(value)
            }
        }
        Operator::AssignIfUnset => {
            if !set {
                ctx.set(&name, &word)?;
                Ok(word)
            } else {
                Ok(value)
            }
        }
        Operator::ErrorIfUnsetOrEmpty => {
            if !set || empty {
                Err(required_error(&name, &word))
            } else {
                Ok(value)
            }
        }
        Operator::ErrorIfUnset => {
            if !set {
                Err(required_error(&name, &word))
            } else {
                Ok(value)
            }
        }
        Operator::AltIfSetNonEmpty => {
            if set && !empty {
                Ok(word)
            } else {
                Ok(String::new())
            }
        }
        Operator::AltIfSet => {
            if set {
                Ok(word)
            } else {
                Ok(String::new())
            }
        }
        Operator::TrimPrefixShortest => Ok(trim_prefix(&value, &word, false)),
        Operator::TrimPrefixLongest => Ok(trim_prefix(&value, &word, true)),
        Operator::TrimSuffixShortest => Ok(trim_suffix(&value, &word, false)),
        Operator::TrimSuffixLongest => Ok(trim_suffix(&value, &word, true)),
        Operator::SubstituteFirst => Ok(substitute(&value, &word, false)),
        Operator::SubstituteAll => Ok(substitute(&value, &word, true)),
        Operator::UppercaseFirst => Ok(case_convert(&value, &word, true, false)),
        Operator::UppercaseAll => Ok(case_convert(&value, &word, true, true)),
        Operator::LowercaseFirst => Ok(case_convert(&value, &word, false, false)),
        Operator::LowercaseAll => Ok(case_convert(&value, &word, false, true)),
        Operator::Substring => substring(ctx, &name, &value, &word),
    }
}

fn required_error(name: &str, word: &str) -> ExpansionError {
    let message = if word.is_empty() {
        "parameter null or not set".to_string()
    } else {
        word.to_string()
    };
    ExpansionError::RequiredParameter { name: name.to_string(), message }
}

// ============================================================================
// Name parsing
// ============================================================================

/// Extract the parameter name at the start of the expression: an
/// identifier, a digit sequence (positional), or a single special
/// character. `name[index]` array references are resolved to the flat
/// `name_N` key the variable store uses.
fn resolve_name(ctx: &mut dyn ParamContext, expr: &str) -> Result<String, ExpansionError> {
    let chars: Vec<char> = expr.chars().collect();
    let first = *chars.first().ok_or_else(|| ExpansionError::BadSubstitution(expr.to_string()))?;

    let mut end;
    if first.is_ascii_alphabetic() || first == '_' {
        end = 1;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
    } else if first.is_ascii_digit() {
        end = 1;
        while end < chars.len() && chars[end].is_ascii_digit() {
            end += 1;
        }
        return Ok(chars[..end].iter().collect());
    } else if matches!(first, '?' | '$' | '#' | '*' | '@' | '!' | '-') {
        return Ok(first.to_string());
    } else {
        return Err(ExpansionError::BadSubstitution(expr.to_string()));
    }

    let base: String = chars[..end].iter().collect();
    // Array reference: name[expr]
    if chars.get(end) == Some(&'[') {
        if let Some(close) = find_index_close(&chars, end) {
            let index_expr: String = chars[end + 1..close].iter().collect();
            let index = ctx
                .eval_arith(&index_expr)
                .ok_or_else(|| ExpansionError::BadSubstitution(expr.to_string()))?;
            return Ok(format!("{}_{}", base, index));
        }
        return Err(ExpansionError::BadSubstitution(expr.to_string()));
    }
    Ok(base)
}

fn find_index_close(chars: &[char], open: usize) -> Option<usize> {
    let mut depth = 0;
    for (i, &c) in chars.iter().enumerate().skip(open) {
        match c {
            '[' => depth += 1,
            ']' => {
                depth -= 1;
                if depth == 0 {
                    return Some(i);
                }
            }
            _ => {}
        }
    }
    None
}

/// Remainder of the expression after the (possibly array-indexed) name.
fn name_remainder(expr: &str, resolved: &str) -> String {
    // resolved may be a flattened array key; recompute the consumed span.
    let chars: Vec<char> = expr.chars().collect();
    let first = chars[0];
    let mut end;
    if first.is_ascii_alphabetic() || first == '_' {
        end = 1;
        while end < chars.len() && (chars[end].is_ascii_alphanumeric() || chars[end] == '_') {
            end += 1;
        }
        if chars.get(end) == Some(&'[') {
            if let Some(close) = find_index_close(&chars, end) {
                end = close + 1;
            }
        }
    } else if first.is_ascii_digit() {
        end = resolved.len();
    } else {
        end = 1;
    }
    chars[end..].iter().collect()
}

// ============================================================================
// Operator dispatch
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operator {
    DefaultIfUnsetOrEmpty,
    DefaultIfUnset,
    AssignIfUnsetOrEmpty,
    AssignIfUnset,
    ErrorIfUnsetOrEmpty,
    ErrorIfUnset,
    AltIfSetNonEmpty,
    AltIfSet,
    TrimPrefixShortest,
    TrimPrefixLongest,
    TrimSuffixShortest,
    TrimSuffixLongest,
    SubstituteFirst,
    SubstituteAll,
    UppercaseFirst,
    UppercaseAll,
    LowercaseFirst,
    LowercaseAll,
    Substring,
}

/// Split the operator from its word. Two-character forms are checked
/// before their one-character prefixes.
fn split_operator(rest: &str) -> Option<(Operator, String)> {
    let table: &[(&str, Operator)] = &[
        (":-", Operator::DefaultIfUnsetOrEmpty),
        (":=", Operator::AssignIfUnsetOrEmpty),
        (":?", Operator::ErrorIfUnsetOrEmpty),
        (":+", Operator::AltIfSetNonEmpty),
        ("##", Operator::TrimPrefixLongest),
        ("%%", Operator::TrimSuffixLongest),
        ("//", Operator::SubstituteAll),
        ("^^", Operator::UppercaseAll),
        (",,", Operator::LowercaseAll),
        ("-", Operator::DefaultIfUnset),
        ("=", Operator::AssignIfUnset),
        ("?", Operator::ErrorIfUnset),
        ("+", Operator::AltIfSet),
        ("#", Operator::TrimPrefixShortest),
        ("%", Operator::TrimSuffixShortest),
        ("/", Operator::SubstituteFirst),
        ("^", Operator::UppercaseFirst),
        (",", Operator::LowercaseFirst),
    ];
    for (prefix, op) in table {
        if let Some(word) = rest.strip_prefix(prefix) {
            return Some((*op, word.to_string()));
        }
    }
    // A bare colon not followed by an operator char introduces a
    // substring expression: ${name:offset[:length]}.
    rest.strip_prefix(':')
        .map(|word| (Operator::Substring, word.to_string()))
}

// ============================================================================
// Pattern trims
// ============================================================================

/// Remove the shortest or longest matching prefix. Iterates split points
/// left to right; the shortest variant returns on first match, the
/// longest keeps the last successful split.
fn trim_prefix(value: &str, pattern: &str, longest: bool) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut best: Option<usize> = None;
    for i in 0..=chars.len() {
        let prefix: String = chars[..i].iter().collect();
        if matches_pattern(&prefix, pattern) {
            best = Some(i);
            if !longest {
                break;
            }
        }
    }
    match best {
        Some(i) => chars[i..].iter().collect(),
        None => value.to_string(),
    }
}

/// Remove the shortest or longest matching suffix.
fn trim_suffix(value: &str, pattern: &str, longest: bool) -> String {
    let chars: Vec<char> = value.chars().collect();
    let mut best: Option<usize> = None;
    for i in (0..=chars.len()).rev() {
        let suffix: String = chars[i..].iter().collect();
        if matches_pattern(&suffix, pattern) {
            best = Some(i);
            if !longest {
                break;
            }
        }
    }
    match best {
        Some(i) => chars[..i].iter().collect(),
        None => value.to_string(),
    }
}

// ============================================================================
// Substitution
// ============================================================================

/// `${name/pat/rep}` and `${name//pat/rep}`. The expression is the text
/// after the first `/`: `pat/rep`, where the separator is the first
/// unescaped `/`. Literal patterns use plain substring search; glob
/// patterns match the longest candidate at each position.
fn substitute(value: &str, expr: &str, global: bool) -> String {
    let (pattern, replacement) = split_substitution(expr);
    if pattern.is_empty() {
        return value.to_string();
    }

    if is_literal_pattern(&pattern) {
        let needle = unescape_pattern(&pattern);
        if global {
            return value.replace(&needle, &replacement);
        }
        return value.replacen(&needle, &replacement, 1);
    }

    let chars: Vec<char> = value.chars().collect();
    let mut out = String::new();
    let mut i = 0usize;
    while i < chars.len() {
        let mut matched_end: Option<usize> = None;
        // Longest match at this position.
        for j in (i + 1..=chars.len()).rev() {
            let candidate: String = chars[i..j].iter().collect();
            if matches_pattern(&candidate, &pattern) {
                matched_end = Some(j);
                break;
            }
        }
        if let Some(j) = matched_end {
            out.push_str(&replacement);
            i = j;
            if !global {
                out.extend(&chars[i..]);
                return out;
            }
        } else {
            out.push(chars[i]);
            i += 1;
        }
    }
    out
}

fn split_substitution(expr: &str) -> (String, String) {
    let chars: Vec<char> = expr.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        match chars[i] {
            '\\' => i += 2,
            '/' => {
                return (
                    chars[..i].iter().collect(),
                    chars[i + 1..].iter().collect(),
                );
            }
            _ => i += 1,
        }
    }
    (expr.to_string(), String::new())
}

fn unescape_pattern(pattern: &str) -> String {
    let mut out = String::with_capacity(pattern.len());
    let mut chars = pattern.chars();
    while let Some(c) = chars.next() {
        if c == '\\' {
            if let Some(n) = chars.next() {
                out.push(n);
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Case conversion
// ============================================================================

/// `${name^pat}`, `${name^^pat}`, `${name,pat}`, `${name,,pat}`. An empty
/// pattern matches any character.
fn case_convert(value: &str, pattern: &str, uppercase: bool, all_chars: bool) -> String {
    let pat = if pattern.is_empty() { "?" } else { pattern };
    let mut out = String::with_capacity(value.len());
    let mut converted_one = false;
    for (i, c) in value.chars().enumerate() {
        let applies = if all_chars { true } else { i == 0 && !converted_one };
        if applies && matches_pattern(&c.to_string(), pat) {
            converted_one = true;
            if uppercase {
                out.extend(c.to_uppercase());
            } else {
                out.extend(c.to_lowercase());
            }
        } else {
            out.push(c);
        }
    }
    out
}

// ============================================================================
// Substring
// ============================================================================

/// `${name:offset}` and `${name:offset:length}`. Offsets may be
/// arithmetic; a negative offset counts back from the end, a negative
/// length marks an end-relative stop.
fn substring(
    ctx: &mut dyn ParamContext,
    name: &str,
    value: &str,
    expr: &str,
) -> Result<String, ExpansionError> {
    let (offset_expr, length_expr) = match expr.find(':') {
        Some(pos) => (&expr[..pos], Some(&expr[pos + 1..])),
        None => (expr, None),
    };
    let offset = eval_offset(ctx, offset_expr)
        .ok_or_else(|| ExpansionError::BadSubstitution(format!("{}:{}", name, expr)))?;
    let chars: Vec<char> = value.chars().collect();
    let len = chars.len() as i64;

    let start = if offset < 0 { (len + offset).max(0) } else { offset.min(len) };
    let end = match length_expr {
        None => len,
        Some(expr) => {
            let length = eval_offset(ctx, expr)
                .ok_or_else(|| ExpansionError::BadSubstitution(format!("{}:{}", name, expr)))?;
            if length < 0 {
                (len + length).max(start)
            } else {
                (start + length).min(len)
            }
        }
    };
    Ok(chars[start as usize..end.max(start) as usize].iter().collect())
}

fn eval_offset(ctx: &mut dyn ParamContext, expr: &str) -> Option<i64> {
    let trimmed = expr.trim();
    // Accept a wrapped arithmetic expansion left in place for us.
    let inner = trimmed
        .strip_prefix("$((")
        .and_then(|s| s.strip_suffix("))"))
        .unwrap_or(trimmed);
    ctx.eval_arith(inner)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    struct MapParams {
        vars: HashMap<String, String>,
        readonly: Vec<String>,
    }

    impl MapParams {
        fn new(vars: &[(&str, &str)]) -> Self {
            Self {
                vars: vars.iter().map(|(k, v)| (k.to_string(), v.to_string())).collect(),
                readonly: Vec::new(),
            }
        }
    }

    impl ParamContext for MapParams {
        fn get(&mut self, name: &str) -> String {
            self.vars.get(name).cloned().unwrap_or_default()
        }

        fn set(&mut self, name: &str, value: &str) -> Result<(), ExpansionError> {
            if self.readonly.iter().any(|r| r == name) {
                return Err(ExpansionError::ReadonlyVariable(name.to_string()));
            }
            self.vars.insert(name.to_string(), value.to_string());
            Ok(())
        }

        fn is_set(&mut self, name: &str) -> bool {
            self.vars.contains_key(name)
        }

        fn eval_arith(&mut self, expr: &str) -> Option<i64> {
            let t = expr.trim();
            if let Some((a, b)) = t.split_once('+') {
                return Some(a.trim().parse::<i64>().ok()? + b.trim().parse::<i64>().ok()?);
            }
            t.parse::<i64>().ok()
        }
    }

    fn expand(expr: &str, vars: &[(&str, &str)]) -> String {
        let mut ctx = MapParams::new(vars);
        expand_parameter(&mut ctx, expr).unwrap()
    }

    #[test]
    fn test_plain_lookup() {
        assert_eq!(expand("x", &[("x", "hello")]), "hello");
        assert_eq!(expand("x", &[]), "");
    }

    #[test]
    fn test_length() {
        assert_eq!(expand("#x", &[("x", "hello")]), "5");
        assert_eq!(expand("#x", &[]), "0");
    }

    #[test]
    fn test_default_forms() {
        assert_eq!(expand("x:-fallback", &[]), "fallback");
        assert_eq!(expand("x:-fallback", &[("x", "")]), "fallback");
        assert_eq!(expand("x:-fallback", &[("x", "v")]), "v");
        assert_eq!(expand("x-fallback", &[("x", "")]), "");
        assert_eq!(expand("x-fallback", &[]), "fallback");
    }

    #[test]
    fn test_assign_forms() {
        let mut ctx = MapParams::new(&[]);
        assert_eq!(expand_parameter(&mut ctx, "x:=new").unwrap(), "new");
        assert_eq!(ctx.vars["x"], "new");
        // Already set: value wins, no write.
        assert_eq!(expand_parameter(&mut ctx, "x:=other").unwrap(), "new");
        assert_eq!(ctx.vars["x"], "new");
    }

    #[test]
    fn test_assign_respects_readonly() {
        let mut ctx = MapParams::new(&[]);
        ctx.readonly.push("x".to_string());
        assert_eq!(
            expand_parameter(&mut ctx, "x:=v"),
            Err(ExpansionError::ReadonlyVariable("x".to_string()))
        );
    }

    #[test]
    fn test_error_forms() {
        let mut ctx = MapParams::new(&[]);
        let err = expand_parameter(&mut ctx, "x:?custom message").unwrap_err();
        assert_eq!(
            err,
            ExpansionError::RequiredParameter {
                name: "x".to_string(),
                message: "custom message".to_string()
            }
        );
        let err = expand_parameter(&mut ctx, "x:?").unwrap_err();
        assert!(matches!(err, ExpansionError::RequiredParameter { .. }));
        assert_eq!(expand("x:?boom", &[("x", "ok")]), "ok");
    }

    #[test]
    fn test_alt_forms() {
        assert_eq!(expand("x:+alt", &[("x", "v")]), "alt");
        assert_eq!(expand("x:+alt", &[("x", "")]), "");
        assert_eq!(expand("x:+alt", &[]), "");
        assert_eq!(expand("x+alt", &[("x", "")]), "alt");
        assert_eq!(expand("x+alt", &[]), "");
    }

    #[test]
    fn test_prefix_trim() {
        let vars = &[("path", "/usr/local/bin")];
        assert_eq!(expand("path#*/", vars), "usr/local/bin");
        assert_eq!(expand("path##*/", vars), "bin");
        // No match leaves the value alone.
        assert_eq!(expand("path#xyz", vars), "/usr/local/bin");
    }

    #[test]
    fn test_suffix_trim() {
        let vars = &[("file", "archive.tar.gz")];
        assert_eq!(expand("file%.*", vars), "archive.tar");
        assert_eq!(expand("file%%.*", vars), "archive");
    }

    #[test]
    fn test_longest_trim_idempotent() {
        let mut ctx = MapParams::new(&[("p", "/usr/local/bin")]);
        let once = expand_parameter(&mut ctx, "p##*/").unwrap();
        ctx.vars.insert("q".to_string(), once.clone());
        let twice = expand_parameter(&mut ctx, "q##*/").unwrap();
        assert_eq!(once, twice);
    }

    #[test]
    fn test_substitution() {
        let vars = &[("s", "aXbXc")];
        assert_eq!(expand("s/X/-", vars), "a-bXc");
        assert_eq!(expand("s//X/-", vars), "a-b-c");
        // Glob pattern replacement.
        assert_eq!(expand("s/X?/-", vars), "a-Xc");
        // Deleting form: no replacement text.
        assert_eq!(expand("s//X", vars), "abc");
    }

    #[test]
    fn test_case_conversion() {
        let vars = &[("w", "hello world")];
        assert_eq!(expand("w^", vars), "Hello world");
        assert_eq!(expand("w^^", vars), "HELLO WORLD");
        assert_eq!(expand("w^^[ho]", vars), "Hello wOrld");
        let vars = &[("w", "HELLO")];
        assert_eq!(expand("w,", vars), "hELLO");
        assert_eq!(expand("w,,", vars), "hello");
    }

    #[test]
    fn test_substring() {
        let vars = &[("s", "abcdef")];
        assert_eq!(expand("s:2", vars), "cdef");
        assert_eq!(expand("s:2:3", vars), "cde");
        // A negative offset needs the space: ${s:-2} is the default form.
        assert_eq!(expand("s: -2", vars), "ef");
        assert_eq!(expand("s:-2", vars), "abcdef");
        assert_eq!(expand("s:1:-1", vars), "bcde");
        assert_eq!(expand("s:10", vars), "");
    }

    #[test]
    fn test_indirect() {
        let vars = &[("ref", "target"), ("target", "value")];
        assert_eq!(expand("!ref", vars), "value");
        assert_eq!(expand("!missing", vars), "");
    }

    #[test]
    fn test_array_index() {
        let vars = &[("arr_0", "zero"), ("arr_2", "two")];
        assert_eq!(expand("arr[0]", vars), "zero");
        assert_eq!(expand("arr[2]", vars), "two");
        // Index expressions go through the arithmetic hook.
        assert_eq!(expand("arr[1+1]", vars), "two");
    }

    #[test]
    fn test_positional_and_special_names() {
        let vars = &[("1", "first"), ("?", "0"), ("12", "twelfth")];
        assert_eq!(expand("1", vars), "first");
        assert_eq!(expand("?", vars), "0");
        assert_eq!(expand("12", vars), "twelfth");
    }

    #[test]
    fn test_bad_substitution() {
        let mut ctx = MapParams::new(&[]);
        assert!(matches!(
            expand_parameter(&mut ctx, ""),
            Err(ExpansionError::BadSubstitution(_))
        ));
        assert!(matches!(
            expand_parameter(&mut ctx, "x~y"),
            Err(ExpansionError::BadSubstitution(_))
        ));
    }
}
