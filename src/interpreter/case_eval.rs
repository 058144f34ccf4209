//! Case Statement Evaluation
//!
//! `case WORD in PATTERN) CMDS ;; ... esac`. The body is collected
//! honoring nested `case` statements, split into sections at top-level
//! `;;`, and the first section whose (expanded, quote-stripped) pattern
//! matches the expanded word runs. No fall-through; no match exits 0.

use crate::expansion::pattern::matches_pattern;
use crate::interpreter::control::Control;
use crate::interpreter::errors::InterpreterError;
use crate::interpreter::interpreter::Interpreter;
use crate::interpreter::line_utils::parse_into_lines;
use crate::parser::quote_info::{find_unquoted_word, QuoteScanner};

impl Interpreter<'_> {
    /// Execute the `case` construct starting at `lines[*idx]`.
    pub(crate) fn execute_case(
        &mut self,
        lines: &[String],
        idx: &mut usize,
    ) -> Result<Control, InterpreterError> {
        let (text, trailing, next) = collect_case_text(lines, *idx)?;
        *idx = next;

        let parsed = parse_case_text(&text)?;
        let value = self.expand_text_for_value(&parsed.word, true)?;

        let mut outcome = Control::Code(0);
        for section in &parsed.sections {
            let pattern = self.expand_text_for_value(&section.pattern, true)?;
            if matches_pattern(&value, &pattern) {
                let statements = parse_into_lines(&section.commands);
                outcome = self.run_statements(&statements)?;
                break;
            }
        }

        if let Control::Code(code) = outcome {
            self.state.last_exit_code = code;
            if !trailing.trim().is_empty() {
                return self.run_logical_text(&trailing);
            }
        }
        Ok(outcome)
    }
}

struct ParsedCase {
    word: String,
    sections: Vec<CaseSection>,
}

struct CaseSection {
    pattern: String,
    commands: String,
}

/// Gather the raw text of the construct up to the matching `esac`,
/// counting nested `case` words. Returns (construct text, text trailing
/// the closer on its line, next line index).
fn collect_case_text(
    lines: &[String],
    start: usize,
) -> Result<(String, String, usize), InterpreterError> {
    let mut text = String::new();
    let mut depth = 0i32;

    for (offset, line) in lines[start..].iter().enumerate() {
        if !text.is_empty() {
            text.push('\n');
        }
        let line_base = text.chars().count();
        text.push_str(line);

        // Apply case/esac occurrences on this line in positional order.
        let mut events: Vec<(usize, i32)> = Vec::new();
        let mut pos = 0;
        while let Some(found) = find_unquoted_word(line, "case", pos) {
            events.push((found, 1));
            pos = found + 4;
        }
        pos = 0;
        while let Some(found) = find_unquoted_word(line, "esac", pos) {
            events.push((found, -1));
            pos = found + 4;
        }
        events.sort_by_key(|(at, _)| *at);

        for (at, delta) in events {
            depth += delta;
            if depth == 0 {
                let close_end = line_base + at + 4;
                let full: Vec<char> = text.chars().collect();
                let construct: String = full[..close_end].iter().collect();
                let trailing: String = full[close_end..]
                    .iter()
                    .collect::<String>()
                    .trim_start_matches([';', ' ', '\t'])
                    .to_string();
                return Ok((construct, trailing, start + offset + 1));
            }
        }
    }
    Err(InterpreterError::Syntax(
        "unexpected end of input looking for `esac'".into(),
    ))
}

/// Split the construct text into the WORD and its pattern sections.
fn parse_case_text(text: &str) -> Result<ParsedCase, InterpreterError> {
    let after_case = text
        .trim_start()
        .strip_prefix("case")
        .map(str::trim_start)
        .ok_or_else(|| InterpreterError::Syntax("malformed case statement".into()))?;

    let in_pos = find_unquoted_word(after_case, "in", 0)
        .ok_or_else(|| InterpreterError::Syntax("case: missing `in'".into()))?;
    let chars: Vec<char> = after_case.chars().collect();
    let word: String = chars[..in_pos].iter().collect::<String>().trim().to_string();
    if word.is_empty() {
        return Err(InterpreterError::Syntax("case: missing word".into()));
    }

    let body_full: String = chars[in_pos + 2..].iter().collect();
    let body = body_full
        .trim_end()
        .strip_suffix("esac")
        .ok_or_else(|| InterpreterError::Syntax("case: missing `esac'".into()))?
        .to_string();

    let mut sections = Vec::new();
    for raw in split_case_sections(&body) {
        let section = raw.trim();
        if section.is_empty() {
            continue;
        }
        sections.push(parse_case_section(section)?);
    }
    Ok(ParsedCase { word, sections })
}

/// Split the body at top-level `;;`, leaving nested case bodies intact.
fn split_case_sections(body: &str) -> Vec<String> {
    let chars: Vec<char> = body.chars().collect();
    let mut scanner = QuoteScanner::new();
    let mut nested = 0i32;
    let mut sections = Vec::new();
    let mut current = String::new();
    let mut i = 0usize;

    while i < chars.len() {
        let effective = scanner.state().is_effective();
        if effective && word_at(&chars, i, "case") {
            nested += 1;
        } else if effective && word_at(&chars, i, "esac") {
            nested -= 1;
        }
        if effective
            && nested == 0
            && chars[i] == ';'
            && chars.get(i + 1) == Some(&';')
        {
            sections.push(std::mem::take(&mut current));
            scanner.advance(chars[i], chars.get(i + 1).copied());
            scanner.advance(chars[i + 1], chars.get(i + 2).copied());
            i += 2;
            // Swallow the ;& / ;;& variants' extra marker if present.
            if chars.get(i) == Some(&'&') {
                i += 1;
            }
            continue;
        }
        current.push(chars[i]);
        scanner.advance(chars[i], chars.get(i + 1).copied());
        i += 1;
    }
    sections.push(current);
    sections
}

fn word_at(chars: &[char], at: usize, word: &str) -> bool {
    let w: Vec<char> = word.chars().collect();
    if !chars[at..].starts_with(&w[..]) {
        return false;
    }
    let before_ok = at == 0
        || chars[at - 1].is_whitespace()
        || matches!(chars[at - 1], ';' | '(' | ')' | '&' | '|');
    let after = chars.get(at + w.len());
    let after_ok = match after {
        None => true,
        Some(c) => c.is_whitespace() || matches!(c, ';' | '(' | ')' | '&' | '|'),
    };
    before_ok && after_ok
}

/// Parse `PATTERN) commands` with optional leading `(` and `|`
/// alternation kept inside the pattern for the matcher.
fn parse_case_section(section: &str) -> Result<CaseSection, InterpreterError> {
    let chars: Vec<char> = section.chars().collect();
    let mut scanner = QuoteScanner::new();
    for i in 0..chars.len() {
        if chars[i] == ')' && scanner.state().is_effective() {
            let mut pattern: String = chars[..i].iter().collect();
            pattern = pattern.trim().to_string();
            if let Some(stripped) = pattern.strip_prefix('(') {
                pattern = stripped.trim_start().to_string();
            }
            if pattern.is_empty() {
                return Err(InterpreterError::Syntax("case: empty pattern".into()));
            }
            let commands: String = chars[i + 1..].iter().collect();
            return Ok(CaseSection { pattern, commands: commands.trim().to_string() });
        }
        scanner.advance(chars[i], chars.get(i + 1).copied());
    }
    Err(InterpreterError::Syntax(format!(
        "case: malformed section: {}",
        section
    )))
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn lines(src: &[&str]) -> Vec<String> {
        src.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_collect_inline_case() {
        let src = lines(&["case x in a) echo a;; esac"]);
        let (text, trailing, next) = collect_case_text(&src, 0).unwrap();
        assert_eq!(text, "case x in a) echo a;; esac");
        assert_eq!(trailing, "");
        assert_eq!(next, 1);
    }

    #[test]
    fn test_collect_multiline_case_with_trailing() {
        let src = lines(&["case $v in", "one) echo 1;;", "esac; echo after"]);
        let (text, trailing, next) = collect_case_text(&src, 0).unwrap();
        assert!(text.ends_with("esac"));
        assert_eq!(trailing, "echo after");
        assert_eq!(next, 3);
    }

    #[test]
    fn test_collect_nested_case() {
        let src = lines(&[
            "case a in",
            "a) case b in b) echo bb;; esac;;",
            "esac",
        ]);
        let (text, _, next) = collect_case_text(&src, 0).unwrap();
        assert_eq!(next, 3);
        assert_eq!(text.matches("esac").count(), 2);
    }

    #[test]
    fn test_parse_case_sections() {
        let parsed =
            parse_case_text("case apple in a*) echo fruit;; *) echo other;; esac").unwrap();
        assert_eq!(parsed.word, "apple");
        assert_eq!(parsed.sections.len(), 2);
        assert_eq!(parsed.sections[0].pattern, "a*");
        assert_eq!(parsed.sections[0].commands, "echo fruit");
        assert_eq!(parsed.sections[1].pattern, "*");
    }

    #[test]
    fn test_parse_alternation_pattern() {
        let parsed = parse_case_text("case v in x|y*) echo m;; esac").unwrap();
        assert_eq!(parsed.sections[0].pattern, "x|y*");
    }

    #[test]
    fn test_parse_parenthesized_pattern() {
        let parsed = parse_case_text("case v in (x) echo m;; esac").unwrap();
        assert_eq!(parsed.sections[0].pattern, "x");
    }

    #[test]
    fn test_quoted_semicolons_not_section_breaks() {
        let parsed = parse_case_text("case v in a) echo ';;';; esac").unwrap();
        assert_eq!(parsed.sections.len(), 1);
        assert_eq!(parsed.sections[0].commands, "echo ';;'");
    }

    #[test]
    fn test_missing_in_is_error() {
        assert!(parse_case_text("case v a) echo;; esac").is_err());
    }

    #[test]
    fn test_nested_case_sections_survive() {
        let body = "a) case b in c) echo x;; esac;; d) echo y";
        let sections = split_case_sections(body);
        assert_eq!(sections.len(), 2);
        assert!(sections[0].contains("case b in"));
        assert!(sections[1].contains("echo y"));
    }
}
