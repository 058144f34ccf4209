//! Command Parser
//!
//! Builds `Command` pipeline stages out of a token list. The input tokens
//! are expected to be expansion-complete: word values are final argv text
//! (quotes removed, expansions applied, fields split). This parser is
//! purely structural: it splits on `|`, recognizes redirection operators,
//! the leading `!` pipeline negation, and the trailing `&` background
//! marker.

use crate::parser::types::{ParseException, Token};

/// Kind of a redirection operator.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RedirOp {
    /// `< file`
    In,
    /// `> file`, `>| file`
    Out,
    /// `>> file`
    Append,
    /// `2> file`
    Err,
    /// `2>&1`
    ErrToOut,
    /// `>&2`, `1>&2`
    OutToErr,
    /// `&> file`
    Both,
    /// `&>> file`
    BothAppend,
    /// `<< tag`, `<<- tag`
    Heredoc,
    /// `<<< word`
    HereString,
    /// `n>&m`, `n<&m`
    FdDup,
    /// `n>&m-`
    FdMove,
    /// `n<> file`
    ReadWrite,
}

/// A single redirection attached to a command.
#[derive(Debug, Clone, PartialEq)]
pub struct Redirection {
    /// Source fd, when explicitly given (`2>` has fd 2).
    pub fd: Option<i32>,
    pub op: RedirOp,
    /// Target word: file name, heredoc delimiter, here-string body, or
    /// dup target fd as text.
    pub target: String,
    /// For heredocs: strip leading tabs from the body (`<<-`).
    pub strip_tabs: bool,
}

/// One stage of a pipeline, ready for the pipeline executor.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Command {
    pub argv: Vec<String>,
    pub background: bool,
    /// `!` prefix: invert the final pipeline status.
    pub negate: bool,
    pub redirections: Vec<Redirection>,
    /// Collected heredoc body, attached by the driver.
    pub heredoc_body: Option<String>,
    pub here_string: Option<String>,
}

impl Command {
    /// A command with no argv must carry at least one redirection to be
    /// meaningful.
    pub fn is_empty(&self) -> bool {
        self.argv.is_empty() && self.redirections.is_empty() && self.here_string.is_none()
    }
}

/// Parse a token list (one `;`-free, `&&`-free piece) into pipeline
/// stages. The final stage's `background` flag is set when the list ends
/// with `&`; `negate` is set on the first stage when the list starts with
/// `!`.
pub fn parse_pipeline(tokens: &[Token]) -> Result<Vec<Command>, ParseException> {
    let mut commands = Vec::new();
    let mut current = Command::default();
    let mut negate_pipeline = false;
    let mut background = false;
    let mut i = 0usize;

    // Leading ! negates the whole pipeline.
    if let Some(first) = tokens.first() {
        if !first.is_operator && first.value == "!" {
            negate_pipeline = true;
            i = 1;
        }
    }

    while i < tokens.len() {
        let token = &tokens[i];
        if token.is_operator {
            match token.value.as_str() {
                "|" => {
                    if current.is_empty() {
                        return Err(ParseException::new(
                            "syntax error near unexpected token `|'",
                            1,
                            token.column,
                        ));
                    }
                    commands.push(std::mem::take(&mut current));
                    i += 1;
                }
                "&" => {
                    if i != tokens.len() - 1 {
                        return Err(ParseException::new(
                            "syntax error near unexpected token `&'",
                            1,
                            token.column,
                        ));
                    }
                    background = true;
                    i += 1;
                }
                op if is_redirection(op) => {
                    let (redir, consumed) = parse_redirection(tokens, i)?;
                    if redir.op == RedirOp::HereString {
                        current.here_string = Some(redir.target.clone());
                    }
                    current.redirections.push(redir);
                    i += consumed;
                }
                other => {
                    return Err(ParseException::new(
                        format!("syntax error near unexpected token `{}'", other),
                        1,
                        token.column,
                    ));
                }
            }
        } else {
            current.argv.push(token.value.clone());
            i += 1;
        }
    }

    if !current.is_empty() {
        commands.push(current);
    } else if !commands.is_empty() {
        // Trailing | with nothing after it.
        return Err(ParseException::new("syntax error: unexpected end of pipeline", 1, 0));
    }

    if let Some(first) = commands.first_mut() {
        first.negate = negate_pipeline;
    }
    if background {
        for cmd in &mut commands {
            cmd.background = true;
        }
    }
    Ok(commands)
}

/// True for operator token text that denotes a redirection, with or
/// without a fused fd prefix.
pub fn is_redirection(op: &str) -> bool {
    let trimmed = op.trim_start_matches(|c: char| c.is_ascii_digit());
    matches!(
        trimmed.trim_end_matches(|c: char| c.is_ascii_digit() || c == '-'),
        "<" | ">" | ">>" | "<<" | "<<-" | "<<<" | "<&" | ">&" | "<>" | ">|" | "&>" | "&>>"
    ) && !trimmed.is_empty()
}

/// Decode one redirection token (plus its target word when the token does
/// not embed one). Returns the redirection and the number of tokens
/// consumed.
fn parse_redirection(tokens: &[Token], index: usize) -> Result<(Redirection, usize), ParseException> {
    let token = &tokens[index];
    let text = token.value.as_str();

    // Split an fd prefix off the front: "2>&1" -> (Some(2), ">&1").
    let digits_len = text.chars().take_while(|c| c.is_ascii_digit()).count();
    let (fd, rest) = if digits_len > 0 {
        (text[..digits_len].parse::<i32>().ok(), &text[digits_len..])
    } else {
        (None, text)
    };

    // Dup forms embed their target: ">&1", "<&0", ">&1-".
    if let Some(stripped) = rest.strip_prefix(">&").or_else(|| rest.strip_prefix("<&")) {
        if !stripped.is_empty() {
            let is_move = stripped.ends_with('-') && stripped.len() > 1;
            let target = stripped.trim_end_matches('-').to_string();
            let op = if is_move {
                RedirOp::FdMove
            } else if fd == Some(2) && target == "1" {
                RedirOp::ErrToOut
            } else if (fd.is_none() || fd == Some(1)) && target == "2" {
                RedirOp::OutToErr
            } else {
                RedirOp::FdDup
            };
            return Ok((Redirection { fd, op, target, strip_tabs: false }, 1));
        }
    }

    let (op, strip_tabs) = match rest {
        "<" => (RedirOp::In, false),
        ">" | ">|" => (if fd == Some(2) { RedirOp::Err } else { RedirOp::Out }, false),
        ">>" => (RedirOp::Append, false),
        "<<" => (RedirOp::Heredoc, false),
        "<<-" => (RedirOp::Heredoc, true),
        "<<<" => (RedirOp::HereString, false),
        "<>" => (RedirOp::ReadWrite, false),
        "&>" => (RedirOp::Both, false),
        "&>>" => (RedirOp::BothAppend, false),
        ">&" | "<&" => {
            // Bare dup with the target in the next word.
            let target = tokens.get(index + 1).filter(|t| !t.is_operator).ok_or_else(|| {
                ParseException::new("redirection missing target", 1, token.column)
            })?;
            return Ok((
                Redirection {
                    fd,
                    op: RedirOp::FdDup,
                    target: target.value.clone(),
                    strip_tabs: false,
                },
                2,
            ));
        }
        other => {
            return Err(ParseException::new(
                format!("unrecognized redirection `{}'", other),
                1,
                token.column,
            ))
        }
    };

    let target = tokens.get(index + 1).filter(|t| !t.is_operator).ok_or_else(|| {
        ParseException::new("redirection missing target", 1, token.column)
    })?;

    Ok((
        Redirection { fd, op, target: target.value.clone(), strip_tabs },
        2,
    ))
}

// ============================================================================
// Tests
// ============================================================================
