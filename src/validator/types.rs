//! Diagnostic Types
//!
//! Structured syntax diagnostics produced before a block executes. Only
//! CRITICAL severity refuses execution; everything else is advisory.

use std::fmt;

use serde::Serialize;

/// How bad a diagnostic is. Ordering matters: `Critical` is the only
/// level that stops execution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Warning,
    Error,
    Critical,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Info => write!(f, "info"),
            Severity::Warning => write!(f, "warning"),
            Severity::Error => write!(f, "error"),
            Severity::Critical => write!(f, "critical"),
        }
    }
}

/// What part of the language a diagnostic concerns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Category {
    Syntax,
    ControlFlow,
    Redirection,
    Variables,
    Commands,
    Arithmetic,
    Style,
    Semantics,
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Category::Syntax => write!(f, "SYNTAX"),
            Category::ControlFlow => write!(f, "CONTROL_FLOW"),
            Category::Redirection => write!(f, "REDIRECTION"),
            Category::Variables => write!(f, "VARIABLES"),
            Category::Commands => write!(f, "COMMANDS"),
            Category::Arithmetic => write!(f, "ARITHMETIC"),
            Category::Style => write!(f, "STYLE"),
            Category::Semantics => write!(f, "SEMANTICS"),
        }
    }
}

/// One structured diagnostic.
#[derive(Debug, Clone, Serialize)]
pub struct SyntaxError {
    /// 1-based source line.
    pub line: usize,
    /// Char columns of the offending span; equal when only a point is
    /// known.
    pub column_start: usize,
    pub column_end: usize,
    pub severity: Severity,
    pub category: Category,
    pub code: &'static str,
    pub message: String,
    /// The offending source line, for report rendering.
    pub line_content: String,
    pub suggestion: Option<String>,
    /// Cross-reference, e.g. where an unbalanced block was opened.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub related_info: Option<String>,
}

impl SyntaxError {
    pub fn new(
        line: usize,
        span: (usize, usize),
        severity: Severity,
        category: Category,
        code: &'static str,
        message: impl Into<String>,
        line_content: impl Into<String>,
    ) -> Self {
        Self {
            line,
            column_start: span.0,
            column_end: span.1,
            severity,
            category,
            code,
            message: message.into(),
            line_content: line_content.into(),
            suggestion: None,
            related_info: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_related_info(mut self, info: impl Into<String>) -> Self {
        self.related_info = Some(info.into());
        self
    }
}

/// True when any diagnostic must refuse execution.
pub fn has_critical_errors(errors: &[SyntaxError]) -> bool {
    errors.iter().any(|e| e.severity == Severity::Critical)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_severity_ordering() {
        assert!(Severity::Critical > Severity::Error);
        assert!(Severity::Error > Severity::Warning);
        assert!(Severity::Warning > Severity::Info);
    }

    #[test]
    fn test_has_critical() {
        let warn = SyntaxError::new(
            1,
            (0, 0),
            Severity::Warning,
            Category::Style,
            "STY001",
            "long line",
            "x",
        );
        assert!(!has_critical_errors(&[warn.clone()]));
        let crit = SyntaxError::new(
            2,
            (0, 4),
            Severity::Critical,
            Category::Syntax,
            "SYN001",
            "unclosed quote",
            "echo '",
        );
        assert!(has_critical_errors(&[warn, crit]));
    }

    #[test]
    fn test_serialize_shape() {
        let err = SyntaxError::new(
            3,
            (2, 5),
            Severity::Error,
            Category::Redirection,
            "RED001",
            "missing target",
            "cmd >",
        )
        .with_suggestion("add a file name");
        let json = serde_json::to_value(&err).unwrap();
        assert_eq!(json["line"], 3);
        assert_eq!(json["severity"], "error");
        assert_eq!(json["category"], "REDIRECTION");
        assert_eq!(json["code"], "RED001");
        assert_eq!(json["suggestion"], "add a file name");
    }
}
