//! Control Flow Results
//!
//! Evaluator boundaries pass an explicit sum type for control flow
//! instead of reserved integer exit codes. The reserved codes still
//! exist at the process boundary: a child (e.g. `break` run inside a
//! command substitution subshell) conveys break/continue/return as exit
//! codes 255/254/253, which the driver translates back into the typed
//! form. They are never observed by the outer host.

/// Reserved exit code for `return` crossing a process boundary.
pub const RETURN_SENTINEL: i32 = 253;
/// Reserved exit code for `continue` crossing a process boundary.
pub const CONTINUE_SENTINEL: i32 = 254;
/// Reserved exit code for `break` crossing a process boundary.
pub const BREAK_SENTINEL: i32 = 255;

/// Outcome of executing a statement, block, or construct.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Control {
    /// Normal completion with an exit status.
    Code(i32),
    /// `break [n]`: pop n loop frames.
    Break(u32),
    /// `continue [n]`: restart the nth-outer loop frame.
    Continue(u32),
    /// `return [n]`: unwind to the enclosing function boundary.
    Return(i32),
}

impl Control {
    /// Exit status for contexts that treat any pending control flow as
    /// already handled.
    pub fn code(self) -> i32 {
        match self {
            Control::Code(code) => code,
            Control::Return(code) => code,
            Control::Break(_) | Control::Continue(_) => 0,
        }
    }

    pub fn is_flow(self) -> bool {
        !matches!(self, Control::Code(_))
    }

    /// Translate a raw exit code from a child process, mapping the
    /// reserved sentinels back into typed control flow.
    pub fn from_exit_code(code: i32) -> Control {
        match code {
            BREAK_SENTINEL => Control::Break(1),
            CONTINUE_SENTINEL => Control::Continue(1),
            RETURN_SENTINEL => Control::Return(0),
            other => Control::Code(other),
        }
    }

    /// Exit code for crossing a process boundary outward.
    pub fn to_exit_code(self) -> i32 {
        match self {
            Control::Code(code) => code,
            Control::Break(_) => BREAK_SENTINEL,
            Control::Continue(_) => CONTINUE_SENTINEL,
            Control::Return(_) => RETURN_SENTINEL,
        }
    }
}

/// True for the reserved control-flow exit codes.
pub fn is_control_flow_code(code: i32) -> bool {
    matches!(code, RETURN_SENTINEL | CONTINUE_SENTINEL | BREAK_SENTINEL)
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_round_trip() {
        assert_eq!(Control::from_exit_code(255), Control::Break(1));
        assert_eq!(Control::from_exit_code(254), Control::Continue(1));
        assert_eq!(Control::from_exit_code(253), Control::Return(0));
        assert_eq!(Control::from_exit_code(0), Control::Code(0));
        assert_eq!(Control::Break(2).to_exit_code(), 255);
    }

    #[test]
    fn test_is_control_flow_code() {
        assert!(is_control_flow_code(253));
        assert!(is_control_flow_code(254));
        assert!(is_control_flow_code(255));
        assert!(!is_control_flow_code(0));
        assert!(!is_control_flow_code(127));
    }
}
