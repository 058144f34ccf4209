//! Pre-execution script validation and diagnostic reporting.

pub mod report;
pub mod types;
pub mod validation;

pub use report::{print_error_report, print_runtime_error};
pub use types::{has_critical_errors, Category, Severity, SyntaxError};
pub use validation::validate;
