#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

mod analyze;

#[cfg(test)]
mod analyze_tests;

pub use analyze::{analyze, check_bindings, compute_free_vars, mark_tail_positions};

use clasp_ast::span::SourceLocation;
use std::fmt;

/// Static-analysis errors. There is exactly one family today: binding
/// lists must not repeat a name.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SemaError {
    /// A lambda parameter list names the same variable twice.
    DuplicateParam { name: String, sl: SourceLocation },
    /// A letrec binding list names the same variable twice.
    DuplicateBinding { name: String, sl: SourceLocation },
}

impl fmt::Display for SemaError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SemaError::DuplicateParam { name, sl } => {
                write!(f, "[sema error {sl}] duplicate parameter name `{name}`")
            }
            SemaError::DuplicateBinding { name, sl } => {
                write!(f, "[sema error {sl}] duplicate binding name `{name}`")
            }
        }
    }
}

impl std::error::Error for SemaError {}
