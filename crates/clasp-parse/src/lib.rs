#![forbid(unsafe_code)]
#![deny(unused_must_use)]
#![warn(clippy::dbg_macro, clippy::todo, clippy::unimplemented)]

mod lexer;
mod parser;
mod token;

pub use parser::parse_str;
pub use token::{Tok, TokKind};

use clasp_ast::span::SourceLocation;
use std::fmt;

/// Errors produced while turning source text into an AST.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SyntaxError {
    /// Tokenization failure (bad character, malformed literal, limits).
    Lex { msg: String, sl: SourceLocation },
    /// Grammar failure (unexpected or missing tokens).
    Parse { msg: String, sl: SourceLocation },
}

impl SyntaxError {
    pub fn sl(&self) -> SourceLocation {
        match self {
            SyntaxError::Lex { sl, .. } | SyntaxError::Parse { sl, .. } => *sl,
        }
    }
}

impl fmt::Display for SyntaxError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SyntaxError::Lex { msg, sl } => write!(f, "[lexer error {sl}] {msg}"),
            SyntaxError::Parse { msg, sl } => write!(f, "[parser error {sl}] {msg}"),
        }
    }
}

impl std::error::Error for SyntaxError {}
