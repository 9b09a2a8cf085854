//! Source positions carried by the detailed tree.
//!
//! The code generator does not parse source text, but every diagnostic it
//! raises should point back at the expression that caused it. `Position` is
//! the minimal carrier for that: a file name plus a line/column pair. It is
//! deliberately smaller than a full lexer span (no end position, no source
//! text) since this crate never needs to re-render a source excerpt itself —
//! that belongs to the driver that owns the original text.

use std::fmt::{self, Display};

#[derive(Debug, Clone, PartialEq, Eq, Hash, Default)]
pub struct Position {
    pub file: String,
    pub line: usize,
    pub column: usize,
}

impl Position {
    pub fn new(file: impl Into<String>, line: usize, column: usize) -> Self {
        Self {
            file: file.into(),
            line,
            column,
        }
    }

    /// A position to use when an error cannot be attributed to a specific
    /// node (e.g. module-level finalisation failures).
    pub fn unknown() -> Self {
        Self {
            file: "<unknown>".into(),
            line: 0,
            column: 0,
        }
    }
}

impl Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}:{}", self.file, self.line, self.column)
    }
}
