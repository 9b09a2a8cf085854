//! Structured, position-carrying errors for the code generator.
//!
//! Mirrors the typechecker's error design: one outer enum whose variants pair
//! a small `Display`-able struct with a [`Position`], so a single `Display`
//! impl on the enum produces the "severity: subsystem: position: summary"
//! line the driver prints, while each inner struct stays independently
//! testable and constructible.

use std::error::Error;
use std::fmt::{self, Display};

use crate::position::Position;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CodegenError {
    InvariantViolated(InvariantViolated, Position),
    Unimplemented(Unimplemented, Position),
    VerificationFailed(VerificationFailed, Position),
    EmissionFailed(EmissionFailed, Position),
}

pub type CodegenResult<T> = Result<T, CodegenError>;

impl CodegenError {
    pub fn position(&self) -> &Position {
        match self {
            CodegenError::InvariantViolated(_, p) => p,
            CodegenError::Unimplemented(_, p) => p,
            CodegenError::VerificationFailed(_, p) => p,
            CodegenError::EmissionFailed(_, p) => p,
        }
    }

    fn severity(&self) -> &'static str {
        match self {
            CodegenError::InvariantViolated(..) => "fatal",
            CodegenError::Unimplemented(..) => "error",
            CodegenError::VerificationFailed(..) => "fatal",
            CodegenError::EmissionFailed(..) => "fatal",
        }
    }

    fn subsystem(&self) -> &'static str {
        match self {
            CodegenError::InvariantViolated(..) => "codegen",
            CodegenError::Unimplemented(..) => "codegen",
            CodegenError::VerificationFailed(..) => "verifier",
            CodegenError::EmissionFailed(..) => "emit",
        }
    }

    fn inner(&self) -> &dyn Display {
        match self {
            CodegenError::InvariantViolated(e, _) => e,
            CodegenError::Unimplemented(e, _) => e,
            CodegenError::VerificationFailed(e, _) => e,
            CodegenError::EmissionFailed(e, _) => e,
        }
    }
}

impl Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {}: {}: {}",
            self.severity(),
            self.subsystem(),
            self.position(),
            self.inner()
        )
    }
}

impl Error for CodegenError {}

/// An invariant the semantic analyser is defined to have already enforced
/// was found broken (e.g. an empty cast path, a sub-object index past the
/// end of the class graph). Always a compiler bug upstream of this crate.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvariantViolated {
    pub what: String,
}

impl Display for InvariantViolated {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "invariant violated: {}", self.what)
    }
}

/// A tree node kind this backend does not yet lower (generators, async,
/// throw/catch). Recoverable from the driver's point of view: it can report
/// and move on to the next root rather than aborting the whole run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Unimplemented {
    pub node_kind: String,
}

impl Display for Unimplemented {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "'{}' is not yet lowered by this backend", self.node_kind)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct VerificationFailed {
    pub function_name: String,
    pub message: String,
}

impl Display for VerificationFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LLVM rejected function '{}': {}",
            self.function_name, self.message
        )
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmissionFailed {
    pub path: String,
    pub message: String,
}

impl Display for EmissionFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "failed to write '{}': {}", self.path, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn display_matches_one_line_contract() {
        let err = CodegenError::Unimplemented(
            Unimplemented {
                node_kind: "AwaitExpression".into(),
            },
            Position::new("main.alta", 12, 4),
        );
        assert_eq!(
            err.to_string(),
            "error: codegen: main.alta:12:4: 'AwaitExpression' is not yet lowered by this backend"
        );
    }
}
