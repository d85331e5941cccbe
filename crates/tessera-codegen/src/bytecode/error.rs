//! Codegen error types

use std::fmt;

use thiserror::Error;

use crate::ast::VarId;
use crate::span::Span;

/// A fatal lowering error; aborts codegen of the current unit
#[derive(Debug, Clone, PartialEq)]
pub struct CodegenError {
    /// The kind of error
    pub kind: CodegenErrorKind,

    /// Source location of the offending node
    pub span: Span,

    /// Rendering of the offending node
    pub node: Option<String>,
}

impl CodegenError {
    /// Create a new codegen error
    #[must_use]
    pub fn new(kind: CodegenErrorKind, span: Span) -> Self {
        Self {
            kind,
            span,
            node: None,
        }
    }

    /// Attach a rendering of the node being lowered
    #[must_use]
    pub fn with_node(mut self, node: impl Into<String>) -> Self {
        self.node = Some(node.into());
        self
    }
}

impl fmt::Display for CodegenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} at {}", self.kind, self.span)?;
        if let Some(node) = &self.node {
            write!(f, "\n  while lowering: {node}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CodegenError {}

/// The kind of codegen error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum CodegenErrorKind {
    #[error("cannot store into {0}")]
    UnsupportedStore(&'static str),

    #[error("receiver of size {0} cannot be duplicated")]
    ReceiverTooLarge(usize),

    #[error("no enclosing loop labelled {label} for '{keyword}'")]
    UnmatchedLabel { keyword: &'static str, label: String },

    #[error("'break' outside of a loop")]
    BreakOutsideLoop,

    #[error("'continue' outside of a loop")]
    ContinueOutsideLoop,

    #[error("unknown operator: {0}")]
    UnknownOperator(String),

    #[error("unsupported construct: {0}")]
    Unsupported(String),

    #[error("both branches are empty in an expression of type {0}")]
    EmptyBranches(String),

    #[error("variable {0} is not declared in this function")]
    UnknownVariable(VarId),

    #[error("no implicit receiver in this context")]
    NoImplicitReceiver,

    #[error("jump distance {0} does not fit in 16 bits")]
    JumpTooLarge(isize),

    #[error("too many constants in one function")]
    TooManyConstants,

    #[error("function needs {needed} local slots, the limit is {limit}")]
    TooManyLocals { needed: u32, limit: u16 },

    #[error("too many arguments ({0}), the limit is 255")]
    TooManyArguments(usize),

    #[error("{0} jump reservation(s) were never patched")]
    UnpatchedJumps(usize),

    #[error("jump reservation at offset {0} was patched twice")]
    DoublePatch(usize),
}

/// Result type for codegen operations
pub type CodegenResult<T> = Result<T, CodegenError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_display_includes_node() {
        let err = CodegenError::new(CodegenErrorKind::BreakOutsideLoop, Span::new(3, 8).with_line(2))
            .with_node("break");
        let text = err.to_string();
        assert!(text.starts_with("'break' outside of a loop at 3..8 (line 2)"));
        assert!(text.ends_with("while lowering: break"));
    }

    #[test]
    fn kind_messages() {
        let kind = CodegenErrorKind::UnmatchedLabel {
            keyword: "continue",
            label: "@outer".to_string(),
        };
        assert_eq!(kind.to_string(), "no enclosing loop labelled @outer for 'continue'");
        assert_eq!(
            CodegenErrorKind::UnsupportedStore("a constant").to_string(),
            "cannot store into a constant"
        );
    }
}
