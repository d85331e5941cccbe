//! Statement nodes

use crate::span::Span;

use super::{Expr, Spanned, VariableDescriptor};

/// A statement with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Stmt {
    /// The kind of statement
    pub kind: StmtKind,
    /// Source location
    pub span: Span,
}

impl Stmt {
    /// Create a new statement
    #[must_use]
    pub fn new(kind: StmtKind, span: Span) -> Self {
        Self { kind, span }
    }

    /// Create an expression statement
    #[must_use]
    pub fn expr(expr: Expr) -> Self {
        let span = expr.span;
        Self::new(StmtKind::Expr(expr), span)
    }

    /// Create a variable declaration
    #[must_use]
    pub fn local(var: VariableDescriptor, init: Option<Expr>, span: Span) -> Self {
        Self::new(StmtKind::Local { var, init }, span)
    }
}

impl Spanned for Stmt {
    fn span(&self) -> Span {
        self.span
    }
}

/// The kind of statement
#[derive(Debug, Clone, PartialEq)]
pub enum StmtKind {
    /// Expression evaluated for its effect; any value is discarded
    Expr(Expr),

    /// Variable declaration (`val x = value`, `var x: T`)
    Local {
        var: VariableDescriptor,
        init: Option<Expr>,
    },

    /// Destructuring declaration (`val (a, b) = pair`)
    Destructure {
        vars: Vec<VariableDescriptor>,
        init: Expr,
    },
}
