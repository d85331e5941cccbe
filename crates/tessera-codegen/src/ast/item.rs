//! Function-level items handed to the lowering engine

use std::rc::Rc;

use crate::span::Span;
use crate::types::Type;

use super::{Expr, Spanned, VariableDescriptor};

/// What slot 0 of a function frame holds
#[derive(Debug, Clone, PartialEq)]
pub enum FunctionKind {
    /// Top-level function; parameters start at slot 0
    Static,
    /// Instance method; slot 0 is `this`, parameters start at slot 1
    Method { owner: Type },
}

/// A function declaration ready for lowering
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionDecl {
    pub name: Rc<str>,
    pub kind: FunctionKind,
    pub params: Vec<VariableDescriptor>,
    pub return_type: Type,
    pub body: Expr,
    /// Number of slots the front end assigned to `this`, parameters and locals
    pub frame_size: u16,
    /// Source location
    pub span: Span,
}

impl FunctionDecl {
    /// Create a top-level function
    #[must_use]
    pub fn new(
        name: &str,
        params: Vec<VariableDescriptor>,
        return_type: Type,
        body: Expr,
        frame_size: u16,
    ) -> Self {
        let span = body.span;
        Self {
            name: Rc::from(name),
            kind: FunctionKind::Static,
            params,
            return_type,
            body,
            frame_size,
            span,
        }
    }

    /// Turn this into an instance method of `owner`
    #[must_use]
    pub fn method_of(mut self, owner: Type) -> Self {
        self.kind = FunctionKind::Method { owner };
        self
    }
}

impl Spanned for FunctionDecl {
    fn span(&self) -> Span {
        self.span
    }
}
