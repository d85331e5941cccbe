//! Typed, resolved expression tree consumed by the lowering engine
//!
//! The front end hands over trees in which every node already carries its
//! static [`Type`](crate::types::Type), every name is resolved to a
//! descriptor, and every operator or call is resolved to a [`ResolvedCall`].
//! Nothing here is re-derived during lowering.

mod descriptor;
mod expr;
mod item;
mod stmt;

pub use descriptor::*;
pub use expr::*;
pub use item::*;
pub use stmt::*;

pub use crate::span::Span;

/// A trait for tree nodes that have associated source location information
pub trait Spanned {
    /// Returns the source span of this node
    fn span(&self) -> Span;
}
