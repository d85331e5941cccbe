//! Compiled functions

use std::rc::Rc;

use super::chunk::Chunk;

/// A lowered function or closure body
#[derive(Debug, Clone)]
pub struct Function {
    /// Function name; unnamed closures are `<enclosing>$lambda<n>`
    pub name: String,
    /// Number of declared parameters (excluding the receiver)
    pub arity: u8,
    /// The function's bytecode
    pub chunk: Chunk,
    /// Local slots needed by the frame, hidden temporaries included
    pub locals: u16,
    /// Exact maximum operand stack depth
    pub max_stack: u32,
    /// Closure field names, in the order `MakeClosure` pops them
    pub captures: Vec<Rc<str>>,
}

impl Function {
    /// Nested function constants (closure bodies) of this function
    pub fn nested(&self) -> impl Iterator<Item = &Rc<Function>> {
        self.chunk.constants().iter().filter_map(|c| match c {
            super::Constant::Function(f) => Some(f),
            _ => None,
        })
    }
}
