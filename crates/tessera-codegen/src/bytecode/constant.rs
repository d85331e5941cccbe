//! Constant pool entries

use std::fmt;
use std::rc::Rc;

use crate::ast::{Literal, MethodRef};
use crate::types::Type;

use super::Function;

/// An entry of a chunk's constant pool
#[derive(Debug, Clone)]
pub enum Constant {
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Rc<str>),
    /// Field or class name
    Name(Rc<str>),
    /// Operand of `InstanceOf` / `CheckCast`
    Type(Type),
    /// Target of an invoke instruction
    Method(Rc<MethodRef>),
    /// Body of a closure
    Function(Rc<Function>),
}

impl Constant {
    /// The pool entry for a literal; `None` for literals pushed by a
    /// dedicated instruction (`null`, booleans)
    #[must_use]
    pub fn from_literal(literal: &Literal) -> Option<Self> {
        let constant = match literal {
            Literal::Null | Literal::Bool(_) => return None,
            Literal::Byte(v) => Constant::Byte(*v),
            Literal::Short(v) => Constant::Short(*v),
            Literal::Char(v) => Constant::Char(*v),
            Literal::Int(v) => Constant::Int(*v),
            Literal::Long(v) => Constant::Long(*v),
            Literal::Float(v) => Constant::Float(*v),
            Literal::Double(v) => Constant::Double(*v),
            Literal::String(s) => Constant::String(Rc::clone(s)),
        };
        Some(constant)
    }

    /// Check if two constants are identical (for deduplication)
    #[must_use]
    pub fn identical(&self, other: &Constant) -> bool {
        match (self, other) {
            (Constant::Byte(a), Constant::Byte(b)) => a == b,
            (Constant::Short(a), Constant::Short(b)) => a == b,
            (Constant::Char(a), Constant::Char(b)) => a == b,
            (Constant::Int(a), Constant::Int(b)) => a == b,
            (Constant::Long(a), Constant::Long(b)) => a == b,
            (Constant::Float(a), Constant::Float(b)) => a.to_bits() == b.to_bits(),
            (Constant::Double(a), Constant::Double(b)) => a.to_bits() == b.to_bits(),
            (Constant::String(a), Constant::String(b)) => a == b,
            (Constant::Name(a), Constant::Name(b)) => a == b,
            (Constant::Type(a), Constant::Type(b)) => a == b,
            (Constant::Method(a), Constant::Method(b)) => a == b,
            (Constant::Function(a), Constant::Function(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

impl fmt::Display for Constant {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Constant::Byte(v) => write!(f, "{v}b"),
            Constant::Short(v) => write!(f, "{v}s"),
            Constant::Char(v) => write!(f, "{v:?}"),
            Constant::Int(v) => write!(f, "{v}"),
            Constant::Long(v) => write!(f, "{v}L"),
            Constant::Float(v) => write!(f, "{v}f"),
            Constant::Double(v) => write!(f, "{v}"),
            Constant::String(s) => write!(f, "{s:?}"),
            Constant::Name(name) => write!(f, "{name}"),
            Constant::Type(ty) => write!(f, "{ty}"),
            Constant::Method(method) => write!(f, "{method}"),
            Constant::Function(function) => write!(f, "<fn {}>", function.name),
        }
    }
}
