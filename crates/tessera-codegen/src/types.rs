//! Static types attached to every typed node.
//!
//! The front end infers these; the lowering engine only reads them to decide
//! which coercions, boxing steps and runtime type tests to emit.

use std::fmt;
use std::rc::Rc;

/// Unboxed primitive kinds. The discriminant is the operand byte used by
/// arithmetic, conversion and boxing instructions.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
#[repr(u8)]
pub enum PrimitiveKind {
    Bool = 0,
    Byte = 1,
    Short = 2,
    Char = 3,
    Int = 4,
    Long = 5,
    Float = 6,
    Double = 7,
}

impl PrimitiveKind {
    pub const ALL: [PrimitiveKind; 8] = [
        PrimitiveKind::Bool,
        PrimitiveKind::Byte,
        PrimitiveKind::Short,
        PrimitiveKind::Char,
        PrimitiveKind::Int,
        PrimitiveKind::Long,
        PrimitiveKind::Float,
        PrimitiveKind::Double,
    ];

    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            PrimitiveKind::Bool => "Bool",
            PrimitiveKind::Byte => "Byte",
            PrimitiveKind::Short => "Short",
            PrimitiveKind::Char => "Char",
            PrimitiveKind::Int => "Int",
            PrimitiveKind::Long => "Long",
            PrimitiveKind::Float => "Float",
            PrimitiveKind::Double => "Double",
        }
    }

    /// Parse a primitive from its source-level name
    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        Self::ALL.into_iter().find(|kind| kind.name() == name)
    }

    /// Integral kinds that can drive a counted range loop
    #[must_use]
    pub const fn is_integral(self) -> bool {
        matches!(
            self,
            PrimitiveKind::Byte | PrimitiveKind::Short | PrimitiveKind::Int | PrimitiveKind::Long
        )
    }

    #[must_use]
    pub const fn is_numeric(self) -> bool {
        !matches!(self, PrimitiveKind::Bool)
    }

    /// Position on the widening ladder `Byte < Short < Int < Long < Float < Double`.
    /// `Char` sits at `Int` level; `Bool` is not on the ladder.
    const fn rank(self) -> Option<u8> {
        match self {
            PrimitiveKind::Bool => None,
            PrimitiveKind::Byte => Some(0),
            PrimitiveKind::Short => Some(1),
            PrimitiveKind::Char | PrimitiveKind::Int => Some(2),
            PrimitiveKind::Long => Some(3),
            PrimitiveKind::Float => Some(4),
            PrimitiveKind::Double => Some(5),
        }
    }

    /// Whether converting `self` into `target` never loses range
    #[must_use]
    pub fn widens_to(self, target: PrimitiveKind) -> bool {
        if self == target {
            return true;
        }
        if target == PrimitiveKind::Char {
            return false;
        }
        match (self.rank(), target.rank()) {
            (Some(from), Some(to)) => from < to,
            _ => false,
        }
    }
}

impl TryFrom<u8> for PrimitiveKind {
    type Error = u8;

    fn try_from(byte: u8) -> Result<Self, Self::Error> {
        match byte {
            0 => Ok(PrimitiveKind::Bool),
            1 => Ok(PrimitiveKind::Byte),
            2 => Ok(PrimitiveKind::Short),
            3 => Ok(PrimitiveKind::Char),
            4 => Ok(PrimitiveKind::Int),
            5 => Ok(PrimitiveKind::Long),
            6 => Ok(PrimitiveKind::Float),
            7 => Ok(PrimitiveKind::Double),
            _ => Err(byte),
        }
    }
}

impl fmt::Display for PrimitiveKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A resolved static type
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Type {
    /// The unit type; its single value is a reference
    Unit,
    /// The bottom type, also the type of the `null` literal
    Nothing,
    /// An unboxed primitive
    Primitive(PrimitiveKind),
    String,
    /// The top reference type
    Any,
    /// A named class
    Class(Rc<str>),
    /// `T?`; nullable primitives are boxed
    Nullable(Box<Type>),
    /// A function value of the given arity
    Function(u8),
    /// A tuple of the given arity
    Tuple(u8),
}

impl Type {
    #[must_use]
    pub const fn bool() -> Self {
        Type::Primitive(PrimitiveKind::Bool)
    }

    #[must_use]
    pub const fn int() -> Self {
        Type::Primitive(PrimitiveKind::Int)
    }

    #[must_use]
    pub const fn long() -> Self {
        Type::Primitive(PrimitiveKind::Long)
    }

    #[must_use]
    pub const fn double() -> Self {
        Type::Primitive(PrimitiveKind::Double)
    }

    #[must_use]
    pub fn class(name: &str) -> Self {
        Type::Class(Rc::from(name))
    }

    /// `Any?`, the type every value can be stored as
    #[must_use]
    pub fn any_nullable() -> Self {
        Type::Any.nullable()
    }

    /// Wrap in `Nullable` unless already nullable
    #[must_use]
    pub fn nullable(self) -> Self {
        match self {
            Type::Nullable(_) | Type::Nothing => self,
            other => Type::Nullable(Box::new(other)),
        }
    }

    /// The type with nullability stripped
    #[must_use]
    pub fn non_null(&self) -> &Type {
        match self {
            Type::Nullable(inner) => inner.non_null(),
            other => other,
        }
    }

    #[must_use]
    pub fn is_nullable(&self) -> bool {
        matches!(self, Type::Nullable(_) | Type::Nothing)
    }

    /// The primitive kind when this type is represented unboxed
    #[must_use]
    pub fn primitive(&self) -> Option<PrimitiveKind> {
        match self {
            Type::Primitive(kind) => Some(*kind),
            _ => None,
        }
    }

    /// Whether values of this type live as references on the stack
    #[must_use]
    pub fn is_reference(&self) -> bool {
        !matches!(self, Type::Primitive(_))
    }

    #[must_use]
    pub fn is_unit(&self) -> bool {
        matches!(self, Type::Unit)
    }

    #[must_use]
    pub fn is_nothing(&self) -> bool {
        matches!(self, Type::Nothing)
    }

    /// Runtime class name used for dispatch tables and diagnostics
    #[must_use]
    pub fn class_name(&self) -> &str {
        match self {
            Type::Unit => "Unit",
            Type::Nothing => "Nothing",
            Type::Primitive(kind) => kind.name(),
            Type::String => "String",
            Type::Any => "Any",
            Type::Class(name) => name,
            Type::Nullable(inner) => inner.class_name(),
            Type::Function(_) => "Function",
            Type::Tuple(_) => "Tuple",
        }
    }
}

impl From<PrimitiveKind> for Type {
    fn from(kind: PrimitiveKind) -> Self {
        Type::Primitive(kind)
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Type::Nullable(inner) => write!(f, "{inner}?"),
            Type::Function(arity) => write!(f, "Function{arity}"),
            Type::Tuple(arity) => write!(f, "Tuple{arity}"),
            other => f.write_str(other.class_name()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn widening_ladder() {
        use PrimitiveKind::*;
        assert!(Byte.widens_to(Short));
        assert!(Int.widens_to(Long));
        assert!(Char.widens_to(Int));
        assert!(Long.widens_to(Double));
        assert!(!Long.widens_to(Int));
        assert!(!Int.widens_to(Char));
        assert!(!Bool.widens_to(Int));
        assert!(Bool.widens_to(Bool));
    }

    #[test]
    fn nullability() {
        let t = Type::int().nullable();
        assert!(t.is_nullable());
        assert!(t.is_reference());
        assert_eq!(t.non_null(), &Type::int());
        assert_eq!(t.clone().nullable(), t);
        assert_eq!(Type::Nothing.nullable(), Type::Nothing);
        assert!(!Type::int().is_reference());
    }

    #[test]
    fn display_names() {
        assert_eq!(Type::int().nullable().to_string(), "Int?");
        assert_eq!(Type::class("Point").to_string(), "Point");
        assert_eq!(Type::Function(2).to_string(), "Function2");
        assert_eq!(Type::Tuple(2).class_name(), "Tuple");
    }

    #[test]
    fn primitive_roundtrip() {
        for kind in PrimitiveKind::ALL {
            assert_eq!(PrimitiveKind::try_from(kind as u8), Ok(kind));
            assert_eq!(PrimitiveKind::from_name(kind.name()), Some(kind));
        }
        assert_eq!(PrimitiveKind::try_from(200), Err(200));
    }
}
