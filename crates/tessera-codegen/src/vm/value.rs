//! Runtime values of the reference interpreter

use std::cell::RefCell;
use std::collections::HashMap;
use std::fmt;
use std::rc::Rc;

use crate::bytecode::{Constant, Function};
use crate::types::PrimitiveKind;

use super::error::RuntimeErrorKind;

/// A runtime value
///
/// Primitives are carried unboxed; `Box`/`Unbox` only check them, since
/// every value is already self-describing.
#[derive(Clone)]
pub enum Value {
    Null,
    Unit,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(Rc<str>),
    Object(Rc<Object>),
    Closure(Rc<Closure>),
    Tuple(Rc<RefCell<Vec<Value>>>),
}

/// An instance of a named class
#[derive(Debug)]
pub struct Object {
    pub class: Rc<str>,
    pub fields: RefCell<HashMap<Rc<str>, Value>>,
}

impl Object {
    #[must_use]
    pub fn new(class: Rc<str>) -> Self {
        Self {
            class,
            fields: RefCell::new(HashMap::new()),
        }
    }

    #[must_use]
    pub fn field(&self, name: &str) -> Option<Value> {
        self.fields.borrow().get(name).cloned()
    }

    pub fn set_field(&self, name: Rc<str>, value: Value) {
        self.fields.borrow_mut().insert(name, value);
    }
}

/// A function literal together with its captured fields
pub struct Closure {
    pub function: Rc<Function>,
    pub fields: RefCell<HashMap<Rc<str>, Value>>,
}

impl fmt::Debug for Closure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Closure")
            .field("function", &self.function.name)
            .field("fields", &self.fields.borrow().len())
            .finish()
    }
}

/// Arithmetic view of a primitive
#[derive(Debug, Clone, Copy)]
enum Number {
    Integer(i64),
    Real(f64),
}

impl Value {
    #[must_use]
    pub fn string(s: impl Into<Rc<str>>) -> Self {
        Value::Str(s.into())
    }

    #[must_use]
    pub fn tuple(items: Vec<Value>) -> Self {
        Value::Tuple(Rc::new(RefCell::new(items)))
    }

    #[must_use]
    pub const fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Value of a pool constant that can be pushed by `Const`
    #[must_use]
    pub fn from_constant(constant: &Constant) -> Option<Self> {
        let value = match constant {
            Constant::Byte(v) => Value::Byte(*v),
            Constant::Short(v) => Value::Short(*v),
            Constant::Char(v) => Value::Char(*v),
            Constant::Int(v) => Value::Int(*v),
            Constant::Long(v) => Value::Long(*v),
            Constant::Float(v) => Value::Float(*v),
            Constant::Double(v) => Value::Double(*v),
            Constant::String(s) => Value::Str(Rc::clone(s)),
            Constant::Name(_) | Constant::Type(_) | Constant::Method(_) | Constant::Function(_) => {
                return None
            }
        };
        Some(value)
    }

    /// The runtime class used for dispatch
    #[must_use]
    pub fn class_name(&self) -> &str {
        match self {
            Value::Null => "Nothing",
            Value::Unit => "Unit",
            Value::Str(_) => "String",
            Value::Object(object) => &object.class,
            Value::Closure(_) => "Function",
            Value::Tuple(_) => "Tuple",
            primitive => primitive.primitive_kind().map_or("Any", PrimitiveKind::name),
        }
    }

    #[must_use]
    pub const fn primitive_kind(&self) -> Option<PrimitiveKind> {
        match self {
            Value::Bool(_) => Some(PrimitiveKind::Bool),
            Value::Byte(_) => Some(PrimitiveKind::Byte),
            Value::Short(_) => Some(PrimitiveKind::Short),
            Value::Char(_) => Some(PrimitiveKind::Char),
            Value::Int(_) => Some(PrimitiveKind::Int),
            Value::Long(_) => Some(PrimitiveKind::Long),
            Value::Float(_) => Some(PrimitiveKind::Float),
            Value::Double(_) => Some(PrimitiveKind::Double),
            _ => None,
        }
    }

    fn type_error(&self, expected: &'static str, operation: &'static str) -> RuntimeErrorKind {
        RuntimeErrorKind::TypeError {
            expected,
            got: self.class_name().to_string(),
            operation,
        }
    }

    pub fn as_bool(&self, operation: &'static str) -> Result<bool, RuntimeErrorKind> {
        match self {
            Value::Bool(b) => Ok(*b),
            other => Err(other.type_error("Bool", operation)),
        }
    }

    pub fn as_int(&self, operation: &'static str) -> Result<i32, RuntimeErrorKind> {
        match self {
            Value::Int(i) => Ok(*i),
            other => Err(other.type_error("Int", operation)),
        }
    }

    fn number(&self, operation: &'static str) -> Result<Number, RuntimeErrorKind> {
        Ok(match self {
            Value::Byte(v) => Number::Integer(i64::from(*v)),
            Value::Short(v) => Number::Integer(i64::from(*v)),
            Value::Char(c) => Number::Integer(i64::from(u32::from(*c))),
            Value::Int(v) => Number::Integer(i64::from(*v)),
            Value::Long(v) => Number::Integer(*v),
            Value::Float(v) => Number::Real(f64::from(*v)),
            Value::Double(v) => Number::Real(*v),
            other => return Err(other.type_error("a number", operation)),
        })
    }

    fn from_number(number: Number, kind: PrimitiveKind) -> Value {
        let integer = match number {
            Number::Integer(i) => i,
            Number::Real(r) => r as i64,
        };
        let real = match number {
            Number::Integer(i) => i as f64,
            Number::Real(r) => r,
        };
        match kind {
            PrimitiveKind::Bool => Value::Bool(integer != 0),
            PrimitiveKind::Byte => Value::Byte(integer as i8),
            PrimitiveKind::Short => Value::Short(integer as i16),
            PrimitiveKind::Char => Value::Char(char::from_u32(u32::from(integer as u16)).unwrap_or('\u{fffd}')),
            PrimitiveKind::Int => Value::Int(integer as i32),
            PrimitiveKind::Long => Value::Long(integer),
            PrimitiveKind::Float => Value::Float(real as f32),
            PrimitiveKind::Double => Value::Double(real),
        }
    }

    /// Numeric conversion between primitive kinds
    pub fn convert(&self, to: PrimitiveKind) -> Result<Value, RuntimeErrorKind> {
        if let Value::Bool(b) = self {
            return if to == PrimitiveKind::Bool {
                Ok(Value::Bool(*b))
            } else {
                Err(self.type_error("a number", "convert"))
            };
        }
        Ok(Value::from_number(self.number("convert")?, to))
    }

    /// Binary arithmetic in `kind`; integral kinds wrap
    pub fn arithmetic(
        op: ArithOp,
        kind: PrimitiveKind,
        a: &Value,
        b: &Value,
    ) -> Result<Value, RuntimeErrorKind> {
        let operation = op.name();
        match (a.number(operation)?, b.number(operation)?) {
            (Number::Integer(x), Number::Integer(y)) if kind != PrimitiveKind::Float && kind != PrimitiveKind::Double => {
                let result = match op {
                    ArithOp::Add => x.wrapping_add(y),
                    ArithOp::Sub => x.wrapping_sub(y),
                    ArithOp::Mul => x.wrapping_mul(y),
                    ArithOp::Div | ArithOp::Rem if y == 0 => {
                        return Err(RuntimeErrorKind::DivisionByZero)
                    }
                    ArithOp::Div => x.wrapping_div(y),
                    ArithOp::Rem => x.wrapping_rem(y),
                };
                Ok(Value::from_number(Number::Integer(result), kind))
            }
            (x, y) => {
                let (x, y) = (real(x), real(y));
                let result = match op {
                    ArithOp::Add => x + y,
                    ArithOp::Sub => x - y,
                    ArithOp::Mul => x * y,
                    ArithOp::Div => x / y,
                    ArithOp::Rem => x % y,
                };
                Ok(Value::from_number(Number::Real(result), kind))
            }
        }
    }

    pub fn negate(&self, kind: PrimitiveKind) -> Result<Value, RuntimeErrorKind> {
        match self.number("negate")? {
            Number::Integer(i) => Ok(Value::from_number(Number::Integer(i.wrapping_neg()), kind)),
            Number::Real(r) => Ok(Value::from_number(Number::Real(-r), kind)),
        }
    }

    /// Three-way comparison as -1, 0 or 1
    pub fn compare(a: &Value, b: &Value) -> Result<i32, RuntimeErrorKind> {
        let ordering = match (a, b) {
            (Value::Str(x), Value::Str(y)) => x.cmp(y),
            (Value::Bool(x), Value::Bool(y)) => x.cmp(y),
            _ => match (a.number("compare")?, b.number("compare")?) {
                (Number::Integer(x), Number::Integer(y)) => x.cmp(&y),
                (x, y) => real(x).total_cmp(&real(y)),
            },
        };
        Ok(ordering as i32)
    }

    /// Reference identity; primitives and strings compare by value
    #[must_use]
    pub fn same(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            (Value::Tuple(a), Value::Tuple(b)) => Rc::ptr_eq(a, b),
            _ => self.structural_eq(other),
        }
    }

    /// Structural equality, as used by `==`
    ///
    /// Primitives of different kinds are never equal.
    #[must_use]
    pub fn structural_eq(&self, other: &Value) -> bool {
        match (self, other) {
            (Value::Null, Value::Null) | (Value::Unit, Value::Unit) => true,
            (Value::Bool(a), Value::Bool(b)) => a == b,
            (Value::Byte(a), Value::Byte(b)) => a == b,
            (Value::Short(a), Value::Short(b)) => a == b,
            (Value::Char(a), Value::Char(b)) => a == b,
            (Value::Int(a), Value::Int(b)) => a == b,
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Float(a), Value::Float(b)) => a.to_bits() == b.to_bits(),
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Tuple(a), Value::Tuple(b)) => {
                Rc::ptr_eq(a, b) || {
                    let (a, b) = (a.borrow(), b.borrow());
                    a.len() == b.len() && a.iter().zip(b.iter()).all(|(x, y)| x.structural_eq(y))
                }
            }
            (Value::Object(a), Value::Object(b)) => Rc::ptr_eq(a, b),
            (Value::Closure(a), Value::Closure(b)) => Rc::ptr_eq(a, b),
            _ => false,
        }
    }
}

fn real(number: Number) -> f64 {
    match number {
        Number::Integer(i) => i as f64,
        Number::Real(r) => r,
    }
}

/// Binary arithmetic operations shared by instructions and operator methods
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArithOp {
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl ArithOp {
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            ArithOp::Add => "add",
            ArithOp::Sub => "sub",
            ArithOp::Mul => "mul",
            ArithOp::Div => "div",
            ArithOp::Rem => "rem",
        }
    }
}

impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        self.structural_eq(other)
    }
}

impl fmt::Debug for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Str(s) => write!(f, "{s:?}"),
            Value::Char(c) => write!(f, "{c:?}"),
            Value::Long(v) => write!(f, "{v}L"),
            Value::Float(v) => write!(f, "{v}f"),
            other => write!(f, "{other}"),
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => write!(f, "null"),
            Value::Unit => write!(f, "Unit"),
            Value::Bool(b) => write!(f, "{b}"),
            Value::Byte(v) => write!(f, "{v}"),
            Value::Short(v) => write!(f, "{v}"),
            Value::Char(c) => write!(f, "{c}"),
            Value::Int(v) => write!(f, "{v}"),
            Value::Long(v) => write!(f, "{v}"),
            Value::Float(v) => write!(f, "{v}"),
            Value::Double(v) => write!(f, "{v}"),
            Value::Str(s) => write!(f, "{s}"),
            Value::Object(object) => write!(f, "<{}>", object.class),
            Value::Closure(closure) => write!(f, "<fn {}>", closure.function.name),
            Value::Tuple(items) => {
                write!(f, "(")?;
                for (i, item) in items.borrow().iter().enumerate() {
                    if i > 0 {
                        write!(f, ", ")?;
                    }
                    write!(f, "{item}")?;
                }
                write!(f, ")")
            }
        }
    }
}
