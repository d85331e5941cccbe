//! Typed expression nodes

use std::rc::Rc;

use crate::span::Span;
use crate::types::{PrimitiveKind, Type};

use super::{Label, MethodRef, PropertyDescriptor, ResolvedCall, Spanned, Stmt, VarId, VariableDescriptor};

/// Binary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BinaryOp {
    // Arithmetic, lowered through the resolved operator call
    /// Addition (+)
    Plus,
    /// Subtraction (-)
    Minus,
    /// Multiplication (*)
    Times,
    /// Division (/)
    Div,
    /// Remainder (%)
    Rem,

    // Comparison
    /// Less than (<)
    Lt,
    /// Less than or equal (<=)
    Le,
    /// Greater than (>)
    Gt,
    /// Greater than or equal (>=)
    Ge,
    /// Structural equality (==)
    Eq,
    /// Structural inequality (!=)
    NotEq,
    /// Reference identity (===)
    Identity,
    /// Negated identity (!==)
    NotIdentity,

    // Logical
    /// Short-circuit AND (&&)
    And,
    /// Short-circuit OR (||)
    Or,

    /// Elvis (?:)
    Elvis,
}

impl BinaryOp {
    /// Returns the symbol representation of the operator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Plus => "+",
            BinaryOp::Minus => "-",
            BinaryOp::Times => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Eq => "==",
            BinaryOp::NotEq => "!=",
            BinaryOp::Identity => "===",
            BinaryOp::NotIdentity => "!==",
            BinaryOp::And => "&&",
            BinaryOp::Or => "||",
            BinaryOp::Elvis => "?:",
        }
    }

    /// Parse an operator token
    #[must_use]
    pub fn from_token(token: &str) -> Option<Self> {
        const ALL: [BinaryOp; 16] = [
            BinaryOp::Plus,
            BinaryOp::Minus,
            BinaryOp::Times,
            BinaryOp::Div,
            BinaryOp::Rem,
            BinaryOp::Lt,
            BinaryOp::Le,
            BinaryOp::Gt,
            BinaryOp::Ge,
            BinaryOp::Eq,
            BinaryOp::NotEq,
            BinaryOp::Identity,
            BinaryOp::NotIdentity,
            BinaryOp::And,
            BinaryOp::Or,
            BinaryOp::Elvis,
        ];
        ALL.into_iter().find(|op| op.as_str() == token)
    }

    /// The conventional operator method name (`plus`, `compareTo`, ...)
    #[must_use]
    pub const fn method_name(self) -> Option<&'static str> {
        match self {
            BinaryOp::Plus => Some("plus"),
            BinaryOp::Minus => Some("minus"),
            BinaryOp::Times => Some("times"),
            BinaryOp::Div => Some("div"),
            BinaryOp::Rem => Some("rem"),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => Some("compareTo"),
            BinaryOp::Eq | BinaryOp::NotEq => Some("equals"),
            _ => None,
        }
    }

    #[must_use]
    pub const fn is_relational(self) -> bool {
        matches!(self, BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge)
    }
}

/// Unary operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum UnaryOp {
    /// Negation (-)
    Minus,
    /// Unary plus (+)
    Plus,
    /// Logical NOT (!)
    Not,
}

impl UnaryOp {
    /// Returns the symbol representation of the operator
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            UnaryOp::Minus => "-",
            UnaryOp::Plus => "+",
            UnaryOp::Not => "!",
        }
    }
}

/// Literal values
#[derive(Debug, Clone, PartialEq)]
pub enum Literal {
    Null,
    Bool(bool),
    Byte(i8),
    Short(i16),
    Char(char),
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    String(Rc<str>),
}

impl Literal {
    /// The static type of the literal
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            Literal::Null => Type::Nothing,
            Literal::Bool(_) => Type::Primitive(PrimitiveKind::Bool),
            Literal::Byte(_) => Type::Primitive(PrimitiveKind::Byte),
            Literal::Short(_) => Type::Primitive(PrimitiveKind::Short),
            Literal::Char(_) => Type::Primitive(PrimitiveKind::Char),
            Literal::Int(_) => Type::Primitive(PrimitiveKind::Int),
            Literal::Long(_) => Type::Primitive(PrimitiveKind::Long),
            Literal::Float(_) => Type::Primitive(PrimitiveKind::Float),
            Literal::Double(_) => Type::Primitive(PrimitiveKind::Double),
            Literal::String(_) => Type::String,
        }
    }
}

/// A typed expression with source location
#[derive(Debug, Clone, PartialEq)]
pub struct Expr {
    /// The kind of expression
    pub kind: ExprKind,
    /// Static type inferred by the front end
    pub ty: Type,
    /// Source location
    pub span: Span,
}

impl Expr {
    /// Create a new expression
    #[must_use]
    pub fn new(kind: ExprKind, ty: Type, span: Span) -> Self {
        Self { kind, ty, span }
    }

    /// Create a literal expression typed after the literal
    #[must_use]
    pub fn literal(lit: Literal, span: Span) -> Self {
        let ty = lit.ty();
        Self::new(ExprKind::Literal(lit), ty, span)
    }

    /// Create a reference to a declared variable
    #[must_use]
    pub fn variable(var: &VariableDescriptor, span: Span) -> Self {
        Self::new(ExprKind::Variable(var.id), var.ty.clone(), span)
    }

    /// Whether this is an empty block with no trailing value
    #[must_use]
    pub fn is_empty_block(&self) -> bool {
        matches!(&self.kind, ExprKind::Block(block) if block.stmts.is_empty() && block.value.is_none())
    }
}

impl Spanned for Expr {
    fn span(&self) -> Span {
        self.span
    }
}

/// A block of statements with an optional trailing value expression
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub stmts: Vec<Stmt>,
    pub value: Option<Box<Expr>>,
}

impl Block {
    #[must_use]
    pub fn new(stmts: Vec<Stmt>, value: Option<Expr>) -> Self {
        Self {
            stmts,
            value: value.map(Box::new),
        }
    }
}

/// The kind of expression (without type or source location)
#[derive(Debug, Clone, PartialEq)]
pub enum ExprKind {
    /// Literal value (42, 3.14, "hello", true, null)
    Literal(Literal),

    /// Reference to a resolved local, parameter or captured variable
    Variable(VarId),

    /// The enclosing instance (`this`)
    This,

    /// Property read or write target (`a.x`, `x`, `Owner.x`)
    Property {
        receiver: Option<Box<Expr>>,
        property: PropertyDescriptor,
    },

    /// Indexer access (`a[i, j]`)
    Index {
        receiver: Box<Expr>,
        indices: Vec<Expr>,
        get: ResolvedCall,
        set: Option<ResolvedCall>,
    },

    /// Positional tuple component (`t.0`)
    TupleElement { tuple: Box<Expr>, index: u8 },

    /// Method or function call
    Call {
        receiver: Option<Box<Expr>>,
        call: ResolvedCall,
        args: Vec<Expr>,
        /// `a?.f()`
        safe: bool,
    },

    /// Constructor call
    New {
        constructor: MethodRef,
        args: Vec<Expr>,
    },

    /// Unary operator lowered through its operator call
    Unary {
        op: UnaryOp,
        operand: Box<Expr>,
        call: ResolvedCall,
    },

    /// Binary operator; `call` is absent for `&&`, `||`, `===`, `!==` and `?:`
    Binary {
        op: BinaryOp,
        left: Box<Expr>,
        right: Box<Expr>,
        call: Option<ResolvedCall>,
    },

    /// Plain assignment (`a = b`)
    Assign { target: Box<Expr>, value: Box<Expr> },

    /// Augmented assignment (`a += b`); `call` is `plus` or `plusAssign`
    AugAssign {
        target: Box<Expr>,
        value: Box<Expr>,
        call: ResolvedCall,
    },

    /// `++a`, `a++`, `--a`, `a--`; `call` is `inc` or `dec`
    IncDec {
        target: Box<Expr>,
        prefix: bool,
        call: ResolvedCall,
    },

    /// Type test (`a is T`, `a !is T`)
    Is {
        operand: Box<Expr>,
        ty: Type,
        negated: bool,
    },

    /// Cast (`a as T`, `a as? T`)
    Cast {
        operand: Box<Expr>,
        ty: Type,
        safe: bool,
    },

    /// If expression
    If {
        cond: Box<Expr>,
        then_branch: Option<Box<Expr>>,
        else_branch: Option<Box<Expr>>,
    },

    /// When expression
    When {
        subject: Option<Box<Expr>>,
        entries: Vec<WhenEntry>,
    },

    /// Block expression
    Block(Block),

    While {
        label: Option<Label>,
        cond: Box<Expr>,
        body: Box<Expr>,
    },

    DoWhile {
        label: Option<Label>,
        body: Box<Expr>,
        cond: Box<Expr>,
    },

    /// `for (x in iterable)` through the iterator protocol
    ForIn(ForIn),

    /// `for (i in a..b)` / `for (i in a until b)`
    ForRange(ForRange),

    Break(Option<Label>),
    Continue(Option<Label>),
    Return(Option<Box<Expr>>),
    Throw(Box<Expr>),

    /// Function literal
    Closure(FunctionLiteral),
}

impl ExprKind {
    /// Short rendering of the node kind for diagnostics
    #[must_use]
    pub const fn describe(&self) -> &'static str {
        match self {
            ExprKind::Literal(_) => "literal",
            ExprKind::Variable(_) => "variable reference",
            ExprKind::This => "this",
            ExprKind::Property { .. } => "property access",
            ExprKind::Index { .. } => "index access",
            ExprKind::TupleElement { .. } => "tuple component",
            ExprKind::Call { .. } => "call",
            ExprKind::New { .. } => "constructor call",
            ExprKind::Unary { .. } => "unary expression",
            ExprKind::Binary { .. } => "binary expression",
            ExprKind::Assign { .. } => "assignment",
            ExprKind::AugAssign { .. } => "augmented assignment",
            ExprKind::IncDec { .. } => "increment/decrement",
            ExprKind::Is { .. } => "type test",
            ExprKind::Cast { .. } => "cast",
            ExprKind::If { .. } => "if expression",
            ExprKind::When { .. } => "when expression",
            ExprKind::Block(_) => "block",
            ExprKind::While { .. } => "while loop",
            ExprKind::DoWhile { .. } => "do-while loop",
            ExprKind::ForIn(_) => "for-in loop",
            ExprKind::ForRange(_) => "range loop",
            ExprKind::Break(_) => "break",
            ExprKind::Continue(_) => "continue",
            ExprKind::Return(_) => "return",
            ExprKind::Throw(_) => "throw",
            ExprKind::Closure(_) => "function literal",
        }
    }
}

/// One entry of a `when`; no conditions means `else`
#[derive(Debug, Clone, PartialEq)]
pub struct WhenEntry {
    pub conditions: Vec<WhenCondition>,
    pub body: Expr,
    pub span: Span,
}

impl WhenEntry {
    #[must_use]
    pub fn is_else(&self) -> bool {
        self.conditions.is_empty()
    }
}

/// A single test of a `when` entry
#[derive(Debug, Clone, PartialEq)]
pub enum WhenCondition {
    /// `is T` / `!is T` against the subject
    Is { ty: Type, negated: bool },
    /// Structural equality with the subject
    Equals(Expr),
    /// Boolean predicate (subject-less `when`)
    Predicate(Expr),
}

/// `for (var in iterable) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForIn {
    pub label: Option<Label>,
    pub var: VariableDescriptor,
    pub iterable: Box<Expr>,
    /// `iterable.iterator()`
    pub iterator: ResolvedCall,
    /// `iterator.hasNext()`
    pub has_next: ResolvedCall,
    /// `iterator.next()`
    pub next: ResolvedCall,
    pub body: Box<Expr>,
}

/// `for (var in start..end) body`
#[derive(Debug, Clone, PartialEq)]
pub struct ForRange {
    pub label: Option<Label>,
    pub var: VariableDescriptor,
    pub start: Box<Expr>,
    pub end: Box<Expr>,
    /// `..` when true, `until` when false
    pub inclusive: bool,
    pub body: Box<Expr>,
}

/// A function literal and what it captures from the enclosing function
#[derive(Debug, Clone, PartialEq)]
pub struct FunctionLiteral {
    pub name: Option<Rc<str>>,
    /// Parameters, slotted from 1 (slot 0 is the closure object)
    pub params: Vec<VariableDescriptor>,
    pub captures: Vec<Capture>,
    pub body: Box<Expr>,
    pub return_type: Type,
    /// Number of slots the front end assigned to parameters and locals
    pub frame_size: u16,
}

/// Something a function literal captures
#[derive(Debug, Clone, PartialEq)]
pub enum Capture {
    /// A local of the enclosing function, stored in field `$name`
    Variable(VariableDescriptor),
    /// The enclosing instance, stored in field `this$0`
    OuterThis(Type),
}
