//! Helpers for building typed trees in tests
//!
//! [`TreeBuilder`] plays the part of the front end: it hands out variable
//! descriptors with frame slots, resolves operator calls for primitive and
//! string operands, and gives every node a distinct, non-synthesized span.

use std::cell::Cell;
use std::error::Error;
use std::rc::Rc;

use crate::ast::{
    BinaryOp, Block, Capture, Expr, ExprKind, ForIn, ForRange, FunctionDecl, FunctionLiteral,
    Label, Literal, MethodRef, PropertyDescriptor, ResolvedCall, Span, Stmt, StmtKind, UnaryOp,
    VariableDescriptor, WhenCondition, WhenEntry,
};
use crate::codegen::Codegen;
use crate::types::Type;
use crate::vm::{Value, TUPLE_ITERATOR_CLASS, VM};

/// Result type for fallible tests
pub type TestResult = Result<(), Box<dyn Error>>;

/// Builds typed, resolved trees the way a front end would
#[derive(Debug, Default)]
pub struct TreeBuilder {
    next_id: Cell<u32>,
    next_slot: Cell<u16>,
    /// Highest parameter slot handed out plus one
    param_slots: Cell<u16>,
    offset: Cell<u32>,
}

impl TreeBuilder {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// A builder for method bodies; slot 0 holds `this`
    #[must_use]
    pub fn for_method() -> Self {
        let builder = Self::default();
        builder.next_slot.set(1);
        builder
    }

    /// A fresh span on its own line
    pub fn span(&self) -> Span {
        let start = self.offset.get();
        self.offset.set(start + 1);
        Span::new(start, start + 1).with_line(start + 1)
    }

    /// Slots used by the variables handed out so far
    #[must_use]
    pub fn frame_size(&self) -> u16 {
        self.next_slot.get().max(self.param_slots.get())
    }

    fn next_id(&self) -> u32 {
        let id = self.next_id.get();
        self.next_id.set(id + 1);
        id
    }

    // ===== Variables =====

    /// A local in the next free slot
    pub fn local(&mut self, name: &str, ty: Type) -> VariableDescriptor {
        let slot = self.next_slot.get();
        self.next_slot.set(slot + 1);
        VariableDescriptor::new(self.next_id(), name, ty, slot)
    }

    /// A parameter in a fixed slot (function literals start at 1)
    pub fn param(&mut self, slot: u16, name: &str, ty: Type) -> VariableDescriptor {
        self.param_slots.set(self.param_slots.get().max(slot + 1));
        VariableDescriptor::new(self.next_id(), name, ty, slot)
    }

    pub fn var(&self, var: &VariableDescriptor) -> Expr {
        Expr::variable(var, self.span())
    }

    pub fn declare(&self, var: &VariableDescriptor, init: Option<Expr>) -> Stmt {
        Stmt::local(var.clone(), init, self.span())
    }

    /// `val (a, b, ...) = init`
    pub fn destructure(&self, vars: Vec<VariableDescriptor>, init: Expr) -> Stmt {
        Stmt::new(StmtKind::Destructure { vars, init }, self.span())
    }

    pub fn stmt(&self, expr: Expr) -> Stmt {
        Stmt::expr(expr)
    }

    // ===== Literals =====

    pub fn literal(&self, literal: Literal) -> Expr {
        Expr::literal(literal, self.span())
    }

    pub fn int(&self, value: i32) -> Expr {
        self.literal(Literal::Int(value))
    }

    pub fn long(&self, value: i64) -> Expr {
        self.literal(Literal::Long(value))
    }

    pub fn double(&self, value: f64) -> Expr {
        self.literal(Literal::Double(value))
    }

    pub fn char(&self, value: char) -> Expr {
        self.literal(Literal::Char(value))
    }

    pub fn bool(&self, value: bool) -> Expr {
        self.literal(Literal::Bool(value))
    }

    pub fn string(&self, value: &str) -> Expr {
        self.literal(Literal::String(Rc::from(value)))
    }

    pub fn null(&self) -> Expr {
        self.literal(Literal::Null)
    }

    /// An empty block typed `Unit`
    pub fn unit(&self) -> Expr {
        self.expr(ExprKind::Block(Block::default()), Type::Unit)
    }

    /// A literal statically typed as `ty` (e.g. `1` seen as `Any?`)
    pub fn typed(&self, literal: Expr, ty: Type) -> Expr {
        Expr::new(literal.kind, ty, literal.span)
    }

    // ===== Composite expressions =====

    pub fn expr(&self, kind: ExprKind, ty: Type) -> Expr {
        Expr::new(kind, ty, self.span())
    }

    pub fn block(&self, stmts: Vec<Stmt>, value: Option<Expr>) -> Expr {
        let ty = value.as_ref().map_or(Type::Unit, |value| value.ty.clone());
        self.expr(ExprKind::Block(Block::new(stmts, value)), ty)
    }

    /// A binary operator with its operator call resolved on the left operand
    pub fn binary_op(&self, op: BinaryOp, left: Expr, right: Expr) -> Expr {
        let owner = left.ty.non_null().clone();
        let (call, ty) = match op {
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Div | BinaryOp::Rem => {
                let name = op.method_name().unwrap_or("plus");
                let method = MethodRef::new(owner.clone(), name, vec![right.ty.clone()], owner.clone());
                (Some(ResolvedCall::virtual_call(method)), owner)
            }
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let method = MethodRef::new(owner, "compareTo", vec![right.ty.clone()], Type::int());
                (Some(ResolvedCall::virtual_call(method)), Type::bool())
            }
            BinaryOp::Eq | BinaryOp::NotEq => {
                let method = MethodRef::new(owner, "equals", vec![Type::any_nullable()], Type::bool());
                (Some(ResolvedCall::virtual_call(method)), Type::bool())
            }
            BinaryOp::Identity | BinaryOp::NotIdentity | BinaryOp::And | BinaryOp::Or => {
                (None, Type::bool())
            }
            BinaryOp::Elvis => (None, right.ty.clone()),
        };
        self.expr(
            ExprKind::Binary {
                op,
                left: Box::new(left),
                right: Box::new(right),
                call,
            },
            ty,
        )
    }

    pub fn unary_op(&self, op: UnaryOp, operand: Expr) -> Expr {
        let ty = operand.ty.clone();
        let name = match op {
            UnaryOp::Minus => "unaryMinus",
            UnaryOp::Plus => "unaryPlus",
            UnaryOp::Not => "not",
        };
        let call = ResolvedCall::virtual_call(MethodRef::new(ty.clone(), name, Vec::new(), ty.clone()));
        self.expr(
            ExprKind::Unary {
                op,
                operand: Box::new(operand),
                call,
            },
            ty,
        )
    }

    pub fn assign(&self, target: Expr, value: Expr) -> Expr {
        self.expr(
            ExprKind::Assign {
                target: Box::new(target),
                value: Box::new(value),
            },
            Type::Unit,
        )
    }

    /// `target op= value` through the plain operator (`plus`, `minus`, ...)
    pub fn aug_assign(&self, op: BinaryOp, target: Expr, value: Expr) -> Expr {
        let ty = target.ty.clone();
        let name = op.method_name().unwrap_or("plus");
        let call = ResolvedCall::virtual_call(MethodRef::new(ty.clone(), name, vec![value.ty.clone()], ty));
        self.expr(
            ExprKind::AugAssign {
                target: Box::new(target),
                value: Box::new(value),
                call,
            },
            Type::Unit,
        )
    }

    /// `++target` / `target++` (or the `dec` forms)
    pub fn inc_dec(&self, target: Expr, prefix: bool, increment: bool) -> Expr {
        let ty = target.ty.clone();
        let name = if increment { "inc" } else { "dec" };
        let call = ResolvedCall::virtual_call(MethodRef::new(ty.clone(), name, Vec::new(), ty.clone()));
        self.expr(
            ExprKind::IncDec {
                target: Box::new(target),
                prefix,
                call,
            },
            ty,
        )
    }

    pub fn is(&self, operand: Expr, ty: Type) -> Expr {
        self.expr(
            ExprKind::Is {
                operand: Box::new(operand),
                ty,
                negated: false,
            },
            Type::bool(),
        )
    }

    /// `operand as ty`, or `as?` when `safe`
    pub fn cast(&self, operand: Expr, ty: Type, safe: bool) -> Expr {
        let result = if safe { ty.clone().nullable() } else { ty.clone() };
        self.expr(
            ExprKind::Cast {
                operand: Box::new(operand),
                ty,
                safe,
            },
            result,
        )
    }

    pub fn property(&self, receiver: Option<Expr>, property: PropertyDescriptor) -> Expr {
        let ty = property.ty.clone();
        self.expr(
            ExprKind::Property {
                receiver: receiver.map(Box::new),
                property,
            },
            ty,
        )
    }

    pub fn tuple_element(&self, tuple: Expr, index: u8, ty: Type) -> Expr {
        self.expr(
            ExprKind::TupleElement {
                tuple: Box::new(tuple),
                index,
            },
            ty,
        )
    }

    /// `Tuple.of(items...)`
    pub fn tuple(&self, items: Vec<Expr>) -> Expr {
        let arity = items.len() as u8;
        let method = MethodRef::new(
            Type::class("Tuple"),
            "of",
            vec![Type::any_nullable(); items.len()],
            Type::Tuple(arity),
        );
        self.call(None, ResolvedCall::static_call(method), items)
    }

    pub fn call(&self, receiver: Option<Expr>, call: ResolvedCall, args: Vec<Expr>) -> Expr {
        let ty = call.target.ret.clone();
        self.expr(
            ExprKind::Call {
                receiver: receiver.map(Box::new),
                call,
                args,
                safe: false,
            },
            ty,
        )
    }

    /// `receiver?.method(args)`; the result is nullable
    pub fn safe_call(&self, receiver: Expr, call: ResolvedCall, args: Vec<Expr>) -> Expr {
        let ty = call.target.ret.clone().nullable();
        self.expr(
            ExprKind::Call {
                receiver: Some(Box::new(receiver)),
                call,
                args,
                safe: true,
            },
            ty,
        )
    }

    /// `Class(args)` with an `<init>` taking the argument types
    pub fn new_object(&self, class: &str, args: Vec<Expr>) -> Expr {
        let params = args.iter().map(|arg| arg.ty.clone()).collect();
        let constructor = MethodRef::new(Type::class(class), "<init>", params, Type::Unit);
        self.expr(ExprKind::New { constructor, args }, Type::class(class))
    }

    // ===== Control flow =====

    /// `if (cond) then` as a statement-like `Unit` expression
    pub fn if_then(&self, cond: Expr, then_branch: Expr) -> Expr {
        self.expr(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Some(Box::new(then_branch)),
                else_branch: None,
            },
            Type::Unit,
        )
    }

    pub fn if_else(&self, cond: Expr, then_branch: Expr, else_branch: Expr, ty: Type) -> Expr {
        self.expr(
            ExprKind::If {
                cond: Box::new(cond),
                then_branch: Some(Box::new(then_branch)),
                else_branch: Some(Box::new(else_branch)),
            },
            ty,
        )
    }

    pub fn when(&self, subject: Option<Expr>, entries: Vec<WhenEntry>, ty: Type) -> Expr {
        self.expr(
            ExprKind::When {
                subject: subject.map(Box::new),
                entries,
            },
            ty,
        )
    }

    pub fn when_entry(&self, conditions: Vec<WhenCondition>, body: Expr) -> WhenEntry {
        WhenEntry {
            conditions,
            body,
            span: self.span(),
        }
    }

    pub fn when_is(&self, ty: Type, body: Expr) -> WhenEntry {
        self.when_entry(vec![WhenCondition::Is { ty, negated: false }], body)
    }

    pub fn when_eq(&self, value: Expr, body: Expr) -> WhenEntry {
        self.when_entry(vec![WhenCondition::Equals(value)], body)
    }

    pub fn when_else(&self, body: Expr) -> WhenEntry {
        self.when_entry(Vec::new(), body)
    }

    pub fn while_loop(&self, label: Option<&str>, cond: Expr, body: Expr) -> Expr {
        self.expr(
            ExprKind::While {
                label: label.map(Label::new),
                cond: Box::new(cond),
                body: Box::new(body),
            },
            Type::Unit,
        )
    }

    pub fn do_while(&self, label: Option<&str>, body: Expr, cond: Expr) -> Expr {
        self.expr(
            ExprKind::DoWhile {
                label: label.map(Label::new),
                body: Box::new(body),
                cond: Box::new(cond),
            },
            Type::Unit,
        )
    }

    pub fn for_range(
        &self,
        label: Option<&str>,
        var: &VariableDescriptor,
        start: Expr,
        end: Expr,
        inclusive: bool,
        body: Expr,
    ) -> Expr {
        self.expr(
            ExprKind::ForRange(ForRange {
                label: label.map(Label::new),
                var: var.clone(),
                start: Box::new(start),
                end: Box::new(end),
                inclusive,
                body: Box::new(body),
            }),
            Type::Unit,
        )
    }

    /// `for (var in iterable)` over a tuple through `iterator`/`hasNext`/`next`
    pub fn for_in(
        &self,
        label: Option<&str>,
        var: &VariableDescriptor,
        iterable: Expr,
        body: Expr,
    ) -> Expr {
        let iterator_ty = Type::class(TUPLE_ITERATOR_CLASS);
        let method = |owner: &Type, name: &str, ret: Type| {
            ResolvedCall::virtual_call(MethodRef::new(owner.clone(), name, Vec::new(), ret))
        };
        self.expr(
            ExprKind::ForIn(ForIn {
                label: label.map(Label::new),
                var: var.clone(),
                iterator: method(&iterable.ty, "iterator", iterator_ty.clone()),
                has_next: method(&iterator_ty, "hasNext", Type::bool()),
                next: method(&iterator_ty, "next", Type::any_nullable()),
                iterable: Box::new(iterable),
                body: Box::new(body),
            }),
            Type::Unit,
        )
    }

    pub fn break_to(&self, label: Option<&str>) -> Expr {
        self.expr(ExprKind::Break(label.map(Label::new)), Type::Nothing)
    }

    pub fn continue_to(&self, label: Option<&str>) -> Expr {
        self.expr(ExprKind::Continue(label.map(Label::new)), Type::Nothing)
    }

    /// A function literal; its frame covers every slot handed out so far
    pub fn closure(
        &self,
        params: Vec<VariableDescriptor>,
        captures: Vec<Capture>,
        body: Expr,
        return_type: Type,
    ) -> Expr {
        let arity = params.len() as u8;
        let frame_size = self.frame_size().max(1);
        self.expr(
            ExprKind::Closure(FunctionLiteral {
                name: None,
                params,
                captures,
                body: Box::new(body),
                return_type,
                frame_size,
            }),
            Type::Function(arity),
        )
    }

    /// `function.invoke(args)` on a value of function type
    pub fn invoke(&self, function: Expr, args: Vec<Expr>, ret: Type) -> Expr {
        let arity = args.len() as u8;
        let method = MethodRef::new(
            Type::Function(arity),
            "invoke",
            vec![Type::any_nullable(); args.len()],
            ret,
        );
        self.call(Some(function), ResolvedCall::virtual_call(method), args)
    }
}

/// Lower `expr` as a parameterless function and run it
pub fn run(builder: &TreeBuilder, expr: &Expr) -> Result<Value, Box<dyn Error>> {
    let function = Codegen::default().lower_expression("main", expr, builder.frame_size())?;
    Ok(VM::new().run(function)?)
}

/// Lower a top-level function and call it with `args`
pub fn run_function(decl: &FunctionDecl, args: Vec<Value>) -> Result<Value, Box<dyn Error>> {
    let function = Codegen::default().lower_function(decl)?;
    Ok(VM::new().call(function, args)?)
}
