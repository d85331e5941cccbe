//! Operators, assignments, casts and increments

use crate::ast::{BinaryOp, CallKind, Expr, MethodRef, ResolvedCall};
use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode};
use crate::types::Type;

use super::intrinsics;
use super::stack_value::StackValue;
use super::{FunctionCodegen, TriState};

/// Owner of the static helpers the lowering relies on
pub const INTRINSICS_CLASS: &str = "Intrinsics";

/// `Intrinsics.areEqual(Any?, Any?): Bool`, null-safe structural equality
#[must_use]
pub fn are_equal() -> MethodRef {
    MethodRef::new(
        Type::class(INTRINSICS_CLASS),
        "areEqual",
        vec![Type::any_nullable(), Type::any_nullable()],
        Type::bool(),
    )
}

/// Types of the values an operator call consumes, receiver first
pub(super) fn operand_types(call: &ResolvedCall) -> Vec<Type> {
    match call.dispatch {
        CallKind::Static => call.target.params.clone(),
        CallKind::Virtual | CallKind::Special => std::iter::once(call.target.owner.clone())
            .chain(call.target.params.iter().cloned())
            .collect(),
    }
}

impl FunctionCodegen {
    pub(super) fn gen_binary(
        &mut self,
        expr: &Expr,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        call: Option<&ResolvedCall>,
    ) -> CodegenResult<StackValue> {
        match op {
            BinaryOp::And | BinaryOp::Or => self.gen_logical(op, left, right),
            BinaryOp::Identity | BinaryOp::NotIdentity => {
                let any = Type::any_nullable();
                self.gen_to(left, &any)?;
                self.gen_to(right, &any)?;
                self.v.op(OpCode::Same);
                if op == BinaryOp::NotIdentity {
                    self.v.op(OpCode::Not);
                }
                Ok(StackValue::OnStack(Type::bool()))
            }
            BinaryOp::Eq | BinaryOp::NotEq => self.gen_equality(op, left, right, call),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                let call = self.operator_call(op, call)?;
                let result = self.gen_operator(call, &[left, right])?;
                result.put(&Type::int(), &mut self.v)?;
                self.v.op(OpCode::Sign);
                match op {
                    BinaryOp::Gt => self.test_sentinel(TriState::Greater)?,
                    BinaryOp::Lt => self.test_sentinel(TriState::Lower)?,
                    BinaryOp::Ge => self.test_sentinel_or_equal(TriState::Greater)?,
                    _ => self.test_sentinel_or_equal(TriState::Lower)?,
                }
                Ok(StackValue::OnStack(Type::bool()))
            }
            BinaryOp::Elvis => self.gen_elvis(expr, left, right),
            BinaryOp::Plus | BinaryOp::Minus | BinaryOp::Times | BinaryOp::Div | BinaryOp::Rem => {
                let call = self.operator_call(op, call)?;
                self.gen_operator(call, &[left, right])
            }
        }
    }

    fn operator_call<'a>(
        &self,
        op: BinaryOp,
        call: Option<&'a ResolvedCall>,
    ) -> CodegenResult<&'a ResolvedCall> {
        call.ok_or_else(|| {
            self.v
                .error(CodegenErrorKind::UnknownOperator(op.as_str().to_string()))
        })
    }

    /// Push `operands` as the call expects them and emit the operator
    pub(super) fn gen_operator(
        &mut self,
        call: &ResolvedCall,
        operands: &[&Expr],
    ) -> CodegenResult<StackValue> {
        let types = operand_types(call);
        if types.len() != operands.len() {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "operator {} applied to {} operand(s)",
                call.target,
                operands.len()
            ))));
        }
        for (operand, ty) in operands.iter().zip(&types) {
            self.gen_to(operand, ty)?;
        }
        self.emit_operator(call)?;
        Ok(StackValue::OnStack(call.target.ret.clone()))
    }

    /// Emit an operator whose operands are on the stack
    pub(super) fn emit_operator(&mut self, call: &ResolvedCall) -> CodegenResult<()> {
        if self.options.intrinsics {
            if let Some(intrinsic) = intrinsics::lookup(&call.target) {
                return intrinsic.emit(&mut self.v);
            }
        }
        self.v.invoke(call.dispatch, &call.target)
    }

    pub(super) fn gen_unary(
        &mut self,
        expr: &Expr,
        operand: &Expr,
        call: &ResolvedCall,
    ) -> CodegenResult<StackValue> {
        let result = self.gen_operator(call, &[operand])?;
        if call.target.ret == expr.ty {
            Ok(result)
        } else {
            result.put(&expr.ty, &mut self.v)?;
            Ok(StackValue::OnStack(expr.ty.clone()))
        }
    }

    // ===== Boolean logic =====

    fn gen_logical(&mut self, op: BinaryOp, left: &Expr, right: &Expr) -> CodegenResult<StackValue> {
        let (skip, shortcut) = if op == BinaryOp::And {
            (OpCode::JumpIfFalse, OpCode::False)
        } else {
            (OpCode::JumpIfTrue, OpCode::True)
        };
        let bool_ty = Type::bool();

        self.gen_to(left, &bool_ty)?;
        let base = self.v.depth();
        let short = self.v.reserve(skip);
        self.gen_to(right, &bool_ty)?;
        let end = self.v.reserve(OpCode::Jump);

        self.v.patch(short)?;
        self.v.set_depth(base - 1);
        self.v.op(shortcut);
        self.v.patch(end)?;
        Ok(StackValue::OnStack(bool_ty))
    }

    // ===== Equality and comparison =====

    fn gen_equality(
        &mut self,
        op: BinaryOp,
        left: &Expr,
        right: &Expr,
        call: Option<&ResolvedCall>,
    ) -> CodegenResult<StackValue> {
        match call {
            Some(call) if !left.ty.is_nullable() => {
                let result = self.gen_operator(call, &[left, right])?;
                result.put(&Type::bool(), &mut self.v)?;
            }
            _ => {
                let any = Type::any_nullable();
                self.gen_to(left, &any)?;
                self.gen_to(right, &any)?;
                self.v.invoke(CallKind::Static, &are_equal())?;
            }
        }
        if op == BinaryOp::NotEq {
            self.v.op(OpCode::Not);
        }
        Ok(StackValue::OnStack(Type::bool()))
    }

    /// Replace the sign on top of the stack with `sign == sentinel`
    fn test_sentinel(&mut self, sentinel: TriState) -> CodegenResult<()> {
        let base = self.v.depth() - 1;
        self.v.push_int(sentinel.value())?;
        let matched = self.v.reserve(OpCode::JumpIfEq);
        self.v.op(OpCode::False);
        let end = self.v.reserve(OpCode::Jump);
        self.v.patch(matched)?;
        self.v.set_depth(base);
        self.v.op(OpCode::True);
        self.v.patch(end)
    }

    /// Replace the sign on top of the stack with `sign == sentinel || sign == EQUAL`
    fn test_sentinel_or_equal(&mut self, sentinel: TriState) -> CodegenResult<()> {
        let base = self.v.depth() - 1;
        self.v.op(OpCode::Dup);
        self.v.push_int(sentinel.value())?;
        let strict = self.v.reserve(OpCode::JumpIfEq);
        self.v.push_int(TriState::Equal.value())?;
        let equal = self.v.reserve(OpCode::JumpIfEq);
        self.v.op(OpCode::False);
        let end = self.v.reserve(OpCode::Jump);

        // strict match still has the duplicated sign on the stack
        self.v.patch(strict)?;
        self.v.set_depth(base + 1);
        self.v.op(OpCode::Pop);
        self.v.patch(equal)?;
        self.v.op(OpCode::True);
        self.v.patch(end)
    }

    fn gen_elvis(&mut self, expr: &Expr, left: &Expr, right: &Expr) -> CodegenResult<StackValue> {
        let ty = expr.ty.clone();
        self.gen_to(left, &left.ty)?;
        let base = self.v.depth();
        self.v.op(OpCode::Dup);
        let null = self.v.reserve(OpCode::JumpIfNull);
        self.v.coerce(&left.ty, &ty)?;
        let end = self.v.reserve(OpCode::Jump);

        self.v.patch(null)?;
        self.v.set_depth(base);
        self.v.op(OpCode::Pop);
        self.gen_to(right, &ty)?;
        self.v.patch(end)?;
        Ok(StackValue::OnStack(ty))
    }

    // ===== Casts =====

    pub(super) fn gen_cast(
        &mut self,
        expr: &Expr,
        operand: &Expr,
        target: &Type,
        safe: bool,
    ) -> CodegenResult<StackValue> {
        self.gen_to(operand, &Type::any_nullable())?;
        let base = self.v.depth();
        let mut done = Vec::new();

        if target.is_nullable() {
            self.v.op(OpCode::Dup);
            done.push(self.v.reserve(OpCode::JumpIfNull));
        }
        self.v.op(OpCode::Dup);
        self.v.instance_of(target)?;
        let ok = self.v.reserve(OpCode::JumpIfTrue);

        self.v.op(OpCode::Pop);
        if safe {
            self.v.op(OpCode::Null);
            done.push(self.v.reserve(OpCode::Jump));
        } else {
            let message = format!("{} cannot be cast to {}", operand.ty, target);
            self.throw_new("ClassCastException", &message)?;
        }

        self.v.patch(ok)?;
        self.v.set_depth(base);
        if target.is_reference() {
            self.v.check_cast(target)?;
        }
        self.v.coerce(&Type::any_nullable(), &expr.ty)?;
        for reservation in done {
            self.v.patch(reservation)?;
        }
        Ok(StackValue::OnStack(expr.ty.clone()))
    }

    // ===== Assignments =====

    pub(super) fn gen_assign(&mut self, target: &Expr, value: &Expr) -> CodegenResult<StackValue> {
        let target = self.gen(target)?;
        let ty = target.ty();
        target.put_receiver(&mut self.v)?;
        self.gen_to(value, &ty)?;
        target.store(&ty, &mut self.v)?;
        Ok(StackValue::None)
    }

    /// `a op= b`; `opAssign` operators mutate in place and are not stored back
    pub(super) fn gen_aug_assign(
        &mut self,
        target: &Expr,
        value: &Expr,
        call: &ResolvedCall,
    ) -> CodegenResult<StackValue> {
        let types = operand_types(call);
        let [current_ty, value_ty] = types.as_slice() else {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "augmented assignment through {}",
                call.target
            ))));
        };
        let location = self.gen(target)?;

        if call.target.name.ends_with("Assign") {
            location.load(current_ty, &mut self.v)?;
            self.gen_to(value, value_ty)?;
            self.emit_operator(call)?;
            self.discard(StackValue::OnStack(call.target.ret.clone()))?;
            return Ok(StackValue::None);
        }

        location.put_receiver(&mut self.v)?;
        location.dup_receiver(&mut self.v)?;
        location.put(current_ty, &mut self.v)?;
        self.gen_to(value, value_ty)?;
        self.emit_operator(call)?;
        location.store(&call.target.ret, &mut self.v)?;
        Ok(StackValue::None)
    }

    /// `++a`, `a++`, `--a`, `a--`
    ///
    /// The receiver is evaluated once. When the result is needed a copy of
    /// the old (postfix) or new (prefix) value is tucked under the receiver
    /// before the store.
    pub(super) fn gen_inc_dec(
        &mut self,
        target: &Expr,
        prefix: bool,
        call: &ResolvedCall,
        needed: bool,
    ) -> CodegenResult<StackValue> {
        let types = operand_types(call);
        let [operand_ty] = types.as_slice() else {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "increment through {}",
                call.target
            ))));
        };
        let location = self.gen(target)?;
        let receiver_size = location.receiver_size();
        let ret = call.target.ret.clone();

        location.put_receiver(&mut self.v)?;
        location.dup_receiver(&mut self.v)?;
        location.put(operand_ty, &mut self.v)?;
        if needed && !prefix {
            StackValue::dup_under_receiver(receiver_size, &mut self.v)?;
        }
        self.emit_operator(call)?;
        if needed && prefix {
            StackValue::dup_under_receiver(receiver_size, &mut self.v)?;
        }
        location.store(&ret, &mut self.v)?;

        Ok(match (needed, prefix) {
            (false, _) => StackValue::None,
            (true, true) => StackValue::OnStack(ret),
            (true, false) => StackValue::OnStack(operand_ty.clone()),
        })
    }
}
