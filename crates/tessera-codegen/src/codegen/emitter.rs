//! Instruction sink handed to every `StackValue` operation

use std::rc::Rc;

use crate::ast::{CallKind, Literal, MethodRef};
use crate::bytecode::{Chunk, CodegenError, CodegenErrorKind, CodegenResult, Constant, Function, OpCode, Reservation};
use crate::span::Span;
use crate::types::{PrimitiveKind, Type};

use super::coercion::Coercion;
use super::stack_value::StackValue;

/// Wraps the chunk of the function being lowered.
///
/// Besides writing instructions it tracks the operand stack depth (so the
/// finished function knows its exact maximum), the span used for line info
/// and errors, the coercion strategy, and how to reach the implicit `this`.
pub struct Emitter {
    chunk: Chunk,
    coercion: Rc<dyn Coercion>,
    implicit_this: Option<StackValue>,
    span: Span,
    depth: u32,
    max_depth: u32,
}

impl Emitter {
    #[must_use]
    pub fn new(chunk: Chunk, coercion: Rc<dyn Coercion>) -> Self {
        Self {
            chunk,
            coercion,
            implicit_this: None,
            span: Span::dummy(),
            depth: 0,
            max_depth: 0,
        }
    }

    /// Set how the implicit receiver is reached (slot 0, `this$0`, or not at all)
    pub fn set_implicit_this(&mut self, value: Option<StackValue>) {
        self.implicit_this = value;
    }

    /// The implicit receiver of the function being lowered
    pub fn implicit_receiver(&self) -> CodegenResult<StackValue> {
        self.implicit_this
            .clone()
            .ok_or_else(|| self.error(CodegenErrorKind::NoImplicitReceiver))
    }

    /// Set the span of the node being lowered, returning the previous one
    pub fn set_span(&mut self, span: Span) -> Span {
        std::mem::replace(&mut self.span, span)
    }

    #[must_use]
    pub fn span(&self) -> Span {
        self.span
    }

    fn line(&self) -> u32 {
        self.span.line
    }

    /// Build an error located at the current node
    #[must_use]
    pub fn error(&self, kind: CodegenErrorKind) -> CodegenError {
        CodegenError::new(kind, self.span)
    }

    // ===== Stack depth =====

    #[must_use]
    pub fn depth(&self) -> u32 {
        self.depth
    }

    /// Reset the tracked depth, used where control flow merges
    pub fn set_depth(&mut self, depth: u32) {
        self.depth = depth;
    }

    #[must_use]
    pub fn max_depth(&self) -> u32 {
        self.max_depth
    }

    fn adjust(&mut self, delta: i32) {
        let depth = i64::from(self.depth) + i64::from(delta);
        debug_assert!(depth >= 0, "operand stack underflow at {}", self.span);
        self.depth = u32::try_from(depth).unwrap_or(0);
        self.max_depth = self.max_depth.max(self.depth);
    }

    // ===== Plain instructions =====

    /// Emit an instruction without operands
    pub fn op(&mut self, op: OpCode) {
        debug_assert_eq!(op.size(), 1, "{op} takes operands");
        self.chunk.write_op(op, self.line());
        self.adjust(op.stack_effect().unwrap_or(0));
    }

    /// Emit an instruction with a primitive kind operand
    pub fn op_kind(&mut self, op: OpCode, kind: PrimitiveKind) {
        self.chunk.write_op_u8(op, kind as u8, self.line());
        self.adjust(op.stack_effect().unwrap_or(0));
    }

    pub fn convert(&mut self, from: PrimitiveKind, to: PrimitiveKind) {
        self.chunk
            .write_op_u8_u8(OpCode::Convert, from as u8, to as u8, self.line());
    }

    pub fn load_local(&mut self, slot: u16) {
        self.chunk.write_op_u16(OpCode::LoadLocal, slot, self.line());
        self.adjust(1);
    }

    pub fn store_local(&mut self, slot: u16) {
        self.chunk.write_op_u16(OpCode::StoreLocal, slot, self.line());
        self.adjust(-1);
    }

    // ===== Constant pool =====

    fn constant_index(&mut self, constant: Constant) -> CodegenResult<u16> {
        self.chunk
            .add_constant(constant)
            .ok_or_else(|| self.error(CodegenErrorKind::TooManyConstants))
    }

    fn op_constant(&mut self, op: OpCode, constant: Constant) -> CodegenResult<()> {
        let index = self.constant_index(constant)?;
        self.chunk.write_op_u16(op, index, self.line());
        self.adjust(op.stack_effect().unwrap_or(0));
        Ok(())
    }

    pub fn push_constant(&mut self, constant: Constant) -> CodegenResult<()> {
        self.op_constant(OpCode::Const, constant)
    }

    pub fn push_literal(&mut self, literal: &Literal) -> CodegenResult<()> {
        match literal {
            Literal::Null => self.op(OpCode::Null),
            Literal::Bool(true) => self.op(OpCode::True),
            Literal::Bool(false) => self.op(OpCode::False),
            other => {
                if let Some(constant) = Constant::from_literal(other) {
                    self.push_constant(constant)?;
                }
            }
        }
        Ok(())
    }

    pub fn push_int(&mut self, value: i32) -> CodegenResult<()> {
        self.push_constant(Constant::Int(value))
    }

    pub fn push_string(&mut self, value: &str) -> CodegenResult<()> {
        self.push_constant(Constant::String(Rc::from(value)))
    }

    pub fn get_field(&mut self, name: &str) -> CodegenResult<()> {
        self.op_constant(OpCode::GetField, Constant::Name(Rc::from(name)))
    }

    pub fn set_field(&mut self, name: &str) -> CodegenResult<()> {
        self.op_constant(OpCode::SetField, Constant::Name(Rc::from(name)))
    }

    pub fn new_object(&mut self, class: &Type) -> CodegenResult<()> {
        self.op_constant(OpCode::New, Constant::Name(Rc::from(class.class_name())))
    }

    pub fn instance_of(&mut self, ty: &Type) -> CodegenResult<()> {
        self.op_constant(OpCode::InstanceOf, Constant::Type(ty.clone()))
    }

    pub fn check_cast(&mut self, ty: &Type) -> CodegenResult<()> {
        self.op_constant(OpCode::CheckCast, Constant::Type(ty.clone()))
    }

    /// Invoke `method`; pops the receiver (unless static) and the arguments,
    /// pushes the result (`Unit` for unit-returning methods)
    pub fn invoke(&mut self, kind: CallKind, method: &MethodRef) -> CodegenResult<()> {
        let op = match kind {
            CallKind::Static => OpCode::InvokeStatic,
            CallKind::Virtual => OpCode::InvokeVirtual,
            CallKind::Special => OpCode::InvokeSpecial,
        };
        let argc = u8::try_from(method.arity())
            .map_err(|_| self.error(CodegenErrorKind::TooManyArguments(method.arity())))?;
        let index = self.constant_index(Constant::Method(Rc::new(method.clone())))?;
        self.chunk.write_op_u16_u8(op, index, argc, self.line());
        let receiver = i32::from(kind != CallKind::Static);
        self.adjust(1 - i32::from(argc) - receiver);
        Ok(())
    }

    /// Pop `captures` values and push a closure over `function`
    pub fn make_closure(&mut self, function: Rc<Function>, captures: usize) -> CodegenResult<()> {
        let count = u8::try_from(captures)
            .map_err(|_| self.error(CodegenErrorKind::TooManyArguments(captures)))?;
        let index = self.constant_index(Constant::Function(function))?;
        self.chunk
            .write_op_u16_u8(OpCode::MakeClosure, index, count, self.line());
        self.adjust(1 - i32::from(count));
        Ok(())
    }

    // ===== Jumps =====

    #[must_use]
    pub fn position(&self) -> usize {
        self.chunk.current_offset()
    }

    /// Emit a jump whose target is patched later
    pub fn reserve(&mut self, op: OpCode) -> Reservation {
        let reservation = self.chunk.reserve_jump(op, self.line());
        self.adjust(op.stack_effect().unwrap_or(0));
        tracing::trace!(op = op.name(), offset = reservation.offset(), "reserved jump");
        reservation
    }

    /// Patch a reservation to the current position
    pub fn patch(&mut self, reservation: Reservation) -> CodegenResult<()> {
        let target = self.position();
        self.patch_to(reservation, target)
    }

    pub fn patch_to(&mut self, reservation: Reservation, target: usize) -> CodegenResult<()> {
        let offset = reservation.offset();
        self.chunk
            .patch_jump_to(reservation, target)
            .map_err(|kind| self.error(kind))?;
        tracing::trace!(offset, target, "patched jump");
        Ok(())
    }

    /// Emit a jump to an already emitted position
    pub fn jump_to(&mut self, op: OpCode, target: usize) -> CodegenResult<()> {
        self.chunk
            .emit_jump_to(op, target, self.line())
            .map_err(|kind| self.error(kind))?;
        self.adjust(op.stack_effect().unwrap_or(0));
        Ok(())
    }

    // ===== Coercion =====

    /// Convert the value on top of the stack from `from` to `to`
    pub fn coerce(&mut self, from: &Type, to: &Type) -> CodegenResult<()> {
        let coercion = Rc::clone(&self.coercion);
        coercion.coerce(from, to, self)
    }

    #[must_use]
    pub fn coercion(&self) -> Rc<dyn Coercion> {
        Rc::clone(&self.coercion)
    }

    #[must_use]
    pub fn chunk(&self) -> &Chunk {
        &self.chunk
    }

    /// Hand out the finished chunk and its maximum stack depth
    pub fn finish(self, verify: bool) -> CodegenResult<(Chunk, u32)> {
        if verify {
            self.chunk.finish().map_err(|kind| self.error(kind))?;
        }
        Ok((self.chunk, self.max_depth))
    }
}

impl std::fmt::Debug for Emitter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Emitter")
            .field("chunk", &self.chunk)
            .field("depth", &self.depth)
            .field("max_depth", &self.max_depth)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::codegen::StandardCoercion;

    fn emitter() -> Emitter {
        Emitter::new(Chunk::new(), Rc::new(StandardCoercion))
    }

    #[test]
    fn depth_tracks_max() {
        let mut v = emitter();
        v.push_int(1).unwrap();
        v.push_int(2).unwrap();
        v.op_kind(OpCode::Add, PrimitiveKind::Int);
        assert_eq!(v.depth(), 1);
        assert_eq!(v.max_depth(), 2);
    }

    #[test]
    fn invoke_stack_effect() {
        let mut v = emitter();
        let method = MethodRef::new(Type::String, "plus", vec![Type::any_nullable()], Type::String);
        v.push_string("a").unwrap();
        v.push_string("b").unwrap();
        v.invoke(CallKind::Virtual, &method).unwrap();
        assert_eq!(v.depth(), 1);

        let stat = MethodRef::new(Type::class("Math"), "max", vec![Type::int(), Type::int()], Type::int());
        v.push_int(1).unwrap();
        v.push_int(2).unwrap();
        v.invoke(CallKind::Static, &stat).unwrap();
        assert_eq!(v.depth(), 2);
    }

    #[test]
    fn unpatched_reservation_fails_finish() {
        let mut v = emitter();
        v.op(OpCode::True);
        let _pending = v.reserve(OpCode::JumpIfFalse);
        let err = v.finish(true).unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::UnpatchedJumps(1));
    }

    #[test]
    fn missing_implicit_receiver() {
        let v = emitter();
        let err = v.implicit_receiver().unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::NoImplicitReceiver);
    }
}
