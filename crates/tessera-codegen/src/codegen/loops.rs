//! Loops and structured jumps

use crate::ast::{Expr, ForIn, ForRange, Label, ResolvedCall};
use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode, Reservation};
use crate::types::{PrimitiveKind, Type};

use super::binary::operand_types;
use super::stack_value::{one, StackValue};
use super::{FunctionCodegen, TriState};

/// Bookkeeping for one active loop
#[derive(Debug)]
pub(super) struct LoopFrame {
    label: Option<Label>,
    /// Pending jumps to the position after the loop
    breaks: Vec<Reservation>,
    /// Pending jumps to the recheck position
    continues: Vec<Reservation>,
    /// Operand stack depth on entry; jumps out drop anything above it
    depth: u32,
}

impl FunctionCodegen {
    fn enter_loop(&mut self, label: Option<&Label>) {
        tracing::trace!(label = ?label, depth = self.loops.len(), "enter loop");
        self.loops.push(LoopFrame {
            label: label.cloned(),
            breaks: Vec::new(),
            continues: Vec::new(),
            depth: self.v.depth(),
        });
    }

    /// Pop the innermost frame and resolve its pending jumps
    fn exit_loop(&mut self, recheck: usize) -> CodegenResult<()> {
        let Some(frame) = self.loops.pop() else {
            return Ok(());
        };
        tracing::trace!(
            label = ?frame.label,
            breaks = frame.breaks.len(),
            continues = frame.continues.len(),
            "exit loop"
        );
        for jump in frame.continues {
            self.v.patch_to(jump, recheck)?;
        }
        let end = self.v.position();
        for jump in frame.breaks {
            self.v.patch_to(jump, end)?;
        }
        Ok(())
    }

    /// Index of the loop a `break`/`continue` refers to
    fn target_loop(&self, label: Option<&Label>, keyword: &'static str) -> CodegenResult<usize> {
        if self.loops.is_empty() {
            let kind = if keyword == "break" {
                CodegenErrorKind::BreakOutsideLoop
            } else {
                CodegenErrorKind::ContinueOutsideLoop
            };
            return Err(self.v.error(kind));
        }
        match label {
            None => Ok(self.loops.len() - 1),
            Some(label) => self
                .loops
                .iter()
                .rposition(|frame| frame.label.as_ref() == Some(label))
                .ok_or_else(|| {
                    self.v.error(CodegenErrorKind::UnmatchedLabel {
                        keyword,
                        label: label.to_string(),
                    })
                }),
        }
    }

    /// Drop operands pushed since the loop `index` was entered
    fn unwind_to(&mut self, index: usize) {
        let target = self.loops[index].depth;
        for _ in target..self.v.depth() {
            self.v.op(OpCode::Pop);
        }
    }

    pub(super) fn gen_break(&mut self, label: Option<&Label>) -> CodegenResult<StackValue> {
        let index = self.target_loop(label, "break")?;
        let depth = self.v.depth();
        self.unwind_to(index);
        let jump = self.v.reserve(OpCode::Jump);
        self.loops[index].breaks.push(jump);
        self.v.set_depth(depth);
        Ok(self.unreachable())
    }

    pub(super) fn gen_continue(&mut self, label: Option<&Label>) -> CodegenResult<StackValue> {
        let index = self.target_loop(label, "continue")?;
        let depth = self.v.depth();
        self.unwind_to(index);
        let jump = self.v.reserve(OpCode::Jump);
        self.loops[index].continues.push(jump);
        self.v.set_depth(depth);
        Ok(self.unreachable())
    }

    pub(super) fn gen_while(
        &mut self,
        label: Option<&Label>,
        cond: &Expr,
        body: &Expr,
    ) -> CodegenResult<StackValue> {
        let start = self.v.position();
        self.gen_to(cond, &Type::bool())?;
        let exit = self.v.reserve(OpCode::JumpIfFalse);

        self.enter_loop(label);
        self.gen_discard(body)?;
        self.v.jump_to(OpCode::Jump, start)?;

        self.v.patch(exit)?;
        self.exit_loop(start)?;
        Ok(StackValue::None)
    }

    pub(super) fn gen_do_while(
        &mut self,
        label: Option<&Label>,
        body: &Expr,
        cond: &Expr,
    ) -> CodegenResult<StackValue> {
        let start = self.v.position();
        self.enter_loop(label);
        self.gen_discard(body)?;

        let recheck = self.v.position();
        self.gen_to(cond, &Type::bool())?;
        self.v.jump_to(OpCode::JumpIfTrue, start)?;
        self.exit_loop(recheck)?;
        Ok(StackValue::None)
    }

    /// Invoke a receiver-only call on the value on top of the stack
    fn invoke_on_top(&mut self, call: &ResolvedCall, from: &Type) -> CodegenResult<()> {
        let types = operand_types(call);
        let [receiver_ty] = types.as_slice() else {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "iteration through {}",
                call.target
            ))));
        };
        self.v.coerce(from, receiver_ty)?;
        self.v.invoke(call.dispatch, &call.target)
    }

    pub(super) fn gen_for_in(&mut self, for_in: &ForIn) -> CodegenResult<StackValue> {
        let iterator_ty = for_in.iterator.target.ret.clone();
        let iterator = StackValue::local(self.alloc_temp()?, iterator_ty.clone());

        self.gen_to(&for_in.iterable, &for_in.iterable.ty)?;
        self.invoke_on_top(&for_in.iterator, &for_in.iterable.ty)?;
        iterator.store(&iterator_ty, &mut self.v)?;

        let start = self.v.position();
        iterator.load(&iterator_ty, &mut self.v)?;
        self.invoke_on_top(&for_in.has_next, &iterator_ty)?;
        self.v.coerce(&for_in.has_next.target.ret, &Type::bool())?;
        let exit = self.v.reserve(OpCode::JumpIfFalse);

        self.enter_loop(for_in.label.as_ref());
        let element = self.declare(&for_in.var)?;
        element.put_receiver(&mut self.v)?;
        iterator.load(&iterator_ty, &mut self.v)?;
        self.invoke_on_top(&for_in.next, &iterator_ty)?;
        element.store(&for_in.next.target.ret, &mut self.v)?;
        self.gen_discard(&for_in.body)?;
        self.v.jump_to(OpCode::Jump, start)?;

        self.v.patch(exit)?;
        self.exit_loop(start)?;
        Ok(StackValue::None)
    }

    /// Counted loop over an integral range; the bound is evaluated once.
    /// An inclusive range leaves before stepping past its last element so
    /// the counter never wraps when the bound is the type's maximum.
    pub(super) fn gen_for_range(&mut self, range: &ForRange) -> CodegenResult<StackValue> {
        let ty = range.var.ty.clone();
        let kind = match ty.primitive() {
            Some(kind) if kind.is_integral() || kind == PrimitiveKind::Char => kind,
            _ => {
                return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                    "range loop over {ty}"
                ))))
            }
        };

        let counter = self.alloc_temp()?;
        let bound = self.alloc_temp()?;
        self.gen_to(&range.start, &ty)?;
        self.v.store_local(counter);
        self.gen_to(&range.end, &ty)?;
        self.v.store_local(bound);
        let element = self.declare(&range.var)?;

        let test = self.v.position();
        self.v.load_local(counter);
        self.v.load_local(bound);
        self.v.op_kind(OpCode::Cmp, kind);
        self.v.op(OpCode::Sign);
        let exit = if range.inclusive {
            self.v.push_int(TriState::Greater.value())?;
            self.v.reserve(OpCode::JumpIfEq)
        } else {
            self.v.push_int(TriState::Lower.value())?;
            self.v.reserve(OpCode::JumpIfNe)
        };

        let body = self.v.position();
        self.enter_loop(range.label.as_ref());
        element.put_receiver(&mut self.v)?;
        self.v.load_local(counter);
        element.store(&ty, &mut self.v)?;
        self.gen_discard(&range.body)?;

        let step = self.v.position();
        let last = if range.inclusive {
            self.v.load_local(counter);
            self.v.load_local(bound);
            self.v.op_kind(OpCode::Cmp, kind);
            self.v.op(OpCode::Sign);
            self.v.push_int(TriState::Equal.value())?;
            Some(self.v.reserve(OpCode::JumpIfEq))
        } else {
            None
        };
        self.v.load_local(counter);
        self.v.push_literal(&one(kind))?;
        self.v.op_kind(OpCode::Add, kind);
        self.v.store_local(counter);
        self.v.jump_to(OpCode::Jump, if range.inclusive { body } else { test })?;

        self.v.patch(exit)?;
        if let Some(last) = last {
            self.v.patch(last)?;
        }
        self.exit_loop(step)?;
        Ok(StackValue::None)
    }
}
