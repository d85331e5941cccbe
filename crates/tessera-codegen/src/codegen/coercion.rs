//! Conversions emitted at type-changing `put`/`store` boundaries

use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode};
use crate::types::{PrimitiveKind, Type};

use super::emitter::Emitter;

/// Strategy that converts the value on top of the stack between static types.
///
/// The lowering engine calls it wherever a value crosses a type boundary;
/// alternative back ends can plug in their own representation rules.
pub trait Coercion {
    fn coerce(&self, from: &Type, to: &Type, v: &mut Emitter) -> CodegenResult<()>;
}

/// Default coercion matrix.
///
/// | from \ to       | same | Unit       | primitive | reference |
/// |-----------------|------|------------|-----------|-----------|
/// | `Nothing`       | -    | Pop + Unit | -         | -         |
/// | primitive       | -    | Pop + Unit | Convert   | Box       |
/// | reference       | -    | Pop + Unit | Unbox     | -         |
/// | `Unit`          | -    | -          | error     | -         |
#[derive(Debug, Default, Clone, Copy)]
pub struct StandardCoercion;

impl Coercion for StandardCoercion {
    fn coerce(&self, from: &Type, to: &Type, v: &mut Emitter) -> CodegenResult<()> {
        if from == to {
            return Ok(());
        }
        if to.is_unit() {
            v.op(OpCode::Pop);
            v.op(OpCode::Unit);
            return Ok(());
        }
        if from.is_nothing() {
            return Ok(());
        }
        if from.is_unit() {
            if to.is_reference() {
                return Ok(());
            }
            return Err(v.error(CodegenErrorKind::Unsupported(format!(
                "cannot use a Unit value as {to}"
            ))));
        }

        match (from.primitive(), to.primitive()) {
            (Some(source), Some(target)) => convert(source, target, v),
            (Some(source), None) => {
                // Int -> Long? converts before boxing
                let boxed = to.non_null().primitive().unwrap_or(source);
                convert(source, boxed, v)?;
                v.op_kind(OpCode::Box, boxed);
                Ok(())
            }
            (None, Some(target)) => {
                let unboxed = from.non_null().primitive().unwrap_or(target);
                v.op_kind(OpCode::Unbox, unboxed);
                convert(unboxed, target, v)
            }
            (None, None) => Ok(()),
        }
    }
}

fn convert(from: PrimitiveKind, to: PrimitiveKind, v: &mut Emitter) -> CodegenResult<()> {
    if from == to {
        return Ok(());
    }
    if from == PrimitiveKind::Bool || to == PrimitiveKind::Bool {
        return Err(v.error(CodegenErrorKind::Unsupported(format!(
            "no conversion between {from} and {to}"
        ))));
    }
    v.convert(from, to);
    Ok(())
}
