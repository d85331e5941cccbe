//! Calls, constructors, property and indexer access

use std::rc::Rc;

use crate::ast::{
    Accessors, CallKind, Expr, MethodRef, PropertyDescriptor, ReceiverKind, ResolvedCall,
};
use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode};
use crate::types::Type;

use super::stack_value::StackValue;
use super::FunctionCodegen;

/// Receiver type and argument types of a resolved call.
///
/// Static calls with a receiver (extension style) take it as their first
/// parameter.
fn call_shape(call: &ResolvedCall) -> (Option<&Type>, &[Type]) {
    let target = &call.target;
    match (call.dispatch, call.receiver) {
        (CallKind::Static, ReceiverKind::None) => (None, target.params.as_slice()),
        (CallKind::Static, _) => match target.params.split_first() {
            Some((first, rest)) => (Some(first), rest),
            None => (None, target.params.as_slice()),
        },
        (CallKind::Virtual | CallKind::Special, _) => {
            (Some(&target.owner), target.params.as_slice())
        }
    }
}

impl FunctionCodegen {
    pub(super) fn gen_property(
        &mut self,
        receiver: Option<&Expr>,
        property: &PropertyDescriptor,
    ) -> CodegenResult<StackValue> {
        let receiver = if property.is_static {
            if let Some(receiver) = receiver {
                let value = self.gen(receiver)?;
                self.discard(value)?;
            }
            None
        } else {
            let explicit = match receiver {
                Some(receiver) => Some(Box::new(self.gen(receiver)?)),
                None => None,
            };
            Some(Box::new(StackValue::CallReceiver {
                explicit,
                ty: property.owner.clone(),
            }))
        };

        Ok(match &property.accessors {
            Accessors::Synthesized => StackValue::Property {
                property: Rc::new(property.clone()),
                receiver,
            },
            Accessors::Custom { getter, setter } => StackValue::Accessor {
                getter: Rc::new(getter.clone()),
                setter: setter.clone().map(Rc::new),
                dispatch: property.dispatch,
                receiver,
                ty: property.ty.clone(),
            },
        })
    }

    /// `receiver[indices]`; the collection and then the indices are evaluated
    /// now and parked in hidden slots
    pub(super) fn gen_index(
        &mut self,
        expr: &Expr,
        receiver: &Expr,
        indices: &[Expr],
        get: &ResolvedCall,
        set: Option<&ResolvedCall>,
    ) -> CodegenResult<StackValue> {
        let (_, index_types) = call_shape(get);
        if index_types.len() != indices.len() {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "indexer {} with {} index(es)",
                get.target,
                indices.len()
            ))));
        }

        let value = self.gen(receiver)?;
        let slot = self.alloc_temp()?;
        value.load(&receiver.ty, &mut self.v)?;
        self.v.store_local(slot);
        let collection = StackValue::local(slot, receiver.ty.clone());

        let mut index_slots = Vec::with_capacity(indices.len());
        for (index, ty) in indices.iter().zip(index_types) {
            let slot = self.alloc_temp()?;
            self.gen_to(index, ty)?;
            self.v.store_local(slot);
            index_slots.push((slot, ty.clone()));
        }
        let value_slot = match set {
            Some(_) => Some(self.alloc_temp()?),
            None => None,
        };

        Ok(StackValue::CollectionElement {
            collection: Box::new(collection),
            index_slots,
            value_slot,
            get: Rc::new(get.clone()),
            set: set.cloned().map(Rc::new),
            ty: expr.ty.clone(),
        })
    }

    pub(super) fn gen_call(
        &mut self,
        expr: &Expr,
        receiver: Option<&Expr>,
        call: &ResolvedCall,
        args: &[Expr],
        safe: bool,
    ) -> CodegenResult<StackValue> {
        let (receiver_ty, param_types) = call_shape(call);
        if param_types.len() != args.len() {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "call to {} with {} argument(s)",
                call.target,
                args.len()
            ))));
        }

        let Some(receiver_ty) = receiver_ty else {
            if let Some(receiver) = receiver {
                let value = self.gen(receiver)?;
                self.discard(value)?;
            }
            self.gen_arguments(args, param_types)?;
            self.v.invoke(call.dispatch, &call.target)?;
            return Ok(StackValue::OnStack(call.target.ret.clone()));
        };

        let explicit = match receiver {
            Some(receiver) => Some((self.gen(receiver)?, receiver.ty.clone())),
            None => None,
        };

        match explicit {
            Some((value, static_ty)) if safe && static_ty.is_nullable() => {
                value.load(&static_ty, &mut self.v)?;
                let base = self.v.depth();
                self.v.op(OpCode::Dup);
                let null = self.v.reserve(OpCode::JumpIfNull);
                self.v.coerce(&static_ty, receiver_ty)?;
                self.gen_arguments(args, param_types)?;
                self.v.invoke(call.dispatch, &call.target)?;
                self.v.coerce(&call.target.ret, &expr.ty)?;
                let end = self.v.reserve(OpCode::Jump);

                // the null receiver is the result
                self.v.patch(null)?;
                self.v.set_depth(base);
                self.v.patch(end)?;
                Ok(StackValue::OnStack(expr.ty.clone()))
            }
            explicit => {
                let receiver = StackValue::CallReceiver {
                    explicit: explicit.map(|(value, _)| Box::new(value)),
                    ty: receiver_ty.clone(),
                };
                receiver.load(receiver_ty, &mut self.v)?;
                self.gen_arguments(args, param_types)?;
                self.v.invoke(call.dispatch, &call.target)?;
                Ok(StackValue::OnStack(call.target.ret.clone()))
            }
        }
    }

    fn gen_arguments(&mut self, args: &[Expr], types: &[Type]) -> CodegenResult<()> {
        for (arg, ty) in args.iter().zip(types) {
            self.gen_to(arg, ty)?;
        }
        Ok(())
    }

    /// `Owner(args)`: allocate, run `<init>`, keep the instance
    pub(super) fn gen_new(
        &mut self,
        expr: &Expr,
        constructor: &MethodRef,
        args: &[Expr],
    ) -> CodegenResult<StackValue> {
        if constructor.params.len() != args.len() {
            return Err(self.v.error(CodegenErrorKind::Unsupported(format!(
                "constructor {} with {} argument(s)",
                constructor,
                args.len()
            ))));
        }
        self.v.new_object(&constructor.owner)?;
        self.v.op(OpCode::Dup);
        self.gen_arguments(args, &constructor.params)?;
        self.v.invoke(CallKind::Special, constructor)?;
        self.v.op(OpCode::Pop);
        Ok(StackValue::OnStack(expr.ty.clone()))
    }

    /// Construct `class(message)` and throw it
    pub(super) fn throw_new(&mut self, class: &str, message: &str) -> CodegenResult<()> {
        let ty = Type::class(class);
        let init = MethodRef::new(ty.clone(), "<init>", vec![Type::String], Type::Unit);
        self.v.new_object(&ty)?;
        self.v.op(OpCode::Dup);
        self.v.push_string(message)?;
        self.v.invoke(CallKind::Special, &init)?;
        self.v.op(OpCode::Pop);
        self.v.op(OpCode::Throw);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(params: Vec<Type>) -> MethodRef {
        MethodRef::new(Type::class("Text"), "pad", params, Type::String)
    }

    #[test]
    fn shapes_by_dispatch() {
        let virtual_call = ResolvedCall::virtual_call(method(vec![Type::int()]));
        let (receiver, params) = call_shape(&virtual_call);
        assert_eq!(receiver, Some(&Type::class("Text")));
        assert_eq!(params, &[Type::int()]);

        let plain = ResolvedCall::static_call(method(vec![Type::int()]));
        assert_eq!(call_shape(&plain), (None, &[Type::int()][..]));

        let extension = ResolvedCall {
            target: method(vec![Type::String, Type::int()]),
            dispatch: CallKind::Static,
            receiver: ReceiverKind::Explicit,
        };
        let (receiver, params) = call_shape(&extension);
        assert_eq!(receiver, Some(&Type::String));
        assert_eq!(params, &[Type::int()]);
    }
}
