//! Typed values together with the addressing mode used to reach them
//!
//! A [`StackValue`] is what lowering an expression produces before anything
//! is pushed: a local slot, a property behind accessors, an indexer call,
//! a closure field, a value that is already on the stack, and so on. The
//! consumer decides whether to read it (`put`), write it (`store`) or both
//! (compound assignment), and in which type.
//!
//! Receiver protocol: `put_receiver` pushes `receiver_size()` slots;
//! `put` and `store` consume them. `put` leaves exactly one value and
//! `store` consumes the value on top as well.

use std::rc::Rc;

use crate::ast::{CallKind, Literal, MethodRef, PropertyDescriptor, ResolvedCall};
use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode};
use crate::types::{PrimitiveKind, Type};

use super::emitter::Emitter;

/// Class of the heap cell holding a captured mutable local
pub const REF_CLASS: &str = "Ref";
/// Field of [`REF_CLASS`] holding the value
pub const REF_ELEMENT: &str = "element";
/// Closure field holding the enclosing instance
pub const OUTER_THIS_FIELD: &str = "this$0";
/// Runtime class of tuples
pub const TUPLE_CLASS: &str = "Tuple";

/// The `Ref` cell type
#[must_use]
pub fn ref_type() -> Type {
    Type::class(REF_CLASS)
}

/// `Tuple.get(Int): Any?`
#[must_use]
pub fn tuple_getter() -> MethodRef {
    MethodRef::new(
        Type::class(TUPLE_CLASS),
        "get",
        vec![Type::int()],
        Type::any_nullable(),
    )
}

/// `Tuple.set(Int, Any?): Unit`
#[must_use]
pub fn tuple_setter() -> MethodRef {
    MethodRef::new(
        Type::class(TUPLE_CLASS),
        "set",
        vec![Type::int(), Type::any_nullable()],
        Type::Unit,
    )
}

/// A typed value and where it lives
#[derive(Debug, Clone, PartialEq)]
pub enum StackValue {
    /// No value; demanding one pushes `Unit`
    None,

    /// The value has already been pushed
    OnStack(Type),

    /// A frame slot
    Local { slot: u16, ty: Type },

    /// A literal
    Constant { value: Literal, ty: Type },

    /// A property with synthesized `name$get` / `name$set` accessors
    Property {
        property: Rc<PropertyDescriptor>,
        /// `None` for static properties
        receiver: Option<Box<StackValue>>,
    },

    /// A property read and written through arbitrary resolved methods
    Accessor {
        getter: Rc<MethodRef>,
        setter: Option<Rc<MethodRef>>,
        dispatch: CallKind,
        receiver: Option<Box<StackValue>>,
        ty: Type,
    },

    /// `collection[indices]`; the indices were evaluated into hidden slots
    /// when the value was created
    CollectionElement {
        collection: Box<StackValue>,
        index_slots: Vec<(u16, Type)>,
        /// Scratch slot used to reorder the operands of the setter
        value_slot: Option<u16>,
        get: Rc<ResolvedCall>,
        set: Option<Rc<ResolvedCall>>,
        ty: Type,
    },

    /// A raw object field; a `None` receiver means the caller pushes it
    Field {
        name: Rc<str>,
        receiver: Option<Box<StackValue>>,
        ty: Type,
    },

    /// The receiver of a call or member access; falls back to the
    /// function's implicit `this` when no explicit receiver was given
    CallReceiver {
        explicit: Option<Box<StackValue>>,
        ty: Type,
    },

    /// Component `index` of a tuple, through `Tuple.get` / `Tuple.set`
    MultiVariable {
        tuple: Box<StackValue>,
        index: u8,
        ty: Type,
    },

    /// A member of the current `this` (slot 0): pushes `this`, then
    /// delegates to `inner`, whose receiver it supplies
    Outer { inner: Box<StackValue> },

    /// The enclosing instance of a closure, read from `this$0`
    ThisOuter { ty: Type },

    /// A captured mutable local living in the `element` field of a `Ref`
    WrappedVar { cell: Box<StackValue>, ty: Type },
}

impl StackValue {
    #[must_use]
    pub fn local(slot: u16, ty: Type) -> Self {
        StackValue::Local { slot, ty }
    }

    #[must_use]
    pub fn constant(value: Literal, ty: Type) -> Self {
        StackValue::Constant { value, ty }
    }

    /// Static type of the value
    #[must_use]
    pub fn ty(&self) -> Type {
        match self {
            StackValue::None => Type::Unit,
            StackValue::OnStack(ty)
            | StackValue::Local { ty, .. }
            | StackValue::Constant { ty, .. }
            | StackValue::Accessor { ty, .. }
            | StackValue::CollectionElement { ty, .. }
            | StackValue::Field { ty, .. }
            | StackValue::CallReceiver { ty, .. }
            | StackValue::MultiVariable { ty, .. }
            | StackValue::ThisOuter { ty }
            | StackValue::WrappedVar { ty, .. } => ty.clone(),
            StackValue::Property { property, .. } => property.ty.clone(),
            StackValue::Outer { inner } => inner.ty(),
        }
    }

    /// Name of the addressing mode, for diagnostics
    #[must_use]
    pub const fn variant_name(&self) -> &'static str {
        match self {
            StackValue::None => "no value",
            StackValue::OnStack(_) => "a computed value",
            StackValue::Local { .. } => "a local",
            StackValue::Constant { .. } => "a constant",
            StackValue::Property { .. } => "a property",
            StackValue::Accessor { .. } => "a property accessor",
            StackValue::CollectionElement { .. } => "an indexed element",
            StackValue::Field { .. } => "a field",
            StackValue::CallReceiver { .. } => "a call receiver",
            StackValue::MultiVariable { .. } => "a tuple component",
            StackValue::Outer { .. } => "an outer member",
            StackValue::ThisOuter { .. } => "the enclosing instance",
            StackValue::WrappedVar { .. } => "a captured variable",
        }
    }

    /// Extra stack slots the receiver occupies below the value
    #[must_use]
    pub fn receiver_size(&self) -> usize {
        match self {
            StackValue::Property { receiver, .. } | StackValue::Accessor { receiver, .. } => {
                usize::from(receiver.is_some())
            }
            StackValue::CollectionElement { .. }
            | StackValue::Field { .. }
            | StackValue::MultiVariable { .. }
            | StackValue::WrappedVar { .. } => 1,
            StackValue::None
            | StackValue::OnStack(_)
            | StackValue::Local { .. }
            | StackValue::Constant { .. }
            | StackValue::CallReceiver { .. }
            | StackValue::Outer { .. }
            | StackValue::ThisOuter { .. } => 0,
        }
    }

    /// Whether `store` is supported
    #[must_use]
    pub fn is_writable(&self) -> bool {
        match self {
            StackValue::Local { .. }
            | StackValue::Field { .. }
            | StackValue::MultiVariable { .. }
            | StackValue::WrappedVar { .. } => true,
            StackValue::Property { property, .. } => property.mutable,
            StackValue::Accessor { setter, .. } => setter.is_some(),
            StackValue::CollectionElement { set, .. } => set.is_some(),
            StackValue::Outer { inner } => inner.is_writable(),
            StackValue::None
            | StackValue::OnStack(_)
            | StackValue::Constant { .. }
            | StackValue::CallReceiver { .. }
            | StackValue::ThisOuter { .. } => false,
        }
    }

    /// Push the receiver portion (`receiver_size()` slots)
    pub fn put_receiver(&self, v: &mut Emitter) -> CodegenResult<()> {
        match self {
            StackValue::Property { receiver, .. }
            | StackValue::Accessor { receiver, .. }
            | StackValue::Field { receiver, .. } => {
                if let Some(receiver) = receiver {
                    receiver.load(&receiver.ty(), v)?;
                }
                Ok(())
            }
            StackValue::CollectionElement { collection, .. } => {
                collection.load(&collection.ty(), v)
            }
            StackValue::MultiVariable { tuple, .. } => tuple.load(&tuple.ty(), v),
            StackValue::WrappedVar { cell, .. } => cell.load(&ref_type(), v),
            _ => Ok(()),
        }
    }

    /// Duplicate the already pushed receiver portion
    pub fn dup_receiver(&self, v: &mut Emitter) -> CodegenResult<()> {
        match self.receiver_size() {
            0 => Ok(()),
            1 => {
                v.op(OpCode::Dup);
                Ok(())
            }
            size => Err(v.error(CodegenErrorKind::ReceiverTooLarge(size))),
        }
    }

    /// `put_receiver` followed by `put`
    pub fn load(&self, ty: &Type, v: &mut Emitter) -> CodegenResult<()> {
        self.put_receiver(v)?;
        self.put(ty, v)
    }

    /// Consume the receiver and push the value coerced to `ty`
    pub fn put(&self, ty: &Type, v: &mut Emitter) -> CodegenResult<()> {
        match self {
            StackValue::None => {
                v.op(OpCode::Unit);
                v.coerce(&Type::Unit, ty)
            }
            StackValue::OnStack(from) => v.coerce(from, ty),
            StackValue::Local { slot, ty: own } => {
                v.load_local(*slot);
                v.coerce(own, ty)
            }
            StackValue::Constant { value, ty: own } => {
                v.push_literal(value)?;
                let literal_ty = value.ty();
                if literal_ty != *own {
                    v.coerce(&literal_ty, own)?;
                }
                v.coerce(own, ty)
            }
            StackValue::Property { property, .. } => {
                let getter = property.synthesized_getter();
                v.invoke(property.dispatch, &getter)?;
                v.coerce(&getter.ret, ty)
            }
            StackValue::Accessor {
                getter, dispatch, ..
            } => {
                v.invoke(*dispatch, getter)?;
                v.coerce(&getter.ret, ty)
            }
            StackValue::CollectionElement {
                index_slots, get, ..
            } => {
                for (slot, _) in index_slots {
                    v.load_local(*slot);
                }
                v.invoke(get.dispatch, &get.target)?;
                v.coerce(&get.target.ret, ty)
            }
            StackValue::Field { name, ty: own, .. } => {
                v.get_field(name)?;
                v.coerce(own, ty)
            }
            StackValue::CallReceiver { explicit, ty: own } => match explicit {
                Some(receiver) => receiver.load(ty, v),
                None => {
                    let this = v.implicit_receiver()?;
                    this.load(own, v)?;
                    v.coerce(own, ty)
                }
            },
            StackValue::MultiVariable { index, .. } => {
                let getter = tuple_getter();
                v.push_int(i32::from(*index))?;
                v.invoke(CallKind::Virtual, &getter)?;
                v.coerce(&getter.ret, ty)
            }
            StackValue::Outer { inner } => {
                v.load_local(0);
                inner.put(ty, v)
            }
            StackValue::ThisOuter { ty: own } => {
                v.load_local(0);
                v.get_field(OUTER_THIS_FIELD)?;
                v.coerce(own, ty)
            }
            StackValue::WrappedVar { ty: own, .. } => {
                v.get_field(REF_ELEMENT)?;
                v.coerce(&Type::any_nullable(), own)?;
                v.coerce(own, ty)
            }
        }
    }

    /// Consume the receiver and the value on top (typed `from`) and persist it
    pub fn store(&self, from: &Type, v: &mut Emitter) -> CodegenResult<()> {
        match self {
            StackValue::Local { slot, ty } => {
                v.coerce(from, ty)?;
                v.store_local(*slot);
                Ok(())
            }
            StackValue::Property { property, .. } => {
                let Some(setter) = property.synthesized_setter() else {
                    return Err(v.error(CodegenErrorKind::UnsupportedStore("a read-only property")));
                };
                v.coerce(from, &property.ty)?;
                v.invoke(property.dispatch, &setter)?;
                v.op(OpCode::Pop);
                Ok(())
            }
            StackValue::Accessor {
                setter, dispatch, ..
            } => {
                let Some(setter) = setter else {
                    return Err(v.error(CodegenErrorKind::UnsupportedStore("a property without setter")));
                };
                let param = setter.params.last().cloned().unwrap_or_else(Type::any_nullable);
                v.coerce(from, &param)?;
                v.invoke(*dispatch, setter)?;
                v.op(OpCode::Pop);
                Ok(())
            }
            StackValue::CollectionElement {
                index_slots,
                value_slot,
                set,
                ..
            } => {
                let (Some(set), Some(value_slot)) = (set, value_slot) else {
                    return Err(v.error(CodegenErrorKind::UnsupportedStore("a read-only indexer")));
                };
                let param = set.target.params.last().cloned().unwrap_or_else(Type::any_nullable);
                v.coerce(from, &param)?;
                v.store_local(*value_slot);
                for (slot, _) in index_slots {
                    v.load_local(*slot);
                }
                v.load_local(*value_slot);
                v.invoke(set.dispatch, &set.target)?;
                v.op(OpCode::Pop);
                Ok(())
            }
            StackValue::Field { name, ty, .. } => {
                v.coerce(from, ty)?;
                v.set_field(name)
            }
            StackValue::MultiVariable { index, .. } => {
                v.coerce(from, &Type::any_nullable())?;
                v.push_int(i32::from(*index))?;
                v.op(OpCode::Swap);
                v.invoke(CallKind::Virtual, &tuple_setter())?;
                v.op(OpCode::Pop);
                Ok(())
            }
            StackValue::Outer { inner } => {
                v.load_local(0);
                v.op(OpCode::Swap);
                inner.store(from, v)
            }
            StackValue::WrappedVar { ty, .. } => {
                v.coerce(from, ty)?;
                v.coerce(ty, &Type::any_nullable())?;
                v.set_field(REF_ELEMENT)
            }
            StackValue::None
            | StackValue::OnStack(_)
            | StackValue::Constant { .. }
            | StackValue::CallReceiver { .. }
            | StackValue::ThisOuter { .. } => {
                Err(v.error(CodegenErrorKind::UnsupportedStore(self.variant_name())))
            }
        }
    }

    /// Duplicate the value on top of the stack, placing the copy below a
    /// receiver of `receiver_size` slots
    pub fn dup_under_receiver(receiver_size: usize, v: &mut Emitter) -> CodegenResult<()> {
        match receiver_size {
            0 => v.op(OpCode::Dup),
            1 => v.op(OpCode::DupX1),
            size => return Err(v.error(CodegenErrorKind::ReceiverTooLarge(size))),
        }
        Ok(())
    }
}

/// The unit step for a counted loop or an increment of `kind`
#[must_use]
pub fn one(kind: PrimitiveKind) -> Literal {
    match kind {
        PrimitiveKind::Bool => Literal::Bool(true),
        PrimitiveKind::Byte => Literal::Byte(1),
        PrimitiveKind::Short => Literal::Short(1),
        PrimitiveKind::Char => Literal::Char('\u{1}'),
        PrimitiveKind::Int => Literal::Int(1),
        PrimitiveKind::Long => Literal::Long(1),
        PrimitiveKind::Float => Literal::Float(1.0),
        PrimitiveKind::Double => Literal::Double(1.0),
    }
}
