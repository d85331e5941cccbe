//! Resolved descriptors for variables, properties and call targets

use std::fmt;
use std::rc::Rc;

use crate::types::Type;

/// Identity of a variable declaration, unique within one compilation unit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct VarId(pub u32);

impl fmt::Display for VarId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A local variable or parameter with its frame slot
#[derive(Debug, Clone, PartialEq)]
pub struct VariableDescriptor {
    pub id: VarId,
    pub name: Rc<str>,
    pub ty: Type,
    /// Frame slot assigned by the front end
    pub slot: u16,
    pub mutable: bool,
    /// Captured by a closure and mutated somewhere, so it lives in a `Ref` box
    pub wrapped: bool,
}

impl VariableDescriptor {
    #[must_use]
    pub fn new(id: u32, name: &str, ty: Type, slot: u16) -> Self {
        Self {
            id: VarId(id),
            name: Rc::from(name),
            ty,
            slot,
            mutable: false,
            wrapped: false,
        }
    }

    #[must_use]
    pub fn mutable(mut self) -> Self {
        self.mutable = true;
        self
    }

    #[must_use]
    pub fn wrapped(mut self) -> Self {
        self.mutable = true;
        self.wrapped = true;
        self
    }
}

/// How a resolved call is dispatched
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CallKind {
    /// No receiver, target fixed at compile time
    Static,
    /// Dispatched on the runtime class of the receiver
    Virtual,
    /// Receiver passed but target fixed (constructors, super calls)
    Special,
}

/// Where the receiver of a resolved call comes from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ReceiverKind {
    None,
    /// An explicit receiver expression (`a.f()`)
    Explicit,
    /// The enclosing `this` (`f()` inside a method or a closure)
    ImplicitThis,
}

/// A resolved method signature
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct MethodRef {
    pub owner: Type,
    pub name: Rc<str>,
    pub params: Vec<Type>,
    pub ret: Type,
}

impl MethodRef {
    #[must_use]
    pub fn new(owner: Type, name: &str, params: Vec<Type>, ret: Type) -> Self {
        Self {
            owner,
            name: Rc::from(name),
            params,
            ret,
        }
    }

    /// `Owner.name`, the key used by dispatch tables
    #[must_use]
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.owner.class_name(), self.name)
    }

    #[must_use]
    pub fn arity(&self) -> usize {
        self.params.len()
    }
}

impl fmt::Display for MethodRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(", self.qualified_name())?;
        for (i, param) in self.params.iter().enumerate() {
            if i > 0 {
                write!(f, ", ")?;
            }
            write!(f, "{param}")?;
        }
        write!(f, "): {}", self.ret)
    }
}

/// A call record produced by overload resolution
#[derive(Debug, Clone, PartialEq)]
pub struct ResolvedCall {
    pub target: MethodRef,
    pub dispatch: CallKind,
    pub receiver: ReceiverKind,
}

impl ResolvedCall {
    /// A call with no receiver
    #[must_use]
    pub fn static_call(target: MethodRef) -> Self {
        Self {
            target,
            dispatch: CallKind::Static,
            receiver: ReceiverKind::None,
        }
    }

    /// A virtual call on an explicit receiver
    #[must_use]
    pub fn virtual_call(target: MethodRef) -> Self {
        Self {
            target,
            dispatch: CallKind::Virtual,
            receiver: ReceiverKind::Explicit,
        }
    }

    /// A virtual call on the enclosing `this`
    #[must_use]
    pub fn implicit_call(target: MethodRef) -> Self {
        Self {
            target,
            dispatch: CallKind::Virtual,
            receiver: ReceiverKind::ImplicitThis,
        }
    }
}

/// Accessor shape of a property
#[derive(Debug, Clone, PartialEq)]
pub enum Accessors {
    /// Compiler-synthesized `name$get` / `name$set`
    Synthesized,
    /// User-declared accessor methods
    Custom {
        getter: MethodRef,
        setter: Option<MethodRef>,
    },
}

/// A resolved property
#[derive(Debug, Clone, PartialEq)]
pub struct PropertyDescriptor {
    pub owner: Type,
    pub name: Rc<str>,
    pub ty: Type,
    pub is_static: bool,
    pub mutable: bool,
    pub accessors: Accessors,
    pub dispatch: CallKind,
}

impl PropertyDescriptor {
    /// An instance property with synthesized accessors
    #[must_use]
    pub fn instance(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            owner,
            name: Rc::from(name),
            ty,
            is_static: false,
            mutable: true,
            accessors: Accessors::Synthesized,
            dispatch: CallKind::Virtual,
        }
    }

    /// A static property with synthesized accessors
    #[must_use]
    pub fn static_property(owner: Type, name: &str, ty: Type) -> Self {
        Self {
            is_static: true,
            dispatch: CallKind::Static,
            ..Self::instance(owner, name, ty)
        }
    }

    #[must_use]
    pub fn read_only(mut self) -> Self {
        self.mutable = false;
        self
    }

    #[must_use]
    pub fn with_accessors(mut self, getter: MethodRef, setter: Option<MethodRef>) -> Self {
        self.accessors = Accessors::Custom { getter, setter };
        self
    }

    /// The synthesized getter signature
    #[must_use]
    pub fn synthesized_getter(&self) -> MethodRef {
        MethodRef::new(
            self.owner.clone(),
            &format!("{}$get", self.name),
            Vec::new(),
            self.ty.clone(),
        )
    }

    /// The synthesized setter signature, absent for read-only properties
    #[must_use]
    pub fn synthesized_setter(&self) -> Option<MethodRef> {
        self.mutable.then(|| {
            MethodRef::new(
                self.owner.clone(),
                &format!("{}$set", self.name),
                vec![self.ty.clone()],
                Type::Unit,
            )
        })
    }
}

/// A loop label (`outer@`)
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Label(pub Rc<str>);

impl Label {
    #[must_use]
    pub fn new(name: &str) -> Self {
        Self(Rc::from(name))
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "@{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn synthesized_accessor_names() {
        let prop = PropertyDescriptor::instance(Type::class("Point"), "x", Type::int());
        assert_eq!(prop.synthesized_getter().qualified_name(), "Point.x$get");
        let setter = prop.synthesized_setter();
        assert_eq!(setter.map(|m| m.params.len()), Some(1));
        assert!(prop.read_only().synthesized_setter().is_none());
    }

    #[test]
    fn method_ref_display() {
        let m = MethodRef::new(Type::int(), "compareTo", vec![Type::int()], Type::int());
        assert_eq!(m.to_string(), "Int.compareTo(Int): Int");
        assert_eq!(m.arity(), 1);
    }
}
