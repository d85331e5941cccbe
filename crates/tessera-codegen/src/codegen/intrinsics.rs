//! Primitive operator calls that lower to dedicated instructions

use crate::ast::MethodRef;
use crate::bytecode::{CodegenResult, OpCode};
use crate::types::{PrimitiveKind, Type};

use super::emitter::Emitter;
use super::stack_value::one;

/// An operator call with a direct instruction sequence
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Intrinsic {
    /// `plus`, `minus`, `times`, `div`, `rem`
    Arithmetic(OpCode, PrimitiveKind),
    /// `unaryMinus`
    Negate(PrimitiveKind),
    /// `unaryPlus`
    Identity,
    /// `Bool.not`
    Not,
    /// `compareTo`, leaving a signed Int
    Compare(PrimitiveKind),
    /// `inc` / `dec`
    Step(OpCode, PrimitiveKind),
}

impl Intrinsic {
    /// Emit the instructions; operands are already on the stack
    pub fn emit(self, v: &mut Emitter) -> CodegenResult<()> {
        match self {
            Intrinsic::Arithmetic(op, kind) => v.op_kind(op, kind),
            Intrinsic::Negate(kind) => v.op_kind(OpCode::Neg, kind),
            Intrinsic::Identity => {}
            Intrinsic::Not => v.op(OpCode::Not),
            Intrinsic::Compare(kind) => v.op_kind(OpCode::Cmp, kind),
            Intrinsic::Step(op, kind) => {
                v.push_literal(&one(kind))?;
                v.op_kind(op, kind);
            }
        }
        Ok(())
    }
}

/// Find the intrinsic for a resolved operator method, if any
#[must_use]
pub fn lookup(method: &MethodRef) -> Option<Intrinsic> {
    let Type::Primitive(kind) = method.owner else {
        return None;
    };
    let arithmetic = kind.is_numeric() && kind != PrimitiveKind::Char;
    let same_kind = |ty: &Type| ty.primitive() == Some(kind);

    match (method.name.as_ref(), method.params.as_slice()) {
        ("plus" | "minus" | "times" | "div" | "rem", [param])
            if arithmetic && same_kind(param) && same_kind(&method.ret) =>
        {
            let op = match method.name.as_ref() {
                "plus" => OpCode::Add,
                "minus" => OpCode::Sub,
                "times" => OpCode::Mul,
                "div" => OpCode::Div,
                _ => OpCode::Rem,
            };
            Some(Intrinsic::Arithmetic(op, kind))
        }
        ("compareTo", [param]) if kind != PrimitiveKind::Bool && same_kind(param) => {
            Some(Intrinsic::Compare(kind))
        }
        ("unaryMinus", []) if arithmetic && same_kind(&method.ret) => Some(Intrinsic::Negate(kind)),
        ("unaryPlus", []) if arithmetic && same_kind(&method.ret) => Some(Intrinsic::Identity),
        ("not", []) if kind == PrimitiveKind::Bool => Some(Intrinsic::Not),
        ("inc", []) if arithmetic && same_kind(&method.ret) => {
            Some(Intrinsic::Step(OpCode::Add, kind))
        }
        ("dec", []) if arithmetic && same_kind(&method.ret) => {
            Some(Intrinsic::Step(OpCode::Sub, kind))
        }
        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn method(owner: Type, name: &str, params: Vec<Type>, ret: Type) -> MethodRef {
        MethodRef::new(owner, name, params, ret)
    }

    #[test]
    fn arithmetic_on_matching_kinds() {
        let plus = method(Type::int(), "plus", vec![Type::int()], Type::int());
        assert_eq!(lookup(&plus), Some(Intrinsic::Arithmetic(OpCode::Add, PrimitiveKind::Int)));

        let rem = method(Type::double(), "rem", vec![Type::double()], Type::double());
        assert_eq!(lookup(&rem), Some(Intrinsic::Arithmetic(OpCode::Rem, PrimitiveKind::Double)));
    }

    #[test]
    fn mixed_kinds_stay_calls() {
        let plus = method(Type::int(), "plus", vec![Type::long()], Type::long());
        assert_eq!(lookup(&plus), None);

        let chars = method(
            Type::Primitive(PrimitiveKind::Char),
            "plus",
            vec![Type::Primitive(PrimitiveKind::Char)],
            Type::Primitive(PrimitiveKind::Char),
        );
        assert_eq!(lookup(&chars), None);
    }

    #[test]
    fn reference_owners_are_never_intrinsic() {
        let concat = method(Type::String, "plus", vec![Type::any_nullable()], Type::String);
        assert_eq!(lookup(&concat), None);
        let boxed = method(Type::int().nullable(), "plus", vec![Type::int()], Type::int());
        assert_eq!(lookup(&boxed), None);
    }

    #[test]
    fn compare_not_and_steps() {
        let cmp = method(Type::long(), "compareTo", vec![Type::long()], Type::int());
        assert_eq!(lookup(&cmp), Some(Intrinsic::Compare(PrimitiveKind::Long)));

        let not = method(Type::bool(), "not", vec![], Type::bool());
        assert_eq!(lookup(&not), Some(Intrinsic::Not));
        assert_eq!(lookup(&method(Type::int(), "not", vec![], Type::int())), None);

        let inc = method(Type::int(), "inc", vec![], Type::int());
        assert_eq!(lookup(&inc), Some(Intrinsic::Step(OpCode::Add, PrimitiveKind::Int)));
    }
}
