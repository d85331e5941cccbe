//! `if`, `when` and type tests

use crate::ast::{CallKind, Expr, Literal, WhenCondition, WhenEntry};
use crate::bytecode::{CodegenErrorKind, CodegenResult, OpCode, Reservation};
use crate::types::Type;

use super::binary::are_equal;
use super::stack_value::StackValue;
use super::FunctionCodegen;

fn is_empty(branch: Option<&Expr>) -> bool {
    branch.map_or(true, Expr::is_empty_block)
}

impl FunctionCodegen {
    pub(super) fn gen_if(
        &mut self,
        expr: &Expr,
        cond: &Expr,
        then_branch: Option<&Expr>,
        else_branch: Option<&Expr>,
    ) -> CodegenResult<StackValue> {
        let ty = expr.ty.clone();

        if is_empty(then_branch) && is_empty(else_branch) {
            if ty.is_nothing() {
                self.gen_to(cond, &Type::bool())?;
                self.v.op(OpCode::Pop);
                return Ok(StackValue::constant(Literal::Null, Type::Nothing));
            }
            return Err(self.v.error(CodegenErrorKind::EmptyBranches(ty.to_string())));
        }

        self.gen_to(cond, &Type::bool())?;
        let base = self.v.depth();
        let to_else = self.v.reserve(OpCode::JumpIfFalse);
        self.gen_branch(then_branch, &ty)?;
        let end = self.v.reserve(OpCode::Jump);

        self.v.patch(to_else)?;
        self.v.set_depth(base - 1);
        self.gen_branch(else_branch, &ty)?;
        self.v.patch(end)?;
        Ok(StackValue::OnStack(ty))
    }

    /// Push a branch's value as `ty`; a missing branch yields `Unit`
    fn gen_branch(&mut self, branch: Option<&Expr>, ty: &Type) -> CodegenResult<()> {
        match branch {
            Some(branch) => self.gen_to(branch, ty),
            None => StackValue::None.put(ty, &mut self.v),
        }
    }

    pub(super) fn gen_is(
        &mut self,
        operand: &Expr,
        ty: &Type,
        negated: bool,
    ) -> CodegenResult<StackValue> {
        self.gen_to(operand, &Type::any_nullable())?;
        self.v.instance_of(ty)?;
        if negated {
            self.v.op(OpCode::Not);
        }
        Ok(StackValue::OnStack(Type::bool()))
    }

    /// Multi-branch dispatch
    ///
    /// Layout: every condition of every entry is tested in source order and
    /// jumps to its entry's body on a match; after the last test comes the
    /// no-match fallback, then the bodies, each jumping to the common end.
    pub(super) fn gen_when(
        &mut self,
        expr: &Expr,
        subject: Option<&Expr>,
        entries: &[WhenEntry],
    ) -> CodegenResult<StackValue> {
        let ty = expr.ty.clone();
        let base = self.v.depth();

        let subject = match subject {
            Some(subject) => {
                let slot = self.alloc_temp()?;
                self.gen_to(subject, &subject.ty)?;
                self.v.store_local(slot);
                Some(StackValue::local(slot, subject.ty.clone()))
            }
            None => None,
        };

        let mut matches: Vec<Vec<Reservation>> = Vec::with_capacity(entries.len());
        let mut has_else = false;
        for entry in entries {
            let previous = self.v.set_span(entry.span);
            if entry.is_else() {
                matches.push(vec![self.v.reserve(OpCode::Jump)]);
                has_else = true;
                self.v.set_span(previous);
                break;
            }
            let mut jumps = Vec::with_capacity(entry.conditions.len());
            for condition in &entry.conditions {
                self.gen_when_condition(subject.as_ref(), condition)?;
                jumps.push(self.v.reserve(OpCode::JumpIfTrue));
            }
            matches.push(jumps);
            self.v.set_span(previous);
        }

        let mut ends = Vec::with_capacity(matches.len());
        if !has_else {
            if ty.is_unit() {
                self.v.op(OpCode::Unit);
                ends.push(self.v.reserve(OpCode::Jump));
            } else {
                self.throw_new("NoWhenBranchMatchedException", "no when branch matched")?;
            }
        }

        let count = matches.len();
        for (index, (entry, jumps)) in entries.iter().zip(matches).enumerate() {
            for jump in jumps {
                self.v.patch(jump)?;
            }
            self.v.set_depth(base);
            self.gen_to(&entry.body, &ty)?;
            if index + 1 < count {
                ends.push(self.v.reserve(OpCode::Jump));
            }
        }

        for end in ends {
            self.v.patch(end)?;
        }
        self.v.set_depth(base + 1);
        Ok(StackValue::OnStack(ty))
    }

    /// Push whether `condition` holds
    fn gen_when_condition(
        &mut self,
        subject: Option<&StackValue>,
        condition: &WhenCondition,
    ) -> CodegenResult<()> {
        let any = Type::any_nullable();
        match (condition, subject) {
            (WhenCondition::Is { ty, negated }, Some(subject)) => {
                subject.load(&any, &mut self.v)?;
                self.v.instance_of(ty)?;
                if *negated {
                    self.v.op(OpCode::Not);
                }
                Ok(())
            }
            (WhenCondition::Equals(value), Some(subject)) => {
                subject.load(&any, &mut self.v)?;
                self.gen_to(value, &any)?;
                self.v.invoke(CallKind::Static, &are_equal())
            }
            (WhenCondition::Predicate(predicate), _) => self.gen_to(predicate, &Type::bool()),
            (WhenCondition::Is { .. } | WhenCondition::Equals(_), None) => {
                Err(self.v.error(CodegenErrorKind::Unsupported(
                    "subject test in a when without subject".to_string(),
                )))
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use crate::ast::{ExprKind, Span};
    use crate::bytecode::CodegenErrorKind;
    use crate::codegen::Codegen;
    use crate::testutil::TreeBuilder;
    use crate::types::Type;

    #[test]
    fn empty_branches_need_bottom_type() {
        let b = TreeBuilder::new();
        let make = |ty: Type| {
            b.expr(
                ExprKind::If {
                    cond: Box::new(b.bool(true)),
                    then_branch: None,
                    else_branch: Some(Box::new(b.unit())),
                },
                ty,
            )
        };
        let err = Codegen::default()
            .lower_expression("f", &make(Type::int()), 0)
            .unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::EmptyBranches("Int".to_string()));

        let err = Codegen::default()
            .lower_expression("f", &make(Type::Unit), 0)
            .unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::EmptyBranches("Unit".to_string()));

        let function = Codegen::default()
            .lower_expression("f", &make(Type::Nothing), 0)
            .unwrap();
        assert_eq!(function.chunk.open_reservations(), 0);
    }

    #[test]
    fn when_without_subject_rejects_type_tests() {
        let b = TreeBuilder::new();
        let expr = b.when(
            None,
            vec![b.when_is(Type::int(), b.string("i")), b.when_else(b.string("o"))],
            Type::String,
        );
        let err = Codegen::default().lower_expression("f", &expr, 0).unwrap_err();
        assert!(matches!(err.kind, CodegenErrorKind::Unsupported(_)));
        assert_ne!(err.span, Span::dummy());
    }
}
