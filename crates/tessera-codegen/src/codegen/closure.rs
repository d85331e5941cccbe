//! Function literals
//!
//! A literal is lowered by a child [`FunctionCodegen`] whose slot 0 holds
//! the closure object. Captured locals become closure fields named `$name`;
//! the enclosing instance becomes `this$0`. Boxed locals are captured by
//! sharing their `Ref` cell.

use std::rc::Rc;

use crate::ast::{Capture, FunctionLiteral};
use crate::bytecode::CodegenResult;
use crate::types::Type;

use super::stack_value::{ref_type, StackValue, OUTER_THIS_FIELD};
use super::FunctionCodegen;

/// Closure field holding the captured variable `name`
fn capture_field(name: &str) -> Rc<str> {
    Rc::from(format!("${name}"))
}

impl FunctionCodegen {
    pub(super) fn gen_closure(&mut self, literal: &FunctionLiteral) -> CodegenResult<StackValue> {
        let name = match &literal.name {
            Some(name) => name.to_string(),
            None => format!("{}$lambda{}", self.name, self.closure_count),
        };
        self.closure_count += 1;

        let mut child = FunctionCodegen::new(
            name,
            Rc::clone(&self.options),
            self.v.coercion(),
            literal.return_type.clone(),
            literal.frame_size,
        );
        child.v.set_span(self.v.span());
        child.reserve_slot(0)?;

        let mut implicit_this = None;
        for capture in &literal.captures {
            match capture {
                Capture::Variable(var) => {
                    let field = capture_field(&var.name);
                    let stored_ty = if var.wrapped { ref_type() } else { var.ty.clone() };
                    let in_closure = StackValue::Outer {
                        inner: Box::new(StackValue::Field {
                            name: Rc::clone(&field),
                            receiver: None,
                            ty: stored_ty,
                        }),
                    };
                    let value = if var.wrapped {
                        StackValue::WrappedVar {
                            cell: Box::new(in_closure),
                            ty: var.ty.clone(),
                        }
                    } else {
                        in_closure
                    };
                    child.frame.insert(var.id, value);
                    child.captures.push(field);
                }
                Capture::OuterThis(ty) => {
                    child.captures.push(Rc::from(OUTER_THIS_FIELD));
                    implicit_this = Some(StackValue::ThisOuter { ty: ty.clone() });
                }
            }
        }
        child.v.set_implicit_this(implicit_this);
        child.bind_parameters(&literal.params)?;
        let function = child.finish(&literal.body)?;
        let arity = function.arity;

        // Capture values, in field order
        for capture in &literal.captures {
            match capture {
                Capture::Variable(var) => match self.variable(var.id)? {
                    StackValue::WrappedVar { cell, .. } => cell.load(&ref_type(), &mut self.v)?,
                    value => value.load(&var.ty, &mut self.v)?,
                },
                Capture::OuterThis(ty) => {
                    let this = self.v.implicit_receiver()?;
                    this.load(ty, &mut self.v)?;
                }
            }
        }
        self.v.make_closure(function, literal.captures.len())?;
        Ok(StackValue::OnStack(Type::Function(arity)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::{disassemble_function, CodegenErrorKind};
    use crate::codegen::Codegen;
    use crate::testutil::TreeBuilder;

    #[test]
    fn capture_fields_are_prefixed() {
        assert_eq!(capture_field("count").as_ref(), "$count");
    }

    #[test]
    fn closure_body_is_nested_function() {
        let mut b = TreeBuilder::new();
        let n = b.local("n", Type::int());
        let literal = b.closure(vec![], vec![Capture::Variable(n.clone())], b.var(&n), Type::int());
        let body = b.block(vec![b.declare(&n, Some(b.int(5)))], Some(literal));
        let function = Codegen::default()
            .lower_expression("outer", &body, b.frame_size())
            .unwrap();

        let nested: Vec<_> = function.nested().collect();
        assert_eq!(nested.len(), 1);
        assert_eq!(nested[0].name, "outer$lambda0");
        assert_eq!(nested[0].captures, vec![Rc::from("$n")]);
        assert!(disassemble_function(&function).contains("MAKE_CLOSURE"));
    }

    #[test]
    fn outer_this_requires_receiver() {
        let b = TreeBuilder::new();
        let literal = b.closure(
            vec![],
            vec![Capture::OuterThis(Type::class("Point"))],
            b.int(1),
            Type::int(),
        );
        let err = Codegen::default()
            .lower_expression("f", &literal, 0)
            .unwrap_err();
        assert_eq!(err.kind, CodegenErrorKind::NoImplicitReceiver);
    }
}
