//! Integration tests for branches, loops and function literals

use std::rc::Rc;

use pretty_assertions::assert_eq;
use tessera_codegen::ast::{
    BinaryOp, Capture, Expr, ExprKind, FunctionDecl, PropertyDescriptor, Stmt, VariableDescriptor,
    WhenCondition,
};
use tessera_codegen::bytecode::{disassemble_function, Function};
use tessera_codegen::testutil::{run, TestResult, TreeBuilder};
use tessera_codegen::types::Type;
use tessera_codegen::vm::{Object, RuntimeErrorKind, Value};
use tessera_codegen::{Codegen, VM};

fn increment(b: &TreeBuilder, var: &VariableDescriptor) -> Stmt {
    b.stmt(b.inc_dec(b.var(var), false, true))
}

fn equals(b: &TreeBuilder, var: &VariableDescriptor, value: i32) -> Expr {
    b.binary_op(BinaryOp::Eq, b.var(var), b.int(value))
}

fn all_reservations_patched(function: &Function) -> bool {
    function.chunk.open_reservations() == 0
        && function.nested().all(|nested| all_reservations_patched(nested))
}

// ============================================================================
// if / when
// ============================================================================

#[test]
fn test_if_expression_value() -> TestResult {
    for (left, expected) in [(1, "yes"), (3, "no")] {
        let b = TreeBuilder::new();
        let expr = b.if_else(
            b.binary_op(BinaryOp::Lt, b.int(left), b.int(2)),
            b.string("yes"),
            b.string("no"),
            Type::String,
        );
        assert_eq!(run(&b, &expr)?, Value::string(expected));
    }
    Ok(())
}

#[test]
fn test_when_on_subject_type_runs_one_entry() -> TestResult {
    let subjects: [(fn(&TreeBuilder) -> Expr, &str); 3] = [
        (|b| b.int(1), "i"),
        (|b| b.string("x"), "s"),
        (|b| b.double(2.5), "o"),
    ];
    for (subject, expected) in subjects {
        let mut b = TreeBuilder::new();
        let hits = b.local("hits", Type::int()).mutable();
        let result = b.local("result", Type::String);
        let body = |text: &str| b.block(vec![increment(&b, &hits)], Some(b.string(text)));
        let when = b.when(
            Some(b.typed(subject(&b), Type::any_nullable())),
            vec![
                b.when_is(Type::int(), body("i")),
                b.when_is(Type::String, body("s")),
                b.when_else(body("o")),
            ],
            Type::String,
        );
        let expr = b.block(
            vec![b.declare(&hits, Some(b.int(0))), b.declare(&result, Some(when))],
            Some(b.tuple(vec![b.var(&result), b.var(&hits)])),
        );
        assert_eq!(
            run(&b, &expr)?,
            Value::tuple(vec![Value::string(expected), Value::Int(1)])
        );
    }
    Ok(())
}

#[test]
fn test_when_matches_by_equality() -> TestResult {
    for (subject, expected) in [(1, "one"), (2, "few"), (3, "few"), (9, "many")] {
        let b = TreeBuilder::new();
        let few = b.when_entry(
            vec![
                WhenCondition::Equals(b.int(2)),
                WhenCondition::Equals(b.int(3)),
            ],
            b.string("few"),
        );
        let expr = b.when(
            Some(b.int(subject)),
            vec![
                b.when_eq(b.int(1), b.string("one")),
                few,
                b.when_else(b.string("many")),
            ],
            Type::String,
        );
        assert_eq!(run(&b, &expr)?, Value::string(expected), "when ({subject})");
    }
    Ok(())
}

#[test]
fn test_exhaustive_when_without_match_throws() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.when(
        Some(b.typed(b.double(2.5), Type::any_nullable())),
        vec![
            b.when_is(Type::int(), b.string("i")),
            b.when_is(Type::String, b.string("s")),
        ],
        Type::String,
    );
    let function = Codegen::default().lower_expression("main", &expr, b.frame_size())?;
    let err = VM::new().run(function).unwrap_err();
    assert!(matches!(
        err.kind,
        RuntimeErrorKind::Thrown { ref class, .. } if class == "NoWhenBranchMatchedException"
    ));
    Ok(())
}

#[test]
fn test_statement_when_without_match_is_unit() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.when(
        Some(b.int(5)),
        vec![b.when_eq(b.int(1), b.unit())],
        Type::Unit,
    );
    assert_eq!(run(&b, &expr)?, Value::Unit);
    Ok(())
}

// ============================================================================
// Loops
// ============================================================================

#[test]
fn test_while_continue_rechecks_condition() -> TestResult {
    // while (i < 6) { i++; if (i % 2 == 1) continue; evens++ }
    let mut b = TreeBuilder::new();
    let i = b.local("i", Type::int()).mutable();
    let evens = b.local("evens", Type::int()).mutable();
    let odd = b.binary_op(
        BinaryOp::Eq,
        b.binary_op(BinaryOp::Rem, b.var(&i), b.int(2)),
        b.int(1),
    );
    let body = b.block(
        vec![
            increment(&b, &i),
            b.stmt(b.if_then(odd, b.continue_to(None))),
            increment(&b, &evens),
        ],
        None,
    );
    let expr = b.block(
        vec![
            b.declare(&i, Some(b.int(0))),
            b.declare(&evens, Some(b.int(0))),
            b.stmt(b.while_loop(None, b.binary_op(BinaryOp::Lt, b.var(&i), b.int(6)), body)),
        ],
        Some(b.var(&evens)),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(3));
    Ok(())
}

#[test]
fn test_do_while_runs_body_first() -> TestResult {
    // do { i++; if (i < 3) continue; hits++ } while (i < 5)
    let mut b = TreeBuilder::new();
    let i = b.local("i", Type::int()).mutable();
    let hits = b.local("hits", Type::int()).mutable();
    let body = b.block(
        vec![
            increment(&b, &i),
            b.stmt(b.if_then(
                b.binary_op(BinaryOp::Lt, b.var(&i), b.int(3)),
                b.continue_to(None),
            )),
            increment(&b, &hits),
        ],
        None,
    );
    let expr = b.block(
        vec![
            b.declare(&i, Some(b.int(0))),
            b.declare(&hits, Some(b.int(0))),
            b.stmt(b.do_while(None, body, b.binary_op(BinaryOp::Lt, b.var(&i), b.int(5)))),
        ],
        Some(b.tuple(vec![b.var(&i), b.var(&hits)])),
    );
    assert_eq!(run(&b, &expr)?, Value::tuple(vec![Value::Int(5), Value::Int(3)]));
    Ok(())
}

#[test]
fn test_range_loop_bounds() -> TestResult {
    for (inclusive, expected) in [(true, 15), (false, 10)] {
        let mut b = TreeBuilder::new();
        let sum = b.local("sum", Type::int()).mutable();
        let i = b.local("i", Type::int());
        let body = b.aug_assign(BinaryOp::Plus, b.var(&sum), b.var(&i));
        let expr = b.block(
            vec![
                b.declare(&sum, Some(b.int(0))),
                b.stmt(b.for_range(None, &i, b.int(1), b.int(5), inclusive, body)),
            ],
            Some(b.var(&sum)),
        );
        assert_eq!(run(&b, &expr)?, Value::Int(expected), "inclusive: {inclusive}");
    }
    Ok(())
}

#[test]
fn test_empty_range_skips_body() -> TestResult {
    let mut b = TreeBuilder::new();
    let count = b.local("count", Type::int()).mutable();
    let i = b.local("i", Type::int());
    let body = b.inc_dec(b.var(&count), true, true);
    let expr = b.block(
        vec![
            b.declare(&count, Some(b.int(0))),
            b.stmt(b.for_range(None, &i, b.int(3), b.int(1), true, body)),
        ],
        Some(b.var(&count)),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(0));
    Ok(())
}

#[test]
fn test_inclusive_range_ending_at_max_terminates() -> TestResult {
    let mut b = TreeBuilder::new();
    let count = b.local("count", Type::int()).mutable();
    let i = b.local("i", Type::int());
    let body = b.block(
        vec![
            increment(&b, &count),
            b.stmt(b.if_then(equals(&b, &i, i32::MAX), b.continue_to(None))),
        ],
        None,
    );
    let expr = b.block(
        vec![
            b.declare(&count, Some(b.int(0))),
            b.stmt(b.for_range(None, &i, b.int(i32::MAX - 1), b.int(i32::MAX), true, body)),
        ],
        Some(b.var(&count)),
    );
    let function = Codegen::default().lower_expression("main", &expr, b.frame_size())?;
    let result = VM::new().with_step_limit(10_000).run(function)?;
    assert_eq!(result, Value::Int(2));
    Ok(())
}

#[test]
fn test_labeled_break_and_continue() -> TestResult {
    // outer@ for (i in 0..4) for (j in 0..4) {
    //     if (j == 2) continue
    //     if (i == 2) break@outer
    //     total += 1
    // }
    let mut b = TreeBuilder::new();
    let total = b.local("total", Type::int()).mutable();
    let i = b.local("i", Type::int());
    let j = b.local("j", Type::int());
    let inner_body = b.block(
        vec![
            b.stmt(b.if_then(equals(&b, &j, 2), b.continue_to(None))),
            b.stmt(b.if_then(equals(&b, &i, 2), b.break_to(Some("outer")))),
            b.stmt(b.aug_assign(BinaryOp::Plus, b.var(&total), b.int(1))),
        ],
        None,
    );
    let inner = b.for_range(None, &j, b.int(0), b.int(4), true, inner_body);
    let outer = b.for_range(Some("outer"), &i, b.int(0), b.int(4), true, inner);
    let expr = b.block(
        vec![b.declare(&total, Some(b.int(0))), b.stmt(outer)],
        Some(b.var(&total)),
    );

    let function = Codegen::default().lower_expression("main", &expr, b.frame_size())?;
    assert!(all_reservations_patched(&function));
    assert_eq!(VM::new().run(function)?, Value::Int(8));
    Ok(())
}

#[test]
fn test_break_inside_pending_operands_unwinds_stack() -> TestResult {
    // while (true) { val t = Tuple.of(1, if (true) break else 2) }; "done"
    let b = TreeBuilder::new();
    let escape = b.if_else(b.bool(true), b.break_to(None), b.int(2), Type::int());
    let body = b.tuple(vec![b.int(1), escape]);
    let expr = b.block(
        vec![b.stmt(b.while_loop(None, b.bool(true), body))],
        Some(b.string("done")),
    );
    assert_eq!(run(&b, &expr)?, Value::string("done"));
    Ok(())
}

#[test]
fn test_for_in_iterates_tuple() -> TestResult {
    let mut b = TreeBuilder::new();
    let sum = b.local("sum", Type::int()).mutable();
    let item = b.local("item", Type::int());
    let body = b.aug_assign(BinaryOp::Plus, b.var(&sum), b.var(&item));
    let iterable = b.tuple(vec![b.int(4), b.int(5), b.int(6)]);
    let expr = b.block(
        vec![
            b.declare(&sum, Some(b.int(0))),
            b.stmt(b.for_in(None, &item, iterable, body)),
        ],
        Some(b.var(&sum)),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(15));
    Ok(())
}

#[test]
fn test_destructuring_declaration() -> TestResult {
    let mut b = TreeBuilder::new();
    let n = b.local("n", Type::int());
    let s = b.local("s", Type::String);
    let expr = b.block(
        vec![b.destructure(
            vec![n.clone(), s.clone()],
            b.tuple(vec![b.int(7), b.string("seven")]),
        )],
        Some(b.tuple(vec![b.var(&s), b.var(&n)])),
    );
    assert_eq!(
        run(&b, &expr)?,
        Value::tuple(vec![Value::string("seven"), Value::Int(7)])
    );
    Ok(())
}

// ============================================================================
// Function literals
// ============================================================================

#[test]
fn test_closure_reads_captured_value() -> TestResult {
    // val base = 10; val add = { x: Int -> x + base }; add(5)
    let mut b = TreeBuilder::new();
    let base = b.local("base", Type::int());
    let add = b.local("add", Type::Function(1));
    let x = b.param(1, "x", Type::int());
    let literal = b.closure(
        vec![x.clone()],
        vec![Capture::Variable(base.clone())],
        b.binary_op(BinaryOp::Plus, b.var(&x), b.var(&base)),
        Type::int(),
    );
    let expr = b.block(
        vec![b.declare(&base, Some(b.int(10))), b.declare(&add, Some(literal))],
        Some(b.invoke(b.var(&add), vec![b.int(5)], Type::int())),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(15));
    Ok(())
}

#[test]
fn test_closure_shares_wrapped_variable() -> TestResult {
    // var count = 0; val bump = { count += 1 }; bump(); bump(); count
    let mut b = TreeBuilder::new();
    let count = b.local("count", Type::int()).mutable().wrapped();
    let bump = b.local("bump", Type::Function(0));
    let literal = b.closure(
        vec![],
        vec![Capture::Variable(count.clone())],
        b.aug_assign(BinaryOp::Plus, b.var(&count), b.int(1)),
        Type::Unit,
    );
    let call = || b.stmt(b.invoke(b.var(&bump), vec![], Type::Unit));
    let expr = b.block(
        vec![
            b.declare(&count, Some(b.int(0))),
            b.declare(&bump, Some(literal)),
            call(),
            call(),
        ],
        Some(b.var(&count)),
    );

    let function = Codegen::default().lower_expression("main", &expr, b.frame_size())?;
    assert!(all_reservations_patched(&function));
    let listing = disassemble_function(&function);
    assert!(listing.contains("main$lambda0"), "{listing}");
    assert_eq!(VM::new().run(function)?, Value::Int(2));
    Ok(())
}

#[test]
fn test_closure_captures_enclosing_instance() -> TestResult {
    // fun Point.lazyX(): Int { val f = { this.x }; return f() }
    let point = Type::class("Point");
    let x = PropertyDescriptor::instance(point.clone(), "x", Type::int());
    let mut b = TreeBuilder::for_method();
    let f = b.local("f", Type::Function(0));
    let this = b.expr(ExprKind::This, point.clone());
    let literal = b.closure(
        vec![],
        vec![Capture::OuterThis(point.clone())],
        b.property(Some(this), x),
        Type::int(),
    );
    let body = b.block(
        vec![b.declare(&f, Some(literal))],
        Some(b.invoke(b.var(&f), vec![], Type::int())),
    );
    let decl = FunctionDecl::new("lazyX", vec![], Type::int(), body, b.frame_size()).method_of(point);
    let function = Codegen::default().lower_function(&decl)?;

    let receiver = Object::new(Rc::from("Point"));
    receiver.set_field(Rc::from("x"), Value::Int(41));
    let mut vm = VM::new();
    vm.define("Point", Rc::clone(&function));
    assert_eq!(vm.call(function, vec![Value::Object(Rc::new(receiver))])?, Value::Int(41));
    Ok(())
}

#[test]
fn test_closure_called_from_host() -> TestResult {
    let mut b = TreeBuilder::new();
    let x = b.param(1, "x", Type::int());
    let literal = b.closure(
        vec![x.clone()],
        vec![],
        b.binary_op(BinaryOp::Times, b.var(&x), b.var(&x)),
        Type::int(),
    );
    let mut vm = VM::new();
    let square = vm.run(Codegen::default().lower_expression("main", &literal, b.frame_size())?)?;
    assert!(matches!(square, Value::Closure(_)));
    assert_eq!(vm.call_closure(&square, vec![Value::Int(9)])?, Value::Int(81));
    Ok(())
}

// ============================================================================
// Runtime limits
// ============================================================================

#[test]
fn test_infinite_loop_hits_step_limit() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.while_loop(None, b.bool(true), b.unit());
    let function = Codegen::default().lower_expression("main", &expr, 0)?;
    let err = VM::new().with_step_limit(1_000).run(function).unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::StepLimit(1_000));
    Ok(())
}
