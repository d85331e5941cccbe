//! Integration tests for expression lowering
//!
//! Each test builds a typed tree, lowers it and executes the result on the
//! reference VM, checking observable behavior rather than exact bytecode.

use std::rc::Rc;

use pretty_assertions::assert_eq;
use tessera_codegen::ast::{
    BinaryOp, Expr, ExprKind, FunctionDecl, MethodRef, PropertyDescriptor, ResolvedCall,
    VariableDescriptor,
};
use tessera_codegen::testutil::{run, run_function, TestResult, TreeBuilder};
use tessera_codegen::types::Type;
use tessera_codegen::vm::{Object, RuntimeErrorKind, Value};
use tessera_codegen::{Codegen, CodegenOptions, VM};

fn object(class: &str, fields: &[(&str, Value)]) -> Value {
    let object = Object::new(Rc::from(class));
    for (name, value) in fields {
        object.set_field(Rc::from(*name), value.clone());
    }
    Value::Object(Rc::new(object))
}

fn field(value: &Value, name: &str) -> Option<Value> {
    match value {
        Value::Object(object) => object.field(name),
        _ => None,
    }
}

fn x_of_point() -> PropertyDescriptor {
    PropertyDescriptor::instance(Type::class("Point"), "x", Type::int())
}

/// `Tuple.get(Int): Any?` / `Tuple.set(Int, Any?)` as an indexer
fn tuple_index(b: &TreeBuilder, tuple: Expr, index: Expr) -> Expr {
    let owner = Type::class("Tuple");
    let get = MethodRef::new(owner.clone(), "get", vec![Type::int()], Type::any_nullable());
    let set = MethodRef::new(owner, "set", vec![Type::int(), Type::any_nullable()], Type::Unit);
    b.expr(
        ExprKind::Index {
            receiver: Box::new(tuple),
            indices: vec![index],
            get: ResolvedCall::virtual_call(get),
            set: Some(ResolvedCall::virtual_call(set)),
        },
        Type::int(),
    )
}

// ============================================================================
// Read after write
// ============================================================================

#[test]
fn test_local_read_after_write() -> TestResult {
    let mut b = TreeBuilder::new();
    let x = b.local("x", Type::int()).mutable();
    let expr = b.block(
        vec![
            b.declare(&x, Some(b.int(1))),
            b.stmt(b.assign(b.var(&x), b.int(42))),
        ],
        Some(b.var(&x)),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(42));
    Ok(())
}

#[test]
fn test_property_read_after_write() -> TestResult {
    let mut b = TreeBuilder::new();
    let p = b.param(0, "p", Type::class("Point"));
    let body = b.block(
        vec![b.stmt(b.assign(b.property(Some(b.var(&p)), x_of_point()), b.int(7)))],
        Some(b.property(Some(b.var(&p)), x_of_point())),
    );
    let decl = FunctionDecl::new("moveX", vec![p], Type::int(), body, b.frame_size());

    let point = object("Point", &[("x", Value::Int(1))]);
    assert_eq!(run_function(&decl, vec![point.clone()])?, Value::Int(7));
    assert_eq!(field(&point, "x"), Some(Value::Int(7)));
    Ok(())
}

#[test]
fn test_tuple_component_read_after_write() -> TestResult {
    let mut b = TreeBuilder::new();
    let t = b.local("t", Type::Tuple(2));
    let expr = b.block(
        vec![
            b.declare(&t, Some(b.tuple(vec![b.int(1), b.int(2)]))),
            b.stmt(b.assign(b.tuple_element(b.var(&t), 0, Type::int()), b.int(5))),
        ],
        Some(b.tuple_element(b.var(&t), 0, Type::int())),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(5));
    Ok(())
}

#[test]
fn test_indexer_augmented_assignment() -> TestResult {
    let mut b = TreeBuilder::new();
    let t = b.local("t", Type::Tuple(2));
    let target = tuple_index(&b, b.var(&t), b.int(1));
    let expr = b.block(
        vec![
            b.declare(&t, Some(b.tuple(vec![b.int(1), b.int(2)]))),
            b.stmt(b.aug_assign(BinaryOp::Plus, target, b.int(10))),
        ],
        Some(b.var(&t)),
    );
    assert_eq!(run(&b, &expr)?, Value::tuple(vec![Value::Int(1), Value::Int(12)]));
    Ok(())
}

#[test]
fn test_indexed_collection_is_read_before_index() -> TestResult {
    // t[{ t = (10, 20); 0 }] reads the tuple t held before the index ran
    let mut b = TreeBuilder::new();
    let t = b.local("t", Type::Tuple(2)).mutable();
    let index = b.block(
        vec![b.stmt(b.assign(b.var(&t), b.tuple(vec![b.int(10), b.int(20)])))],
        Some(b.int(0)),
    );
    let expr = b.block(
        vec![b.declare(&t, Some(b.tuple(vec![b.int(1), b.int(2)])))],
        Some(tuple_index(&b, b.var(&t), index)),
    );
    assert_eq!(run(&b, &expr)?, Value::Int(1));
    Ok(())
}

#[test]
fn test_custom_accessors_route_reads_and_writes() -> TestResult {
    let point = Type::class("Point");
    let raw = PropertyDescriptor::instance(point.clone(), "raw", Type::int());
    let sets = PropertyDescriptor::instance(point.clone(), "sets", Type::int());

    // fun Point.getX(): Int = this.raw
    let m = TreeBuilder::for_method();
    let this = m.expr(ExprKind::This, point.clone());
    let get_x = FunctionDecl::new(
        "getX",
        vec![],
        Type::int(),
        m.property(Some(this), raw.clone()),
        m.frame_size(),
    )
    .method_of(point.clone());

    // fun Point.setX(v: Int) { this.raw = v; this.sets++ }
    let mut m = TreeBuilder::for_method();
    let v = m.param(1, "v", Type::int());
    let this = m.expr(ExprKind::This, point.clone());
    let body = m.block(
        vec![
            m.stmt(m.assign(m.property(Some(this.clone()), raw), m.var(&v))),
            m.stmt(m.inc_dec(m.property(Some(this), sets), false, true)),
        ],
        None,
    );
    let set_x = FunctionDecl::new("setX", vec![v], Type::Unit, body, m.frame_size())
        .method_of(point.clone());

    // fun bump(p: Point): Int { p.x = 5; p.x += 1; p.x++; return p.x }
    let x = PropertyDescriptor::instance(point.clone(), "x", Type::int()).with_accessors(
        MethodRef::new(point.clone(), "getX", Vec::new(), Type::int()),
        Some(MethodRef::new(point, "setX", vec![Type::int()], Type::Unit)),
    );
    let mut b = TreeBuilder::new();
    let p = b.param(0, "p", Type::class("Point"));
    let x_of = |b: &TreeBuilder| b.property(Some(b.var(&p)), x.clone());
    let body = b.block(
        vec![
            b.stmt(b.assign(x_of(&b), b.int(5))),
            b.stmt(b.aug_assign(BinaryOp::Plus, x_of(&b), b.int(1))),
            b.stmt(b.inc_dec(x_of(&b), false, true)),
        ],
        Some(x_of(&b)),
    );
    let bump = FunctionDecl::new("bump", vec![p], Type::int(), body, b.frame_size());

    let codegen = Codegen::default();
    let mut vm = VM::new();
    vm.define("Point", codegen.lower_function(&get_x)?);
    vm.define("Point", codegen.lower_function(&set_x)?);
    let bump = codegen.lower_function(&bump)?;

    let target = object("Point", &[("raw", Value::Int(0)), ("sets", Value::Int(0))]);
    assert_eq!(vm.call(bump, vec![target.clone()])?, Value::Int(7));
    assert_eq!(field(&target, "raw"), Some(Value::Int(7)));
    assert_eq!(field(&target, "sets"), Some(Value::Int(3)));
    assert_eq!(field(&target, "x"), None);
    Ok(())
}

#[test]
fn test_static_property_uses_globals() -> TestResult {
    let mut b = TreeBuilder::new();
    let total = PropertyDescriptor::static_property(Type::class("Counter"), "total", Type::int());
    let expr = b.block(
        vec![b.stmt(b.aug_assign(
            BinaryOp::Plus,
            b.property(None, total.clone()),
            b.int(5),
        ))],
        Some(b.property(None, total)),
    );
    let function = Codegen::default().lower_expression("main", &expr, b.frame_size())?;

    let mut vm = VM::new();
    vm.set_global("Counter.total", Value::Int(1));
    assert_eq!(vm.run(function)?, Value::Int(6));
    assert_eq!(vm.global("Counter.total"), Some(&Value::Int(6)));
    Ok(())
}

// ============================================================================
// Increment and decrement
// ============================================================================

#[test]
fn test_postfix_and_prefix_increment() -> TestResult {
    for (prefix, expected_old) in [(false, 5), (true, 6)] {
        let mut b = TreeBuilder::new();
        let i = b.local("i", Type::int()).mutable();
        let old = b.local("old", Type::int());
        let expr = b.block(
            vec![
                b.declare(&i, Some(b.int(5))),
                b.declare(&old, Some(b.inc_dec(b.var(&i), prefix, true))),
            ],
            Some(b.tuple(vec![b.var(&old), b.var(&i)])),
        );
        assert_eq!(
            run(&b, &expr)?,
            Value::tuple(vec![Value::Int(expected_old), Value::Int(6)])
        );
    }
    Ok(())
}

#[test]
fn test_postfix_decrement_on_property() -> TestResult {
    let mut b = TreeBuilder::new();
    let p = b.param(0, "p", Type::class("Point"));
    let body = b.inc_dec(b.property(Some(b.var(&p)), x_of_point()), false, false);
    let decl = FunctionDecl::new("takeX", vec![p], Type::int(), body, b.frame_size());

    let point = object("Point", &[("x", Value::Int(3))]);
    assert_eq!(run_function(&decl, vec![point.clone()])?, Value::Int(3));
    assert_eq!(field(&point, "x"), Some(Value::Int(2)));
    Ok(())
}

// ============================================================================
// Logical operators
// ============================================================================

/// `{ counter++; value }`
fn counted(b: &TreeBuilder, counter: &VariableDescriptor, value: bool) -> Expr {
    b.block(
        vec![b.stmt(b.inc_dec(b.var(counter), false, true))],
        Some(b.bool(value)),
    )
}

#[test]
fn test_short_circuit_skips_right_operand() -> TestResult {
    for (op, left, expected) in [(BinaryOp::And, false, false), (BinaryOp::Or, true, true)] {
        let mut b = TreeBuilder::new();
        let lefts = b.local("lefts", Type::int()).mutable();
        let rights = b.local("rights", Type::int()).mutable();
        let result = b.local("result", Type::bool());
        let expr = b.block(
            vec![
                b.declare(&lefts, Some(b.int(0))),
                b.declare(&rights, Some(b.int(0))),
                b.declare(
                    &result,
                    Some(b.binary_op(op, counted(&b, &lefts, left), counted(&b, &rights, !left))),
                ),
            ],
            Some(b.tuple(vec![b.var(&result), b.var(&lefts), b.var(&rights)])),
        );
        assert_eq!(
            run(&b, &expr)?,
            Value::tuple(vec![Value::Bool(expected), Value::Int(1), Value::Int(0)]),
            "{op:?}"
        );
    }
    Ok(())
}

#[test]
fn test_logical_operators_evaluate_right_when_needed() -> TestResult {
    let mut b = TreeBuilder::new();
    let rights = b.local("rights", Type::int()).mutable();
    let result = b.local("result", Type::bool());
    let expr = b.block(
        vec![
            b.declare(&rights, Some(b.int(0))),
            b.declare(
                &result,
                Some(b.binary_op(BinaryOp::And, b.bool(true), counted(&b, &rights, false))),
            ),
        ],
        Some(b.tuple(vec![b.var(&result), b.var(&rights)])),
    );
    assert_eq!(
        run(&b, &expr)?,
        Value::tuple(vec![Value::Bool(false), Value::Int(1)])
    );
    Ok(())
}

// ============================================================================
// Comparison and equality
// ============================================================================

#[test]
fn test_relational_operators_on_ints() -> TestResult {
    let cases = [
        (BinaryOp::Lt, [true, false, false]),
        (BinaryOp::Le, [true, true, false]),
        (BinaryOp::Gt, [false, false, true]),
        (BinaryOp::Ge, [false, true, true]),
    ];
    for intrinsics in [true, false] {
        let codegen = Codegen::new(CodegenOptions::default().with_intrinsics(intrinsics));
        for (op, expected) in cases {
            for (left, want) in [1, 2, 3].into_iter().zip(expected) {
                let b = TreeBuilder::new();
                let expr = b.binary_op(op, b.int(left), b.int(2));
                let function = codegen.lower_expression("main", &expr, 0)?;
                assert_eq!(
                    VM::new().run(function)?,
                    Value::Bool(want),
                    "{left} {} 2 (intrinsics: {intrinsics})",
                    op.as_str()
                );
            }
        }
    }
    Ok(())
}

#[test]
fn test_relational_operator_calls_compare_to() -> TestResult {
    let version = Type::class("Version");
    let rank = PropertyDescriptor::instance(version.clone(), "rank", Type::int());

    // fun Version.compareTo(other: Version): Int = this.rank - other.rank
    let mut m = TreeBuilder::for_method();
    let other = m.param(1, "other", version.clone());
    let this = m.expr(ExprKind::This, version.clone());
    let body = m.binary_op(
        BinaryOp::Minus,
        m.property(Some(this), rank.clone()),
        m.property(Some(m.var(&other)), rank),
    );
    let compare_to = FunctionDecl::new("compareTo", vec![other], Type::int(), body, m.frame_size())
        .method_of(version.clone());

    // fun atLeast(a: Version, b: Version) = a >= b
    let mut b = TreeBuilder::new();
    let a = b.param(0, "a", version.clone());
    let c = b.param(1, "b", version);
    let body = b.binary_op(BinaryOp::Ge, b.var(&a), b.var(&c));
    let at_least = FunctionDecl::new("atLeast", vec![a, c], Type::bool(), body, b.frame_size());

    let codegen = Codegen::default();
    let compare_to = codegen.lower_function(&compare_to)?;
    let at_least = codegen.lower_function(&at_least)?;

    let rank = |value: i32| object("Version", &[("rank", Value::Int(value))]);
    for (left, right, expected) in [(10, 2, true), (4, 4, true), (1, 7, false)] {
        let mut vm = VM::new();
        vm.define("Version", Rc::clone(&compare_to));
        let result = vm.call(Rc::clone(&at_least), vec![rank(left), rank(right)])?;
        assert_eq!(result, Value::Bool(expected), "{left} >= {right}");
    }
    Ok(())
}

#[test]
fn test_equality_on_nullable_operands() -> TestResult {
    let nullable = Type::String.nullable();
    let cases = [
        (None, None, true),
        (Some("a"), Some("a"), true),
        (Some("a"), None, false),
        (None, Some("a"), false),
    ];
    for (left, right, expected) in cases {
        let b = TreeBuilder::new();
        let operand = |value: Option<&str>| match value {
            Some(text) => b.typed(b.string(text), nullable.clone()),
            None => b.typed(b.null(), nullable.clone()),
        };
        let eq = b.binary_op(BinaryOp::Eq, operand(left), operand(right));
        assert_eq!(run(&b, &eq)?, Value::Bool(expected), "{left:?} == {right:?}");

        let ne = b.binary_op(BinaryOp::NotEq, operand(left), operand(right));
        assert_eq!(run(&b, &ne)?, Value::Bool(!expected), "{left:?} != {right:?}");
    }
    Ok(())
}

#[test]
fn test_identity_distinguishes_equal_objects() -> TestResult {
    let mut b = TreeBuilder::new();
    let p = b.param(0, "p", Type::class("Point"));
    let q = b.param(1, "q", Type::class("Point"));
    let body = b.tuple(vec![
        b.binary_op(BinaryOp::Identity, b.var(&p), b.var(&p)),
        b.binary_op(BinaryOp::Identity, b.var(&p), b.var(&q)),
    ]);
    let decl = FunctionDecl::new("same", vec![p, q], Type::Tuple(2), body, b.frame_size());

    let result = run_function(
        &decl,
        vec![
            object("Point", &[("x", Value::Int(1))]),
            object("Point", &[("x", Value::Int(1))]),
        ],
    )?;
    assert_eq!(result, Value::tuple(vec![Value::Bool(true), Value::Bool(false)]));
    Ok(())
}

// ============================================================================
// Null handling
// ============================================================================

#[test]
fn test_elvis_and_safe_call() -> TestResult {
    let length = MethodRef::new(Type::String, "length$get", vec![], Type::int());
    for (value, fallback, length_or_null) in [
        (Some("abc"), "abc", Value::Int(3)),
        (None, "default", Value::Null),
    ] {
        let mut b = TreeBuilder::new();
        let s = b.local("s", Type::String.nullable());
        let init = match value {
            Some(text) => b.typed(b.string(text), Type::String.nullable()),
            None => b.typed(b.null(), Type::String.nullable()),
        };
        let expr = b.block(
            vec![b.declare(&s, Some(init))],
            Some(b.tuple(vec![
                b.binary_op(BinaryOp::Elvis, b.var(&s), b.string("default")),
                b.safe_call(b.var(&s), ResolvedCall::virtual_call(length.clone()), vec![]),
            ])),
        );
        assert_eq!(
            run(&b, &expr)?,
            Value::tuple(vec![Value::string(fallback), length_or_null])
        );
    }
    Ok(())
}

#[test]
fn test_call_on_null_receiver_fails() -> TestResult {
    let b = TreeBuilder::new();
    let length = MethodRef::new(Type::String, "length$get", vec![], Type::int());
    let expr = b.call(
        Some(b.typed(b.null(), Type::String.nullable())),
        ResolvedCall::virtual_call(length),
        vec![],
    );
    let function = Codegen::default().lower_expression("main", &expr, 0)?;
    let err = VM::new().run(function).unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::NullReference);
    Ok(())
}

// ============================================================================
// Type tests and casts
// ============================================================================

#[test]
fn test_casts_check_runtime_type() -> TestResult {
    let b = TreeBuilder::new();
    let any_one = || b.typed(b.int(1), Type::any_nullable());

    assert_eq!(run(&b, &b.cast(any_one(), Type::int(), false))?, Value::Int(1));
    assert_eq!(run(&b, &b.cast(any_one(), Type::String, true))?, Value::Null);
    assert_eq!(run(&b, &b.is(any_one(), Type::int()))?, Value::Bool(true));
    assert_eq!(run(&b, &b.is(any_one(), Type::String))?, Value::Bool(false));

    let function = Codegen::default().lower_expression("main", &b.cast(any_one(), Type::String, false), 0)?;
    let err = VM::new().run(function).unwrap_err();
    assert_eq!(
        err.kind,
        RuntimeErrorKind::Thrown {
            class: "ClassCastException".to_string(),
            message: "Any? cannot be cast to String".to_string(),
        }
    );
    assert!(!err.stack_trace.is_empty());
    Ok(())
}

#[test]
fn test_safe_cast_of_null_is_null() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.cast(b.typed(b.null(), Type::any_nullable()), Type::class("Point"), true);
    assert_eq!(run(&b, &expr)?, Value::Null);
    Ok(())
}

// ============================================================================
// Arithmetic
// ============================================================================

#[test]
fn test_mixed_width_arithmetic_widens() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.binary_op(
        BinaryOp::Times,
        b.long(3_000_000_000),
        b.int(2),
    );
    assert_eq!(run(&b, &expr)?, Value::Long(6_000_000_000));
    Ok(())
}

#[test]
fn test_integer_division_by_zero_fails() -> TestResult {
    let b = TreeBuilder::new();
    let expr = b.binary_op(BinaryOp::Div, b.int(1), b.int(0));
    let function = Codegen::default().lower_expression("main", &expr, 0)?;
    let err = VM::new().run(function).unwrap_err();
    assert_eq!(err.kind, RuntimeErrorKind::DivisionByZero);
    Ok(())
}
