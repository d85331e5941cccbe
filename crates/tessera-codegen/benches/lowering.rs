//! Benchmark suite for the lowering engine
//!
//! Measures how fast typed trees are turned into bytecode, and how fast the
//! reference VM runs the result.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use tessera_codegen::ast::{BinaryOp, Expr};
use tessera_codegen::testutil::TreeBuilder;
use tessera_codegen::types::Type;
use tessera_codegen::{Codegen, CodegenOptions, VM};

/// A block of `statements` branches feeding one accumulator:
///
/// ```text
/// var sum = 0
/// sum += if (k < 7) k * 2 else when (k % 3) { 0 -> 1; 1 -> 2; else -> 3 }
/// ...
/// sum
/// ```
fn generate_program(statements: usize) -> (TreeBuilder, Expr) {
    let mut b = TreeBuilder::new();
    let sum = b.local("sum", Type::int()).mutable();

    let mut stmts = vec![b.declare(&sum, Some(b.int(0)))];
    for k in 0..statements {
        let k = (k % 50) as i32;
        let when = b.when(
            Some(b.binary_op(BinaryOp::Rem, b.int(k), b.int(3))),
            vec![
                b.when_eq(b.int(0), b.int(1)),
                b.when_eq(b.int(1), b.int(2)),
                b.when_else(b.int(3)),
            ],
            Type::int(),
        );
        let value = b.if_else(
            b.binary_op(BinaryOp::Lt, b.int(k), b.int(7)),
            b.binary_op(BinaryOp::Times, b.int(k), b.int(2)),
            when,
            Type::int(),
        );
        stmts.push(b.stmt(b.aug_assign(BinaryOp::Plus, b.var(&sum), value)));
    }
    let program = b.block(stmts, Some(b.var(&sum)));
    (b, program)
}

/// A counted loop summing `0 until n`
fn generate_loop(n: i32) -> (TreeBuilder, Expr) {
    let mut b = TreeBuilder::new();
    let sum = b.local("sum", Type::long()).mutable();
    let i = b.local("i", Type::int());
    let body = b.aug_assign(BinaryOp::Plus, b.var(&sum), b.long(1));
    let program = b.block(
        vec![
            b.declare(&sum, Some(b.long(0))),
            b.stmt(b.for_range(None, &i, b.int(0), b.int(n), false, body)),
        ],
        Some(b.var(&sum)),
    );
    (b, program)
}

/// Benchmark lowering with and without intrinsic operators
fn bench_lowering(c: &mut Criterion) {
    let mut group = c.benchmark_group("lowering");

    for size in [10, 100, 1_000].iter() {
        let (builder, program) = generate_program(*size);
        group.throughput(Throughput::Elements(*size as u64));

        for intrinsics in [true, false] {
            let codegen = Codegen::new(CodegenOptions::default().with_intrinsics(intrinsics));
            let id = if intrinsics { "intrinsics" } else { "calls" };
            group.bench_with_input(BenchmarkId::new(id, size), &program, |b, program| {
                b.iter(|| {
                    codegen
                        .lower_expression("main", black_box(program), builder.frame_size())
                        .unwrap()
                });
            });
        }
    }

    group.finish();
}

/// Benchmark executing lowered code on the VM
fn bench_execution(c: &mut Criterion) {
    let mut group = c.benchmark_group("execution");

    for n in [1_000, 100_000].iter() {
        let (builder, program) = generate_loop(*n);
        let function = Codegen::default()
            .lower_expression("main", &program, builder.frame_size())
            .unwrap();
        group.throughput(Throughput::Elements(*n as u64));
        group.bench_with_input(BenchmarkId::from_parameter(n), &function, |b, function| {
            b.iter(|| VM::new().run(black_box(function.clone())).unwrap());
        });
    }

    group.finish();
}

criterion_group!(benches, bench_lowering, bench_execution);
criterion_main!(benches);
