//! Tessera codegen - expression-to-bytecode lowering for a stack machine
//!
//! The lowering engine takes a typed, resolved tree (see [`ast`]) and emits
//! a [`bytecode::Function`] per function or function literal. Lowering is
//! organised around [`codegen::StackValue`], a deferred value that the
//! consumer reads, writes or both, so compound assignment, increments and
//! captured variables share one code path.
//!
//! A small reference interpreter lives in [`vm`]; it executes lowered
//! functions so their behaviour can be observed directly.

pub mod ast;
pub mod bytecode;
pub mod codegen;
pub mod config;
pub mod span;
pub mod types;
pub mod vm;

#[doc(hidden)]
pub mod testutil;

pub use bytecode::{CodegenError, CodegenErrorKind, CodegenResult, Function};
pub use codegen::Codegen;
pub use config::{CodegenOptions, ConfigError};
pub use vm::{RuntimeError, Value, VM};
