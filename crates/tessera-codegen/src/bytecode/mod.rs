//! Bytecode layer of the Tessera stack machine
//!
//! This module provides:
//! - `OpCode`: The instruction set
//! - `Constant`: Constant pool entries
//! - `Chunk`: The append-only instruction stream with jump reservation and backpatching
//! - `Function`: A lowered function with its frame and stack requirements
//! - Codegen error types and disassembler utilities

mod chunk;
mod constant;
mod debug;
mod error;
mod function;
mod opcode;

pub use chunk::{Chunk, Reservation};
pub use constant::Constant;
pub use debug::{disassemble_chunk, disassemble_function, disassemble_instruction};
pub use error::{CodegenError, CodegenErrorKind, CodegenResult};
pub use function::Function;
pub use opcode::OpCode;
