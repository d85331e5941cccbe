//! Bytecode disassembler for debugging

use std::fmt::{self, Write};

use super::chunk::Chunk;
use super::constant::Constant;
use super::function::Function;
use super::opcode::OpCode;
use crate::types::PrimitiveKind;

/// Disassemble a chunk to a string
pub fn disassemble_chunk(chunk: &Chunk, name: &str) -> String {
    let mut output = String::new();
    render_chunk(chunk, name, &mut output).map_or_else(|_| String::new(), |()| output)
}

/// Disassemble a function and every closure body nested in it
pub fn disassemble_function(function: &Function) -> String {
    let mut output = String::new();
    render_function(function, &mut output).map_or_else(|_| String::new(), |()| output)
}

/// Disassemble the single instruction at `offset`
pub fn disassemble_instruction(chunk: &Chunk, offset: usize) -> String {
    let mut output = String::new();
    match render_instruction(chunk, offset, &mut output) {
        Ok(_) => output.trim_end().to_string(),
        Err(_) => String::new(),
    }
}

fn render_function(function: &Function, output: &mut String) -> fmt::Result {
    writeln!(
        output,
        "; locals={} max_stack={} arity={}",
        function.locals, function.max_stack, function.arity
    )?;
    render_chunk(&function.chunk, &function.name, output)?;
    for nested in function.nested() {
        writeln!(output)?;
        render_function(nested, output)?;
    }
    Ok(())
}

fn render_chunk(chunk: &Chunk, name: &str, output: &mut String) -> fmt::Result {
    writeln!(output, "== {name} ==")?;

    let mut offset = 0;
    while offset < chunk.len() {
        offset = render_instruction(chunk, offset, output)?;
    }
    Ok(())
}

/// Disassemble a single instruction to a string, returning the next offset
fn render_instruction(chunk: &Chunk, offset: usize, output: &mut String) -> Result<usize, fmt::Error> {
    write!(output, "{offset:04} ")?;

    // Line number, or | if same as previous
    let line = chunk.get_line(offset);
    if offset > 0 && line == chunk.get_line(offset - 1) {
        write!(output, "   | ")?;
    } else {
        write!(output, "{line:4} ")?;
    }

    let Some(byte) = chunk.read_byte(offset) else {
        writeln!(output, "Invalid offset")?;
        return Ok(offset + 1);
    };

    let Ok(opcode) = OpCode::try_from(byte) else {
        writeln!(output, "Unknown opcode {byte}")?;
        return Ok(offset + 1);
    };

    match opcode {
        OpCode::Null
        | OpCode::Unit
        | OpCode::True
        | OpCode::False
        | OpCode::Pop
        | OpCode::Dup
        | OpCode::DupX1
        | OpCode::Swap
        | OpCode::Not
        | OpCode::Sign
        | OpCode::Same
        | OpCode::Return
        | OpCode::Throw => {
            writeln!(output, "{}", opcode.name())?;
        }

        // u8 primitive kind operand
        OpCode::Add
        | OpCode::Sub
        | OpCode::Mul
        | OpCode::Div
        | OpCode::Rem
        | OpCode::Neg
        | OpCode::Cmp
        | OpCode::Box
        | OpCode::Unbox => {
            let kind = chunk.read_byte(offset + 1).unwrap_or(0);
            writeln!(output, "{:16} {}", opcode.name(), format_kind(kind))?;
        }

        OpCode::Convert => {
            let from = chunk.read_byte(offset + 1).unwrap_or(0);
            let to = chunk.read_byte(offset + 2).unwrap_or(0);
            writeln!(
                output,
                "{:16} {} -> {}",
                opcode.name(),
                format_kind(from),
                format_kind(to)
            )?;
        }

        OpCode::LoadLocal | OpCode::StoreLocal => {
            let slot = chunk.read_u16(offset + 1).unwrap_or(0);
            writeln!(output, "{:16} {}", opcode.name(), slot)?;
        }

        // u16 constant operand
        OpCode::Const
        | OpCode::GetField
        | OpCode::SetField
        | OpCode::InstanceOf
        | OpCode::CheckCast
        | OpCode::New => {
            let idx = chunk.read_u16(offset + 1).unwrap_or(0);
            writeln!(
                output,
                "{:16} {:4} {}",
                opcode.name(),
                idx,
                format_constant(chunk.get_constant(idx))
            )?;
        }

        OpCode::Jump
        | OpCode::JumpIfFalse
        | OpCode::JumpIfTrue
        | OpCode::JumpIfNull
        | OpCode::JumpIfNotNull
        | OpCode::JumpIfEq
        | OpCode::JumpIfNe => {
            let jump = chunk.read_i16(offset + 1).unwrap_or(0);
            let target = offset as isize + 3 + jump as isize;
            writeln!(output, "{:16} {:4} -> {}", opcode.name(), jump, target)?;
        }

        // u16 constant + u8 count
        OpCode::InvokeStatic
        | OpCode::InvokeVirtual
        | OpCode::InvokeSpecial
        | OpCode::MakeClosure => {
            let idx = chunk.read_u16(offset + 1).unwrap_or(0);
            let count = chunk.read_byte(offset + 3).unwrap_or(0);
            writeln!(
                output,
                "{:16} {:4} {} ({})",
                opcode.name(),
                idx,
                format_constant(chunk.get_constant(idx)),
                count
            )?;
        }
    }

    Ok(offset + opcode.size())
}

fn format_kind(byte: u8) -> String {
    PrimitiveKind::try_from(byte).map_or_else(|b| format!("<kind {b}>"), |k| k.name().to_string())
}

fn format_constant(constant: Option<&Constant>) -> String {
    match constant {
        Some(Constant::String(s)) => format!("'{s}'"),
        Some(c) => c.to_string(),
        None => "<invalid>".to_string(),
    }
}
