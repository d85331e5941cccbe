//! Bytecode chunk - the append-only instruction stream of one function

use std::collections::BTreeSet;

use super::constant::Constant;
use super::error::CodegenErrorKind;
use super::opcode::OpCode;

/// A jump whose target is not known yet.
///
/// Holds the offset of the jump's i16 operand. The handle is move-only and
/// patching consumes it, so every reservation is resolved at most once.
#[must_use = "a reserved jump must be patched before the chunk is finished"]
#[derive(Debug, PartialEq, Eq)]
pub struct Reservation {
    offset: usize,
}

impl Reservation {
    /// Offset of the placeholder operand
    #[must_use]
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// A chunk of bytecode
///
/// Contains the raw bytecode instructions, a constant pool, line number
/// information for diagnostics and the set of jump reservations that still
/// wait for their target.
#[derive(Clone, Default)]
pub struct Chunk {
    /// Raw bytecode instructions
    code: Vec<u8>,

    /// Constant pool
    constants: Vec<Constant>,

    /// Line number information (run-length encoded)
    /// Each entry is (line_number, count) meaning `count` bytes at this line
    lines: Vec<(u32, u32)>,

    /// Operand offsets of reserved jumps not yet patched
    open: BTreeSet<usize>,

    /// Source file name (for error messages)
    pub source_name: Option<String>,
}

impl Chunk {
    /// Create a new empty chunk
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a new chunk with a source name
    #[must_use]
    pub fn with_source(source_name: impl Into<String>) -> Self {
        Self {
            source_name: Some(source_name.into()),
            ..Self::default()
        }
    }

    /// Returns the number of bytes in the chunk
    #[must_use]
    pub fn len(&self) -> usize {
        self.code.len()
    }

    /// Returns true if the chunk is empty
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.code.is_empty()
    }

    /// Returns the raw bytecode
    #[must_use]
    pub fn code(&self) -> &[u8] {
        &self.code
    }

    /// Returns the constant pool
    #[must_use]
    pub fn constants(&self) -> &[Constant] {
        &self.constants
    }

    /// Get a constant by index
    #[must_use]
    pub fn get_constant(&self, index: u16) -> Option<&Constant> {
        self.constants.get(index as usize)
    }

    /// Write a single byte to the chunk
    pub fn write_byte(&mut self, byte: u8, line: u32) {
        self.code.push(byte);
        self.add_line(line, 1);
    }

    /// Write an opcode to the chunk
    pub fn write_op(&mut self, op: OpCode, line: u32) {
        self.write_byte(op as u8, line);
    }

    /// Write an opcode with a u8 operand
    pub fn write_op_u8(&mut self, op: OpCode, operand: u8, line: u32) {
        self.write_byte(op as u8, line);
        self.write_byte(operand, line);
    }

    /// Write an opcode with two u8 operands
    pub fn write_op_u8_u8(&mut self, op: OpCode, first: u8, second: u8, line: u32) {
        self.write_byte(op as u8, line);
        self.write_byte(first, line);
        self.write_byte(second, line);
    }

    /// Write an opcode with a u16 operand
    pub fn write_op_u16(&mut self, op: OpCode, operand: u16, line: u32) {
        self.write_byte(op as u8, line);
        self.write_u16(operand, line);
    }

    /// Write an opcode with a u16 and a u8 operand
    pub fn write_op_u16_u8(&mut self, op: OpCode, index: u16, count: u8, line: u32) {
        self.write_op_u16(op, index, line);
        self.write_byte(count, line);
    }

    /// Write a u16 value (little-endian)
    pub fn write_u16(&mut self, value: u16, line: u32) {
        self.write_byte((value & 0xFF) as u8, line);
        self.write_byte((value >> 8) as u8, line);
    }

    /// Write an i16 value (little-endian)
    pub fn write_i16(&mut self, value: i16, line: u32) {
        self.write_u16(value as u16, line);
    }

    /// Read a byte at a position
    #[must_use]
    pub fn read_byte(&self, offset: usize) -> Option<u8> {
        self.code.get(offset).copied()
    }

    /// Read a u16 at a position (little-endian)
    #[must_use]
    pub fn read_u16(&self, offset: usize) -> Option<u16> {
        let low = u16::from(self.code.get(offset).copied()?);
        let high = u16::from(self.code.get(offset + 1).copied()?);
        Some(low | (high << 8))
    }

    /// Read an i16 at a position (little-endian)
    #[must_use]
    pub fn read_i16(&self, offset: usize) -> Option<i16> {
        self.read_u16(offset).map(|u| u as i16)
    }

    /// Patch an i16 value at a position
    fn patch_i16(&mut self, offset: usize, value: i16) {
        let bytes = value.to_le_bytes();
        self.code[offset] = bytes[0];
        self.code[offset + 1] = bytes[1];
    }

    /// Add a constant to the pool and return its index
    ///
    /// Returns `None` if the constant pool is full (> 65535 constants).
    pub fn add_constant(&mut self, constant: Constant) -> Option<u16> {
        if let Some(i) = self.constants.iter().position(|c| c.identical(&constant)) {
            return Some(i as u16);
        }

        let index = self.constants.len();
        if index > u16::MAX as usize {
            return None;
        }
        self.constants.push(constant);
        Some(index as u16)
    }

    /// Add line information for `count` bytes
    fn add_line(&mut self, line: u32, count: u32) {
        if let Some(last) = self.lines.last_mut() {
            if last.0 == line {
                last.1 += count;
                return;
            }
        }
        self.lines.push((line, count));
    }

    /// Get the line number for a bytecode offset
    #[must_use]
    pub fn get_line(&self, offset: usize) -> u32 {
        let mut current_offset = 0;
        for (line, count) in &self.lines {
            current_offset += *count as usize;
            if offset < current_offset {
                return *line;
            }
        }
        self.lines.last().map_or(0, |(line, _)| *line)
    }

    /// Get the current bytecode offset (for jump targets)
    #[must_use]
    pub fn current_offset(&self) -> usize {
        self.code.len()
    }

    /// Emit a jump whose target is patched later
    pub fn reserve_jump(&mut self, op: OpCode, line: u32) -> Reservation {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        self.write_op(op, line);
        let offset = self.code.len();
        self.write_i16(0, line);
        self.open.insert(offset);
        Reservation { offset }
    }

    /// Patch a reserved jump to land on the current position
    pub fn patch_jump(&mut self, reservation: Reservation) -> Result<(), CodegenErrorKind> {
        let target = self.code.len();
        self.patch_jump_to(reservation, target)
    }

    /// Patch a reserved jump to land on `target`
    pub fn patch_jump_to(
        &mut self,
        reservation: Reservation,
        target: usize,
    ) -> Result<(), CodegenErrorKind> {
        let Reservation { offset } = reservation;
        if !self.open.remove(&offset) {
            return Err(CodegenErrorKind::DoublePatch(offset));
        }
        let distance = Self::distance(offset, target)?;
        self.patch_i16(offset, distance);
        Ok(())
    }

    /// Emit a jump to an already known position (backward jumps)
    pub fn emit_jump_to(
        &mut self,
        op: OpCode,
        target: usize,
        line: u32,
    ) -> Result<(), CodegenErrorKind> {
        debug_assert!(op.is_jump(), "{op} is not a jump");
        self.write_op(op, line);
        let distance = Self::distance(self.code.len(), target)?;
        self.write_i16(distance, line);
        Ok(())
    }

    /// Offset stored in a jump operand at `operand`, relative to the byte after it
    fn distance(operand: usize, target: usize) -> Result<i16, CodegenErrorKind> {
        let distance = target as isize - (operand as isize + 2);
        i16::try_from(distance).map_err(|_| CodegenErrorKind::JumpTooLarge(distance))
    }

    /// Number of reservations still waiting for a target
    #[must_use]
    pub fn open_reservations(&self) -> usize {
        self.open.len()
    }

    /// Check that every reservation has been patched
    pub fn finish(&self) -> Result<(), CodegenErrorKind> {
        if self.open.is_empty() {
            Ok(())
        } else {
            Err(CodegenErrorKind::UnpatchedJumps(self.open.len()))
        }
    }
}

impl std::fmt::Debug for Chunk {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Chunk")
            .field("code_len", &self.code.len())
            .field("constants_len", &self.constants.len())
            .field("open_reservations", &self.open.len())
            .field("source_name", &self.source_name)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chunk_write_read() {
        let mut chunk = Chunk::new();

        chunk.write_op(OpCode::Const, 1);
        chunk.write_u16(0x1234, 1);

        assert_eq!(chunk.read_byte(0), Some(OpCode::Const as u8));
        assert_eq!(chunk.read_u16(1), Some(0x1234));
    }

    #[test]
    fn chunk_constants() {
        let mut chunk = Chunk::new();

        let idx1 = chunk.add_constant(Constant::Int(42));
        let idx2 = chunk.add_constant(Constant::Int(42));
        let idx3 = chunk.add_constant(Constant::Long(42));

        assert_eq!(idx1, Some(0));
        assert_eq!(idx1, idx2);
        assert_eq!(idx3, Some(1));
        assert!(matches!(chunk.get_constant(1), Some(Constant::Long(42))));
    }

    #[test]
    fn chunk_line_info() {
        let mut chunk = Chunk::new();

        chunk.write_op(OpCode::Const, 1);
        chunk.write_u16(0, 1);
        chunk.write_op(OpCode::Return, 2);

        assert_eq!(chunk.get_line(0), 1);
        assert_eq!(chunk.get_line(2), 1);
        assert_eq!(chunk.get_line(3), 2);
    }

    #[test]
    fn chunk_jump_patching() {
        let mut chunk = Chunk::new();

        chunk.write_op(OpCode::True, 1);
        let jump = chunk.reserve_jump(OpCode::JumpIfFalse, 1);
        let operand = jump.offset();
        chunk.write_op(OpCode::Null, 2);
        chunk.write_op(OpCode::Pop, 2);
        assert_eq!(chunk.open_reservations(), 1);
        assert_eq!(chunk.finish(), Err(CodegenErrorKind::UnpatchedJumps(1)));

        chunk.patch_jump(jump).expect("patch");
        chunk.write_op(OpCode::Return, 3);

        // Skips Null + Pop
        assert_eq!(chunk.read_i16(operand), Some(2));
        assert_eq!(chunk.finish(), Ok(()));
    }

    #[test]
    fn chunk_double_patch_is_reported() {
        let mut chunk = Chunk::new();
        let jump = chunk.reserve_jump(OpCode::Jump, 1);
        let forged = Reservation {
            offset: jump.offset(),
        };
        chunk.patch_jump(jump).expect("first patch");
        assert_eq!(
            chunk.patch_jump(forged),
            Err(CodegenErrorKind::DoublePatch(1))
        );
    }

    #[test]
    fn chunk_backward_jump() {
        let mut chunk = Chunk::new();

        let loop_start = chunk.current_offset();
        chunk.write_op(OpCode::Null, 1);
        chunk.write_op(OpCode::Pop, 1);
        chunk.emit_jump_to(OpCode::Jump, loop_start, 1).expect("jump");

        assert_eq!(chunk.read_byte(2), Some(OpCode::Jump as u8));
        // Jumps back over itself and the two instructions
        assert_eq!(chunk.read_i16(3), Some(-5));
    }

    #[test]
    fn chunk_jump_too_large() {
        let mut chunk = Chunk::new();
        let jump = chunk.reserve_jump(OpCode::Jump, 1);
        for _ in 0..40_000 {
            chunk.write_op(OpCode::Pop, 1);
        }
        assert!(matches!(
            chunk.patch_jump(jump),
            Err(CodegenErrorKind::JumpTooLarge(_))
        ));
    }
}
