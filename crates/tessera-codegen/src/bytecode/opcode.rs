//! Instruction set of the Tessera stack machine

/// Bytecode operation codes
///
/// This is a stack-based instruction set. Most operations pop operands from
/// the stack and push results back onto it. Multi-byte operands are little
/// endian; jump operands are signed offsets relative to the byte after the
/// operand.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum OpCode {
    // ===== Stack Operations =====
    /// Push a constant from the constant pool onto the stack
    /// Operand: u16 constant index
    Const,

    /// Push null onto the stack
    Null,

    /// Push the unit singleton onto the stack
    Unit,

    /// Push true onto the stack
    True,

    /// Push false onto the stack
    False,

    /// Pop and discard the top of stack
    Pop,

    /// Duplicate the top of stack
    Dup,

    /// Duplicate the top of stack and insert it under the second value:
    /// `[a, b] -> [b, a, b]`
    DupX1,

    /// Swap the two topmost values
    Swap,

    // ===== Local Variables =====
    /// Load a local variable onto the stack
    /// Operand: u16 local slot index
    LoadLocal,

    /// Pop the top of stack into a local variable
    /// Operand: u16 local slot index
    StoreLocal,

    // ===== Fields =====
    /// Pop an object, push one of its fields
    /// Operand: u16 constant index (field name)
    GetField,

    /// Pop a value and an object, store the value into the field
    /// Operand: u16 constant index (field name)
    SetField,

    // ===== Arithmetic =====
    /// Pop b, pop a, push a + b
    /// Operand: u8 primitive kind
    Add,

    /// Pop b, pop a, push a - b
    /// Operand: u8 primitive kind
    Sub,

    /// Pop b, pop a, push a * b
    /// Operand: u8 primitive kind
    Mul,

    /// Pop b, pop a, push a / b
    /// Operand: u8 primitive kind
    Div,

    /// Pop b, pop a, push a % b
    /// Operand: u8 primitive kind
    Rem,

    /// Pop a, push -a
    /// Operand: u8 primitive kind
    Neg,

    /// Pop b, pop a, push the three-way comparison of a and b as an Int
    /// Operand: u8 primitive kind
    Cmp,

    // ===== Logic and Comparison =====
    /// Pop a Bool, push its negation
    Not,

    /// Pop an Int, push its sign (-1, 0 or 1)
    Sign,

    /// Pop b, pop a, push whether a and b are the same reference
    /// (primitives compare by value)
    Same,

    // ===== Conversions =====
    /// Convert the top of stack between primitive kinds
    /// Operands: u8 source kind, u8 target kind
    Convert,

    /// Box the primitive on top of the stack
    /// Operand: u8 primitive kind
    Box,

    /// Unbox the reference on top of the stack, failing on null
    /// Operand: u8 primitive kind
    Unbox,

    // ===== Types =====
    /// Pop a value, push whether it is an instance of a type
    /// Operand: u16 constant index (type)
    InstanceOf,

    /// Fail unless the top of stack is null or an instance of a type
    /// Operand: u16 constant index (type)
    CheckCast,

    // ===== Control Flow =====
    /// Unconditional jump
    /// Operand: i16 offset
    Jump,

    /// Pop a Bool, jump if false
    /// Operand: i16 offset
    JumpIfFalse,

    /// Pop a Bool, jump if true
    /// Operand: i16 offset
    JumpIfTrue,

    /// Pop a value, jump if null
    /// Operand: i16 offset
    JumpIfNull,

    /// Pop a value, jump if not null
    /// Operand: i16 offset
    JumpIfNotNull,

    /// Pop two Ints, jump if equal
    /// Operand: i16 offset
    JumpIfEq,

    /// Pop two Ints, jump if not equal
    /// Operand: i16 offset
    JumpIfNe,

    // ===== Calls =====
    /// Call a method with no receiver
    /// Operands: u16 constant index (method), u8 argument count
    InvokeStatic,

    /// Call a method dispatched on the receiver's runtime class
    /// Operands: u16 constant index (method), u8 argument count
    InvokeVirtual,

    /// Call a method on a receiver without dispatch
    /// Operands: u16 constant index (method), u8 argument count
    InvokeSpecial,

    /// Return the top of stack from the current function
    Return,

    // ===== Objects =====
    /// Allocate an uninitialized object
    /// Operand: u16 constant index (class name)
    New,

    /// Pop a value and throw it
    Throw,

    /// Pop captured values and push a closure over a compiled function
    /// Operands: u16 constant index (function), u8 capture count
    MakeClosure,
}

impl OpCode {
    /// Returns the size of the instruction in bytes (including operands)
    #[must_use]
    pub const fn size(self) -> usize {
        match self {
            // No operand instructions (1 byte)
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
            | OpCode::Throw => 1,

            // Single u8 operand (2 bytes)
            OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Neg
            | OpCode::Cmp
            | OpCode::Box
            | OpCode::Unbox => 2,

            // Two u8 operands or a single u16/i16 operand (3 bytes)
            OpCode::Convert
            | OpCode::Const
            | OpCode::LoadLocal
            | OpCode::StoreLocal
            | OpCode::GetField
            | OpCode::SetField
            | OpCode::InstanceOf
            | OpCode::CheckCast
            | OpCode::Jump
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::JumpIfNull
            | OpCode::JumpIfNotNull
            | OpCode::JumpIfEq
            | OpCode::JumpIfNe
            | OpCode::New => 3,

            // u16 + u8 operands (4 bytes)
            OpCode::InvokeStatic
            | OpCode::InvokeVirtual
            | OpCode::InvokeSpecial
            | OpCode::MakeClosure => 4,
        }
    }

    /// Net stack effect of the instruction, `None` when it depends on the
    /// operands (invocations and closure creation)
    #[must_use]
    pub const fn stack_effect(self) -> Option<i32> {
        let effect = match self {
            OpCode::Const
            | OpCode::Null
            | OpCode::Unit
            | OpCode::True
            | OpCode::False
            | OpCode::Dup
            | OpCode::DupX1
            | OpCode::LoadLocal
            | OpCode::New => 1,

            OpCode::Swap
            | OpCode::GetField
            | OpCode::Neg
            | OpCode::Not
            | OpCode::Sign
            | OpCode::Convert
            | OpCode::Box
            | OpCode::Unbox
            | OpCode::InstanceOf
            | OpCode::CheckCast
            | OpCode::Jump => 0,

            OpCode::Pop
            | OpCode::StoreLocal
            | OpCode::Add
            | OpCode::Sub
            | OpCode::Mul
            | OpCode::Div
            | OpCode::Rem
            | OpCode::Cmp
            | OpCode::Same
            | OpCode::JumpIfFalse
            | OpCode::JumpIfTrue
            | OpCode::JumpIfNull
            | OpCode::JumpIfNotNull
            | OpCode::Return
            | OpCode::Throw => -1,

            OpCode::SetField | OpCode::JumpIfEq | OpCode::JumpIfNe => -2,

            OpCode::InvokeStatic
            | OpCode::InvokeVirtual
            | OpCode::InvokeSpecial
            | OpCode::MakeClosure => return None,
        };
        Some(effect)
    }

    /// Whether the instruction carries an i16 jump offset
    #[must_use]
    pub const fn is_jump(self) -> bool {
        matches!(
            self,
            OpCode::Jump
                | OpCode::JumpIfFalse
                | OpCode::JumpIfTrue
                | OpCode::JumpIfNull
                | OpCode::JumpIfNotNull
                | OpCode::JumpIfEq
                | OpCode::JumpIfNe
        )
    }

    /// Returns a human-readable name for the opcode
    #[must_use]
    pub const fn name(self) -> &'static str {
        match self {
            OpCode::Const => "CONST",
            OpCode::Null => "NULL",
            OpCode::Unit => "UNIT",
            OpCode::True => "TRUE",
            OpCode::False => "FALSE",
            OpCode::Pop => "POP",
            OpCode::Dup => "DUP",
            OpCode::DupX1 => "DUP_X1",
            OpCode::Swap => "SWAP",
            OpCode::LoadLocal => "LOAD_LOCAL",
            OpCode::StoreLocal => "STORE_LOCAL",
            OpCode::GetField => "GET_FIELD",
            OpCode::SetField => "SET_FIELD",
            OpCode::Add => "ADD",
            OpCode::Sub => "SUB",
            OpCode::Mul => "MUL",
            OpCode::Div => "DIV",
            OpCode::Rem => "REM",
            OpCode::Neg => "NEG",
            OpCode::Cmp => "CMP",
            OpCode::Not => "NOT",
            OpCode::Sign => "SIGN",
            OpCode::Same => "SAME",
            OpCode::Convert => "CONVERT",
            OpCode::Box => "BOX",
            OpCode::Unbox => "UNBOX",
            OpCode::InstanceOf => "INSTANCE_OF",
            OpCode::CheckCast => "CHECK_CAST",
            OpCode::Jump => "JUMP",
            OpCode::JumpIfFalse => "JUMP_IF_FALSE",
            OpCode::JumpIfTrue => "JUMP_IF_TRUE",
            OpCode::JumpIfNull => "JUMP_IF_NULL",
            OpCode::JumpIfNotNull => "JUMP_IF_NOT_NULL",
            OpCode::JumpIfEq => "JUMP_IF_EQ",
            OpCode::JumpIfNe => "JUMP_IF_NE",
            OpCode::InvokeStatic => "INVOKE_STATIC",
            OpCode::InvokeVirtual => "INVOKE_VIRTUAL",
            OpCode::InvokeSpecial => "INVOKE_SPECIAL",
            OpCode::Return => "RETURN",
            OpCode::New => "NEW",
            OpCode::Throw => "THROW",
            OpCode::MakeClosure => "MAKE_CLOSURE",
        }
    }
}

impl std::fmt::Display for OpCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl TryFrom<u8> for OpCode {
    type Error = u8;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            0 => Ok(OpCode::Const),
            1 => Ok(OpCode::Null),
            2 => Ok(OpCode::Unit),
            3 => Ok(OpCode::True),
            4 => Ok(OpCode::False),
            5 => Ok(OpCode::Pop),
            6 => Ok(OpCode::Dup),
            7 => Ok(OpCode::DupX1),
            8 => Ok(OpCode::Swap),
            9 => Ok(OpCode::LoadLocal),
            10 => Ok(OpCode::StoreLocal),
            11 => Ok(OpCode::GetField),
            12 => Ok(OpCode::SetField),
            13 => Ok(OpCode::Add),
            14 => Ok(OpCode::Sub),
            15 => Ok(OpCode::Mul),
            16 => Ok(OpCode::Div),
            17 => Ok(OpCode::Rem),
            18 => Ok(OpCode::Neg),
            19 => Ok(OpCode::Cmp),
            20 => Ok(OpCode::Not),
            21 => Ok(OpCode::Sign),
            22 => Ok(OpCode::Same),
            23 => Ok(OpCode::Convert),
            24 => Ok(OpCode::Box),
            25 => Ok(OpCode::Unbox),
            26 => Ok(OpCode::InstanceOf),
            27 => Ok(OpCode::CheckCast),
            28 => Ok(OpCode::Jump),
            29 => Ok(OpCode::JumpIfFalse),
            30 => Ok(OpCode::JumpIfTrue),
            31 => Ok(OpCode::JumpIfNull),
            32 => Ok(OpCode::JumpIfNotNull),
            33 => Ok(OpCode::JumpIfEq),
            34 => Ok(OpCode::JumpIfNe),
            35 => Ok(OpCode::InvokeStatic),
            36 => Ok(OpCode::InvokeVirtual),
            37 => Ok(OpCode::InvokeSpecial),
            38 => Ok(OpCode::Return),
            39 => Ok(OpCode::New),
            40 => Ok(OpCode::Throw),
            41 => Ok(OpCode::MakeClosure),
            _ => Err(value),
        }
    }
}
