//! Runtime errors of the reference interpreter

use std::fmt;

use thiserror::Error;

/// A runtime error together with the call stack at the point of failure
#[derive(Debug, Clone, PartialEq)]
pub struct RuntimeError {
    /// The kind of error
    pub kind: RuntimeErrorKind,

    /// Innermost frame first
    pub stack_trace: Vec<StackFrame>,
}

impl RuntimeError {
    #[must_use]
    pub fn new(kind: RuntimeErrorKind) -> Self {
        Self {
            kind,
            stack_trace: Vec::new(),
        }
    }

    #[must_use]
    pub fn with_trace(mut self, trace: Vec<StackFrame>) -> Self {
        self.stack_trace = trace;
        self
    }
}

impl fmt::Display for RuntimeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "RuntimeError: {}", self.kind)?;
        if !self.stack_trace.is_empty() {
            writeln!(f, "Stack trace:")?;
            for frame in &self.stack_trace {
                writeln!(f, "  at {} (line {})", frame.function_name, frame.line)?;
            }
        }
        Ok(())
    }
}

impl std::error::Error for RuntimeError {}

/// A frame in a stack trace
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StackFrame {
    pub function_name: String,
    pub line: u32,
}

/// The kind of runtime error
#[derive(Error, Debug, Clone, PartialEq)]
pub enum RuntimeErrorKind {
    #[error("type error: {operation} expected {expected}, got {got}")]
    TypeError {
        expected: &'static str,
        got: String,
        operation: &'static str,
    },

    #[error("division by zero")]
    DivisionByZero,

    #[error("null reference")]
    NullReference,

    #[error("undefined field '{field}' on {class}")]
    UndefinedField { class: String, field: String },

    #[error("no method {0}")]
    NoSuchMethod(String),

    #[error("{value} is not an instance of {target}")]
    ClassCast { value: String, target: String },

    #[error("uncaught {class}: {message}")]
    Thrown { class: String, message: String },

    #[error("{0}")]
    Native(String),

    #[error("stack underflow")]
    StackUnderflow,

    #[error("stack overflow")]
    StackOverflow,

    #[error("invalid opcode: {0}")]
    InvalidOpcode(u8),

    #[error("step limit of {0} instructions exceeded")]
    StepLimit(u64),

    #[error("internal error: {0}")]
    Internal(String),
}

/// Result type for VM operations
pub type RuntimeResult<T> = Result<T, RuntimeError>;
