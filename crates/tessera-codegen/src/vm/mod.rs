//! Reference interpreter for lowered bytecode
//!
//! Runs the [`Function`]s produced by the lowering engine so that lowered
//! programs can be checked by behaviour rather than by instruction listings.
//! Methods are looked up by `Owner.name` in the table filled through
//! [`VM::define`], then among the built-ins, walking the class chain
//! registered with [`VM::define_class`] and ending at `Any`. Synthesized
//! accessors without a compiled body read and write object fields (or
//! globals for static properties).

mod error;
mod natives;
mod value;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::MethodRef;
use crate::bytecode::{Constant, Function, OpCode};
use crate::types::{PrimitiveKind, Type};

pub use error::{RuntimeError, RuntimeErrorKind, RuntimeResult, StackFrame};
pub use natives::{NativeResult, TUPLE_ITERATOR_CLASS};
pub use value::{ArithOp, Closure, Object, Value};

/// Instructions executed before a run is aborted
pub const DEFAULT_STEP_LIMIT: u64 = 10_000_000;

/// Maximum call depth
const FRAMES_MAX: usize = 256;

/// A call frame on the call stack
struct CallFrame {
    function: Rc<Function>,
    /// Instruction pointer (index into function's chunk)
    ip: usize,
    locals: Vec<Value>,
    /// Operand stack height when the frame was entered
    stack_base: usize,
}

/// The virtual machine
pub struct VM {
    /// Operand stack
    stack: Vec<Value>,

    /// Call frames
    frames: Vec<CallFrame>,

    /// Compiled methods by `Owner.name`
    methods: HashMap<String, Rc<Function>>,

    /// Superclass of each registered class
    parents: HashMap<Rc<str>, Rc<str>>,

    /// Backing store of static properties, by `Owner.name`
    globals: HashMap<String, Value>,

    step_limit: u64,
    steps: u64,
}

impl VM {
    #[must_use]
    pub fn new() -> Self {
        Self {
            stack: Vec::with_capacity(256),
            frames: Vec::with_capacity(FRAMES_MAX),
            methods: HashMap::new(),
            parents: HashMap::new(),
            globals: HashMap::new(),
            step_limit: DEFAULT_STEP_LIMIT,
            steps: 0,
        }
    }

    #[must_use]
    pub fn with_step_limit(mut self, limit: u64) -> Self {
        self.step_limit = limit;
        self
    }

    /// Register `function` as the method `owner.<function name>`
    pub fn define(&mut self, owner: &str, function: Rc<Function>) {
        let key = format!("{owner}.{}", function.name);
        tracing::debug!(method = %key, "defined method");
        self.methods.insert(key, function);
    }

    /// Register a class and its superclass
    pub fn define_class(&mut self, name: &str, parent: Option<&str>) {
        if let Some(parent) = parent {
            self.parents.insert(Rc::from(name), Rc::from(parent));
        }
    }

    pub fn set_global(&mut self, key: &str, value: Value) {
        self.globals.insert(key.to_string(), value);
    }

    #[must_use]
    pub fn global(&self, key: &str) -> Option<&Value> {
        self.globals.get(key)
    }

    /// Instructions executed by the last run
    #[must_use]
    pub fn steps(&self) -> u64 {
        self.steps
    }

    /// Run a parameterless function to completion
    pub fn run(&mut self, function: Rc<Function>) -> RuntimeResult<Value> {
        self.call(function, Vec::new())
    }

    /// Run `function` with `args` in its first slots
    pub fn call(&mut self, function: Rc<Function>, args: Vec<Value>) -> RuntimeResult<Value> {
        self.stack.clear();
        self.frames.clear();
        self.steps = 0;
        self.push_frame(function, args)
            .map_err(|kind| self.runtime_error(kind))?;
        self.execute()
    }

    /// Invoke a closure value with `args`
    pub fn call_closure(&mut self, closure: &Value, args: Vec<Value>) -> RuntimeResult<Value> {
        let Value::Closure(inner) = closure else {
            return Err(RuntimeError::new(RuntimeErrorKind::TypeError {
                expected: "Function",
                got: closure.class_name().to_string(),
                operation: "call",
            }));
        };
        let mut locals = Vec::with_capacity(args.len() + 1);
        locals.push(closure.clone());
        locals.extend(args);
        self.call(Rc::clone(&inner.function), locals)
    }

    // ===== Stack helpers =====

    fn push(&mut self, value: Value) {
        self.stack.push(value);
    }

    fn pop(&mut self) -> Result<Value, RuntimeErrorKind> {
        self.stack.pop().ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn peek(&self, distance: usize) -> Result<&Value, RuntimeErrorKind> {
        self.stack
            .len()
            .checked_sub(1 + distance)
            .and_then(|index| self.stack.get(index))
            .ok_or(RuntimeErrorKind::StackUnderflow)
    }

    fn frame(&self) -> Result<&CallFrame, RuntimeErrorKind> {
        self.frames
            .last()
            .ok_or_else(|| RuntimeErrorKind::Internal("no active frame".to_string()))
    }

    fn frame_mut(&mut self) -> Result<&mut CallFrame, RuntimeErrorKind> {
        self.frames
            .last_mut()
            .ok_or_else(|| RuntimeErrorKind::Internal("no active frame".to_string()))
    }

    // ===== Bytecode reading =====

    fn read_u8(&mut self) -> Result<u8, RuntimeErrorKind> {
        let frame = self.frame_mut()?;
        let byte = frame.function.chunk.read_byte(frame.ip).ok_or_else(|| {
            RuntimeErrorKind::Internal(format!("ran past the end of {}", frame.function.name))
        })?;
        frame.ip += 1;
        Ok(byte)
    }

    fn read_u16(&mut self) -> Result<u16, RuntimeErrorKind> {
        let low = u16::from(self.read_u8()?);
        let high = u16::from(self.read_u8()?);
        Ok(low | (high << 8))
    }

    fn read_i16(&mut self) -> Result<i16, RuntimeErrorKind> {
        self.read_u16().map(|u| u as i16)
    }

    fn read_kind(&mut self) -> Result<PrimitiveKind, RuntimeErrorKind> {
        let byte = self.read_u8()?;
        PrimitiveKind::try_from(byte)
            .map_err(|b| RuntimeErrorKind::Internal(format!("invalid primitive kind {b}")))
    }

    fn read_constant(&mut self) -> Result<Constant, RuntimeErrorKind> {
        let index = self.read_u16()?;
        self.frame()?
            .function
            .chunk
            .get_constant(index)
            .cloned()
            .ok_or_else(|| RuntimeErrorKind::Internal(format!("invalid constant index {index}")))
    }

    fn read_name(&mut self) -> Result<Rc<str>, RuntimeErrorKind> {
        match self.read_constant()? {
            Constant::Name(name) => Ok(name),
            other => Err(RuntimeErrorKind::Internal(format!("expected a name, found {other}"))),
        }
    }

    fn read_type(&mut self) -> Result<Type, RuntimeErrorKind> {
        match self.read_constant()? {
            Constant::Type(ty) => Ok(ty),
            other => Err(RuntimeErrorKind::Internal(format!("expected a type, found {other}"))),
        }
    }

    /// Move the instruction pointer by a signed offset
    fn jump(&mut self, offset: i16) -> Result<(), RuntimeErrorKind> {
        let frame = self.frame_mut()?;
        let target = frame.ip as isize + isize::from(offset);
        frame.ip = usize::try_from(target)
            .map_err(|_| RuntimeErrorKind::Internal(format!("jump to {target}")))?;
        Ok(())
    }

    // ===== Execution =====

    fn execute(&mut self) -> RuntimeResult<Value> {
        loop {
            match self.step() {
                Ok(Some(result)) => return Ok(result),
                Ok(None) => {}
                Err(kind) => return Err(self.runtime_error(kind)),
            }
        }
    }

    /// Execute one instruction; yields the result once the outermost frame returns
    fn step(&mut self) -> Result<Option<Value>, RuntimeErrorKind> {
        self.steps += 1;
        if self.steps > self.step_limit {
            return Err(RuntimeErrorKind::StepLimit(self.step_limit));
        }

        let byte = self.read_u8()?;
        let op = OpCode::try_from(byte).map_err(RuntimeErrorKind::InvalidOpcode)?;
        if tracing::enabled!(tracing::Level::TRACE) {
            let frame = self.frame()?;
            tracing::trace!(
                function = %frame.function.name,
                ip = frame.ip - 1,
                op = op.name(),
                depth = self.stack.len() - frame.stack_base,
                "execute"
            );
        }

        match op {
            // ===== Stack Operations =====
            OpCode::Const => {
                let constant = self.read_constant()?;
                let value = Value::from_constant(&constant).ok_or_else(|| {
                    RuntimeErrorKind::Internal(format!("{constant} cannot be pushed"))
                })?;
                self.push(value);
            }
            OpCode::Null => self.push(Value::Null),
            OpCode::Unit => self.push(Value::Unit),
            OpCode::True => self.push(Value::Bool(true)),
            OpCode::False => self.push(Value::Bool(false)),
            OpCode::Pop => {
                self.pop()?;
            }
            OpCode::Dup => {
                let value = self.peek(0)?.clone();
                self.push(value);
            }
            OpCode::DupX1 => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b.clone());
                self.push(a);
                self.push(b);
            }
            OpCode::Swap => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(b);
                self.push(a);
            }

            // ===== Local Variables =====
            OpCode::LoadLocal => {
                let slot = usize::from(self.read_u16()?);
                let value = self.frame()?.locals.get(slot).cloned().ok_or_else(|| {
                    RuntimeErrorKind::Internal(format!("local slot {slot} out of range"))
                })?;
                self.push(value);
            }
            OpCode::StoreLocal => {
                let slot = usize::from(self.read_u16()?);
                let value = self.pop()?;
                let locals = &mut self.frame_mut()?.locals;
                if slot >= locals.len() {
                    locals.resize(slot + 1, Value::Null);
                }
                locals[slot] = value;
            }

            // ===== Fields =====
            OpCode::GetField => {
                let name = self.read_name()?;
                let target = self.pop()?;
                let value = get_field(&target, &name)?;
                self.push(value);
            }
            OpCode::SetField => {
                let name = self.read_name()?;
                let value = self.pop()?;
                let target = self.pop()?;
                set_field(&target, name, value)?;
            }

            // ===== Arithmetic =====
            OpCode::Add | OpCode::Sub | OpCode::Mul | OpCode::Div | OpCode::Rem => {
                let kind = self.read_kind()?;
                let b = self.pop()?;
                let a = self.pop()?;
                let arith = match op {
                    OpCode::Add => ArithOp::Add,
                    OpCode::Sub => ArithOp::Sub,
                    OpCode::Mul => ArithOp::Mul,
                    OpCode::Div => ArithOp::Div,
                    _ => ArithOp::Rem,
                };
                self.push(Value::arithmetic(arith, kind, &a, &b)?);
            }
            OpCode::Neg => {
                let kind = self.read_kind()?;
                let value = self.pop()?;
                self.push(value.negate(kind)?);
            }
            OpCode::Cmp => {
                let _kind = self.read_kind()?;
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Int(Value::compare(&a, &b)?));
            }

            // ===== Logic and Comparison =====
            OpCode::Not => {
                let value = self.pop()?.as_bool("not")?;
                self.push(Value::Bool(!value));
            }
            OpCode::Sign => {
                let value = self.pop()?.as_int("sign")?;
                self.push(Value::Int(value.signum()));
            }
            OpCode::Same => {
                let b = self.pop()?;
                let a = self.pop()?;
                self.push(Value::Bool(a.same(&b)));
            }

            // ===== Conversions =====
            OpCode::Convert => {
                let _from = self.read_kind()?;
                let to = self.read_kind()?;
                let value = self.pop()?;
                self.push(value.convert(to)?);
            }
            OpCode::Box => {
                let kind = self.read_kind()?;
                let value = self.peek(0)?;
                if value.primitive_kind() != Some(kind) {
                    return Err(RuntimeErrorKind::TypeError {
                        expected: kind.name(),
                        got: value.class_name().to_string(),
                        operation: "box",
                    });
                }
            }
            OpCode::Unbox => {
                let kind = self.read_kind()?;
                let value = self.peek(0)?;
                if value.is_null() {
                    return Err(RuntimeErrorKind::NullReference);
                }
                if value.primitive_kind() != Some(kind) {
                    return Err(RuntimeErrorKind::ClassCast {
                        value: value.class_name().to_string(),
                        target: kind.name().to_string(),
                    });
                }
            }

            // ===== Types =====
            OpCode::InstanceOf => {
                let ty = self.read_type()?;
                let value = self.pop()?;
                let result = self.is_instance(&value, &ty);
                self.push(Value::Bool(result));
            }
            OpCode::CheckCast => {
                let ty = self.read_type()?;
                let value = self.peek(0)?;
                if !value.is_null() && !self.is_instance(value, &ty) {
                    return Err(RuntimeErrorKind::ClassCast {
                        value: value.class_name().to_string(),
                        target: ty.to_string(),
                    });
                }
            }

            // ===== Control Flow =====
            OpCode::Jump => {
                let offset = self.read_i16()?;
                self.jump(offset)?;
            }
            OpCode::JumpIfFalse | OpCode::JumpIfTrue => {
                let offset = self.read_i16()?;
                let condition = self.pop()?.as_bool("conditional jump")?;
                if condition == (op == OpCode::JumpIfTrue) {
                    self.jump(offset)?;
                }
            }
            OpCode::JumpIfNull | OpCode::JumpIfNotNull => {
                let offset = self.read_i16()?;
                let is_null = self.pop()?.is_null();
                if is_null == (op == OpCode::JumpIfNull) {
                    self.jump(offset)?;
                }
            }
            OpCode::JumpIfEq | OpCode::JumpIfNe => {
                let offset = self.read_i16()?;
                let b = self.pop()?.as_int("compare and jump")?;
                let a = self.pop()?.as_int("compare and jump")?;
                if (a == b) == (op == OpCode::JumpIfEq) {
                    self.jump(offset)?;
                }
            }

            // ===== Calls =====
            OpCode::InvokeStatic | OpCode::InvokeVirtual | OpCode::InvokeSpecial => {
                let method = match self.read_constant()? {
                    Constant::Method(method) => method,
                    other => {
                        return Err(RuntimeErrorKind::Internal(format!(
                            "expected a method, found {other}"
                        )))
                    }
                };
                let argc = usize::from(self.read_u8()?);
                let receiver = usize::from(op != OpCode::InvokeStatic);
                let count = argc + receiver;
                let start = self
                    .stack
                    .len()
                    .checked_sub(count)
                    .ok_or(RuntimeErrorKind::StackUnderflow)?;
                let args = self.stack.split_off(start);
                match op {
                    OpCode::InvokeStatic => self.invoke_static(&method, args)?,
                    OpCode::InvokeVirtual => self.invoke_virtual(&method, args)?,
                    _ => self.invoke_special(&method, args)?,
                }
            }
            OpCode::Return => {
                let result = self.pop()?;
                let frame = self
                    .frames
                    .pop()
                    .ok_or_else(|| RuntimeErrorKind::Internal("return without frame".to_string()))?;
                self.stack.truncate(frame.stack_base);
                if self.frames.is_empty() {
                    return Ok(Some(result));
                }
                self.push(result);
            }

            // ===== Objects =====
            OpCode::New => {
                let class = self.read_name()?;
                self.push(Value::Object(Rc::new(Object::new(class))));
            }
            OpCode::Throw => {
                let exception = self.pop()?;
                return Err(thrown(&exception));
            }
            OpCode::MakeClosure => {
                let function = match self.read_constant()? {
                    Constant::Function(function) => function,
                    other => {
                        return Err(RuntimeErrorKind::Internal(format!(
                            "expected a function, found {other}"
                        )))
                    }
                };
                let count = usize::from(self.read_u8()?);
                let start = self
                    .stack
                    .len()
                    .checked_sub(count)
                    .ok_or(RuntimeErrorKind::StackUnderflow)?;
                let values = self.stack.split_off(start);
                let fields = function.captures.iter().cloned().zip(values).collect();
                self.push(Value::Closure(Rc::new(Closure {
                    function,
                    fields: std::cell::RefCell::new(fields),
                })));
            }
        }
        Ok(None)
    }

    // ===== Calls =====

    fn push_frame(&mut self, function: Rc<Function>, mut locals: Vec<Value>) -> Result<(), RuntimeErrorKind> {
        if self.frames.len() >= FRAMES_MAX {
            return Err(RuntimeErrorKind::StackOverflow);
        }
        let size = usize::from(function.locals).max(locals.len());
        locals.resize(size, Value::Null);
        self.frames.push(CallFrame {
            function,
            ip: 0,
            locals,
            stack_base: self.stack.len(),
        });
        Ok(())
    }

    /// Run `class.name` if it is compiled or built in; hands the arguments
    /// back when there is no such method
    fn try_call(
        &mut self,
        class: &str,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Option<Vec<Value>>, RuntimeErrorKind> {
        let key = format!("{class}.{name}");
        if let Some(function) = self.methods.get(&key).cloned() {
            self.push_frame(function, args)?;
            return Ok(None);
        }
        match natives::call(class, name, &args) {
            Some(Ok(value)) => {
                self.push(value);
                Ok(None)
            }
            Some(Err(message)) => Err(RuntimeErrorKind::Native(format!("{key}: {message}"))),
            None => Ok(Some(args)),
        }
    }

    fn invoke_static(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<(), RuntimeErrorKind> {
        match self.try_call(method.owner.class_name(), &method.name, args)? {
            None => Ok(()),
            Some(args) => self.accessor_fallback(method, None, &args),
        }
    }

    fn invoke_virtual(&mut self, method: &MethodRef, mut args: Vec<Value>) -> Result<(), RuntimeErrorKind> {
        let receiver = args.first().cloned().ok_or(RuntimeErrorKind::StackUnderflow)?;
        if receiver.is_null() {
            return Err(RuntimeErrorKind::NullReference);
        }
        if let (Value::Closure(closure), "invoke") = (&receiver, &*method.name) {
            return self.push_frame(Rc::clone(&closure.function), args);
        }

        let mut class: Rc<str> = Rc::from(receiver.class_name());
        loop {
            match self.try_call(&class, &method.name, args)? {
                None => return Ok(()),
                Some(back) => args = back,
            }
            match self.parents.get(&class) {
                Some(parent) => class = Rc::clone(parent),
                None => break,
            }
        }
        match self.try_call("Any", &method.name, args)? {
            None => Ok(()),
            Some(args) => self.accessor_fallback(method, Some(&receiver), &args),
        }
    }

    fn invoke_special(&mut self, method: &MethodRef, args: Vec<Value>) -> Result<(), RuntimeErrorKind> {
        let Some(args) = self.try_call(method.owner.class_name(), &method.name, args)? else {
            return Ok(());
        };
        if &*method.name == "<init>" {
            // Default constructor: a lone String argument is the message
            if let [Value::Object(object), Value::Str(message)] = args.as_slice() {
                object.set_field(Rc::from("message"), Value::Str(Rc::clone(message)));
            }
            self.push(Value::Unit);
            return Ok(());
        }
        let receiver = args.first().cloned();
        self.accessor_fallback(method, receiver.as_ref(), &args)
    }

    /// Synthesized accessors with no compiled body act on fields, or on
    /// globals when there is no receiver
    fn accessor_fallback(
        &mut self,
        method: &MethodRef,
        receiver: Option<&Value>,
        args: &[Value],
    ) -> Result<(), RuntimeErrorKind> {
        let owner = method.owner.class_name();
        if let Some(field) = method.name.strip_suffix("$get") {
            let value = match receiver {
                Some(receiver) => get_field(receiver, field)?,
                None => self
                    .globals
                    .get(&format!("{owner}.{field}"))
                    .cloned()
                    .ok_or_else(|| RuntimeErrorKind::UndefinedField {
                        class: owner.to_string(),
                        field: field.to_string(),
                    })?,
            };
            self.push(value);
            return Ok(());
        }
        if let Some(field) = method.name.strip_suffix("$set") {
            let value = args.last().cloned().ok_or(RuntimeErrorKind::StackUnderflow)?;
            match receiver {
                Some(receiver) => set_field(receiver, Rc::from(field), value)?,
                None => {
                    self.globals.insert(format!("{owner}.{field}"), value);
                }
            }
            self.push(Value::Unit);
            return Ok(());
        }
        Err(RuntimeErrorKind::NoSuchMethod(method.to_string()))
    }

    // ===== Types =====

    fn is_subclass(&self, class: &str, target: &str) -> bool {
        let mut current = Some(class);
        while let Some(class) = current {
            if class == target {
                return true;
            }
            current = self.parents.get(class).map(|parent| &**parent);
        }
        false
    }

    fn is_instance(&self, value: &Value, ty: &Type) -> bool {
        match (value, ty) {
            (Value::Null, ty) => ty.is_nullable(),
            (_, Type::Nullable(inner)) => self.is_instance(value, inner),
            (_, Type::Nothing) => false,
            (_, Type::Any) => true,
            (Value::Unit, Type::Unit) => true,
            (_, Type::Primitive(kind)) => value.primitive_kind() == Some(*kind),
            (Value::Str(_), Type::String) => true,
            (Value::Closure(closure), Type::Function(arity)) => closure.function.arity == *arity,
            (Value::Tuple(items), Type::Tuple(arity)) => items.borrow().len() == usize::from(*arity),
            (_, Type::Class(name)) => self.is_subclass(value.class_name(), name),
            _ => false,
        }
    }

    // ===== Errors =====

    fn runtime_error(&self, kind: RuntimeErrorKind) -> RuntimeError {
        let trace = self
            .frames
            .iter()
            .rev()
            .map(|frame| StackFrame {
                function_name: frame.function.name.clone(),
                line: frame.function.chunk.get_line(frame.ip.saturating_sub(1)),
            })
            .collect();
        RuntimeError::new(kind).with_trace(trace)
    }
}

impl Default for VM {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for VM {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("VM")
            .field("stack_len", &self.stack.len())
            .field("frames", &self.frames.len())
            .field("methods", &self.methods.len())
            .finish_non_exhaustive()
    }
}

fn get_field(target: &Value, name: &str) -> Result<Value, RuntimeErrorKind> {
    let value = match target {
        Value::Null => return Err(RuntimeErrorKind::NullReference),
        Value::Object(object) => object.field(name),
        Value::Closure(closure) => closure.fields.borrow().get(name).cloned(),
        _ => None,
    };
    value.ok_or_else(|| RuntimeErrorKind::UndefinedField {
        class: target.class_name().to_string(),
        field: name.to_string(),
    })
}

fn set_field(target: &Value, name: Rc<str>, value: Value) -> Result<(), RuntimeErrorKind> {
    match target {
        Value::Null => Err(RuntimeErrorKind::NullReference),
        Value::Object(object) => {
            object.set_field(name, value);
            Ok(())
        }
        Value::Closure(closure) => {
            closure.fields.borrow_mut().insert(name, value);
            Ok(())
        }
        other => Err(RuntimeErrorKind::UndefinedField {
            class: other.class_name().to_string(),
            field: name.to_string(),
        }),
    }
}

/// The error raised by a `Throw` of `exception`
fn thrown(exception: &Value) -> RuntimeErrorKind {
    match exception {
        Value::Null => RuntimeErrorKind::NullReference,
        Value::Object(object) => RuntimeErrorKind::Thrown {
            class: object.class.to_string(),
            message: object.field("message").map(|m| m.to_string()).unwrap_or_default(),
        },
        other => RuntimeErrorKind::Thrown {
            class: other.class_name().to_string(),
            message: other.to_string(),
        },
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::bytecode::Chunk;

    fn function(name: &str, build: impl FnOnce(&mut Chunk)) -> Rc<Function> {
        let mut chunk = Chunk::new();
        build(&mut chunk);
        Rc::new(Function {
            name: name.to_string(),
            arity: 0,
            chunk,
            locals: 2,
            max_stack: 4,
            captures: Vec::new(),
        })
    }

    #[test]
    fn arithmetic_and_return() {
        let f = function("add", |c| {
            let a = c.add_constant(Constant::Int(40)).unwrap();
            let b = c.add_constant(Constant::Int(2)).unwrap();
            c.write_op_u16(OpCode::Const, a, 1);
            c.write_op_u16(OpCode::Const, b, 1);
            c.write_op_u8(OpCode::Add, PrimitiveKind::Int as u8, 1);
            c.write_op(OpCode::Return, 1);
        });
        assert_eq!(VM::new().run(f).unwrap(), Value::Int(42));
    }

    #[test]
    fn locals_and_backward_jump() {
        // slot0 = 0; do { slot0 += 1 } while (slot0 != 5)
        let f = function("count", |c| {
            let zero = c.add_constant(Constant::Int(0)).unwrap();
            let one = c.add_constant(Constant::Int(1)).unwrap();
            let five = c.add_constant(Constant::Int(5)).unwrap();
            c.write_op_u16(OpCode::Const, zero, 1);
            c.write_op_u16(OpCode::StoreLocal, 0, 1);
            let start = c.current_offset();
            c.write_op_u16(OpCode::LoadLocal, 0, 2);
            c.write_op_u16(OpCode::Const, one, 2);
            c.write_op_u8(OpCode::Add, PrimitiveKind::Int as u8, 2);
            c.write_op_u16(OpCode::StoreLocal, 0, 2);
            c.write_op_u16(OpCode::LoadLocal, 0, 3);
            c.write_op_u16(OpCode::Const, five, 3);
            c.emit_jump_to(OpCode::JumpIfNe, start, 3).unwrap();
            c.write_op_u16(OpCode::LoadLocal, 0, 4);
            c.write_op(OpCode::Return, 4);
        });
        assert_eq!(VM::new().run(f).unwrap(), Value::Int(5));
    }

    #[test]
    fn step_limit_stops_infinite_loops() {
        let f = function("spin", |c| {
            let start = c.current_offset();
            c.emit_jump_to(OpCode::Jump, start, 1).unwrap();
        });
        let err = VM::new().with_step_limit(100).run(f).unwrap_err();
        assert_eq!(err.kind, RuntimeErrorKind::StepLimit(100));
        assert_eq!(err.stack_trace[0].function_name, "spin");
    }

    #[test]
    fn instance_tests_follow_class_chain() {
        let mut vm = VM::new();
        vm.define_class("Circle", Some("Shape"));
        let circle = Value::Object(Rc::new(Object::new(Rc::from("Circle"))));
        assert!(vm.is_instance(&circle, &Type::class("Shape")));
        assert!(vm.is_instance(&circle, &Type::Any));
        assert!(!vm.is_instance(&circle, &Type::class("Square")));
        assert!(vm.is_instance(&Value::Null, &Type::class("Shape").nullable()));
        assert!(!vm.is_instance(&Value::Null, &Type::Any));
        assert!(vm.is_instance(&Value::Int(1), &Type::int().nullable()));
        assert!(!vm.is_instance(&Value::Int(1), &Type::long()));
    }

    #[test]
    fn synthesized_accessors_use_fields() {
        let mut vm = VM::new();
        let point = Value::Object(Rc::new(Object::new(Rc::from("Point"))));
        let owner = Type::class("Point");
        let setter = MethodRef::new(owner.clone(), "x$set", vec![Type::int()], Type::Unit);
        let getter = MethodRef::new(owner, "x$get", Vec::new(), Type::int());

        vm.invoke_virtual(&setter, vec![point.clone(), Value::Int(3)]).unwrap();
        assert_eq!(vm.pop().unwrap(), Value::Unit);
        vm.invoke_virtual(&getter, vec![point]).unwrap();
        assert_eq!(vm.pop().unwrap(), Value::Int(3));

        let missing = MethodRef::new(Type::class("Point"), "norm", Vec::new(), Type::double());
        let err = vm
            .invoke_virtual(&missing, vec![Value::Object(Rc::new(Object::new(Rc::from("Point"))))])
            .unwrap_err();
        assert_eq!(err, RuntimeErrorKind::NoSuchMethod("Point.norm(): Double".to_string()));
    }

    #[test]
    fn thrown_exception_carries_message() {
        let exception = Object::new(Rc::from("ClassCastException"));
        exception.set_field(Rc::from("message"), Value::string("bad cast"));
        assert_eq!(
            thrown(&Value::Object(Rc::new(exception))),
            RuntimeErrorKind::Thrown {
                class: "ClassCastException".to_string(),
                message: "bad cast".to_string(),
            }
        );
        assert_eq!(thrown(&Value::Null), RuntimeErrorKind::NullReference);
    }
}
