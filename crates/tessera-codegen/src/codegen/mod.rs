//! Expression-to-bytecode lowering
//!
//! Walks a typed, resolved tree and emits stack-machine bytecode. Every node
//! lowers to a [`StackValue`]; the consumer of the node decides whether the
//! value is read, written or both. Each function and each closure body gets
//! its own [`FunctionCodegen`] with a fresh chunk, frame map and loop stack.

mod binary;
mod call;
mod closure;
mod coercion;
mod condition;
mod emitter;
mod intrinsics;
mod loops;
mod stack_value;

use std::collections::HashMap;
use std::rc::Rc;

use crate::ast::{
    Block, CallKind, Expr, ExprKind, FunctionDecl, FunctionKind, MethodRef, Stmt, StmtKind, VarId,
    VariableDescriptor,
};
use crate::bytecode::{Chunk, CodegenErrorKind, CodegenResult, Function, OpCode};
use crate::config::CodegenOptions;
use crate::types::Type;

pub use binary::{are_equal, INTRINSICS_CLASS};
pub use coercion::{Coercion, StandardCoercion};
pub use emitter::Emitter;
pub use intrinsics::{lookup as lookup_intrinsic, Intrinsic};
pub use stack_value::{
    one, ref_type, tuple_getter, tuple_setter, StackValue, OUTER_THIS_FIELD, REF_CLASS,
    REF_ELEMENT, TUPLE_CLASS,
};

use loops::LoopFrame;

/// Normalised result of a three-way comparison, as produced by `Sign`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(i32)]
pub enum TriState {
    Greater = 1,
    Equal = 0,
    Lower = -1,
}

impl TriState {
    #[must_use]
    pub const fn value(self) -> i32 {
        self as i32
    }
}

/// Entry point of the lowering engine
pub struct Codegen {
    options: Rc<CodegenOptions>,
    coercion: Rc<dyn Coercion>,
}

impl Codegen {
    #[must_use]
    pub fn new(options: CodegenOptions) -> Self {
        Self {
            options: Rc::new(options),
            coercion: Rc::new(StandardCoercion),
        }
    }

    /// Replace the coercion strategy
    #[must_use]
    pub fn with_coercion(mut self, coercion: impl Coercion + 'static) -> Self {
        self.coercion = Rc::new(coercion);
        self
    }

    #[must_use]
    pub fn options(&self) -> &CodegenOptions {
        &self.options
    }

    /// Lower a function or method declaration
    pub fn lower_function(&self, decl: &FunctionDecl) -> CodegenResult<Rc<Function>> {
        let mut cg = FunctionCodegen::new(
            decl.name.to_string(),
            Rc::clone(&self.options),
            Rc::clone(&self.coercion),
            decl.return_type.clone(),
            decl.frame_size,
        );
        cg.v.set_span(decl.span);
        if let FunctionKind::Method { owner } = &decl.kind {
            cg.reserve_slot(0)?;
            cg.v.set_implicit_this(Some(StackValue::local(0, owner.clone())));
        }
        cg.bind_parameters(&decl.params)?;
        cg.finish(&decl.body)
    }

    /// Lower a standalone expression into a parameterless function returning its value
    pub fn lower_expression(
        &self,
        name: &str,
        expr: &Expr,
        frame_size: u16,
    ) -> CodegenResult<Rc<Function>> {
        let cg = FunctionCodegen::new(
            name.to_string(),
            Rc::clone(&self.options),
            Rc::clone(&self.coercion),
            expr.ty.clone(),
            frame_size,
        );
        cg.finish(expr)
    }
}

impl Default for Codegen {
    fn default() -> Self {
        Self::new(CodegenOptions::default())
    }
}

impl std::fmt::Debug for Codegen {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Codegen")
            .field("options", &self.options)
            .finish_non_exhaustive()
    }
}

/// Lowering state of a single function or closure body
pub(crate) struct FunctionCodegen {
    /// Name of the function being lowered
    name: String,

    /// Instruction sink
    v: Emitter,

    /// Where each declared variable lives
    frame: HashMap<VarId, StackValue>,

    /// Active loops, innermost last
    loops: Vec<LoopFrame>,

    /// Next free slot for hidden temporaries
    next_slot: u32,

    /// Slots used so far
    locals: u32,

    options: Rc<CodegenOptions>,
    return_type: Type,
    arity: u8,

    /// Closure field names, in capture order
    captures: Vec<Rc<str>>,

    /// Function literals lowered so far, for naming
    closure_count: u32,
}

impl FunctionCodegen {
    fn new(
        name: String,
        options: Rc<CodegenOptions>,
        coercion: Rc<dyn Coercion>,
        return_type: Type,
        frame_size: u16,
    ) -> Self {
        let chunk = match &options.source_name {
            Some(source) => Chunk::with_source(source.clone()),
            None => Chunk::new(),
        };
        tracing::debug!(function = %name, frame_size, "lowering function");
        Self {
            name,
            v: Emitter::new(chunk, coercion),
            frame: HashMap::new(),
            loops: Vec::new(),
            next_slot: u32::from(frame_size),
            locals: u32::from(frame_size),
            options,
            return_type,
            arity: 0,
            captures: Vec::new(),
            closure_count: 0,
        }
    }

    // ===== Slots and variables =====

    /// Record that `slot` is in use, enforcing the local limit
    fn reserve_slot(&mut self, slot: u32) -> CodegenResult<u16> {
        let needed = slot + 1;
        if needed > u32::from(self.options.max_locals) {
            return Err(self.v.error(CodegenErrorKind::TooManyLocals {
                needed,
                limit: self.options.max_locals,
            }));
        }
        self.locals = self.locals.max(needed);
        self.next_slot = self.next_slot.max(needed);
        u16::try_from(slot).map_err(|_| {
            self.v.error(CodegenErrorKind::TooManyLocals {
                needed,
                limit: self.options.max_locals,
            })
        })
    }

    /// A hidden slot not visible to the source program
    fn alloc_temp(&mut self) -> CodegenResult<u16> {
        let slot = self.next_slot;
        self.reserve_slot(slot)
    }

    fn bind_parameters(&mut self, params: &[VariableDescriptor]) -> CodegenResult<()> {
        self.arity = u8::try_from(params.len())
            .map_err(|_| self.v.error(CodegenErrorKind::TooManyArguments(params.len())))?;
        for param in params {
            let slot = self.reserve_slot(u32::from(param.slot))?;
            let value = if param.wrapped {
                // Move the incoming argument into a fresh box kept in the same slot
                self.v.load_local(slot);
                self.new_box()?;
                self.v.op(OpCode::Dup);
                self.v.store_local(slot);
                self.v.op(OpCode::Swap);
                self.v.coerce(&param.ty, &Type::any_nullable())?;
                self.v.set_field(REF_ELEMENT)?;
                StackValue::WrappedVar {
                    cell: Box::new(StackValue::local(slot, ref_type())),
                    ty: param.ty.clone(),
                }
            } else {
                StackValue::local(slot, param.ty.clone())
            };
            self.frame.insert(param.id, value);
        }
        Ok(())
    }

    /// Bring a local into scope; boxed locals get their `Ref` cell here
    fn declare(&mut self, var: &VariableDescriptor) -> CodegenResult<StackValue> {
        let slot = self.reserve_slot(u32::from(var.slot))?;
        let value = if var.wrapped {
            self.new_box()?;
            self.v.store_local(slot);
            StackValue::WrappedVar {
                cell: Box::new(StackValue::local(slot, ref_type())),
                ty: var.ty.clone(),
            }
        } else {
            StackValue::local(slot, var.ty.clone())
        };
        self.frame.insert(var.id, value.clone());
        Ok(value)
    }

    fn variable(&self, id: VarId) -> CodegenResult<StackValue> {
        self.frame
            .get(&id)
            .cloned()
            .ok_or_else(|| self.v.error(CodegenErrorKind::UnknownVariable(id)))
    }

    /// Push a fresh, empty `Ref` cell
    fn new_box(&mut self) -> CodegenResult<()> {
        let ty = ref_type();
        let init = MethodRef::new(ty.clone(), "<init>", Vec::new(), Type::Unit);
        self.v.new_object(&ty)?;
        self.v.op(OpCode::Dup);
        self.v.invoke(CallKind::Special, &init)?;
        self.v.op(OpCode::Pop);
        Ok(())
    }

    // ===== Expressions =====

    /// Lower `expr` without committing to a read or a write
    pub(super) fn gen(&mut self, expr: &Expr) -> CodegenResult<StackValue> {
        let previous = self.v.set_span(expr.span);
        let result = self.gen_kind(expr);
        self.v.set_span(previous);
        result.map_err(|err| {
            if err.node.is_some() {
                err
            } else {
                err.with_node(format!("{}: {}", expr.kind.describe(), expr.ty))
            }
        })
    }

    /// Lower `expr` and push its value as `ty`
    pub(super) fn gen_to(&mut self, expr: &Expr, ty: &Type) -> CodegenResult<()> {
        let value = self.gen(expr)?;
        let previous = self.v.set_span(expr.span);
        let result = value.load(ty, &mut self.v);
        self.v.set_span(previous);
        result
    }

    /// Lower `expr` for its side effects only
    pub(super) fn gen_discard(&mut self, expr: &Expr) -> CodegenResult<()> {
        let value = match &expr.kind {
            ExprKind::IncDec {
                target,
                prefix,
                call,
            } => {
                let previous = self.v.set_span(expr.span);
                let result = self.gen_inc_dec(target, *prefix, call, false);
                self.v.set_span(previous);
                result?
            }
            _ => self.gen(expr)?,
        };
        self.discard(value)
    }

    /// Drop a lowered value, reading it first when the read may have effects
    pub(super) fn discard(&mut self, value: StackValue) -> CodegenResult<()> {
        match value {
            StackValue::None | StackValue::Local { .. } | StackValue::Constant { .. } => Ok(()),
            StackValue::OnStack(Type::Nothing) => {
                self.v.set_depth(self.v.depth().saturating_sub(1));
                Ok(())
            }
            StackValue::OnStack(_) => {
                self.v.op(OpCode::Pop);
                Ok(())
            }
            other => {
                other.load(&other.ty(), &mut self.v)?;
                self.v.op(OpCode::Pop);
                Ok(())
            }
        }
    }

    /// Value of an expression after which control never continues
    ///
    /// Claims a phantom slot so the depth agrees with the branches that do
    /// produce a value.
    pub(super) fn unreachable(&mut self) -> StackValue {
        self.v.set_depth(self.v.depth() + 1);
        StackValue::OnStack(Type::Nothing)
    }

    fn gen_kind(&mut self, expr: &Expr) -> CodegenResult<StackValue> {
        match &expr.kind {
            ExprKind::Literal(lit) => Ok(StackValue::constant(lit.clone(), expr.ty.clone())),
            ExprKind::Variable(id) => self.variable(*id),
            ExprKind::This => self.v.implicit_receiver(),
            ExprKind::Property { receiver, property } => {
                self.gen_property(receiver.as_deref(), property)
            }
            ExprKind::Index {
                receiver,
                indices,
                get,
                set,
            } => self.gen_index(expr, receiver, indices, get, set.as_ref()),
            ExprKind::TupleElement { tuple, index } => {
                let tuple = self.gen(tuple)?;
                Ok(StackValue::MultiVariable {
                    tuple: Box::new(tuple),
                    index: *index,
                    ty: expr.ty.clone(),
                })
            }
            ExprKind::Call {
                receiver,
                call,
                args,
                safe,
            } => self.gen_call(expr, receiver.as_deref(), call, args, *safe),
            ExprKind::New { constructor, args } => self.gen_new(expr, constructor, args),
            ExprKind::Unary { operand, call, .. } => self.gen_unary(expr, operand, call),
            ExprKind::Binary {
                op,
                left,
                right,
                call,
            } => self.gen_binary(expr, *op, left, right, call.as_ref()),
            ExprKind::Assign { target, value } => self.gen_assign(target, value),
            ExprKind::AugAssign {
                target,
                value,
                call,
            } => self.gen_aug_assign(target, value, call),
            ExprKind::IncDec {
                target,
                prefix,
                call,
            } => self.gen_inc_dec(target, *prefix, call, true),
            ExprKind::Is {
                operand,
                ty,
                negated,
            } => self.gen_is(operand, ty, *negated),
            ExprKind::Cast { operand, ty, safe } => self.gen_cast(expr, operand, ty, *safe),
            ExprKind::If {
                cond,
                then_branch,
                else_branch,
            } => self.gen_if(expr, cond, then_branch.as_deref(), else_branch.as_deref()),
            ExprKind::When { subject, entries } => {
                self.gen_when(expr, subject.as_deref(), entries)
            }
            ExprKind::Block(block) => self.gen_block(block),
            ExprKind::While { label, cond, body } => self.gen_while(label.as_ref(), cond, body),
            ExprKind::DoWhile { label, body, cond } => {
                self.gen_do_while(label.as_ref(), body, cond)
            }
            ExprKind::ForIn(for_in) => self.gen_for_in(for_in),
            ExprKind::ForRange(range) => self.gen_for_range(range),
            ExprKind::Break(label) => self.gen_break(label.as_ref()),
            ExprKind::Continue(label) => self.gen_continue(label.as_ref()),
            ExprKind::Return(value) => {
                let ret = self.return_type.clone();
                match value {
                    Some(value) => self.gen_to(value, &ret)?,
                    None => StackValue::None.put(&ret, &mut self.v)?,
                }
                self.v.op(OpCode::Return);
                Ok(self.unreachable())
            }
            ExprKind::Throw(exception) => {
                self.gen_to(exception, &Type::Any)?;
                self.v.op(OpCode::Throw);
                Ok(self.unreachable())
            }
            ExprKind::Closure(literal) => self.gen_closure(literal),
        }
    }

    // ===== Blocks and statements =====

    pub(super) fn gen_block(&mut self, block: &Block) -> CodegenResult<StackValue> {
        for stmt in &block.stmts {
            self.gen_stmt(stmt)?;
        }
        match &block.value {
            Some(value) => self.gen(value),
            None => Ok(StackValue::None),
        }
    }

    fn gen_stmt(&mut self, stmt: &Stmt) -> CodegenResult<()> {
        let previous = self.v.set_span(stmt.span);
        let result = self.gen_stmt_kind(&stmt.kind);
        self.v.set_span(previous);
        result
    }

    fn gen_stmt_kind(&mut self, kind: &StmtKind) -> CodegenResult<()> {
        match kind {
            StmtKind::Expr(expr) => self.gen_discard(expr),
            StmtKind::Local { var, init } => {
                let target = self.declare(var)?;
                if let Some(init) = init {
                    target.put_receiver(&mut self.v)?;
                    self.gen_to(init, &var.ty)?;
                    target.store(&var.ty, &mut self.v)?;
                }
                Ok(())
            }
            StmtKind::Destructure { vars, init } => {
                let slot = self.alloc_temp()?;
                let tuple = StackValue::local(slot, init.ty.clone());
                self.gen_to(init, &init.ty)?;
                tuple.store(&init.ty, &mut self.v)?;
                for (index, var) in vars.iter().enumerate() {
                    let index = u8::try_from(index).map_err(|_| {
                        self.v.error(CodegenErrorKind::Unsupported(format!(
                            "destructuring into {} variables",
                            vars.len()
                        )))
                    })?;
                    let component = StackValue::MultiVariable {
                        tuple: Box::new(tuple.clone()),
                        index,
                        ty: var.ty.clone(),
                    };
                    let target = self.declare(var)?;
                    target.put_receiver(&mut self.v)?;
                    component.load(&var.ty, &mut self.v)?;
                    target.store(&var.ty, &mut self.v)?;
                }
                Ok(())
            }
        }
    }

    // ===== Finishing =====

    /// Lower `body` as the function's result and seal the chunk
    fn finish(mut self, body: &Expr) -> CodegenResult<Rc<Function>> {
        let ret = self.return_type.clone();
        self.gen_to(body, &ret)?;
        self.v.op(OpCode::Return);

        let locals = u16::try_from(self.locals).map_err(|_| {
            self.v.error(CodegenErrorKind::TooManyLocals {
                needed: self.locals,
                limit: self.options.max_locals,
            })
        })?;
        let (chunk, max_stack) = self.v.finish(self.options.verify_reservations)?;
        tracing::debug!(
            function = %self.name,
            code_size = chunk.len(),
            max_stack,
            locals,
            "lowered function"
        );
        Ok(Rc::new(Function {
            name: self.name,
            arity: self.arity,
            chunk,
            locals,
            max_stack,
            captures: self.captures,
        }))
    }
}
