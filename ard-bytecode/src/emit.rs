// Lowers a checked module into a flat program. Locals are numbered in
// definition order per function; the emitter tracks live stack depth
// to compute max_stack. Codegen is naive: no folding, no peephole.

use crate::opcode::Op;
use crate::program::{Constant, Function, Instruction, Program, TypeEntry};
use ard_checker::ir::{AssignTarget, Block, Expr, Module, StrSegment};
use ard_checker::types::{EnumType, StructType, Type};
use log::debug;
use std::collections::HashMap;
use std::rc::Rc;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum EmitError {
    #[error("unresolved function '{0}' during emission")]
    UnresolvedFunction(String),
    #[error("unresolved local '{0}' during emission")]
    UnresolvedLocal(String),
}

/// Entry point: compile `module` (and its imports' callables) into a
/// program whose "main" runs the top-level statements and then a
/// user-defined `main`, if present.
pub fn emit(module: &Rc<Module>) -> Result<Program, EmitError> {
    let mut emitter = Emitter::new();
    emitter.register_module(module, "");
    let program = emitter.run(module)?;
    debug!(
        "emitted {} functions, {} constants, {} types",
        program.functions.len(),
        program.constants.len(),
        program.types.len()
    );
    Ok(program)
}

enum Job {
    Main,
    Function {
        module: Rc<Module>,
        prefix: String,
        function: Rc<ard_checker::ir::Function>,
        method: bool,
    },
    Closure {
        module: Rc<Module>,
        prefix: String,
        params: Vec<String>,
        captures: Vec<String>,
        body: Rc<Block>,
    },
}

struct Emitter {
    constants: Vec<Constant>,
    const_map: HashMap<String, u32>,
    float_map: HashMap<u64, u32>,
    types: Vec<TypeEntry>,
    type_map: HashMap<String, u32>,
    names: Vec<String>,
    fn_indices: HashMap<String, u32>,
    jobs: Vec<Job>,
    /// Module-level bindings, visible from every function.
    globals: HashMap<String, u32>,
}

impl Emitter {
    fn new() -> Self {
        let mut emitter = Self {
            constants: Vec::new(),
            const_map: HashMap::new(),
            float_map: HashMap::new(),
            types: Vec::new(),
            type_map: HashMap::new(),
            names: Vec::new(),
            fn_indices: HashMap::new(),
            jobs: Vec::new(),
            globals: HashMap::new(),
        };
        emitter.reserve("main".to_string(), Job::Main);
        emitter
    }

    fn reserve(&mut self, name: String, job: Job) -> u32 {
        let index = self.names.len() as u32;
        self.fn_indices.insert(name.clone(), index);
        self.names.push(name);
        self.jobs.push(job);
        index
    }

    /// Register every callable of a module (and, transitively, its
    /// imports) under a name prefix.
    fn register_module(&mut self, module: &Rc<Module>, prefix: &str) {
        for (name, function) in &module.functions {
            self.reserve(
                format!("{}{}", prefix, name),
                Job::Function {
                    module: module.clone(),
                    prefix: prefix.to_string(),
                    function: function.clone(),
                    method: false,
                },
            );
        }
        for (type_name, methods) in &module.methods {
            for (method_name, function) in methods {
                // Methods are keyed by the receiver's type name at
                // runtime, so they stay unprefixed across modules.
                let marker = if function.signature.mutates { "!" } else { "" };
                let name = format!("{}.{}{}", type_name, method_name, marker);
                if self.fn_indices.contains_key(&name) {
                    continue;
                }
                self.reserve(
                    name,
                    Job::Function {
                        module: module.clone(),
                        prefix: prefix.to_string(),
                        function: function.clone(),
                        method: true,
                    },
                );
            }
        }
        for (type_name, statics) in &module.statics {
            for (static_name, function) in statics {
                self.reserve(
                    format!("{}{}::{}", prefix, type_name, static_name),
                    Job::Function {
                        module: module.clone(),
                        prefix: prefix.to_string(),
                        function: function.clone(),
                        method: false,
                    },
                );
            }
        }
        for (alias, imported) in &module.imports {
            let nested = format!("{}{}::", prefix, alias);
            self.register_module(imported, &nested);
        }
    }

    fn run(mut self, module: &Rc<Module>) -> Result<Program, EmitError> {
        let mut functions: Vec<Function> = Vec::new();
        let mut next = 0usize;
        while next < self.jobs.len() {
            let job = std::mem::replace(&mut self.jobs[next], Job::Main);
            let name = self.names[next].clone();
            let function = match job {
                Job::Main => self.emit_main(name, module)?,
                Job::Function {
                    module,
                    prefix,
                    function,
                    method,
                } => self.emit_function(name, &module, &prefix, &function, method)?,
                Job::Closure {
                    module,
                    prefix,
                    params,
                    captures,
                    body,
                } => self.emit_closure_body(name, &module, &prefix, params, captures, &body)?,
            };
            functions.push(function);
            next += 1;
        }
        Ok(Program {
            constants: self.constants,
            types: self.types,
            functions,
        })
    }

    // ==================== Pools ====================

    fn str_const(&mut self, text: &str) -> u32 {
        if let Some(&index) = self.const_map.get(text) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.constants.push(Constant::Str(text.to_string()));
        self.const_map.insert(text.to_string(), index);
        index
    }

    fn float_const(&mut self, value: f64) -> u32 {
        let bits = value.to_bits();
        if let Some(&index) = self.float_map.get(&bits) {
            return index;
        }
        let index = self.constants.len() as u32;
        self.constants.push(Constant::Float(value));
        self.float_map.insert(bits, index);
        index
    }

    fn global_slot(&mut self, name: &str) -> u32 {
        if let Some(&slot) = self.globals.get(name) {
            return slot;
        }
        let slot = self.globals.len() as u32;
        self.globals.insert(name.to_string(), slot);
        slot
    }

    fn type_entry(&mut self, name: String) -> u32 {
        if let Some(&index) = self.type_map.get(&name) {
            return index;
        }
        let index = self.types.len() as u32;
        self.types.push(TypeEntry {
            id: index,
            name: name.clone(),
        });
        self.type_map.insert(name, index);
        index
    }

    fn struct_entry(&mut self, def: &Rc<StructType>) -> u32 {
        let fields: Vec<&str> = def.fields.keys().map(|k| k.as_str()).collect();
        self.type_entry(format!("{}{{{}}}", def.name, fields.join(",")))
    }

    fn enum_entry(&mut self, def: &Rc<EnumType>) -> u32 {
        self.type_entry(format!("{}={}", def.name, def.variants.join("|")))
    }

    fn union_arm_entry(&mut self, ty: &Type) -> u32 {
        let name = match ty {
            Type::Struct(def) => {
                return self.struct_entry(def);
            }
            Type::Enum(def) => {
                return self.enum_entry(def);
            }
            other => other.to_string(),
        };
        self.type_entry(name)
    }

    // ==================== Function bodies ====================

    fn emit_main(&mut self, name: String, module: &Rc<Module>) -> Result<Function, EmitError> {
        let mut ctx = FnCtx::new(module.clone(), String::new());
        ctx.top_level = true;
        if module.program.is_empty() {
            self.push_op(&mut ctx, Op::ConstVoid, 0, 0, 0);
        }
        for (i, expr) in module.program.iter().enumerate() {
            self.emit_expr(&mut ctx, expr)?;
            if i + 1 < module.program.len() {
                self.push_op(&mut ctx, Op::Pop, 0, 0, 0);
            }
        }
        // A user-defined `main` took over the "main" map entry when
        // the module was registered; the synthetic entry is found by
        // position (index 0). Its result replaces the top-level value.
        if module.functions.contains_key("main") {
            let index = self
                .fn_indices
                .get("main")
                .copied()
                .ok_or_else(|| EmitError::UnresolvedFunction("main".to_string()))?;
            self.push_op(&mut ctx, Op::Pop, 0, 0, 0);
            self.push_op(&mut ctx, Op::Call, index, 0, 0);
        }
        self.push_op(&mut ctx, Op::Return, 0, 0, 0);
        Ok(ctx.finish(name, 0))
    }

    fn emit_function(
        &mut self,
        name: String,
        module: &Rc<Module>,
        prefix: &str,
        function: &Rc<ard_checker::ir::Function>,
        method: bool,
    ) -> Result<Function, EmitError> {
        let mut ctx = FnCtx::new(module.clone(), prefix.to_string());
        let mut arity = 0u32;
        if method {
            ctx.declare("@");
            arity += 1;
        }
        for param in &function.signature.params {
            ctx.declare(&param.name);
            arity += 1;
        }
        self.emit_block(&mut ctx, &function.body)?;
        self.push_op(&mut ctx, Op::Return, 0, 0, 0);
        Ok(ctx.finish(name, arity))
    }

    fn emit_closure_body(
        &mut self,
        name: String,
        module: &Rc<Module>,
        prefix: &str,
        params: Vec<String>,
        captures: Vec<String>,
        body: &Block,
    ) -> Result<Function, EmitError> {
        let mut ctx = FnCtx::new(module.clone(), prefix.to_string());
        let arity = params.len() as u32;
        for param in &params {
            ctx.declare(param);
        }
        // Captured values arrive as extra locals after the arguments.
        for capture in &captures {
            ctx.declare(capture);
        }
        self.emit_block(&mut ctx, body)?;
        self.push_op(&mut ctx, Op::Return, 0, 0, 0);
        Ok(ctx.finish(name, arity))
    }

    // ==================== Expression emission ====================

    fn push_op(&mut self, ctx: &mut FnCtx, op: Op, a: u32, b: u32, imm: i64) -> usize {
        ctx.push(Instruction::new(op, a, b, imm))
    }

    /// Emit a block: every expression's value but the last is popped.
    /// An empty block pushes Void.
    fn emit_block(&mut self, ctx: &mut FnCtx, block: &Block) -> Result<(), EmitError> {
        if block.exprs.is_empty() {
            self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            return Ok(());
        }
        ctx.enter_scope();
        for (i, expr) in block.exprs.iter().enumerate() {
            self.emit_expr(ctx, expr)?;
            if i + 1 < block.exprs.len() {
                self.push_op(ctx, Op::Pop, 0, 0, 0);
            }
        }
        ctx.exit_scope();
        Ok(())
    }

    fn emit_args(&mut self, ctx: &mut FnCtx, args: &[Expr]) -> Result<(), EmitError> {
        for arg in args {
            self.emit_expr(ctx, arg)?;
        }
        Ok(())
    }

    fn emit_expr(&mut self, ctx: &mut FnCtx, expr: &Expr) -> Result<(), EmitError> {
        match expr {
            Expr::Int(v) => {
                self.push_op(ctx, Op::ConstInt, 0, 0, *v);
            }
            Expr::Float(v) => {
                let index = self.float_const(*v);
                self.push_op(ctx, Op::ConstFloat, index, 0, 0);
            }
            Expr::Bool(v) => {
                self.push_op(ctx, Op::ConstBool, 0, 0, i64::from(*v));
            }
            Expr::Void => {
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }
            Expr::Str(s) => {
                let index = self.str_const(s);
                self.push_op(ctx, Op::ConstStr, index, 0, 0);
            }
            Expr::InterpolatedStr(segments) => self.emit_interpolation(ctx, segments)?,
            Expr::ListLiteral { items, .. } => {
                self.emit_args(ctx, items)?;
                self.push_op(ctx, Op::MakeList, items.len() as u32, 0, 0);
            }
            Expr::MapLiteral { entries, .. } => {
                for (key, value) in entries {
                    self.emit_expr(ctx, key)?;
                    self.emit_expr(ctx, value)?;
                }
                self.push_op(ctx, Op::MakeMap, entries.len() as u32, 0, 0);
            }

            Expr::VariableDef { name, value } => {
                self.emit_expr(ctx, value)?;
                if ctx.top_level {
                    // Top-level bindings become globals so functions
                    // and closures can reach them.
                    let slot = self.global_slot(name);
                    self.push_op(ctx, Op::StoreGlobal, slot, 0, 0);
                } else {
                    let local = ctx.declare(name);
                    self.push_op(ctx, Op::StoreLocal, local, 0, 0);
                }
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }
            Expr::Reassignment { target, value } => {
                match target {
                    AssignTarget::Variable { name, .. } => {
                        self.emit_expr(ctx, value)?;
                        if let Some(local) = ctx.lookup(name) {
                            self.push_op(ctx, Op::StoreLocal, local, 0, 0);
                        } else if let Some(&slot) = self.globals.get(name) {
                            self.push_op(ctx, Op::StoreGlobal, slot, 0, 0);
                        } else {
                            return Err(EmitError::UnresolvedLocal(name.clone()));
                        }
                    }
                    AssignTarget::Field { object, field, .. } => {
                        self.emit_expr(ctx, object)?;
                        self.emit_expr(ctx, value)?;
                        let name = self.str_const(field);
                        self.push_op(ctx, Op::SetField, name, 0, 0);
                    }
                }
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }
            Expr::Variable { name, .. } => {
                if let Some(local) = ctx.lookup(name) {
                    self.push_op(ctx, Op::LoadLocal, local, 0, 0);
                } else if let Some(&slot) = self.globals.get(name) {
                    self.push_op(ctx, Op::LoadGlobal, slot, 0, 0);
                } else {
                    // A module-level function referenced as a value.
                    let qualified = format!("{}{}", ctx.prefix, name);
                    let index = self
                        .fn_indices
                        .get(&qualified)
                        .copied()
                        .ok_or_else(|| EmitError::UnresolvedFunction(qualified))?;
                    self.push_op(ctx, Op::MakeClosure, index, 0, 0);
                }
            }
            Expr::CopyExpression(inner) => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::DeepCopy, 0, 0, 0);
            }
            Expr::Sequence(block) => {
                // Hoisting sequence: inline, no scope of its own.
                for (i, expr) in block.exprs.iter().enumerate() {
                    self.emit_expr(ctx, expr)?;
                    if i + 1 < block.exprs.len() {
                        self.push_op(ctx, Op::Pop, 0, 0, 0);
                    }
                }
            }

            Expr::If {
                condition,
                then_block,
                else_block,
                ..
            } => {
                self.emit_expr(ctx, condition)?;
                let to_else = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
                self.emit_block(ctx, then_block)?;
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_else);
                // The else arm balances the then arm's push.
                ctx.drop_depth(1);
                match else_block {
                    Some(block) => self.emit_block(ctx, block)?,
                    None => {
                        self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
                    }
                }
                ctx.patch(to_end);
            }

            Expr::WhileLoop { condition, body } => {
                let start = ctx.here();
                let exit = match condition {
                    Some(condition) => {
                        self.emit_expr(ctx, condition)?;
                        Some(self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0))
                    }
                    None => None,
                };
                ctx.enter_loop();
                self.emit_block(ctx, body)?;
                self.push_op(ctx, Op::Pop, 0, 0, 0);
                self.push_op(ctx, Op::Jump, start as u32, 0, 0);
                let breaks = ctx.exit_loop();
                if let Some(exit) = exit {
                    ctx.patch(exit);
                }
                for site in breaks {
                    ctx.patch(site);
                }
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }

            Expr::ForIntRange {
                cursor,
                start,
                end,
                body,
            } => {
                self.emit_expr(ctx, start)?;
                let cursor_local = ctx.declare(cursor);
                self.push_op(ctx, Op::StoreLocal, cursor_local, 0, 0);
                self.emit_expr(ctx, end)?;
                let end_local = ctx.declare_temp();
                self.push_op(ctx, Op::StoreLocal, end_local, 0, 0);

                let loop_start = ctx.here();
                self.push_op(ctx, Op::LoadLocal, cursor_local, 0, 0);
                self.push_op(ctx, Op::LoadLocal, end_local, 0, 0);
                self.push_op(ctx, Op::Lt, 0, 0, 0);
                let exit = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
                ctx.enter_loop();
                self.emit_block(ctx, body)?;
                self.push_op(ctx, Op::Pop, 0, 0, 0);
                self.push_op(ctx, Op::LoadLocal, cursor_local, 0, 0);
                self.push_op(ctx, Op::ConstInt, 0, 0, 1);
                self.push_op(ctx, Op::Add, 0, 0, 0);
                self.push_op(ctx, Op::StoreLocal, cursor_local, 0, 0);
                self.push_op(ctx, Op::Jump, loop_start as u32, 0, 0);
                let breaks = ctx.exit_loop();
                ctx.patch(exit);
                for site in breaks {
                    ctx.patch(site);
                }
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }

            Expr::ForInStr {
                cursor,
                index,
                subject,
                body,
            } => {
                self.emit_indexed_loop(ctx, subject, cursor, index.as_deref(), body)?;
            }
            Expr::ForInList {
                cursor,
                index,
                subject,
                body,
                ..
            } => {
                self.emit_indexed_loop(ctx, subject, cursor, index.as_deref(), body)?;
            }
            Expr::ForInMap {
                key_cursor,
                value_cursor,
                subject,
                key_type,
                body,
                ..
            } => {
                self.emit_map_loop(ctx, subject, key_cursor, value_cursor.as_deref(), key_type, body)?;
            }

            Expr::ForLoop {
                init,
                condition,
                step,
                body,
            } => {
                ctx.enter_scope();
                self.emit_expr(ctx, init)?;
                self.push_op(ctx, Op::Pop, 0, 0, 0);
                let loop_start = ctx.here();
                self.emit_expr(ctx, condition)?;
                let exit = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
                ctx.enter_loop();
                self.emit_block(ctx, body)?;
                self.push_op(ctx, Op::Pop, 0, 0, 0);
                self.emit_expr(ctx, step)?;
                self.push_op(ctx, Op::Pop, 0, 0, 0);
                self.push_op(ctx, Op::Jump, loop_start as u32, 0, 0);
                let breaks = ctx.exit_loop();
                ctx.patch(exit);
                for site in breaks {
                    ctx.patch(site);
                }
                ctx.exit_scope();
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }

            Expr::Break => {
                let site = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.record_break(site);
                // Unreachable filler keeps the value protocol.
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }

            Expr::StructInstance { def, fields } => {
                // Field values in definition order.
                for field_name in def.fields.keys() {
                    let value = fields
                        .iter()
                        .find(|(name, _)| name == field_name)
                        .map(|(_, value)| value);
                    match value {
                        Some(value) => self.emit_expr(ctx, value)?,
                        None => {
                            self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
                        }
                    }
                }
                let entry = self.struct_entry(def);
                self.push_op(ctx, Op::MakeStruct, entry, def.fields.len() as u32, 0);
            }
            Expr::InstanceProperty { receiver, field, .. } => {
                self.emit_expr(ctx, receiver)?;
                let name = self.str_const(field);
                self.push_op(ctx, Op::GetField, name, 0, 0);
            }
            Expr::InstanceMethod {
                receiver,
                receiver_type,
                method,
                args,
                signature,
            } => {
                // Fiber.join maps to the async opcode pair's eval side.
                if matches!(receiver_type, Type::Fiber) && method == "join" {
                    self.emit_expr(ctx, receiver)?;
                    self.push_op(ctx, Op::AsyncEval, 0, 0, 0);
                    return Ok(());
                }
                self.emit_expr(ctx, receiver)?;
                self.emit_args(ctx, args)?;
                let marker = if signature.mutates { "!" } else { "" };
                let name = self.str_const(&format!("{}{}", method, marker));
                self.push_op(ctx, Op::CallMethod, name, args.len() as u32, 0);
            }
            Expr::EnumVariant { def, index } => {
                let entry = self.enum_entry(def);
                self.push_op(ctx, Op::MakeEnum, entry, 0, i64::from(*index));
            }
            Expr::MaybeSome(inner) => {
                self.emit_expr(ctx, inner)?;
            }
            Expr::MaybeNone { .. } => {
                self.push_op(ctx, Op::MakeNone, 0, 0, 0);
            }
            Expr::ResultOk { inner, .. } => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::MakeResult, 0, 0, 1);
            }
            Expr::ResultErr { inner, .. } => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::MakeResult, 0, 0, 0);
            }

            Expr::FunctionCall { name, args, .. } => {
                if let Some(local) = ctx.lookup(name) {
                    self.push_op(ctx, Op::LoadLocal, local, 0, 0);
                    self.emit_args(ctx, args)?;
                    self.push_op(ctx, Op::CallClosure, 0, args.len() as u32, 0);
                } else if let Some(&slot) = self.globals.get(name) {
                    self.push_op(ctx, Op::LoadGlobal, slot, 0, 0);
                    self.emit_args(ctx, args)?;
                    self.push_op(ctx, Op::CallClosure, 0, args.len() as u32, 0);
                } else {
                    let qualified = format!("{}{}", ctx.prefix, name);
                    let index = self
                        .fn_indices
                        .get(&qualified)
                        .copied()
                        .ok_or_else(|| EmitError::UnresolvedFunction(qualified))?;
                    self.emit_args(ctx, args)?;
                    self.push_op(ctx, Op::Call, index, args.len() as u32, 0);
                }
            }
            Expr::ModuleFunctionCall {
                module,
                function,
                builtin,
                args,
                ..
            } => {
                if *builtin {
                    if module == "ard/async" && function == "start" {
                        self.emit_args(ctx, args)?;
                        self.push_op(ctx, Op::AsyncStart, 0, 0, 0);
                        return Ok(());
                    }
                    self.emit_args(ctx, args)?;
                    let target = self.str_const(&format!("{}::{}", module, function));
                    self.push_op(ctx, Op::CallModule, target, args.len() as u32, 0);
                } else {
                    let qualified = format!("{}{}::{}", ctx.prefix, module, function);
                    let index = self
                        .fn_indices
                        .get(&qualified)
                        .copied()
                        .ok_or_else(|| EmitError::UnresolvedFunction(qualified))?;
                    self.emit_args(ctx, args)?;
                    self.push_op(ctx, Op::Call, index, args.len() as u32, 0);
                }
            }
            Expr::ModuleStaticFunctionCall {
                module,
                target,
                function,
                args,
                ..
            } => {
                let qualified = format!("{}{}::{}::{}", ctx.prefix, module, target, function);
                let index = self
                    .fn_indices
                    .get(&qualified)
                    .copied()
                    .ok_or_else(|| EmitError::UnresolvedFunction(qualified))?;
                self.emit_args(ctx, args)?;
                self.push_op(ctx, Op::Call, index, args.len() as u32, 0);
            }
            Expr::StaticFunctionCall {
                target,
                function,
                args,
                ..
            } => {
                let qualified = format!("{}{}::{}", ctx.prefix, target, function);
                let index = self
                    .fn_indices
                    .get(&qualified)
                    .copied()
                    .ok_or_else(|| EmitError::UnresolvedFunction(qualified))?;
                self.emit_args(ctx, args)?;
                self.push_op(ctx, Op::Call, index, args.len() as u32, 0);
            }
            Expr::ExternCall { binding, args, .. } => {
                self.emit_args(ctx, args)?;
                let name = self.str_const(binding);
                self.push_op(ctx, Op::CallExtern, name, args.len() as u32, 0);
            }
            Expr::Closure {
                params,
                body,
                captures,
                ..
            } => {
                // Captured values are pushed now and become the
                // closure's trailing locals. Bytecode closures capture
                // by value.
                for (capture, _) in captures {
                    if let Some(local) = ctx.lookup(capture) {
                        self.push_op(ctx, Op::LoadLocal, local, 0, 0);
                    } else if let Some(&slot) = self.globals.get(capture) {
                        self.push_op(ctx, Op::LoadGlobal, slot, 0, 0);
                    } else {
                        return Err(EmitError::UnresolvedLocal(capture.clone()));
                    }
                }
                let index = self.reserve(
                    format!("<closure{}>", self.names.len()),
                    Job::Closure {
                        module: ctx.module.clone(),
                        prefix: ctx.prefix.clone(),
                        params: params.iter().map(|p| p.name.clone()).collect(),
                        captures: captures.iter().map(|(n, _)| n.clone()).collect(),
                        body: body.clone(),
                    },
                );
                self.push_op(ctx, Op::MakeClosure, index, captures.len() as u32, 0);
            }

            Expr::BoolMatch {
                subject,
                true_block,
                false_block,
                ..
            } => {
                self.emit_expr(ctx, subject)?;
                let to_false = self.push_op(ctx, Op::MatchBool, 0, 0, 0);
                self.emit_block(ctx, true_block)?;
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_false);
                ctx.drop_depth(1);
                self.emit_block(ctx, false_block)?;
                ctx.patch(to_end);
            }

            Expr::IntMatch {
                subject,
                int_cases,
                range_cases,
                catch_all,
                ..
            } => self.emit_int_match(ctx, subject, int_cases, range_cases, catch_all)?,

            Expr::EnumMatch {
                subject,
                arms,
                catch_all,
                ..
            } => {
                self.emit_expr(ctx, subject)?;
                let subj = ctx.declare_temp();
                self.push_op(ctx, Op::StoreLocal, subj, 0, 0);
                let mut ends = Vec::new();
                for (variant, arm) in arms.iter().enumerate() {
                    let Some(block) = arm else { continue };
                    self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
                    let next = self.push_op(ctx, Op::MatchEnum, 0, 0, variant as i64);
                    self.emit_block(ctx, block)?;
                    ends.push(self.push_op(ctx, Op::Jump, 0, 0, 0));
                    ctx.patch(next);
                    ctx.drop_depth(1);
                }
                match catch_all {
                    Some(block) => self.emit_block(ctx, block)?,
                    None => {
                        // Exhaustive by construction; unreachable arm.
                        self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
                    }
                }
                for site in ends {
                    ctx.patch(site);
                }
            }

            Expr::OptionMatch {
                subject,
                some_binding,
                some_block,
                none_block,
                ..
            } => {
                self.emit_expr(ctx, subject)?;
                let to_none = self.push_op(ctx, Op::MatchMaybe, 0, 0, 0);
                ctx.enter_scope();
                let binding = ctx.declare(some_binding);
                self.push_op(ctx, Op::StoreLocal, binding, 0, 0);
                self.emit_block(ctx, some_block)?;
                ctx.exit_scope();
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_none);
                ctx.drop_depth(1);
                self.emit_block(ctx, none_block)?;
                ctx.patch(to_end);
            }

            Expr::ResultMatch {
                subject,
                ok_binding,
                ok_block,
                err_binding,
                err_block,
                ..
            } => {
                self.emit_expr(ctx, subject)?;
                // MatchResult unwraps on both paths: ok falls through,
                // err jumps, each with the inner value on the stack.
                let to_err = self.push_op(ctx, Op::MatchResult, 0, 0, 1);
                ctx.enter_scope();
                let binding = ctx.declare(ok_binding);
                self.push_op(ctx, Op::StoreLocal, binding, 0, 0);
                self.emit_block(ctx, ok_block)?;
                ctx.exit_scope();
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_err);
                self.emit_err_arm(ctx, err_binding, err_block)?;
                ctx.patch(to_end);
            }

            Expr::UnionMatch {
                subject,
                arms,
                catch_all,
                ..
            } => {
                self.emit_expr(ctx, subject)?;
                let subj = ctx.declare_temp();
                self.push_op(ctx, Op::StoreLocal, subj, 0, 0);
                let mut ends = Vec::new();
                for (ty, block) in arms {
                    let entry = self.union_arm_entry(ty);
                    self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
                    let next = self.push_op(ctx, Op::MatchUnion, 0, entry, 0);
                    ctx.enter_scope();
                    let it = ctx.declare("it");
                    self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
                    self.push_op(ctx, Op::StoreLocal, it, 0, 0);
                    self.emit_block(ctx, block)?;
                    ctx.exit_scope();
                    ends.push(self.push_op(ctx, Op::Jump, 0, 0, 0));
                    ctx.patch(next);
                    ctx.drop_depth(1);
                }
                match catch_all {
                    Some(block) => self.emit_block(ctx, block)?,
                    None => {
                        self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
                    }
                }
                for site in ends {
                    ctx.patch(site);
                }
            }

            Expr::TryOp {
                expression,
                catch_binding,
                catch_block,
                ..
            } => {
                self.emit_expr(ctx, expression)?;
                match (catch_binding, catch_block) {
                    (Some(binding), Some(block)) => {
                        let to_catch = self.push_op(ctx, Op::TryResult, 0, 0, 0);
                        let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                        ctx.patch(to_catch);
                        ctx.enter_scope();
                        let local = ctx.declare(binding);
                        self.push_op(ctx, Op::StoreLocal, local, 0, 0);
                        self.emit_block(ctx, block)?;
                        ctx.exit_scope();
                        ctx.patch(to_end);
                    }
                    _ => {
                        // No catch: the err path returns the Result
                        // from the current frame.
                        self.push_op(ctx, Op::TryResult, 0, 0, 0);
                    }
                }
            }

            Expr::Panic { message, .. } => {
                self.emit_expr(ctx, message)?;
                self.push_op(ctx, Op::Panic, 0, 0, 0);
                // Unreachable filler keeps the value protocol.
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }

            // Specialized operators: kind 0 = Int, 1 = Float, 2 = Str,
            // 3 = Bool, 4 = Enum.
            Expr::IntAddition(l, r) => self.emit_binary(ctx, Op::Add, 0, l, r)?,
            Expr::IntSubtraction(l, r) => self.emit_binary(ctx, Op::Sub, 0, l, r)?,
            Expr::IntMultiplication(l, r) => self.emit_binary(ctx, Op::Mul, 0, l, r)?,
            Expr::IntDivision(l, r) => self.emit_binary(ctx, Op::Div, 0, l, r)?,
            Expr::IntModulo(l, r) => self.emit_binary(ctx, Op::Mod, 0, l, r)?,
            Expr::FloatAddition(l, r) => self.emit_binary(ctx, Op::Add, 1, l, r)?,
            Expr::FloatSubtraction(l, r) => self.emit_binary(ctx, Op::Sub, 1, l, r)?,
            Expr::FloatMultiplication(l, r) => self.emit_binary(ctx, Op::Mul, 1, l, r)?,
            Expr::FloatDivision(l, r) => self.emit_binary(ctx, Op::Div, 1, l, r)?,
            Expr::StrAddition(l, r) => self.emit_binary(ctx, Op::Add, 2, l, r)?,

            Expr::IntLess(l, r) => self.emit_binary(ctx, Op::Lt, 0, l, r)?,
            Expr::IntLessEqual(l, r) => self.emit_binary(ctx, Op::Lte, 0, l, r)?,
            Expr::IntGreater(l, r) => self.emit_binary(ctx, Op::Gt, 0, l, r)?,
            Expr::IntGreaterEqual(l, r) => self.emit_binary(ctx, Op::Gte, 0, l, r)?,
            Expr::FloatLess(l, r) => self.emit_binary(ctx, Op::Lt, 1, l, r)?,
            Expr::FloatLessEqual(l, r) => self.emit_binary(ctx, Op::Lte, 1, l, r)?,
            Expr::FloatGreater(l, r) => self.emit_binary(ctx, Op::Gt, 1, l, r)?,
            Expr::FloatGreaterEqual(l, r) => self.emit_binary(ctx, Op::Gte, 1, l, r)?,

            Expr::IntEquality { negated, left, right } => {
                self.emit_equality(ctx, 0, *negated, left, right)?
            }
            Expr::FloatEquality { negated, left, right } => {
                self.emit_equality(ctx, 1, *negated, left, right)?
            }
            Expr::StrEquality { negated, left, right } => {
                self.emit_equality(ctx, 2, *negated, left, right)?
            }
            Expr::BoolEquality { negated, left, right } => {
                self.emit_equality(ctx, 3, *negated, left, right)?
            }
            Expr::EnumEquality { negated, left, right } => {
                self.emit_equality(ctx, 4, *negated, left, right)?
            }

            Expr::And(l, r) => {
                self.emit_expr(ctx, l)?;
                let to_false = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
                self.emit_expr(ctx, r)?;
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_false);
                ctx.drop_depth(1);
                self.push_op(ctx, Op::ConstBool, 0, 0, 0);
                ctx.patch(to_end);
            }
            Expr::Or(l, r) => {
                self.emit_expr(ctx, l)?;
                let to_true = self.push_op(ctx, Op::JumpIfTrue, 0, 0, 0);
                self.emit_expr(ctx, r)?;
                let to_end = self.push_op(ctx, Op::Jump, 0, 0, 0);
                ctx.patch(to_true);
                ctx.drop_depth(1);
                self.push_op(ctx, Op::ConstBool, 0, 0, 1);
                ctx.patch(to_end);
            }
            Expr::Not(inner) => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::Not, 0, 0, 0);
            }
            Expr::IntNegation(inner) => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::Neg, 0, 0, 0);
            }
            Expr::FloatNegation(inner) => {
                self.emit_expr(ctx, inner)?;
                self.push_op(ctx, Op::Neg, 1, 0, 0);
            }
        }
        Ok(())
    }

    fn emit_binary(
        &mut self,
        ctx: &mut FnCtx,
        op: Op,
        kind: u32,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), EmitError> {
        self.emit_expr(ctx, left)?;
        self.emit_expr(ctx, right)?;
        self.push_op(ctx, op, kind, 0, 0);
        Ok(())
    }

    fn emit_equality(
        &mut self,
        ctx: &mut FnCtx,
        kind: u32,
        negated: bool,
        left: &Expr,
        right: &Expr,
    ) -> Result<(), EmitError> {
        self.emit_expr(ctx, left)?;
        self.emit_expr(ctx, right)?;
        let op = if negated { Op::Neq } else { Op::Eq };
        self.push_op(ctx, op, kind, 0, 0);
        Ok(())
    }

    fn emit_interpolation(
        &mut self,
        ctx: &mut FnCtx,
        segments: &[StrSegment],
    ) -> Result<(), EmitError> {
        let empty = self.str_const("");
        self.push_op(ctx, Op::ConstStr, empty, 0, 0);
        for segment in segments {
            match segment {
                StrSegment::Literal(chunk) => {
                    let index = self.str_const(chunk);
                    self.push_op(ctx, Op::ConstStr, index, 0, 0);
                }
                StrSegment::Expr(inner) => {
                    self.emit_expr(ctx, inner)?;
                    self.push_op(ctx, Op::ToStr, 0, 0, 0);
                }
            }
            self.push_op(ctx, Op::Add, 2, 0, 0);
        }
        Ok(())
    }

    fn emit_int_match(
        &mut self,
        ctx: &mut FnCtx,
        subject: &Expr,
        int_cases: &[(i64, Block)],
        range_cases: &[(i64, i64, Block)],
        catch_all: &Option<Block>,
    ) -> Result<(), EmitError> {
        self.emit_expr(ctx, subject)?;
        let subj = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, subj, 0, 0);
        let mut ends = Vec::new();

        for (literal, block) in int_cases {
            self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
            let next = self.push_op(ctx, Op::MatchInt, 0, 0, *literal);
            self.emit_block(ctx, block)?;
            ends.push(self.push_op(ctx, Op::Jump, 0, 0, 0));
            ctx.patch(next);
            ctx.drop_depth(1);
        }
        for (low, high, block) in range_cases {
            self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
            self.push_op(ctx, Op::ConstInt, 0, 0, *low);
            self.push_op(ctx, Op::Gte, 0, 0, 0);
            let skip_low = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
            self.push_op(ctx, Op::LoadLocal, subj, 0, 0);
            self.push_op(ctx, Op::ConstInt, 0, 0, *high);
            self.push_op(ctx, Op::Lt, 0, 0, 0);
            let skip_high = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);
            self.emit_block(ctx, block)?;
            ends.push(self.push_op(ctx, Op::Jump, 0, 0, 0));
            ctx.patch(skip_low);
            ctx.patch(skip_high);
            ctx.drop_depth(1);
        }
        match catch_all {
            Some(block) => self.emit_block(ctx, block)?,
            None => {
                self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
            }
        }
        for site in ends {
            ctx.patch(site);
        }
        Ok(())
    }

    fn emit_err_arm(
        &mut self,
        ctx: &mut FnCtx,
        binding: &str,
        block: &Block,
    ) -> Result<(), EmitError> {
        ctx.enter_scope();
        let local = ctx.declare(binding);
        self.push_op(ctx, Op::StoreLocal, local, 0, 0);
        self.emit_block(ctx, block)?;
        ctx.exit_scope();
        Ok(())
    }

    fn emit_indexed_loop(
        &mut self,
        ctx: &mut FnCtx,
        subject: &Expr,
        cursor: &str,
        index: Option<&str>,
        body: &Block,
    ) -> Result<(), EmitError> {
        self.emit_expr(ctx, subject)?;
        let subject_local = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, subject_local, 0, 0);
        self.push_op(ctx, Op::ConstInt, 0, 0, 0);
        let index_local = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, index_local, 0, 0);
        let size = self.str_const("size");
        let at = self.str_const("at");

        let loop_start = ctx.here();
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::LoadLocal, subject_local, 0, 0);
        self.push_op(ctx, Op::CallMethod, size, 0, 0);
        self.push_op(ctx, Op::Lt, 0, 0, 0);
        let exit = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);

        ctx.enter_scope();
        self.push_op(ctx, Op::LoadLocal, subject_local, 0, 0);
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::CallMethod, at, 1, 0);
        self.push_op(ctx, Op::UnwrapMaybe, 0, 0, 0);
        let cursor_local = ctx.declare(cursor);
        self.push_op(ctx, Op::StoreLocal, cursor_local, 0, 0);
        if let Some(index_name) = index {
            let named_index = ctx.declare(index_name);
            self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
            self.push_op(ctx, Op::StoreLocal, named_index, 0, 0);
        }
        ctx.enter_loop();
        self.emit_block(ctx, body)?;
        self.push_op(ctx, Op::Pop, 0, 0, 0);
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::ConstInt, 0, 0, 1);
        self.push_op(ctx, Op::Add, 0, 0, 0);
        self.push_op(ctx, Op::StoreLocal, index_local, 0, 0);
        self.push_op(ctx, Op::Jump, loop_start as u32, 0, 0);
        let breaks = ctx.exit_loop();
        ctx.exit_scope();
        ctx.patch(exit);
        for site in breaks {
            ctx.patch(site);
        }
        self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
        Ok(())
    }

    fn emit_map_loop(
        &mut self,
        ctx: &mut FnCtx,
        subject: &Expr,
        key_cursor: &str,
        value_cursor: Option<&str>,
        key_type: &Type,
        body: &Block,
    ) -> Result<(), EmitError> {
        self.emit_expr(ctx, subject)?;
        let map_local = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, map_local, 0, 0);

        // Keys reconstructed at the declared key type, then an indexed
        // walk over them.
        let key_entry = self.union_arm_entry(key_type);
        self.push_op(ctx, Op::LoadLocal, map_local, 0, 0);
        self.push_op(ctx, Op::MapKeys, 0, key_entry, 0);
        let keys_local = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, keys_local, 0, 0);
        self.push_op(ctx, Op::ConstInt, 0, 0, 0);
        let index_local = ctx.declare_temp();
        self.push_op(ctx, Op::StoreLocal, index_local, 0, 0);
        let size = self.str_const("size");
        let at = self.str_const("at");
        let get = self.str_const("get");

        let loop_start = ctx.here();
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::LoadLocal, keys_local, 0, 0);
        self.push_op(ctx, Op::CallMethod, size, 0, 0);
        self.push_op(ctx, Op::Lt, 0, 0, 0);
        let exit = self.push_op(ctx, Op::JumpIfFalse, 0, 0, 0);

        ctx.enter_scope();
        self.push_op(ctx, Op::LoadLocal, keys_local, 0, 0);
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::CallMethod, at, 1, 0);
        self.push_op(ctx, Op::UnwrapMaybe, 0, 0, 0);
        let key_local = ctx.declare(key_cursor);
        self.push_op(ctx, Op::StoreLocal, key_local, 0, 0);
        if let Some(value_name) = value_cursor {
            self.push_op(ctx, Op::LoadLocal, map_local, 0, 0);
            self.push_op(ctx, Op::LoadLocal, key_local, 0, 0);
            self.push_op(ctx, Op::CallMethod, get, 1, 0);
            self.push_op(ctx, Op::UnwrapMaybe, 0, 0, 0);
            let value_local = ctx.declare(value_name);
            self.push_op(ctx, Op::StoreLocal, value_local, 0, 0);
        }
        ctx.enter_loop();
        self.emit_block(ctx, body)?;
        self.push_op(ctx, Op::Pop, 0, 0, 0);
        self.push_op(ctx, Op::LoadLocal, index_local, 0, 0);
        self.push_op(ctx, Op::ConstInt, 0, 0, 1);
        self.push_op(ctx, Op::Add, 0, 0, 0);
        self.push_op(ctx, Op::StoreLocal, index_local, 0, 0);
        self.push_op(ctx, Op::Jump, loop_start as u32, 0, 0);
        let breaks = ctx.exit_loop();
        ctx.exit_scope();
        ctx.patch(exit);
        for site in breaks {
            ctx.patch(site);
        }
        self.push_op(ctx, Op::ConstVoid, 0, 0, 0);
        Ok(())
    }
}

/// Per-function emission state: code buffer, local table, live stack
/// depth, and loop patch sites.
struct FnCtx {
    module: Rc<Module>,
    prefix: String,
    code: Vec<Instruction>,
    scopes: Vec<HashMap<String, u32>>,
    local_count: u32,
    temp_count: u32,
    depth: u32,
    max_depth: u32,
    loops: Vec<Vec<usize>>,
    /// Entry function: its bindings become module globals.
    top_level: bool,
}

impl FnCtx {
    fn new(module: Rc<Module>, prefix: String) -> Self {
        Self {
            module,
            prefix,
            code: Vec::new(),
            scopes: vec![HashMap::new()],
            local_count: 0,
            temp_count: 0,
            depth: 0,
            max_depth: 0,
            loops: Vec::new(),
            top_level: false,
        }
    }

    fn push(&mut self, instruction: Instruction) -> usize {
        let (pops, pushes) = instruction.op.effect(instruction.a, instruction.b);
        self.depth = self.depth.saturating_sub(pops) + pushes;
        self.max_depth = self.max_depth.max(self.depth);
        self.code.push(instruction);
        self.code.len() - 1
    }

    fn here(&self) -> usize {
        self.code.len()
    }

    /// Patch the jump at `site` to land on the next instruction.
    fn patch(&mut self, site: usize) {
        let target = self.code.len() as u32;
        if let Some(instruction) = self.code.get_mut(site) {
            instruction.a = target;
        }
    }

    /// Rewind tracked depth when switching to an alternative branch
    /// whose entry state predates the fall-through path's pushes.
    fn drop_depth(&mut self, by: u32) {
        self.depth = self.depth.saturating_sub(by);
    }

    fn declare(&mut self, name: &str) -> u32 {
        let index = self.local_count;
        self.local_count += 1;
        if let Some(scope) = self.scopes.last_mut() {
            scope.insert(name.to_string(), index);
        }
        index
    }

    fn declare_temp(&mut self) -> u32 {
        self.temp_count += 1;
        let name = format!("%tmp{}", self.temp_count);
        self.declare(&name)
    }

    fn lookup(&self, name: &str) -> Option<u32> {
        self.scopes
            .iter()
            .rev()
            .find_map(|scope| scope.get(name).copied())
    }

    fn enter_scope(&mut self) {
        self.scopes.push(HashMap::new());
    }

    fn exit_scope(&mut self) {
        self.scopes.pop();
    }

    fn enter_loop(&mut self) {
        self.loops.push(Vec::new());
    }

    fn exit_loop(&mut self) -> Vec<usize> {
        self.loops.pop().unwrap_or_default()
    }

    fn record_break(&mut self, site: usize) {
        if let Some(current) = self.loops.last_mut() {
            current.push(site);
        }
    }

    fn finish(self, name: String, arity: u32) -> Function {
        Function {
            name,
            arity,
            locals: self.local_count,
            max_stack: self.max_depth.max(1),
            code: self.code,
        }
    }
}
