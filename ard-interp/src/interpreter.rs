use ard_checker::ir::{AssignTarget, Block, Expr, Function, Module, StrSegment};
use ard_checker::types::Type;
use ard_runtime::{
    builtin_method_call, call_builtin_package, map_key_to_value, value_key, FiberState,
    RuntimeError, Scope, TreeClosure, Value,
};
use indexmap::IndexMap;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// Run a checked module against stdout. Top-level statements execute
/// in order; a defined `main` function then provides the result,
/// otherwise the last top-level expression does.
pub fn interpret(module: &Rc<Module>) -> Result<Value, RuntimeError> {
    let mut stdout = std::io::stdout();
    interpret_with_output(module, &mut stdout)
}

pub fn interpret_with_output(
    module: &Rc<Module>,
    out: &mut dyn Write,
) -> Result<Value, RuntimeError> {
    let mut interpreter = Interpreter::new(out);
    interpreter.run(module)
}

pub struct Interpreter<'o> {
    out: &'o mut dyn Write,
    /// Primed globals per module path. Imported modules execute their
    /// top-level statements once, on first use.
    globals: HashMap<String, Scope>,
}

impl<'o> Interpreter<'o> {
    pub fn new(out: &'o mut dyn Write) -> Self {
        Self {
            out,
            globals: HashMap::new(),
        }
    }

    pub fn run(&mut self, module: &Rc<Module>) -> Result<Value, RuntimeError> {
        debug!("interpreting module {}", module.path);
        let scope = self.prime(module)?;
        let mut last = Value::Void;
        for expr in &module.program {
            last = self.eval(module, &scope, expr)?;
        }
        if module.functions.contains_key("main") {
            return self.call_named(module, "main", vec![]);
        }
        Ok(last)
    }

    /// The module's global scope, executing its top-level statements
    /// on first access.
    fn prime(&mut self, module: &Rc<Module>) -> Result<Scope, RuntimeError> {
        if let Some(scope) = self.globals.get(&module.path) {
            return Ok(scope.clone());
        }
        let scope = Scope::root();
        self.globals.insert(module.path.clone(), scope.clone());
        Ok(scope)
    }

    /// An imported module's globals with its top-level already run.
    fn prime_import(&mut self, module: &Rc<Module>) -> Result<Scope, RuntimeError> {
        if let Some(scope) = self.globals.get(&module.path) {
            return Ok(scope.clone());
        }
        let scope = Scope::root();
        self.globals.insert(module.path.clone(), scope.clone());
        for expr in &module.program {
            self.eval(module, &scope, expr)?;
        }
        Ok(scope)
    }

    fn call_named(
        &mut self,
        module: &Rc<Module>,
        name: &str,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let Some(function) = module.functions.get(name).cloned() else {
            return Err(RuntimeError::internal(format!(
                "no function '{}' in module {}",
                name, module.path
            )));
        };
        self.call_function(module, &function, None, args)
    }

    /// A call binds parameters in a fresh function-root scope chained
    /// to the module globals; methods additionally bind `@`.
    fn call_function(
        &mut self,
        module: &Rc<Module>,
        function: &Rc<Function>,
        receiver: Option<Value>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let globals = self.prime(module)?;
        let scope = globals.child_function();
        if let Some(receiver) = receiver {
            // A mut method sees a shared handle; others a deep copy.
            let bound = if function.signature.mutates {
                receiver
            } else {
                receiver.deep_copy()
            };
            scope.define("@", bound);
        }
        for (param, arg) in function.signature.params.iter().zip(args) {
            scope.define(&param.name, arg);
        }
        let result = self.eval_block(module, &scope, &function.body)?;
        if let Some(early) = scope.take_early() {
            return Ok(early);
        }
        Ok(result)
    }

    fn call_closure(
        &mut self,
        module: &Rc<Module>,
        closure: &Rc<TreeClosure>,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        if let Some(name) = &closure.function_name {
            return self.call_named(module, name, args);
        }
        let scope = closure.env.child_function();
        for (param, arg) in closure.params.iter().zip(args) {
            scope.define(&param.name, arg);
        }
        let result = self.eval_block(module, &scope, &closure.body)?;
        if let Some(early) = scope.take_early() {
            return Ok(early);
        }
        Ok(result)
    }

    fn call_value(
        &mut self,
        module: &Rc<Module>,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        match callee {
            Value::TreeClosure(closure) => self.call_closure(module, &closure, args),
            other => Err(RuntimeError::internal(format!(
                "cannot call a {}",
                other.kind_name()
            ))),
        }
    }

    /// Evaluate a block in the given scope, stopping when the scope
    /// chain is unwinding (break or early return).
    fn eval_block(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        block: &Block,
    ) -> Result<Value, RuntimeError> {
        let mut last = Value::Void;
        for expr in &block.exprs {
            last = self.eval(module, scope, expr)?;
            if scope.broken() {
                return Ok(Value::Void);
            }
        }
        Ok(last)
    }

    fn eval(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        expr: &Expr,
    ) -> Result<Value, RuntimeError> {
        match expr {
            Expr::Int(v) => Ok(Value::Int(*v)),
            Expr::Float(v) => Ok(Value::Float(*v)),
            Expr::Bool(v) => Ok(Value::Bool(*v)),
            Expr::Void => Ok(Value::Void),
            Expr::Str(s) => Ok(Value::Str(s.clone())),
            Expr::InterpolatedStr(segments) => {
                let mut text = String::new();
                for segment in segments {
                    match segment {
                        StrSegment::Literal(chunk) => text.push_str(chunk),
                        StrSegment::Expr(inner) => {
                            let value = self.eval(module, scope, inner)?;
                            text.push_str(&value.to_string());
                        }
                    }
                }
                Ok(Value::Str(text))
            }
            Expr::ListLiteral { items, .. } => {
                let mut values = Vec::with_capacity(items.len());
                for item in items {
                    values.push(self.eval(module, scope, item)?);
                }
                Ok(Value::list(values))
            }
            Expr::MapLiteral { entries, .. } => {
                let mut map = IndexMap::new();
                for (key, value) in entries {
                    let key = self.eval(module, scope, key)?;
                    let value = self.eval(module, scope, value)?;
                    map.insert(value_key(&key), value);
                }
                Ok(Value::Map(Rc::new(RefCell::new(map))))
            }

            Expr::VariableDef { name, value } => {
                let value = self.eval(module, scope, value)?;
                scope.define(name, value);
                Ok(Value::Void)
            }
            Expr::Reassignment { target, value } => {
                let value = self.eval(module, scope, value)?;
                match target {
                    AssignTarget::Variable { name, .. } => {
                        if !scope.assign(name, value) {
                            return Err(RuntimeError::internal(format!(
                                "assignment to unknown binding '{}'",
                                name
                            )));
                        }
                    }
                    AssignTarget::Field { object, field, .. } => {
                        let object = self.eval(module, scope, object)?;
                        match object {
                            Value::Struct { fields, .. } => {
                                fields.borrow_mut().insert(field.clone(), value);
                            }
                            other => {
                                return Err(RuntimeError::internal(format!(
                                    "field assignment on a {}",
                                    other.kind_name()
                                )))
                            }
                        }
                    }
                }
                Ok(Value::Void)
            }
            Expr::Variable { name, .. } => {
                if let Some(value) = scope.get(name) {
                    return Ok(value);
                }
                // A module-level function referenced as a value.
                if module.functions.contains_key(name) {
                    return Ok(Value::TreeClosure(Rc::new(TreeClosure {
                        params: vec![],
                        body: Rc::new(Block::default()),
                        env: self.prime(module)?,
                        captures: vec![],
                        function_name: Some(name.clone()),
                    })));
                }
                Err(RuntimeError::internal(format!(
                    "unresolved name '{}'",
                    name
                )))
            }
            Expr::CopyExpression(inner) => {
                Ok(self.eval(module, scope, inner)?.deep_copy())
            }
            Expr::Sequence(block) => {
                // Hoisting sequence: runs in the current scope.
                let mut last = Value::Void;
                for expr in &block.exprs {
                    last = self.eval(module, scope, expr)?;
                    if scope.broken() {
                        return Ok(Value::Void);
                    }
                }
                Ok(last)
            }

            Expr::If {
                condition,
                then_block,
                else_block,
                ..
            } => {
                let condition = self.eval(module, scope, condition)?.as_bool()?;
                if condition {
                    self.eval_block(module, &scope.child(), then_block)
                } else if let Some(else_block) = else_block {
                    self.eval_block(module, &scope.child(), else_block)
                } else {
                    Ok(Value::Void)
                }
            }
            Expr::WhileLoop { condition, body } => {
                let loop_scope = scope.child_breakable();
                loop {
                    if let Some(condition) = condition {
                        if !self.eval(module, &loop_scope, condition)?.as_bool()? {
                            break;
                        }
                    }
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::ForIntRange {
                cursor,
                start,
                end,
                body,
            } => {
                let start = self.eval(module, scope, start)?.as_int()?;
                let end = self.eval(module, scope, end)?.as_int()?;
                let loop_scope = scope.child_breakable();
                let mut i = start;
                while i < end {
                    loop_scope.define(cursor, Value::Int(i));
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                    i += 1;
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::ForInStr {
                cursor,
                index,
                subject,
                body,
            } => {
                let subject = self.eval(module, scope, subject)?;
                let chars: Vec<String> =
                    subject.as_str()?.chars().map(|c| c.to_string()).collect();
                let loop_scope = scope.child_breakable();
                for (i, ch) in chars.into_iter().enumerate() {
                    loop_scope.define(cursor, Value::Str(ch));
                    if let Some(index) = index {
                        loop_scope.define(index, Value::Int(i as i64));
                    }
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::ForInList {
                cursor,
                index,
                subject,
                body,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                let Value::List(items) = subject else {
                    return Err(RuntimeError::internal("for-in over a non-list"));
                };
                let loop_scope = scope.child_breakable();
                let mut i = 0usize;
                loop {
                    // Index per iteration; the list may grow or shrink
                    // through a mut handle while iterating.
                    let item = {
                        let items = items.borrow();
                        match items.get(i) {
                            Some(item) => item.clone(),
                            None => break,
                        }
                    };
                    loop_scope.define(cursor, item);
                    if let Some(index) = index {
                        loop_scope.define(index, Value::Int(i as i64));
                    }
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                    i += 1;
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::ForInMap {
                key_cursor,
                value_cursor,
                subject,
                key_type,
                body,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                let Value::Map(entries) = subject else {
                    return Err(RuntimeError::internal("for-in over a non-map"));
                };
                let snapshot: Vec<(String, Value)> = entries
                    .borrow()
                    .iter()
                    .map(|(k, v)| (k.clone(), v.clone()))
                    .collect();
                let loop_scope = scope.child_breakable();
                for (key, value) in snapshot {
                    loop_scope.define(key_cursor, map_key_to_value(&key, key_type));
                    if let Some(value_cursor) = value_cursor {
                        loop_scope.define(value_cursor, value);
                    }
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::ForLoop {
                init,
                condition,
                step,
                body,
            } => {
                let loop_scope = scope.child_breakable();
                self.eval(module, &loop_scope, init)?;
                loop {
                    if !self.eval(module, &loop_scope, condition)?.as_bool()? {
                        break;
                    }
                    self.eval_block(module, &loop_scope.child(), body)?;
                    if loop_scope.broken() {
                        break;
                    }
                    self.eval(module, &loop_scope, step)?;
                }
                loop_scope.consume_break();
                Ok(Value::Void)
            }
            Expr::Break => {
                scope.break_loop();
                Ok(Value::Void)
            }

            Expr::StructInstance { def, fields } => {
                let mut values = IndexMap::new();
                for (name, value) in fields {
                    values.insert(name.clone(), self.eval(module, scope, value)?);
                }
                Ok(Value::structure(&def.name, values))
            }
            Expr::InstanceProperty {
                receiver, field, ..
            } => {
                let receiver = self.eval(module, scope, receiver)?;
                match receiver {
                    Value::Struct { fields, .. } => fields
                        .borrow()
                        .get(field)
                        .cloned()
                        .ok_or_else(|| {
                            RuntimeError::internal(format!("missing field '{}'", field))
                        }),
                    Value::Map(entries) => {
                        Ok(entries.borrow().get(field).cloned().unwrap_or(Value::Void))
                    }
                    other => Err(RuntimeError::internal(format!(
                        "property access on a {}",
                        other.kind_name()
                    ))),
                }
            }
            Expr::InstanceMethod {
                receiver,
                receiver_type,
                method,
                args,
                ..
            } => self.eval_method(module, scope, receiver, receiver_type, method, args),
            Expr::EnumVariant { def, index } => Ok(Value::Enum {
                def: def.clone(),
                variant: *index,
            }),
            Expr::MaybeSome(inner) => self.eval(module, scope, inner),
            Expr::MaybeNone { .. } => Ok(Value::Void),
            Expr::ResultOk { inner, .. } => {
                Ok(Value::ok(self.eval(module, scope, inner)?))
            }
            Expr::ResultErr { inner, .. } => {
                Ok(Value::err(self.eval(module, scope, inner)?))
            }

            Expr::FunctionCall { name, args, .. } => {
                let args = self.eval_args(module, scope, args)?;
                if let Some(callee) = scope.get(name) {
                    return self.call_value(module, callee, args);
                }
                self.call_named(module, name, args)
            }
            Expr::ModuleFunctionCall {
                module: module_key,
                function,
                builtin,
                args,
                ..
            } => {
                let args = self.eval_args(module, scope, args)?;
                if *builtin {
                    // Fibers need an evaluator; they are handled here
                    // rather than in the package registry.
                    if module_key == "ard/async" && function == "start" {
                        let worker = args.into_iter().next().unwrap_or(Value::Void);
                        // The worker's captured bindings are deep
                        // copied at start; mutation in the parent
                        // after this point is invisible to the fiber.
                        let worker = isolate_worker(worker);
                        return Ok(Value::Fiber(Rc::new(RefCell::new(FiberState::new(
                            worker,
                        )))));
                    }
                    return call_builtin_package(module_key, function, &args, self.out);
                }
                let Some(imported) = module.imports.get(module_key).cloned() else {
                    return Err(RuntimeError::internal(format!(
                        "unknown module alias '{}'",
                        module_key
                    )));
                };
                self.prime_import(&imported)?;
                self.call_named(&imported, function, args)
            }
            Expr::ModuleStaticFunctionCall {
                module: alias,
                target,
                function,
                args,
                ..
            } => {
                let args = self.eval_args(module, scope, args)?;
                let Some(imported) = module.imports.get(alias).cloned() else {
                    return Err(RuntimeError::internal(format!(
                        "unknown module alias '{}'",
                        alias
                    )));
                };
                self.prime_import(&imported)?;
                let function = imported
                    .statics
                    .get(target)
                    .and_then(|t| t.get(function))
                    .cloned()
                    .ok_or_else(|| {
                        RuntimeError::internal(format!("missing static {}::{}", target, function))
                    })?;
                self.call_function(&imported, &function, None, args)
            }
            Expr::StaticFunctionCall {
                target,
                function,
                args,
                ..
            } => {
                let args = self.eval_args(module, scope, args)?;
                let function = module
                    .statics
                    .get(target)
                    .and_then(|t| t.get(function))
                    .cloned()
                    .ok_or_else(|| {
                        RuntimeError::internal(format!("missing static {}::{}", target, function))
                    })?;
                self.call_function(module, &function, None, args)
            }
            Expr::ExternCall { binding, .. } => {
                Err(RuntimeError::ExternUnavailable(binding.clone()))
            }
            Expr::Closure {
                params,
                body,
                captures,
                ..
            } => Ok(Value::TreeClosure(Rc::new(TreeClosure {
                params: params.clone(),
                body: body.clone(),
                env: scope.clone(),
                captures: captures.iter().map(|(name, _)| name.clone()).collect(),
                function_name: None,
            }))),

            Expr::BoolMatch {
                subject,
                true_block,
                false_block,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?.as_bool()?;
                let block = if subject { true_block } else { false_block };
                self.eval_block(module, &scope.child(), block)
            }
            Expr::IntMatch {
                subject,
                int_cases,
                range_cases,
                catch_all,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?.as_int()?;
                for (literal, block) in int_cases {
                    if subject == *literal {
                        return self.eval_block(module, &scope.child(), block);
                    }
                }
                for (low, high, block) in range_cases {
                    if subject >= *low && subject < *high {
                        return self.eval_block(module, &scope.child(), block);
                    }
                }
                match catch_all {
                    Some(block) => self.eval_block(module, &scope.child(), block),
                    None => Err(RuntimeError::internal("non-exhaustive int match")),
                }
            }
            Expr::EnumMatch {
                subject,
                arms,
                catch_all,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                let Value::Enum { variant, .. } = subject else {
                    return Err(RuntimeError::internal("enum match on a non-enum"));
                };
                if let Some(Some(block)) = arms.get(variant as usize) {
                    return self.eval_block(module, &scope.child(), block);
                }
                match catch_all {
                    Some(block) => self.eval_block(module, &scope.child(), block),
                    None => Err(RuntimeError::internal("non-exhaustive enum match")),
                }
            }
            Expr::OptionMatch {
                subject,
                some_binding,
                some_block,
                none_block,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                match subject {
                    Value::Void => self.eval_block(module, &scope.child(), none_block),
                    value => {
                        let arm_scope = scope.child();
                        arm_scope.define(some_binding, value);
                        self.eval_block(module, &arm_scope, some_block)
                    }
                }
            }
            Expr::ResultMatch {
                subject,
                ok_binding,
                ok_block,
                err_binding,
                err_block,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                let Value::Result { ok, inner } = subject else {
                    return Err(RuntimeError::internal("result match on a non-result"));
                };
                let arm_scope = scope.child();
                if ok {
                    arm_scope.define(ok_binding, *inner);
                    self.eval_block(module, &arm_scope, ok_block)
                } else {
                    arm_scope.define(err_binding, *inner);
                    self.eval_block(module, &arm_scope, err_block)
                }
            }
            Expr::UnionMatch {
                subject,
                arms,
                catch_all,
                ..
            } => {
                let subject = self.eval(module, scope, subject)?;
                for (ty, block) in arms {
                    if subject.matches_type(ty) {
                        let arm_scope = scope.child();
                        arm_scope.define("it", subject);
                        return self.eval_block(module, &arm_scope, block);
                    }
                }
                match catch_all {
                    Some(block) => self.eval_block(module, &scope.child(), block),
                    None => Err(RuntimeError::internal("non-exhaustive union match")),
                }
            }
            Expr::TryOp {
                expression,
                catch_binding,
                catch_block,
                ..
            } => {
                let value = self.eval(module, scope, expression)?;
                let Value::Result { ok, inner } = value else {
                    return Err(RuntimeError::internal("try on a non-result"));
                };
                if ok {
                    return Ok(*inner);
                }
                match (catch_binding, catch_block) {
                    (Some(binding), Some(block)) => {
                        let catch_scope = scope.child();
                        catch_scope.define(binding, *inner);
                        self.eval_block(module, &catch_scope, block)
                    }
                    _ => {
                        // No catch: the error becomes the enclosing
                        // function's result.
                        scope.early_return(Value::Result { ok, inner });
                        Ok(Value::Void)
                    }
                }
            }
            Expr::Panic {
                message,
                line,
                column,
            } => {
                let message = self.eval(module, scope, message)?.to_string();
                Err(RuntimeError::Panic {
                    message,
                    line: *line,
                    column: *column,
                })
            }

            // Specialized arithmetic: no runtime type tests, direct
            // operations on the representation.
            Expr::IntAddition(l, r) => self.int_op(module, scope, l, r, |a, b| {
                Ok(Value::Int(a.wrapping_add(b)))
            }),
            Expr::IntSubtraction(l, r) => self.int_op(module, scope, l, r, |a, b| {
                Ok(Value::Int(a.wrapping_sub(b)))
            }),
            Expr::IntMultiplication(l, r) => self.int_op(module, scope, l, r, |a, b| {
                Ok(Value::Int(a.wrapping_mul(b)))
            }),
            Expr::IntDivision(l, r) => self.int_op(module, scope, l, r, |a, b| {
                if b == 0 {
                    Err(RuntimeError::fault("division by zero"))
                } else {
                    Ok(Value::Int(a.wrapping_div(b)))
                }
            }),
            Expr::IntModulo(l, r) => self.int_op(module, scope, l, r, |a, b| {
                if b == 0 {
                    Err(RuntimeError::fault("modulo by zero"))
                } else {
                    Ok(Value::Int(a.wrapping_rem(b)))
                }
            }),
            Expr::FloatAddition(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Float(a + b))
            }
            Expr::FloatSubtraction(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Float(a - b))
            }
            Expr::FloatMultiplication(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Float(a * b))
            }
            Expr::FloatDivision(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Float(a / b))
            }
            Expr::StrAddition(l, r) => {
                let left = self.eval(module, scope, l)?;
                let right = self.eval(module, scope, r)?;
                Ok(Value::Str(format!(
                    "{}{}",
                    left.as_str()?,
                    right.as_str()?
                )))
            }

            Expr::IntLess(l, r) => self.int_op(module, scope, l, r, |a, b| Ok(Value::Bool(a < b))),
            Expr::IntLessEqual(l, r) => {
                self.int_op(module, scope, l, r, |a, b| Ok(Value::Bool(a <= b)))
            }
            Expr::IntGreater(l, r) => {
                self.int_op(module, scope, l, r, |a, b| Ok(Value::Bool(a > b)))
            }
            Expr::IntGreaterEqual(l, r) => {
                self.int_op(module, scope, l, r, |a, b| Ok(Value::Bool(a >= b)))
            }
            Expr::FloatLess(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Bool(a < b))
            }
            Expr::FloatLessEqual(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Bool(a <= b))
            }
            Expr::FloatGreater(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Bool(a > b))
            }
            Expr::FloatGreaterEqual(l, r) => {
                self.float_op(module, scope, l, r, |a, b| Value::Bool(a >= b))
            }

            Expr::IntEquality { negated, left, right }
            | Expr::FloatEquality { negated, left, right }
            | Expr::StrEquality { negated, left, right }
            | Expr::BoolEquality { negated, left, right }
            | Expr::EnumEquality { negated, left, right } => {
                let left = self.eval(module, scope, left)?;
                let right = self.eval(module, scope, right)?;
                let equal = left == right;
                Ok(Value::Bool(equal != *negated))
            }

            Expr::And(l, r) => {
                if !self.eval(module, scope, l)?.as_bool()? {
                    return Ok(Value::Bool(false));
                }
                self.eval(module, scope, r)
            }
            Expr::Or(l, r) => {
                if self.eval(module, scope, l)?.as_bool()? {
                    return Ok(Value::Bool(true));
                }
                self.eval(module, scope, r)
            }
            Expr::Not(inner) => {
                let value = self.eval(module, scope, inner)?.as_bool()?;
                Ok(Value::Bool(!value))
            }
            Expr::IntNegation(inner) => {
                let value = self.eval(module, scope, inner)?.as_int()?;
                Ok(Value::Int(value.wrapping_neg()))
            }
            Expr::FloatNegation(inner) => {
                let value = self.eval(module, scope, inner)?.as_float()?;
                Ok(Value::Float(-value))
            }
        }
    }

    fn eval_args(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        args: &[Expr],
    ) -> Result<Vec<Value>, RuntimeError> {
        args.iter()
            .map(|arg| self.eval(module, scope, arg))
            .collect()
    }

    fn eval_method(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        receiver: &Expr,
        receiver_type: &Type,
        method: &str,
        args: &[Expr],
    ) -> Result<Value, RuntimeError> {
        let receiver = self.eval(module, scope, receiver)?;
        let args = self.eval_args(module, scope, args)?;

        // Fiber.join runs the stored worker once, on this thread.
        if let Value::Fiber(state) = &receiver {
            if method == "join" {
                let worker = state.borrow_mut().worker.take();
                if let Some(worker) = worker {
                    self.call_value(module, worker, vec![])?;
                    state.borrow_mut().completed = true;
                }
                return Ok(Value::Void);
            }
        }

        // User methods on structs and enums; trait methods land in the
        // same table.
        let type_name = match receiver_type {
            Type::Struct(def) => Some(def.name.clone()),
            Type::Enum(def) => Some(def.name.clone()),
            Type::Trait(_) => match &receiver {
                Value::Struct { name, .. } => Some(name.to_string()),
                Value::Enum { def, .. } => Some(def.name.clone()),
                _ => None,
            },
            _ => None,
        };
        if let Some(type_name) = type_name {
            if let Some((owner, function)) = self.find_method(module, &type_name, method) {
                return self.call_function(&owner, &function, Some(receiver), args);
            }
            return Err(RuntimeError::internal(format!(
                "{} has no method '{}'",
                type_name, method
            )));
        }

        builtin_method_call(&receiver, method, &args)
    }

    /// Method bodies run in their defining module; imports are
    /// searched after the current module.
    fn find_method(
        &self,
        module: &Rc<Module>,
        type_name: &str,
        method: &str,
    ) -> Option<(Rc<Module>, Rc<Function>)> {
        if let Some(function) = module
            .methods
            .get(type_name)
            .and_then(|methods| methods.get(method))
        {
            return Some((module.clone(), function.clone()));
        }
        module.imports.values().find_map(|imported| {
            imported
                .methods
                .get(type_name)
                .and_then(|methods| methods.get(method))
                .map(|f| (imported.clone(), f.clone()))
        })
    }

    fn int_op(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        left: &Expr,
        right: &Expr,
        op: impl Fn(i64, i64) -> Result<Value, RuntimeError>,
    ) -> Result<Value, RuntimeError> {
        let left = self.eval(module, scope, left)?.as_int()?;
        let right = self.eval(module, scope, right)?.as_int()?;
        op(left, right)
    }

    fn float_op(
        &mut self,
        module: &Rc<Module>,
        scope: &Scope,
        left: &Expr,
        right: &Expr,
        op: impl Fn(f64, f64) -> Value,
    ) -> Result<Value, RuntimeError> {
        let left = self.eval(module, scope, left)?.as_float()?;
        let right = self.eval(module, scope, right)?.as_float()?;
        Ok(op(left, right))
    }
}

/// Rebind a fiber worker's captured names into a fresh scope holding
/// deep copies, so the fiber never observes parent mutation after
/// `start`. Wrapped module functions capture nothing and pass through.
fn isolate_worker(worker: Value) -> Value {
    let Value::TreeClosure(closure) = &worker else {
        return worker;
    };
    if closure.function_name.is_some() {
        return worker;
    }
    let env = Scope::root();
    for name in &closure.captures {
        if let Some(value) = closure.env.get(name) {
            env.define(name, value.deep_copy());
        }
    }
    Value::TreeClosure(Rc::new(TreeClosure {
        params: closure.params.clone(),
        body: closure.body.clone(),
        env,
        captures: closure.captures.clone(),
        function_name: None,
    }))
}

