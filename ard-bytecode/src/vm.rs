// The stack VM. Each call runs a frame with its own value stack and
// local slots; calls recurse through `run_function`. Programs are
// expected to have passed the verifier; representation mismatches
// surface as internal invariant errors.

use crate::opcode::Op;
use crate::program::{Constant, Program};
use ard_checker::types::EnumType;
use ard_runtime::{
    builtin_method_call, call_builtin_package, map_key_to_value, value_key, FiberState,
    FlatClosure, RuntimeError, Value,
};
use indexmap::IndexMap;
use log::debug;
use std::cell::RefCell;
use std::collections::HashMap;
use std::io::Write;
use std::rc::Rc;

/// Parsed form of a type-table entry.
#[derive(Debug, Clone)]
enum TypeShape {
    Struct { name: String, fields: Vec<String> },
    Enum(Rc<EnumType>),
    Plain(String),
}

pub struct Vm<'o> {
    program: Rc<Program>,
    shapes: Vec<TypeShape>,
    functions_by_name: HashMap<String, usize>,
    /// Module-level globals, stored by the entry function's top-level
    /// code.
    globals: Vec<Value>,
    out: &'o mut dyn Write,
}

/// Load a program and run `entry` against stdout.
pub fn run(program: &Program, entry: &str) -> Result<Value, RuntimeError> {
    let mut stdout = std::io::stdout();
    run_with_output(program, entry, &mut stdout)
}

pub fn run_with_output(
    program: &Program,
    entry: &str,
    out: &mut dyn Write,
) -> Result<Value, RuntimeError> {
    let mut vm = Vm::new(program, out);
    vm.run(entry)
}

impl<'o> Vm<'o> {
    pub fn new(program: &Program, out: &'o mut dyn Write) -> Self {
        let shapes = program.types.iter().map(|entry| parse_shape(&entry.name)).collect();
        let mut functions_by_name = HashMap::new();
        for (index, function) in program.functions.iter().enumerate() {
            functions_by_name
                .entry(function.name.clone())
                .or_insert(index);
        }
        Self {
            program: Rc::new(program.clone()),
            shapes,
            functions_by_name,
            globals: Vec::new(),
            out,
        }
    }

    pub fn run(&mut self, entry: &str) -> Result<Value, RuntimeError> {
        let index = self
            .functions_by_name
            .get(entry)
            .copied()
            .ok_or_else(|| RuntimeError::internal(format!("no function '{}'", entry)))?;
        debug!("vm entry '{}' at function {}", entry, index);
        self.run_function(index, Vec::new())
    }

    fn run_function(&mut self, index: usize, args: Vec<Value>) -> Result<Value, RuntimeError> {
        let program = self.program.clone();
        let function = program
            .functions
            .get(index)
            .ok_or_else(|| RuntimeError::internal("function index out of range"))?;

        let mut locals = vec![Value::Void; function.locals.max(function.arity) as usize];
        for (slot, arg) in locals.iter_mut().zip(args) {
            *slot = arg;
        }
        let mut stack: Vec<Value> = Vec::with_capacity(function.max_stack as usize);
        let mut ip = 0usize;

        macro_rules! pop {
            () => {
                stack
                    .pop()
                    .ok_or_else(|| RuntimeError::internal("stack underflow"))?
            };
        }

        while let Some(instruction) = function.code.get(ip) {
            let (op, a, b, imm) = (instruction.op, instruction.a, instruction.b, instruction.imm);
            ip += 1;
            match op {
                Op::Const => {
                    let constant = program
                        .constants
                        .get(a as usize)
                        .ok_or_else(|| RuntimeError::internal("constant out of range"))?;
                    stack.push(constant_value(constant));
                }
                Op::ConstInt => stack.push(Value::Int(imm)),
                Op::ConstFloat => match program.constants.get(a as usize) {
                    Some(Constant::Float(f)) => stack.push(Value::Float(*f)),
                    _ => return Err(RuntimeError::internal("bad float constant")),
                },
                Op::ConstStr => match program.constants.get(a as usize) {
                    Some(Constant::Str(s)) => stack.push(Value::Str(s.clone())),
                    _ => return Err(RuntimeError::internal("bad string constant")),
                },
                Op::ConstBool => stack.push(Value::Bool(imm != 0)),
                Op::ConstVoid | Op::MakeNone => stack.push(Value::Void),

                Op::LoadLocal => {
                    let value = locals
                        .get(a as usize)
                        .cloned()
                        .ok_or_else(|| RuntimeError::internal("local out of range"))?;
                    stack.push(value);
                }
                Op::StoreLocal => {
                    let value = pop!();
                    let slot = locals
                        .get_mut(a as usize)
                        .ok_or_else(|| RuntimeError::internal("local out of range"))?;
                    *slot = value;
                }
                Op::Pop => {
                    pop!();
                }

                Op::Add => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(match a {
                        0 => Value::Int(left.as_int()?.wrapping_add(right.as_int()?)),
                        1 => Value::Float(left.as_float()? + right.as_float()?),
                        _ => Value::Str(format!("{}{}", left.as_str()?, right.as_str()?)),
                    });
                }
                Op::Sub => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(match a {
                        0 => Value::Int(left.as_int()?.wrapping_sub(right.as_int()?)),
                        _ => Value::Float(left.as_float()? - right.as_float()?),
                    });
                }
                Op::Mul => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(match a {
                        0 => Value::Int(left.as_int()?.wrapping_mul(right.as_int()?)),
                        _ => Value::Float(left.as_float()? * right.as_float()?),
                    });
                }
                Op::Div => {
                    let right = pop!();
                    let left = pop!();
                    stack.push(match a {
                        0 => {
                            let divisor = right.as_int()?;
                            if divisor == 0 {
                                return Err(RuntimeError::fault("division by zero"));
                            }
                            Value::Int(left.as_int()?.wrapping_div(divisor))
                        }
                        _ => Value::Float(left.as_float()? / right.as_float()?),
                    });
                }
                Op::Mod => {
                    let right = pop!().as_int()?;
                    let left = pop!().as_int()?;
                    if right == 0 {
                        return Err(RuntimeError::fault("modulo by zero"));
                    }
                    stack.push(Value::Int(left.wrapping_rem(right)));
                }
                Op::Neg => {
                    let value = pop!();
                    stack.push(match a {
                        0 => Value::Int(value.as_int()?.wrapping_neg()),
                        _ => Value::Float(-value.as_float()?),
                    });
                }
                Op::Not => {
                    let value = pop!().as_bool()?;
                    stack.push(Value::Bool(!value));
                }

                Op::Eq | Op::Neq => {
                    let right = pop!();
                    let left = pop!();
                    let equal = left == right;
                    stack.push(Value::Bool(if op == Op::Eq { equal } else { !equal }));
                }
                Op::Lt | Op::Lte | Op::Gt | Op::Gte => {
                    let right = pop!();
                    let left = pop!();
                    let ordering = if a == 0 {
                        left.as_int()?.cmp(&right.as_int()?)
                    } else {
                        left.as_float()?
                            .partial_cmp(&right.as_float()?)
                            .unwrap_or(std::cmp::Ordering::Equal)
                    };
                    let result = match op {
                        Op::Lt => ordering.is_lt(),
                        Op::Lte => ordering.is_le(),
                        Op::Gt => ordering.is_gt(),
                        _ => ordering.is_ge(),
                    };
                    stack.push(Value::Bool(result));
                }

                Op::Jump => ip = a as usize,
                Op::JumpIfFalse => {
                    if !pop!().as_bool()? {
                        ip = a as usize;
                    }
                }
                Op::JumpIfTrue => {
                    if pop!().as_bool()? {
                        ip = a as usize;
                    }
                }

                Op::Call => {
                    let args = pop_n(&mut stack, b as usize)?;
                    let result = self.run_function(a as usize, args)?;
                    stack.push(result);
                }
                Op::CallExtern => {
                    let binding = program
                        .str_constant(a)
                        .unwrap_or("<unknown>")
                        .to_string();
                    return Err(RuntimeError::ExternUnavailable(binding));
                }
                Op::CallModule => {
                    let target = program
                        .str_constant(a)
                        .ok_or_else(|| RuntimeError::internal("bad module target"))?
                        .to_string();
                    let args = pop_n(&mut stack, b as usize)?;
                    let (path, name) = target
                        .rsplit_once("::")
                        .ok_or_else(|| RuntimeError::internal("bad module target"))?;
                    let result = call_builtin_package(path, name, &args, self.out)?;
                    stack.push(result);
                }
                Op::CallClosure => {
                    let args = pop_n(&mut stack, b as usize)?;
                    let callee = pop!();
                    let result = self.call_closure_value(callee, args)?;
                    stack.push(result);
                }
                Op::CallMethod => {
                    let raw = program
                        .str_constant(a)
                        .ok_or_else(|| RuntimeError::internal("bad method name"))?
                        .to_string();
                    let args = pop_n(&mut stack, b as usize)?;
                    let receiver = pop!();
                    let result = self.call_method(&raw, receiver, args)?;
                    stack.push(result);
                }

                Op::MakeList => {
                    let items = pop_n(&mut stack, a as usize)?;
                    stack.push(Value::list(items));
                }
                Op::MakeMap => {
                    let flat = pop_n(&mut stack, (a * 2) as usize)?;
                    let mut map = IndexMap::new();
                    for pair in flat.chunks(2) {
                        if let [key, value] = pair {
                            map.insert(value_key(key), value.clone());
                        }
                    }
                    stack.push(Value::map(map));
                }
                Op::MakeStruct => {
                    let values = pop_n(&mut stack, b as usize)?;
                    let TypeShape::Struct { name, fields } = self.shape(a)? else {
                        return Err(RuntimeError::internal("MakeStruct on a non-struct entry"));
                    };
                    let mut map = IndexMap::new();
                    for (field, value) in fields.iter().zip(values) {
                        map.insert(field.clone(), value);
                    }
                    stack.push(Value::structure(&name, map));
                }
                Op::MakeEnum => {
                    let TypeShape::Enum(def) = self.shape(a)? else {
                        return Err(RuntimeError::internal("MakeEnum on a non-enum entry"));
                    };
                    stack.push(Value::Enum {
                        def,
                        variant: imm as u8,
                    });
                }
                Op::MakeClosure => {
                    let captures = pop_n(&mut stack, b as usize)?;
                    stack.push(Value::FlatClosure(Rc::new(FlatClosure {
                        function: a as usize,
                        captures,
                    })));
                }
                Op::MakeResult => {
                    let inner = pop!();
                    stack.push(if imm != 0 {
                        Value::ok(inner)
                    } else {
                        Value::err(inner)
                    });
                }

                Op::GetField => {
                    let name = program
                        .str_constant(a)
                        .ok_or_else(|| RuntimeError::internal("bad field name"))?;
                    let object = pop!();
                    let value = match &object {
                        Value::Struct { fields, .. } => {
                            fields.borrow().get(name).cloned().ok_or_else(|| {
                                RuntimeError::internal(format!("missing field '{}'", name))
                            })?
                        }
                        Value::Map(entries) => {
                            entries.borrow().get(name).cloned().unwrap_or(Value::Void)
                        }
                        other => {
                            return Err(RuntimeError::internal(format!(
                                "field access on a {}",
                                other.kind_name()
                            )))
                        }
                    };
                    stack.push(value);
                }
                Op::SetField => {
                    let name = program
                        .str_constant(a)
                        .ok_or_else(|| RuntimeError::internal("bad field name"))?;
                    let value = pop!();
                    let object = pop!();
                    match object {
                        Value::Struct { fields, .. } => {
                            fields.borrow_mut().insert(name.to_string(), value);
                        }
                        other => {
                            return Err(RuntimeError::internal(format!(
                                "field assignment on a {}",
                                other.kind_name()
                            )))
                        }
                    }
                }

                Op::MatchBool => {
                    if !pop!().as_bool()? {
                        ip = a as usize;
                    }
                }
                Op::MatchInt => {
                    if pop!().as_int()? != imm {
                        ip = a as usize;
                    }
                }
                Op::MatchEnum => {
                    let Value::Enum { variant, .. } = pop!() else {
                        return Err(RuntimeError::internal("MatchEnum on a non-enum"));
                    };
                    if i64::from(variant) != imm {
                        ip = a as usize;
                    }
                }
                Op::MatchUnion => {
                    let subject = pop!();
                    let shape = self.shape(b)?;
                    if !shape_matches(&shape, &subject) {
                        ip = a as usize;
                    }
                }
                Op::MatchMaybe => {
                    let subject = pop!();
                    match subject {
                        Value::Void => ip = a as usize,
                        value => stack.push(value),
                    }
                }
                Op::MatchResult => {
                    let Value::Result { ok, inner } = pop!() else {
                        return Err(RuntimeError::internal("MatchResult on a non-result"));
                    };
                    stack.push(*inner);
                    if ok != (imm != 0) {
                        ip = a as usize;
                    }
                }

                Op::TryResult => {
                    let Value::Result { ok, inner } = pop!() else {
                        return Err(RuntimeError::internal("try on a non-result"));
                    };
                    if ok {
                        stack.push(*inner);
                    } else if a != 0 {
                        stack.push(*inner);
                        ip = a as usize;
                    } else {
                        // No catch: the whole Result becomes this
                        // frame's return value.
                        return Ok(Value::Result { ok, inner });
                    }
                }
                Op::TryMaybe => {
                    let subject = pop!();
                    match subject {
                        Value::Void => ip = a as usize,
                        value => stack.push(value),
                    }
                }

                Op::AsyncStart => {
                    let worker = pop!();
                    // The worker's captured values are deep copied at
                    // start; parent mutation after this point is
                    // invisible to the fiber.
                    let worker = match worker {
                        Value::FlatClosure(closure) => {
                            Value::FlatClosure(Rc::new(FlatClosure {
                                function: closure.function,
                                captures: closure
                                    .captures
                                    .iter()
                                    .map(Value::deep_copy)
                                    .collect(),
                            }))
                        }
                        other => other,
                    };
                    stack.push(Value::Fiber(Rc::new(RefCell::new(FiberState::new(worker)))));
                }
                Op::AsyncEval => {
                    let Value::Fiber(state) = pop!() else {
                        return Err(RuntimeError::internal("AsyncEval on a non-fiber"));
                    };
                    let worker = state.borrow_mut().worker.take();
                    if let Some(worker) = worker {
                        self.call_closure_value(worker, Vec::new())?;
                        state.borrow_mut().completed = true;
                    }
                    stack.push(Value::Void);
                }

                Op::Return => {
                    return Ok(pop!());
                }
                Op::Panic => {
                    let message = pop!().to_string();
                    return Err(RuntimeError::fault(message));
                }

                Op::ToStr => {
                    let value = pop!();
                    stack.push(Value::Str(value.to_string()));
                }
                Op::DeepCopy => {
                    let value = pop!();
                    stack.push(value.deep_copy());
                }
                Op::UnwrapMaybe => {
                    let value = pop!();
                    match value {
                        Value::Void => {
                            return Err(RuntimeError::internal("unwrap of an empty Maybe"))
                        }
                        value => stack.push(value),
                    }
                }
                Op::LoadGlobal => {
                    let value = self
                        .globals
                        .get(a as usize)
                        .cloned()
                        .ok_or_else(|| RuntimeError::internal("global read before store"))?;
                    stack.push(value);
                }
                Op::StoreGlobal => {
                    let value = pop!();
                    let index = a as usize;
                    if self.globals.len() <= index {
                        self.globals.resize(index + 1, Value::Void);
                    }
                    self.globals[index] = value;
                }
                Op::MapKeys => {
                    let Value::Map(entries) = pop!() else {
                        return Err(RuntimeError::internal("MapKeys on a non-map"));
                    };
                    let shape = self.shape(b)?;
                    let key_type = match &shape {
                        TypeShape::Plain(name) => plain_type(name),
                        _ => ard_checker::types::Type::Str,
                    };
                    let keys: Vec<Value> = entries
                        .borrow()
                        .keys()
                        .map(|k| map_key_to_value(k, &key_type))
                        .collect();
                    stack.push(Value::list(keys));
                }
            }
        }

        // Fell off the end without Return.
        Err(RuntimeError::internal("function ended without return"))
    }

    fn shape(&self, index: u32) -> Result<TypeShape, RuntimeError> {
        self.shapes
            .get(index as usize)
            .cloned()
            .ok_or_else(|| RuntimeError::internal("type entry out of range"))
    }

    fn call_closure_value(
        &mut self,
        callee: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let Value::FlatClosure(closure) = callee else {
            return Err(RuntimeError::internal(format!(
                "cannot call a {}",
                callee.kind_name()
            )));
        };
        let mut locals = args;
        locals.extend(closure.captures.iter().cloned());
        self.run_function(closure.function, locals)
    }

    /// Method dispatch: a compiled `Type.method` function when the
    /// receiver is a struct or enum, builtin methods otherwise. A
    /// trailing `!` marks a mutating method (shared receiver).
    fn call_method(
        &mut self,
        raw_name: &str,
        receiver: Value,
        args: Vec<Value>,
    ) -> Result<Value, RuntimeError> {
        let mutates = raw_name.ends_with('!');
        let method = raw_name.trim_end_matches('!');

        let type_name = match &receiver {
            Value::Struct { name, .. } => Some(name.to_string()),
            Value::Enum { def, .. } => Some(def.name.clone()),
            _ => None,
        };
        if let Some(type_name) = type_name {
            let qualified = format!("{}.{}{}", type_name, method, if mutates { "!" } else { "" });
            if let Some(&index) = self.functions_by_name.get(&qualified) {
                // Non-mut methods observe a deep copy of the receiver.
                let bound = if mutates { receiver } else { receiver.deep_copy() };
                let mut locals = vec![bound];
                locals.extend(args);
                return self.run_function(index, locals);
            }
            return Err(RuntimeError::internal(format!(
                "{} has no method '{}'",
                type_name, method
            )));
        }

        builtin_method_call(&receiver, method, &args)
    }
}

fn pop_n(stack: &mut Vec<Value>, n: usize) -> Result<Vec<Value>, RuntimeError> {
    if stack.len() < n {
        return Err(RuntimeError::internal("stack underflow"));
    }
    Ok(stack.split_off(stack.len() - n))
}

fn constant_value(constant: &Constant) -> Value {
    match constant {
        Constant::Int(i) => Value::Int(*i),
        Constant::Float(f) => Value::Float(*f),
        Constant::Str(s) => Value::Str(s.clone()),
        Constant::Bool(b) => Value::Bool(*b),
    }
}

fn parse_shape(name: &str) -> TypeShape {
    if let Some((type_name, rest)) = name.split_once('{') {
        let fields = rest
            .trim_end_matches('}')
            .split(',')
            .filter(|f| !f.is_empty())
            .map(|f| f.to_string())
            .collect();
        return TypeShape::Struct {
            name: type_name.to_string(),
            fields,
        };
    }
    if let Some((enum_name, variants)) = name.split_once('=') {
        return TypeShape::Enum(Rc::new(EnumType {
            name: enum_name.to_string(),
            variants: variants.split('|').map(|v| v.to_string()).collect(),
            private: false,
        }));
    }
    TypeShape::Plain(name.to_string())
}

fn plain_type(name: &str) -> ard_checker::types::Type {
    use ard_checker::types::Type;
    match name {
        "Int" => Type::Int,
        "Float" => Type::Float,
        "Bool" => Type::Bool,
        _ => Type::Str,
    }
}

fn shape_matches(shape: &TypeShape, value: &Value) -> bool {
    match shape {
        TypeShape::Struct { name, .. } => {
            matches!(value, Value::Struct { name: vname, .. } if **vname == **name)
        }
        TypeShape::Enum(def) => {
            matches!(value, Value::Enum { def: vdef, .. } if vdef.name == def.name)
        }
        TypeShape::Plain(name) => match name.as_str() {
            "Int" => matches!(value, Value::Int(_)),
            "Float" => matches!(value, Value::Float(_)),
            "Str" => matches!(value, Value::Str(_)),
            "Bool" => matches!(value, Value::Bool(_)),
            "Void" => matches!(value, Value::Void),
            "Fiber" => matches!(value, Value::Fiber(_)),
            "Dynamic" => true,
            other => {
                if other.starts_with('[') {
                    if other.contains(':') {
                        matches!(value, Value::Map(_))
                    } else {
                        matches!(value, Value::List(_))
                    }
                } else {
                    false
                }
            }
        },
    }
}
