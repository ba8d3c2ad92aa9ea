// Conservative bytecode verifier: rejects out-of-range jumps and
// references, stack underflow on any reachable path, arity mismatches
// on direct calls, and depth exceeding the declared max_stack. Runs a
// worklist over each function's control-flow graph with an abstract
// stack depth per instruction.

use crate::opcode::Op;
use crate::program::{Function, Program};
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum VerifyError {
    #[error("function {function} ip {ip}: jump target {target} out of range")]
    JumpOutOfRange {
        function: String,
        ip: usize,
        target: u32,
    },
    #[error("function {function} ip {ip}: stack underflow")]
    StackUnderflow { function: String, ip: usize },
    #[error("function {function} ip {ip}: depth {depth} exceeds declared max_stack {max}")]
    MaxStackExceeded {
        function: String,
        ip: usize,
        depth: u32,
        max: u32,
    },
    #[error("function {function} ip {ip}: call target {target} out of range")]
    BadFunctionRef {
        function: String,
        ip: usize,
        target: u32,
    },
    #[error("function {function} ip {ip}: call passes {supplied} args, callee takes {expected}")]
    ArityMismatch {
        function: String,
        ip: usize,
        supplied: u32,
        expected: u32,
    },
    #[error("function {function} ip {ip}: closure layout is inconsistent")]
    BadClosure { function: String, ip: usize },
    #[error("function {function} ip {ip}: constant {index} out of range")]
    BadConstant {
        function: String,
        ip: usize,
        index: u32,
    },
    #[error("function {function} ip {ip}: type entry {index} out of range")]
    BadTypeEntry {
        function: String,
        ip: usize,
        index: u32,
    },
    #[error("function {function} ip {ip}: local {index} out of range")]
    BadLocal {
        function: String,
        ip: usize,
        index: u32,
    },
    #[error("function {function} ip {ip}: inconsistent stack depth across paths")]
    InconsistentDepth { function: String, ip: usize },
}

pub fn verify(program: &Program) -> Result<(), VerifyError> {
    for function in &program.functions {
        verify_function(program, function)?;
    }
    Ok(())
}

fn verify_function(program: &Program, function: &Function) -> Result<(), VerifyError> {
    let name = &function.name;
    let code_len = function.code.len();

    // Structural checks first.
    for (ip, instruction) in function.code.iter().enumerate() {
        let op = instruction.op;
        if let Some(target) = op.jump_target(instruction.a) {
            if target as usize >= code_len {
                return Err(VerifyError::JumpOutOfRange {
                    function: name.clone(),
                    ip,
                    target,
                });
            }
        }
        match op {
            Op::LoadLocal | Op::StoreLocal => {
                if instruction.a >= function.locals {
                    return Err(VerifyError::BadLocal {
                        function: name.clone(),
                        ip,
                        index: instruction.a,
                    });
                }
            }
            Op::Const | Op::ConstFloat | Op::ConstStr | Op::CallExtern | Op::CallModule
            | Op::CallMethod | Op::GetField | Op::SetField => {
                if instruction.a >= program.constants.len() as u32 {
                    return Err(VerifyError::BadConstant {
                        function: name.clone(),
                        ip,
                        index: instruction.a,
                    });
                }
            }
            Op::MakeStruct | Op::MakeEnum => {
                if instruction.a >= program.types.len() as u32 {
                    return Err(VerifyError::BadTypeEntry {
                        function: name.clone(),
                        ip,
                        index: instruction.a,
                    });
                }
            }
            Op::MatchUnion | Op::MapKeys => {
                if instruction.b >= program.types.len() as u32 {
                    return Err(VerifyError::BadTypeEntry {
                        function: name.clone(),
                        ip,
                        index: instruction.b,
                    });
                }
            }
            Op::Call => {
                let Some(callee) = program.functions.get(instruction.a as usize) else {
                    return Err(VerifyError::BadFunctionRef {
                        function: name.clone(),
                        ip,
                        target: instruction.a,
                    });
                };
                if callee.arity != instruction.b {
                    return Err(VerifyError::ArityMismatch {
                        function: name.clone(),
                        ip,
                        supplied: instruction.b,
                        expected: callee.arity,
                    });
                }
            }
            Op::MakeClosure => {
                let Some(callee) = program.functions.get(instruction.a as usize) else {
                    return Err(VerifyError::BadFunctionRef {
                        function: name.clone(),
                        ip,
                        target: instruction.a,
                    });
                };
                // Captures land after the arguments in the callee's
                // local table.
                if callee.arity + instruction.b > callee.locals.max(callee.arity) {
                    return Err(VerifyError::BadClosure {
                        function: name.clone(),
                        ip,
                    });
                }
            }
            _ => {}
        }
    }

    // Abstract depth per reachable instruction.
    let mut depths: Vec<Option<u32>> = vec![None; code_len];
    let mut worklist: Vec<(usize, u32)> = vec![(0, 0)];

    while let Some((ip, depth)) = worklist.pop() {
        if ip >= code_len {
            continue;
        }
        match depths[ip] {
            Some(recorded) if recorded == depth => continue,
            Some(_) => {
                return Err(VerifyError::InconsistentDepth {
                    function: name.clone(),
                    ip,
                })
            }
            None => depths[ip] = Some(depth),
        }

        let instruction = &function.code[ip];
        let op = instruction.op;

        // OpReturn and OpPanic clear their single required pop.
        let (pops, pushes) = op.effect(instruction.a, instruction.b);
        if depth < pops {
            return Err(VerifyError::StackUnderflow {
                function: name.clone(),
                ip,
            });
        }
        let after = depth - pops + pushes;
        if after > function.max_stack {
            return Err(VerifyError::MaxStackExceeded {
                function: name.clone(),
                ip,
                depth: after,
                max: function.max_stack,
            });
        }

        if op.falls_through() {
            worklist.push((ip + 1, after));
        }
        if let Some(target) = op.jump_target(instruction.a) {
            let (jpops, jpushes) = op.jump_effect(instruction.a, instruction.b);
            if depth < jpops {
                return Err(VerifyError::StackUnderflow {
                    function: name.clone(),
                    ip,
                });
            }
            let jump_after = depth - jpops + jpushes;
            if op == Op::Jump {
                worklist.push((target as usize, after));
            } else {
                worklist.push((target as usize, jump_after));
            }
        }
    }

    Ok(())
}
