// The instruction set. Every instruction is the fixed field tuple
// {op, a, b, imm}; unused fields are zero. Stack effects are declared
// here for the emitter's depth tracking and the verifier.

use thiserror::Error;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u8)]
pub enum Op {
    /// Push constant `a` from the table.
    Const = 0,
    /// Push the Int in `imm`.
    ConstInt = 1,
    ConstFloat = 2,
    ConstStr = 3,
    /// Push Bool from `imm` (0/1).
    ConstBool = 4,
    ConstVoid = 5,

    LoadLocal = 6,
    StoreLocal = 7,
    Pop = 8,

    /// Arithmetic; `a` picks the specialization (0 Int, 1 Float,
    /// 2 Str for Add).
    Add = 9,
    Sub = 10,
    Mul = 11,
    Div = 12,
    Mod = 13,
    Neg = 14,
    Not = 15,

    /// Comparisons; `a` is the kind (0 Int, 1 Float, 2 Str, 3 Bool,
    /// 4 Enum for Eq/Neq).
    Eq = 16,
    Neq = 17,
    Lt = 18,
    Lte = 19,
    Gt = 20,
    Gte = 21,

    Jump = 22,
    JumpIfFalse = 23,
    JumpIfTrue = 24,

    /// Direct call: function `a`, `b` args.
    Call = 25,
    /// Extern call: binding name in constant `a`, `b` args.
    CallExtern = 26,
    /// Builtin package call: "path::function" in constant `a`.
    CallModule = 27,
    /// Closure call: closure under `b` args.
    CallClosure = 28,
    /// Method call: name in constant `a`, receiver under `b` args.
    CallMethod = 29,

    MakeList = 30,
    MakeMap = 31,
    /// Struct from type entry `a`, `b` field values in definition
    /// order.
    MakeStruct = 32,
    /// Enum value: type entry `a`, variant `imm`.
    MakeEnum = 33,
    /// Push the Maybe sentinel.
    MakeNone = 34,
    /// Closure over function `a` with `b` captured values.
    MakeClosure = 35,
    /// Result from the top of stack; `imm` 1 = ok, 0 = err.
    MakeResult = 36,

    GetField = 37,
    SetField = 38,

    /// Pop subject; fall through on true, jump to `a` otherwise.
    MatchBool = 39,
    /// Pop subject; fall through when equal to `imm`, else jump `a`.
    MatchInt = 40,
    /// Pop subject; fall through when the variant is `imm`.
    MatchEnum = 41,
    /// Pop subject; fall through when it inhabits type entry `b`.
    MatchUnion = 42,
    /// Pop subject; on some push the inner value and fall through,
    /// on none jump to `a`.
    MatchMaybe = 43,
    /// Pop subject and push its inner value; fall through when the
    /// ok-ness equals `imm`, else jump to `a`.
    MatchResult = 44,

    /// Pop a Result; ok pushes the inner value and falls through.
    /// err: with `a` nonzero, push the error value and jump to `a`;
    /// with `a` zero, return the whole Result from the frame.
    TryResult = 45,
    /// Pop a Maybe; some pushes the value, none jumps to `a`.
    TryMaybe = 46,

    /// Pop a worker closure, push a Fiber.
    AsyncStart = 47,
    /// Pop a Fiber, run its worker to completion, push Void.
    AsyncEval = 48,

    Return = 49,
    Panic = 50,

    /// Pop any value, push its display string.
    ToStr = 51,
    /// Pop, push a structural deep copy.
    DeepCopy = 52,
    /// Pop a Maybe known non-empty, push the inner value.
    UnwrapMaybe = 53,
    /// Pop a Map, push its keys reconstructed at key type entry `b`.
    MapKeys = 54,
    /// Push module-level global `a`.
    LoadGlobal = 55,
    /// Pop into module-level global `a`.
    StoreGlobal = 56,
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown opcode {0}")]
pub struct UnknownOpcode(pub u8);

impl Op {
    pub fn from_u8(byte: u8) -> Result<Op, UnknownOpcode> {
        use Op::*;
        const TABLE: [Op; 57] = [
            Const, ConstInt, ConstFloat, ConstStr, ConstBool, ConstVoid, LoadLocal, StoreLocal,
            Pop, Add, Sub, Mul, Div, Mod, Neg, Not, Eq, Neq, Lt, Lte, Gt, Gte, Jump, JumpIfFalse,
            JumpIfTrue, Call, CallExtern, CallModule, CallClosure, CallMethod, MakeList, MakeMap,
            MakeStruct, MakeEnum, MakeNone, MakeClosure, MakeResult, GetField, SetField,
            MatchBool, MatchInt, MatchEnum, MatchUnion, MatchMaybe, MatchResult, TryResult,
            TryMaybe, AsyncStart, AsyncEval, Return, Panic, ToStr, DeepCopy, UnwrapMaybe, MapKeys,
            LoadGlobal, StoreGlobal,
        ];
        TABLE
            .get(byte as usize)
            .copied()
            .ok_or(UnknownOpcode(byte))
    }

    /// Stack effect on the fall-through path: (pops, pushes). Effects
    /// that depend on an immediate take the instruction's fields.
    pub fn effect(&self, a: u32, b: u32) -> (u32, u32) {
        use Op::*;
        match self {
            Const | ConstInt | ConstFloat | ConstStr | ConstBool | ConstVoid | LoadLocal
            | LoadGlobal | MakeNone => (0, 1),
            StoreLocal | StoreGlobal | Pop | JumpIfFalse | JumpIfTrue | Panic => (1, 0),
            Add | Sub | Mul | Div | Mod | Eq | Neq | Lt | Lte | Gt | Gte => (2, 1),
            Neg | Not | ToStr | DeepCopy | UnwrapMaybe | MakeResult | AsyncStart | AsyncEval
            | GetField => (1, 1),
            Jump => (0, 0),
            Call | CallExtern | CallModule => (b, 1),
            CallClosure | CallMethod => (b + 1, 1),
            MakeList => (a, 1),
            MakeMap => (a * 2, 1),
            MakeStruct => (b, 1),
            MakeEnum => (0, 1),
            MakeClosure => (b, 1),
            SetField => (2, 0),
            MatchBool | MatchInt | MatchEnum | MatchUnion => (1, 0),
            // Fall-through pushes the unwrapped value.
            MatchMaybe | MatchResult | TryResult | TryMaybe => (1, 1),
            Return => (1, 0),
            MapKeys => (1, 1),
        }
    }

    /// Stack effect on the jump path for conditional instructions.
    pub fn jump_effect(&self, a: u32, b: u32) -> (u32, u32) {
        use Op::*;
        match self {
            MatchMaybe | TryMaybe => (1, 0),
            // Both paths unwrap: the jump side carries the err value.
            MatchResult | TryResult => (1, 1),
            _ => self.effect(a, b),
        }
    }

    /// The target in `a` for jumping instructions, if any.
    pub fn jump_target(&self, a: u32) -> Option<u32> {
        use Op::*;
        match self {
            Jump | JumpIfFalse | JumpIfTrue | MatchBool | MatchInt | MatchEnum | MatchUnion
            | MatchMaybe | MatchResult | TryMaybe => Some(a),
            TryResult if a != 0 => Some(a),
            _ => None,
        }
    }

    /// Whether execution can continue at the next instruction.
    pub fn falls_through(&self) -> bool {
        !matches!(self, Op::Jump | Op::Return | Op::Panic)
    }
}
