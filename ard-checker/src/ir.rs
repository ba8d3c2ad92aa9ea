// The typed intermediate representation. Every node's runtime type is
// known; operators are specialized by operand type so the execution
// engines dispatch on kind with no runtime type queries.

use crate::types::{EnumType, FunctionType, StructType, Type};
use indexmap::IndexMap;
use std::rc::Rc;

/// A checked module: top-level program, callable tables, and the
/// public symbol table imported modules are queried through.
#[derive(Debug)]
pub struct Module {
    pub path: String,
    /// Top-level statements in source order.
    pub program: Vec<Expr>,
    /// Module-level symbols: name -> (type, public).
    pub symbols: IndexMap<String, Symbol>,
    /// Top-level functions by name.
    pub functions: IndexMap<String, Rc<Function>>,
    /// Instance methods keyed by type name (struct methods and trait
    /// implementations).
    pub methods: IndexMap<String, IndexMap<String, Rc<Function>>>,
    /// Static functions keyed by type name.
    pub statics: IndexMap<String, IndexMap<String, Rc<Function>>>,
    /// Enum definitions for variant construction at runtime.
    pub enums: IndexMap<String, Rc<EnumType>>,
    /// Struct definitions, queried by importing checkers.
    pub structs: IndexMap<String, Rc<StructType>>,
    /// Checked imports: alias -> module. Builtin packages are not
    /// listed here; they dispatch through the runtime registry.
    pub imports: IndexMap<String, Rc<Module>>,
    /// Extern bindings: function name -> host symbol.
    pub externs: IndexMap<String, ExternFunction>,
}

#[derive(Debug, Clone)]
pub struct Symbol {
    pub ty: Type,
    pub public: bool,
}

#[derive(Debug)]
pub struct Function {
    pub signature: Rc<FunctionType>,
    pub body: Block,
}

#[derive(Debug, Clone)]
pub struct ExternFunction {
    pub signature: Rc<FunctionType>,
    pub binding: String,
}

/// A sequence of expressions; its value and type are the last entry's
/// (Void when empty).
#[derive(Debug, Clone, Default)]
pub struct Block {
    pub exprs: Vec<Expr>,
}

impl Block {
    pub fn ty(&self) -> Type {
        self.exprs.last().map(|e| e.ty()).unwrap_or(Type::Void)
    }
}

#[derive(Debug, Clone)]
pub enum StrSegment {
    Literal(String),
    Expr(Expr),
}

/// Assignment targets after resolution.
#[derive(Debug, Clone)]
pub enum AssignTarget {
    Variable { name: String, ty: Type },
    Field {
        object: Box<Expr>,
        field: String,
        ty: Type,
    },
}

impl AssignTarget {
    pub fn ty(&self) -> Type {
        match self {
            AssignTarget::Variable { ty, .. } => ty.clone(),
            AssignTarget::Field { ty, .. } => ty.clone(),
        }
    }
}

#[derive(Debug, Clone)]
pub enum Expr {
    // ---- Literals ----
    Int(i64),
    Float(f64),
    Bool(bool),
    Void,
    Str(String),
    InterpolatedStr(Vec<StrSegment>),
    ListLiteral {
        items: Vec<Expr>,
        item_type: Type,
    },
    MapLiteral {
        entries: Vec<(Expr, Expr)>,
        key_type: Type,
        value_type: Type,
    },

    // ---- Bindings and names ----
    VariableDef {
        name: String,
        value: Box<Expr>,
    },
    Reassignment {
        target: AssignTarget,
        value: Box<Expr>,
    },
    Variable {
        name: String,
        ty: Type,
    },
    /// Deep copy at bind time; wraps the value of every immutable
    /// aggregate binding and argument.
    CopyExpression(Box<Expr>),
    /// Hoisting sequence introduced by lowering (chained comparisons);
    /// evaluates in order, value is the last expression.
    Sequence(Block),

    // ---- Control ----
    If {
        condition: Box<Expr>,
        then_block: Block,
        else_block: Option<Block>,
        ty: Type,
    },
    WhileLoop {
        condition: Option<Box<Expr>>,
        body: Block,
    },
    ForIntRange {
        cursor: String,
        start: Box<Expr>,
        end: Box<Expr>,
        body: Block,
    },
    ForInStr {
        cursor: String,
        index: Option<String>,
        subject: Box<Expr>,
        body: Block,
    },
    ForInList {
        cursor: String,
        index: Option<String>,
        subject: Box<Expr>,
        item_type: Type,
        body: Block,
    },
    ForInMap {
        key_cursor: String,
        value_cursor: Option<String>,
        subject: Box<Expr>,
        key_type: Type,
        value_type: Type,
        body: Block,
    },
    ForLoop {
        init: Box<Expr>,
        condition: Box<Expr>,
        step: Box<Expr>,
        body: Block,
    },
    Break,

    // ---- Aggregates ----
    StructInstance {
        def: Rc<StructType>,
        fields: Vec<(String, Expr)>,
    },
    InstanceProperty {
        receiver: Box<Expr>,
        field: String,
        ty: Type,
    },
    InstanceMethod {
        receiver: Box<Expr>,
        receiver_type: Type,
        method: String,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    EnumVariant {
        def: Rc<EnumType>,
        index: u8,
    },
    /// `Maybe::some(e)` wrap.
    MaybeSome(Box<Expr>),
    MaybeNone {
        inner: Type,
    },
    /// `Result::ok(e)` / `Result::err(e)` construction; the missing
    /// side's type comes from the expected type at the use site.
    ResultOk {
        inner: Box<Expr>,
        err_type: Type,
    },
    ResultErr {
        inner: Box<Expr>,
        ok_type: Type,
    },

    // ---- Calls ----
    FunctionCall {
        name: String,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    ModuleFunctionCall {
        module: String,
        function: String,
        builtin: bool,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    ModuleStaticFunctionCall {
        module: String,
        target: String,
        function: String,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    StaticFunctionCall {
        target: String,
        function: String,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    ExternCall {
        name: String,
        binding: String,
        args: Vec<Expr>,
        signature: Rc<FunctionType>,
    },
    Closure {
        params: Vec<ClosureParam>,
        return_type: Type,
        body: Rc<Block>,
        /// Free variables captured from the defining scope, for the
        /// bytecode emitter.
        captures: Vec<(String, Type)>,
    },

    // ---- Matching ----
    BoolMatch {
        subject: Box<Expr>,
        true_block: Block,
        false_block: Block,
        ty: Type,
    },
    IntMatch {
        subject: Box<Expr>,
        int_cases: Vec<(i64, Block)>,
        range_cases: Vec<(i64, i64, Block)>,
        catch_all: Option<Block>,
        ty: Type,
    },
    EnumMatch {
        subject: Box<Expr>,
        def: Rc<EnumType>,
        /// Indexed by variant order; `None` falls to the catch-all.
        arms: Vec<Option<Block>>,
        catch_all: Option<Block>,
        ty: Type,
    },
    OptionMatch {
        subject: Box<Expr>,
        some_binding: String,
        some_block: Block,
        none_block: Block,
        ty: Type,
    },
    ResultMatch {
        subject: Box<Expr>,
        ok_binding: String,
        ok_block: Block,
        err_binding: String,
        err_block: Block,
        ty: Type,
    },
    UnionMatch {
        subject: Box<Expr>,
        /// The subject is bound as `it` at the narrowed type per arm.
        arms: Vec<(Type, Block)>,
        catch_all: Option<Block>,
        ty: Type,
    },
    TryOp {
        expression: Box<Expr>,
        catch_binding: Option<String>,
        catch_block: Option<Block>,
        ty: Type,
    },
    Panic {
        message: Box<Expr>,
        line: usize,
        column: usize,
    },

    // ---- Specialized arithmetic ----
    IntAddition(Box<Expr>, Box<Expr>),
    IntSubtraction(Box<Expr>, Box<Expr>),
    IntMultiplication(Box<Expr>, Box<Expr>),
    IntDivision(Box<Expr>, Box<Expr>),
    IntModulo(Box<Expr>, Box<Expr>),
    FloatAddition(Box<Expr>, Box<Expr>),
    FloatSubtraction(Box<Expr>, Box<Expr>),
    FloatMultiplication(Box<Expr>, Box<Expr>),
    FloatDivision(Box<Expr>, Box<Expr>),
    StrAddition(Box<Expr>, Box<Expr>),

    // ---- Specialized comparison ----
    IntLess(Box<Expr>, Box<Expr>),
    IntLessEqual(Box<Expr>, Box<Expr>),
    IntGreater(Box<Expr>, Box<Expr>),
    IntGreaterEqual(Box<Expr>, Box<Expr>),
    FloatLess(Box<Expr>, Box<Expr>),
    FloatLessEqual(Box<Expr>, Box<Expr>),
    FloatGreater(Box<Expr>, Box<Expr>),
    FloatGreaterEqual(Box<Expr>, Box<Expr>),

    // ---- Specialized equality (negated covers `!=`) ----
    IntEquality {
        negated: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    FloatEquality {
        negated: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    StrEquality {
        negated: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    BoolEquality {
        negated: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },
    EnumEquality {
        negated: bool,
        left: Box<Expr>,
        right: Box<Expr>,
    },

    // ---- Logic and unary ----
    And(Box<Expr>, Box<Expr>),
    Or(Box<Expr>, Box<Expr>),
    Not(Box<Expr>),
    IntNegation(Box<Expr>),
    FloatNegation(Box<Expr>),
}

#[derive(Debug, Clone)]
pub struct ClosureParam {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

impl Expr {
    /// The static type of this node. Total: every typed IR node has a
    /// computable type.
    pub fn ty(&self) -> Type {
        match self {
            Expr::Int(_) => Type::Int,
            Expr::Float(_) => Type::Float,
            Expr::Bool(_) => Type::Bool,
            Expr::Void => Type::Void,
            Expr::Str(_) | Expr::InterpolatedStr(_) => Type::Str,
            Expr::ListLiteral { item_type, .. } => Type::List(Box::new(item_type.clone())),
            Expr::MapLiteral {
                key_type,
                value_type,
                ..
            } => Type::Map(Box::new(key_type.clone()), Box::new(value_type.clone())),

            Expr::VariableDef { .. } | Expr::Reassignment { .. } => Type::Void,
            Expr::Variable { ty, .. } => ty.clone(),
            Expr::CopyExpression(inner) => inner.ty(),
            Expr::Sequence(block) => block.ty(),

            Expr::If { ty, .. } => ty.clone(),
            Expr::WhileLoop { .. }
            | Expr::ForIntRange { .. }
            | Expr::ForInStr { .. }
            | Expr::ForInList { .. }
            | Expr::ForInMap { .. }
            | Expr::ForLoop { .. }
            | Expr::Break => Type::Void,

            Expr::StructInstance { def, .. } => Type::Struct(def.clone()),
            Expr::InstanceProperty { ty, .. } => ty.clone(),
            Expr::InstanceMethod { signature, .. } => signature.return_type.clone(),
            Expr::EnumVariant { def, .. } => Type::Enum(def.clone()),
            Expr::MaybeSome(inner) => Type::Maybe(Box::new(inner.ty())),
            Expr::MaybeNone { inner } => Type::Maybe(Box::new(inner.clone())),
            Expr::ResultOk { inner, err_type } => {
                Type::Result(Box::new(inner.ty()), Box::new(err_type.clone()))
            }
            Expr::ResultErr { inner, ok_type } => {
                Type::Result(Box::new(ok_type.clone()), Box::new(inner.ty()))
            }

            Expr::FunctionCall { signature, .. }
            | Expr::ModuleFunctionCall { signature, .. }
            | Expr::ModuleStaticFunctionCall { signature, .. }
            | Expr::StaticFunctionCall { signature, .. }
            | Expr::ExternCall { signature, .. } => signature.return_type.clone(),
            Expr::Closure {
                params,
                return_type,
                ..
            } => Type::Function(Rc::new(FunctionType {
                name: String::new(),
                type_params: Vec::new(),
                params: params
                    .iter()
                    .map(|p| crate::types::ParamType {
                        name: p.name.clone(),
                        ty: p.ty.clone(),
                        mutable: p.mutable,
                    })
                    .collect(),
                return_type: return_type.clone(),
                mutates: false,
            })),

            Expr::BoolMatch { ty, .. }
            | Expr::IntMatch { ty, .. }
            | Expr::EnumMatch { ty, .. }
            | Expr::OptionMatch { ty, .. }
            | Expr::ResultMatch { ty, .. }
            | Expr::UnionMatch { ty, .. }
            | Expr::TryOp { ty, .. } => ty.clone(),
            Expr::Panic { .. } => Type::Void,

            Expr::IntAddition(..)
            | Expr::IntSubtraction(..)
            | Expr::IntMultiplication(..)
            | Expr::IntDivision(..)
            | Expr::IntModulo(..)
            | Expr::IntNegation(..) => Type::Int,
            Expr::FloatAddition(..)
            | Expr::FloatSubtraction(..)
            | Expr::FloatMultiplication(..)
            | Expr::FloatDivision(..)
            | Expr::FloatNegation(..) => Type::Float,
            Expr::StrAddition(..) => Type::Str,

            Expr::IntLess(..)
            | Expr::IntLessEqual(..)
            | Expr::IntGreater(..)
            | Expr::IntGreaterEqual(..)
            | Expr::FloatLess(..)
            | Expr::FloatLessEqual(..)
            | Expr::FloatGreater(..)
            | Expr::FloatGreaterEqual(..)
            | Expr::IntEquality { .. }
            | Expr::FloatEquality { .. }
            | Expr::StrEquality { .. }
            | Expr::BoolEquality { .. }
            | Expr::EnumEquality { .. }
            | Expr::And(..)
            | Expr::Or(..)
            | Expr::Not(..) => Type::Bool,
        }
    }
}
