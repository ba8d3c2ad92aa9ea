// Surface AST for the Ard language.
//
// Statements and expressions are tagged unions with a common
// `Location` header; position data lives beside the tag, not on each
// variant. The parser produces this tree, the checker consumes it.

use serde::{Deserialize, Serialize};
use std::fmt;

/// 1-based source position of a node's first token.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct Location {
    pub line: usize,
    pub column: usize,
}

impl Location {
    pub fn new(line: usize, column: usize) -> Self {
        Self { line, column }
    }
}

impl fmt::Display for Location {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}:{}", self.line, self.column)
    }
}

/// Root of a parsed file.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct Program {
    pub imports: Vec<UseDeclaration>,
    pub statements: Vec<Statement>,
}

/// Import: `use ard/io` or `use my-lib/http as web`. The default alias
/// is the last path segment with `-` rewritten to `_`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UseDeclaration {
    pub location: Location,
    pub path: String,
    pub alias: String,
}

impl UseDeclaration {
    pub fn default_alias(path: &str) -> String {
        path.rsplit('/')
            .next()
            .unwrap_or(path)
            .replace('-', "_")
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Statement {
    pub location: Location,
    pub kind: StatementKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StatementKind {
    // Declarations
    VariableDeclaration {
        name: String,
        mutable: bool,
        declared_type: Option<TypeExpr>,
        value: Expression,
    },
    FunctionDeclaration(FunctionDecl),
    /// `fn Point::new(...) { ... }`
    StaticFunctionDeclaration {
        target: String,
        function: FunctionDecl,
    },
    /// `extern fn now() Int = "host_now"`
    ExternalFunction {
        name: String,
        parameters: Vec<Parameter>,
        return_type: Option<TypeExpr>,
        binding: String,
    },
    StructDefinition {
        name: String,
        fields: Vec<FieldDecl>,
        private: bool,
        doc: Option<String>,
    },
    EnumDefinition {
        name: String,
        variants: Vec<String>,
        private: bool,
        doc: Option<String>,
    },
    TraitDefinition {
        name: String,
        methods: Vec<TraitMethodSig>,
        doc: Option<String>,
    },
    ImplBlock {
        target: String,
        methods: Vec<FunctionDecl>,
    },
    TraitImplementation {
        trait_name: String,
        for_type: String,
        methods: Vec<FunctionDecl>,
    },
    /// Union alias: `type Id = Int or Str`
    TypeDeclaration {
        name: String,
        alternatives: Vec<TypeExpr>,
        private: bool,
    },

    // Control
    WhileLoop {
        condition: Option<Expression>,
        body: Block,
    },
    /// `for i in 0..10 { ... }`
    RangeLoop {
        cursor: String,
        cursor2: Option<String>,
        start: Expression,
        end: Expression,
        body: Block,
    },
    /// `for x in xs` / `for x, i in xs`
    ForInLoop {
        cursor: String,
        cursor2: Option<String>,
        iterable: Expression,
        body: Block,
    },
    /// `for let i = 0; i < n; i =+ 1 { ... }`
    ForLoop {
        init: Box<Statement>,
        condition: Expression,
        step: Box<Statement>,
        body: Block,
    },
    Break,

    // Mutation
    Assignment {
        target: Expression,
        value: Expression,
    },
    /// `x =+ e` / `x =- e`
    CompoundAssignment {
        target: Expression,
        operator: CompoundOp,
        value: Expression,
    },

    Expression(Expression),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum CompoundOp {
    Increment,
    Decrement,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FunctionDecl {
    pub name: String,
    pub type_params: Vec<String>,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub body: Block,
    pub private: bool,
    /// `fn mut push_all(...)`: may mutate the receiver, callable only
    /// on `mut` bindings.
    pub mutates: bool,
    pub doc: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Parameter {
    pub location: Location,
    pub name: String,
    pub mutable: bool,
    pub declared_type: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FieldDecl {
    pub location: Location,
    pub name: String,
    pub declared_type: TypeExpr,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TraitMethodSig {
    pub location: Location,
    pub name: String,
    pub parameters: Vec<Parameter>,
    pub return_type: Option<TypeExpr>,
    pub mutates: bool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Block {
    pub location: Location,
    pub statements: Vec<Statement>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Expression {
    pub location: Location,
    pub kind: ExpressionKind,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ExpressionKind {
    IntLiteral(i64),
    FloatLiteral(f64),
    BoolLiteral(bool),
    /// String literal; interpolations sit between literal chunks.
    InterpolatedString(Vec<StrPart>),
    ListLiteral(Vec<Expression>),
    MapLiteral(Vec<(Expression, Expression)>),
    /// `start..end`, end-exclusive.
    RangeLiteral {
        start: Box<Expression>,
        end: Box<Expression>,
    },
    /// `Point { x: 1, y: 2 }`
    StructInstance {
        name: String,
        fields: Vec<(String, Expression)>,
    },

    Identifier(String),
    /// `@`: the receiver inside a method body.
    SelfRef,

    Unary {
        operator: UnaryOp,
        operand: Box<Expression>,
    },
    Binary {
        operator: BinaryOp,
        left: Box<Expression>,
        right: Box<Expression>,
    },
    /// `a < b <= c`: two or more comparison operators in sequence.
    ChainedComparison {
        operands: Vec<Expression>,
        operators: Vec<BinaryOp>,
    },

    FunctionCall {
        name: String,
        type_args: Vec<TypeExpr>,
        args: Vec<CallArg>,
    },
    InstanceProperty {
        receiver: Box<Expression>,
        property: String,
    },
    InstanceMethod {
        receiver: Box<Expression>,
        method: String,
        args: Vec<CallArg>,
    },
    /// `Target::symbol` (enum variant, module member, static value).
    StaticProperty {
        target: String,
        property: String,
    },
    /// `Target::fn(args)`.
    StaticFunction {
        target: String,
        function: String,
        type_args: Vec<TypeExpr>,
        args: Vec<CallArg>,
    },

    If {
        condition: Box<Expression>,
        body: Block,
        else_branch: Option<Box<ElseBranch>>,
    },
    MatchExpression {
        subject: Box<Expression>,
        cases: Vec<MatchCase>,
    },
    /// `match { cond => body, ... }`: subject-less form, desugars to
    /// a chained if.
    ConditionalMatchExpression {
        cases: Vec<ConditionalCase>,
    },
    /// `try EXPR`, `try EXPR -> err { ... }`.
    Try {
        expression: Box<Expression>,
        catch_name: Option<String>,
        catch_block: Option<Block>,
    },
    AnonymousFunction {
        parameters: Vec<Parameter>,
        return_type: Option<TypeExpr>,
        body: Block,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum BinaryOp {
    Add,
    Subtract,
    Multiply,
    Divide,
    Modulo,
    Equal,
    NotEqual,
    Less,
    LessEqual,
    Greater,
    GreaterEqual,
    And,
    Or,
}

impl BinaryOp {
    /// Orderings may chain (`a < b <= c`); equality may not.
    pub fn is_ordering(&self) -> bool {
        matches!(
            self,
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual
        )
    }

    pub fn is_comparison(&self) -> bool {
        self.is_ordering() || matches!(self, BinaryOp::Equal | BinaryOp::NotEqual)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum UnaryOp {
    Negate,
    Not,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum StrPart {
    Literal(String),
    Expr(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum ElseBranch {
    Block(Block),
    If(Expression),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CallArg {
    pub name: Option<String>,
    pub mutable: bool,
    pub value: Expression,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchCase {
    pub location: Location,
    pub pattern: Pattern,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConditionalCase {
    pub location: Location,
    /// `None` for the catch-all `_` arm.
    pub condition: Option<Expression>,
    pub body: Block,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum Pattern {
    Int(i64),
    /// `lo..hi`, end-exclusive.
    Range(i64, i64),
    Bool(bool),
    Str(String),
    /// `Color::red`, or bare `red` when the subject's enum is known.
    EnumVariant {
        enum_name: Option<String>,
        variant: String,
    },
    /// `some(x)`: binds the unwrapped value.
    Some(String),
    None,
    /// `ok(v)`.
    Ok(String),
    /// `err(e)`.
    Err(String),
    /// Union arm naming one alternative; the subject is bound as `it`.
    Type(TypeExpr),
    CatchAll,
}

/// Surface type syntax.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TypeExpr {
    /// `Int`, `Point`, `$T`.
    Named(String),
    /// `[T]`
    List(Box<TypeExpr>),
    /// `[K:V]`
    Map(Box<TypeExpr>, Box<TypeExpr>),
    /// `T?`
    Maybe(Box<TypeExpr>),
    /// `V!E`
    Result(Box<TypeExpr>, Box<TypeExpr>),
    /// `fn (T, U) R`
    Function {
        parameters: Vec<TypeExpr>,
        return_type: Box<TypeExpr>,
    },
}

impl fmt::Display for TypeExpr {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            TypeExpr::Named(name) => f.write_str(name),
            TypeExpr::List(item) => write!(f, "[{}]", item),
            TypeExpr::Map(key, value) => write!(f, "[{}:{}]", key, value),
            TypeExpr::Maybe(inner) => write!(f, "{}?", inner),
            TypeExpr::Result(ok, err) => write!(f, "{}!{}", ok, err),
            TypeExpr::Function {
                parameters,
                return_type,
            } => {
                f.write_str("fn (")?;
                for (i, p) in parameters.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p)?;
                }
                write!(f, ") {}", return_type)
            }
        }
    }
}

impl Expression {
    pub fn new(location: Location, kind: ExpressionKind) -> Self {
        Self { location, kind }
    }
}

impl Statement {
    pub fn new(location: Location, kind: StatementKind) -> Self {
        Self { location, kind }
    }

    /// The expression carried by an expression statement, if any.
    pub fn as_expression(&self) -> Option<&Expression> {
        match &self.kind {
            StatementKind::Expression(e) => Some(e),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_alias_rewrites_dashes() {
        assert_eq!(UseDeclaration::default_alias("ard/io"), "io");
        assert_eq!(UseDeclaration::default_alias("my-lib/json-utils"), "json_utils");
        assert_eq!(UseDeclaration::default_alias("solo"), "solo");
    }

    #[test]
    fn type_expr_display() {
        let map = TypeExpr::Map(
            Box::new(TypeExpr::Named("Str".into())),
            Box::new(TypeExpr::Named("Int".into())),
        );
        assert_eq!(map.to_string(), "[Str:Int]");
        let result = TypeExpr::Result(
            Box::new(TypeExpr::Named("Int".into())),
            Box::new(TypeExpr::Named("Str".into())),
        );
        assert_eq!(result.to_string(), "Int!Str");
        let maybe = TypeExpr::Maybe(Box::new(TypeExpr::List(Box::new(TypeExpr::Named(
            "Int".into(),
        )))));
        assert_eq!(maybe.to_string(), "[Int]?");
    }

    #[test]
    fn serialization_round_trip() {
        let program = Program {
            imports: vec![UseDeclaration {
                location: Location::new(1, 1),
                path: "ard/io".into(),
                alias: "io".into(),
            }],
            statements: vec![Statement::new(
                Location::new(2, 1),
                StatementKind::Expression(Expression::new(
                    Location::new(2, 1),
                    ExpressionKind::IntLiteral(5),
                )),
            )],
        };
        let json = serde_json::to_string(&program).expect("serialize");
        let back: Program = serde_json::from_str(&json).expect("deserialize");
        assert_eq!(program, back);
    }
}
