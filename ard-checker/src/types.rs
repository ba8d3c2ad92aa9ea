// The type model. Equality is structural for containers and nominal
// for structs, enums, and traits. `Dynamic` is the type of untyped
// external data and accepts anything.

use indexmap::IndexMap;
use std::fmt;
use std::rc::Rc;

#[derive(Debug, Clone)]
pub enum Type {
    Str,
    Int,
    Float,
    Bool,
    Void,
    List(Box<Type>),
    Map(Box<Type>, Box<Type>),
    /// `T?`
    Maybe(Box<Type>),
    /// `V!E`
    Result(Box<Type>, Box<Type>),
    Struct(Rc<StructType>),
    Enum(Rc<EnumType>),
    Function(Rc<FunctionType>),
    Trait(Rc<TraitType>),
    Union(Vec<Type>),
    /// An unresolved `$T`; erased after unification.
    Generic(String),
    /// Untyped external data (json, http, sqlite surfaces).
    Dynamic,
    /// Handle returned by `ard/async::start`.
    Fiber,
}

#[derive(Debug)]
pub struct StructType {
    pub name: String,
    pub fields: IndexMap<String, Type>,
    pub private: bool,
}

#[derive(Debug)]
pub struct EnumType {
    pub name: String,
    /// Variant indices are stable with definition order.
    pub variants: Vec<String>,
    pub private: bool,
}

impl EnumType {
    pub fn variant_index(&self, variant: &str) -> Option<u8> {
        self.variants
            .iter()
            .position(|v| v == variant)
            .map(|i| i as u8)
    }
}

#[derive(Debug, Clone)]
pub struct ParamType {
    pub name: String,
    pub ty: Type,
    pub mutable: bool,
}

#[derive(Debug, Clone)]
pub struct FunctionType {
    pub name: String,
    pub type_params: Vec<String>,
    pub params: Vec<ParamType>,
    pub return_type: Type,
    /// Mutating methods require a `mut` receiver binding.
    pub mutates: bool,
}

impl FunctionType {
    pub fn new(name: impl Into<String>, params: Vec<ParamType>, return_type: Type) -> Self {
        Self {
            name: name.into(),
            type_params: Vec::new(),
            params,
            return_type,
            mutates: false,
        }
    }
}

#[derive(Debug)]
pub struct TraitType {
    pub name: String,
    pub methods: Vec<Rc<FunctionType>>,
}

impl Type {
    /// Whether a value of type `other` is acceptable where `self` is
    /// expected. Structural for containers, nominal for named types.
    /// `T` never accepts `Maybe<T>`; the reverse requires an explicit
    /// wrap and is likewise rejected here.
    pub fn accepts(&self, other: &Type) -> bool {
        match (self, other) {
            (Type::Dynamic, _) | (_, Type::Dynamic) => true,
            (Type::Generic(_), _) => true,
            (Type::Str, Type::Str)
            | (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool)
            | (Type::Void, Type::Void)
            | (Type::Fiber, Type::Fiber) => true,
            (Type::List(a), Type::List(b)) => a.accepts(b),
            (Type::Map(ak, av), Type::Map(bk, bv)) => ak.accepts(bk) && av.accepts(bv),
            (Type::Maybe(a), Type::Maybe(b)) => a.accepts(b),
            (Type::Result(av, ae), Type::Result(bv, be)) => av.accepts(bv) && ae.accepts(be),
            (Type::Struct(a), Type::Struct(b)) => a.name == b.name,
            (Type::Enum(a), Type::Enum(b)) => a.name == b.name,
            (Type::Trait(a), Type::Trait(b)) => a.name == b.name,
            (Type::Function(a), Type::Function(b)) => {
                a.params.len() == b.params.len()
                    && a.params
                        .iter()
                        .zip(&b.params)
                        .all(|(x, y)| x.ty.accepts(&y.ty))
                    && a.return_type.accepts(&b.return_type)
            }
            (Type::Union(alternatives), other) => {
                alternatives.iter().any(|alt| alt.accepts(other))
                    || matches!(other, Type::Union(others)
                        if others.iter().all(|o| alternatives.iter().any(|a| a.accepts(o))))
            }
            _ => false,
        }
    }

    pub fn is_aggregate(&self) -> bool {
        matches!(self, Type::List(_) | Type::Map(_, _) | Type::Struct(_))
    }

    /// Types usable with `==` / `!=`.
    pub fn is_equatable(&self) -> bool {
        matches!(
            self,
            Type::Str | Type::Int | Type::Float | Type::Bool | Type::Enum(_)
        )
    }

    pub fn type_name(&self) -> String {
        self.to_string()
    }
}

impl PartialEq for Type {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Type::Str, Type::Str)
            | (Type::Int, Type::Int)
            | (Type::Float, Type::Float)
            | (Type::Bool, Type::Bool)
            | (Type::Void, Type::Void)
            | (Type::Dynamic, Type::Dynamic)
            | (Type::Fiber, Type::Fiber) => true,
            (Type::List(a), Type::List(b)) => a == b,
            (Type::Map(ak, av), Type::Map(bk, bv)) => ak == bk && av == bv,
            (Type::Maybe(a), Type::Maybe(b)) => a == b,
            (Type::Result(av, ae), Type::Result(bv, be)) => av == bv && ae == be,
            (Type::Struct(a), Type::Struct(b)) => a.name == b.name,
            (Type::Enum(a), Type::Enum(b)) => a.name == b.name,
            (Type::Trait(a), Type::Trait(b)) => a.name == b.name,
            (Type::Union(a), Type::Union(b)) => a == b,
            (Type::Generic(a), Type::Generic(b)) => a == b,
            (Type::Function(a), Type::Function(b)) => {
                a.params.len() == b.params.len()
                    && a.params.iter().zip(&b.params).all(|(x, y)| x.ty == y.ty)
                    && a.return_type == b.return_type
            }
            _ => false,
        }
    }
}

impl fmt::Display for Type {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            Type::Str => f.write_str("Str"),
            Type::Int => f.write_str("Int"),
            Type::Float => f.write_str("Float"),
            Type::Bool => f.write_str("Bool"),
            Type::Void => f.write_str("Void"),
            Type::List(item) => write!(f, "[{}]", item),
            Type::Map(key, value) => write!(f, "[{}:{}]", key, value),
            Type::Maybe(inner) => write!(f, "{}?", inner),
            Type::Result(ok, err) => write!(f, "{}!{}", ok, err),
            Type::Struct(def) => f.write_str(&def.name),
            Type::Enum(def) => f.write_str(&def.name),
            Type::Trait(def) => f.write_str(&def.name),
            Type::Function(sig) => {
                f.write_str("fn (")?;
                for (i, p) in sig.params.iter().enumerate() {
                    if i > 0 {
                        f.write_str(", ")?;
                    }
                    write!(f, "{}", p.ty)?;
                }
                write!(f, ") {}", sig.return_type)
            }
            Type::Union(alternatives) => {
                for (i, alt) in alternatives.iter().enumerate() {
                    if i > 0 {
                        f.write_str(" or ")?;
                    }
                    write!(f, "{}", alt)?;
                }
                Ok(())
            }
            Type::Generic(name) => f.write_str(name),
            Type::Dynamic => f.write_str("Dynamic"),
            Type::Fiber => f.write_str("Fiber"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn container_equality_is_structural() {
        let a = Type::List(Box::new(Type::Int));
        let b = Type::List(Box::new(Type::Int));
        assert_eq!(a, b);
        assert_ne!(a, Type::List(Box::new(Type::Str)));
    }

    #[test]
    fn nominal_equality_by_name() {
        let a = Type::Struct(Rc::new(StructType {
            name: "Point".into(),
            fields: IndexMap::new(),
            private: false,
        }));
        let b = Type::Struct(Rc::new(StructType {
            name: "Point".into(),
            fields: IndexMap::new(),
            private: false,
        }));
        assert_eq!(a, b);
    }

    #[test]
    fn maybe_is_not_its_inner_type() {
        let plain = Type::Int;
        let maybe = Type::Maybe(Box::new(Type::Int));
        assert!(!plain.accepts(&maybe));
        assert!(!maybe.accepts(&plain));
        assert!(maybe.accepts(&Type::Maybe(Box::new(Type::Int))));
    }

    #[test]
    fn union_accepts_alternatives() {
        let union = Type::Union(vec![Type::Int, Type::Str]);
        assert!(union.accepts(&Type::Int));
        assert!(union.accepts(&Type::Str));
        assert!(!union.accepts(&Type::Bool));
    }

    #[test]
    fn display_forms() {
        assert_eq!(Type::Maybe(Box::new(Type::Int)).to_string(), "Int?");
        assert_eq!(
            Type::Result(Box::new(Type::Int), Box::new(Type::Str)).to_string(),
            "Int!Str"
        );
        assert_eq!(
            Type::Map(Box::new(Type::Str), Box::new(Type::Int)).to_string(),
            "[Str:Int]"
        );
    }
}
