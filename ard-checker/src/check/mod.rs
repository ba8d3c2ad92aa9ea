// The checker: resolves names, infers and verifies types, and lowers
// the surface AST into the typed IR. All diagnostics are accumulated;
// checking continues past errors wherever the tree is still sound.

use crate::builtins;
use crate::ir::{ExternFunction, Function, Module, Symbol};
use crate::resolver::ModuleResolver;
use crate::scope::{FrameKind, ScopeStack};
use crate::types::{EnumType, FunctionType, ParamType, StructType, TraitType, Type};
use ard_ast::{FunctionDecl, Location, Parameter, Program, StatementKind, TypeExpr};
use ard_diagnostics::{codes, Diagnostic, DiagnosticEngine, Span};
use indexmap::IndexMap;
use log::debug;
use std::collections::{HashMap, HashSet};
use std::rc::Rc;

mod expressions;
mod matching;
mod statements;

pub struct CheckResult {
    pub module: Option<Rc<Module>>,
    pub diagnostics: Vec<Diagnostic>,
}

/// Check a parsed program against an injected module resolver.
pub fn check(program: &Program, resolver: &dyn ModuleResolver, path: &str) -> CheckResult {
    let mut checker = Checker::new(resolver, path);
    let module = checker.run(program);
    debug!(
        "checked {}: {} diagnostics",
        path,
        checker.engine.diagnostics().len()
    );
    CheckResult {
        module,
        diagnostics: checker.engine.into_diagnostics(),
    }
}

pub(crate) struct ImportEntry {
    pub path: String,
    pub builtin: bool,
    pub symbols: IndexMap<String, Symbol>,
    pub module: Option<Rc<Module>>,
}

pub(crate) struct Checker<'r> {
    pub file: String,
    pub resolver: &'r dyn ModuleResolver,
    pub scopes: ScopeStack,
    pub engine: DiagnosticEngine,

    pub imports: IndexMap<String, ImportEntry>,
    pub structs: IndexMap<String, Rc<StructType>>,
    pub enums: IndexMap<String, Rc<EnumType>>,
    pub traits: IndexMap<String, Rc<TraitType>>,
    pub unions: IndexMap<String, Vec<Type>>,
    pub union_private: HashMap<String, bool>,
    /// Trait names implemented per type name.
    pub type_traits: HashMap<String, Vec<String>>,

    pub fn_sigs: IndexMap<String, Rc<FunctionType>>,
    pub fn_private: HashMap<String, bool>,
    pub fn_locations: HashMap<String, Location>,
    /// Top-level functions with at least one resolved call site or
    /// value reference; drives the unused-private-function warning.
    pub called_fns: HashSet<String>,
    pub externs: IndexMap<String, ExternFunction>,
    pub method_sigs: IndexMap<String, IndexMap<String, Rc<FunctionType>>>,
    pub static_sigs: IndexMap<String, IndexMap<String, Rc<FunctionType>>>,

    pub functions: IndexMap<String, Rc<Function>>,
    pub methods: IndexMap<String, IndexMap<String, Rc<Function>>>,
    pub statics: IndexMap<String, IndexMap<String, Rc<Function>>>,

    /// Enclosing impl target while checking a method body.
    pub self_types: Vec<Type>,
    /// Enclosing function return types, innermost last.
    pub return_types: Vec<Type>,
    /// Counter for checker-introduced temporaries.
    pub next_temp: usize,
}

impl<'r> Checker<'r> {
    fn new(resolver: &'r dyn ModuleResolver, path: &str) -> Self {
        Self {
            file: path.to_string(),
            resolver,
            scopes: ScopeStack::new(),
            engine: DiagnosticEngine::new(),
            imports: IndexMap::new(),
            structs: IndexMap::new(),
            enums: IndexMap::new(),
            traits: IndexMap::new(),
            unions: IndexMap::new(),
            union_private: HashMap::new(),
            type_traits: HashMap::new(),
            fn_sigs: IndexMap::new(),
            fn_private: HashMap::new(),
            fn_locations: HashMap::new(),
            called_fns: HashSet::new(),
            externs: IndexMap::new(),
            method_sigs: IndexMap::new(),
            static_sigs: IndexMap::new(),
            functions: IndexMap::new(),
            methods: IndexMap::new(),
            statics: IndexMap::new(),
            self_types: Vec::new(),
            return_types: Vec::new(),
            next_temp: 0,
        }
    }

    fn run(&mut self, program: &Program) -> Option<Rc<Module>> {
        self.check_imports(program);
        self.declare_types(program);
        self.declare_signatures(program);
        let top_level = self.check_bodies(program);
        self.warn_unused_private_functions();

        if self.engine.has_errors() {
            return None;
        }

        let mut symbols = IndexMap::new();
        for (name, sig) in &self.fn_sigs {
            let private = self.fn_private.get(name).copied().unwrap_or(false);
            symbols.insert(
                name.clone(),
                Symbol {
                    ty: Type::Function(sig.clone()),
                    public: !private,
                },
            );
        }
        // Type declarations are symbols too, with their visibility.
        for (name, def) in &self.structs {
            symbols.entry(name.clone()).or_insert_with(|| Symbol {
                ty: Type::Struct(def.clone()),
                public: !def.private,
            });
        }
        for (name, def) in &self.enums {
            symbols.entry(name.clone()).or_insert_with(|| Symbol {
                ty: Type::Enum(def.clone()),
                public: !def.private,
            });
        }
        for (name, alternatives) in &self.unions {
            let private = self.union_private.get(name).copied().unwrap_or(false);
            symbols.entry(name.clone()).or_insert_with(|| Symbol {
                ty: Type::Union(alternatives.clone()),
                public: !private,
            });
        }

        let imports = self
            .imports
            .iter()
            .filter_map(|(alias, entry)| {
                entry.module.clone().map(|m| (alias.clone(), m))
            })
            .collect();

        Some(Rc::new(Module {
            path: self.file.clone(),
            program: top_level,
            symbols,
            functions: std::mem::take(&mut self.functions),
            methods: std::mem::take(&mut self.methods),
            statics: std::mem::take(&mut self.statics),
            enums: self.enums.clone(),
            structs: self.structs.clone(),
            imports,
            externs: self.externs.clone(),
        }))
    }

    // ==================== Imports ====================

    fn check_imports(&mut self, program: &Program) {
        for import in &program.imports {
            if self.imports.contains_key(&import.alias) {
                self.error_at(
                    import.location,
                    codes::DUPLICATE_IMPORT,
                    format!("Duplicate import alias '{}'", import.alias),
                );
                continue;
            }
            if builtins::is_builtin_package(&import.path) {
                let symbols = builtins::builtin_package_symbols(&import.path)
                    .unwrap_or_default();
                self.imports.insert(
                    import.alias.clone(),
                    ImportEntry {
                        path: import.path.clone(),
                        builtin: true,
                        symbols,
                        module: None,
                    },
                );
                continue;
            }
            match self.resolver.resolve(&import.path) {
                Ok(module) => {
                    self.imports.insert(
                        import.alias.clone(),
                        ImportEntry {
                            path: import.path.clone(),
                            builtin: false,
                            symbols: module.symbols.clone(),
                            module: Some(module),
                        },
                    );
                }
                Err(error) => {
                    self.error_at(import.location, codes::MODULE_NOT_FOUND, error.to_string());
                }
            }
        }
    }

    // ==================== Type declarations ====================

    /// Enums first (no field types), then structs in declaration
    /// order, then traits and union aliases.
    fn declare_types(&mut self, program: &Program) {
        for statement in &program.statements {
            if let StatementKind::EnumDefinition {
                name,
                variants,
                private,
                ..
            } = &statement.kind
            {
                if self.enums.contains_key(name) {
                    self.error_at(
                        statement.location,
                        codes::DUPLICATE_DEFINITION,
                        format!("Duplicate definition of '{}'", name),
                    );
                    continue;
                }
                self.enums.insert(
                    name.clone(),
                    Rc::new(EnumType {
                        name: name.clone(),
                        variants: variants.clone(),
                        private: *private,
                    }),
                );
            }
        }

        for statement in &program.statements {
            if let StatementKind::StructDefinition {
                name,
                fields,
                private,
                ..
            } = &statement.kind
            {
                if self.structs.contains_key(name) {
                    self.error_at(
                        statement.location,
                        codes::DUPLICATE_DEFINITION,
                        format!("Duplicate definition of '{}'", name),
                    );
                    continue;
                }
                let mut typed_fields = IndexMap::new();
                for field in fields {
                    let ty = self.resolve_type(&field.declared_type, field.location);
                    typed_fields.insert(field.name.clone(), ty);
                }
                self.structs.insert(
                    name.clone(),
                    Rc::new(StructType {
                        name: name.clone(),
                        fields: typed_fields,
                        private: *private,
                    }),
                );
            }
        }

        for statement in &program.statements {
            match &statement.kind {
                StatementKind::TraitDefinition { name, methods, .. } => {
                    let methods = methods
                        .iter()
                        .map(|m| {
                            let params = self.resolve_parameters(&m.parameters);
                            let return_type = m
                                .return_type
                                .as_ref()
                                .map(|t| self.resolve_type(t, m.location))
                                .unwrap_or(Type::Void);
                            Rc::new(FunctionType {
                                name: m.name.clone(),
                                type_params: Vec::new(),
                                params,
                                return_type,
                                mutates: m.mutates,
                            })
                        })
                        .collect();
                    self.traits.insert(
                        name.clone(),
                        Rc::new(TraitType {
                            name: name.clone(),
                            methods,
                        }),
                    );
                }
                StatementKind::TypeDeclaration {
                    name,
                    alternatives,
                    private,
                } => {
                    let alternatives = alternatives
                        .iter()
                        .map(|t| self.resolve_type(t, statement.location))
                        .collect();
                    self.unions.insert(name.clone(), alternatives);
                    self.union_private.insert(name.clone(), *private);
                }
                _ => {}
            }
        }
    }

    // ==================== Signatures ====================

    fn declare_signatures(&mut self, program: &Program) {
        for statement in &program.statements {
            match &statement.kind {
                StatementKind::FunctionDeclaration(decl) => {
                    if self.fn_sigs.contains_key(&decl.name) {
                        self.error_at(
                            statement.location,
                            codes::DUPLICATE_DEFINITION,
                            format!("Duplicate definition of '{}'", decl.name),
                        );
                        continue;
                    }
                    let sig = self.function_signature(decl, statement.location);
                    self.fn_private.insert(decl.name.clone(), decl.private);
                    self.fn_locations.insert(decl.name.clone(), statement.location);
                    self.fn_sigs.insert(decl.name.clone(), sig);
                }
                StatementKind::ExternalFunction {
                    name,
                    parameters,
                    return_type,
                    binding,
                } => {
                    let params = self.resolve_parameters(parameters);
                    let ret = return_type
                        .as_ref()
                        .map(|t| self.resolve_type(t, statement.location))
                        .unwrap_or(Type::Void);
                    let signature = Rc::new(FunctionType::new(name.clone(), params, ret));
                    self.externs.insert(
                        name.clone(),
                        ExternFunction {
                            signature,
                            binding: binding.clone(),
                        },
                    );
                }
                StatementKind::StaticFunctionDeclaration { target, function } => {
                    let sig = self.function_signature(function, statement.location);
                    self.ensure_impl_target(target, statement.location);
                    self.static_sigs
                        .entry(target.clone())
                        .or_default()
                        .insert(function.name.clone(), sig);
                }
                StatementKind::ImplBlock { target, methods } => {
                    self.ensure_impl_target(target, statement.location);
                    for decl in methods {
                        let sig = self.function_signature(decl, statement.location);
                        self.method_sigs
                            .entry(target.clone())
                            .or_default()
                            .insert(decl.name.clone(), sig);
                    }
                }
                StatementKind::TraitImplementation {
                    trait_name,
                    for_type,
                    methods,
                } => {
                    self.check_trait_conformance(
                        trait_name,
                        for_type,
                        methods,
                        statement.location,
                    );
                    for decl in methods {
                        let sig = self.function_signature(decl, statement.location);
                        self.method_sigs
                            .entry(for_type.clone())
                            .or_default()
                            .insert(decl.name.clone(), sig);
                    }
                    self.type_traits
                        .entry(for_type.clone())
                        .or_default()
                        .push(trait_name.clone());
                }
                _ => {}
            }
        }
    }

    /// A private function with no call site and no value reference
    /// anywhere in the module is dead.
    fn warn_unused_private_functions(&mut self) {
        let unused: Vec<(String, Location)> = self
            .fn_sigs
            .keys()
            .filter(|name| {
                self.fn_private.get(*name).copied().unwrap_or(false)
                    && !self.called_fns.contains(*name)
            })
            .filter_map(|name| {
                self.fn_locations
                    .get(name)
                    .map(|location| (name.clone(), *location))
            })
            .collect();
        for (name, location) in unused {
            self.warn_at(
                location,
                codes::UNUSED_FUNCTION,
                format!("Private function '{}' is never used", name),
            );
        }
    }

    fn ensure_impl_target(&mut self, target: &str, location: Location) {
        if !self.structs.contains_key(target) && !self.enums.contains_key(target) {
            self.error_at(
                location,
                codes::UNDEFINED,
                format!("Undefined: {}", target),
            );
        }
    }

    /// Every trait signature must be implemented with matching arity
    /// and types.
    fn check_trait_conformance(
        &mut self,
        trait_name: &str,
        for_type: &str,
        methods: &[FunctionDecl],
        location: Location,
    ) {
        self.ensure_impl_target(for_type, location);
        let Some(trait_def) = self.traits.get(trait_name).cloned() else {
            self.error_at(
                location,
                codes::UNDEFINED,
                format!("Undefined: {}", trait_name),
            );
            return;
        };
        for required in &trait_def.methods {
            let Some(provided) = methods.iter().find(|m| m.name == required.name) else {
                self.error_at(
                    location,
                    codes::TRAIT_CONFORMANCE,
                    format!(
                        "Trait '{}' requires method '{}', which '{}' does not implement",
                        trait_name, required.name, for_type
                    ),
                );
                continue;
            };
            let sig = self.function_signature(provided, location);
            if sig.params.len() != required.params.len() {
                self.error_at(
                    location,
                    codes::TRAIT_CONFORMANCE,
                    format!(
                        "Method '{}' takes {} parameters but trait '{}' declares {}",
                        required.name,
                        sig.params.len(),
                        trait_name,
                        required.params.len()
                    ),
                );
                continue;
            }
            let params_match = sig
                .params
                .iter()
                .zip(&required.params)
                .all(|(a, b)| a.ty == b.ty);
            if !params_match || sig.return_type != required.return_type {
                self.error_at(
                    location,
                    codes::TRAIT_CONFORMANCE,
                    format!(
                        "Method '{}' does not match the signature declared by trait '{}'",
                        required.name, trait_name
                    ),
                );
            }
        }
    }

    pub(crate) fn function_signature(
        &mut self,
        decl: &FunctionDecl,
        location: Location,
    ) -> Rc<FunctionType> {
        let params = self.resolve_parameters(&decl.parameters);
        let return_type = decl
            .return_type
            .as_ref()
            .map(|t| self.resolve_type(t, location))
            .unwrap_or(Type::Void);
        Rc::new(FunctionType {
            name: decl.name.clone(),
            type_params: decl.type_params.clone(),
            params,
            return_type,
            mutates: decl.mutates,
        })
    }

    pub(crate) fn resolve_parameters(&mut self, parameters: &[Parameter]) -> Vec<ParamType> {
        parameters
            .iter()
            .map(|p| ParamType {
                name: p.name.clone(),
                ty: self.resolve_type(&p.declared_type, p.location),
                mutable: p.mutable,
            })
            .collect()
    }

    // ==================== Bodies ====================

    fn check_bodies(&mut self, program: &Program) -> Vec<crate::ir::Expr> {
        let mut top_level = Vec::new();
        for statement in &program.statements {
            match &statement.kind {
                StatementKind::FunctionDeclaration(decl) => {
                    let Some(sig) = self.fn_sigs.get(&decl.name).cloned() else {
                        continue;
                    };
                    let function = self.check_function_body(decl, sig, None);
                    self.functions.insert(decl.name.clone(), Rc::new(function));
                }
                StatementKind::StaticFunctionDeclaration { target, function } => {
                    let Some(sig) = self
                        .static_sigs
                        .get(target)
                        .and_then(|t| t.get(&function.name))
                        .cloned()
                    else {
                        continue;
                    };
                    let checked = self.check_function_body(function, sig, None);
                    self.statics
                        .entry(target.clone())
                        .or_default()
                        .insert(function.name.clone(), Rc::new(checked));
                }
                StatementKind::ImplBlock { target, methods }
                | StatementKind::TraitImplementation {
                    for_type: target,
                    methods,
                    ..
                } => {
                    let Some(self_type) = self.named_type(target) else {
                        continue;
                    };
                    for decl in methods {
                        let Some(sig) = self
                            .method_sigs
                            .get(target)
                            .and_then(|t| t.get(&decl.name))
                            .cloned()
                        else {
                            continue;
                        };
                        let checked =
                            self.check_function_body(decl, sig, Some(self_type.clone()));
                        self.methods
                            .entry(target.clone())
                            .or_default()
                            .insert(decl.name.clone(), Rc::new(checked));
                    }
                }
                StatementKind::StructDefinition { .. }
                | StatementKind::EnumDefinition { .. }
                | StatementKind::TraitDefinition { .. }
                | StatementKind::TypeDeclaration { .. }
                | StatementKind::ExternalFunction { .. } => {}
                _ => {
                    if let Some(expr) = self.check_statement(statement) {
                        top_level.push(expr);
                    }
                }
            }
        }
        top_level
    }

    fn check_function_body(
        &mut self,
        decl: &FunctionDecl,
        signature: Rc<FunctionType>,
        self_type: Option<Type>,
    ) -> Function {
        self.scopes.push(FrameKind::Function);
        for param in &signature.params {
            self.scopes
                .declare_var(&param.name, param.ty.clone(), param.mutable);
        }
        if let Some(self_type) = &self_type {
            // `@` is a shared handle in `mut` methods, a copy otherwise.
            self.scopes
                .declare_var("@", self_type.clone(), signature.mutates);
            self.self_types.push(self_type.clone());
        }
        self.return_types.push(signature.return_type.clone());

        let body = self.check_block_statements(&decl.body);

        // The last expression is the function result and must match
        // the declared return type; Void functions discard it.
        if signature.return_type != Type::Void {
            let body_type = body.ty();
            if !self.assignable(&signature.return_type, &body_type) {
                self.error_at(
                    decl.body.location,
                    codes::TYPE_MISMATCH,
                    format!(
                        "Function '{}' returns {} but its body produces {}",
                        decl.name, signature.return_type, body_type
                    ),
                );
            }
        }

        self.return_types.pop();
        if self_type.is_some() {
            self.self_types.pop();
        }
        self.scopes.pop();

        Function { signature, body }
    }

    // ==================== Type resolution ====================

    pub(crate) fn resolve_type(&mut self, type_expr: &TypeExpr, location: Location) -> Type {
        match type_expr {
            TypeExpr::Named(name) => {
                if let Some(generic) = name.strip_prefix('$') {
                    return Type::Generic(generic.to_string());
                }
                match name.as_str() {
                    "Str" => Type::Str,
                    "Int" => Type::Int,
                    "Float" => Type::Float,
                    "Bool" => Type::Bool,
                    "Void" => Type::Void,
                    "Dynamic" => Type::Dynamic,
                    "Fiber" => Type::Fiber,
                    _ => match self.named_type(name) {
                        Some(ty) => ty,
                        None => {
                            self.error_at(
                                location,
                                codes::UNDEFINED,
                                format!("Undefined: {}", name),
                            );
                            Type::Dynamic
                        }
                    },
                }
            }
            TypeExpr::List(item) => Type::List(Box::new(self.resolve_type(item, location))),
            TypeExpr::Map(key, value) => Type::Map(
                Box::new(self.resolve_type(key, location)),
                Box::new(self.resolve_type(value, location)),
            ),
            TypeExpr::Maybe(inner) => Type::Maybe(Box::new(self.resolve_type(inner, location))),
            TypeExpr::Result(ok, err) => Type::Result(
                Box::new(self.resolve_type(ok, location)),
                Box::new(self.resolve_type(err, location)),
            ),
            TypeExpr::Function {
                parameters,
                return_type,
            } => {
                let params = parameters
                    .iter()
                    .map(|p| ParamType {
                        name: String::new(),
                        ty: self.resolve_type(p, location),
                        mutable: false,
                    })
                    .collect();
                let ret = self.resolve_type(return_type, location);
                Type::Function(Rc::new(FunctionType::new("", params, ret)))
            }
        }
    }

    /// A user-declared type by name: struct, enum, trait, or union
    /// alias.
    pub(crate) fn named_type(&self, name: &str) -> Option<Type> {
        if let Some(def) = self.structs.get(name) {
            return Some(Type::Struct(def.clone()));
        }
        if let Some(def) = self.enums.get(name) {
            return Some(Type::Enum(def.clone()));
        }
        if let Some(def) = self.traits.get(name) {
            return Some(Type::Trait(def.clone()));
        }
        if let Some(alternatives) = self.unions.get(name) {
            return Some(Type::Union(alternatives.clone()));
        }
        None
    }

    // ==================== Diagnostics ====================

    pub(crate) fn span(&self, location: Location) -> Span {
        Span::new(self.file.as_str(), location.line, location.column, 1)
    }

    pub(crate) fn error_at(
        &mut self,
        location: Location,
        code: &'static str,
        message: String,
    ) {
        let span = self.span(location);
        self.engine.emit_error(code, message, span);
    }

    pub(crate) fn warn_at(
        &mut self,
        location: Location,
        code: &'static str,
        message: String,
    ) {
        let span = self.span(location);
        self.engine.emit_warning(code, message, span);
    }

    pub(crate) fn fresh_temp(&mut self) -> String {
        let name = format!("%chain{}", self.next_temp);
        self.next_temp += 1;
        name
    }

    /// Acceptance including trait conformance: a trait-typed slot
    /// takes any type with a matching `impl Trait for Type`.
    pub(crate) fn assignable(&self, expected: &Type, actual: &Type) -> bool {
        if expected.accepts(actual) {
            return true;
        }
        let Type::Trait(trait_def) = expected else {
            return false;
        };
        let type_name = match actual {
            Type::Struct(def) => &def.name,
            Type::Enum(def) => &def.name,
            _ => return false,
        };
        self.type_traits
            .get(type_name)
            .map(|traits| traits.contains(&trait_def.name))
            .unwrap_or(false)
    }
}
