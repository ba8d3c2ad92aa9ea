// Declaration parsing: imports, functions, structs, enums, traits,
// impl blocks, type aliases, and extern bindings.

use super::Parser;
use crate::ParseError;
use ard_ast::{
    FieldDecl, FunctionDecl, Parameter, Statement, StatementKind, TraitMethodSig, TypeExpr,
    UseDeclaration,
};
use ard_lexer::TokenKind;

type Parsed<T> = Result<T, ParseError>;

impl Parser {
    /// `use PATH [as NAME]`
    pub(crate) fn parse_use(&mut self) -> Parsed<UseDeclaration> {
        let location = self.location();
        self.advance();

        if !self.check(TokenKind::Path) {
            return Err(self.error("Expected module path after 'use'"));
        }
        let path = self.advance().text;

        let alias = if self.match_kind(TokenKind::As) {
            self.consume(TokenKind::Identifier, "Expected alias name after 'as'")?
                .text
        } else {
            UseDeclaration::default_alias(&path)
        };
        self.expect_terminator()?;

        Ok(UseDeclaration {
            location,
            path,
            alias,
        })
    }

    /// `private` prefixes function, struct, enum, and type
    /// declarations.
    pub(crate) fn parse_private_declaration(&mut self) -> Parsed<Statement> {
        self.advance();
        match self.peek_kind() {
            TokenKind::Fn => self.parse_function_declaration(true),
            TokenKind::Struct => self.parse_struct_definition(true),
            TokenKind::Enum => self.parse_enum_definition(true),
            TokenKind::Type => self.parse_type_declaration(true),
            _ => Err(self.error("Expected 'fn', 'struct', 'enum', or 'type' after 'private'")),
        }
    }

    /// `fn [mut] name(params) [Return] { body }` or the static form
    /// `fn Target::name(...)`.
    pub(crate) fn parse_function_declaration(&mut self, private: bool) -> Parsed<Statement> {
        let location = self.location();
        let doc = self.take_doc();
        self.advance();
        let mutates = self.match_kind(TokenKind::Mut);
        let name = self.consume(TokenKind::Identifier, "Expected function name")?;

        if self.match_kind(TokenKind::ColonColon) {
            let fn_name = self.consume(TokenKind::Identifier, "Expected function name after '::'")?;
            let function = self.parse_function_tail(fn_name.text, private, mutates, doc)?;
            return Ok(Statement::new(
                location,
                StatementKind::StaticFunctionDeclaration {
                    target: name.text,
                    function,
                },
            ));
        }

        let function = self.parse_function_tail(name.text, private, mutates, doc)?;
        Ok(Statement::new(
            location,
            StatementKind::FunctionDeclaration(function),
        ))
    }

    /// Everything after the function name: parameters, optional return
    /// type, body. Generic parameters are collected from `$` names in
    /// the signature.
    pub(crate) fn parse_function_tail(
        &mut self,
        name: String,
        private: bool,
        mutates: bool,
        doc: Option<String>,
    ) -> Parsed<FunctionDecl> {
        let parameters = self.parse_parameter_list()?;
        let return_type = if self.check(TokenKind::LeftBrace) {
            None
        } else {
            Some(self.parse_type_expr()?)
        };
        let body = self.parse_block()?;

        let mut type_params = Vec::new();
        for parameter in &parameters {
            collect_generics(&parameter.declared_type, &mut type_params);
        }
        if let Some(ret) = &return_type {
            collect_generics(ret, &mut type_params);
        }

        Ok(FunctionDecl {
            name,
            type_params,
            parameters,
            return_type,
            body,
            private,
            mutates,
            doc,
        })
    }

    pub(crate) fn parse_parameter_list(&mut self) -> Parsed<Vec<Parameter>> {
        self.consume(TokenKind::LeftParen, "Expected '(' after function name")?;
        let mut parameters = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightParen) && !self.is_at_end() {
            let location = self.location();
            let mutable = self.match_kind(TokenKind::Mut);
            let name = self.consume_word("Expected parameter name")?;
            self.consume(TokenKind::Colon, "Expected ':' after parameter name")?;
            let declared_type = self.parse_type_expr()?;
            parameters.push(Parameter {
                location,
                name: name.text,
                mutable,
                declared_type,
            });
            if !self.match_kind(TokenKind::Comma) {
                break;
            }
            self.skip_newlines();
        }
        self.skip_newlines();
        self.consume(TokenKind::RightParen, "Expected ')' after parameters")?;
        Ok(parameters)
    }

    /// `struct Name { field: Type, ... }`
    pub(crate) fn parse_struct_definition(&mut self, private: bool) -> Parsed<Statement> {
        let location = self.location();
        let doc = self.take_doc();
        self.advance();
        let name = self.consume(TokenKind::Identifier, "Expected struct name")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after struct name")?;

        let mut fields = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let field_location = self.location();
            let field_name = self.consume_word("Expected field name")?;
            self.consume(TokenKind::Colon, "Expected ':' after field name")?;
            let declared_type = self.parse_type_expr()?;
            fields.push(FieldDecl {
                location: field_location,
                name: field_name.text,
                declared_type,
            });
            let separated = self.match_kind(TokenKind::Comma) | self.check(TokenKind::NewLine);
            self.skip_newlines();
            if !separated {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close struct")?;

        Ok(Statement::new(
            location,
            StatementKind::StructDefinition {
                name: name.text,
                fields,
                private,
                doc,
            },
        ))
    }

    /// `enum Name { a, b, c }`
    pub(crate) fn parse_enum_definition(&mut self, private: bool) -> Parsed<Statement> {
        let location = self.location();
        let doc = self.take_doc();
        self.advance();
        let name = self.consume(TokenKind::Identifier, "Expected enum name")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after enum name")?;

        let mut variants = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let variant = self.consume(TokenKind::Identifier, "Expected variant name")?;
            variants.push(variant.text);
            let separated = self.match_kind(TokenKind::Comma) | self.check(TokenKind::NewLine);
            self.skip_newlines();
            if !separated {
                break;
            }
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close enum")?;

        Ok(Statement::new(
            location,
            StatementKind::EnumDefinition {
                name: name.text,
                variants,
                private,
                doc,
            },
        ))
    }

    /// `trait Name { fn m(params) R ... }` — signatures only.
    pub(crate) fn parse_trait_definition(&mut self) -> Parsed<Statement> {
        let location = self.location();
        let doc = self.take_doc();
        self.advance();
        let name = self.consume(TokenKind::Identifier, "Expected trait name")?;
        self.consume(TokenKind::LeftBrace, "Expected '{' after trait name")?;

        let mut methods = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let method_location = self.location();
            self.consume(TokenKind::Fn, "Expected 'fn' in trait body")?;
            let mutates = self.match_kind(TokenKind::Mut);
            let method_name = self.consume(TokenKind::Identifier, "Expected method name")?;
            let parameters = self.parse_parameter_list()?;
            let return_type = if matches!(self.peek_kind(), TokenKind::NewLine | TokenKind::RightBrace)
            {
                None
            } else {
                Some(self.parse_type_expr()?)
            };
            methods.push(TraitMethodSig {
                location: method_location,
                name: method_name.text,
                parameters,
                return_type,
                mutates,
            });
            self.skip_newlines();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close trait")?;

        Ok(Statement::new(
            location,
            StatementKind::TraitDefinition {
                name: name.text,
                methods,
                doc,
            },
        ))
    }

    /// `impl Target { fns }` or `impl Trait for Target { fns }`,
    /// chosen by lookahead for `for`.
    pub(crate) fn parse_impl(&mut self) -> Parsed<Statement> {
        let location = self.location();
        self.advance();
        let first = self.consume(TokenKind::Identifier, "Expected type name after 'impl'")?;

        if self.match_kind(TokenKind::For) {
            let target = self.consume(TokenKind::Identifier, "Expected type name after 'for'")?;
            let methods = self.parse_impl_body()?;
            return Ok(Statement::new(
                location,
                StatementKind::TraitImplementation {
                    trait_name: first.text,
                    for_type: target.text,
                    methods,
                },
            ));
        }

        let methods = self.parse_impl_body()?;
        Ok(Statement::new(
            location,
            StatementKind::ImplBlock {
                target: first.text,
                methods,
            },
        ))
    }

    fn parse_impl_body(&mut self) -> Parsed<Vec<FunctionDecl>> {
        self.consume(TokenKind::LeftBrace, "Expected '{' to open impl body")?;
        let mut methods = Vec::new();
        self.skip_newlines();
        while !self.check(TokenKind::RightBrace) && !self.is_at_end() {
            let doc = self.take_doc();
            self.consume(TokenKind::Fn, "Expected 'fn' in impl body")?;
            let mutates = self.match_kind(TokenKind::Mut);
            let name = self.consume(TokenKind::Identifier, "Expected method name")?;
            let function = self.parse_function_tail(name.text, false, mutates, doc)?;
            methods.push(function);
            self.skip_newlines();
        }
        self.consume(TokenKind::RightBrace, "Expected '}' to close impl body")?;
        Ok(methods)
    }

    /// `type Name = A or B or ...`
    pub(crate) fn parse_type_declaration(&mut self, private: bool) -> Parsed<Statement> {
        let location = self.location();
        self.advance();
        let name = self.consume(TokenKind::Identifier, "Expected type name")?;
        self.consume(TokenKind::Equal, "Expected '=' in type declaration")?;

        let mut alternatives = vec![self.parse_type_expr()?];
        // `|` is not a lexer token of its own; alternatives are split
        // on the Or keyword written as `or`.
        while self.match_kind(TokenKind::Or) {
            alternatives.push(self.parse_type_expr()?);
        }
        self.expect_terminator()?;

        Ok(Statement::new(
            location,
            StatementKind::TypeDeclaration {
                name: name.text,
                alternatives,
                private,
            },
        ))
    }

    /// `extern fn name(params) R = "host_symbol"`
    pub(crate) fn parse_external_function(&mut self) -> Parsed<Statement> {
        let location = self.location();
        self.advance();
        self.consume(TokenKind::Fn, "Expected 'fn' after 'extern'")?;
        let name = self.consume(TokenKind::Identifier, "Expected function name")?;
        let parameters = self.parse_parameter_list()?;
        let return_type = if self.check(TokenKind::Equal) {
            None
        } else {
            Some(self.parse_type_expr()?)
        };
        self.consume(TokenKind::Equal, "Expected '=' before extern binding")?;
        let binding = self.consume(TokenKind::Str, "Expected binding string")?;
        self.expect_terminator()?;

        Ok(Statement::new(
            location,
            StatementKind::ExternalFunction {
                name: name.text,
                parameters,
                return_type,
                binding: binding.text,
            },
        ))
    }
}

/// Collect `$Name` generic parameters appearing in a type, in first
/// occurrence order.
fn collect_generics(type_expr: &TypeExpr, out: &mut Vec<String>) {
    match type_expr {
        TypeExpr::Named(name) => {
            if name.starts_with('$') && !out.contains(name) {
                out.push(name.clone());
            }
        }
        TypeExpr::List(item) => collect_generics(item, out),
        TypeExpr::Map(key, value) => {
            collect_generics(key, out);
            collect_generics(value, out);
        }
        TypeExpr::Maybe(inner) => collect_generics(inner, out),
        TypeExpr::Result(ok, err) => {
            collect_generics(ok, out);
            collect_generics(err, out);
        }
        TypeExpr::Function {
            parameters,
            return_type,
        } => {
            for p in parameters {
                collect_generics(p, out);
            }
            collect_generics(return_type, out);
        }
    }
}
