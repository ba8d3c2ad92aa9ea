// Expression checking and lowering: operator specialization, call
// resolution (local, module, static, extern, closure), generics
// unification, member access, and control expressions.

use super::Checker;
use crate::builtins;
use crate::ir::{Block, ClosureParam, Expr, StrSegment};
use crate::scope::FrameKind;
use crate::types::{FunctionType, ParamType, Type};
use ard_ast::{
    BinaryOp, CallArg, ElseBranch, Expression, ExpressionKind, Location, StrPart, TypeExpr,
    UnaryOp,
};
use ard_diagnostics::codes;
use std::collections::HashMap;
use std::rc::Rc;

impl Checker<'_> {
    pub(crate) fn check_expression(
        &mut self,
        expression: &Expression,
        expected: Option<&Type>,
    ) -> Option<Expr> {
        let location = expression.location;
        match &expression.kind {
            ExpressionKind::IntLiteral(value) => Some(Expr::Int(*value)),
            ExpressionKind::FloatLiteral(value) => Some(Expr::Float(*value)),
            ExpressionKind::BoolLiteral(value) => Some(Expr::Bool(*value)),
            ExpressionKind::InterpolatedString(parts) => {
                self.check_interpolated_string(location, parts)
            }
            ExpressionKind::ListLiteral(items) => {
                self.check_list_literal(location, items, expected)
            }
            ExpressionKind::MapLiteral(entries) => {
                self.check_map_literal(location, entries, expected)
            }
            ExpressionKind::RangeLiteral { .. } => {
                self.error_at(
                    location,
                    codes::OPERATOR_TYPES,
                    "Ranges are only valid as loop iterables and match patterns".to_string(),
                );
                None
            }
            ExpressionKind::StructInstance { name, fields } => {
                self.check_struct_instance(location, name, fields)
            }
            ExpressionKind::Identifier(name) => self.check_identifier(location, name),
            ExpressionKind::SelfRef => match self.self_types.last().cloned() {
                Some(ty) => Some(Expr::Variable {
                    name: "@".to_string(),
                    ty,
                }),
                None => {
                    self.error_at(
                        location,
                        codes::UNDEFINED,
                        "'@' is only available inside methods".to_string(),
                    );
                    None
                }
            },
            ExpressionKind::Unary { operator, operand } => {
                self.check_unary(location, *operator, operand)
            }
            ExpressionKind::Binary {
                operator,
                left,
                right,
            } => self.check_binary(location, *operator, left, right),
            ExpressionKind::ChainedComparison {
                operands,
                operators,
            } => self.check_chained_comparison(location, operands, operators),
            ExpressionKind::FunctionCall {
                name,
                type_args,
                args,
            } => self.check_function_call(location, name, type_args, args),
            ExpressionKind::InstanceProperty { receiver, property } => {
                self.check_instance_property(location, receiver, property)
            }
            ExpressionKind::InstanceMethod {
                receiver,
                method,
                args,
            } => self.check_instance_method(location, receiver, method, args),
            ExpressionKind::StaticProperty { target, property } => {
                self.check_static_property(location, target, property, expected)
            }
            ExpressionKind::StaticFunction {
                target,
                function,
                type_args,
                args,
            } => self.check_static_function(location, target, function, type_args, args, expected),
            ExpressionKind::If {
                condition,
                body,
                else_branch,
            } => self.check_if(location, condition, body, else_branch.as_deref()),
            ExpressionKind::MatchExpression { subject, cases } => {
                self.check_match(location, subject, cases)
            }
            ExpressionKind::ConditionalMatchExpression { cases } => {
                self.check_conditional_match(location, cases)
            }
            ExpressionKind::Try {
                expression,
                catch_name,
                catch_block,
            } => self.check_try(location, expression, catch_name.as_deref(), catch_block.as_ref()),
            ExpressionKind::AnonymousFunction {
                parameters,
                return_type,
                body,
            } => self.check_anonymous_function(location, parameters, return_type.as_ref(), body),
        }
    }

    // ==================== Literals ====================

    fn check_interpolated_string(
        &mut self,
        location: Location,
        parts: &[StrPart],
    ) -> Option<Expr> {
        // A single literal chunk is a plain string.
        if parts.len() == 1 {
            if let StrPart::Literal(text) = &parts[0] {
                return Some(Expr::Str(text.clone()));
            }
        }
        if parts.is_empty() {
            return Some(Expr::Str(String::new()));
        }
        let mut segments = Vec::new();
        for part in parts {
            match part {
                StrPart::Literal(text) => segments.push(StrSegment::Literal(text.clone())),
                StrPart::Expr(inner) => {
                    let checked = self.check_expression(inner, None)?;
                    match checked.ty() {
                        Type::Str | Type::Int | Type::Float | Type::Bool | Type::Dynamic => {}
                        other => {
                            self.error_at(
                                location,
                                codes::TYPE_MISMATCH,
                                format!("Cannot interpolate a value of type {}", other),
                            );
                        }
                    }
                    segments.push(StrSegment::Expr(checked));
                }
            }
        }
        Some(Expr::InterpolatedStr(segments))
    }

    fn check_list_literal(
        &mut self,
        location: Location,
        items: &[Expression],
        expected: Option<&Type>,
    ) -> Option<Expr> {
        if items.is_empty() {
            let item_type = match expected {
                Some(Type::List(item)) => (**item).clone(),
                _ => {
                    self.error_at(
                        location,
                        codes::CANNOT_INFER,
                        "Cannot infer the element type of an empty list".to_string(),
                    );
                    return None;
                }
            };
            return Some(Expr::ListLiteral {
                items: vec![],
                item_type,
            });
        }

        let expected_item = match expected {
            Some(Type::List(item)) => Some((**item).clone()),
            _ => None,
        };
        let mut checked = Vec::new();
        let mut item_type = expected_item.clone();
        for item in items {
            let expr = self.check_expression(item, item_type.as_ref())?;
            let ty = expr.ty();
            match &item_type {
                Some(expected) => {
                    if !expected.accepts(&ty) {
                        self.error_at(
                            location,
                            codes::TYPE_MISMATCH,
                            format!("List elements must all be {}, got {}", expected, ty),
                        );
                    }
                }
                None => item_type = Some(ty),
            }
            checked.push(expr);
        }
        Some(Expr::ListLiteral {
            items: checked,
            item_type: item_type.unwrap_or(Type::Dynamic),
        })
    }

    fn check_map_literal(
        &mut self,
        location: Location,
        entries: &[(Expression, Expression)],
        expected: Option<&Type>,
    ) -> Option<Expr> {
        let (mut key_type, mut value_type) = match expected {
            Some(Type::Map(k, v)) => (Some((**k).clone()), Some((**v).clone())),
            _ => (None, None),
        };
        if entries.is_empty() && key_type.is_none() {
            self.error_at(
                location,
                codes::CANNOT_INFER,
                "Cannot infer the key and value types of an empty map".to_string(),
            );
            return None;
        }
        let mut checked = Vec::new();
        for (key, value) in entries {
            let key_expr = self.check_expression(key, key_type.as_ref())?;
            let value_expr = self.check_expression(value, value_type.as_ref())?;
            let kt = key_expr.ty();
            let vt = value_expr.ty();
            match &key_type {
                Some(expected) if !expected.accepts(&kt) => {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!("Map keys must all be {}, got {}", expected, kt),
                    );
                }
                None => key_type = Some(kt),
                _ => {}
            }
            match &value_type {
                Some(expected) if !expected.accepts(&vt) => {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!("Map values must all be {}, got {}", expected, vt),
                    );
                }
                None => value_type = Some(vt),
                _ => {}
            }
            checked.push((key_expr, value_expr));
        }
        Some(Expr::MapLiteral {
            entries: checked,
            key_type: key_type.unwrap_or(Type::Dynamic),
            value_type: value_type.unwrap_or(Type::Dynamic),
        })
    }

    fn check_struct_instance(
        &mut self,
        location: Location,
        name: &str,
        fields: &[(String, Expression)],
    ) -> Option<Expr> {
        let def = match name.split_once("::") {
            Some((alias, struct_name)) => {
                let entry = self.imports.get(alias);
                let def = entry
                    .and_then(|e| e.module.as_ref())
                    .and_then(|m| m.structs.get(struct_name))
                    .cloned();
                match def {
                    Some(def) => {
                        if def.private {
                            self.error_at(
                                location,
                                codes::PRIVATE_ACCESS,
                                format!("Struct '{}' is private to module '{}'", struct_name, alias),
                            );
                        }
                        def
                    }
                    None => {
                        self.report_undefined(location, name);
                        return None;
                    }
                }
            }
            None => match self.structs.get(name).cloned() {
                Some(def) => def,
                None => {
                    self.report_undefined(location, name);
                    return None;
                }
            },
        };

        let mut checked = Vec::new();
        for (field_name, value) in fields {
            let Some(field_type) = def.fields.get(field_name).cloned() else {
                self.error_at(
                    location,
                    codes::NO_SUCH_FIELD,
                    format!("{} has no field '{}'", def.name, field_name),
                );
                continue;
            };
            let value_expr = self.check_expression(value, Some(&field_type))?;
            if !field_type.accepts(&value_expr.ty()) {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!(
                        "Field '{}' of {} is {}, got {}",
                        field_name,
                        def.name,
                        field_type,
                        value_expr.ty()
                    ),
                );
            }
            checked.push((field_name.clone(), value_expr));
        }
        for field_name in def.fields.keys() {
            if !fields.iter().any(|(n, _)| n == field_name) {
                self.error_at(
                    location,
                    codes::NO_SUCH_FIELD,
                    format!("Missing field '{}' in {} literal", field_name, def.name),
                );
            }
        }
        Some(Expr::StructInstance {
            def,
            fields: checked,
        })
    }

    // ==================== Names ====================

    fn check_identifier(&mut self, location: Location, name: &str) -> Option<Expr> {
        if let Some(info) = self.scopes.lookup_var(name) {
            return Some(Expr::Variable {
                name: name.to_string(),
                ty: info.ty,
            });
        }
        if let Some(sig) = self.fn_sigs.get(name).cloned() {
            // Referencing a function as a value counts as a use.
            self.called_fns.insert(name.to_string());
            return Some(Expr::Variable {
                name: name.to_string(),
                ty: Type::Function(sig),
            });
        }
        self.report_undefined(location, name);
        None
    }

    // ==================== Operators ====================

    fn check_unary(
        &mut self,
        location: Location,
        operator: UnaryOp,
        operand: &Expression,
    ) -> Option<Expr> {
        let operand = self.check_expression(operand, None)?;
        let ty = operand.ty();
        match operator {
            UnaryOp::Negate => match ty {
                Type::Int => Some(Expr::IntNegation(Box::new(operand))),
                Type::Float => Some(Expr::FloatNegation(Box::new(operand))),
                other => {
                    self.error_at(
                        location,
                        codes::OPERATOR_TYPES,
                        format!("Cannot negate a value of type {}", other),
                    );
                    None
                }
            },
            UnaryOp::Not => match ty {
                Type::Bool => Some(Expr::Not(Box::new(operand))),
                other => {
                    self.error_at(
                        location,
                        codes::OPERATOR_TYPES,
                        format!("'not' requires Bool, got {}", other),
                    );
                    None
                }
            },
        }
    }

    fn check_binary(
        &mut self,
        location: Location,
        operator: BinaryOp,
        left: &Expression,
        right: &Expression,
    ) -> Option<Expr> {
        let left = self.check_expression(left, None)?;
        let right = self.check_expression(right, None)?;
        self.specialize_binary(location, operator, left, right)
    }

    /// Pick the specialized IR variant for `operator` from the operand
    /// types. Mismatched operand types are an error.
    pub(crate) fn specialize_binary(
        &mut self,
        location: Location,
        operator: BinaryOp,
        left: Expr,
        right: Expr,
    ) -> Option<Expr> {
        let lt = left.ty();
        let rt = right.ty();
        let l = Box::new(left);
        let r = Box::new(right);

        let mismatch = |checker: &mut Self| {
            checker.error_at(
                location,
                codes::OPERATOR_TYPES,
                format!("Operator not defined for {} and {}", lt, rt),
            );
            None
        };

        match operator {
            BinaryOp::Add => match (&lt, &rt) {
                (Type::Int, Type::Int) => Some(Expr::IntAddition(l, r)),
                (Type::Float, Type::Float) => Some(Expr::FloatAddition(l, r)),
                (Type::Str, Type::Str) => Some(Expr::StrAddition(l, r)),
                _ => mismatch(self),
            },
            BinaryOp::Subtract => match (&lt, &rt) {
                (Type::Int, Type::Int) => Some(Expr::IntSubtraction(l, r)),
                (Type::Float, Type::Float) => Some(Expr::FloatSubtraction(l, r)),
                _ => mismatch(self),
            },
            BinaryOp::Multiply => match (&lt, &rt) {
                (Type::Int, Type::Int) => Some(Expr::IntMultiplication(l, r)),
                (Type::Float, Type::Float) => Some(Expr::FloatMultiplication(l, r)),
                _ => mismatch(self),
            },
            BinaryOp::Divide => match (&lt, &rt) {
                (Type::Int, Type::Int) => Some(Expr::IntDivision(l, r)),
                (Type::Float, Type::Float) => Some(Expr::FloatDivision(l, r)),
                _ => mismatch(self),
            },
            BinaryOp::Modulo => match (&lt, &rt) {
                (Type::Int, Type::Int) => Some(Expr::IntModulo(l, r)),
                _ => mismatch(self),
            },
            BinaryOp::Less | BinaryOp::LessEqual | BinaryOp::Greater | BinaryOp::GreaterEqual => {
                match (&lt, &rt) {
                    (Type::Int, Type::Int) => Some(match operator {
                        BinaryOp::Less => Expr::IntLess(l, r),
                        BinaryOp::LessEqual => Expr::IntLessEqual(l, r),
                        BinaryOp::Greater => Expr::IntGreater(l, r),
                        _ => Expr::IntGreaterEqual(l, r),
                    }),
                    (Type::Float, Type::Float) => Some(match operator {
                        BinaryOp::Less => Expr::FloatLess(l, r),
                        BinaryOp::LessEqual => Expr::FloatLessEqual(l, r),
                        BinaryOp::Greater => Expr::FloatGreater(l, r),
                        _ => Expr::FloatGreaterEqual(l, r),
                    }),
                    _ => mismatch(self),
                }
            }
            BinaryOp::Equal | BinaryOp::NotEqual => {
                let negated = operator == BinaryOp::NotEqual;
                if lt != rt {
                    return mismatch(self);
                }
                match &lt {
                    Type::Int => Some(Expr::IntEquality {
                        negated,
                        left: l,
                        right: r,
                    }),
                    Type::Float => Some(Expr::FloatEquality {
                        negated,
                        left: l,
                        right: r,
                    }),
                    Type::Str => Some(Expr::StrEquality {
                        negated,
                        left: l,
                        right: r,
                    }),
                    Type::Bool => Some(Expr::BoolEquality {
                        negated,
                        left: l,
                        right: r,
                    }),
                    Type::Enum(_) => Some(Expr::EnumEquality {
                        negated,
                        left: l,
                        right: r,
                    }),
                    other => {
                        self.error_at(
                            location,
                            codes::OPERATOR_TYPES,
                            format!("Equality is not defined for {}", other),
                        );
                        None
                    }
                }
            }
            BinaryOp::And | BinaryOp::Or => {
                if lt != Type::Bool || rt != Type::Bool {
                    return mismatch(self);
                }
                Some(if operator == BinaryOp::And {
                    Expr::And(l, r)
                } else {
                    Expr::Or(l, r)
                })
            }
        }
    }

    /// `a op1 b op2 c` lowers to `(a op1 b) and (b op2 c)` with the
    /// shared operands hoisted into temporaries so each evaluates
    /// once. The final operand stays inline and keeps short-circuit
    /// laziness.
    fn check_chained_comparison(
        &mut self,
        location: Location,
        operands: &[Expression],
        operators: &[BinaryOp],
    ) -> Option<Expr> {
        let typed: Vec<Expr> = operands
            .iter()
            .map(|o| self.check_expression(o, None))
            .collect::<Option<Vec<_>>>()?;

        let element_type = typed[0].ty();
        if element_type != Type::Int && element_type != Type::Float {
            self.error_at(
                location,
                codes::OPERATOR_TYPES,
                format!("Comparisons require Int or Float, got {}", element_type),
            );
            return None;
        }
        for operand in &typed {
            if operand.ty() != element_type {
                self.error_at(
                    location,
                    codes::OPERATOR_TYPES,
                    format!(
                        "Chained comparison mixes {} and {}",
                        element_type,
                        operand.ty()
                    ),
                );
                return None;
            }
        }

        let count = typed.len();
        let mut exprs = Vec::new();
        let mut names = Vec::new();
        let mut last = None;
        for (i, operand) in typed.into_iter().enumerate() {
            if i < count - 1 {
                let name = self.fresh_temp();
                self.scopes.declare_var(&name, element_type.clone(), false);
                exprs.push(Expr::VariableDef {
                    name: name.clone(),
                    value: Box::new(operand),
                });
                names.push(name);
            } else {
                // The final operand stays inline in the last
                // comparison and keeps short-circuit laziness.
                last = Some(operand);
            }
        }

        let var = |name: &str, ty: &Type| Expr::Variable {
            name: name.to_string(),
            ty: ty.clone(),
        };
        let mut folded: Option<Expr> = None;
        for (i, operator) in operators.iter().enumerate() {
            let left = var(&names[i], &element_type);
            let right = if i + 1 < count - 1 {
                var(&names[i + 1], &element_type)
            } else {
                last.take()?
            };
            let comparison = self.specialize_binary(location, *operator, left, right)?;
            folded = Some(match folded {
                Some(acc) => Expr::And(Box::new(acc), Box::new(comparison)),
                None => comparison,
            });
        }
        exprs.push(folded?);
        Some(Expr::Sequence(Block { exprs }))
    }

    // ==================== Calls ====================

    fn check_function_call(
        &mut self,
        location: Location,
        name: &str,
        type_args: &[TypeExpr],
        args: &[CallArg],
    ) -> Option<Expr> {
        // `panic(msg)` aborts execution with the source location.
        if name == "panic" {
            if args.len() != 1 {
                self.error_at(
                    location,
                    codes::ARGUMENT_COUNT,
                    "panic takes exactly one argument".to_string(),
                );
                return None;
            }
            let message = self.check_expression(&args[0].value, Some(&Type::Str))?;
            if message.ty() != Type::Str {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("panic takes a Str message, got {}", message.ty()),
                );
            }
            return Some(Expr::Panic {
                message: Box::new(message),
                line: location.line,
                column: location.column,
            });
        }

        // Local binding holding a function value (closure or passed
        // function).
        if let Some(info) = self.scopes.lookup_var(name) {
            let Type::Function(signature) = info.ty else {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("'{}' is not callable", name),
                );
                return None;
            };
            let checked = self.check_call_args(location, &signature, type_args, args)?;
            return Some(Expr::FunctionCall {
                name: name.to_string(),
                args: checked.args,
                signature: checked.signature,
            });
        }

        if let Some(signature) = self.fn_sigs.get(name).cloned() {
            self.called_fns.insert(name.to_string());
            let checked = self.check_call_args(location, &signature, type_args, args)?;
            return Some(Expr::FunctionCall {
                name: name.to_string(),
                args: checked.args,
                signature: checked.signature,
            });
        }

        if let Some(external) = self.externs.get(name).cloned() {
            let checked =
                self.check_call_args(location, &external.signature, type_args, args)?;
            return Some(Expr::ExternCall {
                name: name.to_string(),
                binding: external.binding.clone(),
                args: checked.args,
                signature: checked.signature,
            });
        }

        self.report_undefined(location, name);
        None
    }

    fn check_instance_property(
        &mut self,
        location: Location,
        receiver: &Expression,
        property: &str,
    ) -> Option<Expr> {
        let receiver = self.check_expression(receiver, None)?;
        let receiver_type = receiver.ty();
        let ty = match &receiver_type {
            Type::Struct(def) => match def.fields.get(property) {
                Some(ty) => ty.clone(),
                None => {
                    self.error_at(
                        location,
                        codes::NO_SUCH_FIELD,
                        format!("{} has no field '{}'", def.name, property),
                    );
                    return None;
                }
            },
            Type::Dynamic => Type::Dynamic,
            other => {
                self.error_at(
                    location,
                    codes::NO_SUCH_FIELD,
                    format!("{} has no fields", other),
                );
                return None;
            }
        };
        Some(Expr::InstanceProperty {
            receiver: Box::new(receiver),
            field: property.to_string(),
            ty,
        })
    }

    fn check_instance_method(
        &mut self,
        location: Location,
        receiver: &Expression,
        method: &str,
        args: &[CallArg],
    ) -> Option<Expr> {
        let receiver_expr = self.check_expression(receiver, None)?;
        let receiver_type = receiver_expr.ty();

        let signature = self.lookup_method(&receiver_type, method);
        let Some(signature) = signature else {
            self.error_at(
                location,
                codes::NO_SUCH_METHOD,
                format!("{} has no method '{}'", receiver_type, method),
            );
            return None;
        };

        // A mutating method needs a mut receiver binding.
        if signature.mutates && !self.receiver_is_mutable(&receiver_expr) {
            self.error_at(
                location,
                codes::MUT_METHOD_ON_LET,
                format!(
                    "Cannot call mutating method '{}' on an immutable binding",
                    method
                ),
            );
        }

        let checked = self.check_call_args(location, &signature, &[], args)?;
        Some(Expr::InstanceMethod {
            receiver: Box::new(receiver_expr),
            receiver_type,
            method: method.to_string(),
            args: checked.args,
            signature: checked.signature,
        })
    }

    /// Method lookup order: the type's direct methods, then its trait
    /// implementations (same table), then builtin methods, then trait
    /// declarations for trait-typed values.
    fn lookup_method(&self, receiver: &Type, method: &str) -> Option<Rc<FunctionType>> {
        let type_name = match receiver {
            Type::Struct(def) => Some(def.name.clone()),
            Type::Enum(def) => Some(def.name.clone()),
            _ => None,
        };
        if let Some(name) = type_name {
            if let Some(sig) = self
                .method_sigs
                .get(&name)
                .and_then(|methods| methods.get(method))
            {
                return Some(sig.clone());
            }
        }
        if let Type::Trait(def) = receiver {
            return def.methods.iter().find(|m| m.name == method).cloned();
        }
        builtins::builtin_method(receiver, method)
    }

    fn receiver_is_mutable(&mut self, receiver: &Expr) -> bool {
        match receiver {
            Expr::Variable { name, .. } => self
                .scopes
                .lookup_var(name)
                .map(|info| info.mutable)
                .unwrap_or(false),
            Expr::InstanceProperty { receiver, .. } => self.receiver_is_mutable(receiver),
            _ => false,
        }
    }

    fn check_static_property(
        &mut self,
        location: Location,
        target: &str,
        property: &str,
        expected: Option<&Type>,
    ) -> Option<Expr> {
        // `Maybe::none` needs its inner type from context.
        if target == "Maybe" && property == "none" {
            return match expected {
                Some(Type::Maybe(inner)) => Some(Expr::MaybeNone {
                    inner: (**inner).clone(),
                }),
                _ => {
                    self.error_at(
                        location,
                        codes::CANNOT_INFER,
                        "Cannot infer the type of Maybe::none here; annotate the binding"
                            .to_string(),
                    );
                    None
                }
            };
        }

        if let Some(def) = self.enums.get(target).cloned() {
            return match def.variant_index(property) {
                Some(index) => Some(Expr::EnumVariant { def, index }),
                None => {
                    self.error_at(
                        location,
                        codes::UNDEFINED,
                        format!("{} has no variant '{}'", target, property),
                    );
                    None
                }
            };
        }

        if let Some(entry) = self.imports.get(target) {
            if let Some(symbol) = entry.symbols.get(property) {
                if !symbol.public {
                    self.error_at(
                        location,
                        codes::PRIVATE_ACCESS,
                        format!("'{}' is private to module '{}'", property, target),
                    );
                    return None;
                }
                // Imported enums are reachable as alias::Enum::variant
                // through check_static_function; a bare module member
                // reference is only meaningful for values, which
                // modules do not export.
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("'{}::{}' must be called", target, property),
                );
                return None;
            }
            // Enum variant across modules: alias::Enum::variant comes
            // through with target "alias::Enum".
        }

        if let Some((alias, enum_name)) = target.split_once("::") {
            let def = self
                .imports
                .get(alias)
                .and_then(|e| e.module.as_ref())
                .and_then(|m| m.enums.get(enum_name))
                .cloned();
            if let Some(def) = def {
                return match def.variant_index(property) {
                    Some(index) => Some(Expr::EnumVariant { def, index }),
                    None => {
                        self.error_at(
                            location,
                            codes::UNDEFINED,
                            format!("{} has no variant '{}'", enum_name, property),
                        );
                        None
                    }
                };
            }
        }

        self.report_undefined(location, target);
        None
    }

    fn check_static_function(
        &mut self,
        location: Location,
        target: &str,
        function: &str,
        type_args: &[TypeExpr],
        args: &[CallArg],
        expected: Option<&Type>,
    ) -> Option<Expr> {
        // `Maybe::some(x)` wraps explicitly.
        if target == "Maybe" && function == "some" {
            if args.len() != 1 {
                self.error_at(
                    location,
                    codes::ARGUMENT_COUNT,
                    "Maybe::some takes exactly one argument".to_string(),
                );
                return None;
            }
            let inner = self.check_expression(&args[0].value, None)?;
            return Some(Expr::MaybeSome(Box::new(inner)));
        }

        // `Result::ok(v)` / `Result::err(e)` need the other side's
        // type from context: the expected type here, or the enclosing
        // function's declared Result return.
        if target == "Result" && (function == "ok" || function == "err") {
            if args.len() != 1 {
                self.error_at(
                    location,
                    codes::ARGUMENT_COUNT,
                    format!("Result::{} takes exactly one argument", function),
                );
                return None;
            }
            let context = match expected {
                Some(Type::Result(ok, err)) => Some(((**ok).clone(), (**err).clone())),
                _ => match self.return_types.last() {
                    Some(Type::Result(ok, err)) => Some(((**ok).clone(), (**err).clone())),
                    _ => None,
                },
            };
            let Some((ok_type, err_type)) = context else {
                self.error_at(
                    location,
                    codes::CANNOT_INFER,
                    format!(
                        "Cannot infer the Result type of Result::{} here; annotate the binding or the return type",
                        function
                    ),
                );
                return None;
            };
            if function == "ok" {
                let inner = self.check_expression(&args[0].value, Some(&ok_type))?;
                return Some(Expr::ResultOk {
                    inner: Box::new(inner),
                    err_type,
                });
            }
            let inner = self.check_expression(&args[0].value, Some(&err_type))?;
            return Some(Expr::ResultErr {
                inner: Box::new(inner),
                ok_type,
            });
        }

        // Qualified static call through an import: alias::Type::fn.
        if let Some((alias, type_name)) = target.split_once("::") {
            let signature = self
                .imports
                .get(alias)
                .and_then(|e| e.module.as_ref())
                .and_then(|m| m.statics.get(type_name))
                .and_then(|t| t.get(function))
                .map(|f| f.signature.clone());
            let Some(signature) = signature else {
                self.report_undefined(location, &format!("{}::{}", target, function));
                return None;
            };
            let checked = self.check_call_args(location, &signature, type_args, args)?;
            return Some(Expr::ModuleStaticFunctionCall {
                module: alias.to_string(),
                target: type_name.to_string(),
                function: function.to_string(),
                args: checked.args,
                signature: checked.signature,
            });
        }

        // Module function call: alias::fn(args). Builtin calls carry
        // the package path so the runtime can dispatch its registry.
        if let Some(entry) = self.imports.get(target) {
            let builtin = entry.builtin;
            let module_key = if builtin {
                entry.path.clone()
            } else {
                target.to_string()
            };
            let Some(symbol) = entry.symbols.get(function) else {
                self.report_undefined(location, &format!("{}::{}", target, function));
                return None;
            };
            if !symbol.public {
                self.error_at(
                    location,
                    codes::PRIVATE_ACCESS,
                    format!("'{}' is private to module '{}'", function, target),
                );
                return None;
            }
            let Type::Function(signature) = symbol.ty.clone() else {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("'{}::{}' is not callable", target, function),
                );
                return None;
            };
            let checked = self.check_call_args(location, &signature, type_args, args)?;
            return Some(Expr::ModuleFunctionCall {
                module: module_key,
                function: function.to_string(),
                builtin,
                args: checked.args,
                signature: checked.signature,
            });
        }

        // Static function on a local type.
        if let Some(signature) = self
            .static_sigs
            .get(target)
            .and_then(|t| t.get(function))
            .cloned()
        {
            let checked = self.check_call_args(location, &signature, type_args, args)?;
            return Some(Expr::StaticFunctionCall {
                target: target.to_string(),
                function: function.to_string(),
                args: checked.args,
                signature: checked.signature,
            });
        }

        self.report_undefined(location, &format!("{}::{}", target, function));
        None
    }

    // ==================== Argument checking ====================

    fn check_call_args(
        &mut self,
        location: Location,
        signature: &Rc<FunctionType>,
        type_args: &[TypeExpr],
        args: &[CallArg],
    ) -> Option<CheckedCall> {
        if args.len() != signature.params.len() {
            self.error_at(
                location,
                codes::ARGUMENT_COUNT,
                format!(
                    "'{}' takes {} argument{} but {} {} supplied",
                    signature.name,
                    signature.params.len(),
                    if signature.params.len() == 1 { "" } else { "s" },
                    args.len(),
                    if args.len() == 1 { "was" } else { "were" }
                ),
            );
            return None;
        }

        // Explicit type arguments pin generics up front.
        let mut substitution: HashMap<String, Type> = HashMap::new();
        if !type_args.is_empty() {
            if type_args.len() != signature.type_params.len() {
                self.error_at(
                    location,
                    codes::GENERIC_MISMATCH,
                    format!(
                        "'{}' takes {} type argument(s) but {} were supplied",
                        signature.name,
                        signature.type_params.len(),
                        type_args.len()
                    ),
                );
                return None;
            }
            for (param, arg) in signature.type_params.iter().zip(type_args) {
                let name = param.trim_start_matches('$').to_string();
                let ty = self.resolve_type(arg, location);
                substitution.insert(name, ty);
            }
        }

        // Reorder named arguments onto their parameters.
        let mut ordered: Vec<Option<&CallArg>> = vec![None; signature.params.len()];
        let mut next_positional = 0usize;
        for arg in args {
            match &arg.name {
                Some(name) => {
                    let Some(index) = signature.params.iter().position(|p| &p.name == name)
                    else {
                        self.error_at(
                            location,
                            codes::ARGUMENT_COUNT,
                            format!("'{}' has no parameter named '{}'", signature.name, name),
                        );
                        return None;
                    };
                    if ordered[index].is_some() {
                        self.error_at(
                            location,
                            codes::ARGUMENT_COUNT,
                            format!("Argument '{}' supplied twice", name),
                        );
                        return None;
                    }
                    ordered[index] = Some(arg);
                }
                None => {
                    while next_positional < ordered.len() && ordered[next_positional].is_some() {
                        next_positional += 1;
                    }
                    if next_positional < ordered.len() {
                        ordered[next_positional] = Some(arg);
                        next_positional += 1;
                    }
                }
            }
        }

        let mut checked_args = Vec::new();
        for (param, slot) in signature.params.iter().zip(ordered) {
            let Some(arg) = slot else {
                self.error_at(
                    location,
                    codes::ARGUMENT_COUNT,
                    format!("Missing argument '{}'", param.name),
                );
                return None;
            };

            let expected = substitute(&param.ty, &substitution);
            let hint = if contains_generic(&expected) {
                None
            } else {
                Some(expected.clone())
            };
            let value = self.check_expression(&arg.value, hint.as_ref())?;
            let value_type = value.ty();

            if !unify(&expected, &value_type, &mut substitution)
                && !self.assignable(&expected, &value_type)
            {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!(
                        "Argument '{}' expects {}, got {}",
                        param.name, expected, value_type
                    ),
                );
            }

            // Mutable parameters share the caller's value; everything
            // else gets the deep-copy guarantee.
            if param.mutable {
                if !arg.mutable {
                    self.error_at(
                        location,
                        codes::MUT_METHOD_ON_LET,
                        format!("Argument '{}' must be marked 'mut'", param.name),
                    );
                }
                if !self.receiver_is_mutable(&value) {
                    self.error_at(
                        location,
                        codes::MUT_METHOD_ON_LET,
                        format!(
                            "Argument '{}' requires a mutable binding",
                            param.name
                        ),
                    );
                }
                checked_args.push(value);
            } else {
                if arg.mutable {
                    self.error_at(
                        location,
                        codes::MUT_METHOD_ON_LET,
                        format!("Parameter '{}' is not mutable", param.name),
                    );
                }
                if value_type.is_aggregate() {
                    checked_args.push(Expr::CopyExpression(Box::new(value)));
                } else {
                    checked_args.push(value);
                }
            }
        }

        // Generics are erased; the unified signature is recorded for
        // diagnostics and the call's static type.
        let signature = if signature.type_params.is_empty() {
            signature.clone()
        } else {
            Rc::new(FunctionType {
                name: signature.name.clone(),
                type_params: Vec::new(),
                params: signature
                    .params
                    .iter()
                    .map(|p| ParamType {
                        name: p.name.clone(),
                        ty: substitute(&p.ty, &substitution),
                        mutable: p.mutable,
                    })
                    .collect(),
                return_type: substitute(&signature.return_type, &substitution),
                mutates: signature.mutates,
            })
        };

        Some(CheckedCall {
            args: checked_args,
            signature,
        })
    }

    // ==================== Control expressions ====================

    fn check_if(
        &mut self,
        location: Location,
        condition: &Expression,
        body: &ard_ast::Block,
        else_branch: Option<&ElseBranch>,
    ) -> Option<Expr> {
        let condition = self.check_expression(condition, Some(&Type::Bool))?;
        if condition.ty() != Type::Bool {
            self.error_at(
                location,
                codes::TYPE_MISMATCH,
                format!("Condition must be Bool, got {}", condition.ty()),
            );
        }
        let then_block = self.check_block(body);
        let else_block = match else_branch {
            Some(ElseBranch::Block(block)) => Some(self.check_block(block)),
            Some(ElseBranch::If(nested)) => {
                let nested = self.check_expression(nested, None)?;
                Some(Block { exprs: vec![nested] })
            }
            None => None,
        };

        // An if is an expression only when both branches agree.
        let ty = match &else_block {
            Some(else_block) if then_block.ty() == else_block.ty() => then_block.ty(),
            _ => Type::Void,
        };

        Some(Expr::If {
            condition: Box::new(condition),
            then_block,
            else_block,
            ty,
        })
    }

    fn check_try(
        &mut self,
        location: Location,
        expression: &Expression,
        catch_name: Option<&str>,
        catch_block: Option<&ard_ast::Block>,
    ) -> Option<Expr> {
        let inner = self.check_expression(expression, None)?;
        let Type::Result(ok, err) = inner.ty() else {
            self.error_at(
                location,
                codes::TYPE_MISMATCH,
                format!("'try' requires a Result value, got {}", inner.ty()),
            );
            return None;
        };

        let checked_catch = match (catch_name, catch_block) {
            (Some(name), Some(block)) => {
                self.scopes.push(FrameKind::Block);
                self.scopes.declare_var(name, (*err).clone(), false);
                let checked = self.check_block_statements(block);
                self.scopes.pop();
                let catch_type = checked.ty();
                if catch_type != Type::Void && !ok.accepts(&catch_type) {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!(
                            "Catch block produces {}, expected {}",
                            catch_type, ok
                        ),
                    );
                }
                Some((name.to_string(), checked))
            }
            _ => {
                // Without a catch, the first error becomes the current
                // function's result; the return type must carry it.
                match self.return_types.last() {
                    Some(Type::Result(_, ret_err)) if ret_err.accepts(&err) => {}
                    Some(other) => {
                        self.error_at(
                            location,
                            codes::TYPE_MISMATCH,
                            format!(
                                "'try' without a catch requires the function to return a Result carrying {}, but it returns {}",
                                err, other
                            ),
                        );
                    }
                    None => {
                        self.error_at(
                            location,
                            codes::TYPE_MISMATCH,
                            "'try' without a catch is only valid inside a function returning a Result"
                                .to_string(),
                        );
                    }
                }
                None
            }
        };

        Some(Expr::TryOp {
            expression: Box::new(inner),
            catch_binding: checked_catch.as_ref().map(|(n, _)| n.clone()),
            catch_block: checked_catch.map(|(_, b)| b),
            ty: (*ok).clone(),
        })
    }

    fn check_anonymous_function(
        &mut self,
        location: Location,
        parameters: &[ard_ast::Parameter],
        return_type: Option<&TypeExpr>,
        body: &ard_ast::Block,
    ) -> Option<Expr> {
        let params = self.resolve_parameters(parameters);
        let declared_return = return_type.map(|t| self.resolve_type(t, location));

        self.scopes.begin_capture();
        self.scopes.push(FrameKind::Function);
        for param in &params {
            self.scopes
                .declare_var(&param.name, param.ty.clone(), param.mutable);
        }
        self.return_types
            .push(declared_return.clone().unwrap_or(Type::Void));
        let checked_body = self.check_block_statements(body);
        self.return_types.pop();
        self.scopes.pop();
        let captures = self.scopes.end_capture();

        let body_type = checked_body.ty();
        let return_type = match declared_return {
            Some(declared) => {
                if declared != Type::Void && !declared.accepts(&body_type) {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!(
                            "Anonymous function returns {} but its body produces {}",
                            declared, body_type
                        ),
                    );
                }
                declared
            }
            None => body_type,
        };

        Some(Expr::Closure {
            params: params
                .iter()
                .map(|p| ClosureParam {
                    name: p.name.clone(),
                    ty: p.ty.clone(),
                    mutable: p.mutable,
                })
                .collect(),
            return_type,
            body: Rc::new(checked_body),
            captures,
        })
    }
}

struct CheckedCall {
    args: Vec<Expr>,
    signature: Rc<FunctionType>,
}

/// Structural unification of an expected type (possibly containing
/// generics) against a concrete one.
fn unify(expected: &Type, actual: &Type, substitution: &mut HashMap<String, Type>) -> bool {
    match (expected, actual) {
        (Type::Generic(name), _) => match substitution.get(name) {
            Some(bound) => bound.accepts(actual),
            None => {
                substitution.insert(name.clone(), actual.clone());
                true
            }
        },
        (Type::List(a), Type::List(b)) => unify(a, b, substitution),
        (Type::Map(ak, av), Type::Map(bk, bv)) => {
            unify(ak, bk, substitution) && unify(av, bv, substitution)
        }
        (Type::Maybe(a), Type::Maybe(b)) => unify(a, b, substitution),
        (Type::Result(av, ae), Type::Result(bv, be)) => {
            unify(av, bv, substitution) && unify(ae, be, substitution)
        }
        (Type::Function(a), Type::Function(b)) => {
            a.params.len() == b.params.len()
                && a.params
                    .iter()
                    .zip(&b.params)
                    .all(|(x, y)| unify(&x.ty, &y.ty, substitution))
                && unify(&a.return_type, &b.return_type, substitution)
        }
        _ => expected.accepts(actual),
    }
}

fn substitute(ty: &Type, substitution: &HashMap<String, Type>) -> Type {
    match ty {
        Type::Generic(name) => substitution
            .get(name)
            .cloned()
            .unwrap_or_else(|| ty.clone()),
        Type::List(item) => Type::List(Box::new(substitute(item, substitution))),
        Type::Map(k, v) => Type::Map(
            Box::new(substitute(k, substitution)),
            Box::new(substitute(v, substitution)),
        ),
        Type::Maybe(inner) => Type::Maybe(Box::new(substitute(inner, substitution))),
        Type::Result(ok, err) => Type::Result(
            Box::new(substitute(ok, substitution)),
            Box::new(substitute(err, substitution)),
        ),
        Type::Function(sig) => Type::Function(Rc::new(FunctionType {
            name: sig.name.clone(),
            type_params: sig.type_params.clone(),
            params: sig
                .params
                .iter()
                .map(|p| ParamType {
                    name: p.name.clone(),
                    ty: substitute(&p.ty, substitution),
                    mutable: p.mutable,
                })
                .collect(),
            return_type: substitute(&sig.return_type, substitution),
            mutates: sig.mutates,
        })),
        other => other.clone(),
    }
}

fn contains_generic(ty: &Type) -> bool {
    match ty {
        Type::Generic(_) => true,
        Type::List(item) | Type::Maybe(item) => contains_generic(item),
        Type::Map(k, v) | Type::Result(k, v) => contains_generic(k) || contains_generic(v),
        Type::Function(sig) => {
            sig.params.iter().any(|p| contains_generic(&p.ty))
                || contains_generic(&sig.return_type)
        }
        _ => false,
    }
}
