// Statement checking: bindings, assignment forms, and loops. Each
// statement lowers to a typed IR expression (declarations that carry
// no runtime behavior lower to nothing).

use super::Checker;
use crate::ir::{AssignTarget, Block, Expr};
use crate::scope::FrameKind;
use crate::types::Type;
use ard_ast::{CompoundOp, Expression, ExpressionKind, Location, Statement, StatementKind};
use ard_diagnostics::codes;

impl Checker<'_> {
    pub(crate) fn check_statement(&mut self, statement: &Statement) -> Option<Expr> {
        match &statement.kind {
            StatementKind::VariableDeclaration {
                name,
                mutable,
                declared_type,
                value,
            } => self.check_variable_declaration(
                statement.location,
                name,
                *mutable,
                declared_type.as_ref(),
                value,
            ),
            StatementKind::Assignment { target, value } => {
                self.check_assignment(statement.location, target, value)
            }
            StatementKind::CompoundAssignment {
                target,
                operator,
                value,
            } => self.check_compound_assignment(statement.location, target, *operator, value),
            StatementKind::WhileLoop { condition, body } => {
                self.check_while(statement.location, condition.as_ref(), body)
            }
            StatementKind::RangeLoop {
                cursor,
                cursor2,
                start,
                end,
                body,
            } => self.check_range_loop(
                statement.location,
                cursor,
                cursor2.as_deref(),
                start,
                end,
                body,
            ),
            StatementKind::ForInLoop {
                cursor,
                cursor2,
                iterable,
                body,
            } => self.check_for_in(
                statement.location,
                cursor,
                cursor2.as_deref(),
                iterable,
                body,
            ),
            StatementKind::ForLoop {
                init,
                condition,
                step,
                body,
            } => self.check_c_style_for(statement.location, init, condition, step, body),
            StatementKind::Break => {
                if !self.scopes.in_loop() {
                    self.error_at(
                        statement.location,
                        codes::BREAK_OUTSIDE_LOOP,
                        "'break' outside of a loop".to_string(),
                    );
                }
                Some(Expr::Break)
            }
            StatementKind::Expression(expression) => {
                let expr = self.check_expression(expression, None)?;
                Some(expr)
            }
            // Top-level declarations are handled by the earlier
            // passes; reaching one here means it was nested.
            _ => {
                self.error_at(
                    statement.location,
                    codes::SYNTAX,
                    "Declarations are only permitted at the top level of a file".to_string(),
                );
                None
            }
        }
    }

    /// A block in its own scope frame. Non-final `Result` values are
    /// flagged as unused.
    pub(crate) fn check_block(&mut self, block: &ard_ast::Block) -> Block {
        self.scopes.push(FrameKind::Block);
        let checked = self.check_block_statements(block);
        self.scopes.pop();
        checked
    }

    /// Like `check_block` but in the current frame (used for function
    /// bodies whose frame already holds the parameters).
    pub(crate) fn check_block_statements(&mut self, block: &ard_ast::Block) -> Block {
        let mut exprs = Vec::new();
        let count = block.statements.len();
        for (i, statement) in block.statements.iter().enumerate() {
            let location = statement.location;
            if let Some(expr) = self.check_statement(statement) {
                if i + 1 < count {
                    if let Type::Result(_, _) = expr.ty() {
                        self.warn_at(
                            location,
                            codes::UNUSED_RESULT,
                            "Unused Result value; handle it with 'try', 'match', or a method"
                                .to_string(),
                        );
                    }
                }
                exprs.push(expr);
            }
        }
        Block { exprs }
    }

    fn check_variable_declaration(
        &mut self,
        location: Location,
        name: &str,
        mutable: bool,
        declared_type: Option<&ard_ast::TypeExpr>,
        value: &Expression,
    ) -> Option<Expr> {
        let expected = declared_type.map(|t| self.resolve_type(t, location));
        let value_expr = self.check_expression(value, expected.as_ref())?;
        let value_type = value_expr.ty();

        if value_type == Type::Void {
            self.error_at(
                location,
                codes::TYPE_MISMATCH,
                format!("Cannot bind '{}' to a Void value", name),
            );
        }

        let binding_type = match expected {
            Some(declared) => {
                if !self.assignable(&declared, &value_type) {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!("Expected {}, got {}", declared, value_type),
                    );
                }
                declared
            }
            None => value_type,
        };

        self.scopes.declare_var(name, binding_type.clone(), mutable);

        // Bindings take a deep copy of aggregates so the new name can
        // never observe later mutation through the old one.
        let value_expr = if binding_type.is_aggregate() {
            Expr::CopyExpression(Box::new(value_expr))
        } else {
            value_expr
        };

        Some(Expr::VariableDef {
            name: name.to_string(),
            value: Box::new(value_expr),
        })
    }

    fn check_assignment(
        &mut self,
        location: Location,
        target: &Expression,
        value: &Expression,
    ) -> Option<Expr> {
        let target = self.check_assign_target(location, target)?;
        let target_type = target.ty();
        let value_expr = self.check_expression(value, Some(&target_type))?;
        let value_type = value_expr.ty();
        if !self.assignable(&target_type, &value_type) {
            self.error_at(
                location,
                codes::TYPE_MISMATCH,
                format!("Expected {}, got {}", target_type, value_type),
            );
        }
        let value_expr = if target_type.is_aggregate() {
            Expr::CopyExpression(Box::new(value_expr))
        } else {
            value_expr
        };
        Some(Expr::Reassignment {
            target,
            value: Box::new(value_expr),
        })
    }

    fn check_compound_assignment(
        &mut self,
        location: Location,
        target: &Expression,
        operator: CompoundOp,
        value: &Expression,
    ) -> Option<Expr> {
        let resolved = self.check_assign_target(location, target)?;
        let target_type = resolved.ty();
        let value_expr = self.check_expression(value, Some(&target_type))?;
        let current = match &resolved {
            AssignTarget::Variable { name, ty } => Expr::Variable {
                name: name.clone(),
                ty: ty.clone(),
            },
            AssignTarget::Field { object, field, ty } => Expr::InstanceProperty {
                receiver: object.clone(),
                field: field.clone(),
                ty: ty.clone(),
            },
        };
        let combined = match (&target_type, operator) {
            (Type::Int, CompoundOp::Increment) => {
                Expr::IntAddition(Box::new(current), Box::new(value_expr))
            }
            (Type::Int, CompoundOp::Decrement) => {
                Expr::IntSubtraction(Box::new(current), Box::new(value_expr))
            }
            (Type::Float, CompoundOp::Increment) => {
                Expr::FloatAddition(Box::new(current), Box::new(value_expr))
            }
            (Type::Float, CompoundOp::Decrement) => {
                Expr::FloatSubtraction(Box::new(current), Box::new(value_expr))
            }
            _ => {
                self.error_at(
                    location,
                    codes::OPERATOR_TYPES,
                    format!("'=+' and '=-' require Int or Float, got {}", target_type),
                );
                return None;
            }
        };
        Some(Expr::Reassignment {
            target: resolved,
            value: Box::new(combined),
        })
    }

    /// Resolve an assignment target and enforce mutability: the root
    /// binding of the target path must be `mut`.
    fn check_assign_target(
        &mut self,
        location: Location,
        target: &Expression,
    ) -> Option<AssignTarget> {
        match &target.kind {
            ExpressionKind::Identifier(name) => {
                let Some(info) = self.scopes.lookup_var(name) else {
                    self.report_undefined(location, name);
                    return None;
                };
                if !info.mutable {
                    self.error_at(
                        location,
                        codes::IMMUTABLE_ASSIGN,
                        format!("Cannot assign to immutable binding '{}'", name),
                    );
                }
                Some(AssignTarget::Variable {
                    name: name.clone(),
                    ty: info.ty,
                })
            }
            ExpressionKind::InstanceProperty { receiver, property } => {
                if let Some(root) = root_identifier(receiver) {
                    let mutable = if root == "@" {
                        self.scopes.lookup_var("@").map(|i| i.mutable).unwrap_or(false)
                    } else {
                        self.scopes
                            .lookup_var(&root)
                            .map(|i| i.mutable)
                            .unwrap_or(false)
                    };
                    if !mutable {
                        self.error_at(
                            location,
                            codes::IMMUTABLE_ASSIGN,
                            format!(
                                "Cannot assign to field of immutable binding '{}'",
                                root
                            ),
                        );
                    }
                }
                let object = self.check_expression(receiver, None)?;
                let object_type = object.ty();
                let field_type = match &object_type {
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
                Some(AssignTarget::Field {
                    object: Box::new(object),
                    field: property.clone(),
                    ty: field_type,
                })
            }
            ExpressionKind::SelfRef => {
                self.error_at(
                    location,
                    codes::IMMUTABLE_ASSIGN,
                    "Cannot reassign '@' itself".to_string(),
                );
                None
            }
            _ => {
                self.error_at(
                    location,
                    codes::SYNTAX,
                    "Invalid assignment target".to_string(),
                );
                None
            }
        }
    }

    fn check_while(
        &mut self,
        location: Location,
        condition: Option<&Expression>,
        body: &ard_ast::Block,
    ) -> Option<Expr> {
        let condition = match condition {
            Some(c) => {
                let checked = self.check_expression(c, Some(&Type::Bool))?;
                if checked.ty() != Type::Bool {
                    self.error_at(
                        location,
                        codes::TYPE_MISMATCH,
                        format!("Loop condition must be Bool, got {}", checked.ty()),
                    );
                }
                Some(Box::new(checked))
            }
            None => None,
        };
        self.scopes.push(FrameKind::Loop);
        let body = self.check_block_statements(body);
        self.scopes.pop();
        Some(Expr::WhileLoop { condition, body })
    }

    fn check_range_loop(
        &mut self,
        location: Location,
        cursor: &str,
        cursor2: Option<&str>,
        start: &Expression,
        end: &Expression,
        body: &ard_ast::Block,
    ) -> Option<Expr> {
        if cursor2.is_some() {
            self.error_at(
                location,
                codes::SYNTAX,
                "Range loops take a single cursor".to_string(),
            );
        }
        let start = self.check_expression(start, Some(&Type::Int))?;
        let end = self.check_expression(end, Some(&Type::Int))?;
        if start.ty() != Type::Int || end.ty() != Type::Int {
            self.error_at(
                location,
                codes::OPERATOR_TYPES,
                "Range bounds must be Int".to_string(),
            );
        }
        self.scopes.push(FrameKind::Loop);
        self.scopes.declare_var(cursor, Type::Int, false);
        let body = self.check_block_statements(body);
        self.scopes.pop();
        Some(Expr::ForIntRange {
            cursor: cursor.to_string(),
            start: Box::new(start),
            end: Box::new(end),
            body,
        })
    }

    /// `for x[, i] in iterable`: the iterable's type selects the IR
    /// form. Strings yield single-character substrings; maps yield
    /// key and value cursors.
    fn check_for_in(
        &mut self,
        location: Location,
        cursor: &str,
        cursor2: Option<&str>,
        iterable: &Expression,
        body: &ard_ast::Block,
    ) -> Option<Expr> {
        let subject = self.check_expression(iterable, None)?;
        let subject_type = subject.ty();
        self.scopes.push(FrameKind::Loop);
        let result = match &subject_type {
            Type::Str => {
                self.scopes.declare_var(cursor, Type::Str, false);
                if let Some(index) = cursor2 {
                    self.scopes.declare_var(index, Type::Int, false);
                }
                let body = self.check_block_statements(body);
                Some(Expr::ForInStr {
                    cursor: cursor.to_string(),
                    index: cursor2.map(|s| s.to_string()),
                    subject: Box::new(subject),
                    body,
                })
            }
            Type::List(item) => {
                let item_type = (**item).clone();
                self.scopes.declare_var(cursor, item_type.clone(), false);
                if let Some(index) = cursor2 {
                    self.scopes.declare_var(index, Type::Int, false);
                }
                let body = self.check_block_statements(body);
                Some(Expr::ForInList {
                    cursor: cursor.to_string(),
                    index: cursor2.map(|s| s.to_string()),
                    subject: Box::new(subject),
                    item_type,
                    body,
                })
            }
            Type::Map(key, value) => {
                let key_type = (**key).clone();
                let value_type = (**value).clone();
                self.scopes.declare_var(cursor, key_type.clone(), false);
                if let Some(second) = cursor2 {
                    self.scopes.declare_var(second, value_type.clone(), false);
                }
                let body = self.check_block_statements(body);
                Some(Expr::ForInMap {
                    key_cursor: cursor.to_string(),
                    value_cursor: cursor2.map(|s| s.to_string()),
                    subject: Box::new(subject),
                    key_type,
                    value_type,
                    body,
                })
            }
            other => {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("Cannot iterate over {}", other),
                );
                None
            }
        };
        self.scopes.pop();
        result
    }

    fn check_c_style_for(
        &mut self,
        location: Location,
        init: &Statement,
        condition: &Expression,
        step: &Statement,
        body: &ard_ast::Block,
    ) -> Option<Expr> {
        // The init binding lives in the loop frame.
        self.scopes.push(FrameKind::Loop);
        let init = self.check_statement(init);
        let condition_expr = self.check_expression(condition, Some(&Type::Bool));
        if let Some(c) = &condition_expr {
            if c.ty() != Type::Bool {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("Loop condition must be Bool, got {}", c.ty()),
                );
            }
        }
        let step = self.check_statement(step);
        let body = self.check_block_statements(body);
        self.scopes.pop();

        Some(Expr::ForLoop {
            init: Box::new(init?),
            condition: Box::new(condition_expr?),
            step: Box::new(step?),
            body,
        })
    }

    pub(crate) fn report_undefined(&mut self, location: Location, name: &str) {
        let candidates = self.scopes.visible_names();
        let mut diagnostic = ard_diagnostics::Diagnostic::error(
            codes::UNDEFINED,
            format!("Undefined: {}", name),
            self.span(location),
        );
        if let Some(suggestion) = ard_diagnostics::fuzzy::did_you_mean(name, &candidates) {
            diagnostic = diagnostic.with_help(format!("did you mean '{}'?", suggestion));
        }
        self.engine.emit(diagnostic);
    }
}

/// The root name of a property-access chain, if the chain bottoms out
/// at a plain binding (or `@`).
fn root_identifier(expression: &Expression) -> Option<String> {
    match &expression.kind {
        ExpressionKind::Identifier(name) => Some(name.clone()),
        ExpressionKind::SelfRef => Some("@".to_string()),
        ExpressionKind::InstanceProperty { receiver, .. } => root_identifier(receiver),
        _ => None,
    }
}
