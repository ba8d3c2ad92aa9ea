// Match lowering. The subject's type selects the specialized IR node;
// exhaustiveness is enforced per shape and arm bodies must agree on a
// type for the match to be an expression.

use super::Checker;
use crate::ir::{Block, Expr};
use crate::scope::FrameKind;
use crate::types::Type;
use ard_ast::{ConditionalCase, Expression, Location, MatchCase, Pattern};
use ard_diagnostics::codes;

impl Checker<'_> {
    pub(crate) fn check_match(
        &mut self,
        location: Location,
        subject: &Expression,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let subject = self.check_expression(subject, None)?;
        let subject_type = subject.ty();
        match &subject_type {
            Type::Bool => self.lower_bool_match(location, subject, cases),
            Type::Int => self.lower_int_match(location, subject, cases),
            Type::Enum(_) => self.lower_enum_match(location, subject, cases),
            Type::Maybe(_) => self.lower_option_match(location, subject, cases),
            Type::Result(_, _) => self.lower_result_match(location, subject, cases),
            Type::Union(_) => self.lower_union_match(location, subject, cases),
            other => {
                self.error_at(
                    location,
                    codes::TYPE_MISMATCH,
                    format!("Cannot match on a value of type {}", other),
                );
                None
            }
        }
    }

    /// The conditional form `match { cond => body, ... }` desugars to
    /// a chained if; the `_` arm is the final else.
    pub(crate) fn check_conditional_match(
        &mut self,
        location: Location,
        cases: &[ConditionalCase],
    ) -> Option<Expr> {
        if cases.is_empty() {
            self.error_at(
                location,
                codes::NON_EXHAUSTIVE,
                "Conditional match needs at least one case".to_string(),
            );
            return None;
        }

        let mut catch_all: Option<Block> = None;
        let mut conditional = Vec::new();
        for case in cases {
            match &case.condition {
                Some(condition) => {
                    let checked = self.check_expression(condition, Some(&Type::Bool))?;
                    if checked.ty() != Type::Bool {
                        self.error_at(
                            case.location,
                            codes::TYPE_MISMATCH,
                            format!("Match condition must be Bool, got {}", checked.ty()),
                        );
                    }
                    if catch_all.is_some() {
                        self.error_at(
                            case.location,
                            codes::UNREACHABLE_PATTERN,
                            "Case after the catch-all is unreachable".to_string(),
                        );
                    }
                    conditional.push((checked, self.check_block(&case.body)));
                }
                None => {
                    catch_all = Some(self.check_block(&case.body));
                }
            }
        }

        // Fold into a chained if from the last case backward.
        let mut else_block = catch_all;
        for (condition, body) in conditional.iter().rev() {
            let agreed = else_block
                .as_ref()
                .map(|e| e.ty() == body.ty())
                .unwrap_or(false);
            let ty = if agreed { body.ty() } else { Type::Void };
            let nested = Expr::If {
                condition: Box::new(condition.clone()),
                then_block: body.clone(),
                else_block: else_block.take(),
                ty,
            };
            else_block = Some(Block { exprs: vec![nested] });
        }
        else_block.map(Expr::Sequence)
    }

    fn lower_bool_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let mut true_block = None;
        let mut false_block = None;
        let mut catch_all = None;
        for case in cases {
            match &case.pattern {
                Pattern::Bool(true) => true_block = Some(self.check_block(&case.body)),
                Pattern::Bool(false) => false_block = Some(self.check_block(&case.body)),
                Pattern::CatchAll => catch_all = Some(self.check_block(&case.body)),
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match a Bool subject", other),
                    );
                }
            }
        }
        let true_block = true_block.or_else(|| catch_all.clone());
        let false_block = false_block.or(catch_all);
        let (Some(true_block), Some(false_block)) = (true_block, false_block) else {
            self.error_at(
                location,
                codes::NON_EXHAUSTIVE,
                "Match on Bool must cover both true and false".to_string(),
            );
            return None;
        };
        let ty = self.agreed_type(&[&true_block, &false_block]);
        Some(Expr::BoolMatch {
            subject: Box::new(subject),
            true_block,
            false_block,
            ty,
        })
    }

    fn lower_int_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let mut int_cases: Vec<(i64, Block)> = Vec::new();
        let mut range_cases: Vec<(i64, i64, Block)> = Vec::new();
        let mut catch_all = None;
        for case in cases {
            match &case.pattern {
                Pattern::Int(value) => {
                    if int_cases.iter().any(|(v, _)| v == value) {
                        self.error_at(
                            case.location,
                            codes::UNREACHABLE_PATTERN,
                            format!("Duplicate case {}", value),
                        );
                    }
                    int_cases.push((*value, self.check_block(&case.body)));
                }
                Pattern::Range(low, high) => {
                    if low >= high {
                        self.error_at(
                            case.location,
                            codes::OVERLAPPING_RANGE,
                            format!("Empty range {}..{}", low, high),
                        );
                    }
                    // End-exclusive overlap test against earlier ranges.
                    for (other_low, other_high, _) in &range_cases {
                        if low < other_high && other_low < high {
                            self.error_at(
                                case.location,
                                codes::OVERLAPPING_RANGE,
                                format!(
                                    "Range {}..{} overlaps earlier range {}..{}",
                                    low, high, other_low, other_high
                                ),
                            );
                        }
                    }
                    range_cases.push((*low, *high, self.check_block(&case.body)));
                }
                Pattern::CatchAll => catch_all = Some(self.check_block(&case.body)),
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match an Int subject", other),
                    );
                }
            }
        }
        if catch_all.is_none() {
            self.error_at(
                location,
                codes::NON_EXHAUSTIVE,
                "Match on Int needs a catch-all '_' case".to_string(),
            );
            return None;
        }
        let mut blocks: Vec<&Block> = int_cases.iter().map(|(_, b)| b).collect();
        blocks.extend(range_cases.iter().map(|(_, _, b)| b));
        blocks.extend(catch_all.as_ref());
        let ty = self.agreed_type(&blocks);
        Some(Expr::IntMatch {
            subject: Box::new(subject),
            int_cases,
            range_cases,
            catch_all,
            ty,
        })
    }

    fn lower_enum_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let Type::Enum(def) = subject.ty() else {
            return None;
        };
        let mut arms: Vec<Option<Block>> = vec![None; def.variants.len()];
        let mut catch_all = None;
        for case in cases {
            match &case.pattern {
                Pattern::EnumVariant { enum_name, variant } => {
                    if let Some(named) = enum_name {
                        if named != &def.name {
                            self.error_at(
                                case.location,
                                codes::TYPE_MISMATCH,
                                format!("Pattern names {}, subject is {}", named, def.name),
                            );
                            continue;
                        }
                    }
                    let Some(index) = def.variant_index(variant) else {
                        self.error_at(
                            case.location,
                            codes::UNDEFINED,
                            format!("{} has no variant '{}'", def.name, variant),
                        );
                        continue;
                    };
                    if arms[index as usize].is_some() {
                        self.error_at(
                            case.location,
                            codes::UNREACHABLE_PATTERN,
                            format!("Duplicate case '{}'", variant),
                        );
                        continue;
                    }
                    arms[index as usize] = Some(self.check_block(&case.body));
                }
                Pattern::CatchAll => catch_all = Some(self.check_block(&case.body)),
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match enum {}", other, def.name),
                    );
                }
            }
        }
        if catch_all.is_none() {
            let missing: Vec<&str> = def
                .variants
                .iter()
                .enumerate()
                .filter(|(i, _)| arms[*i].is_none())
                .map(|(_, v)| v.as_str())
                .collect();
            if !missing.is_empty() {
                self.error_at(
                    location,
                    codes::NON_EXHAUSTIVE,
                    format!(
                        "Match on {} is missing variants: {}",
                        def.name,
                        missing.join(", ")
                    ),
                );
                return None;
            }
        }
        let mut blocks: Vec<&Block> = arms.iter().flatten().collect();
        blocks.extend(catch_all.as_ref());
        let ty = self.agreed_type(&blocks);
        Some(Expr::EnumMatch {
            subject: Box::new(subject),
            def,
            arms,
            catch_all,
            ty,
        })
    }

    fn lower_option_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let Type::Maybe(inner) = subject.ty() else {
            return None;
        };
        let mut some_arm: Option<(String, Block)> = None;
        let mut none_block = None;
        for case in cases {
            match &case.pattern {
                Pattern::Some(binding) => {
                    self.scopes.push(FrameKind::Block);
                    self.scopes.declare_var(binding, (*inner).clone(), false);
                    let block = self.check_block_statements(&case.body);
                    self.scopes.pop();
                    some_arm = Some((binding.clone(), block));
                }
                Pattern::None => none_block = Some(self.check_block(&case.body)),
                Pattern::CatchAll => {
                    if none_block.is_none() {
                        none_block = Some(self.check_block(&case.body));
                    }
                }
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match a Maybe subject", other),
                    );
                }
            }
        }
        let (Some((some_binding, some_block)), Some(none_block)) = (some_arm, none_block) else {
            self.error_at(
                location,
                codes::NON_EXHAUSTIVE,
                "Match on a Maybe must cover some(..) and none".to_string(),
            );
            return None;
        };
        let ty = self.agreed_type(&[&some_block, &none_block]);
        Some(Expr::OptionMatch {
            subject: Box::new(subject),
            some_binding,
            some_block,
            none_block,
            ty,
        })
    }

    fn lower_result_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let Type::Result(ok, err) = subject.ty() else {
            return None;
        };
        let mut ok_arm: Option<(String, Block)> = None;
        let mut err_arm: Option<(String, Block)> = None;
        for case in cases {
            match &case.pattern {
                Pattern::Ok(binding) => {
                    self.scopes.push(FrameKind::Block);
                    self.scopes.declare_var(binding, (*ok).clone(), false);
                    let block = self.check_block_statements(&case.body);
                    self.scopes.pop();
                    ok_arm = Some((binding.clone(), block));
                }
                Pattern::Err(binding) => {
                    self.scopes.push(FrameKind::Block);
                    self.scopes.declare_var(binding, (*err).clone(), false);
                    let block = self.check_block_statements(&case.body);
                    self.scopes.pop();
                    err_arm = Some((binding.clone(), block));
                }
                Pattern::CatchAll => {
                    // `_` stands in for whichever side is missing.
                    let block = self.check_block(&case.body);
                    if ok_arm.is_none() {
                        ok_arm = Some(("_".to_string(), block.clone()));
                    }
                    if err_arm.is_none() {
                        err_arm = Some(("_".to_string(), block));
                    }
                }
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match a Result subject", other),
                    );
                }
            }
        }
        let (Some((ok_binding, ok_block)), Some((err_binding, err_block))) = (ok_arm, err_arm)
        else {
            self.error_at(
                location,
                codes::NON_EXHAUSTIVE,
                "Match on a Result must cover ok(..) and err(..)".to_string(),
            );
            return None;
        };
        let ty = self.agreed_type(&[&ok_block, &err_block]);
        Some(Expr::ResultMatch {
            subject: Box::new(subject),
            ok_binding,
            ok_block,
            err_binding,
            err_block,
            ty,
        })
    }

    fn lower_union_match(
        &mut self,
        location: Location,
        subject: Expr,
        cases: &[MatchCase],
    ) -> Option<Expr> {
        let Type::Union(alternatives) = subject.ty() else {
            return None;
        };
        let mut arms: Vec<(Type, Block)> = Vec::new();
        let mut catch_all = None;
        for case in cases {
            match &case.pattern {
                Pattern::Type(type_expr) => {
                    let arm_type = self.resolve_type(type_expr, case.location);
                    if !alternatives.iter().any(|alt| alt == &arm_type) {
                        self.error_at(
                            case.location,
                            codes::TYPE_MISMATCH,
                            format!("{} is not an alternative of the union", arm_type),
                        );
                        continue;
                    }
                    // `it` is the subject at the narrowed type.
                    self.scopes.push(FrameKind::Block);
                    self.scopes.declare_var("it", arm_type.clone(), false);
                    let block = self.check_block_statements(&case.body);
                    self.scopes.pop();
                    arms.push((arm_type, block));
                }
                Pattern::CatchAll => catch_all = Some(self.check_block(&case.body)),
                other => {
                    self.error_at(
                        case.location,
                        codes::TYPE_MISMATCH,
                        format!("Pattern {:?} does not match a union subject", other),
                    );
                }
            }
        }
        if catch_all.is_none() {
            let missing: Vec<String> = alternatives
                .iter()
                .filter(|alt| !arms.iter().any(|(t, _)| &t == alt))
                .map(|t| t.to_string())
                .collect();
            if !missing.is_empty() {
                self.error_at(
                    location,
                    codes::NON_EXHAUSTIVE,
                    format!("Match is missing union alternatives: {}", missing.join(", ")),
                );
                return None;
            }
        }
        let mut blocks: Vec<&Block> = arms.iter().map(|(_, b)| b).collect();
        blocks.extend(catch_all.as_ref());
        let ty = self.agreed_type(&blocks);
        Some(Expr::UnionMatch {
            subject: Box::new(subject),
            arms,
            catch_all,
            ty,
        })
    }

    /// The match's type when every arm agrees, Void otherwise.
    fn agreed_type(&self, blocks: &[&Block]) -> Type {
        let mut types = blocks.iter().map(|b| b.ty());
        let Some(first) = types.next() else {
            return Type::Void;
        };
        if types.all(|t| t == first) {
            first
        } else {
            Type::Void
        }
    }
}
