use ard_ast::{
    BinaryOp, CompoundOp, ExpressionKind, Pattern, StatementKind, StrPart, TypeExpr,
};
use ard_parser::parse;

#[test]
fn parse_always_returns_a_program() {
    let result = parse("@@@ ;;; fn fn fn");
    assert!(!result.errors.is_empty());
    // A program object exists even for garbage input.
    let _ = result.program;
}

#[test]
fn missing_use_path_recovers() {
    // One error recorded, and both the import and the binding
    // survive.
    let result = parse("use\nuse ard/fs\nlet x = 5\n");
    assert_eq!(result.errors.len(), 1);
    assert_eq!(result.errors[0].message, "Expected module path after 'use'");
    assert_eq!(result.program.imports.len(), 1);
    assert_eq!(result.program.imports[0].path, "ard/fs");
    assert_eq!(result.program.imports[0].alias, "fs");
    assert_eq!(result.program.statements.len(), 1);
    assert!(matches!(
        result.program.statements[0].kind,
        StatementKind::VariableDeclaration { ref name, .. } if name == "x"
    ));
}

#[test]
fn import_alias_rewrites_dashes() {
    let result = parse("use pkg/my-utils\n");
    assert!(result.is_clean());
    assert_eq!(result.program.imports[0].alias, "my_utils");
}

#[test]
fn variable_declarations() {
    let result = parse("let x = 5\nmut y: [Int] = [1, 2, 3]\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::VariableDeclaration { name, mutable, declared_type, .. } => {
            assert_eq!(name, "x");
            assert!(!mutable);
            assert!(declared_type.is_none());
        }
        other => panic!("unexpected statement {:?}", other),
    }
    match &result.program.statements[1].kind {
        StatementKind::VariableDeclaration { mutable, declared_type, .. } => {
            assert!(mutable);
            assert_eq!(
                declared_type,
                &Some(TypeExpr::List(Box::new(TypeExpr::Named("Int".into()))))
            );
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn missing_equals_skips_statement() {
    let result = parse("let x 5\nlet y = 2\n");
    assert_eq!(result.errors.len(), 1);
    assert!(result.errors[0].message.contains("Expected '='"));
    assert_eq!(result.program.statements.len(), 1);
}

#[test]
fn function_with_return_type() {
    let source = "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\n";
    let result = parse(source);
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::FunctionDeclaration(f) => {
            assert_eq!(f.name, "fib");
            assert_eq!(f.parameters.len(), 1);
            assert_eq!(f.return_type, Some(TypeExpr::Named("Int".into())));
            assert!(!f.mutates);
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn generic_parameters_are_collected() {
    let result = parse("fn first(items: [$T]) $T? {\n  items.at(0)\n}\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::FunctionDeclaration(f) => {
            assert_eq!(f.type_params, vec!["$T".to_string()]);
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn chained_comparison_node() {
    let result = parse("let ok = 0 <= x < 10\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::VariableDeclaration { value, .. } => match &value.kind {
            ExpressionKind::ChainedComparison { operands, operators } => {
                assert_eq!(operands.len(), 3);
                assert_eq!(operators, &vec![BinaryOp::LessEqual, BinaryOp::Less]);
            }
            other => panic!("expected chained comparison, got {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn equality_cannot_chain() {
    let result = parse("let bad = a == b == c\n");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("cannot be chained")));
}

#[test]
fn range_binds_looser_than_addition() {
    let result = parse("let r = 0..n + 1\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::VariableDeclaration { value, .. } => match &value.kind {
            ExpressionKind::RangeLiteral { end, .. } => {
                assert!(matches!(end.kind, ExpressionKind::Binary { .. }));
            }
            other => panic!("expected range, got {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn for_loop_disambiguation() {
    let range = parse("for i in 0..10 {\n  i\n}\n");
    assert!(range.is_clean(), "{:?}", range.errors);
    assert!(matches!(
        range.program.statements[0].kind,
        StatementKind::RangeLoop { .. }
    ));

    let for_in = parse("for x, i in xs {\n  x\n}\n");
    assert!(for_in.is_clean(), "{:?}", for_in.errors);
    match &for_in.program.statements[0].kind {
        StatementKind::ForInLoop { cursor, cursor2, .. } => {
            assert_eq!(cursor, "x");
            assert_eq!(cursor2.as_deref(), Some("i"));
        }
        other => panic!("unexpected statement {:?}", other),
    }

    let c_style = parse("for let i = 0; i < 10; i =+ 1 {\n  i\n}\n");
    assert!(c_style.is_clean(), "{:?}", c_style.errors);
    assert!(matches!(
        c_style.program.statements[0].kind,
        StatementKind::ForLoop { .. }
    ));
}

#[test]
fn while_without_condition() {
    let result = parse("while {\n  break\n}\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::WhileLoop { condition, .. } => assert!(condition.is_none()),
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn break_without_newline_is_recorded_but_kept() {
    let result = parse("while true {\n  break }\n");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("newline after 'break'")));
    match &result.program.statements[0].kind {
        StatementKind::WhileLoop { body, .. } => {
            assert!(matches!(body.statements[0].kind, StatementKind::Break));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn increment_and_decrement() {
    let result = parse("count =+ 1\ncount =- 2\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    assert!(matches!(
        result.program.statements[0].kind,
        StatementKind::CompoundAssignment {
            operator: CompoundOp::Increment,
            ..
        }
    ));
    assert!(matches!(
        result.program.statements[1].kind,
        StatementKind::CompoundAssignment {
            operator: CompoundOp::Decrement,
            ..
        }
    ));
}

#[test]
fn interpolated_string_parts() {
    let result = parse("let msg = \"sum: {a + b}!\"\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::VariableDeclaration { value, .. } => match &value.kind {
            ExpressionKind::InterpolatedString(parts) => {
                assert_eq!(parts.len(), 3);
                assert!(matches!(&parts[0], StrPart::Literal(s) if s == "sum: "));
                assert!(matches!(&parts[1], StrPart::Expr(_)));
                assert!(matches!(&parts[2], StrPart::Literal(s) if s == "!"));
            }
            other => panic!("expected string, got {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn match_with_patterns() {
    let source = "match n {\n  0 => \"z\"\n  1..50 => \"mid\"\n  _ => \"hi\"\n}\n";
    let result = parse(source);
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::Expression(e) => match &e.kind {
            ExpressionKind::MatchExpression { cases, .. } => {
                assert_eq!(cases.len(), 3);
                assert_eq!(cases[0].pattern, Pattern::Int(0));
                assert_eq!(cases[1].pattern, Pattern::Range(1, 50));
                assert_eq!(cases[2].pattern, Pattern::CatchAll);
            }
            other => panic!("expected match, got {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn maybe_and_result_patterns() {
    let source = "match found {\n  some(v) => v\n  none => 0\n}\nmatch r {\n  ok(v) => v\n  err(e) => 0\n}\n";
    let result = parse(source);
    assert!(result.is_clean(), "{:?}", result.errors);
}

#[test]
fn try_forms() {
    let block_form = parse("let v = try risky() -> e {\n  0\n}\n");
    assert!(block_form.is_clean(), "{:?}", block_form.errors);

    // `-> handler` desugars to `-> err { handler(err) }`.
    let fn_form = parse("let v = try risky() -> fallback\n");
    assert!(fn_form.is_clean(), "{:?}", fn_form.errors);
    match &fn_form.program.statements[0].kind {
        StatementKind::VariableDeclaration { value, .. } => match &value.kind {
            ExpressionKind::Try {
                catch_name,
                catch_block,
                ..
            } => {
                assert_eq!(catch_name.as_deref(), Some("err"));
                let block = catch_block.as_ref().expect("desugared block");
                assert!(matches!(
                    block.statements[0].kind,
                    StatementKind::Expression(ref e)
                        if matches!(&e.kind, ExpressionKind::FunctionCall { name, .. } if name == "fallback")
                ));
            }
            other => panic!("expected try, got {:?}", other),
        },
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn stray_arrow_is_diagnosed() {
    let result = parse("-> oops\n");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("only valid after a 'try'")));
}

#[test]
fn static_paths() {
    let result = parse("let c = Color::red\nlet p = Point::origin()\nio::print(5)\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::VariableDeclaration { value, .. } => {
            assert!(matches!(
                &value.kind,
                ExpressionKind::StaticProperty { target, property }
                    if target == "Color" && property == "red"
            ));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn struct_definition_and_instance() {
    let source = "struct Point {\n  x: Int\n  y: Int\n}\nlet p = Point { x: 1, y: 2 }\n";
    let result = parse(source);
    assert!(result.is_clean(), "{:?}", result.errors);
    assert!(matches!(
        result.program.statements[0].kind,
        StatementKind::StructDefinition { .. }
    ));
    match &result.program.statements[1].kind {
        StatementKind::VariableDeclaration { value, .. } => {
            assert!(matches!(&value.kind, ExpressionKind::StructInstance { name, fields }
                if name == "Point" && fields.len() == 2));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn condition_position_suppresses_struct_literal() {
    let result = parse("if Ready {\n  1\n}\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::Expression(e) => {
            assert!(matches!(&e.kind, ExpressionKind::If { condition, .. }
                if matches!(condition.kind, ExpressionKind::Identifier(_))));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn impl_forms() {
    let plain = parse("impl Point {\n  fn norm(): Float {\n    0.0\n  }\n}\n");
    // Return type syntax has no ':'; this source has a syntax error.
    assert!(!plain.is_clean());

    let plain = parse("impl Point {\n  fn norm() Float {\n    0.0\n  }\n}\n");
    assert!(plain.is_clean(), "{:?}", plain.errors);
    assert!(matches!(
        plain.program.statements[0].kind,
        StatementKind::ImplBlock { .. }
    ));

    let trait_impl = parse("impl Printable for Point {\n  fn describe() Str {\n    \"p\"\n  }\n}\n");
    assert!(trait_impl.is_clean(), "{:?}", trait_impl.errors);
    assert!(matches!(
        trait_impl.program.statements[0].kind,
        StatementKind::TraitImplementation { .. }
    ));
}

#[test]
fn private_declarations() {
    let result = parse("private type Id = Int or Str\nprivate fn f() Int {\n  1\n}\n");
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::TypeDeclaration {
            name,
            alternatives,
            private,
        } => {
            assert_eq!(name, "Id");
            assert_eq!(alternatives.len(), 2);
            assert!(private);
        }
        other => panic!("unexpected statement {:?}", other),
    }

    let public = parse("type Id = Int or Str\n");
    assert!(public.is_clean(), "{:?}", public.errors);
    assert!(matches!(
        public.program.statements[0].kind,
        StatementKind::TypeDeclaration { private: false, .. }
    ));
}

#[test]
fn named_after_positional_is_rejected() {
    let result = parse("move(1, dy: 2, 3)\n");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("Positional arguments cannot follow")));
}

#[test]
fn doc_comments_attach_to_declarations() {
    let source = "// Adds one.\nfn inc(n: Int) Int {\n  n + 1\n}\n";
    let result = parse(source);
    assert!(result.is_clean(), "{:?}", result.errors);
    match &result.program.statements[0].kind {
        StatementKind::FunctionDeclaration(f) => {
            assert_eq!(f.doc.as_deref(), Some("// Adds one."));
        }
        other => panic!("unexpected statement {:?}", other),
    }
}

#[test]
fn use_after_statements_is_an_error() {
    let result = parse("let x = 1\nuse ard/io\n");
    assert!(result
        .errors
        .iter()
        .any(|e| e.message.contains("top of the file")));
}

#[test]
fn locations_are_one_based() {
    let result = parse("let x = 5\n");
    let statement = &result.program.statements[0];
    assert_eq!(statement.location.line, 1);
    assert_eq!(statement.location.column, 1);
}
