use ard_checker::ir::{Expr, Module};
use ard_checker::types::Type;
use ard_checker::{check, CheckResult, NullResolver};
use ard_diagnostics::Diagnostic;
use std::rc::Rc;

fn check_source(source: &str) -> CheckResult {
    let parsed = ard_parser::parse(source);
    assert!(parsed.is_clean(), "parse errors: {:?}", parsed.errors);
    check(&parsed.program, &NullResolver, "test.ard")
}

fn module_of(source: &str) -> Rc<Module> {
    let result = check_source(source);
    let errors: Vec<&Diagnostic> = result
        .diagnostics
        .iter()
        .filter(|d| d.is_error())
        .collect();
    assert!(errors.is_empty(), "unexpected errors: {:?}", errors);
    result.module.expect("module")
}

fn errors_of(source: &str) -> Vec<String> {
    check_source(source)
        .diagnostics
        .into_iter()
        .filter(|d| d.is_error())
        .map(|d| d.message)
        .collect()
}

#[test]
fn clean_module_has_resolved_types() {
    let module = module_of("let x = 5\nlet y = x + 2\ny\n");
    assert_eq!(module.program.len(), 3);
    // Every IR node has a computable type.
    for expr in &module.program {
        let _ = expr.ty();
    }
    assert_eq!(module.program[2].ty(), Type::Int);
}

#[test]
fn addition_is_specialized_by_operand_type() {
    let module = module_of("let a = 1 + 2\nlet s = \"a\" + \"b\"\nlet f = 1.5 + 2.5\n");
    let value_of = |expr: &Expr| match expr {
        Expr::VariableDef { value, .. } => (**value).clone(),
        other => panic!("expected def, got {:?}", other),
    };
    assert!(matches!(value_of(&module.program[0]), Expr::IntAddition(..)));
    assert!(matches!(value_of(&module.program[1]), Expr::StrAddition(..)));
    assert!(matches!(
        value_of(&module.program[2]),
        Expr::FloatAddition(..)
    ));
}

#[test]
fn mixed_operand_types_are_rejected() {
    let errors = errors_of("let bad = 1 + \"a\"\n");
    assert!(errors[0].contains("Operator not defined for Int and Str"));
}

#[test]
fn undefined_name_with_suggestion() {
    let result = check_source("let count = 1\nlet x = cuont + 1\n");
    let diag = result
        .diagnostics
        .iter()
        .find(|d| d.message == "Undefined: cuont")
        .expect("undefined diagnostic");
    assert!(diag.help.as_deref().unwrap_or("").contains("count"));
}

#[test]
fn assignment_to_immutable_is_rejected() {
    let errors = errors_of("let x = 1\nx = 2\n");
    assert!(errors[0].contains("immutable binding 'x'"));
}

#[test]
fn assignment_to_mutable_is_fine() {
    module_of("mut x = 1\nx = 2\nx =+ 3\n");
}

#[test]
fn field_assignment_requires_mut_root() {
    let source = "struct P {\n  x: Int\n}\nlet p = P { x: 1 }\np.x = 2\n";
    let errors = errors_of(source);
    assert!(errors[0].contains("field of immutable binding 'p'"));
}

#[test]
fn let_bindings_deep_copy_aggregates() {
    let module = module_of("let xs = [1, 2]\nlet ys = xs\n");
    match &module.program[1] {
        Expr::VariableDef { value, .. } => {
            assert!(matches!(**value, Expr::CopyExpression(_)));
        }
        other => panic!("expected def, got {:?}", other),
    }
}

#[test]
fn empty_container_needs_annotation() {
    let errors = errors_of("let xs = []\n");
    assert!(errors[0].contains("Cannot infer"));
    module_of("let xs: [Int] = []\n");
}

#[test]
fn declared_type_must_accept_value() {
    let errors = errors_of("let x: Str = 5\n");
    assert!(errors[0].contains("Expected Str, got Int"));
}

#[test]
fn maybe_never_coerces() {
    let errors = errors_of("fn find() Int? {\n  Maybe::some(1)\n}\nlet x: Int = find()\n");
    assert!(errors[0].contains("Expected Int, got Int?"));
}

#[test]
fn mut_method_requires_mut_binding() {
    let errors = errors_of("let xs = [1, 2]\nxs.push(3)\n");
    assert!(errors[0].contains("mutating method 'push'"));
    module_of("mut xs = [1, 2]\nxs.push(3)\nxs.size()\n");
}

#[test]
fn builtin_method_types_flow() {
    let module = module_of("mut xs: [Int] = [1, 2, 3]\nxs.push(4)\nxs.size()\n");
    assert_eq!(module.program[2].ty(), Type::Int);
}

#[test]
fn bool_match_requires_both_arms() {
    let errors = errors_of("let b = true\nmatch b {\n  true => 1\n}\n");
    assert!(errors[0].contains("true and false"));
}

#[test]
fn int_match_requires_catch_all() {
    let errors = errors_of("match 42 {\n  0 => \"z\"\n  1..50 => \"mid\"\n}\n");
    assert!(errors[0].contains("catch-all"));
}

#[test]
fn int_match_detects_overlapping_ranges() {
    let errors = errors_of("match 5 {\n  1..10 => \"a\"\n  5..20 => \"b\"\n  _ => \"c\"\n}\n");
    assert!(errors[0].contains("overlaps"));
}

#[test]
fn enum_match_exhaustiveness() {
    let source = "enum Color {\n  red\n  green\n  blue\n}\nlet c = Color::red\nmatch c {\n  red => 1\n  green => 2\n}\n";
    let errors = errors_of(source);
    assert!(errors[0].contains("missing variants: blue"));

    let ok = "enum Color {\n  red\n  green\n}\nlet c = Color::red\nmatch c {\n  red => 1\n  green => 2\n}\n";
    module_of(ok);
}

#[test]
fn maybe_match_binds_unwrapped_value() {
    let source = "let found: Int? = Maybe::some(3)\nlet v = match found {\n  some(x) => x + 1\n  none => 0\n}\n";
    let module = module_of(source);
    assert_eq!(module.program[1].ty(), Type::Void);
}

#[test]
fn result_match_requires_both_sides() {
    let missing = "use ard/json\nfn f() Int {\n  match json::decode(\"1\") {\n    ok(v) => 1\n  }\n}\n";
    let errors = errors_of(missing);
    assert!(errors[0].contains("ok(..) and err(..)"));

    let both = "use ard/json\nfn f() Int {\n  match json::decode(\"1\") {\n    ok(v) => 1\n    err(e) => 0\n  }\n}\n";
    module_of(both);
}

#[test]
fn chained_comparison_hoists_middles() {
    let module = module_of("let x = 5\nlet ok = 0 <= x < 10\n");
    match &module.program[1] {
        Expr::VariableDef { value, .. } => match &**value {
            Expr::Sequence(block) => {
                // Two hoisted temporaries plus the folded comparison.
                assert_eq!(block.exprs.len(), 3);
                assert!(matches!(block.exprs.last(), Some(Expr::And(..))));
            }
            other => panic!("expected sequence, got {:?}", other),
        },
        other => panic!("expected def, got {:?}", other),
    }
}

#[test]
fn break_outside_loop_is_rejected() {
    let errors = errors_of("break\n");
    assert!(errors[0].contains("outside of a loop"));
}

#[test]
fn builtin_module_contracts_are_typed() {
    let source = "use ard/io\nuse ard/json\nio::print(\"hi\")\nlet encoded = try json::encode(5) -> e {\n  \"\"\n}\n";
    let module = module_of(source);
    assert!(matches!(
        module.program[0],
        Expr::ModuleFunctionCall { builtin: true, .. }
    ));
}

#[test]
fn duplicate_import_alias_is_rejected() {
    let errors = errors_of("use ard/io\nuse my/io\nlet x = 1\n");
    // my/io is both unresolvable and a duplicate alias.
    assert!(errors.iter().any(|e| e.contains("Duplicate import alias")));
}

#[test]
fn try_without_catch_needs_result_return() {
    let source = "use ard/json\nfn f() Int {\n  let v = try json::decode(\"1\")\n  1\n}\n";
    let errors = errors_of(source);
    assert!(errors[0].contains("'try' without a catch"));

    let ok = "use ard/json\nfn f() Dynamic!Str {\n  try json::decode(\"1\")\n}\n";
    module_of(ok);
}

#[test]
fn generics_unify_from_arguments() {
    let source = "fn first(items: [$T]) $T? {\n  items.at(0)\n}\nlet head = first([1, 2, 3])\nlet s = match head {\n  some(v) => v + 1\n  none => 0\n}\n";
    let module = module_of(source);
    // head unified to Int?; the match arm adds Int + 1.
    assert!(module.symbols.contains_key("first"));
}

#[test]
fn generic_mismatch_is_reported() {
    let source = "fn pair(a: $T, b: $T) $T {\n  a\n}\nlet x = pair(1, \"s\")\n";
    let errors = errors_of(source);
    assert!(!errors.is_empty());
}

#[test]
fn trait_conformance_is_verified() {
    let source = "trait Named {\n  fn name() Str\n}\nstruct P {\n  x: Int\n}\nimpl Named for P {\n  fn nom() Str {\n    \"p\"\n  }\n}\n";
    let errors = errors_of(source);
    assert!(errors
        .iter()
        .any(|e| e.contains("requires method 'name'")));
}

#[test]
fn trait_method_dispatch_after_impl() {
    let source = "trait Named {\n  fn name() Str\n}\nstruct P {\n  x: Int\n}\nimpl Named for P {\n  fn name() Str {\n    \"p\"\n  }\n}\nlet p = P { x: 1 }\nlet n = p.name()\n";
    let module = module_of(source);
    assert_eq!(module.program[1].ty(), Type::Void);
}

#[test]
fn trait_typed_parameters_accept_implementors() {
    let source = "trait Named {\n  fn name() Str\n}\nstruct P {\n  x: Int\n}\nimpl Named for P {\n  fn name() Str {\n    \"p\"\n  }\n}\nfn label(n: Named) Str {\n  n.name()\n}\nlet p = P { x: 1 }\nlabel(p)\n";
    module_of(source);

    let bad = "trait Named {\n  fn name() Str\n}\nstruct Q {\n  x: Int\n}\nfn label(n: Named) Str {\n  n.name()\n}\nlet q = Q { x: 1 }\nlabel(q)\n";
    let errors = errors_of(bad);
    assert!(errors.iter().any(|e| e.contains("expects Named")));
}

#[test]
fn named_arguments_reorder() {
    let source = "fn move_by(dx: Int, dy: Int) Int {\n  dx + dy\n}\nmove_by(dy: 2, dx: 1)\n";
    module_of(source);
}

#[test]
fn unused_result_warns() {
    let source = "use ard/json\nfn f() Int {\n  json::encode(1)\n  1\n}\n";
    let result = check_source(source);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| !d.is_error() && d.message.contains("Unused Result")));
}

#[test]
fn private_functions_are_not_exported_public() {
    let module = module_of("private fn helper() Int {\n  1\n}\nfn entry() Int {\n  helper()\n}\n");
    assert!(!module.symbols["helper"].public);
    assert!(module.symbols["entry"].public);
}

#[test]
fn private_type_declarations_carry_visibility() {
    let source = "private type Id = Int or Str\nfn show(id: Id) Int {\n  match id {\n    Int => 1\n    Str => 2\n  }\n}\nshow(1)\n";
    let module = module_of(source);
    assert!(!module.symbols["Id"].public);

    let public = module_of("type Key = Int or Str\nfn f(k: Key) Int {\n  1\n}\n");
    assert!(public.symbols["Key"].public);
}

#[test]
fn unused_private_function_warns() {
    let source = "private fn helper() Int {\n  1\n}\nfn entry() Int {\n  2\n}\n";
    let result = check_source(source);
    assert!(result
        .diagnostics
        .iter()
        .any(|d| !d.is_error() && d.message.contains("'helper' is never used")));
}

#[test]
fn called_private_function_does_not_warn() {
    let called = "private fn helper() Int {\n  1\n}\nfn entry() Int {\n  helper()\n}\n";
    let result = check_source(called);
    assert!(!result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("never used")));

    // A value reference also counts as a use.
    let referenced =
        "private fn helper() Int {\n  1\n}\nfn entry() fn () Int {\n  helper\n}\n";
    let result = check_source(referenced);
    assert!(!result
        .diagnostics
        .iter()
        .any(|d| d.message.contains("never used")));
}

#[test]
fn union_match_narrows_with_it() {
    let source = "type Id = Int or Str\nfn show(id: Id) Int {\n  match id {\n    Int => it + 1\n    Str => it.size()\n  }\n}\n";
    module_of(source);
}

#[test]
fn fib_scenario_types_clean() {
    let source = "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\nfn main() Int {\n  fib(20)\n}\n";
    let module = module_of(source);
    assert!(module.functions.contains_key("fib"));
    assert!(module.functions.contains_key("main"));
}
