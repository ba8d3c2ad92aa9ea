use ard_bytecode::{deserialize, emit, serialize, verify, Instruction, Op, Program};
use ard_checker::{check, NullResolver};
use ard_runtime::Value;

fn compile(source: &str) -> Program {
    let parsed = ard_parser::parse(source);
    assert!(parsed.is_clean(), "parse errors: {:?}", parsed.errors);
    let checked = check(&parsed.program, &NullResolver, "test.ard");
    let errors: Vec<_> = checked.diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "check errors: {:?}", errors);
    emit(&checked.module.expect("module")).expect("emit")
}

fn run_vm(source: &str) -> (Value, String) {
    let program = compile(source);
    verify(&program).expect("verification");
    let mut out = Vec::new();
    let value = ard_bytecode::run_with_output(&program, "main", &mut out).expect("vm run");
    (value, String::from_utf8(out).expect("utf8"))
}

#[test]
fn emitted_programs_verify_clean() {
    let sources = [
        "let x = 5\nlet y = x + 2\ny\n",
        "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\nfn main() Int {\n  fib(10)\n}\n",
        "mut xs: [Int] = [1, 2, 3]\nxs.push(4)\nxs.size()\n",
        "match 42 {\n  0 => \"z\"\n  1..50 => \"mid\"\n  _ => \"hi\"\n}\n",
        "mut t = 0\nfor i in 0..5 {\n  t =+ i\n}\nt\n",
        "use ard/io\nfor x, i in [10, 20] {\n  io::print(x + i)\n}\n",
    ];
    for source in sources {
        let program = compile(source);
        verify(&program).unwrap_or_else(|e| panic!("{}: {:?}", source, e));
    }
}

#[test]
fn arithmetic_scenario_matches() {
    let (value, _) = run_vm("let x = 5\nlet y = x + 2\ny\n");
    assert_eq!(value, Value::Int(7));
}

#[test]
fn fib_scenario_matches() {
    let source = "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\nfn main() Int {\n  fib(20)\n}\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(6765));
}

#[test]
fn serialization_round_trips_byte_exactly() {
    let source = "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\nfn main() Int {\n  fib(10)\n}\n";
    let program = compile(source);
    let bytes = serialize(&program);
    let decoded = deserialize(&bytes).expect("decode");
    assert_eq!(program, decoded);
    // Byte-exact: re-serializing the decoded program is identical.
    assert_eq!(bytes, serialize(&decoded));
}

#[test]
fn deserialized_programs_still_run() {
    let source = "let s = \"a\"\nlet t = \"b\"\ns + t\n";
    let program = compile(source);
    let decoded = deserialize(&serialize(&program)).expect("decode");
    verify(&decoded).expect("verification");
    let mut out = Vec::new();
    let value = ard_bytecode::run_with_output(&decoded, "main", &mut out).expect("run");
    assert_eq!(value, Value::Str("ab".into()));
}

#[test]
fn verifier_rejects_jump_out_of_range() {
    let mut program = compile("let x = 1\nx\n");
    let main = &mut program.functions[0];
    main.code.insert(0, Instruction::new(Op::Jump, 9999, 0, 0));
    assert!(verify(&program).is_err());
}

#[test]
fn verifier_rejects_stack_underflow() {
    let mut program = compile("let x = 1\nx\n");
    let main = &mut program.functions[0];
    main.code.insert(0, Instruction::new(Op::Pop, 0, 0, 0));
    assert!(matches!(
        verify(&program),
        Err(ard_bytecode::VerifyError::StackUnderflow { .. })
    ));
}

#[test]
fn verifier_rejects_bad_call_target() {
    let mut program = compile("let x = 1\nx\n");
    let main = &mut program.functions[0];
    main.code.insert(0, Instruction::new(Op::Call, 77, 0, 0));
    assert!(matches!(
        verify(&program),
        Err(ard_bytecode::VerifyError::BadFunctionRef { .. })
    ));
}

#[test]
fn verifier_rejects_arity_mismatch() {
    let source = "fn double(n: Int) Int {\n  n * 2\n}\ndouble(4)\n";
    let mut program = compile(source);
    // Corrupt the call to pass zero args.
    for function in &mut program.functions {
        for instruction in &mut function.code {
            if instruction.op == Op::Call && instruction.b == 1 {
                instruction.b = 0;
            }
        }
    }
    assert!(matches!(
        verify(&program),
        Err(ard_bytecode::VerifyError::ArityMismatch { .. })
    ));
}

#[test]
fn struct_and_method_dispatch() {
    let source = "struct Point {\n  x: Int\n  y: Int\n}\nimpl Point {\n  fn sum() Int {\n    @.x + @.y\n  }\n}\nlet p = Point { x: 3, y: 4 }\np.sum()\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(7));
}

#[test]
fn mut_method_through_bytecode() {
    let source = "struct Counter {\n  n: Int\n}\nimpl Counter {\n  fn mut bump() Void {\n    @.n = @.n + 1\n  }\n}\nmut c = Counter { n: 0 }\nc.bump()\nc.bump()\nc.n\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(2));
}

#[test]
fn enum_match_in_vm() {
    let source = "enum Color {\n  red\n  green\n  blue\n}\nlet c = Color::blue\nmatch c {\n  red => 1\n  green => 2\n  blue => 3\n}\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(3));
}

#[test]
fn maybe_and_result_paths() {
    let source = "let xs = [5]\nmatch xs.at(0) {\n  some(v) => v\n  none => -1\n}\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(5));

    let source = "use ard/json\nmatch json::decode(\"{oops\") {\n  ok(v) => \"ok\"\n  err(e) => \"err\"\n}\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Str("err".into()));
}

#[test]
fn try_without_catch_returns_the_error() {
    let source = "use ard/json\nfn parse(text: Str) Dynamic!Str {\n  let v = try json::decode(text)\n  Result::ok(v)\n}\nmatch parse(\"{bad\") {\n  ok(v) => \"ok\"\n  err(e) => \"err\"\n}\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Str("err".into()));
}

#[test]
fn closures_capture_by_value() {
    let source = "let base = 10\nlet add = fn(n: Int) Int {\n  base + n\n}\nadd(7)\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(17));
}

#[test]
fn fibers_through_async_opcodes() {
    let source = "use ard/io\nuse ard/async\nlet worker = fn() Void {\n  io::print(\"inside\")\n}\nlet f = async::start(worker)\nf.join()\nio::print(\"after\")\n";
    let (_, out) = run_vm(source);
    assert_eq!(out, "inside\nafter\n");
}

#[test]
fn deep_copy_preserved_in_vm() {
    let source = "let xs = [1, 2, 3]\nmut ys = xs\nys.push(4)\nxs.size()\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(3));
}

#[test]
fn interpolation_in_vm() {
    let source = "use ard/io\nlet n = 6\nio::print(\"got {n * 7}\")\n";
    let (_, out) = run_vm(source);
    assert_eq!(out, "got 42\n");
}

#[test]
fn union_match_in_vm() {
    let source = "type Id = Int or Str\nfn describe(id: Id) Str {\n  match id {\n    Int => \"int\"\n    Str => \"str\"\n  }\n}\ndescribe(7) + describe(\"x\")\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Str("intstr".into()));
}

#[test]
fn while_with_break_in_vm() {
    let source = "mut n = 0\nwhile {\n  n =+ 1\n  if n >= 5 {\n    break\n  }\n}\nn\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(5));
}

#[test]
fn map_iteration_in_vm() {
    let source = "let ages = [1: \"a\", 2: \"b\"]\nmut total = 0\nfor k, v in ages {\n  total =+ k\n}\ntotal\n";
    let (value, _) = run_vm(source);
    assert_eq!(value, Value::Int(3));
}
