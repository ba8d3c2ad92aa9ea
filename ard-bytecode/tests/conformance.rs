// Cross-engine conformance: every sample must produce the same value
// and the same stdout through the tree-walking interpreter and the
// bytecode VM (including after a serialization round-trip).
// ARD_CONFORMANCE_SAMPLE=NAME restricts the run to one sample.

use ard_checker::{check, NullResolver};
use ard_runtime::Value;

struct Sample {
    name: &'static str,
    source: &'static str,
}

const SAMPLES: &[Sample] = &[
    Sample {
        name: "arithmetic",
        source: "let x = 5\nlet y = x + 2\ny\n",
    },
    Sample {
        name: "fib",
        source: "fn fib(n: Int) Int {\n  match (n <= 1) {\n    true => n\n    false => fib(n - 1) + fib(n - 2)\n  }\n}\nfn main() Int {\n  fib(20)\n}\n",
    },
    Sample {
        name: "strings",
        source: "let s = \"a\"\nlet t = \"b\"\ns + t\n",
    },
    Sample {
        name: "list-push",
        source: "mut xs: [Int] = [1, 2, 3]\nxs.push(4)\nxs.size()\n",
    },
    Sample {
        name: "int-match",
        source: "match 42 {\n  0 => \"z\"\n  1..50 => \"mid\"\n  _ => \"hi\"\n}\n",
    },
    Sample {
        name: "interpolation",
        source: "use ard/io\nlet n = 3\nio::print(\"n is {n + 1}!\")\nn\n",
    },
    Sample {
        name: "immutability",
        source: "let xs = [1, 2, 3]\nmut ys = xs\nys.push(4)\nxs.size()\n",
    },
    Sample {
        name: "loops",
        source: "mut total = 0\nfor i in 0..10 {\n  total =+ i\n}\nwhile total > 40 {\n  total =- 1\n}\ntotal\n",
    },
    Sample {
        name: "structs",
        source: "struct Point {\n  x: Int\n  y: Int\n}\nimpl Point {\n  fn sum() Int {\n    @.x + @.y\n  }\n}\nfn Point::origin() Point {\n  Point { x: 0, y: 0 }\n}\nlet p = Point { x: 3, y: 4 }\nlet o = Point::origin()\np.sum() + o.x\n",
    },
    Sample {
        name: "enums",
        source: "enum Color {\n  red\n  green\n  blue\n}\nlet c = Color::green\nmatch c {\n  red => 1\n  green => 2\n  blue => 3\n}\n",
    },
    Sample {
        name: "maybe",
        source: "let xs = [7]\nlet head = xs.at(0)\nmatch head {\n  some(v) => v\n  none => -1\n}\n",
    },
    Sample {
        name: "results",
        source: "use ard/json\nfn parse(text: Str) Dynamic!Str {\n  let v = try json::decode(text)\n  Result::ok(v)\n}\nmatch parse(\"12\") {\n  ok(v) => 1\n  err(e) => 0\n}\n",
    },
    Sample {
        name: "closures",
        source: "let base = 100\nlet add = fn(n: Int) Int {\n  base + n\n}\nadd(23)\n",
    },
    Sample {
        name: "fibers",
        source: "use ard/io\nuse ard/async\nlet worker = fn() Void {\n  io::print(\"worker\")\n}\nlet f = async::start(worker)\nf.join()\n7\n",
    },
    Sample {
        name: "fiber-isolation",
        source: "use ard/io\nuse ard/async\nmut xs = [1]\nlet worker = fn() Void {\n  io::print(xs.size())\n}\nlet f = async::start(worker)\nxs.push(2)\nf.join()\nio::print(xs.size())\n",
    },
    Sample {
        name: "unions",
        source: "type Id = Int or Str\nfn describe(id: Id) Str {\n  match id {\n    Int => \"int\"\n    Str => \"str\"\n  }\n}\ndescribe(7) + describe(\"x\")\n",
    },
    Sample {
        name: "conditional-match",
        source: "fn grade(score: Int) Str {\n  match {\n    score >= 90 => \"A\"\n    score >= 80 => \"B\"\n    _ => \"C\"\n  }\n}\ngrade(95) + grade(85) + grade(40)\n",
    },
];

fn run_both(source: &str) -> ((Value, String), (Value, String)) {
    let parsed = ard_parser::parse(source);
    assert!(parsed.is_clean(), "parse errors: {:?}", parsed.errors);
    let checked = check(&parsed.program, &NullResolver, "sample.ard");
    let errors: Vec<_> = checked.diagnostics.iter().filter(|d| d.is_error()).collect();
    assert!(errors.is_empty(), "check errors: {:?}", errors);
    let module = checked.module.expect("module");

    let mut interp_out = Vec::new();
    let interp_value =
        ard_interp::interpret_with_output(&module, &mut interp_out).expect("interpreter");

    let program = ard_bytecode::emit(&module).expect("emit");
    ard_bytecode::verify(&program).expect("verification");
    let decoded =
        ard_bytecode::deserialize(&ard_bytecode::serialize(&program)).expect("round-trip");
    assert_eq!(program, decoded);
    let mut vm_out = Vec::new();
    let vm_value =
        ard_bytecode::run_with_output(&decoded, "main", &mut vm_out).expect("vm");

    (
        (
            interp_value,
            String::from_utf8(interp_out).expect("utf8"),
        ),
        (vm_value, String::from_utf8(vm_out).expect("utf8")),
    )
}

#[test]
fn engines_agree_on_all_samples() {
    let filter = std::env::var("ARD_CONFORMANCE_SAMPLE").ok();
    let mut ran = 0;
    for sample in SAMPLES {
        if let Some(filter) = &filter {
            if filter != sample.name {
                continue;
            }
        }
        let ((interp_value, interp_out), (vm_value, vm_out)) = run_both(sample.source);
        assert_eq!(
            interp_value, vm_value,
            "sample '{}' values diverge",
            sample.name
        );
        assert_eq!(
            interp_out, vm_out,
            "sample '{}' stdout diverges",
            sample.name
        );
        ran += 1;
    }
    assert!(ran > 0, "no conformance samples matched the filter");
}
