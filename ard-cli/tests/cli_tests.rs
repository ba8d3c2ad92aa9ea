use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn ard() -> Command {
    Command::cargo_bin("ard").expect("binary builds")
}

fn write_file(dir: &TempDir, name: &str, content: &str) -> std::path::PathBuf {
    let path = dir.path().join(name);
    fs::write(&path, content).expect("write source");
    path
}

#[test]
fn run_prints_program_output() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(
        &dir,
        "hello.ard",
        "use ard/io\nio::print(\"hello from ard\")\n",
    );
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("hello from ard"));
}

#[test]
fn parse_errors_exit_with_2() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "bad.ard", "let x 5\n");
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Expected '='"));
}

#[test]
fn type_errors_exit_with_2() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "bad.ard", "let x: Str = 5\n");
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Expected Str, got Int"));
}

#[test]
fn panics_exit_with_1() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "boom.ard", "panic(\"kaboom\")\n");
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .code(1)
        .stderr(predicate::str::contains("Panic: kaboom"));
}

#[test]
fn check_reports_clean() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "ok.ard", "let x = 1\nx + 1\n");
    ard().arg("check").arg(&file).assert().success();
}

#[test]
fn check_json_output() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "bad.ard", "let x = y\n");
    ard()
        .arg("check")
        .arg(&file)
        .arg("--json")
        .assert()
        .code(2)
        .stdout(predicate::str::contains("\"diagnostics\""))
        .stdout(predicate::str::contains("Undefined: y"));
}

#[test]
fn emit_then_exec_round_trips() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(
        &dir,
        "prog.ard",
        "use ard/io\nfn main() Int {\n  io::print(\"via bytecode\")\n  0\n}\n",
    );
    ard().arg("emit").arg(&file).assert().success();

    let compiled = dir.path().join("prog.ardb");
    assert!(compiled.exists());
    ard()
        .arg("exec")
        .arg(&compiled)
        .assert()
        .success()
        .stdout(predicate::str::contains("via bytecode"));
}

#[test]
fn exec_rejects_garbage() {
    let dir = TempDir::new().expect("tempdir");
    let file = dir.path().join("junk.ardb");
    fs::write(&file, b"not bytecode at all").expect("write");
    ard()
        .arg("exec")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("not an ardb file"));
}

#[test]
fn modules_resolve_relative_to_the_importer() {
    let dir = TempDir::new().expect("tempdir");
    fs::create_dir_all(dir.path().join("lib")).expect("mkdir");
    write_file(
        &dir,
        "lib/geometry.ard",
        "fn area(w: Int, h: Int) Int {\n  w * h\n}\n",
    );
    let file = write_file(
        &dir,
        "main.ard",
        "use lib/geometry\nuse ard/io\nio::print(geometry::area(6, 7))\n",
    );
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .success()
        .stdout(predicate::str::contains("42"));
}

#[test]
fn cyclic_imports_are_an_error() {
    let dir = TempDir::new().expect("tempdir");
    write_file(&dir, "a.ard", "use b\nfn fa() Int {\n  1\n}\n");
    write_file(&dir, "b.ard", "use a\nfn fb() Int {\n  2\n}\n");
    let file = write_file(&dir, "main.ard", "use a\na::fa()\n");
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Cyclic import"));
}

#[test]
fn unknown_module_is_reported() {
    let dir = TempDir::new().expect("tempdir");
    let file = write_file(&dir, "main.ard", "use no/such/module\nlet x = 1\n");
    ard()
        .arg("run")
        .arg(&file)
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Module not found"));
}
