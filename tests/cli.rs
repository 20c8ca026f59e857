use std::io::Write;
use std::process::{Command, Output};

use tempfile::NamedTempFile;

fn hobby() -> Command {
    Command::new(env!("CARGO_BIN_EXE_hobby"))
}

fn script(source: &str) -> NamedTempFile {
    let mut file = tempfile::Builder::new().suffix(".hby").tempfile().expect("temp file");
    file.write_all(source.as_bytes()).expect("write script");
    file
}

fn run(args: &[&str], file: &NamedTempFile, script_args: &[&str]) -> Output {
    hobby()
        .args(args)
        .arg(file.path())
        .args(script_args)
        .env_remove("RUST_LOG")
        .output()
        .expect("failed to run hobby")
}

fn stdout(out: &Output) -> String {
    String::from_utf8_lossy(&out.stdout).into_owned()
}

fn stderr(out: &Output) -> String {
    String::from_utf8_lossy(&out.stderr).into_owned()
}

#[test]
fn runs_a_script() {
    let file = script("var greeting = \"hi\";\nprint(greeting, 1 + 2);\nprint($\"{[1, 2].join(\"+\")}\");");
    let out = run(&[], &file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out), "hi 3\n1+2\n");
}

#[test]
fn passes_trailing_arguments() {
    let file = script("print(args.len(), args[0], args[1]);");
    let out = run(&[], &file, &["x", "-y"]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "2 x -y");
}

#[test]
fn compile_errors_exit_65() {
    let file = script("var a = 1;\nvar b = a +;\n");
    let out = run(&[], &file, &[]);
    assert_eq!(out.status.code(), Some(65));
    let err = stderr(&out);
    assert!(err.contains("compile error: Expected an expression"), "stderr: {err}");
    assert!(err.contains(":2"), "stderr: {err}");
    assert!(err.contains("var b = a +;"), "stderr: {err}");
    assert!(err.contains('^'), "stderr: {err}");
}

#[test]
fn runtime_errors_exit_70() {
    let file = script("fn f() -> null + 1;\nprint(\"before\");\nf();\nprint(\"after\");");
    let out = run(&[], &file, &[]);
    assert_eq!(out.status.code(), Some(70));
    assert_eq!(stdout(&out), "before\n");
    let err = stderr(&out);
    assert!(err.contains("runtime error: Operands must be numbers"), "stderr: {err}");
    assert!(err.contains("in f()"), "stderr: {err}");
    assert!(err.contains("in script"), "stderr: {err}");
}

#[test]
fn json_diagnostics() {
    let file = script("error(\"custom failure\");");
    let out = run(&["--json"], &file, &[]);
    assert_eq!(out.status.code(), Some(70));
    let line = stderr(&out).lines().last().unwrap_or_default().to_string();
    let v: serde_json::Value = serde_json::from_str(&line).expect("JSON diagnostic");
    assert_eq!(v["phase"], "runtime");
    assert_eq!(v["message"], "custom failure");
    assert_eq!(v["notes"][0], "in [C] error()");

    let file = script("return (;");
    let out = run(&["--json"], &file, &[]);
    assert_eq!(out.status.code(), Some(65));
    let line = stderr(&out).lines().next().unwrap_or_default().to_string();
    let v: serde_json::Value = serde_json::from_str(&line).expect("JSON diagnostic");
    assert_eq!(v["phase"], "compile");
    assert_eq!(v["span"]["line"], 1);
    assert_eq!(v["span"]["col"], 9);
}

#[test]
fn dump_lists_bytecode_without_running() {
    let file = script("fn twice(x) -> x * 2;\nprint(twice(21));");
    let out = run(&["--dump"], &file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    let listing = stdout(&out);
    assert!(listing.contains("== <script> =="), "{listing}");
    assert!(listing.contains("== twice =="), "{listing}");
    assert!(listing.contains("OP_MUL"), "{listing}");
    assert!(!listing.lines().any(|l| l == "42"), "{listing}");
}

#[test]
fn unreadable_input_exits_66() {
    let out = hobby().arg("/definitely/not/here.hby").env_remove("RUST_LOG").output().expect("failed to run hobby");
    assert_eq!(out.status.code(), Some(66));
    assert!(stderr(&out).contains("cannot read"), "stderr: {}", stderr(&out));
}

#[test]
fn config_file_and_overrides() {
    let file = script("fn d(n) -> if (n == 0) 0 else 1 + d(n - 1);\nprint(d(30));");

    let out = run(&[], &file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "30");

    let mut config = tempfile::Builder::new().suffix(".json").tempfile().expect("temp file");
    config.write_all(br#"{"max_frames": 10}"#).expect("write config");
    let path = config.path().to_string_lossy().into_owned();
    let out = run(&["--config", &path], &file, &[]);
    assert_eq!(out.status.code(), Some(70));
    assert!(stderr(&out).contains("Stack overflow"), "stderr: {}", stderr(&out));

    let out = run(&["--max-frames", "10"], &file, &[]);
    assert_eq!(out.status.code(), Some(70));

    let mut bad = tempfile::Builder::new().suffix(".json").tempfile().expect("temp file");
    bad.write_all(br#"{"max_frames": "lots"}"#).expect("write config");
    let path = bad.path().to_string_lossy().into_owned();
    let out = run(&["--config", &path], &file, &[]);
    assert_eq!(out.status.code(), Some(66));
}

#[test]
fn gc_stress_flag() {
    let file = script(
        "var parts = [];\nfor (var i = 0; i < 50; i++) parts.push($\"p{i}\");\nprint(parts.len(), parts[49]);",
    );
    let out = run(&["--gc-stress"], &file, &[]);
    assert!(out.status.success(), "stderr: {}", stderr(&out));
    assert_eq!(stdout(&out).trim(), "50 p49");
}

#[test]
fn no_stdlib_flag() {
    let file = script("print(1);");
    let out = run(&["--no-stdlib"], &file, &[]);
    assert_eq!(out.status.code(), Some(70));
    assert!(stderr(&out).contains("Undefined variable 'print'"), "stderr: {}", stderr(&out));
}
