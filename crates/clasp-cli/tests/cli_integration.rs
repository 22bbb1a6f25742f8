//! CLI integration tests for the clasp binary.
//!
//! These tests invoke the compiled binary to verify end-to-end behavior:
//! output framing, exit codes, diagnostics, and the AST dump.

use std::io::Write;
use std::process::{Command, Stdio};

fn clasp_bin() -> Command {
    Command::new(env!("CARGO_BIN_EXE_clasp"))
}

fn write_program(dir: &tempfile::TempDir, name: &str, src: &str) -> String {
    let path = dir.path().join(name);
    std::fs::write(&path, src).expect("write source");
    path.to_str().expect("utf-8 path").to_string()
}

#[test]
fn cli_runs_simple_program() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(&dir, "add.clasp", "(.+ 1 2)");

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(
        output.status.success(),
        "clasp should succeed, stderr: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "<end-of-stdout>\n3\n");
}

#[test]
fn cli_program_output_precedes_sentinel() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(
        &dir,
        "seq.clasp",
        "{ (.putstr \"a\") (.putstr \"b\") 9 }",
    );

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "ab<end-of-stdout>\n9\n");
}

#[test]
fn cli_renders_every_value_shape() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let cases = [
        ("void.clasp", "(.void)", "<void>\n"),
        ("str.clasp", "\"hi\"", "\"hi\"\n"),
        (
            "closure.clasp",
            "lambda (x) x",
            "<closure evaluated at (SourceLocation 1 1)>\n",
        ),
    ];
    for (name, src, want) in cases {
        let file = write_program(&dir, name, src);
        let output = clasp_bin().arg(&file).output().expect("run binary");
        assert!(output.status.success(), "{name} should succeed");
        let stdout = String::from_utf8_lossy(&output.stdout);
        assert_eq!(stdout, format!("<end-of-stdout>\n{want}"), "{name}");
    }
}

#[test]
fn cli_reads_stdin() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(
        &dir,
        "sum.clasp",
        "(.+ (.getint) (.getint))",
    );

    let mut child = clasp_bin()
        .arg(&file)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("spawn binary");
    child
        .stdin
        .as_mut()
        .expect("stdin handle")
        .write_all(b"20 22\n")
        .expect("write stdin");
    let output = child.wait_with_output().expect("wait for binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert_eq!(stdout, "<end-of-stdout>\n42\n");
}

#[test]
fn cli_parse_error_is_nonzero_with_diagnostic() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(&dir, "bad.clasp", "{}");

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(!output.status.success(), "parse error should fail");
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(
        stderr.contains("[parser error (SourceLocation 1 1)] zero-length sequence"),
        "stderr: {stderr}"
    );
}

#[test]
fn cli_sema_error_is_nonzero_with_diagnostic() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(&dir, "dup.clasp", "lambda (x x) x");

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("[sema error"), "stderr: {stderr}");
    assert!(stderr.contains("duplicate parameter name `x`"), "stderr: {stderr}");
}

#[test]
fn cli_runtime_error_prints_stack_trace() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(
        &dir,
        "crash.clasp",
        "letrec (f lambda (x) (./ x 0)) (f 1)",
    );

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains(">>> stack trace printed below"), "stderr: {stderr}");
    assert!(stderr.contains("calling function body at (SourceLocation 1 1)"), "stderr: {stderr}");
    assert!(stderr.contains("[runtime error"), "stderr: {stderr}");
    assert!(stderr.contains("division by zero"), "stderr: {stderr}");
}

#[test]
fn cli_missing_file_fails() {
    let output = clasp_bin()
        .arg("/nonexistent/program.clasp")
        .output()
        .expect("run binary");
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to read"), "stderr: {stderr}");
}

#[test]
fn cli_dump_ast_emits_json() {
    let dir = tempfile::tempdir().expect("create tempdir");
    let file = write_program(&dir, "dump.clasp", "(.+ x 1)");

    let output = clasp_bin()
        .args([&file, "--dump-ast"])
        .output()
        .expect("run binary");

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    let ast: serde_json::Value = serde_json::from_str(&stdout).expect("valid JSON");

    // the dump carries the analyzed annotations
    let nodes = ast["nodes"].as_array().expect("nodes array");
    assert!(!nodes.is_empty());
    let root_free = ast["nodes"]
        .as_array()
        .and_then(|n| n.last())
        .map(|n| n["free_vars"].clone())
        .expect("root node");
    assert_eq!(root_free, serde_json::json!(["x"]));
}

#[test]
fn cli_rejects_oversized_source() {
    let dir = tempfile::tempdir().expect("create tempdir");
    // 1MB of comment padding around a tiny program
    let mut src = String::with_capacity(1_100_000);
    src.push_str("1\n");
    while src.len() <= 1_000_000 {
        src.push_str("# padding padding padding padding padding padding\n");
    }
    let file = write_program(&dir, "big.clasp", &src);

    let output = clasp_bin().arg(&file).output().expect("run binary");

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("exceeds"), "stderr: {stderr}");
}
