//! Integration tests for the JSON-RPC stdio transport
//!
//! These drive the `serve` subcommand end-to-end over stdin/stdout. Only
//! methods that never shell out to git or python are exercised here; the
//! provisioning workflows are covered by unit tests with a scripted runner.

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

fn serve(temp_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("templar").unwrap();
    cmd.env("TEMPLAR_BASE_DIR", temp_dir.path()).arg("serve");
    cmd
}

#[test]
fn test_list_templates_round_trip() {
    let temp_dir = TempDir::new().unwrap();

    serve(&temp_dir)
        .write_stdin(r#"{"jsonrpc": "2.0", "id": 1, "method": "list_templates"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""result":[]"#));
}

#[test]
fn test_discover_lists_curated_templates() {
    let temp_dir = TempDir::new().unwrap();

    serve(&temp_dir)
        .write_stdin(r#"{"jsonrpc": "2.0", "id": 1, "method": "discover_templates"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("python-package"))
        .stdout(predicate::str::contains("django"))
        .stdout(predicate::str::contains("flask"))
        .stdout(predicate::str::contains("fastapi"))
        .stdout(predicate::str::contains("data-science"));
}

#[test]
fn test_multiple_requests_on_one_connection() {
    let temp_dir = TempDir::new().unwrap();
    let input = concat!(
        r#"{"jsonrpc": "2.0", "id": 1, "method": "get_categories"}"#,
        "\n",
        r#"{"jsonrpc": "2.0", "id": 2, "method": "search_templates", "params": {"query": "django"}}"#,
        "\n",
    );

    serve(&temp_dir)
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""id":1"#))
        .stdout(predicate::str::contains(r#""id":2"#));
}

#[test]
fn test_unknown_method_reports_error_code() {
    let temp_dir = TempDir::new().unwrap();

    serve(&temp_dir)
        .write_stdin(r#"{"jsonrpc": "2.0", "id": 7, "method": "bogus"}"#)
        .assert()
        .success()
        .stdout(predicate::str::contains("-32601"));
}

#[test]
fn test_malformed_input_does_not_kill_the_server() {
    let temp_dir = TempDir::new().unwrap();
    let input = concat!(
        "not json at all\n",
        r#"{"jsonrpc": "2.0", "id": 1, "method": "list_templates"}"#,
        "\n",
    );

    serve(&temp_dir)
        .write_stdin(input)
        .assert()
        .success()
        .stdout(predicate::str::contains("-32700"))
        .stdout(predicate::str::contains(r#""result":[]"#));
}

#[test]
fn test_remove_unknown_template_reports_domain_error() {
    let temp_dir = TempDir::new().unwrap();

    serve(&temp_dir)
        .write_stdin(
            r#"{"jsonrpc": "2.0", "id": 1, "method": "remove_template", "params": {"name": "ghost"}}"#,
        )
        .assert()
        .success()
        .stdout(predicate::str::contains("-32000"))
        .stdout(predicate::str::contains("not_found"));
}
