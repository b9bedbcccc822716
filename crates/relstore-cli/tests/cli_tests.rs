//! CLI integration tests for relstore.
//!
//! These tests verify command-line argument parsing, help output,
//! DDL rendering and exit codes for various error conditions.

use assert_cmd::Command;
use predicates::prelude::*;
use std::io::Write;

/// Get a command for the relstore binary.
fn cmd() -> Command {
    Command::cargo_bin("relstore").unwrap()
}

fn table_file(yaml: &str) -> tempfile::NamedTempFile {
    let mut file = tempfile::NamedTempFile::new().unwrap();
    file.write_all(yaml.as_bytes()).unwrap();
    file
}

const DOCUMENTS: &str = r#"
name: documents
key: text
columns:
  - name: id
    type: identifier
    primary_key: true
  - name: data
    type: bytes
    nullable: false
  - name: archived
    type: boolean
    nullable: false
"#;

// =============================================================================
// Help and Version Tests
// =============================================================================

#[test]
fn test_help_shows_all_commands() {
    cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ddl"))
        .stdout(predicate::str::contains("dialects"))
        .stdout(predicate::str::contains("check"));
}

#[test]
fn test_ddl_subcommand_help() {
    cmd()
        .args(["ddl", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--table"))
        .stdout(predicate::str::contains("--dialect"))
        .stdout(predicate::str::contains("--no-defaults"));
}

#[test]
fn test_version_flag() {
    cmd()
        .arg("--version")
        .assert()
        .success()
        .stdout(predicate::str::contains("relstore"));
}

#[test]
fn test_missing_subcommand_fails() {
    cmd().assert().failure();
}

// =============================================================================
// DDL Tests
// =============================================================================

#[test]
fn test_ddl_for_postgres() {
    let file = table_file(DOCUMENTS);
    cmd()
        .args(["ddl", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(
            "CREATE TABLE IF NOT EXISTS documents (id VARCHAR(255) NOT NULL, data BYTEA NOT NULL, \
             archived BOOLEAN DEFAULT false NOT NULL, PRIMARY KEY(id));",
        ));
}

#[test]
fn test_ddl_for_mysql_5_6_narrows_strings() {
    let file = table_file(DOCUMENTS);
    cmd()
        .args(["ddl", "--dialect", "mysql-5.6", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("id VARCHAR(191) NOT NULL"))
        .stdout(predicate::str::contains("data LONGBLOB NOT NULL"));
}

#[test]
fn test_ddl_without_defaults() {
    let file = table_file(DOCUMENTS);
    cmd()
        .args(["ddl", "--no-defaults", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("archived BOOLEAN NOT NULL"))
        .stdout(predicate::str::contains("DEFAULT").not());
}

#[test]
fn test_ddl_json_output() {
    let file = table_file(DOCUMENTS);
    cmd()
        .args(["--output-json", "ddl", "--dialect", "h2", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dialect\":\"h2\""))
        .stdout(predicate::str::contains("\"table\":\"documents\""));
}

#[test]
fn test_ddl_unknown_dialect_fails() {
    let file = table_file(DOCUMENTS);
    cmd()
        .args(["ddl", "--dialect", "oracle", "--table"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown dialect"));
}

#[test]
fn test_ddl_invalid_schema_fails() {
    let file = table_file(
        r#"
name: broken
key: int64
columns:
  - name: id
    type: identifier
  - name: parent
    type: identifier
"#,
    );
    cmd()
        .args(["ddl", "--table"])
        .arg(file.path())
        .assert()
        .failure()
        .stderr(predicate::str::contains("Schema error in table broken"));
}

#[test]
fn test_ddl_missing_file_fails() {
    cmd()
        .args(["ddl", "--table", "/nonexistent/table.yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("IO error"));
}

#[test]
fn test_rust_log_overrides_verbosity() {
    let file = table_file(DOCUMENTS);
    cmd()
        .env_remove("RUST_LOG")
        .args(["--verbosity", "error", "ddl", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Rendered").not());

    cmd()
        .env("RUST_LOG", "info")
        .args(["--verbosity", "error", "ddl", "--table"])
        .arg(file.path())
        .assert()
        .success()
        .stderr(predicate::str::contains("Rendered documents"));
}

// =============================================================================
// Dialect Listing Tests
// =============================================================================

#[test]
fn test_dialects_lists_scan_order() {
    cmd()
        .arg("dialects")
        .assert()
        .success()
        .stdout(predicate::str::contains("MySQL"))
        .stdout(predicate::str::contains("mysql-5.6"))
        .stdout(predicate::str::contains("SQLite"))
        .stdout(predicate::str::contains("(default: postgres)"));
}

#[test]
fn test_dialects_json_includes_type_names() {
    cmd()
        .args(["--output-json", "dialects"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"dialect\": \"sqlite\""))
        .stdout(predicate::str::contains("\"LONGTEXT\""));
}

// =============================================================================
// Connectivity Check Tests
// =============================================================================

#[test]
fn test_check_in_memory_sqlite() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config,
        "connector:\n  url: memory://cli\ncredentials:\n  user: app\n  password: secret"
    )
    .unwrap();

    cmd()
        .args(["--config"])
        .arg(config.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Database: OK"))
        .stdout(predicate::str::contains("Dialect: sqlite"));
}

#[test]
fn test_check_sqlite_file() {
    let dir = tempfile::tempdir().unwrap();
    let db = dir.path().join("store.db");
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config,
        "connector:\n  url: sqlite://{}\ncredentials:\n  user: ''\n  password: ''",
        db.display()
    )
    .unwrap();

    cmd()
        .args(["--config"])
        .arg(config.path())
        .arg("check")
        .assert()
        .success()
        .stdout(predicate::str::contains("Dialect: sqlite"));
    assert!(db.exists());
}

#[test]
fn test_check_missing_config_file() {
    cmd()
        .args(["--config", "/nonexistent/config.yaml", "check"])
        .assert()
        .failure();
}

#[test]
fn test_check_config_without_credentials_fails() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(config, "connector:\n  url: memory://cli").unwrap();

    cmd()
        .args(["--config"])
        .arg(config.path())
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("credentials are required"));
}

#[test]
fn test_check_unsupported_scheme_reports_failure() {
    let mut config = tempfile::NamedTempFile::new().unwrap();
    writeln!(
        config,
        "connector:\n  url: oracle://db\ncredentials:\n  user: a\n  password: b"
    )
    .unwrap();

    cmd()
        .args(["--config"])
        .arg(config.path())
        .arg("check")
        .assert()
        .failure()
        .stdout(predicate::str::contains("FAILED"))
        .stdout(predicate::str::contains("unsupported connector scheme"));
}
