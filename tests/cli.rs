//! CLI tests for commands that need no database.

use assert_cmd::Command;
use books_migrate::MigrateConfig;
use predicates::prelude::*;

fn cli() -> Command {
    let mut cmd = Command::cargo_bin("books-migrate").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("BOOKS_TABLE");
    cmd
}

#[test]
fn test_help() {
    cli()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Copy a MongoDB books collection"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("schema"));
}

#[test]
fn test_schema_prints_books_ddl() {
    cli()
        .arg("schema")
        .assert()
        .success()
        .stdout(predicate::str::contains("CREATE TABLE books ("))
        .stdout(predicate::str::contains("_id TEXT PRIMARY KEY"))
        .stdout(predicate::str::contains("__v INTEGER"));
}

#[test]
fn test_schema_custom_table_json() {
    let output = cli()
        .args(["schema", "--table", "archive.books", "--json"])
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();

    let table: serde_json::Value = serde_json::from_slice(&output).unwrap();
    assert_eq!(table["name"], "archive.books");
    assert_eq!(table["primary_key"], "_id");
    assert_eq!(table["columns"].as_array().unwrap().len(), 9);
}

#[test]
fn test_init_writes_loadable_config() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("books-migrate.toml");
    let path_str = path.to_str().unwrap();

    cli()
        .args(["init", "--output", path_str])
        .assert()
        .success()
        .stdout(predicate::str::contains("Created"));

    let config = MigrateConfig::from_file(path_str).unwrap();
    assert_eq!(config.mongo.collection, "books");
    assert_eq!(config.migration.target_table, "books");
    assert_eq!(config.postgres.port, 5432);
}

#[test]
fn test_init_refuses_to_overwrite() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("existing.toml");
    std::fs::write(&path, "# keep me\n").unwrap();

    cli()
        .args(["init", "--quiet", "--output", path.to_str().unwrap()])
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));

    assert_eq!(std::fs::read_to_string(&path).unwrap(), "# keep me\n");
}

#[test]
fn test_missing_config_file_fails() {
    cli()
        .args(["migrate", "--quiet", "--config", "/nonexistent/books-migrate.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Failed to read"));
}

#[test]
fn test_missing_environment_fails() {
    let dir = tempfile::tempdir().unwrap();

    cli()
        .current_dir(dir.path())
        .env_clear()
        .arg("--quiet")
        .assert()
        .failure()
        .stderr(predicate::str::contains("MONGO_URI not set"));
}
