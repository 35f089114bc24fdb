use assert_cmd::Command;
use predicates::prelude::*;

const OUTLETS_JSON: &str = r#"{"data": [
    {"outlet_name": "Subway Bangsar", "address": "Jalan Telawi 2", "opening_hours": "8:00 AM - 10:00 PM"},
    {"outlet_name": "Outlet X", "address": "Jalan Telawi 3", "opening_hours": "8:00 AM - 9:00 PM",
     "latitude": 3.13, "longitude": 101.67}
]}"#;

fn locus(dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("locus").unwrap();
    cmd.current_dir(dir.path())
        .env_remove("RUST_LOG")
        .env_remove("LOCUS_CONFIG");
    cmd
}

#[test]
fn help_lists_commands() {
    let dir = tempfile::tempdir().unwrap();
    locus(&dir)
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("ask"))
        .stdout(predicate::str::contains("outlets"))
        .stdout(predicate::str::contains("serve"));
}

#[test]
fn init_writes_default_config_once() {
    let dir = tempfile::tempdir().unwrap();
    locus(&dir).arg("init").assert().success();

    let written = std::fs::read_to_string(dir.path().join("locus.toml")).unwrap();
    assert!(written.contains("[llm]"));
    assert!(written.contains("llama3.2:1b"));

    locus(&dir)
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));
    locus(&dir).args(["init", "--force"]).assert().success();
}

#[test]
fn import_then_list_outlets() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("outlets.json"), OUTLETS_JSON).unwrap();

    locus(&dir)
        .args(["import", "outlets.json", "--db", "test.db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Imported 2 outlets"));

    locus(&dir)
        .args(["outlets", "--db", "test.db"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Subway Bangsar"))
        .stdout(predicate::str::contains("Outlet X"))
        .stdout(predicate::str::contains("2 outlets"));

    locus(&dir)
        .args(["outlets", "--db", "test.db", "--format", "json"])
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""data""#));
}

#[test]
fn missing_database_exits_with_database_code() {
    let dir = tempfile::tempdir().unwrap();
    locus(&dir)
        .args(["outlets", "--db", "nope.db"])
        .assert()
        .code(4)
        .stderr(predicate::str::contains("Database not found"));
}

#[test]
fn broken_config_exits_with_config_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("locus.toml"), "[llm\nprovider = ").unwrap();
    locus(&dir)
        .args(["ask", "where is Outlet X?"])
        .assert()
        .code(2);
}

#[test]
fn ask_rejects_unknown_format() {
    let dir = tempfile::tempdir().unwrap();
    locus(&dir)
        .args(["ask", "hello", "--format", "yaml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Unknown format"));
}

#[test]
fn unknown_provider_exits_with_backend_code() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("outlets.json"), OUTLETS_JSON).unwrap();
    std::fs::write(
        dir.path().join("locus.toml"),
        "[llm]\nprovider = \"bogus\"\nmodel = \"x\"\ntemperature = 0.0\n",
    )
    .unwrap();
    locus(&dir)
        .args(["import", "outlets.json", "--db", "test.db"])
        .assert()
        .success();

    locus(&dir)
        .args(["ask", "hello", "--db", "test.db"])
        .assert()
        .code(6)
        .stderr(predicate::str::contains("Unknown provider: bogus"));
}
