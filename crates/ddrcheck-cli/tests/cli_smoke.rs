use assert_cmd::Command;
use predicates::str::contains;
use std::fs;
use std::path::Path;
use tempfile::TempDir;

fn ddrcheck(dir: &Path) -> Command {
    let mut cmd = Command::cargo_bin("ddrcheck").unwrap();
    cmd.current_dir(dir)
        .env_remove("DDRCHECK_SCOPES_DIR")
        .env_remove("DDRCHECK_LOG")
        .arg("--scopes-dir")
        .arg(dir.join("scopes"));
    cmd
}

fn init(dir: &Path) {
    ddrcheck(dir)
        .arg("init")
        .assert()
        .success()
        .stderr(contains("created"));
}

#[test]
fn version_prints_package_version() {
    let dir = TempDir::new().unwrap();
    ddrcheck(dir.path())
        .arg("version")
        .assert()
        .success()
        .stdout(contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn init_then_list_scopes_and_versions() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    assert!(dir.path().join("scopes/demo/ddr.yaml").exists());
    assert!(dir.path().join("demo-input/CUSTOMERS_20240101.csv").exists());

    ddrcheck(dir.path())
        .arg("scopes")
        .assert()
        .success()
        .stdout(contains("demo"));
    ddrcheck(dir.path())
        .args(["versions", "--scope", "demo"])
        .assert()
        .success()
        .stdout(contains("v1\t2 file(s)"));

    // second init leaves existing files alone
    ddrcheck(dir.path())
        .arg("init")
        .assert()
        .success()
        .stderr(contains("already exists (skipped)"));
}

#[test]
fn run_on_clean_sample_data_passes() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let report = dir.path().join("out/report.json");

    ddrcheck(dir.path())
        .args(["run", "--scope", "demo", "--version", "v1", "--input", "demo-input"])
        .arg("--out")
        .arg(&report)
        .assert()
        .code(0)
        .stderr(contains("Summary:"));

    let json: serde_json::Value = serde_json::from_str(&fs::read_to_string(&report).unwrap()).unwrap();
    assert_eq!(json["files"], serde_json::json!(["CUSTOMERS", "ORDERS"]));
    assert_eq!(json["cells"].as_array().unwrap().len(), 4);
}

#[test]
fn run_with_violations_fails_and_exports_errors() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    fs::write(
        dir.path().join("demo-input/CUSTOMERS_20240101.csv"),
        "ID;NAME;BALANCE\n1;Ada;1.5\n1;Bob;abc\n",
    )
    .unwrap();
    let errors_dir = dir.path().join("errors");

    ddrcheck(dir.path())
        .args(["run", "--scope", "demo", "--version", "v1", "--input", "demo-input"])
        .arg("--show-errors")
        .arg("--export-errors")
        .arg(&errors_dir)
        .assert()
        .code(1)
        .stderr(contains("violation(s)"));

    assert!(errors_dir.join("CUSTOMERS_format_errors.csv").exists());
    assert!(errors_dir.join("CUSTOMERS_pk_errors.csv").exists());
    assert!(!errors_dir.join("ORDERS_format_errors.csv").exists());
}

#[test]
fn run_json_output_goes_to_stdout() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let out = ddrcheck(dir.path())
        .args(["run", "--scope", "demo", "--version", "v1", "--input", "demo-input"])
        .args(["--format", "json"])
        .assert()
        .code(0)
        .get_output()
        .stdout
        .clone();
    let json: serde_json::Value = serde_json::from_slice(&out).unwrap();
    assert_eq!(json["scope"], "demo");
    assert_eq!(json["aborted"], false);
}

#[test]
fn run_with_unknown_scope_is_config_error() {
    let dir = TempDir::new().unwrap();
    fs::create_dir_all(dir.path().join("in")).unwrap();
    ddrcheck(dir.path())
        .args(["run", "--scope", "nope", "--version", "v1", "--input", "in"])
        .assert()
        .code(2)
        .stderr(contains("config error"));
}

#[test]
fn query_filters_rows_with_sql() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    ddrcheck(dir.path())
        .args(["query", "--scope", "demo", "--version", "v1", "--file", "CUSTOMERS"])
        .args(["--input", "demo-input"])
        .args(["--sql", "SELECT NAME FROM data WHERE ID = '2'"])
        .assert()
        .success()
        .stdout(contains("Alan Turing"))
        .stderr(contains("page 1/1"));
}

#[test]
fn cache_build_then_clear() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    ddrcheck(dir.path())
        .args(["cache", "build", "--scope", "demo", "--version", "v1", "--input", "demo-input"])
        .assert()
        .success()
        .stderr(contains("built CUSTOMERS (3 rows)"));
    ddrcheck(dir.path())
        .args(["cache", "build", "--scope", "demo", "--version", "v1", "--input", "demo-input"])
        .assert()
        .success()
        .stderr(contains("reused CUSTOMERS"));
    ddrcheck(dir.path())
        .args(["cache", "clear", "--input", "demo-input"])
        .assert()
        .success()
        .stderr(contains("removed 2 cache file(s)"));
}

#[test]
fn import_writes_structures_from_sheets() {
    let dir = TempDir::new().unwrap();
    init(dir.path());
    let sheets = dir.path().join("sheets");
    fs::create_dir_all(&sheets).unwrap();
    fs::write(
        sheets.join("ACCOUNTS_AAAAMMDD.csv"),
        "Field;Format;PK\nid;NUMBER(8);Y\nlabel;VARCHAR2(20);\n",
    )
    .unwrap();

    ddrcheck(dir.path())
        .args(["import", "--scope", "demo", "--version", "v2", "--sheets", "sheets"])
        .assert()
        .success()
        .stderr(contains("imported 1 sheet(s)"));
    assert!(dir
        .path()
        .join("scopes/demo/v2/ACCOUNTS/structure.yaml")
        .exists());
}
