use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn specnova_binary() -> PathBuf {
    PathBuf::from(env!("CARGO_BIN_EXE_specnova"))
}

const SPEC_V1: &str = r#"openapi: 3.0.3
info:
  title: Petstore
  version: 1.0.0
  license:
    name: MIT
paths:
  /pets:
    get:
      operationId: list_pets
    post:
      operationId: create_pet
  /pets/{petId}:
    get:
      operationId: show_pet_by_id
"#;

fn setup_project() -> TempDir {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path();

    fs::create_dir_all(root.join("spec")).unwrap();
    fs::write(root.join("spec/openapi.yaml"), SPEC_V1).unwrap();
    fs::write(
        root.join("package.json"),
        r#"{
  "name": "petstore-sdk",
  "version": "0.0.1",
  "specnova": {
    "source": "spec/openapi.yaml"
  }
}
"#,
    )
    .unwrap();

    tmp
}

fn run_specnova(root: &Path, args: &[&str]) -> (String, String, bool) {
    run_specnova_with(root, args, &[])
}

fn run_specnova_with(root: &Path, args: &[&str], envs: &[(&str, &Path)]) -> (String, String, bool) {
    let binary = specnova_binary();
    let mut cmd = Command::new(&binary);
    cmd.arg("--cwd")
        .arg(root)
        .args(args)
        .env_remove("GITHUB_OUTPUT")
        .env_remove("SPECNOVA_CONFIG_PATH")
        .env_remove("SPECNOVA_CONFIG_FILE");
    for (key, value) in envs {
        cmd.env(key, value);
    }
    let output = cmd
        .output()
        .unwrap_or_else(|e| panic!("Failed to run specnova binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn read_json(path: &Path) -> serde_json::Value {
    serde_json::from_str(&fs::read_to_string(path).unwrap()).unwrap()
}

#[test]
fn test_fetch_stores_snapshot() {
    let tmp = setup_project();
    let root = tmp.path();

    let (stdout, stderr, success) = run_specnova(root, &["fetch"]);
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("Petstore 1.0.0"));

    let dir = root.join(".snapshots/1.0.0");
    assert!(dir.join("source.yaml").is_file());
    assert!(dir.join("normalized.json").is_file());

    let meta = read_json(&dir.join("meta.json"));
    assert_eq!(meta["info"]["title"], "Petstore");
    assert_eq!(meta["path"], ".snapshots/1.0.0");
    assert_eq!(meta["files"]["names"]["source"], "source.yaml");
    assert_eq!(meta["sha256"]["source"].as_str().unwrap().len(), 64);

    let normalized = read_json(&dir.join("normalized.json"));
    assert_eq!(normalized["paths"]["/pets"]["get"]["operationId"], "getPets");
    assert_eq!(normalized["paths"]["/pets"]["post"]["operationId"], "postPets");
    assert_eq!(
        normalized["paths"]["/pets/{petId}"]["get"]["operationId"],
        "getPetsByPetId"
    );

    // fetch does not pin
    let package = read_json(&root.join("package.json"));
    assert!(package["specnova"].get("branch").is_none());
}

#[test]
fn test_fetch_keeps_yaml_version_digits() {
    let tmp = setup_project();
    let root = tmp.path();
    fs::write(
        root.join("spec/openapi.yaml"),
        SPEC_V1.replace("version: 1.0.0", "version: 2.10"),
    )
    .unwrap();

    let (stdout, stderr, success) = run_specnova(root, &["fetch"]);
    assert!(success, "fetch failed: stdout={}, stderr={}", stdout, stderr);
    assert!(root.join(".snapshots/2.10/meta.json").is_file());
    assert!(!root.join(".snapshots/2.1").exists());
    assert_eq!(
        read_json(&root.join(".snapshots/2.10/meta.json"))["info"]["version"],
        "2.10"
    );
}

#[test]
fn test_fetch_without_normalization_stores_source_only() {
    let tmp = setup_project();
    let root = tmp.path();
    fs::write(root.join("specnova.toml"), "normalized = false\n").unwrap();

    let (stdout, stderr, success) = run_specnova(root, &["fetch"]);
    assert!(success, "fetch failed: {}", stderr);
    assert!(stdout.contains("No normalization settings found"));
    assert!(root.join(".snapshots/1.0.0/source.yaml").is_file());
    assert!(!root.join(".snapshots/1.0.0/normalized.json").exists());
}

#[test]
fn test_pull_pins_snapshot() {
    let tmp = setup_project();
    let root = tmp.path();

    let (stdout, stderr, success) = run_specnova(root, &["pull"]);
    assert!(success, "pull failed: stdout={}, stderr={}", stdout, stderr);

    let package = read_json(&root.join("package.json"));
    assert_eq!(package["specnova"]["version"], "1.0.0");
    assert_eq!(
        package["specnova"]["branch"]["target"],
        ".snapshots/1.0.0/normalized.json"
    );
    assert_eq!(package["version"], "0.0.1");
    let keys: Vec<&String> = package.as_object().unwrap().keys().collect();
    assert_eq!(keys, ["name", "version", "specnova"]);
}

#[test]
fn test_pull_syncs_package_version() {
    let tmp = setup_project();
    let root = tmp.path();
    fs::write(root.join("specnova.toml"), "sync_version = true\n").unwrap();

    let (_, stderr, success) = run_specnova(root, &["pull"]);
    assert!(success, "pull failed: {}", stderr);
    assert_eq!(read_json(&root.join("package.json"))["version"], "1.0.0");
}

#[test]
fn test_fetch_disabled_snapshots_writes_nothing() {
    let tmp = setup_project();
    let root = tmp.path();
    fs::write(root.join("specnova.toml"), "[snapshot]\nenabled = false\n").unwrap();

    let (stdout, stderr, success) = run_specnova(root, &["pull"]);
    assert!(success, "pull failed: {}", stderr);
    assert!(stdout.contains("disabled"));
    assert!(!root.join(".snapshots").exists());
}

#[test]
fn test_verify_detects_tampering() {
    let tmp = setup_project();
    let root = tmp.path();
    run_specnova(root, &["pull"]);

    let (stdout, stderr, success) = run_specnova(root, &["verify"]);
    assert!(success, "verify failed: stdout={}, stderr={}", stdout, stderr);
    assert!(stdout.contains("verified"));

    fs::write(root.join(".snapshots/1.0.0/normalized.json"), "{}").unwrap();
    let (stdout, _, success) = run_specnova(root, &["verify", "1.0.0"]);
    assert!(!success, "verify should fail after tampering");
    assert!(stdout.contains("MISMATCH"));
}

#[test]
fn test_verify_unknown_version() {
    let tmp = setup_project();
    let (_, stderr, success) = run_specnova(tmp.path(), &["verify", "9.9.9"]);
    assert!(!success);
    assert!(stderr.contains("9.9.9"));
}

#[test]
fn test_lookup_writes_github_output() {
    let tmp = setup_project();
    let root = tmp.path();
    let output = root.join("github_output");

    let (stdout, _, success) =
        run_specnova_with(root, &["lookup"], &[("GITHUB_OUTPUT", output.as_path())]);
    assert!(success);
    assert!(stdout.contains("Update available"));

    run_specnova(root, &["pull"]);
    let (stdout, _, success) =
        run_specnova_with(root, &["lookup"], &[("GITHUB_OUTPUT", output.as_path())]);
    assert!(success);
    assert!(stdout.contains("up to date"));

    let written = fs::read_to_string(&output).unwrap();
    assert_eq!(written, "lookup=true\nlookup=false\n");
}

#[test]
fn test_list_versions() {
    let tmp = setup_project();
    let root = tmp.path();

    let (stdout, _, success) = run_specnova(root, &["list"]);
    assert!(success);
    assert!(stdout.contains("No snapshots"));

    run_specnova(root, &["pull"]);
    fs::write(
        root.join("spec/openapi.yaml"),
        SPEC_V1.replace("version: 1.0.0", "version: 1.1.0"),
    )
    .unwrap();
    run_specnova(root, &["fetch"]);

    let (stdout, _, success) = run_specnova(root, &["list"]);
    assert!(success);
    assert!(stdout.contains("1.0.0"));
    assert!(stdout.contains("1.1.0"));
    assert!(stdout.contains(".snapshots/1.1.0"));
}

#[test]
fn test_config_json_plugin_entry() {
    let tmp = setup_project();
    let root = tmp.path();
    fs::write(
        root.join("specnova.toml"),
        "[normalized.operation_id]\ncase = \"snake\"\n",
    )
    .unwrap();

    let (stdout, stderr, success) = run_specnova(root, &["config", "--json"]);
    assert!(success, "config failed: {}", stderr);
    let registration: serde_json::Value = serde_json::from_str(&stdout).unwrap();
    assert_eq!(registration["name"], "specnova");
    assert_eq!(
        registration["config"]["normalized"]["operation_id"]["case"],
        "snake"
    );

    let (stdout, _, success) = run_specnova(root, &["config"]);
    assert!(success);
    assert!(stdout.contains("case = \"snake\""));
}

#[test]
fn test_config_path_escape_rejected() {
    let tmp = setup_project();
    let root = tmp.path();
    let (_, stderr, success) = run_specnova_with(
        root,
        &["config"],
        &[("SPECNOVA_CONFIG_PATH", Path::new("../outside"))],
    );
    assert!(!success);
    assert!(stderr.contains("escapes project root"));
}

#[test]
fn test_missing_package_json() {
    let tmp = TempDir::new().unwrap();
    let (_, stderr, success) = run_specnova(tmp.path(), &["fetch"]);
    assert!(!success);
    assert!(stderr.contains("package.json"));
}

#[test]
fn test_completions() {
    let tmp = TempDir::new().unwrap();
    let (stdout, _, success) = run_specnova(tmp.path(), &["completions", "bash"]);
    assert!(success);
    assert!(stdout.contains("specnova"));
}
