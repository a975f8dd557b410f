use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use std::time::{SystemTime, UNIX_EPOCH};

fn make_temp_dir(prefix: &str) -> PathBuf {
    let nanos = SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before UNIX_EPOCH")
        .as_nanos();
    let pid = std::process::id();
    let dir = std::env::temp_dir().join(format!("cmdtree-integ-{prefix}-{pid}-{nanos}"));
    fs::create_dir_all(&dir).expect("failed to create temp dir");
    dir
}

fn cmdtree() -> Command {
    Command::new(env!("CARGO_BIN_EXE_cmdtree"))
}

fn assert_success(what: &str, out: &Output) {
    assert!(
        out.status.success(),
        "{what} failed:\nstatus: {}\nstderr:\n{}",
        out.status,
        String::from_utf8_lossy(&out.stderr),
    );
}

/// Run `cmdtree init` into a fresh directory and return the manifest path.
fn init_project(prefix: &str) -> (PathBuf, PathBuf) {
    let dir = make_temp_dir(prefix);
    let out = cmdtree()
        .arg("init")
        .arg(&dir)
        .output()
        .expect("failed to run cmdtree init");
    assert_success("cmdtree init", &out);
    let manifest = dir.join("cmdtree.json");
    (dir, manifest)
}

fn run(manifest: &Path, args: &[&str]) -> Output {
    cmdtree()
        .args(&args[..1])
        .arg("--manifest")
        .arg(manifest)
        .args(&args[1..])
        .output()
        .expect("failed to run cmdtree")
}

#[test]
fn help_works() {
    let out = cmdtree()
        .arg("--help")
        .output()
        .expect("failed to run cmdtree --help");
    assert_success("cmdtree --help", &out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(
        stdout.contains("parse") && stdout.contains("suggest") && stdout.contains("init"),
        "unexpected help output:\n{stdout}"
    );
}

#[test]
fn init_writes_manifest_once() {
    let (dir, manifest) = init_project("init-once");
    assert!(manifest.is_file(), "cmdtree.json not created");

    let contents = fs::read_to_string(&manifest).expect("failed to read manifest");
    let json: serde_json::Value = serde_json::from_str(&contents).expect("manifest is not JSON");
    assert_eq!(json["schemaVersion"], 1);
    assert!(json["commands"].as_array().is_some_and(|c| !c.is_empty()));

    let again = cmdtree()
        .arg("init")
        .arg(&dir)
        .output()
        .expect("failed to run cmdtree init");
    assert!(!again.status.success(), "second init should fail");
    assert!(
        String::from_utf8_lossy(&again.stderr).contains("already exists"),
        "unexpected stderr:\n{}",
        String::from_utf8_lossy(&again.stderr)
    );

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn parse_prints_bound_arguments() {
    let (dir, manifest) = init_project("parse");

    let out = run(&manifest, &["parse", "greet Alice 3 --loud"]);
    assert_success("cmdtree parse", &out);
    let report: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse output is not JSON");
    assert_eq!(report["command"], "greet <name> [times] [--loud]");
    assert_eq!(report["arguments"]["values"]["name"], "Alice");
    assert_eq!(report["arguments"]["values"]["times"], 3);
    assert_eq!(report["arguments"]["flags"]["loud"], true);

    let out = run(&manifest, &["parse", "greet Bob"]);
    assert_success("cmdtree parse (default)", &out);
    let report: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("parse output is not JSON");
    assert_eq!(report["arguments"]["values"]["times"], 1);

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn parse_failure_exits_nonzero() {
    let (dir, manifest) = init_project("parse-fail");

    let out = run(&manifest, &["parse", "greet Alice 11"]);
    assert!(!out.status.success(), "out-of-range input should fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(stderr.contains("times"), "unexpected stderr:\n{stderr}");

    let out = run(&manifest, &["parse", "wave"]);
    assert!(!out.status.success(), "unknown command should fail");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn suggest_completes_commands_and_arguments() {
    let (dir, manifest) = init_project("suggest");

    let out = run(&manifest, &["suggest", "--json", ""]);
    assert_success("cmdtree suggest", &out);
    let roots: Vec<String> = serde_json::from_slice(&out.stdout).expect("not a JSON array");
    assert_eq!(roots, vec!["config", "greet"]);

    let out = run(&manifest, &["suggest", "config set "]);
    assert_success("cmdtree suggest", &out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    let lines: Vec<&str> = stdout.lines().collect();
    assert_eq!(lines, vec!["color", "verbose"]);

    let out = run(&manifest, &["suggest", "greet Alice 3 --"]);
    assert_success("cmdtree suggest", &out);
    assert_eq!(String::from_utf8_lossy(&out.stdout).trim(), "--loud");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn list_skips_commands_hidden_from_help() {
    let (dir, manifest) = init_project("list");

    let out = run(&manifest, &["list"]);
    assert_success("cmdtree list", &out);
    let stdout = String::from_utf8_lossy(&out.stdout);
    assert!(stdout.contains("greet <name> [times] [--loud]"), "{stdout}");
    assert!(stdout.contains("Change a setting"), "{stdout}");
    assert!(!stdout.contains("debug"), "{stdout}");

    let _ = fs::remove_dir_all(&dir);
}

#[test]
fn check_reports_registration_errors() {
    let dir = make_temp_dir("check");
    let manifest = dir.join("cmdtree.json");
    fs::write(
        &manifest,
        r#"{
  "commands": [
    { "path": [{ "name": "kill", "kind": "literal" }, { "name": "target", "kind": "string" }] },
    { "path": [{ "name": "kill", "kind": "literal" }, { "name": "entity", "kind": "string" }] }
  ]
}"#,
    )
    .expect("failed to write manifest");

    let out = run(&manifest, &["check"]);
    assert!(!out.status.success(), "ambiguous manifest should fail");
    let stderr = String::from_utf8_lossy(&out.stderr);
    assert!(
        stderr.contains("failed to register command #1"),
        "unexpected stderr:\n{stderr}"
    );

    fs::write(
        &manifest,
        r#"{ "commands": [{ "path": [{ "name": "kill", "kind": "literal" }] }] }"#,
    )
    .expect("failed to write manifest");
    let out = run(&manifest, &["check"]);
    assert_success("cmdtree check", &out);
    let outline: serde_json::Value =
        serde_json::from_slice(&out.stdout).expect("check output is not JSON");
    assert_eq!(outline[0]["name"], "kill");
    assert_eq!(outline[0]["kind"], "literal");

    let _ = fs::remove_dir_all(&dir);
}
