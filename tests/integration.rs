use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::TempDir;

fn ai_binary() -> PathBuf {
    let mut path = std::env::current_exe().unwrap();
    path.pop(); // remove test binary name
    path.pop(); // remove deps/
    path.push("ai");
    path
}

fn setup_test_env() -> (TempDir, PathBuf) {
    let tmp = TempDir::new().unwrap();
    let root = tmp.path().to_path_buf();

    let state_dir = root.join("state");
    fs::create_dir_all(&state_dir).unwrap();

    let config_content = format!(
        r#"[api]
api_key = "${{MISTRAL_API_KEY}}"

[terminal]
max_history = 20
state_dir = "{}"
"#,
        state_dir.display()
    );

    let config_path = root.join("config.toml");
    fs::write(&config_path, config_content).unwrap();

    (tmp, config_path)
}

/// Run a free-text query. `--config` goes first because the query is a
/// trailing variable argument that would otherwise swallow it.
fn run_query(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ai_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(args)
        // A syntactically valid key so gateway construction succeeds;
        // no test below ever reaches the network.
        .env("MISTRAL_API_KEY", "test-key-not-used")
        .stdin(std::process::Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ai binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

/// Run a subcommand. `--config` goes after the subcommand.
fn run_subcommand(config_path: &Path, args: &[&str]) -> (String, String, bool) {
    let binary = ai_binary();
    let output = Command::new(&binary)
        .args(args)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .env("MISTRAL_API_KEY", "test-key-not-used")
        .stdin(std::process::Stdio::null())
        .output()
        .unwrap_or_else(|e| panic!("Failed to run ai binary at {:?}: {}", binary, e));

    let stdout = String::from_utf8_lossy(&output.stdout).to_string();
    let stderr = String::from_utf8_lossy(&output.stderr).to_string();
    (stdout, stderr, output.status.success())
}

fn state_file(config_path: &Path) -> PathBuf {
    config_path.parent().unwrap().join("state").join("context.json")
}

#[test]
fn test_no_query_prints_help() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_query(&config_path, &[]);
    assert!(success, "help failed: stderr={}", stderr);
    assert!(stdout.contains("AI Terminal"));
    assert!(stdout.contains("--mode"));
}

#[test]
fn test_stats_on_empty_store() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) = run_subcommand(&config_path, &["stats"]);
    assert!(success, "stats failed: stderr={}", stderr);
    assert!(stdout.contains("Exchanges:   0"));
    assert!(stdout.contains("Commands:    0"));
}

#[test]
fn test_record_appends_to_command_log() {
    let (_tmp, config_path) = setup_test_env();

    let (_, stderr, success) = run_subcommand(&config_path, &["record", "git", "status"]);
    assert!(success, "record failed: stderr={}", stderr);
    run_subcommand(&config_path, &["record", "cargo", "build"]);

    let (stdout, _, _) = run_subcommand(&config_path, &["stats"]);
    assert!(stdout.contains("Commands:    2"));

    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state_file(&config_path)).unwrap()).unwrap();
    let commands = state["recent_commands"].as_array().unwrap();
    assert_eq!(commands.len(), 2);
    assert_eq!(commands[0]["command"], "git status");
    assert_eq!(commands[1]["command"], "cargo build");
}

#[test]
fn test_document_mode_nonexistent_file() {
    let (tmp, config_path) = setup_test_env();

    let ghost = tmp.path().join("ghost.txt");
    let query = format!("summarize {}", ghost.display());
    // Forced document mode: the file does not exist, so auto-detection
    // would fall back to conversation and try the network.
    let (stdout, stderr, success) =
        run_query(&config_path, &["--mode", "document", &query]);

    assert!(success, "expected success exit: stderr={}", stderr);
    assert!(stdout.contains("does not exist"));
}

#[test]
fn test_document_mode_unsupported_type() {
    let (tmp, config_path) = setup_test_env();

    let file = tmp.path().join("binary.exe");
    fs::write(&file, "MZ").unwrap();

    // The file exists and the input has a document verb, so this also
    // exercises auto-detection end to end. The path is quoted because the
    // unquoted extraction patterns only cover supported extensions.
    let query = format!("summarize '{}'", file.display());
    let (stdout, stderr, success) = run_query(&config_path, &[&query]);

    assert!(success, "expected success exit: stderr={}", stderr);
    assert!(stdout.contains("Unsupported file type"));
}

#[test]
fn test_command_mode_clarification_without_command() {
    let (_tmp, config_path) = setup_test_env();

    let (stdout, stderr, success) =
        run_query(&config_path, &["--mode", "command", "explain"]);

    assert!(success, "expected success exit: stderr={}", stderr);
    assert!(stdout.contains("I need a specific command"));
}

#[test]
fn test_validation_exchange_is_persisted() {
    let (tmp, config_path) = setup_test_env();

    let ghost = tmp.path().join("ghost.txt");
    let query = format!("summarize {}", ghost.display());
    run_query(&config_path, &["--mode", "document", &query]);

    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state_file(&config_path)).unwrap()).unwrap();
    let history = state["conversation_history"].as_array().unwrap();
    assert_eq!(history.len(), 1);
    assert_eq!(history[0]["mode"], "document");
    assert!(history[0]["assistant"]
        .as_str()
        .unwrap()
        .contains("does not exist"));
}

#[test]
fn test_missing_api_key_is_fatal_before_model_call() {
    let (_tmp, config_path) = setup_test_env();

    let binary = ai_binary();
    let output = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .arg("hello there")
        .env_remove("MISTRAL_API_KEY")
        .stdin(std::process::Stdio::null())
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("API key"));
}

#[test]
fn test_piped_stdin_becomes_context() {
    use std::io::Write;
    use std::process::Stdio;

    let (_tmp, config_path) = setup_test_env();

    // Forced document mode with no file reference anywhere: the request
    // fails validation locally, so the wrapped input is observable in the
    // persisted exchange without a network call.
    let binary = ai_binary();
    let mut child = Command::new(&binary)
        .arg("--config")
        .arg(config_path.to_str().unwrap())
        .args(["--mode", "document", "summarize", "the", "input"])
        .env("MISTRAL_API_KEY", "test-key-not-used")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .unwrap();
    child
        .stdin
        .as_mut()
        .unwrap()
        .write_all(b"plain piped prose with no paths")
        .unwrap();
    let output = child.wait_with_output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("couldn't identify the file path"));

    let state: serde_json::Value =
        serde_json::from_str(&fs::read_to_string(state_file(&config_path)).unwrap()).unwrap();
    let user = state["conversation_history"][0]["user"].as_str().unwrap();
    assert!(user.contains("Here is context from standard input"));
    assert!(user.contains("plain piped prose"));
    assert!(user.contains("Request: summarize the input"));
}

#[test]
fn test_corrupt_state_file_recovers() {
    let (_tmp, config_path) = setup_test_env();

    fs::write(state_file(&config_path), "{definitely not json").unwrap();

    let (stdout, stderr, success) = run_subcommand(&config_path, &["stats"]);
    assert!(success, "stats failed on corrupt state: stderr={}", stderr);
    assert!(stdout.contains("Exchanges:   0"));
}
