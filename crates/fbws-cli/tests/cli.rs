//! Command-line behaviour that needs no server.

use assert_cmd::Command;

fn fbws(config_dir: &tempfile::TempDir) -> Command {
    let mut cmd = Command::cargo_bin("fbws").unwrap();
    cmd.env_remove("FBWS_TOKEN")
        .arg("--config")
        .arg(config_dir.path().join("config.toml"));
    cmd
}

#[test]
fn help_lists_subcommands() {
    let dir = tempfile::tempdir().unwrap();
    let output = fbws(&dir).arg("--help").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("call"));
    assert!(stdout.contains("watch"));
}

#[test]
fn call_rejects_non_object_args_before_connecting() {
    let dir = tempfile::tempdir().unwrap();
    let output = fbws(&dir)
        .args(["call", "dev", "read", "--args", "[1, 2]"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("--args must be a JSON object"), "stderr: {stderr}");
}

#[test]
fn call_rejects_non_websocket_url() {
    let dir = tempfile::tempdir().unwrap();
    let output = fbws(&dir)
        .args(["call", "sys", "ping", "--url", "http://127.0.0.1:3030"])
        .output()
        .unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("unsupported URL scheme"), "stderr: {stderr}");
}

#[test]
fn broken_config_file_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join("config.toml"), "[default\n").unwrap();
    let output = fbws(&dir).args(["watch"]).output().unwrap();
    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("failed to parse config"), "stderr: {stderr}");
}
