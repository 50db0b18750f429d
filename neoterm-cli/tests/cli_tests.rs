use assert_cmd::Command;
use std::path::Path;

fn neoterm(config: &Path) -> Command {
    let mut cmd = Command::cargo_bin("neoterm").unwrap();
    cmd.env("NEOTERM_CONFIG", config).env_remove("RUST_LOG");
    cmd
}

// ============================================================================
// config
// ============================================================================

#[test]
fn test_config_path_honours_env() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let out = neoterm(&path).args(["config", "path"]).assert().success();
    let stdout = String::from_utf8_lossy(&out.get_output().stdout).to_string();
    assert_eq!(stdout.trim(), path.display().to_string());
}

#[test]
fn test_config_set_then_get() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    neoterm(&path)
        .args(["config", "get", "terminal.cols"])
        .assert()
        .success()
        .stdout("80\n");

    neoterm(&path)
        .args(["config", "set", "terminal.cols", "132"])
        .assert()
        .success();
    assert!(path.exists());

    neoterm(&path)
        .args(["config", "get", "terminal.cols"])
        .assert()
        .success()
        .stdout("132\n");
}

#[test]
fn test_config_unknown_key_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    neoterm(&path)
        .args(["config", "set", "terminal.colour", "red"])
        .assert()
        .failure();
    assert!(!path.exists());
}

// ============================================================================
// history / bookmarks
// ============================================================================

#[test]
fn test_history_needs_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(&path, "[vault]\nenabled = false\n").unwrap();
    neoterm(&path).arg("history").assert().failure();
    neoterm(&path).arg("bookmarks").assert().failure();
}

#[test]
fn test_history_on_empty_vault() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    let db = dir.path().join("history.db");
    std::fs::write(
        &path,
        format!("[vault]\npath = {:?}\n", db.display().to_string()),
    )
    .unwrap();
    neoterm(&path)
        .arg("history")
        .assert()
        .success()
        .stdout("No matching history.\n");
}

// ============================================================================
// exec
// ============================================================================

#[cfg(unix)]
mod exec {
    use super::*;

    fn pipe_config(dir: &Path, vault: bool) -> std::path::PathBuf {
        let path = dir.join("config.toml");
        let db = dir.join("history.db");
        let vault_section = if vault {
            format!("[vault]\npath = {:?}\n", db.display().to_string())
        } else {
            "[vault]\nenabled = false\n".to_string()
        };
        std::fs::write(
            &path,
            format!(
                "[shell]\nprogram = \"/bin/sh\"\n\n[terminal]\ndriver = \"pipe\"\n\n{}",
                vault_section
            ),
        )
        .unwrap();
        path
    }

    #[test]
    fn test_exec_streams_output() {
        let dir = tempfile::tempdir().unwrap();
        let path = pipe_config(dir.path(), false);
        neoterm(&path)
            .args(["exec", "echo", "hello", "block"])
            .assert()
            .success()
            .stdout("hello block\n");
    }

    #[test]
    fn test_exec_exit_code_and_stderr() {
        let dir = tempfile::tempdir().unwrap();
        let path = pipe_config(dir.path(), false);
        let out = neoterm(&path)
            .args(["exec", "echo oops >&2; exit 3"])
            .assert()
            .code(3);
        let stderr = String::from_utf8_lossy(&out.get_output().stderr).to_string();
        assert!(stderr.contains("oops"));
    }

    #[test]
    fn test_exec_builtin() {
        let dir = tempfile::tempdir().unwrap();
        let path = pipe_config(dir.path(), false);
        neoterm(&path)
            .args(["exec", "!nosuchthing"])
            .assert()
            .code(1);
    }

    #[test]
    fn test_exec_is_recorded_in_history() {
        let dir = tempfile::tempdir().unwrap();
        let path = pipe_config(dir.path(), true);
        neoterm(&path)
            .args(["exec", "echo", "remembered"])
            .assert()
            .success();

        let out = neoterm(&path)
            .args(["history", "-s", "remembered"])
            .assert()
            .success();
        let stdout = String::from_utf8_lossy(&out.get_output().stdout).to_string();
        assert!(stdout.contains("echo remembered"));

        let out = neoterm(&path)
            .args(["history", "--export"])
            .assert()
            .success();
        let stdout = String::from_utf8_lossy(&out.get_output().stdout).to_string();
        assert_eq!(stdout.lines().last(), Some("echo remembered"));
    }
}
