use std::process::Command;
use tempfile::TempDir;

fn watchplus(dir: &std::path::Path) -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_watchplus"));
    command.current_dir(dir).env_remove("RUST_LOG");
    command
}

#[test]
fn test_init_command() {
    let temp_dir = TempDir::new().unwrap();

    let output = watchplus(temp_dir.path())
        .arg("init")
        .output()
        .expect("Failed to run init command");
    assert!(output.status.success());

    let config_path = temp_dir.path().join(".watchplus/settings.toml");
    assert!(config_path.exists());

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("version = 1"));
    assert!(content.contains("[observer]"));
    assert!(content.contains("[service]"));

    // A second init without --force refuses to overwrite
    let again = watchplus(temp_dir.path()).arg("init").output().unwrap();
    assert!(!again.status.success());

    let forced = watchplus(temp_dir.path())
        .args(["init", "--force"])
        .output()
        .unwrap();
    assert!(forced.status.success());
}

#[test]
fn test_config_command_reads_project_settings() {
    let temp_dir = TempDir::new().unwrap();
    let config_dir = temp_dir.path().join(".watchplus");
    std::fs::create_dir(&config_dir).unwrap();
    std::fs::write(
        config_dir.join("settings.toml"),
        "[observer]\npoll_grain_ms = 321\n",
    )
    .unwrap();

    let output = watchplus(temp_dir.path()).arg("config").output().unwrap();
    assert!(output.status.success());

    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("poll_grain_ms = 321"), "{stdout}");
}

#[test]
fn test_watch_with_duration_logs_events_to_file() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("watched");
    std::fs::create_dir(&watched).unwrap();
    let log_file = temp_dir.path().join("events.log");

    let mut child = watchplus(temp_dir.path())
        .arg("watch")
        .arg(format!("docs={}", watched.display()))
        .args(["--duration", "2", "--log-file"])
        .arg(&log_file)
        .spawn()
        .unwrap();

    std::thread::sleep(std::time::Duration::from_millis(700));
    std::fs::write(watched.join("new.txt"), "hello").unwrap();

    let status = child.wait().unwrap();
    assert!(status.success());

    let content = std::fs::read_to_string(&log_file).unwrap();
    assert!(content.contains("<WatchDog: docs>"), "{content}");
    assert!(content.contains("new.txt"), "{content}");
}

#[test]
fn test_watch_missing_path_fails() {
    let temp_dir = TempDir::new().unwrap();

    let output = watchplus(temp_dir.path())
        .args(["watch", "ghost=./does-not-exist", "--duration", "1"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("does-not-exist"), "{stderr}");
}

#[test]
fn test_service_create_status_clean() {
    let temp_dir = TempDir::new().unwrap();
    let watched = temp_dir.path().join("watched");
    std::fs::create_dir(&watched).unwrap();

    let create = watchplus(temp_dir.path())
        .args(["service", "create", "docs"])
        .arg(&watched)
        .output()
        .unwrap();
    assert!(create.status.success(), "{create:?}");

    let service_dir = temp_dir.path().join("docs watchplus-service");
    let script = service_dir.join("docs_service.toml");
    assert!(script.exists());
    let text = std::fs::read_to_string(&script).unwrap();
    assert!(text.starts_with("#!"));
    assert!(text.contains("run-service"));

    let status = watchplus(temp_dir.path())
        .args(["service", "status", "docs"])
        .output()
        .unwrap();
    assert!(status.status.success());
    assert!(String::from_utf8_lossy(&status.stdout).contains("not running"));

    // Stopping a service that never started fails and keeps its files
    let clean_stop = watchplus(temp_dir.path())
        .args(["service", "clean-stop", "docs"])
        .output()
        .unwrap();
    assert!(!clean_stop.status.success());
    assert!(script.exists());

    // Default handler output lands next to the script
    let events = service_dir.join("docs_events.log");
    std::fs::write(&events, "<WatchDog: docs> watched\n").unwrap();

    let clean = watchplus(temp_dir.path())
        .args(["service", "clean", "docs"])
        .output()
        .unwrap();
    assert!(clean.status.success());
    assert!(!script.exists());
    assert!(events.exists());
}

#[test]
fn test_unknown_service_reports_error() {
    let temp_dir = TempDir::new().unwrap();

    let output = watchplus(temp_dir.path())
        .args(["service", "pid", "ghost"])
        .output()
        .unwrap();

    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ghost"));
}
