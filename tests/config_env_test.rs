use std::env;
use std::path::PathBuf;

use tempfile::TempDir;
use watchplus::{PidDiscovery, Settings, StartMethod};

// Only test in this binary: environment changes are process-wide
#[test]
fn test_env_override() {
    let temp_dir = TempDir::new().unwrap();
    let config_path = temp_dir.path().join("settings.toml");
    std::fs::write(
        &config_path,
        "[observer]\npoll_grain_ms = 250\nstart_method = \"thread\"\n",
    )
    .unwrap();

    unsafe {
        env::set_var("WP_OBSERVER__POLL_GRAIN_MS", "42");
        env::set_var("WP_OBSERVER__START_METHOD", "process");
        env::set_var("WP_SERVICE__PID_DISCOVERY", "process-table");
        env::set_var("WP_SERVICE__BASE_DIR", "/srv/watchers");
    }

    let settings = Settings::load_from(&config_path).unwrap();

    unsafe {
        env::remove_var("WP_OBSERVER__POLL_GRAIN_MS");
        env::remove_var("WP_OBSERVER__START_METHOD");
        env::remove_var("WP_SERVICE__PID_DISCOVERY");
        env::remove_var("WP_SERVICE__BASE_DIR");
    }

    // Environment wins over the file
    assert_eq!(settings.observer.poll_grain_ms, 42);
    assert_eq!(settings.observer.start_method, StartMethod::Process);
    assert_eq!(settings.service.pid_discovery, PidDiscovery::ProcessTable);
    assert_eq!(settings.service.base_dir, PathBuf::from("/srv/watchers"));
    // Untouched keys keep their defaults
    assert_eq!(settings.handler.kind, "log");
}
