use std::path::PathBuf;
use std::sync::Mutex;
use std::time::Duration;

use tempfile::NamedTempFile;

use scope_monitor::config::MonitorConfig;
use scope_monitor::overlay::find_label_font;
use scope_monitor::FacingMode;

static ENV_LOCK: Mutex<()> = Mutex::new(());

fn clear_env() {
    for key in [
        "SCOPE_CONFIG",
        "SCOPE_SERVER_URL",
        "SCOPE_CAMERA_URL",
        "SCOPE_PERIOD_MS",
        "SCOPE_OVERLAY_PATH",
        "SCOPE_FONT_PATH",
    ] {
        std::env::remove_var(key);
    }
}

#[test]
fn loads_config_from_file_and_env_overrides() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    let json = r#"{
        "server_url": "http://scope-server:5000",
        "camera": {
            "url": "http://scope-cam/stream.mjpg",
            "ideal_width": 1920,
            "ideal_height": 1080,
            "facing": "user"
        },
        "period_ms": 1500,
        "jpeg_quality": 0.75,
        "overlay_path": "/tmp/overlay.png"
    }"#;
    std::io::Write::write_all(&mut file, json.as_bytes()).expect("write config");

    std::env::set_var("SCOPE_CONFIG", file.path());
    std::env::set_var("SCOPE_CAMERA_URL", "stub://bench");
    std::env::set_var("SCOPE_PERIOD_MS", "2500");

    let cfg = MonitorConfig::load().expect("load config");

    assert_eq!(cfg.server_url, "http://scope-server:5000");
    assert_eq!(cfg.camera.url, "stub://bench");
    assert_eq!(cfg.camera.ideal_width, 1920);
    assert_eq!(cfg.camera.ideal_height, 1080);
    assert_eq!(cfg.camera.facing, FacingMode::User);
    assert_eq!(cfg.period, Duration::from_millis(2500));
    assert_eq!(cfg.jpeg_quality, 0.75);
    assert_eq!(cfg.overlay_path, Some(PathBuf::from("/tmp/overlay.png")));
    assert_eq!(cfg.font_path, find_label_font());

    clear_env();
}

#[test]
fn toml_files_are_read_by_extension() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let mut file = tempfile::Builder::new()
        .suffix(".toml")
        .tempfile()
        .expect("temp config");
    let toml = r#"
server_url = "https://detect.lab"
period_ms = 500

[camera]
url = "stub://toml"
facing = "environment"
"#;
    std::io::Write::write_all(&mut file, toml.as_bytes()).expect("write config");

    let cfg = MonitorConfig::load_from(Some(file.path())).expect("load config");
    assert_eq!(cfg.server_url, "https://detect.lab");
    assert_eq!(cfg.period, Duration::from_millis(500));
    assert_eq!(cfg.camera.url, "stub://toml");
    assert_eq!(cfg.camera.ideal_width, 1280);

    clear_env();
}

#[test]
fn defaults_apply_without_a_config_file() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    let cfg = MonitorConfig::load().expect("load defaults");
    assert_eq!(cfg.server_url, "http://127.0.0.1:5000");
    assert_eq!(cfg.camera.url, "stub://microscope");
    assert_eq!(cfg.period, Duration::from_millis(2000));
    assert_eq!(cfg.jpeg_quality, 0.9);
}

#[test]
fn rejects_invalid_values() {
    let _guard = ENV_LOCK.lock().unwrap();
    clear_env();

    std::env::set_var("SCOPE_PERIOD_MS", "0");
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("SCOPE_PERIOD_MS", "soon");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    std::env::set_var("SCOPE_SERVER_URL", "ws://scope-server");
    assert!(MonitorConfig::load().is_err());
    clear_env();

    let mut file = NamedTempFile::new().expect("temp config");
    std::io::Write::write_all(&mut file, br#"{"jpeg_quality": 0.0}"#).expect("write config");
    std::env::set_var("SCOPE_CONFIG", file.path());
    assert!(MonitorConfig::load().is_err());

    std::env::set_var("SCOPE_CONFIG", "/nonexistent/scope.json");
    assert!(MonitorConfig::load().is_err());

    clear_env();
}
