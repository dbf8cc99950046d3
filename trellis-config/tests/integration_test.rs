//! Integration tests for trellis-config

use std::fs;
use std::path::PathBuf;
use trellis_config::*;

fn write_temp(name: &str, content: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("trellis-config-{}-{name}", std::process::id()));
    fs::write(&path, content).unwrap();
    path
}

#[test]
fn test_load_toml_file_then_env() {
    let path = write_temp(
        "app.toml",
        r#"
        base_url = "/file"

        [cors]
        allowed_headers = ["authorization"]
        "#,
    );

    let loader = AppConfigLoader::new().with_file(&path).with_env();
    let vars = EnvLoader::default().collect_vars([
        ("TRELLIS_BASE_URL", "/env"),
        ("TRELLIS_HEADER_CACHE_CONTROL", "no-store"),
    ]);
    let config = loader.load_with_vars(&vars).unwrap();

    assert_eq!(config.base_url, "/env");
    assert_eq!(config.cors.allowed_headers, ["authorization"]);
    assert_eq!(
        config.default_headers.get("cache-control").map(String::as_str),
        Some("no-store")
    );

    fs::remove_file(path).unwrap();
}

#[test]
fn test_load_json_file() {
    let path = write_temp("app.json", r#"{"base_url": "/json"}"#);

    let config = AppConfigLoader::new().with_file(&path).load().unwrap();
    assert_eq!(config.base_url, "/json");

    fs::remove_file(path).unwrap();
}

#[test]
fn test_missing_file() {
    let result = AppConfigLoader::new()
        .with_file("/definitely/not/here/app.toml")
        .load();
    assert!(matches!(
        result,
        Err(ConfigError::LoadError(ref message)) if message.contains("/definitely/not/here/app.toml")
    ));
}

#[test]
fn test_unsupported_extension() {
    let path = write_temp("app.yaml", "base_url: /yaml");
    let result = AppConfigLoader::new().with_file(&path).load();
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
    fs::remove_file(path).unwrap();
}

#[test]
fn test_missing_dotenv_file_is_an_error() {
    let result = AppConfigLoader::new()
        .with_dotenv_file("/definitely/not/here/.env")
        .load();
    assert!(matches!(result, Err(ConfigError::LoadError(_))));
}

#[test]
fn test_loaded_config_drives_application() {
    let config = parse_app_config(r#"{"base_url": "/v3"}"#, FileFormat::Json).unwrap();
    let app = trellis_core::Application::new(config).unwrap();
    assert_eq!(app.router().base_url(), "/v3");
}
