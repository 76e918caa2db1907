// Configuration Module Tests
// Tests for CacheConfig defaults, file loading, and startup behaviour

use std::fs;
use std::time::Duration;
use tenant_cache::{CacheConfig, CacheService, ConnectionState};

#[test]
fn test_config_default_values() {
    let config = CacheConfig::default();

    // External store defaults
    assert_eq!(config.external.url, None);
    assert_eq!(config.external.connect_timeout(), Duration::from_secs(2));
    assert_eq!(config.external.command_timeout(), Duration::from_millis(500));
    assert_eq!(config.external.scan_count, 100);

    // Local store defaults
    assert_eq!(config.local.max_entries, 100_000);

    // Logging defaults
    assert_eq!(config.logging.level, "info");
    assert_eq!(config.logging.format, "json");
}

#[test]
fn test_config_from_file() {
    let temp_config = r#"
external:
  url: "redis://cache.internal:6380/2"
  connect_timeout_ms: 750
  command_timeout_ms: 120
  scan_count: 500
local:
  max_entries: 2048
logging:
  level: "debug"
  format: "pretty"
"#;

    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("cache.yml");
    fs::write(&path, temp_config).unwrap();

    let config = CacheConfig::from_file(&path).unwrap();
    assert_eq!(config.external.url(), Some("redis://cache.internal:6380/2"));
    assert_eq!(config.external.connect_timeout(), Duration::from_millis(750));
    assert_eq!(config.external.command_timeout(), Duration::from_millis(120));
    assert_eq!(config.external.scan_count, 500);
    assert_eq!(config.local.max_entries, 2048);
    assert_eq!(config.logging.level, "debug");
    assert_eq!(config.logging.format, "pretty");
}

#[test]
fn test_config_from_missing_file_fails() {
    let dir = tempfile::tempdir().unwrap();
    assert!(CacheConfig::from_file(dir.path().join("absent.yml")).is_err());
}

#[test]
fn test_config_from_invalid_yaml_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.yml");
    fs::write(&path, "external: [not, a, map").unwrap();
    assert!(CacheConfig::from_file(&path).is_err());
}

#[test]
fn test_config_yaml_roundtrip() {
    let config = CacheConfig::default().with_redis_url("redis://127.0.0.1:6379");
    let yaml = serde_yaml::to_string(&config).unwrap();
    let parsed: CacheConfig = serde_yaml::from_str(&yaml).unwrap();
    assert_eq!(parsed.external.url(), Some("redis://127.0.0.1:6379"));
    assert_eq!(parsed.local.max_entries, config.local.max_entries);
}

#[tokio::test]
async fn test_service_without_url_is_disabled() {
    let service = CacheService::new(&CacheConfig::default());
    assert_eq!(service.state(), ConnectionState::Disabled);
}

#[tokio::test]
async fn test_service_with_malformed_url_is_disabled() {
    let service = CacheService::new(&CacheConfig::default().with_redis_url("::not-a-url::"));
    assert_eq!(service.state(), ConnectionState::Disabled);

    // Still fully usable
    let value: u32 = service
        .get_or_compute("counts", tenant_cache::TenantScope::Global, 60, || async {
            Ok::<_, std::io::Error>(5)
        })
        .await
        .unwrap();
    assert_eq!(value, 5);
}
