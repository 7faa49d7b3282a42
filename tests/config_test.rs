use api_conductor::config::Config;
use api_conductor::error::Error;
use secrecy::ExposeSecret;
use std::collections::HashMap;
use std::time::Duration;

fn lookup(vars: &[(&str, &str)]) -> impl Fn(&str) -> Option<String> {
    let vars: HashMap<String, String> = vars
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect();
    move |name: &str| vars.get(name).cloned()
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.scheduler.concurrency_limit, 3);
    assert_eq!(config.scheduler.dispatch_delay_ms, 100);
    assert_eq!(config.cache.default_ttl_secs, 300);
    assert_eq!(config.logs.max_logs, 10_000);
    assert!(config.logs.mirror);
    assert_eq!(config.api.timeout_secs, 30);
    assert!(config.api.base_url.is_none());
    assert!(config.otel_endpoint.is_none());
    assert_eq!(config.log_level, "info");

    let scheduler = config.scheduler_config();
    assert_eq!(scheduler.dispatch_delay, Duration::from_millis(100));
    assert_eq!(config.cache_ttl(), Duration::from_secs(300));
}

#[test]
fn toml_overrides_only_the_keys_it_names() {
    let config = Config::from_toml_str(
        r#"
        log_level = "debug"

        [scheduler]
        concurrency_limit = 8

        [api]
        base_url = "https://api.example.com"
        token = "sk-test"
        "#,
    )
    .unwrap();

    assert_eq!(config.scheduler.concurrency_limit, 8);
    assert_eq!(config.scheduler.dispatch_delay_ms, 100);
    assert_eq!(config.log_level, "debug");
    assert_eq!(config.api.base_url.as_deref(), Some("https://api.example.com"));
    assert_eq!(
        config.api.token.as_ref().map(|t| t.expose_secret()),
        Some("sk-test")
    );
}

#[test]
fn unknown_keys_are_rejected() {
    let result = Config::from_toml_str("[scheduler]\nconcurency_limit = 2\n");
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn overrides_win_over_file_values() {
    let mut config = Config::from_toml_str("[cache]\ndefault_ttl_secs = 60\n").unwrap();
    config
        .apply_overrides(lookup(&[
            ("CONDUCTOR_CACHE_TTL_SECS", "120"),
            ("CONDUCTOR_CONCURRENCY_LIMIT", " 5 "),
            ("CONDUCTOR_LOG_MIRROR", "off"),
            ("CONDUCTOR_API_TOKEN", "sk-env"),
            ("OTEL_ENDPOINT", "http://localhost:4317"),
        ]))
        .unwrap();

    assert_eq!(config.cache.default_ttl_secs, 120);
    assert_eq!(config.scheduler.concurrency_limit, 5);
    assert!(!config.logs.mirror);
    assert_eq!(config.otel_endpoint.as_deref(), Some("http://localhost:4317"));
    assert_eq!(
        config.api.token.as_ref().map(|t| t.expose_secret()),
        Some("sk-env")
    );
}

#[test]
fn malformed_number_is_a_config_error() {
    let mut config = Config::default();
    let err = config
        .apply_overrides(lookup(&[("CONDUCTOR_MAX_LOGS", "lots")]))
        .unwrap_err();
    assert!(matches!(err, Error::Config(ref msg) if msg.contains("CONDUCTOR_MAX_LOGS")));
}

#[test]
fn malformed_bool_is_a_config_error() {
    let mut config = Config::default();
    let result = config.apply_overrides(lookup(&[("CONDUCTOR_LOG_MIRROR", "maybe")]));
    assert!(matches!(result, Err(Error::Config(_))));
}

#[test]
fn token_is_redacted_in_debug_output() {
    let mut config = Config::default();
    config
        .apply_overrides(lookup(&[("CONDUCTOR_API_TOKEN", "sk-very-secret")]))
        .unwrap();
    let rendered = format!("{config:?}");
    assert!(!rendered.contains("sk-very-secret"));
}

#[test]
fn load_reads_file_from_disk() {
    let path = std::env::temp_dir().join(format!("conductor-config-{}.toml", std::process::id()));
    std::fs::write(&path, "[logs]\nmax_logs = 50\n").unwrap();

    let config = Config::load(Some(path.as_path()));
    std::fs::remove_file(&path).ok();

    assert_eq!(config.unwrap().logs.max_logs, 50);
}

#[test]
fn load_fails_for_missing_file() {
    let path = std::env::temp_dir().join("conductor-config-does-not-exist.toml");
    assert!(matches!(Config::load(Some(path.as_path())), Err(Error::Config(_))));
}
