use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(4000);
    raw.logging.level = Some("info".to_string());

    let overrides = ServeOverrides {
        server_port: Some(4321),
        log_level: Some("debug".to_string()),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
}

#[test]
fn cache_defaults() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let cache = settings.cache;

    assert!(cache.enabled);
    assert_eq!(cache.backend, CacheBackend::Redis);
    assert_eq!(cache.redis_url, "redis://127.0.0.1:6379");
    assert_eq!(cache.ttl, Duration::from_secs(300));
    assert_eq!(cache.operation_timeout, Duration::from_millis(1000));
    assert_eq!(cache.max_body_bytes.get(), 1024 * 1024);
    assert_eq!(cache.default_version, "v1");
    assert_eq!(cache.resource_type, "tasks");
}

#[test]
fn zero_ttl_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));
}

#[test]
fn zero_operation_timeout_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.operation_timeout_ms = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.operation_timeout_ms",
            ..
        }
    ));
}

#[test]
fn zero_body_limit_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_body_bytes = Some(0);

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_body_bytes",
            ..
        }
    ));
}

#[test]
fn unknown_backend_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("memcached".to_string());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(err.to_string().contains("memcached"));
}

#[test]
fn key_space_components_must_not_contain_separator() {
    let mut raw = RawSettings::default();
    raw.cache.resource_type = Some("tasks:archived".to_string());

    let err = Settings::from_raw(raw).unwrap_err();
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.resource_type",
            ..
        }
    ));
}

#[test]
fn blank_redis_url_falls_back_to_default() {
    let mut raw = RawSettings::default();
    raw.cache.redis_url = Some("   ".to_string());

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.redis_url, "redis://127.0.0.1:6379");
}

#[test]
fn cli_json_logging_enforces_format() {
    let mut raw = RawSettings::default();
    let overrides = ServeOverrides {
        log_json: Some(true),
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(matches!(settings.logging.format, LogFormat::Json));
}

#[test]
fn cli_cache_overrides_apply() {
    let mut raw = RawSettings::default();
    raw.cache.backend = Some("redis".to_string());
    let overrides = ServeOverrides {
        cache_enabled: Some(false),
        cache_ttl_seconds: Some(60),
        cache: CacheOverrides {
            backend: Some(BackendArg::Memory),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert!(!settings.cache.enabled);
    assert_eq!(settings.cache.backend, CacheBackend::Memory);
    assert_eq!(settings.cache.ttl, Duration::from_secs(60));
}

#[test]
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["taskdeck"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "taskdeck",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-redis-url",
        "redis://cache:6379",
        "--cache-enabled",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(
                serve.overrides.cache.redis_url.as_deref(),
                Some("redis://cache:6379")
            );
            assert_eq!(serve.overrides.cache_enabled, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_flush_cache_arguments() {
    let args = CliArgs::parse_from(["taskdeck", "flush-cache", "--cache-backend", "memory"]);

    match args.command.expect("flush-cache command") {
        Command::FlushCache(flush) => {
            assert_eq!(flush.cache.backend, Some(BackendArg::Memory));
            assert!(flush.cache.redis_url.is_none());
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn unusable_server_address_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.port = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "server.port",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.server.host = Some("not a host".to_string());
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "server.host",
            ..
        }
    ));
}

#[test]
fn ttl_above_thirty_days_is_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(u64::MAX);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "cache.ttl_seconds",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.ttl_seconds = Some(30 * 24 * 60 * 60);
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.cache.ttl, Duration::from_secs(2_592_000));
}

#[test]
fn rate_limit_defaults_and_overrides() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    assert!(settings.rate_limit.enabled);
    assert_eq!(settings.rate_limit.window, Duration::from_secs(1));
    assert_eq!(settings.rate_limit.max_requests, 1_000);

    let mut raw = RawSettings::default();
    raw.apply_serve_overrides(&ServeOverrides {
        rate_limit_enabled: Some(false),
        rate_limit_max_requests: Some(50),
        ..Default::default()
    });
    let settings = Settings::from_raw(raw).expect("valid settings");
    assert!(!settings.rate_limit.enabled);
    assert_eq!(settings.rate_limit.max_requests, 50);
}

#[test]
fn zero_rate_limit_values_are_rejected() {
    let mut raw = RawSettings::default();
    raw.rate_limit.window_ms = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "rate_limit.window_ms",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.rate_limit.max_requests = Some(0);
    assert!(matches!(
        Settings::from_raw(raw).unwrap_err(),
        LoadError::Invalid {
            key: "rate_limit.max_requests",
            ..
        }
    ));
}
