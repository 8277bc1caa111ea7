use clap::Parser;

use super::*;

#[test]
fn cli_overrides_take_highest_precedence() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(4000);
    raw.logging.level = Some("info".to_string());
    raw.cache.max_entries = Some(50);

    let overrides = ServeOverrides {
        public_port: Some(4321),
        log_level: Some("debug".to_string()),
        cache: CacheOverrides {
            cache_max_entries: Some(10),
            ..Default::default()
        },
        ..Default::default()
    };

    raw.apply_serve_overrides(&overrides);
    let settings = Settings::from_raw(raw).expect("valid settings");

    assert_eq!(settings.server.public_addr.port(), 4321);
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.cache.max_entries.get(), 10);
}

#[test]
fn cache_defaults_match_cache_config() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");
    let config = CacheConfig::from(&settings.cache);
    let defaults = CacheConfig::default();

    assert_eq!(config.namespace, defaults.namespace);
    assert_eq!(config.default_ttl_secs, defaults.default_ttl_secs);
    assert_eq!(config.max_entries, defaults.max_entries);
    assert_eq!(config.max_bytes, defaults.max_bytes);
    assert_eq!(config.coalesce_misses, defaults.coalesce_misses);
    assert_eq!(config.header_ttl_secs, defaults.header_ttl_secs);
    assert_eq!(
        config.stale_while_revalidate_secs,
        defaults.stale_while_revalidate_secs
    );
    assert_eq!(config.vary, defaults.vary);
    assert_eq!(config.max_pattern_len, defaults.max_pattern_len);
}

#[test]
fn zero_cache_budgets_are_rejected() {
    let mut raw = RawSettings::default();
    raw.cache.max_bytes = Some(0);

    let err = Settings::from_raw(raw).expect_err("zero byte budget");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "cache.max_bytes",
            ..
        }
    ));

    let mut raw = RawSettings::default();
    raw.cache.default_ttl = Some(0);
    assert!(Settings::from_raw(raw).is_err());
}

#[test]
fn shared_listener_address_is_rejected() {
    let mut raw = RawSettings::default();
    raw.server.public_port = Some(3001);

    let err = Settings::from_raw(raw).expect_err("same address");
    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.admin_port",
            ..
        }
    ));
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
fn default_to_serve_command() {
    let args = CliArgs::parse_from(["ogcache"]);
    let command = args
        .command
        .unwrap_or(Command::Serve(Box::<ServeArgs>::default()));
    assert!(matches!(command, Command::Serve(_)));
}

#[test]
fn parse_key_arguments() {
    let args = CliArgs::parse_from([
        "ogcache",
        "key",
        "--cache-namespace",
        "cards",
        "title=Hello",
        "theme=dark",
    ]);

    match args.command.expect("key command") {
        Command::Key(key) => {
            assert_eq!(key.params, vec!["title=Hello", "theme=dark"]);
            assert_eq!(key.cache.cache_namespace.as_deref(), Some("cards"));
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_headers_arguments() {
    let args = CliArgs::parse_from([
        "ogcache", "headers", "--ttl", "60", "--tag", "og", "--tag", "post-1",
    ]);

    match args.command.expect("headers command") {
        Command::Headers(headers) => {
            assert_eq!(headers.ttl, Some(60));
            assert_eq!(headers.swr, None);
            assert_eq!(headers.tags, vec!["og", "post-1"]);
        }
        _ => panic!("wrong command parsed"),
    }
}

#[test]
fn parse_serve_overrides() {
    let args = CliArgs::parse_from([
        "ogcache",
        "serve",
        "--server-host",
        "0.0.0.0",
        "--cache-coalesce-misses",
        "false",
    ]);

    match args.command.expect("serve command") {
        Command::Serve(serve) => {
            assert_eq!(serve.overrides.server_host.as_deref(), Some("0.0.0.0"));
            assert_eq!(serve.overrides.cache.cache_coalesce_misses, Some(false));
        }
        _ => panic!("wrong command parsed"),
    }
}
