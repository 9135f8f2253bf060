use super::*;

fn cli_with(overrides: ServeOverrides) -> CliArgs {
    CliArgs {
        config_file: None,
        command: Some(Command::Serve(Box::new(ServeArgs { overrides }))),
    }
}

#[test]
fn defaults_resolve_without_any_source() {
    let settings = load(&CliArgs {
        config_file: None,
        command: None,
    })
    .expect("settings");

    assert_eq!(settings.server.public_addr.port(), 3000);
    assert_eq!(settings.server.admin_addr.port(), 3001);
    assert_eq!(settings.database.max_connections.get(), 8);
    assert!(settings.database.url.is_none());
    assert!(settings.auth.bootstrap_admin_token.is_none());
    assert!(settings.cache.enabled);
    assert_eq!(settings.rate_limit.max_requests, 5);
}

#[test]
fn cli_overrides_take_precedence() {
    let settings = load(&cli_with(ServeOverrides {
        public_port: Some(8080),
        database_url: Some("postgres://localhost/enrolla".to_string()),
        cache_enabled: Some(false),
        ..ServeOverrides::default()
    }))
    .expect("settings");

    assert_eq!(settings.server.public_addr.port(), 8080);
    assert_eq!(
        settings.database.url.as_deref(),
        Some("postgres://localhost/enrolla")
    );
    assert!(!settings.cache.enabled);
}

#[test]
fn zero_port_is_rejected() {
    let err = load(&cli_with(ServeOverrides {
        public_port: Some(0),
        ..ServeOverrides::default()
    }))
    .expect_err("zero port");

    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "server.public_port",
            ..
        }
    ));
}

#[test]
fn blank_bootstrap_token_is_dropped() {
    let settings = load(&cli_with(ServeOverrides {
        auth_bootstrap_admin_token: Some("   ".to_string()),
        ..ServeOverrides::default()
    }))
    .expect("settings");

    assert!(settings.auth.bootstrap_admin_token.is_none());
}

#[test]
fn invalid_log_level_is_rejected() {
    let err = load(&cli_with(ServeOverrides {
        log_level: Some("chatty".to_string()),
        ..ServeOverrides::default()
    }))
    .expect_err("invalid level");

    assert!(matches!(
        err,
        LoadError::Invalid {
            key: "logging.level",
            ..
        }
    ));
}
