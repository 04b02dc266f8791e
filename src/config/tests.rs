use super::*;

#[test]
fn defaults_select_the_fs_backend() {
    let settings = Settings::from_raw(RawSettings::default()).expect("valid settings");

    match settings.storage {
        StorageSettings::Fs { root } => assert_eq!(root, PathBuf::from(DEFAULT_STORAGE_ROOT)),
        other => panic!("expected fs backend, got {other:?}"),
    }
    assert!(settings.database.url.is_none());
    assert_eq!(
        settings.database.max_connections,
        DEFAULT_DB_MAX_CONNECTIONS
    );
    assert_eq!(settings.logging.level, LevelFilter::INFO);
    assert_eq!(settings.logging.format, LogFormat::Compact);
}

#[test]
fn gateway_backend_requires_connection_parameters() {
    let raw = RawSettings {
        storage: RawStorageSettings {
            backend: Some("gateway".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Missing {
            field: "storage.endpoint"
        })
    ));
}

#[test]
fn gateway_account_key_is_base64_decoded() {
    let raw = RawSettings {
        storage: RawStorageSettings {
            backend: Some("gateway".to_string()),
            endpoint: Some("https://blobs.example.net".to_string()),
            container: Some("avatars".to_string()),
            account_key: Some("c2VjcmV0".to_string()),
            url_ttl_seconds: Some(120),
            ..Default::default()
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("valid settings");
    match settings.storage {
        StorageSettings::Gateway {
            account_key,
            url_ttl,
            ..
        } => {
            assert_eq!(account_key, b"secret".to_vec());
            assert_eq!(url_ttl, Duration::from_secs(120));
        }
        other => panic!("expected gateway backend, got {other:?}"),
    }
}

#[test]
fn malformed_account_key_is_rejected() {
    let raw = RawSettings {
        storage: RawStorageSettings {
            backend: Some("gateway".to_string()),
            endpoint: Some("https://blobs.example.net".to_string()),
            container: Some("avatars".to_string()),
            account_key: Some("%%%not-base64%%%".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            field: "storage.account_key",
            ..
        })
    ));
}

#[test]
fn unknown_backend_is_rejected() {
    let raw = RawSettings {
        storage: RawStorageSettings {
            backend: Some("tape".to_string()),
            ..Default::default()
        },
        ..Default::default()
    };

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            field: "storage.backend",
            ..
        })
    ));
}

#[test]
fn json_logging_selects_the_json_format() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: Some("debug".to_string()),
            json: Some(true),
        },
        ..Default::default()
    };

    let settings = Settings::from_raw(raw).expect("valid settings");
    assert_eq!(settings.logging.level, LevelFilter::DEBUG);
    assert_eq!(settings.logging.format, LogFormat::Json);
}

#[test]
fn unparseable_log_level_is_rejected() {
    let raw = RawSettings {
        logging: RawLoggingSettings {
            level: Some("shout".to_string()),
            json: None,
        },
        ..Default::default()
    };

    assert!(matches!(
        Settings::from_raw(raw),
        Err(LoadError::Invalid {
            field: "logging.level",
            ..
        })
    ));
}
