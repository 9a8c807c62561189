use std::fs;
use std::time::Duration;

use assert_matches::assert_matches;

use acq_catalog::config::{Config, ConfigLoader, LogFormat};
use acq_catalog::error::CatalogError;

#[test]
fn parse_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acqcat.json");
    fs::write(
        &path,
        r#"{
            "schema_version": 1,
            "database_file": "/var/lib/acq/catalog.sqlite3",
            "repository_path": "/data/acquisitions",
            "log_format": "json",
            "request_timeout_secs": 15
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(path.to_str()).unwrap();
    assert_eq!(resolved.source.as_deref(), Some(path.as_path()));
    assert_eq!(resolved.repository_path, "/data/acquisitions");
    assert_eq!(resolved.log_format, LogFormat::Json);
    assert_eq!(resolved.log_level, "info");
    assert_eq!(resolved.request_timeout, Duration::from_secs(15));
}

#[test]
fn explicit_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("absent.json");
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, CatalogError::ConfigRead(_));
}

#[test]
fn unknown_log_format_is_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("acqcat.json");
    fs::write(&path, r#"{ "log_format": "xml" }"#).unwrap();
    let err = ConfigLoader::resolve(path.to_str()).unwrap_err();
    assert_matches!(err, CatalogError::ConfigParse(_));
}

#[test]
fn zero_timeout_is_rejected() {
    let config = Config {
        request_timeout_secs: Some(0),
        ..Config::default()
    };
    assert_matches!(
        ConfigLoader::resolve_config(config),
        Err(CatalogError::ConfigParse(_))
    );
}
