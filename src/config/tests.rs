use std::fs;
use std::time::Duration;

use serial_test::serial;
use tempfile::tempdir;

use super::{PartialSettings, Settings, load_config_from};
use crate::auth::CredentialSource;
use crate::utils::error::BusError;

const NO_FILE: &str = "config/does-not-exist";

#[test]
fn test_default_settings() {
    let settings = Settings::default();
    assert_eq!(settings.bus.api_version, "2014-01");
    assert!(!settings.bus.accept_invalid_certs);
    assert_eq!(settings.auth.sas_key_name, "RootManageSharedAccessKey");
    assert_eq!(settings.auth.token_ttl(), Duration::from_secs(600));
    assert_eq!(settings.auth.renewal_margin(), Duration::from_secs(30));
    assert_eq!(settings.retry.max_attempts, 3);
    assert_eq!(settings.retry.policy().delay, Duration::from_secs(1));
    assert_eq!(settings.receiver.throttle_after, 10);
    assert_eq!(settings.receiver.abort_after, 100);
    assert_eq!(settings.log.level, "info");
}

#[test]
fn test_empty_partial_merges_to_defaults() {
    let merged = PartialSettings::default().merge(Settings::default());
    assert_eq!(merged, Settings::default());
}

#[test]
fn test_receiver_loop_settings_conversion() {
    let loop_settings = Settings::default().receiver.loop_settings();
    assert_eq!(loop_settings.receive_timeout, Duration::from_secs(60));
    assert_eq!(loop_settings.request_timeout, Duration::from_secs(5));
    assert_eq!(loop_settings.error_delay, Duration::from_millis(1000));
    assert_eq!(loop_settings.throttle_delay, Duration::from_secs(60));
}

#[test]
#[serial]
fn test_load_from_file_keeps_unset_defaults() {
    let dir = tempdir().unwrap();
    fs::write(
        dir.path().join("default.toml"),
        r#"
[bus]
namespace = "contoso"

[auth]
sas_key = "secret"
token_ttl_minutes = 20

[receiver]
abort_after = 7
"#,
    )
    .unwrap();
    let base = dir.path().join("default");

    let settings = temp_env::with_vars_unset(
        ["BUSREST_BUS__NAMESPACE", "BUSREST_AUTH__SAS_KEY"],
        || load_config_from(base.to_str().unwrap()),
    )
    .unwrap();

    assert_eq!(settings.bus.namespace, "contoso");
    assert_eq!(settings.auth.sas_key.as_deref(), Some("secret"));
    assert_eq!(settings.auth.token_ttl_minutes, 20);
    assert_eq!(settings.auth.renewal_margin_secs, 30);
    assert_eq!(settings.receiver.abort_after, 7);
    assert_eq!(settings.receiver.throttle_after, 10);
}

#[test]
#[serial]
fn test_environment_overrides_nested_keys() {
    let settings = temp_env::with_vars(
        [
            ("BUSREST_BUS__NAMESPACE", Some("fromenv")),
            ("BUSREST_AUTH__SAS_KEY_NAME", Some("SendOnly")),
            ("BUSREST_RETRY__MAX_ATTEMPTS", Some("5")),
            ("BUSREST_BUS__ACCEPT_INVALID_CERTS", Some("true")),
        ],
        || load_config_from(NO_FILE),
    )
    .unwrap();

    assert_eq!(settings.bus.namespace, "fromenv");
    assert_eq!(settings.auth.sas_key_name, "SendOnly");
    assert_eq!(settings.retry.max_attempts, 5);
    assert!(settings.bus.accept_invalid_certs);
}

#[test]
#[serial]
fn test_missing_namespace_is_config_error() {
    let result = temp_env::with_vars_unset(
        ["BUSREST_BUS__NAMESPACE", "BUSREST_BUS__BASE_URL"],
        || load_config_from(NO_FILE),
    );
    assert!(matches!(result, Err(BusError::Config(_))));
}

#[test]
fn test_credential_source_prefers_sas() {
    let mut auth = Settings::default().auth;
    auth.sas_key = Some("k".to_string());
    auth.acs_identity = Some("owner".to_string());
    auth.acs_key = Some("s".to_string());

    match auth.credential_source().unwrap() {
        CredentialSource::SharedAccessSignature { key_name, key } => {
            assert_eq!(key_name, "RootManageSharedAccessKey");
            assert_eq!(key, "k");
        }
        other => panic!("expected SAS, got {other:?}"),
    }
}

#[test]
fn test_credential_source_falls_back_to_acs() {
    let mut auth = Settings::default().auth;
    auth.acs_identity = Some("owner".to_string());
    auth.acs_key = Some("s".to_string());
    auth.token_endpoint = Some("https://issuer.test/WRAPv0.9/".to_string());

    assert!(matches!(
        auth.credential_source().unwrap(),
        CredentialSource::AccessControl { endpoint: Some(_), .. }
    ));
}

#[test]
fn test_credential_source_requires_some_credentials() {
    let auth = Settings::default().auth;
    assert!(matches!(auth.credential_source(), Err(BusError::Config(_))));
}

#[test]
fn test_auth_debug_redacts_keys() {
    let mut auth = Settings::default().auth;
    auth.sas_key = Some("topsecret".to_string());
    let printed = format!("{auth:?}");
    assert!(!printed.contains("topsecret"));
    assert!(printed.contains("<redacted>"));
}
