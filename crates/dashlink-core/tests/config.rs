use std::io::Write;
use std::time::Duration;

use dashlink_core::config::{BridgeConfig, ConfigError};
use dashlink_core::normalize::Ceilings;
use pretty_assertions::assert_eq;
use tempfile::NamedTempFile;

#[test]
fn test_load_from_file() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(
        file,
        "# dashboard\nurl = http://10.0.0.2:8080/sse\nport = /dev/ttyACM0\n\
         baud = 115200\nmax_temp = 90\nmax_speed = 6000\nidle_timeout = 120"
    )
    .unwrap();

    let config = BridgeConfig::from_file(file.path()).unwrap();
    assert_eq!(
        config,
        BridgeConfig {
            endpoint_url: "http://10.0.0.2:8080/sse".into(),
            device_id: "/dev/ttyACM0".into(),
            baud_rate: 115200,
            max_temperature: 90,
            max_speed: 6000,
            stream_idle_timeout: Some(Duration::from_secs(120)),
        }
    );
    assert_eq!(
        config.ceilings(),
        Ceilings {
            max_temperature: 90.0,
            max_speed: 6000.0,
        }
    );
}

#[test]
fn test_missing_file_is_fatal() {
    let dir = tempfile::tempdir().unwrap();
    let err = BridgeConfig::from_file(dir.path().join("absent.conf")).unwrap_err();
    assert!(matches!(err, ConfigError::Io { .. }));
    assert!(err.to_string().contains("absent.conf"));
}

#[test]
fn test_incomplete_file_is_fatal() {
    let mut file = NamedTempFile::new().unwrap();
    writeln!(file, "url = http://10.0.0.2/sse\nport = COM4\nbaud = 9600\nmax_temp = 90").unwrap();
    let err = BridgeConfig::from_file(file.path()).unwrap_err();
    assert!(matches!(err, ConfigError::Missing("max_speed")));
}
