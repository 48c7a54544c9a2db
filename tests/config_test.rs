use std::io::Write;
use std::net::Ipv4Addr;
use std::time::Duration;
use tempfile::NamedTempFile;
use zonedns::config::{Transport, ZoneConfig};
use zonedns::error::ConfigError;
use zonedns::records::{Record, RecordStore};

fn write_config(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().unwrap();
    file.write_all(contents.as_bytes()).unwrap();
    file.flush().unwrap();
    file
}

#[test]
fn test_load_config_file() {
    let file = write_config(
        r#"{
            "Port": 5353,
            "Name": "Example.COM",
            "Secret": "hunter2",
            "Host": "127.0.0.1",
            "AdminAddr": "127.0.0.1:9090",
            "Records": {
                "WWW": {"Address": "10.0.0.1", "TTL": 300},
                "mail": {"Address": "10.0.0.2", "TTL": 60}
            },
            "Nameservers": [
                {"Address": "8.8.8.8:53", "Timeout": "2s", "Transport": "udp"},
                {"Address": "1.1.1.1:53", "Timeout": "750ms"}
            ]
        }"#,
    );

    let config = ZoneConfig::from_file(file.path()).unwrap();
    assert_eq!(config.port, 5353);
    assert_eq!(config.name, "example.com.");
    assert_eq!(config.host.as_deref(), Some("127.0.0.1"));
    assert_eq!(config.admin_addr, "127.0.0.1:9090".parse::<std::net::SocketAddr>().unwrap());
    assert_eq!(config.nameservers[0].transport, Transport::Udp);
    assert_eq!(config.nameservers[1].transport, Transport::Tcp);
    assert_eq!(config.nameservers[1].timeout, Duration::from_millis(750));

    let store = RecordStore::with_records(config.records);
    assert_eq!(store.len(), 2);
    assert_eq!(
        store.get("www"),
        Some(Record {
            address: Ipv4Addr::new(10, 0, 0, 1),
            ttl: 300
        })
    );
}

#[test]
fn test_missing_timeout_uses_default() {
    let file = write_config(
        r#"{"Port": 53, "Name": "example.com", "Nameservers": [{"Address": "9.9.9.9:53"}]}"#,
    );
    let config = ZoneConfig::from_file(file.path()).unwrap();
    assert_eq!(config.nameservers[0].timeout, Duration::from_secs(2));
    assert!(config.records.is_empty());
    assert_eq!(config.secret, "");
}

#[test]
fn test_missing_file_is_an_error() {
    let dir = tempfile::tempdir().unwrap();
    let err = ZoneConfig::from_file(dir.path().join("config.json")).unwrap_err();
    assert!(matches!(err, ConfigError::Read { .. }));
}

#[test]
fn test_malformed_files_are_rejected() {
    let cases = [
        "",
        "{",
        r#"{"Port": "fifty-three", "Name": "example.com"}"#,
        r#"{"Port": 53, "Name": "example.com", "Records": {"www": {"Address": "10.0.0.300", "TTL": 1}}}"#,
        r#"{"Port": 53, "Name": "example.com", "Nameservers": [{"Address": "8.8.8.8:53", "Timeout": "soon"}]}"#,
        r#"{"Port": 53, "Name": "example.com", "Nameservers": [{"Address": "8.8.8.8:53", "Transport": "sctp"}]}"#,
    ];

    for case in cases {
        let file = write_config(case);
        assert!(
            matches!(
                ZoneConfig::from_file(file.path()),
                Err(ConfigError::Malformed(_))
            ),
            "accepted {:?}",
            case
        );
    }
}
