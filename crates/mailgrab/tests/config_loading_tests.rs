//! Table-driven tests for YAML configuration loading.

use mailgrab::config::CredentialsMode;
use mailgrab::load_or_init;
use tempfile::TempDir;

struct ConfigTestCase {
    name: &'static str,
    yaml: &'static str,
    should_succeed: bool,
}

const CONFIG_TESTS: &[ConfigTestCase] = &[
    ConfigTestCase {
        name: "full_config",
        yaml: r#"
gmail:
  credentials_file: secrets/credentials.json
  credentials_mode: encrypted
  encrypted_credentials_file: secrets/credentials.json.encrypted
logging:
  system_log: logs/system.log
  search_log: logs/search.log
  log_level: debug
downloads:
  output_directory: attachments
  organize_by_sender: false
csv_record:
  enabled: true
  filename: record.csv
search:
  query: "from:billing has:attachment"
  file_types: ".pdf,.docx"
  dry_run: true
"#,
        should_succeed: true,
    },
    ConfigTestCase {
        name: "partial_sections_get_defaults",
        yaml: r#"
search:
  query: "label:receipts"
"#,
        should_succeed: true,
    },
    ConfigTestCase {
        name: "empty_mapping",
        yaml: "{}\n",
        should_succeed: true,
    },
    ConfigTestCase {
        name: "unknown_mode_rejected",
        yaml: r#"
gmail:
  credentials_mode: rot13
"#,
        should_succeed: false,
    },
    ConfigTestCase {
        name: "not_yaml_at_all",
        yaml: "search: [unclosed",
        should_succeed: false,
    },
];

#[test]
fn test_config_loading_table() {
    let dir = TempDir::new().unwrap();

    for case in CONFIG_TESTS {
        let path = dir.path().join(format!("{}.yaml", case.name));
        std::fs::write(&path, case.yaml).unwrap();

        let result = load_or_init(&path);
        assert_eq!(
            result.is_ok(),
            case.should_succeed,
            "case '{}': got {:?}",
            case.name,
            result.err()
        );
    }
}

#[test]
fn test_full_config_values() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, CONFIG_TESTS[0].yaml).unwrap();

    let config = load_or_init(&path).unwrap();
    assert_eq!(config.gmail.credentials_mode, CredentialsMode::Encrypted);
    assert_eq!(config.search.query, "from:billing has:attachment");
    assert_eq!(config.allowed_extensions(), vec![".pdf", ".docx"]);
    assert!(config.search.dry_run);
    assert!(!config.downloads.organize_by_sender);
    assert_eq!(config.logging.log_level, "debug");
}

#[test]
fn test_partial_config_fills_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("config.yaml");
    std::fs::write(&path, CONFIG_TESTS[1].yaml).unwrap();

    let config = load_or_init(&path).unwrap();
    // Overridden key.
    assert_eq!(config.search.query, "label:receipts");
    // Everything else per-key default.
    assert_eq!(config.gmail.credentials_mode, CredentialsMode::Plain);
    assert!(config.csv_record.enabled);
    assert!(config.downloads.organize_by_sender);
    assert!(!config.search.dry_run);
}

#[test]
fn test_first_run_writes_readable_defaults() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("nested/dir/config.yaml");

    let config = load_or_init(&path).unwrap();
    assert!(path.exists());
    assert_eq!(config.search.query, "has:attachment");

    let written = std::fs::read_to_string(&path).unwrap();
    assert!(written.contains("credentials_mode"));
    assert!(written.contains("organize_by_sender"));
}

#[test]
fn test_token_path_sits_next_to_credential_file() {
    let mut config = mailgrab::Config::default();
    config.gmail.credentials_file = "secrets/credentials.json".into();
    assert_eq!(
        config.token_path(),
        std::path::PathBuf::from("secrets/credentials.json.token")
    );
}
