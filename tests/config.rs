use std::fs;

use assert_matches::assert_matches;
use camino::{Utf8Path, Utf8PathBuf};

use strainload::config::{CliOverrides, Config, ConfigLoader, Constants, EnvOverrides};
use strainload::domain::LoadMode;
use strainload::error::LoadError;

#[test]
fn defaults_match_registry_constants() {
    let constants = Constants::default();
    assert_eq!(constants.species_vocab_key, 26);
    assert_eq!(constants.strain_type_vocab_key, 55);
    assert_eq!(constants.strain_attribute_vocab_key, 27);
    assert_eq!(constants.mgi_prefix, "MGI:");
    assert_eq!(constants.nomenclature_qualifier_key, 615427);
    assert!(constants.is_approved_status("Autoloaded"));
    assert!(!constants.is_approved_status("Reserved"));
}

#[test]
fn parse_partial_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("strainload.json");
    fs::write(
        &path,
        r#"{
            "server": "mgi-db",
            "snapshot": "registry.json",
            "constants": { "synonym_type_key": 1002 }
        }"#,
    )
    .unwrap();

    let resolved = ConfigLoader::resolve(
        path.to_str(),
        EnvOverrides::default(),
        CliOverrides::default(),
    )
    .unwrap();

    assert_eq!(resolved.server, "mgi-db");
    assert_eq!(resolved.snapshot, Some(Utf8PathBuf::from("registry.json")));
    assert_eq!(resolved.constants.synonym_type_key, 1002);
    assert_eq!(resolved.constants.origin_note_type_key, 1011);
}

#[test]
fn explicit_missing_config_is_an_error() {
    let err = ConfigLoader::resolve(
        Some("/nonexistent/strainload.json"),
        EnvOverrides::default(),
        CliOverrides::default(),
    )
    .unwrap_err();
    assert_matches!(err, LoadError::ConfigRead(_));
}

#[test]
fn malformed_config_is_reported() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("broken.json");
    fs::write(&path, "{ not json").unwrap();

    let err = ConfigLoader::resolve(
        path.to_str(),
        EnvOverrides::default(),
        CliOverrides::default(),
    )
    .unwrap_err();
    assert_matches!(err, LoadError::ConfigParse(_));
}

#[test]
fn pg_dbutils_locates_bulk_loader() {
    let env = EnvOverrides {
        pg_dbutils: Some("/opt/pgdbutils".to_string()),
        ..EnvOverrides::default()
    };
    let config = Config {
        bcp_command: Some("/usr/local/bin/bcpin.csh".to_string()),
        ..Config::default()
    };
    let resolved = ConfigLoader::resolve_config(config, env, CliOverrides::default());
    assert_eq!(
        resolved.bcp_command,
        Some(Utf8PathBuf::from("/opt/pgdbutils/bin/bcpin.csh"))
    );
}

#[test]
fn load_logs_follow_environment() {
    let env = EnvOverrides {
        log_diag: Some("/logs/strain.diag.log".to_string()),
        ..EnvOverrides::default()
    };
    let cli = CliOverrides {
        output_dir: Some("/data/out".to_string()),
        snapshot: None,
    };
    let resolved = ConfigLoader::resolve_config(Config::default(), env, cli);
    let (diag, error) = resolved.log_paths(Utf8Path::new("strains.txt"), LoadMode::Load);
    assert_eq!(diag, Utf8PathBuf::from("/logs/strain.diag.log"));
    assert_eq!(error, Utf8PathBuf::from("/data/out/strainload.error.log"));
}
