use std::fs;

use anyhow::Result;
use pmoconfig::{Config, MigrationOutcome, NetworkConfiguration};

fn dir_str(dir: &tempfile::TempDir) -> String {
    dir.path().to_string_lossy().to_string()
}

#[test]
fn test_defaults_are_written_to_disk() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(&dir_str(&dir))?;

    assert!(config.get_dlna_direct_stream());
    assert!(config.get_dlna_builtin_profiles());
    assert!(config.get_network_migrate_legacy());
    assert_eq!(config.get_log_min_level(), "INFO");

    let saved = fs::read_to_string(dir.path().join("config.yaml"))?;
    assert!(saved.contains("direct_stream"));
    Ok(())
}

#[test]
fn test_user_file_overrides_defaults() -> Result<()> {
    let dir = tempfile::tempdir()?;
    fs::write(
        dir.path().join("config.yaml"),
        "DLNA:\n  Direct_Stream: false\n  profiles:\n    directory: /tmp/pmodlna-profiles\n",
    )?;

    let config = Config::load_config(&dir_str(&dir))?;
    assert!(!config.get_dlna_direct_stream());
    // clés absentes du fichier : valeurs par défaut
    assert!(config.get_dlna_builtin_profiles());
    Ok(())
}

#[test]
fn test_setters_persist() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(&dir_str(&dir))?;
    config.set_dlna_builtin_profiles(false)?;
    config.set_log_min_level("DEBUG".to_string())?;

    let reloaded = Config::load_config(&dir_str(&dir))?;
    assert!(!reloaded.get_dlna_builtin_profiles());
    assert_eq!(reloaded.get_log_min_level(), "DEBUG");
    Ok(())
}

#[test]
fn test_managed_dir_is_relative_to_config_dir() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(&dir_str(&dir))?;

    let profiles = config.get_managed_dir(&["dlna", "profiles", "directory"], "profiles")?;
    assert_eq!(profiles, dir.path().join("profiles").to_string_lossy());
    assert!(dir.path().join("profiles").is_dir());
    Ok(())
}

#[test]
fn test_startup_migration() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(&dir_str(&dir))?;
    assert_eq!(config.network_config_path(), dir.path().join("network.xml"));

    assert!(matches!(
        config.migrate_legacy_network(),
        MigrationOutcome::Skipped { .. }
    ));

    fs::write(
        config.network_config_path(),
        "<NetworkConfiguration><PublicPort>80</PublicPort><BaseUrl>/media/</BaseUrl></NetworkConfiguration>",
    )?;
    assert_eq!(config.migrate_legacy_network(), MigrationOutcome::Migrated);
    assert_eq!(
        config.migrate_legacy_network(),
        MigrationOutcome::AlreadyMigrated
    );

    let migrated = NetworkConfiguration::from_xml(&fs::read_to_string(config.network_config_path())?)?;
    assert_eq!(migrated.public_http_port, 80);
    assert_eq!(migrated.base_url, "/media");
    Ok(())
}

#[test]
fn test_migration_can_be_disabled() -> Result<()> {
    let dir = tempfile::tempdir()?;
    let config = Config::load_config(&dir_str(&dir))?;
    config.set_network_migrate_legacy(false)?;

    let legacy = "<NetworkConfiguration><EnableIPV6>true</EnableIPV6></NetworkConfiguration>";
    fs::write(config.network_config_path(), legacy)?;

    assert!(matches!(
        config.migrate_legacy_network(),
        MigrationOutcome::Skipped { .. }
    ));
    assert_eq!(fs::read_to_string(config.network_config_path())?, legacy);
    Ok(())
}
