use bundlewire_core::config::{dirs_path, Config};
use tempfile::TempDir;

#[test]
fn test_config_defaults() {
    let config = Config::default();
    assert_eq!(config.resolver.max_permutations, 10_000);
    assert!(config.resolver.drop_faulty_optional);
    assert_eq!(config.log.level, "warn");
}

#[test]
fn test_config_defaults_from_empty_toml() {
    let config = Config::from_str("").unwrap();
    assert_eq!(config.resolver.max_permutations, 10_000);
    assert!(config.resolver.drop_faulty_optional);
}

#[test]
fn test_config_parse_from_toml() {
    let toml = r#"
[resolver]
max-permutations = 50
drop-faulty-optional = false

[log]
level = "debug"
"#;
    let config = Config::from_str(toml).unwrap();
    assert_eq!(config.resolver.max_permutations, 50);
    assert!(!config.resolver.drop_faulty_optional);
    assert_eq!(config.log.level, "debug");
}

#[test]
fn test_config_rejects_wrong_types() {
    let err = Config::from_str("[resolver]\nmax-permutations = \"many\"\n").unwrap_err();
    assert!(err.to_string().contains("Configuration error"), "got: {err}");
}

#[test]
fn test_config_load_explicit_path() {
    let tmp = TempDir::new().unwrap();
    let path = tmp.path().join("config.toml");
    std::fs::write(&path, "[resolver]\nmax-permutations = 7\n").unwrap();
    let config = Config::load(Some(&path)).unwrap();
    assert_eq!(config.resolver.max_permutations, 7);
}

#[test]
fn test_config_load_missing_explicit_path_fails() {
    let tmp = TempDir::new().unwrap();
    assert!(Config::load(Some(&tmp.path().join("nope.toml"))).is_err());
}

#[test]
fn test_dirs_path_contains_bundlewire() {
    assert!(dirs_path().ends_with(".bundlewire"));
}
