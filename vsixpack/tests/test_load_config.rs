use std::fs::write;
use std::path::PathBuf;
use tempfile::{NamedTempFile, TempDir};
use vsixpack::load_config::{load_config, merge_options, Overrides, DEFAULT_CONFIG_FILE};

#[test]
fn explicit_config_file_is_loaded() {
    let config_yaml = r#"
use_yarn: true
base_content_url: https://cdn.example.com/docs
dependency_entry_points:
  - left-pad
ignore_file: .packageignore
"#;
    let config_file = NamedTempFile::new().expect("temp file");
    write(config_file.path(), config_yaml).unwrap();
    let cwd = TempDir::new().unwrap();

    let options = load_config(Some(config_file.path()), cwd.path()).expect("Config should load");

    assert!(options.use_yarn);
    assert_eq!(options.base_content_url.as_deref(), Some("https://cdn.example.com/docs"));
    assert_eq!(options.dependency_entry_points, Some(vec!["left-pad".to_string()]));
    assert_eq!(options.ignore_file, Some(PathBuf::from(".packageignore")));
}

#[test]
fn default_config_file_is_optional() {
    let cwd = TempDir::new().unwrap();
    let options = load_config(None, cwd.path()).expect("Missing default config is fine");
    assert!(!options.use_yarn);
    assert!(options.base_content_url.is_none());
}

#[test]
fn default_config_file_is_picked_up_from_project() {
    let cwd = TempDir::new().unwrap();
    write(cwd.path().join(DEFAULT_CONFIG_FILE), "base_images_url: https://img.example.com\n").unwrap();
    let options = load_config(None, cwd.path()).unwrap();
    assert_eq!(options.base_images_url.as_deref(), Some("https://img.example.com"));
}

#[test]
fn invalid_yaml_is_reported() {
    let config_file = NamedTempFile::new().unwrap();
    write(config_file.path(), "use_yarn: [not, a, bool]\n").unwrap();
    let err = load_config(Some(config_file.path()), std::path::Path::new(".")).unwrap_err();
    assert!(err.to_string().contains("Failed to parse config YAML"));
}

#[test]
fn flags_override_file_values() {
    let cwd = TempDir::new().unwrap();
    write(
        cwd.path().join(DEFAULT_CONFIG_FILE),
        "base_content_url: https://file.example.com\nbase_images_url: https://img.example.com\n",
    )
    .unwrap();
    let file = load_config(None, cwd.path()).unwrap();

    let merged = merge_options(
        file,
        Overrides {
            base_content_url: Some("https://flag.example.com".into()),
            use_yarn: true,
            ..Default::default()
        },
    );
    assert_eq!(merged.base_content_url.as_deref(), Some("https://flag.example.com"));
    assert_eq!(merged.base_images_url.as_deref(), Some("https://img.example.com"));
    assert!(merged.use_yarn);
}
