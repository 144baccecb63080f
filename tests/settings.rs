use std::fs;
use std::path::PathBuf;

use plankernel::config::{Settings, ThreadSettings};
use plankernel::error::KernelError;

fn write_config(name: &str, contents: &str) -> PathBuf {
    let path = std::env::temp_dir().join(format!("plankernel-{}-{name}.toml", std::process::id()));
    fs::write(&path, contents).expect("write config");
    path
}

#[test]
fn defaults_without_a_file() {
    let settings = Settings::load(None).expect("defaults load");
    assert_eq!(settings, Settings::default());
    assert_eq!(settings.log.filter, "info");
    assert_eq!(settings.thread, ThreadSettings::default());
    assert_eq!(settings.thread.stack_size, 2 * 1024 * 1024);
    assert_eq!(settings.thread.name_prefix, "plan-thread");
    assert!(!settings.explain.data);
}

#[test]
fn file_overrides_only_what_it_names() {
    let path = write_config(
        "partial",
        r#"
[thread]
name_prefix = "worker"

[explain]
data = true
"#,
    );
    let settings = Settings::load(path.to_str()).expect("file load");
    fs::remove_file(&path).ok();
    assert_eq!(settings.thread.name_prefix, "worker");
    assert_eq!(settings.thread.stack_size, 2 * 1024 * 1024);
    assert!(settings.explain.data);
    assert_eq!(settings.log.filter, "info");
}

#[test]
fn a_named_file_must_exist() {
    let missing = std::env::temp_dir().join("plankernel-does-not-exist.toml");
    let err = Settings::load(missing.to_str()).unwrap_err();
    assert!(matches!(err, KernelError::Config(_)), "{err}");
}

#[test]
fn wrong_types_are_rejected() {
    let path = write_config("typed", "[thread]\nstack_size = \"large\"\n");
    let result = Settings::load(path.to_str());
    fs::remove_file(&path).ok();
    assert!(result.is_err());
}
