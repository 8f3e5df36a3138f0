use std::process::Command;

#[test]
fn init_creates_valid_toml() {
    let dir = tempfile::tempdir().unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_parley"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(output.status.success(), "parley init failed: {}", String::from_utf8_lossy(&output.stderr));

    let config_path = dir.path().join(".parley.toml");
    assert!(config_path.exists(), ".parley.toml should exist");

    let content = std::fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("[bot]"));
    assert!(content.contains("[review]"));

    // Every key is commented out, so parsing yields the defaults
    let config: parley_core::ParleyConfig = toml::from_str(&content).unwrap();
    assert_eq!(config.bot.retries, 5);
}

#[test]
fn init_refuses_if_exists() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::write(dir.path().join(".parley.toml"), "# existing").unwrap();

    let output = Command::new(env!("CARGO_BIN_EXE_parley"))
        .arg("init")
        .current_dir(dir.path())
        .output()
        .unwrap();

    assert!(!output.status.success());
}
