//! End-to-end checks of the modes that do not need a system bus.

use std::process::Command;

use bleadvert_core::Config;

fn bleadvert() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_bleadvert"));
    cmd.env("RUST_LOG", "error")
        .env_remove("BLEADVERT_CONFIG")
        .env_remove("BLEADVERT_ENV");
    cmd
}

#[test]
fn test_write_default_config_round_trips() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");

    let status = bleadvert()
        .arg("--write-default-config")
        .arg(&path)
        .status()
        .unwrap();
    assert!(status.success());

    let content = std::fs::read_to_string(&path).unwrap();
    assert_eq!(Config::from_toml_str(&content).unwrap(), Config::default());
}

#[test]
fn test_print_properties_from_config_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        r#"
[advertisement]
advertising_type = "broadcast"
service_uuids = ["180d"]
local_name = "hr-beacon"
"#,
    )
    .unwrap();

    let output = bleadvert()
        .arg("--config")
        .arg(&path)
        .arg("--print-properties")
        .output()
        .unwrap();
    assert!(output.status.success());

    let props: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(
        props,
        serde_json::json!({
            "Type": "broadcast",
            "ServiceUUIDs": ["180d"],
            "LocalName": "hr-beacon",
        })
    );
}

#[test]
fn test_invalid_config_fails() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("config.toml");
    std::fs::write(
        &path,
        "[advertisement]\nservice_uuids = [\"180d\", \"180f\", \"1812\"]\n",
    )
    .unwrap();

    let output = bleadvert()
        .arg("--config")
        .arg(&path)
        .arg("--print-properties")
        .output()
        .unwrap();
    assert!(!output.status.success());
    assert!(output.stdout.is_empty());
}
