//! End-to-end checks of client agent configuration: each document is handed
//! to the real binary, which must either keep serving or exit with status 1.

mod common;

use common::{assert_rejected, check_config, run_config, Daemon, Outcome, SERVE_GRACE};

const GOOD: &str = r#"
messagedirector:
    bind: 127.0.0.1:57123

general:
    dc_files:
        - test.dc

uberdogs:
    - id: 1234
      class: UberDog1
      anonymous: true

    - id: 1235
      class: UberDog2
      anonymous: false

roles:
    - type: clientagent
      bind: 127.0.0.1:57128
      version: "Sword Art Online v5.1"
      channels:
          min: 3100
          max: 3999
      client:
          relocate: true
          add_interest: enabled

    - type: clientagent
      bind: 127.0.0.1:57135
      version: "Sword Art Online v5.1"
      client:
          type: libastron
          add_interest: disabled
      channels:
          min: 110600
          max: 110699

    - type: clientagent
      bind: 127.0.0.1:57144
      version: "Sword Art Online v5.1"
      client:
          type: libastron
          add_interest: visible
      channels:
          min: 220600
          max: 220699
"#;

/// A single client agent on 57128 with the given tail of role keys.
fn single_agent(bind: &str, min: u64, max: u64, extra: &str) -> String {
    format!(
        r#"
messagedirector:
    bind: 127.0.0.1:57123

roles:
    - type: clientagent
      bind: {bind}
      version: "Sword Art Online v5.1"
      channels:
          min: {min}
          max: {max}
{extra}"#
    )
}

#[test]
fn test_clientagent_good() {
    let outcome = run_config(GOOD);
    assert!(matches!(outcome, Outcome::StillRunning), "good config should serve, got {outcome:?}");
}

#[test]
fn test_ca_invalid_attr() {
    assert_rejected(&single_agent("127.0.0.1:57128", 3100, 3999, "      weeuuweeeuu: sirens!\n"));
}

#[test]
fn test_ca_invalid_channels() {
    assert_rejected(&single_agent("127.0.0.1:57128", 0, 3999, ""));
    assert_rejected(&single_agent("127.0.0.1:57128", 3100, 0, ""));
}

#[test]
fn test_ca_reserved_channels() {
    assert_rejected(&single_agent("127.0.0.1:57128", 100, 3999, ""));
    assert_rejected(&single_agent("127.0.0.1:57128", 3100, 999, ""));
}

#[test]
fn test_ca_client_type_typo() {
    assert_rejected(&single_agent("127.0.0.1:57128", 3100, 3999, "      client:\n          type: astron\n"));
}

#[test]
fn test_ca_bind_address() {
    assert_rejected(&single_agent("pizza:2314", 3100, 3999, ""));
}

#[test]
fn test_ca_ipv6_bind_rejected_cleanly() {
    assert_rejected(&single_agent("\"::1:2314\"", 3100, 3999, ""));
}

#[test]
fn test_missing_config_file() {
    let config = common::write_config("");
    let path = config.path().with_extension("missing");
    let status = std::process::Command::new(env!("CARGO_BIN_EXE_astrond"))
        .arg(&path)
        .stderr(std::process::Stdio::null())
        .status()
        .unwrap();
    assert_eq!(status.code(), Some(1));
}

#[test]
fn test_check_prints_validated_config() {
    let output = check_config(GOOD);
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(json["messagedirector"]["bind"], "127.0.0.1:57123");
    assert_eq!(json["roles"].as_array().unwrap().len(), 3);
    assert_eq!(json["roles"][1]["client"]["type"], "libastron");
    assert_eq!(json["channels"].as_array().unwrap().len(), 3);
}

#[test]
fn test_check_rejects_bad_config() {
    let output = check_config(&single_agent("127.0.0.1:57128", 0, 3999, ""));
    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());

    let stderr = String::from_utf8_lossy(&output.stderr);
    assert!(stderr.contains("roles[0].channels"), "stderr: {stderr}");
}

#[cfg(unix)]
#[test]
fn test_sigterm_exits_cleanly() {
    let config = GOOD.replace("5712", "5912").replace("5713", "5913").replace("5714", "5914");
    let mut daemon = Daemon::spawn(&config);
    assert!(matches!(daemon.observe(SERVE_GRACE), Outcome::StillRunning));
    assert_eq!(daemon.terminate().exit_code(), Some(0));
}
