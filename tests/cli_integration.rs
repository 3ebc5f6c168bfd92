use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::Value;
use std::io::Write;
use tempfile::NamedTempFile;

const CHECKSUMMED: &str = "0x5aAeb6053F3E94C9b9A09f33669435E7Ef1BeAed";

fn guard() -> Command {
    let mut cmd = Command::cargo_bin("wallet-guard").expect("binary builds");
    cmd.env_remove("RUST_LOG");
    cmd
}

fn envelope(output: &std::process::Output) -> Value {
    let stdout = String::from_utf8(output.stdout.clone()).expect("stdout is utf8");
    serde_json::from_str(stdout.trim()).expect("stdout is a json envelope")
}

fn temp_file(contents: &str) -> NamedTempFile {
    let mut file = NamedTempFile::new().expect("temp file");
    file.write_all(contents.as_bytes()).expect("write temp file");
    file
}

#[test]
fn check_url_accepts_known_dapp() {
    let output = guard()
        .args(["check-url", "https://app.uniswap.org"])
        .output()
        .expect("cli runs");

    assert!(output.status.success(), "cli failed: {:?}", output);
    let json = envelope(&output);
    assert_eq!(json["success"], true);
    assert_eq!(json["data"]["safe"], true);
    assert_eq!(json["http_status"], 200);
}

#[test]
fn check_url_rejects_phishing() {
    let output = guard()
        .args(["check-url", "https://metamask-security-update.tk"])
        .output()
        .expect("cli runs");

    assert_eq!(output.status.code(), Some(2));
    let json = envelope(&output);
    assert_eq!(json["success"], false);
    assert_eq!(json["error"]["code"], "phishing_detected");
    assert_eq!(json["http_status"], 400);
}

#[test]
fn sanitize_strips_script_blocks() {
    let output = guard()
        .args(["sanitize", "<script>alert(1)</script>hello"])
        .output()
        .expect("cli runs");

    assert!(output.status.success());
    let json = envelope(&output);
    assert_eq!(json["data"]["value"], "hello");
    assert_eq!(json["data"]["modified"], true);
}

#[test]
fn check_content_reports_scam_keywords() {
    let output = guard()
        .args(["check-content", "Please verify your wallet and enter your seed phrase"])
        .output()
        .expect("cli runs");

    assert!(output.status.success());
    assert_eq!(envelope(&output)["data"]["scam"], true);
}

#[test]
fn verify_tx_from_file() {
    let tx = temp_file(&format!(
        r#"{{"to": "{}", "value": "1000000000000000000", "gasPrice": "20000000000"}}"#,
        CHECKSUMMED
    ));

    guard()
        .arg("verify-tx")
        .arg(tx.path())
        .assert()
        .success()
        .stdout(predicate::str::contains(r#""valid":true"#));
}

#[test]
fn verify_tx_rejects_excessive_value_from_stdin() {
    let payload = format!(
        r#"{{"to": "{}", "value": "200000000000000000000"}}"#,
        CHECKSUMMED
    );

    guard()
        .args(["verify-tx", "-"])
        .write_stdin(payload)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("transaction value exceeds maximum"))
        .stdout(predicate::str::contains("security_violation"));
}

#[test]
fn verify_tx_rejects_bare_number_just_over_maximum() {
    let payload = format!(r#"{{"to": "{}", "value": 100000000000000001000}}"#, CHECKSUMMED);

    guard()
        .args(["verify-tx", "-"])
        .write_stdin(payload)
        .assert()
        .code(2)
        .stdout(predicate::str::contains("transaction value exceeds maximum"));
}

#[test]
fn verify_tx_rejects_malformed_json() {
    guard()
        .args(["verify-tx", "-"])
        .write_stdin("not json")
        .assert()
        .code(2)
        .stdout(predicate::str::contains(r#""success":false"#));
}

#[test]
fn show_config_reflects_file() {
    let config = temp_file(
        r#"
[security]
level = "high"
max_transaction_rate = 7
phishing_check_enabled = false

[logging]
level = "warn"
format = "json"
"#,
    );

    let output = guard()
        .arg("--config")
        .arg(config.path())
        .arg("show-config")
        .output()
        .expect("cli runs");

    assert!(output.status.success(), "cli failed: {:?}", output);
    let json = envelope(&output);
    assert_eq!(json["data"]["config"]["security"]["max_transaction_rate"], 7);
    let warnings = json["data"]["warnings"].as_array().expect("warnings array");
    assert!(warnings
        .iter()
        .any(|w| w.as_str().unwrap_or_default().contains("Phishing checks are disabled")));
}

#[test]
fn invalid_config_exits_with_config_error() {
    let config = temp_file("[security]\nmax_transaction_rate = 0\n");

    let output = guard()
        .arg("--config")
        .arg(config.path())
        .arg("show-config")
        .output()
        .expect("cli runs");

    assert_eq!(output.status.code(), Some(1));
    let json = envelope(&output);
    assert_eq!(json["error"]["code"], "config");
    assert!(json["error"]["message"]
        .as_str()
        .unwrap_or_default()
        .contains("max_transaction_rate"));
}

#[test]
fn missing_config_file_exits_with_config_error() {
    guard()
        .args(["--config", "/nonexistent/wallet-guard.toml", "show-config"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("failed to read config file"));
}

#[test]
fn unknown_subcommand_is_usage_error() {
    guard().arg("launch-rockets").assert().code(1);
}

#[test]
fn validate_rpc_rejects_untrusted_endpoint() {
    guard()
        .args(["validate-rpc", "https://evil-rpc.example"])
        .assert()
        .code(2)
        .stdout(predicate::str::contains("Untrusted RPC endpoint"));
}
