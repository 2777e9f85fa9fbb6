mod common;

use assert_cmd::Command;
use predicates::prelude::*;

fn platewatch() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("platewatch"))
}

#[test]
fn prints_dashboard_json_for_a_query() {
    let (_tmp, cfg, _feed) = common::workspace(&[
        common::row(1, "2024-01-08 08:00:00", "ABC1D23", "95,5", "Norte"),
        common::row(2, "2024-01-08 09:00:00", "XYZ9A87", "40", "Sul"),
    ]);

    let output = platewatch()
        .arg("--config")
        .arg(&cfg)
        .args(["--plate", "abc"])
        .output()
        .expect("run platewatch");
    assert!(output.status.success(), "stderr: {}", String::from_utf8_lossy(&output.stderr));

    let json: serde_json::Value = serde_json::from_slice(&output.stdout).expect("json output");
    assert_eq!(json["resumo"]["total"], 1);
    assert_eq!(json["resumo"]["eventos_criticos"], 1);
    assert_eq!(json["resumo"]["veloc_media"], 95.5);
    assert_eq!(json["regioes"], serde_json::json!(["Norte", "Sul"]));
    assert_eq!(json["matched"], 1);
    assert!(json.get("summary").is_none());
    assert_eq!(json["registros"][0]["nplaca"], "ABC1D23");
    assert_eq!(json["stats"]["velocidade_faixa"]["91-120"], 1);
    assert_eq!(json["stats"]["diario"]["08h"], 1);
}

#[test]
fn recent_mode_lists_newest_records() {
    let (_tmp, cfg, _feed) = common::workspace(&[
        common::row(1, "2024-01-08 08:00:00", "ABC1D23", "50", "Norte"),
        common::row(2, "2024-01-09 08:00:00", "XYZ9A87", "40", "Sul"),
    ]);

    platewatch()
        .arg(&cfg)
        .arg("--recent")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"registros\""))
        .stdout(predicate::str::contains("XYZ9A87"));
}

#[test]
fn missing_feed_is_an_empty_dashboard() {
    let (tmp, cfg, feed) = common::workspace(&[]);
    std::fs::remove_file(&feed).expect("remove feed");

    platewatch()
        .arg("--config")
        .arg(&cfg)
        .assert()
        .success()
        .stdout(predicate::str::contains("\"total\": 0"));
    drop(tmp);
}

#[test]
fn unknown_flags_are_rejected() {
    let (_tmp, cfg, _feed) = common::workspace(&[]);
    platewatch()
        .arg(&cfg)
        .arg("--bogus")
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown argument"));
}

#[test]
fn missing_config_fails_with_path() {
    platewatch()
        .args(["--config", "/nonexistent/platewatch.toml"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("/nonexistent/platewatch.toml"));
}
