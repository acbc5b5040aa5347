//! End-to-end runs of the `handoff` binary against the bundled demo scene.

use std::path::PathBuf;
use std::process::Command;

fn repo_path(rel: &str) -> PathBuf {
    PathBuf::from(env!("CARGO_MANIFEST_DIR")).join(rel)
}

fn handoff() -> Command {
    let mut cmd = Command::new(env!("CARGO_BIN_EXE_handoff"));
    cmd.env_remove("RUST_LOG");
    cmd
}

#[test]
fn dump_config_prints_defaults() {
    let output = handoff().arg("--dump-config").output().unwrap();
    assert!(output.status.success());
    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("[consensus]"));
    assert!(stdout.contains("half_life_secs = 120.0"));
    assert!(stdout.contains("decay_clock = \"scene\""));
}

#[test]
fn keyword_run_writes_report_and_questions() {
    let out = tempfile::tempdir().unwrap();
    let report = out.path().join("report.md");
    let questions = out.path().join("questions.md");
    let history = out.path().join("history.jsonl");

    let output = handoff()
        .arg(repo_path("scenes/tension_pneumo/dialogue.jsonl"))
        .arg("--library-dir")
        .arg(repo_path("data/emergencies"))
        .arg("--report")
        .arg(&report)
        .arg("--questions")
        .arg(&questions)
        .arg("--history-out")
        .arg(&history)
        .output()
        .unwrap();
    assert!(output.status.success(), "{}", String::from_utf8_lossy(&output.stderr));

    let report_text = std::fs::read_to_string(&report).unwrap();
    assert!(report_text.contains("### Update 1 (t=4.0s)"));
    assert!(report_text.contains("### Update 2 (t=20.0s)"));
    assert!(report_text.contains("### Update 3 (t=27.0s)"));
    assert!(!report_text.contains("### Update 4"));
    assert!(report_text.contains("(`tension_pneumothorax`)"));
    assert!(report_text.contains("(`hypoxemia`)"));

    let questions_text = std::fs::read_to_string(&questions).unwrap();
    assert!(questions_text.starts_with("# Clinician Reflection Prompts"));
    assert!(questions_text.contains("- Answer: Spo2 88% at t=4.0s via pulse oximeter (falling)."));

    let stdout = String::from_utf8(output.stdout).unwrap();
    assert!(stdout.contains("Downstream context:"));
    assert_eq!(std::fs::read_to_string(&history).unwrap().lines().count(), 7);
}

#[test]
fn missing_scene_fails() {
    let output = handoff().arg("no/such/scene.jsonl").output().unwrap();
    assert!(!output.status.success());
}
