//! Binary surface checks: help output, headless rendering and the silent
//! degrade on an unusable bundle.

mod util;

use assert_cmd::Command;
use predicates::prelude::*;

fn ctv() -> Command {
    Command::cargo_bin("ctv").expect("binary builds")
}

#[test]
fn help_lists_subcommands() {
    ctv()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("view"))
        .stdout(predicate::str::contains("completions"))
        .stdout(predicate::str::contains("man"));
}

#[test]
fn missing_bundle_degrades_to_a_notice() {
    let dir = tempfile::tempdir().unwrap();
    ctv()
        .arg("view")
        .arg(dir.path().join("nowhere"))
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("no viewable transcript bundle"));
}

#[test]
fn headless_render_reports_bundle_shape() {
    let dir = tempfile::tempdir().unwrap();
    util::write_bundle(
        dir.path(),
        8,
        &"uaatr".repeat(4),
        serde_json::json!([
            { "start": 0, "end": 9, "prompt": "first task" },
            { "start": 10, "end": 19, "prompt": "second task" },
        ]),
        util::default_fragment,
    );
    ctv()
        .arg("view")
        .arg(dir.path())
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 conversations · 20 messages"));
}

#[test]
fn headless_anchor_navigation_loads_the_owning_group() {
    let dir = tempfile::tempdir().unwrap();
    util::write_bundle(
        dir.path(),
        8,
        &"uaatr".repeat(4),
        serde_json::json!([
            { "start": 0, "end": 9, "prompt": "first task" },
            { "start": 10, "end": 19, "prompt": "second task" },
        ]),
        util::default_fragment,
    );
    // message 12 lives in the second group (chunks 1 and 2)
    ctv()
        .arg("view")
        .arg(dir.path())
        .arg("--anchor")
        .arg("msg-2026-01-02T10-00-12-000")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 chunks loaded"));

    // unresolvable anchors are silently ignored
    ctv()
        .arg("view")
        .arg(dir.path())
        .arg("--anchor")
        .arg("msg-does-not-exist")
        .arg("--once")
        .assert()
        .success()
        .stdout(predicate::str::contains("0 chunks loaded"));
}

#[test]
fn completions_and_man_emit_content() {
    ctv()
        .arg("completions")
        .arg("bash")
        .assert()
        .success()
        .stdout(predicate::str::contains("codex-transcript-viewer"));
    ctv()
        .arg("man")
        .assert()
        .success()
        .stdout(predicate::str::is_empty().not());
}
