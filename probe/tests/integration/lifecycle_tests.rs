//! Hook ordering, failure policy and diagnostics seen from outside the process.

use startwarp_protocol::{DEBUG_ENV, HOOK_MISSING_EXIT_CODE, IGNORE_INIT_ERRORS_ENV, PROBE_GUIDANCE};

use crate::common::*;

#[test]
fn test_hooks_run_in_order_around_main() {
    let fixture = fixture_library();
    let output = ProbeRun::new().preload(&fixture).run();
    assert_eq!(
        output.fixture_markers(),
        vec!["pre-glue", "pre-main", "launch -> 5", "post-main status=5"],
        "{}",
        output.combined()
    );
}

#[test]
fn test_quiet_run_prints_no_identity() {
    let fixture = fixture_library();
    let output = ProbeRun::new().preload(&fixture).run();
    assert!(!output.stderr().contains("Process id:"), "{}", output.stderr());
    assert!(!output
        .fixture_markers()
        .iter()
        .any(|m| m.starts_with("debug-pre-main")));
}

#[test]
fn test_verbose_run_prints_identity_before_main() {
    let fixture = fixture_library();
    let output = ProbeRun::new().preload(&fixture).env(DEBUG_ENV, "1").run();
    assert_eq!(output.code(), Some(5), "{}", output.combined());

    let stderr = output.stderr();
    for needle in ["Process id: ", "group: ", "user: ", "Process name: "] {
        assert!(stderr.contains(needle), "missing {needle:?} in {stderr}");
    }
    let parent = format!("parent pid: {}", std::process::id());
    assert!(stderr.contains(&parent), "missing {parent:?} in {stderr}");

    let markers = output.fixture_markers();
    assert_eq!(markers[0], "pre-glue");
    assert!(markers[1].starts_with("debug-pre-main pid="), "{markers:?}");
    assert_eq!(markers[2], "pre-main");
}

#[test]
fn test_json_diagnostics_are_parseable() {
    let fixture = fixture_library();
    let output = ProbeRun::new().preload(&fixture).env(DEBUG_ENV, "json").run();
    let stderr = output.stderr();
    let line = stderr
        .lines()
        .find(|l| l.starts_with('{'))
        .unwrap_or_else(|| panic!("no JSON line in {stderr}"));
    let value: serde_json::Value = serde_json::from_str(line).unwrap();
    assert_eq!(value["ppid"], std::process::id());
    assert!(value["pid"].as_u64().is_some());
}

#[test]
fn test_failing_pre_glue_stops_before_main() {
    let fixture = fixture_library();
    let output = ProbeRun::new()
        .preload(&fixture)
        .env(FIXTURE_FAIL_ENV, "pre-glue")
        .run();
    assert_eq!(output.code(), Some(HOOK_MISSING_EXIT_CODE), "{}", output.combined());
    assert_eq!(output.fixture_markers(), vec!["pre-glue"]);
}

#[test]
fn test_failing_pre_main_tolerated_still_runs_main() {
    let fixture = fixture_library();
    let output = ProbeRun::new()
        .preload(&fixture)
        .env(FIXTURE_FAIL_ENV, "pre-main")
        .env(IGNORE_INIT_ERRORS_ENV, "1")
        .run();
    assert_eq!(output.code(), Some(5), "{}", output.combined());
    assert!(output.fixture_markers().contains(&"launch -> 5".to_string()));
}

#[test]
fn test_failing_post_main_keeps_exit_status() {
    let fixture = fixture_library();
    let output = ProbeRun::new()
        .preload(&fixture)
        .env(FIXTURE_FAIL_ENV, "post-main")
        .run();
    assert_eq!(output.code(), Some(5), "{}", output.combined());
}

#[test]
fn test_host_exit_status_passes_through() {
    let fixture = fixture_library();
    let output = ProbeRun::program("sh")
        .args(["-c", "exit 3"])
        .preload(&fixture)
        .run();
    assert_eq!(output.code(), Some(3), "{}", output.combined());
    assert!(!output.stdout().contains(PROBE_GUIDANCE));
}
