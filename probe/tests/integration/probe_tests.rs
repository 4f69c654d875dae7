//! Probe behaviour with and without the agent attached.

use startwarp_protocol::{HOOK_MISSING_EXIT_CODE, IGNORE_INIT_ERRORS_ENV, PROBE_GUIDANCE};

use crate::common::*;

#[test]
fn test_probe_without_agent_prints_guidance() {
    let output = ProbeRun::new().run();
    assert_eq!(output.code(), Some(0), "{}", output.combined());
    assert!(output.stdout().contains(PROBE_GUIDANCE));
}

#[test]
fn test_probe_ignores_trailing_arguments() {
    let output = ProbeRun::new().args(["host-arg", "--flag", "-x"]).run();
    assert_eq!(output.code(), Some(0), "{}", output.combined());
    assert!(output.stdout().contains(PROBE_GUIDANCE));
}

#[test]
fn test_agent_without_plugin_exits_with_reserved_code() {
    let agent = agent_library();
    let output = ProbeRun::new().preload(&agent).run();
    assert_eq!(output.code(), Some(HOOK_MISSING_EXIT_CODE), "{}", output.combined());
    // main never ran
    assert!(!output.stdout().contains(PROBE_GUIDANCE));
}

#[test]
fn test_agent_without_plugin_tolerated_runs_main() {
    let agent = agent_library();
    let output = ProbeRun::new()
        .preload(&agent)
        .env(IGNORE_INIT_ERRORS_ENV, "1")
        .run();
    assert_eq!(output.code(), Some(0), "{}", output.combined());
    assert!(output.stdout().contains(PROBE_GUIDANCE));
}

#[test]
fn test_fixture_alternate_entry_status_becomes_exit_code() {
    let fixture = fixture_library();
    let output = ProbeRun::new().preload(&fixture).run();
    assert_eq!(output.code(), Some(5), "{}", output.combined());
    assert!(!output.stdout().contains(PROBE_GUIDANCE));
}

#[test]
fn test_fixture_alternate_entry_custom_status() {
    let fixture = fixture_library();
    let output = ProbeRun::new()
        .preload(&fixture)
        .env(FIXTURE_ENTRY_STATUS_ENV, "9")
        .run();
    assert_eq!(output.code(), Some(9), "{}", output.combined());
}

#[test]
fn test_fixture_alternate_entry_status_is_truncated_to_eight_bits() {
    let fixture = fixture_library();
    let output = ProbeRun::new()
        .preload(&fixture)
        .env(FIXTURE_ENTRY_STATUS_ENV, "300")
        .run();
    assert_eq!(output.code(), Some(300 & 0xff), "{}", output.combined());
}
