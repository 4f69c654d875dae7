//! The agent preloaded in front of another interposer that uses `RTLD_NEXT`.

use startwarp_protocol::DEBUG_ENV;

use crate::common::*;

const FORWARDED: &str = "chained: forwarded to the next getpid";
const LOOPED: &str = "chained: RTLD_NEXT returned this wrapper";

#[test]
fn test_chained_wrapper_alone_reaches_libc() {
    let chained = chained_library();
    let output = ProbeRun::program("sh")
        .args(["-c", "echo $$"])
        .preload(&chained)
        .run();
    assert_eq!(output.code(), Some(0), "{}", output.combined());
    assert!(!output.stderr().contains(LOOPED), "{}", output.stderr());
}

#[test]
fn test_rtld_next_behind_agent_resolves_past_the_wrapper() {
    let fixture = fixture_library();
    let chained = chained_library();
    // identity capture calls getpid, which binds to the chained wrapper
    let output = ProbeRun::new()
        .preload_chain(&fixture, &chained)
        .env(DEBUG_ENV, "1")
        .run();
    let stderr = output.stderr();
    assert!(!stderr.contains(LOOPED), "{stderr}");
    assert!(stderr.contains(FORWARDED), "{stderr}");
    assert_eq!(output.code(), Some(5), "{}", output.combined());

    let markers = output.fixture_markers();
    let identity = markers
        .iter()
        .find_map(|m| m.strip_prefix("debug-pre-main pid="))
        .unwrap_or_else(|| panic!("no identity marker in {markers:?}"));
    assert_ne!(identity, "0");
}

#[test]
fn test_alternate_entry_found_with_wrapper_behind_agent() {
    let fixture = fixture_library();
    let chained = chained_library();
    let output = ProbeRun::new().preload_chain(&fixture, &chained).run();
    assert_eq!(
        output.fixture_markers(),
        vec!["pre-glue", "pre-main", "launch -> 5", "post-main status=5"],
        "{}",
        output.combined()
    );
}
