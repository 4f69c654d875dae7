//! Shared test utilities for the agent crate.

use core::ffi::{CStr, c_void};
use std::sync::{Mutex, Once};

use anyhow::bail;
use startwarp_protocol::{HookSlot, ProcessIdentity};

use crate::plugin::{self, AlternateEntryFn, Plugin};

/// Process-global lock for tests that touch the registered plugin or other
/// process-wide agent state.
pub fn lock_agent_tests() -> std::sync::MutexGuard<'static, ()> {
    static LOCK: Mutex<()> = Mutex::new(());
    LOCK.lock().unwrap_or_else(|e| e.into_inner())
}

unsafe extern "C" fn returns_five() -> libc::c_int {
    5
}

/// Plugin that records every hook call in order.
#[derive(Default)]
pub struct RecordingPlugin {
    calls: Mutex<Vec<String>>,
    failing: Option<HookSlot>,
    panicking: Option<HookSlot>,
    alternate_entry: bool,
}

impl RecordingPlugin {
    pub fn builder() -> Self {
        Self::default()
    }

    /// A default plugin leaked to `'static`, as registration requires.
    pub fn leaked() -> &'static RecordingPlugin {
        Self::builder().leak()
    }

    pub fn failing(mut self, slot: HookSlot) -> Self {
        self.failing = Some(slot);
        self
    }

    pub fn panicking(mut self, slot: HookSlot) -> Self {
        self.panicking = Some(slot);
        self
    }

    pub fn with_alternate_entry(mut self) -> Self {
        self.alternate_entry = true;
        self
    }

    pub fn leak(self) -> &'static RecordingPlugin {
        Box::leak(Box::new(self))
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn record(&self, call: impl Into<String>) {
        self.calls.lock().unwrap().push(call.into());
    }

    fn run(&self, slot: HookSlot, call: String) -> anyhow::Result<()> {
        self.record(call);
        if self.panicking == Some(slot) {
            panic!("{slot} exploded");
        }
        if self.failing == Some(slot) {
            bail!("{slot} refused");
        }
        Ok(())
    }
}

impl Plugin for RecordingPlugin {
    fn name(&self) -> &str {
        "recording"
    }

    fn pre_glue(&self) -> anyhow::Result<()> {
        self.run(HookSlot::PreGlue, "pre-glue".to_string())
    }

    fn pre_main(&self) -> anyhow::Result<()> {
        self.run(HookSlot::PreMain, "pre-main".to_string())
    }

    fn debug_pre_main(&self, identity: &ProcessIdentity) {
        self.record(format!("debug-pre-main({})", identity.pid));
    }

    fn post_main(&self, status: i32) -> anyhow::Result<()> {
        self.run(HookSlot::PostMain, format!("post-main({status})"))
    }

    fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        self.alternate_entry.then_some(returns_five as AlternateEntryFn)
    }
}

pub unsafe extern "C" fn fake_getpid() -> libc::pid_t {
    -1
}

/// Plugin registered process-wide by [`ensure_test_plugin_registered`].
///
/// Redirects `getpid` to [`fake_getpid`] and provides an alternate entry.
pub struct OverridePlugin;

pub const OVERRIDE_PLUGIN_NAME: &str = "override-test";

impl Plugin for OverridePlugin {
    fn name(&self) -> &str {
        OVERRIDE_PLUGIN_NAME
    }

    fn pre_glue(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_main(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        Some(returns_five as AlternateEntryFn)
    }

    fn symbol_override(&self, name: &CStr) -> Option<*mut c_void> {
        (name == c"getpid").then_some(fake_getpid as *mut c_void)
    }
}

/// Register [`OverridePlugin`] once for the whole test binary. Registration
/// cannot be undone, so every test that needs a plugin shares this one.
pub fn ensure_test_plugin_registered() {
    static ONCE: Once = Once::new();
    ONCE.call_once(|| {
        plugin::register(Box::new(OverridePlugin)).expect("first registration");
    });
}

/// Plugin whose callbacks without an error channel panic.
pub struct PanickingPlugin;

impl Plugin for PanickingPlugin {
    fn name(&self) -> &str {
        "panicking"
    }

    fn pre_glue(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn pre_main(&self) -> anyhow::Result<()> {
        Ok(())
    }

    fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        panic!("alternate entry exploded");
    }

    fn symbol_override(&self, _name: &CStr) -> Option<*mut c_void> {
        panic!("override exploded");
    }
}
