//! The hook table and the policy applied to each hook's outcome.

use std::collections::HashMap;
use std::panic::{self, AssertUnwindSafe};

use anyhow::anyhow;
use log::{debug, trace, warn};
use startwarp_intercept::{Handle, Resolver, Symbol};
use startwarp_protocol::{ExportedHookFn, HookSlot, ProcessIdentity};

use crate::config::AgentConfig;
use crate::error::AttachError;
use crate::plugin::{AlternateEntryFn, Plugin, guarded, panic_message};

/// One point in the startup sequence, with the data its hook receives.
#[derive(Debug, Clone, Copy)]
pub enum Stage<'a> {
    PreGlue,
    DebugPreMain(&'a ProcessIdentity),
    PreMain,
    PostMain(i32),
}

impl Stage<'_> {
    pub fn slot(&self) -> HookSlot {
        match self {
            Stage::PreGlue => HookSlot::PreGlue,
            Stage::DebugPreMain(_) => HookSlot::DebugPreMain,
            Stage::PreMain => HookSlot::PreMain,
            Stage::PostMain(_) => HookSlot::PostMain,
        }
    }
}

/// What a slot is bound to.
pub enum Binding {
    /// A plugin registered through [`crate::register`].
    Plugin(&'static dyn Plugin),
    /// A well-known symbol exported by some loaded object.
    Exported(Symbol<ExportedHookFn>),
}

impl Binding {
    fn call(&self, stage: Stage<'_>) -> anyhow::Result<()> {
        match self {
            Binding::Plugin(plugin) => match stage {
                Stage::PreGlue => plugin.pre_glue(),
                Stage::PreMain => plugin.pre_main(),
                Stage::DebugPreMain(identity) => {
                    plugin.debug_pre_main(identity);
                    Ok(())
                }
                Stage::PostMain(status) => plugin.post_main(status),
            },
            Binding::Exported(symbol) => {
                let rc = unsafe { (symbol.get())() };
                if rc == 0 {
                    Ok(())
                } else {
                    Err(anyhow!("{} returned {}", symbol.name(), rc))
                }
            }
        }
    }

    fn describe(&self) -> String {
        match self {
            Binding::Plugin(plugin) => format!("plugin {}", plugin.name()),
            Binding::Exported(symbol) => format!("{} at {:#x}", symbol.name(), symbol.address()),
        }
    }
}

/// Result of running one hook.
#[derive(Debug)]
pub enum HookOutcome {
    Completed,
    Missing,
    Failed(anyhow::Error),
}

/// Bound hooks for this process. Built once, never modified afterwards.
#[derive(Default)]
pub struct HookTable {
    bindings: HashMap<HookSlot, Binding>,
    alternate_entry: Option<AlternateEntryFn>,
}

impl HookTable {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Bind every lifecycle slot to `plugin`.
    pub fn from_plugin(plugin: &'static dyn Plugin) -> Self {
        let bindings = [
            HookSlot::PreGlue,
            HookSlot::PreMain,
            HookSlot::DebugPreMain,
            HookSlot::PostMain,
        ]
        .into_iter()
        .map(|slot| (slot, Binding::Plugin(plugin)))
        .collect();

        Self {
            bindings,
            alternate_entry: guarded(plugin, "alternate_entry", || plugin.alternate_entry())
                .flatten(),
        }
    }

    /// Bind each slot to its well-known exported symbol, where one exists.
    pub fn discover(resolver: &Resolver) -> Self {
        let mut table = Self::empty();
        for slot in HookSlot::ALL {
            // SAFETY: the hook ABI fixes every exported hook to ExportedHookFn.
            let found = unsafe {
                resolver.resolve::<ExportedHookFn>(Handle::Default, slot.symbol_name())
            };
            match found {
                Ok(symbol) if slot == HookSlot::AlternateEntry => {
                    table.alternate_entry = Some(symbol.get());
                }
                Ok(symbol) => {
                    table.bindings.insert(slot, Binding::Exported(symbol));
                }
                Err(e) => trace!("{} hook not exported: {}", slot, e),
            }
        }
        table
    }

    pub fn is_bound(&self, slot: HookSlot) -> bool {
        match slot {
            HookSlot::AlternateEntry => self.alternate_entry.is_some(),
            _ => self.bindings.contains_key(&slot),
        }
    }

    pub fn alternate_entry(&self) -> Option<AlternateEntryFn> {
        self.alternate_entry
    }

    pub fn log_bindings(&self) {
        for slot in HookSlot::ALL {
            match self.bindings.get(&slot) {
                Some(binding) => debug!("{} -> {}", slot, binding.describe()),
                None if slot == HookSlot::AlternateEntry && self.alternate_entry.is_some() => {
                    debug!("{} -> bound", slot)
                }
                None => debug!("{} -> unbound", slot),
            }
        }
    }

    /// Run the hook for `stage` once. A panic inside the hook is caught and
    /// reported as a failure.
    pub fn invoke(&self, stage: Stage<'_>) -> HookOutcome {
        let Some(binding) = self.bindings.get(&stage.slot()) else {
            return HookOutcome::Missing;
        };
        match panic::catch_unwind(AssertUnwindSafe(|| binding.call(stage))) {
            Ok(Ok(())) => HookOutcome::Completed,
            Ok(Err(e)) => HookOutcome::Failed(e),
            Err(payload) => HookOutcome::Failed(anyhow!("hook panicked: {}", panic_message(&*payload))),
        }
    }
}

/// Decides which hook outcomes are fatal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HookPolicy {
    pub tolerate_missing: bool,
}

impl From<&AgentConfig> for HookPolicy {
    fn from(config: &AgentConfig) -> Self {
        Self {
            tolerate_missing: config.tolerate_missing_hooks,
        }
    }
}

impl HookPolicy {
    /// Optional slots never fail. Required slots fail when missing or failed,
    /// unless tolerance is set, in which case the problem is logged.
    pub fn enforce(&self, slot: HookSlot, outcome: HookOutcome) -> Result<(), AttachError> {
        match outcome {
            HookOutcome::Completed => {
                trace!("{} hook completed", slot);
                Ok(())
            }
            HookOutcome::Missing if !slot.is_required() => Ok(()),
            HookOutcome::Failed(e) if !slot.is_required() => {
                warn!("{} hook failed: {:#}", slot, e);
                Ok(())
            }
            HookOutcome::Missing if self.tolerate_missing => {
                warn!("required {} hook is not bound, continuing", slot);
                Ok(())
            }
            HookOutcome::Failed(e) if self.tolerate_missing => {
                warn!("required {} hook failed, continuing: {:#}", slot, e);
                Ok(())
            }
            HookOutcome::Missing => Err(AttachError::MissingRequiredHook(slot)),
            HookOutcome::Failed(e) => Err(AttachError::RequiredHookFailed {
                slot,
                reason: format!("{:#}", e),
            }),
        }
    }
}
