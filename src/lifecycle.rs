//! Process termination with last-chance shutdown hooks.
//!
//! Rust has no runtime-level shutdown hooks, and `std::process::exit` skips
//! destructors. Every voluntary exit therefore goes through
//! [`Lifecycle::terminate`], which runs the registered hooks once and then
//! hands over to the injected [`ProcessExit`]. Abrupt kills (SIGKILL, OOM)
//! never reach this code; hooks are not run in that case.

use std::sync::{Arc, Mutex, Once, PoisonError};

use tracing::{info, info_span};

use crate::host::ProcessExit;

/// Callback run while the process terminates.
pub trait ShutdownHook: Send + Sync {
    /// Short name used in logs.
    fn name(&self) -> &'static str;

    /// Perform last-chance work. Must not panic and must not block for long.
    fn on_shutdown(&self);
}

/// Registry of shutdown hooks plus the process exit capability.
pub struct Lifecycle {
    hooks: Mutex<Vec<Arc<dyn ShutdownHook>>>,
    hooks_once: Once,
    exit: Arc<dyn ProcessExit>,
}

impl Lifecycle {
    /// Create a lifecycle that ends the process through `exit`.
    #[must_use]
    pub fn new(exit: Arc<dyn ProcessExit>) -> Self {
        Self {
            hooks: Mutex::new(Vec::new()),
            hooks_once: Once::new(),
            exit,
        }
    }

    /// Register a hook. Hooks run in registration order.
    pub fn register(&self, hook: Arc<dyn ShutdownHook>) {
        info!(hook = hook.name(), "shutdown hook registered");
        self.hooks
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(hook);
    }

    /// Run all hooks if they have not run yet.
    ///
    /// Concurrent callers block until the first caller has finished, so no
    /// caller proceeds to exit while cleanup is still running.
    pub fn run_hooks(&self) {
        self.hooks_once.call_once(|| {
            let hooks = self
                .hooks
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .clone();
            for hook in hooks {
                let _span = info_span!("shutdown_hook", hook = hook.name()).entered();
                hook.on_shutdown();
            }
        });
    }

    /// Whether the hooks have already run.
    #[must_use]
    pub fn hooks_ran(&self) -> bool {
        self.hooks_once.is_completed()
    }

    /// Run hooks, then end the process with `code`.
    pub fn terminate(&self, code: i32) {
        info!(code, "terminating process");
        self.run_hooks();
        self.exit.exit(code);
    }
}

impl std::fmt::Debug for Lifecycle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let hooks = self
            .hooks
            .lock()
            .map(|hooks| hooks.len())
            .unwrap_or_default();
        f.debug_struct("Lifecycle")
            .field("hooks", &hooks)
            .field("hooks_ran", &self.hooks_ran())
            .finish_non_exhaustive()
    }
}
