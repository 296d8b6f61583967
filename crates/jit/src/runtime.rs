//! Process-wide JIT runtime and the lifecycle hooks exposed to the embedder.
//!
//! The runtime holds at most one [`JitContext`] and moves through
//! `Uninitialized → Ready → Destroyed`. Anything that needs the context
//! outside `Ready` gets [`JitError::InvalidState`] instead of a dangling
//! handle.

use std::fmt;
use std::sync::{Mutex, MutexGuard, PoisonError};

use crate::config::JitConfig;
use crate::context::{self, JitContext};
use crate::error::JitError;
use crate::llvm;

/// Lifecycle status of a [`JitRuntime`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RuntimeStatus {
    Uninitialized,
    Ready,
    Destroyed,
}

impl fmt::Display for RuntimeStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RuntimeStatus::Uninitialized => write!(f, "uninitialized"),
            RuntimeStatus::Ready => write!(f, "ready"),
            RuntimeStatus::Destroyed => write!(f, "destroyed"),
        }
    }
}

#[derive(Debug)]
enum RuntimeState {
    Uninitialized,
    Ready(JitContext),
    Destroyed,
}

/// Owner of the single JIT context an embedding process works with.
#[derive(Debug)]
pub struct JitRuntime {
    state: RuntimeState,
}

impl JitRuntime {
    pub const fn new() -> Self {
        Self {
            state: RuntimeState::Uninitialized,
        }
    }

    pub fn status(&self) -> RuntimeStatus {
        match self.state {
            RuntimeState::Uninitialized => RuntimeStatus::Uninitialized,
            RuntimeState::Ready(_) => RuntimeStatus::Ready,
            RuntimeState::Destroyed => RuntimeStatus::Destroyed,
        }
    }

    /// Register native backends and build the context.
    ///
    /// Allowed from `Uninitialized` and `Destroyed`; a runtime that is
    /// already `Ready` is left untouched.
    pub fn initialize(&mut self, config: JitConfig) -> Result<(), JitError> {
        if let RuntimeState::Ready(_) = self.state {
            return Err(JitError::InvalidState(RuntimeStatus::Ready));
        }
        llvm::initialize_native()?;
        let context = JitContext::new(config)?;
        self.state = RuntimeState::Ready(context);
        Ok(())
    }

    /// Release the context.
    ///
    /// Destroying a never-initialized runtime does nothing; destroying twice
    /// is an error.
    pub fn destroy(&mut self) -> Result<(), JitError> {
        match std::mem::replace(&mut self.state, RuntimeState::Destroyed) {
            RuntimeState::Uninitialized => {
                self.state = RuntimeState::Uninitialized;
                Ok(())
            }
            RuntimeState::Ready(context) => {
                context::teardown(Some(context));
                tracing::info!("JIT context destroyed");
                Ok(())
            }
            RuntimeState::Destroyed => Err(JitError::InvalidState(RuntimeStatus::Destroyed)),
        }
    }

    /// The live context, only while `Ready`.
    pub fn context(&self) -> Result<&JitContext, JitError> {
        match &self.state {
            RuntimeState::Ready(context) => Ok(context),
            _ => Err(JitError::InvalidState(self.status())),
        }
    }
}

impl Default for JitRuntime {
    fn default() -> Self {
        Self::new()
    }
}

lazy_static::lazy_static! {
    /// The runtime behind the process-level hooks.
    static ref RUNTIME: Mutex<JitRuntime> = Mutex::new(JitRuntime::new());
}

fn runtime() -> MutexGuard<'static, JitRuntime> {
    // A panic while holding the lock leaves the state itself consistent.
    RUNTIME.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Initialize the process-wide runtime from [`JitConfig::from_env`].
pub fn initialize() -> Result<(), JitError> {
    let config = JitConfig::from_env().inspect_err(|e| {
        tracing::error!(error = %e, "jit: invalid JIT configuration");
    })?;
    initialize_with(config)
}

/// Initialize the process-wide runtime with an explicit configuration.
pub fn initialize_with(config: JitConfig) -> Result<(), JitError> {
    runtime().initialize(config).inspect_err(|e| {
        tracing::error!(error = %e, "jit: unable to initialize runtime");
    })
}

/// Initialize, or print one diagnostic line and exit with status 1.
///
/// For embedders that cannot run at all without the JIT.
pub fn initialize_or_exit() {
    if let Err(e) = initialize() {
        eprintln!("jit: {e}");
        std::process::exit(1);
    }
}

/// Release the process-wide context.
pub fn destroy() -> Result<(), JitError> {
    runtime().destroy()
}

pub fn status() -> RuntimeStatus {
    runtime().status()
}

/// Run `f` against the process-wide context while the runtime is `Ready`.
pub fn with_context<R>(f: impl FnOnce(&JitContext) -> R) -> Result<R, JitError> {
    let guard = runtime();
    let context = guard.context()?;
    Ok(f(context))
}

/// Drop whatever the process-wide runtime holds and return it to
/// `Uninitialized`. Must be called at the start of every `#[serial]`
/// runtime test.
#[cfg(test)]
pub(crate) fn reset_for_testing() {
    *runtime() = JitRuntime::new();
}
