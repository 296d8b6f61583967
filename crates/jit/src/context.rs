//! JIT context: one LLVM context, the module loaded into it, and the MCJIT
//! engine compiled from that module.
//!
//! # Ownership stages
//!
//! ```text
//! Empty ──load──▶ ModuleLoaded ──build engine──▶ EngineBuilt
//! ```
//!
//! Once the engine is built it owns the module, so teardown must dispose
//! either the module (`ModuleLoaded`) or the engine (`EngineBuilt`), never
//! both.

use std::fmt;

use crate::config::JitConfig;
use crate::error::JitError;
use crate::llvm::{FunctionRef, LlvmContext, McJitEngine, ModuleView, OwnedModule};
use crate::loader;

/// Which resources a [`JitContext`] currently owns.
#[derive(Debug, Default)]
enum Stage {
    #[default]
    Empty,
    ModuleLoaded(OwnedModule),
    EngineBuilt(McJitEngine),
}

/// Observable name of a [`JitContext`]'s ownership stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StageKind {
    Empty,
    ModuleLoaded,
    EngineBuilt,
}

impl fmt::Display for StageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StageKind::Empty => write!(f, "empty"),
            StageKind::ModuleLoaded => write!(f, "module loaded"),
            StageKind::EngineBuilt => write!(f, "engine built"),
        }
    }
}

/// A native-target compilation context.
pub struct JitContext {
    // Dropped before `llvm`: modules and engines must go before their context.
    stage: Stage,
    llvm: LlvmContext,
    config: JitConfig,
}

// SAFETY: the LLVM handles are exclusively owned by this value and LLVM
// contexts may move between threads as long as only one thread uses them at
// a time, which `&mut`/`Mutex` access guarantees.
unsafe impl Send for JitContext {}

impl JitContext {
    /// Build a fully initialized context from `config`.
    ///
    /// Native backends must already be registered
    /// (see [`initialize_native`](crate::llvm::initialize_native)). On
    /// failure everything acquired so far is released according to the
    /// stage reached.
    pub fn new(config: JitConfig) -> Result<Self, JitError> {
        let mut context = Self::empty(config);
        context.load_module().inspect_err(|_| {
            tracing::error!("jit: unable to load prebuilt module");
        })?;
        context.build_engine()?;

        tracing::info!(
            path = %context.config.bitcode_path.display(),
            opt_level = ?context.config.opt_level,
            triple = %context.target_triple().unwrap_or_default(),
            "JIT context ready"
        );
        Ok(context)
    }

    /// A context with a fresh LLVM context and nothing loaded into it.
    pub fn empty(config: JitConfig) -> Self {
        Self {
            stage: Stage::Empty,
            llvm: LlvmContext::new(),
            config,
        }
    }

    pub fn config(&self) -> &JitConfig {
        &self.config
    }

    pub fn stage(&self) -> StageKind {
        match self.stage {
            Stage::Empty => StageKind::Empty,
            Stage::ModuleLoaded(_) => StageKind::ModuleLoaded,
            Stage::EngineBuilt(_) => StageKind::EngineBuilt,
        }
    }

    /// Parse the configured bitcode into this context: `Empty → ModuleLoaded`.
    pub fn load_module(&mut self) -> Result<(), JitError> {
        if !matches!(self.stage, Stage::Empty) {
            return Err(JitError::InvalidStage {
                expected: StageKind::Empty,
                found: self.stage(),
            });
        }
        let module = loader::load_module(
            &self.llvm,
            &self.config.bitcode_path,
            &self.config.buffer_name,
        )?;
        self.stage = Stage::ModuleLoaded(module);
        Ok(())
    }

    /// Hand the loaded module to MCJIT: `ModuleLoaded → EngineBuilt`.
    pub fn build_engine(&mut self) -> Result<(), JitError> {
        let module = match std::mem::take(&mut self.stage) {
            Stage::ModuleLoaded(module) => module,
            other => {
                self.stage = other;
                return Err(JitError::InvalidStage {
                    expected: StageKind::ModuleLoaded,
                    found: self.stage(),
                });
            }
        };

        // The module is consumed here even on failure, leaving the stage Empty.
        let engine = McJitEngine::for_module(module, self.config.opt_level).inspect_err(|e| {
            tracing::error!(error = %e, "jit: failed to build execution engine");
        })?;
        if let Some(target_machine) = engine.target_machine() {
            target_machine.set_asm_verbosity(self.config.asm_verbose);
        }
        self.stage = Stage::EngineBuilt(engine);
        Ok(())
    }

    fn module(&self) -> Option<ModuleView<'_>> {
        match &self.stage {
            Stage::Empty => None,
            Stage::ModuleLoaded(module) => Some(module.view()),
            Stage::EngineBuilt(engine) => Some(engine.module()),
        }
    }

    pub(crate) fn engine(&self) -> Result<&McJitEngine, JitError> {
        match &self.stage {
            Stage::EngineBuilt(engine) => Ok(engine),
            _ => Err(JitError::InvalidStage {
                expected: StageKind::EngineBuilt,
                found: self.stage(),
            }),
        }
    }

    /// Whether the loaded module contains a function called `name`.
    pub fn has_function(&self, name: &str) -> bool {
        self.module()
            .and_then(|module| module.get_function(name).ok().flatten())
            .is_some()
    }

    /// Functions with a body in the loaded module.
    pub fn defined_functions(&self) -> Vec<String> {
        self.module()
            .map(|module| module.defined_functions())
            .unwrap_or_default()
    }

    /// Triple of the engine's target machine, once the engine exists.
    pub fn target_triple(&self) -> Option<String> {
        let engine = self.engine().ok()?;
        engine.target_machine().map(|tm| tm.triple())
    }

    /// Find a function by name in the engine.
    pub fn find_function(&self, name: &str) -> Result<FunctionRef<'_>, JitError> {
        self.engine()?.find_function(name)
    }

    /// Address of the global `name` in JIT memory.
    pub fn global_address(&self, name: &str) -> Result<Option<u64>, JitError> {
        self.engine()?.global_address(name)
    }

    /// Release owned resources by stage. The LLVM context itself goes when
    /// `self` is dropped.
    fn release(&mut self) {
        match std::mem::take(&mut self.stage) {
            Stage::Empty => {}
            Stage::ModuleLoaded(module) => {
                tracing::debug!("disposing module never handed to an engine");
                drop(module);
            }
            Stage::EngineBuilt(engine) => {
                tracing::debug!("disposing execution engine and its module");
                drop(engine);
            }
        }
    }
}

impl Drop for JitContext {
    fn drop(&mut self) {
        self.release();
    }
}

impl fmt::Debug for JitContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("JitContext")
            .field("stage", &self.stage())
            .field("llvm", &self.llvm)
            .field("config", &self.config)
            .finish()
    }
}

/// Release a context if there is one. Releasing nothing is a no-op.
pub fn teardown(context: Option<JitContext>) {
    if let Some(context) = context {
        tracing::debug!(stage = %context.stage(), "tearing down JIT context");
        drop(context);
    }
}
