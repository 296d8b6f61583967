//! Error types for the bitcode JIT crate.

use std::path::PathBuf;

use crate::context::StageKind;
use crate::llvm::NativeInitStep;
use crate::runtime::RuntimeStatus;

/// Errors that can occur while setting up, using, or tearing down the JIT.
#[derive(Debug, Clone, thiserror::Error)]
pub enum JitError {
    /// One of the native-backend registration steps failed.
    #[error("unable to initialize LLVM: native {step} unavailable")]
    NativeInit {
        /// The registration step that reported failure.
        step: NativeInitStep,
    },

    /// The bitcode file could not be opened or measured.
    #[error("unable to open bitcode {path}: {reason}")]
    BitcodeOpen { path: PathBuf, reason: String },

    /// The bitcode file has no contents.
    #[error("bitcode {0} is empty")]
    EmptyBitcode(PathBuf),

    /// The bitcode file ended before its reported size was read.
    #[error("short read on bitcode {path}: expected {expected} bytes")]
    ShortRead { path: PathBuf, expected: u64 },

    /// LLVM refused to create the memory buffer wrapping the bitcode.
    #[error("unable to create memory buffer '{0}'")]
    MemoryBuffer(String),

    /// LLVM's IR reader rejected the module.
    #[error("error loading pre-built module: {0}")]
    Parse(String),

    /// MCJIT could not be constructed for the loaded module.
    #[error("failed to initialize MCJIT execution engine: {0}")]
    EngineCreation(String),

    /// No function with this name exists in the engine's modules.
    #[error("unable to find function '{0}'")]
    FunctionNotFound(String),

    /// The entry point is not `void name(void)`.
    #[error("function '{name}' has unsupported signature: {reason}")]
    UnsupportedSignature { name: String, reason: String },

    /// Code generation produced no address for the function.
    #[error("compilation of '{0}' produced a null address")]
    CompilationFailed(String),

    /// Symbol names are handed to LLVM as C strings.
    #[error("invalid symbol name {0:?}: contains a NUL byte")]
    InvalidName(String),

    /// Optimization levels range from 0 to 3.
    #[error("invalid optimization level {0} (expected 0-3)")]
    InvalidOptLevel(String),

    /// A context operation was attempted at the wrong ownership stage.
    #[error("JIT context is at stage '{found}', expected '{expected}'")]
    InvalidStage { expected: StageKind, found: StageKind },

    /// A lifecycle operation was attempted in the wrong runtime state.
    #[error("JIT runtime is {0}")]
    InvalidState(RuntimeStatus),
}
