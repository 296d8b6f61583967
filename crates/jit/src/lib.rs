//! bcjit: an MCJIT host for a pre-compiled bitcode module.
//!
//! Loads a bitcode module (by default `d.bc` in the working directory),
//! builds an LLVM MCJIT execution engine for the native target, and keeps
//! it in a process-wide runtime that an embedding interpreter drives
//! through two hooks, initialize and destroy.
//!
//! # Architecture
//!
//! ```text
//! bcjit
//!   ├── llvm     — owning wrappers over the raw LLVM handles, native init
//!   ├── loader   — bitcode file → module in a given LLVM context
//!   ├── context  — stage-tagged JIT context (module → engine)
//!   ├── runtime  — process-wide Uninitialized/Ready/Destroyed lifecycle
//!   ├── driver   — compile-and-invoke of a `void name(void)` entry point
//!   └── ffi      — C ABI hooks
//! ```
//!
//! LLVM 18 must be installed on the system.

pub mod config;
pub mod context;
pub mod driver;
pub mod error;
pub mod ffi;
pub mod llvm;
pub mod loader;
pub mod runtime;

pub use config::JitConfig;
pub use context::{JitContext, StageKind};
pub use driver::{DEFAULT_ENTRY, RunReport};
pub use error::JitError;
pub use runtime::{
    JitRuntime, RuntimeStatus, destroy, initialize, initialize_or_exit, initialize_with, status,
    with_context,
};

#[cfg(test)]
mod tests;
