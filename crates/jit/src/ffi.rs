//! C ABI lifecycle hooks for the embedding interpreter.

use std::ffi::c_int;

use crate::runtime;

/// Initialize the process-wide JIT. Returns `0` on success and `1` on
/// failure; the reason is logged by the runtime.
#[unsafe(no_mangle)]
pub extern "C" fn bcjit_init() -> c_int {
    match runtime::initialize() {
        Ok(()) => 0,
        Err(_) => 1,
    }
}

/// Release the process-wide JIT context.
#[unsafe(no_mangle)]
pub extern "C" fn bcjit_destroy() {
    if let Err(e) = runtime::destroy() {
        tracing::warn!(error = %e, "jit: destroy ignored");
    }
}
