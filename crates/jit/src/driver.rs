//! Compile-and-invoke driver.
//!
//! Looks up a zero-argument, void entry point by name, resolves it to
//! native code (which is when MCJIT actually generates machine code), times
//! that step, and calls it.

use std::ffi::c_void;
use std::marker::PhantomData;
use std::time::{Duration, Instant};

use serde::Serialize;

use crate::config::JitConfig;
use crate::context::JitContext;
use crate::error::JitError;
use crate::llvm;

/// Entry point the driver runs when none is named.
pub const DEFAULT_ENTRY: &str = "run";

/// Native signature of an entry point: `void name(void)`.
pub type EntryFn = unsafe extern "C" fn();

/// An entry point compiled to native code. Borrowing the context keeps the
/// engine, and therefore the code, alive.
pub struct CompiledEntry<'ctx> {
    name: String,
    func: EntryFn,
    compile_time: Duration,
    _context: PhantomData<&'ctx JitContext>,
}

impl CompiledEntry<'_> {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn compile_time(&self) -> Duration {
        self.compile_time
    }

    /// Call the compiled entry point.
    ///
    /// # Safety
    ///
    /// The module's code must be sound to execute in this process.
    pub unsafe fn call(&self) {
        // SAFETY: the signature was checked before compilation; soundness of
        // the body is the caller's contract.
        unsafe { (self.func)() }
    }
}

impl std::fmt::Debug for CompiledEntry<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CompiledEntry")
            .field("name", &self.name)
            .field("func", &(self.func as *const ()))
            .field("compile_time", &self.compile_time)
            .finish()
    }
}

/// Result of one compile-and-invoke round trip.
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub entry: String,
    pub triple: String,
    /// Time spent resolving the entry point to native code.
    pub compile_ns: u128,
}

impl RunReport {
    pub fn compile_ms(&self) -> u128 {
        self.compile_ns / 1_000_000
    }
}

/// Resolve `name` to native code, timing the code generation.
pub fn compile_entry<'ctx>(
    context: &'ctx JitContext,
    name: &str,
) -> Result<CompiledEntry<'ctx>, JitError> {
    let engine = context.engine()?;
    let function = engine.find_function(name).inspect_err(|_| {
        tracing::error!(entry = name, "jit: unable to find function");
    })?;
    function.ensure_void_no_args()?;

    let started = Instant::now();
    let address = engine.pointer_to_function(function);
    let compile_time = started.elapsed();

    if address.is_null() {
        return Err(JitError::CompilationFailed(name.to_string()));
    }
    // SAFETY: `address` is the start of `name`'s machine code and the
    // function was verified to be `void name(void)`.
    let func = unsafe { std::mem::transmute::<*mut c_void, EntryFn>(address) };

    tracing::info!(
        entry = name,
        compile_ms = compile_time.as_millis(),
        "jit: time to compile"
    );
    Ok(CompiledEntry {
        name: name.to_string(),
        func,
        compile_time,
        _context: PhantomData,
    })
}

/// Compile `name` and call it once.
///
/// # Safety
///
/// The module's code must be sound to execute in this process.
pub unsafe fn run_entry(context: &JitContext, name: &str) -> Result<RunReport, JitError> {
    let compiled = compile_entry(context, name)?;
    // SAFETY: forwarded to the caller.
    unsafe { compiled.call() };
    tracing::debug!(entry = name, "entry point returned");

    Ok(RunReport {
        entry: compiled.name().to_string(),
        triple: context.target_triple().unwrap_or_default(),
        compile_ns: compiled.compile_time().as_nanos(),
    })
}

/// Standalone round trip: register backends, build a private context from
/// `config`, run `entry`, and tear the context down again.
///
/// # Safety
///
/// The module's code must be sound to execute in this process.
pub unsafe fn run_standalone(config: JitConfig, entry: &str) -> Result<RunReport, JitError> {
    llvm::initialize_native()?;
    let context = JitContext::new(config)?;
    // SAFETY: forwarded to the caller.
    let report = unsafe { run_entry(&context, entry) };
    crate::context::teardown(Some(context));
    report
}
