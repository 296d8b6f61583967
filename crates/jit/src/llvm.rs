//! Owning wrappers around the raw LLVM handles used by the JIT.
//!
//! inkwell ties modules and engines to a borrowed `&'ctx Context`, which
//! cannot be stored next to the context it borrows from inside a
//! process-wide runtime. These wrappers hold the raw `llvm-sys` handles
//! (re-exported by inkwell) and make disposal a `Drop` concern:
//!
//! - [`LlvmContext`] disposes the LLVM context (the compilation namespace).
//! - [`OwnedModule`] disposes a module that no engine has taken over.
//! - [`McJitEngine`] disposes the execution engine, which frees the module
//!   it was built from.
//!
//! Callers keep every module and engine strictly inside the lifetime of the
//! context it was created in; [`JitContext`](crate::JitContext) enforces this
//! through field order.

use std::ffi::{CStr, CString, c_char, c_void};
use std::fmt;
use std::marker::PhantomData;
use std::mem::{self, ManuallyDrop};
use std::ptr;
use std::sync::OnceLock;

use inkwell::OptimizationLevel;
use inkwell::execution_engine::ExecutionEngine;
use inkwell::llvm_sys::LLVMTypeKind;
use inkwell::llvm_sys::core::{
    LLVMContextCreate, LLVMContextDispose, LLVMCountParamTypes,
    LLVMCreateMemoryBufferWithMemoryRangeCopy, LLVMDisposeMessage, LLVMDisposeModule,
    LLVMGetFirstFunction, LLVMGetNamedFunction, LLVMGetNextFunction, LLVMGetReturnType,
    LLVMGetTypeKind, LLVMGetValueName2, LLVMGlobalGetValueType, LLVMIsDeclaration,
    LLVMIsFunctionVarArg,
};
use inkwell::llvm_sys::execution_engine::{
    LLVMCreateMCJITCompilerForModule, LLVMDisposeExecutionEngine, LLVMExecutionEngineRef,
    LLVMFindFunction, LLVMGetExecutionEngineTargetMachine, LLVMGetGlobalValueAddress,
    LLVMGetPointerToGlobal, LLVMInitializeMCJITCompilerOptions, LLVMMCJITCompilerOptions,
};
use inkwell::llvm_sys::ir_reader::LLVMParseIRInContext;
use inkwell::llvm_sys::prelude::{LLVMBool, LLVMContextRef, LLVMModuleRef, LLVMValueRef};
use inkwell::llvm_sys::target::{
    LLVM_InitializeNativeAsmParser, LLVM_InitializeNativeAsmPrinter,
    LLVM_InitializeNativeDisassembler, LLVM_InitializeNativeTarget,
};
use inkwell::llvm_sys::target_machine::{
    LLVMGetTargetMachineTriple, LLVMSetTargetMachineAsmVerbosity, LLVMTargetMachineRef,
};
use inkwell::targets::TargetMachine;

use crate::config::opt_level_to_u32;
use crate::error::JitError;

// ── Native backend registration ─────────────────────────────────────────────

/// A native-backend registration step.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NativeInitStep {
    Target,
    AsmParser,
    AsmPrinter,
    Disassembler,
}

impl fmt::Display for NativeInitStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NativeInitStep::Target => write!(f, "target"),
            NativeInitStep::AsmParser => write!(f, "asm parser"),
            NativeInitStep::AsmPrinter => write!(f, "asm printer"),
            NativeInitStep::Disassembler => write!(f, "disassembler"),
        }
    }
}

/// Outcome of the one native-backend registration this process performs.
static NATIVE_INIT: OnceLock<Result<(), JitError>> = OnceLock::new();

/// Register the host target, asm parser, asm printer and disassembler with
/// LLVM and link in MCJIT.
///
/// Registration mutates LLVM's global target registry, so it runs once per
/// process; later calls return the recorded outcome.
pub fn initialize_native() -> Result<(), JitError> {
    NATIVE_INIT.get_or_init(register_native_backends).clone()
}

fn register_native_backends() -> Result<(), JitError> {
    let steps: [(NativeInitStep, unsafe extern "C" fn() -> LLVMBool); 4] = [
        (NativeInitStep::Target, LLVM_InitializeNativeTarget),
        (NativeInitStep::AsmParser, LLVM_InitializeNativeAsmParser),
        (NativeInitStep::AsmPrinter, LLVM_InitializeNativeAsmPrinter),
        (NativeInitStep::Disassembler, LLVM_InitializeNativeDisassembler),
    ];
    for (step, init) in steps {
        // SAFETY: the registration functions take no arguments and only touch
        // LLVM's target registry; `NATIVE_INIT` serializes callers.
        if unsafe { init() } != 0 {
            tracing::error!(%step, "native backend registration failed");
            return Err(JitError::NativeInit { step });
        }
    }
    ExecutionEngine::link_in_mc_jit();
    tracing::debug!(triple = %host_triple(), "registered native LLVM backends");
    Ok(())
}

/// LLVM's default target triple for this host.
pub fn host_triple() -> String {
    TargetMachine::get_default_triple()
        .as_str()
        .to_string_lossy()
        .into_owned()
}

/// Copy an LLVM-allocated message into a `String` and free the original.
///
/// # Safety
///
/// `message` must be null or a string allocated by LLVM that nothing else
/// frees.
unsafe fn take_message(message: *mut c_char) -> Option<String> {
    if message.is_null() {
        return None;
    }
    // SAFETY: non-null LLVM messages are NUL-terminated.
    let text = unsafe { CStr::from_ptr(message) }
        .to_string_lossy()
        .into_owned();
    // SAFETY: ownership of the message was handed to us.
    unsafe { LLVMDisposeMessage(message) };
    Some(text)
}

fn c_name(name: &str) -> Result<CString, JitError> {
    CString::new(name).map_err(|_| JitError::InvalidName(name.to_string()))
}

// ── Context ─────────────────────────────────────────────────────────────────

/// An owned LLVM context: every type and value parsed into it lives here.
pub struct LlvmContext {
    raw: LLVMContextRef,
}

impl LlvmContext {
    pub fn new() -> Self {
        // SAFETY: creating a context has no preconditions.
        let raw = unsafe { LLVMContextCreate() };
        Self { raw }
    }

    /// Copy `bytes` into an LLVM memory buffer named `buffer_name` and parse
    /// it as bitcode or textual IR inside this context.
    pub fn parse_ir(&self, bytes: &[u8], buffer_name: &str) -> Result<OwnedModule, JitError> {
        let name = c_name(buffer_name)?;
        // SAFETY: LLVM copies `bytes` before returning; the slice outlives the call.
        let buffer = unsafe {
            LLVMCreateMemoryBufferWithMemoryRangeCopy(
                bytes.as_ptr().cast::<c_char>(),
                bytes.len(),
                name.as_ptr(),
            )
        };
        if buffer.is_null() {
            return Err(JitError::MemoryBuffer(buffer_name.to_string()));
        }

        let mut module: LLVMModuleRef = ptr::null_mut();
        let mut message: *mut c_char = ptr::null_mut();
        // SAFETY: the parser takes ownership of `buffer` whether or not it
        // succeeds, so it is not disposed here.
        let failed =
            unsafe { LLVMParseIRInContext(self.raw, buffer, &mut module, &mut message) } != 0;
        // SAFETY: `message` is null or owned by us.
        let message = unsafe { take_message(message) };

        if failed || module.is_null() {
            if !module.is_null() {
                // SAFETY: a module returned alongside a failure is still ours.
                unsafe { LLVMDisposeModule(module) };
            }
            return Err(JitError::Parse(
                message.unwrap_or_else(|| "unknown parse error".to_string()),
            ));
        }
        // SAFETY: `module` was just created in this context and is unowned.
        Ok(unsafe { OwnedModule::from_raw(module) })
    }
}

impl Default for LlvmContext {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for LlvmContext {
    fn drop(&mut self) {
        // SAFETY: modules and engines created in this context are dropped
        // before it (see `JitContext` field order).
        unsafe { LLVMContextDispose(self.raw) };
    }
}

impl fmt::Debug for LlvmContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LlvmContext").field("raw", &self.raw).finish()
    }
}

// ── Modules ─────────────────────────────────────────────────────────────────

/// A parsed module that has not been handed to an execution engine.
pub struct OwnedModule {
    raw: LLVMModuleRef,
}

impl OwnedModule {
    /// # Safety
    ///
    /// `raw` must be a valid module that nothing else disposes.
    pub unsafe fn from_raw(raw: LLVMModuleRef) -> Self {
        Self { raw }
    }

    /// Give up ownership without disposing the module.
    pub fn into_raw(self) -> LLVMModuleRef {
        let this = ManuallyDrop::new(self);
        this.raw
    }

    pub fn view(&self) -> ModuleView<'_> {
        ModuleView {
            raw: self.raw,
            _marker: PhantomData,
        }
    }
}

impl Drop for OwnedModule {
    fn drop(&mut self) {
        // SAFETY: an `OwnedModule` is the only owner of its module.
        unsafe { LLVMDisposeModule(self.raw) };
    }
}

impl fmt::Debug for OwnedModule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OwnedModule").field("raw", &self.raw).finish()
    }
}

/// A borrowed view of a module, owned either by an [`OwnedModule`] or by a
/// [`McJitEngine`].
#[derive(Clone, Copy)]
pub struct ModuleView<'a> {
    raw: LLVMModuleRef,
    _marker: PhantomData<&'a ()>,
}

impl<'a> ModuleView<'a> {
    /// Look up a function (declaration or definition) by name.
    pub fn get_function(&self, name: &str) -> Result<Option<FunctionRef<'a>>, JitError> {
        let c_name = c_name(name)?;
        // SAFETY: the module is alive for `'a` and `c_name` is NUL-terminated.
        let raw = unsafe { LLVMGetNamedFunction(self.raw, c_name.as_ptr()) };
        Ok((!raw.is_null()).then(|| FunctionRef::new(raw)))
    }

    /// Names of the functions that have a body in this module.
    pub fn defined_functions(&self) -> Vec<String> {
        let mut names = Vec::new();
        // SAFETY: iteration only reads the module's function list.
        let mut current = unsafe { LLVMGetFirstFunction(self.raw) };
        while !current.is_null() {
            let function = FunctionRef::new(current);
            if !function.is_declaration() {
                names.push(function.name());
            }
            // SAFETY: `current` is a function of this module.
            current = unsafe { LLVMGetNextFunction(current) };
        }
        names
    }
}

/// A function value inside a module.
#[derive(Clone, Copy)]
pub struct FunctionRef<'a> {
    raw: LLVMValueRef,
    _marker: PhantomData<&'a ()>,
}

impl<'a> FunctionRef<'a> {
    fn new(raw: LLVMValueRef) -> Self {
        Self {
            raw,
            _marker: PhantomData,
        }
    }

    pub fn as_raw(&self) -> LLVMValueRef {
        self.raw
    }

    pub fn name(&self) -> String {
        let mut len = 0usize;
        // SAFETY: the returned pointer is valid for `len` bytes while the
        // module is alive.
        let ptr = unsafe { LLVMGetValueName2(self.raw, &mut len) };
        if ptr.is_null() {
            return String::new();
        }
        // SAFETY: see above.
        let bytes = unsafe { std::slice::from_raw_parts(ptr.cast::<u8>(), len) };
        String::from_utf8_lossy(bytes).into_owned()
    }

    pub fn is_declaration(&self) -> bool {
        // SAFETY: functions are globals.
        unsafe { LLVMIsDeclaration(self.raw) != 0 }
    }

    /// Check that the function is `void f(void)`, the only shape the
    /// driver knows how to call.
    pub fn ensure_void_no_args(&self) -> Result<(), JitError> {
        let unsupported = |reason: String| JitError::UnsupportedSignature {
            name: self.name(),
            reason,
        };
        // SAFETY: the value type of a function is its function type.
        let fn_type = unsafe { LLVMGlobalGetValueType(self.raw) };
        // SAFETY: `fn_type` is a function type.
        let params = unsafe { LLVMCountParamTypes(fn_type) };
        if params != 0 {
            return Err(unsupported(format!("expected no parameters, found {params}")));
        }
        // SAFETY: `fn_type` is a function type.
        if unsafe { LLVMIsFunctionVarArg(fn_type) } != 0 {
            return Err(unsupported("variadic functions are not supported".to_string()));
        }
        // SAFETY: `fn_type` is a function type.
        let kind = unsafe { LLVMGetTypeKind(LLVMGetReturnType(fn_type)) };
        if kind != LLVMTypeKind::LLVMVoidTypeKind {
            return Err(unsupported(format!("expected void return, found {kind:?}")));
        }
        Ok(())
    }
}

// ── Execution engine ────────────────────────────────────────────────────────

/// An MCJIT execution engine together with the module it owns.
pub struct McJitEngine {
    raw: LLVMExecutionEngineRef,
    /// Owned by the engine; valid until `raw` is disposed.
    module: LLVMModuleRef,
    /// Owned by the engine; valid until `raw` is disposed.
    target_machine: LLVMTargetMachineRef,
}

impl McJitEngine {
    /// Build an MCJIT engine for `module` at `opt_level`.
    ///
    /// The module is consumed either way: on success the engine owns it, on
    /// failure LLVM has already destroyed it.
    pub fn for_module(
        module: OwnedModule,
        opt_level: OptimizationLevel,
    ) -> Result<Self, JitError> {
        // SAFETY: an all-zero options struct is valid input for the initializer.
        let mut options: LLVMMCJITCompilerOptions = unsafe { mem::zeroed() };
        let size = mem::size_of::<LLVMMCJITCompilerOptions>();
        // SAFETY: `options` is a live, correctly sized struct.
        unsafe { LLVMInitializeMCJITCompilerOptions(&mut options, size) };
        // The initializer resets every field, so the level goes in afterwards.
        options.OptLevel = opt_level_to_u32(opt_level);

        let module = module.into_raw();
        let mut raw: LLVMExecutionEngineRef = ptr::null_mut();
        let mut message: *mut c_char = ptr::null_mut();
        // SAFETY: `module` is valid and its ownership moves into the call.
        let failed = unsafe {
            LLVMCreateMCJITCompilerForModule(&mut raw, module, &mut options, size, &mut message)
        } != 0;
        // SAFETY: `message` is null or owned by us.
        let message = unsafe { take_message(message) };

        if failed || raw.is_null() {
            return Err(JitError::EngineCreation(message.unwrap_or_default()));
        }

        // SAFETY: `raw` is a freshly built engine.
        let target_machine = unsafe { LLVMGetExecutionEngineTargetMachine(raw) };
        Ok(Self {
            raw,
            module,
            target_machine,
        })
    }

    pub fn module(&self) -> ModuleView<'_> {
        ModuleView {
            raw: self.module,
            _marker: PhantomData,
        }
    }

    pub fn target_machine(&self) -> Option<TargetMachineRef<'_>> {
        (!self.target_machine.is_null()).then_some(TargetMachineRef {
            raw: self.target_machine,
            _marker: PhantomData,
        })
    }

    /// Find a function across the engine's modules.
    pub fn find_function(&self, name: &str) -> Result<FunctionRef<'_>, JitError> {
        let c_name = c_name(name)?;
        let mut function: LLVMValueRef = ptr::null_mut();
        // SAFETY: the engine is alive and `c_name` is NUL-terminated.
        let missing = unsafe { LLVMFindFunction(self.raw, c_name.as_ptr(), &mut function) } != 0;
        if missing || function.is_null() {
            return Err(JitError::FunctionNotFound(name.to_string()));
        }
        Ok(FunctionRef::new(function))
    }

    /// Generate machine code for `function` and return its address.
    pub fn pointer_to_function(&self, function: FunctionRef<'_>) -> *mut c_void {
        // SAFETY: `function` belongs to a module owned by this engine.
        unsafe { LLVMGetPointerToGlobal(self.raw, function.as_raw()) }
    }

    /// Address of a global in JIT memory, finalizing the module if needed.
    pub fn global_address(&self, name: &str) -> Result<Option<u64>, JitError> {
        let c_name = c_name(name)?;
        // SAFETY: the engine is alive and `c_name` is NUL-terminated.
        let address = unsafe { LLVMGetGlobalValueAddress(self.raw, c_name.as_ptr()) };
        Ok((address != 0).then_some(address))
    }
}

impl Drop for McJitEngine {
    fn drop(&mut self) {
        // SAFETY: disposing the engine also frees its module and target
        // machine; neither is touched afterwards.
        unsafe { LLVMDisposeExecutionEngine(self.raw) };
    }
}

impl fmt::Debug for McJitEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("McJitEngine")
            .field("raw", &self.raw)
            .field("module", &self.module)
            .field("target_machine", &self.target_machine)
            .finish()
    }
}

/// The engine's target machine. Cannot outlive the engine.
#[derive(Clone, Copy)]
pub struct TargetMachineRef<'a> {
    raw: LLVMTargetMachineRef,
    _marker: PhantomData<&'a McJitEngine>,
}

impl TargetMachineRef<'_> {
    pub fn set_asm_verbosity(&self, verbose: bool) {
        // SAFETY: the target machine is alive while its engine is.
        unsafe { LLVMSetTargetMachineAsmVerbosity(self.raw, i32::from(verbose)) };
    }

    pub fn triple(&self) -> String {
        // SAFETY: the returned string is ours to dispose.
        let raw = unsafe { LLVMGetTargetMachineTriple(self.raw) };
        // SAFETY: see above.
        unsafe { take_message(raw) }.unwrap_or_default()
    }
}
