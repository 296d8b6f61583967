//! Shared fixtures for bcjit tests.
//!
//! Modules are written into a temporary directory as textual IR or as
//! bitcode produced by inkwell; LLVM's IR reader accepts both.

use std::path::PathBuf;

use inkwell::context::Context;
use tempfile::TempDir;

use crate::config::JitConfig;

/// `void run(void)` that does nothing.
pub const VOID_RUN_IR: &str = "define void @run() {\nentry:\n  ret void\n}\n";

/// `run` bumps `@counter`; `answer` has a signature the driver rejects.
pub const COUNTER_IR: &str = r#"
@counter = global i32 0

define void @run() {
entry:
  %old = load i32, ptr @counter
  %new = add i32 %old, 1
  store i32 %new, ptr @counter
  ret void
}

define i32 @answer() {
entry:
  ret i32 42
}
"#;

/// A well-formed module for a target the native MCJIT cannot compile for.
pub const FOREIGN_TARGET_IR: &str = r#"
target triple = "nvptx64-nvidia-cuda"

define void @run() {
entry:
  ret void
}
"#;

/// A module file in its own temporary directory.
pub struct ModuleFixture {
    // Kept alive so the file exists for the fixture's lifetime.
    _dir: TempDir,
    pub path: PathBuf,
}

impl ModuleFixture {
    pub fn from_bytes(bytes: &[u8]) -> Self {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("d.bc");
        std::fs::write(&path, bytes).expect("write module");
        Self { _dir: dir, path }
    }

    pub fn from_ir(ir: &str) -> Self {
        Self::from_bytes(ir.as_bytes())
    }

    /// Bitcode for a module whose only function is `void run(void)`.
    pub fn void_run_bitcode() -> Self {
        Self::from_bytes(&void_run_bitcode())
    }

    pub fn config(&self) -> JitConfig {
        JitConfig::default().with_bitcode_path(&self.path)
    }
}

/// Path inside a fresh temporary directory where no file exists.
pub fn missing_module() -> (TempDir, JitConfig) {
    let dir = tempfile::tempdir().expect("tempdir");
    let config = JitConfig::default().with_bitcode_path(dir.path().join("d.bc"));
    (dir, config)
}

/// Build `void run(void)` with inkwell and serialize it to bitcode.
pub fn void_run_bitcode() -> Vec<u8> {
    let context = Context::create();
    let module = context.create_module("prebuilt");
    let fn_type = context.void_type().fn_type(&[], false);
    let function = module.add_function("run", fn_type, None);
    let builder = context.create_builder();
    builder.position_at_end(context.append_basic_block(function, "entry"));
    builder.build_return(None).expect("build ret");
    module.verify().expect("valid module");
    module.write_bitcode_to_memory().as_slice().to_vec()
}
