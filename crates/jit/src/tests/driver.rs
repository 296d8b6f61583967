//! Compile-and-invoke driver tests.

#[cfg(test)]
mod tests {
    use crate::context::JitContext;
    use crate::driver::{self, DEFAULT_ENTRY};
    use crate::error::JitError;
    use crate::llvm::initialize_native;
    use crate::tests::test_helpers::{COUNTER_IR, ModuleFixture, VOID_RUN_IR, missing_module};

    fn counter_context(fixture: &ModuleFixture) -> JitContext {
        initialize_native().expect("native backends");
        JitContext::new(fixture.config()).expect("context")
    }

    fn read_counter(context: &JitContext) -> i32 {
        let address = context
            .global_address("counter")
            .unwrap()
            .expect("counter is emitted");
        // SAFETY: `@counter` is an i32 global living in the engine's memory.
        unsafe { std::ptr::read_volatile(address as *const i32) }
    }

    #[test]
    fn test_run_entry_executes_compiled_code() {
        let fixture = ModuleFixture::from_ir(COUNTER_IR);
        let context = counter_context(&fixture);
        assert_eq!(read_counter(&context), 0);

        // SAFETY: `run` only increments a global of its own module.
        let report = unsafe { driver::run_entry(&context, DEFAULT_ENTRY) }.unwrap();
        assert_eq!(report.entry, "run");
        assert!(!report.triple.is_empty());
        assert_eq!(read_counter(&context), 1);
    }

    #[test]
    fn test_compiled_entry_can_be_called_repeatedly() {
        let fixture = ModuleFixture::from_ir(COUNTER_IR);
        let context = counter_context(&fixture);

        let compiled = driver::compile_entry(&context, "run").unwrap();
        assert_eq!(compiled.name(), "run");
        for _ in 0..3 {
            // SAFETY: `run` only increments a global of its own module.
            unsafe { compiled.call() };
        }
        assert_eq!(read_counter(&context), 3);
    }

    #[test]
    fn test_unsupported_signature_is_rejected() {
        let fixture = ModuleFixture::from_ir(COUNTER_IR);
        let context = counter_context(&fixture);

        match driver::compile_entry(&context, "answer").unwrap_err() {
            JitError::UnsupportedSignature { name, reason } => {
                assert_eq!(name, "answer");
                assert!(reason.contains("void"));
            }
            other => panic!("expected UnsupportedSignature, got {other:?}"),
        }
    }

    #[test]
    fn test_missing_entry_is_reported() {
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        let context = counter_context(&fixture);

        let err = driver::compile_entry(&context, "main").unwrap_err();
        assert!(matches!(err, JitError::FunctionNotFound(ref name) if name == "main"));
        assert_eq!(err.to_string(), "unable to find function 'main'");
    }

    #[test]
    fn test_entry_requires_built_engine() {
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        let context = JitContext::empty(fixture.config());
        assert!(matches!(
            driver::compile_entry(&context, "run"),
            Err(JitError::InvalidStage { .. })
        ));
    }

    #[test]
    fn test_run_standalone_round_trip() {
        let fixture = ModuleFixture::void_run_bitcode();
        // SAFETY: `run` is an empty function.
        let report = unsafe { driver::run_standalone(fixture.config(), "run") }.unwrap();
        assert_eq!(report.entry, "run");
        assert_eq!(report.compile_ms(), report.compile_ns / 1_000_000);
    }

    #[test]
    fn test_run_standalone_without_module() {
        let (_dir, config) = missing_module();
        // SAFETY: nothing is executed when loading fails.
        let result = unsafe { driver::run_standalone(config, "run") };
        assert!(matches!(result, Err(JitError::BitcodeOpen { .. })));
    }

    #[test]
    fn test_report_serializes_to_json() {
        let report = driver::RunReport {
            entry: "run".to_string(),
            triple: "x86_64-unknown-linux-gnu".to_string(),
            compile_ns: 2_500_000,
        };
        let value = serde_json::to_value(&report).unwrap();
        assert_eq!(value["entry"], "run");
        assert_eq!(value["compile_ns"], 2_500_000);
        assert_eq!(report.compile_ms(), 2);
    }
}
