//! Process-wide lifecycle tests.
//!
//! These share the global runtime, so every test is serialized and starts
//! from `reset_for_testing`.

#[cfg(test)]
mod tests {
    use crate::config::BITCODE_ENV;
    use crate::error::JitError;
    use crate::ffi;
    use crate::runtime::{self, RuntimeStatus};
    use crate::tests::test_helpers::{ModuleFixture, VOID_RUN_IR, missing_module};

    #[test]
    #[serial_test::serial]
    fn test_full_lifecycle() {
        runtime::reset_for_testing();
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);

        assert_eq!(runtime::status(), RuntimeStatus::Uninitialized);
        runtime::initialize_with(fixture.config()).unwrap();
        assert_eq!(runtime::status(), RuntimeStatus::Ready);
        assert!(runtime::with_context(|ctx| ctx.has_function("run")).unwrap());

        runtime::destroy().unwrap();
        assert_eq!(runtime::status(), RuntimeStatus::Destroyed);
    }

    #[test]
    #[serial_test::serial]
    fn test_destroy_without_initialize_is_noop() {
        runtime::reset_for_testing();
        runtime::destroy().unwrap();
        assert_eq!(runtime::status(), RuntimeStatus::Uninitialized);
        ffi::bcjit_destroy();
        assert_eq!(runtime::status(), RuntimeStatus::Uninitialized);
    }

    #[test]
    #[serial_test::serial]
    fn test_second_destroy_is_rejected() {
        runtime::reset_for_testing();
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        runtime::initialize_with(fixture.config()).unwrap();
        runtime::destroy().unwrap();

        assert!(matches!(
            runtime::destroy(),
            Err(JitError::InvalidState(RuntimeStatus::Destroyed))
        ));
        assert!(matches!(
            runtime::with_context(|ctx| ctx.has_function("run")),
            Err(JitError::InvalidState(RuntimeStatus::Destroyed))
        ));
        // The C hook only logs.
        ffi::bcjit_destroy();
    }

    #[test]
    #[serial_test::serial]
    fn test_initialize_twice_is_rejected() {
        runtime::reset_for_testing();
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        runtime::initialize_with(fixture.config()).unwrap();

        assert!(matches!(
            runtime::initialize_with(fixture.config()),
            Err(JitError::InvalidState(RuntimeStatus::Ready))
        ));
        // The first context is still in place.
        assert_eq!(runtime::status(), RuntimeStatus::Ready);
        runtime::destroy().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_reinitialize_after_destroy() {
        runtime::reset_for_testing();
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        runtime::initialize_with(fixture.config()).unwrap();
        runtime::destroy().unwrap();

        runtime::initialize_with(fixture.config()).unwrap();
        assert_eq!(runtime::status(), RuntimeStatus::Ready);
        runtime::destroy().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_failed_initialize_leaves_runtime_unready() {
        runtime::reset_for_testing();
        let (_dir, config) = missing_module();

        let err = runtime::initialize_with(config).unwrap_err();
        assert!(matches!(err, JitError::BitcodeOpen { .. }));
        assert_eq!(runtime::status(), RuntimeStatus::Uninitialized);
        assert!(runtime::with_context(|_| ()).is_err());
    }

    #[test]
    #[serial_test::serial]
    fn test_driver_through_runtime() {
        runtime::reset_for_testing();
        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        runtime::initialize_with(fixture.config()).unwrap();

        let report = runtime::with_context(|ctx| {
            // SAFETY: `run` is an empty function.
            unsafe { crate::driver::run_entry(ctx, "run") }
        })
        .unwrap()
        .unwrap();
        assert_eq!(report.entry, "run");
        runtime::destroy().unwrap();
    }

    #[test]
    #[serial_test::serial]
    fn test_c_init_hook_reports_status_code() {
        runtime::reset_for_testing();
        let (_dir, missing) = missing_module();
        // SAFETY: runtime tests are serialized and nothing else reads the
        // environment concurrently.
        unsafe { std::env::set_var(BITCODE_ENV, &missing.bitcode_path) };
        assert_eq!(ffi::bcjit_init(), 1);
        assert_eq!(runtime::status(), RuntimeStatus::Uninitialized);

        let fixture = ModuleFixture::from_ir(VOID_RUN_IR);
        // SAFETY: see above.
        unsafe { std::env::set_var(BITCODE_ENV, &fixture.path) };
        assert_eq!(ffi::bcjit_init(), 0);
        assert_eq!(runtime::status(), RuntimeStatus::Ready);
        // SAFETY: see above.
        unsafe { std::env::remove_var(BITCODE_ENV) };

        ffi::bcjit_destroy();
        assert_eq!(runtime::status(), RuntimeStatus::Destroyed);
    }
}
