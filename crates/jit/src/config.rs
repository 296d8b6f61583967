//! JIT configuration.

use std::path::PathBuf;

use inkwell::OptimizationLevel;

use crate::error::JitError;

/// Bitcode path used when nothing else is configured, relative to the
/// process working directory.
pub const DEFAULT_BITCODE_PATH: &str = "d.bc";

/// Name attached to the LLVM memory buffer holding the bitcode.
pub const DEFAULT_BUFFER_NAME: &str = "bitcode_buffer";

/// Environment variable overriding [`JitConfig::bitcode_path`].
pub const BITCODE_ENV: &str = "BCJIT_BITCODE";

/// Environment variable overriding [`JitConfig::opt_level`].
pub const OPT_LEVEL_ENV: &str = "BCJIT_OPT_LEVEL";

/// Configuration for building a [`JitContext`](crate::JitContext).
#[derive(Debug, Clone)]
pub struct JitConfig {
    /// Pre-compiled bitcode (or textual IR) module to load.
    pub bitcode_path: PathBuf,
    /// MCJIT code generation level.
    pub opt_level: OptimizationLevel,
    /// Emit verbose assembly comments from the engine's target machine.
    pub asm_verbose: bool,
    /// Identifier of the in-memory buffer, shown in LLVM diagnostics.
    pub buffer_name: String,
}

impl JitConfig {
    /// Default configuration with overrides from `BCJIT_BITCODE` and
    /// `BCJIT_OPT_LEVEL`.
    pub fn from_env() -> Result<Self, JitError> {
        let mut config = Self::default();
        if let Some(path) = std::env::var_os(BITCODE_ENV) {
            config.bitcode_path = PathBuf::from(path);
        }
        if let Ok(level) = std::env::var(OPT_LEVEL_ENV) {
            config.opt_level = parse_opt_level(&level)?;
        }
        Ok(config)
    }

    /// Same configuration reading a different bitcode file.
    pub fn with_bitcode_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.bitcode_path = path.into();
        self
    }

    /// Same configuration with a different optimization level.
    pub fn with_opt_level(mut self, opt_level: OptimizationLevel) -> Self {
        self.opt_level = opt_level;
        self
    }
}

impl Default for JitConfig {
    fn default() -> Self {
        Self {
            bitcode_path: PathBuf::from(DEFAULT_BITCODE_PATH),
            opt_level: OptimizationLevel::Aggressive,
            asm_verbose: true,
            buffer_name: DEFAULT_BUFFER_NAME.to_string(),
        }
    }
}

/// Map a numeric level (`0`..=`3`) to an [`OptimizationLevel`].
pub fn opt_level_from_u8(level: u8) -> Result<OptimizationLevel, JitError> {
    match level {
        0 => Ok(OptimizationLevel::None),
        1 => Ok(OptimizationLevel::Less),
        2 => Ok(OptimizationLevel::Default),
        3 => Ok(OptimizationLevel::Aggressive),
        other => Err(JitError::InvalidOptLevel(other.to_string())),
    }
}

/// Numeric value MCJIT expects in `LLVMMCJITCompilerOptions::OptLevel`.
pub fn opt_level_to_u32(level: OptimizationLevel) -> u32 {
    match level {
        OptimizationLevel::None => 0,
        OptimizationLevel::Less => 1,
        OptimizationLevel::Default => 2,
        OptimizationLevel::Aggressive => 3,
    }
}

/// Parse an optimization level from text, e.g. an environment variable.
pub fn parse_opt_level(text: &str) -> Result<OptimizationLevel, JitError> {
    let trimmed = text.trim();
    let level = trimmed
        .parse::<u8>()
        .map_err(|_| JitError::InvalidOptLevel(trimmed.to_string()))?;
    opt_level_from_u8(level)
}
