//! Bitcode module loader.
//!
//! Reads a pre-built bitcode file fully into memory and parses it inside a
//! given LLVM context. The read buffer is dropped as soon as LLVM holds its
//! own copy, and the file is closed on every path.

use std::fs::File;
use std::io::Read;
use std::path::Path;

use crate::error::JitError;
use crate::llvm::{LlvmContext, OwnedModule};

/// Read the whole bitcode file at `path`.
///
/// The size is taken from the file's metadata up front; an empty file is
/// rejected, and a file that yields fewer bytes than its size is rejected as
/// a short read.
pub fn read_bitcode(path: &Path) -> Result<Vec<u8>, JitError> {
    let open_error = |reason: String| JitError::BitcodeOpen {
        path: path.to_path_buf(),
        reason,
    };
    let mut file = File::open(path).map_err(|e| open_error(e.to_string()))?;
    let expected = file.metadata().map_err(|e| open_error(e.to_string()))?.len();
    if expected == 0 {
        return Err(JitError::EmptyBitcode(path.to_path_buf()));
    }

    let capacity = usize::try_from(expected).map_err(|_| open_error("file too large".into()))?;
    let mut bytes = vec![0u8; capacity];
    file.read_exact(&mut bytes).map_err(|_| JitError::ShortRead {
        path: path.to_path_buf(),
        expected,
    })?;
    Ok(bytes)
}

/// Load the module stored at `path` into `context`.
pub fn load_module(
    context: &LlvmContext,
    path: &Path,
    buffer_name: &str,
) -> Result<OwnedModule, JitError> {
    let bytes = read_bitcode(path)?;
    tracing::debug!(path = %path.display(), size = bytes.len(), "read pre-built bitcode");

    let module = context.parse_ir(&bytes, buffer_name).inspect_err(|e| {
        tracing::error!(path = %path.display(), error = %e, "jit: error loading pre-built module");
    })?;
    drop(bytes);

    tracing::debug!(
        path = %path.display(),
        functions = module.view().defined_functions().len(),
        "parsed pre-built module"
    );
    Ok(module)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_read_bitcode_returns_full_contents() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"\x42\x43\xc0\xde payload").unwrap();
        let bytes = read_bitcode(file.path()).unwrap();
        assert_eq!(bytes, b"\x42\x43\xc0\xde payload");
    }

    #[test]
    fn test_read_missing_file() {
        let dir = tempfile::tempdir().unwrap();
        let missing = dir.path().join("d.bc");
        match read_bitcode(&missing).unwrap_err() {
            JitError::BitcodeOpen { path, .. } => assert_eq!(path, missing),
            other => panic!("expected BitcodeOpen, got {other:?}"),
        }
    }

    #[test]
    fn test_read_empty_file() {
        let file = tempfile::NamedTempFile::new().unwrap();
        assert!(matches!(
            read_bitcode(file.path()),
            Err(JitError::EmptyBitcode(_))
        ));
    }

    #[test]
    fn test_read_directory_fails() {
        let dir = tempfile::tempdir().unwrap();
        assert!(read_bitcode(dir.path()).is_err());
    }
}
