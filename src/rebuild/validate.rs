//! Post-build checks on the produced executable

use std::path::Path;
use tracing::{debug, warn};

use crate::error::ValidationError;

/// Check that `path` is a regular file this process may execute. Grants
/// execute permission once if it is missing.
pub fn validate_executable(path: &Path) -> Result<(), ValidationError> {
    let meta = std::fs::metadata(path).map_err(|source| ValidationError::Missing {
        path: path.to_path_buf(),
        source,
    })?;
    if !meta.is_file() {
        return Err(ValidationError::NotAFile {
            path: path.to_path_buf(),
        });
    }

    if is_executable(path) {
        debug!("Executable {:?} validated", path);
        return Ok(());
    }

    warn!("Built executable {:?} is not executable, attempting permission fix-up", path);
    if let Err(e) = grant_execute(path) {
        return Err(ValidationError::NotExecutable {
            path: path.to_path_buf(),
            reason: e.to_string(),
        });
    }

    if is_executable(path) {
        Ok(())
    } else {
        Err(ValidationError::NotExecutable {
            path: path.to_path_buf(),
            reason: "still not executable after chmod".to_string(),
        })
    }
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::ffi::OsStrExt;

    let Ok(c_path) = std::ffi::CString::new(path.as_os_str().as_bytes()) else {
        return false;
    };
    // SAFETY: c_path is a valid NUL-terminated string for the duration of the call
    unsafe { libc::access(c_path.as_ptr(), libc::X_OK) == 0 }
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

#[cfg(unix)]
fn grant_execute(path: &Path) -> std::io::Result<()> {
    use std::os::unix::fs::PermissionsExt;

    let mode = std::fs::metadata(path)?.permissions().mode();
    std::fs::set_permissions(path, std::fs::Permissions::from_mode(mode | 0o755))
}

#[cfg(not(unix))]
fn grant_execute(_path: &Path) -> std::io::Result<()> {
    Ok(())
}
