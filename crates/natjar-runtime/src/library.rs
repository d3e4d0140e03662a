//! Dynamic library loading for extracted native artifacts
//!
//! Cross-platform support for loading shared libraries (.so, .dylib, .dll).
//! Dropping a handle unloads the library. A `NativeLoader` owns the handle of
//! the artifact it loaded, so the artifact stays mapped for as long as that
//! loader lives; keep the loader in a `static` to pin it for the process.

use std::ffi::{CStr, CString};
use std::path::{Path, PathBuf};

use crate::error::LoadError;

/// A shared library that has been mapped into the process
pub trait LoadedLibrary: Send + Sync {
    /// Path the library was loaded from
    fn path(&self) -> &Path;

    /// Whether the library exports `symbol`
    fn has_symbol(&self, symbol: &str) -> bool;
}

/// Strategy for mapping an extracted artifact into the process
pub trait LibraryOpener: Send + Sync {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, LoadError>;
}

/// Opens libraries with the platform loader (`dlopen` / `LoadLibraryW`)
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemOpener;

impl LibraryOpener for SystemOpener {
    fn open(&self, path: &Path) -> Result<Box<dyn LoadedLibrary>, LoadError> {
        Ok(Box::new(Library::open(path)?))
    }
}

/// Cross-platform dynamic library handle
pub struct Library {
    handle: LibraryHandle,
    path: PathBuf,
}

impl Library {
    /// Load a dynamic library from the given path.
    ///
    /// # Platform-specific behavior
    ///
    /// - **Linux / macOS**: `dlopen(RTLD_NOW | RTLD_LOCAL)`
    /// - **Windows**: `LoadLibraryW`
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self, LoadError> {
        let path_ref = path.as_ref();
        let path_str = path_ref
            .to_str()
            .ok_or_else(|| LoadError::InvalidPath(format!("{:?}", path_ref)))?;

        let handle = LibraryHandle::load(path_str)?;

        Ok(Library {
            handle,
            path: path_ref.to_path_buf(),
        })
    }

    /// Address of an exported symbol
    pub fn symbol(&self, name: &str) -> Result<*mut std::ffi::c_void, LoadError> {
        let path = self.path.to_string_lossy();
        unsafe { self.handle.symbol(name, &path) }
    }
}

impl LoadedLibrary for Library {
    fn path(&self) -> &Path {
        &self.path
    }

    fn has_symbol(&self, symbol: &str) -> bool {
        self.symbol(symbol).is_ok()
    }
}

#[cfg(unix)]
type LibraryHandle = UnixLibrary;

#[cfg(windows)]
type LibraryHandle = WindowsLibrary;

// ============================================================================
// Unix Implementation (Linux, macOS, BSD)
// ============================================================================

#[cfg(unix)]
struct UnixLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(unix)]
impl UnixLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        let c_path = CString::new(path)
            .map_err(|e| LoadError::PlatformError(format!("Invalid path: {}", e)))?;

        // RTLD_NOW so unresolved JNI imports fail here rather than on first call
        let handle = unsafe { libc::dlopen(c_path.as_ptr(), libc::RTLD_NOW | libc::RTLD_LOCAL) };

        if handle.is_null() {
            return Err(LoadError::NotFound {
                path: format!("{}: {}", path, last_dl_error()),
            });
        }

        Ok(UnixLibrary { handle })
    }

    unsafe fn symbol(&self, name: &str, lib_path: &str) -> Result<*mut std::ffi::c_void, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("Invalid symbol name: {}", e)))?;

        libc::dlerror();
        let symbol = libc::dlsym(self.handle, c_name.as_ptr());

        let err_ptr = libc::dlerror();
        if !err_ptr.is_null() || symbol.is_null() {
            let detail = if err_ptr.is_null() {
                lib_path.to_string()
            } else {
                format!("{}: {}", lib_path, CStr::from_ptr(err_ptr).to_string_lossy())
            };
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: detail,
            });
        }

        Ok(symbol)
    }
}

#[cfg(unix)]
fn last_dl_error() -> String {
    unsafe {
        let err_ptr = libc::dlerror();
        if err_ptr.is_null() {
            "Unknown error".to_string()
        } else {
            CStr::from_ptr(err_ptr).to_string_lossy().into_owned()
        }
    }
}

#[cfg(unix)]
impl Drop for UnixLibrary {
    fn drop(&mut self) {
        unsafe {
            libc::dlclose(self.handle);
        }
    }
}

#[cfg(unix)]
unsafe impl Send for UnixLibrary {}
#[cfg(unix)]
unsafe impl Sync for UnixLibrary {}

// ============================================================================
// Windows Implementation
// ============================================================================

#[cfg(windows)]
struct WindowsLibrary {
    handle: *mut std::ffi::c_void,
}

#[cfg(windows)]
impl WindowsLibrary {
    fn load(path: &str) -> Result<Self, LoadError> {
        use std::ffi::OsStr;
        use std::os::windows::ffi::OsStrExt;

        let wide: Vec<u16> = OsStr::new(path)
            .encode_wide()
            .chain(std::iter::once(0))
            .collect();

        let handle = unsafe { LoadLibraryW(wide.as_ptr()) };

        if handle.is_null() {
            let error = unsafe { GetLastError() };
            return Err(LoadError::NotFound {
                path: format!("{} (error code: {})", path, error),
            });
        }

        Ok(WindowsLibrary { handle })
    }

    unsafe fn symbol(&self, name: &str, lib_path: &str) -> Result<*mut std::ffi::c_void, LoadError> {
        let c_name = CString::new(name)
            .map_err(|e| LoadError::PlatformError(format!("Invalid symbol name: {}", e)))?;

        let symbol = GetProcAddress(self.handle, c_name.as_ptr());

        if symbol.is_null() {
            let error = GetLastError();
            return Err(LoadError::SymbolNotFound {
                symbol: name.to_string(),
                library: format!("{} (error code: {})", lib_path, error),
            });
        }

        Ok(symbol)
    }
}

#[cfg(windows)]
impl Drop for WindowsLibrary {
    fn drop(&mut self) {
        unsafe {
            FreeLibrary(self.handle);
        }
    }
}

#[cfg(windows)]
unsafe impl Send for WindowsLibrary {}
#[cfg(windows)]
unsafe impl Sync for WindowsLibrary {}

#[cfg(windows)]
extern "system" {
    fn LoadLibraryW(filename: *const u16) -> *mut std::ffi::c_void;
    fn GetProcAddress(
        module: *mut std::ffi::c_void,
        procname: *const std::ffi::c_char,
    ) -> *mut std::ffi::c_void;
    fn FreeLibrary(module: *mut std::ffi::c_void) -> i32;
    fn GetLastError() -> u32;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_library_not_found() {
        let result = Library::open("/nonexistent/natjar/linux64.so");
        match result {
            Err(LoadError::NotFound { path }) => assert!(path.contains("linux64.so")),
            Err(other) => panic!("Expected NotFound error, got {other}"),
            Ok(_) => panic!("Expected NotFound error"),
        }
    }

    #[test]
    fn test_system_opener_propagates_failure() {
        let result = SystemOpener.open(Path::new("/nonexistent/natjar/win64.dll"));
        assert!(matches!(result, Err(LoadError::NotFound { .. })));
    }
}
