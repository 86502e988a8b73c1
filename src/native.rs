//! [`NativeAllocator`] backed by entry points exported from a loaded native library.

use crate::{buffer::NativeAllocator, config::AllocatorConfig, error::NativeLibraryError};
use libffi::middle::*;
use libloading::{Library, Symbol};
use std::{
    ffi::c_void,
    path::{Path, PathBuf},
    ptr,
};
use tracing::{debug, warn};

/// Calls `void* alloc(int32_t)` and `void free(void*)` through libffi.
pub struct LibraryAllocator {
    name: String,
    alloc: CodePtr,
    free: CodePtr,
    alloc_cif: Cif,
    free_cif: Cif,
    // last, so both code pointers are dropped before the library is unloaded
    _library: Library,
}

impl LibraryAllocator {
    pub fn load(config: &AllocatorConfig) -> Result<Self, NativeLibraryError> {
        let name = config.library.as_str();
        let path = find_library_path(&config.search_root, name)
            .ok_or_else(|| NativeLibraryError::LibraryNotFound(name.to_string()))?;

        debug!(library = name, ?path, "loading native allocator");
        let library = unsafe { Library::new(&path) }
            .map_err(|e| NativeLibraryError::LoadError(name.to_string(), e.to_string()))?;

        let alloc = entry_point(&library, name, &config.alloc_symbol)?;
        let free = entry_point(&library, name, &config.free_symbol)?;

        Ok(Self {
            name: name.to_string(),
            alloc,
            free,
            alloc_cif: Cif::new([Type::i32()], Type::pointer()),
            free_cif: Cif::new([Type::pointer()], Type::void()),
            _library: library,
        })
    }

    pub fn library_name(&self) -> &str {
        &self.name
    }
}

fn entry_point(library: &Library, name: &str, symbol: &str) -> Result<CodePtr, NativeLibraryError> {
    let sym: Symbol<unsafe extern "C" fn()> = unsafe { library.get(symbol.as_bytes()) }
        .map_err(|_| NativeLibraryError::SymbolNotFound(name.to_string(), symbol.to_string()))?;
    Ok(CodePtr::from_fun(*sym))
}

impl NativeAllocator for LibraryAllocator {
    fn alloc_raw(&self, byte_count: u32) -> *mut u8 {
        // the native entry point takes a signed 32-bit size
        let Ok(size) = i32::try_from(byte_count) else {
            warn!(byte_count, library = %self.name, "size does not fit the native allocator");
            return ptr::null_mut();
        };
        let payload: *mut c_void = unsafe { self.alloc_cif.call(self.alloc, &[Arg::new(&size)]) };
        payload.cast()
    }

    unsafe fn free_raw(&self, payload: *mut u8) {
        let payload = payload.cast::<c_void>();
        self.free_cif.call::<()>(self.free, &[Arg::new(&payload)]);
    }
}

/// Looks for `name` under `root`: exact file name, then with each platform
/// extension, then a versioned shared object such as `libfoo.so.1`.
pub fn find_library_path(root: &Path, name: &str) -> Option<PathBuf> {
    let exact = root.join(name);
    if exact.is_file() {
        return Some(exact);
    }

    #[cfg(target_os = "macos")]
    let extensions = &[".dylib", ".so", ".dll"];
    #[cfg(target_os = "windows")]
    let extensions = &[".dll", ".so", ".dylib"];
    #[cfg(not(any(target_os = "macos", target_os = "windows")))]
    let extensions = &[".so", ".dylib", ".dll"];

    if let Some(path) = extensions
        .iter()
        .map(|ext| root.join(format!("{name}{ext}")))
        .find(|path| path.is_file())
    {
        return Some(path);
    }

    let entries = root.read_dir().ok()?;
    entries.filter_map(Result::ok).find_map(|entry| {
        let file_name = entry.file_name();
        let s = file_name.to_string_lossy();
        (s.starts_with(name) && (s.contains(".so.") || s.contains(".dylib."))).then(|| entry.path())
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;

    fn scratch_dir(tag: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("interop-rs-{tag}-{}", std::process::id()));
        let _ = fs::remove_dir_all(&dir);
        fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_find_library_prefers_platform_extension() {
        let dir = scratch_dir("ext");
        let file = if cfg!(target_os = "windows") {
            "Urho3D.dll"
        } else if cfg!(target_os = "macos") {
            "Urho3D.dylib"
        } else {
            "Urho3D.so"
        };
        fs::write(dir.join(file), b"").unwrap();

        assert_eq!(find_library_path(&dir, "Urho3D"), Some(dir.join(file)));
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_find_library_versioned() {
        let dir = scratch_dir("versioned");
        fs::write(dir.join("libUrho3D.so.1.8"), b"").unwrap();

        assert_eq!(
            find_library_path(&dir, "libUrho3D"),
            Some(dir.join("libUrho3D.so.1.8"))
        );
        assert_eq!(find_library_path(&dir, "libMissing"), None);
        fs::remove_dir_all(&dir).unwrap();
    }

    #[test]
    fn test_load_reports_missing_library() {
        let dir = scratch_dir("missing");
        let config = AllocatorConfig::new("libNothingHere").with_search_root(&dir);
        assert!(matches!(
            LibraryAllocator::load(&config),
            Err(NativeLibraryError::LibraryNotFound(name)) if name == "libNothingHere"
        ));
        fs::remove_dir_all(&dir).unwrap();
    }
}
