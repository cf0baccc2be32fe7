/*
 * SPDX-License-Identifier: GPL-3.0-or-later
 *
 * This program is free software: you can redistribute it and/or modify
 * it under the terms of the GNU General Public License as published by
 * the Free Software Foundation, either version 3 of the License, or
 * (at your option) any later version.
 *
 * This program is distributed in the hope that it will be useful, but
 * WITHOUT ANY WARRANTY; without even the implied warranty of
 * MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE. See the GNU
 * General Public License for more details.
 *
 * You should have received a copy of the GNU General Public License
 * along with this program. If not, see <http://www.gnu.org/licenses/>.
 */

//! Raw surface of the `lbv` native library. The library is a
//! GraalVM-native image: every exported call takes an isolate thread
//! as its first argument, and the isolate entry points follow the
//! standard Graal C API.

use std::collections::HashMap;
use std::env;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use lazy_static::lazy_static;
use libc::{c_char, c_int, c_longlong};
use libloading::{Library, Symbol};
use parking_lot::Mutex;

use crate::error::LbvError;

#[cfg(target_os = "linux")]
pub const LIBRARY_NAME: &str = "liblbv.so";
#[cfg(target_os = "macos")]
pub const LIBRARY_NAME: &str = "liblbv.dylib";
#[cfg(target_os = "windows")]
pub const LIBRARY_NAME: &str = "lbv.dll";

// Opaque Graal runtime handles.
#[repr(C)]
pub struct GraalIsolate {
    _private: [u8; 0],
}

#[repr(C)]
pub struct GraalIsolateThread {
    _private: [u8; 0],
}

#[repr(C)]
pub struct GraalCreateIsolateParams {
    pub version: c_int,
    pub reserved_address_space_size: c_longlong,
    pub auxiliary_image_path: *const c_char,
    pub auxiliary_image_reserved_space_size: c_longlong,
}

pub type GraalCreateIsolateFn = unsafe extern "C" fn(
    *mut GraalCreateIsolateParams,
    *mut *mut GraalIsolate,
    *mut *mut GraalIsolateThread,
) -> c_int;
pub type GraalTearDownIsolateFn = unsafe extern "C" fn(*mut GraalIsolateThread) -> c_int;
pub type UpFn = unsafe extern "C" fn(
    *mut GraalIsolateThread,
    *const c_char,
    c_longlong,
    c_longlong,
) -> c_longlong;
pub type DownFn = unsafe extern "C" fn(*mut GraalIsolateThread, c_longlong) -> c_int;
pub type StopFn = unsafe extern "C" fn(
    *mut GraalIsolateThread,
    *const c_char,
    c_longlong,
    c_longlong,
) -> c_int;
pub type GetErrorCodeFn = unsafe extern "C" fn(*mut GraalIsolateThread) -> c_int;
pub type SetConfigurationSearchPathFn =
    unsafe extern "C" fn(*mut GraalIsolateThread, *const c_char) -> c_int;

lazy_static! {
    // One handle per library path for the lifetime of the process.
    static ref LOADED: Mutex<HashMap<PathBuf, Arc<Lbv>>> = Mutex::new(HashMap::new());
}

/// A loaded copy of the native tunnel library.
pub struct Lbv {
    lib: Library,
    path: PathBuf,
}

impl Lbv {
    /// Loads the library from an explicit path. Handles are cached, so
    /// loading the same path twice returns the same copy.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Arc<Lbv>, LbvError> {
        let path = path.as_ref().to_path_buf();
        let mut loaded = LOADED.lock();
        if let Some(lbv) = loaded.get(&path) {
            return Ok(lbv.clone());
        }

        let lib = match unsafe { Library::new(&path) } {
            Ok(x) => x,
            Err(e) => {
                return Err(LbvError::LibraryLoad {
                    msg: format!("{}: {}", path.display(), e),
                })
            }
        };
        log::debug!("loaded tunnel library from {}", path.display());

        let lbv = Arc::new(Lbv {
            lib,
            path: path.clone(),
        });
        loaded.insert(path, lbv.clone());
        Ok(lbv)
    }

    /// Loads the library from its default location, next to the
    /// current executable.
    pub fn load_default() -> Result<Arc<Lbv>, LbvError> {
        Self::load(default_library_path())
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub(crate) fn sym<T>(&self, name: &str) -> Result<Symbol<T>, LbvError> {
        let mut raw = name.as_bytes().to_vec();
        raw.push(0);
        match unsafe { self.lib.get(&raw) } {
            Ok(x) => Ok(x),
            Err(_) => Err(LbvError::SymbolNotFound {
                name: name.to_string(),
            }),
        }
    }
}

impl fmt::Debug for Lbv {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Lbv({})", self.path.display())
    }
}

pub fn default_library_path() -> PathBuf {
    match env::current_exe() {
        Ok(mut path) => {
            path.pop();
            path.push(LIBRARY_NAME);
            path
        }
        Err(_) => PathBuf::from(LIBRARY_NAME),
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_load_missing_library() {
        let res = Lbv::load("/nonexistent/liblbv.so");
        match res {
            Err(LbvError::LibraryLoad { .. }) => {}
            other => panic!("expected LibraryLoad error, got {:?}", other),
        }
    }

    #[test]
    fn test_default_library_path() {
        let path = default_library_path();
        assert_eq!(
            path.file_name().and_then(|x| x.to_str()),
            Some(LIBRARY_NAME)
        );
    }
}
