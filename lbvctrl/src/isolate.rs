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

//! Isolate lifecycle. Everything the native library does happens
//! inside a Graal isolate; one must be created before any other call
//! and torn down when the caller is finished with the library.

use std::ffi::CString;
use std::path::Path;
use std::ptr;
use std::sync::Arc;

use libloading::Symbol;

use crate::error::LbvError;
use crate::ffi::{
    GetErrorCodeFn, GraalCreateIsolateFn, GraalIsolate, GraalIsolateThread,
    GraalTearDownIsolateFn, Lbv, SetConfigurationSearchPathFn,
};

/// An attached native execution context. Not `Send`: the isolate
/// thread is bound to the OS thread that created it.
pub struct Isolate {
    lbv: Arc<Lbv>,
    isolate: *mut GraalIsolate,
    thread: *mut GraalIsolateThread,
    torn_down: bool,
}

impl Isolate {
    pub fn new(lbv: Arc<Lbv>) -> Result<Isolate, LbvError> {
        let create: Symbol<GraalCreateIsolateFn> = lbv.sym("graal_create_isolate")?;

        let mut isolate: *mut GraalIsolate = ptr::null_mut();
        let mut thread: *mut GraalIsolateThread = ptr::null_mut();
        let status = unsafe { create(ptr::null_mut(), &mut isolate, &mut thread) };
        if status != 0 {
            return Err(LbvError::IsolateCreate { status });
        }

        log::debug!("created isolate {:p} (thread {:p})", isolate, thread);
        Ok(Isolate {
            lbv,
            isolate,
            thread,
            torn_down: false,
        })
    }

    pub(crate) fn lbv(&self) -> &Lbv {
        &self.lbv
    }

    pub(crate) fn thread(&self) -> *mut GraalIsolateThread {
        self.thread
    }

    /// Last error code recorded by the native library for this
    /// isolate thread.
    pub fn last_error_code(&self) -> Result<i32, LbvError> {
        let f: Symbol<GetErrorCodeFn> = self.lbv.sym("get_error_code")?;
        Ok(unsafe { f(self.thread) })
    }

    /// Tells the native library where to look for configuration files
    /// referenced by name.
    pub fn set_configuration_search_path(&self, path: &Path) -> Result<(), LbvError> {
        let f: Symbol<SetConfigurationSearchPathFn> =
            self.lbv.sym("set_configuration_search_path")?;
        let c_path = path_cstring(path)?;
        let status = unsafe { f(self.thread, c_path.as_ptr()) };
        if status != 0 {
            return Err(LbvError::NativeCall {
                call: "set_configuration_search_path".to_string(),
                status,
            });
        }
        Ok(())
    }

    /// Detaches all threads and tears the isolate down, reporting the
    /// native status. Dropping the isolate does the same with a logged
    /// warning instead.
    pub fn teardown(mut self) -> Result<(), LbvError> {
        self.teardown_inner()
    }

    fn teardown_inner(&mut self) -> Result<(), LbvError> {
        if self.torn_down {
            return Ok(());
        }
        self.torn_down = true;

        let teardown: Symbol<GraalTearDownIsolateFn> = self
            .lbv
            .sym("graal_detach_all_threads_and_tear_down_isolate")?;
        let status = unsafe { teardown(self.thread) };
        if status != 0 {
            return Err(LbvError::IsolateTeardown { status });
        }
        log::debug!("tore down isolate {:p}", self.isolate);
        Ok(())
    }
}

impl Drop for Isolate {
    fn drop(&mut self) {
        if let Err(e) = self.teardown_inner() {
            log::warn!("isolate teardown failed: {}", e);
        }
    }
}

pub(crate) fn path_cstring(path: &Path) -> Result<CString, LbvError> {
    match CString::new(path.to_string_lossy().as_bytes()) {
        Ok(x) => Ok(x),
        Err(_) => Err(LbvError::BadParameter {
            msg: format!("path contains a NUL byte: {}", path.display()),
        }),
    }
}
