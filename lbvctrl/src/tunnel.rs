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

//! Tunnel bring-up and teardown. The native `up` call returns a
//! positive tunnel handle on success and 0 on failure, with the
//! actual error code retrievable per isolate thread; this module maps
//! that convention onto `Result` and a scoped handle type.

use std::ffi::CString;
use std::path::Path;

use libloading::Symbol;

use crate::config::VpnConfiguration;
use crate::error::LbvError;
use crate::ffi::{DownFn, StopFn, UpFn};
use crate::isolate::{path_cstring, Isolate};

impl Isolate {
    /// Brings a tunnel up from a typed configuration.
    pub fn up(&self, cfg: &VpnConfiguration) -> Result<Tunnel<'_>, LbvError> {
        self.up_conf(&cfg.to_string(), 0, 0)
    }

    /// Brings a tunnel up from raw configuration text. The two handle
    /// arguments are passed through to the native call; every known
    /// caller passes 0 and lets the library build its own system
    /// configuration and context.
    pub fn up_conf(
        &self,
        conf: &str,
        systemconf_handle: i64,
        context_handle: i64,
    ) -> Result<Tunnel<'_>, LbvError> {
        let up: Symbol<UpFn> = self.lbv().sym("up")?;
        let c_conf = match CString::new(conf) {
            Ok(x) => x,
            Err(_) => {
                return Err(LbvError::BadParameter {
                    msg: "configuration text contains a NUL byte".to_string(),
                })
            }
        };

        log::trace!("up: {} bytes of configuration", conf.len());
        let handle =
            unsafe { up(self.thread(), c_conf.as_ptr(), systemconf_handle, context_handle) };
        if handle <= 0 {
            let code = self.last_error_code()?;
            return Err(LbvError::TunnelUp { code });
        }

        log::info!("tunnel up (handle {})", handle);
        Ok(Tunnel {
            isolate: self,
            handle,
            active: true,
        })
    }

    /// Brings down the tunnel previously started from the given
    /// configuration file, without needing its handle.
    pub fn stop(&self, conf_path: &Path) -> Result<(), LbvError> {
        let stop: Symbol<StopFn> = self.lbv().sym("stop")?;
        let c_path = path_cstring(conf_path)?;
        let status = unsafe { stop(self.thread(), c_path.as_ptr(), 0, 0) };
        if status != 0 {
            let code = self.last_error_code()?;
            return Err(LbvError::TunnelDown { status, code });
        }
        log::info!("tunnel for {} down", conf_path.display());
        Ok(())
    }
}

/// A running tunnel. Dropping it brings the tunnel down (best effort,
/// logged); call [`Tunnel::down`] for the status or [`Tunnel::leak`]
/// to let the tunnel outlive this process.
pub struct Tunnel<'a> {
    isolate: &'a Isolate,
    handle: i64,
    active: bool,
}

impl<'a> Tunnel<'a> {
    pub fn handle(&self) -> i64 {
        self.handle
    }

    pub fn down(mut self) -> Result<(), LbvError> {
        self.down_inner()
    }

    /// Releases ownership without bringing the tunnel down.
    pub fn leak(mut self) -> i64 {
        self.active = false;
        self.handle
    }

    fn down_inner(&mut self) -> Result<(), LbvError> {
        if !self.active {
            return Ok(());
        }
        self.active = false;

        let down: Symbol<DownFn> = self.isolate.lbv().sym("down")?;
        let status = unsafe { down(self.isolate.thread(), self.handle) };
        if status != 0 {
            let code = self.isolate.last_error_code()?;
            return Err(LbvError::TunnelDown { status, code });
        }
        log::info!("tunnel down (handle {})", self.handle);
        Ok(())
    }
}

impl Drop for Tunnel<'_> {
    fn drop(&mut self) {
        if let Err(e) = self.down_inner() {
            log::warn!("teardown of tunnel {} failed: {}", self.handle, e);
        }
    }
}
