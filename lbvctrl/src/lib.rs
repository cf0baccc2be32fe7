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

//! Control layer for the `lbv` native tunnel library.
//!
//! The native library does the heavy lifting (handshake, packet routing,
//! interface management); this crate keeps the foreign boundary safe: it
//! loads the library, owns the isolate lifecycle, marshals wg-quick style
//! configurations and turns raw status codes into proper `Result`s.

pub mod config;
pub mod error;
pub mod ffi;
pub mod isolate;
pub mod keys;
pub mod tunnel;

pub use config::{Endpoint, InterfaceConfig, PeerConfig, VpnConfiguration};
pub use error::LbvError;
pub use ffi::Lbv;
pub use isolate::Isolate;
pub use keys::Key;
pub use tunnel::Tunnel;
