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

use std::convert::TryInto;
use std::fmt;
use std::str::FromStr;

// Raw crypto primitives
use curve25519_dalek::constants::ED25519_BASEPOINT_TABLE;
use curve25519_dalek::scalar::Scalar;
use rand_core::{OsRng, RngCore};

use crate::error::LbvError;

pub const KEY_LEN: usize = 32;

/// A WireGuard-style key: 32 raw bytes, base64 on the wire and in
/// configuration files. The same shape serves private, public and
/// preshared keys.
#[derive(Clone, PartialEq, Eq, Hash)]
pub struct Key([u8; KEY_LEN]);

fn clamp(mut raw: [u8; KEY_LEN]) -> [u8; KEY_LEN] {
    raw[0] &= 248;
    raw[31] &= 127;
    raw[31] |= 64;
    raw
}

impl Key {
    pub fn from_bytes(raw: [u8; KEY_LEN]) -> Key {
        Key(raw)
    }

    pub fn from_base64(b64: &str) -> Result<Key, LbvError> {
        let bytes = match base64::decode(b64) {
            Ok(x) => x,
            Err(_) => {
                return Err(LbvError::BadParameter {
                    msg: "key is not in b64 format".to_string(),
                })
            }
        };

        match bytes.as_slice().try_into() {
            Ok(raw) => Ok(Key(raw)),
            Err(_) => Err(LbvError::BadParameter {
                msg: format!("key has wrong size ({} bytes)", bytes.len()),
            }),
        }
    }

    pub fn to_base64(&self) -> String {
        base64::encode(self.0)
    }

    pub fn as_bytes(&self) -> &[u8; KEY_LEN] {
        &self.0
    }

    /// Generates a new clamped Curve25519 private key.
    pub fn generate_private() -> Key {
        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        Key(clamp(raw))
    }

    /// Generates a preshared key. Plain random bytes, no clamping.
    pub fn generate_preshared() -> Key {
        let mut raw = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut raw);
        Key(raw)
    }

    /// Derives the X25519 public key, treating `self` as a private key.
    pub fn public_key(&self) -> Key {
        // Clamp before multiplying; stored private keys are not
        // necessarily clamped.
        let scalar = Scalar::from_bits(clamp(self.0));
        let point = (&ED25519_BASEPOINT_TABLE * &scalar).to_montgomery();
        Key(point.to_bytes())
    }
}

impl FromStr for Key {
    type Err = LbvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Key::from_base64(s)
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "{}", self.to_base64())
    }
}

impl fmt::Debug for Key {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        write!(f, "Key({})", self.to_base64())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn test_pubkey_normal() {
        let privk = Key::from_base64("ADD7fFbGmA0TqivcbwW7RACosgn2ZqK5uDSijvUul2c=").unwrap();
        assert_eq!(
            privk.public_key().to_base64(),
            "LCBsla9u/BT2i9yYKqCi6yHh2nKvvdgyMPVYCkLh/3Y="
        );
    }

    #[test]
    fn test_pubkey_clamp() {
        let privk = Key::from_base64("gGHF8XEpNKEnzIjoQNs6CRy5bVBTR8ZMcWbFckkWiv8=").unwrap();
        assert_eq!(
            privk.public_key().to_base64(),
            "zxUOG5Sb+wZY70iCiK5R4oeTuf1IC/e1whg8GkHl5hI="
        );
    }

    #[test]
    fn test_base64_roundtrip() {
        let key = Key::generate_preshared();
        assert_eq!(Key::from_base64(&key.to_base64()).unwrap(), key);
    }

    #[test]
    fn test_generated_private_is_clamped() {
        let key = Key::generate_private();
        let raw = key.as_bytes();
        assert_eq!(raw[0] & 7, 0);
        assert_eq!(raw[31] & 128, 0);
        assert_eq!(raw[31] & 64, 64);
    }

    #[test]
    fn test_wrong_size() {
        assert!(Key::from_base64("aGVsbG8=").is_err());
        assert!(Key::from_base64("not base64 at all!").is_err());
    }
}
