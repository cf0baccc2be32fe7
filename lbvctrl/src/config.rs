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

//! wg-quick style configuration model: `[Interface]` and `[Peer]`
//! sections, parsed into typed values and rendered back to canonical
//! `.conf` text for the native `up` call.

use std::fmt;
use std::fs;
use std::net::{IpAddr, Ipv6Addr};
use std::path::Path;
use std::str::FromStr;

use ipnet::IpNet;
use lazy_static::lazy_static;
use regex::Regex;

use crate::error::LbvError;
use crate::keys::Key;

/// Port assumed for a peer endpoint given without one.
pub const DEFAULT_PORT: u16 = 51820;

lazy_static! {
    static ref SECTION_RE: Regex = Regex::new(r"^\[([^\]]+)\]$").unwrap();
    static ref KEYVAL_RE: Regex = Regex::new(r"^([A-Za-z][A-Za-z0-9]*)\s*=\s*(.*)$").unwrap();
}

/// A peer endpoint: `host:port`, where the host may be a hostname, an
/// IPv4 address or a bracketed IPv6 address. A missing port means the
/// WireGuard default.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    pub host: String,
    pub port: u16,
}

impl FromStr for Endpoint {
    type Err = LbvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let bad = || LbvError::InvalidConfiguration {
            msg: format!("invalid endpoint '{}'", s),
        };

        if let Some(rest) = s.strip_prefix('[') {
            // Bracketed IPv6: [host]:port or [host]
            let (host, tail) = rest.split_once(']').ok_or_else(bad)?;
            let port = match tail.strip_prefix(':') {
                Some(p) => p.parse().map_err(|_| bad())?,
                None if tail.is_empty() => DEFAULT_PORT,
                None => return Err(bad()),
            };
            if host.parse::<Ipv6Addr>().is_err() {
                return Err(bad());
            }
            return Ok(Endpoint {
                host: host.to_string(),
                port,
            });
        }

        match s.matches(':').count() {
            0 => Ok(Endpoint {
                host: s.to_string(),
                port: DEFAULT_PORT,
            }),
            1 => {
                let (host, port) = s.split_once(':').ok_or_else(bad)?;
                if host.is_empty() {
                    return Err(bad());
                }
                Ok(Endpoint {
                    host: host.to_string(),
                    port: port.parse().map_err(|_| bad())?,
                })
            }
            // More than one colon and no brackets: a bare IPv6 address.
            _ => {
                if s.parse::<Ipv6Addr>().is_err() {
                    return Err(bad());
                }
                Ok(Endpoint {
                    host: s.to_string(),
                    port: DEFAULT_PORT,
                })
            }
        }
    }
}

impl fmt::Display for Endpoint {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        if self.host.parse::<Ipv6Addr>().is_ok() {
            write!(f, "[{}]:{}", self.host, self.port)
        } else {
            write!(f, "{}:{}", self.host, self.port)
        }
    }
}

/// Parses a CIDR, accepting a bare address as a full-length prefix the
/// way wg-quick does (`172.16.11.1` == `172.16.11.1/32`).
fn parse_cidr(s: &str) -> Result<IpNet, LbvError> {
    if let Ok(net) = s.parse::<IpNet>() {
        return Ok(net);
    }

    let addr: IpAddr = match s.parse() {
        Ok(x) => x,
        Err(_) => {
            return Err(LbvError::InvalidConfiguration {
                msg: format!("invalid address or CIDR '{}'", s),
            })
        }
    };

    let prefix = if addr.is_ipv4() { 32 } else { 128 };
    IpNet::new(addr, prefix).map_err(|_| LbvError::InvalidConfiguration {
        msg: format!("invalid address '{}'", s),
    })
}

#[derive(Debug, Clone, PartialEq)]
pub struct InterfaceConfig {
    pub private_key: Key,
    pub addresses: Vec<IpNet>,
    /// DNS entries may be resolver addresses or search-domain hostnames.
    pub dns: Vec<String>,
    pub listen_port: Option<u16>,
    pub mtu: Option<u32>,
    pub fwmark: Option<u32>,
    pub table: Option<String>,
    pub pre_up: Vec<String>,
    pub post_up: Vec<String>,
    pub pre_down: Vec<String>,
    pub post_down: Vec<String>,
    pub save_config: bool,
}

impl InterfaceConfig {
    pub fn new(private_key: Key) -> InterfaceConfig {
        InterfaceConfig {
            private_key,
            addresses: vec![],
            dns: vec![],
            listen_port: None,
            mtu: None,
            fwmark: None,
            table: None,
            pre_up: vec![],
            post_up: vec![],
            pre_down: vec![],
            post_down: vec![],
            save_config: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct PeerConfig {
    pub public_key: Key,
    pub preshared_key: Option<Key>,
    pub endpoint: Option<Endpoint>,
    pub allowed_ips: Vec<IpNet>,
    pub persistent_keepalive: Option<u16>,
}

impl PeerConfig {
    pub fn new(public_key: Key) -> PeerConfig {
        PeerConfig {
            public_key,
            preshared_key: None,
            endpoint: None,
            allowed_ips: vec![],
            persistent_keepalive: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct VpnConfiguration {
    pub interface: InterfaceConfig,
    pub peers: Vec<PeerConfig>,
}

impl VpnConfiguration {
    pub fn new(interface: InterfaceConfig) -> VpnConfiguration {
        VpnConfiguration {
            interface,
            peers: vec![],
        }
    }

    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<VpnConfiguration, LbvError> {
        let text = match fs::read_to_string(path.as_ref()) {
            Ok(x) => x,
            Err(e) => {
                return Err(LbvError::BadParameter {
                    msg: format!("cannot read {}: {}", path.as_ref().display(), e),
                })
            }
        };
        text.parse()
    }
}

enum Section {
    None,
    Interface,
    Peer,
    Unknown,
}

// Parser state for the interface section; the private key is only
// known to be present once the whole file has been read.
struct InterfaceBuilder {
    private_key: Option<Key>,
    cfg: InterfaceConfig,
}

impl InterfaceBuilder {
    fn new() -> InterfaceBuilder {
        InterfaceBuilder {
            private_key: None,
            // Placeholder key, replaced on build.
            cfg: InterfaceConfig::new(Key::from_bytes([0u8; 32])),
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LbvError> {
        match key.to_ascii_lowercase().as_str() {
            "privatekey" => self.private_key = Some(Key::from_base64(value)?),
            "address" => {
                for part in split_list(value) {
                    self.cfg.addresses.push(parse_cidr(part)?);
                }
            }
            "dns" => {
                for part in split_list(value) {
                    self.cfg.dns.push(part.to_string());
                }
            }
            "listenport" => self.cfg.listen_port = Some(parse_num(key, value)?),
            "mtu" => self.cfg.mtu = Some(parse_num(key, value)?),
            "fwmark" => self.cfg.fwmark = Some(parse_num(key, value)?),
            "table" => self.cfg.table = Some(value.to_string()),
            "preup" => self.cfg.pre_up.push(value.to_string()),
            "postup" => self.cfg.post_up.push(value.to_string()),
            "predown" => self.cfg.pre_down.push(value.to_string()),
            "postdown" => self.cfg.post_down.push(value.to_string()),
            "saveconfig" => self.cfg.save_config = parse_bool(key, value)?,
            _ => log::debug!("ignoring unknown interface key '{}'", key),
        }
        Ok(())
    }

    fn build(self) -> Result<InterfaceConfig, LbvError> {
        match self.private_key {
            Some(private_key) => Ok(InterfaceConfig {
                private_key,
                ..self.cfg
            }),
            None => Err(LbvError::InvalidConfiguration {
                msg: "[Interface] has no PrivateKey".to_string(),
            }),
        }
    }
}

struct PeerBuilder {
    public_key: Option<Key>,
    preshared_key: Option<Key>,
    endpoint: Option<Endpoint>,
    allowed_ips: Vec<IpNet>,
    persistent_keepalive: Option<u16>,
}

impl PeerBuilder {
    fn new() -> PeerBuilder {
        PeerBuilder {
            public_key: None,
            preshared_key: None,
            endpoint: None,
            allowed_ips: vec![],
            persistent_keepalive: None,
        }
    }

    fn set(&mut self, key: &str, value: &str) -> Result<(), LbvError> {
        match key.to_ascii_lowercase().as_str() {
            "publickey" => self.public_key = Some(Key::from_base64(value)?),
            "presharedkey" => self.preshared_key = Some(Key::from_base64(value)?),
            "endpoint" => self.endpoint = Some(value.parse()?),
            "allowedips" => {
                for part in split_list(value) {
                    self.allowed_ips.push(parse_cidr(part)?);
                }
            }
            "persistentkeepalive" => {
                self.persistent_keepalive = match value {
                    "off" | "0" => None,
                    _ => Some(parse_num(key, value)?),
                }
            }
            _ => log::debug!("ignoring unknown peer key '{}'", key),
        }
        Ok(())
    }

    fn build(self) -> Result<PeerConfig, LbvError> {
        match self.public_key {
            Some(public_key) => Ok(PeerConfig {
                public_key,
                preshared_key: self.preshared_key,
                endpoint: self.endpoint,
                allowed_ips: self.allowed_ips,
                persistent_keepalive: self.persistent_keepalive,
            }),
            None => Err(LbvError::InvalidConfiguration {
                msg: "[Peer] has no PublicKey".to_string(),
            }),
        }
    }
}

fn split_list(value: &str) -> impl Iterator<Item = &str> {
    value
        .split(',')
        .map(|part| part.trim())
        .filter(|part| !part.is_empty())
}

fn parse_num<T: FromStr>(key: &str, value: &str) -> Result<T, LbvError> {
    value.parse().map_err(|_| LbvError::InvalidConfiguration {
        msg: format!("invalid {} value '{}'", key, value),
    })
}

fn parse_bool(key: &str, value: &str) -> Result<bool, LbvError> {
    match value.to_ascii_lowercase().as_str() {
        "true" | "1" | "yes" => Ok(true),
        "false" | "0" | "no" => Ok(false),
        _ => Err(LbvError::InvalidConfiguration {
            msg: format!("invalid {} value '{}'", key, value),
        }),
    }
}

impl FromStr for VpnConfiguration {
    type Err = LbvError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let mut section = Section::None;
        let mut iface: Option<InterfaceBuilder> = None;
        let mut peers: Vec<PeerConfig> = vec![];
        let mut peer: Option<PeerBuilder> = None;

        for raw_line in s.lines() {
            let line = raw_line.trim();
            if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
                continue;
            }

            if let Some(caps) = SECTION_RE.captures(line) {
                if let Some(done) = peer.take() {
                    peers.push(done.build()?);
                }
                let name = caps.get(1).map(|m| m.as_str()).unwrap_or("");
                section = match name.to_ascii_lowercase().as_str() {
                    "interface" => {
                        if iface.is_none() {
                            iface = Some(InterfaceBuilder::new());
                        }
                        Section::Interface
                    }
                    "peer" => {
                        peer = Some(PeerBuilder::new());
                        Section::Peer
                    }
                    _ => {
                        log::debug!("ignoring unknown section [{}]", name);
                        Section::Unknown
                    }
                };
                continue;
            }

            let caps = match KEYVAL_RE.captures(line) {
                Some(x) => x,
                None => {
                    return Err(LbvError::InvalidConfiguration {
                        msg: format!("unparseable line '{}'", line),
                    })
                }
            };
            let key = caps.get(1).map(|m| m.as_str()).unwrap_or("");
            let value = caps.get(2).map(|m| m.as_str()).unwrap_or("").trim();

            match section {
                Section::Interface => match iface.as_mut() {
                    Some(b) => b.set(key, value)?,
                    None => unreachable!(),
                },
                Section::Peer => match peer.as_mut() {
                    Some(b) => b.set(key, value)?,
                    None => unreachable!(),
                },
                Section::Unknown => {}
                Section::None => {
                    return Err(LbvError::InvalidConfiguration {
                        msg: format!("'{}' before any section header", line),
                    })
                }
            }
        }

        if let Some(done) = peer.take() {
            peers.push(done.build()?);
        }

        let iface = match iface {
            Some(x) => x.build()?,
            None => {
                return Err(LbvError::InvalidConfiguration {
                    msg: "no [Interface] section".to_string(),
                })
            }
        };

        Ok(VpnConfiguration {
            interface: iface,
            peers,
        })
    }
}

fn join_list<T: fmt::Display>(items: &[T]) -> String {
    items
        .iter()
        .map(|x| x.to_string())
        .collect::<Vec<_>>()
        .join(", ")
}

impl fmt::Display for VpnConfiguration {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        let iface = &self.interface;
        writeln!(f, "[Interface]")?;
        writeln!(f, "PrivateKey = {}", iface.private_key)?;
        if !iface.addresses.is_empty() {
            writeln!(f, "Address = {}", join_list(&iface.addresses))?;
        }
        if !iface.dns.is_empty() {
            writeln!(f, "DNS = {}", iface.dns.join(", "))?;
        }
        if let Some(port) = iface.listen_port {
            writeln!(f, "ListenPort = {}", port)?;
        }
        if let Some(mtu) = iface.mtu {
            writeln!(f, "MTU = {}", mtu)?;
        }
        if let Some(fwmark) = iface.fwmark {
            writeln!(f, "FwMark = {}", fwmark)?;
        }
        if let Some(ref table) = iface.table {
            writeln!(f, "Table = {}", table)?;
        }
        for cmd in &iface.pre_up {
            writeln!(f, "PreUp = {}", cmd)?;
        }
        for cmd in &iface.post_up {
            writeln!(f, "PostUp = {}", cmd)?;
        }
        for cmd in &iface.pre_down {
            writeln!(f, "PreDown = {}", cmd)?;
        }
        for cmd in &iface.post_down {
            writeln!(f, "PostDown = {}", cmd)?;
        }
        if iface.save_config {
            writeln!(f, "SaveConfig = true")?;
        }

        for peer in &self.peers {
            writeln!(f)?;
            writeln!(f, "[Peer]")?;
            writeln!(f, "PublicKey = {}", peer.public_key)?;
            if let Some(ref psk) = peer.preshared_key {
                writeln!(f, "PresharedKey = {}", psk)?;
            }
            if !peer.allowed_ips.is_empty() {
                writeln!(f, "AllowedIPs = {}", join_list(&peer.allowed_ips))?;
            }
            if let Some(ref endpoint) = peer.endpoint {
                writeln!(f, "Endpoint = {}", endpoint)?;
            }
            if let Some(keepalive) = peer.persistent_keepalive {
                writeln!(f, "PersistentKeepalive = {}", keepalive)?;
            }
        }

        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;

    const EXAMPLE: &str = r#"
    [Interface]
    PrivateKey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=
    Address = 172.16.11.1
    DNS = 172.16.1.101,jadaptive.local

    [Peer]
    PublicKey = OW9Im40fr3Lq6knUMy/mObQ2jr332ESXulZM9OannyI=
    Endpoint = 3.251.31.162:51820
    PersistentKeepalive = 30
    AllowedIPs = 172.16.11.0/24, 172.16.1.0/24
    "#;

    #[test]
    fn test_parse_example() {
        let cfg: VpnConfiguration = EXAMPLE.parse().unwrap();

        assert_eq!(
            cfg.interface.private_key.to_base64(),
            "SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ="
        );
        assert_eq!(cfg.interface.addresses, vec!["172.16.11.1/32".parse().unwrap()]);
        assert_eq!(cfg.interface.dns, vec!["172.16.1.101", "jadaptive.local"]);

        assert_eq!(cfg.peers.len(), 1);
        let peer = &cfg.peers[0];
        assert_eq!(
            peer.public_key.to_base64(),
            "OW9Im40fr3Lq6knUMy/mObQ2jr332ESXulZM9OannyI="
        );
        assert_eq!(
            peer.endpoint,
            Some(Endpoint {
                host: "3.251.31.162".to_string(),
                port: 51820
            })
        );
        assert_eq!(peer.persistent_keepalive, Some(30));
        assert_eq!(
            peer.allowed_ips,
            vec![
                "172.16.11.0/24".parse().unwrap(),
                "172.16.1.0/24".parse().unwrap()
            ]
        );
    }

    #[test]
    fn test_roundtrip() {
        let cfg: VpnConfiguration = EXAMPLE.parse().unwrap();
        let reparsed: VpnConfiguration = cfg.to_string().parse().unwrap();
        assert_eq!(cfg, reparsed);
    }

    #[test]
    fn test_rendered_text() {
        let cfg: VpnConfiguration = EXAMPLE.parse().unwrap();
        let text = cfg.to_string();
        assert!(text.contains("Address = 172.16.11.1/32"));
        assert!(text.contains("Endpoint = 3.251.31.162:51820"));
        assert!(text.contains("PersistentKeepalive = 30"));
    }

    #[test]
    fn test_extended_keys() {
        let cfg: VpnConfiguration = r#"
        [Interface]
        PrivateKey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=
        ListenPort = 51821
        MTU = 1380
        FwMark = 51820
        Table = off
        PreUp = echo pre-up
        PostUp = echo post-up 1
        PostUp = echo post-up 2
        SaveConfig = true
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.interface.listen_port, Some(51821));
        assert_eq!(cfg.interface.mtu, Some(1380));
        assert_eq!(cfg.interface.fwmark, Some(51820));
        assert_eq!(cfg.interface.table.as_deref(), Some("off"));
        assert_eq!(cfg.interface.pre_up, vec!["echo pre-up"]);
        assert_eq!(cfg.interface.post_up, vec!["echo post-up 1", "echo post-up 2"]);
        assert!(cfg.interface.save_config);

        let reparsed: VpnConfiguration = cfg.to_string().parse().unwrap();
        assert_eq!(cfg, reparsed);
    }

    #[test]
    fn test_multiple_peers_and_psk() {
        let cfg: VpnConfiguration = r#"
        [Interface]
        PrivateKey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=
        Address = 172.16.0.1/24

        [Peer]
        PublicKey = OW9Im40fr3Lq6knUMy/mObQ2jr332ESXulZM9OannyI=
        PresharedKey = K69dPM6jfmg4kbDIpQH7y/VSIMPFHQGzFJWYy9rY8h0=
        AllowedIPs = 10.0.0.0/8

        [Peer]
        PublicKey = K69dPM6jfmg4kbDIpQH7y/VSIMPFHQGzFJWYy9rY8h0=
        AllowedIPs = 127.0.0.53, 192.168.91.0/24
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.peers.len(), 2);
        assert!(cfg.peers[0].preshared_key.is_some());
        assert_eq!(
            cfg.peers[1].allowed_ips,
            vec![
                "127.0.0.53/32".parse().unwrap(),
                "192.168.91.0/24".parse().unwrap()
            ]
        );
    }

    #[test]
    fn test_case_insensitive_keys_and_comments() {
        let cfg: VpnConfiguration = r#"
        # wg-quick style comment
        [interface]
        privatekey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=
        ; another comment
        ADDRESS = 10.1.2.3/24
        UnknownKey = ignored

        [UnknownSection]
        Whatever = ignored
        "#
        .parse()
        .unwrap();

        assert_eq!(cfg.interface.addresses, vec!["10.1.2.3/24".parse().unwrap()]);
        assert!(cfg.peers.is_empty());
    }

    #[test]
    fn test_missing_private_key() {
        let res = "[Interface]\nAddress = 10.0.0.1/24\n".parse::<VpnConfiguration>();
        assert!(res.is_err());
    }

    #[test]
    fn test_peer_missing_public_key() {
        let res = r#"
        [Interface]
        PrivateKey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=

        [Peer]
        AllowedIPs = 10.0.0.0/8
        "#
        .parse::<VpnConfiguration>();
        assert!(res.is_err());
    }

    #[test]
    fn test_bad_key_material() {
        let res = "[Interface]\nPrivateKey = tooshort\n".parse::<VpnConfiguration>();
        assert!(res.is_err());
    }

    #[test]
    fn test_endpoint_forms() {
        assert_eq!(
            "vpn.example.com".parse::<Endpoint>().unwrap(),
            Endpoint {
                host: "vpn.example.com".to_string(),
                port: DEFAULT_PORT
            }
        );
        assert_eq!(
            "[2001:db8::1]:51821".parse::<Endpoint>().unwrap(),
            Endpoint {
                host: "2001:db8::1".to_string(),
                port: 51821
            }
        );
        assert_eq!(
            "2001:db8::1".parse::<Endpoint>().unwrap(),
            Endpoint {
                host: "2001:db8::1".to_string(),
                port: DEFAULT_PORT
            }
        );
        assert_eq!(
            "[2001:db8::1]:51821".parse::<Endpoint>().unwrap().to_string(),
            "[2001:db8::1]:51821"
        );
        assert!("host:notaport".parse::<Endpoint>().is_err());
        assert!("[not-v6]:51820".parse::<Endpoint>().is_err());
    }

    #[test]
    fn test_keepalive_off() {
        let cfg: VpnConfiguration = r#"
        [Interface]
        PrivateKey = SNG/stVFz0fyoa7LJU4/kMmzg5vmgTFR3GNu2o5q3WQ=

        [Peer]
        PublicKey = OW9Im40fr3Lq6knUMy/mObQ2jr332ESXulZM9OannyI=
        PersistentKeepalive = off
        "#
        .parse()
        .unwrap();
        assert_eq!(cfg.peers[0].persistent_keepalive, None);
    }
}
