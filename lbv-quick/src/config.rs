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

use std::fs;

use serde::Deserialize;

#[derive(Deserialize)]
pub struct Config {
    pub driver: Option<Driver>,
}

#[derive(Deserialize)]
pub struct Driver {
    pub library: Option<String>,
    pub search_path: Option<String>,
}

impl Config {
    pub fn library(&self) -> Option<&str> {
        self.driver.as_ref().and_then(|d| d.library.as_deref())
    }

    pub fn search_path(&self) -> Option<&str> {
        self.driver.as_ref().and_then(|d| d.search_path.as_deref())
    }
}

fn get_default_config() -> Config {
    Config { driver: None }
}

fn parse_toml(tomlstr: &str) -> Config {
    toml::from_str(tomlstr).expect("Invalid config file")
}

pub fn read_config(cfgpath: &str, panic_on_notfound: bool) -> Config {
    match fs::read_to_string(cfgpath) {
        Ok(x) => parse_toml(&x),
        Err(_) => match panic_on_notfound {
            true => panic!("Config file not found!"),
            false => get_default_config(),
        },
    }
}

#[cfg(test)]
mod test {
    #[test]
    fn test_baseline_config() {
        let cfg = super::parse_toml("");
        assert!(cfg.library().is_none());
        assert!(cfg.search_path().is_none());
    }

    #[test]
    fn test_driver_config() {
        let cfg = super::parse_toml(
            r##"
        [driver]
        library = "/opt/lbv/liblbv.so"
        search_path = "/etc/lbv"
        "##,
        );

        assert_eq!(cfg.library(), Some("/opt/lbv/liblbv.so"));
        assert_eq!(cfg.search_path(), Some("/etc/lbv"));
    }
}
