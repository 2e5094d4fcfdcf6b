// Copyright 2025 Lablup Inc. and Jeongkyu Shin
//
// Licensed under the Apache License, Version 2.0 (the "License");
// you may not use this file except in compliance with the License.
// You may obtain a copy of the License at
//
//     http://www.apache.org/licenses/LICENSE-2.0
//
// Unless required by applicable law or agreed to in writing, software
// distributed under the License is distributed on an "AS IS" BASIS,
// WITHOUT WARRANTIES OR CONDITIONS OF ANY KIND, either express or implied.
// See the License for the specific language governing permissions and
// limitations under the License.

use anyhow::{bail, Context, Result};
use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::fmt;
use std::hash::{Hash, Hasher};

use crate::ssh::options::TransportOptions;

pub const DEFAULT_SSH_PORT: u16 = 22;

/// Property that marks the host chosen by the single-host policy.
pub const PRIMARY_PROPERTY: &str = "primary";

/// A remote target.
///
/// Two hosts are equal when hostname, port and user match; options and
/// properties do not take part in identity.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Host {
    pub hostname: String,
    #[serde(default = "default_port")]
    pub port: u16,
    #[serde(default)]
    pub user: Option<String>,
    #[serde(default)]
    pub transport_options: TransportOptions,
    #[serde(default)]
    pub properties: BTreeMap<String, Value>,
}

fn default_port() -> u16 {
    DEFAULT_SSH_PORT
}

impl Host {
    pub fn new(hostname: impl Into<String>) -> Self {
        Self {
            hostname: hostname.into(),
            port: DEFAULT_SSH_PORT,
            user: None,
            transport_options: TransportOptions::default(),
            properties: BTreeMap::new(),
        }
    }

    pub fn parse(host_str: &str) -> Result<Self> {
        // Parse formats:
        // - host
        // - host:port
        // - user@host
        // - user@host:port
        // - [v6addr] / [v6addr]:port
        let host_str = host_str.trim();
        if host_str.is_empty() {
            bail!("Host string is empty");
        }

        let (user, rest) = match host_str.rfind('@') {
            Some(at_pos) => (Some(&host_str[..at_pos]), &host_str[at_pos + 1..]),
            None => (None, host_str),
        };
        if user.is_some_and(str::is_empty) {
            bail!("Empty user in host string '{host_str}'");
        }

        let (hostname, port) = if let Some(bracketed) = rest.strip_prefix('[') {
            let close = bracketed
                .find(']')
                .with_context(|| format!("Unterminated IPv6 address in '{host_str}'"))?;
            let address = &bracketed[..close];
            let port = match bracketed[close + 1..].strip_prefix(':') {
                Some(port) => port.parse::<u16>().context("Invalid port number")?,
                None => DEFAULT_SSH_PORT,
            };
            (address, port)
        } else {
            match rest.split_once(':') {
                Some((name, port)) if !port.contains(':') => {
                    (name, port.parse::<u16>().context("Invalid port number")?)
                }
                // Bare IPv6 addresses carry several colons and no port.
                _ => (rest, DEFAULT_SSH_PORT),
            }
        };

        if hostname.is_empty() {
            bail!("Empty hostname in host string '{host_str}'");
        }

        let mut host = Host::new(hostname).with_port(port);
        host.user = user.map(str::to_string);
        Ok(host)
    }

    pub fn with_user(mut self, user: impl Into<String>) -> Self {
        self.user = Some(user.into());
        self
    }

    pub fn with_port(mut self, port: u16) -> Self {
        self.port = port;
        self
    }

    pub fn with_transport_option(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.transport_options.insert(key, value);
        self
    }

    pub fn with_property(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.properties.insert(key.into(), value.into());
        self
    }

    pub fn property(&self, key: &str) -> Option<&Value> {
        self.properties.get(key)
    }

    /// Whether the host carries `primary: true`.
    pub fn is_primary(&self) -> bool {
        matches!(self.property(PRIMARY_PROPERTY), Some(Value::Bool(true)))
    }

    pub fn address(&self) -> String {
        if self.hostname.contains(':') {
            format!("[{}]:{}", self.hostname, self.port)
        } else {
            format!("{}:{}", self.hostname, self.port)
        }
    }
}

impl PartialEq for Host {
    fn eq(&self, other: &Self) -> bool {
        self.hostname == other.hostname && self.port == other.port && self.user == other.user
    }
}

impl Eq for Host {}

impl Hash for Host {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.hostname.hash(state);
        self.port.hash(state);
        self.user.hash(state);
    }
}

impl fmt::Display for Host {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if let Some(user) = &self.user {
            write!(f, "{user}@")?;
        }
        if self.port == DEFAULT_SSH_PORT {
            write!(f, "{}", self.hostname)
        } else {
            write!(f, "{}", self.address())
        }
    }
}

impl std::str::FromStr for Host {
    type Err = anyhow::Error;

    fn from_str(s: &str) -> Result<Self> {
        Host::parse(s)
    }
}
