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

//! Transport options and their SSH interpretation.
//!
//! Options travel as an untyped YAML map so that hosts, configuration files
//! and callers can all contribute keys without agreeing on a schema. The SSH
//! connector reads them through [`SshOptions`].

use serde::{Deserialize, Serialize};
use serde_yaml::Value;
use std::collections::BTreeMap;
use std::path::PathBuf;

use crate::error::Error;

const VERIFY_HOST_KEY: &str = "verify_host_key";
const PARANOID_KEY: &str = "paranoid";

/// Untyped connection parameters keyed by option name.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TransportOptions(BTreeMap<String, Value>);

impl TransportOptions {
    pub fn new() -> Self {
        Self::default()
    }

    /// Set an option, replacing any previous value for the key.
    pub fn insert(&mut self, key: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(key.into(), value.into())
    }

    /// Builder form of [`insert`](Self::insert).
    pub fn with(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.insert(key, value);
        self
    }

    pub fn get(&self, key: &str) -> Option<&Value> {
        self.0.get(key)
    }

    pub fn contains_key(&self, key: &str) -> bool {
        self.0.contains_key(key)
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Value)> {
        self.0.iter()
    }

    /// Merge `self` over `defaults`. Keys present in `self` win.
    pub fn merged_over(&self, defaults: &TransportOptions) -> TransportOptions {
        let mut merged = defaults.0.clone();
        merged.extend(self.0.iter().map(|(k, v)| (k.clone(), v.clone())));
        TransportOptions(merged)
    }

    /// Interpret the options as SSH settings.
    ///
    /// `paranoid` is accepted as the older name of `verify_host_key`; when
    /// both are set, `verify_host_key` wins.
    pub fn to_ssh_options(&self) -> Result<SshOptions, Error> {
        let mut map = self.0.clone();
        if let Some(paranoid) = map.remove(PARANOID_KEY) {
            map.entry(VERIFY_HOST_KEY.to_string()).or_insert(paranoid);
        }
        let value =
            serde_yaml::to_value(&map).map_err(|e| Error::InvalidOptions(e.to_string()))?;
        serde_yaml::from_value(value).map_err(|e| Error::InvalidOptions(e.to_string()))
    }

    /// Stable textual form used to key pooled connections.
    pub(crate) fn fingerprint(&self) -> String {
        serde_yaml::to_string(&self.0).unwrap_or_default()
    }
}

impl<K, V> FromIterator<(K, V)> for TransportOptions
where
    K: Into<String>,
    V: Into<Value>,
{
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        TransportOptions(
            iter.into_iter()
                .map(|(k, v)| (k.into(), v.into()))
                .collect(),
        )
    }
}

/// SSH settings understood by [`SshConnector`](super::SshConnector).
///
/// Unknown keys are ignored so that other transports can share the same map.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct SshOptions {
    pub port: Option<u16>,
    pub user: Option<String>,
    pub password: Option<String>,
    /// Private key files tried in order.
    pub keys: Vec<PathBuf>,
    pub key_passphrase: Option<String>,
    /// Allow authentication through the running ssh-agent.
    pub forward_agent: Option<bool>,
    /// Verify the server key against known_hosts. Also read from `paranoid`.
    pub verify_host_key: Option<bool>,
    pub known_hosts: Option<PathBuf>,
    /// Connect timeout in seconds.
    pub timeout: Option<u64>,
    /// Keepalive interval in seconds.
    pub keepalive_interval: Option<u64>,
    pub keepalive_max: Option<usize>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_host_options_win_over_defaults() {
        let defaults = TransportOptions::new()
            .with("forward_agent", false)
            .with("port", 2222);
        let host = TransportOptions::new().with("paranoid", true).with("port", 22);

        let merged = host.merged_over(&defaults);

        assert_eq!(merged.get("forward_agent"), Some(&Value::from(false)));
        assert_eq!(merged.get("paranoid"), Some(&Value::from(true)));
        assert_eq!(merged.get("port"), Some(&Value::from(22)));
        assert_eq!(merged.len(), 3);
    }

    #[test]
    fn test_merge_leaves_inputs_untouched() {
        let defaults = TransportOptions::new().with("user", "deploy");
        let host = TransportOptions::new();

        let merged = host.merged_over(&defaults);

        assert!(host.is_empty());
        assert_eq!(merged.get("user"), Some(&Value::from("deploy")));
    }

    #[test]
    fn test_ssh_options_accepts_paranoid_alias() {
        let options = TransportOptions::new()
            .with("paranoid", true)
            .with("forward_agent", false)
            .with("some_other_transport_key", "ignored");

        let ssh = options.to_ssh_options().unwrap();
        assert_eq!(ssh.verify_host_key, Some(true));
        assert_eq!(ssh.forward_agent, Some(false));
        assert!(ssh.keys.is_empty());
    }

    #[test]
    fn test_verify_host_key_wins_over_paranoid() {
        let options = TransportOptions::new()
            .with("paranoid", true)
            .with("verify_host_key", false);

        let ssh = options.to_ssh_options().unwrap();
        assert_eq!(ssh.verify_host_key, Some(false));
    }

    #[test]
    fn test_ssh_options_rejects_wrong_types() {
        let options = TransportOptions::new().with("port", "not-a-port");
        assert!(matches!(
            options.to_ssh_options(),
            Err(Error::InvalidOptions(_))
        ));
    }

    #[test]
    fn test_from_iterator_and_yaml_roundtrip() {
        let options: TransportOptions = [("user", "app"), ("password", "secret")]
            .into_iter()
            .collect();

        let yaml = serde_yaml::to_string(&options).unwrap();
        let parsed: TransportOptions = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, options);
    }
}
