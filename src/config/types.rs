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

//! Configuration type definitions.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::host::Host;
use crate::ssh::options::TransportOptions;

/// Settings shared by every backend of a run.
///
/// A coordinator keeps its own snapshot behind an `Arc`; changing a `Config`
/// after handing it over has no effect on running or future backends of that
/// coordinator.
#[derive(Debug, Serialize, Deserialize, Default, Clone, PartialEq)]
pub struct Config {
    /// Options applied to every host unless the host overrides them.
    #[serde(default)]
    pub transport_options: TransportOptions,

    /// Per-hostname option overrides, applied over `transport_options`.
    #[serde(default)]
    pub host_overrides: BTreeMap<String, TransportOptions>,

    #[serde(default)]
    pub output_verbosity: OutputVerbosity,

    /// Environment exported to every scoped command, under any `with_env` frames.
    #[serde(default)]
    pub default_env: BTreeMap<String, String>,

    /// Replaces the `/usr/bin/env` prefix for specific verbs.
    #[serde(default)]
    pub command_map: BTreeMap<String, String>,

    /// Umask applied to every scoped command.
    #[serde(default)]
    pub umask: Option<String>,

    #[serde(default)]
    pub pool: PoolSettings,
}

impl Config {
    /// Effective options for `host`: host options, then the hostname
    /// override, then the defaults.
    pub fn resolve_transport_options(&self, host: &Host) -> TransportOptions {
        let defaults = match self.host_overrides.get(&host.hostname) {
            Some(overrides) => overrides.merged_over(&self.transport_options),
            None => self.transport_options.clone(),
        };
        host.transport_options.merged_over(&defaults)
    }
}

/// Level at which command lines and their output are logged.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputVerbosity {
    Error,
    Warn,
    #[default]
    Info,
    Debug,
    Trace,
}

impl OutputVerbosity {
    pub fn as_level(self) -> tracing::Level {
        match self {
            OutputVerbosity::Error => tracing::Level::ERROR,
            OutputVerbosity::Warn => tracing::Level::WARN,
            OutputVerbosity::Info => tracing::Level::INFO,
            OutputVerbosity::Debug => tracing::Level::DEBUG,
            OutputVerbosity::Trace => tracing::Level::TRACE,
        }
    }
}

/// Connection reuse settings.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
pub struct PoolSettings {
    #[serde(default = "default_pool_enabled")]
    pub enabled: bool,
    /// Seconds an idle connection is kept before it is closed.
    #[serde(default = "default_idle_timeout")]
    pub idle_timeout: u64,
}

fn default_pool_enabled() -> bool {
    true
}

fn default_idle_timeout() -> u64 {
    300
}

impl PoolSettings {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_secs(self.idle_timeout)
    }
}

impl Default for PoolSettings {
    fn default() -> Self {
        Self {
            enabled: default_pool_enabled(),
            idle_timeout: default_idle_timeout(),
        }
    }
}
