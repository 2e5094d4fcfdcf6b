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

//! Configuration tests.

use serde_yaml::Value;
use std::path::Path;
use tempfile::TempDir;

use super::loader::expand_tilde;
use super::types::{Config, OutputVerbosity};
use crate::host::Host;

const SAMPLE: &str = r#"
transport_options:
  forward_agent: false
  user: deploy
host_overrides:
  db1.example.com:
    user: postgres
    port: 2200
output_verbosity: debug
default_env:
  lang: C.UTF-8
command_map:
  rake: /usr/local/bin/bundle exec
umask: "077"
pool:
  enabled: false
"#;

#[test]
fn test_parse_full_config() {
    let config = Config::from_yaml_str(SAMPLE).unwrap();

    assert_eq!(config.output_verbosity, OutputVerbosity::Debug);
    assert_eq!(config.default_env.get("lang").map(String::as_str), Some("C.UTF-8"));
    assert_eq!(
        config.command_map.get("rake").map(String::as_str),
        Some("/usr/local/bin/bundle exec")
    );
    assert_eq!(config.umask.as_deref(), Some("077"));
    assert!(!config.pool.enabled);
    assert_eq!(config.pool.idle_timeout, 300);
}

#[test]
fn test_empty_config_is_default() {
    assert_eq!(Config::from_yaml_str("").unwrap(), Config::default());
    assert_eq!(Config::from_yaml_str("  \n").unwrap(), Config::default());
}

#[test]
fn test_invalid_yaml_is_an_error() {
    assert!(Config::from_yaml_str("output_verbosity: [not, a, level]").is_err());
}

#[test]
fn test_resolve_transport_options_precedence() {
    let config = Config::from_yaml_str(SAMPLE).unwrap();

    let plain = Host::new("web1.example.com");
    let resolved = config.resolve_transport_options(&plain);
    assert_eq!(resolved.get("user"), Some(&Value::from("deploy")));
    assert_eq!(resolved.get("forward_agent"), Some(&Value::from(false)));

    let overridden = Host::new("db1.example.com");
    let resolved = config.resolve_transport_options(&overridden);
    assert_eq!(resolved.get("user"), Some(&Value::from("postgres")));
    assert_eq!(resolved.get("port"), Some(&Value::from(2200)));
    assert_eq!(resolved.get("forward_agent"), Some(&Value::from(false)));

    let explicit = Host::new("db1.example.com").with_transport_option("user", "admin");
    let resolved = config.resolve_transport_options(&explicit);
    assert_eq!(resolved.get("user"), Some(&Value::from("admin")));
}

#[test]
fn test_verbosity_levels_are_ordered() {
    assert!(OutputVerbosity::Trace > OutputVerbosity::Debug);
    assert!(OutputVerbosity::Info > OutputVerbosity::Warn);
    assert_eq!(OutputVerbosity::default(), OutputVerbosity::Info);
    assert_eq!(OutputVerbosity::Warn.as_level(), tracing::Level::WARN);
}

#[tokio::test]
async fn test_load_from_file() {
    let dir = TempDir::new().unwrap();
    let path = dir.path().join("deckhand.yaml");
    tokio::fs::write(&path, SAMPLE).await.unwrap();

    let config = Config::load(&path).await.unwrap();
    assert_eq!(config.output_verbosity, OutputVerbosity::Debug);
}

#[tokio::test]
async fn test_load_missing_file_uses_defaults() {
    let dir = TempDir::new().unwrap();
    let config = Config::load(&dir.path().join("absent.yaml")).await.unwrap();
    assert_eq!(config, Config::default());
}

#[test]
fn test_expand_tilde_leaves_other_paths_alone() {
    assert_eq!(expand_tilde(Path::new("/etc/deckhand.yaml")), Path::new("/etc/deckhand.yaml"));
    assert_eq!(expand_tilde(Path::new("relative/x")), Path::new("relative/x"));

    let expanded = expand_tilde(Path::new("~/deckhand.yaml"));
    assert!(expanded.ends_with("deckhand.yaml"));
    assert!(!expanded.starts_with("~"));
}
