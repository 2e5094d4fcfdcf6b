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

//! SSH authentication methods and server verification.
//!
//! Authentication methods are resolved from [`SshOptions`] into an ordered
//! list and tried one after another on the same handle until the server
//! accepts one.

use russh::client::{Handle, Handler};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing::debug;
use zeroize::Zeroizing;

use crate::ssh::options::SshOptions;

/// Default identity files tried when no key is configured.
const DEFAULT_KEY_FILES: &[&str] = &["id_ed25519", "id_ecdsa", "id_rsa"];

/// An authentication token.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum AuthMethod {
    Password(Zeroizing<String>),
    PrivateKeyFile {
        key_file_path: PathBuf,
        key_pass: Option<Zeroizing<String>>,
    },
    #[cfg(not(target_os = "windows"))]
    Agent,
}

impl AuthMethod {
    pub fn with_password(password: &str) -> Self {
        Self::Password(Zeroizing::new(password.to_string()))
    }

    pub fn with_key_file<T: AsRef<Path>>(key_file_path: T, passphrase: Option<&str>) -> Self {
        Self::PrivateKeyFile {
            key_file_path: key_file_path.as_ref().to_path_buf(),
            key_pass: passphrase.map(|p| Zeroizing::new(p.to_string())),
        }
    }

    #[cfg(not(target_os = "windows"))]
    pub fn with_agent() -> Self {
        Self::Agent
    }

    fn describe(&self) -> String {
        match self {
            AuthMethod::Password(_) => "password".to_string(),
            AuthMethod::PrivateKeyFile { key_file_path, .. } => {
                format!("key {}", key_file_path.display())
            }
            #[cfg(not(target_os = "windows"))]
            AuthMethod::Agent => "ssh-agent".to_string(),
        }
    }

    /// Methods to try for `options`, most specific first.
    ///
    /// Explicit password and key files come first, then the agent (unless
    /// `forward_agent: false`), then the default identity files that exist.
    pub fn resolve(options: &SshOptions) -> Vec<AuthMethod> {
        let mut methods = Vec::new();
        let passphrase = options.key_passphrase.as_deref();

        if let Some(password) = &options.password {
            methods.push(AuthMethod::with_password(password));
        }
        for key in &options.keys {
            methods.push(AuthMethod::with_key_file(
                crate::config::expand_tilde(key),
                passphrase,
            ));
        }

        #[cfg(not(target_os = "windows"))]
        if options.forward_agent != Some(false) && std::env::var_os("SSH_AUTH_SOCK").is_some() {
            methods.push(AuthMethod::with_agent());
        }

        if options.keys.is_empty() {
            if let Some(dirs) = directories::BaseDirs::new() {
                let ssh_dir = dirs.home_dir().join(".ssh");
                methods.extend(
                    DEFAULT_KEY_FILES
                        .iter()
                        .map(|name| ssh_dir.join(name))
                        .filter(|path| path.exists())
                        .map(|path| AuthMethod::with_key_file(path, passphrase)),
                );
            }
        }

        methods
    }
}

/// Server host key verification methods.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
#[non_exhaustive]
pub enum ServerCheckMethod {
    /// Accept any host key.
    NoCheck,
    /// Verify against the default known_hosts file, rejecting unknown hosts.
    DefaultKnownHostsFile,
    /// Verify against a specific known_hosts file, rejecting unknown hosts.
    KnownHostsFile(String),
    /// Verify known hosts and record keys of hosts seen for the first time.
    AcceptNew,
}

impl ServerCheckMethod {
    pub fn from_options(options: &SshOptions) -> Self {
        match (options.verify_host_key, &options.known_hosts) {
            (Some(false), _) => ServerCheckMethod::NoCheck,
            (Some(true), Some(path)) => ServerCheckMethod::KnownHostsFile(
                crate::config::expand_tilde(path).to_string_lossy().into_owned(),
            ),
            (Some(true), None) => ServerCheckMethod::DefaultKnownHostsFile,
            (None, _) => ServerCheckMethod::AcceptNew,
        }
    }
}

/// Authenticate `handle` with the first method the server accepts.
pub(super) async fn authenticate<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    methods: Vec<AuthMethod>,
) -> Result<(), super::Error> {
    if methods.is_empty() {
        return Err(super::Error::AllAuthMethodsFailed("none available".to_string()));
    }

    let mut tried = Vec::with_capacity(methods.len());
    let mut last_error = None;
    for method in methods {
        tried.push(method.describe());
        match authenticate_with(handle, username, method).await {
            Ok(()) => return Ok(()),
            Err(e) => {
                debug!("Authentication attempt for {} failed: {}", username, e);
                last_error = Some(e);
            }
        }
    }

    match (tried.len(), last_error) {
        (1, Some(e)) => Err(e),
        _ => Err(super::Error::AllAuthMethodsFailed(tried.join(", "))),
    }
}

async fn authenticate_with<H: Handler>(
    handle: &mut Handle<H>,
    username: &str,
    auth: AuthMethod,
) -> Result<(), super::Error> {
    match auth {
        AuthMethod::Password(password) => {
            let result = handle.authenticate_password(username, &**password).await?;
            if !result.success() {
                return Err(super::Error::PasswordWrong);
            }
        }
        AuthMethod::PrivateKeyFile {
            key_file_path,
            key_pass,
        } => {
            let private_key =
                russh::keys::load_secret_key(&key_file_path, key_pass.as_ref().map(|p| &***p))
                    .map_err(super::Error::KeyInvalid)?;
            let result = handle
                .authenticate_publickey(
                    username,
                    russh::keys::PrivateKeyWithHashAlg::new(
                        Arc::new(private_key),
                        handle.best_supported_rsa_hash().await?.flatten(),
                    ),
                )
                .await?;
            if !result.success() {
                return Err(super::Error::KeyAuthFailed);
            }
        }
        #[cfg(not(target_os = "windows"))]
        AuthMethod::Agent => {
            let mut agent = russh::keys::agent::client::AgentClient::connect_env()
                .await
                .map_err(|_| super::Error::AgentConnectionFailed)?;

            let identities = agent
                .request_identities()
                .await
                .map_err(|_| super::Error::AgentRequestIdentitiesFailed)?;

            if identities.is_empty() {
                return Err(super::Error::AgentNoIdentities);
            }

            for identity in identities {
                let result = handle
                    .authenticate_publickey_with(
                        username,
                        identity,
                        handle.best_supported_rsa_hash().await?.flatten(),
                        &mut agent,
                    )
                    .await;

                if matches!(result, Ok(ref auth) if auth.success()) {
                    return Ok(());
                }
            }

            return Err(super::Error::AgentAuthenticationFailed);
        }
    };
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_resolve_puts_password_and_keys_first() {
        let options = SshOptions {
            password: Some("pw".to_string()),
            keys: vec![PathBuf::from("/keys/deploy")],
            forward_agent: Some(false),
            ..Default::default()
        };

        let methods = AuthMethod::resolve(&options);
        assert_eq!(methods.len(), 2);
        assert_eq!(methods[0], AuthMethod::with_password("pw"));
        assert_eq!(methods[1], AuthMethod::with_key_file("/keys/deploy", None));
    }

    #[test]
    fn test_resolve_passes_passphrase_to_keys() {
        let options = SshOptions {
            keys: vec![PathBuf::from("/keys/a")],
            key_passphrase: Some("phrase".to_string()),
            forward_agent: Some(false),
            ..Default::default()
        };

        assert_eq!(
            AuthMethod::resolve(&options),
            vec![AuthMethod::with_key_file("/keys/a", Some("phrase"))]
        );
    }

    #[test]
    fn test_server_check_from_options() {
        let strict = SshOptions {
            verify_host_key: Some(true),
            ..Default::default()
        };
        assert_eq!(
            ServerCheckMethod::from_options(&strict),
            ServerCheckMethod::DefaultKnownHostsFile
        );

        let custom = SshOptions {
            verify_host_key: Some(true),
            known_hosts: Some(PathBuf::from("/etc/ssh/known")),
            ..Default::default()
        };
        assert_eq!(
            ServerCheckMethod::from_options(&custom),
            ServerCheckMethod::KnownHostsFile("/etc/ssh/known".to_string())
        );

        let off = SshOptions {
            verify_host_key: Some(false),
            ..Default::default()
        };
        assert_eq!(ServerCheckMethod::from_options(&off), ServerCheckMethod::NoCheck);

        assert_eq!(
            ServerCheckMethod::from_options(&SshOptions::default()),
            ServerCheckMethod::AcceptNew
        );
    }
}
