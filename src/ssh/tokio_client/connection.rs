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

//! SSH connection management and establishment.
//!
//! This module handles address resolution, connection attempts, the initial
//! handshake and authentication, and exposes [`SshConnector`] as the SSH
//! implementation of [`Connector`].

use async_trait::async_trait;
use russh::client::{Config, Handle, Handler};
use std::fmt::Debug;
use std::io;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

use super::authentication::{AuthMethod, ServerCheckMethod};
use crate::error::Error as BackendError;
use crate::host::{Host, DEFAULT_SSH_PORT};
use crate::ssh::options::{SshOptions, TransportOptions};
use crate::ssh::transport::{Connector, Session};

/// Connect timeout used when the options do not set one.
const DEFAULT_CONNECT_TIMEOUT_SECS: u64 = 30;

/// An authenticated SSH connection to a remote server.
#[derive(Clone)]
pub struct Client {
    pub(super) connection_handle: Arc<Handle<ClientHandler>>,
    pub(super) username: String,
    pub(super) address: SocketAddr,
}

impl Client {
    /// Open an SSH connection to `hostname:port`.
    ///
    /// Every resolved address is tried in turn until one accepts the TCP
    /// connection and handshake. Authentication then runs once, on that
    /// connection, trying `auth` methods in order.
    pub async fn connect_with_config(
        hostname: &str,
        port: u16,
        username: &str,
        auth: Vec<AuthMethod>,
        server_check: ServerCheckMethod,
        config: Config,
    ) -> Result<Self, super::Error> {
        let config = Arc::new(config);

        let socket_addrs: Vec<SocketAddr> = tokio::net::lookup_host((hostname, port))
            .await
            .map_err(super::Error::AddressInvalid)?
            .collect();
        let mut connect_res = Err(super::Error::AddressInvalid(io::Error::new(
            io::ErrorKind::InvalidInput,
            "could not resolve to any addresses",
        )));
        for socket_addr in socket_addrs {
            let handler = ClientHandler::new(hostname.to_string(), socket_addr, server_check.clone());
            match russh::client::connect(config.clone(), socket_addr, handler).await {
                Ok(h) => {
                    connect_res = Ok((socket_addr, h));
                    break;
                }
                Err(e) => connect_res = Err(e),
            }
        }
        let (address, mut handle) = connect_res?;

        super::authentication::authenticate(&mut handle, username, auth).await?;

        Ok(Self {
            connection_handle: Arc::new(handle),
            username: username.to_string(),
            address,
        })
    }

    pub fn username(&self) -> &str {
        &self.username
    }

    pub fn address(&self) -> &SocketAddr {
        &self.address
    }

    /// Disconnect from the remote host.
    pub async fn disconnect(&self) -> Result<(), super::Error> {
        self.connection_handle
            .disconnect(russh::Disconnect::ByApplication, "", "")
            .await
            .map_err(super::Error::SshError)
    }

    pub fn is_closed(&self) -> bool {
        self.connection_handle.is_closed()
    }
}

impl Debug for Client {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Client")
            .field("username", &self.username)
            .field("address", &self.address)
            .field("connection_handle", &"Handle<ClientHandler>")
            .finish()
    }
}

/// SSH client handler for managing server key verification.
#[derive(Debug, Clone)]
pub struct ClientHandler {
    hostname: String,
    host: SocketAddr,
    server_check: ServerCheckMethod,
}

impl ClientHandler {
    pub fn new(hostname: String, host: SocketAddr, server_check: ServerCheckMethod) -> Self {
        Self {
            hostname,
            host,
            server_check,
        }
    }
}

impl Handler for ClientHandler {
    type Error = super::Error;

    async fn check_server_key(
        &mut self,
        server_public_key: &russh::keys::PublicKey,
    ) -> Result<bool, Self::Error> {
        match &self.server_check {
            ServerCheckMethod::NoCheck => Ok(true),
            ServerCheckMethod::KnownHostsFile(known_hosts_path) => russh::keys::check_known_hosts_path(
                &self.hostname,
                self.host.port(),
                server_public_key,
                known_hosts_path,
            )
            .map_err(|_| super::Error::ServerCheckFailed),
            ServerCheckMethod::DefaultKnownHostsFile => {
                russh::keys::check_known_hosts(&self.hostname, self.host.port(), server_public_key)
                    .map_err(|_| super::Error::ServerCheckFailed)
            }
            ServerCheckMethod::AcceptNew => {
                match russh::keys::check_known_hosts(
                    &self.hostname,
                    self.host.port(),
                    server_public_key,
                ) {
                    Ok(true) => Ok(true),
                    Ok(false) => {
                        debug!("Recording new host key for {}", self.hostname);
                        if let Err(e) = russh::keys::known_hosts::learn_known_hosts(
                            &self.hostname,
                            self.host.port(),
                            server_public_key,
                        ) {
                            warn!("Could not record host key for {}: {}", self.hostname, e);
                        }
                        Ok(true)
                    }
                    Err(_) => Err(super::Error::ServerKeyChanged),
                }
            }
        }
    }
}

/// [`Connector`] that opens SSH sessions with russh.
#[derive(Debug, Clone, Default)]
pub struct SshConnector;

impl SshConnector {
    pub fn new() -> Self {
        Self
    }

    fn client_config(options: &SshOptions) -> Config {
        let mut config = Config::default();
        if let Some(interval) = options.keepalive_interval.filter(|secs| *secs > 0) {
            config.keepalive_interval = Some(Duration::from_secs(interval));
        }
        if let Some(max) = options.keepalive_max {
            config.keepalive_max = max;
        }
        config
    }

    fn effective_user(host: &Host, options: &SshOptions) -> String {
        host.user
            .clone()
            .or_else(|| options.user.clone())
            .unwrap_or_else(|| {
                std::env::var("USER")
                    .or_else(|_| std::env::var("USERNAME"))
                    .unwrap_or_else(|_| "root".to_string())
            })
    }

    fn effective_port(host: &Host, options: &SshOptions) -> u16 {
        if host.port != DEFAULT_SSH_PORT {
            host.port
        } else {
            options.port.unwrap_or(DEFAULT_SSH_PORT)
        }
    }
}

#[async_trait]
impl Connector for SshConnector {
    async fn connect(
        &self,
        host: &Host,
        options: &TransportOptions,
    ) -> Result<Box<dyn Session>, BackendError> {
        let ssh = options.to_ssh_options()?;
        let username = Self::effective_user(host, &ssh);
        let port = Self::effective_port(host, &ssh);
        let timeout_secs = ssh.timeout.unwrap_or(DEFAULT_CONNECT_TIMEOUT_SECS);

        debug!("Connecting to {}@{}:{}", username, host.hostname, port);

        let connect = Client::connect_with_config(
            &host.hostname,
            port,
            &username,
            AuthMethod::resolve(&ssh),
            ServerCheckMethod::from_options(&ssh),
            Self::client_config(&ssh),
        );

        let client = match tokio::time::timeout(Duration::from_secs(timeout_secs), connect).await {
            Ok(Ok(client)) => client,
            Ok(Err(e)) => {
                return Err(BackendError::Connection {
                    host: host.to_string(),
                    reason: e.to_string(),
                })
            }
            Err(_) => {
                return Err(BackendError::Connection {
                    host: host.to_string(),
                    reason: super::Error::Timeout(timeout_secs).to_string(),
                })
            }
        };

        Ok(Box::new(client))
    }
}
