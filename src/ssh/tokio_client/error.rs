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

//! Errors raised by the russh-based client.

use std::io;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum Error {
    #[error("Address could not be resolved: {0}")]
    AddressInvalid(io::Error),
    #[error("Connection attempt timed out after {0} seconds")]
    Timeout(u64),
    #[error("Server host key could not be verified")]
    ServerCheckFailed,
    #[error("Server host key does not match the known_hosts entry")]
    ServerKeyChanged,
    #[error("Password authentication failed")]
    PasswordWrong,
    #[error("Private key could not be loaded: {0}")]
    KeyInvalid(russh::keys::Error),
    #[error("Public key authentication failed")]
    KeyAuthFailed,
    #[error("Could not connect to ssh-agent")]
    AgentConnectionFailed,
    #[error("Could not list ssh-agent identities")]
    AgentRequestIdentitiesFailed,
    #[error("ssh-agent has no identities")]
    AgentNoIdentities,
    #[error("No ssh-agent identity was accepted")]
    AgentAuthenticationFailed,
    #[error("No authentication method succeeded (tried: {0})")]
    AllAuthMethodsFailed(String),
    #[error("SSH protocol error: {0}")]
    SshError(#[from] russh::Error),
    #[error("SFTP error: {0}")]
    SftpError(#[from] russh_sftp::client::error::Error),
    #[error("I/O error: {0}")]
    IoError(#[from] io::Error),
}
