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

//! Transport seams.
//!
//! A [`Connector`] opens a [`Session`] to a host. A session runs command lines
//! on [`ExecChannel`]s and opens remote files for streaming. The SSH, local
//! and dry-run transports all implement these traits, so backends never
//! depend on a concrete protocol.

use async_trait::async_trait;
use std::io;
use tokio::io::{AsyncRead, AsyncWrite};

use crate::error::Error;
use crate::host::Host;
use crate::ssh::options::TransportOptions;

/// Streaming reader over a remote file.
pub type RemoteReader = Box<dyn AsyncRead + Send + Unpin>;

/// Streaming writer over a remote file.
pub type RemoteWriter = Box<dyn AsyncWrite + Send + Unpin>;

/// Something that happened on a command channel.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChannelEvent {
    Stdout(Vec<u8>),
    Stderr(Vec<u8>),
    ExitStatus(u32),
    /// The process closed its output; more events may still follow.
    Eof,
}

/// One running remote process.
#[async_trait]
pub trait ExecChannel: Send {
    /// Next event, or `None` once the channel has closed.
    async fn next_event(&mut self) -> Option<ChannelEvent>;

    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error>;

    /// Signal end of input to the process.
    async fn close_stdin(&mut self) -> Result<(), Error>;
}

/// An open connection to one host.
#[async_trait]
pub trait Session: Send + Sync {
    /// Start `command_line` in a fresh channel.
    async fn exec(&self, command_line: &str, request_pty: bool)
        -> Result<Box<dyn ExecChannel>, Error>;

    /// Open `path` for writing, creating or truncating it.
    async fn open_writer(&self, path: &str) -> io::Result<RemoteWriter>;

    async fn open_reader(&self, path: &str) -> io::Result<RemoteReader>;

    async fn close(&self) -> Result<(), Error>;

    fn is_closed(&self) -> bool;
}

/// Factory for sessions.
#[async_trait]
pub trait Connector: Send + Sync {
    async fn connect(&self, host: &Host, options: &TransportOptions)
        -> Result<Box<dyn Session>, Error>;
}
