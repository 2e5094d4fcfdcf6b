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

//! SSH channel operations: running commands and exposing their output as
//! [`ChannelEvent`]s.

use async_trait::async_trait;
use russh::client::Msg;
use russh::{Channel, ChannelMsg, Pty, Sig};
use std::io;
use tracing::trace;

use super::connection::Client;
use crate::error::Error;
use crate::ssh::transport::{ChannelEvent, ExecChannel, RemoteReader, RemoteWriter, Session};

/// Extended data stream number of stderr (RFC 4254 section 5.2).
const SSH_EXTENDED_DATA_STDERR: u32 = 1;

const PTY_TERM: &str = "xterm";
const PTY_COLUMNS: u32 = 80;
const PTY_ROWS: u32 = 24;

/// Terminal modes for interactive commands. Echo is off so responses written
/// to stdin do not reappear in captured output, and output processing is off
/// so `\n` is not rewritten to `\r\n`.
const PTY_MODES: &[(Pty, u32)] = &[
    (Pty::ECHO, 0),
    (Pty::OPOST, 0),
    (Pty::ONLCR, 0),
];

impl Client {
    /// Get a new SSH channel for communication.
    pub async fn get_channel(&self) -> Result<Channel<Msg>, super::Error> {
        self.connection_handle
            .channel_open_session()
            .await
            .map_err(super::Error::SshError)
    }

    async fn start_command(
        &self,
        command_line: &str,
        request_pty: bool,
    ) -> Result<Channel<Msg>, super::Error> {
        let channel = self.get_channel().await?;
        if request_pty {
            channel
                .request_pty(false, PTY_TERM, PTY_COLUMNS, PTY_ROWS, 0, 0, PTY_MODES)
                .await?;
        }
        channel.exec(true, command_line).await?;
        Ok(channel)
    }
}

#[async_trait]
impl Session for Client {
    async fn exec(
        &self,
        command_line: &str,
        request_pty: bool,
    ) -> Result<Box<dyn ExecChannel>, Error> {
        let channel = self
            .start_command(command_line, request_pty)
            .await
            .map_err(|e| Error::Channel(e.to_string()))?;
        Ok(Box::new(RusshChannel { channel }))
    }

    async fn open_writer(&self, path: &str) -> io::Result<RemoteWriter> {
        Ok(Box::new(self.open_remote_file(path, true).await?))
    }

    async fn open_reader(&self, path: &str) -> io::Result<RemoteReader> {
        Ok(Box::new(self.open_remote_file(path, false).await?))
    }

    async fn close(&self) -> Result<(), Error> {
        if self.is_closed() {
            return Ok(());
        }
        self.disconnect()
            .await
            .map_err(|e| Error::Channel(e.to_string()))
    }

    fn is_closed(&self) -> bool {
        Client::is_closed(self)
    }
}

/// A command running in an SSH session channel.
pub struct RusshChannel {
    channel: Channel<Msg>,
}

#[async_trait]
impl ExecChannel for RusshChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        // Exit status may arrive before trailing data, and EOF is optional
        // (RFC 4254 section 5.3), so only channel close ends the stream.
        while let Some(msg) = self.channel.wait().await {
            match msg {
                ChannelMsg::Data { ref data } => return Some(ChannelEvent::Stdout(data.to_vec())),
                ChannelMsg::ExtendedData { ref data, ext } if ext == SSH_EXTENDED_DATA_STDERR => {
                    return Some(ChannelEvent::Stderr(data.to_vec()))
                }
                ChannelMsg::ExitStatus { exit_status } => {
                    return Some(ChannelEvent::ExitStatus(exit_status))
                }
                ChannelMsg::ExitSignal { signal_name, .. } => {
                    trace!("Remote process killed by signal {:?}", signal_name);
                    return Some(ChannelEvent::ExitStatus(signal_exit_status(&signal_name)));
                }
                ChannelMsg::Eof => return Some(ChannelEvent::Eof),
                _ => {}
            }
        }
        None
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error> {
        self.channel
            .data(data)
            .await
            .map_err(|e| Error::Channel(format!("Failed to write to stdin: {e}")))
    }

    async fn close_stdin(&mut self) -> Result<(), Error> {
        self.channel
            .eof()
            .await
            .map_err(|e| Error::Channel(format!("Failed to close stdin: {e}")))
    }
}

/// Shell-style status for a process killed by `signal`: 128 plus the signal
/// number, or 255 for signals without a portable number.
fn signal_exit_status(signal: &Sig) -> u32 {
    let number = match signal {
        Sig::HUP => 1,
        Sig::INT => 2,
        Sig::QUIT => 3,
        Sig::ILL => 4,
        Sig::ABRT => 6,
        Sig::FPE => 8,
        Sig::KILL => 9,
        Sig::USR1 => 10,
        Sig::SEGV => 11,
        Sig::PIPE => 13,
        Sig::ALRM => 14,
        Sig::TERM => 15,
        Sig::Custom(_) => return 255,
    };
    128 + number
}
