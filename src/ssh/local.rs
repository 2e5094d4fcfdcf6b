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

//! Transport that runs commands on the local machine through `sh -c`.
//!
//! Useful for deploying to the machine the operator runs on and for
//! exercising backends without an SSH server. The host is ignored.

use async_trait::async_trait;
use std::io;
use std::process::Stdio;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::io::{AsyncRead, AsyncReadExt, AsyncWriteExt};
use tokio::process::{ChildStdin, Command};
use tokio::sync::mpsc;
use tracing::debug;

use super::transport::{ChannelEvent, Connector, ExecChannel, RemoteReader, RemoteWriter, Session};
use crate::error::Error;
use crate::host::Host;
use crate::ssh::options::TransportOptions;
use crate::utils::buffer_pool::{global, OUTPUT_BUFFER_SIZE};

const EVENT_QUEUE_DEPTH: usize = 64;

/// Connector for [`LocalSession`]s.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalConnector;

impl LocalConnector {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for LocalConnector {
    async fn connect(
        &self,
        host: &Host,
        _options: &TransportOptions,
    ) -> Result<Box<dyn Session>, Error> {
        debug!("Opening local session for {}", host);
        Ok(Box::new(LocalSession::default()))
    }
}

#[derive(Debug, Default)]
pub struct LocalSession {
    closed: AtomicBool,
}

#[async_trait]
impl Session for LocalSession {
    async fn exec(
        &self,
        command_line: &str,
        _request_pty: bool,
    ) -> Result<Box<dyn ExecChannel>, Error> {
        if self.is_closed() {
            return Err(Error::Channel("local session is closed".to_string()));
        }

        let mut child = Command::new("sh")
            .arg("-c")
            .arg(command_line)
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .spawn()
            .map_err(|e| Error::Channel(format!("Failed to spawn local shell: {e}")))?;

        let (tx, rx) = mpsc::channel(EVENT_QUEUE_DEPTH);
        let stdin = child.stdin.take().map(spawn_stdin_writer);

        let stdout_reader = child
            .stdout
            .take()
            .map(|out| tokio::spawn(forward_output(out, tx.clone(), ChannelEvent::Stdout)));
        let stderr_reader = child
            .stderr
            .take()
            .map(|err| tokio::spawn(forward_output(err, tx.clone(), ChannelEvent::Stderr)));

        tokio::spawn(async move {
            // All output is forwarded before the exit status so consumers see it in order.
            for reader in [stdout_reader, stderr_reader].into_iter().flatten() {
                let _ = reader.await;
            }
            let _ = tx.send(ChannelEvent::Eof).await;
            match child.wait().await {
                Ok(status) => {
                    let _ = tx.send(ChannelEvent::ExitStatus(exit_code(status))).await;
                }
                Err(e) => debug!("Failed to wait for local process: {}", e),
            }
        });

        Ok(Box::new(LocalChannel { events: rx, stdin }))
    }

    async fn open_writer(&self, path: &str) -> io::Result<RemoteWriter> {
        let file = tokio::fs::File::create(path).await?;
        Ok(Box::new(file))
    }

    async fn open_reader(&self, path: &str) -> io::Result<RemoteReader> {
        let file = tokio::fs::File::open(path).await?;
        Ok(Box::new(file))
    }

    async fn close(&self) -> Result<(), Error> {
        self.closed.store(true, Ordering::SeqCst);
        Ok(())
    }

    fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

async fn forward_output<R>(
    mut reader: R,
    tx: mpsc::Sender<ChannelEvent>,
    wrap: fn(Vec<u8>) -> ChannelEvent,
) where
    R: AsyncRead + Unpin,
{
    let mut buffer = global::get_output_buffer();
    buffer.resize(OUTPUT_BUFFER_SIZE, 0);
    loop {
        match reader.read(buffer.as_mut_slice()).await {
            Ok(0) => break,
            Ok(n) => {
                if tx.send(wrap(buffer.as_slice()[..n].to_vec())).await.is_err() {
                    break;
                }
            }
            Err(e) => {
                debug!("Local output stream failed: {}", e);
                break;
            }
        }
    }
}

/// Feed stdin from its own task so a blocked pipe never stalls the event
/// stream. Dropping the returned sender closes stdin once queued data is written.
fn spawn_stdin_writer(mut stdin: ChildStdin) -> mpsc::UnboundedSender<Vec<u8>> {
    let (tx, mut rx) = mpsc::unbounded_channel::<Vec<u8>>();
    tokio::spawn(async move {
        while let Some(data) = rx.recv().await {
            if let Err(e) = stdin.write_all(&data).await {
                debug!("Failed to write to local stdin: {}", e);
                return;
            }
            if let Err(e) = stdin.flush().await {
                debug!("Failed to flush local stdin: {}", e);
                return;
            }
        }
    });
    tx
}

#[cfg(unix)]
fn exit_code(status: std::process::ExitStatus) -> u32 {
    use std::os::unix::process::ExitStatusExt;
    match (status.code(), status.signal()) {
        (Some(code), _) => code as u32,
        (None, Some(signal)) => 128 + signal as u32,
        (None, None) => 255,
    }
}

#[cfg(not(unix))]
fn exit_code(status: std::process::ExitStatus) -> u32 {
    status.code().map(|code| code as u32).unwrap_or(255)
}

struct LocalChannel {
    events: mpsc::Receiver<ChannelEvent>,
    stdin: Option<mpsc::UnboundedSender<Vec<u8>>>,
}

#[async_trait]
impl ExecChannel for LocalChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.recv().await
    }

    async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error> {
        let stdin = self
            .stdin
            .as_ref()
            .ok_or_else(|| Error::Channel("stdin already closed".to_string()))?;
        stdin.send(data.to_vec()).map_err(|_| {
            Error::Channel("Failed to write to stdin: process stopped reading".to_string())
        })
    }

    async fn close_stdin(&mut self) -> Result<(), Error> {
        // The writer drops the pipe, delivering EOF, once its queue drains.
        self.stdin.take();
        Ok(())
    }
}
