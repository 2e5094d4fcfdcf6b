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

//! Transport that records command lines instead of running them.
//!
//! Every command succeeds with no output, uploads are discarded and
//! downloads are empty. The recorded lines show exactly what a real run
//! would send to each host.

use async_trait::async_trait;
use std::io;
use std::sync::{Arc, Mutex};
use tracing::{debug, info};

use super::transport::{ChannelEvent, Connector, ExecChannel, RemoteReader, RemoteWriter, Session};
use crate::error::Error;
use crate::host::Host;
use crate::ssh::options::TransportOptions;

/// One line a dry run would have executed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RecordedCommand {
    pub host: String,
    pub line: String,
}

/// Connector whose sessions append to a shared log.
#[derive(Debug, Clone, Default)]
pub struct DryRunConnector {
    log: Arc<Mutex<Vec<RecordedCommand>>>,
}

impl DryRunConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every recorded command, in the order it was issued.
    pub fn recorded(&self) -> Vec<RecordedCommand> {
        self.log.lock().map(|log| log.clone()).unwrap_or_default()
    }

    /// Lines recorded for `host`, in order.
    pub fn lines_for(&self, host: &Host) -> Vec<String> {
        let name = host.to_string();
        self.recorded()
            .into_iter()
            .filter(|record| record.host == name)
            .map(|record| record.line)
            .collect()
    }
}

#[async_trait]
impl Connector for DryRunConnector {
    async fn connect(
        &self,
        host: &Host,
        _options: &TransportOptions,
    ) -> Result<Box<dyn Session>, Error> {
        Ok(Box::new(DryRunSession {
            host: host.to_string(),
            log: Arc::clone(&self.log),
        }))
    }
}

struct DryRunSession {
    host: String,
    log: Arc<Mutex<Vec<RecordedCommand>>>,
}

#[async_trait]
impl Session for DryRunSession {
    async fn exec(
        &self,
        command_line: &str,
        _request_pty: bool,
    ) -> Result<Box<dyn ExecChannel>, Error> {
        debug!("[{}] Recorded: {}", self.host, command_line);
        if let Ok(mut log) = self.log.lock() {
            log.push(RecordedCommand {
                host: self.host.clone(),
                line: command_line.to_string(),
            });
        }
        Ok(Box::new(DryRunChannel {
            events: vec![ChannelEvent::ExitStatus(0), ChannelEvent::Eof],
        }))
    }

    async fn open_writer(&self, path: &str) -> io::Result<RemoteWriter> {
        info!("[{}] Upload to {}", self.host, path);
        Ok(Box::new(tokio::io::sink()))
    }

    async fn open_reader(&self, path: &str) -> io::Result<RemoteReader> {
        info!("[{}] Download of {}", self.host, path);
        Ok(Box::new(tokio::io::empty()))
    }

    async fn close(&self) -> Result<(), Error> {
        Ok(())
    }

    fn is_closed(&self) -> bool {
        false
    }
}

struct DryRunChannel {
    /// Remaining events, popped from the back.
    events: Vec<ChannelEvent>,
}

#[async_trait]
impl ExecChannel for DryRunChannel {
    async fn next_event(&mut self) -> Option<ChannelEvent> {
        self.events.pop()
    }

    async fn write_stdin(&mut self, _data: &[u8]) -> Result<(), Error> {
        Ok(())
    }

    async fn close_stdin(&mut self) -> Result<(), Error> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_records_lines_per_host() {
        let connector = DryRunConnector::new();
        let web = Host::new("web1");
        let db = Host::new("db1");
        let options = TransportOptions::new();

        let web_session = connector.connect(&web, &options).await.unwrap();
        let db_session = connector.connect(&db, &options).await.unwrap();
        web_session.exec("/usr/bin/env date", false).await.unwrap();
        db_session.exec("/usr/bin/env uptime", false).await.unwrap();
        web_session.exec("/usr/bin/env ls -l", false).await.unwrap();

        assert_eq!(
            connector.lines_for(&web),
            vec!["/usr/bin/env date", "/usr/bin/env ls -l"]
        );
        assert_eq!(connector.recorded().len(), 3);
    }

    #[tokio::test]
    async fn test_channel_reports_success() {
        let connector = DryRunConnector::new();
        let session = connector
            .connect(&Host::new("web1"), &TransportOptions::new())
            .await
            .unwrap();
        let mut channel = session.exec("false", false).await.unwrap();

        assert_eq!(channel.next_event().await, Some(ChannelEvent::Eof));
        assert_eq!(channel.next_event().await, Some(ChannelEvent::ExitStatus(0)));
        assert_eq!(channel.next_event().await, None);
    }
}
