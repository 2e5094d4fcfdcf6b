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

//! Reuse of idle sessions across runs.
//!
//! A checked-out session belongs to exactly one backend until it is checked
//! back in, so a session is never driven by two tasks at once.

use std::collections::HashMap;
use std::time::{Duration, Instant};
use tokio::sync::Mutex;
use tracing::{debug, trace};

use super::options::TransportOptions;
use super::transport::{Connector, Session};
use crate::config::PoolSettings;
use crate::error::Error;
use crate::host::Host;

#[derive(Debug, Clone, Hash, Eq, PartialEq)]
struct ConnectionKey {
    host: String,
    port: u16,
    user: Option<String>,
    options: String,
}

impl ConnectionKey {
    fn new(host: &Host, options: &TransportOptions) -> Self {
        Self {
            host: host.hostname.clone(),
            port: host.port,
            user: host.user.clone(),
            options: options.fingerprint(),
        }
    }
}

struct IdleSession {
    session: Box<dyn Session>,
    since: Instant,
}

/// Pool of idle sessions keyed by host identity and effective options.
pub struct ConnectionPool {
    idle: Mutex<HashMap<ConnectionKey, Vec<IdleSession>>>,
    idle_timeout: Duration,
    enabled: bool,
}

impl ConnectionPool {
    pub fn new(idle_timeout: Duration, enabled: bool) -> Self {
        Self {
            idle: Mutex::new(HashMap::new()),
            idle_timeout,
            enabled,
        }
    }

    /// A pool that never keeps sessions; every checkout connects.
    pub fn disabled() -> Self {
        Self::new(Duration::from_secs(0), false)
    }

    pub fn with_defaults() -> Self {
        Self::from_settings(&PoolSettings::default())
    }

    pub fn from_settings(settings: &PoolSettings) -> Self {
        Self::new(settings.idle_timeout(), settings.enabled)
    }

    /// Take an idle session for `host`, or open a new one.
    pub async fn checkout(
        &self,
        host: &Host,
        options: &TransportOptions,
        connector: &dyn Connector,
    ) -> Result<Box<dyn Session>, Error> {
        if self.enabled {
            let key = ConnectionKey::new(host, options);
            let mut stale = Vec::new();
            let reused = {
                let mut idle = self.idle.lock().await;
                let mut found = None;
                if let Some(entries) = idle.get_mut(&key) {
                    while let Some(entry) = entries.pop() {
                        if entry.since.elapsed() < self.idle_timeout && !entry.session.is_closed() {
                            found = Some(entry.session);
                            break;
                        }
                        stale.push(entry.session);
                    }
                    if entries.is_empty() {
                        idle.remove(&key);
                    }
                }
                found
            };
            close_all(stale).await;

            if let Some(session) = reused {
                trace!("Reusing pooled session for {}", host);
                return Ok(session);
            }
        }

        debug!("Opening new session to {}", host);
        connector.connect(host, options).await
    }

    /// Return a healthy session for later reuse. Closes it when pooling is off.
    pub async fn checkin(&self, host: &Host, options: &TransportOptions, session: Box<dyn Session>) {
        if !self.enabled || session.is_closed() {
            close_all(vec![session]).await;
            return;
        }
        trace!("Returning session for {} to the pool", host);
        let key = ConnectionKey::new(host, options);
        self.idle
            .lock()
            .await
            .entry(key)
            .or_default()
            .push(IdleSession {
                session,
                since: Instant::now(),
            });
    }

    /// Close idle sessions older than the idle timeout.
    pub async fn cleanup_expired(&self) {
        let mut expired = Vec::new();
        {
            let mut idle = self.idle.lock().await;
            for entries in idle.values_mut() {
                let (keep, old): (Vec<_>, Vec<_>) = entries
                    .drain(..)
                    .partition(|entry| entry.since.elapsed() < self.idle_timeout);
                *entries = keep;
                expired.extend(old.into_iter().map(|entry| entry.session));
            }
            idle.retain(|_, entries| !entries.is_empty());
        }
        close_all(expired).await;
    }

    /// Close every idle session.
    pub async fn clear(&self) {
        let sessions: Vec<_> = {
            let mut idle = self.idle.lock().await;
            idle.drain()
                .flat_map(|(_, entries)| entries.into_iter().map(|entry| entry.session))
                .collect()
        };
        close_all(sessions).await;
    }

    /// Number of idle sessions.
    pub async fn size(&self) -> usize {
        self.idle.lock().await.values().map(Vec::len).sum()
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }
}

impl Default for ConnectionPool {
    fn default() -> Self {
        Self::with_defaults()
    }
}

async fn close_all(sessions: Vec<Box<dyn Session>>) {
    for session in sessions {
        if let Err(e) = session.close().await {
            debug!("Failed to close session: {}", e);
        }
    }
}
