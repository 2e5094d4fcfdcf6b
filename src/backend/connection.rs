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

//! Lazily established, pooled session for one backend.

use std::sync::Arc;
use tokio::sync::{Mutex, MutexGuard};
use tracing::debug;

use crate::error::Error;
use crate::host::Host;
use crate::ssh::{ConnectionPool, Connector, Session, TransportOptions};

/// Holds at most one session for a host.
///
/// The session is opened on first use and kept for every later command. The
/// lock is held for the whole command, so commands on one backend never
/// interleave on the wire.
pub(crate) struct ConnectionSlot {
    host: Host,
    options: TransportOptions,
    connector: Arc<dyn Connector>,
    pool: Arc<ConnectionPool>,
    session: Mutex<Option<Box<dyn Session>>>,
}

pub(crate) type SessionGuard<'a> = MutexGuard<'a, Option<Box<dyn Session>>>;

impl ConnectionSlot {
    pub(crate) fn new(
        host: Host,
        options: TransportOptions,
        connector: Arc<dyn Connector>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        Self {
            host,
            options,
            connector,
            pool,
            session: Mutex::new(None),
        }
    }

    pub(crate) fn options(&self) -> &TransportOptions {
        &self.options
    }

    /// Lock the slot, connecting first if no live session is held.
    pub(crate) async fn lock(&self) -> Result<SessionGuard<'_>, Error> {
        let mut guard = self.session.lock().await;
        if guard.as_ref().is_some_and(|session| session.is_closed()) {
            debug!("Session to {} was closed, reconnecting", self.host);
            *guard = None;
        }
        if guard.is_none() {
            let session = self
                .pool
                .checkout(&self.host, &self.options, self.connector.as_ref())
                .await?;
            *guard = Some(session);
        }
        Ok(guard)
    }

    /// Give the session up: back to the pool when `reusable`, closed otherwise.
    pub(crate) async fn release(&self, reusable: bool) {
        let Some(session) = self.session.lock().await.take() else {
            return;
        };
        if reusable {
            self.pool.checkin(&self.host, &self.options, session).await;
        } else if let Err(e) = session.close().await {
            debug!("Failed to close session to {}: {}", self.host, e);
        }
    }

    pub(crate) async fn is_connected(&self) -> bool {
        self.session
            .lock()
            .await
            .as_ref()
            .is_some_and(|session| !session.is_closed())
    }
}

/// Borrow the session out of a locked slot.
pub(crate) fn session_of<'g>(guard: &'g SessionGuard<'_>) -> Result<&'g dyn Session, Error> {
    guard
        .as_deref()
        .ok_or_else(|| Error::Channel("no session is open".to_string()))
}
