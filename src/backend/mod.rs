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

//! Per-host execution façade.
//!
//! A [`Backend`] couples one host's connection with a scope stack and exposes
//! the operator verbs: [`execute`](Backend::execute), [`test`](Backend::test),
//! [`capture`](Backend::capture), [`upload`](Backend::upload) and
//! [`download`](Backend::download). Scopes are entered with
//! [`within`](Backend::within), [`as_user`](Backend::as_user) and
//! [`with_env`](Backend::with_env); each returns a [`Scoped`] guard that
//! pops its frame when dropped, whichever way the block exits.
//!
//! ```no_run
//! # use std::sync::Arc;
//! # use deckhand::{Backend, Config, Host, LocalConnector};
//! # async fn demo() -> Result<(), deckhand::Error> {
//! let mut backend = Backend::new(
//!     Host::new("localhost"),
//!     Arc::new(LocalConnector::new()),
//!     Arc::new(Config::default()),
//! );
//! let mut tmp = backend.within("/tmp").await?;
//! tmp.execute("touch", ["restart.txt"]).await?;
//! # Ok(())
//! # }
//! ```

pub mod interaction;

pub(crate) mod connection;
mod pump;
mod transfer;

use std::collections::BTreeMap;
use std::fmt;
use std::ops::{Deref, DerefMut};
use std::path::Path;
use std::sync::Arc;

use crate::command::{render, Command, IntoArgs, ScopeStack, ScopingFrame};
use crate::config::{Config, OutputVerbosity};
use crate::error::Error;
use crate::host::Host;
use crate::ssh::{ConnectionPool, Connector, TransportOptions};
use connection::{session_of, ConnectionSlot};

pub use interaction::{InteractionHandler, InteractionState, Pattern};
pub use transfer::UploadSource;

/// What `run_command` does with a non-zero exit.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum FailurePolicy {
    Raise,
    Tolerate,
}

/// Per-call options for [`Backend::capture_with`] and [`Backend::execute_with`].
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Strip trailing whitespace from captured output. Ignored by `execute_with`.
    pub strip: bool,
    /// Prompt/response rules fed with the command's stdout.
    pub interaction: InteractionHandler,
    /// Level the command line and its completion are logged at.
    pub verbosity: Option<OutputVerbosity>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            strip: true,
            interaction: InteractionHandler::new(),
            verbosity: None,
        }
    }
}

impl RunOptions {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn strip(mut self, strip: bool) -> Self {
        self.strip = strip;
        self
    }

    pub fn interaction(mut self, handler: InteractionHandler) -> Self {
        self.interaction = handler;
        self
    }

    pub fn verbosity(mut self, verbosity: OutputVerbosity) -> Self {
        self.verbosity = Some(verbosity);
        self
    }
}

/// Execution façade for one host.
pub struct Backend {
    host: Host,
    config: Arc<Config>,
    scope: ScopeStack,
    connection: Arc<ConnectionSlot>,
}

impl Backend {
    /// Build a backend with its own session pool, configured from `config`.
    pub fn new(host: Host, connector: Arc<dyn Connector>, config: Arc<Config>) -> Self {
        let pool = Arc::new(ConnectionPool::from_settings(&config.pool));
        Self::with_pool(host, connector, config, pool)
    }

    /// Build a backend that draws its session from a shared pool.
    ///
    /// Transport options are resolved here; later changes to the host do not
    /// reach this backend.
    pub fn with_pool(
        host: Host,
        connector: Arc<dyn Connector>,
        config: Arc<Config>,
        pool: Arc<ConnectionPool>,
    ) -> Self {
        let options = config.resolve_transport_options(&host);
        let connection = Arc::new(ConnectionSlot::new(host.clone(), options, connector, pool));
        Self {
            host,
            config,
            scope: ScopeStack::new(),
            connection,
        }
    }

    pub fn host(&self) -> &Host {
        &self.host
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    /// Effective transport options this backend connects with.
    pub fn transport_options(&self) -> &TransportOptions {
        self.connection.options()
    }

    pub fn scope(&self) -> &ScopeStack {
        &self.scope
    }

    pub async fn is_connected(&self) -> bool {
        self.connection.is_connected().await
    }

    /// Close the session, if one is open. The next verb reconnects.
    pub async fn close(&self) {
        self.connection.release(false).await;
    }

    pub(crate) fn connection(&self) -> Arc<ConnectionSlot> {
        Arc::clone(&self.connection)
    }

    /// Render `verb` against the current scope without running it.
    pub fn command(&self, verb: &str, args: impl IntoArgs) -> Command {
        Command::new(verb, args.into_args(), &self.scope, &self.config)
    }

    /// Run a command, failing with [`Error::CommandFailed`] on a non-zero exit.
    pub async fn execute(&self, verb: &str, args: impl IntoArgs) -> Result<(), Error> {
        self.execute_with(verb, args, RunOptions::default()).await
    }

    pub async fn execute_with(
        &self,
        verb: &str,
        args: impl IntoArgs,
        options: RunOptions,
    ) -> Result<(), Error> {
        let command = self.prepare(verb, args, options.interaction, options.verbosity);
        self.run_command(command, FailurePolicy::Raise).await?;
        Ok(())
    }

    /// Whether the command exits with status 0. Never fails on a non-zero exit.
    pub async fn test(&self, verb: &str, args: impl IntoArgs) -> Result<bool, Error> {
        let command = self.command(verb, args);
        let command = self.run_command(command, FailurePolicy::Tolerate).await?;
        Ok(command.is_success())
    }

    /// Stdout of the command with trailing whitespace removed.
    pub async fn capture(&self, verb: &str, args: impl IntoArgs) -> Result<String, Error> {
        self.capture_with(verb, args, RunOptions::default()).await
    }

    pub async fn capture_with(
        &self,
        verb: &str,
        args: impl IntoArgs,
        options: RunOptions,
    ) -> Result<String, Error> {
        let command = self.prepare(verb, args, options.interaction, options.verbosity);
        let command = self.run_command(command, FailurePolicy::Raise).await?;
        let output = command.stdout_lossy();
        Ok(if options.strip {
            output.trim_end().to_string()
        } else {
            output.into_owned()
        })
    }

    /// Upload `source` to `destination`, returning the number of bytes sent.
    ///
    /// A relative destination is resolved against the current `within` directory.
    pub async fn upload(
        &self,
        source: impl Into<UploadSource>,
        destination: &str,
    ) -> Result<u64, Error> {
        let source = source.into();
        let destination = self.remote_path(destination);
        let guard = self.connection.lock().await?;
        transfer::upload(session_of(&guard)?, source, &destination).await
    }

    /// The content of the remote file at `path`, byte for byte.
    pub async fn download(&self, path: &str) -> Result<Vec<u8>, Error> {
        let path = self.remote_path(path);
        let guard = self.connection.lock().await?;
        let mut content = Vec::new();
        transfer::download_into(session_of(&guard)?, &path, &mut content).await?;
        Ok(content)
    }

    /// Stream the remote file at `path` into `local`, returning its size.
    pub async fn download_to(&self, path: &str, local: impl AsRef<Path>) -> Result<u64, Error> {
        let path = self.remote_path(path);
        let guard = self.connection.lock().await?;
        transfer::download_to_file(session_of(&guard)?, &path, local.as_ref()).await
    }

    /// Enter `path` for the commands issued through the returned guard.
    ///
    /// Fails with [`Error::DirectoryGuardFailed`] when the directory does not
    /// exist on the host; no frame is pushed in that case.
    pub async fn within(&mut self, path: &str) -> Result<Scoped<'_>, Error> {
        let directory = self.scope.context().directory_after(path);
        let guard = Command::raw(render::directory_guard(&directory));
        let guard = self.run_command(guard, FailurePolicy::Tolerate).await?;
        if let Some(failure) = guard.failure() {
            return Err(Error::DirectoryGuardFailed {
                path: directory,
                failure,
            });
        }
        Ok(self.enter(ScopingFrame::Directory(path.to_string())))
    }

    /// Run the commands issued through the returned guard as `user` via sudo.
    pub async fn as_user(&mut self, user: &str) -> Result<Scoped<'_>, Error> {
        let guard = Command::raw(render::user_guard(user));
        let guard = self.run_command(guard, FailurePolicy::Tolerate).await?;
        if let Some(failure) = guard.failure() {
            return Err(Error::UserSwitchGuardFailed {
                user: user.to_string(),
                failure,
            });
        }
        Ok(self.enter(ScopingFrame::User(user.to_string())))
    }

    /// Set environment variables for the commands issued through the returned guard.
    pub fn with_env<I, K, V>(&mut self, vars: I) -> Scoped<'_>
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        let vars: BTreeMap<String, String> = vars
            .into_iter()
            .map(|(key, value)| (key.into(), value.into()))
            .collect();
        self.enter(ScopingFrame::Env(vars))
    }

    fn enter(&mut self, frame: ScopingFrame) -> Scoped<'_> {
        self.scope.push(frame);
        Scoped { backend: self }
    }

    fn prepare(
        &self,
        verb: &str,
        args: impl IntoArgs,
        interaction: InteractionHandler,
        verbosity: Option<OutputVerbosity>,
    ) -> Command {
        let command = self.command(verb, args).with_interaction(interaction);
        match verbosity {
            Some(verbosity) => command.with_verbosity(verbosity),
            None => command,
        }
    }

    fn remote_path(&self, path: &str) -> String {
        match self.scope.context().directory {
            Some(_) => self.scope.context().directory_after(path),
            None => path.to_string(),
        }
    }

    /// Run `command` to completion while holding the connection.
    async fn run_command(&self, mut command: Command, policy: FailurePolicy) -> Result<Command, Error> {
        {
            let guard = self.connection.lock().await?;
            let host = self.host.to_string();
            pump::run(session_of(&guard)?, &mut command, &host).await?;
        }

        if policy == FailurePolicy::Raise {
            if let Some(failure) = command.failure() {
                return Err(failure.into());
            }
        }
        Ok(command)
    }
}

impl fmt::Debug for Backend {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Backend")
            .field("host", &self.host)
            .field("scope", &self.scope)
            .finish_non_exhaustive()
    }
}

/// A backend with one extra scoping frame, popped on drop.
///
/// Dereferences to the [`Backend`], so verbs and further scopes are called on
/// the guard directly.
pub struct Scoped<'a> {
    backend: &'a mut Backend,
}

impl Deref for Scoped<'_> {
    type Target = Backend;

    fn deref(&self) -> &Backend {
        &*self.backend
    }
}

impl DerefMut for Scoped<'_> {
    fn deref_mut(&mut self) -> &mut Backend {
        &mut *self.backend
    }
}

impl Drop for Scoped<'_> {
    fn drop(&mut self) {
        self.backend.scope.pop();
    }
}
