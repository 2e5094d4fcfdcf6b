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

//! Error types surfaced by backends and transports.

use std::fmt;
use std::io;

use thiserror::Error;

/// Placeholder printed in failure messages when a stream produced no output.
const NOTHING_WRITTEN: &str = "Nothing written";

/// Errors raised by a [`Backend`](crate::backend::Backend) verb.
#[derive(Debug, Error)]
pub enum Error {
    /// The session to a host could not be established or authenticated.
    #[error("Connection to {host} failed: {reason}")]
    Connection { host: String, reason: String },

    /// A command exited with a non-zero status.
    #[error(transparent)]
    CommandFailed(#[from] CommandFailed),

    /// The directory guard run when entering `within` failed.
    #[error("{failure}")]
    DirectoryGuardFailed {
        path: String,
        failure: CommandFailed,
    },

    /// The sudo pre-check run when entering `as_user` failed.
    #[error("{failure}")]
    UserSwitchGuardFailed {
        user: String,
        failure: CommandFailed,
    },

    /// Upload or download failed part way.
    #[error("{direction} of '{path}' failed: {source}")]
    Transfer {
        direction: TransferDirection,
        path: String,
        #[source]
        source: io::Error,
    },

    /// The session or channel broke while a command was running.
    #[error("Channel error: {0}")]
    Channel(String),

    /// The remote side closed the channel without reporting how the process exited.
    #[error("'{0}' finished without reporting an exit status")]
    NoExitStatus(String),

    /// Transport options did not deserialize into the transport's settings.
    #[error("Invalid transport options: {0}")]
    InvalidOptions(String),
}

impl Error {
    /// The underlying command failure, for command and guard errors.
    pub fn command_failure(&self) -> Option<&CommandFailed> {
        match self {
            Error::CommandFailed(failure)
            | Error::DirectoryGuardFailed { failure, .. }
            | Error::UserSwitchGuardFailed { failure, .. } => Some(failure),
            _ => None,
        }
    }
}

/// Direction of a file transfer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TransferDirection {
    Upload,
    Download,
}

impl fmt::Display for TransferDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransferDirection::Upload => write!(f, "Upload"),
            TransferDirection::Download => write!(f, "Download"),
        }
    }
}

/// A command that finished with a non-zero exit status.
///
/// The display form is stable and lists the exit status followed by the
/// trimmed stdout and stderr, each on its own line:
///
/// ```text
/// echo exit status: 1
/// echo stdout: Nothing written
/// echo stderr: Test capturing stderr
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub struct CommandFailed {
    pub verb: String,
    pub exit_status: u32,
    pub stdout: String,
    pub stderr: String,
}

impl fmt::Display for CommandFailed {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "{} exit status: {}", self.verb, self.exit_status)?;
        writeln!(f, "{} stdout: {}", self.verb, or_nothing(&self.stdout))?;
        writeln!(f, "{} stderr: {}", self.verb, or_nothing(&self.stderr))
    }
}

fn or_nothing(output: &str) -> &str {
    let trimmed = output.trim();
    if trimmed.is_empty() {
        NOTHING_WRITTEN
    } else {
        trimmed
    }
}
