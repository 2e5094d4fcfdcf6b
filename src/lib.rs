//! Run shell commands on one or many hosts over SSH.
//!
//! A [`Backend`] drives a single host: it renders commands against nested
//! `within` / `as_user` / `with_env` scopes, runs them over a pooled session
//! and captures their output. A [`Coordinator`] runs one async block per host
//! under a [`RunPolicy`] and gathers the outcomes.

pub mod backend;
pub mod command;
pub mod config;
pub mod error;
pub mod executor;
pub mod host;
pub mod ssh;
pub mod utils;

pub use backend::{Backend, InteractionHandler, Pattern, RunOptions, Scoped, UploadSource};
pub use command::{Arg, Command, IntoArgs};
pub use config::{Config, OutputVerbosity};
pub use error::{CommandFailed, Error, TransferDirection};
pub use executor::{CompositeRunFailure, Coordinator, Outcome, RunOutcome, RunPolicy, RunReport};
pub use host::Host;
pub use ssh::{Connector, DryRunConnector, LocalConnector, SshConnector, TransportOptions};
