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

//! Commands, their arguments and the scoping frames that wrap them.

pub mod render;
pub mod scope;

use std::borrow::Cow;
use std::path::{Path, PathBuf};

use crate::backend::interaction::InteractionHandler;
use crate::config::{Config, OutputVerbosity};
use crate::error::CommandFailed;

pub use scope::{ScopeContext, ScopeStack, ScopingFrame};

/// One command argument.
///
/// Plain strings are shell-escaped when rendered. Use [`Arg::raw`] for
/// fragments that must reach the shell untouched, such as redirections.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Arg {
    Escaped(String),
    Raw(String),
}

impl Arg {
    pub fn raw(fragment: impl Into<String>) -> Self {
        Arg::Raw(fragment.into())
    }

    pub fn render(&self) -> Cow<'_, str> {
        match self {
            Arg::Escaped(word) => render::escape(word),
            Arg::Raw(fragment) => Cow::Borrowed(fragment),
        }
    }
}

impl From<&str> for Arg {
    fn from(word: &str) -> Self {
        Arg::Escaped(word.to_string())
    }
}

impl From<String> for Arg {
    fn from(word: String) -> Self {
        Arg::Escaped(word)
    }
}

impl From<&String> for Arg {
    fn from(word: &String) -> Self {
        Arg::Escaped(word.clone())
    }
}

impl From<&Path> for Arg {
    fn from(path: &Path) -> Self {
        Arg::Escaped(path.to_string_lossy().into_owned())
    }
}

impl From<PathBuf> for Arg {
    fn from(path: PathBuf) -> Self {
        Arg::from(path.as_path())
    }
}

impl From<&PathBuf> for Arg {
    fn from(path: &PathBuf) -> Self {
        Arg::from(path.as_path())
    }
}

/// Anything that can serve as the argument list of a verb.
///
/// `()` means no arguments.
pub trait IntoArgs {
    fn into_args(self) -> Vec<Arg>;
}

impl IntoArgs for () {
    fn into_args(self) -> Vec<Arg> {
        Vec::new()
    }
}

impl<A: Into<Arg>, const N: usize> IntoArgs for [A; N] {
    fn into_args(self) -> Vec<Arg> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<A: Into<Arg>> IntoArgs for Vec<A> {
    fn into_args(self) -> Vec<Arg> {
        self.into_iter().map(Into::into).collect()
    }
}

impl<A: Into<Arg> + Clone> IntoArgs for &[A] {
    fn into_args(self) -> Vec<Arg> {
        self.iter().cloned().map(Into::into).collect()
    }
}

/// One fully resolved shell invocation.
///
/// The line is rendered once, at construction, from the scope that was active
/// at that moment. Output buffers fill while the command runs and freeze once
/// the exit status is recorded.
#[derive(Debug, Clone)]
pub struct Command {
    verb: String,
    args: Vec<Arg>,
    frames: Vec<ScopingFrame>,
    line: String,
    verbosity: OutputVerbosity,
    interaction: Option<InteractionHandler>,
    stdout: Vec<u8>,
    stderr: Vec<u8>,
    exit_status: Option<u32>,
}

impl Command {
    pub fn new(verb: impl Into<String>, args: Vec<Arg>, scope: &ScopeStack, config: &Config) -> Self {
        let verb = verb.into();
        let line = render::render_line(&verb, &args, &scope.context(), config);
        Self {
            verb,
            args,
            frames: scope.frames().to_vec(),
            line,
            verbosity: OutputVerbosity::Info,
            interaction: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_status: None,
        }
    }

    /// A literal shell line run outside any scope, as used by guards.
    pub fn raw(line: impl Into<String>) -> Self {
        let line = line.into();
        Self {
            verb: line.clone(),
            args: Vec::new(),
            frames: Vec::new(),
            line,
            verbosity: OutputVerbosity::Debug,
            interaction: None,
            stdout: Vec::new(),
            stderr: Vec::new(),
            exit_status: None,
        }
    }

    pub fn with_interaction(mut self, handler: InteractionHandler) -> Self {
        self.interaction = if handler.is_empty() { None } else { Some(handler) };
        self
    }

    pub fn with_verbosity(mut self, verbosity: OutputVerbosity) -> Self {
        self.verbosity = verbosity;
        self
    }

    pub fn verb(&self) -> &str {
        &self.verb
    }

    pub fn args(&self) -> &[Arg] {
        &self.args
    }

    /// Frames that were active when the command was built.
    pub fn frames(&self) -> &[ScopingFrame] {
        &self.frames
    }

    pub fn rendered_line(&self) -> &str {
        &self.line
    }

    pub fn verbosity(&self) -> OutputVerbosity {
        self.verbosity
    }

    pub fn interaction(&self) -> Option<&InteractionHandler> {
        self.interaction.as_ref()
    }

    pub(crate) fn interaction_mut(&mut self) -> Option<&mut InteractionHandler> {
        self.interaction.as_mut()
    }

    /// Interactive commands get a pty so prompts are flushed as they are printed.
    pub fn wants_pty(&self) -> bool {
        self.interaction.is_some()
    }

    pub fn stdout(&self) -> &[u8] {
        &self.stdout
    }

    pub fn stderr(&self) -> &[u8] {
        &self.stderr
    }

    pub fn stdout_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stdout)
    }

    pub fn stderr_lossy(&self) -> Cow<'_, str> {
        String::from_utf8_lossy(&self.stderr)
    }

    pub fn exit_status(&self) -> Option<u32> {
        self.exit_status
    }

    pub fn is_finished(&self) -> bool {
        self.exit_status.is_some()
    }

    pub fn is_success(&self) -> bool {
        self.exit_status == Some(0)
    }

    pub(crate) fn append_stdout(&mut self, data: &[u8]) {
        if !self.is_finished() {
            self.stdout.extend_from_slice(data);
        }
    }

    pub(crate) fn append_stderr(&mut self, data: &[u8]) {
        if !self.is_finished() {
            self.stderr.extend_from_slice(data);
        }
    }

    pub(crate) fn finish(&mut self, exit_status: u32) {
        if self.exit_status.is_none() {
            self.exit_status = Some(exit_status);
            if let Some(handler) = self.interaction.as_mut() {
                handler.finish();
            }
        }
    }

    /// The failure this command represents, if it finished unsuccessfully.
    pub fn failure(&self) -> Option<CommandFailed> {
        match self.exit_status {
            Some(status) if status != 0 => Some(CommandFailed {
                verb: self.verb.clone(),
                exit_status: status,
                stdout: self.stdout_lossy().into_owned(),
                stderr: self.stderr_lossy().into_owned(),
            }),
            _ => None,
        }
    }
}
