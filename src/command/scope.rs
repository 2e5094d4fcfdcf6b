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

//! Nested command context.
//!
//! Each `within`, `as_user` and `with_env` block pushes one frame. The frames
//! are folded into a [`ScopeContext`] when a command is rendered, so the
//! stack itself never needs to know how a command line looks.

use std::collections::BTreeMap;

/// One nested modifier of the commands issued inside it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScopingFrame {
    Directory(String),
    User(String),
    Env(BTreeMap<String, String>),
}

/// Effective context after folding every active frame, outermost first.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ScopeContext {
    pub directory: Option<String>,
    pub user: Option<String>,
    /// Upper-cased keys; inner frames win on collision.
    pub env: BTreeMap<String, String>,
}

impl ScopeContext {
    pub fn is_empty(&self) -> bool {
        self.directory.is_none() && self.user.is_none() && self.env.is_empty()
    }

    /// The directory a new `Directory(path)` frame would resolve to.
    pub fn directory_after(&self, path: &str) -> String {
        join_directory(self.directory.as_deref(), path)
    }

    fn apply(&mut self, frame: &ScopingFrame) {
        match frame {
            ScopingFrame::Directory(path) => {
                self.directory = Some(join_directory(self.directory.as_deref(), path));
            }
            ScopingFrame::User(name) => self.user = Some(name.clone()),
            ScopingFrame::Env(vars) => {
                for (key, value) in vars {
                    self.env.insert(key.to_uppercase(), value.clone());
                }
            }
        }
    }
}

fn join_directory(outer: Option<&str>, inner: &str) -> String {
    match outer {
        Some(outer) if !(inner.starts_with('/') || inner.starts_with('~')) => {
            format!("{}/{}", outer.trim_end_matches('/'), inner)
        }
        _ => inner.to_string(),
    }
}

/// Stack of active frames for one backend.
#[derive(Debug, Clone, Default)]
pub struct ScopeStack {
    frames: Vec<ScopingFrame>,
}

impl ScopeStack {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, frame: ScopingFrame) {
        self.frames.push(frame);
    }

    pub fn pop(&mut self) -> Option<ScopingFrame> {
        self.frames.pop()
    }

    pub fn frames(&self) -> &[ScopingFrame] {
        &self.frames
    }

    pub fn depth(&self) -> usize {
        self.frames.len()
    }

    pub fn is_empty(&self) -> bool {
        self.frames.is_empty()
    }

    pub fn context(&self) -> ScopeContext {
        let mut context = ScopeContext::default();
        for frame in &self.frames {
            context.apply(frame);
        }
        context
    }
}
