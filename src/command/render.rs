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

//! Command line rendering.
//!
//! Rendering is a pure function of the verb, its arguments, the folded scope
//! context and the configuration. The wrappers nest in a fixed order,
//! outermost first:
//!
//! ```text
//! cd <dir> && umask <mask> && ( ENV=v sudo -u <user> ENV=v -- sh -c '<base>' )
//! ```

use std::borrow::Cow;
use std::collections::BTreeMap;

use super::scope::ScopeContext;
use super::Arg;
use crate::config::Config;

/// Prefix that resolves the verb through `PATH` on the remote side.
pub const ENV_PREFIX: &str = "/usr/bin/env";

/// Quote a single word for a POSIX shell, leaving safe words untouched.
pub fn escape(word: &str) -> Cow<'_, str> {
    shell_escape::unix::escape(Cow::Borrowed(word))
}

/// A verb containing whitespace is a ready-made shell snippet.
pub fn is_shell_snippet(verb: &str) -> bool {
    verb.chars().any(char::is_whitespace)
}

/// Render the full line sent to the remote shell.
pub fn render_line(verb: &str, args: &[Arg], context: &ScopeContext, config: &Config) -> String {
    if is_shell_snippet(verb) {
        return join_args(verb.to_string(), args);
    }

    let prefix = config
        .command_map
        .get(verb)
        .map(String::as_str)
        .unwrap_or(ENV_PREFIX);
    let mut line = join_args(format!("{} {}", prefix, escape(verb)), args);

    let env = effective_env(context, config);
    let assignments = render_assignments(&env);

    if let Some(user) = &context.user {
        let env_part = if assignments.is_empty() {
            String::new()
        } else {
            format!("{assignments} ")
        };
        line = format!(
            "sudo -u {} {}-- sh -c {}",
            escape(user),
            env_part,
            escape(&line)
        );
    }

    if !assignments.is_empty() {
        line = format!("( {assignments} {line} )");
    }

    if let Some(umask) = &config.umask {
        line = format!("umask {} && {}", escape(umask), line);
    }

    if let Some(directory) = &context.directory {
        line = format!("cd {} && {}", escape_path(directory), line);
    }

    line
}

/// Guard run before entering a directory scope.
pub fn directory_guard(path: &str) -> String {
    let operand = escape_path(path);
    let message = format!("Directory does not exist '{path}'");
    format!(
        "if test ! -d {}; then echo {} 1>&2; false; fi",
        operand,
        guard_message(&message, operand == path)
    )
}

/// Guard run before entering a user scope.
pub fn user_guard(user: &str) -> String {
    let operand = escape(user);
    let message =
        format!("You cannot switch to user '{user}' using sudo, please check the sudoers file");
    format!(
        "if ! sudo -u {} whoami > /dev/null; then echo {} 1>&2; false; fi",
        operand,
        guard_message(&message, operand == user)
    )
}

/// Double-quote the diagnostic when the operand needed no escaping,
/// otherwise single-quote it so the shell never expands its contents.
fn guard_message(message: &str, plain: bool) -> String {
    if plain {
        format!("\"{message}\"")
    } else {
        escape(message).into_owned()
    }
}

fn join_args(mut line: String, args: &[Arg]) -> String {
    for arg in args {
        line.push(' ');
        line.push_str(&arg.render());
    }
    line
}

fn effective_env(context: &ScopeContext, config: &Config) -> BTreeMap<String, String> {
    let mut env: BTreeMap<String, String> = config
        .default_env
        .iter()
        .map(|(k, v)| (k.to_uppercase(), v.clone()))
        .collect();
    env.extend(context.env.iter().map(|(k, v)| (k.clone(), v.clone())));
    env
}

fn render_assignments(env: &BTreeMap<String, String>) -> String {
    env.iter()
        .map(|(key, value)| format!("{}={}", key, escape(value)))
        .collect::<Vec<_>>()
        .join(" ")
}

/// Escape a path but keep a leading `~` so the remote shell expands it.
fn escape_path(path: &str) -> Cow<'_, str> {
    if path == "~" {
        return Cow::Borrowed(path);
    }
    match path.strip_prefix("~/") {
        Some(rest) => Cow::Owned(format!("~/{}", escape(rest))),
        None => escape(path),
    }
}
