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

//! Prompt/response negotiation for interactive commands.
//!
//! An [`InteractionHandler`] is an ordered list of (pattern, response) rules.
//! Output from the remote process accumulates until a rule matches; the text
//! up to the end of the match is then consumed and the response, if any, is
//! written to the process's stdin. Rules are tried in the order they were
//! declared, so earlier rules take priority when several could match.
//!
//! Responses are held in zeroizing buffers since they are often passwords.

use regex::Regex;
use std::fmt;
use std::ops::Range;
use zeroize::Zeroizing;

/// Prompt emitted by sudo when it asks for the invoking user's password.
pub const SUDO_PROMPT_PATTERN: &str = r"(?i)\[sudo\] password for [^:\n]*:\s*";

/// What a rule looks for in the output.
#[derive(Debug, Clone)]
pub enum Pattern {
    Literal(String),
    Regex(Regex),
}

impl Pattern {
    pub fn regex(pattern: &str) -> Result<Self, regex::Error> {
        Ok(Pattern::Regex(Regex::new(pattern)?))
    }

    fn find(&self, haystack: &str) -> Option<Range<usize>> {
        match self {
            Pattern::Literal(text) => haystack
                .find(text.as_str())
                .map(|start| start..start + text.len()),
            Pattern::Regex(regex) => regex.find(haystack).map(|m| m.range()),
        }
    }
}

impl From<&str> for Pattern {
    fn from(text: &str) -> Self {
        Pattern::Literal(text.to_string())
    }
}

impl From<String> for Pattern {
    fn from(text: String) -> Self {
        Pattern::Literal(text)
    }
}

impl From<Regex> for Pattern {
    fn from(regex: Regex) -> Self {
        Pattern::Regex(regex)
    }
}

impl fmt::Display for Pattern {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Pattern::Literal(text) => write!(f, "{text:?}"),
            Pattern::Regex(regex) => write!(f, "/{}/", regex.as_str()),
        }
    }
}

/// Handler lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InteractionState {
    /// No output seen yet.
    Idle,
    /// Waiting for output that matches a rule.
    AwaitingMatch,
    /// A rule matched and its response is being sent.
    Responding,
    /// The process exited; no more matching happens.
    Done,
}

#[derive(Clone)]
struct Rule {
    pattern: Pattern,
    response: Option<Zeroizing<String>>,
}

impl fmt::Debug for Rule {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Rule")
            .field("pattern", &self.pattern)
            .field("response", &self.response.as_ref().map(|_| "[REDACTED]"))
            .finish()
    }
}

/// Ordered prompt/response rules plus the matching state for one command.
#[derive(Debug, Clone)]
pub struct InteractionHandler {
    rules: Vec<Rule>,
    unconsumed: String,
    partial: Vec<u8>,
    state: InteractionState,
}

impl Default for InteractionHandler {
    fn default() -> Self {
        Self::new()
    }
}

impl InteractionHandler {
    pub fn new() -> Self {
        Self {
            rules: Vec::new(),
            unconsumed: String::new(),
            partial: Vec::new(),
            state: InteractionState::Idle,
        }
    }

    /// Write `response` to stdin when `pattern` appears.
    pub fn respond(mut self, pattern: impl Into<Pattern>, response: impl Into<String>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response: Some(Zeroizing::new(response.into())),
        });
        self
    }

    /// Consume `pattern` without answering it.
    pub fn observe(mut self, pattern: impl Into<Pattern>) -> Self {
        self.rules.push(Rule {
            pattern: pattern.into(),
            response: None,
        });
        self
    }

    /// Answer sudo's password prompt with `password`.
    pub fn sudo_password(self, password: &str) -> Result<Self, regex::Error> {
        Ok(self.respond(Pattern::regex(SUDO_PROMPT_PATTERN)?, format!("{password}\n")))
    }

    pub fn is_empty(&self) -> bool {
        self.rules.is_empty()
    }

    pub fn len(&self) -> usize {
        self.rules.len()
    }

    pub fn state(&self) -> InteractionState {
        self.state
    }

    /// Output received but not yet consumed by a match.
    pub fn unconsumed(&self) -> &str {
        &self.unconsumed
    }

    /// Feed process output and collect the responses to write, in order.
    pub(crate) fn feed(&mut self, output: &[u8]) -> Vec<Zeroizing<String>> {
        if self.state == InteractionState::Done {
            return Vec::new();
        }
        self.state = InteractionState::AwaitingMatch;
        self.push_output(output);

        let mut responses = Vec::new();
        while let Some((index, end)) = self.first_match() {
            self.state = InteractionState::Responding;
            tracing::trace!("Interaction rule {} matched", self.rules[index].pattern);
            self.unconsumed.replace_range(..end, "");
            if let Some(response) = &self.rules[index].response {
                responses.push(response.clone());
            }
        }
        self.state = InteractionState::AwaitingMatch;
        responses
    }

    /// Stop matching; called once the process has exited.
    pub(crate) fn finish(&mut self) {
        self.state = InteractionState::Done;
        self.unconsumed.clear();
        self.partial.clear();
    }

    fn first_match(&self) -> Option<(usize, usize)> {
        self.rules.iter().enumerate().find_map(|(index, rule)| {
            rule.pattern
                .find(&self.unconsumed)
                // An empty match would never consume anything.
                .filter(|range| range.end > 0)
                .map(|range| (index, range.end))
        })
    }

    fn push_output(&mut self, output: &[u8]) {
        self.partial.extend_from_slice(output);
        // Hold back a trailing partial UTF-8 sequence until the rest arrives.
        let complete = match std::str::from_utf8(&self.partial) {
            Ok(_) => self.partial.len(),
            Err(e) if e.error_len().is_none() => e.valid_up_to(),
            Err(_) => self.partial.len(),
        };
        let bytes: Vec<u8> = self.partial.drain(..complete).collect();
        self.unconsumed.push_str(&String::from_utf8_lossy(&bytes));
    }
}

impl<P, R> FromIterator<(P, Option<R>)> for InteractionHandler
where
    P: Into<Pattern>,
    R: Into<String>,
{
    fn from_iter<I: IntoIterator<Item = (P, Option<R>)>>(iter: I) -> Self {
        iter.into_iter()
            .fold(InteractionHandler::new(), |handler, (pattern, response)| {
                match response {
                    Some(response) => handler.respond(pattern, response),
                    None => handler.observe(pattern),
                }
            })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn texts(responses: Vec<Zeroizing<String>>) -> Vec<String> {
        responses.iter().map(|r| r.to_string()).collect()
    }

    #[test]
    fn test_two_turn_exchange() {
        let mut handler = InteractionHandler::new()
            .respond("Enter Data\n", "SOME DATA\n")
            .observe("Captured SOME DATA\n");
        assert_eq!(handler.state(), InteractionState::Idle);

        assert_eq!(texts(handler.feed(b"Enter Data\n")), vec!["SOME DATA\n"]);
        assert_eq!(handler.state(), InteractionState::AwaitingMatch);

        assert!(handler.feed(b"Captured SOME DATA\n").is_empty());
        assert_eq!(handler.unconsumed(), "");
    }

    #[test]
    fn test_prompt_split_across_chunks() {
        let mut handler = InteractionHandler::new().respond("Password: ", "hunter2\n");

        assert!(handler.feed(b"Pass").is_empty());
        assert_eq!(texts(handler.feed(b"word: ")), vec!["hunter2\n"]);
    }

    #[test]
    fn test_declared_order_wins() {
        let mut handler = InteractionHandler::new()
            .respond("continue?", "first\n")
            .respond("Do you want to continue?", "second\n");

        assert_eq!(
            texts(handler.feed(b"Do you want to continue? [y/N]")),
            vec!["first\n"]
        );
    }

    #[test]
    fn test_match_consumes_through_end() {
        let mut handler = InteractionHandler::new().respond("ok?", "y\n");

        assert_eq!(texts(handler.feed(b"ok? ok? tail")), vec!["y\n", "y\n"]);
        assert_eq!(handler.unconsumed(), " tail");
    }

    #[test]
    fn test_regex_pattern() {
        let mut handler = InteractionHandler::new()
            .respond(Pattern::regex(r"Overwrite \S+\? ").unwrap(), "n\n");

        assert_eq!(
            texts(handler.feed(b"Overwrite /etc/hosts? ")),
            vec!["n\n"]
        );
    }

    #[test]
    fn test_sudo_prompt() {
        let mut handler = InteractionHandler::new().sudo_password("s3cret").unwrap();
        assert_eq!(
            texts(handler.feed(b"[sudo] password for deploy: ")),
            vec!["s3cret\n"]
        );
    }

    #[test]
    fn test_split_utf8_sequence_is_reassembled() {
        let mut handler = InteractionHandler::new().respond("café?", "oui\n");
        let bytes = "café?".as_bytes();

        assert!(handler.feed(&bytes[..4]).is_empty());
        assert_eq!(texts(handler.feed(&bytes[4..])), vec!["oui\n"]);
    }

    #[test]
    fn test_done_ignores_output() {
        let mut handler = InteractionHandler::new().respond("x", "y");
        handler.feed(b"partial");
        handler.finish();

        assert_eq!(handler.state(), InteractionState::Done);
        assert!(handler.feed(b"x").is_empty());
        assert_eq!(handler.unconsumed(), "");
    }

    #[test]
    fn test_from_ordered_pairs() {
        let handler: InteractionHandler = vec![
            ("Enter Data\n", Some("SOME DATA\n")),
            ("Captured SOME DATA\n", None),
        ]
        .into_iter()
        .collect();

        assert_eq!(handler.len(), 2);
    }

    #[test]
    fn test_debug_redacts_responses() {
        let handler = InteractionHandler::new().respond("Password:", "topsecret\n");
        let debug = format!("{handler:?}");
        assert!(!debug.contains("topsecret"));
        assert!(debug.contains("REDACTED"));
    }
}
