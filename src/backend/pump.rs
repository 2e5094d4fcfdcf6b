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

//! Drives one command's channel to completion.

use std::time::Instant;
use tracing::{debug, error, info, trace, warn};

use crate::command::Command;
use crate::config::OutputVerbosity;
use crate::error::Error;
use crate::ssh::{ChannelEvent, Session};

macro_rules! log_at {
    ($verbosity:expr, $($arg:tt)+) => {
        match $verbosity {
            OutputVerbosity::Error => error!($($arg)+),
            OutputVerbosity::Warn => warn!($($arg)+),
            OutputVerbosity::Info => info!($($arg)+),
            OutputVerbosity::Debug => debug!($($arg)+),
            OutputVerbosity::Trace => trace!($($arg)+),
        }
    };
}

/// Run `command` on `session`, filling its output buffers and exit status.
///
/// A non-zero exit is recorded on the command, not returned as an error.
pub(crate) async fn run(session: &dyn Session, command: &mut Command, host: &str) -> Result<(), Error> {
    let verbosity = command.verbosity();
    log_at!(verbosity, "[{}] Command: {}", host, command.rendered_line());
    let started = Instant::now();

    let mut channel = session
        .exec(command.rendered_line(), command.wants_pty())
        .await?;
    if command.interaction().is_none() {
        channel.close_stdin().await?;
    }

    // Exit status can arrive ahead of trailing output, so it is applied only
    // once the channel has closed.
    let mut exit_status = None;
    while let Some(event) = channel.next_event().await {
        match event {
            ChannelEvent::Stdout(data) => {
                log_output(host, "stdout", &data);
                command.append_stdout(&data);
                let responses = command
                    .interaction_mut()
                    .map(|handler| handler.feed(&data))
                    .unwrap_or_default();
                for response in responses {
                    trace!("[{}] Writing interaction response", host);
                    channel.write_stdin(response.as_bytes()).await?;
                }
            }
            ChannelEvent::Stderr(data) => {
                log_output(host, "stderr", &data);
                command.append_stderr(&data);
            }
            ChannelEvent::ExitStatus(status) => exit_status = Some(status),
            ChannelEvent::Eof => trace!("[{}] Remote process closed its output", host),
        }
    }

    let Some(status) = exit_status else {
        return Err(Error::NoExitStatus(command.verb().to_string()));
    };
    command.finish(status);

    log_at!(
        verbosity,
        "[{}] Finished in {:.3} seconds with exit status {} ({}).",
        host,
        started.elapsed().as_secs_f64(),
        status,
        if status == 0 { "successful" } else { "failed" }
    );
    Ok(())
}

fn log_output(host: &str, stream: &str, data: &[u8]) {
    for line in String::from_utf8_lossy(data).lines() {
        debug!("[{}] {}: {}", host, stream, line);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::interaction::InteractionHandler;
    use crate::ssh::{ExecChannel, RemoteReader, RemoteWriter};
    use async_trait::async_trait;
    use std::io;
    use std::sync::{Arc, Mutex};

    /// Session that replays a fixed event script and records stdin.
    struct ScriptedSession {
        events: Vec<ChannelEvent>,
        stdin: Arc<Mutex<Vec<u8>>>,
        stdin_closed: Arc<Mutex<bool>>,
    }

    struct ScriptedChannel {
        events: std::vec::IntoIter<ChannelEvent>,
        stdin: Arc<Mutex<Vec<u8>>>,
        stdin_closed: Arc<Mutex<bool>>,
    }

    impl ScriptedSession {
        fn new(events: Vec<ChannelEvent>) -> Self {
            Self {
                events,
                stdin: Arc::default(),
                stdin_closed: Arc::default(),
            }
        }
    }

    #[async_trait]
    impl Session for ScriptedSession {
        async fn exec(&self, _line: &str, _pty: bool) -> Result<Box<dyn ExecChannel>, Error> {
            Ok(Box::new(ScriptedChannel {
                events: self.events.clone().into_iter(),
                stdin: Arc::clone(&self.stdin),
                stdin_closed: Arc::clone(&self.stdin_closed),
            }))
        }

        async fn open_writer(&self, _path: &str) -> io::Result<RemoteWriter> {
            Ok(Box::new(tokio::io::sink()))
        }

        async fn open_reader(&self, _path: &str) -> io::Result<RemoteReader> {
            Ok(Box::new(tokio::io::empty()))
        }

        async fn close(&self) -> Result<(), Error> {
            Ok(())
        }

        fn is_closed(&self) -> bool {
            false
        }
    }

    #[async_trait]
    impl ExecChannel for ScriptedChannel {
        async fn next_event(&mut self) -> Option<ChannelEvent> {
            self.events.next()
        }

        async fn write_stdin(&mut self, data: &[u8]) -> Result<(), Error> {
            self.stdin.lock().unwrap().extend_from_slice(data);
            Ok(())
        }

        async fn close_stdin(&mut self) -> Result<(), Error> {
            *self.stdin_closed.lock().unwrap() = true;
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_output_after_exit_status_is_kept() {
        let session = ScriptedSession::new(vec![
            ChannelEvent::Stdout(b"first\n".to_vec()),
            ChannelEvent::ExitStatus(0),
            ChannelEvent::Stdout(b"second\n".to_vec()),
            ChannelEvent::Eof,
        ]);
        let mut command = Command::raw("printf");

        run(&session, &mut command, "test").await.unwrap();

        assert_eq!(command.stdout(), b"first\nsecond\n");
        assert_eq!(command.exit_status(), Some(0));
        assert!(*session.stdin_closed.lock().unwrap());
    }

    #[tokio::test]
    async fn test_missing_exit_status_is_an_error() {
        let session = ScriptedSession::new(vec![ChannelEvent::Stdout(b"partial".to_vec())]);
        let mut command = Command::raw("sleep 100");

        let err = run(&session, &mut command, "test").await.unwrap_err();
        assert!(matches!(err, Error::NoExitStatus(verb) if verb == "sleep 100"));
        assert!(!command.is_finished());
    }

    #[tokio::test]
    async fn test_nonzero_exit_is_recorded_not_raised() {
        let session = ScriptedSession::new(vec![
            ChannelEvent::Stderr(b"boom\n".to_vec()),
            ChannelEvent::ExitStatus(3),
        ]);
        let mut command = Command::raw("false");

        run(&session, &mut command, "test").await.unwrap();
        assert_eq!(command.exit_status(), Some(3));
        assert_eq!(command.stderr(), b"boom\n");
    }

    #[tokio::test]
    async fn test_signal_status_is_a_command_failure() {
        let session = ScriptedSession::new(vec![
            ChannelEvent::Stdout(b"working\n".to_vec()),
            ChannelEvent::ExitStatus(143),
        ]);
        let mut command = Command::raw("sleep 100");

        run(&session, &mut command, "test").await.unwrap();

        let failure = command.failure().unwrap();
        assert_eq!(failure.exit_status, 143);
    }

    #[tokio::test]
    async fn test_interaction_responses_are_written() {
        let session = ScriptedSession::new(vec![
            ChannelEvent::Stdout(b"Enter ".to_vec()),
            ChannelEvent::Stdout(b"Data\n".to_vec()),
            ChannelEvent::Stdout(b"Captured SOME DATA\n".to_vec()),
            ChannelEvent::ExitStatus(0),
        ]);
        let handler = InteractionHandler::new()
            .respond("Enter Data\n", "SOME DATA\n")
            .observe("Captured SOME DATA\n");
        let mut command = Command::raw("read line").with_interaction(handler);

        run(&session, &mut command, "test").await.unwrap();

        assert_eq!(session.stdin.lock().unwrap().as_slice(), b"SOME DATA\n");
        assert!(!*session.stdin_closed.lock().unwrap());
        assert_eq!(command.stdout_lossy(), "Enter Data\nCaptured SOME DATA\n");
    }
}
