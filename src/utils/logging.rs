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

use tracing_subscriber::EnvFilter;

use crate::config::OutputVerbosity;

/// Create an environment filter for `verbosity`.
///
/// `RUST_LOG`, when set, takes precedence so dependencies can be debugged.
pub fn create_env_filter(verbosity: OutputVerbosity) -> EnvFilter {
    if std::env::var("RUST_LOG").is_ok() {
        EnvFilter::from_default_env()
    } else {
        EnvFilter::new(filter_directives(verbosity))
    }
}

fn filter_directives(verbosity: OutputVerbosity) -> &'static str {
    match verbosity {
        OutputVerbosity::Error => "deckhand=error",
        OutputVerbosity::Warn => "deckhand=warn",
        OutputVerbosity::Info => "deckhand=info",
        // Include russh debug logs for SSH troubleshooting
        OutputVerbosity::Debug => "deckhand=debug,russh=debug",
        OutputVerbosity::Trace => "deckhand=trace,russh=trace,russh_sftp=debug",
    }
}

/// Install a console subscriber for `verbosity`.
///
/// Does nothing if a global subscriber is already installed, so libraries
/// and tests may call it more than once.
pub fn init_logging(verbosity: OutputVerbosity) {
    let filter = create_env_filter(verbosity);

    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .try_init();
}

#[cfg(test)]
mod tests {
    use super::*;
    use serial_test::serial;

    #[test]
    #[serial]
    fn test_filter_directives() {
        assert_eq!(filter_directives(OutputVerbosity::Info), "deckhand=info");
        assert!(filter_directives(OutputVerbosity::Debug).contains("russh=debug"));
        assert!(filter_directives(OutputVerbosity::Trace).contains("russh_sftp=debug"));
    }

    #[test]
    #[serial]
    fn test_rust_log_takes_precedence() {
        std::env::set_var("RUST_LOG", "deckhand=trace");
        let filter = create_env_filter(OutputVerbosity::Error);
        std::env::remove_var("RUST_LOG");

        assert_eq!(filter.to_string(), "deckhand=trace");
    }

    #[test]
    #[serial]
    fn test_init_logging_is_idempotent() {
        init_logging(OutputVerbosity::Warn);
        init_logging(OutputVerbosity::Debug);
    }
}
