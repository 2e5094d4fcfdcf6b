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

//! Per-host outcomes and the aggregate run failure.

use std::fmt;

use crate::host::Host;

/// What happened on one host.
#[derive(Debug)]
pub enum Outcome<T> {
    Success(T),
    Failure(anyhow::Error),
    /// The host never started because a fail-fast abort came first.
    Skipped,
}

impl<T> Outcome<T> {
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    pub fn is_failure(&self) -> bool {
        matches!(self, Outcome::Failure(_))
    }

    pub fn is_skipped(&self) -> bool {
        matches!(self, Outcome::Skipped)
    }
}

/// Outcome of the operator block on a single host.
#[derive(Debug)]
pub struct RunOutcome<T> {
    pub host: Host,
    pub outcome: Outcome<T>,
}

impl<T> RunOutcome<T> {
    pub fn is_success(&self) -> bool {
        self.outcome.is_success()
    }

    pub fn value(&self) -> Option<&T> {
        match &self.outcome {
            Outcome::Success(value) => Some(value),
            _ => None,
        }
    }

    pub fn error(&self) -> Option<&anyhow::Error> {
        match &self.outcome {
            Outcome::Failure(error) => Some(error),
            _ => None,
        }
    }
}

/// Outcomes of a run, in host order.
#[derive(Debug)]
pub struct RunReport<T> {
    outcomes: Vec<RunOutcome<T>>,
}

impl<T> RunReport<T> {
    pub(crate) fn new(outcomes: Vec<RunOutcome<T>>) -> Self {
        Self { outcomes }
    }

    pub fn outcomes(&self) -> &[RunOutcome<T>] {
        &self.outcomes
    }

    pub fn len(&self) -> usize {
        self.outcomes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.outcomes.is_empty()
    }

    /// The outcome recorded for `host`.
    pub fn get(&self, host: &Host) -> Option<&Outcome<T>> {
        self.outcomes
            .iter()
            .find(|run| &run.host == host)
            .map(|run| &run.outcome)
    }

    pub fn successes(&self) -> impl Iterator<Item = (&Host, &T)> {
        self.outcomes
            .iter()
            .filter_map(|run| run.value().map(|value| (&run.host, value)))
    }

    pub fn failures(&self) -> impl Iterator<Item = (&Host, &anyhow::Error)> {
        self.outcomes
            .iter()
            .filter_map(|run| run.error().map(|error| (&run.host, error)))
    }

    pub fn skipped(&self) -> impl Iterator<Item = &Host> {
        self.outcomes
            .iter()
            .filter(|run| run.outcome.is_skipped())
            .map(|run| &run.host)
    }

    /// True when every host succeeded.
    pub fn is_success(&self) -> bool {
        self.outcomes.iter().all(RunOutcome::is_success)
    }

    /// Values of the successful hosts, in host order.
    pub fn into_values(self) -> Vec<(Host, T)> {
        self.outcomes
            .into_iter()
            .filter_map(|run| match run.outcome {
                Outcome::Success(value) => Some((run.host, value)),
                _ => None,
            })
            .collect()
    }

    /// The report itself, or the aggregate failure when any host failed.
    pub(crate) fn into_result(self) -> Result<Self, CompositeRunFailure> {
        if !self.outcomes.iter().any(|run| run.outcome.is_failure()) {
            return Ok(self);
        }

        let total = self.outcomes.len();
        let mut failures = Vec::new();
        let mut skipped = Vec::new();
        for run in self.outcomes {
            match run.outcome {
                Outcome::Failure(error) => failures.push((run.host, error)),
                Outcome::Skipped => skipped.push(run.host),
                Outcome::Success(_) => {}
            }
        }
        Err(CompositeRunFailure {
            failures,
            skipped,
            total,
        })
    }
}

impl<T> IntoIterator for RunReport<T> {
    type Item = RunOutcome<T>;
    type IntoIter = std::vec::IntoIter<RunOutcome<T>>;

    fn into_iter(self) -> Self::IntoIter {
        self.outcomes.into_iter()
    }
}

/// A run in which at least one host failed.
///
/// Each failure is the error the operator block returned on that host; it
/// downcasts to [`deckhand::Error`](crate::Error) when a verb raised it.
#[derive(Debug)]
pub struct CompositeRunFailure {
    pub failures: Vec<(Host, anyhow::Error)>,
    /// Hosts that never started because of a fail-fast abort.
    pub skipped: Vec<Host>,
    pub total: usize,
}

impl CompositeRunFailure {
    pub fn hosts(&self) -> impl Iterator<Item = &Host> {
        self.failures.iter().map(|(host, _)| host)
    }

    /// The error recorded for `host`, if it failed.
    pub fn error_for(&self, host: &Host) -> Option<&anyhow::Error> {
        self.failures
            .iter()
            .find(|(failed, _)| failed == host)
            .map(|(_, error)| error)
    }
}

impl fmt::Display for CompositeRunFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{} of {} host(s) failed", self.failures.len(), self.total)?;
        if !self.skipped.is_empty() {
            write!(f, ", {} skipped", self.skipped.len())?;
        }
        for (host, error) in &self.failures {
            write!(f, "\n  {host}: {error:#}")?;
        }
        Ok(())
    }
}

impl std::error::Error for CompositeRunFailure {}

#[cfg(test)]
mod tests {
    use super::*;

    fn report() -> RunReport<u32> {
        RunReport::new(vec![
            RunOutcome {
                host: Host::new("web1"),
                outcome: Outcome::Success(1),
            },
            RunOutcome {
                host: Host::new("web2"),
                outcome: Outcome::Failure(anyhow::anyhow!("boom")),
            },
            RunOutcome {
                host: Host::new("web3"),
                outcome: Outcome::Skipped,
            },
        ])
    }

    #[test]
    fn test_report_accessors() {
        let report = report();
        assert!(!report.is_success());
        assert_eq!(report.successes().count(), 1);
        assert_eq!(report.failures().count(), 1);
        assert_eq!(report.skipped().collect::<Vec<_>>(), vec![&Host::new("web3")]);
        assert!(matches!(report.get(&Host::new("web1")), Some(Outcome::Success(1))));
        assert!(report.get(&Host::new("other")).is_none());
    }

    #[test]
    fn test_composite_failure_message() {
        let failure = report().into_result().unwrap_err();
        assert_eq!(failure.to_string(), "1 of 3 host(s) failed, 1 skipped\n  web2: boom");
        assert!(failure.error_for(&Host::new("web2")).is_some());
    }

    #[test]
    fn test_all_success_has_no_failure() {
        let report = RunReport::new(vec![RunOutcome {
            host: Host::new("web1"),
            outcome: Outcome::Success(()),
        }]);
        assert!(report.into_result().is_ok());
    }
}
