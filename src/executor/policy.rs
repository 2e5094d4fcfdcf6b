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

//! How hosts are scheduled during a run.

use std::time::Duration;

/// Scheduling policy for [`Coordinator::run`](super::Coordinator::run).
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunPolicy {
    /// All hosts at once, at most `limit` concurrently when set.
    Parallel { limit: Option<usize> },
    /// One host after another in the given order, pausing `wait` in between.
    Sequential { wait: Option<Duration> },
    /// Batches of `size` hosts; a batch runs in parallel, batches run in order.
    Groups { size: usize, wait: Option<Duration> },
    /// Only the primary host: the first with `primary: true`, else the first host.
    SingleHost,
}

impl Default for RunPolicy {
    fn default() -> Self {
        RunPolicy::Parallel { limit: None }
    }
}

impl RunPolicy {
    pub fn parallel() -> Self {
        RunPolicy::default()
    }

    pub fn sequential() -> Self {
        RunPolicy::Sequential { wait: None }
    }

    pub fn groups(size: usize) -> Self {
        RunPolicy::Groups { size, wait: None }
    }

    /// Whether a failure stops hosts that have not started yet, unless overridden.
    pub fn fail_fast_by_default(&self) -> bool {
        matches!(self, RunPolicy::Sequential { .. } | RunPolicy::Groups { .. })
    }

    /// Split host indices `0..count` into the batches this policy runs, with
    /// the concurrency limit inside a batch and the pause between batches.
    pub(crate) fn plan(&self, count: usize, primary: Option<usize>) -> Plan {
        let all: Vec<usize> = (0..count).collect();
        match self {
            RunPolicy::Parallel { limit } => Plan {
                batches: vec![all],
                limit: limit.map(|limit| limit.max(1)),
                wait: None,
            },
            RunPolicy::Sequential { wait } => Plan {
                batches: all.into_iter().map(|index| vec![index]).collect(),
                limit: Some(1),
                wait: *wait,
            },
            RunPolicy::Groups { size, wait } => Plan {
                batches: all.chunks((*size).max(1)).map(<[usize]>::to_vec).collect(),
                limit: None,
                wait: *wait,
            },
            RunPolicy::SingleHost => Plan {
                batches: primary.map(|index| vec![vec![index]]).unwrap_or_default(),
                limit: Some(1),
                wait: None,
            },
        }
    }
}

/// Batches of host indices to run, in order.
#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) struct Plan {
    pub batches: Vec<Vec<usize>>,
    pub limit: Option<usize>,
    pub wait: Option<Duration>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fail_fast_defaults() {
        assert!(!RunPolicy::parallel().fail_fast_by_default());
        assert!(RunPolicy::sequential().fail_fast_by_default());
        assert!(RunPolicy::groups(2).fail_fast_by_default());
        assert!(!RunPolicy::SingleHost.fail_fast_by_default());
    }

    #[test]
    fn test_plans() {
        assert_eq!(RunPolicy::parallel().plan(3, Some(0)).batches, vec![vec![0, 1, 2]]);
        assert_eq!(
            RunPolicy::sequential().plan(3, Some(0)).batches,
            vec![vec![0], vec![1], vec![2]]
        );
        assert_eq!(
            RunPolicy::groups(2).plan(5, Some(0)).batches,
            vec![vec![0, 1], vec![2, 3], vec![4]]
        );
        assert_eq!(RunPolicy::SingleHost.plan(3, Some(2)).batches, vec![vec![2]]);
        assert!(RunPolicy::SingleHost.plan(0, None).batches.is_empty());
    }

    #[test]
    fn test_zero_sizes_are_clamped() {
        let plan = RunPolicy::Parallel { limit: Some(0) }.plan(2, Some(0));
        assert_eq!(plan.limit, Some(1));

        let plan = RunPolicy::Groups { size: 0, wait: None }.plan(2, Some(0));
        assert_eq!(plan.batches, vec![vec![0], vec![1]]);
    }
}
