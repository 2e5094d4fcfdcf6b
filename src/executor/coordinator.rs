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

//! Runs an operator block against many hosts.

use futures::future::join_all;
use std::future::Future;
use std::sync::{Arc, OnceLock};
use tokio::sync::Semaphore;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use super::policy::RunPolicy;
use super::primary::PrimaryDetector;
use super::result_types::{CompositeRunFailure, Outcome, RunOutcome, RunReport};
use crate::backend::Backend;
use crate::config::Config;
use crate::host::Host;
use crate::ssh::{ConnectionPool, Connector};

/// Runs one operator block per host under a [`RunPolicy`].
///
/// Every host gets its own [`Backend`] and session; a failure on one host
/// never touches another. Configuration is snapshotted when attached.
///
/// ```no_run
/// # use std::sync::Arc;
/// # use deckhand::{Coordinator, Host, LocalConnector, RunPolicy};
/// # async fn demo() -> anyhow::Result<()> {
/// let hosts = vec![Host::new("web1"), Host::new("web2")];
/// let report = Coordinator::new(hosts, Arc::new(LocalConnector::new()))
///     .with_policy(RunPolicy::Parallel { limit: Some(4) })
///     .run(|backend| async move { Ok(backend.capture("uname", ()).await?) })
///     .await?;
/// # Ok(())
/// # }
/// ```
pub struct Coordinator {
    hosts: Vec<Host>,
    connector: Arc<dyn Connector>,
    config: Arc<Config>,
    policy: RunPolicy,
    fail_fast: Option<bool>,
    continue_on_error: bool,
    pool: OnceLock<Arc<ConnectionPool>>,
}

impl Coordinator {
    pub fn new(hosts: Vec<Host>, connector: Arc<dyn Connector>) -> Self {
        Self {
            hosts,
            connector,
            config: Arc::new(Config::default()),
            policy: RunPolicy::default(),
            fail_fast: None,
            continue_on_error: false,
            pool: OnceLock::new(),
        }
    }

    pub fn with_config(mut self, config: Config) -> Self {
        self.config = Arc::new(config);
        self
    }

    pub fn with_policy(mut self, policy: RunPolicy) -> Self {
        self.policy = policy;
        self
    }

    /// Stop hosts that have not started once any host fails.
    ///
    /// Defaults to on for sequential and grouped runs and off otherwise.
    pub fn with_fail_fast(mut self, fail_fast: bool) -> Self {
        self.fail_fast = Some(fail_fast);
        self
    }

    /// Return a report even when hosts fail. Also turns fail-fast off.
    pub fn with_continue_on_error(mut self, continue_on_error: bool) -> Self {
        self.continue_on_error = continue_on_error;
        self
    }

    /// Share a session pool with other coordinators or backends.
    pub fn with_pool(self, pool: Arc<ConnectionPool>) -> Self {
        Self {
            pool: OnceLock::from(pool),
            ..self
        }
    }

    pub fn hosts(&self) -> &[Host] {
        &self.hosts
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> &RunPolicy {
        &self.policy
    }

    /// Whether fail-fast is in effect for the next run.
    pub fn fail_fast(&self) -> bool {
        !self.continue_on_error
            && self
                .fail_fast
                .unwrap_or_else(|| self.policy.fail_fast_by_default())
    }

    /// The session pool, built from the configuration on first use.
    pub fn pool(&self) -> &Arc<ConnectionPool> {
        self.pool
            .get_or_init(|| Arc::new(ConnectionPool::from_settings(&self.config.pool)))
    }

    /// Close every idle pooled session.
    pub async fn shutdown(&self) {
        self.pool().clear().await;
    }

    /// Run `block` once per scheduled host.
    ///
    /// Returns the per-host report, or [`CompositeRunFailure`] when any host
    /// failed and `continue_on_error` is off.
    pub async fn run<F, Fut, T>(&self, block: F) -> Result<RunReport<T>, CompositeRunFailure>
    where
        F: Fn(Backend) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        let block = Arc::new(block);
        let cancel = CancellationToken::new();
        let fail_fast = self.fail_fast();
        let primary = PrimaryDetector::identify_primary(&self.hosts);
        let plan = self.policy.plan(self.hosts.len(), primary);

        debug!(
            "Running on {} host(s) in {} batch(es), fail-fast {}",
            self.hosts.len(),
            plan.batches.len(),
            if fail_fast { "on" } else { "off" }
        );

        let mut outcomes = Vec::new();
        let batch_count = plan.batches.len();
        for (position, batch) in plan.batches.into_iter().enumerate() {
            let limit = plan.limit.unwrap_or(batch.len()).max(1);
            let results = self
                .run_batch(&batch, limit, &block, &cancel, fail_fast)
                .await;
            outcomes.extend(results);

            let is_last = position + 1 == batch_count;
            if let Some(wait) = plan.wait.filter(|_| !is_last && !cancel.is_cancelled()) {
                debug!("Waiting {:?} before the next batch", wait);
                tokio::time::sleep(wait).await;
            }
        }

        let report = RunReport::new(outcomes);
        if self.continue_on_error {
            return Ok(report);
        }
        report.into_result()
    }

    /// Run one batch concurrently, at most `limit` hosts at a time.
    async fn run_batch<F, Fut, T>(
        &self,
        batch: &[usize],
        limit: usize,
        block: &Arc<F>,
        cancel: &CancellationToken,
        fail_fast: bool,
    ) -> Vec<RunOutcome<T>>
    where
        F: Fn(Backend) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = anyhow::Result<T>> + Send + 'static,
        T: Send + 'static,
    {
        if cancel.is_cancelled() {
            return batch
                .iter()
                .map(|&index| RunOutcome {
                    host: self.hosts[index].clone(),
                    outcome: Outcome::Skipped,
                })
                .collect();
        }

        let semaphore = Arc::new(Semaphore::new(limit));
        // Slots are handed out in host order before any task is spawned, so
        // which hosts start at once does not depend on task scheduling.
        let immediate: Vec<_> = batch
            .iter()
            .map(|_| Arc::clone(&semaphore).try_acquire_owned().ok())
            .collect();

        let tasks: Vec<_> = batch
            .iter()
            .zip(immediate)
            .map(|(&index, immediate)| {
                let host = self.hosts[index].clone();
                let backend = Backend::with_pool(
                    host,
                    Arc::clone(&self.connector),
                    Arc::clone(&self.config),
                    Arc::clone(self.pool()),
                );
                let block = Arc::clone(block);
                let cancel = cancel.clone();
                let semaphore = Arc::clone(&semaphore);

                tokio::spawn(async move {
                    // A host that had to queue for a slot has not started yet.
                    let _permit = match immediate {
                        Some(permit) => permit,
                        None => {
                            let permit = match semaphore.acquire_owned().await {
                                Ok(permit) => permit,
                                Err(e) => {
                                    return Outcome::Failure(anyhow::anyhow!(
                                        "Failed to acquire execution slot: {e}"
                                    ))
                                }
                            };
                            if cancel.is_cancelled() {
                                debug!("[{}] Skipped after an earlier failure", backend.host());
                                return Outcome::Skipped;
                            }
                            permit
                        }
                    };

                    info!("[{}] Starting", backend.host());
                    let host = backend.host().clone();
                    let connection = backend.connection();
                    let result = block(backend).await;
                    connection.release(result.is_ok()).await;

                    match result {
                        Ok(value) => {
                            info!("[{}] Finished", host);
                            Outcome::Success(value)
                        }
                        Err(e) => {
                            error!("[{}] Failed: {:#}", host, e);
                            if fail_fast {
                                cancel.cancel();
                            }
                            Outcome::Failure(e)
                        }
                    }
                })
            })
            .collect();

        let results = join_all(tasks).await;
        self.collect_results(batch, results, cancel, fail_fast)
    }

    /// Pair task results with their hosts, recording panics as failures.
    fn collect_results<T>(
        &self,
        batch: &[usize],
        results: Vec<Result<Outcome<T>, tokio::task::JoinError>>,
        cancel: &CancellationToken,
        fail_fast: bool,
    ) -> Vec<RunOutcome<T>> {
        batch
            .iter()
            .zip(results)
            .map(|(&index, result)| {
                let host = self.hosts[index].clone();
                let outcome = match result {
                    Ok(outcome) => outcome,
                    Err(e) => {
                        error!("Task failed for host {}: {}", host, e);
                        if fail_fast {
                            cancel.cancel();
                        }
                        Outcome::Failure(anyhow::anyhow!("Task execution failed: {e}"))
                    }
                };
                RunOutcome { host, outcome }
            })
            .collect()
    }
}
