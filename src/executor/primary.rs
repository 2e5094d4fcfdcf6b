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

//! Primary host selection for single-host runs.

use crate::host::Host;

/// Picks the host a [`RunPolicy::SingleHost`](super::RunPolicy::SingleHost) run targets.
pub struct PrimaryDetector;

impl PrimaryDetector {
    /// Index of the primary host.
    ///
    /// The first host whose `primary` property is `true` wins; otherwise the
    /// first host. Returns `None` for an empty list.
    ///
    /// ```
    /// use deckhand::executor::PrimaryDetector;
    /// use deckhand::Host;
    ///
    /// let hosts = vec![Host::new("web1"), Host::new("db1").with_property("primary", true)];
    /// assert_eq!(PrimaryDetector::identify_primary(&hosts), Some(1));
    /// ```
    pub fn identify_primary(hosts: &[Host]) -> Option<usize> {
        if hosts.is_empty() {
            return None;
        }

        hosts.iter().position(Host::is_primary).or(Some(0))
    }
}
