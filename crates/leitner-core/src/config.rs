// Copyright 2025 Fernando Borretti
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

use std::time::Duration;

use serde::Deserialize;

use crate::error::Fallible;
use crate::error::fail;

/// UI timer resolution.
const TICK_MS: u64 = 1000;

/// How many UI ticks pass between elapsed-time pushes to the Analytics Store.
const ANALYTICS_UPDATE_INTERVAL: u32 = 30;

/// How often the analytics batch is flushed.
const FLUSH_MS: u64 = 30_000;

const RETRY_DELAYS_MS: [u64; 3] = [1000, 2000, 4000];

const MAX_RETRIES: u32 = 3;

const REQUEST_TIMEOUT_MS: u64 = 10_000;

/// Timing knobs for a study session.
#[derive(Clone, Debug, PartialEq)]
pub struct SessionConfig {
    pub tick_interval: Duration,
    pub analytics_update_interval: u32,
    pub flush_interval: Duration,
    pub retry_delays: Vec<Duration>,
    pub max_retries: u32,
    pub request_timeout: Duration,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval: Duration::from_millis(TICK_MS),
            analytics_update_interval: ANALYTICS_UPDATE_INTERVAL,
            flush_interval: Duration::from_millis(FLUSH_MS),
            retry_delays: RETRY_DELAYS_MS.map(Duration::from_millis).to_vec(),
            max_retries: MAX_RETRIES,
            request_timeout: Duration::from_millis(REQUEST_TIMEOUT_MS),
        }
    }
}

/// The on-disk form of [`SessionConfig`]. All durations are milliseconds
/// and every field is optional.
#[derive(Deserialize, Default)]
#[serde(deny_unknown_fields)]
struct RawConfig {
    tick_ms: Option<u64>,
    analytics_update_interval: Option<u32>,
    flush_ms: Option<u64>,
    retry_delays_ms: Option<Vec<u64>>,
    max_retries: Option<u32>,
    request_timeout_ms: Option<u64>,
}

impl SessionConfig {
    /// Parses a TOML config, filling in defaults for missing keys.
    pub fn from_toml(source: &str) -> Fallible<Self> {
        let raw: RawConfig = toml::from_str(source)?;
        let defaults = Self::default();
        let config = Self {
            tick_interval: raw
                .tick_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.tick_interval),
            analytics_update_interval: raw
                .analytics_update_interval
                .unwrap_or(defaults.analytics_update_interval),
            flush_interval: raw
                .flush_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.flush_interval),
            retry_delays: raw
                .retry_delays_ms
                .map(|delays| delays.into_iter().map(Duration::from_millis).collect())
                .unwrap_or(defaults.retry_delays),
            max_retries: raw.max_retries.unwrap_or(defaults.max_retries),
            request_timeout: raw
                .request_timeout_ms
                .map(Duration::from_millis)
                .unwrap_or(defaults.request_timeout),
        };
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Fallible<()> {
        if self.tick_interval.is_zero() {
            return fail("tick_ms must be positive.");
        }
        if self.flush_interval.is_zero() {
            return fail("flush_ms must be positive.");
        }
        if self.analytics_update_interval == 0 {
            return fail("analytics_update_interval must be positive.");
        }
        if self.retry_delays.is_empty() {
            return fail("retry_delays_ms must not be empty.");
        }
        Ok(())
    }
}
