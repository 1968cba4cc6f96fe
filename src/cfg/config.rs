// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{fs, path::Path, time::Duration};

use anyhow::{Context, Result, ensure};
use serde::{Deserialize, Serialize};

/// Runtime-only knobs (worker pool sizes, batch size, timeouts). None of
/// these travel over the wire to the game server; they exist purely to
/// shape this crate's own concurrency and I/O behavior.
///
/// Loadable from an optional TOML file; every field has a built-in default
/// so the crate runs with zero external configuration.
#[derive(Deserialize, Serialize, Debug, Clone)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Number of ranking-category state machines advanced in parallel per
    /// title (spec §4.3's "subgroup size").
    pub ranking_subgroup_size: usize,
    /// Number of Metadata Scanner workers per title.
    pub metadata_scanner_workers: usize,
    /// Number of Blob Fetcher workers per title.
    pub blob_fetcher_workers: usize,
    /// Number of data-ids fetched per `get_metas` call.
    pub metadata_batch_size: u64,
    /// Capacity of the bounded blob queue connecting scanners to fetchers.
    pub blob_queue_capacity: usize,
    /// SQLite `busy_timeout`, applied to every opened connection.
    #[serde(with = "serde_secs")]
    pub busy_timeout: Duration,
    /// Timeout for the signed-URL HTTPS GET in the Blob Fetcher.
    #[serde(with = "serde_secs")]
    pub blob_http_timeout: Duration,
    /// Floor applied to the Range Finder's `first_data_id` when none is
    /// discoverable or the discovered value is implausibly high.
    pub range_finder_floor: u64,
    /// `--sampling` cap on the distance between `first` and `late`.
    pub sampling_span: u64,
    /// Maximum backoff delay for the Retry Wrapper.
    #[serde(with = "serde_secs")]
    pub retry_max_backoff: Duration,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        RuntimeConfig {
            ranking_subgroup_size: 32,
            metadata_scanner_workers: 8,
            blob_fetcher_workers: 8,
            metadata_batch_size: 100,
            blob_queue_capacity: 1024,
            busy_timeout: Duration::from_secs(3600),
            blob_http_timeout: Duration::from_secs(600),
            range_finder_floor: 900_000,
            sampling_span: 200_000,
            retry_max_backoff: Duration::from_secs(60),
        }
    }
}

impl RuntimeConfig {
    /// Loads overrides from a TOML file and validates the result. Missing
    /// keys fall back to [`RuntimeConfig::default`].
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let s = fs::read_to_string(path.as_ref())
            .with_context(|| format!("failed to read runtime config {:?}", path.as_ref()))?;
        let cfg: RuntimeConfig =
            toml::from_str(&s).context("failed to parse runtime config TOML")?;
        cfg.validate()?;
        Ok(cfg)
    }

    /// Validates cross-field invariants that serde defaults alone can't
    /// enforce.
    pub fn validate(&self) -> Result<()> {
        ensure!(
            self.ranking_subgroup_size >= 1,
            "ranking_subgroup_size must be >= 1"
        );
        ensure!(
            self.metadata_scanner_workers >= 1,
            "metadata_scanner_workers must be >= 1"
        );
        ensure!(
            self.blob_fetcher_workers >= 1,
            "blob_fetcher_workers must be >= 1"
        );
        ensure!(self.metadata_batch_size >= 1, "metadata_batch_size must be >= 1");
        ensure!(
            self.blob_queue_capacity >= 1,
            "blob_queue_capacity must be >= 1"
        );
        Ok(())
    }
}

/// Serde helper representing a `Duration` as a number of seconds, matching
/// the teacher's `cfg::config::serde_secs` module.
mod serde_secs {
    use std::time::Duration;

    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(d: &Duration, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_u64(d.as_secs())
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Duration, D::Error> {
        let secs = u64::deserialize(d)?;
        Ok(Duration::from_secs(secs))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        RuntimeConfig::default().validate().expect("defaults validate");
    }

    #[test]
    fn partial_override_keeps_remaining_defaults() {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("runtime.toml");
        fs::write(&path, "metadata_scanner_workers = 16\n").expect("write fixture");

        let cfg = RuntimeConfig::load_from_file(&path).expect("load config");
        assert_eq!(cfg.metadata_scanner_workers, 16);
        assert_eq!(cfg.blob_fetcher_workers, RuntimeConfig::default().blob_fetcher_workers);
    }

    #[test]
    fn rejects_zero_workers() {
        let mut cfg = RuntimeConfig::default();
        cfg.metadata_scanner_workers = 0;
        assert!(cfg.validate().is_err());
    }
}
