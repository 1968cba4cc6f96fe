// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::cfg::{catalog::Platform, logger};

/// Bulk harvester for the Ranking and DataStore subsystems of Nintendo's
/// NEX online service.
#[derive(Debug, Parser)]
#[command(name = "nex-harvester", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Directory the two append-only log files are written under.
    #[arg(long, global = true, default_value_os_t = logger::default_log_dir())]
    pub log_dir: PathBuf,

    /// `RUST_LOG`-style filter directive; overridden by the `RUST_LOG`
    /// environment variable when set.
    #[arg(long, global = true, default_value = "info")]
    pub log_level: String,

    /// Optional TOML file overriding [`crate::cfg::config::RuntimeConfig`]
    /// defaults.
    #[arg(long, global = true)]
    pub runtime_config: Option<PathBuf>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Runs the Ranking Harvester pipeline: category prober followed by one
    /// state machine per discovered category.
    Rank {
        /// Path to a catalog JSON document.
        catalog: PathBuf,
        /// Prefix used to name the SQLite database file
        /// (`<prefix>-ranking.db`).
        db_prefix: String,
        #[arg(long, value_enum, default_value = "wii-u")]
        platform: Platform,
        /// First catalog index to process (inclusive).
        #[arg(long)]
        start: Option<usize>,
        /// Last catalog index to process (exclusive).
        #[arg(long)]
        stop: Option<usize>,
        /// Path to the sidecar JSON listing hard-coded category ids for
        /// titles the 0..999 sweep cannot discover.
        #[arg(long)]
        special_categories: Option<PathBuf>,
    },

    /// Runs the DataStore pipeline: capability probe, range finder,
    /// metadata scanner, and (unless `--just-metas`) the blob fetcher.
    Datastore {
        catalog: PathBuf,
        /// Prefix used to name the SQLite database file
        /// (`<prefix>-datastore.db`).
        db_prefix: String,
        #[arg(long, value_enum, default_value = "wii-u")]
        platform: Platform,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        stop: Option<usize>,
        /// Caps the scanned id range to `first + sampling_span`
        /// (spec.md §4.5 step 4).
        #[arg(long)]
        sampling: bool,
        /// Skips the Blob Fetcher stage; only metadata is harvested.
        #[arg(long)]
        just_metas: bool,
        /// Runs only the Metadata-By-Persistence Scanner over
        /// already-harvested owner-principals.
        #[arg(long)]
        persistence: bool,
        /// Restricts the run to one title id from the catalog.
        #[arg(long)]
        specific: Option<u64>,
    },

    /// Lightweight read-only probe reporting the live `data_id` range for
    /// every title in the catalog, without running a full harvest
    /// (`archive.py`'s `datastore_get_info` equivalent).
    Inspect {
        catalog: PathBuf,
        #[arg(long, value_enum, default_value = "wii-u")]
        platform: Platform,
        #[arg(long)]
        start: Option<usize>,
        #[arg(long)]
        stop: Option<usize>,
    },
}

#[cfg(test)]
mod tests {
    use clap::CommandFactory;

    use super::*;

    #[test]
    fn cli_definition_is_valid() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_rank_subcommand_with_defaults() {
        let cli = Cli::parse_from(["nex-harvester", "rank", "catalog.json", "out"]);
        match cli.command {
            Command::Rank {
                catalog,
                db_prefix,
                platform,
                start,
                stop,
                ..
            } => {
                assert_eq!(catalog, PathBuf::from("catalog.json"));
                assert_eq!(db_prefix, "out");
                assert_eq!(platform, Platform::WiiU);
                assert_eq!(start, None);
                assert_eq!(stop, None);
            },
            other => panic!("expected Command::Rank, got {other:?}"),
        }
    }

    #[test]
    fn parses_datastore_flags() {
        let cli = Cli::parse_from([
            "nex-harvester",
            "datastore",
            "catalog.json",
            "out",
            "--platform",
            "three-ds",
            "--sampling",
            "--specific",
            "1407375153317888",
        ]);
        match cli.command {
            Command::Datastore {
                platform,
                sampling,
                just_metas,
                specific,
                ..
            } => {
                assert_eq!(platform, Platform::ThreeDs);
                assert!(sampling);
                assert!(!just_metas);
                assert_eq!(specific, Some(1_407_375_153_317_888));
            },
            other => panic!("expected Command::Datastore, got {other:?}"),
        }
    }
}
