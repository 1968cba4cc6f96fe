// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

use std::{collections::HashMap, fs, path::Path};

use anyhow::{Context, Result};
use serde::Deserialize;

/// Which of the two catalog documents a title came from. The two platforms
/// use slightly different login flows (see [`crate::cfg::credentials`]) and
/// carry slightly different optional fields.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Platform {
    WiiU,
    ThreeDs,
}

/// Raw shape of one entry in a catalog JSON document, as described in
/// spec.md §6.
#[derive(Debug, Deserialize)]
struct RawTitle {
    aid: u64,
    name: String,
    key: String,
    nex: Vec<[u32; 3]>,
    av: u32,
    #[serde(default)]
    id: Option<u64>,
    #[serde(default)]
    has_datastore: Option<bool>,
    #[serde(default)]
    nexds: Option<bool>,
}

#[derive(Debug, Deserialize)]
struct RawCatalog {
    games: Vec<RawTitle>,
}

/// One title in the catalog, normalized. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct Title {
    pub title_id: u64,
    pub name: String,
    /// Hex-encoded shared secret used to configure the NEX settings object.
    pub access_key: String,
    /// `major * 10000 + minor * 100 + patch`, matching the wire encoding the
    /// NEX protocol negotiates with.
    pub nex_version: u32,
    pub app_version: u32,
    pub numeric_id: Option<u64>,
    pub has_datastore: bool,
    pub platform: Platform,
}

impl Title {
    /// `aid` rendered as a fixed-width uppercase hex string, the form used to
    /// key rows in the relational store (`game` column).
    pub fn pretty_id(&self) -> String {
        format!("{:016X}", self.title_id)
    }
}

/// A title whose DataStore bearer token must be forwarded as
/// `AuthenticationInfo{token, ngs_version = 2}` rather than derived from the
/// plain principal/password pair (spec.md §6, Credential Broker contract).
/// Kept as a named constant rather than a config flag because it identifies
/// one specific title, not a general mode.
pub const AUTH_TOKEN_OVERRIDE_TITLE_ID: u64 = 1_125_899_907_040_768;

fn encode_nex_version(triple: [u32; 3]) -> u32 {
    triple[0] * 10_000 + triple[1] * 100 + triple[2]
}

/// Loads and normalizes a catalog document for the given platform.
pub fn load_catalog<P: AsRef<Path>>(path: P, platform: Platform) -> Result<Vec<Title>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read catalog {path:?}"))?;
    let parsed: RawCatalog = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse catalog {path:?}"))?;

    Ok(parsed
        .games
        .into_iter()
        .map(|g| {
            let nex_version = g.nex.first().copied().map(encode_nex_version).unwrap_or(0);
            Title {
                title_id: g.aid,
                name: g.name,
                access_key: g.key,
                nex_version,
                app_version: g.av,
                numeric_id: g.id,
                has_datastore: g.has_datastore.or(g.nexds).unwrap_or(false),
                platform,
            }
        })
        .collect())
}

/// Slice of a catalog selected by the CLI `--start`/`--stop` range (both
/// inclusive-exclusive-by-index, matching the original's positional
/// start/stop arguments).
pub fn slice_range(titles: &[Title], start: Option<usize>, stop: Option<usize>) -> &[Title] {
    let start = start.unwrap_or(0).min(titles.len());
    let stop = stop.unwrap_or(titles.len()).min(titles.len());
    if start >= stop {
        &[]
    } else {
        &titles[start..stop]
    }
}

/// Loads the sidecar list of hard-coded category ids for titles the
/// catalog/server doesn't expose through probing (spec.md §4.2, §9). The
/// sidecar is a JSON object mapping a decimal title id (as a string key,
/// since JSON object keys are always strings) to an array of u32 category
/// ids.
pub fn load_special_categories<P: AsRef<Path>>(path: P) -> Result<HashMap<u64, Vec<u32>>> {
    let path = path.as_ref();
    let raw = fs::read_to_string(path)
        .with_context(|| format!("failed to read special-categories sidecar {path:?}"))?;
    let parsed: HashMap<String, Vec<u32>> = serde_json::from_str(&raw)
        .with_context(|| format!("failed to parse special-categories sidecar {path:?}"))?;

    parsed
        .into_iter()
        .map(|(k, v)| {
            k.parse::<u64>()
                .with_context(|| format!("invalid title id key {k:?} in sidecar"))
                .map(|id| (id, v))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_minimal_catalog() {
        let json = r#"{
            "games": [
                {
                    "aid": 1407375153317888,
                    "name": "Example Title",
                    "key": "deadbeef",
                    "nex": [[3, 5, 0]],
                    "av": 12,
                    "id": 42,
                    "has_datastore": true
                }
            ]
        }"#;
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("catalog.json");
        fs::write(&path, json).expect("write fixture");

        let titles = load_catalog(&path, Platform::WiiU).expect("load catalog");
        assert_eq!(titles.len(), 1);
        assert_eq!(titles[0].title_id, 1_407_375_153_317_888);
        assert_eq!(titles[0].nex_version, 3 * 10_000 + 5 * 100);
        assert!(titles[0].has_datastore);
        assert_eq!(titles[0].pretty_id(), "0500000000989880");
    }

    #[test]
    fn slice_range_clamps_to_catalog_len() {
        let titles = vec![
            Title {
                title_id: 1,
                name: "a".into(),
                access_key: String::new(),
                nex_version: 0,
                app_version: 0,
                numeric_id: None,
                has_datastore: false,
                platform: Platform::WiiU,
            },
            Title {
                title_id: 2,
                name: "b".into(),
                access_key: String::new(),
                nex_version: 0,
                app_version: 0,
                numeric_id: None,
                has_datastore: false,
                platform: Platform::WiiU,
            },
        ];
        assert_eq!(slice_range(&titles, Some(1), Some(10)).len(), 1);
        assert_eq!(slice_range(&titles, Some(5), Some(10)).len(), 0);
    }
}
