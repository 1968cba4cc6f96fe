// SPDX-License-Identifier: AGPL-3.0-or-later
// Copyright (C) 2012-2025 Andrei Maltsev

//! CLI entry point. Wires the catalog, runtime configuration, and logger
//! together and dispatches to the harvest pipelines.
//!
//! The framed RPC transport to a game server is an external collaborator
//! (spec.md §1): this binary does not ship one. [`UnconfiguredFactory`]
//! stands in for it and fails fast with a clear message; embedders link a
//! real [`rpc::session::SessionFactory`] and call [`harvest::coordinator`]
//! directly instead of going through this binary.

use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use nex_harvester::{
    cfg::{
        catalog::{self, Platform},
        cli::{Cli, Command},
        config::RuntimeConfig,
        logger::{self, HarvestMode},
    },
    harvest::coordinator,
    rpc::session::{NexSession, RpcError, SessionFactory},
    store,
};
use tracing::info;

/// Placeholder [`SessionFactory`] used when this binary is run without a
/// linked transport. Every connect attempt fails with a named application
/// error rather than a panic, so the Retry Wrapper surfaces it immediately
/// instead of looping forever on what looks like a transport flap.
struct UnconfiguredFactory;

struct UnconfiguredSession;

impl nex_harvester::rpc::session::RankingRpc for UnconfiguredSession {
    async fn get_ranking(
        &self,
        _request: nex_harvester::rpc::types::GetRankingRequest,
    ) -> Result<nex_harvester::rpc::types::GetRankingResponse, RpcError> {
        Err(unconfigured_error())
    }
}

impl nex_harvester::rpc::session::DataStoreRpc for UnconfiguredSession {
    async fn search_object(
        &self,
        _params: nex_harvester::rpc::types::SearchObjectParams,
    ) -> Result<Option<nex_harvester::rpc::types::SearchObjectResult>, RpcError> {
        Err(unconfigured_error())
    }

    async fn get_metas(
        &self,
        _ids: &[u64],
    ) -> Result<Vec<(u64, Result<nex_harvester::rpc::types::DataStoreMeta, RpcError>)>, RpcError> {
        Err(unconfigured_error())
    }

    async fn get_metas_multiple_param(
        &self,
        _targets: &[nex_harvester::rpc::types::PersistenceTarget],
    ) -> Result<
        Vec<(nex_harvester::rpc::types::PersistenceTarget, Result<nex_harvester::rpc::types::DataStoreMeta, RpcError>)>,
        RpcError,
    > {
        Err(unconfigured_error())
    }

    async fn prepare_get_object(
        &self,
        _data_id: u64,
    ) -> Result<nex_harvester::rpc::types::PreparedObject, RpcError> {
        Err(unconfigured_error())
    }
}

fn unconfigured_error() -> RpcError {
    RpcError::Application {
        name: "Core::NotImplemented".to_string(),
        message: "no RPC transport is linked into this binary; embed this crate and supply a \
                  SessionFactory to reach a live server"
            .to_string(),
    }
}

impl SessionFactory for UnconfiguredFactory {
    type Session = UnconfiguredSession;

    async fn connect(&self) -> Result<UnconfiguredSession, RpcError> {
        Ok(UnconfiguredSession)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mode = match &cli.command {
        Command::Rank { .. } => HarvestMode::Ranking,
        Command::Datastore { .. } | Command::Inspect { .. } => HarvestMode::DataStore,
    };
    let _guard = logger::init_logger(mode, &cli.log_dir, &cli.log_level).context("initializing logger")?;

    let runtime = match &cli.runtime_config {
        Some(path) => RuntimeConfig::load_from_file(path)?,
        None => RuntimeConfig::default(),
    };

    let factory = Arc::new(UnconfiguredFactory);

    match cli.command {
        Command::Rank {
            catalog,
            db_prefix,
            platform,
            start,
            stop,
            special_categories,
        } => run_rank(catalog, db_prefix, platform, start, stop, special_categories, &runtime, factory).await,

        Command::Datastore {
            catalog,
            db_prefix,
            platform,
            start,
            stop,
            sampling,
            just_metas,
            persistence,
            specific,
        } => {
            run_datastore(
                catalog, db_prefix, platform, start, stop, sampling, just_metas, persistence, specific, &runtime,
                factory,
            )
            .await
        },

        Command::Inspect {
            catalog,
            platform,
            start,
            stop,
        } => run_inspect(catalog, platform, start, stop, &runtime, factory).await,
    }
}

async fn run_rank<F>(
    catalog_path: std::path::PathBuf,
    db_prefix: String,
    platform: Platform,
    start: Option<usize>,
    stop: Option<usize>,
    special_categories_path: Option<std::path::PathBuf>,
    runtime: &RuntimeConfig,
    factory: Arc<F>,
) -> Result<()>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    let titles = catalog::load_catalog(&catalog_path, platform)?;
    let titles = catalog::slice_range(&titles, start, stop);
    let special = match special_categories_path {
        Some(path) => catalog::load_special_categories(path)?,
        None => Default::default(),
    };

    let pool = store::open_pool(format!("{db_prefix}-ranking.db"), runtime.busy_timeout).await?;
    store::schema::migrate_ranking(&pool).await?;

    for title in titles {
        info!(title = %title.pretty_id(), name = %title.name, "starting ranking harvest");
        let game = title.pretty_id();
        let title_special = special.get(&title.title_id).cloned().unwrap_or_default();
        if let Err(err) =
            coordinator::run_ranking_title(pool.clone(), game, factory.clone(), runtime, &title_special).await
        {
            tracing::error!(title = %title.pretty_id(), %err, "ranking harvest failed for title");
        }
    }

    Ok(())
}

#[allow(clippy::too_many_arguments)]
async fn run_datastore<F>(
    catalog_path: std::path::PathBuf,
    db_prefix: String,
    platform: Platform,
    start: Option<usize>,
    stop: Option<usize>,
    sampling: bool,
    just_metas: bool,
    persistence: bool,
    specific: Option<u64>,
    runtime: &RuntimeConfig,
    factory: Arc<F>,
) -> Result<()>
where
    F: SessionFactory + 'static,
    F::Session: 'static,
{
    let titles = catalog::load_catalog(&catalog_path, platform)?;
    let titles = catalog::slice_range(&titles, start, stop);

    let pool = store::open_pool(format!("{db_prefix}-datastore.db"), runtime.busy_timeout).await?;
    store::schema::migrate_datastore(&pool).await?;

    let http_client = reqwest::Client::builder().timeout(runtime.blob_http_timeout).build().context("building HTTP client")?;

    for title in titles {
        if !title.has_datastore {
            continue;
        }
        if let Some(only) = specific
            && title.title_id != only
        {
            continue;
        }

        let game = title.pretty_id();
        info!(title = %game, name = %title.name, "starting datastore harvest");

        let result = if persistence {
            coordinator::run_persistence_title(pool.clone(), game.clone(), factory.clone(), runtime, http_client.clone())
                .await
        } else {
            coordinator::run_datastore_title(
                pool.clone(),
                game.clone(),
                factory.clone(),
                runtime,
                sampling,
                just_metas,
                http_client.clone(),
            )
            .await
        };

        if let Err(err) = result {
            tracing::error!(title = %game, %err, "datastore harvest failed for title");
        }
    }

    Ok(())
}

async fn run_inspect<F>(
    catalog_path: std::path::PathBuf,
    platform: Platform,
    start: Option<usize>,
    stop: Option<usize>,
    runtime: &RuntimeConfig,
    factory: Arc<F>,
) -> Result<()>
where
    F: SessionFactory,
    F::Session: NexSession,
{
    let titles = catalog::load_catalog(&catalog_path, platform)?;
    let titles = catalog::slice_range(&titles, start, stop);

    for title in titles {
        if !title.has_datastore {
            continue;
        }
        let mut session = factory.connect().await?;
        let supported = nex_harvester::harvest::datastore_probe::search_supported::<F>(
            &mut session,
            factory.as_ref(),
            runtime.retry_max_backoff,
        )
        .await;
        if !supported {
            println!("{}\t{}\tsearch unsupported", title.pretty_id(), title.name);
            continue;
        }

        match nex_harvester::harvest::range_finder::find_range::<F>(
            &mut session,
            factory.as_ref(),
            runtime.retry_max_backoff,
            runtime.range_finder_floor,
            false,
            runtime.sampling_span,
        )
        .await
        {
            Some(range) => println!("{}\t{}\t{}..{}", title.pretty_id(), title.name, range.first, range.late),
            None => println!("{}\t{}\tno live range found", title.pretty_id(), title.name),
        }
    }

    Ok(())
}
