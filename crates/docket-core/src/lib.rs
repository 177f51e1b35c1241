pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod filter;
pub mod ordering;
pub mod reminder;
pub mod render;
pub mod service;
pub mod store;
pub mod todo;

use std::ffi::OsString;
use std::path::Path;

use anyhow::{anyhow, Context};
use clap::Parser;
use tracing::{debug, info};

#[tracing::instrument(skip_all)]
pub fn run(raw_args: Vec<OsString>) -> anyhow::Result<()> {
    let pre = cli::preprocess_args(&raw_args)?;
    let cli = cli::GlobalCli::parse_from(pre.cleaned_args);

    cli::init_tracing(cli.verbose, cli.quiet)?;

    info!(verbose = cli.verbose, quiet = cli.quiet, "starting docket CLI");
    debug!(?pre.rc_overrides, "preprocessed rc overrides");

    let mut cfg = config::Config::load(cli.docketrc.as_deref())?;
    cfg.apply_overrides(
        pre.rc_overrides.into_iter().chain(
            cli.rc_overrides
                .into_iter()
                .map(|kv| (kv.key, kv.value)),
        ),
    );

    let data_dir = config::resolve_data_dir(&cfg, cli.data.as_deref())
        .context("failed to resolve data directory")?;

    let backend = open_backend(&cfg, &data_dir).with_context(|| {
        format!("failed to open persistence backend at {}", data_dir.display())
    })?;

    let mut store = store::TodoStore::new(backend);
    store.subscribe(|event, todos| {
        debug!(?event, count = todos.len(), "store changed");
    });
    store.load();

    let mut renderer = render::Renderer::new(&cfg)?;
    let inv = cli::Invocation::parse(&cfg, cli.rest)?;

    commands::dispatch(&mut store, &cfg, &mut renderer, inv)?;

    info!("done");
    Ok(())
}

fn open_backend(
    cfg: &config::Config,
    data_dir: &Path,
) -> anyhow::Result<Box<dyn datastore::Persistence>> {
    let kind = cfg.get("backend").unwrap_or_else(|| "json".to_string());
    match kind.to_ascii_lowercase().as_str() {
        "json" => Ok(Box::new(datastore::JsonStore::open(data_dir)?)),
        "sqlite" => Ok(Box::new(service::SqliteService::open(data_dir)?)),
        other => Err(anyhow!("invalid backend setting: {other} (expected json or sqlite)")),
    }
}
