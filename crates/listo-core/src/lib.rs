pub mod cli;
pub mod commands;
pub mod config;
pub mod datetime;
pub mod ids;
pub mod model;
pub mod persist;
pub mod render;
pub mod session;
pub mod store;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Local;
use clap::Parser;
use tracing::{
  debug,
  info
};

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args)?;
  let cli = cli::GlobalCli::parse_from(
    pre.cleaned_args
  );

  cli::init_tracing(
    cli.verbose,
    cli.quiet
  )?;

  info!(
    verbose = cli.verbose,
    quiet = cli.quiet,
    "starting listo CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.listorc.as_deref()
  )?;
  cfg.apply_overrides(
    pre.rc_overrides.into_iter().chain(
      cli
        .rc_overrides
        .into_iter()
        .map(|kv| (kv.key, kv.value))
    )
  );

  let data_dir =
    config::resolve_data_dir(
      &cfg,
      cli.data.as_deref()
    )
    .context(
      "failed to resolve data \
       directory"
    )?;

  let storage =
    persist::JsonFileStorage::in_dir(
      &data_dir
    );
  info!(file = %storage.path().display(), "using snapshot file");
  let mut session =
    session::Session::open(
      storage,
      Box::new(ids::RandomIds)
    );

  let renderer =
    render::Renderer::new(&cfg);
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  commands::dispatch(
    &mut session,
    &renderer,
    inv,
    Local::now().naive_local()
  )?;

  if session.failed_saves() > 0 {
    anyhow::bail!(
      "changes could not be saved to {}",
      session.storage().path().display()
    );
  }

  info!("done");
  Ok(())
}
