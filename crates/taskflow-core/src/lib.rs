pub mod backup;
pub mod cli;
pub mod commands;
pub mod config;
pub mod datastore;
pub mod datetime;
pub mod error;
pub mod filter;
pub mod prompt;
pub mod render;
pub mod store;
pub mod task;

use std::ffi::OsString;

use anyhow::Context;
use chrono::Utc;
use clap::Parser;
use tracing::{
  debug,
  info
};

pub use error::TaskflowError;

#[tracing::instrument(skip_all)]
pub fn run(
  raw_args: Vec<OsString>
) -> anyhow::Result<()> {
  let pre =
    cli::preprocess_args(&raw_args);
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
    "starting taskflow"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.taskflowrc.as_deref()
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
    datastore::FileStore::open(
      &data_dir
    )
    .with_context(|| {
      format!(
        "failed to open data directory \
         {}",
        data_dir.display()
      )
    })?;

  let now = datetime::truncate_to_millis(
    Utc::now()
  );
  let mut store =
    store::TaskStore::open(storage, now)?;

  let mut renderer =
    render::Renderer::stdout(&cfg)?;
  let inv = cli::Invocation::parse(
    &cfg, cli.rest
  )?;

  let mut fixed;
  let mut interactive;
  let confirm: &mut dyn prompt::Confirm =
    if cli.yes || !cfg.confirmation()? {
      fixed = prompt::FixedAnswer(true);
      &mut fixed
    } else {
      interactive = prompt::StdinPrompt;
      &mut interactive
    };

  let mut session = commands::Session {
    store: &mut store,
    cfg: &cfg,
    renderer: &mut renderer,
    confirm,
    now
  };
  commands::dispatch(&mut session, inv)?;

  info!("done");
  Ok(())
}
