pub mod cache;
pub mod cli;
pub mod client;
pub mod commands;
pub mod config;
pub mod connection;
pub mod error;
pub mod render;
pub mod service;
pub mod session;
pub mod view;

use std::ffi::OsString;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use pocket_shared::Principal;
use tracing::{
  debug,
  info
};

pub use cache::{
  CacheEvent,
  KeyScope,
  QueryCache,
  QueryData,
  QueryKey,
  QuerySnapshot
};
pub use client::{
  MutationKind,
  MutationTarget,
  Notice,
  NoticeLevel,
  TaskClient
};
pub use connection::{
  Connection,
  ConnectionState
};
pub use error::{
  ClientError,
  ClientResult
};
pub use session::{
  AppGate,
  Session
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
    "starting pocket CLI"
  );
  debug!(?pre.rc_overrides, "preprocessed rc overrides");

  let mut cfg = config::Config::load(
    cli.pocketrc.as_deref()
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

  let identity = cli
    .identity
    .map(Principal::new)
    .unwrap_or_else(|| cfg.identity());

  let mut renderer =
    render::Renderer::new(&cfg);
  let command = cli.command.unwrap_or(
    cli::Command::List {
      view: None,
      sort: None
    }
  );

  let runtime =
    tokio::runtime::Builder::new_current_thread()
      .enable_all()
      .build()
      .context(
        "failed to start async \
         runtime"
      )?;

  runtime.block_on(async {
    let service =
      service::LocalTaskService::open(
        &data_dir,
        identity.clone()
      )
      .with_context(|| {
        format!(
          "failed to open task store \
           at {}",
          data_dir.display()
        )
      })?;

    let session = Session::new();
    commands::run_session(
      &session,
      identity,
      Arc::new(service),
      &cfg,
      &mut renderer,
      command
    )
    .await
  })?;

  info!("done");
  Ok(())
}
