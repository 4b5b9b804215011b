use anyhow::Result;
use clap::Parser;
use nbgwas_common::SubmittedTaskFactory;
use nbgwas_taskrunner::{CommandPropagator, HttpNetworkFetcher, RunnerArgs, TaskRunner};
use std::{env, sync::Arc};
use tracing::info;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> Result<()> {
    let args = RunnerArgs::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(args.env_filter())),
        )
        .init();

    // Nombre de host (solo para info)
    let hostname_str = hostname::get()
        .unwrap_or_default()
        .to_string_lossy()
        .to_string();

    let taskdir = if args.taskdir.is_absolute() {
        args.taskdir.clone()
    } else {
        env::current_dir()?.join(&args.taskdir)
    };

    info!(
        "nbgwas-taskrunner en {} sobre {} (ndex={}, motor={})",
        hostname_str,
        taskdir.display(),
        args.ndex_server,
        args.engine
    );

    let fetcher = HttpNetworkFetcher::new(&args.ndex_server, &args.biggim_url)?;
    let propagator = CommandPropagator::new(args.engine.clone(), args.engine_args.clone());

    let mut runner = TaskRunner::new(
        SubmittedTaskFactory::new(&taskdir),
        Arc::new(fetcher),
        Arc::new(propagator),
        args.settings(),
    );

    runner.run_tasks(|| true).await;
    Ok(())
}
