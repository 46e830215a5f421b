use std::sync::Arc;

use anyhow::{Context, Result, anyhow};
use clap::Parser;
use tokio::net::TcpListener;
use tracing::{info, warn};

use three_phase_commit::{
    ThreePhase,
    checkup::TcpCheckup,
    cli::{Cli, Command, ServeArgs},
    cohort::Cohort,
    hammer,
    storage::InMemoryStorage,
    transport::http::{self, HttpCommunicationHandler},
};

fn init_tracing() {
    use tracing_subscriber::{EnvFilter, fmt};

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let _ = fmt().with_env_filter(filter).with_target(false).try_init();
}

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let cli = Cli::parse();
    match cli.command {
        Command::Serve(args) => {
            if let Err(err) = serve(args).await {
                warn!("node exited with error: {err:?}");
                return Err(err);
            }
        }
        Command::Hammer(args) => {
            let report = hammer::run(args).await?;
            println!(
                "{} requests, {} succeeded, {} failed",
                report.total(),
                report.succeeded,
                report.failed
            );
        }
    }

    Ok(())
}

async fn serve(args: ServeArgs) -> Result<()> {
    args.validate()?;
    let this_host = args
        .this_host()
        .ok_or_else(|| anyhow!("--node {} does not name a host", args.node))?
        .to_string();

    let checkup = Arc::new(TcpCheckup::new(args.hosts.iter().cloned()));
    checkup.set_probe_interval(args.probe_interval());
    checkup.set_state_change_handler(Arc::new(|host: &str, alive: bool| {
        if alive {
            info!(%host, "host is up");
        } else {
            warn!(%host, "host is down");
        }
    }));
    checkup.start()?;

    let cohort = Cohort::new(this_host.clone(), args.rw_mode(), Arc::clone(&checkup));
    let comm = HttpCommunicationHandler::new(args.rpc_timeout()).context("building http client")?;
    let engine = ThreePhase::new(
        args.engine_config(&this_host),
        Arc::new(comm),
        Arc::new(InMemoryStorage::new()),
        Arc::new(cohort),
    );

    let listener = TcpListener::bind(&this_host)
        .await
        .with_context(|| format!("binding {this_host}"))?;
    info!(node = %this_host, addr = %listener.local_addr()?, mode = ?args.mode, "node listening");

    let shutdown = async {
        let _ = tokio::signal::ctrl_c().await;
        info!("ctrl-c received, shutting down");
    };
    http::serve_until(listener, engine, checkup.clone(), shutdown).await?;
    checkup.stop()?;
    Ok(())
}
