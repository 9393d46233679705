//! `workerlink run`: hold a supervised link for the process lifetime.

use std::future::pending;
use std::time::Duration;

use anyhow::Result;
use clap::Args;
use tokio::time::{Interval, MissedTickBehavior};
use tracing::{info, warn};
use workerlink::{Client, Config, Connector, Operation, Service, Supervisor};

/// Arguments for `workerlink run`.
#[derive(Args)]
pub(crate) struct RunArgs {
    /// Send an info request every N seconds as a health probe (0 disables).
    #[arg(long, default_value_t = 0)]
    probe_secs: u64,
}

/// Starts the supervisor, waits for SIGINT/SIGTERM, then shuts down.
pub(crate) async fn run<C: Connector>(
    client: Client<C>,
    config: &Config,
    args: RunArgs,
) -> Result<()> {
    let sup = Supervisor::startup(client, config.idle_interval()).await;
    info!(endpoint = %config.endpoint, transport = ?config.transport, "worker link running");

    let mut probe = (args.probe_secs > 0).then(|| {
        let mut every = tokio::time::interval(Duration::from_secs(args.probe_secs));
        every.set_missed_tick_behavior(MissedTickBehavior::Delay);
        every
    });

    let stop = shutdown_signal();
    tokio::pin!(stop);
    let handle = sup.client();
    loop {
        tokio::select! {
            res = &mut stop => {
                let sig = res?;
                info!(signal = sig, "shutdown requested");
                break;
            }
            () = tick(&mut probe) => {
                match handle.send_request(Service::Worker, Operation::Info, None).await {
                    Ok(value) => info!(?value, "probe ok"),
                    Err(e) => warn!(error = %e, "probe failed"),
                }
            }
        }
    }

    sup.shutdown().await?;
    Ok(())
}

async fn tick(probe: &mut Option<Interval>) {
    match probe {
        Some(every) => {
            every.tick().await;
        }
        None => pending().await,
    }
}

#[cfg(unix)]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    use tokio::signal::unix::{SignalKind, signal};

    let mut term = signal(SignalKind::terminate())?;
    tokio::select! {
        res = tokio::signal::ctrl_c() => res.map(|()| "SIGINT"),
        _ = term.recv() => Ok("SIGTERM"),
    }
}

#[cfg(not(unix))]
async fn shutdown_signal() -> std::io::Result<&'static str> {
    tokio::signal::ctrl_c().await.map(|()| "ctrl-c")
}
