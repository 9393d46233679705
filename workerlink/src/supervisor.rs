//! Process-lifetime supervision of a [`Client`].
//!
//! [`Supervisor::startup`] warms the connection and spawns an idle task that
//! ticks until shutdown is signaled. [`Supervisor::shutdown`] raises the
//! signal and waits until the idle task has closed the connection.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::Result;
use crate::client::Client;
use crate::transport::Connector;
use crate::zmq::ZmqConnector;

/// Owns the shared client, the shutdown signal, and the idle task.
#[derive(Debug)]
pub struct Supervisor<C: Connector = ZmqConnector> {
    client: Arc<Client<C>>,
    shutdown: watch::Sender<bool>,
    idle: JoinHandle<()>,
}

impl<C: Connector> Supervisor<C> {
    /// Opens the initial connection and starts the idle task.
    ///
    /// A failed open is logged and otherwise ignored: the first exchange
    /// retries it and reports the failure to its caller.
    pub async fn startup(client: Client<C>, idle_interval: Duration) -> Self {
        info!("starting worker link");
        if let Err(e) = client.warm().await {
            warn!(error = %e, "initial connection failed, will retry on first request");
        }

        let client = Arc::new(client);
        let (shutdown, signal) = watch::channel(false);
        let idle = tokio::spawn(idle_loop(Arc::clone(&client), signal, idle_interval));
        Self {
            client,
            shutdown,
            idle,
        }
    }

    /// Shared handle for issuing requests.
    pub fn client(&self) -> Arc<Client<C>> {
        Arc::clone(&self.client)
    }

    /// Signals the idle task and waits until it has closed the connection.
    pub async fn shutdown(self) -> Result<()> {
        info!("stopping worker link");
        // The receiver lives in the idle task; if it already exited there
        // is nobody left to notify.
        let _ = self.shutdown.send(true);
        self.idle.await?;
        info!("worker link stopped");
        Ok(())
    }
}

async fn idle_loop<C: Connector>(
    client: Arc<Client<C>>,
    mut signal: watch::Receiver<bool>,
    interval: Duration,
) {
    loop {
        tokio::select! {
            changed = signal.changed() => {
                if changed.is_err() || *signal.borrow() {
                    break;
                }
            }
            () = tokio::time::sleep(interval) => {
                debug!(connections = client.connections_opened(), "worker link idle");
            }
        }
    }
    client.close().await;
}
