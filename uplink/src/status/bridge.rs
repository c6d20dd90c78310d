use anyhow::{anyhow, Context, Result};
use sensorcore::telemetry::MetricsRecorder;
use std::{
    net::SocketAddr,
    sync::{mpsc, Arc},
    thread,
};
use tokio::runtime::Builder;
use warp::Filter;

fn status_bind_address(port: u16) -> SocketAddr {
    SocketAddr::from(([127, 0, 0, 1], port))
}

/// Serves the pipeline counters as JSON on `GET /status`.
pub struct StatusBridge {
    addr: SocketAddr,
}

impl StatusBridge {
    /// Starts the endpoint on its own thread. Port 0 picks a free port.
    pub fn spawn(port: u16, metrics: Arc<MetricsRecorder>) -> Result<Self> {
        let metrics_filter = warp::any().map(move || metrics.clone());
        let status_route = warp::path("status")
            .and(warp::get())
            .and(metrics_filter)
            .map(|metrics: Arc<MetricsRecorder>| warp::reply::json(&metrics.snapshot()));

        let (ready_tx, ready_rx) = mpsc::channel();
        thread::spawn(move || {
            let runtime = match Builder::new_current_thread().enable_all().build() {
                Ok(runtime) => runtime,
                Err(err) => {
                    let _ = ready_tx.send(Err(err.to_string()));
                    return;
                }
            };
            runtime.block_on(async move {
                match warp::serve(status_route).try_bind_ephemeral(status_bind_address(port)) {
                    Ok((addr, server)) => {
                        let _ = ready_tx.send(Ok(addr));
                        server.await;
                    }
                    Err(err) => {
                        let _ = ready_tx.send(Err(err.to_string()));
                    }
                }
            });
        });

        let addr = ready_rx
            .recv()
            .context("status endpoint thread exited before binding")?
            .map_err(|err| anyhow!("binding status endpoint on port {}: {}", port, err))?;
        log::info!("status endpoint listening on http://{}/status", addr);
        Ok(Self { addr })
    }

    pub fn addr(&self) -> SocketAddr {
        self.addr
    }
}
