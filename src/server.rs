//! WebSocket listener that hands each connection its own instrument session.
//!
//! Only one session may hold the instrument at a time. A connection that arrives
//! while a session is active is logged and dropped before the WebSocket handshake.

use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;

use tokio::net::{TcpListener, TcpStream};
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

use crate::device::{DeviceController, TemperatureUnit};
use crate::driver::Tc08Driver;
use crate::error::{RelayError, Result};
use crate::session::{CommandSession, TerminationReason};

/// Produces a fresh driver for every accepted session.
pub type DriverFactory = Arc<dyn Fn() -> Box<dyn Tc08Driver> + Send + Sync>;

/// Accepts WebSocket peers and runs at most one [`CommandSession`] at a time.
pub struct RelayServer {
    listener: TcpListener,
    factory: DriverFactory,
    units: TemperatureUnit,
    instrument_permit: Arc<Semaphore>,
}

impl RelayServer {
    /// Bind the listener. Use port 0 to let the OS choose.
    pub async fn bind(addr: &str, units: TemperatureUnit, factory: DriverFactory) -> Result<Self> {
        let listener = TcpListener::bind(addr)
            .await
            .map_err(|e| RelayError::Transport(format!("failed to bind {addr}: {e}")))?;
        info!(address = %addr, %units, "Relay listening");

        Ok(Self {
            listener,
            factory,
            units,
            instrument_permit: Arc::new(Semaphore::new(1)),
        })
    }

    /// Address actually bound, useful after binding port 0.
    pub fn local_addr(&self) -> Result<SocketAddr> {
        self.listener
            .local_addr()
            .map_err(|e| RelayError::Transport(e.to_string()))
    }

    /// Serve until Ctrl-C.
    pub async fn run(self) -> Result<()> {
        self.run_until(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Failed to listen for Ctrl-C");
                std::future::pending::<()>().await;
            }
        })
        .await
    }

    /// Serve until `shutdown` completes. A session still running at that point is
    /// cancelled, which closes its instrument.
    pub async fn run_until<F>(self, shutdown: F) -> Result<()>
    where
        F: Future<Output = ()>,
    {
        tokio::pin!(shutdown);
        let mut sessions = JoinSet::new();

        loop {
            tokio::select! {
                _ = &mut shutdown => {
                    info!("Shutdown requested, no longer accepting connections");
                    break;
                }
                Some(joined) = sessions.join_next(), if !sessions.is_empty() => {
                    if let Err(e) = joined {
                        error!(error = %e, "Session task failed");
                    }
                }
                accepted = self.listener.accept() => match accepted {
                    Ok((socket, peer)) => self.admit(socket, peer, &mut sessions),
                    Err(e) => error!(error = %e, "Accept error"),
                },
            }
        }

        sessions.shutdown().await;
        info!("Relay stopped");
        Ok(())
    }

    fn admit(&self, socket: TcpStream, peer: SocketAddr, sessions: &mut JoinSet<()>) {
        let permit = match Arc::clone(&self.instrument_permit).try_acquire_owned() {
            Ok(permit) => permit,
            Err(_) => {
                warn!(%peer, "Instrument busy, refusing connection");
                drop(socket);
                return;
            }
        };

        let controller = DeviceController::new((self.factory)(), self.units);
        sessions.spawn(serve_connection(socket, peer, controller, permit));
    }
}

async fn serve_connection(
    socket: TcpStream,
    peer: SocketAddr,
    controller: DeviceController<Box<dyn Tc08Driver>>,
    _permit: OwnedSemaphorePermit,
) {
    let stream = match tokio_tungstenite::accept_async(socket).await {
        Ok(stream) => stream,
        Err(e) => {
            warn!(%peer, error = %e, "WebSocket handshake failed");
            return;
        }
    };
    debug!(%peer, "WebSocket handshake complete");

    let mut session = CommandSession::new(stream, controller).with_peer(peer.to_string());
    let report = session.run().await;
    if let TerminationReason::Failed(err) = &report.reason {
        debug!(%peer, error = %err, validation = err.is_validation(), "Session failed");
    }
}
