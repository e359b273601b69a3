//! Command session: one duplex connection driving one instrument.
//!
//! A [`CommandSession`] reads command envelopes from a WebSocket stream, dispatches
//! each to its [`DeviceController`] strictly one at a time, and answers measurement
//! commands with a snapshot. Any failure, or the peer going away, terminates the
//! session.
//!
//! # Teardown
//!
//! The controller is wrapped in an [`InstrumentGuard`] for the lifetime of the
//! loop. Whatever ends the loop (peer close, malformed input, driver failure, or the
//! session future being dropped) the guard's `Drop` closes the instrument exactly
//! once.

use std::ops::{Deref, DerefMut};

use futures::{Sink, SinkExt, Stream, StreamExt};
use tokio_tungstenite::tungstenite::error::ProtocolError;
use tokio_tungstenite::tungstenite::{Error as WsError, Message};
use tracing::{debug, info, info_span, warn, Instrument};

use crate::device::{DeviceController, MeasurementSnapshot};
use crate::driver::Tc08Driver;
use crate::error::{RelayError, Result};
use crate::protocol::{encode_snapshot, Command};

/// Lifecycle of a session. There is no way back from `Terminated`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Receiving and dispatching commands.
    Active,
    /// Loop has exited and the instrument is released.
    Terminated,
}

/// Why a session stopped.
#[derive(Debug)]
pub enum TerminationReason {
    /// The peer closed the connection or disappeared.
    PeerClosed,
    /// A command could not be parsed or executed, or the transport failed.
    Failed(RelayError),
}

/// Summary returned when a session ends.
#[derive(Debug)]
pub struct SessionReport {
    /// Why the loop exited.
    pub reason: TerminationReason,
    /// Commands that parsed and were handed to the controller.
    pub commands_dispatched: usize,
    /// Snapshots written back to the peer.
    pub replies_sent: usize,
}

impl SessionReport {
    /// The error that ended the session, if it did not end cleanly.
    pub fn error(&self) -> Option<&RelayError> {
        match &self.reason {
            TerminationReason::Failed(err) => Some(err),
            TerminationReason::PeerClosed => None,
        }
    }
}

/// Closes the instrument when dropped.
pub struct InstrumentGuard<'a, D: Tc08Driver> {
    controller: &'a mut DeviceController<D>,
}

impl<'a, D: Tc08Driver> InstrumentGuard<'a, D> {
    /// Guard `controller` until the returned value is dropped.
    pub fn new(controller: &'a mut DeviceController<D>) -> Self {
        Self { controller }
    }
}

impl<D: Tc08Driver> Deref for InstrumentGuard<'_, D> {
    type Target = DeviceController<D>;

    fn deref(&self) -> &Self::Target {
        self.controller
    }
}

impl<D: Tc08Driver> DerefMut for InstrumentGuard<'_, D> {
    fn deref_mut(&mut self) -> &mut Self::Target {
        self.controller
    }
}

impl<D: Tc08Driver> Drop for InstrumentGuard<'_, D> {
    fn drop(&mut self) {
        match self.controller.close() {
            Ok(()) => debug!("Instrument released"),
            Err(e) => warn!(error = %e, "Failed to close instrument during teardown"),
        }
    }
}

/// Run one command against the controller. Returns a snapshot for measurement
/// commands.
pub fn dispatch<D: Tc08Driver>(
    controller: &mut DeviceController<D>,
    command: &Command,
) -> Result<Option<MeasurementSnapshot>> {
    match command {
        Command::OpenInstrument => controller.open()?,
        Command::EnableSampling { sampling_interval } => {
            controller.enable_sampling(*sampling_interval)?
        }
        Command::DisableSampling => controller.disable_sampling()?,
        Command::ConfigureChannel {
            channel,
            channel_type,
        } => controller.configure_channel(*channel, channel_type)?,
        Command::DisableChannel { channel } => controller.disable_channel(*channel)?,
        Command::MeasureAllChannels => return controller.measure_all().map(Some),
    }
    Ok(None)
}

/// What to do with one inbound frame.
enum Inbound {
    Command(String),
    Ignore,
    Closed,
    Failed(RelayError),
}

fn classify(frame: Option<std::result::Result<Message, WsError>>) -> Inbound {
    match frame {
        None => Inbound::Closed,
        Some(Ok(Message::Text(text))) => Inbound::Command(text),
        Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
            Ok(text) => Inbound::Command(text),
            Err(_) => Inbound::Failed(RelayError::MalformedCommand(
                "binary frame is not UTF-8".to_string(),
            )),
        },
        Some(Ok(Message::Close(_))) => Inbound::Closed,
        Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_))) => Inbound::Ignore,
        Some(Err(
            WsError::ConnectionClosed
            | WsError::AlreadyClosed
            | WsError::Protocol(ProtocolError::ResetWithoutClosingHandshake),
        )) => Inbound::Closed,
        Some(Err(e)) => Inbound::Failed(RelayError::Transport(e.to_string())),
    }
}

/// One connection bound to one instrument.
pub struct CommandSession<S, D: Tc08Driver> {
    stream: S,
    controller: DeviceController<D>,
    state: SessionState,
    peer: String,
}

impl<S, D> CommandSession<S, D>
where
    S: Stream<Item = std::result::Result<Message, WsError>>
        + Sink<Message, Error = WsError>
        + Unpin,
    D: Tc08Driver,
{
    /// Bind a connection to a (typically closed) controller.
    pub fn new(stream: S, controller: DeviceController<D>) -> Self {
        Self {
            stream,
            controller,
            state: SessionState::Active,
            peer: "unknown".to_string(),
        }
    }

    /// Label used in log output, typically the peer address.
    pub fn with_peer(mut self, peer: impl Into<String>) -> Self {
        self.peer = peer.into();
        self
    }

    /// `Terminated` once [`run`](Self::run) has returned.
    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Process commands until the session terminates. The instrument is closed
    /// before this returns.
    pub async fn run(&mut self) -> SessionReport {
        let span = info_span!("session", peer = %self.peer);
        self.serve().instrument(span).await
    }

    async fn serve(&mut self) -> SessionReport {
        info!("Session started");
        let mut commands_dispatched = 0;
        let mut replies_sent = 0;

        let mut instrument = InstrumentGuard::new(&mut self.controller);
        let mut reason = None;

        while self.state == SessionState::Active {
            // Sole suspension point apart from writing a reply
            let text = match classify(self.stream.next().await) {
                Inbound::Command(text) => text,
                Inbound::Ignore => continue,
                Inbound::Closed => {
                    info!("Peer closed the connection");
                    reason = Some(TerminationReason::PeerClosed);
                    self.state = SessionState::Terminated;
                    continue;
                }
                Inbound::Failed(err) => {
                    reason = Some(TerminationReason::Failed(err));
                    self.state = SessionState::Terminated;
                    continue;
                }
            };

            let outcome = match Command::parse(&text) {
                Ok(command) => {
                    commands_dispatched += 1;
                    debug!(command = command.name(), "Dispatching command");
                    match dispatch(&mut instrument, &command) {
                        Ok(Some(snapshot)) => match encode_snapshot(&snapshot) {
                            Ok(reply) => self
                                .stream
                                .send(Message::Text(reply))
                                .await
                                .map(|()| replies_sent += 1)
                                .map_err(|e| RelayError::Transport(e.to_string())),
                            Err(e) => Err(e),
                        },
                        Ok(None) => Ok(()),
                        Err(e) => Err(e),
                    }
                }
                Err(e) => Err(e),
            };

            if let Err(err) = outcome {
                reason = Some(TerminationReason::Failed(err));
                self.state = SessionState::Terminated;
            }
        }

        // Release the instrument before touching the connection again
        drop(instrument);

        if let Err(e) = SinkExt::close(&mut self.stream).await {
            debug!(error = %e, "Connection already gone at teardown");
        }

        let reason = reason.unwrap_or(TerminationReason::PeerClosed);
        match &reason {
            TerminationReason::PeerClosed => {
                info!(commands_dispatched, replies_sent, "Session ended")
            }
            TerminationReason::Failed(err) => {
                warn!(error = %err, commands_dispatched, replies_sent, "Session terminated")
            }
        }

        SessionReport {
            reason,
            commands_dispatched,
            replies_sent,
        }
    }
}
