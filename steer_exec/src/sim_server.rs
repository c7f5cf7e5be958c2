//! # Simulator Server
//!
//! Accepts connections from the driving simulator and answers every telemetry event with a
//! steering command. Connections are served one at a time, each with its own `SteerCtrl`, so no
//! controller state carries over from one drive to the next.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use log::{debug, info, warn};
use std::net::SocketAddr;

use comms_if::{
    net::{SimListener, SimSocket, SimSocketError},
    sim::{self, SimMessage, SimMsgError}
};
use util::module::State;

use crate::params::SteerExecParams;
use crate::pid_ctrl::TuningSummary;
use crate::steer_ctrl::{SteerCtrl, SteerCtrlError};

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// Simulator server
pub struct SimServer {
    listener: SimListener,

    /// Number of connections after which `run` returns, zero for no limit
    max_sessions: usize
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

/// The reason the server stopped.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum ServerExit {
    /// A tuning run completed, the connection it ran on has been closed.
    TuningComplete(TuningSummary),

    /// The configured number of connections has been served.
    SessionLimit(usize)
}

/// How a single connection ended.
#[derive(Debug, Clone, Copy, PartialEq)]
enum ConnectionEnd {
    Closed,
    TuningComplete(TuningSummary)
}

#[derive(Debug, thiserror::Error)]
pub enum SimServerError {
    #[error("Socket error: {0}")]
    SocketError(SimSocketError),

    #[error("Could not initialise SteerCtrl for a new connection: {0}")]
    SteerCtrlInitError(SteerCtrlError),

    #[error("Could not encode the steering command: {0}")]
    EncodeError(SimMsgError)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimServer {
    /// Bind the server to the endpoint in the parameters.
    ///
    /// This does not block, connections are accepted in `run`.
    pub fn bind(params: &SteerExecParams) -> Result<Self, SimServerError> {
        let listener = SimListener::bind(&params.sim_endpoint)
            .map_err(SimServerError::SocketError)?;

        Ok(Self {
            listener,
            max_sessions: params.max_sessions
        })
    }

    /// Address the server is listening on.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr()
    }

    /// Serve simulator connections until a tuning run completes or the session limit is reached.
    ///
    /// `new_ctrl` is called once per accepted connection to build the controller for it.
    /// Failed handshakes are logged and the server carries on listening.
    pub fn run<F>(&self, mut new_ctrl: F) -> Result<ServerExit, SimServerError>
    where
        F: FnMut() -> Result<SteerCtrl, SteerCtrlError>
    {
        let mut num_sessions = 0;

        loop {
            let socket = match self.listener.accept() {
                Ok(s) => s,
                Err(e @ SimSocketError::HandshakeError(..)) => {
                    warn!("{}", e);
                    continue
                },
                Err(e) => return Err(SimServerError::SocketError(e))
            };

            num_sessions += 1;
            info!("Simulator connected from {} (session {})", socket.peer(), num_sessions);

            let ctrl = new_ctrl().map_err(SimServerError::SteerCtrlInitError)?;

            match serve_connection(socket, ctrl)? {
                ConnectionEnd::TuningComplete(summary) => {
                    return Ok(ServerExit::TuningComplete(summary))
                },
                ConnectionEnd::Closed => info!("Simulator disconnected")
            }

            if self.max_sessions > 0 && num_sessions >= self.max_sessions {
                return Ok(ServerExit::SessionLimit(num_sessions))
            }
        }
    }
}

// ------------------------------------------------------------------------------------------------
// FUNCTIONS
// ------------------------------------------------------------------------------------------------

/// Process frames from one simulator connection until it closes or the tuning run completes.
///
/// Socket errors end the connection but not the server.
fn serve_connection(
    mut socket: SimSocket,
    mut ctrl: SteerCtrl
) -> Result<ConnectionEnd, SimServerError> {
    loop {
        let frame = match socket.recv_frame() {
            Ok(Some(f)) => f,
            Ok(None) => return Ok(ConnectionEnd::Closed),
            Err(e) => {
                warn!("Dropping connection to {}: {}", socket.peer(), e);
                return Ok(ConnectionEnd::Closed)
            }
        };

        let reply = match SimMessage::from_frame(&frame) {
            Ok(Some(SimMessage::Telemetry(tm))) => match ctrl.proc(&tm) {
                Ok((cmd, report)) => {
                    let reply = cmd.to_frame().map_err(SimServerError::EncodeError)?;

                    if let Some(summary) = report.tuning_summary {
                        send(&mut socket, &reply);
                        if let Err(e) = socket.close() {
                            warn!("Could not close the connection cleanly: {}", e);
                        }
                        return Ok(ConnectionEnd::TuningComplete(summary))
                    }

                    reply
                },
                Err(e) => {
                    warn!("{} could not process telemetry: {}", SteerCtrl::NAME, e);
                    continue
                }
            },
            Ok(Some(SimMessage::Manual)) => sim::manual_frame(),
            Ok(Some(SimMessage::Other(event))) => {
                debug!("Ignoring \"{}\" event", event);
                continue
            },
            Ok(None) => continue,
            Err(e) => {
                warn!("Could not decode frame from the simulator: {}", e);
                continue
            }
        };

        if !send(&mut socket, &reply) {
            return Ok(ConnectionEnd::Closed)
        }
    }
}

/// Send a frame, returning false if the connection is no longer usable.
fn send(socket: &mut SimSocket, frame: &str) -> bool {
    match socket.send_frame(frame) {
        Ok(()) => true,
        Err(e) => {
            warn!("Dropping connection to {}: {}", socket.peer(), e);
            false
        }
    }
}
