//! # Network Module
//!
//! This module provides a thin blocking WebSocket server abstraction over `tungstenite`, which is
//! what the simulator connects to. Only text frames are surfaced to the user, control frames are
//! handled by `tungstenite` itself.

// ------------------------------------------------------------------------------------------------
// IMPORTS
// ------------------------------------------------------------------------------------------------

use std::net::{SocketAddr, TcpListener, TcpStream};
use log::debug;
use tungstenite::{Message, WebSocket};

// Export tungstenite
pub use tungstenite;

// ------------------------------------------------------------------------------------------------
// STRUCTS
// ------------------------------------------------------------------------------------------------

/// A listening socket which accepts simulator connections.
pub struct SimListener {
    listener: TcpListener
}

/// A WebSocket connection to the simulator.
pub struct SimSocket {
    ws: WebSocket<TcpStream>,

    peer: SocketAddr
}

// ------------------------------------------------------------------------------------------------
// ENUMS
// ------------------------------------------------------------------------------------------------

#[derive(thiserror::Error, Debug)]
pub enum SimSocketError {
    #[error("Could not bind to {0}: {1}")]
    BindError(String, std::io::Error),

    #[error("Could not accept an incoming connection: {0}")]
    AcceptError(std::io::Error),

    #[error("WebSocket handshake with {0} failed: {1}")]
    HandshakeError(SocketAddr, String),

    #[error("Could not receive a frame: {0}")]
    RecvError(tungstenite::Error),

    #[error("Could not send a frame: {0}")]
    SendError(tungstenite::Error),

    #[error("Could not close the connection: {0}")]
    CloseError(tungstenite::Error)
}

// ------------------------------------------------------------------------------------------------
// IMPLS
// ------------------------------------------------------------------------------------------------

impl SimListener {
    /// Bind a listener to the given endpoint, such as `"0.0.0.0:4567"`.
    pub fn bind(endpoint: &str) -> Result<Self, SimSocketError> {
        let listener = TcpListener::bind(endpoint)
            .map_err(|e| SimSocketError::BindError(endpoint.to_string(), e))?;

        Ok(Self { listener })
    }

    /// The address the listener is bound to.
    pub fn local_addr(&self) -> Option<SocketAddr> {
        self.listener.local_addr().ok()
    }

    /// Block until a client connects and completes the WebSocket handshake.
    pub fn accept(&self) -> Result<SimSocket, SimSocketError> {
        let (stream, peer) = self.listener.accept()
            .map_err(SimSocketError::AcceptError)?;

        let ws = tungstenite::accept(stream)
            .map_err(|e| SimSocketError::HandshakeError(peer, e.to_string()))?;

        Ok(SimSocket { ws, peer })
    }
}

impl SimSocket {
    /// Address of the connected client.
    pub fn peer(&self) -> SocketAddr {
        self.peer
    }

    /// Block until the next text frame arrives.
    ///
    /// Returns `Ok(None)` once the client has closed the connection.
    pub fn recv_frame(&mut self) -> Result<Option<String>, SimSocketError> {
        loop {
            match self.ws.read() {
                Ok(Message::Text(s)) => return Ok(Some(s)),
                // The close reply is queued by tungstenite, the next read reports the closure
                Ok(Message::Close(_)) => continue,
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed)
                | Err(tungstenite::Error::Protocol(
                    tungstenite::error::ProtocolError::ResetWithoutClosingHandshake
                )) => return Ok(None),
                Err(e) => return Err(SimSocketError::RecvError(e))
            }
        }
    }

    /// Send a text frame to the client.
    pub fn send_frame(&mut self, frame: &str) -> Result<(), SimSocketError> {
        self.ws.send(Message::Text(frame.to_string()))
            .map_err(SimSocketError::SendError)
    }

    /// Close the connection, waiting for the client to acknowledge.
    pub fn close(mut self) -> Result<(), SimSocketError> {
        match self.ws.close(None) {
            Ok(())
            | Err(tungstenite::Error::ConnectionClosed)
            | Err(tungstenite::Error::AlreadyClosed) => (),
            Err(e) => return Err(SimSocketError::CloseError(e))
        }

        // Drain until the closing handshake completes
        loop {
            match self.ws.read() {
                Ok(_) => continue,
                Err(tungstenite::Error::ConnectionClosed)
                | Err(tungstenite::Error::AlreadyClosed) => return Ok(()),
                Err(e) => {
                    debug!("Connection to {} did not close cleanly: {}", self.peer, e);
                    return Ok(())
                }
            }
        }
    }
}
