//! Connection Handler: one task per accepted socket, lifetime = that
//! socket. Reads a frame, synchronously invokes the Message Router, writes
//! exactly one response frame, loops. A framing failure closes the socket
//! with no response; an exception inside the router never propagates past
//! this task.

use fabric_core::codec::{read_frame, write_frame};
use fabric_core::error::FrameError;
use fabric_core::router::{dispatch, parse_request, ParseOutcome};
use fabric_core::state::State;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpStream;

pub async fn handle_connection(mut socket: TcpStream, peer: SocketAddr, state: Arc<State>) {
    loop {
        let frame = match read_frame(&mut socket).await {
            Ok(Some(frame)) => frame,
            Ok(None) => {
                tracing::debug!(%peer, "connection closed");
                return;
            }
            Err(e) => {
                log_framing_failure(&peer, &e);
                return;
            }
        };

        let response = match parse_request(&frame) {
            Ok(req) => dispatch(&state, req, Some(peer)).await,
            Err(ParseOutcome::Framing) => {
                tracing::warn!(%peer, "malformed or non-object JSON payload, closing connection");
                return;
            }
            Err(ParseOutcome::Rejected(e)) => fabric_core::messages::Response::error(e.message()),
        };

        let payload = match serde_json::to_vec(&response) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::error!(%peer, error = %e, "failed to serialize response");
                return;
            }
        };

        if let Err(e) = write_frame(&mut socket, &payload).await {
            log_framing_failure(&peer, &e);
            return;
        }
    }
}

fn log_framing_failure(peer: &SocketAddr, e: &FrameError) {
    match e {
        FrameError::TooLarge { len, max } => {
            tracing::warn!(%peer, len, max, "oversize frame, closing connection")
        }
        FrameError::Eof => tracing::debug!(%peer, "peer closed mid-frame"),
        FrameError::Io(io_err) => tracing::warn!(%peer, error = %io_err, "io error, closing connection"),
    }
}
