//! Pure-ish dispatch from `(Request, connection identity)` to `(Response,
//! side effects on the State Store)`. A worker is identified by the
//! `node_id` carried inside each message, never by the socket — the
//! Connection Handler passes the peer address only for `register_node`'s
//! informational `addr` field.

use crate::error::RouterError;
use crate::messages::{Request, Response, SuccessBody};
use crate::state::State;
use std::net::SocketAddr;

pub async fn dispatch(state: &State, req: Request, peer: Option<SocketAddr>) -> Response {
    match route(state, req, peer).await {
        Ok(resp) => resp,
        Err(e) => Response::error(e.message()),
    }
}

async fn route(
    state: &State,
    req: Request,
    peer: Option<SocketAddr>,
) -> Result<Response, RouterError> {
    match req {
        Request::RegisterNode { node_id, ram_limit } => {
            state.register_node(node_id, peer, ram_limit).await;
            Ok(Response::ok())
        }

        Request::Heartbeat { node_id } => {
            if state.heartbeat(&node_id).await {
                Ok(Response::ok())
            } else {
                Err(RouterError::UnknownWorker)
            }
        }

        Request::GetTask { node_id } => {
            let task = state.get_task(&node_id).await;
            Ok(Response::Success(SuccessBody::Task {
                status: "success",
                task,
            }))
        }

        Request::TaskResult {
            node_id,
            task_id,
            result,
        } => {
            state.task_result(&node_id, &task_id, result).await;
            Ok(Response::ok())
        }

        Request::SubmitDag { dag } => {
            let dag_id = state.submit_dag(dag).await?;
            Ok(Response::Success(SuccessBody::DagId {
                status: "success",
                dag_id,
            }))
        }

        Request::GetStatus => {
            let (nodes, dags, timestamp) = state.get_status().await;
            Ok(Response::Success(SuccessBody::Status {
                status: "success",
                nodes,
                dags,
                timestamp,
            }))
        }

        Request::GetDagStatus { dag_id } => match state.get_dag_status(&dag_id).await {
            Some(dag) => Ok(Response::Success(SuccessBody::Dag {
                status: "success",
                dag,
            })),
            None => Err(RouterError::UnknownDag),
        },
    }
}

/// The two outcomes of trying to turn a frame's bytes into a `Request`:
/// a framing violation (close the connection, no response) or a decoded
/// envelope the Router rejects (send an error response, keep the
/// connection). The line is drawn at "did the bytes decode as a JSON
/// object at all" — malformed JSON or a non-object payload never reaches
/// the Router.
#[derive(Debug)]
pub enum ParseOutcome {
    Framing,
    Rejected(RouterError),
}

const KNOWN_TYPES: &[&str] = &[
    "register_node",
    "heartbeat",
    "get_task",
    "task_result",
    "submit_dag",
    "get_status",
    "get_dag_status",
];

pub fn parse_request(payload: &[u8]) -> Result<Request, ParseOutcome> {
    let value: serde_json::Value =
        serde_json::from_slice(payload).map_err(|_| ParseOutcome::Framing)?;
    if !value.is_object() {
        return Err(ParseOutcome::Framing);
    }
    let type_name = value
        .get("type")
        .and_then(|v| v.as_str())
        .unwrap_or("")
        .to_string();
    serde_json::from_value(value.clone()).map_err(|_| {
        if KNOWN_TYPES.contains(&type_name.as_str()) {
            ParseOutcome::Rejected(RouterError::MissingField(
                "required field for this message type",
            ))
        } else {
            ParseOutcome::Rejected(RouterError::UnknownMessageType(type_name))
        }
    })
}
