//! Exercises the wire protocol over a real TCP socket: framing, the typed
//! request union, and the Controller's single/keep-open error handling.

use fabric_core::codec::{read_frame, write_frame};
use fabric_core::router::{dispatch, parse_request, ParseOutcome};
use fabric_core::state::State;
use std::sync::Arc;
use tokio::net::{TcpListener, TcpStream};

async fn spawn_controller() -> std::net::SocketAddr {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let state = Arc::new(State::new());

    tokio::spawn(async move {
        loop {
            let (mut socket, _peer) = match listener.accept().await {
                Ok(pair) => pair,
                Err(_) => return,
            };
            let state = state.clone();
            tokio::spawn(async move {
                loop {
                    let frame = match read_frame(&mut socket).await {
                        Ok(Some(f)) => f,
                        _ => return,
                    };
                    let response = match parse_request(&frame) {
                        Ok(req) => dispatch(&state, req, None).await,
                        Err(ParseOutcome::Framing) => return,
                        Err(ParseOutcome::Rejected(e)) => {
                            fabric_core::messages::Response::error(e.message())
                        }
                    };
                    let payload = serde_json::to_vec(&response).unwrap();
                    if write_frame(&mut socket, &payload).await.is_err() {
                        return;
                    }
                }
            });
        }
    });

    addr
}

async fn send(stream: &mut TcpStream, req: &serde_json::Value) -> serde_json::Value {
    let payload = serde_json::to_vec(req).unwrap();
    write_frame(stream, &payload).await.unwrap();
    let frame = read_frame(stream).await.unwrap().unwrap();
    serde_json::from_slice(&frame).unwrap()
}

#[tokio::test]
async fn register_heartbeat_get_task_round_trip() {
    let addr = spawn_controller().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "register_node", "node_id": "w1", "ram_limit": 128 }),
    )
    .await;
    assert_eq!(resp["status"], "success");

    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "heartbeat", "node_id": "w1" }),
    )
    .await;
    assert_eq!(resp["status"], "success");

    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "get_task", "node_id": "w1" }),
    )
    .await;
    assert_eq!(resp["status"], "success");
    assert!(resp["task"].is_null());
}

#[tokio::test]
async fn submit_dag_then_get_task_returns_root() {
    let addr = spawn_controller().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    send(
        &mut stream,
        &serde_json::json!({ "type": "register_node", "node_id": "w1", "ram_limit": 128 }),
    )
    .await;

    let resp = send(
        &mut stream,
        &serde_json::json!({
            "type": "submit_dag",
            "dag": {
                "name": "demo",
                "tasks": [{ "id": "a", "module": "m" }],
            }
        }),
    )
    .await;
    assert_eq!(resp["status"], "success");
    let dag_id = resp["dag_id"].as_str().unwrap().to_string();

    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "get_task", "node_id": "w1" }),
    )
    .await;
    assert_eq!(resp["task"]["id"], "a");
    assert_eq!(resp["task"]["dag_id"], dag_id);
}

#[tokio::test]
async fn unknown_message_type_gets_error_but_connection_stays_open() {
    let addr = spawn_controller().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let resp = send(&mut stream, &serde_json::json!({ "type": "not_a_real_type" })).await;
    assert_eq!(resp["status"], "error");

    // The connection is still usable after a rejected request.
    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "register_node", "node_id": "w2", "ram_limit": 64 }),
    )
    .await;
    assert_eq!(resp["status"], "success");
}

#[tokio::test]
async fn get_dag_status_for_unknown_dag_is_an_error() {
    let addr = spawn_controller().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    let resp = send(
        &mut stream,
        &serde_json::json!({ "type": "get_dag_status", "dag_id": "does-not-exist" }),
    )
    .await;
    assert_eq!(resp["status"], "error");
}

#[tokio::test]
async fn malformed_payload_closes_connection_with_no_response() {
    let addr = spawn_controller().await;
    let mut stream = TcpStream::connect(addr).await.unwrap();

    // A well-formed frame carrying bytes that are not a JSON object at all.
    write_frame(&mut stream, b"not json").await.unwrap();

    let result = read_frame(&mut stream).await;
    assert!(matches!(result, Ok(None)) || result.is_err());
}
