//! WebSocket Multiplexer
//!
//! One framed duplex channel per connection; either side may send a request.
//! Client-originated frames are dispatched through the same route table as
//! plain HTTP. Server-originated requests deliver queued envelopes
//! (`PUT /api/v1/message`) one at a time in enqueue order, each awaiting its
//! acknowledging response before the envelope leaves the queue, followed by a
//! single `PUT /api/v1/queue/empty` once the connect-time backlog has
//! drained. The provisioning endpoint advertises a fresh address uuid and
//! relays exactly one provision envelope.

use std::sync::Arc;

use axum::body::Body;
use axum::extract::ws::{Message, WebSocket, WebSocketUpgrade};
use axum::extract::{Query, State};
use axum::http::header::AUTHORIZATION;
use axum::http::{Method, Request, StatusCode, Uri};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::Router;
use futures_util::{SinkExt, StreamExt};
use prost::Message as ProstMessage;
use serde::Deserialize;
use tower::ServiceExt;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::auth;
use crate::proto::provisioning::ProvisioningUuid;
use crate::proto::websocket::{
    web_socket_message, WebSocketMessage, WebSocketRequestMessage, WebSocketResponseMessage,
};
use crate::state::{AuthenticatedDevice, ServerState};

/// Shared context for the WebSocket routes: the protocol state plus the REST
/// router client frames are dispatched into.
#[derive(Clone)]
pub struct WsContext {
    pub state: Arc<ServerState>,
    pub api: Router,
}

pub fn router(context: WsContext) -> Router {
    Router::new()
        .route("/v1/websocket/", get(device_upgrade))
        .route("/v1/websocket/provisioning/", get(provisioning_upgrade))
        .with_state(context)
}

#[derive(Deserialize)]
struct SocketCredentials {
    login: String,
    password: String,
}

async fn device_upgrade(
    State(context): State<WsContext>,
    Query(credentials): Query<SocketCredentials>,
    upgrade: WebSocketUpgrade,
) -> Response {
    let device = match context
        .state
        .authenticate(&credentials.login, &credentials.password)
    {
        Ok(device) => device,
        Err(_) => return StatusCode::UNAUTHORIZED.into_response(),
    };

    upgrade.on_upgrade(move |socket| {
        handle_device_socket(socket, context, device, credentials)
    })
}

async fn provisioning_upgrade(
    State(context): State<WsContext>,
    upgrade: WebSocketUpgrade,
) -> Response {
    upgrade.on_upgrade(move |socket| handle_provisioning_socket(socket, context))
}

fn request_frame(id: u64, verb: &str, path: &str, body: Option<Vec<u8>>) -> Message {
    let frame = WebSocketMessage {
        r#type: Some(web_socket_message::Type::Request as i32),
        request: Some(WebSocketRequestMessage {
            verb: Some(verb.to_string()),
            path: Some(path.to_string()),
            body,
            id: Some(id),
            headers: vec![],
        }),
        response: None,
    };
    Message::Binary(frame.encode_to_vec())
}

fn response_frame(response: WebSocketResponseMessage) -> Message {
    let frame = WebSocketMessage {
        r#type: Some(web_socket_message::Type::Response as i32),
        request: None,
        response: Some(response),
    };
    Message::Binary(frame.encode_to_vec())
}

/// What the delivery side of a device socket is currently doing.
enum Delivery {
    Idle,
    AwaitingAck { request_id: u64, guid: Uuid },
}

async fn handle_device_socket(
    socket: WebSocket,
    context: WsContext,
    device: AuthenticatedDevice,
    credentials: SocketCredentials,
) {
    let state = context.state.clone();
    let (mut sink, mut stream) = socket.split();
    let mut wake_rx = state.registry.register(device.aci, device.device_id);

    let fetches_messages = state.fetches_messages(device.aci, device.device_id);
    let mut next_request_id: u64 = 1;
    let mut delivery = Delivery::Idle;
    let mut queue_empty_sent = false;
    let mut queue_empty_id = None;

    debug!(
        "websocket open for {}.{} (fetchesMessages={})",
        device.aci, device.device_id, fetches_messages
    );

    loop {
        // Push the next queued envelope whenever the channel is free. The
        // queue-empty marker goes out exactly once, after the connect-time
        // backlog has fully drained.
        if fetches_messages {
            if let Delivery::Idle = delivery {
                if let Some(queued) = state.peek_message(device.aci, device.device_id) {
                    let request_id = next_request_id;
                    next_request_id += 1;
                    let frame = request_frame(
                        request_id,
                        "PUT",
                        "/api/v1/message",
                        Some(queued.envelope.encode_to_vec()),
                    );
                    if sink.send(frame).await.is_err() {
                        break;
                    }
                    delivery = Delivery::AwaitingAck {
                        request_id,
                        guid: queued.guid,
                    };
                } else if !queue_empty_sent {
                    let request_id = next_request_id;
                    next_request_id += 1;
                    queue_empty_id = Some(request_id);
                    queue_empty_sent = true;
                    if sink
                        .send(request_frame(request_id, "PUT", "/api/v1/queue/empty", None))
                        .await
                        .is_err()
                    {
                        break;
                    }
                }
            }
        }

        tokio::select! {
            frame = stream.next() => {
                let Some(Ok(frame)) = frame else { break };
                match frame {
                    Message::Binary(data) => {
                        let message = match WebSocketMessage::decode(data.as_slice()) {
                            Ok(message) => message,
                            Err(e) => {
                                warn!("undecodable frame from {}: {}", device.aci, e);
                                continue;
                            }
                        };
                        match message.r#type {
                            Some(t) if t == web_socket_message::Type::Request as i32 => {
                                let Some(request) = message.request else { continue };
                                let response = dispatch_request(
                                    &context.api,
                                    &credentials,
                                    request,
                                )
                                .await;
                                if sink.send(response_frame(response)).await.is_err() {
                                    break;
                                }
                            }
                            Some(t) if t == web_socket_message::Type::Response as i32 => {
                                let Some(response) = message.response else { continue };
                                handle_ack(
                                    &state,
                                    &device,
                                    &mut delivery,
                                    &mut queue_empty_id,
                                    response,
                                );
                            }
                            _ => debug!("frame with unknown type from {}", device.aci),
                        }
                    }
                    Message::Ping(data) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Message::Close(_) => break,
                    _ => {}
                }
            }
            _ = wake_rx.recv() => {
                // New envelope queued; the top of the loop picks it up.
            }
        }
    }

    state.registry.unregister(device.aci, device.device_id);
    debug!("websocket closed for {}.{}", device.aci, device.device_id);
}

fn handle_ack(
    state: &Arc<ServerState>,
    device: &AuthenticatedDevice,
    delivery: &mut Delivery,
    queue_empty_id: &mut Option<u64>,
    response: WebSocketResponseMessage,
) {
    let id = response.id.unwrap_or(0);
    if *queue_empty_id == Some(id) {
        *queue_empty_id = None;
        return;
    }
    if let Delivery::AwaitingAck { request_id, guid } = delivery {
        if *request_id == id {
            // Only a success response removes the envelope; anything else
            // leaves it at the head of the queue for redelivery.
            if response.status.unwrap_or(0) == 200 {
                state.ack_message(device.aci, device.device_id, guid);
            }
            *delivery = Delivery::Idle;
        }
    }
}

/// Routes a client-originated frame through the shared handler table.
async fn dispatch_request(
    api: &Router,
    credentials: &SocketCredentials,
    request: WebSocketRequestMessage,
) -> WebSocketResponseMessage {
    let id = request.id;
    let verb = request.verb.as_deref().unwrap_or("GET");
    let path = request.path.as_deref().unwrap_or("/");

    let Ok(method) = Method::from_bytes(verb.as_bytes()) else {
        return error_response(id, 400, "bad verb");
    };
    let Ok(uri) = path.parse::<Uri>() else {
        return error_response(id, 400, "bad path");
    };

    let mut builder = Request::builder().method(method).uri(uri);
    let mut has_authorization = false;
    for header in &request.headers {
        if let Some((name, value)) = header.split_once(':') {
            let name = name.trim();
            if name.eq_ignore_ascii_case("authorization") {
                has_authorization = true;
            }
            builder = builder.header(name, value.trim());
        }
    }
    if !has_authorization {
        // The connection itself was authenticated; frames inherit it.
        builder = builder.header(
            AUTHORIZATION,
            auth::basic_header_from_login(&credentials.login, &credentials.password),
        );
    }

    let body = Body::from(request.body.unwrap_or_default());
    let Ok(http_request) = builder.body(body) else {
        return error_response(id, 400, "bad headers");
    };

    let response = match api.clone().oneshot(http_request).await {
        Ok(response) => response,
        Err(_) => return error_response(id, 500, "dispatch failed"),
    };

    let status = response.status();
    let headers: Vec<String> = response
        .headers()
        .iter()
        .filter_map(|(name, value)| {
            value
                .to_str()
                .ok()
                .map(|v| format!("{}: {}", name.as_str(), v))
        })
        .collect();
    let body = match axum::body::to_bytes(response.into_body(), usize::MAX).await {
        Ok(bytes) => bytes.to_vec(),
        Err(_) => return error_response(id, 500, "body read failed"),
    };

    WebSocketResponseMessage {
        id,
        status: Some(status.as_u16() as u32),
        message: Some(
            status
                .canonical_reason()
                .unwrap_or("Unknown")
                .to_string(),
        ),
        body: if body.is_empty() { None } else { Some(body) },
        headers,
    }
}

fn error_response(id: Option<u64>, status: u32, message: &str) -> WebSocketResponseMessage {
    WebSocketResponseMessage {
        id,
        status: Some(status),
        message: Some(message.to_string()),
        body: None,
        headers: vec![],
    }
}

/// Provisioning socket: advertise an address, relay one sealed envelope.
async fn handle_provisioning_socket(socket: WebSocket, context: WsContext) {
    let state = context.state;
    let (mut sink, mut stream) = socket.split();

    let uuid = Uuid::new_v4().to_string();
    let mut envelope_rx = state.provisioning.register_socket(uuid.clone());

    let address = ProvisioningUuid {
        uuid: Some(uuid.clone()),
    };
    if sink
        .send(request_frame(1, "PUT", "/v1/address", Some(address.encode_to_vec())))
        .await
        .is_err()
    {
        state.provisioning.unregister_socket(&uuid);
        return;
    }
    debug!("provisioning socket advertised {}", uuid);

    loop {
        tokio::select! {
            envelope = envelope_rx.recv() => {
                let Some(envelope) = envelope else { break };
                let _ = sink
                    .send(request_frame(2, "PUT", "/v1/message", Some(envelope)))
                    .await;
                // One envelope per socket; the client closes after this.
                break;
            }
            frame = stream.next() => {
                match frame {
                    Some(Ok(Message::Ping(data))) => {
                        if sink.send(Message::Pong(data)).await.is_err() {
                            break;
                        }
                    }
                    Some(Ok(Message::Close(_))) | None => break,
                    Some(Ok(_)) => {}
                    Some(Err(_)) => break,
                }
            }
        }
    }

    state.provisioning.unregister_socket(&uuid);
    debug!("provisioning socket closed {}", uuid);
}
