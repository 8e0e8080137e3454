//! Common test utilities for the integration suite.
//!
//! Tests spin up a real listener on port 0 and talk real HTTP (reqwest) and
//! real WebSocket (tokio-tungstenite) to it, the way a Signal client would.

use std::net::SocketAddr;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine;
use futures_util::{SinkExt, StreamExt};
use libsignal_protocol::KeyPair;
use prost::Message as ProstMessage;
use rand::rngs::OsRng;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};

use signal_mock_server::proto::websocket::{
    web_socket_message, WebSocketMessage, WebSocketRequestMessage, WebSocketResponseMessage,
};
use signal_mock_server::{PrimaryDevice, PrimaryDeviceOptions, Server, ServerConfig};

pub type WsClient = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// Starts an embedded server on an ephemeral port.
#[allow(dead_code)]
pub async fn start_server() -> (Server, SocketAddr) {
    let server = Server::new(ServerConfig::for_tests()).expect("server construction");
    let addr = server
        .listen("127.0.0.1:0".parse().unwrap())
        .await
        .expect("listen");
    (server, addr)
}

#[allow(dead_code)]
pub fn http_url(addr: SocketAddr, path: &str) -> String {
    format!("http://{}{}", addr, path)
}

/// Creates a primary device named `profile_name` on the server.
#[allow(dead_code)]
pub fn create_primary(server: &Server, profile_name: &str) -> PrimaryDevice {
    server
        .create_primary_device(PrimaryDeviceOptions {
            profile_name: profile_name.to_string(),
        })
        .expect("create primary device")
}

/// Opens the authenticated message WebSocket for a device.
#[allow(dead_code)]
pub async fn connect_device_socket(
    addr: SocketAddr,
    service_id: &str,
    device_id: u32,
    password: &str,
) -> WsClient {
    let url = format!(
        "ws://{}/v1/websocket/?login={}.{}&password={}",
        addr, service_id, device_id, password
    );
    let (socket, _response) = connect_async(&url).await.expect("websocket connect");
    socket
}

/// Reads frames until a server-initiated request arrives; answers pings.
#[allow(dead_code)]
pub async fn next_server_request(socket: &mut WsClient) -> WebSocketRequestMessage {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for server request")
            .expect("socket closed")
            .expect("socket error");
        match frame {
            Message::Binary(data) => {
                let message = WebSocketMessage::decode(data.as_slice()).expect("decode frame");
                if message.r#type == Some(web_socket_message::Type::Request as i32) {
                    return message.request.expect("request frame without request");
                }
            }
            Message::Ping(data) => {
                socket.send(Message::Pong(data)).await.expect("pong");
            }
            _ => {}
        }
    }
}

/// Acknowledges a server-initiated request with the given status.
#[allow(dead_code)]
pub async fn respond(socket: &mut WsClient, id: Option<u64>, status: u32) {
    let frame = WebSocketMessage {
        r#type: Some(web_socket_message::Type::Response as i32),
        request: None,
        response: Some(WebSocketResponseMessage {
            id,
            status: Some(status),
            message: Some("OK".to_string()),
            body: None,
            headers: vec![],
        }),
    };
    socket
        .send(Message::Binary(frame.encode_to_vec()))
        .await
        .expect("send response frame");
}

/// Sends a client-originated request frame over the socket.
#[allow(dead_code)]
pub async fn send_client_request(
    socket: &mut WsClient,
    id: u64,
    verb: &str,
    path: &str,
    body: Option<Vec<u8>>,
) {
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
    socket
        .send(Message::Binary(frame.encode_to_vec()))
        .await
        .expect("send request frame");
}

/// Waits for the response to a client-originated request.
#[allow(dead_code)]
pub async fn next_server_response(socket: &mut WsClient, id: u64) -> WebSocketResponseMessage {
    loop {
        let frame = tokio::time::timeout(std::time::Duration::from_secs(5), socket.next())
            .await
            .expect("timed out waiting for response")
            .expect("socket closed")
            .expect("socket error");
        if let Message::Binary(data) = frame {
            let message = WebSocketMessage::decode(data.as_slice()).expect("decode frame");
            if message.r#type == Some(web_socket_message::Type::Response as i32) {
                let response = message.response.expect("response frame without response");
                if response.id == Some(id) {
                    return response;
                }
            }
        }
    }
}

/// Basic `Authorization` header for arbitrary credentials.
#[allow(dead_code)]
pub fn basic_auth(user: &str, password: &str) -> String {
    format!("Basic {}", BASE64.encode(format!("{}:{}", user, password)))
}

/// A one-time prekey JSON entry with a freshly generated key.
#[allow(dead_code)]
pub fn one_time_prekey_json(key_id: u32) -> serde_json::Value {
    let key = KeyPair::generate(&mut OsRng);
    serde_json::json!({
        "keyId": key_id,
        "publicKey": BASE64.encode(key.public_key.serialize()),
    })
}

/// A signed prekey JSON entry, signed by `identity`.
#[allow(dead_code)]
pub fn signed_prekey_json(identity: &KeyPair, key_id: u32) -> serde_json::Value {
    let key = KeyPair::generate(&mut OsRng);
    let public = key.public_key.serialize();
    let signature = identity
        .private_key
        .calculate_signature(&public, &mut OsRng)
        .expect("sign prekey");
    serde_json::json!({
        "keyId": key_id,
        "publicKey": BASE64.encode(&public),
        "signature": BASE64.encode(&signature),
    })
}
