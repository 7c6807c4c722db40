// SPDX-FileCopyrightText: 2026 LiveSync Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! The transport against a scripted Phoenix endpoint on localhost.

use std::time::Duration;

use futures::{SinkExt, StreamExt};
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio_tungstenite::tungstenite::protocol::Message;
use tokio_tungstenite::WebSocketStream;

use livesync_core::traits::{ChannelLink, ChannelRequest, ClientMessage, ServerMessage};
use livesync_core::{
    ChangeBinding, ChannelStatus, Operation, PresenceMessage, PresenceRecord, RealtimeTransport,
    RowFilter,
};
use livesync_phoenix::protocol::Frame;
use livesync_phoenix::PhoenixTransport;

type Server = WebSocketStream<TcpStream>;

async fn listener() -> (TcpListener, PhoenixTransport) {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    let transport = PhoenixTransport::new(&format!("http://127.0.0.1:{port}"), "anon");
    (listener, transport)
}

async fn accept(listener: &TcpListener) -> Server {
    let (tcp, _) = listener.accept().await.unwrap();
    tokio_tungstenite::accept_async(tcp).await.unwrap()
}

/// Next non-heartbeat frame from the client.
async fn next_frame(server: &mut Server) -> Frame {
    loop {
        let message = tokio::time::timeout(Duration::from_secs(2), server.next())
            .await
            .expect("client frame")
            .expect("open socket")
            .unwrap();
        if let Message::Text(text) = message {
            let frame = Frame::decode(text.as_str()).unwrap();
            if frame.topic != "phoenix" {
                return frame;
            }
        }
    }
}

async fn send(server: &mut Server, frame: Frame) {
    let text = frame.encode().unwrap();
    server.send(Message::Text(text.into())).await.unwrap();
}

async fn recv(link: &mut ChannelLink) -> ServerMessage {
    tokio::time::timeout(Duration::from_secs(2), link.inbound.recv())
        .await
        .expect("server message")
        .expect("open link")
}

fn deals_request() -> ChannelRequest {
    let mut request = ChannelRequest::new("userSubmissions-changes");
    request
        .changes
        .push(ChangeBinding::table("deals").with_filter(RowFilter::eq("owner_id", "U1")));
    request
}

/// Join `request` and accept it with the given binding ids.
async fn joined(
    listener: &TcpListener,
    transport: &PhoenixTransport,
    request: ChannelRequest,
    ids: &[u64],
) -> (Server, ChannelLink, Frame) {
    let (link, mut server) = tokio::join!(transport.open_channel(request), accept(listener));
    let mut link = link.unwrap();
    let join = next_frame(&mut server).await;
    let bindings: Vec<Value> = ids.iter().map(|id| json!({"id": id})).collect();
    send(
        &mut server,
        Frame::new(
            join.topic.clone(),
            "phx_reply",
            json!({"status": "ok", "response": {"postgres_changes": bindings}}),
        )
        .with_ref(join.reference.clone().unwrap()),
    )
    .await;
    assert_eq!(recv(&mut link).await, ServerMessage::Status(ChannelStatus::Subscribed));
    (server, link, join)
}

fn change(topic: &str, ids: &[u64], id: &str) -> Frame {
    Frame::new(
        topic,
        "postgres_changes",
        json!({
            "ids": ids,
            "data": {"type": "INSERT", "table": "deals", "schema": "public",
                     "record": {"id": id, "owner_id": "U1"}}
        }),
    )
}

#[tokio::test]
async fn join_carries_bindings_and_changes_are_delivered_by_binding_id() {
    let (listener, transport) = listener().await;
    let (mut server, mut link, join) = joined(&listener, &transport, deals_request(), &[7]).await;

    assert_eq!(join.topic, "realtime:userSubmissions-changes");
    assert_eq!(join.event, "phx_join");
    let binding = &join.payload["config"]["postgres_changes"][0];
    assert_eq!(binding["filter"], "owner_id=eq.U1");
    assert_eq!(join.payload["access_token"], "anon");

    send(&mut server, change(&join.topic, &[8], "other")).await;
    send(&mut server, change(&join.topic, &[7], "d1")).await;

    let ServerMessage::Change(event) = recv(&mut link).await else {
        panic!("expected a change");
    };
    assert_eq!(event.operation, Operation::Insert);
    assert_eq!(event.row_id("id").as_deref(), Some("d1"));
}

#[tokio::test]
async fn refused_join_reports_channel_error() {
    let (listener, transport) = listener().await;
    let (link, mut server) = tokio::join!(transport.open_channel(deals_request()), accept(&listener));
    let mut link = link.unwrap();
    let join = next_frame(&mut server).await;
    send(
        &mut server,
        Frame::new(join.topic, "phx_reply", json!({"status": "error", "response": {"reason": "unauthorized"}}))
            .with_ref(join.reference.unwrap()),
    )
    .await;

    assert_eq!(recv(&mut link).await, ServerMessage::Status(ChannelStatus::ChannelError));
}

#[tokio::test]
async fn server_close_and_error_map_to_statuses() {
    let (listener, transport) = listener().await;
    let (mut server, mut link, join) = joined(&listener, &transport, deals_request(), &[1]).await;
    send(&mut server, Frame::new(join.topic.clone(), "phx_close", json!({}))).await;
    assert_eq!(recv(&mut link).await, ServerMessage::Status(ChannelStatus::Closed));

    let mut link2 = transport
        .open_channel(ChannelRequest::new("other"))
        .await
        .unwrap();
    let second = next_frame(&mut server).await;
    send(&mut server, Frame::new(second.topic, "phx_error", json!({}))).await;
    assert_eq!(recv(&mut link2).await, ServerMessage::Status(ChannelStatus::ChannelError));
}

#[tokio::test]
async fn socket_loss_fails_every_joined_channel() {
    let (listener, transport) = listener().await;
    let (mut server, mut link, _) = joined(&listener, &transport, deals_request(), &[1]).await;
    server.close(None).await.unwrap();
    drop(server);

    assert_eq!(recv(&mut link).await, ServerMessage::Status(ChannelStatus::ChannelError));
    assert!(link.inbound.recv().await.is_none());
}

#[tokio::test]
async fn presence_and_leave_frames_go_out_on_the_channel_topic() {
    let (listener, transport) = listener().await;
    let mut request = ChannelRequest::new("online-users");
    request.presence_key = Some("A".into());
    let (mut server, mut link, join) = joined(&listener, &transport, request, &[]).await;
    assert_eq!(join.payload["config"]["presence"]["key"], "A");

    link.outbound
        .send(ClientMessage::Track(PresenceRecord::new("A", "alice")))
        .await
        .unwrap();
    let track = next_frame(&mut server).await;
    assert_eq!(track.topic, "realtime:online-users");
    assert_eq!(track.payload["event"], "track");
    assert_eq!(track.join_ref, join.reference);

    send(
        &mut server,
        Frame::new(
            "realtime:online-users",
            "presence_state",
            json!({"B": {"metas": [{"phx_ref": "r", "user_id": "B", "username": "bob"}]}}),
        ),
    )
    .await;
    let ServerMessage::Presence(PresenceMessage::Sync(records)) = recv(&mut link).await else {
        panic!("expected a presence sync");
    };
    assert_eq!(records[0].user_id, "B");

    drop(link);
    let leave = next_frame(&mut server).await;
    assert_eq!(leave.event, "phx_leave");
    assert_eq!(leave.topic, "realtime:online-users");
}

#[tokio::test]
async fn heartbeats_flow_on_the_phoenix_topic() {
    let (listener, transport) = listener().await;
    let transport = transport.with_heartbeat(Duration::from_millis(30));
    let (mut server, _link, _) = joined(&listener, &transport, deals_request(), &[1]).await;

    let heartbeat = loop {
        let Some(Ok(Message::Text(text))) = server.next().await else {
            panic!("socket ended before a heartbeat");
        };
        let frame = Frame::decode(text.as_str()).unwrap();
        if frame.topic == "phoenix" {
            break frame;
        }
    };
    assert_eq!(heartbeat.event, "heartbeat");
    assert!(heartbeat.reference.is_some());
}
