//! Session lifecycle over a real NDJSON transport: handshake, roots,
//! keep-alive and shutdown.

mod common;

#[cfg(test)]
mod basic {
    use super::common::{connect, init_tracing, pipe, quiet_options, PingReply};
    use mcp_session::network_adapter::{NdjsonAdapter, NetworkAdapter};
    use mcp_session::server::{Registry, ServerOptions, Session, SessionEvent, SessionState};
    use mcp_session::types::Root;
    use mcp_session::Error;
    use serde_json::{json, Value};
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::io::{duplex, split, AsyncWriteExt};

    fn session(options: ServerOptions) -> Session {
        init_tracing();
        Session::new(Arc::new(Registry::new()), Arc::new(options))
    }

    async fn next_event(
        events: &mut mcp_session::server::EventStream<SessionEvent>,
    ) -> SessionEvent {
        tokio::time::timeout(Duration::from_secs(5), events.recv())
            .await
            .expect("timed out waiting for a session event")
            .expect("event stream closed")
    }

    #[tokio::test]
    async fn handshake_records_client_details() {
        let session = session(quiet_options().with_instructions("Be brief"));
        let (mut client, transport) = pipe();

        let connecting = tokio::spawn({
            let session = session.clone();
            async move { session.connect(transport).await }
        });
        let init = client.initialize(json!({})).await;
        connecting.await.unwrap().unwrap();

        assert_eq!(init["protocolVersion"], "2025-06-18");
        assert_eq!(init["instructions"], "Be brief");
        assert_eq!(session.state(), SessionState::Active);
        assert_eq!(session.client_info().unwrap().name, "test-client");
        assert_eq!(session.protocol_version().as_deref(), Some("2025-06-18"));
        assert!(session.roots().is_empty());
    }

    #[tokio::test]
    async fn handshake_times_out_without_initialize() {
        let mut options = quiet_options();
        options.handshake_attempts = 3;
        options.handshake_interval_ms = 10;
        let session = session(options);
        let (_client, transport) = pipe();

        let outcome = session.connect(transport).await;
        assert!(matches!(outcome, Err(Error::Handshake(_))));
        assert_eq!(session.state(), SessionState::Closed);
    }

    #[tokio::test]
    async fn roots_are_fetched_during_connect_and_refreshed_on_change() {
        let session = session(quiet_options());
        let mut events = session.subscribe();
        let (mut client, transport) = pipe();
        client.roots = vec![json!({ "uri": "file:///work", "name": "work" })];

        let caps = json!({ "roots": { "listChanged": true } });
        connect(&session, &mut client, transport, caps).await;
        assert_eq!(
            session.roots(),
            vec![Root {
                uri: "file:///work".to_string(),
                name: Some("work".to_string()),
            }]
        );

        client.roots = vec![json!({ "uri": "file:///other" })];
        client
            .notify("notifications/roots/list_changed", json!({}))
            .await;
        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "roots/list");

        match next_event(&mut events).await {
            SessionEvent::RootsChanged(roots) => {
                assert_eq!(roots.len(), 1);
                assert_eq!(roots[0].uri, "file:///other");
                assert_eq!(roots[0].name, None);
            }
            other => panic!("unexpected event: {:?}", other),
        }
        assert_eq!(session.roots()[0].uri, "file:///other");
    }

    #[tokio::test]
    async fn keepalive_pings_the_client() {
        let session = session(quiet_options().with_ping_interval(Some(Duration::from_millis(20))));
        let (mut client, transport) = pipe();
        connect(&session, &mut client, transport, json!({})).await;

        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "ping");
        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "ping");
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn failed_ping_is_reported() {
        let session = session(quiet_options().with_ping_interval(Some(Duration::from_millis(20))));
        let mut events = session.subscribe();
        let (mut client, transport) = pipe();
        client.ping_reply = PingReply::Fail;
        connect(&session, &mut client, transport, json!({})).await;

        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "ping");
        match next_event(&mut events).await {
            SessionEvent::Error(error) => {
                assert!(matches!(*error, Error::JsonRpc(ref data) if data.message == "client busy"))
            }
            other => panic!("unexpected event: {:?}", other),
        }
    }

    #[tokio::test]
    async fn explicit_ping_round_trip() {
        let session = session(quiet_options());
        let (mut client, transport) = pipe();
        connect(&session, &mut client, transport, json!({})).await;

        let pinging = tokio::spawn({
            let session = session.clone();
            async move { session.ping().await }
        });
        let frame = client.next_frame().await;
        assert_eq!(frame["method"], "ping");
        pinging.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn unknown_methods_and_garbage_are_answered() {
        let session = session(quiet_options());
        let (mut client, transport) = pipe();
        connect(&session, &mut client, transport, json!({})).await;

        let response = client.request("sampling/teleport", json!({})).await;
        assert_eq!(response["error"]["code"], -32601);
        assert_eq!(response["error"]["message"], "Method 'sampling/teleport' not found");

        client.send_raw("{ this is not json").await;
        let frame = client.next_frame().await;
        assert_eq!(frame["id"], json!(null));
        assert_eq!(frame["error"]["code"], -32700);

        // Still serving.
        assert_eq!(client.call("ping", json!({})).await, json!({}));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn invalid_utf8_frame_does_not_end_the_session() {
        let session = session(quiet_options());
        let (client_side, server_side) = duplex(64 * 1024);
        let (server_read, server_write) = split(server_side);
        let (client_read, mut client_write) = split(client_side);
        // Replies are read through the adapter; requests go out as raw bytes.
        let mut replies = NdjsonAdapter::new(client_read, tokio::io::sink());

        let connecting = tokio::spawn({
            let session = session.clone();
            async move {
                session
                    .connect(NdjsonAdapter::new(server_read, server_write))
                    .await
            }
        });
        let initialize = json!({
            "jsonrpc": "2.0", "id": 1, "method": "initialize",
            "params": {
                "protocolVersion": "2025-06-18",
                "capabilities": {},
                "clientInfo": { "name": "raw", "version": "1" }
            }
        });
        client_write
            .write_all(format!("{}\n", initialize).as_bytes())
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&replies.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], 1);
        connecting.await.unwrap().unwrap();

        client_write.write_all(b"{\"bad\":\"\xff\xfe\"}\n").await.unwrap();
        let reply: Value = serde_json::from_str(&replies.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], json!(null));
        assert_eq!(reply["error"]["code"], -32700);

        client_write
            .write_all(b"{\"jsonrpc\":\"2.0\",\"id\":2,\"method\":\"ping\"}\n")
            .await
            .unwrap();
        let reply: Value = serde_json::from_str(&replies.recv().await.unwrap().unwrap()).unwrap();
        assert_eq!(reply["id"], 2);
        assert_eq!(reply["result"], json!({}));
        assert_eq!(session.state(), SessionState::Active);
    }

    #[tokio::test]
    async fn client_hang_up_closes_the_session() {
        let session = session(quiet_options());
        let (mut client, transport) = pipe();
        connect(&session, &mut client, transport, json!({})).await;

        client.hang_up().await;
        tokio::time::timeout(Duration::from_secs(5), session.wait_closed())
            .await
            .unwrap();
        assert_eq!(session.state(), SessionState::Closed);
        assert!(matches!(session.ping().await, Err(Error::SessionClosed)));
    }

    #[tokio::test]
    async fn close_is_idempotent() {
        let session = session(quiet_options());
        let (mut client, transport) = pipe();
        connect(&session, &mut client, transport, json!({})).await;

        session.close().await.unwrap();
        session.close().await.unwrap();
        assert_eq!(session.state(), SessionState::Closed);
    }
}
