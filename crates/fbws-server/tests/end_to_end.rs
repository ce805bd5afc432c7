//! Client and server talking over in-memory links.

use std::sync::Arc;
use std::time::Duration;

use serde_json::{json, Map, Value};
use tokio::sync::{broadcast, mpsc};

use fbws_client::{ClientConfig, ClientEvent, FbwsClient};
use fbws_core::error::FbwsError;
use fbws_core::messages::RspCode;
use fbws_core::transport::{memory_pair, Link, Outbound, TransportEvent};
use fbws_server::auth::token::token_digest;
use fbws_server::auth::{PermitAll, TokenAuthenticator};
use fbws_server::operations::{register_builtins, OperationTable};
use fbws_server::{Accepted, FbwsServer};

fn operations() -> OperationTable {
    let mut ops = OperationTable::new();
    register_builtins(&mut ops, std::time::Instant::now());
    ops.register("dev", "read", |args| async move {
        Ok(json!({ "id": args.get("id").cloned().unwrap_or(Value::Null), "onOff": true }))
    });
    ops.register("dev", "write", |_| async {
        Err(FbwsError::Operation("attribute is read-only".into()))
    });
    ops.register("dev", "hang", |_| async {
        std::future::pending::<()>().await;
        Ok(Value::Null)
    });
    ops
}

fn open_server() -> (FbwsServer, mpsc::Sender<Accepted>) {
    let server = FbwsServer::new(
        Arc::new(operations()),
        Arc::new(PermitAll),
        Arc::new(PermitAll),
    );
    let (tx, rx) = mpsc::channel(8);
    assert!(server.start(rx));
    (server, tx)
}

fn credentials(token: &str) -> Map<String, Value> {
    let mut m = Map::new();
    m.insert("token".into(), json!(token));
    m
}

async fn attach(tx: &mpsc::Sender<Accepted>) -> Link {
    let (peer, server_end) = memory_pair();
    tx.send(Accepted {
        link: server_end,
        remote: None,
    })
    .await
    .unwrap();
    peer
}

/// Open `client` against the server and wait for the handshake to finish.
async fn open_client(
    tx: &mpsc::Sender<Accepted>,
    client: &FbwsClient,
    token: &str,
) -> broadcast::Receiver<ClientEvent> {
    let mut events = client.subscribe();
    let link = attach(tx).await;
    assert!(client.open_link(link, credentials(token)));
    assert_eq!(events.recv().await.unwrap(), ClientEvent::Open);
    events
}

async fn next_text(link: &mut Link) -> String {
    loop {
        match link.events.recv().await {
            Some(TransportEvent::Message(text)) => return text,
            Some(TransportEvent::Open) => continue,
            other => panic!("expected a message, got {other:?}"),
        }
    }
}

#[tokio::test]
async fn request_round_trip() {
    let (_server, tx) = open_server();
    let client = FbwsClient::new(ClientConfig::default());
    open_client(&tx, &client, "any").await;

    let reply = client
        .send("dev", "read", json!({ "id": 3 }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply.status, RspCode::Success);
    assert_eq!(reply.data, json!({ "id": 3, "onOff": true }));

    let reply = client
        .send("sys", "ping", json!({ "n": 1 }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply.data, json!({ "n": 1 }));
}

#[tokio::test]
async fn failing_operation_answers_fail() {
    let (_server, tx) = open_server();
    let client = FbwsClient::new(ClientConfig::default());
    open_client(&tx, &client, "any").await;

    let reply = client
        .send("dev", "write", json!({ "id": 3, "attrName": "x", "value": 1 }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply.status, RspCode::Fail);

    let reply = client
        .send("dev", "remove", json!({ "id": 3 }))
        .unwrap()
        .await
        .unwrap();
    assert_eq!(reply.status, RspCode::Fail);
}

#[tokio::test]
async fn permit_join_indication_on_the_wire() {
    let (server, tx) = open_server();

    let mut peer = attach(&tx).await;
    peer.outbound
        .send(Outbound::Text(r#"{"type":"authenticate","data":{}}"#.into()))
        .unwrap();
    let confirmed: Value = serde_json::from_str(&next_text(&mut peer).await).unwrap();
    assert_eq!(confirmed, json!({ "type": "authenticated", "data": true }));

    let client = FbwsClient::new(ClientConfig::default());
    let mut events = open_client(&tx, &client, "any").await;

    let sent = server
        .dispatch_external_event(
            "permitJoin",
            json!({ "netcore": "ble-core", "duration": 100 }),
        )
        .await
        .unwrap();
    assert_eq!(sent, 2);

    let ind: Value = serde_json::from_str(&next_text(&mut peer).await).unwrap();
    assert_eq!(
        ind,
        json!({
            "__intf": "IND",
            "subsys": "net",
            "type": "permitJoining",
            "id": null,
            "data": { "netcore": "ble-core", "duration": 100 }
        })
    );

    match events.recv().await.unwrap() {
        ClientEvent::Indication(ind) => {
            assert_eq!(ind.subsys, "net");
            assert_eq!(ind.ind_type, "permitJoining");
            assert_eq!(ind.data, json!({ "netcore": "ble-core", "duration": 100 }));
        }
        other => panic!("expected an indication, got {other:?}"),
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn request_before_authentication_is_dropped() {
    let (_server, tx) = open_server();

    for _ in 0..100 {
        let mut peer = attach(&tx).await;
        peer.outbound
            .send(Outbound::Text(
                r#"{"__intf":"REQ","subsys":"sys","cmd":"ping","seq":0,"id":null,"args":{}}"#.into(),
            ))
            .unwrap();
        peer.outbound
            .send(Outbound::Text(r#"{"type":"authenticate","data":{}}"#.into()))
            .unwrap();
        peer.outbound
            .send(Outbound::Text(
                r#"{"__intf":"REQ","subsys":"sys","cmd":"ping","seq":1,"id":null,"args":{}}"#.into(),
            ))
            .unwrap();

        let first: Value = serde_json::from_str(&next_text(&mut peer).await).unwrap();
        assert_eq!(first, json!({ "type": "authenticated", "data": true }));

        // seq 0 was never answered; the reply to seq 1 comes next.
        let second: Value = serde_json::from_str(&next_text(&mut peer).await).unwrap();
        assert_eq!(second["__intf"], json!("RSP"));
        assert_eq!(second["seq"], json!(1));
    }
}

#[tokio::test]
async fn wrong_token_closes_with_3001() {
    let server = FbwsServer::new(
        Arc::new(operations()),
        Arc::new(TokenAuthenticator::from_digests([token_digest("right")])),
        Arc::new(PermitAll),
    );
    let (tx, rx) = mpsc::channel(8);
    server.start(rx);

    let good = FbwsClient::new(ClientConfig::default());
    open_client(&tx, &good, "right").await;
    assert!(good.is_authenticated());

    let bad = FbwsClient::new(ClientConfig::default());
    let mut events = bad.subscribe();
    assert!(bad.open_link(attach(&tx).await, credentials("wrong")));

    match events.recv().await.unwrap() {
        ClientEvent::Close { code, .. } => assert_eq!(code, 3001),
        other => panic!("expected close, got {other:?}"),
    }
    assert!(!bad.is_authenticated());

    let fut = bad.send("sys", "ping", json!({})).unwrap();
    assert!(matches!(fut.await, Err(FbwsError::ConnectionClosed)));
}

#[tokio::test(start_paused = true)]
async fn stop_closes_clients_and_pending_requests_time_out() {
    let (server, tx) = open_server();
    let client = FbwsClient::new(ClientConfig {
        request_timeout: Duration::from_secs(10),
    });
    let mut events = open_client(&tx, &client, "any").await;
    assert_eq!(server.session_count(), 1);

    let pending = client.send("dev", "hang", json!({})).unwrap();
    let pending = tokio::spawn(pending);
    tokio::task::yield_now().await;

    assert!(server.stop());
    assert_eq!(server.session_count(), 0);
    assert_eq!(
        events.recv().await.unwrap(),
        ClientEvent::Close {
            code: 1001,
            reason: "Server stopped.".into()
        }
    );

    let reply = pending.await.unwrap().unwrap();
    assert_eq!(reply.status, RspCode::Timeout);
    assert_eq!(reply.data, json!({}));

    assert!(matches!(
        server
            .dispatch_external_event("netReady", json!({}))
            .await,
        Err(FbwsError::NotRunning)
    ));
}

#[tokio::test]
async fn sequence_numbers_wrap_across_many_requests() {
    let (_server, tx) = open_server();
    let client = FbwsClient::new(ClientConfig::default());
    open_client(&tx, &client, "any").await;

    for n in 0..300u32 {
        let reply = client
            .send("sys", "ping", json!({ "n": n }))
            .unwrap()
            .await
            .unwrap();
        assert_eq!(reply.data, json!({ "n": n }));
    }
    assert_eq!(client.pending_requests(), 0);
}
