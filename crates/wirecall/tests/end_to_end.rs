//! End-to-end tests: the real client talking to the real server.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use tokio::time::timeout;
use wirecall::prelude::*;

const TEST_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Serialize, Deserialize, PartialEq)]
struct Greeting {
    name: String,
}

/// Counts how many `hang` handlers saw their token fire.
#[derive(Default)]
struct Counters {
    cancelled: AtomicUsize,
}

fn mux(counters: Arc<Counters>) -> ServeMux {
    ServeMux::new()
        .route_fn("add", |_cancel, req: Request| async move {
            let [a, b]: [i64; 2] = req.params_as()?;
            Ok(Response::ok(json!(a + b)))
        })
        .route_fn("greet", |_cancel, req: Request| async move {
            let greeting: Greeting = req.params_as()?;
            Ok(Response::ok(json!(format!("hello, {}", greeting.name))))
        })
        .route_fn("hang", move |cancel, _req| {
            let counters = Arc::clone(&counters);
            async move {
                cancel.cancelled().await;
                counters.cancelled.fetch_add(1, Ordering::SeqCst);
                Err(RpcError::Cancelled)
            }
        })
}

async fn within<T>(future: impl Future<Output = T>) -> T {
    timeout(TEST_TIMEOUT, future).await.expect("test timed out")
}

fn fast_config() -> ClientConfig {
    ClientConfig {
        reconnect_delay: Duration::from_millis(10),
        reconnect_jitter: Duration::ZERO,
        ..Default::default()
    }
}

async fn tcp_server(counters: Arc<Counters>) -> String {
    let listener = TcpListener::bind("127.0.0.1:0").await.expect("should bind");
    let addr = listener.local_addr().expect("should have local addr");
    let server = Server::new(mux(counters));
    tokio::spawn(async move { server.run_tcp(listener).await });
    addr.to_string()
}

fn tcp_client(addr: String) -> Client<impl Codec> {
    Client::new(
        move || {
            let addr = addr.clone();
            async move { StreamCodec::connect_tcp(&addr).await }
        },
        fast_config(),
    )
}

#[tokio::test]
async fn test_calls_over_tcp() {
    let addr = tcp_server(Arc::default()).await;
    let client = tcp_client(addr);

    let sum: i64 = within(client.call_method("add", [2, 3])).await.unwrap();
    assert_eq!(sum, 5);

    let text: String = within(client.call_method(
        "greet",
        Greeting {
            name: "wirecall".into(),
        },
    ))
    .await
    .unwrap();
    assert_eq!(text, "hello, wirecall");

    within(client.close()).await;
}

#[tokio::test]
async fn test_server_errors_reach_the_caller() {
    let addr = tcp_server(Arc::default()).await;
    let client = tcp_client(addr);

    let err = within(client.call_method::<_, i64>("add", ["x", "y"]))
        .await
        .unwrap_err();
    assert_eq!(err.code(), ErrorCode::INVALID_PARAMS);

    let err = within(client.call_method::<_, i64>("nope", ()))
        .await
        .unwrap_err();
    match err {
        ClientError::Rpc(obj) => {
            assert_eq!(obj.code, ErrorCode::METHOD_NOT_FOUND);
            assert_eq!(obj.message, "unknown method \"nope\"");
        }
        other => panic!("expected an rpc error, got {other:?}"),
    }

    within(client.close()).await;
}

#[tokio::test]
async fn test_concurrent_callers_share_one_connection() {
    let addr = tcp_server(Arc::default()).await;
    let client = tcp_client(addr);

    let mut tasks = Vec::new();
    for i in 0..20_i64 {
        let client = client.clone();
        tasks.push(tokio::spawn(async move {
            let sum: i64 = client.call_method("add", [i, i]).await?;
            Ok::<_, ClientError>((i, sum))
        }));
    }
    for task in tasks {
        let (i, sum) = within(task).await.unwrap().unwrap();
        assert_eq!(sum, i * 2);
    }

    within(client.close()).await;
}

#[tokio::test]
async fn test_cancel_request_through_codec_guard() {
    let counters = Arc::new(Counters::default());
    let addr = tcp_server(Arc::clone(&counters)).await;
    let client = tcp_client(addr);

    let hang = {
        let client = client.clone();
        tokio::spawn(async move { client.call(Request::new("hang")).await })
    };

    // The hang call is written before the guard is lent, so it has id "1".
    tokio::time::sleep(Duration::from_millis(50)).await;
    let mut guard = within(client.codec()).await.unwrap();
    guard
        .notify(&Request::notification("$/cancelRequest").with_params(json!({"id": "1"})))
        .await
        .unwrap();
    guard.release();

    let response = within(hang).await.unwrap().unwrap().expect("a response");
    let error = response.into_result().unwrap_err();
    assert_eq!(error.code, ErrorCode::REQUEST_CANCELLED);
    assert_eq!(counters.cancelled.load(Ordering::SeqCst), 1);

    within(client.close()).await;
}

#[tokio::test]
async fn test_client_reconnects_when_server_appears_late() {
    // Reserve a port, then free it so the first attempts are refused.
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let client = tcp_client(addr.to_string());
    let call = {
        let client = client.clone();
        tokio::spawn(async move { client.call_method::<_, i64>("add", [1, 1]).await })
    };

    tokio::time::sleep(Duration::from_millis(50)).await;
    let listener = TcpListener::bind(addr).await.unwrap();
    let server = Server::new(mux(Arc::default()));
    tokio::spawn(async move { server.run_tcp(listener).await });

    assert_eq!(within(call).await.unwrap().unwrap(), 2);
    within(client.close()).await;
}

#[tokio::test]
async fn test_calls_over_websocket() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let url = format!("ws://{}", listener.local_addr().unwrap());

    tokio::spawn(async move {
        let (stream, _) = listener.accept().await.expect("should accept");
        let codec = WebSocketCodec::accept(stream).await.expect("handshake");
        serve(codec, mux(Arc::default())).await
    });

    let client = Client::new(
        move || {
            let url = url.clone();
            async move { WebSocketCodec::connect(&url).await }
        },
        fast_config(),
    );

    let sum: i64 = within(client.call_method("add", [40, 2])).await.unwrap();
    assert_eq!(sum, 42);
    within(client.close()).await;
}
