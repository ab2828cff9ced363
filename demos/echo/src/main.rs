use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::net::TcpListener;
use wirecall::prelude::*;

// ---------------------------------------------------------------------------
// Methods
// ---------------------------------------------------------------------------

#[derive(Serialize, Deserialize)]
struct SleepParams {
    millis: u64,
}

fn methods() -> ServeMux {
    ServeMux::new()
        .route_fn("echo", |_cancel, req: Request| async move {
            Ok(Response::ok(req.params.unwrap_or_default()))
        })
        .route_fn("add", |_cancel, req: Request| async move {
            let numbers: Vec<i64> = req.params_as()?;
            Ok(Response::ok(json!(numbers.iter().sum::<i64>())))
        })
        .route_fn("sleep", |cancel, req: Request| async move {
            let params: SleepParams = req.params_as()?;
            tokio::select! {
                _ = cancel.cancelled() => Err(RpcError::Cancelled),
                _ = tokio::time::sleep(Duration::from_millis(params.millis)) => {
                    Ok(Response::null())
                }
            }
        })
        .route_fn("log", |_cancel, req: Request| async move {
            tracing::info!(params = ?req.params, "log notification");
            Ok(Response::null())
        })
}

// ---------------------------------------------------------------------------
// Modes
// ---------------------------------------------------------------------------

async fn run_server(addr: &str) -> Result<(), WirecallError> {
    let listener = TcpListener::bind(addr).await?;
    Server::new(methods()).run_tcp(listener).await?;
    Ok(())
}

async fn run_client(addr: String) -> Result<(), WirecallError> {
    let client = Client::new(
        move || {
            let addr = addr.clone();
            async move { StreamCodec::connect_tcp(&addr).await }
        },
        ClientConfig::default(),
    );

    let echoed: serde_json::Value = client.call_method("echo", json!({"hello": "world"})).await?;
    println!("echo -> {echoed}");

    let sum: i64 = client.call_method("add", [1, 2, 3, 4]).await?;
    println!("add -> {sum}");

    client.notify("log", ["fire", "and", "forget"]).await?;

    let slow = client
        .call_timeout(
            Request::new("sleep").with_params(json!({"millis": 5_000})),
            Duration::from_millis(100),
        )
        .await;
    match slow {
        Err(e) => println!("sleep -> {e} (code {})", e.code()),
        Ok(response) => println!("sleep -> {response:?}"),
    }

    client.close().await;
    Ok(())
}

#[tokio::main]
async fn main() -> Result<(), WirecallError> {
    wirecall::logging::init();

    let mut args = std::env::args().skip(1);
    let mode = args.next().unwrap_or_default();
    let addr = args.next().unwrap_or_else(|| "127.0.0.1:4000".to_string());

    match mode.as_str() {
        "serve" => run_server(&addr).await,
        "call" => run_client(addr).await,
        _ => {
            // Both ends in one process.
            let listener = TcpListener::bind("127.0.0.1:0").await?;
            let addr = listener.local_addr()?.to_string();
            tokio::spawn(async move { Server::new(methods()).run_tcp(listener).await });
            run_client(addr).await
        }
    }
}
