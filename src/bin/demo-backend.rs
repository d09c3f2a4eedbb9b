//! Demo backend for trying the proxy by hand.
//!
//! Answers every request with its own name, both in `X-Backend` and in the
//! body, and echoes the forwarding headers it received.
//!
//! ```text
//! demo-backend --name A --port 9001 &
//! demo-backend --name B --port 9002 &
//! failover-proxy --backend 127.0.0.1:9001:A --backend 127.0.0.1:9002:B
//! ```

use std::net::SocketAddr;

use axum::{
    extract::State,
    http::{HeaderMap, HeaderName, HeaderValue},
    response::IntoResponse,
    Router,
};
use clap::Parser;
use tokio::net::TcpListener;

#[derive(Debug, Parser)]
#[command(name = "demo-backend", about = "Backend that answers with its own name")]
struct Args {
    /// Name reported in X-Backend and the body.
    #[arg(short, long, default_value = "A")]
    name: String,

    #[arg(short, long, default_value_t = 9001)]
    port: u16,

    #[arg(long, default_value = "127.0.0.1")]
    host: String,
}

const ECHOED: [&str; 3] = ["x-request-id", "x-forwarded-for", "via"];

async fn answer(State(name): State<String>, headers: HeaderMap) -> impl IntoResponse {
    let mut out = HeaderMap::new();
    if let Ok(value) = HeaderValue::from_str(&name) {
        out.insert(HeaderName::from_static("x-backend"), value);
    }
    for header in ECHOED {
        if let Some(value) = headers.get(header) {
            out.insert(HeaderName::from_static(header), value.clone());
        }
    }
    tracing::info!(
        backend = %name,
        request_id = headers.get("x-request-id").and_then(|v| v.to_str().ok()).unwrap_or("-"),
        "Request served"
    );
    (out, format!("{name}\n"))
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "info".into()),
        )
        .init();

    let args = Args::parse();
    let addr: SocketAddr = format!("{}:{}", args.host, args.port).parse()?;

    let app = Router::new().fallback(answer).with_state(args.name.clone());

    let listener = TcpListener::bind(addr).await?;
    tracing::info!(backend = %args.name, address = %listener.local_addr()?, "Demo backend listening");
    axum::serve(listener, app).await?;
    Ok(())
}
