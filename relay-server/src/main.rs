//! Relay invoke server - local stand-in for the platform's invoke endpoint.

mod routes;
mod state;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::Router;
use clap::Parser;
use tower_http::cors::{Any, CorsLayer};
use tracing::info;

use relay::handler::build_handler;
use relay::io::config::load_from_env;

use crate::state::AppState;

#[derive(Parser)]
#[command(name = "relay-server")]
#[command(about = "Serve the relay function over the local invoke endpoint")]
struct Args {
    /// Address to bind the server to
    #[arg(long, default_value = "127.0.0.1")]
    bind: String,

    /// Port to listen on
    #[arg(long, default_value = "9000")]
    port: u16,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive("relay_server=info".parse()?)
                .add_directive("relay=info".parse()?),
        )
        .init();

    let args = Args::parse();

    let config = load_from_env()?;
    info!(
        secret = %config.secret.name,
        assistant = %config.assistant.binary,
        workspace_root = %config.workspace.root_dir().display(),
        "starting relay-server"
    );
    let state = AppState::new(Arc::new(build_handler(config)));

    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    let app = Router::new()
        .merge(routes::router())
        .layer(cors)
        .with_state(state);

    let addr: SocketAddr = format!("{}:{}", args.bind, args.port).parse()?;
    info!(addr = %addr, path = routes::INVOKE_PATH, "listening");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}
