//! gab-server: the chat relay.
//!
//! Accepts TCP clients, runs the connection handshake, and hands admitted
//! connections to the router task, which owns all live state and performs
//! the persistence side effects.

mod config;
mod connection;
mod registry;
mod router;

use std::net::SocketAddr;

use anyhow::Result;
use bytes::Bytes;
use clap::Parser;
use tokio::net::{TcpListener, TcpStream};
use tokio::sync::mpsc;
use tokio::time::{Duration, timeout};
use tracing::{debug, info, warn};

use gab_rs::auth;
use gab_rs::constants::{DEFAULT_ADDRESS, DEFAULT_PORT};
use gab_rs::db::Database;

use config::Config;
use connection::handle_connection;
use registry::{ConnHandle, next_connection_id};
use router::{Event, Router};

#[derive(Parser, Debug)]
#[command(name = "gab-server", about = "Chat relay server")]
struct Args {
    /// Port to listen on
    #[arg(short, long, default_value_t = DEFAULT_PORT)]
    port: u16,

    /// Address to bind; all interfaces by default
    #[arg(short, long, default_value = DEFAULT_ADDRESS)]
    address: String,

    /// Path of the configuration file
    #[arg(long, default_value = "gab-server.toml")]
    config: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "gab_server=info,gab_rs=info".into()),
        )
        .init();

    let args = Args::parse();
    let config = Config::load_or_default(&args.config)?;

    let db = Database::open(&config.database)?;
    info!(database = %config.database, "storage opened");

    let (events, event_rx) = mpsc::unbounded_channel();
    tokio::spawn(Router::new(db, config.welcome.clone()).run(event_rx));

    let listener = TcpListener::bind(format!("{}:{}", args.address, args.port)).await?;
    info!(address = %args.address, port = args.port, "listening");

    loop {
        let (stream, addr) = tokio::select! {
            accepted = listener.accept() => accepted?,
            _ = tokio::signal::ctrl_c() => {
                info!("interrupted, shutting down");
                break;
            }
        };

        let events = events.clone();
        let secret = config.secret.clone();
        let handshake_timeout = Duration::from_secs(config.handshake_timeout_secs);

        tokio::spawn(async move {
            if let Err(e) = admit(stream, addr, secret, handshake_timeout, events).await {
                debug!(%addr, error = %e, "connection ended");
            }
        });
    }

    Ok(())
}

/// Run the transport handshake, then announce the connection to the router
/// and drive it. A failed or timed-out handshake closes the socket without
/// it ever reaching the registry.
async fn admit(
    mut stream: TcpStream,
    addr: SocketAddr,
    secret: Option<String>,
    handshake_timeout: Duration,
    events: mpsc::UnboundedSender<Event>,
) -> Result<()> {
    if let Some(secret) = secret {
        match timeout(
            handshake_timeout,
            auth::server_handshake(&mut stream, secret.as_bytes()),
        )
        .await
        {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                warn!(%addr, error = %e, "handshake rejected");
                return Ok(());
            }
            Err(_) => {
                warn!(%addr, "handshake timed out");
                return Ok(());
            }
        }
    }

    let id = next_connection_id();
    let (tx, outbound) = mpsc::unbounded_channel::<Bytes>();

    let handle = ConnHandle {
        id,
        addr,
        account: None,
        tx,
    };
    if events.send(Event::Connected(handle)).is_err() {
        return Ok(());
    }
    info!(%addr, id, "connection accepted");

    handle_connection(stream, addr, id, events, outbound).await
}
