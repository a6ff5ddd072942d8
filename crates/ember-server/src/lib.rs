//! Library surface for `ember-server`, split out from `main.rs` so the
//! accept loop and connection handling are exercisable from integration
//! tests without spawning a separate process.

mod connection;

pub use connection::handle_connection;

use std::sync::Arc;

use ember_core::{AppContext, Config, Keyspace};
use tokio::net::TcpListener;
use tracing::info;

/// Binds a listener on `config.port` and returns it alongside the shared
/// context, without yet accepting connections. Split out from [`serve`] so
/// tests can bind on an ephemeral port (`--port 0`) and read back the
/// OS-assigned address before driving traffic at it.
pub async fn bind(
    config: Arc<Config>,
    keyspace: Arc<Keyspace>,
) -> anyhow::Result<(TcpListener, Arc<AppContext>)> {
    let ctx = Arc::new(AppContext { config: Arc::clone(&config), keyspace });
    let listener = TcpListener::bind(("127.0.0.1", config.port)).await?;
    Ok((listener, ctx))
}

/// Accepts connections on `listener` forever, handling each on its own task.
pub async fn accept_loop(listener: TcpListener, ctx: Arc<AppContext>) -> anyhow::Result<()> {
    loop {
        let (stream, _addr) = listener.accept().await?;
        let ctx = Arc::clone(&ctx);
        tokio::spawn(async move {
            handle_connection(stream, ctx).await;
        });
    }
}

/// Binds on `config.port` and serves connections until the process is
/// killed.
pub async fn serve(config: Arc<Config>, keyspace: Arc<Keyspace>) -> anyhow::Result<()> {
    let port = config.port;
    let (listener, ctx) = bind(config, keyspace).await?;
    info!(port, "listening");
    accept_loop(listener, ctx).await
}
