//! `ember-server`: the TCP server binary. Parses CLI arguments, loads any
//! existing snapshot, starts the expiration engine and (if configured) the
//! replica handshake, then accepts connections until killed.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::Context;
use clap::Parser;
use ember_core::store::spawn_expiration_loop;
use ember_core::{Config, Keyspace, Role};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Ember: an in-memory key/value store with a RESP-style wire protocol,
/// TTL, and RDB-compatible snapshots.
#[derive(Parser, Debug)]
#[command(name = "ember-server", version, about)]
struct Args {
    /// Directory for snapshot files.
    #[arg(long, default_value = "/tmp/redis-data")]
    dir: PathBuf,

    /// Snapshot filename within `--dir`.
    #[arg(long, default_value = "dump.rdb")]
    dbfilename: String,

    /// TCP listen port.
    #[arg(long, default_value_t = 6379)]
    port: u16,

    /// Run as a replica of `<host> <port>`, e.g. `--replicaof "127.0.0.1 6380"`.
    #[arg(long)]
    replicaof: Option<String>,
}

fn parse_replicaof(raw: &str) -> anyhow::Result<(String, u16)> {
    let mut parts = raw.split_whitespace();
    let host = parts
        .next()
        .context("--replicaof requires '<host> <port>'")?
        .to_string();
    let port: u16 = parts
        .next()
        .context("--replicaof requires '<host> <port>'")?
        .parse()
        .context("--replicaof port must be a valid u16")?;
    Ok((host, port))
}

fn random_replication_id() -> String {
    use rand::Rng;
    const CHARSET: &[u8] = b"0123456789abcdef";
    let mut rng = rand::thread_rng();
    (0..40)
        .map(|_| CHARSET[rng.gen_range(0..CHARSET.len())] as char)
        .collect()
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer())
        .init();

    let args = Args::parse();

    let role = match &args.replicaof {
        Some(raw) => {
            let (master_host, master_port) = parse_replicaof(raw)?;
            Role::Replica { master_host, master_port }
        }
        None => Role::Primary,
    };

    let config = Arc::new(Config {
        dir: args.dir,
        dbfilename: args.dbfilename,
        port: args.port,
        role: role.clone(),
        replication_id: random_replication_id(),
    });

    let keyspace = Arc::new(Keyspace::new());

    let snapshot_path = config.snapshot_path();
    if snapshot_path.exists() {
        tracing::info!(path = %snapshot_path.display(), "loading snapshot");
        let (data, expiry) = ember_core::snapshot::read_snapshot(&snapshot_path)
            .context("failed to load snapshot at startup")?;
        for (key, value) in data {
            let expire_at_ms = expiry.get(&key).copied();
            keyspace.load_entry(key, value, expire_at_ms);
        }
    } else {
        tracing::info!("no snapshot found, starting with an empty keyspace");
    }

    let (_expiration_handle, _expiration_shutdown) = spawn_expiration_loop(Arc::clone(&keyspace));

    if let Role::Replica { master_host, master_port } = &role {
        let master_host = master_host.clone();
        let master_port = *master_port;
        let our_port = config.port;
        tokio::spawn(async move {
            if let Err(e) =
                ember_core::replication::run_replica_handshake(&master_host, master_port, our_port)
                    .await
            {
                tracing::warn!(error = %e, "replication handshake failed");
            }
        });
    }

    ember_server::serve(config, keyspace).await
}
