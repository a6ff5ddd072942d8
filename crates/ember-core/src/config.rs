//! Typed server configuration, replacing a loose string map with accessors
//! the dispatcher and snapshot loader can rely on directly.

use std::path::PathBuf;

/// Whether this node is standing alone or following a master.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Role {
    /// No `--replicaof` was given.
    Primary,
    /// `--replicaof <host> <port>` was given; this node replicates from it.
    Replica {
        /// Hostname or IP of the node we replicate from.
        master_host: String,
        /// Port of the node we replicate from.
        master_port: u16,
    },
}

impl Role {
    /// The value this role reports over the wire (`INFO replication`'s
    /// `role:` field). The wire vocabulary stays `master`/`slave` for
    /// compatibility with existing clients and scripts; only the internal
    /// `Role` enum and CLI/config naming use `primary`/`replica`.
    #[must_use]
    pub fn wire_name(&self) -> &'static str {
        match self {
            Role::Primary => "master",
            Role::Replica { .. } => "slave",
        }
    }
}

/// Server configuration, built once at startup from CLI arguments.
#[derive(Debug, Clone)]
pub struct Config {
    /// Directory snapshots are read from and written to.
    pub dir: PathBuf,
    /// Snapshot file name within `dir`.
    pub dbfilename: String,
    /// TCP port to listen on.
    pub port: u16,
    /// This node's replication role.
    pub role: Role,
    /// A replication id handed out on `PSYNC`'s `FULLRESYNC` reply.
    /// Generated once at startup; Ember never persists or rotates it.
    pub replication_id: String,
}

impl Config {
    /// Full path to the snapshot file (`dir`/`dbfilename`).
    #[must_use]
    pub fn snapshot_path(&self) -> PathBuf {
        self.dir.join(&self.dbfilename)
    }

    /// Looks up a `CONFIG GET` parameter by name. Recognizes `dir`,
    /// `dbfilename`, `port`, `role`, `master_host`, `master_port`,
    /// `master_replid`, and `master_repl_offset`; anything else is `None`.
    #[must_use]
    pub fn get_param(&self, name: &[u8]) -> Option<String> {
        match name {
            b"dir" => Some(self.dir.display().to_string()),
            b"dbfilename" => Some(self.dbfilename.clone()),
            b"port" => Some(self.port.to_string()),
            b"role" => Some(self.role.wire_name().to_string()),
            b"master_host" => Some(match &self.role {
                Role::Primary => String::new(),
                Role::Replica { master_host, .. } => master_host.clone(),
            }),
            b"master_port" => Some(match &self.role {
                Role::Primary => String::new(),
                Role::Replica { master_port, .. } => master_port.to_string(),
            }),
            b"master_replid" => Some(self.replication_id.clone()),
            // Ember never falls behind its own snapshot: a replica's applied
            // offset always reads as 0 until real stream-offset tracking exists.
            b"master_repl_offset" => Some("0".to_string()),
            _ => None,
        }
    }
}
