//! Maps decoded request frames onto keyspace/config operations and produces
//! the reply frame (or, for `PSYNC`, a raw byte response that isn't itself a
//! single well-formed frame).

use std::sync::Arc;

use bytes::Bytes;
use tracing::{error, warn};

use crate::config::Config;
use crate::protocol::Frame;
use crate::snapshot;
use crate::store::{Keyspace, Value};

/// The result of dispatching one request frame.
pub enum DispatchOutcome {
    /// Send this frame and keep the connection open.
    Reply(Frame),
    /// Send this frame, then close the connection (`QUIT`/`EXIT`).
    ReplyThenClose(Frame),
    /// Send these exact bytes verbatim (`PSYNC`'s `FULLRESYNC` + raw snapshot).
    ReplyRaw(Vec<u8>),
}

/// Holds the shared state a dispatch needs: the keyspace and the immutable
/// startup configuration.
pub struct Dispatcher {
    keyspace: Arc<Keyspace>,
    config: Arc<Config>,
}

fn err(message: impl Into<String>) -> Frame {
    Frame::Error(format!("ERR {}", message.into()))
}

fn as_bulk_bytes(frame: &Frame) -> Option<&Bytes> {
    match frame {
        Frame::Bulk(b) => Some(b),
        _ => None,
    }
}

fn eq_ignore_case(bytes: &[u8], word: &str) -> bool {
    bytes.eq_ignore_ascii_case(word.as_bytes())
}

impl Dispatcher {
    /// Builds a dispatcher over shared keyspace and config state.
    #[must_use]
    pub fn new(keyspace: Arc<Keyspace>, config: Arc<Config>) -> Self {
        Self { keyspace, config }
    }

    /// Dispatches one decoded request. `frame` must be a `Frame::Array` of
    /// bulk-string arguments (as produced by both the typed-array and
    /// inline-command decode paths); anything else is a protocol error.
    pub async fn dispatch(&self, frame: Frame) -> DispatchOutcome {
        let Frame::Array(items) = frame else {
            return DispatchOutcome::Reply(err("Invalid command"));
        };
        let Some(command) = items.first().and_then(as_bulk_bytes) else {
            return DispatchOutcome::Reply(err("Invalid command"));
        };
        let args: Vec<&Bytes> = items[1..].iter().filter_map(as_bulk_bytes).collect();

        if eq_ignore_case(command, "PING") {
            DispatchOutcome::Reply(Frame::Simple("PONG".to_string()))
        } else if eq_ignore_case(command, "ECHO") {
            self.echo(&args)
        } else if eq_ignore_case(command, "SET") {
            self.set(&args)
        } else if eq_ignore_case(command, "GET") {
            self.get(&args)
        } else if eq_ignore_case(command, "CONFIG") {
            self.config_get(&args)
        } else if eq_ignore_case(command, "SAVE") {
            self.save().await
        } else if eq_ignore_case(command, "KEYS") {
            self.keys(&args)
        } else if eq_ignore_case(command, "INFO") {
            self.info(&args)
        } else if eq_ignore_case(command, "REPLCONF") {
            self.replconf(&args)
        } else if eq_ignore_case(command, "PSYNC") {
            self.psync(&args)
        } else if eq_ignore_case(command, "QUIT") || eq_ignore_case(command, "EXIT") {
            DispatchOutcome::ReplyThenClose(Frame::Simple("OK".to_string()))
        } else {
            DispatchOutcome::Reply(err("Unknown command"))
        }
    }

    fn echo(&self, args: &[&Bytes]) -> DispatchOutcome {
        match args {
            [value] => DispatchOutcome::Reply(Frame::bulk((*value).clone())),
            _ => DispatchOutcome::Reply(err("Wrong number of arguments for ECHO")),
        }
    }

    fn set(&self, args: &[&Bytes]) -> DispatchOutcome {
        let (key, value, rest) = match args {
            [key, value, rest @ ..] => (key, value, rest),
            _ => return DispatchOutcome::Reply(err("Wrong number of arguments for SET")),
        };

        let expire_at_ms = match rest {
            [] => None,
            [px_flag, px_value] => {
                if !eq_ignore_case(px_flag, "PX") {
                    return DispatchOutcome::Reply(err("Invalid arguments for SET"));
                }
                let Ok(text) = std::str::from_utf8(px_value) else {
                    return DispatchOutcome::Reply(err("PX value must be an integer"));
                };
                let Ok(ttl_ms) = text.parse::<i64>() else {
                    return DispatchOutcome::Reply(err("PX value must be an integer"));
                };
                Some(now_millis() + ttl_ms)
            }
            [px_flag] if eq_ignore_case(px_flag, "PX") => {
                return DispatchOutcome::Reply(err("PX value missing"));
            }
            _ => return DispatchOutcome::Reply(err("Invalid arguments for SET")),
        };

        self.keyspace.set(
            (*key).clone(),
            Value::Str((*value).clone()),
            expire_at_ms,
        );
        DispatchOutcome::Reply(Frame::Simple("OK".to_string()))
    }

    fn get(&self, args: &[&Bytes]) -> DispatchOutcome {
        let [key] = args else {
            return DispatchOutcome::Reply(err("Wrong number of arguments for GET"));
        };
        match self.keyspace.get(key) {
            Some(Value::Str(s)) => DispatchOutcome::Reply(Frame::Bulk(s)),
            Some(_) | None => DispatchOutcome::Reply(Frame::Null),
        }
    }

    fn config_get(&self, args: &[&Bytes]) -> DispatchOutcome {
        let [subcommand, param] = args else {
            return DispatchOutcome::Reply(err("Invalid CONFIG GET syntax"));
        };
        if !eq_ignore_case(subcommand, "GET") {
            return DispatchOutcome::Reply(err("Invalid CONFIG GET syntax"));
        }
        match self.config.get_param(param) {
            Some(value) => DispatchOutcome::Reply(Frame::Array(vec![
                Frame::bulk((*param).clone()),
                Frame::bulk(value.into_bytes()),
            ])),
            None => DispatchOutcome::Reply(err("Unknown configuration parameter")),
        }
    }

    async fn save(&self) -> DispatchOutcome {
        let entries = self.keyspace.snapshot_entries();
        let mut data = rustc_hash::FxHashMap::default();
        let mut expiry = rustc_hash::FxHashMap::default();
        for (key, value, expire_at_ms) in entries {
            if let Some(at) = expire_at_ms {
                expiry.insert(key.clone(), at);
            }
            data.insert(key, value);
        }
        match snapshot::write_snapshot_blocking(self.config.snapshot_path(), data, expiry).await {
            Ok(()) => DispatchOutcome::Reply(Frame::Simple("OK".to_string())),
            Err(e) => {
                error!(error = %e, "failed to save snapshot");
                DispatchOutcome::Reply(err("Failed to save RDB file"))
            }
        }
    }

    fn keys(&self, args: &[&Bytes]) -> DispatchOutcome {
        let [pattern] = args else {
            return DispatchOutcome::Reply(err("Wrong number of arguments for KEYS"));
        };
        let matched = self.keyspace.keys_matching(pattern);
        DispatchOutcome::Reply(Frame::Array(matched.into_iter().map(Frame::Bulk).collect()))
    }

    fn info(&self, args: &[&Bytes]) -> DispatchOutcome {
        let [section] = args else {
            return DispatchOutcome::Reply(err("Wrong number of arguments for INFO"));
        };
        if !eq_ignore_case(section, "replication") {
            return DispatchOutcome::Reply(err("Wrong arguments for 'info' command"));
        }
        let replid = match &self.config.role {
            crate::config::Role::Primary => self.config.replication_id.clone(),
            crate::config::Role::Replica { .. } => String::new(),
        };
        let body = format!(
            "# Replication\nrole:{}\nmaster_replid:{}\nmaster_repl_offset:0\n",
            self.config.role.wire_name(),
            replid,
        );
        DispatchOutcome::Reply(Frame::bulk(body.into_bytes()))
    }

    fn replconf(&self, args: &[&Bytes]) -> DispatchOutcome {
        if args.len() != 2 {
            return DispatchOutcome::Reply(err("Wrong number of arguments for REPLCONF"));
        }
        DispatchOutcome::Reply(Frame::Simple("OK".to_string()))
    }

    fn psync(&self, args: &[&Bytes]) -> DispatchOutcome {
        let [repl_id, offset] = args else {
            return DispatchOutcome::Reply(err("Wrong number of arguments for PSYNC"));
        };
        if repl_id.as_ref() != b"?" || offset.as_ref() != b"-1" {
            return DispatchOutcome::Reply(err("Unsupported PSYNC arguments"));
        }

        let mut out = format!("+FULLRESYNC {} 0\r\n", self.config.replication_id).into_bytes();
        let path = self.config.snapshot_path();
        match std::fs::read(&path) {
            Ok(contents) => {
                out.extend_from_slice(format!("${}\r\n", contents.len()).as_bytes());
                out.extend_from_slice(&contents);
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                warn!("PSYNC requested but no snapshot exists on disk yet");
            }
            Err(e) => {
                error!(error = %e, "failed to read snapshot for PSYNC");
                return DispatchOutcome::Reply(err("Failed to read RDB file"));
            }
        }
        DispatchOutcome::ReplyRaw(out)
    }
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Role;
    use std::path::PathBuf;

    fn test_dispatcher() -> Dispatcher {
        let config = Arc::new(Config {
            dir: PathBuf::from("/tmp/ember-dispatch-test"),
            dbfilename: "dump.rdb".to_string(),
            port: 6379,
            role: Role::Primary,
            replication_id: "a".repeat(40),
        });
        Dispatcher::new(Arc::new(Keyspace::new()), config)
    }

    fn bulk_array(parts: &[&[u8]]) -> Frame {
        Frame::Array(parts.iter().map(|p| Frame::bulk(p.to_vec())).collect())
    }

    #[tokio::test]
    async fn ping_replies_pong() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"PING"])).await {
            DispatchOutcome::Reply(Frame::Simple(s)) => assert_eq!(s, "PONG"),
            _ => panic!("expected simple reply"),
        }
    }

    #[tokio::test]
    async fn set_then_get_roundtrips() {
        let d = test_dispatcher();
        d.dispatch(bulk_array(&[b"SET", b"foo", b"bar"])).await;
        match d.dispatch(bulk_array(&[b"GET", b"foo"])).await {
            DispatchOutcome::Reply(Frame::Bulk(b)) => assert_eq!(b, Bytes::from_static(b"bar")),
            _ => panic!("expected bulk reply"),
        }
    }

    #[tokio::test]
    async fn get_missing_key_returns_null() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"GET", b"nope"])).await {
            DispatchOutcome::Reply(Frame::Null) => {}
            _ => panic!("expected null reply"),
        }
    }

    #[tokio::test]
    async fn set_with_px_installs_ttl_then_expires() {
        let d = test_dispatcher();
        d.dispatch(bulk_array(&[b"SET", b"foo", b"bar", b"PX", b"0"])).await;
        match d.dispatch(bulk_array(&[b"GET", b"foo"])).await {
            DispatchOutcome::Reply(Frame::Null) => {}
            _ => panic!("expected null reply after immediate expiry"),
        }
    }

    #[tokio::test]
    async fn set_rejects_non_integer_px_value() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"SET", b"foo", b"bar", b"PX", b"notanumber"])).await {
            DispatchOutcome::Reply(Frame::Error(e)) => assert!(e.contains("PX value must be an integer")),
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn config_get_unknown_param_errors() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"CONFIG", b"GET", b"maxmemory"])).await {
            DispatchOutcome::Reply(Frame::Error(e)) => assert!(e.contains("Unknown configuration parameter")),
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn config_get_known_param_returns_pair() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"CONFIG", b"GET", b"dbfilename"])).await {
            DispatchOutcome::Reply(Frame::Array(items)) => {
                assert_eq!(items.len(), 2);
            }
            _ => panic!("expected array reply"),
        }
    }

    #[tokio::test]
    async fn config_get_recognizes_replication_params() {
        let d = test_dispatcher();
        for name in [
            "role",
            "master_host",
            "master_port",
            "master_replid",
            "master_repl_offset",
            "port",
        ] {
            match d.dispatch(bulk_array(&[b"CONFIG", b"GET", name.as_bytes()])).await {
                DispatchOutcome::Reply(Frame::Array(items)) => assert_eq!(items.len(), 2),
                _ => panic!("expected array reply for {name}"),
            }
        }
    }

    #[tokio::test]
    async fn keys_matches_glob_pattern() {
        let d = test_dispatcher();
        d.dispatch(bulk_array(&[b"SET", b"hello", b"1"])).await;
        d.dispatch(bulk_array(&[b"SET", b"help", b"2"])).await;
        d.dispatch(bulk_array(&[b"SET", b"world", b"3"])).await;
        match d.dispatch(bulk_array(&[b"KEYS", b"hel*"])).await {
            DispatchOutcome::Reply(Frame::Array(items)) => assert_eq!(items.len(), 2),
            _ => panic!("expected array reply"),
        }
    }

    #[tokio::test]
    async fn info_replication_reports_primary_role_with_wire_vocabulary() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"INFO", b"replication"])).await {
            DispatchOutcome::Reply(Frame::Bulk(b)) => {
                let text = String::from_utf8(b.to_vec()).unwrap();
                assert!(text.contains("role:master"));
                assert!(text.contains(&"a".repeat(40)));
            }
            _ => panic!("expected bulk reply"),
        }
    }

    #[tokio::test]
    async fn unknown_command_errors() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"BOGUS"])).await {
            DispatchOutcome::Reply(Frame::Error(e)) => assert!(e.contains("Unknown command")),
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn quit_closes_connection() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"QUIT"])).await {
            DispatchOutcome::ReplyThenClose(Frame::Simple(s)) => assert_eq!(s, "OK"),
            _ => panic!("expected reply-then-close"),
        }
    }

    #[tokio::test]
    async fn psync_with_unsupported_args_errors() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"PSYNC", b"abc", b"5"])).await {
            DispatchOutcome::Reply(Frame::Error(e)) => assert!(e.contains("Unsupported PSYNC")),
            _ => panic!("expected error reply"),
        }
    }

    #[tokio::test]
    async fn psync_full_resync_without_snapshot_on_disk() {
        let d = test_dispatcher();
        match d.dispatch(bulk_array(&[b"PSYNC", b"?", b"-1"])).await {
            DispatchOutcome::ReplyRaw(bytes) => {
                let text = String::from_utf8_lossy(&bytes);
                assert!(text.starts_with("+FULLRESYNC"));
            }
            _ => panic!("expected raw reply"),
        }
    }

    #[tokio::test]
    async fn save_writes_snapshot_via_blocking_task() {
        let dir = tempfile::tempdir().unwrap();
        let config = Arc::new(Config {
            dir: dir.path().to_path_buf(),
            dbfilename: "dump.rdb".to_string(),
            port: 6379,
            role: Role::Primary,
            replication_id: "a".repeat(40),
        });
        let d = Dispatcher::new(Arc::new(Keyspace::new()), config);
        d.dispatch(bulk_array(&[b"SET", b"foo", b"bar"])).await;
        match d.dispatch(bulk_array(&[b"SAVE"])).await {
            DispatchOutcome::Reply(Frame::Simple(s)) => assert_eq!(s, "OK"),
            _ => panic!("expected simple reply"),
        }
        assert!(dir.path().join("dump.rdb").exists());
    }
}
