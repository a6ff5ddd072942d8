//! Bit-exact reader and writer for the RDB-compatible snapshot format:
//! length encoding, string encoding, the file layout, and the trailing
//! CRC-64 checksum.

use std::collections::HashSet;
use std::io::{Read, Write};
use std::path::Path;

use bytes::Bytes;
use rustc_hash::FxHashMap;
use tracing::warn;

use crate::error::{Error, Result};
use crate::protocol::{crc64_checksum, Crc64Writer};
use crate::store::Value;

const MAGIC: &[u8] = b"REDIS0011";
const OPCODE_METADATA: u8 = 0xFA;
const OPCODE_DB_SELECT: u8 = 0xFE;
const OPCODE_RESIZE_HINT: u8 = 0xFB;
const OPCODE_EXPIRY_MS: u8 = 0xFC;
const OPCODE_EXPIRY_S: u8 = 0xFD;
const OPCODE_TERMINATOR: u8 = 0xFF;

const VALUE_TYPE_STRING: u8 = 0x00;
const VALUE_TYPE_LIST: u8 = 0x01;
const VALUE_TYPE_SET: u8 = 0x02;

/// Encodes `length` using the shortest of the two-byte-prefix or
/// four-byte-extended forms from §4.3.1 (the 11xxxxxx special-encoding form
/// is never emitted).
fn write_length(out: &mut impl Write, length: usize) -> Result<()> {
    if length <= 0x3F {
        out.write_all(&[length as u8])?;
    } else if length <= 0x3FFF {
        let first = 0b0100_0000 | ((length >> 8) & 0x3F) as u8;
        let second = (length & 0xFF) as u8;
        out.write_all(&[first, second])?;
    } else {
        out.write_all(&[0b1000_0000])?;
        out.write_all(&(length as u32).to_be_bytes())?;
    }
    Ok(())
}

fn read_byte(input: &mut impl Read) -> Result<u8> {
    let mut buf = [0u8; 1];
    input.read_exact(&mut buf).map_err(|_| {
        Error::Format("unexpected end of file while reading a byte".to_string())
    })?;
    Ok(buf[0])
}

/// Decodes a length per §4.3.1. The `11xxxxxx` special-encoding prefix is
/// rejected.
fn read_length(input: &mut impl Read) -> Result<usize> {
    let first = read_byte(input)?;
    match first >> 6 {
        0b00 => Ok((first & 0x3F) as usize),
        0b01 => {
            let second = read_byte(input)?;
            Ok((((first & 0x3F) as usize) << 8) | second as usize)
        }
        0b10 => {
            let mut buf = [0u8; 4];
            input
                .read_exact(&mut buf)
                .map_err(|_| Error::Format("truncated extended length".to_string()))?;
            Ok(u32::from_be_bytes(buf) as usize)
        }
        _ => Err(Error::Format(
            "special-encoded length (11xxxxxx) is not supported".to_string(),
        )),
    }
}

fn write_string(out: &mut impl Write, data: &[u8]) -> Result<()> {
    write_length(out, data.len())?;
    out.write_all(data)?;
    Ok(())
}

fn read_string(input: &mut impl Read) -> Result<Bytes> {
    let len = read_length(input)?;
    let mut buf = vec![0u8; len];
    input
        .read_exact(&mut buf)
        .map_err(|_| Error::Format("truncated string payload".to_string()))?;
    Ok(Bytes::from(buf))
}

/// Writes a full snapshot of `data`/`expiry` to `path`, overwriting any
/// existing file.
pub fn write_snapshot(
    path: &Path,
    data: &FxHashMap<Bytes, Value>,
    expiry: &FxHashMap<Bytes, i64>,
) -> Result<()> {
    let file = std::fs::File::create(path)?;
    let mut sink = Crc64Writer::new(std::io::BufWriter::new(file));

    sink.write_all(MAGIC)?;

    sink.write_all(&[OPCODE_METADATA])?;
    write_string(&mut sink, b"redis-ver")?;
    write_string(&mut sink, b"6.0.16")?;

    sink.write_all(&[OPCODE_DB_SELECT])?;
    write_length(&mut sink, 0)?;

    sink.write_all(&[OPCODE_RESIZE_HINT])?;
    write_length(&mut sink, data.len())?;
    write_length(&mut sink, expiry.len())?;

    for (key, value) in data {
        if let Some(&at_ms) = expiry.get(key) {
            sink.write_all(&[OPCODE_EXPIRY_MS])?;
            sink.write_all(&(at_ms as u64).to_le_bytes())?;
        }
        match value {
            Value::Str(s) => {
                sink.write_all(&[VALUE_TYPE_STRING])?;
                write_string(&mut sink, key)?;
                write_string(&mut sink, s)?;
            }
            Value::List(items) => {
                sink.write_all(&[VALUE_TYPE_LIST])?;
                write_string(&mut sink, key)?;
                write_length(&mut sink, items.len())?;
                for item in items {
                    write_string(&mut sink, item)?;
                }
            }
            Value::Set(members) => {
                sink.write_all(&[VALUE_TYPE_SET])?;
                write_string(&mut sink, key)?;
                write_length(&mut sink, members.len())?;
                for member in members {
                    write_string(&mut sink, member)?;
                }
            }
        }
    }

    sink.write_all(&[OPCODE_TERMINATOR])?;
    sink.flush()?;
    let checksum = sink.finalize();

    let mut file = std::fs::OpenOptions::new().append(true).open(path)?;
    file.write_all(&checksum.to_be_bytes())?;
    Ok(())
}

/// Loads a snapshot from `path`, verifying its trailing checksum first.
pub fn read_snapshot(path: &Path) -> Result<(FxHashMap<Bytes, Value>, FxHashMap<Bytes, i64>)> {
    let contents = std::fs::read(path)?;
    if contents.len() < 17 {
        return Err(Error::Format("snapshot file is too short to be valid".to_string()));
    }
    let (body, tail) = contents.split_at(contents.len() - 8);
    let expected = u64::from_be_bytes(tail.try_into().expect("tail is exactly 8 bytes"));
    let actual = crc64_checksum(body);
    if expected != actual {
        return Err(Error::Checksum { expected, actual });
    }

    let mut cursor = std::io::Cursor::new(body);
    let mut magic = [0u8; 9];
    cursor
        .read_exact(&mut magic)
        .map_err(|_| Error::Format("snapshot missing magic header".to_string()))?;
    if magic != *MAGIC {
        return Err(Error::Format("snapshot magic header mismatch".to_string()));
    }

    let now_ms = now_millis();
    let mut data = FxHashMap::default();
    let mut expiry = FxHashMap::default();

    loop {
        let opcode = read_byte(&mut cursor)?;
        match opcode {
            OPCODE_METADATA => {
                let _name = read_string(&mut cursor)?;
                let _value = read_string(&mut cursor)?;
            }
            OPCODE_DB_SELECT => {
                let index = read_length(&mut cursor)?;
                if index != 0 {
                    return Err(Error::Format("only database 0 is supported".to_string()));
                }
            }
            OPCODE_RESIZE_HINT => {
                let _main_ht_size = read_length(&mut cursor)?;
                let _expire_ht_size = read_length(&mut cursor)?;
            }
            OPCODE_TERMINATOR => break,
            first_byte => {
                let (expire_at_ms, value_type) = match first_byte {
                    OPCODE_EXPIRY_MS => {
                        let mut buf = [0u8; 8];
                        cursor
                            .read_exact(&mut buf)
                            .map_err(|_| Error::Format("truncated ms expiry".to_string()))?;
                        let at = u64::from_le_bytes(buf) as i64;
                        (Some(at), read_byte(&mut cursor)?)
                    }
                    OPCODE_EXPIRY_S => {
                        let mut buf = [0u8; 4];
                        cursor
                            .read_exact(&mut buf)
                            .map_err(|_| Error::Format("truncated second expiry".to_string()))?;
                        let at = i64::from(u32::from_le_bytes(buf)) * 1000;
                        (Some(at), read_byte(&mut cursor)?)
                    }
                    other => (None, other),
                };

                let key = read_string(&mut cursor)?;
                let value = match value_type {
                    VALUE_TYPE_STRING => Value::Str(read_string(&mut cursor)?),
                    VALUE_TYPE_LIST => {
                        let n = read_length(&mut cursor)?;
                        let mut items = Vec::with_capacity(n);
                        for _ in 0..n {
                            items.push(read_string(&mut cursor)?);
                        }
                        Value::List(items)
                    }
                    VALUE_TYPE_SET => {
                        let n = read_length(&mut cursor)?;
                        let mut members = HashSet::with_capacity(n);
                        for _ in 0..n {
                            members.insert(read_string(&mut cursor)?);
                        }
                        Value::Set(members)
                    }
                    other => {
                        return Err(Error::Format(format!("unknown value type tag: {other:#04x}")))
                    }
                };

                data.insert(key.clone(), value);
                if let Some(at) = expire_at_ms {
                    if at >= now_ms {
                        expiry.insert(key, at);
                    }
                }
            }
        }
    }

    Ok((data, expiry))
}

fn now_millis() -> i64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock is before the Unix epoch")
        .as_millis() as i64
}

/// Writes a snapshot on a background blocking thread, since file I/O would
/// otherwise stall the async runtime's worker threads. Creates the parent
/// directory if it doesn't exist yet, also on the blocking thread.
pub async fn write_snapshot_blocking(
    path: std::path::PathBuf,
    data: FxHashMap<Bytes, Value>,
    expiry: FxHashMap<Bytes, i64>,
) -> Result<()> {
    let result = tokio::task::spawn_blocking(move || {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        write_snapshot(&path, &data, &expiry)
    })
    .await;
    match result {
        Ok(result) => result,
        Err(_join_err) => {
            warn!("snapshot write task panicked");
            Err(Error::Format("snapshot write task panicked".to_string()))
        }
    }
}
