// Length-delimited message framing over TCP.
//
// Wire format: a 4-byte big-endian length prefix followed by a
// JSON-serialized message payload. `send_message` and `recv_message` pair
// the framing with serde, so callers move typed values and never touch raw
// frames; the byte-level `write_frame`/`read_frame` stay public for tests
// and tooling.
//
// A `MAX_MESSAGE_SIZE` constant (8 MB) protects against unbounded
// allocation from malformed or malicious length prefixes. Full
// `SyncState` snapshots are the largest expected messages.

use serde::Serialize;
use serde::de::DeserializeOwned;
use std::io::{self, Read, Write};

/// Maximum allowed message size (8 MB). Protects against unbounded
/// allocation from malformed length prefixes. Whole-state sync payloads are
/// the largest expected messages; 8 MB is generous headroom for a session
/// with hundreds of entities and a long chat log.
pub const MAX_MESSAGE_SIZE: u32 = 8 * 1024 * 1024;

/// Write a length-delimited frame: 4-byte big-endian length, then payload.
pub fn write_frame<W: Write>(writer: &mut W, payload: &[u8]) -> io::Result<()> {
    let len = payload.len();
    if len > MAX_MESSAGE_SIZE as usize {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    #[expect(clippy::cast_possible_truncation)]
    let len_bytes = (len as u32).to_be_bytes();
    writer.write_all(&len_bytes)?;
    writer.write_all(payload)?;
    writer.flush()?;
    Ok(())
}

/// Read a length-delimited frame: 4-byte big-endian length, then payload.
///
/// Returns `UnexpectedEof` if the stream closes cleanly before or during a
/// frame. Returns `InvalidData` if the length exceeds `MAX_MESSAGE_SIZE`.
pub fn read_frame<R: Read>(reader: &mut R) -> io::Result<Vec<u8>> {
    let mut len_buf = [0u8; 4];
    reader.read_exact(&mut len_buf)?;
    let len = u32::from_be_bytes(len_buf);
    if len > MAX_MESSAGE_SIZE {
        return Err(io::Error::new(
            io::ErrorKind::InvalidData,
            format!("message too large: {len} bytes (max {MAX_MESSAGE_SIZE})"),
        ));
    }
    let mut buf = vec![0u8; len as usize];
    reader.read_exact(&mut buf)?;
    Ok(buf)
}

/// Serialize a message as JSON and write it as one frame.
pub fn send_message<W: Write, T: Serialize>(writer: &mut W, msg: &T) -> io::Result<()> {
    let json = serde_json::to_vec(msg).map_err(io::Error::other)?;
    write_frame(writer, &json)
}

/// Read one frame and deserialize its JSON payload.
///
/// A frame that is not valid JSON for `T` is `InvalidData` — the peer is
/// speaking a different protocol (or version) and the connection should be
/// dropped.
pub fn recv_message<R: Read, T: DeserializeOwned>(reader: &mut R) -> io::Result<T> {
    let payload = read_frame(reader)?;
    serde_json::from_slice(&payload)
        .map_err(|e| io::Error::new(io::ErrorKind::InvalidData, e))
}
