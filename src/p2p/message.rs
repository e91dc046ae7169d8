//! Wire message framing (spec §4.7 / §6): `magic | command | payload_len | checksum
//! | payload`, transcribed from `dogecoin_p2p_message_new`/`dogecoin_p2p_deserialize_header`
//! in libdogecoin's `protocol.c`.

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};

use crate::error::NetError;
use crate::primitives::hash::dogecoin_hash;

/// 32 MiB, the largest payload this core will accept from a peer (spec §4.7).
pub const MAX_PAYLOAD: u32 = 32 * 1024 * 1024;

pub const HEADER_SIZE: usize = 4 + 12 + 4 + 4;

/// Pack a command string into the 12-byte NUL-padded ASCII field libdogecoin
/// calls `command`.
pub fn pack_command(command: &str) -> Result<[u8; 12], NetError> {
    if !command.is_ascii() || command.len() > 12 {
        return Err(NetError::BadCommand);
    }
    let mut out = [0u8; 12];
    out[..command.len()].copy_from_slice(command.as_bytes());
    Ok(out)
}

pub fn unpack_command(raw: &[u8; 12]) -> Result<String, NetError> {
    let end = raw.iter().position(|&b| b == 0).unwrap_or(12);
    let (cmd, padding) = raw.split_at(end);
    if !padding.iter().all(|&b| b == 0) || !cmd.is_ascii() {
        return Err(NetError::BadCommand);
    }
    Ok(String::from_utf8_lossy(cmd).into_owned())
}

/// Frame `payload` under `command` for `magic`, ready to write to the wire.
pub fn encode_message(magic: [u8; 4], command: &str, payload: &[u8]) -> Result<Vec<u8>, NetError> {
    if payload.len() as u64 > MAX_PAYLOAD as u64 {
        return Err(NetError::PayloadTooLarge {
            max: MAX_PAYLOAD,
            actual: payload.len() as u32,
        });
    }
    let checksum = dogecoin_hash(payload);
    let mut out = Vec::with_capacity(HEADER_SIZE + payload.len());
    out.extend_from_slice(&magic);
    out.extend_from_slice(&pack_command(command)?);
    out.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    out.extend_from_slice(&checksum.0[0..4]);
    out.extend_from_slice(payload);
    Ok(out)
}

#[derive(Debug, Clone)]
pub struct ParsedHeader {
    pub magic: [u8; 4],
    pub command: String,
    pub payload_len: u32,
    pub checksum: [u8; 4],
}

pub fn parse_header(buf: &[u8; HEADER_SIZE]) -> Result<ParsedHeader, NetError> {
    let mut magic = [0u8; 4];
    magic.copy_from_slice(&buf[0..4]);
    let mut command_raw = [0u8; 12];
    command_raw.copy_from_slice(&buf[4..16]);
    let command = unpack_command(&command_raw)?;
    let payload_len = u32::from_le_bytes(buf[16..20].try_into().unwrap());
    let mut checksum = [0u8; 4];
    checksum.copy_from_slice(&buf[20..24]);
    Ok(ParsedHeader {
        magic,
        command,
        payload_len,
        checksum,
    })
}

fn verify_checksum(command: &str, payload: &[u8], expected: &[u8; 4]) -> Result<(), NetError> {
    let actual = dogecoin_hash(payload);
    if &actual.0[0..4] != expected {
        return Err(NetError::ChecksumMismatch {
            command: command.to_string(),
        });
    }
    Ok(())
}

/// Read one complete, checksum-verified message from `reader`. Blocks (suspends)
/// until a full frame has arrived; never holds a reference across a suspension
/// point — every buffer here is owned (spec §9 REDESIGN FLAGS).
pub async fn read_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    expected_magic: [u8; 4],
) -> Result<(String, Vec<u8>), NetError> {
    let mut header_buf = [0u8; HEADER_SIZE];
    reader.read_exact(&mut header_buf).await?;
    let header = parse_header(&header_buf)?;
    if header.magic != expected_magic {
        return Err(NetError::BadMagic {
            expected: u32::from_le_bytes(expected_magic),
            actual: u32::from_le_bytes(header.magic),
        });
    }
    if header.payload_len > MAX_PAYLOAD {
        return Err(NetError::PayloadTooLarge {
            max: MAX_PAYLOAD,
            actual: header.payload_len,
        });
    }
    let mut payload = vec![0u8; header.payload_len as usize];
    reader.read_exact(&mut payload).await?;
    verify_checksum(&header.command, &payload, &header.checksum)?;
    Ok((header.command, payload))
}

pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    magic: [u8; 4],
    command: &str,
    payload: &[u8],
) -> Result<(), NetError> {
    let framed = encode_message(magic, command, payload)?;
    writer.write_all(&framed).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_padding_roundtrips() {
        let packed = pack_command("version").unwrap();
        assert_eq!(&packed[..7], b"version");
        assert_eq!(&packed[7..], &[0u8; 5]);
        assert_eq!(unpack_command(&packed).unwrap(), "version");
    }

    #[test]
    fn command_too_long_is_rejected() {
        assert!(matches!(
            pack_command("waytoolongcommand"),
            Err(NetError::BadCommand)
        ));
    }

    #[test]
    fn encode_then_parse_header_roundtrips() {
        let magic = [0xc0, 0xc0, 0xc0, 0xc0];
        let framed = encode_message(magic, "ping", &[1, 2, 3, 4, 5, 6, 7, 8]).unwrap();
        let mut header_buf = [0u8; HEADER_SIZE];
        header_buf.copy_from_slice(&framed[..HEADER_SIZE]);
        let header = parse_header(&header_buf).unwrap();
        assert_eq!(header.magic, magic);
        assert_eq!(header.command, "ping");
        assert_eq!(header.payload_len, 8);
    }

    #[test]
    fn oversized_payload_is_rejected_at_encode_time() {
        let magic = [0xc0, 0xc0, 0xc0, 0xc0];
        let huge = vec![0u8; MAX_PAYLOAD as usize + 1];
        assert!(matches!(
            encode_message(magic, "block", &huge),
            Err(NetError::PayloadTooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn read_message_round_trips_over_a_pipe() {
        let magic = [0xfc, 0xc1, 0xb7, 0xdc];
        let framed = encode_message(magic, "verack", &[]).unwrap();
        let mut cursor = std::io::Cursor::new(framed);
        let (command, payload) = read_message(&mut cursor, magic).await.unwrap();
        assert_eq!(command, "verack");
        assert!(payload.is_empty());
    }

    #[tokio::test]
    async fn read_message_rejects_wrong_magic() {
        let framed = encode_message([0xc0, 0xc0, 0xc0, 0xc0], "ping", &[0; 8]).unwrap();
        let mut cursor = std::io::Cursor::new(framed);
        let result = read_message(&mut cursor, [0xfa, 0xbf, 0xb5, 0xda]).await;
        assert!(matches!(result, Err(NetError::BadMagic { .. })));
    }

    #[tokio::test]
    async fn read_message_rejects_corrupt_checksum() {
        let magic = [0xc0, 0xc0, 0xc0, 0xc0];
        let mut framed = encode_message(magic, "ping", &[1; 8]).unwrap();
        let last = framed.len() - 1;
        framed[last] ^= 0xff;
        let mut cursor = std::io::Cursor::new(framed);
        let result = read_message(&mut cursor, magic).await;
        assert!(matches!(result, Err(NetError::ChecksumMismatch { .. })));
    }
}
