//! Message payload (de)serialization for the commands this core speaks (spec §6):
//! `version, verack, ping, pong, inv, getdata, getheaders, headers, getblocks,
//! block, reject`. Transcribed field-for-field from libdogecoin's `protocol.h`.

use crate::error::NetError;
use crate::primitives::block::{BlockHeader, HEADER_SIZE};
use crate::primitives::hash::Hash256;
use crate::primitives::varint::{decode_var_int, decode_var_str, encode_var_int, encode_var_str};
use crate::transaction::tx::Tx;

pub const PROTOCOL_VERSION: i32 = 70015;
pub const NODE_NETWORK: u64 = 1;
/// `getheaders`/`headers` page size libdogecoin (and Bitcoin Core) caps a single
/// response at (spec §4.8).
pub const MAX_HEADERS_RESULTS: usize = 2000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct NetAddr {
    pub services: u64,
    pub ip: [u8; 16],
    pub port: u16,
}

impl NetAddr {
    pub const LEN: usize = 26;

    pub fn unroutable() -> Self {
        NetAddr {
            services: 0,
            ip: [0u8; 16],
            port: 0,
        }
    }

    fn write(&self, out: &mut Vec<u8>) {
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.ip);
        out.extend_from_slice(&self.port.to_be_bytes());
    }

    fn read(buf: &[u8], pos: &mut usize) -> Result<Self, NetError> {
        let slice = buf
            .get(*pos..*pos + Self::LEN)
            .ok_or(NetError::Truncated("net_addr"))?;
        let services = u64::from_le_bytes(slice[0..8].try_into().unwrap());
        let mut ip = [0u8; 16];
        ip.copy_from_slice(&slice[8..24]);
        let port = u16::from_be_bytes(slice[24..26].try_into().unwrap());
        *pos += Self::LEN;
        Ok(NetAddr { services, ip, port })
    }
}

#[derive(Debug, Clone)]
pub struct VersionPayload {
    pub version: i32,
    pub services: u64,
    pub timestamp: i64,
    pub recv: NetAddr,
    pub from: NetAddr,
    pub nonce: u64,
    pub user_agent: String,
    pub start_height: i32,
    pub relay: bool,
}

impl VersionPayload {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        out.extend_from_slice(&self.services.to_le_bytes());
        out.extend_from_slice(&self.timestamp.to_le_bytes());
        self.recv.write(&mut out);
        self.from.write(&mut out);
        out.extend_from_slice(&self.nonce.to_le_bytes());
        encode_var_str(&mut out, self.user_agent.as_bytes());
        out.extend_from_slice(&self.start_height.to_le_bytes());
        out.push(self.relay as u8);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, NetError> {
        let mut pos = 0usize;
        let version = read_i32(buf, &mut pos)?;
        let services = read_u64(buf, &mut pos)?;
        let timestamp = read_i64(buf, &mut pos)?;
        let recv = NetAddr::read(buf, &mut pos)?;
        let from = NetAddr::read(buf, &mut pos)?;
        let nonce = read_u64(buf, &mut pos)?;
        let user_agent_bytes = decode_var_str(buf, &mut pos)
            .map_err(|_| NetError::Truncated("version.user_agent"))?;
        let user_agent = String::from_utf8_lossy(&user_agent_bytes).into_owned();
        let start_height = read_i32(buf, &mut pos)?;
        let relay = buf.get(pos).copied().unwrap_or(1) != 0;
        Ok(VersionPayload {
            version,
            services,
            timestamp,
            recv,
            from,
            nonce,
            user_agent,
            start_height,
            relay,
        })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvType {
    Tx,
    Block,
    Unknown(u32),
}

impl InvType {
    fn to_u32(self) -> u32 {
        match self {
            InvType::Tx => 1,
            InvType::Block => 2,
            InvType::Unknown(n) => n,
        }
    }

    fn from_u32(n: u32) -> Self {
        match n {
            1 => InvType::Tx,
            2 => InvType::Block,
            n => InvType::Unknown(n),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct InvVec {
    pub inv_type: InvType,
    pub hash: Hash256,
}

pub fn serialize_inv(items: &[InvVec]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_var_int(&mut out, items.len() as u64);
    for item in items {
        out.extend_from_slice(&item.inv_type.to_u32().to_le_bytes());
        out.extend_from_slice(&item.hash.0);
    }
    out
}

pub fn deserialize_inv(buf: &[u8]) -> Result<Vec<InvVec>, NetError> {
    let mut pos = 0usize;
    let count = decode_var_int(buf, &mut pos).map_err(|_| NetError::Truncated("inv.count"))?;
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let inv_type = InvType::from_u32(read_u32(buf, &mut pos)?);
        let hash = read_hash(buf, &mut pos)?;
        out.push(InvVec { inv_type, hash });
    }
    Ok(out)
}

/// `getheaders`/`getblocks` share a payload shape: `version | locator | stop_hash`.
#[derive(Debug, Clone)]
pub struct LocatorRequest {
    pub version: u32,
    pub locator: Vec<Hash256>,
    pub stop_hash: Hash256,
}

impl LocatorRequest {
    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        encode_var_int(&mut out, self.locator.len() as u64);
        for hash in &self.locator {
            out.extend_from_slice(&hash.0);
        }
        out.extend_from_slice(&self.stop_hash.0);
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, NetError> {
        let mut pos = 0usize;
        let version = read_u32(buf, &mut pos)?;
        let count =
            decode_var_int(buf, &mut pos).map_err(|_| NetError::Truncated("locator.count"))?;
        let mut locator = Vec::with_capacity(count as usize);
        for _ in 0..count {
            locator.push(read_hash(buf, &mut pos)?);
        }
        let stop_hash = read_hash(buf, &mut pos)?;
        Ok(LocatorRequest {
            version,
            locator,
            stop_hash,
        })
    }
}

/// A `headers` message: each header is followed by a `var_int` transaction
/// count that is always `0` on the wire (headers carry no transactions).
pub fn serialize_headers(headers: &[BlockHeader]) -> Vec<u8> {
    let mut out = Vec::new();
    encode_var_int(&mut out, headers.len() as u64);
    for header in headers {
        out.extend_from_slice(&header.serialize());
        encode_var_int(&mut out, 0);
    }
    out
}

pub fn deserialize_headers(buf: &[u8]) -> Result<Vec<BlockHeader>, NetError> {
    let mut pos = 0usize;
    let count =
        decode_var_int(buf, &mut pos).map_err(|_| NetError::Truncated("headers.count"))?;
    if count as usize > MAX_HEADERS_RESULTS {
        return Err(NetError::ProtocolViolation(format!(
            "headers message carries {count} entries, more than MAX_HEADERS_RESULTS"
        )));
    }
    let mut out = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let slice = buf
            .get(pos..pos + HEADER_SIZE)
            .ok_or(NetError::Truncated("headers.header"))?;
        let header = BlockHeader::deserialize(slice).map_err(|_| NetError::Truncated("headers.header"))?;
        pos += HEADER_SIZE;
        let tx_count =
            decode_var_int(buf, &mut pos).map_err(|_| NetError::Truncated("headers.tx_count"))?;
        if tx_count != 0 {
            return Err(NetError::ProtocolViolation(
                "headers message entry carried a nonzero tx count".into(),
            ));
        }
        out.push(header);
    }
    Ok(out)
}

/// A `block` message: 80-byte header prefix, then `var_int nTx` transactions.
#[derive(Debug, Clone)]
pub struct BlockPayload {
    pub header: BlockHeader,
    pub txs: Vec<Tx>,
}

impl BlockPayload {
    pub fn deserialize(buf: &[u8]) -> Result<Self, NetError> {
        let header_bytes = buf
            .get(0..HEADER_SIZE)
            .ok_or(NetError::Truncated("block.header"))?;
        let header = BlockHeader::deserialize(header_bytes)
            .map_err(|_| NetError::Truncated("block.header"))?;
        let mut pos = HEADER_SIZE;
        let tx_count =
            decode_var_int(buf, &mut pos).map_err(|_| NetError::Truncated("block.tx_count"))?;
        let mut txs = Vec::with_capacity(tx_count as usize);
        for _ in 0..tx_count {
            let (tx, consumed) = Tx::deserialize(&buf[pos..])
                .map_err(|_| NetError::Truncated("block.tx"))?;
            pos += consumed;
            txs.push(tx);
        }
        Ok(BlockPayload { header, txs })
    }
}

pub fn serialize_ping_pong(nonce: u64) -> Vec<u8> {
    nonce.to_le_bytes().to_vec()
}

pub fn deserialize_nonce(buf: &[u8]) -> Result<u64, NetError> {
    let bytes: [u8; 8] = buf.try_into().map_err(|_| NetError::Truncated("ping/pong.nonce"))?;
    Ok(u64::from_le_bytes(bytes))
}

fn read_hash(buf: &[u8], pos: &mut usize) -> Result<Hash256, NetError> {
    let slice = buf
        .get(*pos..*pos + 32)
        .ok_or(NetError::Truncated("hash256"))?;
    let mut bytes = [0u8; 32];
    bytes.copy_from_slice(slice);
    *pos += 32;
    Ok(Hash256::from_bytes(bytes))
}

fn read_i32(buf: &[u8], pos: &mut usize) -> Result<i32, NetError> {
    let slice = buf.get(*pos..*pos + 4).ok_or(NetError::Truncated("i32"))?;
    *pos += 4;
    Ok(i32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, NetError> {
    let slice = buf.get(*pos..*pos + 4).ok_or(NetError::Truncated("u32"))?;
    *pos += 4;
    Ok(u32::from_le_bytes(slice.try_into().unwrap()))
}

fn read_i64(buf: &[u8], pos: &mut usize) -> Result<i64, NetError> {
    let slice = buf.get(*pos..*pos + 8).ok_or(NetError::Truncated("i64"))?;
    *pos += 8;
    Ok(i64::from_le_bytes(slice.try_into().unwrap()))
}

fn read_u64(buf: &[u8], pos: &mut usize) -> Result<u64, NetError> {
    let slice = buf.get(*pos..*pos + 8).ok_or(NetError::Truncated("u64"))?;
    *pos += 8;
    Ok(u64::from_le_bytes(slice.try_into().unwrap()))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_version() -> VersionPayload {
        VersionPayload {
            version: PROTOCOL_VERSION,
            services: NODE_NETWORK,
            timestamp: 1_700_000_000,
            recv: NetAddr::unroutable(),
            from: NetAddr::unroutable(),
            nonce: 0xdead_beef_0000_0001,
            user_agent: "/dogecoin-core:0.1.0/".to_string(),
            start_height: 4_500_000,
            relay: true,
        }
    }

    #[test]
    fn version_payload_roundtrips() {
        let version = sample_version();
        let bytes = version.serialize();
        let parsed = VersionPayload::deserialize(&bytes).unwrap();
        assert_eq!(parsed.version, version.version);
        assert_eq!(parsed.services, version.services);
        assert_eq!(parsed.nonce, version.nonce);
        assert_eq!(parsed.user_agent, version.user_agent);
        assert_eq!(parsed.start_height, version.start_height);
        assert!(parsed.relay);
    }

    #[test]
    fn inv_roundtrips() {
        let items = vec![
            InvVec {
                inv_type: InvType::Block,
                hash: Hash256::from_bytes([0x11; 32]),
            },
            InvVec {
                inv_type: InvType::Tx,
                hash: Hash256::from_bytes([0x22; 32]),
            },
        ];
        let bytes = serialize_inv(&items);
        let parsed = deserialize_inv(&bytes).unwrap();
        assert_eq!(parsed, items);
    }

    #[test]
    fn locator_request_roundtrips() {
        let req = LocatorRequest {
            version: PROTOCOL_VERSION as u32,
            locator: vec![Hash256::from_bytes([0x33; 32]), Hash256::from_bytes([0x44; 32])],
            stop_hash: Hash256::ZERO,
        };
        let bytes = req.serialize();
        let parsed = LocatorRequest::deserialize(&bytes).unwrap();
        assert_eq!(parsed.version, req.version);
        assert_eq!(parsed.locator, req.locator);
        assert_eq!(parsed.stop_hash, req.stop_hash);
    }

    #[test]
    fn headers_message_roundtrips_with_zero_tx_count() {
        let headers = vec![BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::from_bytes([0x55; 32]),
            timestamp: 1,
            bits: 2,
            nonce: 3,
        }];
        let bytes = serialize_headers(&headers);
        let parsed = deserialize_headers(&bytes).unwrap();
        assert_eq!(parsed, headers);
    }

    #[test]
    fn headers_message_rejects_nonzero_tx_count() {
        let headers = vec![BlockHeader {
            version: 1,
            prev_block: Hash256::ZERO,
            merkle_root: Hash256::ZERO,
            timestamp: 1,
            bits: 2,
            nonce: 3,
        }];
        let mut bytes = serialize_headers(&headers);
        *bytes.last_mut().unwrap() = 1;
        assert!(matches!(
            deserialize_headers(&bytes),
            Err(NetError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn headers_message_rejects_more_than_max_results() {
        let mut bytes = Vec::new();
        encode_var_int(&mut bytes, (MAX_HEADERS_RESULTS + 1) as u64);
        assert!(matches!(
            deserialize_headers(&bytes),
            Err(NetError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn ping_pong_nonce_roundtrips() {
        let bytes = serialize_ping_pong(0x0102_0304_0506_0708);
        assert_eq!(deserialize_nonce(&bytes).unwrap(), 0x0102_0304_0506_0708);
    }
}
