//! Block header (spec §3): the 80-byte structure shared by the P2P wire protocol's
//! `headers`/`block` messages and the SPV headers database.

use serde::{Deserialize, Serialize};

use crate::error::PrimitiveError;
use crate::primitives::hash::{dogecoin_hash, Hash256};

pub const HEADER_SIZE: usize = 80;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    pub version: i32,
    pub prev_block: Hash256,
    pub merkle_root: Hash256,
    pub timestamp: u32,
    pub bits: u32,
    pub nonce: u32,
}

impl BlockHeader {
    pub fn serialize(&self) -> [u8; HEADER_SIZE] {
        let mut out = [0u8; HEADER_SIZE];
        out[0..4].copy_from_slice(&self.version.to_le_bytes());
        out[4..36].copy_from_slice(&self.prev_block.0);
        out[36..68].copy_from_slice(&self.merkle_root.0);
        out[68..72].copy_from_slice(&self.timestamp.to_le_bytes());
        out[72..76].copy_from_slice(&self.bits.to_le_bytes());
        out[76..80].copy_from_slice(&self.nonce.to_le_bytes());
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<Self, PrimitiveError> {
        let buf = buf.get(0..HEADER_SIZE).ok_or(PrimitiveError::Truncated)?;
        let version = i32::from_le_bytes(buf[0..4].try_into().unwrap());
        let mut prev_block = [0u8; 32];
        prev_block.copy_from_slice(&buf[4..36]);
        let mut merkle_root = [0u8; 32];
        merkle_root.copy_from_slice(&buf[36..68]);
        let timestamp = u32::from_le_bytes(buf[68..72].try_into().unwrap());
        let bits = u32::from_le_bytes(buf[72..76].try_into().unwrap());
        let nonce = u32::from_le_bytes(buf[76..80].try_into().unwrap());
        Ok(BlockHeader {
            version,
            prev_block: Hash256::from_bytes(prev_block),
            merkle_root: Hash256::from_bytes(merkle_root),
            timestamp,
            bits,
            nonce,
        })
    }

    /// `SHA256(SHA256(header))`, little-endian wire order (spec §3).
    pub fn block_hash(&self) -> Hash256 {
        dogecoin_hash(&self.serialize())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_header() -> BlockHeader {
        BlockHeader {
            version: 1,
            prev_block: Hash256::from_bytes([0x11; 32]),
            merkle_root: Hash256::from_bytes([0x22; 32]),
            timestamp: 1_386_325_540,
            bits: 0x1e0f_ffff,
            nonce: 99_943,
        }
    }

    #[test]
    fn header_roundtrips_through_wire_bytes() {
        let header = sample_header();
        let bytes = header.serialize();
        assert_eq!(bytes.len(), HEADER_SIZE);
        let parsed = BlockHeader::deserialize(&bytes).unwrap();
        assert_eq!(parsed, header);
    }

    #[test]
    fn block_hash_is_double_sha256_of_serialization() {
        let header = sample_header();
        let expected = dogecoin_hash(&header.serialize());
        assert_eq!(header.block_hash(), expected);
    }

    #[test]
    fn deserialize_rejects_truncated_buffer() {
        assert!(matches!(
            BlockHeader::deserialize(&[0u8; 79]),
            Err(PrimitiveError::Truncated)
        ));
    }
}
