//! Base58Check encoding (spec §4.1 / §6).
//!
//! The alphabet and checksum rule come straight from the original Bitcoin/Dogecoin
//! implementation: append `SHA256(SHA256(payload))[0..4]`, then Base58-encode with
//! each leading zero byte mapped to a leading `'1'`.

use crate::error::PrimitiveError;
use crate::primitives::hash::dogecoin_hash;

pub fn encode_check(payload: &[u8]) -> String {
    let checksum = dogecoin_hash(payload);
    let mut extended = Vec::with_capacity(payload.len() + 4);
    extended.extend_from_slice(payload);
    extended.extend_from_slice(&checksum.0[0..4]);
    bs58::encode(extended).into_string()
}

pub fn decode_check(s: &str) -> Result<Vec<u8>, PrimitiveError> {
    let data = bs58::decode(s)
        .into_vec()
        .map_err(|_| PrimitiveError::InvalidAlphabet)?;
    if data.len() < 4 {
        return Err(PrimitiveError::PayloadTooShort);
    }
    let (payload, checksum) = data.split_at(data.len() - 4);
    let expected = dogecoin_hash(payload);
    if &expected.0[0..4] != checksum {
        return Err(PrimitiveError::ChecksumMismatch);
    }
    Ok(payload.to_vec())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn roundtrip_arbitrary_payload() {
        let payload = vec![0x1e, 0xde, 0xad, 0xbe, 0xef, 0x00, 0x00];
        let encoded = encode_check(&payload);
        let decoded = decode_check(&encoded).unwrap();
        assert_eq!(decoded, payload);
    }

    #[test]
    fn leading_zero_bytes_become_leading_ones() {
        let payload = vec![0x00, 0x00, 0x01, 0x02];
        let encoded = encode_check(&payload);
        assert!(encoded.starts_with("11"));
    }

    #[test]
    fn corrupted_checksum_is_rejected() {
        let payload = vec![0x1e, 1, 2, 3, 4, 5, 6, 7, 8, 9, 10];
        let mut encoded = encode_check(&payload).into_bytes();
        let last = *encoded.last().unwrap();
        // flip the last base58 character to something else in the alphabet
        let alphabet = b"123456789ABCDEFGHJKLMNPQRSTUVWXYZabcdefghijkmnopqrstuvwxyz";
        let replacement = alphabet.iter().find(|&&c| c != last).unwrap();
        *encoded.last_mut().unwrap() = *replacement;
        let corrupted = String::from_utf8(encoded).unwrap();
        assert!(decode_check(&corrupted).is_err());
    }
}
