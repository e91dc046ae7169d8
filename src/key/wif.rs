//! Wallet Import Format (spec §4.2): `Base58Check(secret_key_prefix || privkey[32] || [0x01 if compressed])`.

use secp256k1::SecretKey;

use crate::chainparams::ChainParams;
use crate::error::KeyError;
use crate::primitives::base58;

pub fn encode(privkey: &SecretKey, compressed: bool, params: &ChainParams) -> String {
    let mut payload = Vec::with_capacity(34);
    payload.push(params.secret_key_prefix);
    payload.extend_from_slice(&privkey.secret_bytes());
    if compressed {
        payload.push(0x01);
    }
    base58::encode_check(&payload)
}

/// Returns the decoded key and whether the WIF encoded a compressed pubkey.
pub fn decode(wif: &str, params: &ChainParams) -> Result<(SecretKey, bool), KeyError> {
    let payload = base58::decode_check(wif)?;
    let compressed = match payload.len() {
        33 => false,
        34 => true,
        n => return Err(KeyError::InvalidWifLength(n)),
    };
    if payload[0] != params.secret_key_prefix {
        return Err(KeyError::WrongWifVersion {
            expected: params.secret_key_prefix,
            actual: payload[0],
        });
    }
    if compressed && payload[33] != 0x01 {
        return Err(KeyError::InvalidExtendedKey);
    }
    let privkey = SecretKey::from_slice(&payload[1..33])?;
    Ok((privkey, compressed))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainparams::Network;

    #[test]
    fn roundtrips_compressed_mainnet() {
        let params = ChainParams::for_network(Network::Main);
        let privkey = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let wif = encode(&privkey, true, &params);
        let (decoded, compressed) = decode(&wif, &params).unwrap();
        assert_eq!(decoded, privkey);
        assert!(compressed);
    }

    #[test]
    fn rejects_wrong_network_prefix() {
        let main = ChainParams::for_network(Network::Main);
        let testnet = ChainParams::for_network(Network::Testnet);
        let privkey = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let wif = encode(&privkey, true, &main);
        assert!(matches!(
            decode(&wif, &testnet),
            Err(KeyError::WrongWifVersion { .. })
        ));
    }

    #[test]
    fn uncompressed_roundtrips_without_suffix_byte() {
        let params = ChainParams::for_network(Network::Main);
        let privkey = SecretKey::from_slice(&[0x33; 32]).unwrap();
        let wif = encode(&privkey, false, &params);
        let (decoded, compressed) = decode(&wif, &params).unwrap();
        assert_eq!(decoded, privkey);
        assert!(!compressed);
    }
}
