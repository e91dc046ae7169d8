//! P2PKH address encoding (spec §4.2): `Base58Check(pubkey_address_prefix || hash160(pubkey))`.

use secp256k1::PublicKey;
use thiserror::Error;

use crate::chainparams::ChainParams;
use crate::primitives::base58;
use crate::primitives::hash::{hash160, Hash160};

#[derive(Debug, Error)]
pub enum AddressError {
    #[error("base58check decoding failed: {0}")]
    Encoding(#[from] crate::error::PrimitiveError),
    #[error("address payload has wrong length: expected 20 bytes, got {0}")]
    WrongLength(usize),
    #[error("wrong address version byte: expected 0x{expected:02x}, got 0x{actual:02x}")]
    WrongVersion { expected: u8, actual: u8 },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Address(pub Hash160);

impl Address {
    pub fn from_pubkey(pubkey: &PublicKey, compressed: bool) -> Self {
        let bytes = if compressed {
            pubkey.serialize().to_vec()
        } else {
            pubkey.serialize_uncompressed().to_vec()
        };
        Address(hash160(&bytes))
    }

    pub fn from_hash160(hash: Hash160) -> Self {
        Address(hash)
    }

    pub fn to_base58check(&self, params: &ChainParams) -> String {
        let mut payload = Vec::with_capacity(21);
        payload.push(params.pubkey_address_prefix);
        payload.extend_from_slice(self.0.as_bytes());
        base58::encode_check(&payload)
    }

    pub fn from_base58check(s: &str, params: &ChainParams) -> Result<Self, AddressError> {
        let payload = base58::decode_check(s)?;
        if payload.len() != 21 {
            return Err(AddressError::WrongLength(payload.len()));
        }
        if payload[0] != params.pubkey_address_prefix {
            return Err(AddressError::WrongVersion {
                expected: params.pubkey_address_prefix,
                actual: payload[0],
            });
        }
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        Ok(Address(Hash160::from_bytes(hash)))
    }
}

impl std::fmt::Display for Address {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainparams::Network;
    use secp256k1::{Secp256k1, SecretKey};

    #[test]
    fn roundtrips_through_base58check() {
        let secp = Secp256k1::new();
        let privkey = SecretKey::from_slice(&[0x44; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &privkey);
        let params = ChainParams::for_network(Network::Main);

        let addr = Address::from_pubkey(&pubkey, true);
        let encoded = addr.to_base58check(&params);
        let decoded = Address::from_base58check(&encoded, &params).unwrap();
        assert_eq!(decoded, addr);
    }

    #[test]
    fn rejects_foreign_network_prefix() {
        let secp = Secp256k1::new();
        let privkey = SecretKey::from_slice(&[0x55; 32]).unwrap();
        let pubkey = PublicKey::from_secret_key(&secp, &privkey);
        let main = ChainParams::for_network(Network::Main);
        let testnet = ChainParams::for_network(Network::Testnet);

        let addr = Address::from_pubkey(&pubkey, true);
        let encoded = addr.to_base58check(&main);
        assert!(matches!(
            Address::from_base58check(&encoded, &testnet),
            Err(AddressError::WrongVersion { .. })
        ));
    }
}
