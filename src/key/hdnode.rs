//! BIP32 hierarchical deterministic keys (spec §4.3), implemented from scratch:
//! `CKDpriv`/`CKDpub` over HMAC-SHA512 and secp256k1 scalar/point tweaks, plus the
//! standard 78-byte extended key serialization.

use secp256k1::{PublicKey, SecretKey};

use crate::chainparams::ChainParams;
use crate::ecc;
use crate::error::KeyError;
use crate::key::path::{ChildNumber, DerivationPath, HARDENED_OFFSET};
use crate::primitives::base58;
use crate::primitives::hash::{hash160, hmac_sha512};

#[derive(Debug, Clone)]
pub struct HDNode {
    pub depth: u8,
    pub parent_fingerprint: [u8; 4],
    pub child_number: u32,
    pub chain_code: [u8; 32],
    pub private_key: Option<SecretKey>,
    pub public_key: PublicKey,
}

impl HDNode {
    /// Master node from a BIP39 seed: `I = HMAC-SHA512(key = "Bitcoin seed", data = seed)`,
    /// `(IL, IR) = (I[0..32], I[32..64])`, `privkey = IL`, `chain_code = IR`.
    ///
    /// The HMAC key string is the one fixed by BIP32 itself and is shared across
    /// every coin that reuses the standard, Dogecoin included.
    pub fn master_from_seed(seed: &[u8]) -> Result<Self, KeyError> {
        let i = hmac_sha512(b"Bitcoin seed", seed);
        let (il, ir) = i.split_at(32);
        let privkey = SecretKey::from_slice(il)?;
        let public_key = ecc::global().get_pubkey(&privkey);
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);
        Ok(HDNode {
            depth: 0,
            parent_fingerprint: [0u8; 4],
            child_number: 0,
            chain_code,
            private_key: Some(privkey),
            public_key,
        })
    }

    pub fn is_hardened(&self) -> bool {
        self.child_number & HARDENED_OFFSET != 0
    }

    pub fn has_private_key(&self) -> bool {
        self.private_key.is_some()
    }

    /// Strip the private key, turning this into a watch-only (neutered) node.
    pub fn neuter(&self) -> HDNode {
        HDNode {
            private_key: None,
            ..self.clone()
        }
    }

    /// `hash160(pubkey)[0..4]`, identifying this node as a parent to its children.
    pub fn fingerprint(&self) -> [u8; 4] {
        let hash = hash160(&self.public_key.serialize());
        let mut out = [0u8; 4];
        out.copy_from_slice(&hash.as_bytes()[0..4]);
        out
    }

    /// Derive a single child. Hardened children (`index >= HARDENED_OFFSET`)
    /// require a private key to derive from.
    pub fn derive_child(&self, child: ChildNumber) -> Result<HDNode, KeyError> {
        let mut data = Vec::with_capacity(37);
        if child.is_hardened() {
            let privkey = self.private_key.ok_or(KeyError::HardenedFromNeutered)?;
            data.push(0x00);
            data.extend_from_slice(&privkey.secret_bytes());
        } else {
            data.extend_from_slice(&self.public_key.serialize());
        }
        data.extend_from_slice(&child.0.to_be_bytes());

        let i = hmac_sha512(&self.chain_code, &data);
        let (il, ir) = i.split_at(32);
        let tweak: [u8; 32] = il.try_into().expect("hmac-sha512 left half is 32 bytes");

        let (private_key, public_key) = match self.private_key {
            Some(parent_priv) => {
                let child_priv = ecc::global().tweak_private_add(&parent_priv, &tweak)?;
                let child_pub = ecc::global().get_pubkey(&child_priv);
                (Some(child_priv), child_pub)
            }
            None => {
                let child_pub = ecc::global().tweak_public_add(&self.public_key, &tweak)?;
                (None, child_pub)
            }
        };

        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(ir);

        Ok(HDNode {
            depth: self
                .depth
                .checked_add(1)
                .ok_or_else(|| KeyError::InvalidPath("derivation depth overflow".into()))?,
            parent_fingerprint: self.fingerprint(),
            child_number: child.0,
            chain_code,
            private_key,
            public_key,
        })
    }

    pub fn derive_path(&self, path: &DerivationPath) -> Result<HDNode, KeyError> {
        let mut node = self.clone();
        for child in path.iter() {
            node = node.derive_child(*child)?;
        }
        Ok(node)
    }

    /// Serialize as a 78-byte extended private key, Base58Check encoded with the
    /// chain's `xprv`-equivalent version bytes.
    pub fn to_extended_private(&self, params: &ChainParams) -> Result<String, KeyError> {
        let privkey = self.private_key.ok_or(KeyError::HardenedFromNeutered)?;
        let mut payload = Vec::with_capacity(78);
        payload.extend_from_slice(&params.bip32_privkey_magic.to_be_bytes());
        payload.push(self.depth);
        payload.extend_from_slice(&self.parent_fingerprint);
        payload.extend_from_slice(&self.child_number.to_be_bytes());
        payload.extend_from_slice(&self.chain_code);
        payload.push(0x00);
        payload.extend_from_slice(&privkey.secret_bytes());
        Ok(base58::encode_check(&payload))
    }

    pub fn to_extended_public(&self, params: &ChainParams) -> String {
        let mut payload = Vec::with_capacity(78);
        payload.extend_from_slice(&params.bip32_pubkey_magic.to_be_bytes());
        payload.push(self.depth);
        payload.extend_from_slice(&self.parent_fingerprint);
        payload.extend_from_slice(&self.child_number.to_be_bytes());
        payload.extend_from_slice(&self.chain_code);
        payload.extend_from_slice(&self.public_key.serialize());
        base58::encode_check(&payload)
    }

    /// Parse either an extended private or public key, dispatching on the magic.
    pub fn from_extended(s: &str, params: &ChainParams) -> Result<HDNode, KeyError> {
        let payload = base58::decode_check(s)?;
        if payload.len() != 78 {
            return Err(KeyError::InvalidExtendedKey);
        }
        let magic = u32::from_be_bytes(payload[0..4].try_into().unwrap());
        let depth = payload[4];
        let mut parent_fingerprint = [0u8; 4];
        parent_fingerprint.copy_from_slice(&payload[5..9]);
        let child_number = u32::from_be_bytes(payload[9..13].try_into().unwrap());
        let mut chain_code = [0u8; 32];
        chain_code.copy_from_slice(&payload[13..45]);
        let key_data = &payload[45..78];

        if magic == params.bip32_privkey_magic {
            if key_data[0] != 0x00 {
                return Err(KeyError::InvalidExtendedKey);
            }
            let privkey = SecretKey::from_slice(&key_data[1..33])?;
            let public_key = ecc::global().get_pubkey(&privkey);
            Ok(HDNode {
                depth,
                parent_fingerprint,
                child_number,
                chain_code,
                private_key: Some(privkey),
                public_key,
            })
        } else if magic == params.bip32_pubkey_magic {
            let public_key = PublicKey::from_slice(key_data)?;
            Ok(HDNode {
                depth,
                parent_fingerprint,
                child_number,
                chain_code,
                private_key: None,
                public_key,
            })
        } else {
            Err(KeyError::InvalidExtendedKey)
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainparams::Network;

    #[test]
    fn master_derivation_is_deterministic() {
        let seed = [0x5au8; 32];
        let a = HDNode::master_from_seed(&seed).unwrap();
        let b = HDNode::master_from_seed(&seed).unwrap();
        assert_eq!(a.chain_code, b.chain_code);
        assert_eq!(
            a.private_key.unwrap().secret_bytes(),
            b.private_key.unwrap().secret_bytes()
        );
    }

    #[test]
    fn extended_key_roundtrips() {
        let seed = [0x11u8; 32];
        let master = HDNode::master_from_seed(&seed).unwrap();
        let params = ChainParams::for_network(Network::Main);
        let xprv = master.to_extended_private(&params).unwrap();
        let parsed = HDNode::from_extended(&xprv, &params).unwrap();
        assert_eq!(
            parsed.private_key.unwrap().secret_bytes(),
            master.private_key.unwrap().secret_bytes()
        );
        assert_eq!(parsed.chain_code, master.chain_code);
    }

    #[test]
    fn hardened_child_requires_private_key() {
        let seed = [0x22u8; 32];
        let master = HDNode::master_from_seed(&seed).unwrap();
        let watch_only = master.neuter();
        let result = watch_only.derive_child(ChildNumber::hardened(0));
        assert!(matches!(result, Err(KeyError::HardenedFromNeutered)));
    }

    #[test]
    fn normal_child_ckdpub_matches_ckdpriv() {
        let seed = [0x33u8; 32];
        let master = HDNode::master_from_seed(&seed).unwrap();
        let child_priv = master.derive_child(ChildNumber::normal(0)).unwrap();
        let watch_only = master.neuter();
        let child_pub = watch_only.derive_child(ChildNumber::normal(0)).unwrap();
        assert_eq!(child_priv.public_key, child_pub.public_key);
        assert_eq!(child_priv.chain_code, child_pub.chain_code);
    }

    #[test]
    fn bip44_path_derivation_reaches_correct_depth() {
        let seed = [0x44u8; 32];
        let master = HDNode::master_from_seed(&seed).unwrap();
        let path = DerivationPath::bip44(3, 0, 0, 0);
        let leaf = master.derive_path(&path).unwrap();
        assert_eq!(leaf.depth, 5);
    }
}
