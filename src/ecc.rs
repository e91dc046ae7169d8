//! Thin, stable wrapper over `secp256k1` (spec §4.2).
//!
//! The original C library threads a single process-wide context through every call
//! (`ecc_start`/`ecc_stop`). Per REDESIGN FLAGS, this is represented here as an
//! explicit `EccContext` value that every function takes by reference, plus a lazily
//! initialized singleton (`ecc::global()`) for callers that don't want to manage one
//! themselves.

use once_cell::sync::Lazy;
use secp256k1::ecdsa::{RecoverableSignature, RecoveryId, Signature};
use secp256k1::{All, Message, PublicKey, Scalar, Secp256k1, SecretKey};

use crate::error::KeyError;

pub struct EccContext {
    secp: Secp256k1<All>,
}

impl EccContext {
    pub fn new() -> Self {
        EccContext {
            secp: Secp256k1::new(),
        }
    }

    pub fn get_pubkey(&self, privkey: &SecretKey) -> PublicKey {
        PublicKey::from_secret_key(&self.secp, privkey)
    }

    /// DER-encoded, low-S-normalized signature (spec §4.2: "must be low-S
    /// normalized before DER emission").
    pub fn sign(&self, privkey: &SecretKey, hash32: &[u8; 32]) -> Vec<u8> {
        let msg = Message::from_digest(*hash32);
        let mut sig = self.secp.sign_ecdsa(&msg, privkey);
        sig.normalize_s();
        sig.serialize_der().to_vec()
    }

    /// 64-byte compact (r||s) signature, low-S normalized, no recovery id.
    pub fn sign_compact(&self, privkey: &SecretKey, hash32: &[u8; 32]) -> [u8; 64] {
        let msg = Message::from_digest(*hash32);
        let mut sig = self.secp.sign_ecdsa(&msg, privkey);
        sig.normalize_s();
        sig.serialize_compact()
    }

    /// Compact signature plus recovery id, for ECC recovery workflows.
    pub fn sign_recoverable(&self, privkey: &SecretKey, hash32: &[u8; 32]) -> ([u8; 64], i32) {
        let msg = Message::from_digest(*hash32);
        let rec_sig = self.secp.sign_ecdsa_recoverable(&msg, privkey);
        let (recid, compact) = rec_sig.serialize_compact();
        (compact, recid.to_i32())
    }

    pub fn verify(&self, pubkey: &PublicKey, hash32: &[u8; 32], der_sig: &[u8]) -> bool {
        let msg = Message::from_digest(*hash32);
        match Signature::from_der(der_sig) {
            Ok(sig) => self.secp.verify_ecdsa(&msg, &sig, pubkey).is_ok(),
            Err(_) => false,
        }
    }

    pub fn recover_pubkey(
        &self,
        compact: &[u8; 64],
        hash32: &[u8; 32],
        recid: i32,
    ) -> Result<PublicKey, KeyError> {
        let recid = RecoveryId::from_i32(recid)?;
        let rec_sig = RecoverableSignature::from_compact(compact, recid)?;
        let msg = Message::from_digest(*hash32);
        Ok(self.secp.recover_ecdsa(&msg, &rec_sig)?)
    }

    pub fn compact_to_der_normalized(&self, compact: &[u8; 64]) -> Result<Vec<u8>, KeyError> {
        let mut sig = Signature::from_compact(compact)?;
        sig.normalize_s();
        Ok(sig.serialize_der().to_vec())
    }

    pub fn der_to_compact(&self, der: &[u8]) -> Result<[u8; 64], KeyError> {
        let sig = Signature::from_der(der)?;
        Ok(sig.serialize_compact())
    }

    /// BIP32 `CKDpriv`: child = parent + tweak (mod n).
    pub fn tweak_private_add(
        &self,
        privkey: &SecretKey,
        tweak: &[u8; 32],
    ) -> Result<SecretKey, KeyError> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| KeyError::InvalidPrivateKey)?;
        Ok(privkey.add_tweak(&scalar)?)
    }

    /// BIP32 `CKDpub`: child point = parent point + tweak*G.
    pub fn tweak_public_add(
        &self,
        pubkey: &PublicKey,
        tweak: &[u8; 32],
    ) -> Result<PublicKey, KeyError> {
        let scalar = Scalar::from_be_bytes(*tweak).map_err(|_| KeyError::InvalidPrivateKey)?;
        let (new_pubkey, _parity) = pubkey.add_exp_tweak(&self.secp, &scalar)?;
        Ok(new_pubkey)
    }

    pub fn verify_private_key(&self, bytes: &[u8]) -> bool {
        SecretKey::from_slice(bytes).is_ok()
    }

    pub fn verify_pubkey(&self, bytes: &[u8]) -> bool {
        PublicKey::from_slice(bytes).is_ok()
    }
}

impl Default for EccContext {
    fn default() -> Self {
        Self::new()
    }
}

/// Process-wide convenience singleton. Most callers should prefer threading an
/// explicit `EccContext`; this exists for call sites (tests, simple scripts) that
/// don't need one of their own.
static GLOBAL: Lazy<EccContext> = Lazy::new(EccContext::new);

pub fn global() -> &'static EccContext {
    &GLOBAL
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::RngCore;

    fn random_privkey() -> SecretKey {
        loop {
            let mut bytes = [0u8; 32];
            rand::thread_rng().fill_bytes(&mut bytes);
            if let Ok(k) = SecretKey::from_slice(&bytes) {
                return k;
            }
        }
    }

    #[test]
    fn sign_then_verify_roundtrips() {
        let ctx = EccContext::new();
        let privkey = random_privkey();
        let pubkey = ctx.get_pubkey(&privkey);
        let hash = crate::primitives::hash::sha256(b"message to sign");
        let sig = ctx.sign(&privkey, &hash);
        assert!(ctx.verify(&pubkey, &hash, &sig));
    }

    #[test]
    fn compact_and_der_are_equivalent() {
        let ctx = EccContext::new();
        let privkey = random_privkey();
        let hash = crate::primitives::hash::sha256(b"another message");
        let compact = ctx.sign_compact(&privkey, &hash);
        let der = ctx.compact_to_der_normalized(&compact).unwrap();
        let pubkey = ctx.get_pubkey(&privkey);
        assert!(ctx.verify(&pubkey, &hash, &der));
        let back = ctx.der_to_compact(&der).unwrap();
        assert_eq!(back, compact);
    }

    #[test]
    fn recoverable_signature_recovers_pubkey() {
        let ctx = EccContext::new();
        let privkey = random_privkey();
        let pubkey = ctx.get_pubkey(&privkey);
        let hash = crate::primitives::hash::sha256(b"recoverable message");
        let (compact, recid) = ctx.sign_recoverable(&privkey, &hash);
        let recovered = ctx.recover_pubkey(&compact, &hash, recid).unwrap();
        assert_eq!(recovered, pubkey);
    }

    #[test]
    fn tweak_private_and_public_are_consistent() {
        let ctx = EccContext::new();
        let privkey = random_privkey();
        let pubkey = ctx.get_pubkey(&privkey);
        let tweak = crate::primitives::hash::sha256(b"some chain code derivation data");

        let child_priv = ctx.tweak_private_add(&privkey, &tweak).unwrap();
        let child_pub_from_priv = ctx.get_pubkey(&child_priv);
        let child_pub_from_pub = ctx.tweak_public_add(&pubkey, &tweak).unwrap();

        assert_eq!(child_pub_from_priv, child_pub_from_pub);
    }
}
