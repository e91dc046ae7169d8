//! Input signing (spec §4.6), transcribed from `dogecoin_tx_sign_input` in
//! libdogecoin's `tx.c`. Drives the classifier, builds the right `scriptSig`
//! shape for the result, and reports a typed outcome rather than a bare bool.

use secp256k1::{PublicKey, SecretKey};

use crate::ecc;
use crate::error::TxError;
use crate::script::classify::{classify, ScriptType};
use crate::script::Script;
use crate::transaction::sighash;
use crate::transaction::tx::Tx;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SignResult {
    Ok,
    InvalidKey,
    /// The privkey doesn't match any key referenced by the script; signed anyway.
    NoKeyMatch,
    SighashFailed,
    UnknownScriptType,
    InvalidTxOrScript,
    InputIndexOutOfRange,
}

/// Sign input `input_index` of `tx` in place, using `subscript` (the referenced
/// output's `scriptPubKey`) and `hash_type`. Mutates `tx.vin[input_index].script_sig`
/// on success.
pub fn sign_input(
    tx: &mut Tx,
    subscript: &Script,
    privkey: &SecretKey,
    input_index: usize,
    hash_type: u8,
) -> Result<SignResult, TxError> {
    if input_index >= tx.vin.len() {
        return Ok(SignResult::InputIndexOutOfRange);
    }

    let script_type = match classify(subscript) {
        Ok(t) => t,
        Err(_) => return Ok(SignResult::InvalidTxOrScript),
    };

    let pubkey = ecc::global().get_pubkey(privkey);

    let new_script_sig = match script_type {
        ScriptType::PubkeyHash => {
            let key_matches = matches_pubkeyhash(subscript, &pubkey);
            let hash = match sighash::compute(tx, subscript, input_index, hash_type) {
                Ok(h) => h,
                Err(_) => return Ok(SignResult::SighashFailed),
            };
            let der = ecc::global().sign(privkey, hash.as_bytes());
            let mut script_sig = Script::new();
            let mut sig_with_type = der;
            sig_with_type.push(hash_type);
            script_sig.append_pushdata(&sig_with_type);
            script_sig.append_pushdata(&pubkey.serialize());
            if !key_matches {
                return sign_with(tx, input_index, script_sig, SignResult::NoKeyMatch);
            }
            script_sig
        }
        ScriptType::Pubkey => {
            let hash = match sighash::compute(tx, subscript, input_index, hash_type) {
                Ok(h) => h,
                Err(_) => return Ok(SignResult::SighashFailed),
            };
            let der = ecc::global().sign(privkey, hash.as_bytes());
            let mut script_sig = Script::new();
            let mut sig_with_type = der;
            sig_with_type.push(hash_type);
            script_sig.append_pushdata(&sig_with_type);
            script_sig
        }
        ScriptType::Multisig => {
            let hash = match sighash::compute(tx, subscript, input_index, hash_type) {
                Ok(h) => h,
                Err(_) => return Ok(SignResult::SighashFailed),
            };
            let der = ecc::global().sign(privkey, hash.as_bytes());
            let mut sig_with_type = der;
            sig_with_type.push(hash_type);
            // Insert at the first unsigned slot: since this core builds scriptSigs
            // one signature at a time, the existing scriptSig already holds any
            // earlier signatures in order, and we simply append the next one.
            let mut script_sig = tx.vin[input_index].script_sig.clone();
            if script_sig.as_bytes().is_empty() {
                script_sig.append_op(crate::script::opcodes::OP_0); // CHECKMULTISIG off-by-one dummy push
            }
            script_sig.append_pushdata(&sig_with_type);
            script_sig
        }
        ScriptType::WitnessV0PubkeyHash | ScriptType::WitnessV0ScriptHash => {
            return Ok(SignResult::UnknownScriptType);
        }
        ScriptType::ScriptHash | ScriptType::Nonstandard => {
            return Ok(SignResult::UnknownScriptType);
        }
    };

    tx.vin[input_index].script_sig = new_script_sig;
    Ok(SignResult::Ok)
}

fn sign_with(
    tx: &mut Tx,
    input_index: usize,
    script_sig: Script,
    result: SignResult,
) -> Result<SignResult, TxError> {
    tx.vin[input_index].script_sig = script_sig;
    Ok(result)
}

fn matches_pubkeyhash(subscript: &Script, pubkey: &PublicKey) -> bool {
    use crate::primitives::hash::hash160;
    let ops = match crate::script::classify::get_ops(subscript) {
        Ok(ops) => ops,
        Err(_) => return false,
    };
    let expected_hash = match ops.get(2).and_then(|op| op.data.as_ref()) {
        Some(data) => data,
        None => return false,
    };
    hash160(&pubkey.serialize()).as_bytes().as_slice() == expected_hash.as_slice()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hash::Hash160;
    use crate::script::builder::build_p2pkh;
    use crate::transaction::tx::{OutPoint, TxIn, TxOut};
    use secp256k1::Secp256k1;

    fn make_tx(privkey: &SecretKey) -> (Tx, Script) {
        let secp = Secp256k1::new();
        let pubkey = PublicKey::from_secret_key(&secp, privkey);
        let hash = crate::primitives::hash::hash160(&pubkey.serialize());
        let subscript = build_p2pkh(&hash);

        let mut tx = Tx::new();
        tx.vin.push(TxIn::new(OutPoint {
            hash: crate::primitives::hash::Hash256::from_bytes([0x77; 32]),
            n: 0,
        }));
        tx.vout.push(TxOut {
            value: 1000,
            script_pubkey: build_p2pkh(&Hash160::from_bytes([0x88; 20])),
        });
        (tx, subscript)
    }

    #[test]
    fn signs_p2pkh_input_successfully() {
        let privkey = SecretKey::from_slice(&[0x99; 32]).unwrap();
        let (mut tx, subscript) = make_tx(&privkey);
        let result = sign_input(&mut tx, &subscript, &privkey, 0, sighash::SIGHASH_ALL).unwrap();
        assert_eq!(result, SignResult::Ok);
        assert!(!tx.vin[0].script_sig.as_bytes().is_empty());
    }

    #[test]
    fn reports_no_key_match_but_still_signs() {
        let signing_key = SecretKey::from_slice(&[0x11; 32]).unwrap();
        let other_key = SecretKey::from_slice(&[0x22; 32]).unwrap();
        let (mut tx, subscript) = make_tx(&other_key);
        let result =
            sign_input(&mut tx, &subscript, &signing_key, 0, sighash::SIGHASH_ALL).unwrap();
        assert_eq!(result, SignResult::NoKeyMatch);
        assert!(!tx.vin[0].script_sig.as_bytes().is_empty());
    }

    #[test]
    fn out_of_range_index_reports_without_erroring() {
        let privkey = SecretKey::from_slice(&[0x33; 32]).unwrap();
        let (mut tx, subscript) = make_tx(&privkey);
        let result =
            sign_input(&mut tx, &subscript, &privkey, 9, sighash::SIGHASH_ALL).unwrap();
        assert_eq!(result, SignResult::InputIndexOutOfRange);
    }

    #[test]
    fn witness_output_is_unknown_script_type() {
        use crate::script::builder::build_p2wpkh;
        let privkey = SecretKey::from_slice(&[0x44; 32]).unwrap();
        let (mut tx, _) = make_tx(&privkey);
        let witness_script = build_p2wpkh(&Hash160::from_bytes([0x55; 20]));
        let result =
            sign_input(&mut tx, &witness_script, &privkey, 0, sighash::SIGHASH_ALL).unwrap();
        assert_eq!(result, SignResult::UnknownScriptType);
    }
}
