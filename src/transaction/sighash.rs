//! Legacy (pre-SegWit) Bitcoin/Dogecoin sighash algorithm (spec §4.6), transcribed
//! from `dogecoin_tx_sighash` in libdogecoin's `tx.c`, including its one
//! intentionally-preserved historical quirk: `SIGHASH_SINGLE` returns the integer
//! `1` (as a little-endian 32-byte hash) when `in_idx` has no matching output,
//! rather than erroring. Bitcoin Core preserves this bug for consensus
//! compatibility and so do we.

use crate::error::TxError;
use crate::primitives::hash::{dogecoin_hash, Hash256};
use crate::script::builder::without_codeseparator;
use crate::script::Script;
use crate::transaction::tx::Tx;

pub const SIGHASH_ALL: u8 = 0x01;
pub const SIGHASH_NONE: u8 = 0x02;
pub const SIGHASH_SINGLE: u8 = 0x03;
pub const SIGHASH_ANYONECANPAY: u8 = 0x80;

/// The hash `SIGHASH_SINGLE` returns when `in_idx >= tx.vout.len()`: the integer
/// `1` in 32-byte little-endian form, not a real hash of anything.
fn sighash_single_bug_hash() -> Hash256 {
    let mut bytes = [0u8; 32];
    bytes[0] = 1;
    Hash256::from_bytes(bytes)
}

/// Compute the legacy sighash for input `in_idx`, signing against `subscript`
/// (the referenced output's `scriptPubKey`, with `OP_CODESEPARATOR` stripped and
/// any existing `scriptSig`s blanked per the legacy algorithm).
pub fn compute(tx: &Tx, subscript: &Script, in_idx: usize, hash_type: u8) -> Result<Hash256, TxError> {
    if in_idx >= tx.vin.len() {
        return Err(TxError::InputIndexOutOfRange {
            index: in_idx,
            len: tx.vin.len(),
        });
    }

    let base_type = hash_type & !SIGHASH_ANYONECANPAY;
    if base_type == SIGHASH_SINGLE && in_idx >= tx.vout.len() {
        return Ok(sighash_single_bug_hash());
    }

    let subscript = without_codeseparator(subscript)?;
    let anyone_can_pay = hash_type & SIGHASH_ANYONECANPAY != 0;

    let mut working = tx.clone();

    if anyone_can_pay {
        working.vin = vec![working.vin[in_idx].clone()];
        working.vin[0].script_sig = subscript;
    } else {
        for (i, txin) in working.vin.iter_mut().enumerate() {
            txin.script_sig = if i == in_idx {
                subscript.clone()
            } else {
                Script::new()
            };
        }
    }

    let signing_index = if anyone_can_pay { 0 } else { in_idx };

    match base_type {
        SIGHASH_NONE => {
            working.vout.clear();
            if !anyone_can_pay {
                for (i, txin) in working.vin.iter_mut().enumerate() {
                    if i != signing_index {
                        txin.sequence = 0;
                    }
                }
            }
        }
        SIGHASH_SINGLE => {
            working.vout.truncate(signing_index + 1);
            for txout in working.vout.iter_mut().take(signing_index) {
                txout.value = -1;
                txout.script_pubkey = Script::new();
            }
            if !anyone_can_pay {
                for (i, txin) in working.vin.iter_mut().enumerate() {
                    if i != signing_index {
                        txin.sequence = 0;
                    }
                }
            }
        }
        _ => {}
    }

    let mut preimage = working.serialize();
    preimage.extend_from_slice(&(hash_type as u32).to_le_bytes());

    Ok(dogecoin_hash(&preimage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::primitives::hash::Hash160;
    use crate::script::builder::build_p2pkh;
    use crate::transaction::tx::{OutPoint, TxIn, TxOut};

    fn sample_tx() -> Tx {
        let mut tx = Tx::new();
        tx.vin.push(TxIn::new(OutPoint {
            hash: Hash256::from_bytes([0x11; 32]),
            n: 0,
        }));
        tx.vout.push(TxOut {
            value: 1000,
            script_pubkey: build_p2pkh(&Hash160::from_bytes([0x22; 20])),
        });
        tx
    }

    #[test]
    fn sighash_single_bug_triggers_when_no_matching_output() {
        let mut tx = sample_tx();
        tx.vin.push(TxIn::new(OutPoint {
            hash: Hash256::from_bytes([0x33; 32]),
            n: 1,
        }));
        let subscript = build_p2pkh(&Hash160::from_bytes([0x44; 20]));
        let hash = compute(&tx, &subscript, 1, SIGHASH_SINGLE).unwrap();
        let mut expected = [0u8; 32];
        expected[0] = 1;
        assert_eq!(hash, Hash256::from_bytes(expected));
    }

    #[test]
    fn sighash_all_is_deterministic() {
        let tx = sample_tx();
        let subscript = build_p2pkh(&Hash160::from_bytes([0x22; 20]));
        let a = compute(&tx, &subscript, 0, SIGHASH_ALL).unwrap();
        let b = compute(&tx, &subscript, 0, SIGHASH_ALL).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn out_of_range_input_index_errors() {
        let tx = sample_tx();
        let subscript = build_p2pkh(&Hash160::from_bytes([0x22; 20]));
        assert!(matches!(
            compute(&tx, &subscript, 5, SIGHASH_ALL),
            Err(TxError::InputIndexOutOfRange { .. })
        ));
    }

    #[test]
    fn sighash_none_clears_outputs_and_other_sequences() {
        let mut tx = sample_tx();
        tx.vin.push(TxIn::new(OutPoint {
            hash: Hash256::from_bytes([0x55; 32]),
            n: 2,
        }));
        let subscript = build_p2pkh(&Hash160::from_bytes([0x22; 20]));
        let hash_all = compute(&tx, &subscript, 0, SIGHASH_ALL).unwrap();
        let hash_none = compute(&tx, &subscript, 0, SIGHASH_NONE).unwrap();
        assert_ne!(hash_all, hash_none);
    }
}
