//! Script classification (spec §4.5), transcribed from `dogecoin_script_classify`
//! in libdogecoin's `script.c`.

use crate::error::ScriptError;
use crate::script::builder::Script;
use crate::script::opcodes::*;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScriptType {
    Nonstandard,
    Pubkey,
    PubkeyHash,
    ScriptHash,
    Multisig,
    WitnessV0PubkeyHash,
    WitnessV0ScriptHash,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ScriptOp {
    pub op: u8,
    pub data: Option<Vec<u8>>,
}

/// Parse a script into a flat op/push sequence. Fails only on a push whose
/// length prefix runs past the end of the buffer; unknown opcodes are kept
/// verbatim (the classifier treats anything it doesn't recognize as
/// `Nonstandard`, it never needs to execute them).
pub fn get_ops(script: &Script) -> Result<Vec<ScriptOp>, ScriptError> {
    let bytes = script.as_bytes();
    let mut ops = Vec::new();
    let mut i = 0usize;
    while i < bytes.len() {
        let op = bytes[i];
        i += 1;
        let push_len = match op {
            0x01..=0x4b => Some(op as usize),
            OP_PUSHDATA1 => {
                let len = *bytes.get(i).ok_or(ScriptError::TruncatedPush)? as usize;
                i += 1;
                Some(len)
            }
            OP_PUSHDATA2 => {
                let raw: [u8; 2] = bytes
                    .get(i..i + 2)
                    .ok_or(ScriptError::TruncatedPush)?
                    .try_into()
                    .unwrap();
                i += 2;
                Some(u16::from_le_bytes(raw) as usize)
            }
            OP_PUSHDATA4 => {
                let raw: [u8; 4] = bytes
                    .get(i..i + 4)
                    .ok_or(ScriptError::TruncatedPush)?
                    .try_into()
                    .unwrap();
                i += 4;
                Some(u32::from_le_bytes(raw) as usize)
            }
            _ => None,
        };

        match push_len {
            Some(len) => {
                let data = bytes
                    .get(i..i + len)
                    .ok_or(ScriptError::TruncatedPush)?
                    .to_vec();
                i += len;
                ops.push(ScriptOp { op, data: Some(data) });
            }
            None => ops.push(ScriptOp { op, data: None }),
        }
    }
    Ok(ops)
}

fn is_push_of_len(op: &ScriptOp, len: usize) -> bool {
    matches!(&op.data, Some(d) if d.len() == len)
}

pub fn classify(script: &Script) -> Result<ScriptType, ScriptError> {
    script.check_size()?;
    let ops = get_ops(script)?;
    classify_ops(&ops)
}

pub fn classify_ops(ops: &[ScriptOp]) -> Result<ScriptType, ScriptError> {
    // P2PKH: OP_DUP OP_HASH160 <20> OP_EQUALVERIFY OP_CHECKSIG
    if ops.len() == 5
        && ops[0].op == OP_DUP
        && ops[1].op == OP_HASH160
        && is_push_of_len(&ops[2], 20)
        && ops[3].op == OP_EQUALVERIFY
        && ops[4].op == OP_CHECKSIG
    {
        return Ok(ScriptType::PubkeyHash);
    }

    // P2SH: OP_HASH160 <20> OP_EQUAL
    if ops.len() == 3
        && ops[0].op == OP_HASH160
        && is_push_of_len(&ops[1], 20)
        && ops[2].op == OP_EQUAL
    {
        return Ok(ScriptType::ScriptHash);
    }

    // P2PK: <33 or 65 byte pubkey push> OP_CHECKSIG
    if ops.len() == 2
        && (is_push_of_len(&ops[0], 33) || is_push_of_len(&ops[0], 65))
        && ops[1].op == OP_CHECKSIG
    {
        return Ok(ScriptType::Pubkey);
    }

    // Witness v0: OP_0 <20-byte or 32-byte push>
    if ops.len() == 2 && ops[0].op == OP_0 {
        if is_push_of_len(&ops[1], 20) {
            return Ok(ScriptType::WitnessV0PubkeyHash);
        }
        if is_push_of_len(&ops[1], 32) {
            return Ok(ScriptType::WitnessV0ScriptHash);
        }
    }

    // Multisig: <m> <pubkey pushes> <n> OP_CHECKMULTISIG, 1 <= m <= n <= 16
    if ops.len() >= 4 && ops.last().map(|o| o.op) == Some(OP_CHECKMULTISIG) {
        if let (Some(m), Some(n)) = (
            decode_op_n(ops[0].op),
            decode_op_n(ops[ops.len() - 2].op),
        ) {
            let pubkey_count = ops.len() - 3;
            if m >= 1
                && n >= m
                && n <= 16
                && pubkey_count as u8 == n
                && ops[1..ops.len() - 2]
                    .iter()
                    .all(|op| is_push_of_len(op, 33) || is_push_of_len(op, 65))
            {
                return Ok(ScriptType::Multisig);
            }
        }
    }

    Ok(ScriptType::Nonstandard)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::script::builder::{build_multisig, build_p2pkh, build_p2sh, build_p2wpkh};

    #[test]
    fn classifies_p2pkh() {
        let hash = crate::primitives::hash::Hash160::from_bytes([0x11; 20]);
        let script = build_p2pkh(&hash);
        assert_eq!(classify(&script).unwrap(), ScriptType::PubkeyHash);
    }

    #[test]
    fn classifies_p2sh() {
        let hash = crate::primitives::hash::Hash160::from_bytes([0x22; 20]);
        let script = build_p2sh(&hash);
        assert_eq!(classify(&script).unwrap(), ScriptType::ScriptHash);
    }

    #[test]
    fn classifies_witness_v0_pubkeyhash() {
        let hash = crate::primitives::hash::Hash160::from_bytes([0x33; 20]);
        let script = build_p2wpkh(&hash);
        assert_eq!(
            classify(&script).unwrap(),
            ScriptType::WitnessV0PubkeyHash
        );
    }

    #[test]
    fn classifies_multisig() {
        let pubkeys = vec![vec![0x02; 33], vec![0x03; 33], vec![0x02; 33]];
        let script = build_multisig(2, &pubkeys).unwrap();
        assert_eq!(classify(&script).unwrap(), ScriptType::Multisig);
    }

    #[test]
    fn nonstandard_for_garbage() {
        let script = Script::from_bytes(vec![OP_RETURN, 0x01, 0x02]);
        assert_eq!(classify(&script).unwrap(), ScriptType::Nonstandard);
    }

    #[test]
    fn truncated_push_is_an_error() {
        let script = Script::from_bytes(vec![0x4c, 0x05, 0x01]);
        assert!(matches!(get_ops(&script), Err(ScriptError::TruncatedPush)));
    }
}
