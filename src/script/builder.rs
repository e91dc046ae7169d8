//! Script assembly: canonical push-data encodings and the standard output
//! templates (spec §4.5), transcribed from `dogecoin_script_append_pushdata` /
//! `dogecoin_script_build_*` in libdogecoin's `script.c`.

use crate::error::ScriptError;
use crate::primitives::hash::Hash160;
use crate::script::opcodes::*;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Script(pub Vec<u8>);

impl Script {
    pub fn new() -> Self {
        Script(Vec::new())
    }

    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        Script(bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }

    pub fn append_op(&mut self, op: u8) {
        self.0.push(op);
    }

    /// Push `data` using the shortest canonical encoding: a length byte for
    /// payloads under 76 bytes, otherwise `OP_PUSHDATA1/2/4` with the matching
    /// little-endian length prefix.
    pub fn append_pushdata(&mut self, data: &[u8]) {
        let len = data.len();
        if len < OP_PUSHDATA1 as usize {
            self.0.push(len as u8);
        } else if len <= 0xff {
            self.0.push(OP_PUSHDATA1);
            self.0.push(len as u8);
        } else if len <= 0xffff {
            self.0.push(OP_PUSHDATA2);
            self.0.extend_from_slice(&(len as u16).to_le_bytes());
        } else {
            self.0.push(OP_PUSHDATA4);
            self.0.extend_from_slice(&(len as u32).to_le_bytes());
        }
        self.0.extend_from_slice(data);
    }

    pub fn check_size(&self) -> Result<(), ScriptError> {
        if self.0.len() > MAX_SCRIPT_SIZE {
            return Err(ScriptError::TooLong {
                max: MAX_SCRIPT_SIZE,
                actual: self.0.len(),
            });
        }
        Ok(())
    }
}

/// `OP_DUP OP_HASH160 <20-byte hash> OP_EQUALVERIFY OP_CHECKSIG`.
pub fn build_p2pkh(hash: &Hash160) -> Script {
    let mut script = Script::new();
    script.append_op(OP_DUP);
    script.append_op(OP_HASH160);
    script.append_pushdata(hash.as_bytes());
    script.append_op(OP_EQUALVERIFY);
    script.append_op(OP_CHECKSIG);
    script
}

/// `OP_HASH160 <20-byte hash> OP_EQUAL`.
pub fn build_p2sh(hash: &Hash160) -> Script {
    let mut script = Script::new();
    script.append_op(OP_HASH160);
    script.append_pushdata(hash.as_bytes());
    script.append_op(OP_EQUAL);
    script
}

/// `OP_0 <20-byte hash>` (recognized for classification only, never signed).
pub fn build_p2wpkh(hash: &Hash160) -> Script {
    let mut script = Script::new();
    script.append_op(OP_0);
    script.append_pushdata(hash.as_bytes());
    script
}

/// `<m> <pubkey_1> .. <pubkey_n> <n> OP_CHECKMULTISIG`.
pub fn build_multisig(required: u8, pubkeys: &[Vec<u8>]) -> Result<Script, ScriptError> {
    let n = pubkeys.len();
    if required == 0 || n == 0 || (required as usize) > n || n > 16 {
        return Err(ScriptError::InvalidMultisigBounds {
            m: required,
            n: n as u8,
        });
    }
    let mut script = Script::new();
    script.append_op(encode_op_n(required));
    for pubkey in pubkeys {
        script.append_pushdata(pubkey);
    }
    script.append_op(encode_op_n(n as u8));
    script.append_op(OP_CHECKMULTISIG);
    Ok(script)
}

/// Strip `OP_CODESEPARATOR` from a subscript before hashing, per legacy sighash
/// rules (spec §4.6).
pub fn without_codeseparator(script: &Script) -> Result<Script, ScriptError> {
    let ops = crate::script::classify::get_ops(script)?;
    let mut out = Script::new();
    for op in ops {
        if op.op == OP_CODESEPARATOR {
            continue;
        }
        match op.data {
            Some(data) => out.append_pushdata(&data),
            None => out.append_op(op.op),
        }
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn pushdata_uses_length_byte_for_small_payload() {
        let mut script = Script::new();
        script.append_pushdata(&[1, 2, 3]);
        assert_eq!(script.0, vec![3, 1, 2, 3]);
    }

    #[test]
    fn pushdata_uses_pushdata1_for_medium_payload() {
        let mut script = Script::new();
        let data = vec![0xabu8; 200];
        script.append_pushdata(&data);
        assert_eq!(script.0[0], OP_PUSHDATA1);
        assert_eq!(script.0[1], 200);
    }

    #[test]
    fn multisig_rejects_out_of_bounds_m() {
        let pubkeys = vec![vec![0u8; 33]];
        assert!(build_multisig(2, &pubkeys).is_err());
    }
}
