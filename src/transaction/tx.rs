//! Canonical transaction model and byte-exact wire (de)serialization (spec §4.5),
//! transcribed from `dogecoin_tx_in/_out/_` and `dogecoin_tx_(de)serialize` in
//! libdogecoin's `tx.h`/`tx.c`.

use crate::error::TxError;
use crate::primitives::hash::{dogecoin_hash, Hash256};
use crate::primitives::varint::{decode_var_int, encode_var_int};
use crate::script::Script;

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct OutPoint {
    pub hash: Hash256,
    pub n: u32,
}

impl OutPoint {
    pub fn null() -> Self {
        OutPoint {
            hash: Hash256::ZERO,
            n: 0xffff_ffff,
        }
    }

    pub fn is_null(&self) -> bool {
        self.hash == Hash256::ZERO && self.n == 0xffff_ffff
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxIn {
    pub prevout: OutPoint,
    pub script_sig: Script,
    pub sequence: u32,
}

impl TxIn {
    pub fn new(prevout: OutPoint) -> Self {
        TxIn {
            prevout,
            script_sig: Script::new(),
            sequence: 0xffff_ffff,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TxOut {
    pub value: i64,
    pub script_pubkey: Script,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Tx {
    pub version: i32,
    pub vin: Vec<TxIn>,
    pub vout: Vec<TxOut>,
    pub locktime: u32,
}

impl Tx {
    pub fn new() -> Self {
        Tx {
            version: 1,
            vin: Vec::new(),
            vout: Vec::new(),
            locktime: 0,
        }
    }

    pub fn is_coinbase(&self) -> bool {
        self.vin.len() == 1 && self.vin[0].prevout.is_null()
    }

    pub fn serialize(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend_from_slice(&self.version.to_le_bytes());
        encode_var_int(&mut out, self.vin.len() as u64);
        for txin in &self.vin {
            serialize_txin(&mut out, txin);
        }
        encode_var_int(&mut out, self.vout.len() as u64);
        for txout in &self.vout {
            serialize_txout(&mut out, txout);
        }
        out.extend_from_slice(&self.locktime.to_le_bytes());
        out
    }

    pub fn deserialize(buf: &[u8]) -> Result<(Tx, usize), TxError> {
        let mut pos = 0usize;
        let version = read_i32(buf, &mut pos)?;

        let vin_count = decode_var_int(buf, &mut pos)
            .map_err(|e| TxError::Encoding(e.to_string()))? as usize;
        let mut vin = Vec::with_capacity(vin_count);
        for _ in 0..vin_count {
            vin.push(deserialize_txin(buf, &mut pos)?);
        }

        let vout_count = decode_var_int(buf, &mut pos)
            .map_err(|e| TxError::Encoding(e.to_string()))? as usize;
        let mut vout = Vec::with_capacity(vout_count);
        for _ in 0..vout_count {
            vout.push(deserialize_txout(buf, &mut pos)?);
        }

        let locktime = read_u32(buf, &mut pos)?;

        Ok((
            Tx {
                version,
                vin,
                vout,
                locktime,
            },
            pos,
        ))
    }

    /// `SHA256(SHA256(serialize(tx)))`, little-endian wire order.
    pub fn txid(&self) -> Hash256 {
        dogecoin_hash(&self.serialize())
    }
}

impl Default for Tx {
    fn default() -> Self {
        Self::new()
    }
}

fn serialize_txin(out: &mut Vec<u8>, txin: &TxIn) {
    out.extend_from_slice(&txin.prevout.hash.0);
    out.extend_from_slice(&txin.prevout.n.to_le_bytes());
    encode_var_int(out, txin.script_sig.as_bytes().len() as u64);
    out.extend_from_slice(txin.script_sig.as_bytes());
    out.extend_from_slice(&txin.sequence.to_le_bytes());
}

fn serialize_txout(out: &mut Vec<u8>, txout: &TxOut) {
    out.extend_from_slice(&txout.value.to_le_bytes());
    encode_var_int(out, txout.script_pubkey.as_bytes().len() as u64);
    out.extend_from_slice(txout.script_pubkey.as_bytes());
}

fn deserialize_txin(buf: &[u8], pos: &mut usize) -> Result<TxIn, TxError> {
    let mut hash = [0u8; 32];
    hash.copy_from_slice(
        buf.get(*pos..*pos + 32)
            .ok_or_else(|| TxError::Encoding("truncated outpoint hash".into()))?,
    );
    *pos += 32;
    let n = read_u32(buf, pos)?;
    let script_len =
        decode_var_int(buf, pos).map_err(|e| TxError::Encoding(e.to_string()))? as usize;
    let script = buf
        .get(*pos..*pos + script_len)
        .ok_or_else(|| TxError::Encoding("truncated script_sig".into()))?
        .to_vec();
    *pos += script_len;
    let sequence = read_u32(buf, pos)?;
    Ok(TxIn {
        prevout: OutPoint {
            hash: Hash256::from_bytes(hash),
            n,
        },
        script_sig: Script::from_bytes(script),
        sequence,
    })
}

fn deserialize_txout(buf: &[u8], pos: &mut usize) -> Result<TxOut, TxError> {
    let value = read_i64(buf, pos)?;
    let script_len =
        decode_var_int(buf, pos).map_err(|e| TxError::Encoding(e.to_string()))? as usize;
    let script = buf
        .get(*pos..*pos + script_len)
        .ok_or_else(|| TxError::Encoding("truncated script_pubkey".into()))?
        .to_vec();
    *pos += script_len;
    Ok(TxOut {
        value,
        script_pubkey: Script::from_bytes(script),
    })
}

fn read_i32(buf: &[u8], pos: &mut usize) -> Result<i32, TxError> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| TxError::Encoding("truncated i32".into()))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(i32::from_le_bytes(bytes))
}

fn read_u32(buf: &[u8], pos: &mut usize) -> Result<u32, TxError> {
    let bytes: [u8; 4] = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| TxError::Encoding("truncated u32".into()))?
        .try_into()
        .unwrap();
    *pos += 4;
    Ok(u32::from_le_bytes(bytes))
}

fn read_i64(buf: &[u8], pos: &mut usize) -> Result<i64, TxError> {
    let bytes: [u8; 8] = buf
        .get(*pos..*pos + 8)
        .ok_or_else(|| TxError::Encoding("truncated i64".into()))?
        .try_into()
        .unwrap();
    *pos += 8;
    Ok(i64::from_le_bytes(bytes))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_tx_roundtrips() {
        let tx = Tx::new();
        let bytes = tx.serialize();
        let (parsed, consumed) = Tx::deserialize(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, tx);
    }

    #[test]
    fn tx_with_inputs_and_outputs_roundtrips() {
        let mut tx = Tx::new();
        tx.vin.push(TxIn::new(OutPoint {
            hash: Hash256::from_bytes([0x11; 32]),
            n: 0,
        }));
        tx.vout.push(TxOut {
            value: 5000,
            script_pubkey: Script::from_bytes(vec![0x76, 0xa9]),
        });
        let bytes = tx.serialize();
        let (parsed, consumed) = Tx::deserialize(&bytes).unwrap();
        assert_eq!(consumed, bytes.len());
        assert_eq!(parsed, tx);
    }

    #[test]
    fn coinbase_detection() {
        let mut tx = Tx::new();
        tx.vin.push(TxIn::new(OutPoint::null()));
        assert!(tx.is_coinbase());
    }

    #[test]
    fn txid_is_double_sha256_of_serialization() {
        let tx = Tx::new();
        let expected = dogecoin_hash(&tx.serialize());
        assert_eq!(tx.txid(), expected);
    }
}
