//! Wallet file encoding (spec §6 "Wallet file format"). Little-endian
//! throughout, append-only once the header is written.

use std::fs::{File, OpenOptions};
use std::io::{Read, Write};
use std::path::Path;

use crate::chainparams::ChainParams;
use crate::error::WalletError;
use crate::primitives::hash::{Hash160, Hash256};
use crate::primitives::varint::{decode_var_int, decode_var_str, encode_var_int, encode_var_str};
use crate::transaction::tx::Tx;
use crate::wallet::{AddressType, WalletAddr};

pub const HEADER_MAGIC: [u8; 4] = [0xa8, 0xf0, 0x11, 0xc5];
pub const RECORD_MAGIC: [u8; 4] = [0xc8, 0xf2, 0x69, 0x1e];
pub const CURRENT_VERSION: u32 = 1;
const HEADER_LEN: usize = 4 + 4 + 32;

const REC_MASTERPUBKEY: u8 = 0x00;
const REC_ADDR: u8 = 0x01;
const REC_TX: u8 = 0x02;

/// A single decoded record, as replayed when a wallet file is loaded.
pub enum Record {
    MasterPubkey(String),
    Addr(WalletAddr),
    Tx {
        height: u32,
        tx_hash: Hash256,
        tx: Tx,
    },
}

/// An open wallet file, positioned for appends.
pub struct WalletFile {
    file: File,
}

impl WalletFile {
    /// Write a fresh header: magic, version, and the chain's genesis hash.
    pub fn create(path: impl AsRef<Path>, chain: &ChainParams) -> Result<Self, WalletError> {
        let mut file = File::create(path)?;
        file.write_all(&HEADER_MAGIC)?;
        file.write_all(&CURRENT_VERSION.to_le_bytes())?;
        file.write_all(chain.genesis_hash().as_bytes())?;
        file.flush()?;
        Ok(WalletFile { file })
    }

    /// Open an existing wallet file, verify its header against `chain`, and
    /// decode every record that follows it. The loader rejects wrong magic,
    /// wrong genesis, or a version newer than this build supports.
    pub fn open(path: impl AsRef<Path>, chain: &ChainParams) -> Result<(Self, Vec<Record>), WalletError> {
        let mut raw = Vec::new();
        File::open(path.as_ref())?.read_to_end(&mut raw)?;
        if raw.len() < HEADER_LEN {
            return Err(WalletError::RecordCorrupt(
                "wallet file shorter than its header".into(),
            ));
        }
        if raw[0..4] != HEADER_MAGIC {
            return Err(WalletError::BadMagic);
        }
        let version = u32::from_le_bytes(raw[4..8].try_into().unwrap());
        if version > CURRENT_VERSION {
            return Err(WalletError::UnsupportedVersion {
                found: version,
                supported: CURRENT_VERSION,
            });
        }
        let mut genesis = [0u8; 32];
        genesis.copy_from_slice(&raw[8..HEADER_LEN]);
        if Hash256::from_bytes(genesis) != chain.genesis_hash() {
            return Err(WalletError::GenesisMismatch);
        }

        let mut records = Vec::new();
        let mut pos = HEADER_LEN;
        while pos < raw.len() {
            records.push(decode_record(&raw, &mut pos)?);
        }

        let file = OpenOptions::new().append(true).open(path)?;
        Ok((WalletFile { file }, records))
    }

    pub fn append_masterkey(&mut self, xpub: &str) -> Result<(), WalletError> {
        let mut body = Vec::new();
        body.push(REC_MASTERPUBKEY);
        encode_var_str(&mut body, xpub.as_bytes());
        encode_var_str(&mut body, xpub.as_bytes());
        self.append_record(&body)
    }

    pub fn append_addr(&mut self, addr: &WalletAddr) -> Result<(), WalletError> {
        let mut body = Vec::new();
        body.push(REC_ADDR);
        body.extend_from_slice(addr.hash160.as_bytes());
        body.push(addr.addr_type.to_byte());
        body.extend_from_slice(&addr.child_index.to_le_bytes());
        self.append_record(&body)
    }

    pub fn append_tx(&mut self, height: u32, tx_hash: &Hash256, tx: &Tx) -> Result<(), WalletError> {
        let mut body = Vec::new();
        body.push(REC_TX);
        body.extend_from_slice(&height.to_le_bytes());
        body.extend_from_slice(tx_hash.as_bytes());
        body.extend_from_slice(&tx.serialize());
        self.append_record(&body)
    }

    fn append_record(&mut self, body: &[u8]) -> Result<(), WalletError> {
        let mut out = Vec::with_capacity(body.len() + 12);
        out.extend_from_slice(&RECORD_MAGIC);
        encode_var_int(&mut out, body.len() as u64);
        out.extend_from_slice(body);
        self.file.write_all(&out)?;
        self.file.flush()?;
        Ok(())
    }
}

fn decode_record(buf: &[u8], pos: &mut usize) -> Result<Record, WalletError> {
    let magic = buf
        .get(*pos..*pos + 4)
        .ok_or_else(|| WalletError::RecordCorrupt("truncated record magic".into()))?;
    if magic != RECORD_MAGIC {
        return Err(WalletError::RecordCorrupt("bad record magic".into()));
    }
    *pos += 4;

    let rec_len = decode_var_int(buf, pos)
        .map_err(|e| WalletError::RecordCorrupt(e.to_string()))? as usize;
    let body = buf
        .get(*pos..*pos + rec_len)
        .ok_or_else(|| WalletError::RecordCorrupt("truncated record body".into()))?;
    *pos += rec_len;

    let rec_type = *body
        .first()
        .ok_or_else(|| WalletError::RecordCorrupt("empty record body".into()))?;
    let mut body_pos = 1usize;
    match rec_type {
        REC_MASTERPUBKEY => {
            let first = decode_var_str(body, &mut body_pos)
                .map_err(|e| WalletError::RecordCorrupt(e.to_string()))?;
            let second = decode_var_str(body, &mut body_pos)
                .map_err(|e| WalletError::RecordCorrupt(e.to_string()))?;
            if first != second {
                return Err(WalletError::MasterKeyCorrupt);
            }
            let xpub = String::from_utf8(first)
                .map_err(|_| WalletError::RecordCorrupt("masterkey xpub is not valid utf-8".into()))?;
            Ok(Record::MasterPubkey(xpub))
        }
        REC_ADDR => {
            let hash_bytes = body
                .get(body_pos..body_pos + 20)
                .ok_or_else(|| WalletError::RecordCorrupt("truncated addr hash160".into()))?;
            let mut hash160 = [0u8; 20];
            hash160.copy_from_slice(hash_bytes);
            body_pos += 20;

            let type_byte = *body
                .get(body_pos)
                .ok_or_else(|| WalletError::RecordCorrupt("truncated addr type".into()))?;
            let addr_type = AddressType::from_byte(type_byte)
                .ok_or_else(|| WalletError::RecordCorrupt(format!("unknown address type byte 0x{type_byte:02x}")))?;
            body_pos += 1;

            let index_bytes = body
                .get(body_pos..body_pos + 4)
                .ok_or_else(|| WalletError::RecordCorrupt("truncated addr child_index".into()))?;
            let child_index = u32::from_le_bytes(index_bytes.try_into().unwrap());

            Ok(Record::Addr(WalletAddr {
                hash160: Hash160::from_bytes(hash160),
                addr_type,
                child_index,
            }))
        }
        REC_TX => {
            let height_bytes = body
                .get(body_pos..body_pos + 4)
                .ok_or_else(|| WalletError::RecordCorrupt("truncated tx height".into()))?;
            let height = u32::from_le_bytes(height_bytes.try_into().unwrap());
            body_pos += 4;

            let hash_bytes = body
                .get(body_pos..body_pos + 32)
                .ok_or_else(|| WalletError::RecordCorrupt("truncated tx hash".into()))?;
            let mut tx_hash = [0u8; 32];
            tx_hash.copy_from_slice(hash_bytes);
            body_pos += 32;

            let (tx, _) = Tx::deserialize(&body[body_pos..])
                .map_err(|e| WalletError::RecordCorrupt(e.to_string()))?;

            Ok(Record::Tx {
                height,
                tx_hash: Hash256::from_bytes(tx_hash),
                tx,
            })
        }
        other => Err(WalletError::RecordCorrupt(format!(
            "unknown record type 0x{other:02x}"
        ))),
    }
}
