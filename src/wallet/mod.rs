//! HD address book, wtx store, and balance computation for a single wallet
//! (spec §3 "Wallet state", §4.6). On-disk encoding lives in [`file`].
//!
//! A wallet never talks to the network or the headers database directly —
//! an embedder wires `offer_transaction` into the SPV client's per-block
//! transaction callback, keeping the wallet testable in isolation.

pub mod file;

use std::collections::{BTreeMap, HashSet};
use std::path::Path;

use crate::chainparams::ChainParams;
use crate::error::WalletError;
use crate::key::address::Address;
use crate::key::hdnode::HDNode;
use crate::key::path::DerivationPath;
use crate::primitives::hash::{Hash160, Hash256};
use crate::script::classify::{classify, get_ops, ScriptType};
use crate::script::Script;
use crate::transaction::tx::{OutPoint, Tx};
use tracing::debug;

/// A coinbase wtx only contributes to balance once
/// `best_block_height >= wtx.height + COINBASE_MATURITY` (spec §4.6).
pub const COINBASE_MATURITY: u32 = 100;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AddressType {
    /// Derived from the wallet's own master key at `m/44'/3'/0'/0/child_index`.
    Hd,
    /// Imported via `add_watch_address`; not part of the HD chain.
    Watch,
}

impl AddressType {
    fn to_byte(self) -> u8 {
        match self {
            AddressType::Hd => 0,
            AddressType::Watch => 1,
        }
    }

    fn from_byte(b: u8) -> Option<Self> {
        match b {
            0 => Some(AddressType::Hd),
            1 => Some(AddressType::Watch),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct WalletAddr {
    pub hash160: Hash160,
    pub addr_type: AddressType,
    pub child_index: u32,
}

/// A transaction the wallet has decided to track, with its txid memoized
/// (spec.md's `tx_hash_cache`).
#[derive(Debug, Clone)]
pub struct WTx {
    pub tx: Tx,
    pub height: u32,
    pub block_hash: Hash256,
    txid: Hash256,
    pub ignore: bool,
}

impl WTx {
    pub fn new(tx: Tx, height: u32, block_hash: Hash256) -> Self {
        let txid = tx.txid();
        WTx {
            tx,
            height,
            block_hash,
            txid,
            ignore: false,
        }
    }

    pub fn txid(&self) -> Hash256 {
        self.txid
    }
}

pub struct Wallet {
    chain: ChainParams,
    master_key: Option<HDNode>,
    /// Keyed by hash160 rather than insertion order, matching the original's
    /// red-black tree (spec §9 REDESIGN FLAGS item 3): `BTreeMap` gives the
    /// same ascending-by-key iteration for free.
    hdaddrs: BTreeMap<Hash160, WalletAddr>,
    wtxes: BTreeMap<Hash256, WTx>,
    spends: HashSet<OutPoint>,
    next_child_index: u32,
    best_block_height: u32,
    file: Option<file::WalletFile>,
}

impl Wallet {
    /// An unpersisted wallet. Useful for embedders that manage their own
    /// storage, or for tests.
    pub fn new_in_memory(chain: ChainParams) -> Self {
        Wallet {
            chain,
            master_key: None,
            hdaddrs: BTreeMap::new(),
            wtxes: BTreeMap::new(),
            spends: HashSet::new(),
            next_child_index: 0,
            best_block_height: 0,
            file: None,
        }
    }

    /// Create a new wallet file and write its header (spec §6).
    pub fn create(path: impl AsRef<Path>, chain: ChainParams) -> Result<Self, WalletError> {
        let file = file::WalletFile::create(path, &chain)?;
        let mut wallet = Self::new_in_memory(chain);
        wallet.file = Some(file);
        Ok(wallet)
    }

    /// Open an existing wallet file, verify its header, and replay every
    /// record to rebuild in-memory state (spec §6).
    pub fn load(path: impl AsRef<Path>, chain: ChainParams) -> Result<Self, WalletError> {
        let (file, records) = file::WalletFile::open(path, &chain)?;
        let mut wallet = Self::new_in_memory(chain);
        wallet.file = Some(file);
        for record in records {
            wallet.replay_record(record)?;
        }
        Ok(wallet)
    }

    fn replay_record(&mut self, record: file::Record) -> Result<(), WalletError> {
        match record {
            file::Record::MasterPubkey(xpub) => {
                let node = HDNode::from_extended(&xpub, &self.chain)?;
                self.master_key = Some(node);
            }
            file::Record::Addr(addr) => {
                self.next_child_index = self.next_child_index.max(addr.child_index.saturating_add(1));
                self.hdaddrs.insert(addr.hash160, addr);
            }
            file::Record::Tx {
                height,
                tx_hash,
                tx,
            } => {
                // block_hash isn't part of the on-disk TX record; a replayed
                // wtx carries a zeroed one until the node re-observes it.
                let wtx = WTx::new(tx, height, Hash256::ZERO);
                if wtx.txid() != tx_hash {
                    return Err(WalletError::RecordCorrupt(
                        "tx record hash does not match its serialized transaction".into(),
                    ));
                }
                self.insert_wtx(wtx, false)?;
            }
        }
        Ok(())
    }

    /// `set_master_key(xpub)` (spec §4.6): immutable once set for a wallet file.
    ///
    /// Accepts either an extended private or public key; `next_addr` needs
    /// the private key to derive the hardened BIP44 components, so an
    /// embedder that wants to spend must pass an xprv. Only the public
    /// serialization is ever written to disk, matching
    /// `dogecoin_wallet_set_master_key_copy`'s use of
    /// `dogecoin_hdnode_serialize_public` regardless of what it was handed.
    pub fn set_master_key(&mut self, extended_key: &str) -> Result<(), WalletError> {
        if self.master_key.is_some() {
            return Err(WalletError::MasterKeyAlreadySet);
        }
        let node = HDNode::from_extended(extended_key, &self.chain)?;
        let xpub = node.to_extended_public(&self.chain);
        if let Some(file) = self.file.as_mut() {
            file.append_masterkey(&xpub)?;
        }
        self.master_key = Some(node);
        Ok(())
    }

    /// Derive `m/44'/3'/0'/0/next_child_index` from the master, store the
    /// resulting address, and advance the counter (spec §4.6). Requires a
    /// master key with its private key intact: account and change are
    /// hardened/non-hardened components of the same BIP44 path derived in
    /// one shot, matching `derive_bip44_extended_private_key`.
    pub fn next_addr(&mut self) -> Result<Address, WalletError> {
        let master = self.master_key.as_ref().ok_or(WalletError::MasterKeyNotSet)?;
        let path = DerivationPath::bip44(self.chain.bip44_coin_type, 0, 0, self.next_child_index);
        let child = master.derive_path(&path)?;
        let address = Address::from_pubkey(&child.public_key, true);
        let record = WalletAddr {
            hash160: address.0,
            addr_type: AddressType::Hd,
            child_index: self.next_child_index,
        };
        if let Some(file) = self.file.as_mut() {
            file.append_addr(&record)?;
        }
        self.hdaddrs.insert(record.hash160, record);
        self.next_child_index += 1;
        Ok(address)
    }

    /// Decode a P2PKH address and track it outside the HD chain. Idempotent
    /// (spec §4.6).
    pub fn add_watch_address(&mut self, p2pkh: &str) -> Result<(), WalletError> {
        let address = Address::from_base58check(p2pkh, &self.chain)?;
        if self.hdaddrs.contains_key(&address.0) {
            return Ok(());
        }
        let record = WalletAddr {
            hash160: address.0,
            addr_type: AddressType::Watch,
            child_index: 0,
        };
        if let Some(file) = self.file.as_mut() {
            file.append_addr(&record)?;
        }
        self.hdaddrs.insert(record.hash160, record);
        Ok(())
    }

    /// True iff any output's classified script yields a hash160 present in
    /// the address map (spec §4.6).
    pub fn is_mine(&self, tx: &Tx) -> bool {
        tx.vout
            .iter()
            .any(|out| self.script_hash160(&out.script_pubkey).is_some())
    }

    fn script_hash160(&self, script: &Script) -> Option<Hash160> {
        let script_type = classify(script).ok()?;
        let idx = match script_type {
            ScriptType::PubkeyHash => 2,
            ScriptType::ScriptHash => 1,
            _ => return None,
        };
        let ops = get_ops(script).ok()?;
        let data = ops.get(idx)?.data.as_ref()?;
        if data.len() != 20 {
            return None;
        }
        let mut bytes = [0u8; 20];
        bytes.copy_from_slice(data);
        let hash = Hash160::from_bytes(bytes);
        self.hdaddrs.contains_key(&hash).then_some(hash)
    }

    /// Sum of values of our outputs consumed by `tx.vin`; an input whose
    /// producing wtx isn't known contributes nothing (spec §4.6).
    pub fn get_debit(&self, tx: &Tx) -> i64 {
        tx.vin
            .iter()
            .filter_map(|vin| {
                let wtx = self.wtxes.get(&vin.prevout.hash)?;
                if wtx.ignore {
                    return None;
                }
                let out = wtx.tx.vout.get(vin.prevout.n as usize)?;
                self.script_hash160(&out.script_pubkey).map(|_| out.value)
            })
            .sum()
    }

    /// Cache `tx_hash`, tombstone any prior entry at the same txid, record
    /// every consumed outpoint in `spends`, and persist a tx record (spec
    /// §4.6).
    pub fn add_wtx(&mut self, tx: Tx, height: u32, block_hash: Hash256) -> Result<(), WalletError> {
        self.insert_wtx(WTx::new(tx, height, block_hash), true)
    }

    fn insert_wtx(&mut self, wtx: WTx, persist: bool) -> Result<(), WalletError> {
        let txid = wtx.txid();
        if let Some(prior) = self.wtxes.get_mut(&txid) {
            prior.ignore = true;
        }
        for vin in &wtx.tx.vin {
            self.spends.insert(vin.prevout.clone());
        }
        if persist {
            if let Some(file) = self.file.as_mut() {
                file.append_tx(wtx.height, &txid, &wtx.tx)?;
            }
        }
        self.wtxes.insert(txid, wtx);
        Ok(())
    }

    /// Classify `tx` and, if it is ours or spends one of our known outputs,
    /// store it as a wtx. Returns whether it was relevant. This is what an
    /// embedder wires into the SPV client's per-block transaction callback
    /// (spec §2: "each transaction in an accepted block is offered to the
    /// wallet, which classifies it and stores matching wtx records").
    pub fn offer_transaction(
        &mut self,
        tx: &Tx,
        height: u32,
        block_hash: Hash256,
    ) -> Result<bool, WalletError> {
        let spends_ours = tx.vin.iter().any(|vin| {
            self.wtxes
                .get(&vin.prevout.hash)
                .map(|wtx| !wtx.ignore)
                .unwrap_or(false)
        });
        let relevant = self.is_mine(tx) || spends_ours;
        if relevant {
            let txid = tx.txid();
            self.add_wtx(tx.clone(), height, block_hash)?;
            debug!(%txid, height, "wallet tracking tx");
        }
        Ok(relevant)
    }

    /// Sum over known wtxes of "available credit": outputs that are ours,
    /// not in `spends`, and (for coinbases) mature relative to
    /// `best_block_height` (spec §4.6).
    pub fn get_balance(&self) -> i64 {
        self.wtxes.values().map(|wtx| self.credit(wtx)).sum()
    }

    fn credit(&self, wtx: &WTx) -> i64 {
        if wtx.ignore {
            return 0;
        }
        if wtx.tx.is_coinbase() && self.best_block_height < wtx.height.saturating_add(COINBASE_MATURITY) {
            return 0;
        }
        let txid = wtx.txid();
        wtx.tx
            .vout
            .iter()
            .enumerate()
            .filter(|(n, out)| {
                self.script_hash160(&out.script_pubkey).is_some()
                    && !self.spends.contains(&OutPoint {
                        hash: txid,
                        n: *n as u32,
                    })
            })
            .map(|(_, out)| out.value)
            .sum()
    }

    pub fn set_best_block_height(&mut self, height: u32) {
        self.best_block_height = height;
    }

    pub fn best_block_height(&self) -> u32 {
        self.best_block_height
    }
}
