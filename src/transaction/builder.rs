//! In-memory transaction-builder state machine (spec §4.6): an integer-keyed
//! registry of in-progress transactions, mirroring libdogecoin's `such`-CLI
//! workflow (`start_transaction`/`add_utxo`/`add_output`/`finalize_transaction`/
//! `sign_transaction` in `src/cli/such.c`) as an embeddable API instead of a CLI.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};

use once_cell::sync::Lazy;
use parking_lot::Mutex;
use secp256k1::SecretKey;

use crate::chainparams::ChainParams;
use crate::error::TxError;
use crate::key::address::Address;
use crate::key::wif;
use crate::primitives::hash::Hash256;
use crate::script::builder::{build_p2pkh, build_p2sh};
use crate::script::Script;
use crate::transaction::signer::{sign_input, SignResult};
use crate::transaction::sighash::SIGHASH_ALL;
use crate::transaction::tx::{OutPoint, Tx, TxIn, TxOut};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);
static REGISTRY: Lazy<Mutex<HashMap<u64, Tx>>> = Lazy::new(|| Mutex::new(HashMap::new()));

/// Parse a decimal koinu amount string (`"1.5"` -> `150_000_000`), 8 decimal places.
pub fn parse_koinu(amount: &str) -> Result<i64, TxError> {
    const KOINU_PER_COIN: i64 = 100_000_000;
    let mut parts = amount.splitn(2, '.');
    let whole = parts.next().unwrap_or("0");
    let frac = parts.next().unwrap_or("");
    if frac.len() > 8 {
        return Err(TxError::InvalidAmount(amount.to_string()));
    }
    let whole: i64 = whole
        .parse()
        .map_err(|_| TxError::InvalidAmount(amount.to_string()))?;
    let mut frac_padded = frac.to_string();
    while frac_padded.len() < 8 {
        frac_padded.push('0');
    }
    let frac_value: i64 = if frac_padded.is_empty() {
        0
    } else {
        frac_padded
            .parse()
            .map_err(|_| TxError::InvalidAmount(amount.to_string()))?
    };
    Ok(whole * KOINU_PER_COIN + frac_value)
}

fn decode_address_script(address: &str, params: &ChainParams) -> Result<Script, TxError> {
    if let Ok(addr) = Address::from_base58check(address, params) {
        return Ok(build_p2pkh(&addr.0));
    }
    let payload = crate::primitives::base58::decode_check(address)
        .map_err(|e| TxError::Encoding(e.to_string()))?;
    if payload.len() == 21 && payload[0] == params.script_address_prefix {
        let mut hash = [0u8; 20];
        hash.copy_from_slice(&payload[1..]);
        return Ok(build_p2sh(&crate::primitives::hash::Hash160::from_bytes(
            hash,
        )));
    }
    Err(TxError::Address(
        crate::key::address::AddressError::WrongLength(payload.len()),
    ))
}

pub fn start() -> u64 {
    let id = NEXT_ID.fetch_add(1, Ordering::Relaxed);
    REGISTRY.lock().insert(id, Tx::new());
    id
}

pub fn add_utxo(id: u64, prev_txid_hex: &str, vout: u32) -> Result<(), TxError> {
    let mut registry = REGISTRY.lock();
    let tx = registry.get_mut(&id).ok_or(TxError::UnknownHandle(id))?;
    let hash = Hash256::from_display_hex(prev_txid_hex)
        .map_err(|e| TxError::Encoding(e.to_string()))?;
    tx.vin.push(TxIn::new(OutPoint { hash, n: vout }));
    Ok(())
}

pub fn add_output(
    id: u64,
    address: &str,
    amount_str: &str,
    params: &ChainParams,
) -> Result<(), TxError> {
    let mut registry = REGISTRY.lock();
    let tx = registry.get_mut(&id).ok_or(TxError::UnknownHandle(id))?;
    let script_pubkey = decode_address_script(address, params)?;
    let value = parse_koinu(amount_str)?;
    tx.vout.push(TxOut {
        value,
        script_pubkey,
    });
    Ok(())
}

pub fn finalize(
    id: u64,
    change_address: &str,
    fee_str: &str,
    total_in_str: &str,
    params: &ChainParams,
) -> Result<String, TxError> {
    let mut registry = REGISTRY.lock();
    let tx = registry.get_mut(&id).ok_or(TxError::UnknownHandle(id))?;

    let fee = parse_koinu(fee_str)?;
    let total_in = parse_koinu(total_in_str)?;
    let total_out: i64 = tx.vout.iter().map(|o| o.value).sum();
    let change = total_in - total_out - fee;

    if change < 0 {
        return Err(TxError::NotEnoughFunds {
            total_in,
            required: total_out + fee,
        });
    }
    if change > 0 {
        let script_pubkey = decode_address_script(change_address, params)?;
        tx.vout.push(TxOut {
            value: change,
            script_pubkey,
        });
    }

    Ok(hex::encode(tx.serialize()))
}

/// Sign every input whose spent script matches `script_pubkey_hex` with
/// `SIGHASH_ALL`, using the key decoded from `wif`.
pub fn sign(
    id: u64,
    script_pubkey_hex: &str,
    wif_key: &str,
    params: &ChainParams,
) -> Result<Vec<SignResult>, TxError> {
    let subscript_bytes =
        hex::decode(script_pubkey_hex).map_err(|e| TxError::Encoding(e.to_string()))?;
    let subscript = Script::from_bytes(subscript_bytes);
    let (privkey, _compressed): (SecretKey, bool) = wif::decode(wif_key, params)?;

    let mut registry = REGISTRY.lock();
    let tx = registry.get_mut(&id).ok_or(TxError::UnknownHandle(id))?;

    let mut results = Vec::new();
    for i in 0..tx.vin.len() {
        let result = sign_input(tx, &subscript, &privkey, i, SIGHASH_ALL)?;
        results.push(result);
    }
    Ok(results)
}

pub fn get(id: u64) -> Result<Tx, TxError> {
    REGISTRY
        .lock()
        .get(&id)
        .cloned()
        .ok_or(TxError::UnknownHandle(id))
}

pub fn clear(id: u64) {
    REGISTRY.lock().remove(&id);
}

pub fn remove_all() {
    REGISTRY.lock().clear();
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chainparams::Network;

    #[test]
    fn koinu_parsing_handles_fractional_amounts() {
        assert_eq!(parse_koinu("1.5").unwrap(), 150_000_000);
        assert_eq!(parse_koinu("0.00000001").unwrap(), 1);
        assert_eq!(parse_koinu("100").unwrap(), 10_000_000_000);
    }

    #[test]
    fn full_build_and_sign_flow() {
        let params = ChainParams::for_network(Network::Main);
        let privkey = SecretKey::from_slice(&[0x66; 32]).unwrap();
        let pubkey = crate::ecc::global().get_pubkey(&privkey);
        let addr = Address::from_pubkey(&pubkey, true);
        let address_str = addr.to_base58check(&params);

        let id = start();
        add_utxo(id, &"11".repeat(32), 0).unwrap();
        add_output(id, &address_str, "1.0", &params).unwrap();
        let unsigned_hex = finalize(id, &address_str, "0.001", "2.0", &params).unwrap();
        assert!(!unsigned_hex.is_empty());

        let subscript = build_p2pkh(&addr.0);
        let wif_str = wif::encode(&privkey, true, &params);
        let results = sign(id, &hex::encode(subscript.as_bytes()), &wif_str, &params).unwrap();
        assert_eq!(results, vec![SignResult::Ok]);

        clear(id);
        assert!(matches!(get(id), Err(TxError::UnknownHandle(_))));
    }

    #[test]
    fn finalize_fails_when_outputs_exceed_input() {
        let params = ChainParams::for_network(Network::Main);
        let privkey = SecretKey::from_slice(&[0x77; 32]).unwrap();
        let pubkey = crate::ecc::global().get_pubkey(&privkey);
        let addr = Address::from_pubkey(&pubkey, true);
        let address_str = addr.to_base58check(&params);

        let id = start();
        add_utxo(id, &"22".repeat(32), 0).unwrap();
        add_output(id, &address_str, "5.0", &params).unwrap();
        let result = finalize(id, &address_str, "0.001", "1.0", &params);
        assert!(matches!(result, Err(TxError::NotEnoughFunds { .. })));
        clear(id);
    }
}
