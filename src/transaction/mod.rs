//! Transaction model, legacy sighash, input signer, and the in-memory
//! transaction-builder state machine (spec §4.5–§4.6).

pub mod builder;
pub mod sighash;
pub mod signer;
pub mod tx;

pub use signer::{sign_input, SignResult};
pub use tx::{OutPoint, Tx, TxIn, TxOut};
