//! Dogecoin client library core: key derivation, transaction construction and
//! signing, and an SPV node (spec §1). See `DESIGN.md` for how each module maps
//! back to its grounding source.
//!
//! This crate is a library only; it has no binary entry point. Front-ends (CLI,
//! GUI, mobile bindings) are out of scope.

pub mod chainparams;
pub mod ecc;
pub mod error;
pub mod key;
pub mod p2p;
pub mod primitives;
pub mod script;
pub mod spv;
pub mod transaction;
pub mod wallet;

pub use chainparams::{ChainParams, Network};
pub use error::CoreError;
