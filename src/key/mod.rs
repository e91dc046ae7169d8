//! Key management subsystem (spec §4.2–§4.4): private/public keys, WIF, BIP32 HD
//! nodes, BIP39 mnemonics, and P2PKH addresses.

pub mod address;
pub mod hdnode;
pub mod mnemonic;
pub mod path;
pub mod wif;

pub use address::Address;
pub use hdnode::HDNode;
pub use path::DerivationPath;
