//! Error taxonomy shared by every subsystem (see spec §7).
//!
//! Each subsystem gets its own `thiserror` enum; `CoreError` composes them so a
//! caller that doesn't care about the subsystem can still `?` through a single type.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum PrimitiveError {
    #[error("base58check: invalid alphabet character")]
    InvalidAlphabet,
    #[error("base58check: checksum mismatch")]
    ChecksumMismatch,
    #[error("base58check: payload too short")]
    PayloadTooShort,
    #[error("var_int: truncated buffer")]
    Truncated,
}

#[derive(Debug, Error)]
pub enum KeyError {
    #[error("private key scalar out of range")]
    InvalidPrivateKey,
    #[error("public key point is not valid")]
    InvalidPublicKey,
    #[error(transparent)]
    Encoding(#[from] PrimitiveError),
    #[error("wrong WIF version byte: expected 0x{expected:02x}, got 0x{actual:02x}")]
    WrongWifVersion { expected: u8, actual: u8 },
    #[error("wrong address version byte: expected 0x{expected:02x}, got 0x{actual:02x}")]
    WrongAddressVersion { expected: u8, actual: u8 },
    #[error("invalid WIF payload length {0}")]
    InvalidWifLength(usize),
    #[error("cannot derive a hardened child from a neutered (watch-only) node")]
    HardenedFromNeutered,
    #[error("invalid derivation path: {0}")]
    InvalidPath(String),
    #[error("invalid extended key payload")]
    InvalidExtendedKey,
    #[error("wordlist must contain exactly 2048 unique entries, got {0}")]
    InvalidWordlistLength(usize),
    #[error("mnemonic checksum failed")]
    BadMnemonicChecksum,
    #[error("word not found in wordlist: {0}")]
    UnknownWord(String),
    #[error("unsupported entropy length in bits: {0}")]
    InvalidEntropyLength(usize),
    #[error("bip39 crate error: {0}")]
    Bip39(String),
    #[error(transparent)]
    Secp256k1(#[from] secp256k1::Error),
}

#[derive(Debug, Error)]
pub enum ScriptError {
    #[error("script exceeds maximum length of {max} bytes (got {actual})")]
    TooLong { max: usize, actual: usize },
    #[error("push-data length prefix ran past end of script")]
    TruncatedPush,
    #[error("multisig requires 1 <= m <= n <= 16, got m={m} n={n}")]
    InvalidMultisigBounds { m: u8, n: u8 },
}

#[derive(Debug, Error)]
pub enum TxError {
    #[error("transaction/script (de)serialization: {0}")]
    Encoding(String),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error("ECC signing failed")]
    SignatureFailed,
    #[error("script is not a type this signer can produce a scriptSig for")]
    UnknownScriptType,
    #[error("input index out of range: {index} >= {len}")]
    InputIndexOutOfRange { index: usize, len: usize },
    #[error("private key does not match any key referenced by the script (signed anyway)")]
    NoKeyMatch,
    #[error("transaction or subscript malformed")]
    InvalidTxOrScript,
    #[error("insufficient funds: inputs {total_in} < outputs+fee {required}")]
    NotEnoughFunds { total_in: i64, required: i64 },
    #[error("unknown transaction-builder handle {0}")]
    UnknownHandle(u64),
    #[error("invalid amount string: {0}")]
    InvalidAmount(String),
    #[error(transparent)]
    Address(#[from] crate::key::address::AddressError),
}

#[derive(Debug, Error)]
pub enum NetError {
    #[error("message exceeds MAX_PAYLOAD ({max} bytes): {actual}")]
    PayloadTooLarge { max: u32, actual: u32 },
    #[error("bad network magic: expected {expected:08x}, got {actual:08x}")]
    BadMagic { expected: u32, actual: u32 },
    #[error("checksum mismatch on message {command:?}")]
    ChecksumMismatch { command: String },
    #[error("command string is not valid NUL-padded ASCII")]
    BadCommand,
    #[error("message buffer truncated while parsing {0}")]
    Truncated(&'static str),
    #[error("peer violated protocol: {0}")]
    ProtocolViolation(String),
    #[error("peer {0} timed out")]
    PeerTimeout(String),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}

#[derive(Debug, Error)]
pub enum SpvError {
    #[error("header's prev_block is not connected to any known chain tip")]
    HeadersNotConnected,
    #[error(transparent)]
    Net(#[from] NetError),
    #[error("headers database error: {0}")]
    HeadersDb(String),
    #[error("no connected peers available")]
    NoPeers,
}

#[derive(Debug, Error)]
pub enum WalletError {
    #[error("wallet file has wrong magic bytes")]
    BadMagic,
    #[error("wallet file version {found} is newer than supported version {supported}")]
    UnsupportedVersion { found: u32, supported: u32 },
    #[error("wallet file genesis hash does not match the configured chain")]
    GenesisMismatch,
    #[error("master public key is already set for this wallet")]
    MasterKeyAlreadySet,
    #[error("master public key has not been set yet")]
    MasterKeyNotSet,
    #[error("masterkey record corrupt: duplicate xpub copies disagree")]
    MasterKeyCorrupt,
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Io(#[from] std::io::Error),
    #[error("record framing corrupt: {0}")]
    RecordCorrupt(String),
    #[error(transparent)]
    Address(#[from] crate::key::address::AddressError),
}

#[derive(Debug, Error)]
pub enum CoreError {
    #[error(transparent)]
    Primitive(#[from] PrimitiveError),
    #[error(transparent)]
    Key(#[from] KeyError),
    #[error(transparent)]
    Script(#[from] ScriptError),
    #[error(transparent)]
    Tx(#[from] TxError),
    #[error(transparent)]
    Net(#[from] NetError),
    #[error(transparent)]
    Spv(#[from] SpvError),
    #[error(transparent)]
    Wallet(#[from] WalletError),
}
