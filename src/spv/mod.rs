//! SPV node subsystem (spec §3/§4.8): header sync state machine, the headers
//! database contract, and their in-memory/file-backed implementations.

pub mod client;
pub mod headers_db;

pub use client::{ClientState, SpvClient};
pub use headers_db::{BlockIndex, ConnectOutcome, HeadersDb, MemoryHeadersDb, SledHeadersDb};
