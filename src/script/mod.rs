//! Script classification and construction (spec §4.5).

pub mod builder;
pub mod classify;
pub mod opcodes;

pub use builder::Script;
pub use classify::{classify, ScriptOp, ScriptType};
