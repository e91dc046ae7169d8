//! BIP44 derivation path parsing: `m / purpose' / coin_type' / account' / change / index`
//! (spec §4.3). Dogecoin mainnet uses `m/44'/3'/0'/0/i`.

use crate::error::KeyError;

pub const HARDENED_OFFSET: u32 = 0x8000_0000;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ChildNumber(pub u32);

impl ChildNumber {
    pub fn normal(index: u32) -> Self {
        ChildNumber(index)
    }

    pub fn hardened(index: u32) -> Self {
        ChildNumber(index | HARDENED_OFFSET)
    }

    pub fn is_hardened(&self) -> bool {
        self.0 & HARDENED_OFFSET != 0
    }

    /// The index with the hardened bit stripped, as shown in `N'` notation.
    pub fn index(&self) -> u32 {
        self.0 & !HARDENED_OFFSET
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DerivationPath(pub Vec<ChildNumber>);

impl DerivationPath {
    pub fn bip44(coin_type: u32, account: u32, change: u32, index: u32) -> Self {
        DerivationPath(vec![
            ChildNumber::hardened(44),
            ChildNumber::hardened(coin_type),
            ChildNumber::hardened(account),
            ChildNumber::normal(change),
            ChildNumber::normal(index),
        ])
    }

    /// Parse `m/44'/3'/0'/0/5` (or `h` in place of `'`); an empty path after `m`
    /// denotes the master node itself.
    pub fn parse(s: &str) -> Result<Self, KeyError> {
        let mut parts = s.split('/');
        match parts.next() {
            Some("m") => {}
            _ => return Err(KeyError::InvalidPath(s.to_string())),
        }

        let mut children = Vec::new();
        for part in parts {
            if part.is_empty() {
                return Err(KeyError::InvalidPath(s.to_string()));
            }
            let (digits, hardened) = if let Some(stripped) = part
                .strip_suffix('\'')
                .or_else(|| part.strip_suffix('h'))
                .or_else(|| part.strip_suffix('H'))
            {
                (stripped, true)
            } else {
                (part, false)
            };
            let index: u32 = digits
                .parse()
                .map_err(|_| KeyError::InvalidPath(s.to_string()))?;
            if index >= HARDENED_OFFSET {
                return Err(KeyError::InvalidPath(s.to_string()));
            }
            children.push(if hardened {
                ChildNumber::hardened(index)
            } else {
                ChildNumber::normal(index)
            });
        }
        Ok(DerivationPath(children))
    }

    pub fn iter(&self) -> impl Iterator<Item = &ChildNumber> {
        self.0.iter()
    }
}
