//! Chain parameters: immutable, process-lifetime records of network constants
//! (spec §3 `ChainParams`). Values are transcribed field-for-field from
//! `dogecoin_chain_main`/`_test`/`_regt` in libdogecoin's `chain.h`.

use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

use crate::primitives::Hash256;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Network {
    Main,
    Testnet,
    Regtest,
}

/// A single checkpoint: `{height, block-hash, timestamp}` (spec §3).
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: u32,
    pub hash: Hash256,
    pub timestamp: u32,
}

fn checkpoint(height: u32, hash_hex: &str, timestamp: u32) -> Checkpoint {
    Checkpoint {
        height,
        hash: Hash256::from_display_hex(hash_hex)
            .expect("checkpoint hash literal is well-formed 32-byte hex"),
        timestamp,
    }
}

/// `dogecoin_mainnet_checkpoint_array` transcribed from the original's
/// `chain.c` (spec §3 `ChainParams.checkpoints`).
static MAINNET_CHECKPOINTS: Lazy<Vec<Checkpoint>> = Lazy::new(|| {
    vec![
        checkpoint(
            0,
            "1a91e3dace36e2be3bf030a65679fe821aa1d6ef92e7c9902eb318182c355691",
            1386325540,
        ),
        checkpoint(
            42279,
            "8444c3ef39a46222e87584ef956ad2c9ef401578bd8b51e8e4b9a86ec3134d3",
            1386949376,
        ),
        checkpoint(
            42400,
            "557bb7c17ed9e6d6a5a92bb8d72f2538e98b5ea12dc89dc7b6f7e8b8aefef52",
            1386958561,
        ),
        checkpoint(
            104679,
            "35eb87ae90d44b98898fec8c39577b76cb1eb08e1261cfc10706c8ce9a1d01cf",
            1388558699,
        ),
        checkpoint(
            145000,
            "cc47cae70d3c128fb2fa94e3a6c99280a3e86e8dd0d254b97d40d94ce4a6318f",
            1389606633,
        ),
        checkpoint(
            371337,
            "60c9f919f9b271add6ef5671e4b4caf163f7e774eff02d9675acbbc1fac51f1",
            1395655003,
        ),
        checkpoint(
            450000,
            "d279277f8f846a224d776450aa04da3cf978991a182c6f3075db4c48b735c5f",
            1397704543,
        ),
    ]
});

/// `dogecoin_testnet_checkpoint_array` transcribed from the original's
/// `chain.c` (spec §3 `ChainParams.checkpoints`).
static TESTNET_CHECKPOINTS: Lazy<Vec<Checkpoint>> = Lazy::new(|| {
    vec![
        checkpoint(
            0,
            "bb0a78264637406b6360aad926284d544d7049f45a94b8d171e0d655a0b6a3e",
            1391503289,
        ),
        checkpoint(
            483173,
            "a804201ca0aceb7e937ef7a3c613a9b7589245b10cc095148c4ae8847268a1d",
            1420496029,
        ),
        checkpoint(
            591117,
            "5f6b93b2c28cedf32467d00a8a000a517f875734d17f0d52e6d7b12d2d8dcb6",
            1426963489,
        ),
    ]
});

#[derive(Debug, Clone, Copy)]
pub struct ChainParams {
    pub network: Network,
    pub chain_name: &'static str,

    pub pubkey_address_prefix: u8,
    pub script_address_prefix: u8,
    pub secret_key_prefix: u8,

    pub bip32_privkey_magic: u32,
    pub bip32_pubkey_magic: u32,

    /// SLIP-44 coin type used by `m/44'/coin_type'/...` derivation (3 = Dogecoin).
    pub bip44_coin_type: u32,

    /// Network magic bytes, little-endian on the wire (spec §6).
    pub net_magic: [u8; 4],

    pub default_port: u16,
}

impl ChainParams {
    pub const fn main() -> Self {
        ChainParams {
            network: Network::Main,
            chain_name: "main",
            pubkey_address_prefix: 0x1e,
            script_address_prefix: 0x16,
            secret_key_prefix: 0x9e,
            bip32_privkey_magic: 0x02fac398,
            bip32_pubkey_magic: 0x02facafd,
            bip44_coin_type: 3,
            net_magic: [0xc0, 0xc0, 0xc0, 0xc0],
            default_port: 22556,
        }
    }

    pub const fn testnet() -> Self {
        ChainParams {
            network: Network::Testnet,
            chain_name: "testnet3",
            pubkey_address_prefix: 0x71,
            script_address_prefix: 0xc4,
            secret_key_prefix: 0xf1,
            bip32_privkey_magic: 0x04358394,
            bip32_pubkey_magic: 0x043587cf,
            bip44_coin_type: 1,
            net_magic: [0xfc, 0xc1, 0xb7, 0xdc],
            default_port: 44556,
        }
    }

    pub const fn regtest() -> Self {
        ChainParams {
            network: Network::Regtest,
            chain_name: "regtest",
            pubkey_address_prefix: 0x6f,
            script_address_prefix: 0xc4,
            secret_key_prefix: 0xef,
            bip32_privkey_magic: 0x04358394,
            bip32_pubkey_magic: 0x043587cf,
            bip44_coin_type: 1,
            net_magic: [0xfa, 0xbf, 0xb5, 0xda],
            default_port: 18444,
        }
    }

    pub const fn for_network(network: Network) -> Self {
        match network {
            Network::Main => Self::main(),
            Network::Testnet => Self::testnet(),
            Network::Regtest => Self::regtest(),
        }
    }

    /// Genesis block hash, display order (big-endian hex), per spec §8 scenario 1.
    pub fn genesis_hash(&self) -> Hash256 {
        match self.network {
            Network::Main => Hash256::from_display_hex(
                "1a91e3dace36e2be3bf030a65679fe821aa1d6ef92e7c9902eb318182c355691",
            )
            .expect("mainnet genesis hash literal is well-formed 32-byte hex"),
            Network::Testnet => Hash256::from_display_hex(
                "bb0a78264637406b6360aad926284d544d7049f45a94b8d171e0d655a0b6a3e",
            )
            .expect("testnet genesis hash literal is well-formed 32-byte hex"),
            Network::Regtest => Hash256::from_display_hex(
                "3d2160a3b5dc4a9d62e7e66a295f70313ac808440ef7400d6c0772171ce973a",
            )
            .expect("regtest genesis hash literal is well-formed 32-byte hex"),
        }
    }

    pub fn dns_seeds(&self) -> &'static [&'static str] {
        match self.network {
            Network::Main => &[
                "seed.multidoge.org",
                "seed2.multidoge.org",
                "seed.doger.dogecoin.com",
            ],
            Network::Testnet => &["testseed.jrn2.net"],
            Network::Regtest => &[],
        }
    }

    pub fn checkpoints(&self) -> &'static [Checkpoint] {
        match self.network {
            Network::Main => &MAINNET_CHECKPOINTS,
            Network::Testnet => &TESTNET_CHECKPOINTS,
            // Regtest intentionally ships no checkpoints: fast-start sync only
            // matters on a chain with real history.
            Network::Regtest => &[],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_prefixes_match_libdogecoin_constants() {
        let main = ChainParams::main();
        assert_eq!(main.pubkey_address_prefix, 0x1e);
        assert_eq!(main.script_address_prefix, 0x16);
        assert_eq!(main.secret_key_prefix, 0x9e);
        assert_eq!(main.bip32_privkey_magic, 0x02fac398);
        assert_eq!(main.bip32_pubkey_magic, 0x02facafd);
        assert_eq!(main.net_magic, [0xc0, 0xc0, 0xc0, 0xc0]);

        let test = ChainParams::testnet();
        assert_eq!(test.pubkey_address_prefix, 0x71);
        assert_eq!(test.script_address_prefix, 0xc4);
        assert_eq!(test.secret_key_prefix, 0xf1);
        assert_eq!(test.net_magic, [0xfc, 0xc1, 0xb7, 0xdc]);

        let regt = ChainParams::regtest();
        assert_eq!(regt.pubkey_address_prefix, 0x6f);
        assert_eq!(regt.script_address_prefix, 0xc4);
        assert_eq!(regt.secret_key_prefix, 0xef);
        assert_eq!(regt.net_magic, [0xfa, 0xbf, 0xb5, 0xda]);
    }

    #[test]
    fn genesis_hashes_differ_across_networks() {
        let main = ChainParams::main().genesis_hash();
        let test = ChainParams::testnet().genesis_hash();
        let regt = ChainParams::regtest().genesis_hash();
        assert_ne!(main, test);
        assert_ne!(main, regt);
        assert_ne!(test, regt);
        assert_ne!(main, Hash256::ZERO);
        assert_ne!(test, Hash256::ZERO);
        assert_ne!(regt, Hash256::ZERO);
    }

    #[test]
    fn mainnet_and_testnet_checkpoints_are_height_ordered_and_nonempty() {
        for params in [ChainParams::main(), ChainParams::testnet()] {
            let checkpoints = params.checkpoints();
            assert!(!checkpoints.is_empty());
            assert!(checkpoints.windows(2).all(|w| w[0].height < w[1].height));
        }
        assert!(ChainParams::regtest().checkpoints().is_empty());
    }
}
