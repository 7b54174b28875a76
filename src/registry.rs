//! Coin Registry
//!
//! Maps a coin identifier to its protocol family, display decimals and
//! network parameters. Built once at startup and passed to the handlers.

use crate::error::{RecoveryError, RecoveryResult};

/// SIGHASH_FORKID flag used by Bitcoin Cash replay protection
pub const SIGHASH_FORKID: u32 = 0x40;

const STELLAR_PUBLIC_PASSPHRASE: &str = "Public Global Stellar Network ; September 2015";
const STELLAR_TEST_PASSPHRASE: &str = "Test SDF Network ; September 2015";

/// Zcash Sapling consensus branch id
pub const SAPLING_BRANCH_ID: u32 = 0x76b8_09bb;

/// Wire layout of a chain's transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TxFormat {
    Bitcoin,
    /// Zcash v4, transparent parts only
    Sapling { branch_id: u32 },
}

/// Address and sighash rules for a UTXO chain
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UtxoNetwork {
    pub name: &'static str,
    pub p2pkh_prefix: &'static [u8],
    pub p2sh_prefix: &'static [u8],
    pub bech32_hrp: Option<&'static str>,
    /// Set for chains that commit to the spent amount with SIGHASH_FORKID
    pub fork_id: Option<u32>,
    pub format: TxFormat,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccountParams {
    /// Token transfers show the raw payload amount
    pub token_transfer: bool,
    /// Used when the transaction does not carry its own chain id
    pub default_chain_id: u64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PaymentParams {
    pub network_passphrase: &'static str,
}

/// Protocol family, one handler per variant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Protocol {
    Utxo(UtxoNetwork),
    Account(AccountParams),
    Ledger,
    Payment(PaymentParams),
}

impl Protocol {
    pub fn family_name(&self) -> &'static str {
        match self {
            Protocol::Utxo(_) => "utxo",
            Protocol::Account(_) => "account",
            Protocol::Ledger => "ledger",
            Protocol::Payment(_) => "payment",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoinSpec {
    pub coin: &'static str,
    /// Display decimals; `None` when the amount is shown as a raw integer
    pub decimals: Option<u32>,
    pub protocol: Protocol,
}

/// Immutable coin table
#[derive(Debug, Clone)]
pub struct CoinRegistry {
    coins: Vec<CoinSpec>,
}

impl CoinRegistry {
    pub fn new(coins: Vec<CoinSpec>) -> Self {
        Self { coins }
    }

    /// The fixed set of coins this tool can recover
    pub fn standard() -> Self {
        let utxo = |coin, network| CoinSpec {
            coin,
            decimals: Some(8),
            protocol: Protocol::Utxo(network),
        };
        let account = |coin, decimals, token_transfer, default_chain_id| CoinSpec {
            coin,
            decimals,
            protocol: Protocol::Account(AccountParams { token_transfer, default_chain_id }),
        };
        let payment = |coin, network_passphrase| CoinSpec {
            coin,
            decimals: Some(7),
            protocol: Protocol::Payment(PaymentParams { network_passphrase }),
        };

        Self::new(vec![
            utxo("btc", networks::BITCOIN),
            utxo("tbtc", networks::BITCOIN_TESTNET),
            utxo("ltc", networks::LITECOIN),
            // test litecoin recoveries are built on mainnet parameters
            utxo("tltc", networks::LITECOIN),
            utxo("bch", networks::BITCOIN_CASH),
            utxo("tbch", networks::BITCOIN_CASH_TESTNET),
            utxo("dash", networks::DASH),
            utxo("tdash", networks::DASH_TESTNET),
            utxo("zec", networks::ZCASH),
            account("eth", Some(18), false, 1),
            account("teth", Some(18), false, 17000),
            account("erc20", None, true, 1),
            account("terc20", None, true, 17000),
            CoinSpec { coin: "xrp", decimals: Some(6), protocol: Protocol::Ledger },
            CoinSpec { coin: "txrp", decimals: Some(6), protocol: Protocol::Ledger },
            payment("xlm", STELLAR_PUBLIC_PASSPHRASE),
            payment("txlm", STELLAR_TEST_PASSPHRASE),
        ])
    }

    /// Look up a coin; unknown identifiers fail with `UnsupportedCoin`
    pub fn resolve(&self, coin: &str) -> RecoveryResult<&CoinSpec> {
        self.coins
            .iter()
            .find(|spec| spec.coin == coin)
            .ok_or_else(|| RecoveryError::unsupported_coin(coin))
    }
}

impl Default for CoinRegistry {
    fn default() -> Self {
        Self::standard()
    }
}

/// UTXO network parameter sets
pub mod networks {
    use super::{TxFormat, UtxoNetwork, SAPLING_BRANCH_ID, SIGHASH_FORKID};

    pub const BITCOIN: UtxoNetwork = UtxoNetwork {
        name: "bitcoin",
        p2pkh_prefix: &[0x00],
        p2sh_prefix: &[0x05],
        bech32_hrp: Some("bc"),
        fork_id: None,
        format: TxFormat::Bitcoin,
    };

    pub const BITCOIN_TESTNET: UtxoNetwork = UtxoNetwork {
        name: "testnet",
        p2pkh_prefix: &[0x6f],
        p2sh_prefix: &[0xc4],
        bech32_hrp: Some("tb"),
        fork_id: None,
        format: TxFormat::Bitcoin,
    };

    pub const LITECOIN: UtxoNetwork = UtxoNetwork {
        name: "litecoin",
        p2pkh_prefix: &[0x30],
        p2sh_prefix: &[0x32],
        bech32_hrp: Some("ltc"),
        fork_id: None,
        format: TxFormat::Bitcoin,
    };

    pub const BITCOIN_CASH: UtxoNetwork = UtxoNetwork {
        name: "bitcoincash",
        p2pkh_prefix: &[0x00],
        p2sh_prefix: &[0x05],
        bech32_hrp: None,
        fork_id: Some(SIGHASH_FORKID),
        format: TxFormat::Bitcoin,
    };

    pub const BITCOIN_CASH_TESTNET: UtxoNetwork = UtxoNetwork {
        name: "bitcoincash-testnet",
        p2pkh_prefix: &[0x6f],
        p2sh_prefix: &[0xc4],
        bech32_hrp: None,
        fork_id: Some(SIGHASH_FORKID),
        format: TxFormat::Bitcoin,
    };

    pub const DASH: UtxoNetwork = UtxoNetwork {
        name: "dash",
        p2pkh_prefix: &[0x4c],
        p2sh_prefix: &[0x10],
        bech32_hrp: None,
        fork_id: None,
        format: TxFormat::Bitcoin,
    };

    pub const DASH_TESTNET: UtxoNetwork = UtxoNetwork {
        name: "dash-testnet",
        p2pkh_prefix: &[0x8c],
        p2sh_prefix: &[0x13],
        bech32_hrp: None,
        fork_id: None,
        format: TxFormat::Bitcoin,
    };

    pub const ZCASH: UtxoNetwork = UtxoNetwork {
        name: "zcash",
        p2pkh_prefix: &[0x1c, 0xb8],
        p2sh_prefix: &[0x1c, 0xbd],
        bech32_hrp: None,
        fork_id: None,
        format: TxFormat::Sapling { branch_id: SAPLING_BRANCH_ID },
    };
}
