//! Output script → address rendering for any configured UTXO network

use bech32::{ToBase32, Variant};
use bitcoin::Script;
use bs58::Alphabet;

use crate::error::{RecoveryError, RecoveryResult};
use crate::registry::UtxoNetwork;
use crate::utils::encoding::base58check_encode;

/// Render an output script the way the network's wallets display it.
/// Scripts with no address form (bare multisig, OP_RETURN, …) are rejected.
pub fn address_from_script(script: &Script, network: &UtxoNetwork) -> RecoveryResult<String> {
    let bytes = script.as_bytes();

    if script.is_p2pkh() {
        return Ok(base58check_encode(network.p2pkh_prefix, &bytes[3..23], Alphabet::BITCOIN));
    }

    if script.is_p2sh() {
        return Ok(base58check_encode(network.p2sh_prefix, &bytes[2..22], Alphabet::BITCOIN));
    }

    if let Some(version) = script.witness_version().filter(|_| script.is_witness_program()) {
        let hrp = network.bech32_hrp.ok_or_else(|| {
            RecoveryError::malformed_transaction(format!(
                "{} has no address form for witness output {}",
                network.name,
                script.to_hex_string()
            ))
        })?;
        return encode_segwit(hrp, version.to_num(), &bytes[2..]);
    }

    Err(RecoveryError::malformed_transaction(format!(
        "{} has no matching address for output script {}",
        network.name,
        script.to_hex_string()
    )))
}

fn encode_segwit(hrp: &str, version: u8, program: &[u8]) -> RecoveryResult<String> {
    let witness_version = bech32::u5::try_from_u8(version)
        .map_err(|e| RecoveryError::malformed_transaction(format!("witness version {}: {}", version, e)))?;

    let mut data = Vec::with_capacity(1 + program.len() * 8 / 5 + 1);
    data.push(witness_version);
    data.extend(program.to_base32());

    // BIP350: v0 keeps bech32, v1+ uses bech32m
    let variant = if version == 0 { Variant::Bech32 } else { Variant::Bech32m };
    bech32::encode(hrp, data, variant)
        .map_err(|e| RecoveryError::malformed_transaction(format!("bech32 encoding failed: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::networks;
    use bitcoin::hashes::Hash;
    use bitcoin::{Address, Network, PubkeyHash, ScriptBuf, ScriptHash, WScriptHash};

    #[test]
    fn test_bitcoin_matches_library_rendering() {
        let cases = vec![
            ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x11; 20])),
            ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([0x22; 20])),
            ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array([0x33; 32])),
        ];
        for script in cases {
            let expected = Address::from_script(&script, Network::Bitcoin).unwrap().to_string();
            assert_eq!(address_from_script(&script, &networks::BITCOIN).unwrap(), expected);
        }
    }

    #[test]
    fn test_testnet_prefixes() {
        let script = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([0x22; 20]));
        let expected = Address::from_script(&script, Network::Testnet).unwrap().to_string();
        assert_eq!(address_from_script(&script, &networks::BITCOIN_TESTNET).unwrap(), expected);
        assert!(expected.starts_with('2'));
    }

    #[test]
    fn test_litecoin_and_dash_prefixes() {
        let p2sh = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([0x22; 20]));
        assert!(address_from_script(&p2sh, &networks::LITECOIN).unwrap().starts_with('M'));

        let p2pkh = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x11; 20]));
        assert!(address_from_script(&p2pkh, &networks::LITECOIN).unwrap().starts_with('L'));
        assert!(address_from_script(&p2pkh, &networks::DASH).unwrap().starts_with('X'));

        let p2wsh = ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array([0x33; 32]));
        assert!(address_from_script(&p2wsh, &networks::LITECOIN).unwrap().starts_with("ltc1q"));
    }

    #[test]
    fn test_zcash_transparent_prefixes() {
        let p2pkh = ScriptBuf::new_p2pkh(&PubkeyHash::from_byte_array([0x11; 20]));
        let p2sh = ScriptBuf::new_p2sh(&ScriptHash::from_byte_array([0x22; 20]));
        assert!(address_from_script(&p2pkh, &networks::ZCASH).unwrap().starts_with("t1"));
        assert!(address_from_script(&p2sh, &networks::ZCASH).unwrap().starts_with("t3"));

        let p2wsh = ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array([0x33; 32]));
        assert!(address_from_script(&p2wsh, &networks::ZCASH).is_err());
    }

    #[test]
    fn test_unrenderable_scripts() {
        let p2wsh = ScriptBuf::new_p2wsh(&WScriptHash::from_byte_array([0x33; 32]));
        assert!(address_from_script(&p2wsh, &networks::BITCOIN_CASH).is_err());

        let op_return = ScriptBuf::from_bytes(vec![0x6a, 0x03, 1, 2, 3]);
        assert!(address_from_script(&op_return, &networks::BITCOIN).is_err());
    }
}
