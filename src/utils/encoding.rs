//! Base58Check helpers shared by the UTXO and ledger address encoders

use bitcoin::hashes::{sha256d, Hash};
use bs58::Alphabet;

/// `version || payload || sha256d(version || payload)[..4]`
pub fn base58check_encode(version: &[u8], payload: &[u8], alphabet: &'static Alphabet) -> String {
    let mut data = Vec::with_capacity(version.len() + payload.len() + 4);
    data.extend_from_slice(version);
    data.extend_from_slice(payload);

    let checksum = sha256d::Hash::hash(&data);
    data.extend_from_slice(&checksum[..4]);

    bs58::encode(data).with_alphabet(alphabet).into_string()
}
