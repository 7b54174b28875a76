//! Signature hashing for multisig inputs
//!
//! Legacy and segwit-v0 digests come from `SighashCache`. Fork-id chains
//! (Bitcoin Cash) use the BIP143 preimage for every input, committing to
//! the spent amount, with the fork-id flag set in the hash type. Zcash
//! inputs use the ZIP-243 digest from [`super::sapling`].

use bitcoin::consensus::encode::serialize;
use bitcoin::hashes::{sha256d, Hash};
use bitcoin::secp256k1::{ecdsa::Signature, All, Message, PublicKey, Secp256k1, SecretKey};
use bitcoin::sighash::{EcdsaSighashType, SighashCache};
use bitcoin::{Amount, Script, Transaction};

use crate::error::{RecoveryError, RecoveryResult};
use crate::registry::{TxFormat, UtxoNetwork};

use super::sapling;
use super::script::ScriptKind;

/// How one input's digest is computed
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SighashMode {
    Legacy,
    SegwitV0,
    /// BIP143 layout with `SIGHASH_ALL | fork_id`
    ForkId(u32),
    /// ZIP-243 under a consensus branch; commits to the expiry height
    Sapling { branch_id: u32, expiry_height: u32 },
}

impl SighashMode {
    /// `expiry_height` is only read on Sapling chains
    pub fn select(network: &UtxoNetwork, kind: &ScriptKind, expiry_height: u32) -> RecoveryResult<Self> {
        let replay_protected = network.fork_id.is_some() || network.format != TxFormat::Bitcoin;
        if replay_protected && kind.is_segwit() {
            return Err(RecoveryError::signing_failed(format!(
                "{} does not support {} inputs",
                network.name,
                kind.label()
            )));
        }

        Ok(match (network.format, network.fork_id) {
            (TxFormat::Sapling { branch_id }, _) => SighashMode::Sapling { branch_id, expiry_height },
            (TxFormat::Bitcoin, Some(fork_id)) => SighashMode::ForkId(fork_id),
            (TxFormat::Bitcoin, None) if kind.is_segwit() => SighashMode::SegwitV0,
            (TxFormat::Bitcoin, None) => SighashMode::Legacy,
        })
    }

    /// Trailing byte appended to every DER signature
    pub fn hash_type(&self) -> u32 {
        match self {
            SighashMode::Legacy | SighashMode::SegwitV0 | SighashMode::Sapling { .. } => EcdsaSighashType::All as u32,
            SighashMode::ForkId(fork_id) => EcdsaSighashType::All as u32 | fork_id,
        }
    }
}

/// Digest for `tx.input[index]` spending `script_code`
pub fn signature_hash(
    tx: &Transaction,
    index: usize,
    script_code: &Script,
    amount: Option<u64>,
    mode: SighashMode,
) -> RecoveryResult<[u8; 32]> {
    let amount = || {
        amount.ok_or_else(|| RecoveryError::signing_failed(format!("input {} is missing its amount", index)))
    };

    match mode {
        SighashMode::Legacy => {
            let cache = SighashCache::new(tx);
            let hash = cache
                .legacy_signature_hash(index, script_code, mode.hash_type())
                .map_err(|e| RecoveryError::signing_failed(format!("input {}: {}", index, e)))?;
            Ok(hash.to_byte_array())
        }
        SighashMode::SegwitV0 => {
            let mut cache = SighashCache::new(tx);
            let hash = cache
                .p2wsh_signature_hash(index, script_code, Amount::from_sat(amount()?), EcdsaSighashType::All)
                .map_err(|e| RecoveryError::signing_failed(format!("input {}: {}", index, e)))?;
            Ok(hash.to_byte_array())
        }
        SighashMode::ForkId(_) => fork_id_hash(tx, index, script_code, amount()?, mode.hash_type()),
        SighashMode::Sapling { branch_id, expiry_height } => {
            sapling::signature_hash(tx, expiry_height, index, script_code, amount()?, branch_id)
        }
    }
}

fn fork_id_hash(tx: &Transaction, index: usize, script_code: &Script, amount: u64, hash_type: u32) -> RecoveryResult<[u8; 32]> {
    let input = tx
        .input
        .get(index)
        .ok_or_else(|| RecoveryError::signing_failed(format!("input {} out of range", index)))?;

    let mut prevouts = Vec::with_capacity(tx.input.len() * 36);
    let mut sequences = Vec::with_capacity(tx.input.len() * 4);
    for txin in &tx.input {
        prevouts.extend(serialize(&txin.previous_output));
        sequences.extend(txin.sequence.0.to_le_bytes());
    }
    let outputs: Vec<u8> = tx.output.iter().flat_map(|out| serialize(out)).collect();

    let mut preimage = Vec::with_capacity(160 + script_code.len());
    preimage.extend(tx.version.0.to_le_bytes());
    preimage.extend(sha256d::Hash::hash(&prevouts).to_byte_array());
    preimage.extend(sha256d::Hash::hash(&sequences).to_byte_array());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(&script_code.to_owned()));
    preimage.extend(amount.to_le_bytes());
    preimage.extend(input.sequence.0.to_le_bytes());
    preimage.extend(sha256d::Hash::hash(&outputs).to_byte_array());
    preimage.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend(hash_type.to_le_bytes());

    Ok(sha256d::Hash::hash(&preimage).to_byte_array())
}

/// DER signature with the hash-type byte appended
pub fn sign_digest(secp: &Secp256k1<All>, digest: [u8; 32], key: &SecretKey, mode: SighashMode) -> Vec<u8> {
    let signature = secp.sign_ecdsa(&Message::from_digest(digest), key);
    let mut encoded = signature.serialize_der().to_vec();
    encoded.push(mode.hash_type() as u8);
    encoded
}

/// Find which of `pubkeys` produced an existing signature over `digest`
pub fn match_signature(
    secp: &Secp256k1<All>,
    digest: [u8; 32],
    signature: &[u8],
    pubkeys: &[PublicKey],
    mode: SighashMode,
) -> RecoveryResult<usize> {
    let (hash_type, der) = signature
        .split_last()
        .ok_or_else(|| RecoveryError::signing_failed("empty signature"))?;

    if u32::from(*hash_type) != mode.hash_type() {
        return Err(RecoveryError::signing_failed(format!(
            "existing signature uses hash type {:#04x}, expected {:#04x}",
            hash_type,
            mode.hash_type()
        )));
    }

    let mut parsed = Signature::from_der(der)
        .map_err(|e| RecoveryError::signing_failed(format!("existing signature is not DER: {}", e)))?;
    parsed.normalize_s();

    let message = Message::from_digest(digest);
    pubkeys
        .iter()
        .position(|pk| secp.verify_ecdsa(&message, &parsed, pk).is_ok())
        .ok_or_else(|| RecoveryError::signing_failed("existing signature does not match any key in the script"))
}
