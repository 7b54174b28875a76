//! Zcash Sapling (v4) transactions
//!
//! Only fully transparent transactions are accepted: the shielded spend,
//! output and JoinSplit vectors must be empty and the value balance zero.
//! The transparent inputs and outputs reuse the bitcoin consensus codec.

use bitcoin::absolute::LockTime;
use bitcoin::consensus::encode::{deserialize_partial, serialize, Decodable, VarInt};
use bitcoin::transaction::Version;
use bitcoin::{Script, Transaction, TxIn, TxOut};
use blake2_rfc::blake2b::Blake2b;

use crate::error::{RecoveryError, RecoveryResult};

/// `fOverwintered | 4`
const SAPLING_HEADER: u32 = 0x8000_0004;
const SAPLING_VERSION_GROUP_ID: u32 = 0x892f_2085;

const PREVOUTS_PERSONAL: &[u8; 16] = b"ZcashPrevoutHash";
const SEQUENCE_PERSONAL: &[u8; 16] = b"ZcashSequencHash";
const OUTPUTS_PERSONAL: &[u8; 16] = b"ZcashOutputsHash";
const SIGHASH_PERSONAL_PREFIX: &[u8; 12] = b"ZcashSigHash";

const SIGHASH_ALL: u32 = 0x01;

/// Transparent v4 transaction; `tx.version` is 4
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SaplingTransaction {
    pub tx: Transaction,
    pub expiry_height: u32,
}

impl SaplingTransaction {
    pub fn decode(bytes: &[u8]) -> RecoveryResult<Self> {
        let mut cursor = Cursor { bytes, pos: 0 };

        let header: u32 = cursor.read()?;
        let group: u32 = cursor.read()?;
        if header != SAPLING_HEADER || group != SAPLING_VERSION_GROUP_ID {
            return Err(RecoveryError::malformed_transaction(format!(
                "unsupported zcash transaction version {:#010x} (group {:#010x})",
                header, group
            )));
        }

        let input: Vec<TxIn> = cursor.read()?;
        let output: Vec<TxOut> = cursor.read()?;
        let lock_time: u32 = cursor.read()?;
        let expiry_height: u32 = cursor.read()?;
        let value_balance: i64 = cursor.read()?;
        let spends: VarInt = cursor.read()?;
        let outputs: VarInt = cursor.read()?;
        let joinsplits: VarInt = cursor.read()?;

        if value_balance != 0 || spends.0 != 0 || outputs.0 != 0 || joinsplits.0 != 0 {
            return Err(RecoveryError::malformed_transaction(
                "shielded zcash transactions are not supported",
            ));
        }
        if cursor.pos != bytes.len() {
            return Err(RecoveryError::signing_failed(format!(
                "{} trailing bytes after zcash transaction",
                bytes.len() - cursor.pos
            )));
        }

        Ok(Self {
            tx: Transaction {
                version: Version(4),
                lock_time: LockTime::from_consensus(lock_time),
                input,
                output,
            },
            expiry_height,
        })
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut out = Vec::new();
        out.extend(SAPLING_HEADER.to_le_bytes());
        out.extend(SAPLING_VERSION_GROUP_ID.to_le_bytes());
        out.extend(serialize(&self.tx.input));
        out.extend(serialize(&self.tx.output));
        out.extend(self.tx.lock_time.to_consensus_u32().to_le_bytes());
        out.extend(self.expiry_height.to_le_bytes());
        out.extend(0i64.to_le_bytes());
        // empty shielded spends, shielded outputs, JoinSplits
        out.extend([0u8; 3]);
        out
    }
}

struct Cursor<'a> {
    bytes: &'a [u8],
    pos: usize,
}

impl Cursor<'_> {
    fn read<T: Decodable>(&mut self) -> RecoveryResult<T> {
        let (value, consumed) = deserialize_partial::<T>(&self.bytes[self.pos..])?;
        self.pos += consumed;
        Ok(value)
    }
}

fn personal_hash(personal: &[u8], data: &[u8]) -> [u8; 32] {
    let mut block = [0u64; 8];
    block[0] = 0x0101_0000 ^ 32;
    block[6] = u64::from_le_bytes(personal[..8].try_into().expect("16-byte personalization"));
    block[7] = u64::from_le_bytes(personal[8..16].try_into().expect("16-byte personalization"));
    let mut hasher = Blake2b::with_parameter_block(&block);
    hasher.update(data);
    let mut out = [0u8; 32];
    out.copy_from_slice(hasher.finalize().as_bytes());
    out
}

/// ZIP-243 digest for `tx.input[index]` under SIGHASH_ALL
pub fn signature_hash(
    tx: &Transaction,
    expiry_height: u32,
    index: usize,
    script_code: &Script,
    amount: u64,
    branch_id: u32,
) -> RecoveryResult<[u8; 32]> {
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

    let mut preimage = Vec::with_capacity(300 + script_code.len());
    preimage.extend(SAPLING_HEADER.to_le_bytes());
    preimage.extend(SAPLING_VERSION_GROUP_ID.to_le_bytes());
    preimage.extend(personal_hash(PREVOUTS_PERSONAL, &prevouts));
    preimage.extend(personal_hash(SEQUENCE_PERSONAL, &sequences));
    preimage.extend(personal_hash(OUTPUTS_PERSONAL, &outputs));
    // JoinSplits, shielded spends, shielded outputs
    preimage.extend([0u8; 96]);
    preimage.extend(tx.lock_time.to_consensus_u32().to_le_bytes());
    preimage.extend(expiry_height.to_le_bytes());
    preimage.extend(0i64.to_le_bytes());
    preimage.extend(SIGHASH_ALL.to_le_bytes());
    preimage.extend(serialize(&input.previous_output));
    preimage.extend(serialize(&script_code.to_owned()));
    preimage.extend(amount.to_le_bytes());
    preimage.extend(input.sequence.0.to_le_bytes());

    let mut personal = [0u8; 16];
    personal[..12].copy_from_slice(SIGHASH_PERSONAL_PREFIX);
    personal[12..].copy_from_slice(&branch_id.to_le_bytes());
    Ok(personal_hash(&personal, &preimage))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::registry::SAPLING_BRANCH_ID;
    use crate::utxo::script::tests::{multisig_script, pubkeys};
    use bitcoin::hashes::Hash;
    use bitcoin::{Amount, OutPoint, ScriptBuf, Sequence, Txid, Witness};

    fn transparent_tx(inputs: usize) -> SaplingTransaction {
        SaplingTransaction {
            tx: Transaction {
                version: Version(4),
                lock_time: LockTime::ZERO,
                input: (0..inputs)
                    .map(|i| TxIn {
                        previous_output: OutPoint::new(Txid::from_byte_array([0xcd; 32]), i as u32),
                        script_sig: ScriptBuf::new(),
                        sequence: Sequence::MAX,
                        witness: Witness::new(),
                    })
                    .collect(),
                output: vec![TxOut {
                    value: Amount::from_sat(70_000),
                    script_pubkey: ScriptBuf::new_p2sh(&multisig_script(2, &pubkeys(3)).script_hash()),
                }],
            },
            expiry_height: 2_500_000,
        }
    }

    #[test]
    fn test_encode_layout_and_decode() {
        let sapling = transparent_tx(1);
        let bytes = sapling.encode();

        assert_eq!(hex::encode(&bytes[..8]), "0400008085202f89");
        // lock time, expiry, value balance, three empty vectors
        let tail = &bytes[bytes.len() - 19..];
        assert_eq!(&tail[..4], &[0u8; 4]);
        assert_eq!(&tail[4..8], &2_500_000u32.to_le_bytes());
        assert_eq!(&tail[8..], &[0u8; 11]);

        assert_eq!(SaplingTransaction::decode(&bytes).unwrap(), sapling);
    }

    #[test]
    fn test_rejects_other_versions() {
        let mut bytes = transparent_tx(1).encode();
        bytes[0] = 0x03;
        let err = SaplingTransaction::decode(&bytes).unwrap_err();
        assert!(err.is(ErrorCode::MalformedTransaction));

        // a plain bitcoin transaction is not a zcash one
        let plain = bitcoin::consensus::encode::serialize(&transparent_tx(1).tx);
        assert!(SaplingTransaction::decode(&plain).is_err());
    }

    #[test]
    fn test_rejects_shielded_components() {
        let mut bytes = transparent_tx(1).encode();
        let len = bytes.len();
        bytes[len - 3] = 0x01;
        let err = SaplingTransaction::decode(&bytes).unwrap_err();
        assert!(err.is(ErrorCode::MalformedTransaction));
        assert!(err.message.contains("shielded"));
    }

    #[test]
    fn test_rejects_trailing_bytes() {
        let mut bytes = transparent_tx(1).encode();
        bytes.push(0);
        assert!(SaplingTransaction::decode(&bytes).unwrap_err().is(ErrorCode::SigningFailed));
    }

    #[test]
    fn test_digest_commitments() {
        let sapling = transparent_tx(2);
        let ms = multisig_script(2, &pubkeys(3));
        let digest = |tx: &Transaction, expiry, index, amount, branch| {
            signature_hash(tx, expiry, index, &ms, amount, branch).unwrap()
        };

        let base = digest(&sapling.tx, 100, 0, 5000, SAPLING_BRANCH_ID);
        assert_ne!(base, digest(&sapling.tx, 101, 0, 5000, SAPLING_BRANCH_ID));
        assert_ne!(base, digest(&sapling.tx, 100, 1, 5000, SAPLING_BRANCH_ID));
        assert_ne!(base, digest(&sapling.tx, 100, 0, 5001, SAPLING_BRANCH_ID));
        assert_ne!(base, digest(&sapling.tx, 100, 0, 5000, 0x2bb4_0e60));
        assert_eq!(base, digest(&sapling.tx, 100, 0, 5000, SAPLING_BRANCH_ID));

        assert!(signature_hash(&sapling.tx, 100, 2, &ms, 5000, SAPLING_BRANCH_ID).is_err());
    }

    #[test]
    fn test_personalization_changes_hash() {
        assert_ne!(personal_hash(PREVOUTS_PERSONAL, b""), personal_hash(OUTPUTS_PERSONAL, b""));
    }
}
