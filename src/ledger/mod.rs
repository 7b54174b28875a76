//! Ledger Recovery Handler (XRP)
//!
//! The backup key cosigns an account that is already multi-signed by the
//! user key. It signs "as" its own classic address, then the new signer
//! entry is combined with the signers already present.

pub mod codec;
pub mod definitions;

use bitcoin::hashes::{hash160, Hash};
use bitcoin::secp256k1::Message;
use bs58::Alphabet;
use secrecy::SecretString;
use sha2::{Digest, Sha512};

use crate::error::{RecoveryError, RecoveryResult};
use crate::keys::{verify_backup_key, BackupKeyNode};
use crate::log_info;
use crate::recovery::RecoveryHandler;
use crate::types::{Output, RecoveryRequest};
use crate::utils::encoding::base58check_encode;
use crate::utils::units::format_units;

use codec::{Amount, Field, FieldValue, StObject};

/// Prefix of the multi-signing hash (`SMT\0`)
const MULTISIGN_PREFIX: [u8; 4] = [0x53, 0x4D, 0x54, 0x00];
const ACCOUNT_ID_VERSION: u8 = 0x00;

pub type AccountId = [u8; 20];

pub struct LedgerHandler {
    decimals: u32,
    tx: StObject,
}

impl LedgerHandler {
    pub fn decode(request: &RecoveryRequest, decimals: u32) -> RecoveryResult<Self> {
        let bytes = hex::decode(request.require_tx_hex()?.trim())
            .map_err(|e| RecoveryError::signing_failed(format!("invalid transaction hex: {}", e)))?;
        let tx = codec::decode(&bytes)?;
        Ok(Self { decimals, tx })
    }
}

impl RecoveryHandler for LedgerHandler {
    type Key = BackupKeyNode;

    fn outputs(&self) -> RecoveryResult<Vec<Output>> {
        let destination = match self.tx.get("Destination") {
            Some(FieldValue::AccountId(id)) => classic_address(id),
            _ => return Err(RecoveryError::malformed_transaction("transaction has no Destination")),
        };
        let drops = match self.tx.get("Amount") {
            Some(FieldValue::Amount(Amount::Native { drops, positive: true })) => *drops,
            Some(FieldValue::Amount(_)) => {
                return Err(RecoveryError::malformed_transaction(
                    "only positive native amounts can be recovered",
                ))
            }
            _ => return Err(RecoveryError::malformed_transaction("transaction has no Amount")),
        };

        Ok(vec![Output::new(destination, format_units(&drops.to_string(), self.decimals)?)])
    }

    fn authorize(&self, secret: &SecretString, expected_key: &str) -> RecoveryResult<BackupKeyNode> {
        verify_backup_key(secret, expected_key)
    }

    fn sign(&self, node: &BackupKeyNode) -> RecoveryResult<String> {
        let signer = account_id(&node.public_key().serialize());
        log_info!("ledger", "Signing as backup signer", signer = classic_address(&signer));

        let blob = sign_as(&self.tx, node, signer)?;
        let combined = combine(&self.tx, &blob)?;
        Ok(hex::encode_upper(codec::encode(&combined)?))
    }
}

/// RIPEMD160(SHA256(pubkey))
pub fn account_id(public_key: &[u8]) -> AccountId {
    hash160::Hash::hash(public_key).to_byte_array()
}

/// `r…` address of an account id
pub fn classic_address(account_id: &AccountId) -> String {
    base58check_encode(&[ACCOUNT_ID_VERSION], account_id, Alphabet::RIPPLE)
}

/// SHA512-half over the signing fields, keyed to one signer
pub fn multisign_hash(tx: &StObject, signer: &AccountId) -> RecoveryResult<[u8; 32]> {
    let mut hasher = Sha512::new();
    hasher.update(MULTISIGN_PREFIX);
    hasher.update(codec::encode_for_signing(tx)?);
    hasher.update(signer);
    let digest = hasher.finalize();

    let mut half = [0u8; 32];
    half.copy_from_slice(&digest[..32]);
    Ok(half)
}

fn field(name: &str, value: FieldValue) -> RecoveryResult<Field> {
    Ok(Field::named(name, value)?)
}

/// A copy of `tx` carrying only this signer's entry
fn sign_as(tx: &StObject, node: &BackupKeyNode, signer: AccountId) -> RecoveryResult<StObject> {
    let mut blob = tx.clone();
    blob.remove("TxnSignature");
    blob.remove("Signers");
    blob.set(field("SigningPubKey", FieldValue::Blob(Vec::new()))?);

    let hash = multisign_hash(&blob, &signer)?;
    let signature = node.secp().sign_ecdsa(&Message::from_digest(hash), node.secret_key());

    let mut entry = StObject::new();
    entry.set(field("Account", FieldValue::AccountId(signer))?);
    entry.set(field("SigningPubKey", FieldValue::Blob(node.public_key().serialize().to_vec()))?);
    entry.set(field("TxnSignature", FieldValue::Blob(signature.serialize_der().to_vec()))?);

    blob.set(field("Signers", FieldValue::Array(vec![field("Signer", FieldValue::Object(entry))?]))?);
    Ok(blob)
}

fn signers_of(tx: &StObject) -> RecoveryResult<Vec<(AccountId, Field)>> {
    let elements = match tx.get("Signers") {
        None => return Ok(Vec::new()),
        Some(FieldValue::Array(elements)) => elements,
        Some(_) => return Err(RecoveryError::signing_failed("Signers is not an array")),
    };

    elements
        .iter()
        .map(|element| match &element.value {
            FieldValue::Object(entry) => match entry.get("Account") {
                Some(FieldValue::AccountId(id)) => Ok((*id, element.clone())),
                _ => Err(RecoveryError::signing_failed("signer entry has no Account")),
            },
            _ => Err(RecoveryError::signing_failed("signer entry is not an object")),
        })
        .collect()
}

fn without_signers(tx: &StObject) -> RecoveryResult<Vec<u8>> {
    let mut stripped = tx.clone();
    stripped.remove("Signers");
    Ok(codec::encode(&stripped)?)
}

/// Merge the signer lists of two signatures over the same transaction
pub fn combine(original: &StObject, addition: &StObject) -> RecoveryResult<StObject> {
    if without_signers(original)? != without_signers(addition)? {
        return Err(RecoveryError::signing_failed(
            "signed blobs differ outside their signer lists",
        ));
    }

    let mut signers = signers_of(original)?;
    signers.extend(signers_of(addition)?);
    signers.sort_by(|a, b| a.0.cmp(&b.0));

    if let Some(pair) = signers.windows(2).find(|pair| pair[0].0 == pair[1].0) {
        return Err(RecoveryError::signing_failed(format!(
            "{} has already signed this transaction",
            classic_address(&pair[0].0)
        )));
    }

    let mut combined = original.clone();
    combined.set(field(
        "Signers",
        FieldValue::Array(signers.into_iter().map(|(_, entry)| entry).collect()),
    )?);
    Ok(combined)
}
