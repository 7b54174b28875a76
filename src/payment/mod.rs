//! Payment Recovery Handler (Stellar)
//!
//! The envelope must carry exactly one payment operation. The backup key
//! is a flat `S…` secret rather than an extended key, and its `G…` account
//! must be the request's `backupKey`.

pub mod strkey;
pub mod xdr;

use base64::{engine::general_purpose::STANDARD, Engine as _};
use ed25519_dalek::{Signer, SigningKey};
use secrecy::{ExposeSecret, SecretString};
use serde_json::Value;

use crate::confirm::FLAT_KEY_PROMPT;
use crate::error::{RecoveryError, RecoveryResult};
use crate::recovery::RecoveryHandler;
use crate::registry::PaymentParams;
use crate::types::{Output, RecoveryRequest};
use crate::utils::units::format_units_fixed;
use crate::{log_debug, log_info};

use xdr::{DecoratedSignature, MuxedAccount, TransactionEnvelope};

pub struct PaymentHandler {
    params: PaymentParams,
    decimals: u32,
    envelope: TransactionEnvelope,
}

impl PaymentHandler {
    /// Decode and validate the envelope shape; no key is read here
    pub fn decode(request: &RecoveryRequest, params: PaymentParams, decimals: u32) -> RecoveryResult<Self> {
        let encoded = match request.require_tx()? {
            Value::String(encoded) => encoded,
            _ => return Err(RecoveryError::invalid_request("`tx` must be a base64 envelope")),
        };
        let bytes = STANDARD
            .decode(encoded.trim())
            .map_err(|e| RecoveryError::signing_failed(format!("invalid envelope base64: {}", e)))?;

        let envelope = TransactionEnvelope::decode(&bytes)?;
        log_debug!(
            "payment",
            "Envelope decoded",
            envelope_type = envelope.envelope_type(),
            asset = envelope.payment.asset.code(),
            signatures = envelope.signatures.len(),
        );

        Ok(Self { params, decimals, envelope })
    }
}

/// `G…` or `M…` form of a muxed account
pub fn muxed_address(account: &MuxedAccount) -> String {
    match account {
        MuxedAccount::Ed25519(key) => strkey::encode_account_id(key),
        MuxedAccount::Muxed { id, key } => strkey::encode_muxed_account(key, *id),
    }
}

/// Parse an `S…` secret and check it controls `expected_account`
pub fn verify_secret_seed(secret: &SecretString, expected_account: &str) -> RecoveryResult<SigningKey> {
    let encoded = secret.expose_secret().trim();

    let seed = match strkey::decode_secret_seed(encoded) {
        Ok(seed) => seed,
        Err(_) if strkey::decode(strkey::VERSION_ACCOUNT_ID, encoded).is_ok() => {
            return Err(RecoveryError::not_private_key())
        }
        Err(_) => return Err(RecoveryError::invalid_key()),
    };

    let key = SigningKey::from_bytes(&seed);
    if strkey::encode_account_id(key.verifying_key().as_bytes()) != expected_account {
        return Err(RecoveryError::key_mismatch());
    }
    Ok(key)
}

impl RecoveryHandler for PaymentHandler {
    type Key = SigningKey;

    fn outputs(&self) -> RecoveryResult<Vec<Output>> {
        let payment = &self.envelope.payment;
        if payment.amount <= 0 {
            return Err(RecoveryError::malformed_transaction("payment amount must be positive"));
        }

        Ok(vec![Output::new(
            muxed_address(&payment.destination),
            format_units_fixed(&payment.amount.to_string(), self.decimals)?,
        )])
    }

    fn key_prompt(&self) -> &'static str {
        FLAT_KEY_PROMPT
    }

    fn authorize(&self, secret: &SecretString, expected_key: &str) -> RecoveryResult<SigningKey> {
        verify_secret_seed(secret, expected_key)
    }

    fn sign(&self, key: &SigningKey) -> RecoveryResult<String> {
        let public_key = key.verifying_key().to_bytes();
        log_info!(
            "payment",
            "Signing payment envelope",
            signer = strkey::encode_account_id(&public_key),
            network = self.params.network_passphrase,
        );

        let hash = self.envelope.signature_hash(self.params.network_passphrase);
        let signature = key.sign(&hash);

        let mut hint = [0u8; 4];
        hint.copy_from_slice(&public_key[28..]);

        let mut envelope = self.envelope.clone();
        envelope
            .add_signature(DecoratedSignature { hint, signature: signature.to_bytes().to_vec() })
            .map_err(|e| RecoveryError::signing_failed(e.to_string()))?;

        Ok(STANDARD.encode(envelope.encode()))
    }
}
