//! Shared types for the recovery signer
//!
//! The request and result shapes mirror the JSON files exchanged with the
//! wallet backend, so field names follow its camelCase convention.

use serde::{Deserialize, Deserializer, Serialize};
use serde_json::Value;

use crate::error::{RecoveryError, RecoveryResult};

/// Placeholder shown when a request carries no custom message
pub const NO_CUSTOM_MESSAGE: &str = "None";

// =============================================================================
// Request Types
// =============================================================================

/// A half-signed transaction awaiting the backup signature
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RecoveryRequest {
    pub coin: String,
    pub backup_key: String,
    /// UTXO chains
    #[serde(default)]
    pub transaction_hex: Option<String>,
    /// Account and payment chains (hex string or structured object)
    #[serde(default)]
    pub tx: Option<Value>,
    /// Ledger chains
    #[serde(default)]
    pub tx_hex: Option<String>,
    #[serde(default)]
    pub inputs: Vec<InputSpec>,
    #[serde(default)]
    pub custom: Option<CustomData>,
    #[serde(default)]
    pub recovery_amount: Option<Value>,
}

impl RecoveryRequest {
    pub fn from_json(json: &str) -> RecoveryResult<Self> {
        serde_json::from_str(json)
            .map_err(|e| RecoveryError::invalid_request(format!("Invalid recovery request: {}", e)))
    }

    pub fn custom_message(&self) -> &str {
        self.custom
            .as_ref()
            .map(|c| c.message.as_str())
            .unwrap_or(NO_CUSTOM_MESSAGE)
    }

    pub fn require_transaction_hex(&self) -> RecoveryResult<&str> {
        self.transaction_hex
            .as_deref()
            .ok_or_else(|| RecoveryError::invalid_request("recovery request is missing `transactionHex`"))
    }

    pub fn require_tx_hex(&self) -> RecoveryResult<&str> {
        self.tx_hex
            .as_deref()
            .ok_or_else(|| RecoveryError::invalid_request("recovery request is missing `txHex`"))
    }

    pub fn require_tx(&self) -> RecoveryResult<&Value> {
        self.tx
            .as_ref()
            .ok_or_else(|| RecoveryError::invalid_request("recovery request is missing `tx`"))
    }
}

/// Signing metadata for one UTXO input, in transaction input order
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InputSpec {
    pub chain_path: String,
    #[serde(default)]
    pub redeem_script: Option<String>,
    #[serde(default)]
    pub witness_script: Option<String>,
    /// Value of the spent output in base units
    #[serde(default, deserialize_with = "deserialize_amount")]
    pub amount: Option<u64>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CustomData {
    pub message: String,
}

/// Accepts `1000`, `"1000"` or null
fn deserialize_amount<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum RawAmount {
        Number(u64),
        Text(String),
    }

    match Option::<RawAmount>::deserialize(deserializer)? {
        None => Ok(None),
        Some(RawAmount::Number(n)) => Ok(Some(n)),
        Some(RawAmount::Text(s)) => s
            .trim()
            .parse::<u64>()
            .map(Some)
            .map_err(|e| serde::de::Error::custom(format!("invalid input amount {:?}: {}", s, e))),
    }
}

// =============================================================================
// Output / Result Types
// =============================================================================

/// A destination shown to the operator. Display only.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Output {
    pub address: String,
    pub amount: String,
}

impl Output {
    pub fn new(address: impl Into<String>, amount: impl Into<String>) -> Self {
        Self {
            address: address.into(),
            amount: amount.into(),
        }
    }
}

/// The only artifact that leaves the process
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SignedRecovery {
    pub backup_key: String,
    pub coin: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recovery_amount: Option<Value>,
    pub tx_hex: String,
}
