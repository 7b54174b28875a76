//! Unified error types for the recovery signer
//!
//! Every failure aborts the run. Errors carry a stable code so callers
//! (and tests) can tell an authorization failure from a codec failure
//! without matching on message text.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Main error type for all recovery operations
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RecoveryError {
    pub code: ErrorCode,
    pub message: String,
    pub details: Option<String>,
}

impl RecoveryError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    // Convenience constructors
    pub fn unsupported_coin(coin: &str) -> Self {
        Self::new(ErrorCode::UnsupportedCoin, format!("Unsupported coin: {}", coin))
    }

    pub fn invalid_key() -> Self {
        Self::new(ErrorCode::InvalidKey, "invalid private key")
    }

    pub fn not_private_key() -> Self {
        Self::new(
            ErrorCode::NotPrivateKey,
            "please provide the private (not public) wallet key",
        )
    }

    pub fn key_mismatch() -> Self {
        Self::new(
            ErrorCode::KeyMismatch,
            "provided private key does not match public key specified with recovery request",
        )
    }

    pub fn recovery_aborted() -> Self {
        Self::new(ErrorCode::RecoveryAborted, "recovery aborted")
    }

    pub fn malformed_transaction(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::MalformedTransaction, msg)
    }

    pub fn signing_failed(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::SigningFailed, msg)
    }

    pub fn invalid_request(msg: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidRequest, msg)
    }

    pub fn is(&self, code: ErrorCode) -> bool {
        self.code == code
    }
}

impl fmt::Display for RecoveryError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        Ok(())
    }
}

impl std::error::Error for RecoveryError {}

/// Error codes for categorization
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    // Dispatch
    UnsupportedCoin,

    // Authorization
    InvalidKey,
    NotPrivateKey,
    KeyMismatch,
    RecoveryAborted,

    // Transaction
    MalformedTransaction,
    SigningFailed,

    // Request / environment
    InvalidRequest,
    Io,
    JsonError,
    HexError,
}

/// Result type alias for recovery operations
pub type RecoveryResult<T> = Result<T, RecoveryError>;

// Conversions from common error types

impl From<serde_json::Error> for RecoveryError {
    fn from(e: serde_json::Error) -> Self {
        RecoveryError::new(ErrorCode::JsonError, e.to_string())
    }
}

impl From<hex::FromHexError> for RecoveryError {
    fn from(e: hex::FromHexError) -> Self {
        RecoveryError::new(ErrorCode::HexError, e.to_string())
    }
}

impl From<std::io::Error> for RecoveryError {
    fn from(e: std::io::Error) -> Self {
        RecoveryError::new(ErrorCode::Io, e.to_string())
    }
}

impl From<bitcoin::bip32::Error> for RecoveryError {
    fn from(e: bitcoin::bip32::Error) -> Self {
        RecoveryError::signing_failed(format!("BIP32 error: {}", e))
    }
}

impl From<bitcoin::secp256k1::Error> for RecoveryError {
    fn from(e: bitcoin::secp256k1::Error) -> Self {
        RecoveryError::signing_failed(format!("Secp256k1 error: {}", e))
    }
}

impl From<bitcoin::consensus::encode::Error> for RecoveryError {
    fn from(e: bitcoin::consensus::encode::Error) -> Self {
        RecoveryError::signing_failed(format!("Invalid transaction: {}", e))
    }
}
