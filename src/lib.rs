//! Recovery Signer Library
//!
//! Offline cosigner for half-signed recovery transactions. A request names
//! a coin, the expected backup key and the transaction the user key has
//! already signed; the backup key adds its signature after the operator
//! confirms the outputs.
//!
//! # Architecture
//!
//! - **registry**: coin → protocol family and network parameters
//! - **recovery**: the signing session, shared by every family
//! - **utxo**, **account**, **ledger**, **payment**: one handler per family
//! - **keys**: backup key parsing and verification
//! - **confirm**: operator checkpoint and key input
//! - **storage**: request and result files
//!
//! # Security
//!
//! Secrets are read into `secrecy` wrappers and raw key bytes are held in
//! `zeroize` buffers. Nothing is written unless signing succeeded.
//!
//! # Example
//!
//! ```rust,ignore
//! use recovery_signer::{storage, CoinRegistry, SigningSession};
//!
//! let request = storage::load_request(path)?;
//! let signed = SigningSession::new(&registry, &mut out, &mut confirm, &mut secrets)
//!     .sign(&request)?;
//! storage::write_result(&storage::result_path(path), &signed)?;
//! ```

pub mod account;
pub mod confirm;
pub mod error;
pub mod keys;
pub mod ledger;
pub mod payment;
pub mod recovery;
pub mod registry;
pub mod storage;
pub mod types;
pub mod utils;
pub mod utxo;

pub use error::{ErrorCode, RecoveryError, RecoveryResult};
pub use recovery::{RecoveryHandler, SigningSession};
pub use registry::{CoinRegistry, CoinSpec, Protocol};
pub use types::{Output, RecoveryRequest, SignedRecovery};
