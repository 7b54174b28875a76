//! Backup Key Verification
//!
//! Parses the operator-supplied BIP32 key, refuses public-only keys and
//! keys that do not match the request, and derives per-input children.
//!
//! SECURITY: private scalars are erased when the node is dropped and are
//! never formatted by `Debug`.

use std::fmt;
use std::str::FromStr;

use bitcoin::bip32::{ChildNumber, DerivationPath, Xpriv, Xpub};
use bitcoin::secp256k1::{All, PublicKey, Secp256k1, SecretKey};
use secrecy::{ExposeSecret, SecretString};
use zeroize::Zeroizing;

use crate::error::{RecoveryError, RecoveryResult};

/// A parsed BIP32 node, private or public-only
enum HdNode {
    Private(Xpriv),
    Public(Xpub),
}

impl HdNode {
    fn from_base58(encoded: &str) -> RecoveryResult<Self> {
        if let Ok(xpriv) = Xpriv::from_str(encoded) {
            return Ok(HdNode::Private(xpriv));
        }
        Xpub::from_str(encoded)
            .map(HdNode::Public)
            .map_err(|_| RecoveryError::invalid_key())
    }

    fn to_base58(&self) -> String {
        match self {
            HdNode::Private(xpriv) => xpriv.to_string(),
            HdNode::Public(xpub) => xpub.to_string(),
        }
    }

    fn neutered(&self, secp: &Secp256k1<All>) -> Xpub {
        match self {
            HdNode::Private(xpriv) => Xpub::from_priv(secp, xpriv),
            HdNode::Public(xpub) => *xpub,
        }
    }
}

/// The verified backup key. Lives for one run only.
pub struct BackupKeyNode {
    secp: Secp256k1<All>,
    xpriv: Xpriv,
    xpub: Xpub,
}

impl BackupKeyNode {
    /// Neutered (public-only) projection
    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn public_key(&self) -> PublicKey {
        self.xpub.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.xpriv.private_key
    }

    /// Raw 32-byte private scalar of the node itself (no derivation)
    pub(crate) fn secret_bytes(&self) -> Zeroizing<[u8; 32]> {
        Zeroizing::new(self.xpriv.private_key.secret_bytes())
    }

    pub(crate) fn secp(&self) -> &Secp256k1<All> {
        &self.secp
    }

    /// Derive a child along a chain path such as `/0/5` or `0/5`
    pub fn derive(&self, chain_path: &str) -> RecoveryResult<ChildKey> {
        let normalized = normalize_chain_path(chain_path);
        let path = parse_chain_path(normalized)?;
        let xpriv = self.xpriv.derive_priv(&self.secp, &path).map_err(|e| {
            RecoveryError::signing_failed(format!("cannot derive path {}: {}", chain_path, e))
        })?;
        let xpub = Xpub::from_priv(&self.secp, &xpriv);

        Ok(ChildKey {
            path: normalized.to_string(),
            xpriv,
            xpub,
        })
    }
}

impl Drop for BackupKeyNode {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for BackupKeyNode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BackupKeyNode").field("xpub", &self.xpub.to_string()).finish()
    }
}

/// A derived per-input signing key
pub struct ChildKey {
    path: String,
    xpriv: Xpriv,
    xpub: Xpub,
}

impl ChildKey {
    /// The normalized path this key was derived along
    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn xpub(&self) -> &Xpub {
        &self.xpub
    }

    pub fn public_key(&self) -> PublicKey {
        self.xpub.public_key
    }

    pub(crate) fn secret_key(&self) -> &SecretKey {
        &self.xpriv.private_key
    }
}

impl Drop for ChildKey {
    fn drop(&mut self) {
        self.xpriv.private_key.non_secure_erase();
    }
}

impl fmt::Debug for ChildKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ChildKey")
            .field("path", &self.path)
            .field("xpub", &self.xpub.to_string())
            .finish()
    }
}

/// Verify an operator secret against the expected backup xpub.
///
/// Order of checks: parse (`InvalidKey`), private half present
/// (`NotPrivateKey`), public projection matches (`KeyMismatch`).
pub fn verify_backup_key(secret: &SecretString, expected_xpub: &str) -> RecoveryResult<BackupKeyNode> {
    let secp = Secp256k1::new();
    let node = HdNode::from_base58(secret.expose_secret().trim())?;

    let neutered = node.neutered(&secp);
    let full_encoding = Zeroizing::new(node.to_base58());
    if *full_encoding == neutered.to_string() {
        return Err(RecoveryError::not_private_key());
    }

    if neutered.to_string() != expected_xpub {
        return Err(RecoveryError::key_mismatch());
    }

    match node {
        HdNode::Private(xpriv) => Ok(BackupKeyNode { secp, xpriv, xpub: neutered }),
        HdNode::Public(_) => Err(RecoveryError::not_private_key()),
    }
}

/// Chain paths come from the wallet backend with a leading `/`, which
/// BIP32 path syntax does not allow. Strip exactly one.
pub fn normalize_chain_path(path: &str) -> &str {
    path.strip_prefix('/').unwrap_or(path)
}

fn parse_chain_path(path: &str) -> RecoveryResult<DerivationPath> {
    let mut parts = path.split('/').peekable();
    if parts.peek() == Some(&"m") {
        parts.next();
    }

    let mut children = Vec::new();
    for part in parts {
        if part.is_empty() {
            if path.is_empty() {
                continue;
            }
            return Err(RecoveryError::signing_failed(format!("invalid derivation path: {:?}", path)));
        }
        let child = ChildNumber::from_str(part).map_err(|e| {
            RecoveryError::signing_failed(format!("invalid derivation path {:?}: {}", path, e))
        })?;
        children.push(child);
    }

    Ok(DerivationPath::from(children))
}
