//! XDR subset for payment envelopes
//!
//! Only the pieces a single-payment envelope touches are modelled. The
//! transaction body is kept as the exact bytes it arrived in, so signing
//! and re-serialization never depend on re-encoding it.

use sha2::{Digest, Sha256};
use thiserror::Error;

use crate::error::RecoveryError;

pub const ENVELOPE_TYPE_TX_V0: u32 = 0;
pub const ENVELOPE_TYPE_TX: u32 = 2;
pub const ENVELOPE_TYPE_TX_FEE_BUMP: u32 = 5;

pub const KEY_TYPE_ED25519: u32 = 0;
pub const KEY_TYPE_MUXED_ED25519: u32 = 0x100;

pub const PAYMENT: u32 = 1;

pub const MAX_SIGNATURES: usize = 20;
const MAX_SIGNATURE_LEN: usize = 64;
const MAX_MEMO_TEXT: usize = 28;
const MAX_EXTRA_SIGNERS: u32 = 2;
const MAX_SIGNED_PAYLOAD: usize = 64;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum XdrError {
    #[error("unexpected end of data")]
    UnexpectedEnd,
    #[error("{0} trailing bytes after envelope")]
    TrailingBytes(usize),
    #[error("invalid {what} discriminant {value}")]
    InvalidDiscriminant { what: &'static str, value: u32 },
    #[error("{what} too long: {len} > {max}")]
    TooLong { what: &'static str, len: usize, max: usize },
    #[error("non-zero padding")]
    NonZeroPadding,
    #[error("unsupported envelope type {0}")]
    UnsupportedEnvelope(u32),
    #[error("unsupported transaction extension {0}")]
    UnsupportedExtension(u32),
    #[error("transaction has {0} operations")]
    OperationCount(u32),
    #[error("operation type {0} is not a payment")]
    NotPayment(u32),
}

pub type XdrResult<T> = Result<T, XdrError>;

impl From<XdrError> for RecoveryError {
    fn from(err: XdrError) -> Self {
        match err {
            XdrError::OperationCount(_) => RecoveryError::malformed_transaction(
                "Recovery transaction is trying to perform multiple operations - aborting",
            ),
            XdrError::NotPayment(_) => RecoveryError::malformed_transaction(
                "Recovery transaction is not a payment transaction - aborting",
            ),
            XdrError::UnsupportedEnvelope(_) | XdrError::UnsupportedExtension(_) => {
                RecoveryError::malformed_transaction(err.to_string())
            }
            other => RecoveryError::signing_failed(format!("xdr: {}", other)),
        }
    }
}

// =============================================================================
// Model
// =============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MuxedAccount {
    Ed25519([u8; 32]),
    Muxed { id: u64, key: [u8; 32] },
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Asset {
    Native,
    AlphaNum4 { code: [u8; 4], issuer: [u8; 32] },
    AlphaNum12 { code: [u8; 12], issuer: [u8; 32] },
}

impl Asset {
    /// Asset code without trailing NULs, `XLM` for native
    pub fn code(&self) -> String {
        let raw: &[u8] = match self {
            Asset::Native => return "XLM".to_string(),
            Asset::AlphaNum4 { code, .. } => code,
            Asset::AlphaNum12 { code, .. } => code,
        };
        let end = raw.iter().position(|b| *b == 0).unwrap_or(raw.len());
        String::from_utf8_lossy(&raw[..end]).into_owned()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Payment {
    pub destination: MuxedAccount,
    pub asset: Asset,
    /// Stroops
    pub amount: i64,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DecoratedSignature {
    pub hint: [u8; 4],
    pub signature: Vec<u8>,
}

/// A v0 or v1 envelope holding exactly one payment
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransactionEnvelope {
    envelope_type: u32,
    tx: Vec<u8>,
    pub payment: Payment,
    pub signatures: Vec<DecoratedSignature>,
}

impl TransactionEnvelope {
    pub fn decode(bytes: &[u8]) -> XdrResult<Self> {
        let mut reader = Reader::new(bytes);

        let envelope_type = reader.u32()?;
        let tx_start = reader.pos;
        let payment = match envelope_type {
            ENVELOPE_TYPE_TX_V0 => reader.transaction_v0()?,
            ENVELOPE_TYPE_TX => reader.transaction_v1()?,
            other => return Err(XdrError::UnsupportedEnvelope(other)),
        };
        let tx = bytes[tx_start..reader.pos].to_vec();

        let count = reader.length("signatures", MAX_SIGNATURES)?;
        let signatures = (0..count)
            .map(|_| reader.decorated_signature())
            .collect::<XdrResult<Vec<_>>>()?;

        reader.finish()?;
        Ok(Self { envelope_type, tx, payment, signatures })
    }

    pub fn envelope_type(&self) -> u32 {
        self.envelope_type
    }

    /// `sha256(network_id ‖ ENVELOPE_TYPE_TX ‖ tx)`; v0 bodies are
    /// re-prefixed as an ed25519 muxed source, which is byte-identical
    /// to the v1 form.
    pub fn signature_hash(&self, passphrase: &str) -> [u8; 32] {
        let network_id = Sha256::digest(passphrase.as_bytes());

        let mut hasher = Sha256::new();
        hasher.update(network_id);
        hasher.update(ENVELOPE_TYPE_TX.to_be_bytes());
        if self.envelope_type == ENVELOPE_TYPE_TX_V0 {
            hasher.update(KEY_TYPE_ED25519.to_be_bytes());
        }
        hasher.update(&self.tx);
        hasher.finalize().into()
    }

    pub fn add_signature(&mut self, signature: DecoratedSignature) -> XdrResult<()> {
        if self.signatures.len() >= MAX_SIGNATURES {
            return Err(XdrError::TooLong {
                what: "signatures",
                len: self.signatures.len() + 1,
                max: MAX_SIGNATURES,
            });
        }
        if signature.signature.len() > MAX_SIGNATURE_LEN {
            return Err(XdrError::TooLong {
                what: "signature",
                len: signature.signature.len(),
                max: MAX_SIGNATURE_LEN,
            });
        }
        self.signatures.push(signature);
        Ok(())
    }

    pub fn encode(&self) -> Vec<u8> {
        let mut writer = Writer::default();
        writer.u32(self.envelope_type);
        writer.raw(&self.tx);
        writer.u32(self.signatures.len() as u32);
        for sig in &self.signatures {
            writer.raw(&sig.hint);
            writer.opaque(&sig.signature);
        }
        writer.into_inner()
    }
}

// =============================================================================
// Reader
// =============================================================================

struct Reader<'a> {
    data: &'a [u8],
    pos: usize,
}

impl<'a> Reader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { data, pos: 0 }
    }

    fn take(&mut self, n: usize) -> XdrResult<&'a [u8]> {
        let end = self.pos.checked_add(n).ok_or(XdrError::UnexpectedEnd)?;
        let slice = self.data.get(self.pos..end).ok_or(XdrError::UnexpectedEnd)?;
        self.pos = end;
        Ok(slice)
    }

    fn array<const N: usize>(&mut self) -> XdrResult<[u8; N]> {
        let mut out = [0u8; N];
        out.copy_from_slice(self.take(N)?);
        Ok(out)
    }

    fn u32(&mut self) -> XdrResult<u32> {
        Ok(u32::from_be_bytes(self.array()?))
    }

    fn u64(&mut self) -> XdrResult<u64> {
        Ok(u64::from_be_bytes(self.array()?))
    }

    fn i64(&mut self) -> XdrResult<i64> {
        Ok(i64::from_be_bytes(self.array()?))
    }

    fn bool(&mut self) -> XdrResult<bool> {
        match self.u32()? {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(XdrError::InvalidDiscriminant { what: "bool", value }),
        }
    }

    fn length(&mut self, what: &'static str, max: usize) -> XdrResult<usize> {
        let len = self.u32()? as usize;
        if len > max {
            return Err(XdrError::TooLong { what, len, max });
        }
        Ok(len)
    }

    /// Variable-length opaque, padded to four bytes
    fn opaque(&mut self, what: &'static str, max: usize) -> XdrResult<&'a [u8]> {
        let len = self.length(what, max)?;
        let body = self.take(len)?;
        let padding = (4 - len % 4) % 4;
        if self.take(padding)?.iter().any(|b| *b != 0) {
            return Err(XdrError::NonZeroPadding);
        }
        Ok(body)
    }

    fn skip_optional(&mut self, len: usize) -> XdrResult<()> {
        if self.bool()? {
            self.take(len)?;
        }
        Ok(())
    }

    fn finish(&self) -> XdrResult<()> {
        match self.data.len() - self.pos {
            0 => Ok(()),
            rest => Err(XdrError::TrailingBytes(rest)),
        }
    }

    fn muxed_account(&mut self) -> XdrResult<MuxedAccount> {
        match self.u32()? {
            KEY_TYPE_ED25519 => Ok(MuxedAccount::Ed25519(self.array()?)),
            KEY_TYPE_MUXED_ED25519 => {
                let id = self.u64()?;
                Ok(MuxedAccount::Muxed { id, key: self.array()? })
            }
            value => Err(XdrError::InvalidDiscriminant { what: "muxed account", value }),
        }
    }

    fn account_id(&mut self) -> XdrResult<[u8; 32]> {
        match self.u32()? {
            KEY_TYPE_ED25519 => self.array(),
            value => Err(XdrError::InvalidDiscriminant { what: "account id", value }),
        }
    }

    fn signer_key(&mut self) -> XdrResult<()> {
        match self.u32()? {
            0..=2 => {
                self.take(32)?;
            }
            3 => {
                self.take(32)?;
                self.opaque("signed payload", MAX_SIGNED_PAYLOAD)?;
            }
            value => return Err(XdrError::InvalidDiscriminant { what: "signer key", value }),
        }
        Ok(())
    }

    fn preconditions(&mut self) -> XdrResult<()> {
        match self.u32()? {
            0 => {}
            1 => {
                self.take(16)?;
            }
            2 => {
                self.skip_optional(16)?; // time bounds
                self.skip_optional(8)?; // ledger bounds
                self.skip_optional(8)?; // min sequence number
                self.take(8 + 4)?; // min sequence age, ledger gap
                let count = self.length("extra signers", MAX_EXTRA_SIGNERS as usize)?;
                for _ in 0..count {
                    self.signer_key()?;
                }
            }
            value => return Err(XdrError::InvalidDiscriminant { what: "preconditions", value }),
        }
        Ok(())
    }

    fn memo(&mut self) -> XdrResult<()> {
        match self.u32()? {
            0 => {}
            1 => {
                self.opaque("memo text", MAX_MEMO_TEXT)?;
            }
            2 => {
                self.take(8)?;
            }
            3 | 4 => {
                self.take(32)?;
            }
            value => return Err(XdrError::InvalidDiscriminant { what: "memo", value }),
        }
        Ok(())
    }

    fn asset(&mut self) -> XdrResult<Asset> {
        match self.u32()? {
            0 => Ok(Asset::Native),
            1 => {
                let code = self.array()?;
                Ok(Asset::AlphaNum4 { code, issuer: self.account_id()? })
            }
            2 => {
                let code = self.array()?;
                Ok(Asset::AlphaNum12 { code, issuer: self.account_id()? })
            }
            value => Err(XdrError::InvalidDiscriminant { what: "asset", value }),
        }
    }

    /// The single operation list entry; counts and types are checked
    /// before anything else in the operation is read
    fn single_payment(&mut self) -> XdrResult<Payment> {
        let count = self.u32()?;
        if count != 1 {
            return Err(XdrError::OperationCount(count));
        }

        if self.bool()? {
            self.muxed_account()?;
        }
        let op_type = self.u32()?;
        if op_type != PAYMENT {
            return Err(XdrError::NotPayment(op_type));
        }

        let destination = self.muxed_account()?;
        let asset = self.asset()?;
        let amount = self.i64()?;
        Ok(Payment { destination, asset, amount })
    }

    fn extension(&mut self) -> XdrResult<()> {
        match self.u32()? {
            0 => Ok(()),
            other => Err(XdrError::UnsupportedExtension(other)),
        }
    }

    fn transaction_v0(&mut self) -> XdrResult<Payment> {
        self.take(32)?; // source account ed25519
        self.take(4 + 8)?; // fee, sequence number
        self.skip_optional(16)?; // time bounds
        self.memo()?;
        let payment = self.single_payment()?;
        self.extension()?;
        Ok(payment)
    }

    fn transaction_v1(&mut self) -> XdrResult<Payment> {
        self.muxed_account()?;
        self.take(4 + 8)?; // fee, sequence number
        self.preconditions()?;
        self.memo()?;
        let payment = self.single_payment()?;
        self.extension()?;
        Ok(payment)
    }

    fn decorated_signature(&mut self) -> XdrResult<DecoratedSignature> {
        let hint = self.array()?;
        let signature = self.opaque("signature", MAX_SIGNATURE_LEN)?.to_vec();
        Ok(DecoratedSignature { hint, signature })
    }
}

// =============================================================================
// Writer
// =============================================================================

#[derive(Default)]
pub(crate) struct Writer {
    buf: Vec<u8>,
}

impl Writer {
    pub(crate) fn u32(&mut self, value: u32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub(crate) fn raw(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    pub(crate) fn opaque(&mut self, bytes: &[u8]) {
        self.u32(bytes.len() as u32);
        self.raw(bytes);
        let padding = (4 - bytes.len() % 4) % 4;
        self.buf.extend(std::iter::repeat(0u8).take(padding));
    }

    pub(crate) fn into_inner(self) -> Vec<u8> {
        self.buf
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;

    impl Writer {
        pub(crate) fn u64(&mut self, value: u64) {
            self.raw(&value.to_be_bytes());
        }

        pub(crate) fn i64(&mut self, value: i64) {
            self.raw(&value.to_be_bytes());
        }
    }

    pub(crate) const SOURCE: [u8; 32] = [0x01; 32];
    pub(crate) const DESTINATION: [u8; 32] = [0x02; 32];

    /// Knobs for building test envelopes
    pub(crate) struct EnvelopeSpec {
        pub envelope_type: u32,
        pub operations: Vec<u32>,
        pub amount: i64,
        pub muxed_destination: Option<u64>,
        pub memo_text: Option<&'static str>,
        pub signatures: usize,
        pub extension: u32,
    }

    impl Default for EnvelopeSpec {
        fn default() -> Self {
            Self {
                envelope_type: ENVELOPE_TYPE_TX,
                operations: vec![PAYMENT],
                amount: 100_000_000,
                muxed_destination: None,
                memo_text: None,
                signatures: 1,
                extension: 0,
            }
        }
    }

    pub(crate) fn build_envelope(spec: &EnvelopeSpec) -> Vec<u8> {
        let mut w = Writer::default();
        w.u32(spec.envelope_type);

        if spec.envelope_type == ENVELOPE_TYPE_TX_V0 {
            w.raw(&SOURCE);
        } else {
            w.u32(KEY_TYPE_ED25519);
            w.raw(&SOURCE);
        }
        w.u32(100); // fee
        w.i64(12_345); // sequence
        if spec.envelope_type == ENVELOPE_TYPE_TX_V0 {
            w.u32(0); // no time bounds
        } else {
            w.u32(1); // time bounds
            w.u64(0);
            w.u64(1_700_000_000);
        }
        match spec.memo_text {
            Some(text) => {
                w.u32(1);
                w.opaque(text.as_bytes());
            }
            None => w.u32(0),
        }

        w.u32(spec.operations.len() as u32);
        for op_type in &spec.operations {
            w.u32(0); // no operation source
            w.u32(*op_type);
            match *op_type {
                PAYMENT => {
                    match spec.muxed_destination {
                        Some(id) => {
                            w.u32(KEY_TYPE_MUXED_ED25519);
                            w.u64(id);
                        }
                        None => w.u32(KEY_TYPE_ED25519),
                    }
                    w.raw(&DESTINATION);
                    w.u32(0); // native
                    w.i64(spec.amount);
                }
                // bump sequence
                _ => w.i64(1),
            }
        }
        w.u32(spec.extension);

        w.u32(spec.signatures as u32);
        for i in 0..spec.signatures {
            w.raw(&[i as u8; 4]);
            w.opaque(&[0xAB; 64]);
        }
        w.into_inner()
    }

    #[test]
    fn test_decode_v1_payment() {
        let bytes = build_envelope(&EnvelopeSpec { memo_text: Some("recovery"), ..Default::default() });
        let envelope = TransactionEnvelope::decode(&bytes).unwrap();
        assert_eq!(envelope.envelope_type(), ENVELOPE_TYPE_TX);
        assert_eq!(envelope.payment.destination, MuxedAccount::Ed25519(DESTINATION));
        assert_eq!(envelope.payment.asset.code(), "XLM");
        assert_eq!(envelope.payment.amount, 100_000_000);
        assert_eq!(envelope.signatures.len(), 1);
        assert_eq!(envelope.encode(), bytes);
    }

    #[test]
    fn test_decode_muxed_destination() {
        let bytes = build_envelope(&EnvelopeSpec { muxed_destination: Some(9), ..Default::default() });
        let envelope = TransactionEnvelope::decode(&bytes).unwrap();
        assert_eq!(envelope.payment.destination, MuxedAccount::Muxed { id: 9, key: DESTINATION });
    }

    #[test]
    fn test_v0_hash_matches_v1_form() {
        let v0 = TransactionEnvelope::decode(&build_envelope(&EnvelopeSpec {
            envelope_type: ENVELOPE_TYPE_TX_V0,
            ..Default::default()
        }))
        .unwrap();

        // v1 with the same body: ed25519 source, time bounds absent
        let mut w = Writer::default();
        w.u32(ENVELOPE_TYPE_TX);
        w.u32(KEY_TYPE_ED25519);
        w.raw(&v0.tx);
        w.u32(0);
        let v1 = TransactionEnvelope::decode(&w.into_inner()).unwrap();

        let passphrase = "Test SDF Network ; September 2015";
        assert_eq!(v0.signature_hash(passphrase), v1.signature_hash(passphrase));
        assert_ne!(v0.signature_hash(passphrase), v0.signature_hash("other"));
    }

    #[test]
    fn test_shape_errors() {
        let none = build_envelope(&EnvelopeSpec { operations: vec![], ..Default::default() });
        assert_eq!(TransactionEnvelope::decode(&none), Err(XdrError::OperationCount(0)));

        let two = build_envelope(&EnvelopeSpec { operations: vec![PAYMENT, PAYMENT], ..Default::default() });
        assert_eq!(TransactionEnvelope::decode(&two), Err(XdrError::OperationCount(2)));

        let bump = build_envelope(&EnvelopeSpec { operations: vec![11], ..Default::default() });
        assert_eq!(TransactionEnvelope::decode(&bump), Err(XdrError::NotPayment(11)));
    }

    #[test]
    fn test_rejects_fee_bump_and_extensions() {
        let fee_bump = ENVELOPE_TYPE_TX_FEE_BUMP.to_be_bytes();
        assert_eq!(
            TransactionEnvelope::decode(&fee_bump),
            Err(XdrError::UnsupportedEnvelope(ENVELOPE_TYPE_TX_FEE_BUMP))
        );

        let soroban = build_envelope(&EnvelopeSpec { extension: 1, ..Default::default() });
        assert_eq!(TransactionEnvelope::decode(&soroban), Err(XdrError::UnsupportedExtension(1)));
    }

    #[test]
    fn test_truncated_and_trailing() {
        let bytes = build_envelope(&EnvelopeSpec::default());
        assert_eq!(
            TransactionEnvelope::decode(&bytes[..bytes.len() - 3]),
            Err(XdrError::UnexpectedEnd)
        );

        let mut longer = bytes.clone();
        longer.extend_from_slice(&[0, 0, 0, 0]);
        assert_eq!(TransactionEnvelope::decode(&longer), Err(XdrError::TrailingBytes(4)));
    }

    #[test]
    fn test_signature_cap() {
        let bytes = build_envelope(&EnvelopeSpec { signatures: MAX_SIGNATURES, ..Default::default() });
        let mut envelope = TransactionEnvelope::decode(&bytes).unwrap();
        let err = envelope
            .add_signature(DecoratedSignature { hint: [0; 4], signature: vec![0; 64] })
            .unwrap_err();
        assert!(matches!(err, XdrError::TooLong { what: "signatures", .. }));
    }

    #[test]
    fn test_shape_errors_map_to_malformed() {
        use crate::error::ErrorCode;
        let err: RecoveryError = XdrError::OperationCount(2).into();
        assert!(err.is(ErrorCode::MalformedTransaction));
        assert!(err.message.contains("multiple operations"));

        let err: RecoveryError = XdrError::UnexpectedEnd.into();
        assert!(err.is(ErrorCode::SigningFailed));
    }
}
