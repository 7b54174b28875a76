//! UTXO Recovery Handler
//!
//! Cosigns BitGo-style m-of-n multisig inputs (P2SH, P2SH-P2WSH, P2WSH)
//! on Bitcoin, its forks and transparent Zcash. Each input is signed with a child of the
//! backup key derived along the input's chain path, and the new signature
//! is merged with whatever signatures the input already carries.

pub mod address;
pub mod sapling;
pub mod script;
pub mod sighash;

use bitcoin::consensus::encode::{deserialize, serialize_hex};
use bitcoin::{ScriptBuf, Transaction, TxIn, Witness};
use secrecy::SecretString;

use crate::error::{RecoveryError, RecoveryResult};
use crate::keys::{verify_backup_key, BackupKeyNode};
use crate::recovery::RecoveryHandler;
use crate::registry::{TxFormat, UtxoNetwork};
use crate::types::{InputSpec, Output, RecoveryRequest};
use crate::utils::units::format_units;
use crate::{log_info, log_warn};

use address::address_from_script;
use sapling::SaplingTransaction;
use script::{assemble_input, existing_signatures, Multisig, ScriptKind, SignatureSlots};
use sighash::{match_signature, sign_digest, signature_hash, SighashMode};

/// A decoded UTXO recovery transaction
pub struct UtxoHandler<'r> {
    request: &'r RecoveryRequest,
    network: UtxoNetwork,
    decimals: u32,
    tx: Transaction,
    /// Zero unless the network uses the Sapling format
    expiry_height: u32,
}

impl<'r> UtxoHandler<'r> {
    pub fn decode(request: &'r RecoveryRequest, network: UtxoNetwork, decimals: u32) -> RecoveryResult<Self> {
        let bytes = hex::decode(request.require_transaction_hex()?.trim())
            .map_err(|e| RecoveryError::signing_failed(format!("invalid transaction hex: {}", e)))?;
        let (tx, expiry_height): (Transaction, u32) = match network.format {
            TxFormat::Bitcoin => (deserialize(&bytes)?, 0),
            TxFormat::Sapling { .. } => {
                let sapling = SaplingTransaction::decode(&bytes)?;
                (sapling.tx, sapling.expiry_height)
            }
        };

        Ok(Self {
            request,
            network,
            decimals,
            tx,
            expiry_height,
        })
    }

    fn serialize(&self, tx: Transaction) -> String {
        match self.network.format {
            TxFormat::Bitcoin => serialize_hex(&tx),
            TxFormat::Sapling { .. } => hex::encode(
                SaplingTransaction {
                    tx,
                    expiry_height: self.expiry_height,
                }
                .encode(),
            ),
        }
    }

    fn sign_input(
        &self,
        node: &BackupKeyNode,
        index: usize,
        input: &InputSpec,
        txin: &TxIn,
    ) -> RecoveryResult<(ScriptBuf, Witness)> {
        let child = node.derive(&input.chain_path)?;
        let kind = ScriptKind::classify(input)?;
        let mode = SighashMode::select(&self.network, &kind, self.expiry_height)?;

        let input_address = address_from_script(&kind.prev_out_script(), &self.network)
            .unwrap_or_else(|_| kind.prev_out_script().to_hex_string());
        log_info!(
            "utxo",
            format!("Signing input {} of {}", index + 1, self.tx.input.len()),
            address = input_address,
            kind = kind.label(),
            path = child.path(),
            xpub = child.xpub(),
        );

        let multisig = Multisig::parse(kind.signing_script())?;
        let position = multisig.position(&child.public_key()).ok_or_else(|| {
            RecoveryError::signing_failed(format!(
                "backup key derived at {} is not a signer of input {}",
                child.path(),
                index
            ))
        })?;

        let digest = signature_hash(&self.tx, index, kind.signing_script(), input.amount, mode)?;

        let mut slots = SignatureSlots::new(&multisig);
        for signature in existing_signatures(&kind, &txin.script_sig, &txin.witness)? {
            let slot = match_signature(node.secp(), digest, &signature, &multisig.pubkeys, mode)?;
            slots.insert(slot, signature)?;
        }
        slots.insert(position, sign_digest(node.secp(), digest, child.secret_key(), mode))?;

        if !slots.is_complete() {
            log_warn!(
                "utxo",
                "Input remains partially signed",
                input = index,
                signatures = slots.count(),
                required = multisig.threshold,
            );
        }

        assemble_input(&kind, &slots)
    }
}

impl RecoveryHandler for UtxoHandler<'_> {
    type Key = BackupKeyNode;

    fn outputs(&self) -> RecoveryResult<Vec<Output>> {
        self.tx
            .output
            .iter()
            .map(|txout| {
                let address = address_from_script(&txout.script_pubkey, &self.network)?;
                let amount = format_units(&txout.value.to_sat().to_string(), self.decimals)?;
                Ok(Output::new(address, amount))
            })
            .collect()
    }

    fn authorize(&self, secret: &SecretString, expected_key: &str) -> RecoveryResult<BackupKeyNode> {
        verify_backup_key(secret, expected_key)
    }

    fn sign(&self, node: &BackupKeyNode) -> RecoveryResult<String> {
        let declared = &self.request.inputs;
        if declared.len() != self.tx.input.len() {
            return Err(RecoveryError::signing_failed(format!(
                "request describes {} inputs but the transaction has {}",
                declared.len(),
                self.tx.input.len()
            )));
        }

        let mut signed = self.tx.clone();
        for (index, (txin, input)) in signed.input.iter_mut().zip(declared).enumerate() {
            let (script_sig, witness) = self.sign_input(node, index, input, txin)?;
            txin.script_sig = script_sig;
            txin.witness = witness;
        }

        Ok(self.serialize(signed))
    }
}
