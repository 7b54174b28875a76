//! Recovery Orchestration
//!
//! One request moves strictly forward through
//! `decode → outputs → confirm → key → authorize → sign`. The coin's
//! protocol family picks the handler; every handler exposes the same
//! capability set so the ordering lives here and only here.

use std::io::Write;

use secrecy::SecretString;

use crate::account::AccountHandler;
use crate::confirm::{confirm_recovery, ConfirmationProvider, SecretProvider, XPRV_PROMPT};
use crate::error::RecoveryResult;
use crate::ledger::LedgerHandler;
use crate::payment::PaymentHandler;
use crate::registry::{CoinRegistry, Protocol};
use crate::types::{Output, RecoveryRequest, SignedRecovery};
use crate::utxo::UtxoHandler;
use crate::{log_debug, log_info};

/// Capabilities of one protocol family, bound to a decoded transaction
pub trait RecoveryHandler {
    /// Verified key material the family signs with
    type Key;

    /// Human-readable destinations of the decoded transaction
    fn outputs(&self) -> RecoveryResult<Vec<Output>>;

    /// Prompt shown when the secret is read interactively
    fn key_prompt(&self) -> &'static str {
        XPRV_PROMPT
    }

    /// Parse the operator secret and check it against the expected key
    fn authorize(&self, secret: &SecretString, expected_key: &str) -> RecoveryResult<Self::Key>;

    /// Sign and serialize to the family's wire encoding
    fn sign(&self, key: &Self::Key) -> RecoveryResult<String>;
}

/// Everything a run needs besides the request itself
pub struct SigningSession<'a> {
    registry: &'a CoinRegistry,
    out: &'a mut dyn Write,
    confirmations: &'a mut dyn ConfirmationProvider,
    secrets: &'a mut dyn SecretProvider,
    skip_confirm: bool,
}

impl<'a> SigningSession<'a> {
    pub fn new(
        registry: &'a CoinRegistry,
        out: &'a mut dyn Write,
        confirmations: &'a mut dyn ConfirmationProvider,
        secrets: &'a mut dyn SecretProvider,
    ) -> Self {
        Self {
            registry,
            out,
            confirmations,
            secrets,
            skip_confirm: false,
        }
    }

    /// Print the summary but do not wait for the confirmation token
    pub fn skip_confirmation(mut self, skip: bool) -> Self {
        self.skip_confirm = skip;
        self
    }

    /// Produce the signed artifact for one request
    pub fn sign(&mut self, request: &RecoveryRequest) -> RecoveryResult<SignedRecovery> {
        let spec = self.registry.resolve(&request.coin)?;
        let decimals = spec.decimals.unwrap_or(0);

        log_info!(
            "recovery",
            "Dispatching recovery request",
            coin = spec.coin,
            family = spec.protocol.family_name(),
        );

        let tx_hex = match spec.protocol {
            Protocol::Utxo(network) => self.run(request, UtxoHandler::decode(request, network, decimals)?)?,
            Protocol::Account(params) => self.run(request, AccountHandler::decode(request, params, decimals)?)?,
            Protocol::Ledger => self.run(request, LedgerHandler::decode(request, decimals)?)?,
            Protocol::Payment(params) => self.run(request, PaymentHandler::decode(request, params, decimals)?)?,
        };

        Ok(SignedRecovery {
            backup_key: request.backup_key.clone(),
            coin: request.coin.clone(),
            recovery_amount: request.recovery_amount.clone(),
            tx_hex,
        })
    }

    fn run<H: RecoveryHandler>(&mut self, request: &RecoveryRequest, handler: H) -> RecoveryResult<String> {
        let outputs = handler.outputs()?;
        log_debug!("recovery", "Outputs extracted", count = outputs.len());

        confirm_recovery(
            self.out,
            self.confirmations,
            &request.backup_key,
            &outputs,
            request.custom_message(),
            self.skip_confirm,
        )?;

        let key = {
            let secret = self.secrets.read_secret(handler.key_prompt())?;
            handler.authorize(&secret, &request.backup_key)?
        };
        log_info!("recovery", "Backup key verified", backup_key = &request.backup_key);

        let tx_hex = handler.sign(&key)?;
        log_info!("recovery", "Transaction signed", coin = &request.coin, hex_len = tx_hex.len());
        Ok(tx_hex)
    }
}
