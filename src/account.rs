//! Account-model recovery (ETH and ERC20 transfers)
//!
//! The backup key signs once, as the wallet contract's second signer, with
//! the root node's own secp256k1 secret. Display data comes from the
//! call payload: `selector(4) ‖ address(32) ‖ amount(32)`.

use std::str::FromStr;

use ethers_core::types::transaction::eip2718::TypedTransaction;
use ethers_core::types::{Address, Bytes, NameOrAddress, TransactionRequest, U256, U64};
use ethers_core::utils::rlp::Rlp;
use ethers_signers::{LocalWallet, Signer};
use secrecy::SecretString;
use serde_json::Value;

use crate::error::{RecoveryError, RecoveryResult};
use crate::keys::{verify_backup_key, BackupKeyNode};
use crate::log_debug;
use crate::recovery::RecoveryHandler;
use crate::registry::AccountParams;
use crate::types::{Output, RecoveryRequest};
use crate::utils::units::format_units;

const ADDRESS_RANGE: std::ops::Range<usize> = 16..36;
const AMOUNT_RANGE: std::ops::Range<usize> = 36..68;

#[derive(Debug)]
pub struct AccountHandler {
    params: AccountParams,
    decimals: u32,
    tx: TransactionRequest,
}

impl AccountHandler {
    pub fn decode(request: &RecoveryRequest, params: AccountParams, decimals: u32) -> RecoveryResult<Self> {
        let raw = request.require_tx()?;
        let tx = match raw {
            Value::String(encoded) => decode_unsigned_rlp(encoded)?,
            Value::Object(_) => from_json_fields(raw)?,
            other => {
                return Err(RecoveryError::invalid_request(format!(
                    "`tx` must be a hex string or an object, got {}",
                    other
                )))
            }
        };

        Ok(Self { params, decimals, tx })
    }

    fn chain_id(&self) -> u64 {
        self.tx
            .chain_id
            .map(|id| id.as_u64())
            .unwrap_or(self.params.default_chain_id)
    }

    fn payload(&self) -> RecoveryResult<&[u8]> {
        let data: &[u8] = self.tx.data.as_deref().unwrap_or_default();
        if data.len() < AMOUNT_RANGE.end {
            return Err(RecoveryError::malformed_transaction(format!(
                "transaction payload is {} bytes, expected a transfer call of at least {}",
                data.len(),
                AMOUNT_RANGE.end
            )));
        }
        Ok(data)
    }
}

impl RecoveryHandler for AccountHandler {
    type Key = BackupKeyNode;

    fn outputs(&self) -> RecoveryResult<Vec<Output>> {
        let data = self.payload()?;
        let address = format!("0x{}", hex::encode(&data[ADDRESS_RANGE]));
        let raw_amount = U256::from_big_endian(&data[AMOUNT_RANGE]);
        let amount = format_units(&raw_amount.to_string(), self.decimals)?;
        Ok(vec![Output::new(address, amount)])
    }

    fn authorize(&self, secret: &SecretString, expected_key: &str) -> RecoveryResult<BackupKeyNode> {
        verify_backup_key(secret, expected_key)
    }

    fn sign(&self, node: &BackupKeyNode) -> RecoveryResult<String> {
        let chain_id = self.chain_id();
        let wallet = LocalWallet::from_bytes(&node.secret_bytes()[..])
            .map_err(|e| RecoveryError::signing_failed(format!("unusable backup key: {}", e)))?
            .with_chain_id(chain_id);

        log_debug!(
            "account",
            "Signing as backup signer",
            signer = format!("{:?}", wallet.address()),
            chain_id = chain_id,
            token_transfer = self.params.token_transfer,
        );

        let typed: TypedTransaction = self.tx.clone().chain_id(chain_id).into();

        // ethers signs asynchronously; drive it on a local runtime
        let runtime = tokio::runtime::Builder::new_current_thread()
            .build()
            .map_err(|e| RecoveryError::signing_failed(format!("failed to create runtime: {}", e)))?;
        let signature = runtime
            .block_on(wallet.sign_transaction(&typed))
            .map_err(|e| RecoveryError::signing_failed(e.to_string()))?;

        Ok(hex::encode(typed.rlp_signed(&signature)))
    }
}

fn decode_unsigned_rlp(raw: &str) -> RecoveryResult<TransactionRequest> {
    let bytes = hex::decode(raw.trim().trim_start_matches("0x"))
        .map_err(|e| RecoveryError::signing_failed(format!("invalid transaction hex: {}", e)))?;
    TransactionRequest::decode_unsigned_rlp(&Rlp::new(&bytes))
        .map_err(|e| RecoveryError::signing_failed(format!("invalid transaction RLP: {}", e)))
}

/// `{nonce, gasPrice, gasLimit|gas, to, value, data, chainId}`
fn from_json_fields(tx: &Value) -> RecoveryResult<TransactionRequest> {
    let mut request = TransactionRequest::new();

    if let Some(nonce) = quantity(tx, "nonce")? {
        request = request.nonce(nonce);
    }
    if let Some(gas_price) = quantity(tx, "gasPrice")? {
        request = request.gas_price(gas_price);
    }
    if let Some(gas) = quantity(tx, "gasLimit")?.or(quantity(tx, "gas")?) {
        request = request.gas(gas);
    }
    if let Some(value) = quantity(tx, "value")? {
        request = request.value(value);
    }
    if let Some(chain_id) = quantity(tx, "chainId")? {
        request = request.chain_id(U64::from(chain_id.low_u64()));
    }
    if let Some(to) = tx.get("to").and_then(Value::as_str) {
        let address = Address::from_str(to)
            .map_err(|e| RecoveryError::signing_failed(format!("invalid `to` address {:?}: {}", to, e)))?;
        request = request.to(NameOrAddress::Address(address));
    }
    if let Some(data) = tx.get("data").and_then(Value::as_str) {
        let bytes = hex::decode(data.trim_start_matches("0x"))
            .map_err(|e| RecoveryError::signing_failed(format!("invalid `data` hex: {}", e)))?;
        request = request.data(Bytes::from(bytes));
    }

    Ok(request)
}

/// Hex (`0x…`) or decimal quantity, as a string or a JSON number
fn quantity(tx: &Value, field: &str) -> RecoveryResult<Option<U256>> {
    let invalid = |detail: String| RecoveryError::signing_failed(format!("invalid `{}`: {}", field, detail));

    match tx.get(field) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Number(n)) => n
            .as_u64()
            .map(|v| Some(U256::from(v)))
            .ok_or_else(|| invalid(n.to_string())),
        Some(Value::String(s)) => {
            let parsed = match s.strip_prefix("0x") {
                Some("") => Ok(U256::zero()),
                Some(hex_digits) => U256::from_str_radix(hex_digits, 16).map_err(|e| e.to_string()),
                None => U256::from_dec_str(s).map_err(|e| e.to_string()),
            };
            parsed.map(Some).map_err(invalid)
        }
        Some(other) => Err(invalid(other.to_string())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ErrorCode;
    use crate::keys::tests::{test_node, test_xpriv};
    use crate::registry::{CoinRegistry, Protocol};
    use bitcoin::bip32::Xpub;
    use bitcoin::secp256k1::Secp256k1;
    use ethers_core::types::Transaction;
    use ethers_core::utils::rlp;
    use serde_json::json;

    const ONE_ETHER: u64 = 1_000_000_000_000_000_000;

    fn transfer_payload(amount: U256) -> Vec<u8> {
        let mut data = hex::decode("a9059cbb").unwrap();
        data.extend([0u8; 12]);
        data.extend([0xaa; 20]);
        let mut word = [0u8; 32];
        amount.to_big_endian(&mut word);
        data.extend(word);
        data
    }

    fn params(coin: &str) -> AccountParams {
        match CoinRegistry::standard().resolve(coin).unwrap().protocol {
            Protocol::Account(params) => params,
            other => panic!("{:?}", other),
        }
    }

    fn rlp_request(coin: &str, chain_id: Option<u64>, data: Vec<u8>) -> RecoveryRequest {
        let mut tx = TransactionRequest::new()
            .nonce(3u64)
            .gas(200_000u64)
            .gas_price(20_000_000_000u64)
            .to(Address::repeat_byte(0x42))
            .value(0u64)
            .data(data);
        if let Some(id) = chain_id {
            tx = tx.chain_id(id);
        }
        let backup = Xpub::from_priv(&Secp256k1::new(), &test_xpriv(5)).to_string();
        let json = json!({
            "coin": coin,
            "backupKey": backup,
            "tx": hex::encode(tx.rlp()),
        });
        RecoveryRequest::from_json(&json.to_string()).unwrap()
    }

    fn signer_of(signed_hex: &str) -> (Address, Option<U256>) {
        let tx: Transaction = rlp::decode(&hex::decode(signed_hex).unwrap()).unwrap();
        (tx.recover_from().unwrap(), tx.chain_id)
    }

    fn expected_signer() -> Address {
        LocalWallet::from_bytes(&test_node(5).secret_bytes()[..]).unwrap().address()
    }

    #[test]
    fn test_native_transfer_display() {
        let request = rlp_request("eth", Some(1), transfer_payload(U256::from(ONE_ETHER)));
        let handler = AccountHandler::decode(&request, params("eth"), 18).unwrap();
        assert_eq!(
            handler.outputs().unwrap(),
            vec![Output::new(format!("0x{}", "aa".repeat(20)), "1")]
        );
    }

    #[test]
    fn test_token_transfer_shows_raw_amount() {
        let request = rlp_request("erc20", Some(1), transfer_payload(U256::from(1_500_000u64)));
        let handler = AccountHandler::decode(&request, params("erc20"), 0).unwrap();
        assert_eq!(handler.outputs().unwrap()[0].amount, "1500000");
    }

    #[test]
    fn test_short_payload_is_malformed() {
        let request = rlp_request("eth", Some(1), vec![0xa9, 0x05, 0x9c, 0xbb]);
        let handler = AccountHandler::decode(&request, params("eth"), 18).unwrap();
        assert!(handler.outputs().unwrap_err().is(ErrorCode::MalformedTransaction));
    }

    #[test]
    fn test_sign_recovers_backup_signer() {
        let request = rlp_request("eth", Some(1), transfer_payload(U256::from(ONE_ETHER)));
        let handler = AccountHandler::decode(&request, params("eth"), 18).unwrap();
        let signed = handler.sign(&test_node(5)).unwrap();

        assert!(!signed.starts_with("0x"));
        let (from, chain_id) = signer_of(&signed);
        assert_eq!(from, expected_signer());
        assert_eq!(chain_id, Some(U256::from(1)));
    }

    #[test]
    fn test_default_chain_id_applies_without_one() {
        for (coin, expected) in [("eth", 1u64), ("teth", 17000), ("erc20", 1), ("terc20", 17000)] {
            let request = rlp_request(coin, None, transfer_payload(U256::from(ONE_ETHER)));
            let handler = AccountHandler::decode(&request, params(coin), 18).unwrap();
            assert_eq!(handler.tx.chain_id, None, "{}", coin);
            assert_eq!(handler.chain_id(), expected, "{}", coin);

            let (from, chain_id) = signer_of(&handler.sign(&test_node(5)).unwrap());
            assert_eq!(from, expected_signer(), "{}", coin);
            assert_eq!(chain_id, Some(U256::from(expected)), "{}", coin);
        }
    }

    #[test]
    fn test_embedded_chain_id_wins_over_default() {
        let request = rlp_request("teth", Some(11155111), transfer_payload(U256::from(ONE_ETHER)));
        let handler = AccountHandler::decode(&request, params("teth"), 18).unwrap();
        assert_eq!(handler.chain_id(), 11155111);
        assert_eq!(signer_of(&handler.sign(&test_node(5)).unwrap()).1, Some(U256::from(11155111u64)));
    }

    #[test]
    fn test_json_object_form() {
        let data = format!("0x{}", hex::encode(transfer_payload(U256::from(ONE_ETHER / 2))));
        let json = json!({
            "coin": "eth",
            "backupKey": "xpub",
            "tx": {
                "nonce": 7,
                "gasPrice": "20000000000",
                "gasLimit": "0x30d40",
                "to": format!("0x{}", "42".repeat(20)),
                "value": "0x",
                "data": data,
                "chainId": 1
            }
        });
        let request = RecoveryRequest::from_json(&json.to_string()).unwrap();
        let handler = AccountHandler::decode(&request, params("eth"), 18).unwrap();

        assert_eq!(handler.tx.nonce, Some(U256::from(7)));
        assert_eq!(handler.tx.gas, Some(U256::from(200_000)));
        assert_eq!(handler.outputs().unwrap()[0].amount, "0.5");
        assert_eq!(signer_of(&handler.sign(&test_node(5)).unwrap()).0, expected_signer());
    }

    #[test]
    fn test_rejects_unusable_tx_values() {
        let bad_rlp = json!({"coin": "eth", "backupKey": "k", "tx": "zz"});
        let request = RecoveryRequest::from_json(&bad_rlp.to_string()).unwrap();
        assert!(AccountHandler::decode(&request, params("eth"), 18).is_err());

        let wrong_type = json!({"coin": "eth", "backupKey": "k", "tx": 5});
        let request = RecoveryRequest::from_json(&wrong_type.to_string()).unwrap();
        assert!(AccountHandler::decode(&request, params("eth"), 18)
            .unwrap_err()
            .is(ErrorCode::InvalidRequest));

        let bad_field = json!({"coin": "eth", "backupKey": "k", "tx": {"nonce": "seven"}});
        let request = RecoveryRequest::from_json(&bad_field.to_string()).unwrap();
        assert!(AccountHandler::decode(&request, params("eth"), 18).is_err());
    }
}
