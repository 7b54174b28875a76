//! Input script classification and multisig assembly

use bitcoin::opcodes::all::{OP_CHECKMULTISIG, OP_PUSHNUM_1, OP_PUSHNUM_16};
use bitcoin::script::{Builder, Instruction, PushBytesBuf};
use bitcoin::secp256k1::PublicKey;
use bitcoin::{Script, ScriptBuf, Witness};

use crate::error::{RecoveryError, RecoveryResult};
use crate::types::InputSpec;

/// Spending condition of one recovery input
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ScriptKind {
    /// P2WSH: witness script only
    NativeSegwit { witness_script: ScriptBuf },
    /// P2SH-P2WSH: redeem script wraps the witness script hash
    WrappedSegwit { redeem_script: ScriptBuf, witness_script: ScriptBuf },
    /// P2SH: redeem script only
    Legacy { redeem_script: ScriptBuf },
}

impl ScriptKind {
    /// Classify an input from which scripts the request declares
    pub fn classify(input: &InputSpec) -> RecoveryResult<Self> {
        let redeem_script = input.redeem_script.as_deref().map(parse_script_hex).transpose()?;
        let witness_script = input.witness_script.as_deref().map(parse_script_hex).transpose()?;

        match (redeem_script, witness_script) {
            (None, Some(witness_script)) => Ok(ScriptKind::NativeSegwit { witness_script }),
            (Some(redeem_script), Some(witness_script)) => {
                let expected = ScriptBuf::new_p2wsh(&witness_script.wscript_hash());
                if redeem_script != expected {
                    return Err(RecoveryError::signing_failed(
                        "redeem script does not commit to the witness script",
                    ));
                }
                Ok(ScriptKind::WrappedSegwit { redeem_script, witness_script })
            }
            (Some(redeem_script), None) => Ok(ScriptKind::Legacy { redeem_script }),
            (None, None) => Err(RecoveryError::signing_failed(
                "input declares neither a redeem script nor a witness script",
            )),
        }
    }

    pub fn is_segwit(&self) -> bool {
        !matches!(self, ScriptKind::Legacy { .. })
    }

    /// The script whose keys sign this input (script code for the sighash)
    pub fn signing_script(&self) -> &Script {
        match self {
            ScriptKind::NativeSegwit { witness_script } => witness_script,
            ScriptKind::WrappedSegwit { witness_script, .. } => witness_script,
            ScriptKind::Legacy { redeem_script } => redeem_script,
        }
    }

    /// The output script being spent
    pub fn prev_out_script(&self) -> ScriptBuf {
        match self {
            ScriptKind::NativeSegwit { witness_script } => ScriptBuf::new_p2wsh(&witness_script.wscript_hash()),
            ScriptKind::WrappedSegwit { redeem_script, .. } | ScriptKind::Legacy { redeem_script } => {
                ScriptBuf::new_p2sh(&redeem_script.script_hash())
            }
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ScriptKind::NativeSegwit { .. } => "p2wsh",
            ScriptKind::WrappedSegwit { .. } => "p2sh-p2wsh",
            ScriptKind::Legacy { .. } => "p2sh",
        }
    }
}

fn parse_script_hex(script_hex: &str) -> RecoveryResult<ScriptBuf> {
    ScriptBuf::from_hex(script_hex)
        .map_err(|e| RecoveryError::signing_failed(format!("invalid script hex: {}", e)))
}

/// `OP_m <pubkey>... OP_n OP_CHECKMULTISIG`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Multisig {
    pub threshold: usize,
    pub pubkeys: Vec<PublicKey>,
}

impl Multisig {
    pub fn parse(script: &Script) -> RecoveryResult<Self> {
        let not_multisig = || RecoveryError::signing_failed(format!("not a multisig script: {}", script.to_hex_string()));

        let instructions = script
            .instructions()
            .collect::<Result<Vec<_>, _>>()
            .map_err(|e| RecoveryError::signing_failed(format!("unparseable script: {}", e)))?;

        let (first, rest) = instructions.split_first().ok_or_else(not_multisig)?;
        let (last, middle) = rest.split_last().ok_or_else(not_multisig)?;
        let (count, keys) = middle.split_last().ok_or_else(not_multisig)?;

        if *last != Instruction::Op(OP_CHECKMULTISIG) {
            return Err(not_multisig());
        }
        let threshold = small_int(first).ok_or_else(not_multisig)?;
        let total = small_int(count).ok_or_else(not_multisig)?;

        let pubkeys = keys
            .iter()
            .map(|ins| match ins {
                Instruction::PushBytes(bytes) => PublicKey::from_slice(bytes.as_bytes()).ok(),
                Instruction::Op(_) => None,
            })
            .collect::<Option<Vec<_>>>()
            .ok_or_else(not_multisig)?;

        if pubkeys.len() != total || threshold == 0 || threshold > total {
            return Err(not_multisig());
        }

        Ok(Self { threshold, pubkeys })
    }

    pub fn position(&self, pubkey: &PublicKey) -> Option<usize> {
        self.pubkeys.iter().position(|pk| pk == pubkey)
    }
}

fn small_int(instruction: &Instruction<'_>) -> Option<usize> {
    match instruction {
        Instruction::Op(op) => {
            let code = op.to_u8();
            if (OP_PUSHNUM_1.to_u8()..=OP_PUSHNUM_16.to_u8()).contains(&code) {
                Some((code - OP_PUSHNUM_1.to_u8() + 1) as usize)
            } else {
                None
            }
        }
        Instruction::PushBytes(_) => None,
    }
}

/// Signatures already present in a half-signed input, in script order
pub fn existing_signatures(kind: &ScriptKind, script_sig: &Script, witness: &Witness) -> RecoveryResult<Vec<Vec<u8>>> {
    let items: Vec<Vec<u8>> = if kind.is_segwit() {
        witness.iter().map(|item| item.to_vec()).collect()
    } else {
        script_sig
            .instructions()
            .map(|ins| match ins {
                Ok(Instruction::PushBytes(bytes)) => Ok(bytes.as_bytes().to_vec()),
                Ok(Instruction::Op(_)) => Ok(Vec::new()),
                Err(e) => Err(RecoveryError::signing_failed(format!("unparseable scriptSig: {}", e))),
            })
            .collect::<RecoveryResult<_>>()?
    };

    let script = kind.signing_script().as_bytes();
    Ok(items
        .into_iter()
        .filter(|item| item.as_slice() != script && looks_like_signature(item))
        .collect())
}

/// DER sequence tag plus a sighash byte; dummies and placeholders are empty
fn looks_like_signature(item: &[u8]) -> bool {
    item.len() >= 9 && item[0] == 0x30
}

/// Signatures ordered by key slot; `None` for keys that have not signed
pub struct SignatureSlots {
    threshold: usize,
    slots: Vec<Option<Vec<u8>>>,
}

impl SignatureSlots {
    pub fn new(multisig: &Multisig) -> Self {
        Self {
            threshold: multisig.threshold,
            slots: vec![None; multisig.pubkeys.len()],
        }
    }

    pub fn insert(&mut self, position: usize, signature: Vec<u8>) -> RecoveryResult<()> {
        match self.slots.get_mut(position) {
            Some(slot @ None) => {
                *slot = Some(signature);
                Ok(())
            }
            Some(Some(_)) => Err(RecoveryError::signing_failed(format!(
                "key {} of the script has already signed this input",
                position + 1
            ))),
            None => Err(RecoveryError::signing_failed("signature slot out of range")),
        }
    }

    pub fn count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn is_complete(&self) -> bool {
        self.count() >= self.threshold
    }

    /// Stack items between the CHECKMULTISIG dummy and the script.
    /// Complete inputs carry exactly `m` signatures; incomplete ones keep
    /// an empty placeholder for every unsigned key.
    fn stack_items(&self) -> Vec<Vec<u8>> {
        if self.is_complete() {
            self.slots.iter().flatten().take(self.threshold).cloned().collect()
        } else {
            self.slots.iter().map(|s| s.clone().unwrap_or_default()).collect()
        }
    }
}

/// Rebuild scriptSig and witness for an input from its signature slots
pub fn assemble_input(kind: &ScriptKind, slots: &SignatureSlots) -> RecoveryResult<(ScriptBuf, Witness)> {
    let mut stack = vec![Vec::new()];
    stack.extend(slots.stack_items());

    match kind {
        ScriptKind::Legacy { redeem_script } => {
            stack.push(redeem_script.to_bytes());
            Ok((push_all(&stack)?, Witness::new()))
        }
        ScriptKind::WrappedSegwit { redeem_script, witness_script } => {
            stack.push(witness_script.to_bytes());
            let script_sig = push_all(&[redeem_script.to_bytes()])?;
            Ok((script_sig, Witness::from_slice(&stack)))
        }
        ScriptKind::NativeSegwit { witness_script } => {
            stack.push(witness_script.to_bytes());
            Ok((ScriptBuf::new(), Witness::from_slice(&stack)))
        }
    }
}

fn push_all(items: &[Vec<u8>]) -> RecoveryResult<ScriptBuf> {
    let mut builder = Builder::new();
    for item in items {
        let push = PushBytesBuf::try_from(item.clone())
            .map_err(|_| RecoveryError::signing_failed("script element too large to push"))?;
        builder = builder.push_slice(push);
    }
    Ok(builder.into_script())
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use bitcoin::secp256k1::{Secp256k1, SecretKey};

    pub(crate) fn pubkeys(n: u8) -> Vec<PublicKey> {
        let secp = Secp256k1::new();
        (1..=n)
            .map(|i| PublicKey::from_secret_key(&secp, &SecretKey::from_slice(&[i; 32]).unwrap()))
            .collect()
    }

    pub(crate) fn multisig_script(threshold: u8, keys: &[PublicKey]) -> ScriptBuf {
        let mut builder = Builder::new().push_int(threshold as i64);
        for key in keys {
            builder = builder.push_slice(key.serialize());
        }
        builder
            .push_int(keys.len() as i64)
            .push_opcode(OP_CHECKMULTISIG)
            .into_script()
    }

    fn spec(redeem: Option<&ScriptBuf>, witness: Option<&ScriptBuf>) -> InputSpec {
        InputSpec {
            chain_path: "/0/0".into(),
            redeem_script: redeem.map(|s| s.to_hex_string()),
            witness_script: witness.map(|s| s.to_hex_string()),
            amount: Some(1000),
        }
    }

    #[test]
    fn test_classify_each_kind() {
        let ms = multisig_script(2, &pubkeys(3));
        let wrapped = ScriptBuf::new_p2wsh(&ms.wscript_hash());

        assert!(matches!(ScriptKind::classify(&spec(None, Some(&ms))).unwrap(), ScriptKind::NativeSegwit { .. }));
        assert!(matches!(ScriptKind::classify(&spec(Some(&wrapped), Some(&ms))).unwrap(), ScriptKind::WrappedSegwit { .. }));
        assert!(matches!(ScriptKind::classify(&spec(Some(&ms), None)).unwrap(), ScriptKind::Legacy { .. }));
        assert!(ScriptKind::classify(&spec(None, None)).is_err());
    }

    #[test]
    fn test_classify_rejects_mismatched_wrapper_and_bad_hex() {
        let ms = multisig_script(2, &pubkeys(3));
        assert!(ScriptKind::classify(&spec(Some(&ms), Some(&ms))).is_err());

        let mut bad = spec(None, None);
        bad.redeem_script = Some("zz".into());
        assert!(ScriptKind::classify(&bad).is_err());
    }

    #[test]
    fn test_prev_out_script() {
        let ms = multisig_script(2, &pubkeys(3));
        let native = ScriptKind::NativeSegwit { witness_script: ms.clone() };
        assert!(native.prev_out_script().is_p2wsh());
        let legacy = ScriptKind::Legacy { redeem_script: ms };
        assert!(legacy.prev_out_script().is_p2sh());
    }

    #[test]
    fn test_parse_multisig() {
        let keys = pubkeys(3);
        let parsed = Multisig::parse(&multisig_script(2, &keys)).unwrap();
        assert_eq!(parsed.threshold, 2);
        assert_eq!(parsed.pubkeys, keys);
        assert_eq!(parsed.position(&keys[1]), Some(1));

        let p2sh = ScriptBuf::new_p2sh(&multisig_script(2, &keys).script_hash());
        assert!(Multisig::parse(&p2sh).is_err());
        assert!(Multisig::parse(&multisig_script(4, &keys)).is_err());
    }

    #[test]
    fn test_slots_complete_and_partial() {
        let ms = Multisig::parse(&multisig_script(2, &pubkeys(3))).unwrap();
        let sig = |b: u8| {
            let mut s = vec![0x30; 70];
            s[1] = b;
            s
        };

        let mut slots = SignatureSlots::new(&ms);
        slots.insert(2, sig(2)).unwrap();
        assert!(!slots.is_complete());
        assert_eq!(slots.stack_items(), vec![Vec::new(), Vec::new(), sig(2)]);

        slots.insert(0, sig(0)).unwrap();
        assert!(slots.is_complete());
        assert_eq!(slots.stack_items(), vec![sig(0), sig(2)]);
        assert!(slots.insert(0, sig(9)).is_err());
    }

    #[test]
    fn test_existing_signatures_skip_dummy_and_script() {
        let ms = multisig_script(2, &pubkeys(3));
        let kind = ScriptKind::Legacy { redeem_script: ms.clone() };
        let user_sig = {
            let mut s = vec![0x30; 71];
            s[70] = 0x01;
            s
        };
        let script_sig = push_all(&[Vec::new(), user_sig.clone(), Vec::new(), ms.to_bytes()]).unwrap();

        let found = existing_signatures(&kind, &script_sig, &Witness::new()).unwrap();
        assert_eq!(found, vec![user_sig]);

        let native = ScriptKind::NativeSegwit { witness_script: ms };
        assert!(existing_signatures(&native, &ScriptBuf::new(), &Witness::new()).unwrap().is_empty());
    }
}
