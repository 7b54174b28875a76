//! Stellar strkey encoding
//!
//! `BASE32(version ‖ payload ‖ crc16-xmodem(version ‖ payload) as LE)`

use data_encoding::BASE32_NOPAD;
use zeroize::Zeroizing;

use crate::error::{RecoveryError, RecoveryResult};

/// `G…` account public key
pub const VERSION_ACCOUNT_ID: u8 = 6 << 3;
/// `S…` ed25519 secret seed
pub const VERSION_SECRET_SEED: u8 = 18 << 3;
/// `M…` multiplexed account
pub const VERSION_MUXED_ACCOUNT: u8 = 12 << 3;

pub fn encode(version: u8, payload: &[u8]) -> String {
    let mut data = Zeroizing::new(Vec::with_capacity(payload.len() + 3));
    data.push(version);
    data.extend_from_slice(payload);

    let checksum = crc16_xmodem(&data);
    data.extend_from_slice(&checksum.to_le_bytes());

    BASE32_NOPAD.encode(&data)
}

/// Decode and check version and checksum; returns the payload
pub fn decode(version: u8, encoded: &str) -> RecoveryResult<Zeroizing<Vec<u8>>> {
    let invalid = |why: &str| RecoveryError::malformed_transaction(format!("invalid strkey: {}", why));

    let data = Zeroizing::new(
        BASE32_NOPAD
            .decode(encoded.as_bytes())
            .map_err(|_| invalid("not base32"))?,
    );
    if data.len() < 3 {
        return Err(invalid("too short"));
    }
    if data[0] != version {
        return Err(invalid("unexpected version byte"));
    }

    let (body, checksum) = data.split_at(data.len() - 2);
    if crc16_xmodem(body).to_le_bytes() != checksum {
        return Err(invalid("checksum mismatch"));
    }

    Ok(Zeroizing::new(body[1..].to_vec()))
}

pub fn encode_account_id(public_key: &[u8; 32]) -> String {
    encode(VERSION_ACCOUNT_ID, public_key)
}

pub fn encode_muxed_account(public_key: &[u8; 32], id: u64) -> String {
    let mut payload = Vec::with_capacity(40);
    payload.extend_from_slice(public_key);
    payload.extend_from_slice(&id.to_be_bytes());
    encode(VERSION_MUXED_ACCOUNT, &payload)
}

/// Raw ed25519 seed of an `S…` secret
pub fn decode_secret_seed(encoded: &str) -> RecoveryResult<Zeroizing<[u8; 32]>> {
    let payload = decode(VERSION_SECRET_SEED, encoded)?;
    if payload.len() != 32 {
        return Err(RecoveryError::malformed_transaction("secret seed must be 32 bytes"));
    }
    let mut seed = Zeroizing::new([0u8; 32]);
    seed.copy_from_slice(&payload);
    Ok(seed)
}

fn crc16_xmodem(data: &[u8]) -> u16 {
    let mut crc: u16 = 0;
    for byte in data {
        crc ^= (*byte as u16) << 8;
        for _ in 0..8 {
            crc = if crc & 0x8000 != 0 { (crc << 1) ^ 0x1021 } else { crc << 1 };
        }
    }
    crc
}
