//! Request and result files
//!
//! The result lands next to the request with its extension replaced by
//! `.signed.json`. It is written only after signing succeeded.

use std::fs;
use std::path::{Path, PathBuf};

use crate::error::{RecoveryError, RecoveryResult};
use crate::log_info;
use crate::types::{RecoveryRequest, SignedRecovery};

pub fn load_request(path: &Path) -> RecoveryResult<RecoveryRequest> {
    let json = fs::read_to_string(path)
        .map_err(|e| RecoveryError::from(e).with_details(path.display().to_string()))?;
    RecoveryRequest::from_json(&json)
}

/// `recovery.json` → `recovery.signed.json`, `dir/req` → `dir/req.signed.json`
pub fn result_path(request_path: &Path) -> PathBuf {
    request_path.with_extension("signed.json")
}

/// Pretty-printed with two-space indentation
pub fn write_result(path: &Path, result: &SignedRecovery) -> RecoveryResult<()> {
    let json = serde_json::to_string_pretty(result)?;
    fs::write(path, json).map_err(|e| RecoveryError::from(e).with_details(path.display().to_string()))?;
    log_info!("storage", "Result written", path = path.display());
    Ok(())
}
