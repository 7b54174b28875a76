//! Audit log for the signing flow
//!
//! Lines go to stderr as `[time] LEVEL [module] message | k=v ...` so
//! stdout stays reserved for the confirmation summary and the signed
//! result. Any value that looks like private key material is masked
//! before it is written, whatever the field is called.

use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};

/// Environment variable that turns on debug lines
pub const DEBUG_ENV_VAR: &str = "RECOVERY_SIGNER_DEBUG";

static DEBUG: AtomicBool = AtomicBool::new(false);

pub fn enable_debug() {
    DEBUG.store(true, Ordering::Relaxed);
}

/// Honour `RECOVERY_SIGNER_DEBUG=1|true|yes|on`
pub fn init_from_env() {
    let on = std::env::var(DEBUG_ENV_VAR)
        .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes" | "on"))
        .unwrap_or(false);
    if on {
        enable_debug();
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Level {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for Level {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Level::Debug => "DEBUG",
            Level::Info => "INFO",
            Level::Warn => "WARN",
            Level::Error => "ERROR",
        })
    }
}

/// One audit line under construction
#[derive(Debug)]
pub struct Event {
    level: Level,
    module: &'static str,
    message: String,
    fields: Vec<(&'static str, String)>,
}

impl Event {
    pub fn new(level: Level, module: &'static str, message: impl Into<String>) -> Self {
        Self {
            level,
            module,
            message: message.into(),
            fields: Vec::new(),
        }
    }

    pub fn with(mut self, key: &'static str, value: impl fmt::Display) -> Self {
        self.fields.push((key, mask_key_material(&value.to_string())));
        self
    }

    fn line(&self) -> String {
        let mut line = format!("{} [{}] {}", self.level, self.module, self.message);
        for (i, (key, value)) in self.fields.iter().enumerate() {
            line.push_str(if i == 0 { " | " } else { " " });
            line.push_str(key);
            line.push('=');
            line.push_str(value);
        }
        line
    }

    pub fn emit(self) {
        if self.level == Level::Debug && !DEBUG.load(Ordering::Relaxed) {
            return;
        }
        eprintln!("[{}] {}", chrono::Utc::now().format("%Y-%m-%dT%H:%M:%S%.3fZ"), self.line());
    }
}

/// Extended private keys (`xprv`, `tprv`) and payment secret seeds
fn is_key_material(value: &str) -> bool {
    let value = value.trim();
    if value.starts_with("xprv") || value.starts_with("tprv") {
        return true;
    }
    // strkey seed: 'S' followed by 55 base32 characters
    value.len() == 56
        && value.starts_with('S')
        && value.bytes().all(|b| b.is_ascii_uppercase() || (b'2'..=b'7').contains(&b))
}

fn mask_key_material(value: &str) -> String {
    if is_key_material(value) {
        format!("[secret:{}chars]", value.trim().len())
    } else {
        value.to_string()
    }
}

#[doc(hidden)]
#[macro_export]
macro_rules! __log_event {
    ($level:ident, $module:expr, $msg:expr $(, $key:ident = $value:expr)* $(,)?) => {
        $crate::utils::logging::Event::new($crate::utils::logging::Level::$level, $module, $msg)
            $(.with(stringify!($key), &$value))*
            .emit()
    };
}

#[macro_export]
macro_rules! log_debug {
    ($($arg:tt)*) => { $crate::__log_event!(Debug, $($arg)*) };
}

#[macro_export]
macro_rules! log_info {
    ($($arg:tt)*) => { $crate::__log_event!(Info, $($arg)*) };
}

#[macro_export]
macro_rules! log_warn {
    ($($arg:tt)*) => { $crate::__log_event!(Warn, $($arg)*) };
}

#[macro_export]
macro_rules! log_error {
    ($($arg:tt)*) => { $crate::__log_event!(Error, $($arg)*) };
}
